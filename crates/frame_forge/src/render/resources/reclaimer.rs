//! Deferred destruction of superseded device allocations
//!
//! A frame-buffered resource that replaces one of its slot allocations cannot free
//! the old one right away: a frame submitted earlier may still be reading it. The
//! allocation is retired here together with the frame number at retirement and only
//! released once `grace_frames` further frames have begun, by which point every frame
//! that could have referenced it has completed.

/// Allocation waiting for the in-flight window to pass
#[derive(Debug)]
struct RetiredAllocation<A> {
    allocation: A,
    retired_at: u64,
}

/// Frame-indexed deferred-destruction queue
#[derive(Debug)]
pub struct ResourceReclaimer<A> {
    entries: Vec<RetiredAllocation<A>>,
    grace_frames: u64,
}

impl<A> ResourceReclaimer<A> {
    /// Create a reclaimer that holds allocations for `grace_frames` frames
    pub fn new(grace_frames: usize) -> Self {
        Self {
            entries: Vec::new(),
            grace_frames: grace_frames as u64,
        }
    }

    /// Number of frames an allocation is held after retirement
    pub const fn grace_frames(&self) -> u64 {
        self.grace_frames
    }

    /// Retire an allocation during frame `retired_at`
    pub fn push(&mut self, allocation: A, retired_at: u64) {
        self.entries.push(RetiredAllocation { allocation, retired_at });
    }

    /// Release every allocation whose grace period has elapsed by `current_frame`
    ///
    /// Returns the number of allocations handed to `release`.
    pub fn collect(&mut self, current_frame: u64, mut release: impl FnMut(A)) -> usize {
        let grace = self.grace_frames;
        let (expired, pending): (Vec<_>, Vec<_>) = self
            .entries
            .drain(..)
            .partition(|entry| current_frame >= entry.retired_at.saturating_add(grace));
        self.entries = pending;

        let released = expired.len();
        for entry in expired {
            release(entry.allocation);
        }
        if released > 0 {
            log::trace!(
                "[RECLAIM] Released {} allocation(s) at frame {}, {} pending",
                released,
                current_frame,
                self.entries.len()
            );
        }
        released
    }

    /// Release everything regardless of age; only valid once the device is idle
    pub fn drain(&mut self, mut release: impl FnMut(A)) -> usize {
        let released = self.entries.len();
        for entry in self.entries.drain(..) {
            release(entry.allocation);
        }
        released
    }

    /// Allocations still waiting
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when nothing is waiting
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_held_for_grace_period() {
        let mut reclaimer = ResourceReclaimer::new(2);
        reclaimer.push("a", 5);

        let mut released = Vec::new();
        assert_eq!(reclaimer.collect(5, |a| released.push(a)), 0);
        assert_eq!(reclaimer.collect(6, |a| released.push(a)), 0);
        assert_eq!(reclaimer.collect(7, |a| released.push(a)), 1);
        assert_eq!(released, vec!["a"]);
        assert!(reclaimer.is_empty());
    }

    #[test]
    fn test_only_expired_entries_released() {
        let mut reclaimer = ResourceReclaimer::new(3);
        reclaimer.push(1, 0);
        reclaimer.push(2, 2);
        reclaimer.push(3, 4);

        let mut released = Vec::new();
        reclaimer.collect(5, |a| released.push(a));
        assert_eq!(released, vec![1, 2]);
        assert_eq!(reclaimer.len(), 1);
    }

    #[test]
    fn test_drain_releases_everything() {
        let mut reclaimer = ResourceReclaimer::new(3);
        reclaimer.push(1, 10);
        reclaimer.push(2, 11);

        let mut released = Vec::new();
        assert_eq!(reclaimer.drain(|a| released.push(a)), 2);
        assert_eq!(released, vec![1, 2]);
        assert!(reclaimer.is_empty());
    }
}
