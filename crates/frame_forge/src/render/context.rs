//! Device context shared by every resource and pipeline
//!
//! [`GpuContext`] is the explicit handle passed into constructors instead of a global
//! device singleton. It owns the device, the frame clock and the resource reclaimer,
//! so independent contexts (for example one per test) never interfere.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::config::{GpuCoreConfig, MAX_FRAMES_IN_FLIGHT};
use crate::render::api::{GpuDevice, RenderError, RenderResult};
use crate::render::resources::ResourceReclaimer;

/// Device plus per-session frame bookkeeping
pub struct GpuContext<D: GpuDevice> {
    device: D,
    frames_in_flight: usize,
    frame: AtomicU64,
    reclaimer: Mutex<ResourceReclaimer<D::Allocation>>,
}

impl<D: GpuDevice> GpuContext<D> {
    /// Create a context from configuration
    pub fn new(device: D, config: &GpuCoreConfig) -> RenderResult<Self> {
        config
            .validate()
            .map_err(|e| RenderError::invalid_usage(e.to_string()))?;
        Self::with_frames_in_flight(device, config.frames_in_flight)
    }

    /// Create a context with an explicit frame-in-flight count
    pub fn with_frames_in_flight(device: D, frames_in_flight: usize) -> RenderResult<Self> {
        if frames_in_flight == 0 || frames_in_flight > MAX_FRAMES_IN_FLIGHT {
            return Err(RenderError::invalid_usage(format!(
                "frames in flight must be within 1..={MAX_FRAMES_IN_FLIGHT}, got {frames_in_flight}"
            )));
        }
        log::debug!("[CONTEXT] Created GPU context with {} frame(s) in flight", frames_in_flight);
        Ok(Self {
            device,
            frames_in_flight,
            frame: AtomicU64::new(0),
            reclaimer: Mutex::new(ResourceReclaimer::new(frames_in_flight)),
        })
    }

    /// The device
    pub const fn device(&self) -> &D {
        &self.device
    }

    /// Slot count of every frame-buffered resource
    pub const fn frames_in_flight(&self) -> usize {
        self.frames_in_flight
    }

    /// Monotonic frame counter
    pub fn current_frame(&self) -> u64 {
        self.frame.load(Ordering::Acquire)
    }

    /// Slot index of the frame currently being recorded
    pub fn slot_index(&self) -> usize {
        (self.current_frame() % self.frames_in_flight as u64) as usize
    }

    fn reclaimer(&self) -> MutexGuard<'_, ResourceReclaimer<D::Allocation>> {
        self.reclaimer.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Advance to the next frame and release allocations whose grace period has passed
    ///
    /// Call once per frame after waiting on the fence of the slot about to be reused.
    /// Returns the slot index of the new frame.
    pub fn begin_frame(&self) -> usize {
        let frame = self.frame.fetch_add(1, Ordering::AcqRel) + 1;
        let device = &self.device;
        self.reclaimer().collect(frame, |allocation| device.free(allocation));
        (frame % self.frames_in_flight as u64) as usize
    }

    /// Hand a superseded allocation to the reclaimer
    pub fn retire(&self, allocation: D::Allocation) {
        let frame = self.current_frame();
        self.reclaimer().push(allocation, frame);
    }

    /// Allocations waiting for their grace period
    pub fn pending_reclaims(&self) -> usize {
        self.reclaimer().len()
    }

    /// Wait for the device and release every retired allocation
    pub fn shutdown(&self) -> RenderResult<()> {
        self.device.wait_idle()?;
        let device = &self.device;
        let released = self.reclaimer().drain(|allocation| device.free(allocation));
        log::debug!("[CONTEXT] Shutdown released {} retired allocation(s)", released);
        Ok(())
    }
}

impl<D: GpuDevice> Drop for GpuContext<D> {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            log::error!("[CONTEXT] Device wait failed during drop: {}", e);
        }
    }
}
