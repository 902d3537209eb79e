//! Multi-buffered GPU buffers with per-slot dirty tracking
//!
//! A [`FrameBufferedResource`] backs one logical buffer with one device allocation per
//! frame in flight. Uploads only touch the CPU-side payload and mark slots dirty; each
//! slot is brought up to date by `flush(slot)` once the frame that last read it has
//! completed, so a CPU write never races a GPU read of an earlier frame.

use std::sync::Arc;

use crate::render::api::{BufferUsage, GpuDevice, MemoryKind, RenderError, RenderResult};
use crate::render::context::GpuContext;

/// What the buffer is bound as
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferKind {
    /// Vertex attribute data
    Vertex,
    /// Index data
    Index,
    /// Uniform block data
    Uniform,
}

impl BufferKind {
    /// Device usage flags for this kind
    pub const fn usage(self) -> BufferUsage {
        match self {
            Self::Vertex => BufferUsage::VERTEX,
            Self::Index => BufferUsage::INDEX,
            Self::Uniform => BufferUsage::UNIFORM,
        }
    }
}

/// How the payload reaches the device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UploadMode {
    /// Uploaded once through a staging buffer into a single device-local allocation
    Static,
    /// Host-visible, one re-writable allocation per frame in flight
    Dynamic,
}

/// One per-frame copy of the payload
#[derive(Debug)]
struct Slot<A> {
    allocation: Option<A>,
    size: usize,
    dirty: bool,
}

impl<A> Slot<A> {
    const fn empty() -> Self {
        Self {
            allocation: None,
            size: 0,
            dirty: false,
        }
    }
}

/// Logical buffer backed by one allocation per frame in flight
pub struct FrameBufferedResource<D: GpuDevice> {
    context: Arc<GpuContext<D>>,
    kind: BufferKind,
    mode: UploadMode,
    payload: Vec<u8>,
    slots: Vec<Slot<D::Allocation>>,
    initialized: bool,
}

impl<D: GpuDevice> FrameBufferedResource<D> {
    /// Create a dynamic resource with no payload yet
    pub fn new_dynamic(context: &Arc<GpuContext<D>>, kind: BufferKind) -> Self {
        let slots = (0..context.frames_in_flight()).map(|_| Slot::empty()).collect();
        Self {
            context: Arc::clone(context),
            kind,
            mode: UploadMode::Dynamic,
            payload: Vec::new(),
            slots,
            initialized: false,
        }
    }

    /// Create a dynamic resource and upload an initial payload to every slot
    pub fn with_payload(context: &Arc<GpuContext<D>>, kind: BufferKind, bytes: &[u8]) -> RenderResult<Self> {
        let mut resource = Self::new_dynamic(context, kind);
        resource.upload(bytes)?;
        Ok(resource)
    }

    /// Create a static resource, copying `bytes` into device-local memory
    pub fn new_static(context: &Arc<GpuContext<D>>, kind: BufferKind, bytes: &[u8]) -> RenderResult<Self> {
        let allocation = if bytes.is_empty() {
            None
        } else {
            Some(upload_through_staging(context.device(), kind.usage(), bytes)?)
        };
        log::debug!("[BUFFER] Created static {:?} buffer of {} bytes", kind, bytes.len());
        Ok(Self {
            context: Arc::clone(context),
            kind,
            mode: UploadMode::Static,
            payload: bytes.to_vec(),
            slots: vec![Slot {
                allocation,
                size: bytes.len(),
                dirty: false,
            }],
            initialized: true,
        })
    }

    /// Create a resource of the given mode from an optional initial payload
    pub fn new(
        context: &Arc<GpuContext<D>>,
        kind: BufferKind,
        mode: UploadMode,
        initial: Option<&[u8]>,
    ) -> RenderResult<Self> {
        match (mode, initial) {
            (UploadMode::Static, bytes) => Self::new_static(context, kind, bytes.unwrap_or_default()),
            (UploadMode::Dynamic, Some(bytes)) => Self::with_payload(context, kind, bytes),
            (UploadMode::Dynamic, None) => Ok(Self::new_dynamic(context, kind)),
        }
    }

    /// Replace the payload and mark every slot dirty
    ///
    /// The first upload to a fresh dynamic resource fills every slot immediately.
    /// Later uploads only stage the payload; a size change makes the next flush of
    /// each slot reallocate it.
    pub fn upload(&mut self, bytes: &[u8]) -> RenderResult<()> {
        if self.mode == UploadMode::Static {
            return Err(RenderError::invalid_usage("upload to a static buffer"));
        }

        if !self.initialized {
            self.payload = bytes.to_vec();
            for slot in &mut self.slots {
                slot.dirty = true;
            }
            for index in 0..self.slots.len() {
                self.flush(index)?;
            }
            self.initialized = true;
            log::debug!(
                "[BUFFER] Initialized {:?} buffer with {} bytes across {} slots",
                self.kind,
                bytes.len(),
                self.slots.len()
            );
            return Ok(());
        }

        if bytes.len() != self.payload.len() {
            log::trace!(
                "[BUFFER] {:?} buffer resizing {} -> {} bytes",
                self.kind,
                self.payload.len(),
                bytes.len()
            );
        }
        self.payload.clear();
        self.payload.extend_from_slice(bytes);
        self.mark_all_dirty();
        Ok(())
    }

    /// Upload a slice of plain-old-data values
    pub fn upload_pod<T: bytemuck::Pod>(&mut self, data: &[T]) -> RenderResult<()> {
        self.upload(bytemuck::cast_slice(data))
    }

    /// Overwrite part of the payload in place without changing its size
    pub fn write_bytes(&mut self, offset: usize, bytes: &[u8]) -> RenderResult<()> {
        if self.mode == UploadMode::Static {
            return Err(RenderError::invalid_usage("write to a static buffer"));
        }
        let size = self.payload.len();
        let target = offset
            .checked_add(bytes.len())
            .and_then(|end| self.payload.get_mut(offset..end))
            .ok_or_else(|| {
                RenderError::invalid_usage(format!(
                    "write of {} bytes at offset {offset} exceeds buffer of {size} bytes",
                    bytes.len()
                ))
            })?;
        if bytes.is_empty() {
            return Ok(());
        }
        target.copy_from_slice(bytes);
        self.mark_all_dirty();
        Ok(())
    }

    fn mark_all_dirty(&mut self) {
        for slot in &mut self.slots {
            slot.dirty = true;
        }
    }

    /// Bring one slot up to date with the payload
    ///
    /// Must only be called once the frame that last read `slot` has completed on the
    /// device. A slot whose size no longer matches the payload is reallocated and its
    /// old allocation is handed to the reclaimer.
    ///
    /// Static buffers are never dirty, so flushing them is a no-op for any frame slot.
    pub fn flush(&mut self, slot: usize) -> RenderResult<()> {
        if self.mode == UploadMode::Static {
            return Ok(());
        }
        let slot_count = self.slots.len();
        let device = self.context.device();
        let entry = self.slots.get_mut(slot).ok_or_else(|| {
            RenderError::invalid_usage(format!("slot {slot} out of range for {slot_count} slots"))
        })?;
        if !entry.dirty {
            return Ok(());
        }

        let size = self.payload.len();
        if size == 0 {
            if let Some(old) = entry.allocation.take() {
                self.context.retire(old);
            }
        } else if entry.allocation.is_none() || entry.size != size {
            let mut fresh = device.allocate(size as u64, MemoryKind::HostVisible, self.kind.usage())?;
            if let Err(e) = device.write(&mut fresh, 0, &self.payload) {
                device.free(fresh);
                return Err(e);
            }
            if let Some(old) = entry.allocation.replace(fresh) {
                self.context.retire(old);
            }
        } else if let Some(allocation) = entry.allocation.as_mut() {
            device.write(allocation, 0, &self.payload)?;
        }

        entry.size = size;
        entry.dirty = false;
        log::trace!("[BUFFER] Flushed {:?} slot {} ({} bytes)", self.kind, slot, size);
        Ok(())
    }

    /// Flush the slot of the frame currently being recorded
    pub fn flush_current(&mut self) -> RenderResult<()> {
        let slot = self.context.slot_index() % self.slots.len();
        self.flush(slot)
    }

    /// True when any slot lags behind the payload
    pub fn is_dirty(&self) -> bool {
        self.slots.iter().any(|slot| slot.dirty)
    }

    /// True when `slot` lags behind the payload
    pub fn is_slot_dirty(&self, slot: usize) -> bool {
        self.slots.get(slot).is_some_and(|slot| slot.dirty)
    }

    /// True while some slot still has the size of an earlier payload
    pub fn is_resizing(&self) -> bool {
        self.mode == UploadMode::Dynamic
            && self.slots.iter().any(|slot| slot.size != self.payload.len())
    }

    /// Device allocation of a slot, `None` for an empty payload
    ///
    /// Static buffers share their single allocation across every frame slot.
    pub fn slot(&self, slot: usize) -> Option<&D::Allocation> {
        let index = if self.mode == UploadMode::Static { 0 } else { slot };
        self.slots.get(index).and_then(|slot| slot.allocation.as_ref())
    }

    /// Number of slots (1 for static buffers)
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// Payload size in bytes
    pub fn size_bytes(&self) -> usize {
        self.payload.len()
    }

    /// CPU-side payload
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Binding kind
    pub const fn kind(&self) -> BufferKind {
        self.kind
    }

    /// Upload mode
    pub const fn mode(&self) -> UploadMode {
        self.mode
    }

    /// Number of `stride`-sized elements in the payload
    pub fn element_count(&self, stride: usize) -> usize {
        self.payload.len().checked_div(stride).unwrap_or(0)
    }
}

impl<D: GpuDevice> Drop for FrameBufferedResource<D> {
    fn drop(&mut self) {
        for slot in &mut self.slots {
            if let Some(allocation) = slot.allocation.take() {
                self.context.retire(allocation);
            }
        }
    }
}

/// Copy `bytes` into a new device-local allocation through a transient staging buffer
fn upload_through_staging<D: GpuDevice>(device: &D, usage: BufferUsage, bytes: &[u8]) -> RenderResult<D::Allocation> {
    let size = bytes.len() as u64;
    let mut staging = device.allocate(size, MemoryKind::HostVisible, BufferUsage::TRANSFER_SRC)?;

    let result = device
        .write(&mut staging, 0, bytes)
        .and_then(|()| device.allocate(size, MemoryKind::DeviceLocal, usage | BufferUsage::TRANSFER_DST))
        .and_then(|mut target| match device.copy_device_to_device(&staging, &mut target, size) {
            Ok(()) => Ok(target),
            Err(e) => {
                device.free(target);
                Err(e)
            }
        });

    // The device copy has completed by the time copy_device_to_device returns
    device.free(staging);
    if let Err(e) = &result {
        log::error!("[BUFFER] Static upload of {} bytes failed: {}", size, e);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::backends::headless::{HeadlessAllocation, HeadlessDevice};

    fn context(frames: usize) -> Arc<GpuContext<HeadlessDevice>> {
        Arc::new(GpuContext::with_frames_in_flight(HeadlessDevice::new(), frames).unwrap())
    }

    fn slot_bytes(resource: &FrameBufferedResource<HeadlessDevice>, slot: usize) -> Vec<u8> {
        resource.slot(slot).map(HeadlessAllocation::bytes).unwrap_or_default().to_vec()
    }

    #[test]
    fn test_first_upload_fills_every_slot() {
        let context = context(3);
        let resource = FrameBufferedResource::with_payload(&context, BufferKind::Uniform, &[7; 16]).unwrap();

        assert!(!resource.is_dirty());
        assert_eq!(resource.slot_count(), 3);
        for slot in 0..3 {
            assert_eq!(slot_bytes(&resource, slot), vec![7; 16]);
        }
        assert_eq!(context.device().live_allocation_count(), 3);
    }

    #[test]
    fn test_same_size_upload_writes_in_place() {
        let context = context(2);
        let mut resource = FrameBufferedResource::with_payload(&context, BufferKind::Vertex, &[1; 8]).unwrap();
        let allocations = context.device().total_allocations();

        resource.upload(&[2; 8]).unwrap();
        assert!(resource.is_dirty());
        assert!(!resource.is_resizing());
        resource.flush(0).unwrap();
        resource.flush(1).unwrap();

        assert!(!resource.is_dirty());
        assert_eq!(slot_bytes(&resource, 1), vec![2; 8]);
        assert_eq!(context.device().total_allocations(), allocations);
        assert_eq!(context.pending_reclaims(), 0);
    }

    #[test]
    fn test_resize_retires_old_allocations() {
        let context = context(2);
        let mut resource = FrameBufferedResource::with_payload(&context, BufferKind::Vertex, &[1; 8]).unwrap();

        resource.upload(&[3; 24]).unwrap();
        assert!(resource.is_resizing());
        resource.flush(0).unwrap();
        assert!(resource.is_resizing());
        resource.flush(1).unwrap();
        assert!(!resource.is_resizing());

        assert_eq!(context.pending_reclaims(), 2);
        assert_eq!(context.device().live_allocation_count(), 4);
        context.begin_frame();
        context.begin_frame();
        assert_eq!(context.device().live_allocation_count(), 2);
        assert_eq!(slot_bytes(&resource, 0), vec![3; 24]);
    }

    #[test]
    fn test_flush_of_clean_slot_is_noop() {
        let context = context(2);
        let mut resource = FrameBufferedResource::with_payload(&context, BufferKind::Uniform, &[5; 4]).unwrap();
        resource.flush(0).unwrap();
        assert_eq!(context.device().total_allocations(), 2);
    }

    #[test]
    fn test_flush_out_of_range() {
        let context = context(2);
        let mut resource = FrameBufferedResource::new_dynamic(&context, BufferKind::Uniform);
        assert!(matches!(resource.flush(2), Err(RenderError::InvalidUsage { .. })));
    }

    #[test]
    fn test_static_buffer() {
        let context = context(3);
        let mut resource = FrameBufferedResource::new_static(&context, BufferKind::Index, &[4; 12]).unwrap();

        assert_eq!(resource.slot_count(), 1);
        assert_eq!(resource.mode(), UploadMode::Static);
        let slot = resource.slot(0).unwrap();
        assert_eq!(slot.memory(), MemoryKind::DeviceLocal);
        assert_eq!(slot.bytes(), &[4; 12]);
        assert_eq!(context.device().device_copy_count(), 1);
        assert_eq!(context.device().live_allocation_count(), 1);

        assert!(matches!(resource.upload(&[0; 12]), Err(RenderError::InvalidUsage { .. })));
        assert!(matches!(resource.write_bytes(0, &[0]), Err(RenderError::InvalidUsage { .. })));
        assert!(!resource.is_dirty());
    }

    #[test]
    fn test_static_buffer_flushes_for_every_frame_slot() {
        let context = context(3);
        let mut resource = FrameBufferedResource::new_static(&context, BufferKind::Index, &[0; 12]).unwrap();

        for _ in 0..2 * context.frames_in_flight() {
            let slot = context.begin_frame();
            resource.flush(slot).unwrap();
            assert_eq!(resource.slot(slot).unwrap().bytes(), &[0; 12]);
        }
        resource.flush_current().unwrap();
        assert!(!resource.is_dirty());
        assert_eq!(context.device().total_allocations(), 2);
        assert_eq!(context.device().live_allocation_count(), 1);
    }

    #[test]
    fn test_static_failure_releases_staging() {
        let context = context(2);
        context.device().set_allocation_budget(Some(1));
        let result = FrameBufferedResource::new_static(&context, BufferKind::Vertex, &[1; 8]);
        assert!(matches!(result, Err(RenderError::DeviceAllocationFailure { .. })));
        assert_eq!(context.device().live_allocation_count(), 0);
    }

    #[test]
    fn test_zero_size_payload_skips_allocation() {
        let context = context(2);
        let mut resource = FrameBufferedResource::with_payload(&context, BufferKind::Vertex, &[]).unwrap();
        assert!(!resource.is_dirty());
        assert!(resource.slot(0).is_none());
        assert_eq!(context.device().total_allocations(), 0);

        resource.upload(&[1; 4]).unwrap();
        resource.flush(0).unwrap();
        assert_eq!(slot_bytes(&resource, 0), vec![1; 4]);
        assert!(resource.is_slot_dirty(1));

        let empty_static = FrameBufferedResource::new_static(&context, BufferKind::Index, &[]).unwrap();
        assert!(empty_static.slot(0).is_none());
    }

    #[test]
    fn test_write_bytes_partial_update() {
        let context = context(2);
        let mut resource = FrameBufferedResource::with_payload(&context, BufferKind::Uniform, &[0; 8]).unwrap();

        resource.write_bytes(4, &[9, 9]).unwrap();
        assert!(resource.is_dirty());
        assert!(!resource.is_resizing());
        resource.flush(1).unwrap();
        assert_eq!(slot_bytes(&resource, 1), vec![0, 0, 0, 0, 9, 9, 0, 0]);
        assert_eq!(slot_bytes(&resource, 0), vec![0; 8]);

        assert!(matches!(resource.write_bytes(7, &[1, 1]), Err(RenderError::InvalidUsage { .. })));
        assert!(matches!(resource.write_bytes(usize::MAX, &[1]), Err(RenderError::InvalidUsage { .. })));
    }

    #[test]
    fn test_allocation_failure_keeps_slot_dirty() {
        let context = context(2);
        let mut resource = FrameBufferedResource::with_payload(&context, BufferKind::Vertex, &[1; 8]).unwrap();
        resource.upload(&[2; 16]).unwrap();

        context.device().set_allocation_budget(Some(0));
        let result = resource.flush(1);
        assert!(matches!(result, Err(RenderError::DeviceAllocationFailure { size: 16, .. })));
        assert!(resource.is_slot_dirty(1));
        assert_eq!(slot_bytes(&resource, 1), vec![1; 8]);

        context.device().set_allocation_budget(None);
        resource.flush(1).unwrap();
        assert_eq!(slot_bytes(&resource, 1), vec![2; 16]);
    }

    #[test]
    fn test_upload_pod_and_element_count() {
        let context = context(2);
        let mut resource = FrameBufferedResource::new_dynamic(&context, BufferKind::Vertex);
        let vertices: [[f32; 3]; 3] = [[0.0, 1.0, 0.0], [-1.0, -1.0, 0.0], [1.0, -1.0, 0.0]];

        resource.upload_pod(&vertices).unwrap();
        assert_eq!(resource.size_bytes(), 36);
        assert_eq!(resource.element_count(12), 3);
        assert_eq!(resource.element_count(0), 0);
        let first: &[f32] = bytemuck::cast_slice(&resource.payload()[..12]);
        approx::assert_relative_eq!(first[1], 1.0);
    }

    #[test]
    fn test_drop_retires_slots() {
        let context = context(3);
        let resource = FrameBufferedResource::with_payload(&context, BufferKind::Uniform, &[1; 4]).unwrap();
        drop(resource);

        assert_eq!(context.pending_reclaims(), 3);
        assert_eq!(context.device().live_allocation_count(), 3);
        context.shutdown().unwrap();
        assert_eq!(context.device().live_allocation_count(), 0);
    }

    #[test]
    fn test_flush_current_follows_frame_clock() {
        let context = context(2);
        let mut resource = FrameBufferedResource::with_payload(&context, BufferKind::Uniform, &[0; 4]).unwrap();
        resource.upload(&[1; 4]).unwrap();

        context.begin_frame();
        resource.flush_current().unwrap();
        assert!(!resource.is_slot_dirty(1));
        assert!(resource.is_slot_dirty(0));
    }
}
