//! Frame-buffered resources driven by the frame clock

use std::sync::Arc;

use crate::render::api::GpuDevice;
use crate::render::backends::headless::{HeadlessAllocation, HeadlessDevice};
use crate::render::context::GpuContext;
use crate::render::resources::{BufferKind, FrameBufferedResource};

fn context(frames: usize) -> Arc<GpuContext<HeadlessDevice>> {
    Arc::new(GpuContext::with_frames_in_flight(HeadlessDevice::new(), frames).unwrap())
}

fn slot_bytes(resource: &FrameBufferedResource<HeadlessDevice>, slot: usize) -> Vec<u8> {
    resource.slot(slot).map(HeadlessAllocation::bytes).unwrap_or_default().to_vec()
}

#[test]
fn test_resize_between_flushes_keeps_old_slot_until_reflushed() {
    let context = context(3);
    let mut resource = FrameBufferedResource::new_dynamic(&context, BufferKind::Uniform);

    resource.upload(&[0xAA; 64]).unwrap();
    resource.flush(0).unwrap();
    resource.upload(&[0xBB; 128]).unwrap();
    resource.flush(1).unwrap();
    resource.flush(2).unwrap();

    assert_eq!(slot_bytes(&resource, 0), vec![0xAA; 64]);
    assert_eq!(slot_bytes(&resource, 1), vec![0xBB; 128]);
    assert_eq!(slot_bytes(&resource, 2), vec![0xBB; 128]);
    assert!(resource.is_dirty());
    assert!(resource.is_slot_dirty(0));

    resource.flush(0).unwrap();
    assert_eq!(slot_bytes(&resource, 0), vec![0xBB; 128]);
    assert!(!resource.is_dirty());
}

#[test]
fn test_dirty_flag_follows_upload_and_flush() {
    let context = context(2);
    let mut resource = FrameBufferedResource::with_payload(&context, BufferKind::Vertex, &[1; 32]).unwrap();
    assert!(!resource.is_dirty());

    resource.upload(&[2; 32]).unwrap();
    assert!(resource.is_dirty());
    resource.flush(0).unwrap();
    assert!(resource.is_dirty());
    resource.flush(1).unwrap();
    assert!(!resource.is_dirty());

    resource.upload(&[2; 32]).unwrap();
    assert!(resource.is_dirty());
}

#[test]
fn test_flush_is_eventually_consistent_per_slot() {
    let context = context(3);
    let mut resource = FrameBufferedResource::new_dynamic(&context, BufferKind::Uniform);
    let mut seed: u32 = 0x2545_F491;
    let mut next = || {
        seed ^= seed << 13;
        seed ^= seed >> 17;
        seed ^= seed << 5;
        seed
    };

    let mut latest = Vec::new();
    for round in 0..40u32 {
        let len = 4 + (next() % 5) as usize * 4;
        latest.clear();
        latest.resize(len, (round % 251) as u8);
        resource.upload(&latest).unwrap();

        // Flush a random subset, as a partially elapsed frame cycle would
        for slot in 0..3 {
            if next() % 2 == 0 {
                resource.flush(slot).unwrap();
                assert_eq!(slot_bytes(&resource, slot), latest);
                assert!(!resource.is_slot_dirty(slot));
            }
        }
        context.begin_frame();
    }

    for slot in 0..3 {
        resource.flush(slot).unwrap();
    }
    for slot in 0..3 {
        assert_eq!(slot_bytes(&resource, slot), latest);
    }
    assert!(!resource.is_dirty());
}

#[test]
fn test_superseded_allocation_outlives_in_flight_frames() {
    let context = context(3);
    let mut resource = FrameBufferedResource::with_payload(&context, BufferKind::Vertex, &[1; 16]).unwrap();
    let live_before = context.device().live_allocation_count();

    resource.upload(&[2; 48]).unwrap();
    let slot = context.begin_frame();
    resource.flush(slot).unwrap();
    assert_eq!(context.device().live_allocation_count(), live_before + 1);

    // The replaced allocation may still be read by the two frames already in flight
    context.begin_frame();
    context.begin_frame();
    assert_eq!(context.device().live_allocation_count(), live_before + 1);
    context.begin_frame();
    assert_eq!(context.device().live_allocation_count(), live_before);
}

#[test]
fn test_context_shutdown_releases_everything() {
    let context = context(2);
    {
        let mut vertices = FrameBufferedResource::with_payload(&context, BufferKind::Vertex, &[1; 16]).unwrap();
        let _indices = FrameBufferedResource::new_static(&context, BufferKind::Index, &[0, 0, 1, 0, 2, 0]).unwrap();
        vertices.upload(&[3; 64]).unwrap();
        vertices.flush(0).unwrap();
    }
    context.shutdown().unwrap();

    let device = context.device();
    assert_eq!(device.live_allocation_count(), 0);
    assert_eq!(device.total_allocations(), device.total_frees());
    assert!(device.wait_idle().is_ok());
}
