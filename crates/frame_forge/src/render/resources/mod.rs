//! GPU resources: frame-buffered buffers, descriptor set layouts and deferred reclamation

pub mod descriptor_layout;
pub mod frame_buffered;
pub mod reclaimer;

pub use descriptor_layout::{
    descriptor_pool_sizes, DescriptorPoolSize, DescriptorSetLayout, DescriptorSetLayoutBuilder,
};
pub use frame_buffered::{BufferKind, FrameBufferedResource, UploadMode};
pub use reclaimer::ResourceReclaimer;
