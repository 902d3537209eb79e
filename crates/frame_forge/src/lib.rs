//! # Frame Forge
//!
//! GPU resource and pipeline construction layer for an explicit graphics API.
//!
//! ## Features
//!
//! - **Frame-buffered resources**: one device allocation per frame in flight with
//!   per-slot dirty tracking, so CPU writes never race an in-flight GPU read
//! - **Descriptor set layouts**: binding declarations merged across shader stages
//! - **Pipeline assembly**: vertex input, fixed-function state and layouts combined
//!   into one pipeline, rebuilt cheaply on render target resize
//! - **Deferred reclamation**: superseded allocations freed once no frame can use them
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use frame_forge::prelude::*;
//!
//! let context = Arc::new(GpuContext::new(HeadlessDevice::new(), &GpuCoreConfig::default())?);
//!
//! let mut uniforms = FrameBufferedResource::new_dynamic(&context, BufferKind::Uniform);
//! uniforms.upload(&[0u8; 64])?;
//! uniforms.upload(&[1u8; 64])?;
//!
//! for _ in 0..context.frames_in_flight() {
//!     let slot = context.begin_frame();
//!     uniforms.flush(slot)?;
//! }
//! assert!(!uniforms.is_dirty());
//! # Ok::<(), RenderError>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions, clippy::similar_names, clippy::too_many_arguments)]

pub mod config;
pub mod foundation;
pub mod render;

/// Common imports for crate users
pub mod prelude {
    pub use crate::config::{Config, ConfigError, GpuCoreConfig, MAX_FRAMES_IN_FLIGHT};
    pub use crate::render::api::{
        DescriptorBindingDescription, Extent2D, GpuDevice, PushConstantRange, RenderError, RenderPassHandle,
        RenderResult, ResourceKind, ShaderStage, StageMask,
    };
    pub use crate::render::backends::headless::HeadlessDevice;
    #[cfg(feature = "vulkan")]
    pub use crate::render::backends::vulkan::VulkanDevice;
    pub use crate::render::context::GpuContext;
    #[cfg(feature = "spirv-reflect")]
    pub use crate::render::pipeline::SpirvReflector;
    pub use crate::render::pipeline::{
        Pipeline, PipelineDescription, ShaderReflector, StageReflection, StaticReflector, VertexFormat,
        VertexInputRate, VertexLayout,
    };
    pub use crate::render::resources::{
        BufferKind, DescriptorSetLayout, DescriptorSetLayoutBuilder, FrameBufferedResource, UploadMode,
    };
}
