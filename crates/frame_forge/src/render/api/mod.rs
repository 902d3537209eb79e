//! Backend-agnostic rendering API
//!
//! Types shared by every part of the render core plus the [`GpuDevice`] trait that
//! backends implement.

pub mod device;
pub mod error;
pub mod types;

pub use device::{GpuDevice, GraphicsPipelineInfo};
pub use error::{RenderError, RenderResult};
pub use types::{
    BufferUsage, DescriptorBindingDescription, Extent2D, MemoryKind, PushConstantRange,
    RenderPassHandle, ResourceKind, ShaderStage, StageMask,
};
