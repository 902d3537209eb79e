//! Render core
//!
//! - [`api`]: backend-agnostic types, the [`GpuDevice`](api::GpuDevice) trait and errors
//! - [`context`]: the device context shared by resources and pipelines
//! - [`resources`]: frame-buffered buffers, descriptor set layouts, deferred reclamation
//! - [`pipeline`]: pipeline descriptions and assembly
//! - [`backends`]: Vulkan and headless devices

pub mod api;
pub mod backends;
pub mod context;
pub mod pipeline;
pub mod resources;

#[cfg(test)]
mod tests;

pub use api::{GpuDevice, RenderError, RenderResult};
pub use context::GpuContext;
pub use pipeline::{Pipeline, PipelineDescription};
pub use resources::{BufferKind, DescriptorSetLayoutBuilder, FrameBufferedResource, UploadMode};
