//! Device backends implementing [`GpuDevice`](crate::render::api::GpuDevice)

pub mod headless;
#[cfg(feature = "vulkan")]
pub mod vulkan;
