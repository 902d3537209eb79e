//! Device interface consumed by the render core
//!
//! [`GpuDevice`] is the seam between the backend-agnostic resources and pipelines and
//! a concrete graphics device. One implementor is chosen per build (the Vulkan backend
//! in production, the headless backend in tests); there is no per-resource virtual
//! dispatch. Native objects are exposed as associated types so each backend keeps
//! its own handle representation.

use std::fmt;

use crate::render::pipeline::{FixedFunctionState, VertexInputState};

use super::error::{RenderError, RenderResult};
use super::types::{
    BufferUsage, DescriptorBindingDescription, MemoryKind, PushConstantRange, RenderPassHandle,
    ShaderStage,
};

/// Inputs for native graphics pipeline creation
pub struct GraphicsPipelineInfo<'a, D: GpuDevice + ?Sized> {
    /// Shader modules per stage, in pipeline stage order
    pub stages: &'a [(ShaderStage, D::ShaderModule)],
    /// Vertex bindings and attributes
    pub vertex_input: &'a VertexInputState,
    /// Rasterization, blend, depth and viewport state
    pub fixed_function: &'a FixedFunctionState,
    /// Pipeline layout the pipeline is created against
    pub layout: D::PipelineLayout,
    /// Compatible render pass
    pub render_pass: RenderPassHandle,
    /// Subpass index within the render pass
    pub subpass: u32,
}

/// A graphics device able to allocate memory and build pipeline objects
///
/// All methods are called from the render thread. Destruction methods must only be
/// called once the device no longer uses the object; the render core guarantees this
/// for allocations through the resource reclaimer.
pub trait GpuDevice {
    /// Buffer plus backing memory
    type Allocation: fmt::Debug;
    /// Native descriptor set layout
    type DescriptorSetLayout: Copy + fmt::Debug + PartialEq;
    /// Native pipeline layout
    type PipelineLayout: Copy + fmt::Debug + PartialEq;
    /// Native pipeline
    type Pipeline: Copy + fmt::Debug + PartialEq;
    /// Native shader module
    type ShaderModule: Copy + fmt::Debug;

    /// Allocate a buffer of `size` bytes
    fn allocate(&self, size: u64, memory: MemoryKind, usage: BufferUsage) -> RenderResult<Self::Allocation>;

    /// Release a buffer and its memory
    fn free(&self, allocation: Self::Allocation);

    /// Map a host-visible allocation for CPU access
    fn map<'a>(&self, allocation: &'a mut Self::Allocation) -> RenderResult<&'a mut [u8]>;

    /// Unmap a previously mapped allocation
    fn unmap(&self, allocation: &mut Self::Allocation);

    /// Make host writes to a mapped allocation visible to the device
    fn flush(&self, allocation: &Self::Allocation) -> RenderResult<()>;

    /// Copy `size` bytes from `src` to `dst` on the device
    fn copy_device_to_device(
        &self,
        src: &Self::Allocation,
        dst: &mut Self::Allocation,
        size: u64,
    ) -> RenderResult<()>;

    /// Create a descriptor set layout from bindings of a single set
    fn create_descriptor_set_layout(
        &self,
        bindings: &[DescriptorBindingDescription],
    ) -> RenderResult<Self::DescriptorSetLayout>;

    /// Destroy a descriptor set layout
    fn destroy_descriptor_set_layout(&self, layout: Self::DescriptorSetLayout);

    /// Create a pipeline layout
    fn create_pipeline_layout(
        &self,
        set_layouts: &[Self::DescriptorSetLayout],
        push_constants: &[PushConstantRange],
    ) -> RenderResult<Self::PipelineLayout>;

    /// Destroy a pipeline layout
    fn destroy_pipeline_layout(&self, layout: Self::PipelineLayout);

    /// Create a shader module from stage bytecode
    fn create_shader_module(&self, bytecode: &[u8]) -> RenderResult<Self::ShaderModule>;

    /// Destroy a shader module
    fn destroy_shader_module(&self, module: Self::ShaderModule);

    /// Create a graphics pipeline
    fn create_graphics_pipeline(&self, info: &GraphicsPipelineInfo<'_, Self>) -> RenderResult<Self::Pipeline>;

    /// Create a compute pipeline
    fn create_compute_pipeline(
        &self,
        layout: Self::PipelineLayout,
        module: Self::ShaderModule,
    ) -> RenderResult<Self::Pipeline>;

    /// Destroy a pipeline
    fn destroy_pipeline(&self, pipeline: Self::Pipeline);

    /// Block until the device has finished all submitted work
    fn wait_idle(&self) -> RenderResult<()>;

    /// Map, copy `bytes` at `offset`, flush and unmap
    fn write(&self, allocation: &mut Self::Allocation, offset: usize, bytes: &[u8]) -> RenderResult<()> {
        let copied = {
            let mapped = self.map(allocation)?;
            let capacity = mapped.len();
            let target = offset
                .checked_add(bytes.len())
                .and_then(|end| mapped.get_mut(offset..end));
            match target {
                Some(target) => {
                    target.copy_from_slice(bytes);
                    Ok(())
                }
                None => Err(RenderError::invalid_usage(format!(
                    "write of {} bytes at offset {offset} exceeds allocation of {capacity} bytes",
                    bytes.len()
                ))),
            }
        };
        let result = copied.and_then(|()| self.flush(allocation));
        self.unmap(allocation);
        result
    }
}
