//! Backend-agnostic descriptions shared by resources, layouts and pipelines

use bitflags::bitflags;

/// Programmable shader stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ShaderStage {
    /// Vertex shader
    Vertex,
    /// Tessellation control shader
    TessControl,
    /// Tessellation evaluation shader
    TessEval,
    /// Geometry shader
    Geometry,
    /// Fragment shader
    Fragment,
    /// Compute shader
    Compute,
}

impl ShaderStage {
    /// Stage mask containing only this stage
    pub const fn mask(self) -> StageMask {
        match self {
            Self::Vertex => StageMask::VERTEX,
            Self::TessControl => StageMask::TESS_CONTROL,
            Self::TessEval => StageMask::TESS_EVAL,
            Self::Geometry => StageMask::GEOMETRY,
            Self::Fragment => StageMask::FRAGMENT,
            Self::Compute => StageMask::COMPUTE,
        }
    }
}

bitflags! {
    /// Set of shader stages that can access a binding or push-constant range
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct StageMask: u32 {
        /// Vertex stage
        const VERTEX = 1 << 0;
        /// Tessellation control stage
        const TESS_CONTROL = 1 << 1;
        /// Tessellation evaluation stage
        const TESS_EVAL = 1 << 2;
        /// Geometry stage
        const GEOMETRY = 1 << 3;
        /// Fragment stage
        const FRAGMENT = 1 << 4;
        /// Compute stage
        const COMPUTE = 1 << 5;
    }
}

/// Kind of resource bound at a descriptor slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ResourceKind {
    /// Uniform buffer
    UniformBuffer,
    /// Sampled image (combined image sampler)
    SampledImage,
}

/// One resource binding declared by shader code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DescriptorBindingDescription {
    /// Descriptor set index
    pub set_index: u32,
    /// Binding index within the set
    pub binding_index: u32,
    /// Kind of resource expected at this slot
    pub resource_kind: ResourceKind,
    /// Stages that access the binding
    pub stage_mask: StageMask,
}

impl DescriptorBindingDescription {
    /// Uniform buffer binding
    pub const fn uniform_buffer(set_index: u32, binding_index: u32, stage_mask: StageMask) -> Self {
        Self {
            set_index,
            binding_index,
            resource_kind: ResourceKind::UniformBuffer,
            stage_mask,
        }
    }

    /// Sampled image binding
    pub const fn sampled_image(set_index: u32, binding_index: u32, stage_mask: StageMask) -> Self {
        Self {
            set_index,
            binding_index,
            resource_kind: ResourceKind::SampledImage,
            stage_mask,
        }
    }
}

/// Push-constant range visible to a set of stages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PushConstantRange {
    /// Byte offset of the range
    pub offset: u32,
    /// Size of the range in bytes
    pub size: u32,
    /// Stages that read the range
    pub stage_mask: StageMask,
}

/// Size of a render target in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Extent2D {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
}

impl Extent2D {
    /// Create an extent
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

/// Opaque render pass identity supplied by the render pass manager
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RenderPassHandle(pub u64);

/// Memory placement of a device allocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemoryKind {
    /// CPU-writable memory, coherent with the host
    HostVisible,
    /// Device-local memory, only reachable through device copies
    DeviceLocal,
}

bitflags! {
    /// How a buffer allocation is used by the device
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct BufferUsage: u32 {
        /// Vertex input source
        const VERTEX = 1 << 0;
        /// Index input source
        const INDEX = 1 << 1;
        /// Uniform buffer
        const UNIFORM = 1 << 2;
        /// Source of a device copy
        const TRANSFER_SRC = 1 << 3;
        /// Destination of a device copy
        const TRANSFER_DST = 1 << 4;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_masks_are_distinct() {
        let stages = [
            ShaderStage::Vertex,
            ShaderStage::TessControl,
            ShaderStage::TessEval,
            ShaderStage::Geometry,
            ShaderStage::Fragment,
            ShaderStage::Compute,
        ];
        let union = stages.iter().fold(StageMask::empty(), |acc, s| acc | s.mask());
        assert_eq!(union, StageMask::all());
        assert_eq!(union.bits().count_ones(), 6);
    }
}
