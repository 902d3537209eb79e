//! Conversions from backend-agnostic state to Vulkan enums and flags

use ash::vk;

use crate::render::api::{
    BufferUsage, DescriptorBindingDescription, MemoryKind, PushConstantRange, ResourceKind, ShaderStage,
    StageMask,
};
use crate::render::pipeline::{
    BlendFactor, BlendOp, ColorBlendAttachment, ColorComponents, CompareOp, CullMode, DynamicState, FrontFace,
    PolygonMode, PrimitiveTopology, Rect2D, VertexAttributeDescription, VertexBindingDescription, VertexFormat,
    VertexInputRate, Viewport,
};

pub fn shader_stage(stage: ShaderStage) -> vk::ShaderStageFlags {
    match stage {
        ShaderStage::Vertex => vk::ShaderStageFlags::VERTEX,
        ShaderStage::TessControl => vk::ShaderStageFlags::TESSELLATION_CONTROL,
        ShaderStage::TessEval => vk::ShaderStageFlags::TESSELLATION_EVALUATION,
        ShaderStage::Geometry => vk::ShaderStageFlags::GEOMETRY,
        ShaderStage::Fragment => vk::ShaderStageFlags::FRAGMENT,
        ShaderStage::Compute => vk::ShaderStageFlags::COMPUTE,
    }
}

pub fn stage_flags(mask: StageMask) -> vk::ShaderStageFlags {
    [
        (StageMask::VERTEX, ShaderStage::Vertex),
        (StageMask::TESS_CONTROL, ShaderStage::TessControl),
        (StageMask::TESS_EVAL, ShaderStage::TessEval),
        (StageMask::GEOMETRY, ShaderStage::Geometry),
        (StageMask::FRAGMENT, ShaderStage::Fragment),
        (StageMask::COMPUTE, ShaderStage::Compute),
    ]
    .into_iter()
    .filter(|(bit, _)| mask.contains(*bit))
    .fold(vk::ShaderStageFlags::empty(), |flags, (_, stage)| flags | shader_stage(stage))
}

pub const fn descriptor_type(kind: ResourceKind) -> vk::DescriptorType {
    match kind {
        ResourceKind::UniformBuffer => vk::DescriptorType::UNIFORM_BUFFER,
        ResourceKind::SampledImage => vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
    }
}

pub fn set_layout_binding(binding: &DescriptorBindingDescription) -> vk::DescriptorSetLayoutBinding {
    vk::DescriptorSetLayoutBinding::builder()
        .binding(binding.binding_index)
        .descriptor_type(descriptor_type(binding.resource_kind))
        .descriptor_count(1)
        .stage_flags(stage_flags(binding.stage_mask))
        .build()
}

pub fn push_constant_range(range: &PushConstantRange) -> vk::PushConstantRange {
    vk::PushConstantRange {
        stage_flags: stage_flags(range.stage_mask),
        offset: range.offset,
        size: range.size,
    }
}

pub fn buffer_usage(usage: BufferUsage) -> vk::BufferUsageFlags {
    let mut flags = vk::BufferUsageFlags::empty();
    if usage.contains(BufferUsage::VERTEX) {
        flags |= vk::BufferUsageFlags::VERTEX_BUFFER;
    }
    if usage.contains(BufferUsage::INDEX) {
        flags |= vk::BufferUsageFlags::INDEX_BUFFER;
    }
    if usage.contains(BufferUsage::UNIFORM) {
        flags |= vk::BufferUsageFlags::UNIFORM_BUFFER;
    }
    if usage.contains(BufferUsage::TRANSFER_SRC) {
        flags |= vk::BufferUsageFlags::TRANSFER_SRC;
    }
    if usage.contains(BufferUsage::TRANSFER_DST) {
        flags |= vk::BufferUsageFlags::TRANSFER_DST;
    }
    flags
}

pub fn memory_properties(memory: MemoryKind) -> vk::MemoryPropertyFlags {
    match memory {
        MemoryKind::HostVisible => vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        MemoryKind::DeviceLocal => vk::MemoryPropertyFlags::DEVICE_LOCAL,
    }
}

pub const fn vertex_format(format: VertexFormat) -> vk::Format {
    match format {
        VertexFormat::Float => vk::Format::R32_SFLOAT,
        VertexFormat::Float2 => vk::Format::R32G32_SFLOAT,
        VertexFormat::Float3 => vk::Format::R32G32B32_SFLOAT,
        VertexFormat::Float4 => vk::Format::R32G32B32A32_SFLOAT,
        VertexFormat::Int => vk::Format::R32_SINT,
        VertexFormat::Int2 => vk::Format::R32G32_SINT,
        VertexFormat::Int3 => vk::Format::R32G32B32_SINT,
        VertexFormat::Int4 => vk::Format::R32G32B32A32_SINT,
        VertexFormat::UInt => vk::Format::R32_UINT,
        VertexFormat::UInt2 => vk::Format::R32G32_UINT,
        VertexFormat::UInt3 => vk::Format::R32G32B32_UINT,
        VertexFormat::UInt4 => vk::Format::R32G32B32A32_UINT,
        VertexFormat::Unorm4x8 => vk::Format::R8G8B8A8_UNORM,
    }
}

pub fn vertex_binding(binding: &VertexBindingDescription) -> vk::VertexInputBindingDescription {
    vk::VertexInputBindingDescription {
        binding: binding.binding,
        stride: binding.stride,
        input_rate: match binding.input_rate {
            VertexInputRate::Vertex => vk::VertexInputRate::VERTEX,
            VertexInputRate::Instance => vk::VertexInputRate::INSTANCE,
        },
    }
}

pub fn vertex_attribute(attribute: &VertexAttributeDescription) -> vk::VertexInputAttributeDescription {
    vk::VertexInputAttributeDescription {
        location: attribute.location,
        binding: attribute.binding,
        format: vertex_format(attribute.format),
        offset: attribute.offset,
    }
}

pub const fn topology(topology: PrimitiveTopology) -> vk::PrimitiveTopology {
    match topology {
        PrimitiveTopology::PointList => vk::PrimitiveTopology::POINT_LIST,
        PrimitiveTopology::LineList => vk::PrimitiveTopology::LINE_LIST,
        PrimitiveTopology::LineStrip => vk::PrimitiveTopology::LINE_STRIP,
        PrimitiveTopology::TriangleList => vk::PrimitiveTopology::TRIANGLE_LIST,
        PrimitiveTopology::TriangleStrip => vk::PrimitiveTopology::TRIANGLE_STRIP,
        PrimitiveTopology::TriangleFan => vk::PrimitiveTopology::TRIANGLE_FAN,
    }
}

pub const fn polygon_mode(mode: PolygonMode) -> vk::PolygonMode {
    match mode {
        PolygonMode::Fill => vk::PolygonMode::FILL,
        PolygonMode::Line => vk::PolygonMode::LINE,
        PolygonMode::Point => vk::PolygonMode::POINT,
    }
}

pub const fn cull_mode(mode: CullMode) -> vk::CullModeFlags {
    match mode {
        CullMode::None => vk::CullModeFlags::NONE,
        CullMode::Front => vk::CullModeFlags::FRONT,
        CullMode::Back => vk::CullModeFlags::BACK,
    }
}

pub const fn front_face(face: FrontFace) -> vk::FrontFace {
    match face {
        FrontFace::CounterClockwise => vk::FrontFace::COUNTER_CLOCKWISE,
        FrontFace::Clockwise => vk::FrontFace::CLOCKWISE,
    }
}

const fn blend_factor(factor: BlendFactor) -> vk::BlendFactor {
    match factor {
        BlendFactor::Zero => vk::BlendFactor::ZERO,
        BlendFactor::One => vk::BlendFactor::ONE,
        BlendFactor::SrcAlpha => vk::BlendFactor::SRC_ALPHA,
        BlendFactor::OneMinusSrcAlpha => vk::BlendFactor::ONE_MINUS_SRC_ALPHA,
    }
}

const fn blend_op(op: BlendOp) -> vk::BlendOp {
    match op {
        BlendOp::Add => vk::BlendOp::ADD,
    }
}

fn color_components(components: ColorComponents) -> vk::ColorComponentFlags {
    let mut flags = vk::ColorComponentFlags::empty();
    if components.contains(ColorComponents::R) {
        flags |= vk::ColorComponentFlags::R;
    }
    if components.contains(ColorComponents::G) {
        flags |= vk::ColorComponentFlags::G;
    }
    if components.contains(ColorComponents::B) {
        flags |= vk::ColorComponentFlags::B;
    }
    if components.contains(ColorComponents::A) {
        flags |= vk::ColorComponentFlags::A;
    }
    flags
}

pub fn color_blend_attachment(attachment: &ColorBlendAttachment) -> vk::PipelineColorBlendAttachmentState {
    vk::PipelineColorBlendAttachmentState::builder()
        .blend_enable(attachment.blend_enable)
        .src_color_blend_factor(blend_factor(attachment.src_color_factor))
        .dst_color_blend_factor(blend_factor(attachment.dst_color_factor))
        .color_blend_op(blend_op(attachment.color_op))
        .src_alpha_blend_factor(blend_factor(attachment.src_alpha_factor))
        .dst_alpha_blend_factor(blend_factor(attachment.dst_alpha_factor))
        .alpha_blend_op(blend_op(attachment.alpha_op))
        .color_write_mask(color_components(attachment.write_mask))
        .build()
}

pub const fn compare_op(op: CompareOp) -> vk::CompareOp {
    match op {
        CompareOp::Less => vk::CompareOp::LESS,
        CompareOp::LessOrEqual => vk::CompareOp::LESS_OR_EQUAL,
    }
}

pub const fn dynamic_state(state: DynamicState) -> vk::DynamicState {
    match state {
        DynamicState::Viewport => vk::DynamicState::VIEWPORT,
        DynamicState::Scissor => vk::DynamicState::SCISSOR,
    }
}

pub const fn viewport(viewport: &Viewport) -> vk::Viewport {
    vk::Viewport {
        x: viewport.x,
        y: viewport.y,
        width: viewport.width,
        height: viewport.height,
        min_depth: viewport.min_depth,
        max_depth: viewport.max_depth,
    }
}

pub const fn scissor(rect: &Rect2D) -> vk::Rect2D {
    vk::Rect2D {
        offset: vk::Offset2D { x: rect.x, y: rect.y },
        extent: vk::Extent2D {
            width: rect.width,
            height: rect.height,
        },
    }
}
