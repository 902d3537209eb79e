//! Pipeline construction
//!
//! A [`PipelineDescription`] names the stage bytecode, vertex layout and fixed-function
//! flags; [`Pipeline::create`] reflects the stages, merges their descriptor and
//! push-constant declarations and creates the native objects.

pub mod assembler;
pub mod description;
pub mod fixed_function;
pub mod reflection;
pub mod vertex_input;

pub use assembler::{merge_push_constants, Pipeline};
pub use description::PipelineDescription;
pub use fixed_function::{
    BlendFactor, BlendOp, ColorBlendAttachment, ColorComponents, CompareOp, CullMode, DepthStencilState,
    DynamicState, FixedFunctionState, FrontFace, PolygonMode, PrimitiveTopology, RasterizationState, Rect2D,
    Viewport, ViewportRect,
};
#[cfg(feature = "spirv-reflect")]
pub use reflection::SpirvReflector;
pub use reflection::{ShaderReflector, StageReflection, StaticReflector};
pub use vertex_input::{
    VertexAttributeDescription, VertexBinding, VertexBindingDescription, VertexFormat, VertexInputRate,
    VertexInputState, VertexLayout,
};
