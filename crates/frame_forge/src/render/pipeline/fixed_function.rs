//! Fixed-function pipeline state
//!
//! Backend-agnostic rasterization, blend, depth and viewport state. The values a
//! pipeline is built with are derived from its [`PipelineDescription`] flags and the
//! current render target extent, so a resize only has to re-run [`FixedFunctionState::derive`].

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::render::api::Extent2D;

use super::description::PipelineDescription;

/// Primitive assembly topology
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PrimitiveTopology {
    /// Independent points
    PointList,
    /// Independent line segments
    LineList,
    /// Connected line segments
    LineStrip,
    /// Independent triangles
    #[default]
    TriangleList,
    /// Connected triangles sharing an edge
    TriangleStrip,
    /// Triangles sharing the first vertex
    TriangleFan,
}

/// Polygon fill mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PolygonMode {
    /// Filled polygons
    #[default]
    Fill,
    /// Wireframe
    Line,
    /// Vertices only
    Point,
}

/// Face culling mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum CullMode {
    /// No culling
    None,
    /// Cull front faces
    #[default]
    Front,
    /// Cull back faces
    Back,
}

/// Winding order of front faces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum FrontFace {
    /// Counter-clockwise winding is front facing
    #[default]
    CounterClockwise,
    /// Clockwise winding is front facing
    Clockwise,
}

/// Blend factor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlendFactor {
    /// 0
    Zero,
    /// 1
    One,
    /// Source alpha
    SrcAlpha,
    /// 1 - source alpha
    OneMinusSrcAlpha,
}

/// Blend operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlendOp {
    /// src + dst
    Add,
}

/// Depth comparison
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompareOp {
    /// Pass when incoming depth is less than stored depth
    Less,
    /// Pass when incoming depth is less than or equal to stored depth
    LessOrEqual,
}

/// State that can be supplied at command recording time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DynamicState {
    /// Viewport rectangle
    Viewport,
    /// Scissor rectangle
    Scissor,
}

bitflags! {
    /// Color channels written by an attachment
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ColorComponents: u32 {
        /// Red
        const R = 1 << 0;
        /// Green
        const G = 1 << 1;
        /// Blue
        const B = 1 << 2;
        /// Alpha
        const A = 1 << 3;
        /// All four channels
        const RGBA = Self::R.bits() | Self::G.bits() | Self::B.bits() | Self::A.bits();
    }
}

/// Blend state of one color attachment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColorBlendAttachment {
    /// Whether blending is enabled
    pub blend_enable: bool,
    /// Source color factor
    pub src_color_factor: BlendFactor,
    /// Destination color factor
    pub dst_color_factor: BlendFactor,
    /// Color operation
    pub color_op: BlendOp,
    /// Source alpha factor
    pub src_alpha_factor: BlendFactor,
    /// Destination alpha factor
    pub dst_alpha_factor: BlendFactor,
    /// Alpha operation
    pub alpha_op: BlendOp,
    /// Channels written
    pub write_mask: ColorComponents,
}

impl ColorBlendAttachment {
    /// Straight alpha blending
    pub const fn alpha_blended() -> Self {
        Self {
            blend_enable: true,
            src_color_factor: BlendFactor::SrcAlpha,
            dst_color_factor: BlendFactor::OneMinusSrcAlpha,
            color_op: BlendOp::Add,
            src_alpha_factor: BlendFactor::OneMinusSrcAlpha,
            dst_alpha_factor: BlendFactor::Zero,
            alpha_op: BlendOp::Add,
            write_mask: ColorComponents::RGBA,
        }
    }

    /// Blending disabled, source replaces destination
    pub const fn opaque() -> Self {
        Self {
            blend_enable: false,
            src_color_factor: BlendFactor::One,
            dst_color_factor: BlendFactor::Zero,
            color_op: BlendOp::Add,
            src_alpha_factor: BlendFactor::One,
            dst_alpha_factor: BlendFactor::Zero,
            alpha_op: BlendOp::Add,
            write_mask: ColorComponents::RGBA,
        }
    }
}

/// Depth/stencil state
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DepthStencilState {
    /// Depth test enabled
    pub depth_test_enable: bool,
    /// Depth writes enabled
    pub depth_write_enable: bool,
    /// Comparison used by the depth test
    pub compare_op: CompareOp,
    /// Lower depth bound
    pub min_depth_bounds: f32,
    /// Upper depth bound
    pub max_depth_bounds: f32,
}

impl DepthStencilState {
    /// Depth test and write with `LESS`
    pub const fn enabled() -> Self {
        Self {
            depth_test_enable: true,
            depth_write_enable: true,
            compare_op: CompareOp::Less,
            min_depth_bounds: 0.0,
            max_depth_bounds: 1.0,
        }
    }

    /// No depth test and no depth write
    pub const fn permissive() -> Self {
        Self {
            depth_test_enable: false,
            depth_write_enable: false,
            compare_op: CompareOp::LessOrEqual,
            min_depth_bounds: 0.0,
            max_depth_bounds: 1.0,
        }
    }
}

/// Rasterizer configuration
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RasterizationState {
    /// Fill mode
    pub polygon_mode: PolygonMode,
    /// Culling
    pub cull_mode: CullMode,
    /// Front-face winding
    pub front_face: FrontFace,
    /// Line width for line primitives
    pub line_width: f32,
}

impl Default for RasterizationState {
    fn default() -> Self {
        Self {
            polygon_mode: PolygonMode::Fill,
            cull_mode: CullMode::Front,
            front_face: FrontFace::CounterClockwise,
            line_width: 1.0,
        }
    }
}

/// Viewport as fractions of the render target, offset in pixels
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewportRect {
    /// Horizontal offset in pixels
    pub x: f32,
    /// Vertical offset in pixels
    pub y: f32,
    /// Fraction of the target width covered
    pub width_fraction: f32,
    /// Fraction of the target height covered
    pub height_fraction: f32,
}

impl Default for ViewportRect {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            width_fraction: 1.0,
            height_fraction: 1.0,
        }
    }
}

/// Viewport in pixels
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    /// Left edge
    pub x: f32,
    /// Top edge
    pub y: f32,
    /// Width
    pub width: f32,
    /// Height
    pub height: f32,
    /// Near depth
    pub min_depth: f32,
    /// Far depth
    pub max_depth: f32,
}

/// Integer rectangle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rect2D {
    /// Left edge
    pub x: i32,
    /// Top edge
    pub y: i32,
    /// Width
    pub width: u32,
    /// Height
    pub height: u32,
}

/// Complete fixed-function state of a graphics pipeline
#[derive(Debug, Clone, PartialEq)]
pub struct FixedFunctionState {
    /// Input assembly topology
    pub topology: PrimitiveTopology,
    /// Static viewport (ignored by the device when viewport is dynamic)
    pub viewport: Viewport,
    /// Static scissor (ignored by the device when scissor is dynamic)
    pub scissor: Rect2D,
    /// Rasterizer configuration
    pub rasterization: RasterizationState,
    /// One entry per color attachment
    pub color_blend: Vec<ColorBlendAttachment>,
    /// Depth configuration
    pub depth_stencil: DepthStencilState,
    /// States left to command recording
    pub dynamic_states: Vec<DynamicState>,
}

impl FixedFunctionState {
    /// Derive state from description flags and the render target extent
    pub fn derive(description: &PipelineDescription, extent: Extent2D) -> Self {
        let rect = description.viewport;
        // Truncating float-to-pixel conversion; fractions are in 0..=1. A minimized target
        // still yields a 1x1 viewport since zero-sized static viewports are invalid.
        let width = ((extent.width as f32 * rect.width_fraction) as u32).max(1);
        let height = ((extent.height as f32 * rect.height_fraction) as u32).max(1);

        let viewport = Viewport {
            x: rect.x,
            y: rect.y,
            width: width as f32,
            height: height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        };
        let scissor = Rect2D {
            x: rect.x as i32,
            y: rect.y as i32,
            width,
            height,
        };

        let attachment = if description.blend_enable {
            ColorBlendAttachment::alpha_blended()
        } else {
            ColorBlendAttachment::opaque()
        };

        let depth_stencil = if description.depth_test_enable {
            DepthStencilState::enabled()
        } else {
            DepthStencilState::permissive()
        };

        let dynamic_states = if description.dynamic_state_enable {
            vec![DynamicState::Viewport, DynamicState::Scissor]
        } else {
            Vec::new()
        };

        Self {
            topology: description.topology,
            viewport,
            scissor,
            rasterization: description.rasterization,
            color_blend: vec![attachment; description.color_attachment_count as usize],
            depth_stencil,
            dynamic_states,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_blend_disabled_writes_all_channels() {
        let description = PipelineDescription::new().with_color_attachments(3);
        let state = FixedFunctionState::derive(&description, Extent2D::new(800, 600));

        assert_eq!(state.color_blend.len(), 3);
        for attachment in &state.color_blend {
            assert!(!attachment.blend_enable);
            assert_eq!(attachment.write_mask, ColorComponents::RGBA);
        }
    }

    #[test]
    fn test_blend_enabled_uses_alpha_factors() {
        let description = PipelineDescription::new().with_blending(true);
        let state = FixedFunctionState::derive(&description, Extent2D::new(800, 600));

        let attachment = state.color_blend[0];
        assert!(attachment.blend_enable);
        assert_eq!(attachment.src_color_factor, BlendFactor::SrcAlpha);
        assert_eq!(attachment.dst_color_factor, BlendFactor::OneMinusSrcAlpha);
    }

    #[test]
    fn test_depth_policy() {
        let enabled = FixedFunctionState::derive(
            &PipelineDescription::new().with_depth_test(true),
            Extent2D::new(1, 1),
        );
        assert!(enabled.depth_stencil.depth_test_enable);
        assert!(enabled.depth_stencil.depth_write_enable);
        assert_eq!(enabled.depth_stencil.compare_op, CompareOp::Less);

        let disabled = FixedFunctionState::derive(
            &PipelineDescription::new().with_depth_test(false),
            Extent2D::new(1, 1),
        );
        assert!(!disabled.depth_stencil.depth_test_enable);
        assert!(!disabled.depth_stencil.depth_write_enable);
        assert_eq!(disabled.depth_stencil.compare_op, CompareOp::LessOrEqual);
    }

    #[test]
    fn test_fractional_viewport() {
        let mut description = PipelineDescription::new();
        description.viewport = ViewportRect {
            x: 10.0,
            y: 20.0,
            width_fraction: 0.5,
            height_fraction: 0.25,
        };
        let state = FixedFunctionState::derive(&description, Extent2D::new(1920, 1080));

        assert_relative_eq!(state.viewport.width, 960.0);
        assert_relative_eq!(state.viewport.height, 270.0);
        assert_relative_eq!(state.viewport.max_depth, 1.0);
        assert_eq!(state.scissor, Rect2D { x: 10, y: 20, width: 960, height: 270 });
    }

    #[test]
    fn test_minimized_target_keeps_nonzero_viewport() {
        let description = PipelineDescription::new().with_dynamic_state(false);
        let state = FixedFunctionState::derive(&description, Extent2D::new(0, 0));

        assert_relative_eq!(state.viewport.width, 1.0);
        assert_relative_eq!(state.viewport.height, 1.0);
        assert_eq!((state.scissor.width, state.scissor.height), (1, 1));
    }

    #[test]
    fn test_dynamic_state_toggle() {
        let dynamic = FixedFunctionState::derive(
            &PipelineDescription::new().with_dynamic_state(true),
            Extent2D::new(1, 1),
        );
        assert_eq!(dynamic.dynamic_states, vec![DynamicState::Viewport, DynamicState::Scissor]);

        let fixed = FixedFunctionState::derive(
            &PipelineDescription::new().with_dynamic_state(false),
            Extent2D::new(1, 1),
        );
        assert!(fixed.dynamic_states.is_empty());
    }
}
