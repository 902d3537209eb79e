//! Pipeline description consumed by the assembler

use std::collections::BTreeMap;

use crate::render::api::{RenderError, RenderPassHandle, RenderResult, ShaderStage};

use super::fixed_function::{PrimitiveTopology, RasterizationState, ViewportRect};
use super::vertex_input::VertexLayout;

/// Everything needed to build a [`Pipeline`](super::Pipeline)
///
/// Stage bytecode is opaque (typically SPIR-V); it is handed to the reflector and to
/// the device untouched.
#[derive(Debug, Clone)]
pub struct PipelineDescription {
    /// Compiled bytecode per stage
    pub stage_bytecode: BTreeMap<ShaderStage, Vec<u8>>,
    /// Vertex buffer layout
    pub vertex_layout: VertexLayout,
    /// Primitive topology
    pub topology: PrimitiveTopology,
    /// Viewport relative to the render target
    pub viewport: ViewportRect,
    /// Alpha blending on every color attachment
    pub blend_enable: bool,
    /// Depth test and write
    pub depth_test_enable: bool,
    /// Viewport and scissor supplied at record time
    pub dynamic_state_enable: bool,
    /// Number of color attachments written by the fragment stage
    pub color_attachment_count: u32,
    /// Render pass the pipeline is compatible with (graphics only)
    pub render_pass: Option<RenderPassHandle>,
    /// Rasterizer configuration
    pub rasterization: RasterizationState,
}

impl Default for PipelineDescription {
    fn default() -> Self {
        Self {
            stage_bytecode: BTreeMap::new(),
            vertex_layout: VertexLayout::new(),
            topology: PrimitiveTopology::TriangleList,
            viewport: ViewportRect::default(),
            blend_enable: false,
            depth_test_enable: true,
            dynamic_state_enable: true,
            color_attachment_count: 1,
            render_pass: None,
            rasterization: RasterizationState::default(),
        }
    }
}

impl PipelineDescription {
    /// Create a description with default fixed-function state and no stages
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace the bytecode of one stage
    #[must_use]
    pub fn with_stage(mut self, stage: ShaderStage, bytecode: impl Into<Vec<u8>>) -> Self {
        self.stage_bytecode.insert(stage, bytecode.into());
        self
    }

    /// Set the vertex layout
    #[must_use]
    pub fn with_vertex_layout(mut self, layout: VertexLayout) -> Self {
        self.vertex_layout = layout;
        self
    }

    /// Set the primitive topology
    #[must_use]
    pub fn with_topology(mut self, topology: PrimitiveTopology) -> Self {
        self.topology = topology;
        self
    }

    /// Set the fractional viewport
    #[must_use]
    pub fn with_viewport(mut self, viewport: ViewportRect) -> Self {
        self.viewport = viewport;
        self
    }

    /// Toggle alpha blending
    #[must_use]
    pub fn with_blending(mut self, enable: bool) -> Self {
        self.blend_enable = enable;
        self
    }

    /// Toggle depth test and write
    #[must_use]
    pub fn with_depth_test(mut self, enable: bool) -> Self {
        self.depth_test_enable = enable;
        self
    }

    /// Toggle dynamic viewport and scissor
    #[must_use]
    pub fn with_dynamic_state(mut self, enable: bool) -> Self {
        self.dynamic_state_enable = enable;
        self
    }

    /// Set the number of color attachments
    #[must_use]
    pub fn with_color_attachments(mut self, count: u32) -> Self {
        self.color_attachment_count = count;
        self
    }

    /// Set the render pass
    #[must_use]
    pub fn with_render_pass(mut self, render_pass: RenderPassHandle) -> Self {
        self.render_pass = Some(render_pass);
        self
    }

    /// Set the rasterizer configuration
    #[must_use]
    pub fn with_rasterization(mut self, rasterization: RasterizationState) -> Self {
        self.rasterization = rasterization;
        self
    }

    /// True when the only stage is a compute stage
    pub fn is_compute(&self) -> bool {
        self.stage_bytecode.len() == 1 && self.stage_bytecode.contains_key(&ShaderStage::Compute)
    }

    /// Check stage combination and render pass requirements
    pub fn validate(&self) -> RenderResult<()> {
        if self.stage_bytecode.is_empty() {
            return Err(RenderError::invalid_usage("pipeline description has no shader stages"));
        }
        if self.is_compute() {
            return Ok(());
        }
        if self.stage_bytecode.contains_key(&ShaderStage::Compute) {
            return Err(RenderError::invalid_usage(
                "compute shaders are not allowed on a graphics pipeline",
            ));
        }
        if !self.stage_bytecode.contains_key(&ShaderStage::Vertex) {
            return Err(RenderError::invalid_usage("graphics pipeline requires a vertex stage"));
        }
        if self.render_pass.is_none() {
            return Err(RenderError::invalid_usage("graphics pipeline requires a render pass"));
        }
        Ok(())
    }
}
