//! Pipeline assembly
//!
//! [`Pipeline`] turns a [`PipelineDescription`] into native objects: descriptor set
//! layouts merged across stages, a pipeline layout, and the pipeline itself. The
//! native pipeline can be destroyed and recreated (render target resize) while the
//! layouts are kept; everything is released when the `Pipeline` is dropped.
//!
//! Every intermediate object is owned by a guard, so a failure at any step releases
//! what was created before it.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::render::api::{
    Extent2D, GpuDevice, GraphicsPipelineInfo, PushConstantRange, RenderError, RenderPassHandle, RenderResult,
    ShaderStage,
};
use crate::render::context::GpuContext;
use crate::render::resources::{DescriptorSetLayout, DescriptorSetLayoutBuilder};

use super::description::PipelineDescription;
use super::fixed_function::FixedFunctionState;
use super::reflection::ShaderReflector;
use super::vertex_input::VertexInputState;

/// Shader module released when the guard goes out of scope
struct ShaderModuleGuard<'a, D: GpuDevice> {
    device: &'a D,
    module: D::ShaderModule,
}

impl<'a, D: GpuDevice> ShaderModuleGuard<'a, D> {
    fn new(device: &'a D, stage: ShaderStage, bytecode: &[u8]) -> RenderResult<Self> {
        let module = device.create_shader_module(bytecode).map_err(|e| {
            log::error!("[SHADER] Failed to create {:?} module: {}", stage, e);
            e
        })?;
        Ok(Self { device, module })
    }
}

impl<D: GpuDevice> Drop for ShaderModuleGuard<'_, D> {
    fn drop(&mut self) {
        self.device.destroy_shader_module(self.module);
    }
}

/// Pipeline layout with automatic cleanup
struct OwnedPipelineLayout<D: GpuDevice> {
    context: Arc<GpuContext<D>>,
    handle: D::PipelineLayout,
}

impl<D: GpuDevice> Drop for OwnedPipelineLayout<D> {
    fn drop(&mut self) {
        self.context.device().destroy_pipeline_layout(self.handle);
    }
}

/// Merge push-constant ranges declared at the same offset
///
/// Ranges sharing an offset collapse into one whose size is the largest declared and
/// whose stage mask is the union. The result is ordered by offset.
pub fn merge_push_constants(ranges: &[PushConstantRange]) -> Vec<PushConstantRange> {
    let mut merged: BTreeMap<u32, PushConstantRange> = BTreeMap::new();
    for range in ranges {
        merged
            .entry(range.offset)
            .and_modify(|existing| {
                existing.size = existing.size.max(range.size);
                existing.stage_mask |= range.stage_mask;
            })
            .or_insert(*range);
    }
    merged.into_values().collect()
}

/// Graphics or compute pipeline with its layouts
///
/// BUILT while a native pipeline exists, UNBUILT after [`Pipeline::cleanup_pipeline`].
pub struct Pipeline<D: GpuDevice> {
    context: Arc<GpuContext<D>>,
    description: PipelineDescription,
    handle: Option<D::Pipeline>,
    layout: OwnedPipelineLayout<D>,
    set_layouts: Vec<DescriptorSetLayout<D>>,
    push_constants: Vec<PushConstantRange>,
    vertex_input: VertexInputState,
    fixed_function: Option<FixedFunctionState>,
    extent: Extent2D,
}

impl<D: GpuDevice> Pipeline<D> {
    /// Build a pipeline for a render target of size `extent`
    pub fn create(
        context: &Arc<GpuContext<D>>,
        description: PipelineDescription,
        reflector: &dyn ShaderReflector,
        extent: Extent2D,
    ) -> RenderResult<Self> {
        description.validate()?;

        let vertex_input = if description.is_compute() {
            VertexInputState::default()
        } else {
            VertexInputState::from_layout(&description.vertex_layout)
        };

        let mut stage_bindings = Vec::with_capacity(description.stage_bytecode.len());
        let mut ranges = Vec::new();
        for (&stage, bytecode) in &description.stage_bytecode {
            let reflection = reflector.reflect(stage, bytecode)?;
            stage_bindings.push((stage, reflection.bindings));
            ranges.extend(reflection.push_constants);
        }

        let mut builder = DescriptorSetLayoutBuilder::new();
        builder.merge(&stage_bindings)?;
        let set_layouts = builder.build_layouts(context)?;
        let push_constants = merge_push_constants(&ranges);

        let set_layout_handles: Vec<D::DescriptorSetLayout> =
            set_layouts.iter().map(DescriptorSetLayout::handle).collect();
        let handle = context
            .device()
            .create_pipeline_layout(&set_layout_handles, &push_constants)
            .map_err(|e| {
                log::error!("[PIPELINE] Failed to create pipeline layout: {}", e);
                e
            })?;
        let layout = OwnedPipelineLayout {
            context: Arc::clone(context),
            handle,
        };

        let mut pipeline = Self {
            context: Arc::clone(context),
            description,
            handle: None,
            layout,
            set_layouts,
            push_constants,
            vertex_input,
            fixed_function: None,
            extent,
        };
        pipeline.build(extent)?;
        Ok(pipeline)
    }

    /// Create the native pipeline against the existing layouts
    fn build(&mut self, extent: Extent2D) -> RenderResult<()> {
        let device = self.context.device();
        let modules = self
            .description
            .stage_bytecode
            .iter()
            .map(|(&stage, bytecode)| ShaderModuleGuard::new(device, stage, bytecode).map(|guard| (stage, guard)))
            .collect::<RenderResult<Vec<_>>>()?;

        let (handle, fixed_function) = if self.description.is_compute() {
            let module = modules
                .first()
                .map(|(_, guard)| guard.module)
                .ok_or_else(|| RenderError::invalid_usage("compute pipeline without a module"))?;
            (device.create_compute_pipeline(self.layout.handle, module)?, None)
        } else {
            let render_pass = self
                .description
                .render_pass
                .ok_or_else(|| RenderError::invalid_usage("graphics pipeline requires a render pass"))?;
            let fixed_function = FixedFunctionState::derive(&self.description, extent);
            let stages: Vec<(ShaderStage, D::ShaderModule)> =
                modules.iter().map(|(stage, guard)| (*stage, guard.module)).collect();
            let info = GraphicsPipelineInfo::<D> {
                stages: &stages,
                vertex_input: &self.vertex_input,
                fixed_function: &fixed_function,
                layout: self.layout.handle,
                render_pass,
                subpass: 0,
            };
            (device.create_graphics_pipeline(&info)?, Some(fixed_function))
        };
        // Shader modules are released here; the pipeline no longer needs them.
        drop(modules);

        self.handle = Some(handle);
        self.fixed_function = fixed_function;
        self.extent = extent;
        log::info!(
            "[PIPELINE] Built {} pipeline: {} stage(s), {} set layout(s), {}x{}",
            if self.description.is_compute() { "compute" } else { "graphics" },
            self.description.stage_bytecode.len(),
            self.set_layouts.len(),
            extent.width,
            extent.height
        );
        Ok(())
    }

    /// Destroy the native pipeline, keeping layouts for a later rebuild
    ///
    /// Calling this on an UNBUILT pipeline does nothing.
    pub fn cleanup_pipeline(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.context.device().destroy_pipeline(handle);
            log::debug!("[PIPELINE] Destroyed native pipeline");
        }
    }

    /// Recreate the native pipeline for a new render target size
    ///
    /// Waits for the device to finish with the current pipeline first. On failure the
    /// pipeline is left UNBUILT with its layouts intact.
    pub fn rebuild(&mut self, extent: Extent2D) -> RenderResult<()> {
        self.context.device().wait_idle()?;
        self.cleanup_pipeline();
        self.build(extent)
    }

    /// Recreate the native pipeline for a render target whose attachments changed
    ///
    /// The render pass and color attachment count are replaced in the description;
    /// descriptor set layouts and the pipeline layout are kept.
    pub fn rebuild_for_target(
        &mut self,
        extent: Extent2D,
        render_pass: RenderPassHandle,
        color_attachment_count: u32,
    ) -> RenderResult<()> {
        if self.description.is_compute() {
            return Err(RenderError::invalid_usage("compute pipelines have no render target"));
        }
        self.description.render_pass = Some(render_pass);
        self.description.color_attachment_count = color_attachment_count;
        log::debug!(
            "[PIPELINE] Retargeting to render pass {:?} with {} color attachment(s)",
            render_pass,
            color_attachment_count
        );
        self.rebuild(extent)
    }

    /// Whether a native pipeline currently exists
    pub const fn is_built(&self) -> bool {
        self.handle.is_some()
    }

    /// Native pipeline handle while BUILT
    pub const fn handle(&self) -> Option<D::Pipeline> {
        self.handle
    }

    /// Native pipeline layout handle
    pub const fn layout(&self) -> D::PipelineLayout {
        self.layout.handle
    }

    /// Descriptor set layouts in ascending set order
    pub fn set_layouts(&self) -> &[DescriptorSetLayout<D>] {
        &self.set_layouts
    }

    /// Layout of set `index`
    pub fn set_layout(&self, index: usize) -> Option<&DescriptorSetLayout<D>> {
        self.set_layouts.get(index)
    }

    /// Merged push-constant ranges
    pub fn push_constant_ranges(&self) -> &[PushConstantRange] {
        &self.push_constants
    }

    /// Vertex input state (empty for compute pipelines)
    pub const fn vertex_input(&self) -> &VertexInputState {
        &self.vertex_input
    }

    /// Fixed-function state of the last build (`None` for compute pipelines)
    pub const fn fixed_function(&self) -> Option<&FixedFunctionState> {
        self.fixed_function.as_ref()
    }

    /// Description the pipeline was built from
    pub const fn description(&self) -> &PipelineDescription {
        &self.description
    }

    /// Render target size of the last build
    pub const fn extent(&self) -> Extent2D {
        self.extent
    }

    /// Whether this is a compute pipeline
    pub fn is_compute(&self) -> bool {
        self.description.is_compute()
    }
}

impl<D: GpuDevice> Drop for Pipeline<D> {
    fn drop(&mut self) {
        self.cleanup_pipeline();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::api::{DescriptorBindingDescription, StageMask};
    use crate::render::backends::headless::HeadlessDevice;
    use crate::render::pipeline::reflection::{StageReflection, StaticReflector};
    use crate::render::pipeline::vertex_input::{VertexFormat, VertexInputRate, VertexLayout};

    fn context() -> Arc<GpuContext<HeadlessDevice>> {
        Arc::new(GpuContext::with_frames_in_flight(HeadlessDevice::new(), 2).unwrap())
    }

    fn graphics_description() -> PipelineDescription {
        PipelineDescription::new()
            .with_stage(ShaderStage::Vertex, vec![0u8; 4])
            .with_stage(ShaderStage::Fragment, vec![0u8; 4])
            .with_vertex_layout(
                VertexLayout::new().with_binding(VertexInputRate::Vertex, &[VertexFormat::Float3, VertexFormat::Float2]),
            )
            .with_render_pass(RenderPassHandle(1))
    }

    fn reflector() -> StaticReflector {
        StaticReflector::new()
            .with_stage(
                ShaderStage::Vertex,
                StageReflection::new()
                    .with_binding(DescriptorBindingDescription::uniform_buffer(0, 0, StageMask::VERTEX))
                    .with_push_constant(PushConstantRange { offset: 0, size: 64, stage_mask: StageMask::VERTEX }),
            )
            .with_stage(
                ShaderStage::Fragment,
                StageReflection::new()
                    .with_binding(DescriptorBindingDescription::sampled_image(0, 1, StageMask::FRAGMENT))
                    .with_push_constant(PushConstantRange { offset: 0, size: 16, stage_mask: StageMask::FRAGMENT }),
            )
    }

    fn assert_nothing_alive(device: &HeadlessDevice) {
        assert_eq!(device.live_set_layout_count(), 0);
        assert_eq!(device.live_pipeline_layout_count(), 0);
        assert_eq!(device.live_shader_module_count(), 0);
        assert_eq!(device.live_pipeline_count(), 0);
    }

    #[test]
    fn test_merge_push_constants_by_offset() {
        let merged = merge_push_constants(&[
            PushConstantRange { offset: 64, size: 16, stage_mask: StageMask::FRAGMENT },
            PushConstantRange { offset: 0, size: 64, stage_mask: StageMask::VERTEX },
            PushConstantRange { offset: 0, size: 32, stage_mask: StageMask::FRAGMENT },
        ]);
        assert_eq!(
            merged,
            vec![
                PushConstantRange { offset: 0, size: 64, stage_mask: StageMask::VERTEX | StageMask::FRAGMENT },
                PushConstantRange { offset: 64, size: 16, stage_mask: StageMask::FRAGMENT },
            ]
        );
    }

    #[test]
    fn test_create_builds_everything() {
        let context = context();
        let pipeline = Pipeline::create(&context, graphics_description(), &reflector(), Extent2D::new(800, 600)).unwrap();

        assert!(pipeline.is_built());
        assert_eq!(pipeline.set_layouts().len(), 1);
        assert_eq!(pipeline.push_constant_ranges().len(), 1);
        assert_eq!(pipeline.vertex_input().attributes.len(), 2);
        assert_eq!(pipeline.vertex_input().bindings[0].stride, 20);

        let device = context.device();
        assert_eq!(device.live_pipeline_count(), 1);
        assert_eq!(device.live_pipeline_layout_count(), 1);
        assert_eq!(device.live_shader_module_count(), 0);

        let (set_layouts, push_constants) = device.pipeline_layout_contents(pipeline.layout()).unwrap();
        assert_eq!(set_layouts, vec![pipeline.set_layouts()[0].handle()]);
        assert_eq!(push_constants, pipeline.push_constant_ranges());

        let recorded = device.last_graphics_pipeline().unwrap();
        assert_eq!(recorded.stages, vec![ShaderStage::Vertex, ShaderStage::Fragment]);
        assert_eq!(recorded.render_pass, RenderPassHandle(1));
    }

    #[test]
    fn test_cleanup_is_idempotent_and_keeps_layouts() {
        let context = context();
        let mut pipeline =
            Pipeline::create(&context, graphics_description(), &reflector(), Extent2D::new(800, 600)).unwrap();

        pipeline.cleanup_pipeline();
        pipeline.cleanup_pipeline();
        assert!(!pipeline.is_built());
        assert!(pipeline.handle().is_none());
        assert_eq!(context.device().live_pipeline_count(), 0);
        assert_eq!(context.device().live_set_layout_count(), 1);
        assert_eq!(context.device().live_pipeline_layout_count(), 1);

        drop(pipeline);
        assert_nothing_alive(context.device());
    }

    #[test]
    fn test_rebuild_reuses_layouts() {
        let context = context();
        let mut pipeline =
            Pipeline::create(&context, graphics_description(), &reflector(), Extent2D::new(800, 600)).unwrap();
        let layout = pipeline.layout();
        let set_layout = pipeline.set_layouts()[0].handle();

        pipeline.rebuild(Extent2D::new(1024, 768)).unwrap();
        assert!(pipeline.is_built());
        assert_eq!(pipeline.layout(), layout);
        assert_eq!(pipeline.set_layouts()[0].handle(), set_layout);
        assert_eq!(pipeline.extent(), Extent2D::new(1024, 768));
        assert_eq!(pipeline.fixed_function().unwrap().scissor.width, 1024);
        assert_eq!(context.device().live_pipeline_count(), 1);
    }

    #[test]
    fn test_rebuild_for_new_render_target_keeps_layouts() {
        let context = context();
        let mut pipeline =
            Pipeline::create(&context, graphics_description(), &reflector(), Extent2D::new(800, 600)).unwrap();
        let layout = pipeline.layout();
        let set_layout = pipeline.set_layouts()[0].handle();

        pipeline
            .rebuild_for_target(Extent2D::new(800, 600), RenderPassHandle(42), 2)
            .unwrap();

        let recorded = context.device().last_graphics_pipeline().unwrap();
        assert_eq!(recorded.render_pass, RenderPassHandle(42));
        assert_eq!(recorded.fixed_function.color_blend.len(), 2);
        assert_eq!(recorded.layout, layout);
        assert_eq!(pipeline.layout(), layout);
        assert_eq!(pipeline.set_layouts()[0].handle(), set_layout);
        assert_eq!(pipeline.description().render_pass, Some(RenderPassHandle(42)));
        assert_eq!(context.device().live_pipeline_count(), 1);
        assert_eq!(context.device().live_pipeline_layout_count(), 1);
        assert_eq!(context.device().live_set_layout_count(), 1);
    }

    #[test]
    fn test_rebuild_for_minimized_target() {
        let context = context();
        let mut pipeline =
            Pipeline::create(&context, graphics_description(), &reflector(), Extent2D::new(800, 600)).unwrap();

        pipeline.rebuild(Extent2D::new(0, 0)).unwrap();
        let state = pipeline.fixed_function().unwrap();
        assert_eq!((state.scissor.width, state.scissor.height), (1, 1));
        assert!(pipeline.is_built());
    }

    #[test]
    fn test_failed_rebuild_leaves_unbuilt() {
        let context = context();
        let mut pipeline =
            Pipeline::create(&context, graphics_description(), &reflector(), Extent2D::new(800, 600)).unwrap();

        context.device().set_fail_pipeline_creation(true);
        assert!(pipeline.rebuild(Extent2D::new(640, 480)).is_err());
        assert!(!pipeline.is_built());
        assert_eq!(context.device().live_shader_module_count(), 0);

        context.device().set_fail_pipeline_creation(false);
        pipeline.rebuild(Extent2D::new(640, 480)).unwrap();
        assert!(pipeline.is_built());
    }

    #[test]
    fn test_pipeline_creation_failure_unwinds() {
        let context = context();
        context.device().set_fail_pipeline_creation(true);
        let result = Pipeline::create(&context, graphics_description(), &reflector(), Extent2D::new(800, 600));
        assert!(matches!(result, Err(RenderError::DeviceObjectCreationFailure { .. })));
        assert_nothing_alive(context.device());
    }

    #[test]
    fn test_layout_creation_failure_unwinds() {
        let context = context();
        context.device().set_fail_pipeline_layout_creation(true);
        let result = Pipeline::create(&context, graphics_description(), &reflector(), Extent2D::new(800, 600));
        assert!(result.is_err());
        assert_nothing_alive(context.device());
    }

    #[test]
    fn test_bad_bytecode_unwinds_modules() {
        let context = context();
        let description = graphics_description().with_stage(ShaderStage::Fragment, vec![0u8; 3]);
        let result = Pipeline::create(&context, description, &reflector(), Extent2D::new(800, 600));
        assert!(matches!(result, Err(RenderError::DeviceObjectCreationFailure { object: "shader module", .. })));
        assert_nothing_alive(context.device());
    }

    #[test]
    fn test_compute_stage_on_graphics_pipeline_rejected() {
        let context = context();
        let description = graphics_description().with_stage(ShaderStage::Compute, vec![0u8; 4]);
        let result = Pipeline::create(&context, description, &reflector(), Extent2D::new(800, 600));
        assert!(matches!(result, Err(RenderError::InvalidUsage { .. })));
        assert_nothing_alive(context.device());
    }

    #[test]
    fn test_compute_pipeline_skips_graphics_state() {
        let context = context();
        let reflector = StaticReflector::new().with_stage(
            ShaderStage::Compute,
            StageReflection::new().with_binding(DescriptorBindingDescription::uniform_buffer(0, 0, StageMask::COMPUTE)),
        );
        let description = PipelineDescription::new().with_stage(ShaderStage::Compute, vec![0u8; 8]);
        let pipeline = Pipeline::create(&context, description, &reflector, Extent2D::new(1, 1)).unwrap();

        assert!(pipeline.is_compute());
        assert!(pipeline.is_built());
        assert!(pipeline.vertex_input().is_empty());
        assert!(pipeline.fixed_function().is_none());
        assert!(context.device().last_graphics_pipeline().is_none());
    }
}
