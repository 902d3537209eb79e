//! Headless device backend
//!
//! An in-memory [`GpuDevice`] that keeps allocation contents on the CPU and counts
//! every live native object. It backs the test suite and tooling that needs to
//! exercise resource and pipeline lifecycles without a GPU, and supports failure
//! injection so unwinding paths can be observed.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::render::api::{
    BufferUsage, DescriptorBindingDescription, GpuDevice, GraphicsPipelineInfo, MemoryKind,
    PushConstantRange, RenderError, RenderPassHandle, RenderResult, ShaderStage,
};
use crate::render::pipeline::{FixedFunctionState, VertexInputState};

/// Opaque handle for headless native objects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HeadlessHandle(pub u64);

/// CPU-side stand-in for a device buffer
#[derive(Debug)]
pub struct HeadlessAllocation {
    id: u64,
    memory: MemoryKind,
    usage: BufferUsage,
    bytes: Vec<u8>,
    mapped: bool,
}

impl HeadlessAllocation {
    /// Unique allocation id
    pub const fn id(&self) -> u64 {
        self.id
    }

    /// Current contents
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Size in bytes
    pub fn size(&self) -> usize {
        self.bytes.len()
    }

    /// Memory placement
    pub const fn memory(&self) -> MemoryKind {
        self.memory
    }

    /// Usage flags
    pub const fn usage(&self) -> BufferUsage {
        self.usage
    }
}

/// Snapshot of the inputs of the last graphics pipeline created
#[derive(Debug, Clone)]
pub struct RecordedGraphicsPipeline {
    /// Stages in creation order
    pub stages: Vec<ShaderStage>,
    /// Vertex input state
    pub vertex_input: VertexInputState,
    /// Fixed-function state
    pub fixed_function: FixedFunctionState,
    /// Layout used
    pub layout: HeadlessHandle,
    /// Render pass used
    pub render_pass: RenderPassHandle,
}

#[derive(Default)]
struct DeviceState {
    next_id: u64,
    live_allocations: HashSet<u64>,
    live_set_layouts: HashMap<u64, Vec<DescriptorBindingDescription>>,
    live_pipeline_layouts: HashMap<u64, (Vec<HeadlessHandle>, Vec<PushConstantRange>)>,
    live_shader_modules: HashSet<u64>,
    live_pipelines: HashSet<u64>,
    total_allocations: usize,
    total_frees: usize,
    device_copies: usize,
    allocation_budget: Option<usize>,
    set_layout_budget: Option<usize>,
    fail_pipeline_layouts: bool,
    fail_pipelines: bool,
    last_graphics: Option<RecordedGraphicsPipeline>,
}

impl DeviceState {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }
}

/// In-memory device
#[derive(Default)]
pub struct HeadlessDevice {
    state: Mutex<DeviceState>,
}

impl HeadlessDevice {
    /// Create a device with no failure injection
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, DeviceState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Allow only `remaining` further allocations (`None` = unlimited)
    pub fn set_allocation_budget(&self, remaining: Option<usize>) {
        self.state().allocation_budget = remaining;
    }

    /// Allow only `remaining` further descriptor set layouts (`None` = unlimited)
    pub fn set_descriptor_set_layout_budget(&self, remaining: Option<usize>) {
        self.state().set_layout_budget = remaining;
    }

    /// Make pipeline layout creation fail
    pub fn set_fail_pipeline_layout_creation(&self, fail: bool) {
        self.state().fail_pipeline_layouts = fail;
    }

    /// Make pipeline creation fail
    pub fn set_fail_pipeline_creation(&self, fail: bool) {
        self.state().fail_pipelines = fail;
    }

    /// Allocations not yet freed
    pub fn live_allocation_count(&self) -> usize {
        self.state().live_allocations.len()
    }

    /// Allocations ever made
    pub fn total_allocations(&self) -> usize {
        self.state().total_allocations
    }

    /// Allocations ever freed
    pub fn total_frees(&self) -> usize {
        self.state().total_frees
    }

    /// Device-to-device copies issued
    pub fn device_copy_count(&self) -> usize {
        self.state().device_copies
    }

    /// Descriptor set layouts not yet destroyed
    pub fn live_set_layout_count(&self) -> usize {
        self.state().live_set_layouts.len()
    }

    /// Pipeline layouts not yet destroyed
    pub fn live_pipeline_layout_count(&self) -> usize {
        self.state().live_pipeline_layouts.len()
    }

    /// Shader modules not yet destroyed
    pub fn live_shader_module_count(&self) -> usize {
        self.state().live_shader_modules.len()
    }

    /// Pipelines not yet destroyed
    pub fn live_pipeline_count(&self) -> usize {
        self.state().live_pipelines.len()
    }

    /// Bindings a live descriptor set layout was created with
    pub fn set_layout_bindings(&self, layout: HeadlessHandle) -> Option<Vec<DescriptorBindingDescription>> {
        self.state().live_set_layouts.get(&layout.0).cloned()
    }

    /// Set layouts and push constants a live pipeline layout was created with
    pub fn pipeline_layout_contents(
        &self,
        layout: HeadlessHandle,
    ) -> Option<(Vec<HeadlessHandle>, Vec<PushConstantRange>)> {
        self.state().live_pipeline_layouts.get(&layout.0).cloned()
    }

    /// Inputs of the most recent graphics pipeline
    pub fn last_graphics_pipeline(&self) -> Option<RecordedGraphicsPipeline> {
        self.state().last_graphics.clone()
    }
}

impl GpuDevice for HeadlessDevice {
    type Allocation = HeadlessAllocation;
    type DescriptorSetLayout = HeadlessHandle;
    type PipelineLayout = HeadlessHandle;
    type Pipeline = HeadlessHandle;
    type ShaderModule = HeadlessHandle;

    fn allocate(&self, size: u64, memory: MemoryKind, usage: BufferUsage) -> RenderResult<HeadlessAllocation> {
        let mut state = self.state();
        if let Some(remaining) = state.allocation_budget.as_mut() {
            if *remaining == 0 {
                return Err(RenderError::DeviceAllocationFailure {
                    size,
                    reason: "headless allocation budget exhausted".to_string(),
                });
            }
            *remaining -= 1;
        }

        let len = usize::try_from(size).map_err(|_| RenderError::DeviceAllocationFailure {
            size,
            reason: "size exceeds host address space".to_string(),
        })?;

        let id = state.next_id();
        state.live_allocations.insert(id);
        state.total_allocations += 1;
        Ok(HeadlessAllocation {
            id,
            memory,
            usage,
            bytes: vec![0; len],
            mapped: false,
        })
    }

    fn free(&self, allocation: HeadlessAllocation) {
        let mut state = self.state();
        if state.live_allocations.remove(&allocation.id) {
            state.total_frees += 1;
        } else {
            log::warn!("[HEADLESS] Double free of allocation {}", allocation.id);
        }
    }

    fn map<'a>(&self, allocation: &'a mut HeadlessAllocation) -> RenderResult<&'a mut [u8]> {
        if allocation.memory != MemoryKind::HostVisible {
            return Err(RenderError::invalid_usage("cannot map device-local memory"));
        }
        allocation.mapped = true;
        Ok(&mut allocation.bytes)
    }

    fn unmap(&self, allocation: &mut HeadlessAllocation) {
        allocation.mapped = false;
    }

    fn flush(&self, allocation: &HeadlessAllocation) -> RenderResult<()> {
        if allocation.mapped {
            Ok(())
        } else {
            Err(RenderError::invalid_usage("flush of an unmapped allocation"))
        }
    }

    fn copy_device_to_device(
        &self,
        src: &HeadlessAllocation,
        dst: &mut HeadlessAllocation,
        size: u64,
    ) -> RenderResult<()> {
        if !src.usage.contains(BufferUsage::TRANSFER_SRC) || !dst.usage.contains(BufferUsage::TRANSFER_DST) {
            return Err(RenderError::invalid_usage("device copy requires TRANSFER_SRC -> TRANSFER_DST"));
        }
        let len = usize::try_from(size).unwrap_or(usize::MAX);
        if len > src.bytes.len() || len > dst.bytes.len() {
            return Err(RenderError::invalid_usage("device copy exceeds allocation size"));
        }
        dst.bytes[..len].copy_from_slice(&src.bytes[..len]);
        self.state().device_copies += 1;
        Ok(())
    }

    fn create_descriptor_set_layout(
        &self,
        bindings: &[DescriptorBindingDescription],
    ) -> RenderResult<HeadlessHandle> {
        let mut state = self.state();
        if let Some(remaining) = state.set_layout_budget.as_mut() {
            if *remaining == 0 {
                return Err(RenderError::creation_failed(
                    "descriptor set layout",
                    "headless layout budget exhausted",
                ));
            }
            *remaining -= 1;
        }
        let id = state.next_id();
        state.live_set_layouts.insert(id, bindings.to_vec());
        Ok(HeadlessHandle(id))
    }

    fn destroy_descriptor_set_layout(&self, layout: HeadlessHandle) {
        self.state().live_set_layouts.remove(&layout.0);
    }

    fn create_pipeline_layout(
        &self,
        set_layouts: &[HeadlessHandle],
        push_constants: &[PushConstantRange],
    ) -> RenderResult<HeadlessHandle> {
        let mut state = self.state();
        if state.fail_pipeline_layouts {
            return Err(RenderError::creation_failed("pipeline layout", "headless failure injected"));
        }
        let id = state.next_id();
        state
            .live_pipeline_layouts
            .insert(id, (set_layouts.to_vec(), push_constants.to_vec()));
        Ok(HeadlessHandle(id))
    }

    fn destroy_pipeline_layout(&self, layout: HeadlessHandle) {
        self.state().live_pipeline_layouts.remove(&layout.0);
    }

    fn create_shader_module(&self, bytecode: &[u8]) -> RenderResult<HeadlessHandle> {
        if bytecode.is_empty() || bytecode.len() % 4 != 0 {
            return Err(RenderError::creation_failed(
                "shader module",
                format!("bytecode length {} is not a non-zero multiple of 4", bytecode.len()),
            ));
        }
        let mut state = self.state();
        let id = state.next_id();
        state.live_shader_modules.insert(id);
        Ok(HeadlessHandle(id))
    }

    fn destroy_shader_module(&self, module: HeadlessHandle) {
        self.state().live_shader_modules.remove(&module.0);
    }

    fn create_graphics_pipeline(&self, info: &GraphicsPipelineInfo<'_, Self>) -> RenderResult<HeadlessHandle> {
        let mut state = self.state();
        if state.fail_pipelines {
            return Err(RenderError::creation_failed("graphics pipeline", "headless failure injected"));
        }
        state.last_graphics = Some(RecordedGraphicsPipeline {
            stages: info.stages.iter().map(|(stage, _)| *stage).collect(),
            vertex_input: info.vertex_input.clone(),
            fixed_function: info.fixed_function.clone(),
            layout: info.layout,
            render_pass: info.render_pass,
        });
        let id = state.next_id();
        state.live_pipelines.insert(id);
        Ok(HeadlessHandle(id))
    }

    fn create_compute_pipeline(&self, _layout: HeadlessHandle, _module: HeadlessHandle) -> RenderResult<HeadlessHandle> {
        let mut state = self.state();
        if state.fail_pipelines {
            return Err(RenderError::creation_failed("compute pipeline", "headless failure injected"));
        }
        let id = state.next_id();
        state.live_pipelines.insert(id);
        Ok(HeadlessHandle(id))
    }

    fn destroy_pipeline(&self, pipeline: HeadlessHandle) {
        self.state().live_pipelines.remove(&pipeline.0);
    }

    fn wait_idle(&self) -> RenderResult<()> {
        Ok(())
    }
}
