//! Descriptor set layouts merged across shader stages
//!
//! Every stage of a pipeline declares the bindings it reads. The builder folds those
//! declarations into one binding per `(set, binding)` slot, with the stage masks of
//! all declaring stages unioned, and creates one native layout per set index.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::render::api::{
    DescriptorBindingDescription, GpuDevice, RenderError, RenderResult, ResourceKind, ShaderStage,
};
use crate::render::context::GpuContext;

/// Descriptor set layout builder merging declarations from several stages
#[derive(Debug, Clone, Default)]
pub struct DescriptorSetLayoutBuilder {
    bindings: BTreeMap<(u32, u32), DescriptorBindingDescription>,
}

impl DescriptorSetLayoutBuilder {
    /// Create an empty builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge per-stage binding declarations
    ///
    /// A slot declared by several stages keeps a single entry whose stage mask is the
    /// union of all declaring stages. Declaring the same slot with a different resource
    /// kind fails and leaves the builder unchanged.
    pub fn merge(&mut self, stage_bindings: &[(ShaderStage, Vec<DescriptorBindingDescription>)]) -> RenderResult<()> {
        let mut merged = self.bindings.clone();
        for (stage, bindings) in stage_bindings {
            for declared in bindings {
                let key = (declared.set_index, declared.binding_index);
                let stage_mask = declared.stage_mask | stage.mask();
                match merged.get_mut(&key) {
                    Some(existing) if existing.resource_kind != declared.resource_kind => {
                        log::error!(
                            "[DESCRIPTOR] {:?} stage redeclares set {} binding {} as {:?} (was {:?})",
                            stage,
                            key.0,
                            key.1,
                            declared.resource_kind,
                            existing.resource_kind
                        );
                        return Err(RenderError::ConflictingBindingType {
                            set: key.0,
                            binding: key.1,
                            existing: existing.resource_kind,
                            declared: declared.resource_kind,
                        });
                    }
                    Some(existing) => existing.stage_mask |= stage_mask,
                    None => {
                        merged.insert(key, DescriptorBindingDescription { stage_mask, ..*declared });
                    }
                }
            }
        }
        self.bindings = merged;
        Ok(())
    }

    /// Merged bindings ordered by set then binding index
    pub fn merged_bindings(&self) -> Vec<DescriptorBindingDescription> {
        self.bindings.values().copied().collect()
    }

    /// Number of distinct set indices declared
    pub fn set_count(&self) -> usize {
        let mut sets: Vec<u32> = self.bindings.keys().map(|(set, _)| *set).collect();
        sets.dedup();
        sets.len()
    }

    /// Whether any binding has been merged
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Bindings grouped by set, ascending, after checking the set indices are `0..N`
    fn grouped(&self) -> RenderResult<Vec<(u32, Vec<DescriptorBindingDescription>)>> {
        let mut groups: Vec<(u32, Vec<DescriptorBindingDescription>)> = Vec::new();
        for binding in self.bindings.values() {
            match groups.last_mut() {
                Some((set, bindings)) if *set == binding.set_index => bindings.push(*binding),
                _ => {
                    let expected = groups.len() as u32;
                    if binding.set_index != expected {
                        return Err(RenderError::NonContiguousSetIndex {
                            expected,
                            found: binding.set_index,
                        });
                    }
                    groups.push((binding.set_index, vec![*binding]));
                }
            }
        }
        Ok(groups)
    }

    /// Create one native layout per set index, in ascending set order
    ///
    /// Layouts created before a failure are destroyed before the error is returned.
    pub fn build_layouts<D: GpuDevice>(&self, context: &Arc<GpuContext<D>>) -> RenderResult<Vec<DescriptorSetLayout<D>>> {
        let groups = self.grouped()?;
        let mut layouts = Vec::with_capacity(groups.len());
        for (set_index, bindings) in groups {
            let handle = context.device().create_descriptor_set_layout(&bindings)?;
            log::debug!(
                "[DESCRIPTOR] Created layout for set {} with {} binding(s)",
                set_index,
                bindings.len()
            );
            layouts.push(DescriptorSetLayout {
                context: Arc::clone(context),
                handle,
                set_index,
                bindings,
            });
        }
        Ok(layouts)
    }
}

/// Native descriptor set layout with automatic cleanup
pub struct DescriptorSetLayout<D: GpuDevice> {
    context: Arc<GpuContext<D>>,
    handle: D::DescriptorSetLayout,
    set_index: u32,
    bindings: Vec<DescriptorBindingDescription>,
}

impl<D: GpuDevice> DescriptorSetLayout<D> {
    /// Native handle
    pub const fn handle(&self) -> D::DescriptorSetLayout {
        self.handle
    }

    /// Set index this layout describes
    pub const fn set_index(&self) -> u32 {
        self.set_index
    }

    /// Bindings in ascending binding order
    pub fn bindings(&self) -> &[DescriptorBindingDescription] {
        &self.bindings
    }

    /// Binding at `binding_index`, if declared
    pub fn binding(&self, binding_index: u32) -> Option<&DescriptorBindingDescription> {
        self.bindings.iter().find(|b| b.binding_index == binding_index)
    }
}

impl<D: GpuDevice> std::fmt::Debug for DescriptorSetLayout<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DescriptorSetLayout")
            .field("handle", &self.handle)
            .field("set_index", &self.set_index)
            .field("bindings", &self.bindings)
            .finish()
    }
}

impl<D: GpuDevice> Drop for DescriptorSetLayout<D> {
    fn drop(&mut self) {
        self.context.device().destroy_descriptor_set_layout(self.handle);
    }
}

/// Number of descriptors of one kind a pool must provide
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DescriptorPoolSize {
    /// Resource kind
    pub kind: ResourceKind,
    /// Descriptor count
    pub count: u32,
}

/// Pool sizes needed to allocate `max_sets` copies of every layout in `layouts`
pub fn descriptor_pool_sizes<D: GpuDevice>(layouts: &[DescriptorSetLayout<D>], max_sets: u32) -> Vec<DescriptorPoolSize> {
    let mut counts: BTreeMap<ResourceKind, u32> = BTreeMap::new();
    for binding in layouts.iter().flat_map(|layout| layout.bindings()) {
        *counts.entry(binding.resource_kind).or_default() += 1;
    }
    counts
        .into_iter()
        .map(|(kind, count)| DescriptorPoolSize {
            kind,
            count: count.saturating_mul(max_sets),
        })
        .collect()
}
