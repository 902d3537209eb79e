//! Shader binding reflection
//!
//! The pipeline assembler asks a [`ShaderReflector`] for the descriptor bindings and
//! push-constant ranges each stage declares. [`SpirvReflector`] reads them from SPIR-V
//! bytecode; [`StaticReflector`] serves a precomputed table.

use std::collections::HashMap;

use crate::render::api::{DescriptorBindingDescription, PushConstantRange, RenderResult, ShaderStage};

/// Bindings and push constants declared by one stage
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StageReflection {
    /// Descriptor bindings
    pub bindings: Vec<DescriptorBindingDescription>,
    /// Push-constant ranges
    pub push_constants: Vec<PushConstantRange>,
}

impl StageReflection {
    /// Empty reflection
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a descriptor binding
    #[must_use]
    pub fn with_binding(mut self, binding: DescriptorBindingDescription) -> Self {
        self.bindings.push(binding);
        self
    }

    /// Add a push-constant range
    #[must_use]
    pub fn with_push_constant(mut self, range: PushConstantRange) -> Self {
        self.push_constants.push(range);
        self
    }
}

/// Extracts binding declarations from stage bytecode
pub trait ShaderReflector {
    /// Reflect the bindings and push constants of `bytecode` compiled for `stage`
    fn reflect(&self, stage: ShaderStage, bytecode: &[u8]) -> RenderResult<StageReflection>;
}

/// Reflector answering from a table registered ahead of time
///
/// Stages without an entry reflect as declaring nothing.
#[derive(Debug, Clone, Default)]
pub struct StaticReflector {
    stages: HashMap<ShaderStage, StageReflection>,
}

impl StaticReflector {
    /// Empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the declarations of a stage
    #[must_use]
    pub fn with_stage(mut self, stage: ShaderStage, reflection: StageReflection) -> Self {
        self.stages.insert(stage, reflection);
        self
    }
}

impl ShaderReflector for StaticReflector {
    fn reflect(&self, stage: ShaderStage, _bytecode: &[u8]) -> RenderResult<StageReflection> {
        Ok(self.stages.get(&stage).cloned().unwrap_or_default())
    }
}

#[cfg(feature = "spirv-reflect")]
pub use spirv::SpirvReflector;

#[cfg(feature = "spirv-reflect")]
mod spirv {
    use std::collections::BTreeMap;

    use naga::{AddressSpace, TypeInner};

    use super::{ShaderReflector, StageReflection};
    use crate::render::api::{
        DescriptorBindingDescription, PushConstantRange, RenderError, RenderResult, ResourceKind,
        ShaderStage,
    };

    /// Reflector parsing SPIR-V through naga
    #[derive(Debug, Clone, Copy, Default)]
    pub struct SpirvReflector;

    impl SpirvReflector {
        /// Create a SPIR-V reflector
        pub const fn new() -> Self {
            Self
        }
    }

    impl ShaderReflector for SpirvReflector {
        fn reflect(&self, stage: ShaderStage, bytecode: &[u8]) -> RenderResult<StageReflection> {
            let module = naga::front::spv::parse_u8_slice(bytecode, &naga::front::spv::Options::default())
                .map_err(|e| RenderError::Reflection(format!("{stage:?} stage: {e}")))?;
            Ok(reflect_module(stage, &module))
        }
    }

    /// Collect uniform, image/sampler and push-constant globals of a parsed module
    pub(super) fn reflect_module(stage: ShaderStage, module: &naga::Module) -> StageReflection {
        let mut bindings: BTreeMap<(u32, u32), DescriptorBindingDescription> = BTreeMap::new();
        let mut push_constants = Vec::new();

        for (_, global) in module.global_variables.iter() {
            let name = global.name.as_deref().unwrap_or("<unnamed>");
            let kind = match global.space {
                AddressSpace::Uniform => Some(ResourceKind::UniformBuffer),
                AddressSpace::Handle => match module.types[global.ty].inner {
                    TypeInner::Image { .. } | TypeInner::Sampler { .. } => Some(ResourceKind::SampledImage),
                    ref other => {
                        log::warn!("[SHADER] Skipping unsupported handle '{}' ({:?})", name, other);
                        None
                    }
                },
                AddressSpace::PushConstant => {
                    let inner = &module.types[global.ty].inner;
                    let span = inner.size(module.to_ctx());
                    // Blocks declared with explicit member offsets start at their first member.
                    let offset = match *inner {
                        TypeInner::Struct { ref members, .. } => {
                            members.iter().map(|member| member.offset).min().unwrap_or(0)
                        }
                        _ => 0,
                    };
                    push_constants.push(PushConstantRange {
                        offset,
                        size: span.saturating_sub(offset),
                        stage_mask: stage.mask(),
                    });
                    None
                }
                AddressSpace::Function | AddressSpace::Private | AddressSpace::WorkGroup => None,
                ref other => {
                    log::warn!("[SHADER] Skipping '{}' in unsupported address space {:?}", name, other);
                    None
                }
            };

            let (Some(kind), Some(binding)) = (kind, global.binding.as_ref()) else {
                continue;
            };
            bindings
                .entry((binding.group, binding.binding))
                .or_insert(DescriptorBindingDescription {
                    set_index: binding.group,
                    binding_index: binding.binding,
                    resource_kind: kind,
                    stage_mask: stage.mask(),
                });
        }

        log::debug!(
            "[SHADER] Reflected {:?} stage: {} binding(s), {} push constant range(s)",
            stage,
            bindings.len(),
            push_constants.len()
        );
        StageReflection {
            bindings: bindings.into_values().collect(),
            push_constants,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::api::StageMask;

    #[test]
    fn test_static_reflector_lookup() {
        let reflector = StaticReflector::new().with_stage(
            ShaderStage::Vertex,
            StageReflection::new().with_binding(DescriptorBindingDescription::uniform_buffer(0, 0, StageMask::VERTEX)),
        );

        let vertex = reflector.reflect(ShaderStage::Vertex, &[]).unwrap();
        assert_eq!(vertex.bindings.len(), 1);
        let fragment = reflector.reflect(ShaderStage::Fragment, &[]).unwrap();
        assert_eq!(fragment, StageReflection::default());
    }

    #[cfg(feature = "spirv-reflect")]
    mod spirv_tests {
        use naga::{
            AddressSpace, GlobalVariable, ImageClass, ImageDimension, ResourceBinding, Scalar, ScalarKind, Span,
            StructMember, Type, TypeInner, VectorSize,
        };

        use super::super::spirv::reflect_module;
        use super::super::*;
        use crate::render::pipeline::merge_push_constants;
        use crate::render::api::{RenderError, ResourceKind, StageMask};

        fn add_global(
            module: &mut naga::Module,
            space: AddressSpace,
            binding: Option<(u32, u32)>,
            inner: TypeInner,
        ) {
            let ty = module.types.insert(Type { name: None, inner }, Span::UNDEFINED);
            module.global_variables.append(
                GlobalVariable {
                    name: None,
                    space,
                    binding: binding.map(|(group, binding)| ResourceBinding { group, binding }),
                    ty,
                    init: None,
                },
                Span::UNDEFINED,
            );
        }

        #[test]
        fn test_invalid_bytecode_is_reflection_error() {
            let result = SpirvReflector::new().reflect(ShaderStage::Vertex, &[1, 2, 3, 4]);
            assert!(matches!(result, Err(RenderError::Reflection(_))));
        }

        #[test]
        fn test_module_globals_map_to_bindings() {
            let mut module = naga::Module::default();
            add_global(
                &mut module,
                AddressSpace::Uniform,
                Some((0, 0)),
                TypeInner::Vector { size: VectorSize::Quad, scalar: Scalar::F32 },
            );
            add_global(
                &mut module,
                AddressSpace::Handle,
                Some((1, 2)),
                TypeInner::Image {
                    dim: ImageDimension::D2,
                    arrayed: false,
                    class: ImageClass::Sampled { kind: ScalarKind::Float, multi: false },
                },
            );
            add_global(&mut module, AddressSpace::Handle, Some((1, 2)), TypeInner::Sampler { comparison: false });
            add_global(
                &mut module,
                AddressSpace::PushConstant,
                None,
                TypeInner::Vector { size: VectorSize::Quad, scalar: Scalar::F32 },
            );
            add_global(&mut module, AddressSpace::Private, None, TypeInner::Scalar(Scalar::F32));

            let reflection = reflect_module(ShaderStage::Fragment, &module);
            assert_eq!(
                reflection.bindings,
                vec![
                    DescriptorBindingDescription::uniform_buffer(0, 0, StageMask::FRAGMENT),
                    DescriptorBindingDescription::sampled_image(1, 2, StageMask::FRAGMENT),
                ]
            );
            assert_eq!(reflection.bindings[1].resource_kind, ResourceKind::SampledImage);
            assert_eq!(
                reflection.push_constants,
                vec![PushConstantRange { offset: 0, size: 16, stage_mask: StageMask::FRAGMENT }]
            );
        }

        #[test]
        fn test_push_constant_block_keeps_member_offset() {
            let mut module = naga::Module::default();
            let color = module.types.insert(
                Type {
                    name: None,
                    inner: TypeInner::Vector { size: VectorSize::Quad, scalar: Scalar::F32 },
                },
                Span::UNDEFINED,
            );
            add_global(
                &mut module,
                AddressSpace::PushConstant,
                None,
                TypeInner::Struct {
                    members: vec![StructMember {
                        name: Some("color".to_string()),
                        ty: color,
                        binding: None,
                        offset: 64,
                    }],
                    span: 80,
                },
            );

            let fragment = reflect_module(ShaderStage::Fragment, &module);
            assert_eq!(
                fragment.push_constants,
                vec![PushConstantRange { offset: 64, size: 16, stage_mask: StageMask::FRAGMENT }]
            );

            let vertex = PushConstantRange { offset: 0, size: 64, stage_mask: StageMask::VERTEX };
            let merged = merge_push_constants(&[vertex, fragment.push_constants[0]]);
            assert_eq!(merged, vec![vertex, fragment.push_constants[0]]);
        }
    }
}
