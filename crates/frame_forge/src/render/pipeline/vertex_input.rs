//! Vertex layouts and the input state derived from them
//!
//! A [`VertexLayout`] lists vertex buffer bindings, each an ordered run of attribute
//! formats. [`VertexInputState::from_layout`] turns it into binding and attribute
//! descriptions: attribute locations are numbered across the whole layout while
//! byte offsets restart at zero for every binding.

/// Format of a single vertex attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VertexFormat {
    /// `float`
    Float,
    /// `vec2`
    Float2,
    /// `vec3`
    Float3,
    /// `vec4`
    Float4,
    /// `int`
    Int,
    /// `ivec2`
    Int2,
    /// `ivec3`
    Int3,
    /// `ivec4`
    Int4,
    /// `uint`
    UInt,
    /// `uvec2`
    UInt2,
    /// `uvec3`
    UInt3,
    /// `uvec4`
    UInt4,
    /// Four normalized bytes, typically a packed color
    Unorm4x8,
}

impl VertexFormat {
    /// Size of the attribute in bytes
    pub const fn size(self) -> u32 {
        match self {
            Self::Float | Self::Int | Self::UInt | Self::Unorm4x8 => 4,
            Self::Float2 | Self::Int2 | Self::UInt2 => 8,
            Self::Float3 | Self::Int3 | Self::UInt3 => 12,
            Self::Float4 | Self::Int4 | Self::UInt4 => 16,
        }
    }
}

/// Rate at which a vertex binding advances
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum VertexInputRate {
    /// Once per vertex
    #[default]
    Vertex,
    /// Once per instance
    Instance,
}

/// One vertex buffer binding: attribute formats in declaration order
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct VertexBinding {
    /// Attribute formats, tightly packed in this order
    pub attributes: Vec<VertexFormat>,
    /// Advance rate
    pub input_rate: VertexInputRate,
}

impl VertexBinding {
    /// Sum of the attribute sizes
    pub fn stride(&self) -> u32 {
        self.attributes.iter().map(|format| format.size()).sum()
    }
}

/// Ordered vertex buffer bindings consumed by a pipeline
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct VertexLayout {
    bindings: Vec<VertexBinding>,
}

impl VertexLayout {
    /// Create an empty layout (no vertex input, e.g. full-screen passes)
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a binding
    #[must_use]
    pub fn with_binding(mut self, input_rate: VertexInputRate, attributes: &[VertexFormat]) -> Self {
        self.bindings.push(VertexBinding {
            attributes: attributes.to_vec(),
            input_rate,
        });
        self
    }

    /// Bindings in declaration order
    pub fn bindings(&self) -> &[VertexBinding] {
        &self.bindings
    }

    /// Number of bindings
    pub fn binding_count(&self) -> usize {
        self.bindings.len()
    }

    /// Number of attributes across all bindings
    pub fn attribute_count(&self) -> usize {
        self.bindings.iter().map(|binding| binding.attributes.len()).sum()
    }

    /// Stride of the binding at `index`, if present
    pub fn stride(&self, index: usize) -> Option<u32> {
        self.bindings.get(index).map(VertexBinding::stride)
    }
}

/// Native-ready vertex binding description
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VertexBindingDescription {
    /// Binding number
    pub binding: u32,
    /// Distance between consecutive elements
    pub stride: u32,
    /// Advance rate
    pub input_rate: VertexInputRate,
}

/// Native-ready vertex attribute description
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VertexAttributeDescription {
    /// Shader input location
    pub location: u32,
    /// Binding the attribute is read from
    pub binding: u32,
    /// Attribute format
    pub format: VertexFormat,
    /// Byte offset within the binding's element
    pub offset: u32,
}

/// Vertex input state of a graphics pipeline
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct VertexInputState {
    /// One description per layout binding
    pub bindings: Vec<VertexBindingDescription>,
    /// One description per attribute, locations ascending
    pub attributes: Vec<VertexAttributeDescription>,
}

impl VertexInputState {
    /// Derive binding and attribute descriptions from a layout
    pub fn from_layout(layout: &VertexLayout) -> Self {
        let mut bindings = Vec::with_capacity(layout.binding_count());
        let mut attributes = Vec::with_capacity(layout.attribute_count());
        let mut location = 0;

        for (binding_index, binding) in (0u32..).zip(layout.bindings()) {
            let mut offset = 0;
            for &format in &binding.attributes {
                attributes.push(VertexAttributeDescription {
                    location,
                    binding: binding_index,
                    format,
                    offset,
                });
                offset += format.size();
                location += 1;
            }

            bindings.push(VertexBindingDescription {
                binding: binding_index,
                stride: offset,
                input_rate: binding.input_rate,
            });
        }

        Self { bindings, attributes }
    }

    /// True when the pipeline consumes no vertex buffers
    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }
}
