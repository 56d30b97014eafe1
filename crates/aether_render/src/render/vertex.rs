//! Vertex layouts and faces
//!
//! Three interleaved layouts cover everything the renderer draws:
//! - [`VertexPTC`]: sprites, text and the skybox
//! - [`VertexPTN`]: untextured-tangent meshes
//! - [`VertexPTNTC`]: normal-mapped meshes

use bytemuck::{Pod, Zeroable};

/// Position, texture coordinate, color
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default, Pod, Zeroable)]
pub struct VertexPTC {
    /// Object-space position
    pub position: [f32; 3],
    /// Texture coordinate
    pub uv: [f32; 2],
    /// Linear RGBA color
    pub color: [f32; 4],
}

/// Position, texture coordinate, normal
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default, Pod, Zeroable)]
pub struct VertexPTN {
    /// Object-space position
    pub position: [f32; 3],
    /// Texture coordinate
    pub uv: [f32; 2],
    /// Object-space normal
    pub normal: [f32; 3],
}

/// Position, texture coordinate, normal, tangent, color
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default, Pod, Zeroable)]
pub struct VertexPTNTC {
    /// Object-space position
    pub position: [f32; 3],
    /// Texture coordinate
    pub uv: [f32; 2],
    /// Object-space normal
    pub normal: [f32; 3],
    /// Tangent with handedness in w
    pub tangent: [f32; 4],
    /// Linear RGBA color
    pub color: [f32; 4],
}

/// A triangle as three indices into the vertex array.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Pod, Zeroable)]
pub struct Face {
    /// First corner
    pub a: u16,
    /// Second corner
    pub b: u16,
    /// Third corner
    pub c: u16,
}

impl Face {
    /// Create a face from three vertex indices
    pub const fn new(a: u16, b: u16, c: u16) -> Self {
        Self { a, b, c }
    }

    /// Largest index referenced by this face
    pub fn max_index(&self) -> u16 {
        self.a.max(self.b).max(self.c)
    }
}

/// Vertex layout a buffer was generated with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VertexFormat {
    /// [`VertexPTC`]
    Ptc,
    /// [`VertexPTN`]
    Ptn,
    /// [`VertexPTNTC`]
    Ptntc,
}

/// Component type of a vertex attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeFormat {
    /// Two 32-bit floats
    Float2,
    /// Three 32-bit floats
    Float3,
    /// Four 32-bit floats
    Float4,
}

/// One shader input of an interleaved layout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VertexAttribute {
    /// Shader input location
    pub location: u32,
    /// Component type
    pub format: AttributeFormat,
    /// Byte offset inside the vertex
    pub offset: u32,
}

const fn attribute(location: u32, format: AttributeFormat, offset: u32) -> VertexAttribute {
    VertexAttribute { location, format, offset }
}

const PTC_ATTRIBUTES: [VertexAttribute; 3] = [
    attribute(0, AttributeFormat::Float3, 0),
    attribute(1, AttributeFormat::Float2, 12),
    attribute(2, AttributeFormat::Float4, 20),
];

const PTN_ATTRIBUTES: [VertexAttribute; 3] = [
    attribute(0, AttributeFormat::Float3, 0),
    attribute(1, AttributeFormat::Float2, 12),
    attribute(3, AttributeFormat::Float3, 20),
];

const PTNTC_ATTRIBUTES: [VertexAttribute; 5] = [
    attribute(0, AttributeFormat::Float3, 0),
    attribute(1, AttributeFormat::Float2, 12),
    attribute(3, AttributeFormat::Float3, 20),
    attribute(4, AttributeFormat::Float4, 32),
    attribute(2, AttributeFormat::Float4, 48),
];

impl VertexFormat {
    /// Size of one vertex in bytes
    pub const fn stride(self) -> usize {
        match self {
            Self::Ptc => std::mem::size_of::<VertexPTC>(),
            Self::Ptn => std::mem::size_of::<VertexPTN>(),
            Self::Ptntc => std::mem::size_of::<VertexPTNTC>(),
        }
    }

    /// Attribute layout. Locations are shared across formats: 0 position,
    /// 1 uv, 2 color, 3 normal, 4 tangent.
    pub fn attributes(self) -> &'static [VertexAttribute] {
        match self {
            Self::Ptc => &PTC_ATTRIBUTES,
            Self::Ptn => &PTN_ATTRIBUTES,
            Self::Ptntc => &PTNTC_ATTRIBUTES,
        }
    }
}

/// Implemented by every uploadable vertex layout.
pub trait Vertex: Pod {
    /// Format tag stored alongside the uploaded data
    const FORMAT: VertexFormat;
}

impl Vertex for VertexPTC {
    const FORMAT: VertexFormat = VertexFormat::Ptc;
}

impl Vertex for VertexPTN {
    const FORMAT: VertexFormat = VertexFormat::Ptn;
}

impl Vertex for VertexPTNTC {
    const FORMAT: VertexFormat = VertexFormat::Ptntc;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strides_match_layouts() {
        assert_eq!(VertexFormat::Ptc.stride(), 36);
        assert_eq!(VertexFormat::Ptn.stride(), 32);
        assert_eq!(VertexFormat::Ptntc.stride(), 64);
        assert_eq!(std::mem::size_of::<Face>(), 6);
    }

    #[test]
    fn test_attributes_fit_inside_stride() {
        for format in [VertexFormat::Ptc, VertexFormat::Ptn, VertexFormat::Ptntc] {
            for attr in format.attributes() {
                let size = match attr.format {
                    AttributeFormat::Float2 => 8,
                    AttributeFormat::Float3 => 12,
                    AttributeFormat::Float4 => 16,
                };
                assert!(attr.offset as usize + size <= format.stride(), "{format:?} location {}", attr.location);
            }
        }
    }

    #[test]
    fn test_faces_flatten_to_indices() {
        let faces = [Face::new(0, 1, 2), Face::new(2, 3, 0)];
        let indices: &[u16] = bytemuck::cast_slice(&faces);
        assert_eq!(indices, &[0, 1, 2, 2, 3, 0]);
        assert_eq!(faces[1].max_index(), 3);
    }
}
