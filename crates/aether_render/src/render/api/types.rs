//! Backend-agnostic resource handles and pipeline state

use bitflags::bitflags;
use bytemuck::{Pod, Zeroable};

use crate::foundation::math::Mat4;
use crate::render::vertex::VertexFormat;

/// Handle to an uploaded vertex/index buffer pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferId(pub u64);

/// Handle to a sampled texture, cube map or render texture.
///
/// Ordering follows creation order, which is what sprite batching sorts by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureId(pub u64);

/// Handle to a graphics shader program
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ShaderId(pub u64);

/// Handle to a compute shader program
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ComputeShaderId(pub u64);

bitflags! {
    /// Attachments cleared by `clear_screen`
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ClearFlags: u32 {
        /// Clear the color target to the current clear color
        const COLOR = 0b01;
        /// Clear the depth target to the far plane
        const DEPTH = 0b10;
    }
}

/// Color blending applied to a draw
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlendMode {
    /// Opaque
    Off,
    /// Source-over using source alpha
    AlphaBlend,
    /// Source added to destination
    Additive,
}

/// Depth test and write state applied to a draw
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DepthFunc {
    /// No depth test, no depth write
    NoneWriteOff,
    /// Less-or-equal test with depth write
    LessOrEqualWriteOn,
    /// Less-or-equal test without depth write
    LessOrEqualWriteOff,
}

/// Shader plus fixed-function state a draw is issued with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PipelineState {
    /// Shader program
    pub shader: ShaderId,
    /// Blend state
    pub blend: BlendMode,
    /// Depth state
    pub depth: DepthFunc,
}

/// Kind of texture a [`TextureId`] refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureKind {
    /// 2D RGBA8 texture
    Texture2D,
    /// Six-face RGBA8 cube map
    Cube,
    /// Color target that can also be sampled
    RenderTarget,
}

/// Description of a sampled texture upload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureDesc {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Texture kind; render targets are created through their own entry point
    pub kind: TextureKind,
}

impl TextureDesc {
    /// Number of RGBA8 bytes the upload must contain
    pub fn byte_len(&self) -> usize {
        let layers = if self.kind == TextureKind::Cube { 6 } else { 1 };
        self.width as usize * self.height as usize * 4 * layers
    }
}

/// Per-draw constants pushed to the vertex stage
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct DrawUniforms {
    /// Column-major projection * model matrix
    pub projection_model: [f32; 16],
}

impl Default for DrawUniforms {
    fn default() -> Self {
        Self {
            projection_model: crate::foundation::math::to_column_major(&Mat4::identity()),
        }
    }
}

/// Geometry handed to a backend for upload
#[derive(Debug, Clone, Copy)]
pub struct GeometryUpload<'a> {
    /// Layout of `vertex_bytes`
    pub format: VertexFormat,
    /// Interleaved vertex data
    pub vertex_bytes: &'a [u8],
    /// Triangle list indices
    pub indices: &'a [u16],
    /// Number of vertices in `vertex_bytes`
    pub vertex_count: u32,
}

/// An indexed draw as the backend receives it
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DrawCommand {
    /// Source geometry
    pub buffer: BufferId,
    /// Vertex layout of the geometry
    pub format: VertexFormat,
    /// First index to read
    pub first_index: u32,
    /// Number of indices to read
    pub index_count: u32,
    /// Shader and fixed-function state
    pub pipeline: PipelineState,
    /// Per-draw constants
    pub uniforms: DrawUniforms,
}

/// Target and clear state of a render pass
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PassDescriptor {
    /// Render texture, or `None` for the swapchain
    pub target: Option<TextureId>,
    /// Clear color applied when the pass begins
    pub clear_color: [f32; 4],
}

/// SPIR-V for a graphics program
#[derive(Debug, Clone, Default)]
pub struct ShaderSource {
    /// Debug name
    pub name: String,
    /// Vertex stage words
    pub vertex_spirv: Vec<u32>,
    /// Fragment stage words
    pub fragment_spirv: Vec<u32>,
}

impl ShaderSource {
    /// Shader with no code, for backends that do not execute SPIR-V
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }
}

/// SPIR-V for a compute program
#[derive(Debug, Clone, Default)]
pub struct ComputeShaderSource {
    /// Debug name
    pub name: String,
    /// Compute stage words
    pub spirv: Vec<u32>,
}

/// Borrowed view of the active prefix of every light array
#[derive(Debug, Clone, Copy, Default)]
pub struct LightBuffers<'a> {
    /// Point light (center.xyz, radius)
    pub point_center_and_radius: &'a [[f32; 4]],
    /// Point light color
    pub point_colors: &'a [[f32; 4]],
    /// Spot light (center.xyz, radius)
    pub spot_center_and_radius: &'a [[f32; 4]],
    /// Spot light (direction.xyz, cos cone angle)
    pub spot_params: &'a [[f32; 4]],
    /// Spot light (color.rgb, falloff radius)
    pub spot_colors: &'a [[f32; 4]],
}

impl LightBuffers<'_> {
    /// Number of active point lights
    pub fn point_count(&self) -> usize {
        self.point_center_and_radius.len()
    }

    /// Number of active spot lights
    pub fn spot_count(&self) -> usize {
        self.spot_center_and_radius.len()
    }
}

/// Tile culling request
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LightCullDispatch {
    /// Culling compute program
    pub shader: ComputeShaderId,
    /// Camera projection
    pub projection: Mat4,
    /// Camera view
    pub view: Mat4,
    /// Render texture holding linear view depth, if depth-aware culling is wanted
    pub depth_normal_target: Option<TextureId>,
    /// Screen width in pixels
    pub width: u32,
    /// Screen height in pixels
    pub height: u32,
}
