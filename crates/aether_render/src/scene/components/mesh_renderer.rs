//! Mesh renderer component

use std::rc::Rc;

use crate::render::api::{BlendMode, DepthFunc, TextureId};
use crate::render::buffer::VertexBuffer;
use crate::render::vertex::{Face, VertexPTN, VertexPTNTC};
use crate::render::{RenderResult, Renderer};

use super::Renderable;

/// Vertex data of a mesh in one of the lit layouts
#[derive(Debug, Clone, PartialEq)]
pub enum MeshVertices {
    /// Position, uv, normal
    Ptn(Vec<VertexPTN>),
    /// Position, uv, normal, tangent, color
    Ptntc(Vec<VertexPTNTC>),
}

impl MeshVertices {
    /// Number of vertices
    pub fn len(&self) -> usize {
        match self {
            Self::Ptn(vertices) => vertices.len(),
            Self::Ptntc(vertices) => vertices.len(),
        }
    }

    /// Whether there are no vertices
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Triangle mesh supplied by the host's asset loader
#[derive(Debug, Clone, PartialEq)]
pub struct MeshData {
    /// Vertices
    pub vertices: MeshVertices,
    /// Triangles
    pub faces: Vec<Face>,
}

/// Draws a shared mesh with the lit-mesh program
#[derive(Debug, Default)]
pub struct MeshRendererComponent {
    mesh: Option<Rc<MeshData>>,
    texture: Option<TextureId>,
    buffer: VertexBuffer,
    dirty: bool,
}

impl MeshRendererComponent {
    /// Renderer with no mesh
    pub fn new() -> Self {
        Self::default()
    }

    /// Mesh, if set
    pub fn mesh(&self) -> Option<&Rc<MeshData>> {
        self.mesh.as_ref()
    }

    /// Set the mesh; uploaded on the next render
    pub fn set_mesh(&mut self, mesh: Rc<MeshData>) {
        self.mesh = Some(mesh);
        self.dirty = true;
    }

    /// Albedo texture
    pub fn texture(&self) -> Option<TextureId> {
        self.texture
    }

    /// Set or clear the albedo texture
    pub fn set_texture(&mut self, texture: Option<TextureId>) {
        self.texture = texture;
    }
}

impl Renderable for MeshRendererComponent {
    fn render(&mut self, renderer: &mut Renderer, projection_model: &[f32; 16]) -> RenderResult<()> {
        let shader = renderer.shaders().mesh;
        let device = renderer.device_mut();

        if self.dirty {
            if let Some(mesh) = &self.mesh {
                match &mesh.vertices {
                    MeshVertices::Ptn(vertices) => self.buffer.generate(device, &mesh.faces, vertices)?,
                    MeshVertices::Ptntc(vertices) => self.buffer.generate(device, &mesh.faces, vertices)?,
                }
            }
            self.dirty = false;
        }
        if self.buffer.is_empty() {
            return Ok(());
        }

        device.set_pipeline(shader, BlendMode::Off, DepthFunc::LessOrEqualWriteOn);
        device.set_projection_model(projection_model);
        if let Some(texture) = self.texture {
            device.set_texture(texture)?;
        }
        self.buffer.bind(device)?;
        self.buffer.draw(device)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::{to_column_major, Mat4};
    use crate::render::backends::immediate::ImmediateBackend;
    use crate::render::vertex::VertexFormat;
    use crate::render::{BuiltinShaderSources, GfxDevice};

    #[test]
    fn test_mesh_draw_uses_depth_and_format() {
        let device = GfxDevice::new(Box::new(ImmediateBackend::new(64, 64)));
        let mut renderer = Renderer::new(device, &BuiltinShaderSources::headless()).unwrap();
        let mesh = Rc::new(MeshData {
            vertices: MeshVertices::Ptntc(vec![VertexPTNTC::default(); 3]),
            faces: vec![Face::new(0, 1, 2)],
        });

        let mut component = MeshRendererComponent::new();
        component.set_mesh(mesh);

        renderer.device_mut().begin_render_pass_and_command_buffer().unwrap();
        component.render(&mut renderer, &to_column_major(&Mat4::identity())).unwrap();
        renderer.device_mut().end_render_pass_and_command_buffer().unwrap();

        assert_eq!(component.buffer.format(), Some(VertexFormat::Ptntc));
        let backend = renderer.device().backend().as_any().downcast_ref::<ImmediateBackend>().unwrap();
        let draw = *backend.current_frame()[0].draws().next().unwrap();
        assert_eq!(draw.depth, DepthFunc::LessOrEqualWriteOn);
        assert_eq!(draw.index_count, 3);
        assert_eq!(draw.texture, None);
    }
}
