//! Vertex/index buffer abstraction
//!
//! A [`VertexBuffer`] owns one generation of immutable geometry on the GPU.
//! `generate` fixes the vertex format and element count; calling it again
//! releases the old generation and uploads a new one.

use crate::render::api::{BufferId, GeometryUpload};
use crate::render::device::{GfxDevice, ReleaseQueue};
use crate::render::vertex::{Face, Vertex, VertexFormat};
use crate::render::RenderResult;

/// GPU-resident triangle list with 16-bit indices
#[derive(Debug, Default)]
pub struct VertexBuffer {
    gpu: Option<BufferId>,
    format: Option<VertexFormat>,
    element_count: u32,
    vertex_count: u32,
    release_queue: Option<ReleaseQueue>,
}

impl VertexBuffer {
    /// Create an empty buffer with no format yet
    pub fn new() -> Self {
        Self::default()
    }

    /// Upload `faces` and `vertices`, replacing any previous contents.
    ///
    /// # Panics
    ///
    /// If a face references a vertex outside `vertices`, or if `vertices` does
    /// not fit 16-bit indexing.
    pub fn generate<V: Vertex>(&mut self, device: &mut GfxDevice, faces: &[Face], vertices: &[V]) -> RenderResult<()> {
        assert!(
            vertices.len() <= usize::from(u16::MAX) + 1,
            "{} vertices exceed 16-bit indexing",
            vertices.len()
        );
        for (i, face) in faces.iter().enumerate() {
            assert!(
                usize::from(face.max_index()) < vertices.len(),
                "face {i} references vertex {} but only {} vertices were given",
                face.max_index(),
                vertices.len()
            );
        }

        if let Some(old) = self.gpu.take() {
            device.destroy_geometry(old);
        }

        self.format = Some(V::FORMAT);
        self.element_count = (faces.len() * 3) as u32;
        self.vertex_count = vertices.len() as u32;

        if faces.is_empty() {
            return Ok(());
        }

        let upload = GeometryUpload {
            format: V::FORMAT,
            vertex_bytes: bytemuck::cast_slice(vertices),
            indices: bytemuck::cast_slice(faces),
            vertex_count: self.vertex_count,
        };
        let id = device.create_geometry(&upload)?;
        log::debug!("Generated {:?}: {} vertices, {} faces ({:?})", id, vertices.len(), faces.len(), V::FORMAT);

        self.gpu = Some(id);
        self.release_queue = Some(device.release_queue());
        Ok(())
    }

    /// Make this buffer the source for following draws
    pub fn bind(&self, device: &mut GfxDevice) -> RenderResult<()> {
        match self.gpu {
            Some(id) => device.bind_geometry(id),
            None => Ok(()),
        }
    }

    /// Draw every triangle
    pub fn draw(&self, device: &mut GfxDevice) -> RenderResult<()> {
        self.draw_range(device, 0, self.face_count())
    }

    /// Draw triangles `[start, end)` with the device's current pipeline.
    ///
    /// # Panics
    ///
    /// If the range is reversed or past the last face.
    pub fn draw_range(&self, device: &mut GfxDevice, start: u32, end: u32) -> RenderResult<()> {
        assert!(
            start <= end && end <= self.face_count(),
            "draw range [{start}, {end}) outside buffer with {} faces",
            self.face_count()
        );
        match (self.gpu, self.format) {
            (Some(id), Some(format)) => device.draw_faces(id, format, start, end),
            _ => {
                device.count_empty_draw();
                Ok(())
            }
        }
    }

    /// Bytes per vertex.
    ///
    /// # Panics
    ///
    /// If `generate` was never called.
    pub fn stride(&self) -> usize {
        match self.format {
            Some(format) => format.stride(),
            None => panic!("vertex buffer has no format until generate() is called"),
        }
    }

    /// Vertex layout, once generated
    pub fn format(&self) -> Option<VertexFormat> {
        self.format
    }

    /// Number of indices (`faces * 3`)
    pub fn element_count(&self) -> u32 {
        self.element_count
    }

    /// Number of triangles
    pub fn face_count(&self) -> u32 {
        self.element_count / 3
    }

    /// Number of vertices uploaded
    pub fn vertex_count(&self) -> u32 {
        self.vertex_count
    }

    /// Backend id of the current generation
    pub fn gpu_id(&self) -> Option<BufferId> {
        self.gpu
    }

    /// Whether there is nothing to draw
    pub fn is_empty(&self) -> bool {
        self.gpu.is_none()
    }

    /// Release the GPU copy now instead of on drop
    pub fn release(&mut self, device: &mut GfxDevice) {
        if let Some(id) = self.gpu.take() {
            device.destroy_geometry(id);
        }
        self.element_count = 0;
        self.vertex_count = 0;
    }
}

impl Drop for VertexBuffer {
    fn drop(&mut self) {
        if let (Some(id), Some(queue)) = (self.gpu.take(), &self.release_queue) {
            queue.push(id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::backends::immediate::ImmediateBackend;
    use crate::render::vertex::{VertexPTC, VertexPTNTC};

    fn device() -> GfxDevice {
        GfxDevice::new(Box::new(ImmediateBackend::new(16, 16)))
    }

    fn recorded_draws(device: &GfxDevice) -> usize {
        let backend = device.backend().as_any().downcast_ref::<ImmediateBackend>().unwrap();
        backend.current_frame().iter().map(|pass| pass.draws().count()).sum()
    }

    #[test]
    fn test_generate_fixes_format_and_counts() {
        let mut device = device();
        let mut buffer = VertexBuffer::new();
        let vertices = [VertexPTNTC::default(); 3];

        buffer.generate(&mut device, &[Face::new(0, 1, 2)], &vertices).unwrap();

        assert_eq!(buffer.format(), Some(VertexFormat::Ptntc));
        assert_eq!(buffer.element_count(), 3);
        assert_eq!(buffer.face_count(), 1);
        assert_eq!(buffer.stride(), 64);
    }

    #[test]
    fn test_regenerate_releases_previous_generation() {
        let mut device = device();
        let mut buffer = VertexBuffer::new();
        let vertices = [VertexPTC::default(); 3];

        buffer.generate(&mut device, &[Face::new(0, 1, 2)], &vertices).unwrap();
        let first = buffer.gpu_id().unwrap();
        buffer.generate(&mut device, &[Face::new(2, 1, 0)], &vertices).unwrap();

        assert_ne!(buffer.gpu_id(), Some(first));
        assert_eq!(device.release_queue().drain(), vec![first]);
    }

    #[test]
    fn test_empty_generate_is_drawable_noop() {
        let mut device = device();
        let mut buffer = VertexBuffer::new();
        buffer.generate::<VertexPTC>(&mut device, &[], &[]).unwrap();

        assert!(buffer.is_empty());
        assert_eq!(buffer.format(), Some(VertexFormat::Ptc));

        device.begin_render_pass_and_command_buffer().unwrap();
        buffer.draw(&mut device).unwrap();
        device.end_render_pass_and_command_buffer().unwrap();
        assert_eq!(device.statistics().draw_calls, 1);
        assert_eq!(recorded_draws(&device), 0);
    }

    #[test]
    #[should_panic(expected = "references vertex 3")]
    fn test_face_index_out_of_range_panics() {
        let mut device = device();
        let mut buffer = VertexBuffer::new();
        let vertices = [VertexPTC::default(); 3];
        let _ = buffer.generate(&mut device, &[Face::new(0, 1, 3)], &vertices);
    }

    #[test]
    #[should_panic(expected = "no format")]
    fn test_stride_before_generate_panics() {
        let _ = VertexBuffer::new().stride();
    }
}
