//! Graphics device
//!
//! [`GfxDevice`] is the single logical rendering context. It owns the backend,
//! enforces the begin/end/present ordering, tracks the currently bound state
//! and counts per-pass statistics. There are no globals: the device is created
//! once at startup and passed by reference to everything that draws.

use std::cell::RefCell;
use std::rc::Rc;

use crate::core::config::BackendKind;
use crate::foundation::math::Vec4;
use crate::render::api::{
    BlendMode, BufferId, ClearFlags, ComputeShaderId, ComputeShaderSource, DepthFunc, DrawCommand,
    DrawUniforms, GeometryUpload, GraphicsBackend, LightBuffers, LightCullDispatch, PassDescriptor,
    PipelineState, ShaderId, ShaderSource, TextureDesc, TextureId, TextureKind,
};
use crate::render::buffer::VertexBuffer;
use crate::render::vertex::VertexFormat;
use crate::render::RenderResult;

/// Counters reset at the start of every camera pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStatistics {
    /// Indexed draws issued
    pub draw_calls: u32,
    /// Texture bind operations
    pub texture_binds: u32,
    /// Render target switches
    pub render_target_binds: u32,
    /// Vertex buffer binds
    pub vertex_buffer_binds: u32,
    /// Shader changes
    pub shader_binds: u32,
}

/// Geometry ids waiting to be destroyed once the GPU is done with them.
///
/// Vertex buffers hold a clone so that dropping one never needs the device.
#[derive(Debug, Clone, Default)]
pub struct ReleaseQueue(Rc<RefCell<Vec<BufferId>>>);

impl ReleaseQueue {
    /// Schedule a buffer for destruction
    pub fn push(&self, buffer: BufferId) {
        self.0.borrow_mut().push(buffer);
    }

    /// Take every scheduled buffer
    pub fn drain(&self) -> Vec<BufferId> {
        std::mem::take(&mut *self.0.borrow_mut())
    }

    /// Number of buffers waiting
    pub fn len(&self) -> usize {
        self.0.borrow().len()
    }

    /// Whether nothing is waiting
    pub fn is_empty(&self) -> bool {
        self.0.borrow().is_empty()
    }
}

/// The logical graphics device.
pub struct GfxDevice {
    backend: Box<dyn GraphicsBackend>,
    statistics: FrameStatistics,
    clear_color: Vec4,
    render_target: Option<TextureId>,
    pass_open: bool,
    bound_buffer: Option<BufferId>,
    bound_texture: Option<TextureId>,
    pipeline: Option<PipelineState>,
    uniforms: DrawUniforms,
    release_queue: ReleaseQueue,
    frames_presented: u64,
    released: bool,
}

impl GfxDevice {
    /// Wrap an initialized backend.
    ///
    /// Backend constructors perform the one-time GPU setup and fail with
    /// [`crate::render::RenderError::InitializationFailed`] when no capable
    /// GPU or surface exists.
    pub fn new(backend: Box<dyn GraphicsBackend>) -> Self {
        let (width, height) = backend.surface_extent();
        log::info!("Graphics device ready: {:?} backend, {}x{}", backend.kind(), width, height);

        Self {
            backend,
            statistics: FrameStatistics::default(),
            clear_color: Vec4::new(0.0, 0.0, 0.0, 1.0),
            render_target: None,
            pass_open: false,
            bound_buffer: None,
            bound_texture: None,
            pipeline: None,
            uniforms: DrawUniforms::default(),
            release_queue: ReleaseQueue::default(),
            frames_presented: 0,
            released: false,
        }
    }

    /// Backend kind
    pub fn backend_kind(&self) -> BackendKind {
        self.backend.kind()
    }

    /// Borrow the backend, e.g. to downcast for inspection
    pub fn backend(&self) -> &dyn GraphicsBackend {
        self.backend.as_ref()
    }

    /// Swapchain size in pixels
    pub fn surface_extent(&self) -> (u32, u32) {
        self.backend.surface_extent()
    }

    /// Size of the current render target in pixels
    pub fn target_extent(&self) -> (u32, u32) {
        self.render_target
            .and_then(|texture| self.backend.texture_extent(texture))
            .unwrap_or_else(|| self.backend.surface_extent())
    }

    /// Recreate the swapchain after a resize or a recoverable surface error
    pub fn resize(&mut self, width: u32, height: u32) -> RenderResult<()> {
        assert!(!self.pass_open, "resize called inside a render pass");
        log::info!("Resizing surface to {}x{}", width, height);
        self.backend.resize(width, height)
    }

    // ---- resources ----

    /// Upload geometry. Used by [`VertexBuffer::generate`].
    pub(crate) fn create_geometry(&mut self, upload: &GeometryUpload<'_>) -> RenderResult<BufferId> {
        self.backend.create_geometry(upload)
    }

    /// Queue geometry for destruction after the next present
    pub(crate) fn destroy_geometry(&mut self, buffer: BufferId) {
        if self.bound_buffer == Some(buffer) {
            self.bound_buffer = None;
        }
        self.release_queue.push(buffer);
    }

    /// Handle vertex buffers use to release themselves on drop
    pub fn release_queue(&self) -> ReleaseQueue {
        self.release_queue.clone()
    }

    /// Upload a 2D RGBA8 texture
    pub fn create_texture_2d(&mut self, width: u32, height: u32, rgba: &[u8]) -> RenderResult<TextureId> {
        let desc = TextureDesc { width, height, kind: TextureKind::Texture2D };
        assert_eq!(rgba.len(), desc.byte_len(), "texture data does not match {width}x{height} RGBA8");
        self.backend.create_texture(&desc, rgba)
    }

    /// Upload a cube map from six square RGBA8 faces (+X, -X, +Y, -Y, +Z, -Z)
    pub fn create_texture_cube(&mut self, size: u32, faces: [&[u8]; 6]) -> RenderResult<TextureId> {
        let desc = TextureDesc { width: size, height: size, kind: TextureKind::Cube };
        let face_len = desc.byte_len() / 6;
        let mut pixels = Vec::with_capacity(desc.byte_len());
        for face in faces {
            assert_eq!(face.len(), face_len, "cube face does not match {size}x{size} RGBA8");
            pixels.extend_from_slice(face);
        }
        self.backend.create_texture(&desc, &pixels)
    }

    /// Create a render texture usable as a camera target and as a sampler
    pub fn create_render_texture(&mut self, width: u32, height: u32) -> RenderResult<TextureId> {
        assert!(width > 0 && height > 0, "render texture must have a non-zero size");
        self.backend.create_render_texture(width, height)
    }

    /// Release a texture
    pub fn destroy_texture(&mut self, texture: TextureId) {
        assert_ne!(self.render_target, Some(texture), "cannot destroy the active render target");
        if self.bound_texture == Some(texture) {
            self.bound_texture = None;
        }
        self.backend.destroy_texture(texture);
    }

    /// Create a graphics program
    pub fn create_shader(&mut self, source: &ShaderSource) -> RenderResult<ShaderId> {
        log::debug!("Creating shader '{}'", source.name);
        self.backend.create_shader(source)
    }

    /// Create a compute program
    pub fn create_compute_shader(&mut self, source: &ComputeShaderSource) -> RenderResult<ComputeShaderId> {
        log::debug!("Creating compute shader '{}'", source.name);
        self.backend.create_compute_shader(source)
    }

    // ---- pass lifecycle ----

    /// Redirect subsequent passes to a render texture, or to the swapchain with `None`
    pub fn set_render_target(&mut self, target: Option<TextureId>) {
        assert!(!self.pass_open, "render target changed inside a render pass");
        if self.render_target != target {
            self.render_target = target;
            self.statistics.render_target_binds += 1;
        }
    }

    /// Currently targeted render texture
    pub fn render_target(&self) -> Option<TextureId> {
        self.render_target
    }

    /// Color used by pass-begin and by `clear_screen`
    pub fn set_clear_color(&mut self, color: Vec4) {
        self.clear_color = color;
    }

    /// Current clear color
    pub fn clear_color(&self) -> Vec4 {
        self.clear_color
    }

    /// Open a render pass on the current target
    pub fn begin_render_pass_and_command_buffer(&mut self) -> RenderResult<()> {
        assert!(!self.pass_open, "begin_render_pass_and_command_buffer called twice");
        self.backend.begin_pass(&PassDescriptor {
            target: self.render_target,
            clear_color: self.clear_color.into(),
        })?;
        self.pass_open = true;
        self.bound_buffer = None;
        self.bound_texture = None;
        self.pipeline = None;
        Ok(())
    }

    /// Close the open render pass
    pub fn end_render_pass_and_command_buffer(&mut self) -> RenderResult<()> {
        assert!(self.pass_open, "end_render_pass_and_command_buffer without a matching begin");
        self.pass_open = false;
        self.backend.end_pass()
    }

    /// Whether a pass is being recorded
    pub fn is_recording(&self) -> bool {
        self.pass_open
    }

    /// Clear attachments of the open pass
    pub fn clear_screen(&mut self, flags: ClearFlags) -> RenderResult<()> {
        assert!(self.pass_open, "clear_screen outside a render pass");
        if flags.is_empty() {
            return Ok(());
        }
        self.backend.clear(flags, self.clear_color.into())
    }

    // ---- statistics ----

    /// Zero all counters
    pub fn reset_frame_statistics(&mut self) {
        self.statistics = FrameStatistics::default();
    }

    /// Counters since the last reset
    pub fn statistics(&self) -> FrameStatistics {
        self.statistics
    }

    /// Frames presented since creation
    pub fn frames_presented(&self) -> u64 {
        self.frames_presented
    }

    // ---- binding and drawing ----

    /// Select the shader and fixed-function state for following draws
    pub fn set_pipeline(&mut self, shader: ShaderId, blend: BlendMode, depth: DepthFunc) {
        let state = PipelineState { shader, blend, depth };
        if self.pipeline.map(|p| p.shader) != Some(shader) {
            self.statistics.shader_binds += 1;
        }
        self.pipeline = Some(state);
    }

    /// Per-draw projection * model matrix, column-major
    pub fn set_projection_model(&mut self, projection_model: &[f32; 16]) {
        self.uniforms.projection_model = *projection_model;
    }

    /// Bind a texture as the active sampler
    pub fn set_texture(&mut self, texture: TextureId) -> RenderResult<()> {
        assert!(self.pass_open, "set_texture outside a render pass");
        self.backend.bind_texture(texture)?;
        self.bound_texture = Some(texture);
        self.statistics.texture_binds += 1;
        Ok(())
    }

    /// Bind a buffer's geometry. Used by [`VertexBuffer::bind`].
    pub(crate) fn bind_geometry(&mut self, buffer: BufferId) -> RenderResult<()> {
        assert!(self.pass_open, "vertex buffer bound outside a render pass");
        self.backend.bind_geometry(buffer)?;
        self.bound_buffer = Some(buffer);
        self.statistics.vertex_buffer_binds += 1;
        Ok(())
    }

    /// Draw triangles `[start, end)` of `buffer` with the given state.
    pub fn draw(
        &mut self,
        buffer: &VertexBuffer,
        start: u32,
        end: u32,
        shader: ShaderId,
        blend: BlendMode,
        depth: DepthFunc,
    ) -> RenderResult<()> {
        assert!(
            start <= end && end <= buffer.face_count(),
            "draw range [{start}, {end}) outside buffer with {} faces",
            buffer.face_count()
        );
        self.set_pipeline(shader, blend, depth);
        buffer.draw_range(self, start, end)
    }

    /// Issue triangles `[start, end)` with the current pipeline. Used by
    /// [`VertexBuffer::draw_range`], which validated the range.
    pub(crate) fn draw_faces(
        &mut self,
        buffer: BufferId,
        format: VertexFormat,
        start: u32,
        end: u32,
    ) -> RenderResult<()> {
        if start == end {
            self.count_empty_draw();
            return Ok(());
        }
        assert!(self.pass_open, "draw outside a render pass");
        let pipeline = match self.pipeline {
            Some(pipeline) => pipeline,
            None => panic!("draw issued before set_pipeline"),
        };
        if self.bound_buffer != Some(buffer) {
            self.bind_geometry(buffer)?;
        }

        let command = DrawCommand {
            buffer,
            format,
            first_index: start * 3,
            index_count: (end - start) * 3,
            pipeline,
            uniforms: self.uniforms,
        };
        log::trace!("draw {:?} faces [{}, {})", buffer, start, end);
        self.backend.draw_indexed(&command)?;
        self.statistics.draw_calls += 1;
        Ok(())
    }

    /// Count a draw with no triangles. Nothing reaches the backend.
    pub(crate) fn count_empty_draw(&mut self) {
        assert!(self.pass_open, "draw outside a render pass");
        self.statistics.draw_calls += 1;
    }

    // ---- lights ----

    /// Upload light arrays
    pub fn upload_lights(&mut self, lights: &LightBuffers<'_>) -> RenderResult<()> {
        self.backend.upload_lights(lights)
    }

    /// Run tile light culling. Must happen outside a render pass.
    pub fn dispatch_light_culling(&mut self, dispatch: &LightCullDispatch) -> RenderResult<()> {
        assert!(!self.pass_open, "light culling dispatched inside a render pass");
        self.backend.cull_lights(dispatch)
    }

    // ---- frame end and teardown ----

    /// Submit the frame and present it.
    ///
    /// Blocks on the swapchain acquire and on queue completion. Recoverable
    /// surface and device failures come back as errors; call [`Self::resize`]
    /// and continue.
    pub fn present(&mut self) -> RenderResult<()> {
        assert!(!self.pass_open, "present called inside a render pass");
        let result = self.backend.present();
        self.flush_releases();
        result?;
        self.frames_presented += 1;
        Ok(())
    }

    /// Wait for the GPU to go idle
    pub fn wait_idle(&mut self) -> RenderResult<()> {
        self.backend.wait_idle()
    }

    /// Destroy every GPU object. Safe to call more than once.
    pub fn release_gpu_objects(&mut self) {
        if self.released {
            return;
        }
        self.flush_releases();
        self.backend.release_gpu_objects();
        self.released = true;
        log::info!("Released GPU objects after {} frames", self.frames_presented);
    }

    fn flush_releases(&mut self) {
        for buffer in self.release_queue.drain() {
            self.backend.destroy_geometry(buffer);
        }
    }
}

impl Drop for GfxDevice {
    fn drop(&mut self) {
        self.release_gpu_objects();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::backends::immediate::{ImmediateBackend, RecordedCommand};
    use crate::render::vertex::{Face, VertexPTC};

    fn device() -> GfxDevice {
        GfxDevice::new(Box::new(ImmediateBackend::new(64, 64)))
    }

    fn immediate(device: &GfxDevice) -> &ImmediateBackend {
        device.backend().as_any().downcast_ref::<ImmediateBackend>().unwrap()
    }

    fn quad(device: &mut GfxDevice) -> VertexBuffer {
        let vertices = [VertexPTC::default(); 4];
        let faces = [Face::new(0, 1, 2), Face::new(2, 3, 0)];
        let mut buffer = VertexBuffer::new();
        buffer.generate(device, &faces, &vertices).unwrap();
        buffer
    }

    #[test]
    fn test_draw_counts_and_records() {
        let mut device = device();
        let shader = device.create_shader(&ShaderSource::named("flat")).unwrap();
        let buffer = quad(&mut device);

        device.begin_render_pass_and_command_buffer().unwrap();
        device.reset_frame_statistics();
        device.draw(&buffer, 0, 2, shader, BlendMode::Off, DepthFunc::LessOrEqualWriteOn).unwrap();
        device.end_render_pass_and_command_buffer().unwrap();

        let stats = device.statistics();
        assert_eq!(stats.draw_calls, 1);
        assert_eq!(stats.shader_binds, 1);
        assert_eq!(stats.vertex_buffer_binds, 1);

        let frame = immediate(&device).current_frame();
        assert_eq!(frame.len(), 1);
        let draws: Vec<_> = frame[0].draws().collect();
        assert_eq!(draws.len(), 1);
        assert_eq!(draws[0].first_index, 0);
        assert_eq!(draws[0].index_count, 6);
    }

    #[test]
    fn test_empty_range_counts_without_reaching_backend() {
        let mut device = device();
        let shader = device.create_shader(&ShaderSource::named("flat")).unwrap();
        let buffer = quad(&mut device);

        device.begin_render_pass_and_command_buffer().unwrap();
        device.reset_frame_statistics();
        device.draw(&buffer, 1, 1, shader, BlendMode::Off, DepthFunc::LessOrEqualWriteOn).unwrap();
        device.draw(&buffer, 0, 2, shader, BlendMode::Off, DepthFunc::LessOrEqualWriteOn).unwrap();
        device.end_render_pass_and_command_buffer().unwrap();

        assert_eq!(device.statistics().draw_calls, 2);
        assert_eq!(immediate(&device).current_frame()[0].draws().count(), 1);
    }

    #[test]
    #[should_panic(expected = "draw range")]
    fn test_draw_range_beyond_faces_panics() {
        let mut device = device();
        let shader = device.create_shader(&ShaderSource::named("flat")).unwrap();
        let buffer = quad(&mut device);

        device.begin_render_pass_and_command_buffer().unwrap();
        let _ = device.draw(&buffer, 0, 3, shader, BlendMode::Off, DepthFunc::NoneWriteOff);
    }

    #[test]
    #[should_panic(expected = "called twice")]
    fn test_nested_begin_panics() {
        let mut device = device();
        device.begin_render_pass_and_command_buffer().unwrap();
        let _ = device.begin_render_pass_and_command_buffer();
    }

    #[test]
    #[should_panic(expected = "inside a render pass")]
    fn test_present_inside_pass_panics() {
        let mut device = device();
        device.begin_render_pass_and_command_buffer().unwrap();
        let _ = device.present();
    }

    #[test]
    fn test_clear_uses_current_color() {
        let mut device = device();
        device.set_clear_color(Vec4::new(0.2, 0.3, 0.4, 1.0));
        device.begin_render_pass_and_command_buffer().unwrap();
        device.clear_screen(ClearFlags::COLOR | ClearFlags::DEPTH).unwrap();
        device.end_render_pass_and_command_buffer().unwrap();

        let frame = immediate(&device).current_frame();
        assert_eq!(
            frame[0].commands,
            vec![RecordedCommand::Clear {
                flags: ClearFlags::COLOR | ClearFlags::DEPTH,
                color: [0.2, 0.3, 0.4, 1.0],
            }]
        );
    }

    #[test]
    fn test_render_target_switch_counts_once() {
        let mut device = device();
        let target = device.create_render_texture(32, 32).unwrap();

        device.set_render_target(Some(target));
        device.set_render_target(Some(target));
        assert_eq!(device.statistics().render_target_binds, 1);
        assert_eq!(device.target_extent(), (32, 32));

        device.set_render_target(None);
        assert_eq!(device.target_extent(), (64, 64));
    }

    #[test]
    fn test_present_moves_frame_and_flushes_releases() {
        let mut device = device();
        let buffer = quad(&mut device);
        assert_eq!(immediate(&device).geometry_count(), 1);

        drop(buffer);
        assert_eq!(device.release_queue().len(), 1);

        device.begin_render_pass_and_command_buffer().unwrap();
        device.end_render_pass_and_command_buffer().unwrap();
        device.present().unwrap();

        let backend = immediate(&device);
        assert_eq!(backend.geometry_count(), 0);
        assert_eq!(backend.last_frame().len(), 1);
        assert!(backend.current_frame().is_empty());
        assert_eq!(device.frames_presented(), 1);
    }

    #[test]
    fn test_release_is_idempotent() {
        let mut device = device();
        let _buffer = quad(&mut device);

        device.release_gpu_objects();
        device.release_gpu_objects();

        assert_eq!(immediate(&device).geometry_count(), 0);
    }
}
