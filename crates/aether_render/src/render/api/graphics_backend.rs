//! Backend abstraction trait for the graphics device
//!
//! [`GraphicsBackend`] is the capability set every graphics API must provide.
//! [`crate::render::GfxDevice`] sits on top of it, validates call order and
//! keeps statistics. Backends only translate.

use std::any::Any;

use crate::core::config::BackendKind;
use crate::render::api::types::{
    BufferId, ClearFlags, ComputeShaderId, ComputeShaderSource, DrawCommand, GeometryUpload,
    LightBuffers, LightCullDispatch, PassDescriptor, ShaderId, ShaderSource, TextureDesc, TextureId,
};
use crate::render::RenderError;

/// Result type for backend operations
pub type BackendResult<T> = Result<T, RenderError>;

/// Graphics API backend.
///
/// Implementations may assume the device already enforced pass nesting:
/// `begin_pass`/`end_pass` alternate, draws and binds only happen inside a
/// pass, and `present`/`cull_lights` only happen outside one.
pub trait GraphicsBackend {
    /// Which backend this is
    fn kind(&self) -> BackendKind;

    /// Current swapchain size in pixels
    fn surface_extent(&self) -> (u32, u32);

    /// Size of a texture, if it exists
    fn texture_extent(&self, texture: TextureId) -> Option<(u32, u32)>;

    /// Recreate size-dependent resources after the surface changed
    fn resize(&mut self, width: u32, height: u32) -> BackendResult<()>;

    /// Upload immutable geometry
    fn create_geometry(&mut self, upload: &GeometryUpload<'_>) -> BackendResult<BufferId>;

    /// Release geometry. Unknown ids are ignored.
    fn destroy_geometry(&mut self, buffer: BufferId);

    /// Upload an RGBA8 texture or cube map
    fn create_texture(&mut self, desc: &TextureDesc, pixels: &[u8]) -> BackendResult<TextureId>;

    /// Create a color target that can later be sampled
    fn create_render_texture(&mut self, width: u32, height: u32) -> BackendResult<TextureId>;

    /// Release a texture. Unknown ids are ignored.
    fn destroy_texture(&mut self, texture: TextureId);

    /// Create a graphics program
    fn create_shader(&mut self, source: &ShaderSource) -> BackendResult<ShaderId>;

    /// Create a compute program
    fn create_compute_shader(&mut self, source: &ComputeShaderSource) -> BackendResult<ComputeShaderId>;

    /// Start recording a pass into the described target
    fn begin_pass(&mut self, pass: &PassDescriptor) -> BackendResult<()>;

    /// Clear attachments of the open pass
    fn clear(&mut self, flags: ClearFlags, color: [f32; 4]) -> BackendResult<()>;

    /// Make geometry the source for following draws
    fn bind_geometry(&mut self, buffer: BufferId) -> BackendResult<()>;

    /// Make a texture the active sampler
    fn bind_texture(&mut self, texture: TextureId) -> BackendResult<()>;

    /// Issue an indexed draw
    fn draw_indexed(&mut self, draw: &DrawCommand) -> BackendResult<()>;

    /// Finish the open pass
    fn end_pass(&mut self) -> BackendResult<()>;

    /// Copy light arrays into GPU-visible storage
    fn upload_lights(&mut self, lights: &LightBuffers<'_>) -> BackendResult<()>;

    /// Build per-tile light lists
    fn cull_lights(&mut self, dispatch: &LightCullDispatch) -> BackendResult<()>;

    /// Submit everything recorded this frame and show it
    fn present(&mut self) -> BackendResult<()>;

    /// Block until the GPU has finished all submitted work
    fn wait_idle(&mut self) -> BackendResult<()>;

    /// Destroy every GPU object. Safe to call more than once.
    fn release_gpu_objects(&mut self);

    /// Downcast support for backend-specific inspection
    fn as_any(&self) -> &dyn Any;
}
