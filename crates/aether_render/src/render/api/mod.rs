//! Rendering API abstraction
//!
//! Handles and descriptors shared by every backend, plus the
//! [`GraphicsBackend`] trait they implement.

pub mod graphics_backend;
pub mod types;

pub use graphics_backend::{BackendResult, GraphicsBackend};
pub use types::{
    BlendMode, BufferId, ClearFlags, ComputeShaderId, ComputeShaderSource, DepthFunc, DrawCommand,
    DrawUniforms, GeometryUpload, LightBuffers, LightCullDispatch, PassDescriptor, PipelineState,
    ShaderId, ShaderSource, TextureDesc, TextureId, TextureKind,
};
