//! Rendering system
//!
//! ## Layers
//!
//! - [`api`]: backend-agnostic handles and the [`api::GraphicsBackend`] trait
//! - [`backends`]: Vulkan and headless immediate implementations
//! - [`device`]: [`GfxDevice`], the single logical rendering context
//! - [`buffer`] / [`vertex`]: immutable geometry uploads
//! - [`batching`] / [`text`]: CPU-side batch builders for sprites and glyphs
//! - [`lighting`]: forward+ light arrays and tile culling
//! - [`renderer`]: built-in shaders and the skybox

pub mod api;
pub mod backends;
pub mod batching;
pub mod buffer;
pub mod device;
pub mod lighting;
pub mod renderer;
pub mod text;
pub mod vertex;

pub use api::{BlendMode, BufferId, ClearFlags, DepthFunc, GraphicsBackend, ShaderId, TextureId};
pub use buffer::VertexBuffer;
pub use device::{FrameStatistics, GfxDevice};
pub use renderer::{BuiltinShaderSources, BuiltinShaders, Renderer};

use thiserror::Error;

/// Rendering errors.
///
/// Only [`RenderError::DeviceLost`] and [`RenderError::SurfaceOutOfDate`] are
/// recoverable: recreate the swapchain with [`GfxDevice::resize`] and
/// continue.
#[derive(Error, Debug)]
pub enum RenderError {
    /// No capable GPU, surface or queue
    #[error("Initialization failed: {0}")]
    InitializationFailed(String),

    /// A buffer, texture or pipeline could not be created
    #[error("Resource creation failed: {0}")]
    ResourceCreationFailed(String),

    /// The device was lost or timed out
    #[error("Device lost: {reason}")]
    DeviceLost {
        /// What the backend reported
        reason: String,
    },

    /// The swapchain no longer matches the surface
    #[error("Surface out of date")]
    SurfaceOutOfDate,

    /// Other backend failure
    #[error("Backend error: {0}")]
    BackendError(String),
}

impl RenderError {
    /// Whether the host can recover by recreating the swapchain
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::DeviceLost { .. } | Self::SurfaceOutOfDate)
    }
}

/// Result type for rendering operations
pub type RenderResult<T> = Result<T, RenderError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recoverable_errors() {
        assert!(RenderError::SurfaceOutOfDate.is_recoverable());
        assert!(RenderError::DeviceLost { reason: "timeout".into() }.is_recoverable());
        assert!(!RenderError::InitializationFailed("no gpu".into()).is_recoverable());
        assert!(!RenderError::BackendError("x".into()).is_recoverable());
    }

    #[test]
    fn test_error_display() {
        let err = RenderError::DeviceLost { reason: "acquire timed out".into() };
        assert_eq!(err.to_string(), "Device lost: acquire timed out");
    }
}
