//! Graphics backend implementations
//!
//! - [`vulkan`]: explicit command buffers, fences and image layout transitions
//! - [`immediate`]: headless, binding implicit in each draw
//!
//! The host picks one at startup, usually through [`create_backend`], and
//! hands it to [`crate::render::GfxDevice`].

pub mod immediate;
pub mod vulkan;

pub use immediate::ImmediateBackend;
pub use vulkan::VulkanBackend;

use raw_window_handle::{HasRawDisplayHandle, HasRawWindowHandle};

use crate::core::config::{BackendKind, RendererConfig};
use crate::render::api::GraphicsBackend;
use crate::render::{RenderError, RenderResult};

/// A window a presenting backend can build a surface for
pub trait WindowSurface: HasRawWindowHandle + HasRawDisplayHandle {}

impl<T: HasRawWindowHandle + HasRawDisplayHandle> WindowSurface for T {}

/// Create the backend named by `config.backend`.
///
/// The Vulkan backend presents to `window` and fails without one. The
/// immediate backend is headless and ignores it.
pub fn create_backend(
    config: &RendererConfig,
    window: Option<&dyn WindowSurface>,
) -> RenderResult<Box<dyn GraphicsBackend>> {
    config.validate().map_err(RenderError::InitializationFailed)?;
    match config.backend {
        BackendKind::Immediate => {
            log::info!("Creating immediate backend ({}x{})", config.width, config.height);
            Ok(Box::new(ImmediateBackend::new(config.width, config.height)))
        }
        BackendKind::Vulkan => {
            let window = window.ok_or_else(|| {
                RenderError::InitializationFailed("the Vulkan backend needs a window to present to".to_string())
            })?;
            Ok(Box::new(VulkanBackend::new(config, window)?))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(backend: BackendKind) -> RendererConfig {
        RendererConfig { width: 320, height: 200, backend, ..RendererConfig::default() }
    }

    #[test]
    fn test_create_immediate_from_config() {
        let backend = create_backend(&config(BackendKind::Immediate), None).unwrap();
        assert_eq!(backend.kind(), BackendKind::Immediate);
        assert_eq!(backend.surface_extent(), (320, 200));
    }

    #[test]
    fn test_vulkan_without_window_fails() {
        let result = create_backend(&config(BackendKind::Vulkan), None);
        assert!(matches!(result, Err(RenderError::InitializationFailed(_))));
    }

    #[test]
    fn test_invalid_config_rejected_before_creation() {
        let mut bad = config(BackendKind::Immediate);
        bad.width = 0;
        assert!(matches!(create_backend(&bad, None), Err(RenderError::InitializationFailed(_))));
    }
}
