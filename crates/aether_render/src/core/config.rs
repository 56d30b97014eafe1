//! # Renderer Configuration
//!
//! Configuration structures for the graphics device, the scene component pools
//! and logging. All of them can be loaded from TOML or RON through [`Config`].
//!
//! ## Configuration Categories
//!
//! - **Renderer Config**: backend selection, surface size, validation, present timeout
//! - **Pool Config**: fixed capacities of the scene component pools
//! - **Logging Config**: default log filter

use serde::{Deserialize, Serialize};

pub use crate::config::{Config, ConfigError};

/// Graphics backend selected at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// Explicit command-buffer backend on Vulkan
    #[default]
    Vulkan,
    /// Headless immediate-mode backend
    Immediate,
}

/// # Renderer Configuration
///
/// Settings consumed when the graphics device is created.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    /// Application name for Vulkan instance creation
    pub application_name: String,
    /// Initial surface width in pixels
    pub width: u32,
    /// Initial surface height in pixels
    pub height: u32,
    /// Backend to create
    pub backend: BackendKind,
    /// Whether to enable Vulkan validation layers (None = debug builds only)
    pub enable_validation: Option<bool>,
    /// Prefer a mailbox present mode over FIFO when available
    pub prefer_mailbox: bool,
    /// Upper bound on the swapchain image acquire wait. None waits forever.
    pub present_timeout_ms: Option<u64>,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            application_name: "Aether Application".to_string(),
            width: 1280,
            height: 720,
            backend: BackendKind::default(),
            enable_validation: None,
            prefer_mailbox: false,
            present_timeout_ms: None,
        }
    }
}

impl RendererConfig {
    /// Create a new renderer configuration
    pub fn new(application_name: impl Into<String>) -> Self {
        Self {
            application_name: application_name.into(),
            ..Default::default()
        }
    }

    /// Set the initial surface size
    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    /// Select the backend
    pub fn with_backend(mut self, backend: BackendKind) -> Self {
        self.backend = backend;
        self
    }

    /// Force validation layers on or off
    pub fn with_validation(mut self, enable: bool) -> Self {
        self.enable_validation = Some(enable);
        self
    }

    /// Bound the acquire wait in `present`
    pub fn with_present_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.present_timeout_ms = Some(timeout_ms);
        self
    }

    /// Whether validation layers should be enabled for this build
    pub fn validation_enabled(&self) -> bool {
        self.enable_validation.unwrap_or(cfg!(debug_assertions))
    }

    /// Acquire timeout in nanoseconds as Vulkan expects it
    pub fn present_timeout_ns(&self) -> u64 {
        self.present_timeout_ms
            .map_or(u64::MAX, |ms| ms.saturating_mul(1_000_000))
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.width == 0 || self.height == 0 {
            return Err(format!("surface size must be non-zero, got {}x{}", self.width, self.height));
        }
        if self.application_name.contains('\0') {
            return Err("application name must not contain NUL bytes".to_string());
        }
        if self.present_timeout_ms == Some(0) {
            return Err("present timeout must be positive when set".to_string());
        }
        Ok(())
    }
}

/// # Pool Configuration
///
/// Capacities of the fixed-size scene pools.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Maximum live game objects
    pub game_objects: usize,
    /// Maximum transform components
    pub transforms: usize,
    /// Maximum camera components
    pub cameras: usize,
    /// Maximum sprite renderer components
    pub sprite_renderers: usize,
    /// Maximum text renderer components
    pub text_renderers: usize,
    /// Maximum mesh renderer components
    pub mesh_renderers: usize,
    /// Maximum audio source components
    pub audio_sources: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            game_objects: 1000,
            transforms: 1000,
            cameras: 16,
            sprite_renderers: 100,
            text_renderers: 100,
            mesh_renderers: 500,
            audio_sources: 100,
        }
    }
}

impl PoolConfig {
    /// Use the same capacity for every pool
    pub fn uniform(capacity: usize) -> Self {
        Self {
            game_objects: capacity,
            transforms: capacity,
            cameras: capacity,
            sprite_renderers: capacity,
            text_renderers: capacity,
            mesh_renderers: capacity,
            audio_sources: capacity,
        }
    }

    /// Set the sprite renderer capacity
    pub fn with_sprite_renderers(mut self, capacity: usize) -> Self {
        self.sprite_renderers = capacity;
        self
    }

    /// Set the camera capacity
    pub fn with_cameras(mut self, capacity: usize) -> Self {
        self.cameras = capacity;
        self
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.game_objects == 0 {
            return Err("game object pool must hold at least one object".to_string());
        }
        Ok(())
    }
}

/// # Logging Configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `env_logger` filter used when `RUST_LOG` is unset
    pub filter: String,
    /// Prefix records with millisecond timestamps
    pub timestamps: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
            timestamps: true,
        }
    }
}

impl LoggingConfig {
    /// Set the default filter
    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = filter.into();
        self
    }
}

/// # Application Configuration
///
/// Top-level configuration file layout.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ApplicationConfig {
    /// Graphics device settings
    pub renderer: RendererConfig,
    /// Scene pool capacities
    pub pools: PoolConfig,
    /// Logging settings
    pub logging: LoggingConfig,
}

impl Config for ApplicationConfig {
    fn validate(&self) -> Result<(), String> {
        self.renderer.validate()?;
        self.pools.validate()
    }
}

impl Config for RendererConfig {
    fn validate(&self) -> Result<(), String> {
        RendererConfig::validate(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let config = ApplicationConfig::default();
        assert!(Config::validate(&config).is_ok());
        assert_eq!(config.renderer.present_timeout_ns(), u64::MAX);
    }

    #[test]
    fn test_renderer_builder() {
        let config = RendererConfig::new("viewer")
            .with_size(800, 600)
            .with_backend(BackendKind::Immediate)
            .with_validation(false)
            .with_present_timeout_ms(250);

        assert_eq!(config.application_name, "viewer");
        assert_eq!((config.width, config.height), (800, 600));
        assert_eq!(config.backend, BackendKind::Immediate);
        assert!(!config.validation_enabled());
        assert_eq!(config.present_timeout_ns(), 250_000_000);
    }

    #[test]
    fn test_zero_size_rejected() {
        let config = RendererConfig::default().with_size(0, 600);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let text = "[renderer]\nwidth = 640\nbackend = \"immediate\"\n\n[pools]\nsprite_renderers = 8\n";
        let config: ApplicationConfig = toml::from_str(text).unwrap();

        assert_eq!(config.renderer.width, 640);
        assert_eq!(config.renderer.height, 720);
        assert_eq!(config.renderer.backend, BackendKind::Immediate);
        assert_eq!(config.pools.sprite_renderers, 8);
        assert_eq!(config.pools.cameras, PoolConfig::default().cameras);
        assert_eq!(config.logging.filter, "info");
    }

    #[test]
    fn test_ron_roundtrip() {
        let config = ApplicationConfig {
            pools: PoolConfig::uniform(32),
            logging: LoggingConfig::default().with_filter("debug"),
            ..Default::default()
        };

        let text = ron::ser::to_string(&config).unwrap();
        let parsed: ApplicationConfig = ron::from_str(&text).unwrap();

        assert_eq!(parsed.pools.mesh_renderers, 32);
        assert_eq!(parsed.logging.filter, "debug");
    }
}
