//! Core renderer configuration

pub mod config;

pub use config::{ApplicationConfig, BackendKind, LoggingConfig, PoolConfig, RendererConfig};
