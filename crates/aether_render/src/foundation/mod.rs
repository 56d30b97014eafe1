//! Foundation module - Core utilities and types
//!
//! This module provides fundamental utilities used throughout the renderer:
//! - Math types and projection builders
//! - Generational pools
//! - Logging bootstrap

pub mod collections;
pub mod logging;
pub mod math;
