//! Forward+ lighting
//!
//! Point and spot lights live in fixed-capacity arrays indexed by the
//! caller. Each frame the active prefix is uploaded and culled against
//! screen-space tiles of [`TILE_RES`] pixels. The result is one bounded list
//! per tile that lit-mesh shaders walk instead of every light.
//!
//! ## Tile list layout
//!
//! ```text
//! [point indices..., SENTINEL, spot indices..., SENTINEL, (SENTINEL padding)]
//! ```
//!
//! Every tile occupies [`TILE_LIST_STRIDE`] entries. Points and spots share the
//! [`MAX_LIGHTS_PER_TILE`] cap; lights past it are dropped for that tile.

pub mod culling;
pub mod light_tiler;

pub use culling::{cull_tiles, CullParams, DepthBounds, TileLightLists, TileLights};
pub use light_tiler::LightTiler;

/// Tile edge in pixels
pub const TILE_RES: u32 = 16;

/// Capacity of each light array
pub const MAX_LIGHTS: usize = 2048;

/// Lights a single tile can reference, points and spots combined
pub const MAX_LIGHTS_PER_TILE: usize = 544;

/// Terminates the point and spot sections of a tile list
pub const SENTINEL: u32 = 0x7fff_ffff;

/// Entries per tile in the flattened list buffer
pub const TILE_LIST_STRIDE: usize = MAX_LIGHTS_PER_TILE + 2;
