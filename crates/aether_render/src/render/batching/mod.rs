//! # Sprite batching
//!
//! Sprites that share a texture are sorted next to each other and merged into
//! one index range, so a sprite renderer issues one draw per distinct texture
//! instead of one per sprite.
//!
//! - [`Sprite`]: one textured, tinted quad
//! - [`Drawable`]: a face range of the shared buffer drawn with one texture
//! - [`SpriteBatch`]: dirty-tracked builder producing vertices, faces and drawables

pub mod sprite_batch;

pub use sprite_batch::{Drawable, Sprite, SpriteBatch, MAX_SPRITES_PER_BATCH};
