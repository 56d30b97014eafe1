//! Bitmap font text
//!
//! - [`Font`]: glyph metrics in atlas pixels plus the atlas texture
//! - [`layout_text`]: turns a string into one textured quad per glyph
//!
//! Fonts are built by the caller from whatever font format it loads; only the
//! metrics and the uploaded atlas are needed here.

mod font;
mod layout;

pub use font::{Font, Glyph};
pub use layout::{layout_text, TextMesh, MAX_GLYPH_QUADS};
