use std::collections::HashMap;

use crate::render::api::TextureId;

/// Placement of one character in the atlas, in pixels
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Glyph {
    /// Left edge in the atlas
    pub x: f32,
    /// Top edge in the atlas
    pub y: f32,
    /// Width in the atlas
    pub width: f32,
    /// Height in the atlas
    pub height: f32,
    /// Horizontal offset from the pen to the quad
    pub x_offset: f32,
    /// Vertical offset from the line top to the quad
    pub y_offset: f32,
    /// Pen advance after the glyph
    pub x_advance: f32,
}

/// Bitmap font: an uploaded atlas and per-character metrics
#[derive(Debug, Clone)]
pub struct Font {
    texture: TextureId,
    atlas_width: f32,
    atlas_height: f32,
    line_height: f32,
    glyphs: HashMap<char, Glyph>,
}

impl Font {
    /// Create a font over an uploaded atlas
    pub fn new(texture: TextureId, atlas_width: u32, atlas_height: u32, line_height: f32) -> Self {
        Self {
            texture,
            atlas_width: atlas_width as f32,
            atlas_height: atlas_height as f32,
            line_height,
            glyphs: HashMap::new(),
        }
    }

    /// Register the metrics of `character`
    pub fn with_glyph(mut self, character: char, glyph: Glyph) -> Self {
        self.glyphs.insert(character, glyph);
        self
    }

    /// Register or replace the metrics of `character`
    pub fn insert_glyph(&mut self, character: char, glyph: Glyph) {
        self.glyphs.insert(character, glyph);
    }

    /// Metrics of `character`, if the font has it
    pub fn glyph(&self, character: char) -> Option<&Glyph> {
        self.glyphs.get(&character)
    }

    /// Atlas texture
    pub fn texture(&self) -> TextureId {
        self.texture
    }

    /// Atlas size in pixels
    pub fn atlas_size(&self) -> (f32, f32) {
        (self.atlas_width, self.atlas_height)
    }

    /// Distance between baselines
    pub fn line_height(&self) -> f32 {
        self.line_height
    }

    /// A font where every glyph is a `cell`-sized box on a grid of
    /// `columns`, covering `first..=last` in order. Handy for debug fonts.
    pub fn monospace_grid(texture: TextureId, columns: u32, cell: u32, first: char, last: char) -> Self {
        let count = (last as u32).saturating_sub(first as u32) + 1;
        let rows = count.div_ceil(columns.max(1));
        let mut font = Self::new(texture, columns * cell, rows * cell, cell as f32);
        for (i, character) in (first..=last).enumerate() {
            let i = i as u32;
            font.insert_glyph(
                character,
                Glyph {
                    x: ((i % columns) * cell) as f32,
                    y: ((i / columns) * cell) as f32,
                    width: cell as f32,
                    height: cell as f32,
                    x_offset: 0.0,
                    y_offset: 0.0,
                    x_advance: cell as f32,
                },
            );
        }
        font
    }
}
