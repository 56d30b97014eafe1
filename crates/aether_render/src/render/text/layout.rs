use crate::foundation::math::Vec4;
use crate::render::vertex::{Face, VertexPTC};

use super::Font;

/// Geometry for a laid-out string
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TextMesh {
    /// Four vertices per glyph quad
    pub vertices: Vec<VertexPTC>,
    /// Two faces per glyph quad
    pub faces: Vec<Face>,
    /// Widest line in pixels
    pub width: f32,
    /// Line count times line height
    pub height: f32,
}

impl TextMesh {
    /// Number of glyph quads
    pub fn quad_count(&self) -> usize {
        self.faces.len() / 2
    }
}

/// Most glyph quads one mesh holds under 16-bit indexing
pub const MAX_GLYPH_QUADS: usize = (u16::MAX as usize + 1) / 4;

/// Lay out `text` starting at the origin, lines growing towards -Y.
///
/// Characters missing from the font are skipped without advancing; glyphs
/// with no area (such as space) only advance the pen. Glyphs past
/// [`MAX_GLYPH_QUADS`] are dropped.
pub fn layout_text(font: &Font, text: &str, color: Vec4) -> TextMesh {
    let (atlas_width, atlas_height) = font.atlas_size();
    let color: [f32; 4] = color.into();
    let mut mesh = TextMesh::default();
    let mut pen_x = 0.0f32;
    let mut line_top = 0.0f32;
    let mut lines = 1;
    let mut dropped = 0usize;

    for character in text.chars() {
        if character == '\n' {
            mesh.width = mesh.width.max(pen_x);
            pen_x = 0.0;
            line_top -= font.line_height();
            lines += 1;
            continue;
        }
        let glyph = match font.glyph(character) {
            Some(glyph) => glyph,
            None => {
                log::trace!("Font has no glyph for {:?}", character);
                continue;
            }
        };

        if glyph.width > 0.0 && glyph.height > 0.0 {
            let Ok(base) = u16::try_from(mesh.vertices.len()) else {
                dropped += 1;
                pen_x += glyph.x_advance;
                continue;
            };
            let left = pen_x + glyph.x_offset;
            let right = left + glyph.width;
            let top = line_top - glyph.y_offset;
            let bottom = top - glyph.height;

            let u0 = glyph.x / atlas_width;
            let u1 = (glyph.x + glyph.width) / atlas_width;
            let v0 = glyph.y / atlas_height;
            let v1 = (glyph.y + glyph.height) / atlas_height;

            mesh.vertices.extend_from_slice(&[
                VertexPTC { position: [left, bottom, 0.0], uv: [u0, v1], color },
                VertexPTC { position: [right, bottom, 0.0], uv: [u1, v1], color },
                VertexPTC { position: [right, top, 0.0], uv: [u1, v0], color },
                VertexPTC { position: [left, top, 0.0], uv: [u0, v0], color },
            ]);
            mesh.faces.push(Face::new(base, base + 1, base + 2));
            mesh.faces.push(Face::new(base + 2, base + 3, base));
        }
        pen_x += glyph.x_advance;
    }

    if dropped > 0 {
        log::warn!("Text needs more than {} glyph quads, dropped {}", MAX_GLYPH_QUADS, dropped);
    }
    mesh.width = mesh.width.max(pen_x);
    mesh.height = lines as f32 * font.line_height();
    mesh
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::api::TextureId;
    use crate::render::text::Glyph;
    use approx::assert_relative_eq;

    fn font() -> Font {
        Font::monospace_grid(TextureId(1), 16, 8, ' ', '~').with_glyph(' ', Glyph { x_advance: 8.0, ..Default::default() })
    }

    #[test]
    fn test_one_quad_per_printable_glyph() {
        let mesh = layout_text(&font(), "ab c", Vec4::repeat(1.0));
        assert_eq!(mesh.quad_count(), 3);
        assert_eq!(mesh.vertices.len(), 12);
        assert_relative_eq!(mesh.width, 32.0);
    }

    #[test]
    fn test_newline_moves_down_one_line() {
        let mesh = layout_text(&font(), "a\nb", Vec4::repeat(1.0));
        assert_eq!(mesh.quad_count(), 2);

        let second_top_left = mesh.vertices[7].position;
        assert_relative_eq!(second_top_left[0], 0.0);
        assert_relative_eq!(second_top_left[1], -8.0);
        assert_relative_eq!(mesh.height, 16.0);
        assert_relative_eq!(mesh.width, 8.0);
    }

    #[test]
    fn test_missing_glyphs_are_skipped() {
        let mesh = layout_text(&font(), "a\u{e9}b", Vec4::repeat(1.0));
        assert_eq!(mesh.quad_count(), 2);
        assert_relative_eq!(mesh.vertices[4].position[0], 8.0);
    }

    #[test]
    fn test_glyphs_past_index_range_are_dropped() {
        let text = "a".repeat(MAX_GLYPH_QUADS + 1);
        let mesh = layout_text(&font(), &text, Vec4::repeat(1.0));

        assert_eq!(mesh.quad_count(), MAX_GLYPH_QUADS);
        assert_eq!(mesh.vertices.len(), 65536);
        let highest = mesh.faces.iter().map(Face::max_index).max();
        assert_eq!(highest, Some(65535));
        assert_relative_eq!(mesh.width, 8.0 * (MAX_GLYPH_QUADS + 1) as f32);
    }

    #[test]
    fn test_uvs_address_atlas_cell() {
        let font = font();
        let mesh = layout_text(&font, "!", Vec4::new(1.0, 0.0, 0.0, 1.0));
        let (w, h) = font.atlas_size();

        assert_relative_eq!(mesh.vertices[0].uv[0], 8.0 / w);
        assert_relative_eq!(mesh.vertices[0].uv[1], 8.0 / h);
        assert_relative_eq!(mesh.vertices[2].uv[0], 16.0 / w);
        assert_relative_eq!(mesh.vertices[2].uv[1], 0.0);
        assert_eq!(mesh.vertices[0].color, [1.0, 0.0, 0.0, 1.0]);
    }
}
