//! Sprite batch builder

use crate::foundation::math::{Vec2, Vec3, Vec4};
use crate::render::api::TextureId;
use crate::render::vertex::{Face, VertexPTC};

/// Most sprites one batch holds. Four vertices per sprite must stay
/// addressable by `u16` indices.
pub const MAX_SPRITES_PER_BATCH: usize = (u16::MAX as usize + 1) / 4;

/// One textured quad
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sprite {
    /// Texture sampled by the quad; not owned
    pub texture: TextureId,
    /// Bottom-left corner
    pub position: Vec3,
    /// Width and height in pixels
    pub dimension: Vec2,
    /// RGBA multiplier
    pub tint: Vec4,
}

impl Sprite {
    /// Untinted sprite
    pub fn new(texture: TextureId, position: Vec3, dimension: Vec2) -> Self {
        Self {
            texture,
            position,
            dimension,
            tint: Vec4::repeat(1.0),
        }
    }

    /// Replace the tint
    pub fn with_tint(mut self, tint: Vec4) -> Self {
        self.tint = tint;
        self
    }
}

/// Faces `[start, end)` of the batch buffer drawn with `texture`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Drawable {
    /// Texture bound for the range
    pub texture: TextureId,
    /// First face
    pub start: u32,
    /// One past the last face
    pub end: u32,
}

impl Drawable {
    /// Number of faces in the range
    pub fn face_count(&self) -> u32 {
        self.end - self.start
    }
}

/// Sprites plus the merged geometry built from them.
///
/// `add` and `clear` mark the batch dirty; `build` sorts by texture and
/// regenerates vertices, faces and drawables.
#[derive(Debug, Default)]
pub struct SpriteBatch {
    sprites: Vec<Sprite>,
    drawables: Vec<Drawable>,
    vertices: Vec<VertexPTC>,
    faces: Vec<Face>,
    dirty: bool,
}

impl SpriteBatch {
    /// Create an empty batch
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a sprite for the next build.
    ///
    /// Panics if the batch already holds [`MAX_SPRITES_PER_BATCH`] sprites.
    pub fn add(&mut self, sprite: Sprite) {
        assert!(
            self.sprites.len() < MAX_SPRITES_PER_BATCH,
            "sprite batch is full ({} sprites)",
            MAX_SPRITES_PER_BATCH
        );
        self.sprites.push(sprite);
        self.dirty = true;
    }

    /// Remove every sprite
    pub fn clear(&mut self) {
        self.sprites.clear();
        self.dirty = true;
    }

    /// Whether sprites changed since the last build
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Sort sprites by texture and rebuild the merged geometry.
    ///
    /// The sort is stable, so sprites sharing a texture keep their insertion
    /// order.
    pub fn build(&mut self) {
        self.sprites.sort_by_key(|sprite| sprite.texture);

        self.vertices.clear();
        self.faces.clear();
        self.drawables.clear();
        self.vertices.reserve(self.sprites.len() * 4);
        self.faces.reserve(self.sprites.len() * 2);

        for (i, sprite) in self.sprites.iter().enumerate() {
            let p = sprite.position;
            let (w, h) = (sprite.dimension.x, sprite.dimension.y);
            let color: [f32; 4] = sprite.tint.into();

            let corners = [
                ([p.x, p.y, p.z], [0.0, 0.0]),
                ([p.x + w, p.y, p.z], [1.0, 0.0]),
                ([p.x + w, p.y + h, p.z], [1.0, 1.0]),
                ([p.x, p.y + h, p.z], [0.0, 1.0]),
            ];
            for (position, uv) in corners {
                self.vertices.push(VertexPTC { position, uv, color });
            }

            let Ok(base) = u16::try_from(i * 4) else {
                panic!("sprite {} is past the u16 index range", i);
            };
            self.faces.push(Face::new(base, base + 1, base + 2));
            self.faces.push(Face::new(base + 2, base + 3, base));

            match self.drawables.last_mut() {
                Some(drawable) if drawable.texture == sprite.texture => drawable.end += 2,
                _ => {
                    let start = (i * 2) as u32;
                    self.drawables.push(Drawable { texture: sprite.texture, start, end: start + 2 });
                }
            }
        }

        log::debug!("Built sprite batch: {} sprites, {} drawables", self.sprites.len(), self.drawables.len());
        self.dirty = false;
    }

    /// Sprites in draw order (sorted after `build`)
    pub fn sprites(&self) -> &[Sprite] {
        &self.sprites
    }

    /// Merged ranges from the last build
    pub fn drawables(&self) -> &[Drawable] {
        &self.drawables
    }

    /// Vertices from the last build
    pub fn vertices(&self) -> &[VertexPTC] {
        &self.vertices
    }

    /// Faces from the last build
    pub fn faces(&self) -> &[Face] {
        &self.faces
    }

    /// Number of sprites
    pub fn len(&self) -> usize {
        self.sprites.len()
    }

    /// Whether the batch holds no sprites
    pub fn is_empty(&self) -> bool {
        self.sprites.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sprite(texture: u64, x: f32) -> Sprite {
        Sprite::new(TextureId(texture), Vec3::new(x, 0.0, 0.0), Vec2::new(10.0, 20.0))
    }

    fn build(textures: &[u64]) -> SpriteBatch {
        let mut batch = SpriteBatch::new();
        for (i, &texture) in textures.iter().enumerate() {
            batch.add(sprite(texture, i as f32));
        }
        batch.build();
        batch
    }

    #[test]
    fn test_ranges_cover_all_faces_without_gaps() {
        let batch = build(&[3, 1, 2, 1, 3, 3, 2, 1]);
        let drawables = batch.drawables();

        assert_eq!(drawables.len(), 3);
        assert_eq!(drawables[0].start, 0);
        for pair in drawables.windows(2) {
            assert_eq!(pair[0].end, pair[1].start);
        }
        assert_eq!(drawables.last().unwrap().end, 16);
        assert_eq!(batch.faces().len(), 16);
    }

    #[test]
    fn test_one_drawable_per_texture_run() {
        let batch = build(&[5, 5, 5]);
        assert_eq!(batch.drawables(), &[Drawable { texture: TextureId(5), start: 0, end: 6 }]);

        let batch = build(&[1, 2, 3, 4]);
        assert_eq!(batch.drawables().len(), 4);
        for (i, drawable) in batch.drawables().iter().enumerate() {
            assert_eq!(drawable.texture, TextureId(i as u64 + 1));
            assert_eq!(drawable.face_count(), 2);
        }
    }

    #[test]
    fn test_sort_is_stable_for_equal_textures() {
        let batch = build(&[2, 1, 2, 1, 2]);
        let order: Vec<(u64, f32)> = batch.sprites().iter().map(|s| (s.texture.0, s.position.x)).collect();

        assert_eq!(order, vec![(1, 1.0), (1, 3.0), (2, 0.0), (2, 2.0), (2, 4.0)]);
    }

    #[test]
    fn test_rebuild_without_changes_is_identical() {
        let mut batch = build(&[4, 2, 4, 9, 2]);
        let vertices = batch.vertices().to_vec();
        let faces = batch.faces().to_vec();
        let drawables = batch.drawables().to_vec();

        batch.build();

        assert_eq!(bytemuck::cast_slice::<_, u8>(batch.vertices()), bytemuck::cast_slice::<_, u8>(&vertices));
        assert_eq!(batch.faces(), faces.as_slice());
        assert_eq!(batch.drawables(), drawables.as_slice());
    }

    #[test]
    fn test_ranges_are_non_empty_and_in_bounds() {
        let textures = [7, 3, 3, 8, 7, 1, 1, 1, 8];
        let batch = build(&textures);
        let face_count = batch.faces().len() as u32;

        for drawable in batch.drawables() {
            assert!(drawable.start < drawable.end);
            assert!(drawable.end <= face_count);
            let run = batch.sprites().iter().filter(|s| s.texture == drawable.texture).count() as u32;
            assert_eq!(drawable.end, drawable.start + 2 * run);
        }
    }

    #[test]
    fn test_quad_geometry() {
        let batch = build(&[1]);
        let positions: Vec<[f32; 3]> = batch.vertices().iter().map(|v| v.position).collect();
        let uvs: Vec<[f32; 2]> = batch.vertices().iter().map(|v| v.uv).collect();

        assert_eq!(positions, vec![[0.0, 0.0, 0.0], [10.0, 0.0, 0.0], [10.0, 20.0, 0.0], [0.0, 20.0, 0.0]]);
        assert_eq!(uvs, vec![[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0]]);
        assert_eq!(batch.faces(), &[Face::new(0, 1, 2), Face::new(2, 3, 0)]);
    }

    #[test]
    fn test_full_batch_uses_whole_index_range() {
        let mut batch = SpriteBatch::new();
        for i in 0..MAX_SPRITES_PER_BATCH {
            batch.add(sprite(1, i as f32));
        }
        batch.build();

        assert_eq!(MAX_SPRITES_PER_BATCH, 16384);
        assert_eq!(batch.vertices().len(), 65536);
        let last = batch.faces()[batch.faces().len() - 1];
        assert_eq!(last, Face::new(65534, 65535, 65532));
        assert_eq!(batch.drawables(), &[Drawable { texture: TextureId(1), start: 0, end: 32768 }]);
    }

    #[test]
    #[should_panic(expected = "sprite batch is full")]
    fn test_add_past_capacity_panics() {
        let mut batch = SpriteBatch::new();
        for i in 0..=MAX_SPRITES_PER_BATCH {
            batch.add(sprite(1, i as f32));
        }
    }

    #[test]
    fn test_dirty_tracking() {
        let mut batch = SpriteBatch::new();
        assert!(!batch.is_dirty());

        batch.add(sprite(1, 0.0));
        assert!(batch.is_dirty());
        batch.build();
        assert!(!batch.is_dirty());

        batch.clear();
        assert!(batch.is_dirty());
        batch.build();
        assert!(batch.drawables().is_empty());
        assert!(batch.vertices().is_empty());
    }
}
