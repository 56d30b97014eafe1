//! Sprite renderer component

use crate::foundation::math::{Vec2, Vec3, Vec4};
use crate::render::api::{BlendMode, DepthFunc, TextureId};
use crate::render::batching::{Drawable, Sprite, SpriteBatch};
use crate::render::buffer::VertexBuffer;
use crate::render::{RenderResult, Renderer};

use super::Renderable;

/// Draws a batch of sprites with one draw call per distinct texture
#[derive(Debug, Default)]
pub struct SpriteRendererComponent {
    batch: SpriteBatch,
    buffer: VertexBuffer,
}

impl SpriteRendererComponent {
    /// Empty renderer
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an untinted sprite
    pub fn set_texture(&mut self, texture: TextureId, position: Vec3, dimension: Vec2) {
        self.batch.add(Sprite::new(texture, position, dimension));
    }

    /// Add a tinted sprite
    pub fn set_texture_tinted(&mut self, texture: TextureId, position: Vec3, dimension: Vec2, tint: Vec4) {
        self.batch.add(Sprite::new(texture, position, dimension).with_tint(tint));
    }

    /// Remove every sprite
    pub fn clear(&mut self) {
        self.batch.clear();
    }

    /// The underlying batch
    pub fn batch(&self) -> &SpriteBatch {
        &self.batch
    }

    /// Ranges drawn by the last render
    pub fn drawables(&self) -> &[Drawable] {
        self.batch.drawables()
    }
}

impl Renderable for SpriteRendererComponent {
    fn render(&mut self, renderer: &mut Renderer, projection_model: &[f32; 16]) -> RenderResult<()> {
        let shader = renderer.shaders().sprite;
        let device = renderer.device_mut();

        if self.batch.is_dirty() {
            self.batch.build();
            self.buffer.generate(device, self.batch.faces(), self.batch.vertices())?;
        }
        if self.buffer.is_empty() {
            return Ok(());
        }

        device.set_pipeline(shader, BlendMode::AlphaBlend, DepthFunc::NoneWriteOff);
        device.set_projection_model(projection_model);
        self.buffer.bind(device)?;
        for drawable in self.batch.drawables() {
            device.set_texture(drawable.texture)?;
            self.buffer.draw_range(device, drawable.start, drawable.end)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::{to_column_major, Mat4};
    use crate::render::backends::immediate::ImmediateBackend;
    use crate::render::{BuiltinShaderSources, GfxDevice};

    fn renderer() -> Renderer {
        let device = GfxDevice::new(Box::new(ImmediateBackend::new(64, 64)));
        Renderer::new(device, &BuiltinShaderSources::headless()).unwrap()
    }

    #[test]
    fn test_one_draw_and_bind_per_texture() {
        let mut renderer = renderer();
        let pixel = [255u8; 4];
        let a = renderer.device_mut().create_texture_2d(1, 1, &pixel).unwrap();
        let b = renderer.device_mut().create_texture_2d(1, 1, &pixel).unwrap();

        let mut sprites = SpriteRendererComponent::new();
        for (i, texture) in [b, a, b, a, a].into_iter().enumerate() {
            sprites.set_texture(texture, Vec3::new(i as f32, 0.0, 0.0), Vec2::new(8.0, 8.0));
        }

        renderer.device_mut().begin_render_pass_and_command_buffer().unwrap();
        renderer.device_mut().reset_frame_statistics();
        sprites.render(&mut renderer, &to_column_major(&Mat4::identity())).unwrap();
        renderer.device_mut().end_render_pass_and_command_buffer().unwrap();

        let stats = renderer.statistics();
        assert_eq!(stats.draw_calls, 2);
        assert_eq!(stats.texture_binds, 2);
        assert_eq!(stats.vertex_buffer_binds, 1);

        let backend = renderer.device().backend().as_any().downcast_ref::<ImmediateBackend>().unwrap();
        let draws: Vec<_> = backend.current_frame()[0].draws().copied().collect();
        assert_eq!(draws[0].texture, Some(a));
        assert_eq!((draws[0].first_index, draws[0].index_count), (0, 18));
        assert_eq!(draws[1].texture, Some(b));
        assert_eq!((draws[1].first_index, draws[1].index_count), (18, 12));
        assert_eq!(draws[0].blend, BlendMode::AlphaBlend);
    }

    #[test]
    fn test_empty_renderer_draws_nothing() {
        let mut renderer = renderer();
        let mut sprites = SpriteRendererComponent::new();

        renderer.device_mut().begin_render_pass_and_command_buffer().unwrap();
        sprites.render(&mut renderer, &to_column_major(&Mat4::identity())).unwrap();
        renderer.device_mut().end_render_pass_and_command_buffer().unwrap();

        assert_eq!(renderer.statistics().draw_calls, 0);
    }

    #[test]
    fn test_clear_then_render_uploads_empty_batch() {
        let mut renderer = renderer();
        let texture = renderer.device_mut().create_texture_2d(1, 1, &[0u8; 4]).unwrap();
        let mut sprites = SpriteRendererComponent::new();
        sprites.set_texture(texture, Vec3::zeros(), Vec2::new(1.0, 1.0));

        renderer.device_mut().begin_render_pass_and_command_buffer().unwrap();
        sprites.render(&mut renderer, &to_column_major(&Mat4::identity())).unwrap();
        sprites.clear();
        renderer.device_mut().reset_frame_statistics();
        sprites.render(&mut renderer, &to_column_major(&Mat4::identity())).unwrap();
        renderer.device_mut().end_render_pass_and_command_buffer().unwrap();

        assert_eq!(renderer.statistics().draw_calls, 0);
        assert!(sprites.drawables().is_empty());
    }
}
