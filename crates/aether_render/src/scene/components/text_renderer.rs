//! Text renderer component

use std::rc::Rc;

use crate::foundation::math::Vec4;
use crate::render::api::{BlendMode, DepthFunc};
use crate::render::buffer::VertexBuffer;
use crate::render::text::{layout_text, Font};
use crate::render::{RenderResult, Renderer};

use super::Renderable;

/// Draws a string with a bitmap font
#[derive(Debug)]
pub struct TextRendererComponent {
    text: String,
    font: Option<Rc<Font>>,
    color: Vec4,
    size: (f32, f32),
    buffer: VertexBuffer,
    dirty: bool,
}

impl Default for TextRendererComponent {
    fn default() -> Self {
        Self {
            text: String::new(),
            font: None,
            color: Vec4::repeat(1.0),
            size: (0.0, 0.0),
            buffer: VertexBuffer::new(),
            dirty: false,
        }
    }
}

impl TextRendererComponent {
    /// Empty white text with no font
    pub fn new() -> Self {
        Self::default()
    }

    /// Text to draw
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Replace the text
    pub fn set_text(&mut self, text: impl Into<String>) {
        self.text = text.into();
        self.dirty = true;
    }

    /// Font, if set
    pub fn font(&self) -> Option<&Rc<Font>> {
        self.font.as_ref()
    }

    /// Set the font
    pub fn set_font(&mut self, font: Rc<Font>) {
        self.font = Some(font);
        self.dirty = true;
    }

    /// Vertex color
    pub fn color(&self) -> Vec4 {
        self.color
    }

    /// Set the vertex color
    pub fn set_color(&mut self, color: Vec4) {
        self.color = color;
        self.dirty = true;
    }

    /// Laid-out size in pixels as of the last render
    pub fn size(&self) -> (f32, f32) {
        self.size
    }

    pub(crate) fn serialize(&self, out: &mut String) {
        let c = self.color;
        out.push_str("textrenderer\n");
        out.push_str(&format!("text {}\n", escape(&self.text)));
        out.push_str(&format!("textcolor {} {} {} {}\n", c.x, c.y, c.z, c.w));
    }
}

/// Escape backslashes and newlines so the text fits on one line
pub(crate) fn escape(text: &str) -> String {
    text.replace('\\', "\\\\").replace('\n', "\\n")
}

/// Inverse of [`escape`]
pub(crate) fn unescape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

impl Renderable for TextRendererComponent {
    fn render(&mut self, renderer: &mut Renderer, projection_model: &[f32; 16]) -> RenderResult<()> {
        let font = match &self.font {
            Some(font) => Rc::clone(font),
            None => return Ok(()),
        };
        let shader = renderer.shaders().text;
        let device = renderer.device_mut();

        if self.dirty {
            let mesh = layout_text(&font, &self.text, self.color);
            self.buffer.generate(device, &mesh.faces, &mesh.vertices)?;
            self.size = (mesh.width, mesh.height);
            self.dirty = false;
        }
        if self.buffer.is_empty() {
            return Ok(());
        }

        device.set_pipeline(shader, BlendMode::AlphaBlend, DepthFunc::NoneWriteOff);
        device.set_projection_model(projection_model);
        device.set_texture(font.texture())?;
        self.buffer.bind(device)?;
        self.buffer.draw(device)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::{to_column_major, Mat4};
    use crate::render::backends::immediate::ImmediateBackend;
    use crate::render::{BuiltinShaderSources, GfxDevice};

    #[test]
    fn test_escape_round_trip() {
        let text = "line one\nback\\slash";
        assert_eq!(escape(text), "line one\\nback\\\\slash");
        assert_eq!(unescape(&escape(text)), text);
    }

    #[test]
    fn test_render_draws_whole_string_with_font_texture() {
        let device = GfxDevice::new(Box::new(ImmediateBackend::new(64, 64)));
        let mut renderer = Renderer::new(device, &BuiltinShaderSources::headless()).unwrap();
        let atlas = renderer.device_mut().create_texture_2d(16, 16, &[0u8; 16 * 16 * 4]).unwrap();
        let font = Rc::new(Font::monospace_grid(atlas, 4, 4, 'a', 'p'));

        let mut text = TextRendererComponent::new();
        text.set_font(font);
        text.set_text("ab\ncd");

        renderer.device_mut().begin_render_pass_and_command_buffer().unwrap();
        text.render(&mut renderer, &to_column_major(&Mat4::identity())).unwrap();
        renderer.device_mut().end_render_pass_and_command_buffer().unwrap();

        let backend = renderer.device().backend().as_any().downcast_ref::<ImmediateBackend>().unwrap();
        let draws: Vec<_> = backend.current_frame()[0].draws().collect();
        assert_eq!(draws.len(), 1);
        assert_eq!(draws[0].index_count, 4 * 6);
        assert_eq!(draws[0].texture, Some(atlas));
        assert_eq!(text.size(), (8.0, 8.0));
    }

    #[test]
    fn test_no_font_is_noop() {
        let device = GfxDevice::new(Box::new(ImmediateBackend::new(64, 64)));
        let mut renderer = Renderer::new(device, &BuiltinShaderSources::headless()).unwrap();
        let mut text = TextRendererComponent::new();
        text.set_text("hidden");

        renderer.device_mut().begin_render_pass_and_command_buffer().unwrap();
        text.render(&mut renderer, &to_column_major(&Mat4::identity())).unwrap();
        renderer.device_mut().end_render_pass_and_command_buffer().unwrap();
        assert_eq!(renderer.statistics().draw_calls, 0);
    }
}
