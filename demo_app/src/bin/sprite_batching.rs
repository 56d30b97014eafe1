//! Sprite batching demo
//!
//! Scatters sprites over a handful of textures, batches them and renders a
//! few frames on the headless backend. Prints one draw per texture per frame
//! regardless of sprite count.

use aether_render::config::Config;
use aether_render::foundation::logging;
use aether_render::foundation::math::{ortho_projection, to_column_major};
use aether_render::prelude::*;
use rand::Rng;

const SPRITE_COUNT: usize = 500;
const TEXTURE_COUNT: usize = 4;
const FRAMES: u32 = 3;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = ApplicationConfig::load_or_default("demo.toml")?;
    logging::init(&config.logging);
    log::info!("Starting sprite batching demo ({} sprites)", SPRITE_COUNT);

    let (width, height) = (config.renderer.width, config.renderer.height);
    // Headless demo: the immediate backend regardless of the configured one
    let renderer_config = RendererConfig { backend: BackendKind::Immediate, ..config.renderer.clone() };
    let device = GfxDevice::new(create_backend(&renderer_config, None)?);
    let mut renderer = Renderer::new(device, &BuiltinShaderSources::headless())?;
    let sprite_shader = renderer.shaders().sprite;
    let device = renderer.device_mut();

    let mut rng = rand::thread_rng();
    let textures = (0..TEXTURE_COUNT)
        .map(|_| {
            let color: [u8; 4] = [rng.gen(), rng.gen(), rng.gen(), 255];
            device.create_texture_2d(1, 1, &color)
        })
        .collect::<RenderResult<Vec<TextureId>>>()?;

    let mut batch = SpriteBatch::new();
    for _ in 0..SPRITE_COUNT {
        let texture = textures[rng.gen_range(0..textures.len())];
        let position = Vec3::new(rng.gen_range(0.0..width as f32), rng.gen_range(0.0..height as f32), 0.0);
        let size = rng.gen_range(8.0..48.0);
        batch.add(Sprite::new(texture, position, Vec2::new(size, size)));
    }
    batch.build();
    log::info!("{} sprites merged into {} drawables", batch.len(), batch.drawables().len());

    let mut buffer = VertexBuffer::new();
    buffer.generate(device, batch.faces(), batch.vertices())?;

    let projection = to_column_major(&ortho_projection(0.0, width as f32, height as f32, 0.0, -1.0, 1.0));

    for frame in 0..FRAMES {
        device.set_clear_color(Vec4::new(0.1, 0.1, 0.15, 1.0));
        device.begin_render_pass_and_command_buffer()?;
        device.clear_screen(ClearFlags::COLOR | ClearFlags::DEPTH)?;
        device.reset_frame_statistics();

        device.set_pipeline(sprite_shader, BlendMode::AlphaBlend, DepthFunc::NoneWriteOff);
        device.set_projection_model(&projection);
        buffer.bind(device)?;
        for drawable in batch.drawables() {
            device.set_texture(drawable.texture)?;
            buffer.draw_range(device, drawable.start, drawable.end)?;
        }

        device.end_render_pass_and_command_buffer()?;
        let stats = device.statistics();
        device.present()?;
        log::info!(
            "Frame {}: {} draw calls, {} texture binds, {} buffer binds",
            frame,
            stats.draw_calls,
            stats.texture_binds,
            stats.vertex_buffer_binds
        );
    }

    buffer.release(device);
    let presented = device.frames_presented();
    renderer.release_gpu_objects();
    log::info!("Presented {} frames", presented);
    Ok(())
}
