//! Windowed scene demo
//!
//! Opens a GLFW window, creates the backend named in `demo.toml` (Vulkan by
//! default) and renders a spinning sprite scene until the window closes.
//! Compiled SPIR-V is loaded from the directory given as the first argument,
//! or `target/shaders`.

use aether_render::config::{Config, ConfigError};
use aether_render::foundation::logging;
use aether_render::prelude::*;
use glfw::{Action, Key, WindowEvent};
use thiserror::Error;

const SPRITE_COUNT: usize = 12;

#[derive(Error, Debug)]
enum DemoError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("Scene error: {0}")]
    Scene(#[from] SceneError),
    #[error("Render error: {0}")]
    Render(#[from] RenderError),
    #[error("Window error: {0}")]
    Window(String),
}

fn build_scene(world: &mut World, scene: &mut Scene, renderer: &mut Renderer) -> Result<Vec<GameObjectId>, DemoError> {
    let (width, height) = renderer.device().surface_extent();
    let aspect = width as f32 / height.max(1) as f32;

    let camera = world.create_game_object("main camera")?;
    world.add_component::<TransformComponent>(camera)?;
    let mut lens = CameraComponent::new();
    lens.set_projection_ortho(-aspect, -1.0, 2.0 * aspect, 2.0, -1.0, 1.0);
    lens.set_clear_color(Vec3::new(0.05, 0.05, 0.1));
    world.insert_component(camera, lens)?;
    scene.add(world, camera);

    let white = renderer.device_mut().create_texture_2d(1, 1, &[255, 255, 255, 255])?;
    let mut spinners = Vec::with_capacity(SPRITE_COUNT);
    for i in 0..SPRITE_COUNT {
        let angle = i as f32 / SPRITE_COUNT as f32 * std::f32::consts::TAU;
        let id = world.create_game_object(format!("sprite {i}"))?;
        let position = Vec3::new(angle.cos() * 0.7, angle.sin() * 0.7, 0.0);
        world.insert_component(id, TransformComponent::from_position(position))?;
        let mut sprite = SpriteRendererComponent::new();
        let tint = Vec4::new(0.5 + 0.5 * angle.cos(), 0.5 + 0.5 * angle.sin(), 0.8, 1.0);
        sprite.set_texture_tinted(white, Vec3::new(-0.1, -0.1, 0.0), Vec2::new(0.2, 0.2), tint);
        world.insert_component(id, sprite)?;
        scene.add(world, id);
        spinners.push(id);
    }
    Ok(spinners)
}

fn main() -> Result<(), DemoError> {
    let config = ApplicationConfig::load_or_default("demo.toml")?;
    logging::init(&config.logging);

    let mut glfw = glfw::init(glfw::fail_on_errors).map_err(|e| DemoError::Window(format!("{:?}", e)))?;
    glfw.window_hint(glfw::WindowHint::ClientApi(glfw::ClientApiHint::NoApi));
    glfw.window_hint(glfw::WindowHint::Resizable(true));
    let (mut window, events) = glfw
        .create_window(
            config.renderer.width,
            config.renderer.height,
            &config.renderer.application_name,
            glfw::WindowMode::Windowed,
        )
        .ok_or_else(|| DemoError::Window("failed to create window".to_string()))?;
    window.set_key_polling(true);
    window.set_framebuffer_size_polling(true);

    let shader_dir = std::env::args().nth(1).unwrap_or_else(|| "target/shaders".to_string());
    let sources = match config.renderer.backend {
        BackendKind::Vulkan => BuiltinShaderSources::load_spirv(&shader_dir)?,
        BackendKind::Immediate => BuiltinShaderSources::headless(),
    };
    let backend = create_backend(&config.renderer, Some(&*window))?;
    let mut renderer = Renderer::new(GfxDevice::new(backend), &sources)?;

    let mut world = World::new(&config.pools);
    let mut scene = Scene::new();
    let spinners = build_scene(&mut world, &mut scene, &mut renderer)?;
    log::info!("Rendering {} sprites from {}", spinners.len(), shader_dir);

    let start = std::time::Instant::now();
    while !window.should_close() {
        glfw.poll_events();
        let mut resized = None;
        for (_, event) in glfw::flush_messages(&events) {
            match event {
                WindowEvent::Key(Key::Escape, _, Action::Press, _) => window.set_should_close(true),
                WindowEvent::FramebufferSize(width, height) if width > 0 && height > 0 => {
                    resized = Some((width as u32, height as u32));
                }
                _ => {}
            }
        }
        if let Some((width, height)) = resized {
            renderer.device_mut().resize(width, height)?;
        }

        let angle = start.elapsed().as_secs_f32();
        for &id in &spinners {
            if let Some(transform) = world.component_mut::<TransformComponent>(id) {
                transform.set_local_rotation(Quat::from_axis_angle(&Vec3::z_axis(), angle));
            }
        }

        scene.render(&mut world, &mut renderer)?;
        match renderer.present() {
            Ok(()) => {}
            Err(e) if e.is_recoverable() => {
                log::warn!("Recreating swapchain: {}", e);
                let (width, height) = window.get_framebuffer_size();
                renderer.device_mut().resize(width.max(1) as u32, height.max(1) as u32)?;
            }
            Err(e) => return Err(e.into()),
        }
    }

    renderer.device_mut().wait_idle()?;
    renderer.release_gpu_objects();
    log::info!("Window closed after {:.1}s", start.elapsed().as_secs_f32());
    Ok(())
}
