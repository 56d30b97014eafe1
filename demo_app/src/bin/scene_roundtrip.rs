//! Scene text round trip
//!
//! Builds a small scene, writes it in the scene text format, loads it into a
//! fresh world and renders both copies on the headless backend.

use aether_render::config::{Config, ConfigError};
use aether_render::foundation::logging;
use aether_render::prelude::*;
use aether_render::scene::SceneParseError;
use rand::Rng;
use thiserror::Error;

#[derive(Error, Debug)]
enum DemoError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("Scene error: {0}")]
    Scene(#[from] SceneError),
    #[error("Parse error: {0}")]
    Parse(#[from] SceneParseError),
    #[error("Render error: {0}")]
    Render(#[from] RenderError),
    #[error("Round trip changed the scene text")]
    Mismatch,
}

fn build_scene(world: &mut World, scene: &mut Scene) -> Result<(), DemoError> {
    let camera = world.create_game_object("main camera")?;
    world.insert_component(camera, TransformComponent::from_position(Vec3::new(0.0, 0.0, 5.0)))?;
    let mut lens = CameraComponent::new();
    lens.set_projection_perspective(60.0, 4.0 / 3.0, 0.1, 100.0);
    lens.set_clear_color(Vec3::new(0.2, 0.3, 0.4));
    world.insert_component(camera, lens)?;
    scene.add(world, camera);

    let mut rng = rand::thread_rng();
    for i in 0..8 {
        let id = world.create_game_object(format!("crate {i}"))?;
        let position = Vec3::new(rng.gen_range(-4.0..4.0), rng.gen_range(-3.0..3.0), 0.0);
        let mut transform = TransformComponent::from_position(position);
        transform.set_local_scale(rng.gen_range(0.5..2.0));
        world.insert_component(id, transform)?;
        scene.add(world, id);
    }

    let label = world.create_game_object("label")?;
    world.add_component::<TransformComponent>(label)?;
    let mut text = TextRendererComponent::new();
    text.set_text("  Score: 0\nLives: 3");
    text.set_color(Vec4::new(1.0, 0.8, 0.2, 1.0));
    world.insert_component(label, text)?;
    let mut audio = AudioSourceComponent::new();
    audio.set_clip("theme.ogg");
    audio.set_volume(0.7);
    audio.set_looping(true);
    world.insert_component(label, audio)?;
    scene.add(world, label);
    Ok(())
}

fn render_once(world: &mut World, scene: &Scene, renderer: &mut Renderer) -> Result<FrameStatistics, DemoError> {
    scene.render(world, renderer)?;
    let stats = renderer.statistics();
    renderer.present()?;
    Ok(stats)
}

fn main() -> Result<(), DemoError> {
    let config = ApplicationConfig::load_or_default("demo.toml")?;
    logging::init(&config.logging);

    // Headless demo: the immediate backend regardless of the configured one
    let renderer_config = RendererConfig { backend: BackendKind::Immediate, ..config.renderer.clone() };
    let device = GfxDevice::new(create_backend(&renderer_config, None)?);
    let mut renderer = Renderer::new(device, &BuiltinShaderSources::headless())?;

    let mut world = World::new(&config.pools);
    let mut scene = Scene::new();
    build_scene(&mut world, &mut scene)?;
    let text = scene.serialize(&world);
    log::info!("Serialized {} objects:\n{}", scene.len(), text);

    let mut loaded_world = World::new(&config.pools);
    let mut loaded = Scene::new();
    let ids = loaded.deserialize(&mut loaded_world, &text).into_result()?;
    log::info!("Loaded {} objects", ids.len());

    if loaded.serialize(&loaded_world) != text {
        return Err(DemoError::Mismatch);
    }

    let original = render_once(&mut world, &scene, &mut renderer)?;
    let reloaded = render_once(&mut loaded_world, &loaded, &mut renderer)?;
    log::info!("Original frame: {:?}", original);
    log::info!("Reloaded frame: {:?}", reloaded);

    renderer.release_gpu_objects();
    log::info!("Round trip complete");
    Ok(())
}
