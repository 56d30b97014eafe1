//! # Aether Render
//!
//! Rendering core for 2D and 3D games: a graphics device over Vulkan or a
//! headless immediate backend, sprite and text batching, forward+ tiled light
//! culling, and a component-based scene that renders and serializes itself.
//!
//! ## Features
//!
//! - **Graphics device**: one explicit context, pass nesting checked, per-pass statistics
//! - **Batching**: sprites sorted by texture and merged into contiguous draw ranges
//! - **Lighting**: point and spot lights culled into 16x16 pixel tiles
//! - **Scene**: pooled components, render-texture cameras, skybox, text scene format
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use aether_render::prelude::*;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let device = GfxDevice::new(Box::new(ImmediateBackend::new(800, 600)));
//!     let mut renderer = Renderer::new(device, &BuiltinShaderSources::headless())?;
//!     let mut world = World::new(&PoolConfig::default());
//!     let mut scene = Scene::new();
//!
//!     let camera = world.create_game_object("camera")?;
//!     world.add_component::<TransformComponent>(camera)?;
//!     world.add_component::<CameraComponent>(camera)?;
//!     scene.add(&world, camera);
//!
//!     scene.render(&mut world, &mut renderer)?;
//!     renderer.present()?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions, clippy::similar_names, clippy::too_many_arguments)]

pub mod config;
pub mod core;
pub mod foundation;
pub mod render;
pub mod scene;

/// Common imports for renderer users
pub mod prelude {
    pub use crate::{
        core::config::{ApplicationConfig, BackendKind, LoggingConfig, PoolConfig, RendererConfig},
        foundation::math::{Mat4, Quat, Vec2, Vec3, Vec4},
        render::{
            backends::{create_backend, ImmediateBackend, VulkanBackend, WindowSurface},
            batching::{Sprite, SpriteBatch},
            lighting::LightTiler,
            text::Font,
            BlendMode, BuiltinShaderSources, ClearFlags, DepthFunc, FrameStatistics, GfxDevice, RenderError,
            RenderResult, Renderer, TextureId, VertexBuffer,
        },
        scene::{
            AudioSourceComponent, CameraComponent, GameObjectId, MeshRendererComponent, Scene, SceneError,
            SpriteRendererComponent, TextRendererComponent, TransformComponent, World,
        },
    };
}
