//! Scene management
//!
//! ## Parts
//!
//! - [`World`]: owns game objects and the pooled components
//! - [`Scene`]: the objects to draw, the main camera and the skybox
//! - [`serialization`]: the line-oriented scene text format
//!
//! A frame renders every render-texture camera in list order, then the main
//! camera. A scene without a usable main camera draws nothing.

pub mod components;
pub mod scene_graph;
pub mod serialization;
pub mod world;

pub use components::{
    AudioSourceComponent, CameraComponent, Component, ComponentKind, MeshData, MeshRendererComponent, MeshVertices,
    Projection, Renderable, SpriteRendererComponent, TextRendererComponent, TransformComponent,
};
pub use scene_graph::Scene;
pub use serialization::{DeserializeReport, SceneParseError};
pub use world::{GameObject, GameObjectId, World};

use thiserror::Error;

/// Errors from world and scene mutation
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SceneError {
    /// A fixed-capacity pool has no free slot
    #[error("{pool} pool exhausted ({capacity} slots)")]
    PoolExhausted {
        /// Pool that is full
        pool: &'static str,
        /// Its capacity
        capacity: usize,
    },

    /// The game object handle does not resolve
    #[error("Unknown game object")]
    UnknownGameObject,
}

/// Result type for scene operations
pub type SceneResult<T> = Result<T, SceneError>;
