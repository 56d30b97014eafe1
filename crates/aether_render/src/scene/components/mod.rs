//! Scene components
//!
//! A game object owns at most one component of each [`ComponentKind`]. The
//! components themselves live in fixed-capacity generational pools inside the
//! [`World`](crate::scene::World); a game object only stores handles.

mod audio_source;
mod camera;
mod mesh_renderer;
mod sprite_renderer;
mod text_renderer;
mod transform;

pub use audio_source::AudioSourceComponent;
pub use camera::{CameraComponent, Projection};
pub use mesh_renderer::{MeshData, MeshRendererComponent, MeshVertices};
pub use sprite_renderer::SpriteRendererComponent;
pub use text_renderer::TextRendererComponent;
pub(crate) use text_renderer::unescape;
pub use transform::TransformComponent;

use slotmap::Key;

use crate::foundation::collections::{new_key_type, Pool};
use crate::render::{RenderResult, Renderer};
use crate::scene::world::ComponentPools;

new_key_type! {
    /// Handle into the transform pool
    pub struct TransformHandle;
    /// Handle into the camera pool
    pub struct CameraHandle;
    /// Handle into the sprite renderer pool
    pub struct SpriteRendererHandle;
    /// Handle into the text renderer pool
    pub struct TextRendererHandle;
    /// Handle into the mesh renderer pool
    pub struct MeshRendererHandle;
    /// Handle into the audio source pool
    pub struct AudioSourceHandle;
}

/// Every kind of component a game object can carry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComponentKind {
    /// [`TransformComponent`]
    Transform,
    /// [`CameraComponent`]
    Camera,
    /// [`SpriteRendererComponent`]
    SpriteRenderer,
    /// [`TextRendererComponent`]
    TextRenderer,
    /// [`MeshRendererComponent`]
    MeshRenderer,
    /// [`AudioSourceComponent`]
    AudioSource,
}

impl ComponentKind {
    /// Lowercase name, as used in the scene format and in errors
    pub fn name(self) -> &'static str {
        match self {
            Self::Transform => "transform",
            Self::Camera => "camera",
            Self::SpriteRenderer => "spriterenderer",
            Self::TextRenderer => "textrenderer",
            Self::MeshRenderer => "meshrenderer",
            Self::AudioSource => "audiosource",
        }
    }
}

/// Component handles held by one game object
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ComponentSet {
    /// Transform, if attached
    pub transform: Option<TransformHandle>,
    /// Camera, if attached
    pub camera: Option<CameraHandle>,
    /// Sprite renderer, if attached
    pub sprite_renderer: Option<SpriteRendererHandle>,
    /// Text renderer, if attached
    pub text_renderer: Option<TextRendererHandle>,
    /// Mesh renderer, if attached
    pub mesh_renderer: Option<MeshRendererHandle>,
    /// Audio source, if attached
    pub audio_source: Option<AudioSourceHandle>,
}

impl ComponentSet {
    /// Whether nothing is attached
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// A pooled component type.
///
/// Ties a component to its handle type, its pool and its slot in
/// [`ComponentSet`], which is what lets the world offer one generic
/// add/get/remove API.
pub trait Component: Sized + 'static {
    /// Pool handle type
    type Handle: Key;

    /// Which kind this is
    const KIND: ComponentKind;

    /// The pool storing this component
    fn pool(pools: &ComponentPools) -> &Pool<Self::Handle, Self>;

    /// The pool storing this component, mutably
    fn pool_mut(pools: &mut ComponentPools) -> &mut Pool<Self::Handle, Self>;

    /// This component's handle in a set
    fn slot(set: &ComponentSet) -> Option<Self::Handle>;

    /// This component's handle slot in a set, mutably
    fn slot_mut(set: &mut ComponentSet) -> &mut Option<Self::Handle>;
}

macro_rules! impl_component {
    ($component:ty, $handle:ty, $kind:ident, $pool:ident, $slot:ident) => {
        impl Component for $component {
            type Handle = $handle;
            const KIND: ComponentKind = ComponentKind::$kind;

            fn pool(pools: &ComponentPools) -> &Pool<Self::Handle, Self> {
                &pools.$pool
            }

            fn pool_mut(pools: &mut ComponentPools) -> &mut Pool<Self::Handle, Self> {
                &mut pools.$pool
            }

            fn slot(set: &ComponentSet) -> Option<Self::Handle> {
                set.$slot
            }

            fn slot_mut(set: &mut ComponentSet) -> &mut Option<Self::Handle> {
                &mut set.$slot
            }
        }
    };
}

impl_component!(TransformComponent, TransformHandle, Transform, transforms, transform);
impl_component!(CameraComponent, CameraHandle, Camera, cameras, camera);
impl_component!(SpriteRendererComponent, SpriteRendererHandle, SpriteRenderer, sprite_renderers, sprite_renderer);
impl_component!(TextRendererComponent, TextRendererHandle, TextRenderer, text_renderers, text_renderer);
impl_component!(MeshRendererComponent, MeshRendererHandle, MeshRenderer, mesh_renderers, mesh_renderer);
impl_component!(AudioSourceComponent, AudioSourceHandle, AudioSource, audio_sources, audio_source);

/// A component that draws itself during a camera pass.
pub trait Renderable {
    /// Draw with the column-major `projection * model` matrix.
    ///
    /// Called inside an open render pass.
    fn render(&mut self, renderer: &mut Renderer, projection_model: &[f32; 16]) -> RenderResult<()>;
}
