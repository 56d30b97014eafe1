//! Game objects and component storage

use crate::core::config::PoolConfig;
use crate::foundation::collections::{new_key_type, Pool};
use crate::render::{RenderResult, Renderer};

use super::components::{
    AudioSourceComponent, CameraComponent, Component, ComponentSet, MeshRendererComponent, Renderable,
    SpriteRendererComponent, TextRendererComponent, TransformComponent,
};
use super::{SceneError, SceneResult};
use crate::scene::components::{
    AudioSourceHandle, CameraHandle, MeshRendererHandle, SpriteRendererHandle, TextRendererHandle, TransformHandle,
};

new_key_type! {
    /// Stable handle to a game object
    pub struct GameObjectId;
}

/// A named bag of components
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameObject {
    name: String,
    components: ComponentSet,
}

impl GameObject {
    /// Display name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Rename
    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    /// Attached component handles
    pub fn components(&self) -> &ComponentSet {
        &self.components
    }
}

/// One fixed-capacity pool per component kind
pub struct ComponentPools {
    pub(crate) transforms: Pool<TransformHandle, TransformComponent>,
    pub(crate) cameras: Pool<CameraHandle, CameraComponent>,
    pub(crate) sprite_renderers: Pool<SpriteRendererHandle, SpriteRendererComponent>,
    pub(crate) text_renderers: Pool<TextRendererHandle, TextRendererComponent>,
    pub(crate) mesh_renderers: Pool<MeshRendererHandle, MeshRendererComponent>,
    pub(crate) audio_sources: Pool<AudioSourceHandle, AudioSourceComponent>,
}

impl ComponentPools {
    fn new(config: &PoolConfig) -> Self {
        Self {
            transforms: Pool::with_capacity(config.transforms),
            cameras: Pool::with_capacity(config.cameras),
            sprite_renderers: Pool::with_capacity(config.sprite_renderers),
            text_renderers: Pool::with_capacity(config.text_renderers),
            mesh_renderers: Pool::with_capacity(config.mesh_renderers),
            audio_sources: Pool::with_capacity(config.audio_sources),
        }
    }

    fn reset(&mut self) {
        self.transforms.reset();
        self.cameras.reset();
        self.sprite_renderers.reset();
        self.text_renderers.reset();
        self.mesh_renderers.reset();
        self.audio_sources.reset();
    }
}

/// Owner of every game object and component
pub struct World {
    game_objects: Pool<GameObjectId, GameObject>,
    pools: ComponentPools,
}

impl World {
    /// Create a world with the configured pool capacities
    pub fn new(config: &PoolConfig) -> Self {
        log::debug!("Creating world with pools {:?}", config);
        Self {
            game_objects: Pool::with_capacity(config.game_objects),
            pools: ComponentPools::new(config),
        }
    }

    /// Create an empty game object
    pub fn create_game_object(&mut self, name: impl Into<String>) -> SceneResult<GameObjectId> {
        let object = GameObject {
            name: name.into(),
            components: ComponentSet::default(),
        };
        self.game_objects.insert(object).map_err(|full| SceneError::PoolExhausted {
            pool: "gameobject",
            capacity: full.capacity,
        })
    }

    /// Destroy a game object and every component it owns.
    ///
    /// Returns `false` if the object did not exist.
    pub fn destroy_game_object(&mut self, id: GameObjectId) -> bool {
        let Some(object) = self.game_objects.remove(id) else {
            return false;
        };
        let set = object.components;
        if let Some(h) = set.transform {
            self.pools.transforms.remove(h);
        }
        if let Some(h) = set.camera {
            self.pools.cameras.remove(h);
        }
        if let Some(h) = set.sprite_renderer {
            self.pools.sprite_renderers.remove(h);
        }
        if let Some(h) = set.text_renderer {
            self.pools.text_renderers.remove(h);
        }
        if let Some(h) = set.mesh_renderer {
            self.pools.mesh_renderers.remove(h);
        }
        if let Some(h) = set.audio_source {
            self.pools.audio_sources.remove(h);
        }
        true
    }

    /// Whether `id` refers to a live game object
    pub fn contains(&self, id: GameObjectId) -> bool {
        self.game_objects.contains(id)
    }

    /// Look up a game object
    pub fn game_object(&self, id: GameObjectId) -> Option<&GameObject> {
        self.game_objects.get(id)
    }

    /// Look up a game object mutably
    pub fn game_object_mut(&mut self, id: GameObjectId) -> Option<&mut GameObject> {
        self.game_objects.get_mut(id)
    }

    /// Live game objects
    pub fn game_object_count(&self) -> usize {
        self.game_objects.len()
    }

    /// Attach a default `C`, or return the handle of the one already attached
    pub fn add_component<C: Component + Default>(&mut self, id: GameObjectId) -> SceneResult<C::Handle> {
        if let Some(handle) = self.game_objects.get(id).and_then(|o| C::slot(&o.components)) {
            return Ok(handle);
        }
        self.insert_component(id, C::default())
    }

    /// Attach `component`, replacing the value of an already attached `C`
    pub fn insert_component<C: Component>(&mut self, id: GameObjectId, component: C) -> SceneResult<C::Handle> {
        let object = self.game_objects.get_mut(id).ok_or(SceneError::UnknownGameObject)?;

        if let Some(handle) = C::slot(&object.components) {
            if let Some(existing) = C::pool_mut(&mut self.pools).get_mut(handle) {
                *existing = component;
                return Ok(handle);
            }
        }

        let handle = C::pool_mut(&mut self.pools).insert(component).map_err(|full| SceneError::PoolExhausted {
            pool: C::KIND.name(),
            capacity: full.capacity,
        })?;
        *C::slot_mut(&mut object.components) = Some(handle);
        Ok(handle)
    }

    /// Detach `C` and return it. Its pool slot becomes free.
    pub fn remove_component<C: Component>(&mut self, id: GameObjectId) -> Option<C> {
        let object = self.game_objects.get_mut(id)?;
        let handle = C::slot_mut(&mut object.components).take()?;
        C::pool_mut(&mut self.pools).remove(handle)
    }

    /// The `C` attached to `id`
    pub fn component<C: Component>(&self, id: GameObjectId) -> Option<&C> {
        let handle = C::slot(&self.game_objects.get(id)?.components)?;
        C::pool(&self.pools).get(handle)
    }

    /// The `C` attached to `id`, mutably
    pub fn component_mut<C: Component>(&mut self, id: GameObjectId) -> Option<&mut C> {
        let handle = C::slot(&self.game_objects.get(id)?.components)?;
        C::pool_mut(&mut self.pools).get_mut(handle)
    }

    /// Whether `id` carries a `C`
    pub fn has_component<C: Component>(&self, id: GameObjectId) -> bool {
        self.component::<C>(id).is_some()
    }

    /// Resolve a component handle directly
    pub fn component_by_handle<C: Component>(&self, handle: C::Handle) -> Option<&C> {
        C::pool(&self.pools).get(handle)
    }

    /// Live components of kind `C`
    pub fn component_count<C: Component>(&self) -> usize {
        C::pool(&self.pools).len()
    }

    /// Capacity of the `C` pool
    pub fn component_capacity<C: Component>(&self) -> usize {
        C::pool(&self.pools).capacity()
    }

    /// Destroy everything. Every previously issued handle stops resolving.
    pub fn clear(&mut self) {
        self.game_objects.reset();
        self.pools.reset();
    }

    /// Render the `C` attached to `id`, if any
    pub(crate) fn render_component<C: Component + Renderable>(
        &mut self,
        id: GameObjectId,
        renderer: &mut Renderer,
        projection_model: &[f32; 16],
    ) -> RenderResult<()> {
        match self.component_mut::<C>(id) {
            Some(component) => component.render(renderer, projection_model),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn world() -> World {
        World::new(&PoolConfig::uniform(4).with_sprite_renderers(1))
    }

    #[test]
    fn test_add_component_returns_existing_handle() {
        let mut world = world();
        let id = world.create_game_object("player").unwrap();

        let first = world.add_component::<TransformComponent>(id).unwrap();
        let second = world.add_component::<TransformComponent>(id).unwrap();

        assert_eq!(first, second);
        assert_eq!(world.component_count::<TransformComponent>(), 1);
    }

    #[test]
    fn test_pool_exhaustion_is_reported() {
        let mut world = world();
        let a = world.create_game_object("a").unwrap();
        let b = world.create_game_object("b").unwrap();

        world.add_component::<SpriteRendererComponent>(a).unwrap();
        let err = world.add_component::<SpriteRendererComponent>(b).unwrap_err();

        assert_eq!(err, SceneError::PoolExhausted { pool: "spriterenderer", capacity: 1 });
    }

    #[test]
    fn test_removed_slot_is_reused_and_stale_handle_dies() {
        let mut world = world();
        let a = world.create_game_object("a").unwrap();
        let b = world.create_game_object("b").unwrap();

        let stale = world.add_component::<SpriteRendererComponent>(a).unwrap();
        assert!(world.remove_component::<SpriteRendererComponent>(a).is_some());

        let fresh = world.add_component::<SpriteRendererComponent>(b).unwrap();
        assert_ne!(stale, fresh);
        assert!(world.component_by_handle::<SpriteRendererComponent>(stale).is_none());
        assert!(world.component_by_handle::<SpriteRendererComponent>(fresh).is_some());
    }

    #[test]
    fn test_destroy_frees_components() {
        let mut world = world();
        let id = world.create_game_object("camera").unwrap();
        world.add_component::<TransformComponent>(id).unwrap();
        world.add_component::<CameraComponent>(id).unwrap();

        assert!(world.destroy_game_object(id));
        assert!(!world.destroy_game_object(id));
        assert_eq!(world.component_count::<TransformComponent>(), 0);
        assert_eq!(world.component_count::<CameraComponent>(), 0);
        assert!(world.component::<CameraComponent>(id).is_none());
    }

    #[test]
    fn test_unknown_game_object() {
        let mut world = world();
        let id = world.create_game_object("gone").unwrap();
        world.destroy_game_object(id);

        assert_eq!(world.add_component::<CameraComponent>(id), Err(SceneError::UnknownGameObject));
        assert!(world.remove_component::<CameraComponent>(id).is_none());
    }

    #[test]
    fn test_game_object_capacity() {
        let mut world = World::new(&PoolConfig::uniform(1));
        world.create_game_object("only").unwrap();
        assert!(matches!(
            world.create_game_object("extra"),
            Err(SceneError::PoolExhausted { pool: "gameobject", capacity: 1 })
        ));
    }

    #[test]
    fn test_clear_invalidates_everything() {
        let mut world = world();
        let id = world.create_game_object("x").unwrap();
        world.add_component::<TransformComponent>(id).unwrap();

        world.clear();

        assert!(!world.contains(id));
        assert_eq!(world.component_count::<TransformComponent>(), 0);
    }
}
