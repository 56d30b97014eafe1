//! Scene traversal and per-frame rendering

use crate::foundation::math::{to_column_major, Mat4, Vec4};
use crate::render::api::{ClearFlags, TextureId};
use crate::render::{RenderResult, Renderer};

use super::components::{
    CameraComponent, MeshRendererComponent, SpriteRendererComponent, TextRendererComponent, TransformComponent,
};
use super::serialization::{deserialize_scene, serialize_scene, DeserializeReport};
use super::world::{GameObjectId, World};

/// Objects to draw, plus the main camera and skybox.
///
/// The scene does not own its game objects; they live in a [`World`].
#[derive(Debug, Default, Clone)]
pub struct Scene {
    game_objects: Vec<GameObjectId>,
    skybox: Option<TextureId>,
    main_camera: Option<GameObjectId>,
}

impl Scene {
    /// Empty scene
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a game object.
    ///
    /// Duplicates and unknown objects are ignored. The first object added
    /// that carries a camera becomes the main camera.
    pub fn add(&mut self, world: &World, id: GameObjectId) {
        if self.game_objects.contains(&id) {
            return;
        }
        if !world.contains(id) {
            log::debug!("Ignoring add of unknown game object {:?}", id);
            return;
        }
        self.game_objects.push(id);
        if self.main_camera.is_none() && world.has_component::<CameraComponent>(id) {
            log::debug!("Main camera set to '{}'", world.game_object(id).map_or("", |o| o.name()));
            self.main_camera = Some(id);
        }
    }

    /// Remove a game object. Absent objects are ignored.
    pub fn remove(&mut self, id: GameObjectId) {
        self.game_objects.retain(|&other| other != id);
        if self.main_camera == Some(id) {
            self.main_camera = None;
        }
    }

    /// Whether `id` is in the scene
    pub fn contains(&self, id: GameObjectId) -> bool {
        self.game_objects.contains(&id)
    }

    /// Objects in draw order
    pub fn game_objects(&self) -> &[GameObjectId] {
        &self.game_objects
    }

    /// Number of objects
    pub fn len(&self) -> usize {
        self.game_objects.len()
    }

    /// Whether the scene has no objects
    pub fn is_empty(&self) -> bool {
        self.game_objects.is_empty()
    }

    /// Camera rendered to the swapchain
    pub fn main_camera(&self) -> Option<GameObjectId> {
        self.main_camera
    }

    /// Replace the main camera
    pub fn set_main_camera(&mut self, camera: Option<GameObjectId>) {
        self.main_camera = camera;
    }

    /// Cube map drawn behind everything
    pub fn skybox(&self) -> Option<TextureId> {
        self.skybox
    }

    /// Set or clear the skybox. The shared cube is generated on first use.
    pub fn set_skybox(&mut self, renderer: &mut Renderer, cube_map: Option<TextureId>) -> RenderResult<()> {
        if cube_map.is_some() {
            renderer.generate_skybox()?;
        }
        self.skybox = cube_map;
        Ok(())
    }

    /// Render every render-texture camera, then the main camera.
    ///
    /// Does nothing if there is no main camera or it lost its camera
    /// component.
    pub fn render(&self, world: &mut World, renderer: &mut Renderer) -> RenderResult<()> {
        let Some(main) = self.main_camera else {
            return Ok(());
        };
        if !world.has_component::<CameraComponent>(main) {
            log::debug!("Main camera has no camera component, nothing rendered");
            return Ok(());
        }

        let texture_cameras: Vec<GameObjectId> = self
            .game_objects
            .iter()
            .copied()
            .filter(|&id| id != main)
            .filter(|&id| world.component::<CameraComponent>(id).is_some_and(|c| c.target_texture().is_some()))
            .collect();

        for camera in texture_cameras {
            self.render_camera(world, renderer, camera)?;
        }
        self.render_camera(world, renderer, main)
    }

    fn render_camera(&self, world: &mut World, renderer: &mut Renderer, camera_id: GameObjectId) -> RenderResult<()> {
        let Some(camera) = world.component::<CameraComponent>(camera_id).copied() else {
            return Ok(());
        };
        let projection = camera.projection_matrix();
        let view_rotation = world
            .component::<TransformComponent>(camera_id)
            .map_or_else(Mat4::identity, TransformComponent::view_rotation);
        let clear = camera.clear_color();

        renderer.device_mut().set_render_target(camera.target_texture());
        renderer.cull_lights(&projection, &Mat4::identity(), camera.depth_normal_target())?;

        let device = renderer.device_mut();
        device.set_clear_color(Vec4::new(clear.x, clear.y, clear.z, 1.0));
        device.begin_render_pass_and_command_buffer()?;
        device.clear_screen(ClearFlags::COLOR | ClearFlags::DEPTH)?;
        device.reset_frame_statistics();

        if let Some(cube_map) = self.skybox {
            renderer.render_skybox(cube_map, &projection, &view_rotation)?;
        }

        for &id in &self.game_objects {
            let model = world
                .component::<TransformComponent>(id)
                .map_or_else(Mat4::identity, TransformComponent::local_matrix);
            let projection_model = to_column_major(&(projection * model));

            world.render_component::<SpriteRendererComponent>(id, renderer, &projection_model)?;
            world.render_component::<TextRendererComponent>(id, renderer, &projection_model)?;
            world.render_component::<MeshRendererComponent>(id, renderer, &projection_model)?;
        }

        renderer.device_mut().end_render_pass_and_command_buffer()
    }

    /// Write every live object in scene order as scene text
    pub fn serialize(&self, world: &World) -> String {
        serialize_scene(world, &self.game_objects)
    }

    /// Parse scene text, creating objects in `world` and adding them here.
    ///
    /// Parsing stops at the first error; objects read before it are kept.
    pub fn deserialize(&mut self, world: &mut World, text: &str) -> DeserializeReport {
        let report = deserialize_scene(world, text);
        for &id in &report.game_objects {
            self.add(world, id);
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::PoolConfig;
    use crate::foundation::math::{Vec2, Vec3};
    use crate::render::backends::immediate::{ImmediateBackend, RecordedCommand};
    use crate::render::{BuiltinShaderSources, GfxDevice};
    use approx::assert_relative_eq;

    fn setup() -> (World, Renderer) {
        let device = GfxDevice::new(Box::new(ImmediateBackend::new(64, 64)));
        let renderer = Renderer::new(device, &BuiltinShaderSources::headless()).unwrap();
        (World::new(&PoolConfig::default()), renderer)
    }

    fn immediate(renderer: &Renderer) -> &ImmediateBackend {
        renderer.device().backend().as_any().downcast_ref::<ImmediateBackend>().unwrap()
    }

    fn camera(world: &mut World, name: &str) -> GameObjectId {
        let id = world.create_game_object(name).unwrap();
        world.add_component::<CameraComponent>(id).unwrap();
        id
    }

    fn sprite_object(world: &mut World, renderer: &mut Renderer) -> GameObjectId {
        let texture = renderer.device_mut().create_texture_2d(1, 1, &[255; 4]).unwrap();
        let id = world.create_game_object("sprite").unwrap();
        world.add_component::<SpriteRendererComponent>(id).unwrap();
        world
            .component_mut::<SpriteRendererComponent>(id)
            .unwrap()
            .set_texture(texture, Vec3::zeros(), Vec2::new(4.0, 4.0));
        id
    }

    #[test]
    fn test_add_ignores_duplicates_and_first_camera_wins() {
        let (mut world, _renderer) = setup();
        let mut scene = Scene::new();
        let first = camera(&mut world, "first");
        let second = camera(&mut world, "second");

        scene.add(&world, first);
        scene.add(&world, first);
        scene.add(&world, second);

        assert_eq!(scene.len(), 2);
        assert_eq!(scene.main_camera(), Some(first));

        scene.set_main_camera(Some(second));
        assert_eq!(scene.main_camera(), Some(second));
    }

    #[test]
    fn test_remove_absent_is_noop() {
        let (mut world, _renderer) = setup();
        let mut scene = Scene::new();
        let a = world.create_game_object("a").unwrap();
        let b = world.create_game_object("b").unwrap();
        scene.add(&world, a);

        scene.remove(b);
        assert_eq!(scene.game_objects(), &[a]);
        scene.remove(a);
        assert!(scene.is_empty());
    }

    #[test]
    fn test_empty_scene_renders_nothing() {
        let (mut world, mut renderer) = setup();
        Scene::new().render(&mut world, &mut renderer).unwrap();

        assert!(immediate(&renderer).current_frame().is_empty());
        assert_eq!(renderer.statistics().draw_calls, 0);
    }

    #[test]
    fn test_removed_camera_component_renders_nothing() {
        let (mut world, mut renderer) = setup();
        let mut scene = Scene::new();
        let cam = camera(&mut world, "cam");
        let sprite = sprite_object(&mut world, &mut renderer);
        scene.add(&world, cam);
        scene.add(&world, sprite);

        world.remove_component::<CameraComponent>(cam);
        scene.render(&mut world, &mut renderer).unwrap();

        assert!(immediate(&renderer).current_frame().is_empty());
    }

    #[test]
    fn test_pass_clears_then_draws() {
        let (mut world, mut renderer) = setup();
        let mut scene = Scene::new();
        let cam = camera(&mut world, "cam");
        world
            .component_mut::<CameraComponent>(cam)
            .unwrap()
            .set_clear_color(Vec3::new(0.1, 0.2, 0.3));
        let sprite = sprite_object(&mut world, &mut renderer);
        scene.add(&world, cam);
        scene.add(&world, sprite);

        scene.render(&mut world, &mut renderer).unwrap();

        let frame = immediate(&renderer).current_frame();
        assert_eq!(frame.len(), 1);
        assert_eq!(frame[0].target, None);
        assert_eq!(
            frame[0].commands[0],
            RecordedCommand::Clear { flags: ClearFlags::COLOR | ClearFlags::DEPTH, color: [0.1, 0.2, 0.3, 1.0] }
        );
        assert_eq!(frame[0].draws().count(), 1);
        assert_eq!(renderer.statistics().draw_calls, 1);
        assert_eq!(renderer.statistics().texture_binds, 1);
    }

    #[test]
    fn test_texture_cameras_render_before_main() {
        let (mut world, mut renderer) = setup();
        let mut scene = Scene::new();
        let main = camera(&mut world, "main");
        let target_a = renderer.device_mut().create_render_texture(16, 16).unwrap();
        let target_b = renderer.device_mut().create_render_texture(16, 16).unwrap();
        let rt_a = camera(&mut world, "rt_a");
        let rt_b = camera(&mut world, "rt_b");
        world.component_mut::<CameraComponent>(rt_a).unwrap().set_target_texture(Some(target_a));
        world.component_mut::<CameraComponent>(rt_b).unwrap().set_target_texture(Some(target_b));

        scene.add(&world, main);
        scene.add(&world, rt_b);
        scene.add(&world, rt_a);
        scene.render(&mut world, &mut renderer).unwrap();

        let targets: Vec<_> = immediate(&renderer).current_frame().iter().map(|p| p.target).collect();
        assert_eq!(targets, vec![Some(target_b), Some(target_a), None]);
    }

    #[test]
    fn test_projection_model_uses_transform() {
        let (mut world, mut renderer) = setup();
        let mut scene = Scene::new();
        let cam = camera(&mut world, "cam");
        let sprite = sprite_object(&mut world, &mut renderer);
        world.add_component::<TransformComponent>(sprite).unwrap();
        world
            .component_mut::<TransformComponent>(sprite)
            .unwrap()
            .set_local_position(Vec3::new(0.5, 0.0, 0.0));
        scene.add(&world, cam);
        scene.add(&world, sprite);

        scene.render(&mut world, &mut renderer).unwrap();

        let camera_projection = world.component::<CameraComponent>(cam).unwrap().projection_matrix();
        let expected = to_column_major(&(camera_projection * Mat4::new_translation(&Vec3::new(0.5, 0.0, 0.0))));
        let draw = *immediate(&renderer).current_frame()[0].draws().next().unwrap();
        for (a, b) in draw.projection_model.iter().zip(expected.iter()) {
            assert_relative_eq!(*a, *b);
        }
    }

    #[test]
    fn test_skybox_drawn_first() {
        let (mut world, mut renderer) = setup();
        let mut scene = Scene::new();
        let face: &[u8] = &[0; 4];
        let cube = renderer.device_mut().create_texture_cube(1, [face; 6]).unwrap();
        let cam = camera(&mut world, "cam");
        let sprite = sprite_object(&mut world, &mut renderer);
        scene.add(&world, cam);
        scene.add(&world, sprite);

        scene.set_skybox(&mut renderer, Some(cube)).unwrap();
        assert!(renderer.is_skybox_generated());
        scene.render(&mut world, &mut renderer).unwrap();

        let frame = immediate(&renderer).current_frame();
        let draws: Vec<_> = frame[0].draws().collect();
        assert_eq!(draws.len(), 2);
        assert_eq!(draws[0].texture, Some(cube));
        assert_eq!(draws[0].shader, renderer.shaders().skybox);
    }

    #[test]
    fn test_each_camera_culls_against_its_own_target() {
        let (mut world, mut renderer) = setup();
        let mut scene = Scene::new();
        let main = camera(&mut world, "main");
        let target = renderer.device_mut().create_render_texture(16, 16).unwrap();
        let rt = camera(&mut world, "rt");
        world.component_mut::<CameraComponent>(rt).unwrap().set_target_texture(Some(target));
        renderer
            .lights_mut()
            .set_point_light_parameters(0, Vec3::zeros(), 0.25, Vec4::repeat(1.0));

        scene.add(&world, main);
        scene.add(&world, rt);
        scene.render(&mut world, &mut renderer).unwrap();

        let tiles = immediate(&renderer).tile_lights().unwrap();
        assert_eq!((tiles.tiles_x(), tiles.tiles_y()), (4, 4));
    }

    #[test]
    fn test_camera_depth_target_reaches_culling() {
        let (mut world, mut renderer) = setup();
        let mut scene = Scene::new();
        let depth = renderer.device_mut().create_render_texture(64, 64).unwrap();
        let cam = camera(&mut world, "cam");
        world.component_mut::<CameraComponent>(cam).unwrap().set_depth_normal_target(Some(depth));
        renderer
            .lights_mut()
            .set_point_light_parameters(0, Vec3::zeros(), 0.25, Vec4::repeat(1.0));
        scene.add(&world, cam);

        scene.render(&mut world, &mut renderer).unwrap();
        assert_eq!(immediate(&renderer).cull_depth_target(), Some(depth));

        world.component_mut::<CameraComponent>(cam).unwrap().set_depth_normal_target(None);
        scene.render(&mut world, &mut renderer).unwrap();
        assert_eq!(immediate(&renderer).cull_depth_target(), None);
    }
}
