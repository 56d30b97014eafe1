//! Scene text format
//!
//! One keyword per line, fields separated by whitespace. A `gameobject` line
//! starts an object; component lines attach to it and field lines configure
//! the component attached last of their kind.
//!
//! ```text
//! gameobject camera
//! transform
//! position 1 2 3
//! rotation 0 0 0 1
//! camera
//! ortho 0 0 800 600 0.1 100
//! clearcolor 0.2 0.3 0.4
//! ```
//!
//! Unknown keywords are skipped. A field line whose component is missing, or
//! with malformed values, stops parsing.

use std::str::SplitWhitespace;

use thiserror::Error;

use crate::foundation::math::{Vec3, Vec4};

use super::components::{
    unescape, AudioSourceComponent, CameraComponent, Component, TextRendererComponent, TransformComponent,
};
use super::world::{GameObjectId, World};
use super::SceneError;

/// Reasons parsing stopped. Lines are 1-based.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SceneParseError {
    /// A component or field line came before any `gameobject`
    #[error("line {line}: '{keyword}' before any gameobject")]
    NoGameObject {
        /// Line number
        line: usize,
        /// Offending keyword
        keyword: String,
    },

    /// A field line came before its component
    #[error("line {line}: '{keyword}' needs a {component} component")]
    MissingComponent {
        /// Line number
        line: usize,
        /// Offending keyword
        keyword: String,
        /// Component the field belongs to
        component: &'static str,
    },

    /// Field values are missing or malformed
    #[error("line {line}: '{keyword}' expects {expected}")]
    InvalidField {
        /// Line number
        line: usize,
        /// Offending keyword
        keyword: String,
        /// What the keyword takes
        expected: &'static str,
    },

    /// The world refused the object or component
    #[error("line {line}: {source}")]
    Scene {
        /// Line number
        line: usize,
        /// World error
        #[source]
        source: SceneError,
    },
}

/// Outcome of parsing scene text
#[derive(Debug, Clone, PartialEq)]
pub struct DeserializeReport {
    /// Objects created, in file order
    pub game_objects: Vec<GameObjectId>,
    /// Why parsing stopped early, if it did
    pub error: Option<SceneParseError>,
}

impl DeserializeReport {
    /// The created objects, or the error that stopped parsing
    pub fn into_result(self) -> Result<Vec<GameObjectId>, SceneParseError> {
        match self.error {
            Some(error) => Err(error),
            None => Ok(self.game_objects),
        }
    }
}

/// Write `ids` as scene text. Destroyed objects are skipped.
pub fn serialize_scene(world: &World, ids: &[GameObjectId]) -> String {
    let mut out = String::new();
    for &id in ids {
        let Some(object) = world.game_object(id) else {
            continue;
        };
        let name: Vec<&str> = object.name().split_whitespace().collect();
        out.push_str(&format!("gameobject {}\n", name.join("_")));

        if let Some(transform) = world.component::<TransformComponent>(id) {
            transform.serialize(&mut out);
        }
        if let Some(camera) = world.component::<CameraComponent>(id) {
            camera.serialize(&mut out);
        }
        if let Some(text) = world.component::<TextRendererComponent>(id) {
            text.serialize(&mut out);
        }
        if let Some(audio) = world.component::<AudioSourceComponent>(id) {
            audio.serialize(&mut out);
        }
    }
    out
}

struct Parser<'w> {
    world: &'w mut World,
    current: Option<GameObjectId>,
    created: Vec<GameObjectId>,
}

struct Line<'a> {
    number: usize,
    keyword: &'a str,
    raw: &'a str,
    fields: SplitWhitespace<'a>,
}

impl Line<'_> {
    fn invalid(&self, expected: &'static str) -> SceneParseError {
        SceneParseError::InvalidField { line: self.number, keyword: self.keyword.to_string(), expected }
    }

    fn floats<const N: usize>(&mut self, expected: &'static str) -> Result<[f32; N], SceneParseError> {
        let mut values = [0.0; N];
        for value in &mut values {
            *value = self
                .fields
                .next()
                .and_then(|token| token.parse().ok())
                .ok_or_else(|| self.invalid(expected))?;
        }
        if self.fields.next().is_some() {
            return Err(self.invalid(expected));
        }
        Ok(values)
    }

    /// Everything after the keyword and one separating space
    fn rest(&self) -> &str {
        let after = self.raw.trim_start();
        let after = &after[self.keyword.len()..];
        after.strip_prefix(' ').unwrap_or(after)
    }
}

impl Parser<'_> {
    fn object(&self, line: &Line<'_>) -> Result<GameObjectId, SceneParseError> {
        self.current.ok_or_else(|| SceneParseError::NoGameObject { line: line.number, keyword: line.keyword.to_string() })
    }

    fn attach<C: Component + Default>(&mut self, line: &Line<'_>) -> Result<(), SceneParseError> {
        let id = self.object(line)?;
        self.world
            .add_component::<C>(id)
            .map(|_| ())
            .map_err(|source| SceneParseError::Scene { line: line.number, source })
    }

    fn field<C: Component>(&mut self, line: &Line<'_>) -> Result<&mut C, SceneParseError> {
        let id = self.object(line)?;
        self.world.component_mut::<C>(id).ok_or_else(|| SceneParseError::MissingComponent {
            line: line.number,
            keyword: line.keyword.to_string(),
            component: C::KIND.name(),
        })
    }

    fn line(&mut self, mut line: Line<'_>) -> Result<(), SceneParseError> {
        match line.keyword {
            "gameobject" => {
                let name = line.fields.next().unwrap_or("");
                let id = self
                    .world
                    .create_game_object(name)
                    .map_err(|source| SceneParseError::Scene { line: line.number, source })?;
                self.created.push(id);
                self.current = Some(id);
            }
            "transform" => self.attach::<TransformComponent>(&line)?,
            "camera" => self.attach::<CameraComponent>(&line)?,
            "textrenderer" => self.attach::<TextRendererComponent>(&line)?,
            "audiosource" => self.attach::<AudioSourceComponent>(&line)?,
            "position" => {
                let [x, y, z] = line.floats("3 numbers")?;
                self.field::<TransformComponent>(&line)?.set_local_position(Vec3::new(x, y, z));
            }
            "rotation" => {
                let [x, y, z, s] = line.floats("4 numbers")?;
                self.field::<TransformComponent>(&line)?.set_local_rotation_components(x, y, z, s);
            }
            "scale" => {
                let [s] = line.floats("1 number")?;
                self.field::<TransformComponent>(&line)?.set_local_scale(s);
            }
            "ortho" => {
                let [x, y, w, h, near, far] = line.floats("6 numbers")?;
                self.field::<CameraComponent>(&line)?.set_projection_ortho(x, y, w, h, near, far);
            }
            "perspective" => {
                let [fov, aspect, near, far] = line.floats("4 numbers")?;
                self.field::<CameraComponent>(&line)?.set_projection_perspective(fov, aspect, near, far);
            }
            "clearcolor" => {
                let [r, g, b] = line.floats("3 numbers")?;
                self.field::<CameraComponent>(&line)?.set_clear_color(Vec3::new(r, g, b));
            }
            "text" => {
                let text = unescape(line.rest());
                self.field::<TextRendererComponent>(&line)?.set_text(text);
            }
            "textcolor" => {
                let [r, g, b, a] = line.floats("4 numbers")?;
                self.field::<TextRendererComponent>(&line)?.set_color(Vec4::new(r, g, b, a));
            }
            "audioclip" => {
                let clip = line.fields.next().ok_or_else(|| line.invalid("a clip id"))?;
                self.field::<AudioSourceComponent>(&line)?.set_clip(clip);
            }
            "volume" => {
                let [volume] = line.floats("1 number")?;
                self.field::<AudioSourceComponent>(&line)?.set_volume(volume);
            }
            "looping" => {
                let looping = match line.fields.next() {
                    Some("0") => false,
                    Some("1") => true,
                    _ => return Err(line.invalid("0 or 1")),
                };
                self.field::<AudioSourceComponent>(&line)?.set_looping(looping);
            }
            other => log::trace!("line {}: ignoring unknown keyword '{}'", line.number, other),
        }
        Ok(())
    }
}

/// Parse scene text into `world`.
///
/// Stops at the first error and reports the objects created before it.
pub fn deserialize_scene(world: &mut World, text: &str) -> DeserializeReport {
    let mut parser = Parser { world, current: None, created: Vec::new() };
    let mut error = None;

    for (index, raw) in text.lines().enumerate() {
        let mut fields = raw.split_whitespace();
        let Some(keyword) = fields.next() else {
            continue;
        };
        let line = Line { number: index + 1, keyword, raw, fields };
        if let Err(e) = parser.line(line) {
            log::debug!("Scene parsing stopped: {}", e);
            error = Some(e);
            break;
        }
    }

    DeserializeReport { game_objects: parser.created, error }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::PoolConfig;
    use crate::scene::Scene;
    use approx::assert_relative_eq;

    fn world() -> World {
        World::new(&PoolConfig::default())
    }

    #[test]
    fn test_round_trip_transform_and_camera() {
        let mut world = world();
        let mut scene = Scene::new();
        let id = world.create_game_object("main camera").unwrap();
        world.add_component::<TransformComponent>(id).unwrap();
        world.add_component::<CameraComponent>(id).unwrap();
        {
            let transform = world.component_mut::<TransformComponent>(id).unwrap();
            transform.set_local_position(Vec3::new(1.0, 2.0, 3.0));
            transform.set_local_rotation_components(0.0, 0.0, 0.0, 1.0);
        }
        {
            let camera = world.component_mut::<CameraComponent>(id).unwrap();
            camera.set_projection_ortho(0.0, 0.0, 800.0, 600.0, 0.1, 100.0);
            camera.set_clear_color(Vec3::new(0.2, 0.3, 0.4));
        }
        scene.add(&world, id);

        let text = scene.serialize(&world);
        let mut restored_world = self::world();
        let mut restored = Scene::new();
        let ids = restored.deserialize(&mut restored_world, &text).into_result().unwrap();

        assert_eq!(ids.len(), 1);
        assert_eq!(restored.main_camera(), Some(ids[0]));
        assert_eq!(restored_world.game_object(ids[0]).unwrap().name(), "main_camera");

        let transform = restored_world.component::<TransformComponent>(ids[0]).unwrap();
        let p = transform.local_position();
        assert_relative_eq!(p.x, 1.0, epsilon = 1e-6);
        assert_relative_eq!(p.y, 2.0, epsilon = 1e-6);
        assert_relative_eq!(p.z, 3.0, epsilon = 1e-6);
        let r = transform.local_rotation_components();
        for (a, b) in r.iter().zip([0.0, 0.0, 0.0, 1.0].iter()) {
            assert_relative_eq!(*a, *b, epsilon = 1e-6);
        }

        let camera = restored_world.component::<CameraComponent>(ids[0]).unwrap();
        assert_eq!(
            camera.projection(),
            crate::scene::Projection::Orthographic { x: 0.0, y: 0.0, width: 800.0, height: 600.0, near: 0.1, far: 100.0 }
        );
        let c = camera.clear_color();
        assert_relative_eq!(c.x, 0.2, epsilon = 1e-6);
        assert_relative_eq!(c.y, 0.3, epsilon = 1e-6);
        assert_relative_eq!(c.z, 0.4, epsilon = 1e-6);
    }

    #[test]
    fn test_round_trip_text_and_audio() {
        let mut world = world();
        let id = world.create_game_object("hud").unwrap();
        world.add_component::<TextRendererComponent>(id).unwrap();
        world.add_component::<AudioSourceComponent>(id).unwrap();
        {
            let text = world.component_mut::<TextRendererComponent>(id).unwrap();
            text.set_text("score: 10\nlives: 3");
            text.set_color(Vec4::new(1.0, 0.5, 0.25, 1.0));
        }
        {
            let audio = world.component_mut::<AudioSourceComponent>(id).unwrap();
            audio.set_clip("music");
            audio.set_volume(0.75);
            audio.set_looping(true);
        }

        let text = serialize_scene(&world, &[id]);
        let mut restored = self::world();
        let ids = deserialize_scene(&mut restored, &text).into_result().unwrap();

        let text_component = restored.component::<TextRendererComponent>(ids[0]).unwrap();
        assert_eq!(text_component.text(), "score: 10\nlives: 3");
        assert_eq!(text_component.color(), Vec4::new(1.0, 0.5, 0.25, 1.0));
        let audio = restored.component::<AudioSourceComponent>(ids[0]).unwrap();
        assert_eq!(audio.clip(), Some("music"));
        assert_eq!(audio.volume(), 0.75);
        assert!(audio.is_looping());
    }

    #[test]
    fn test_component_order_is_fixed() {
        let mut world = world();
        let id = world.create_game_object("o").unwrap();
        world.add_component::<AudioSourceComponent>(id).unwrap();
        world.add_component::<CameraComponent>(id).unwrap();
        world.add_component::<TransformComponent>(id).unwrap();

        let text = serialize_scene(&world, &[id]);
        let keywords: Vec<&str> = text
            .lines()
            .filter_map(|l| l.split_whitespace().next())
            .filter(|k| ["gameobject", "transform", "camera", "audiosource"].contains(k))
            .collect();
        assert_eq!(keywords, vec!["gameobject", "transform", "camera", "audiosource"]);
    }

    #[test]
    fn test_field_before_component_stops_and_keeps_earlier_objects() {
        let mut world = world();
        let text = "gameobject first\ntransform\nposition 1 1 1\ngameobject second\nposition 1 2 3\ngameobject third\n";

        let report = deserialize_scene(&mut world, text);

        assert_eq!(report.game_objects.len(), 2);
        assert_eq!(
            report.error,
            Some(SceneParseError::MissingComponent { line: 5, keyword: "position".into(), component: "transform" })
        );
        assert_eq!(world.game_object_count(), 2);
    }

    #[test]
    fn test_component_before_gameobject() {
        let mut world = world();
        let report = deserialize_scene(&mut world, "camera\n");
        assert!(matches!(report.error, Some(SceneParseError::NoGameObject { line: 1, .. })));
        assert!(report.game_objects.is_empty());
    }

    #[test]
    fn test_malformed_numbers() {
        let mut world = world();
        let report = deserialize_scene(&mut world, "gameobject a\ntransform\nposition 1 x 3\n");
        assert!(matches!(report.error, Some(SceneParseError::InvalidField { line: 3, expected: "3 numbers", .. })));

        let report = deserialize_scene(&mut world, "gameobject b\ncamera\nclearcolor 1 1 1 1\n");
        assert!(matches!(report.error, Some(SceneParseError::InvalidField { line: 3, .. })));
    }

    #[test]
    fn test_unknown_keywords_and_blank_lines_are_ignored() {
        let mut world = world();
        let report = deserialize_scene(&mut world, "\n# comment\ngameobject a\nmeshrenderer cube.obj\n\ntransform\n");
        assert!(report.error.is_none());
        assert_eq!(report.game_objects.len(), 1);
        assert!(world.has_component::<TransformComponent>(report.game_objects[0]));
    }

    #[test]
    fn test_pool_exhaustion_surfaces_as_scene_error() {
        let mut world = World::new(&PoolConfig::default().with_cameras(1));
        let report = deserialize_scene(&mut world, "gameobject a\ncamera\ngameobject b\ncamera\n");
        assert_eq!(report.game_objects.len(), 2);
        assert!(matches!(
            report.error,
            Some(SceneParseError::Scene { line: 4, source: SceneError::PoolExhausted { pool: "camera", .. } })
        ));
    }

    #[test]
    fn test_text_keeps_leading_spaces() {
        let mut world = world();
        let ids = deserialize_scene(&mut world, "gameobject a\ntextrenderer\ntext   indented\\\\path\n")
            .into_result()
            .unwrap();
        assert_eq!(world.component::<TextRendererComponent>(ids[0]).unwrap().text(), "  indented\\path");
    }
}
