//! # Renderer
//!
//! Owns the [`GfxDevice`] together with the state every scene pass shares:
//! the built-in shader programs, the skybox cube and the light tiler.
//! Scenes and renderable components receive `&mut Renderer` and draw through
//! it; nothing is global.

use crate::foundation::math::{to_column_major, Mat4};
use crate::render::api::{BlendMode, ComputeShaderId, ComputeShaderSource, DepthFunc, ShaderId, ShaderSource, TextureId};
use crate::render::buffer::VertexBuffer;
use crate::render::device::{FrameStatistics, GfxDevice};
use crate::render::lighting::LightTiler;
use crate::render::vertex::{Face, VertexPTC};
use crate::render::{RenderError, RenderResult};
use std::path::Path;

/// Programs the renderer needs, supplied by the host
#[derive(Debug, Clone)]
pub struct BuiltinShaderSources {
    /// Textured, tinted quads
    pub sprite: ShaderSource,
    /// Glyph quads sampling a font atlas
    pub text: ShaderSource,
    /// Cube map background
    pub skybox: ShaderSource,
    /// Forward+ lit meshes
    pub mesh: ShaderSource,
    /// Tile light culling
    pub light_culling: ComputeShaderSource,
}

impl BuiltinShaderSources {
    /// Sources without SPIR-V, for the immediate backend
    pub fn headless() -> Self {
        Self {
            sprite: ShaderSource::named("sprite"),
            text: ShaderSource::named("text"),
            skybox: ShaderSource::named("skybox"),
            mesh: ShaderSource::named("mesh"),
            light_culling: ComputeShaderSource {
                name: "light_culling".into(),
                spirv: Vec::new(),
            },
        }
    }

    /// Load compiled programs from `dir`, e.g. `target/shaders`.
    ///
    /// Expects `<name>.vert.spv` and `<name>.frag.spv` for sprite, text,
    /// skybox and mesh, plus `light_culling.comp.spv`.
    pub fn load_spirv(dir: impl AsRef<Path>) -> RenderResult<Self> {
        let dir = dir.as_ref();
        let graphics = |name: &str| -> RenderResult<ShaderSource> {
            Ok(ShaderSource {
                name: name.to_string(),
                vertex_spirv: read_spirv(&dir.join(format!("{}.vert.spv", name)))?,
                fragment_spirv: read_spirv(&dir.join(format!("{}.frag.spv", name)))?,
            })
        };
        Ok(Self {
            sprite: graphics("sprite")?,
            text: graphics("text")?,
            skybox: graphics("skybox")?,
            mesh: graphics("mesh")?,
            light_culling: ComputeShaderSource {
                name: "light_culling".into(),
                spirv: read_spirv(&dir.join("light_culling.comp.spv"))?,
            },
        })
    }
}

fn read_spirv(path: &Path) -> RenderResult<Vec<u32>> {
    let bytes = std::fs::read(path)
        .map_err(|e| RenderError::ResourceCreationFailed(format!("Failed to read {}: {}", path.display(), e)))?;
    ash::util::read_spv(&mut std::io::Cursor::new(bytes))
        .map_err(|e| RenderError::ResourceCreationFailed(format!("Invalid SPIR-V in {}: {}", path.display(), e)))
}

/// Device handles of the built-in programs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuiltinShaders {
    /// Sprite program
    pub sprite: ShaderId,
    /// Text program
    pub text: ShaderId,
    /// Skybox program
    pub skybox: ShaderId,
    /// Lit mesh program
    pub mesh: ShaderId,
    /// Light culling program
    pub light_culling: ComputeShaderId,
}

/// Rendering context shared by every scene pass
pub struct Renderer {
    device: GfxDevice,
    shaders: BuiltinShaders,
    skybox: VertexBuffer,
    lights: LightTiler,
}

impl Renderer {
    /// Create the built-in programs on `device`
    pub fn new(mut device: GfxDevice, sources: &BuiltinShaderSources) -> RenderResult<Self> {
        let shaders = BuiltinShaders {
            sprite: device.create_shader(&sources.sprite)?,
            text: device.create_shader(&sources.text)?,
            skybox: device.create_shader(&sources.skybox)?,
            mesh: device.create_shader(&sources.mesh)?,
            light_culling: device.create_compute_shader(&sources.light_culling)?,
        };
        log::info!("Renderer ready");

        Ok(Self {
            device,
            shaders,
            skybox: VertexBuffer::new(),
            lights: LightTiler::new(),
        })
    }

    /// The graphics device
    pub fn device(&self) -> &GfxDevice {
        &self.device
    }

    /// The graphics device, mutably
    pub fn device_mut(&mut self) -> &mut GfxDevice {
        &mut self.device
    }

    /// Built-in program handles
    pub fn shaders(&self) -> &BuiltinShaders {
        &self.shaders
    }

    /// Statistics of the current pass
    pub fn statistics(&self) -> FrameStatistics {
        self.device.statistics()
    }

    /// Light arrays
    pub fn lights(&self) -> &LightTiler {
        &self.lights
    }

    /// Light arrays, mutably
    pub fn lights_mut(&mut self) -> &mut LightTiler {
        &mut self.lights
    }

    /// Whether the skybox cube exists
    pub fn is_skybox_generated(&self) -> bool {
        self.skybox.format().is_some()
    }

    /// Build the skybox cube. Does nothing if it already exists.
    pub fn generate_skybox(&mut self) -> RenderResult<()> {
        if self.is_skybox_generated() {
            return Ok(());
        }

        let mut vertices = [VertexPTC::default(); 8];
        for (i, vertex) in vertices.iter_mut().enumerate() {
            let x = if i & 1 == 0 { -1.0 } else { 1.0 };
            let y = if i & 2 == 0 { -1.0 } else { 1.0 };
            let z = if i & 4 == 0 { -1.0 } else { 1.0 };
            vertex.position = [x, y, z];
            vertex.color = [1.0; 4];
        }

        // Wound to face inwards.
        let faces = [
            Face::new(0, 2, 1), Face::new(1, 2, 3), // -Z
            Face::new(4, 5, 6), Face::new(5, 7, 6), // +Z
            Face::new(0, 4, 2), Face::new(2, 4, 6), // -X
            Face::new(1, 3, 5), Face::new(3, 7, 5), // +X
            Face::new(0, 1, 4), Face::new(1, 5, 4), // -Y
            Face::new(2, 6, 3), Face::new(3, 6, 7), // +Y
        ];

        self.skybox.generate(&mut self.device, &faces, &vertices)?;
        log::debug!("Generated skybox cube");
        Ok(())
    }

    /// Draw the skybox cube with `projection * view_rotation`.
    ///
    /// `view_rotation` must carry no translation so the cube stays centered
    /// on the camera.
    pub fn render_skybox(&mut self, cube_map: TextureId, projection: &Mat4, view_rotation: &Mat4) -> RenderResult<()> {
        self.generate_skybox()?;

        let projection_model = to_column_major(&(projection * view_rotation));
        self.device.set_pipeline(self.shaders.skybox, BlendMode::Off, DepthFunc::NoneWriteOff);
        self.device.set_projection_model(&projection_model);
        self.device.set_texture(cube_map)?;
        self.skybox.bind(&mut self.device)?;
        self.skybox.draw(&mut self.device)
    }

    /// Cull active lights against the tiles of the current render target.
    /// Skipped when no light is active.
    ///
    /// `depth_normal_target` narrows each tile to the depth range of the
    /// geometry it covers.
    pub fn cull_lights(
        &mut self,
        projection: &Mat4,
        view: &Mat4,
        depth_normal_target: Option<TextureId>,
    ) -> RenderResult<()> {
        if self.lights.point_light_count() + self.lights.spot_light_count() == 0 {
            return Ok(());
        }
        self.lights.cull_lights(
            &mut self.device,
            self.shaders.light_culling,
            projection,
            view,
            depth_normal_target,
        )
    }

    /// Submit and present the frame
    pub fn present(&mut self) -> RenderResult<()> {
        self.device.present()
    }

    /// Destroy the skybox and every device object. Safe to call more than once.
    pub fn release_gpu_objects(&mut self) {
        self.skybox.release(&mut self.device);
        self.device.release_gpu_objects();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::backends::immediate::ImmediateBackend;

    fn renderer() -> Renderer {
        let device = GfxDevice::new(Box::new(ImmediateBackend::new(32, 32)));
        Renderer::new(device, &BuiltinShaderSources::headless()).unwrap()
    }

    fn immediate(renderer: &Renderer) -> &ImmediateBackend {
        renderer.device().backend().as_any().downcast_ref::<ImmediateBackend>().unwrap()
    }

    fn write_words(path: &Path, words: &[u32]) {
        let bytes: Vec<u8> = words.iter().flat_map(|w| w.to_le_bytes()).collect();
        std::fs::write(path, bytes).unwrap();
    }

    #[test]
    fn test_load_spirv_reads_every_stage() {
        let dir = std::env::temp_dir().join(format!("aether_spirv_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let words = [0x0723_0203, 0x0001_0000, 0, 8, 0];
        for name in ["sprite", "text", "skybox", "mesh"] {
            write_words(&dir.join(format!("{}.vert.spv", name)), &words);
            write_words(&dir.join(format!("{}.frag.spv", name)), &words);
        }
        write_words(&dir.join("light_culling.comp.spv"), &words);

        let sources = BuiltinShaderSources::load_spirv(&dir).unwrap();
        assert_eq!(sources.mesh.vertex_spirv, words);
        assert_eq!(sources.light_culling.spirv, words);
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_load_spirv_missing_file_fails() {
        let dir = std::env::temp_dir().join("aether_spirv_missing");
        let result = BuiltinShaderSources::load_spirv(&dir);
        assert!(matches!(result, Err(RenderError::ResourceCreationFailed(_))));
    }

    #[test]
    fn test_builtin_shaders_created() {
        let renderer = renderer();
        let backend = immediate(&renderer);
        assert_eq!(backend.shader_name(renderer.shaders().sprite), Some("sprite"));
        assert_eq!(backend.shader_name(renderer.shaders().skybox), Some("skybox"));
    }

    #[test]
    fn test_skybox_generated_once() {
        let mut renderer = renderer();
        assert!(!renderer.is_skybox_generated());

        renderer.generate_skybox().unwrap();
        renderer.generate_skybox().unwrap();

        assert!(renderer.is_skybox_generated());
        assert_eq!(immediate(&renderer).geometry_count(), 1);
    }

    #[test]
    fn test_skybox_draw_binds_cube_map() {
        let mut renderer = renderer();
        let face: &[u8] = &[0u8; 4];
        let cube = renderer.device_mut().create_texture_cube(1, [face; 6]).unwrap();

        renderer.device_mut().begin_render_pass_and_command_buffer().unwrap();
        renderer.render_skybox(cube, &Mat4::identity(), &Mat4::identity()).unwrap();
        renderer.device_mut().end_render_pass_and_command_buffer().unwrap();

        let frame = immediate(&renderer).current_frame();
        let draws: Vec<_> = frame[0].draws().collect();
        assert_eq!(draws.len(), 1);
        assert_eq!(draws[0].texture, Some(cube));
        assert_eq!(draws[0].index_count, 36);
        assert_eq!(draws[0].depth, DepthFunc::NoneWriteOff);
    }

    #[test]
    fn test_cull_skipped_without_lights() {
        let mut renderer = renderer();
        renderer.cull_lights(&Mat4::identity(), &Mat4::identity(), None).unwrap();
        assert!(immediate(&renderer).tile_lights().is_none());
    }
}
