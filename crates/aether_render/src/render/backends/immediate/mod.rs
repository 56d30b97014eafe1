//! Headless immediate-mode backend
//!
//! Every call executes at once against CPU-side state: geometry and textures
//! are kept in host memory, binding is implicit in each draw, and draws are
//! appended to a per-frame log instead of being rasterized. Light culling
//! runs the CPU tile culler. The log makes this backend the reference for
//! tests and for tooling that needs the draw stream without a GPU.

use std::any::Any;
use std::collections::HashMap;

use crate::core::config::BackendKind;
use crate::render::api::{
    BackendResult, BlendMode, BufferId, ClearFlags, ComputeShaderId, ComputeShaderSource, DepthFunc,
    DrawCommand, GeometryUpload, GraphicsBackend, LightBuffers, LightCullDispatch, PassDescriptor,
    ShaderId, ShaderSource, TextureDesc, TextureId, TextureKind,
};
use crate::render::lighting::culling::{cull_tiles, CullParams, TileLightLists};
use crate::render::vertex::VertexFormat;

/// A draw as executed by the immediate backend
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RecordedDraw {
    /// Source geometry
    pub buffer: BufferId,
    /// First index read
    pub first_index: u32,
    /// Indices read
    pub index_count: u32,
    /// Shader used
    pub shader: ShaderId,
    /// Blend state
    pub blend: BlendMode,
    /// Depth state
    pub depth: DepthFunc,
    /// Texture bound when the draw executed
    pub texture: Option<TextureId>,
    /// Column-major projection * model
    pub projection_model: [f32; 16],
}

/// One entry of a pass log
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RecordedCommand {
    /// Attachment clear
    Clear {
        /// Cleared attachments
        flags: ClearFlags,
        /// Clear color
        color: [f32; 4],
    },
    /// Indexed draw
    Draw(RecordedDraw),
}

/// Everything executed between one begin/end pair
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedPass {
    /// Render texture, or `None` for the swapchain
    pub target: Option<TextureId>,
    /// Clear color at pass begin
    pub clear_color: [f32; 4],
    /// Commands in execution order
    pub commands: Vec<RecordedCommand>,
}

impl RecordedPass {
    /// Draws of this pass in order
    pub fn draws(&self) -> impl Iterator<Item = &RecordedDraw> {
        self.commands.iter().filter_map(|command| match command {
            RecordedCommand::Draw(draw) => Some(draw),
            RecordedCommand::Clear { .. } => None,
        })
    }
}

#[derive(Debug)]
struct StoredGeometry {
    format: VertexFormat,
    vertex_bytes: Vec<u8>,
    indices: Vec<u16>,
}

#[derive(Debug, Clone, Copy)]
struct StoredTexture {
    kind: TextureKind,
    width: u32,
    height: u32,
}

#[derive(Debug, Default)]
struct LightStore {
    point_center_and_radius: Vec<[f32; 4]>,
    point_colors: Vec<[f32; 4]>,
    spot_center_and_radius: Vec<[f32; 4]>,
    spot_params: Vec<[f32; 4]>,
    spot_colors: Vec<[f32; 4]>,
}

impl LightStore {
    fn as_buffers(&self) -> LightBuffers<'_> {
        LightBuffers {
            point_center_and_radius: &self.point_center_and_radius,
            point_colors: &self.point_colors,
            spot_center_and_radius: &self.spot_center_and_radius,
            spot_params: &self.spot_params,
            spot_colors: &self.spot_colors,
        }
    }
}

/// Headless backend that executes calls immediately on the CPU
pub struct ImmediateBackend {
    width: u32,
    height: u32,
    next_id: u64,
    geometry: HashMap<BufferId, StoredGeometry>,
    textures: HashMap<TextureId, StoredTexture>,
    shaders: HashMap<ShaderId, String>,
    compute_shaders: HashMap<ComputeShaderId, String>,
    bound_texture: Option<TextureId>,
    open_pass: Option<RecordedPass>,
    frame: Vec<RecordedPass>,
    last_frame: Vec<RecordedPass>,
    frames_presented: u64,
    lights: LightStore,
    tile_lights: Option<TileLightLists>,
    cull_depth_target: Option<TextureId>,
}

impl ImmediateBackend {
    /// Create a backend with a virtual swapchain of the given size
    pub fn new(width: u32, height: u32) -> Self {
        log::debug!("Immediate backend created ({}x{})", width, height);
        Self {
            width,
            height,
            next_id: 1,
            geometry: HashMap::new(),
            textures: HashMap::new(),
            shaders: HashMap::new(),
            compute_shaders: HashMap::new(),
            bound_texture: None,
            open_pass: None,
            frame: Vec::new(),
            last_frame: Vec::new(),
            frames_presented: 0,
            lights: LightStore::default(),
            tile_lights: None,
            cull_depth_target: None,
        }
    }

    fn allocate_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Passes finished since the last present
    pub fn current_frame(&self) -> &[RecordedPass] {
        &self.frame
    }

    /// Passes of the most recently presented frame
    pub fn last_frame(&self) -> &[RecordedPass] {
        &self.last_frame
    }

    /// Number of presents
    pub fn frames_presented(&self) -> u64 {
        self.frames_presented
    }

    /// Live geometry buffers
    pub fn geometry_count(&self) -> usize {
        self.geometry.len()
    }

    /// Index data of a live buffer
    pub fn geometry_indices(&self, buffer: BufferId) -> Option<&[u16]> {
        self.geometry.get(&buffer).map(|g| g.indices.as_slice())
    }

    /// Vertex bytes of a live buffer
    pub fn geometry_vertices(&self, buffer: BufferId) -> Option<&[u8]> {
        self.geometry.get(&buffer).map(|g| g.vertex_bytes.as_slice())
    }

    /// Live textures, including render textures
    pub fn texture_count(&self) -> usize {
        self.textures.len()
    }

    /// Name a shader was created with
    pub fn shader_name(&self, shader: ShaderId) -> Option<&str> {
        self.shaders.get(&shader).map(String::as_str)
    }

    /// Tile lists produced by the last culling dispatch
    pub fn tile_lights(&self) -> Option<&TileLightLists> {
        self.tile_lights.as_ref()
    }

    /// Depth/normal target passed to the last culling dispatch
    pub fn cull_depth_target(&self) -> Option<TextureId> {
        self.cull_depth_target
    }

    fn record(&mut self, command: RecordedCommand) {
        match self.open_pass.as_mut() {
            Some(pass) => pass.commands.push(command),
            None => panic!("command recorded outside a render pass"),
        }
    }
}

impl GraphicsBackend for ImmediateBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Immediate
    }

    fn surface_extent(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn texture_extent(&self, texture: TextureId) -> Option<(u32, u32)> {
        self.textures.get(&texture).map(|t| (t.width, t.height))
    }

    fn resize(&mut self, width: u32, height: u32) -> BackendResult<()> {
        self.width = width;
        self.height = height;
        Ok(())
    }

    fn create_geometry(&mut self, upload: &GeometryUpload<'_>) -> BackendResult<BufferId> {
        debug_assert_eq!(upload.vertex_bytes.len(), upload.vertex_count as usize * upload.format.stride());
        let id = BufferId(self.allocate_id());
        self.geometry.insert(
            id,
            StoredGeometry {
                format: upload.format,
                vertex_bytes: upload.vertex_bytes.to_vec(),
                indices: upload.indices.to_vec(),
            },
        );
        Ok(id)
    }

    fn destroy_geometry(&mut self, buffer: BufferId) {
        if self.geometry.remove(&buffer).is_none() {
            log::trace!("destroy of unknown {:?} ignored", buffer);
        }
    }

    fn create_texture(&mut self, desc: &TextureDesc, pixels: &[u8]) -> BackendResult<TextureId> {
        debug_assert_eq!(pixels.len(), desc.byte_len());
        let id = TextureId(self.allocate_id());
        self.textures.insert(id, StoredTexture { kind: desc.kind, width: desc.width, height: desc.height });
        Ok(id)
    }

    fn create_render_texture(&mut self, width: u32, height: u32) -> BackendResult<TextureId> {
        let id = TextureId(self.allocate_id());
        self.textures.insert(id, StoredTexture { kind: TextureKind::RenderTarget, width, height });
        Ok(id)
    }

    fn destroy_texture(&mut self, texture: TextureId) {
        self.textures.remove(&texture);
        if self.bound_texture == Some(texture) {
            self.bound_texture = None;
        }
    }

    fn create_shader(&mut self, source: &ShaderSource) -> BackendResult<ShaderId> {
        let id = ShaderId(self.allocate_id());
        self.shaders.insert(id, source.name.clone());
        Ok(id)
    }

    fn create_compute_shader(&mut self, source: &ComputeShaderSource) -> BackendResult<ComputeShaderId> {
        let id = ComputeShaderId(self.allocate_id());
        self.compute_shaders.insert(id, source.name.clone());
        Ok(id)
    }

    fn begin_pass(&mut self, pass: &PassDescriptor) -> BackendResult<()> {
        if let Some(target) = pass.target {
            let kind = self.textures.get(&target).map(|t| t.kind);
            assert_eq!(kind, Some(TextureKind::RenderTarget), "{target:?} is not a render texture");
        }
        self.bound_texture = None;
        self.open_pass = Some(RecordedPass {
            target: pass.target,
            clear_color: pass.clear_color,
            commands: Vec::new(),
        });
        Ok(())
    }

    fn clear(&mut self, flags: ClearFlags, color: [f32; 4]) -> BackendResult<()> {
        self.record(RecordedCommand::Clear { flags, color });
        Ok(())
    }

    fn bind_geometry(&mut self, buffer: BufferId) -> BackendResult<()> {
        // Binding is implicit in each draw here.
        debug_assert!(self.geometry.contains_key(&buffer), "{buffer:?} is not live");
        Ok(())
    }

    fn bind_texture(&mut self, texture: TextureId) -> BackendResult<()> {
        assert!(self.textures.contains_key(&texture), "{texture:?} is not live");
        self.bound_texture = Some(texture);
        Ok(())
    }

    fn draw_indexed(&mut self, draw: &DrawCommand) -> BackendResult<()> {
        let geometry = match self.geometry.get(&draw.buffer) {
            Some(geometry) => geometry,
            None => panic!("draw from unknown {:?}", draw.buffer),
        };
        assert_eq!(geometry.format, draw.format, "draw format does not match uploaded geometry");
        assert!(
            (draw.first_index + draw.index_count) as usize <= geometry.indices.len(),
            "index range {}..{} past {} indices",
            draw.first_index,
            draw.first_index + draw.index_count,
            geometry.indices.len()
        );
        assert!(self.shaders.contains_key(&draw.pipeline.shader), "unknown {:?}", draw.pipeline.shader);

        let recorded = RecordedDraw {
            buffer: draw.buffer,
            first_index: draw.first_index,
            index_count: draw.index_count,
            shader: draw.pipeline.shader,
            blend: draw.pipeline.blend,
            depth: draw.pipeline.depth,
            texture: self.bound_texture,
            projection_model: draw.uniforms.projection_model,
        };
        self.record(RecordedCommand::Draw(recorded));
        Ok(())
    }

    fn end_pass(&mut self) -> BackendResult<()> {
        if let Some(pass) = self.open_pass.take() {
            self.frame.push(pass);
        }
        Ok(())
    }

    fn upload_lights(&mut self, lights: &LightBuffers<'_>) -> BackendResult<()> {
        self.lights = LightStore {
            point_center_and_radius: lights.point_center_and_radius.to_vec(),
            point_colors: lights.point_colors.to_vec(),
            spot_center_and_radius: lights.spot_center_and_radius.to_vec(),
            spot_params: lights.spot_params.to_vec(),
            spot_colors: lights.spot_colors.to_vec(),
        };
        Ok(())
    }

    fn cull_lights(&mut self, dispatch: &LightCullDispatch) -> BackendResult<()> {
        assert!(self.compute_shaders.contains_key(&dispatch.shader), "unknown {:?}", dispatch.shader);
        if let Some(target) = dispatch.depth_normal_target {
            assert!(self.textures.contains_key(&target), "unknown depth target {:?}", target);
        }
        // Render textures carry no pixels here, so tiles keep the full depth range.
        self.cull_depth_target = dispatch.depth_normal_target;
        let params = CullParams {
            projection: dispatch.projection,
            view: dispatch.view,
            width: dispatch.width,
            height: dispatch.height,
            depth_bounds: None,
        };
        self.tile_lights = Some(cull_tiles(&self.lights.as_buffers(), &params));
        Ok(())
    }

    fn present(&mut self) -> BackendResult<()> {
        self.last_frame = std::mem::take(&mut self.frame);
        self.frames_presented += 1;
        Ok(())
    }

    fn wait_idle(&mut self) -> BackendResult<()> {
        Ok(())
    }

    fn release_gpu_objects(&mut self) {
        self.geometry.clear();
        self.textures.clear();
        self.shaders.clear();
        self.compute_shaders.clear();
        self.tile_lights = None;
        self.open_pass = None;
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
