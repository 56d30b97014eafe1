//! Vulkan backend
//!
//! Explicit command-buffer backend built on `ash`. One primary command buffer
//! records a whole frame: light culling dispatches, every render pass, and
//! the final blit of the scene color image into the acquired swapchain image.
//! `present` submits it and waits for completion, so at most one frame is in
//! flight and resources retired mid-frame can be destroyed right after.
//!
//! ## Modules
//!
//! - [`context`]: instance, surface, GPU selection, logical device, errors
//! - [`swapchain`]: swapchain creation and recreation
//! - [`render_pass`]: scene and render-texture passes, framebuffers
//! - [`texture`]: images, samplers, uploads, render textures
//! - [`buffer`]: host-visible geometry and light storage
//! - [`descriptors`]: set layouts and allocation
//! - [`pipeline`]: shader modules and the pipeline cache
//! - [`light_culling`]: light storage and the tile culling dispatch
//! - [`commands`] / [`sync`]: command pool, barriers, fences, semaphores

pub mod buffer;
pub mod commands;
pub mod context;
pub mod descriptors;
pub mod light_culling;
pub mod pipeline;
pub mod render_pass;
pub mod swapchain;
pub mod sync;
pub mod texture;

use std::any::Any;
use std::collections::HashMap;

use ash::{vk, Device};
use raw_window_handle::{HasRawDisplayHandle, HasRawWindowHandle};

use crate::core::config::{BackendKind, RendererConfig};
use crate::render::api::{
    BackendResult, BufferId, ClearFlags, ComputeShaderId, ComputeShaderSource, DrawCommand, GeometryUpload,
    GraphicsBackend, LightBuffers, LightCullDispatch, PassDescriptor, ShaderId, ShaderSource, TextureDesc,
    TextureId, TextureKind,
};
use crate::render::RenderError;

use self::buffer::GeometryBuffer;
use self::commands::{transition_image, CommandPool, LayoutTransition};
use self::context::{frame_error, PhysicalDeviceInfo, VulkanContext, VulkanResult};
use self::descriptors::Descriptors;
use self::light_culling::LightCulling;
use self::pipeline::{ComputeProgram, PipelineCache, PipelineKey, ShaderProgram};
use self::render_pass::{has_stencil, RenderPass, TargetKind, DEPTH_FORMAT_CANDIDATES};
use self::swapchain::{Swapchain, SwapchainSettings};
use self::sync::FrameSync;
use self::texture::{Image, ImageDesc, Sampler, TargetAttachments, Texture, TextureContext};

pub use self::context::VulkanError;

/// Offscreen color target every swapchain pass renders into
struct SceneTarget {
    attachments: TargetAttachments,
    color: Image,
}

impl SceneTarget {
    fn new(
        device: &Device,
        physical: &PhysicalDeviceInfo,
        commands: &CommandPool,
        queue: vk::Queue,
        render_pass: &RenderPass,
        extent: vk::Extent2D,
        depth_format: vk::Format,
    ) -> VulkanResult<Self> {
        let color = Image::new(device.clone(), physical, ImageDesc::color_target(extent))?;
        let attachments = TargetAttachments::new(device, physical, render_pass, &color, depth_format)?;
        commands.submit_and_wait(queue, |device, cmd| {
            transition_image(
                device,
                cmd,
                color.handle(),
                vk::ImageAspectFlags::COLOR,
                1,
                LayoutTransition {
                    old_layout: vk::ImageLayout::UNDEFINED,
                    new_layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
                    src_access: vk::AccessFlags::empty(),
                    dst_access: vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
                    src_stage: vk::PipelineStageFlags::TOP_OF_PIPE,
                    dst_stage: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
                },
            );
        })?;
        Ok(Self { attachments, color })
    }
}

/// A resource destroyed while its frame was still being recorded
enum Retired {
    Geometry(GeometryBuffer),
    Texture(Texture),
}

/// Every object created on the logical device. Fields drop in declaration
/// order, dependents first.
struct GpuResources {
    retired: Vec<Retired>,
    geometry: HashMap<BufferId, GeometryBuffer>,
    textures: HashMap<TextureId, Texture>,
    default_texture: Texture,
    shaders: HashMap<ShaderId, ShaderProgram>,
    compute_shaders: HashMap<ComputeShaderId, ComputeProgram>,
    pipelines: PipelineCache,
    lights: LightCulling,
    scene: SceneTarget,
    swapchain: Swapchain,
    scene_pass: RenderPass,
    texture_pass: RenderPass,
    descriptors: Descriptors,
    sampler: Sampler,
    sync: FrameSync,
    commands: CommandPool,
    depth_format: vk::Format,
    queue: vk::Queue,
    device: Device,
}

impl GpuResources {
    fn new(ctx: &VulkanContext, settings: SwapchainSettings) -> VulkanResult<Self> {
        let device = ctx.raw_device().clone();
        let queue = ctx.device.queue;
        let commands = CommandPool::new(device.clone(), ctx.physical.queue_family)?;
        let sync = FrameSync::new(&device)?;
        let sampler = Sampler::linear_clamp(device.clone())?;
        let descriptors = Descriptors::new(device.clone())?;

        let depth_format = ctx.find_depth_format(&DEPTH_FORMAT_CANDIDATES)?;
        log::debug!("Depth format {:?}", depth_format);
        let texture_pass = RenderPass::new(device.clone(), TargetKind::Texture, depth_format)?;
        let scene_pass = RenderPass::new(device.clone(), TargetKind::Scene, depth_format)?;

        let swapchain = Swapchain::new(ctx, settings, vk::SwapchainKHR::null())?;
        let extent = swapchain.extent();
        let scene = SceneTarget::new(&device, &ctx.physical, &commands, queue, &scene_pass, extent, depth_format)?;
        let lights = LightCulling::new(device.clone(), &ctx.physical, &descriptors, extent.width, extent.height)?;
        let pipelines = PipelineCache::new(device.clone(), &descriptors)?;

        let white = TextureDesc { width: 1, height: 1, kind: TextureKind::Texture2D };
        let default_texture = Texture::upload(
            &TextureContext {
                device: &device,
                physical: &ctx.physical,
                commands: &commands,
                queue,
                descriptors: &descriptors,
                sampler: &sampler,
            },
            &white,
            &[255; 4],
        )?;

        Ok(Self {
            retired: Vec::new(),
            geometry: HashMap::new(),
            textures: HashMap::new(),
            default_texture,
            shaders: HashMap::new(),
            compute_shaders: HashMap::new(),
            pipelines,
            lights,
            scene,
            swapchain,
            scene_pass,
            texture_pass,
            descriptors,
            sampler,
            sync,
            commands,
            depth_format,
            queue,
            device,
        })
    }

    fn texture_context<'a>(&'a self, physical: &'a PhysicalDeviceInfo) -> TextureContext<'a> {
        TextureContext {
            device: &self.device,
            physical,
            commands: &self.commands,
            queue: self.queue,
            descriptors: &self.descriptors,
            sampler: &self.sampler,
        }
    }

    /// Texture set of `texture`, or of the white fallback
    fn texture_set(&self, texture: Option<TextureId>) -> vk::DescriptorSet {
        texture
            .and_then(|id| self.textures.get(&id))
            .unwrap_or(&self.default_texture)
            .descriptor_set()
    }

    fn record_blit(&self, cmd: vk::CommandBuffer, image_index: u32) {
        let device = &self.device;
        let scene = self.scene.color.handle();
        let target = self.swapchain.image(image_index);
        let src_extent = self.scene.color.extent();
        let dst_extent = self.swapchain.extent();

        transition_image(
            device,
            cmd,
            scene,
            vk::ImageAspectFlags::COLOR,
            1,
            LayoutTransition {
                old_layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
                new_layout: vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                src_access: vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
                dst_access: vk::AccessFlags::TRANSFER_READ,
                src_stage: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
                dst_stage: vk::PipelineStageFlags::TRANSFER,
            },
        );
        transition_image(
            device,
            cmd,
            target,
            vk::ImageAspectFlags::COLOR,
            1,
            LayoutTransition {
                old_layout: vk::ImageLayout::UNDEFINED,
                new_layout: vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                src_access: vk::AccessFlags::empty(),
                dst_access: vk::AccessFlags::TRANSFER_WRITE,
                src_stage: vk::PipelineStageFlags::TRANSFER,
                dst_stage: vk::PipelineStageFlags::TRANSFER,
            },
        );

        let layers = vk::ImageSubresourceLayers {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            mip_level: 0,
            base_array_layer: 0,
            layer_count: 1,
        };
        let blit = vk::ImageBlit {
            src_subresource: layers,
            src_offsets: [
                vk::Offset3D::default(),
                vk::Offset3D { x: src_extent.width as i32, y: src_extent.height as i32, z: 1 },
            ],
            dst_subresource: layers,
            dst_offsets: [
                vk::Offset3D::default(),
                vk::Offset3D { x: dst_extent.width as i32, y: dst_extent.height as i32, z: 1 },
            ],
        };
        unsafe {
            device.cmd_blit_image(
                cmd,
                scene,
                vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                target,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                &[blit],
                vk::Filter::LINEAR,
            );
        }

        transition_image(
            device,
            cmd,
            target,
            vk::ImageAspectFlags::COLOR,
            1,
            LayoutTransition {
                old_layout: vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                new_layout: vk::ImageLayout::PRESENT_SRC_KHR,
                src_access: vk::AccessFlags::TRANSFER_WRITE,
                dst_access: vk::AccessFlags::empty(),
                src_stage: vk::PipelineStageFlags::TRANSFER,
                dst_stage: vk::PipelineStageFlags::BOTTOM_OF_PIPE,
            },
        );
        // Ready for the next frame's clear.
        transition_image(
            device,
            cmd,
            scene,
            vk::ImageAspectFlags::COLOR,
            1,
            LayoutTransition {
                old_layout: vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                new_layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
                src_access: vk::AccessFlags::TRANSFER_READ,
                dst_access: vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
                src_stage: vk::PipelineStageFlags::TRANSFER,
                dst_stage: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
            },
        );
    }

    fn submit(&self, cmd: vk::CommandBuffer) -> VulkanResult<()> {
        let waits = [self.sync.image_available.handle()];
        let stages = [vk::PipelineStageFlags::TRANSFER];
        let buffers = [cmd];
        let signals = [self.sync.render_finished.handle()];
        let submit = [vk::SubmitInfo::builder()
            .wait_semaphores(&waits)
            .wait_dst_stage_mask(&stages)
            .command_buffers(&buffers)
            .signal_semaphores(&signals)
            .build()];
        unsafe {
            self.device.end_command_buffer(cmd).map_err(VulkanError::Api)?;
            self.device
                .queue_submit(self.queue, &submit, self.sync.frame_done.handle())
                .map_err(VulkanError::Api)
        }
    }
}

/// The render pass currently open in the frame command buffer
#[derive(Debug, Clone, Copy)]
struct OpenPass {
    target: TargetKind,
    extent: vk::Extent2D,
    pipeline: Option<vk::Pipeline>,
}

/// The frame being recorded
#[derive(Debug, Clone, Copy)]
struct Recording {
    cmd: vk::CommandBuffer,
    pass: Option<OpenPass>,
}

/// Vulkan implementation of [`GraphicsBackend`]
pub struct VulkanBackend {
    recording: Option<Recording>,
    gpu: Option<GpuResources>,
    context: Option<VulkanContext>,
    settings: SwapchainSettings,
    present_timeout_ns: u64,
    bound_geometry: Option<BufferId>,
    bound_texture: Option<TextureId>,
    next_id: u64,
}

impl VulkanBackend {
    /// Create the instance, surface, device, swapchain and every fixed
    /// resource for `window`.
    pub fn new<W>(config: &RendererConfig, window: &W) -> Result<Self, RenderError>
    where
        W: HasRawWindowHandle + HasRawDisplayHandle + ?Sized,
    {
        config.validate().map_err(RenderError::InitializationFailed)?;
        log::info!(
            "Initializing Vulkan backend for '{}' ({}x{}, validation {})",
            config.application_name,
            config.width,
            config.height,
            config.validation_enabled()
        );

        let context = VulkanContext::new(&config.application_name, window, config.validation_enabled())?;
        let settings = SwapchainSettings {
            requested: vk::Extent2D { width: config.width, height: config.height },
            prefer_mailbox: config.prefer_mailbox,
        };
        let gpu = GpuResources::new(&context, settings)
            .map_err(|e| RenderError::InitializationFailed(e.to_string()))?;

        Ok(Self {
            recording: None,
            gpu: Some(gpu),
            context: Some(context),
            settings,
            present_timeout_ns: config.present_timeout_ns(),
            bound_geometry: None,
            bound_texture: None,
            next_id: 1,
        })
    }

    /// Number of graphics pipelines created so far
    pub fn pipeline_count(&self) -> usize {
        self.gpu.as_ref().map_or(0, |gpu| gpu.pipelines.len())
    }

    /// Depth format chosen at startup
    pub fn depth_format(&self) -> Option<vk::Format> {
        self.gpu.as_ref().map(|gpu| gpu.depth_format)
    }

    fn next_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn parts(&mut self) -> (&mut GpuResources, &VulkanContext) {
        match (self.gpu.as_mut(), self.context.as_ref()) {
            (Some(gpu), Some(context)) => (gpu, context),
            _ => panic!("Vulkan backend used after release_gpu_objects"),
        }
    }

    fn gpu(&self) -> &GpuResources {
        match self.gpu.as_ref() {
            Some(gpu) => gpu,
            None => panic!("Vulkan backend used after release_gpu_objects"),
        }
    }

    /// The frame command buffer, begun on first use
    fn ensure_recording(&mut self) -> BackendResult<vk::CommandBuffer> {
        if let Some(recording) = self.recording {
            return Ok(recording.cmd);
        }
        let (gpu, _) = self.parts();
        let cmd = gpu.commands.begin_frame().map_err(|e| frame_error("Begin command buffer", e))?;
        self.recording = Some(Recording { cmd, pass: None });
        self.bound_geometry = None;
        Ok(cmd)
    }

    fn open_pass(&mut self) -> (vk::CommandBuffer, &mut OpenPass) {
        match self.recording.as_mut() {
            Some(Recording { cmd, pass: Some(pass) }) => (*cmd, pass),
            _ => panic!("no render pass is open"),
        }
    }

    /// Drop the frame being recorded without submitting it
    fn abandon_frame(&mut self) {
        let Some(recording) = self.recording.take() else {
            return;
        };
        if let Some(gpu) = self.gpu.as_mut() {
            unsafe {
                if recording.pass.is_some() {
                    gpu.device.cmd_end_render_pass(recording.cmd);
                }
                let _ = gpu.device.end_command_buffer(recording.cmd);
            }
            gpu.retired.clear();
        }
        self.bound_geometry = None;
        log::debug!("Abandoned the frame being recorded");
    }

    fn retire(&mut self, resource: Retired) {
        let recording = self.recording.is_some();
        if let Some(gpu) = self.gpu.as_mut() {
            if recording {
                gpu.retired.push(resource);
            }
        }
    }
}

impl GraphicsBackend for VulkanBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Vulkan
    }

    fn surface_extent(&self) -> (u32, u32) {
        self.gpu.as_ref().map_or((0, 0), |gpu| {
            let extent = gpu.swapchain.extent();
            (extent.width, extent.height)
        })
    }

    fn texture_extent(&self, texture: TextureId) -> Option<(u32, u32)> {
        let extent = self.gpu.as_ref()?.textures.get(&texture)?.extent();
        Some((extent.width, extent.height))
    }

    fn resize(&mut self, width: u32, height: u32) -> BackendResult<()> {
        if width == 0 || height == 0 {
            log::debug!("Ignoring resize to {}x{}", width, height);
            return Ok(());
        }
        if self.recording.is_some() {
            log::warn!("Resize while a frame was recorded; dropping the frame");
            self.abandon_frame();
        }
        self.settings.requested = vk::Extent2D { width, height };
        let settings = self.settings;

        let (gpu, ctx) = self.parts();
        unsafe { gpu.device.device_wait_idle() }.map_err(|e| frame_error("Wait idle", VulkanError::Api(e)))?;

        let swapchain = Swapchain::new(ctx, settings, gpu.swapchain.handle()).map_err(|e| frame_error("Swapchain", e))?;
        gpu.swapchain = swapchain;
        let extent = gpu.swapchain.extent();
        gpu.scene = SceneTarget::new(
            &gpu.device,
            &ctx.physical,
            &gpu.commands,
            gpu.queue,
            &gpu.scene_pass,
            extent,
            gpu.depth_format,
        )
        .map_err(RenderError::from)?;
        gpu.lights
            .resize(&ctx.physical, extent.width, extent.height)
            .map_err(RenderError::from)?;
        Ok(())
    }

    fn create_geometry(&mut self, upload: &GeometryUpload<'_>) -> BackendResult<BufferId> {
        let id = BufferId(self.next_id());
        let (gpu, ctx) = self.parts();
        let geometry = GeometryBuffer::new(gpu.device.clone(), &ctx.physical, upload)?;
        gpu.geometry.insert(id, geometry);
        Ok(id)
    }

    fn destroy_geometry(&mut self, buffer: BufferId) {
        if self.bound_geometry == Some(buffer) {
            self.bound_geometry = None;
        }
        if let Some(geometry) = self.gpu.as_mut().and_then(|gpu| gpu.geometry.remove(&buffer)) {
            self.retire(Retired::Geometry(geometry));
        }
    }

    fn create_texture(&mut self, desc: &TextureDesc, pixels: &[u8]) -> BackendResult<TextureId> {
        let id = TextureId(self.next_id());
        let (gpu, ctx) = self.parts();
        let texture = Texture::upload(&gpu.texture_context(&ctx.physical), desc, pixels)?;
        gpu.textures.insert(id, texture);
        log::debug!("Created {:?} {}x{} as {:?}", desc.kind, desc.width, desc.height, id);
        Ok(id)
    }

    fn create_render_texture(&mut self, width: u32, height: u32) -> BackendResult<TextureId> {
        let id = TextureId(self.next_id());
        let (gpu, ctx) = self.parts();
        let texture = Texture::render_target(
            &gpu.texture_context(&ctx.physical),
            &gpu.texture_pass,
            vk::Extent2D { width, height },
            gpu.depth_format,
        )?;
        gpu.textures.insert(id, texture);
        Ok(id)
    }

    fn destroy_texture(&mut self, texture: TextureId) {
        if self.bound_texture == Some(texture) {
            self.bound_texture = None;
        }
        if let Some(texture) = self.gpu.as_mut().and_then(|gpu| gpu.textures.remove(&texture)) {
            self.retire(Retired::Texture(texture));
        }
    }

    fn create_shader(&mut self, source: &ShaderSource) -> BackendResult<ShaderId> {
        let id = ShaderId(self.next_id());
        let (gpu, _) = self.parts();
        let program = ShaderProgram::new(gpu.device.clone(), &source.name, &source.vertex_spirv, &source.fragment_spirv)?;
        gpu.shaders.insert(id, program);
        Ok(id)
    }

    fn create_compute_shader(&mut self, source: &ComputeShaderSource) -> BackendResult<ComputeShaderId> {
        let id = ComputeShaderId(self.next_id());
        let (gpu, _) = self.parts();
        let program = ComputeProgram::new(gpu.device.clone(), &source.name, &source.spirv, gpu.pipelines.compute_layout())?;
        gpu.compute_shaders.insert(id, program);
        Ok(id)
    }

    fn begin_pass(&mut self, pass: &PassDescriptor) -> BackendResult<()> {
        let cmd = self.ensure_recording()?;
        let (gpu, _) = self.parts();

        let (render_pass, framebuffer) = match pass.target {
            None => (&gpu.scene_pass, &gpu.scene.attachments.framebuffer),
            Some(id) => {
                let texture = match gpu.textures.get(&id) {
                    Some(texture) => texture,
                    None => panic!("render target {:?} does not exist", id),
                };
                let framebuffer = match texture.framebuffer() {
                    Some(framebuffer) => framebuffer,
                    None => panic!("{:?} is a {:?}, not a render target", id, texture.kind()),
                };
                (&gpu.texture_pass, framebuffer)
            }
        };
        render_pass.begin(cmd, framebuffer, pass.clear_color);

        let open = OpenPass { target: render_pass.kind(), extent: framebuffer.extent(), pipeline: None };
        if let Some(recording) = self.recording.as_mut() {
            recording.pass = Some(open);
        }
        Ok(())
    }

    fn clear(&mut self, flags: ClearFlags, color: [f32; 4]) -> BackendResult<()> {
        let (cmd, pass) = self.open_pass();
        let extent = pass.extent;
        let gpu = self.gpu();

        let mut attachments = Vec::with_capacity(2);
        if flags.contains(ClearFlags::COLOR) {
            attachments.push(vk::ClearAttachment {
                aspect_mask: vk::ImageAspectFlags::COLOR,
                color_attachment: 0,
                clear_value: vk::ClearValue { color: vk::ClearColorValue { float32: color } },
            });
        }
        if flags.contains(ClearFlags::DEPTH) {
            let mut aspect_mask = vk::ImageAspectFlags::DEPTH;
            if has_stencil(gpu.depth_format) {
                aspect_mask |= vk::ImageAspectFlags::STENCIL;
            }
            attachments.push(vk::ClearAttachment {
                aspect_mask,
                color_attachment: 0,
                clear_value: vk::ClearValue {
                    depth_stencil: vk::ClearDepthStencilValue { depth: 1.0, stencil: 0 },
                },
            });
        }
        if attachments.is_empty() {
            return Ok(());
        }

        let rect = vk::ClearRect {
            rect: vk::Rect2D { offset: vk::Offset2D::default(), extent },
            base_array_layer: 0,
            layer_count: 1,
        };
        unsafe { gpu.device.cmd_clear_attachments(cmd, &attachments, &[rect]) };
        Ok(())
    }

    fn bind_geometry(&mut self, buffer: BufferId) -> BackendResult<()> {
        let (cmd, _) = self.open_pass();
        let gpu = self.gpu();
        match gpu.geometry.get(&buffer) {
            Some(geometry) => geometry.bind(&gpu.device, cmd),
            None => panic!("geometry {:?} does not exist", buffer),
        }
        self.bound_geometry = Some(buffer);
        Ok(())
    }

    fn bind_texture(&mut self, texture: TextureId) -> BackendResult<()> {
        assert!(self.gpu().textures.contains_key(&texture), "texture {:?} does not exist", texture);
        self.bound_texture = Some(texture);
        Ok(())
    }

    fn draw_indexed(&mut self, draw: &DrawCommand) -> BackendResult<()> {
        if self.bound_geometry != Some(draw.buffer) {
            self.bind_geometry(draw.buffer)?;
        }
        let bound_texture = self.bound_texture;
        let (cmd, pass) = self.open_pass();
        let mut pass = *pass;

        let (gpu, _) = self.parts();
        let geometry = match gpu.geometry.get(&draw.buffer) {
            Some(geometry) => geometry,
            None => panic!("geometry {:?} does not exist", draw.buffer),
        };
        assert_eq!(geometry.format(), draw.format, "draw format does not match {:?}", draw.buffer);
        assert!(
            draw.first_index + draw.index_count <= geometry.index_count(),
            "index range {}..{} exceeds {} indices",
            draw.first_index,
            draw.first_index + draw.index_count,
            geometry.index_count()
        );
        let program = match gpu.shaders.get(&draw.pipeline.shader) {
            Some(program) => program,
            None => panic!("shader {:?} does not exist", draw.pipeline.shader),
        };
        let render_pass = match pass.target {
            TargetKind::Scene => &gpu.scene_pass,
            TargetKind::Texture => &gpu.texture_pass,
        };
        let key = PipelineKey {
            shader: draw.pipeline.shader,
            format: draw.format,
            blend: draw.pipeline.blend,
            depth: draw.pipeline.depth,
            target: pass.target,
        };
        let pipeline = gpu.pipelines.get_or_create(key, program, render_pass)?;

        let device = &gpu.device;
        let layout = gpu.pipelines.graphics_layout();
        let sets = [gpu.texture_set(bound_texture), gpu.lights.descriptor_set()];
        unsafe {
            if pass.pipeline != Some(pipeline) {
                device.cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, pipeline);
                pass.pipeline = Some(pipeline);
            }
            device.cmd_bind_descriptor_sets(cmd, vk::PipelineBindPoint::GRAPHICS, layout, 0, &sets, &[]);
            device.cmd_push_constants(
                cmd,
                layout,
                vk::ShaderStageFlags::VERTEX,
                0,
                bytemuck::bytes_of(&draw.uniforms),
            );
            device.cmd_draw_indexed(cmd, draw.index_count, 1, draw.first_index, 0, 0);
        }

        if let Some(Recording { pass: Some(open), .. }) = self.recording.as_mut() {
            *open = pass;
        }
        Ok(())
    }

    fn end_pass(&mut self) -> BackendResult<()> {
        let (cmd, _) = self.open_pass();
        unsafe { self.gpu().device.cmd_end_render_pass(cmd) };
        if let Some(recording) = self.recording.as_mut() {
            recording.pass = None;
        }
        Ok(())
    }

    fn upload_lights(&mut self, lights: &LightBuffers<'_>) -> BackendResult<()> {
        let (gpu, _) = self.parts();
        gpu.lights.upload(lights)?;
        Ok(())
    }

    fn cull_lights(&mut self, dispatch: &LightCullDispatch) -> BackendResult<()> {
        let cmd = self.ensure_recording()?;
        let gpu = self.gpu();
        let program = match gpu.compute_shaders.get(&dispatch.shader) {
            Some(program) => program,
            None => panic!("compute shader {:?} does not exist", dispatch.shader),
        };
        let depth_set = gpu.texture_set(dispatch.depth_normal_target);
        gpu.lights
            .record_dispatch(cmd, program.pipeline(), gpu.pipelines.compute_layout(), depth_set, dispatch);
        Ok(())
    }

    fn present(&mut self) -> BackendResult<()> {
        let cmd = self.ensure_recording()?;
        let timeout = self.present_timeout_ns;

        let gpu = self.gpu();
        let (image_index, suboptimal) = match gpu.swapchain.acquire(timeout, gpu.sync.image_available.handle()) {
            Ok(acquired) => acquired,
            Err(e) => {
                self.abandon_frame();
                return Err(frame_error("Swapchain acquire", e));
            }
        };
        if suboptimal {
            log::debug!("Swapchain is suboptimal for the surface");
        }

        gpu.record_blit(cmd, image_index);
        if let Err(e) = gpu.submit(cmd) {
            self.recording = None;
            return Err(frame_error("Queue submit", e));
        }

        let presented = gpu
            .swapchain
            .present(gpu.queue, image_index, gpu.sync.render_finished.handle());
        let waited = gpu.sync.frame_done.wait(u64::MAX).and_then(|()| gpu.sync.frame_done.reset());

        self.recording = None;
        if let Some(gpu) = self.gpu.as_mut() {
            gpu.retired.clear();
        }

        waited.map_err(|e| frame_error("Frame fence", e))?;
        match presented {
            Ok(true) => log::debug!("Presented to a suboptimal swapchain"),
            Ok(false) => {}
            Err(e) => return Err(frame_error("Present", e)),
        }
        Ok(())
    }

    fn wait_idle(&mut self) -> BackendResult<()> {
        if let Some(gpu) = self.gpu.as_ref() {
            unsafe { gpu.device.device_wait_idle() }.map_err(|e| frame_error("Wait idle", VulkanError::Api(e)))?;
        }
        Ok(())
    }

    fn release_gpu_objects(&mut self) {
        if self.gpu.is_none() && self.context.is_none() {
            return;
        }
        self.abandon_frame();
        if let Some(gpu) = self.gpu.as_ref() {
            unsafe {
                let _ = gpu.device.device_wait_idle();
            }
        }
        self.gpu = None;
        self.context = None;
        self.bound_texture = None;
        log::info!("Vulkan backend released");
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl Drop for VulkanBackend {
    fn drop(&mut self) {
        self.release_gpu_objects();
    }
}
