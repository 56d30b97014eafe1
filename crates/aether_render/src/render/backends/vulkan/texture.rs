//! Images, samplers and textures
//!
//! Sampled textures are uploaded through a staging buffer and left in
//! `SHADER_READ_ONLY_OPTIMAL`. Render textures carry their own depth image
//! and framebuffer.

use ash::{vk, Device};

use super::buffer::Buffer;
use super::commands::{transition_image, CommandPool, LayoutTransition};
use super::context::{PhysicalDeviceInfo, VulkanError, VulkanResult};
use super::descriptors::{Descriptors, TextureBinding};
use super::render_pass::{has_stencil, Framebuffer, RenderPass, COLOR_FORMAT};
use crate::render::api::{TextureDesc, TextureKind};

/// Parameters of an image allocation
#[derive(Debug, Clone, Copy)]
pub struct ImageDesc {
    /// Size in pixels
    pub extent: vk::Extent2D,
    /// Pixel format
    pub format: vk::Format,
    /// Allowed usages
    pub usage: vk::ImageUsageFlags,
    /// Aspect the view covers
    pub aspect: vk::ImageAspectFlags,
    /// Six-layer cube image
    pub cube: bool,
}

impl ImageDesc {
    /// Depth attachment of `extent` in `format`
    pub fn depth(extent: vk::Extent2D, format: vk::Format) -> Self {
        let mut aspect = vk::ImageAspectFlags::DEPTH;
        if has_stencil(format) {
            aspect |= vk::ImageAspectFlags::STENCIL;
        }
        Self {
            extent,
            format,
            usage: vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
            aspect,
            cube: false,
        }
    }

    /// Color attachment that can be sampled and blitted from
    pub fn color_target(extent: vk::Extent2D) -> Self {
        Self {
            extent,
            format: COLOR_FORMAT,
            usage: vk::ImageUsageFlags::COLOR_ATTACHMENT
                | vk::ImageUsageFlags::SAMPLED
                | vk::ImageUsageFlags::TRANSFER_SRC,
            aspect: vk::ImageAspectFlags::COLOR,
            cube: false,
        }
    }

    fn layers(&self) -> u32 {
        if self.cube {
            6
        } else {
            1
        }
    }
}

/// Image, its memory and a view over every layer
pub struct Image {
    device: Device,
    image: vk::Image,
    memory: vk::DeviceMemory,
    view: vk::ImageView,
    desc: ImageDesc,
}

impl Image {
    /// Allocate a device-local image and its view
    pub fn new(device: Device, physical: &PhysicalDeviceInfo, desc: ImageDesc) -> VulkanResult<Self> {
        let create_info = vk::ImageCreateInfo::builder()
            .image_type(vk::ImageType::TYPE_2D)
            .format(desc.format)
            .extent(vk::Extent3D { width: desc.extent.width, height: desc.extent.height, depth: 1 })
            .mip_levels(1)
            .array_layers(desc.layers())
            .samples(vk::SampleCountFlags::TYPE_1)
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(desc.usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .flags(if desc.cube { vk::ImageCreateFlags::CUBE_COMPATIBLE } else { vk::ImageCreateFlags::empty() });
        let image = unsafe { device.create_image(&create_info, None) }.map_err(VulkanError::Api)?;

        let requirements = unsafe { device.get_image_memory_requirements(image) };
        let memory = physical
            .find_memory_type(requirements.memory_type_bits, vk::MemoryPropertyFlags::DEVICE_LOCAL)
            .and_then(|memory_type_index| {
                let alloc_info = vk::MemoryAllocateInfo::builder()
                    .allocation_size(requirements.size)
                    .memory_type_index(memory_type_index);
                unsafe { device.allocate_memory(&alloc_info, None) }.map_err(VulkanError::Api)
            });
        let memory = match memory {
            Ok(memory) => memory,
            Err(e) => {
                unsafe { device.destroy_image(image, None) };
                return Err(e);
            }
        };

        let mut this = Self { device, image, memory, view: vk::ImageView::null(), desc };
        unsafe { this.device.bind_image_memory(image, memory, 0) }.map_err(VulkanError::Api)?;

        let view_info = vk::ImageViewCreateInfo::builder()
            .image(image)
            .view_type(if desc.cube { vk::ImageViewType::CUBE } else { vk::ImageViewType::TYPE_2D })
            .format(desc.format)
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask: desc.aspect,
                base_mip_level: 0,
                level_count: 1,
                base_array_layer: 0,
                layer_count: desc.layers(),
            });
        this.view = unsafe { this.device.create_image_view(&view_info, None) }.map_err(VulkanError::Api)?;
        Ok(this)
    }

    /// Get image handle
    pub fn handle(&self) -> vk::Image {
        self.image
    }

    /// View over the whole image
    pub fn view(&self) -> vk::ImageView {
        self.view
    }

    /// Size in pixels
    pub fn extent(&self) -> vk::Extent2D {
        self.desc.extent
    }

    /// Array layers
    pub fn layers(&self) -> u32 {
        self.desc.layers()
    }

    /// Aspect the view covers
    pub fn aspect(&self) -> vk::ImageAspectFlags {
        self.desc.aspect
    }
}

impl Drop for Image {
    fn drop(&mut self) {
        unsafe {
            if self.view != vk::ImageView::null() {
                self.device.destroy_image_view(self.view, None);
            }
            self.device.destroy_image(self.image, None);
            self.device.free_memory(self.memory, None);
        }
    }
}

/// Sampler wrapper with RAII cleanup
pub struct Sampler {
    device: Device,
    sampler: vk::Sampler,
}

impl Sampler {
    /// Bilinear, clamp-to-edge sampler
    pub fn linear_clamp(device: Device) -> VulkanResult<Self> {
        let create_info = vk::SamplerCreateInfo::builder()
            .mag_filter(vk::Filter::LINEAR)
            .min_filter(vk::Filter::LINEAR)
            .mipmap_mode(vk::SamplerMipmapMode::NEAREST)
            .address_mode_u(vk::SamplerAddressMode::CLAMP_TO_EDGE)
            .address_mode_v(vk::SamplerAddressMode::CLAMP_TO_EDGE)
            .address_mode_w(vk::SamplerAddressMode::CLAMP_TO_EDGE)
            .max_lod(0.0);
        let sampler = unsafe { device.create_sampler(&create_info, None) }.map_err(VulkanError::Api)?;
        Ok(Self { device, sampler })
    }

    /// Get sampler handle
    pub fn handle(&self) -> vk::Sampler {
        self.sampler
    }
}

impl Drop for Sampler {
    fn drop(&mut self) {
        unsafe { self.device.destroy_sampler(self.sampler, None) };
    }
}

/// Depth image and framebuffer of a color target
pub struct TargetAttachments {
    /// Framebuffer over the color and depth views
    pub framebuffer: Framebuffer,
    /// Depth attachment
    pub depth: Image,
}

impl TargetAttachments {
    /// Create depth and framebuffer for `color`
    pub fn new(
        device: &Device,
        physical: &PhysicalDeviceInfo,
        render_pass: &RenderPass,
        color: &Image,
        depth_format: vk::Format,
    ) -> VulkanResult<Self> {
        let depth = Image::new(device.clone(), physical, ImageDesc::depth(color.extent(), depth_format))?;
        let framebuffer = Framebuffer::new(device.clone(), render_pass, color.view(), depth.view(), color.extent())?;
        Ok(Self { framebuffer, depth })
    }
}

/// Shared objects texture creation needs
pub struct TextureContext<'a> {
    /// Device handle
    pub device: &'a Device,
    /// Selected GPU
    pub physical: &'a PhysicalDeviceInfo,
    /// Pool for one-off upload commands
    pub commands: &'a CommandPool,
    /// Queue uploads are submitted to
    pub queue: vk::Queue,
    /// Descriptor allocator
    pub descriptors: &'a Descriptors,
    /// Sampler written into every texture set
    pub sampler: &'a Sampler,
}

/// A sampled texture, cube map or render texture
pub struct Texture {
    binding: TextureBinding,
    target: Option<TargetAttachments>,
    image: Image,
    kind: TextureKind,
}

impl Texture {
    /// Upload RGBA8 pixels. Cube faces are laid out one after another.
    pub fn upload(ctx: &TextureContext<'_>, desc: &TextureDesc, pixels: &[u8]) -> VulkanResult<Self> {
        assert_eq!(pixels.len(), desc.byte_len(), "pixel data does not match {:?}", desc);
        assert!(desc.kind != TextureKind::RenderTarget, "render textures have their own constructor");

        let cube = desc.kind == TextureKind::Cube;
        let image = Image::new(
            ctx.device.clone(),
            ctx.physical,
            ImageDesc {
                extent: vk::Extent2D { width: desc.width, height: desc.height },
                format: vk::Format::R8G8B8A8_UNORM,
                usage: vk::ImageUsageFlags::TRANSFER_DST | vk::ImageUsageFlags::SAMPLED,
                aspect: vk::ImageAspectFlags::COLOR,
                cube,
            },
        )?;

        let staging = Buffer::host_visible(
            ctx.device.clone(),
            ctx.physical,
            pixels.len() as vk::DeviceSize,
            vk::BufferUsageFlags::TRANSFER_SRC,
        )?;
        staging.write(0, pixels)?;

        let layer_bytes = u64::from(desc.width) * u64::from(desc.height) * 4;
        let regions: Vec<vk::BufferImageCopy> = (0..image.layers())
            .map(|layer| vk::BufferImageCopy {
                buffer_offset: u64::from(layer) * layer_bytes,
                buffer_row_length: 0,
                buffer_image_height: 0,
                image_subresource: vk::ImageSubresourceLayers {
                    aspect_mask: vk::ImageAspectFlags::COLOR,
                    mip_level: 0,
                    base_array_layer: layer,
                    layer_count: 1,
                },
                image_offset: vk::Offset3D::default(),
                image_extent: vk::Extent3D { width: desc.width, height: desc.height, depth: 1 },
            })
            .collect();

        ctx.commands.submit_and_wait(ctx.queue, |device, cmd| {
            transition_image(
                device,
                cmd,
                image.handle(),
                vk::ImageAspectFlags::COLOR,
                image.layers(),
                LayoutTransition {
                    old_layout: vk::ImageLayout::UNDEFINED,
                    new_layout: vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                    src_access: vk::AccessFlags::empty(),
                    dst_access: vk::AccessFlags::TRANSFER_WRITE,
                    src_stage: vk::PipelineStageFlags::TOP_OF_PIPE,
                    dst_stage: vk::PipelineStageFlags::TRANSFER,
                },
            );
            unsafe {
                device.cmd_copy_buffer_to_image(
                    cmd,
                    staging.handle(),
                    image.handle(),
                    vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                    &regions,
                );
            }
            transition_image(
                device,
                cmd,
                image.handle(),
                vk::ImageAspectFlags::COLOR,
                image.layers(),
                LayoutTransition {
                    old_layout: vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                    new_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                    src_access: vk::AccessFlags::TRANSFER_WRITE,
                    dst_access: vk::AccessFlags::SHADER_READ,
                    src_stage: vk::PipelineStageFlags::TRANSFER,
                    dst_stage: vk::PipelineStageFlags::FRAGMENT_SHADER | vk::PipelineStageFlags::COMPUTE_SHADER,
                },
            );
        })?;

        let binding = ctx.descriptors.texture_binding(image.view(), ctx.sampler.handle())?;
        Ok(Self { binding, target: None, image, kind: desc.kind })
    }

    /// Create a color target that starts out sampleable
    pub fn render_target(
        ctx: &TextureContext<'_>,
        render_pass: &RenderPass,
        extent: vk::Extent2D,
        depth_format: vk::Format,
    ) -> VulkanResult<Self> {
        let image = Image::new(ctx.device.clone(), ctx.physical, ImageDesc::color_target(extent))?;
        let target = TargetAttachments::new(ctx.device, ctx.physical, render_pass, &image, depth_format)?;

        ctx.commands.submit_and_wait(ctx.queue, |device, cmd| {
            transition_image(
                device,
                cmd,
                image.handle(),
                vk::ImageAspectFlags::COLOR,
                1,
                LayoutTransition {
                    old_layout: vk::ImageLayout::UNDEFINED,
                    new_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                    src_access: vk::AccessFlags::empty(),
                    dst_access: vk::AccessFlags::SHADER_READ,
                    src_stage: vk::PipelineStageFlags::TOP_OF_PIPE,
                    dst_stage: vk::PipelineStageFlags::FRAGMENT_SHADER,
                },
            );
        })?;

        let binding = ctx.descriptors.texture_binding(image.view(), ctx.sampler.handle())?;
        Ok(Self { binding, target: Some(target), image, kind: TextureKind::RenderTarget })
    }

    /// Descriptor set to bind for sampling
    pub fn descriptor_set(&self) -> vk::DescriptorSet {
        self.binding.handle()
    }

    /// Framebuffer if this is a render texture
    pub fn framebuffer(&self) -> Option<&Framebuffer> {
        self.target.as_ref().map(|target| &target.framebuffer)
    }

    /// Size in pixels
    pub fn extent(&self) -> vk::Extent2D {
        self.image.extent()
    }

    /// Texture kind
    pub fn kind(&self) -> TextureKind {
        self.kind
    }
}
