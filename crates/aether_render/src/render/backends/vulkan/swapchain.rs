//! Swapchain creation and recreation
//!
//! Swapchain images are only ever blit destinations, so no views are created.

use ash::extensions::khr::Swapchain as SwapchainLoader;
use ash::vk;

use super::context::{VulkanContext, VulkanError, VulkanResult};

/// Presentation settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapchainSettings {
    /// Extent requested when the surface leaves the choice to us
    pub requested: vk::Extent2D,
    /// Use MAILBOX when the surface supports it
    pub prefer_mailbox: bool,
}

/// Swapchain wrapper with RAII cleanup
pub struct Swapchain {
    loader: SwapchainLoader,
    swapchain: vk::SwapchainKHR,
    images: Vec<vk::Image>,
    format: vk::SurfaceFormatKHR,
    extent: vk::Extent2D,
}

impl Swapchain {
    /// Create a swapchain, retiring `old` if it is not null
    pub fn new(ctx: &VulkanContext, settings: SwapchainSettings, old: vk::SwapchainKHR) -> VulkanResult<Self> {
        let physical = ctx.physical.device;
        let surface = ctx.surface.surface;
        let (caps, formats, present_modes) = unsafe {
            let loader = &ctx.surface.loader;
            (
                loader
                    .get_physical_device_surface_capabilities(physical, surface)
                    .map_err(VulkanError::Api)?,
                loader
                    .get_physical_device_surface_formats(physical, surface)
                    .map_err(VulkanError::Api)?,
                loader
                    .get_physical_device_surface_present_modes(physical, surface)
                    .map_err(VulkanError::Api)?,
            )
        };

        if !caps.supported_usage_flags.contains(vk::ImageUsageFlags::TRANSFER_DST) {
            return Err(VulkanError::UnsupportedFormat("blit-capable swapchain"));
        }

        let format = choose_format(&formats).ok_or(VulkanError::UnsupportedFormat("surface"))?;
        let present_mode = choose_present_mode(&present_modes, settings.prefer_mailbox);
        let extent = choose_extent(&caps, settings.requested);
        let image_count = choose_image_count(&caps);

        let composite_alpha = [
            vk::CompositeAlphaFlagsKHR::OPAQUE,
            vk::CompositeAlphaFlagsKHR::INHERIT,
            vk::CompositeAlphaFlagsKHR::PRE_MULTIPLIED,
            vk::CompositeAlphaFlagsKHR::POST_MULTIPLIED,
        ]
        .into_iter()
        .find(|&mode| caps.supported_composite_alpha.contains(mode))
        .unwrap_or(vk::CompositeAlphaFlagsKHR::OPAQUE);

        let create_info = vk::SwapchainCreateInfoKHR::builder()
            .surface(surface)
            .min_image_count(image_count)
            .image_format(format.format)
            .image_color_space(format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::TRANSFER_DST)
            .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
            .pre_transform(caps.current_transform)
            .composite_alpha(composite_alpha)
            .present_mode(present_mode)
            .clipped(true)
            .old_swapchain(old);

        let loader = ctx.device.swapchain_loader.clone();
        let swapchain = unsafe { loader.create_swapchain(&create_info, None) }.map_err(VulkanError::Api)?;
        let images = match unsafe { loader.get_swapchain_images(swapchain) } {
            Ok(images) => images,
            Err(e) => {
                unsafe { loader.destroy_swapchain(swapchain, None) };
                return Err(VulkanError::Api(e));
            }
        };

        log::info!(
            "Swapchain {}x{}, {} images, {:?}, {:?}",
            extent.width,
            extent.height,
            images.len(),
            format.format,
            present_mode
        );
        Ok(Self { loader, swapchain, images, format, extent })
    }

    /// Acquire the next image, signaling `signal` when it is writable.
    ///
    /// Returns the image index and whether the swapchain is suboptimal.
    pub fn acquire(&self, timeout_ns: u64, signal: vk::Semaphore) -> VulkanResult<(u32, bool)> {
        unsafe { self.loader.acquire_next_image(self.swapchain, timeout_ns, signal, vk::Fence::null()) }
            .map_err(VulkanError::Api)
    }

    /// Queue `index` for presentation once `wait` is signaled
    pub fn present(&self, queue: vk::Queue, index: u32, wait: vk::Semaphore) -> VulkanResult<bool> {
        let swapchains = [self.swapchain];
        let indices = [index];
        let waits = [wait];
        let present_info = vk::PresentInfoKHR::builder()
            .wait_semaphores(&waits)
            .swapchains(&swapchains)
            .image_indices(&indices);
        unsafe { self.loader.queue_present(queue, &present_info) }.map_err(VulkanError::Api)
    }

    /// Get swapchain handle
    pub fn handle(&self) -> vk::SwapchainKHR {
        self.swapchain
    }

    /// Image at `index`
    pub fn image(&self, index: u32) -> vk::Image {
        self.images[index as usize]
    }

    /// Number of images
    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    /// Surface format in use
    pub fn format(&self) -> vk::SurfaceFormatKHR {
        self.format
    }

    /// Size of every image
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        unsafe { self.loader.destroy_swapchain(self.swapchain, None) };
    }
}

fn choose_format(formats: &[vk::SurfaceFormatKHR]) -> Option<vk::SurfaceFormatKHR> {
    formats
        .iter()
        .find(|f| f.format == vk::Format::B8G8R8A8_UNORM && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR)
        .or_else(|| formats.iter().find(|f| f.format == vk::Format::R8G8B8A8_UNORM))
        .or_else(|| formats.first())
        .copied()
}

fn choose_present_mode(modes: &[vk::PresentModeKHR], prefer_mailbox: bool) -> vk::PresentModeKHR {
    if prefer_mailbox && modes.contains(&vk::PresentModeKHR::MAILBOX) {
        vk::PresentModeKHR::MAILBOX
    } else {
        vk::PresentModeKHR::FIFO
    }
}

fn choose_extent(caps: &vk::SurfaceCapabilitiesKHR, requested: vk::Extent2D) -> vk::Extent2D {
    if caps.current_extent.width != u32::MAX {
        return caps.current_extent;
    }
    vk::Extent2D {
        width: requested.width.clamp(caps.min_image_extent.width, caps.max_image_extent.width),
        height: requested.height.clamp(caps.min_image_extent.height, caps.max_image_extent.height),
    }
}

fn choose_image_count(caps: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let wanted = caps.min_image_count + 1;
    if caps.max_image_count > 0 {
        wanted.min(caps.max_image_count)
    } else {
        wanted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caps(current: (u32, u32)) -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            min_image_count: 2,
            max_image_count: 3,
            current_extent: vk::Extent2D { width: current.0, height: current.1 },
            min_image_extent: vk::Extent2D { width: 1, height: 1 },
            max_image_extent: vk::Extent2D { width: 4096, height: 4096 },
            ..Default::default()
        }
    }

    #[test]
    fn test_extent_follows_surface_when_fixed() {
        let requested = vk::Extent2D { width: 640, height: 480 };
        assert_eq!(choose_extent(&caps((800, 600)), requested), vk::Extent2D { width: 800, height: 600 });
    }

    #[test]
    fn test_extent_clamps_request_when_free() {
        let requested = vk::Extent2D { width: 10_000, height: 480 };
        let extent = choose_extent(&caps((u32::MAX, u32::MAX)), requested);
        assert_eq!(extent, vk::Extent2D { width: 4096, height: 480 });
    }

    #[test]
    fn test_image_count() {
        assert_eq!(choose_image_count(&caps((1, 1))), 3);
        let unbounded = vk::SurfaceCapabilitiesKHR { min_image_count: 2, max_image_count: 0, ..Default::default() };
        assert_eq!(choose_image_count(&unbounded), 3);
    }

    #[test]
    fn test_present_mode() {
        let modes = [vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX];
        assert_eq!(choose_present_mode(&modes, true), vk::PresentModeKHR::MAILBOX);
        assert_eq!(choose_present_mode(&modes, false), vk::PresentModeKHR::FIFO);
        assert_eq!(choose_present_mode(&[vk::PresentModeKHR::FIFO], true), vk::PresentModeKHR::FIFO);
    }

    #[test]
    fn test_format_preference() {
        let formats = [
            vk::SurfaceFormatKHR { format: vk::Format::B8G8R8A8_SRGB, color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR },
            vk::SurfaceFormatKHR { format: vk::Format::B8G8R8A8_UNORM, color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR },
        ];
        assert_eq!(choose_format(&formats).map(|f| f.format), Some(vk::Format::B8G8R8A8_UNORM));
        assert_eq!(choose_format(&[]), None);
    }
}
