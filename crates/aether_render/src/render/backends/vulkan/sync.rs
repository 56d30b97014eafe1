//! Vulkan synchronization primitives
//!
//! One frame is in flight at a time: present waits on the frame fence before
//! returning, so a single set of these objects is enough.

use ash::{vk, Device};

use super::context::{VulkanError, VulkanResult};

/// Binary semaphore for GPU-GPU ordering
pub struct Semaphore {
    device: Device,
    semaphore: vk::Semaphore,
}

impl Semaphore {
    /// Create a new semaphore
    pub fn new(device: Device) -> VulkanResult<Self> {
        let create_info = vk::SemaphoreCreateInfo::builder();
        let semaphore = unsafe { device.create_semaphore(&create_info, None) }.map_err(VulkanError::Api)?;
        Ok(Self { device, semaphore })
    }

    /// Get semaphore handle
    pub fn handle(&self) -> vk::Semaphore {
        self.semaphore
    }
}

impl Drop for Semaphore {
    fn drop(&mut self) {
        unsafe { self.device.destroy_semaphore(self.semaphore, None) };
    }
}

/// Fence for CPU-GPU synchronization
pub struct Fence {
    device: Device,
    fence: vk::Fence,
}

impl Fence {
    /// Create a new fence
    pub fn new(device: Device, signaled: bool) -> VulkanResult<Self> {
        let flags = if signaled { vk::FenceCreateFlags::SIGNALED } else { vk::FenceCreateFlags::empty() };
        let create_info = vk::FenceCreateInfo::builder().flags(flags);
        let fence = unsafe { device.create_fence(&create_info, None) }.map_err(VulkanError::Api)?;
        Ok(Self { device, fence })
    }

    /// Wait for the fence, up to `timeout` nanoseconds
    pub fn wait(&self, timeout: u64) -> VulkanResult<()> {
        unsafe { self.device.wait_for_fences(&[self.fence], true, timeout) }.map_err(VulkanError::Api)
    }

    /// Reset fence to unsignaled state
    pub fn reset(&self) -> VulkanResult<()> {
        unsafe { self.device.reset_fences(&[self.fence]) }.map_err(VulkanError::Api)
    }

    /// Get fence handle
    pub fn handle(&self) -> vk::Fence {
        self.fence
    }
}

impl Drop for Fence {
    fn drop(&mut self) {
        unsafe { self.device.destroy_fence(self.fence, None) };
    }
}

/// Per-frame synchronization objects
pub struct FrameSync {
    /// Signaled when the swapchain image is ready to be written
    pub image_available: Semaphore,
    /// Signaled when the frame's commands finished, waited on by present
    pub render_finished: Semaphore,
    /// Signaled when the frame's submission completed
    pub frame_done: Fence,
}

impl FrameSync {
    /// Create the frame's semaphores and fence
    pub fn new(device: &Device) -> VulkanResult<Self> {
        Ok(Self {
            image_available: Semaphore::new(device.clone())?,
            render_finished: Semaphore::new(device.clone())?,
            frame_done: Fence::new(device.clone(), false)?,
        })
    }
}
