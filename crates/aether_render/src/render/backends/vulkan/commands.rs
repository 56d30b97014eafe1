//! Command pool, command buffers and barrier helpers

use ash::{vk, Device};

use super::context::{VulkanError, VulkanResult};

/// Command pool with one resettable primary buffer for frame recording
pub struct CommandPool {
    device: Device,
    pool: vk::CommandPool,
    frame_buffer: vk::CommandBuffer,
}

impl CommandPool {
    /// Create a pool on `queue_family`
    pub fn new(device: Device, queue_family: u32) -> VulkanResult<Self> {
        let create_info = vk::CommandPoolCreateInfo::builder()
            .queue_family_index(queue_family)
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);
        let pool = unsafe { device.create_command_pool(&create_info, None) }.map_err(VulkanError::Api)?;

        let alloc_info = vk::CommandBufferAllocateInfo::builder()
            .command_pool(pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);
        let frame_buffer = match unsafe { device.allocate_command_buffers(&alloc_info) } {
            Ok(buffers) => buffers[0],
            Err(e) => {
                unsafe { device.destroy_command_pool(pool, None) };
                return Err(VulkanError::Api(e));
            }
        };

        Ok(Self { device, pool, frame_buffer })
    }

    /// The buffer frames are recorded into
    pub fn frame_buffer(&self) -> vk::CommandBuffer {
        self.frame_buffer
    }

    /// Reset and begin the frame buffer
    pub fn begin_frame(&self) -> VulkanResult<vk::CommandBuffer> {
        unsafe {
            self.device
                .reset_command_buffer(self.frame_buffer, vk::CommandBufferResetFlags::empty())
                .map_err(VulkanError::Api)?;
            let begin_info =
                vk::CommandBufferBeginInfo::builder().flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
            self.device
                .begin_command_buffer(self.frame_buffer, &begin_info)
                .map_err(VulkanError::Api)?;
        }
        Ok(self.frame_buffer)
    }

    /// Record `record` into a temporary buffer, submit it and wait
    pub fn submit_and_wait<F>(&self, queue: vk::Queue, record: F) -> VulkanResult<()>
    where
        F: FnOnce(&Device, vk::CommandBuffer),
    {
        let alloc_info = vk::CommandBufferAllocateInfo::builder()
            .command_pool(self.pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);
        let cmd = unsafe { self.device.allocate_command_buffers(&alloc_info) }.map_err(VulkanError::Api)?[0];

        let result = unsafe {
            let begin_info =
                vk::CommandBufferBeginInfo::builder().flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
            self.device.begin_command_buffer(cmd, &begin_info).and_then(|()| {
                record(&self.device, cmd);
                self.device.end_command_buffer(cmd)?;
                let buffers = [cmd];
                let submit = [vk::SubmitInfo::builder().command_buffers(&buffers).build()];
                self.device.queue_submit(queue, &submit, vk::Fence::null())?;
                self.device.queue_wait_idle(queue)
            })
        };

        unsafe { self.device.free_command_buffers(self.pool, &[cmd]) };
        result.map_err(VulkanError::Api)
    }
}

impl Drop for CommandPool {
    fn drop(&mut self) {
        unsafe { self.device.destroy_command_pool(self.pool, None) };
    }
}

/// A layout transition with the stages and accesses it synchronizes
#[derive(Debug, Clone, Copy)]
pub struct LayoutTransition {
    /// Current layout
    pub old_layout: vk::ImageLayout,
    /// Layout after the barrier
    pub new_layout: vk::ImageLayout,
    /// Accesses that must complete first
    pub src_access: vk::AccessFlags,
    /// Accesses that wait for the transition
    pub dst_access: vk::AccessFlags,
    /// Stages that must complete first
    pub src_stage: vk::PipelineStageFlags,
    /// Stages that wait for the transition
    pub dst_stage: vk::PipelineStageFlags,
}

/// Record an image barrier over every mip and `layers` array layers
pub fn transition_image(
    device: &Device,
    cmd: vk::CommandBuffer,
    image: vk::Image,
    aspect: vk::ImageAspectFlags,
    layers: u32,
    transition: LayoutTransition,
) {
    let barrier = vk::ImageMemoryBarrier::builder()
        .old_layout(transition.old_layout)
        .new_layout(transition.new_layout)
        .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .image(image)
        .subresource_range(vk::ImageSubresourceRange {
            aspect_mask: aspect,
            base_mip_level: 0,
            level_count: 1,
            base_array_layer: 0,
            layer_count: layers,
        })
        .src_access_mask(transition.src_access)
        .dst_access_mask(transition.dst_access)
        .build();

    unsafe {
        device.cmd_pipeline_barrier(
            cmd,
            transition.src_stage,
            transition.dst_stage,
            vk::DependencyFlags::empty(),
            &[],
            &[],
            &[barrier],
        );
    }
}

/// Record a buffer barrier over the whole buffer
pub fn buffer_barrier(
    device: &Device,
    cmd: vk::CommandBuffer,
    buffer: vk::Buffer,
    src: (vk::PipelineStageFlags, vk::AccessFlags),
    dst: (vk::PipelineStageFlags, vk::AccessFlags),
) {
    let barrier = vk::BufferMemoryBarrier::builder()
        .src_access_mask(src.1)
        .dst_access_mask(dst.1)
        .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .buffer(buffer)
        .offset(0)
        .size(vk::WHOLE_SIZE)
        .build();

    unsafe {
        device.cmd_pipeline_barrier(cmd, src.0, dst.0, vk::DependencyFlags::empty(), &[], &[barrier], &[]);
    }
}
