//! Buffer management for geometry, light arrays and staging uploads

use ash::{vk, Device};
use bytemuck::Pod;

use super::context::{PhysicalDeviceInfo, VulkanError, VulkanResult};
use crate::render::api::GeometryUpload;
use crate::render::vertex::VertexFormat;

/// A buffer with its own dedicated allocation
pub struct Buffer {
    device: Device,
    buffer: vk::Buffer,
    memory: vk::DeviceMemory,
    size: vk::DeviceSize,
}

impl Buffer {
    /// Create a new buffer with memory allocation
    pub fn new(
        device: Device,
        physical: &PhysicalDeviceInfo,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        properties: vk::MemoryPropertyFlags,
    ) -> VulkanResult<Self> {
        let buffer_info = vk::BufferCreateInfo::builder()
            .size(size.max(4))
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);
        let buffer = unsafe { device.create_buffer(&buffer_info, None) }.map_err(VulkanError::Api)?;

        let requirements = unsafe { device.get_buffer_memory_requirements(buffer) };
        let memory = physical
            .find_memory_type(requirements.memory_type_bits, properties)
            .and_then(|memory_type_index| {
                let alloc_info = vk::MemoryAllocateInfo::builder()
                    .allocation_size(requirements.size)
                    .memory_type_index(memory_type_index);
                unsafe { device.allocate_memory(&alloc_info, None) }.map_err(VulkanError::Api)
            });
        let memory = match memory {
            Ok(memory) => memory,
            Err(e) => {
                unsafe { device.destroy_buffer(buffer, None) };
                return Err(e);
            }
        };

        let this = Self { device, buffer, memory, size };
        unsafe { this.device.bind_buffer_memory(buffer, memory, 0) }.map_err(VulkanError::Api)?;
        Ok(this)
    }

    /// Host-visible, coherent buffer
    pub fn host_visible(
        device: Device,
        physical: &PhysicalDeviceInfo,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
    ) -> VulkanResult<Self> {
        Self::new(
            device,
            physical,
            size,
            usage,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        )
    }

    /// Copy `data` to `offset` bytes into the buffer. The buffer must be host-visible.
    pub fn write<T: Pod>(&self, offset: vk::DeviceSize, data: &[T]) -> VulkanResult<()> {
        let bytes: &[u8] = bytemuck::cast_slice(data);
        if bytes.is_empty() {
            return Ok(());
        }
        assert!(
            offset + bytes.len() as vk::DeviceSize <= self.size,
            "write of {} bytes at {} overflows buffer of {}",
            bytes.len(),
            offset,
            self.size
        );
        unsafe {
            let ptr = self
                .device
                .map_memory(self.memory, offset, bytes.len() as vk::DeviceSize, vk::MemoryMapFlags::empty())
                .map_err(VulkanError::Api)?;
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), ptr.cast::<u8>(), bytes.len());
            self.device.unmap_memory(self.memory);
        }
        Ok(())
    }

    /// Get buffer handle
    pub fn handle(&self) -> vk::Buffer {
        self.buffer
    }

    /// Size in bytes
    pub fn size(&self) -> vk::DeviceSize {
        self.size
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_buffer(self.buffer, None);
            self.device.free_memory(self.memory, None);
        }
    }
}

/// Vertices followed by 16-bit indices in one host-visible buffer
pub struct GeometryBuffer {
    buffer: Buffer,
    index_offset: vk::DeviceSize,
    index_count: u32,
    format: VertexFormat,
}

impl GeometryBuffer {
    /// Upload geometry
    pub fn new(device: Device, physical: &PhysicalDeviceInfo, upload: &GeometryUpload<'_>) -> VulkanResult<Self> {
        let vertex_len = upload.vertex_bytes.len() as vk::DeviceSize;
        // Index data must start on a 4-byte boundary.
        let index_offset = (vertex_len + 3) & !3;
        let index_len = std::mem::size_of_val(upload.indices) as vk::DeviceSize;

        let buffer = Buffer::host_visible(
            device,
            physical,
            index_offset + index_len,
            vk::BufferUsageFlags::VERTEX_BUFFER | vk::BufferUsageFlags::INDEX_BUFFER,
        )?;
        buffer.write(0, upload.vertex_bytes)?;
        buffer.write(index_offset, upload.indices)?;

        Ok(Self {
            buffer,
            index_offset,
            index_count: upload.indices.len() as u32,
            format: upload.format,
        })
    }

    /// Bind as vertex and index source
    pub fn bind(&self, device: &Device, cmd: vk::CommandBuffer) {
        unsafe {
            device.cmd_bind_vertex_buffers(cmd, 0, &[self.buffer.handle()], &[0]);
            device.cmd_bind_index_buffer(cmd, self.buffer.handle(), self.index_offset, vk::IndexType::UINT16);
        }
    }

    /// Number of indices uploaded
    pub fn index_count(&self) -> u32 {
        self.index_count
    }

    /// Vertex layout
    pub fn format(&self) -> VertexFormat {
        self.format
    }
}
