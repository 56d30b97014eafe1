//! GPU light storage and the tile culling dispatch
//!
//! Light arrays are host-visible storage buffers sized for [`MAX_LIGHTS`].
//! The tile list buffer holds `TILE_LIST_STRIDE` entries per tile in the same
//! `[points.., SENTINEL, spots.., SENTINEL]` layout the CPU culler produces.
//! Culling parameters are written with `vkCmdUpdateBuffer`, so several
//! dispatches recorded in one frame each see their own camera.

use ash::{vk, Device};
use bytemuck::{Pod, Zeroable};

use super::buffer::Buffer;
use super::commands::buffer_barrier;
use super::context::{PhysicalDeviceInfo, VulkanResult};
use super::descriptors::{Descriptors, CULL_UNIFORM_BINDING};
use crate::foundation::math::to_column_major;
use crate::render::api::{LightBuffers, LightCullDispatch};
use crate::render::lighting::{LightTiler, MAX_LIGHTS, SENTINEL, TILE_LIST_STRIDE, TILE_RES};

/// Culling parameters as the compute shader reads them
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct CullUniforms {
    /// Column-major projection
    pub projection: [f32; 16],
    /// Column-major view
    pub view: [f32; 16],
    /// width, height, point count, spot count
    pub screen_and_counts: [u32; 4],
    /// tiles x, tiles y, depth bounds enabled, unused
    pub tiles_and_flags: [u32; 4],
}

/// Storage for lights, tile lists and culling parameters
pub struct LightCulling {
    device: Device,
    arrays: [Buffer; 5],
    tile_lists: Buffer,
    uniforms: Buffer,
    set: vk::DescriptorSet,
    tiles: (u32, u32),
    point_count: u32,
    spot_count: u32,
}

impl LightCulling {
    /// Allocate buffers for a `width` x `height` surface and write the light set
    pub fn new(
        device: Device,
        physical: &PhysicalDeviceInfo,
        descriptors: &Descriptors,
        width: u32,
        height: u32,
    ) -> VulkanResult<Self> {
        let array_size = (MAX_LIGHTS * std::mem::size_of::<[f32; 4]>()) as vk::DeviceSize;
        let storage = vk::BufferUsageFlags::STORAGE_BUFFER;
        let arrays = [
            Buffer::host_visible(device.clone(), physical, array_size, storage)?,
            Buffer::host_visible(device.clone(), physical, array_size, storage)?,
            Buffer::host_visible(device.clone(), physical, array_size, storage)?,
            Buffer::host_visible(device.clone(), physical, array_size, storage)?,
            Buffer::host_visible(device.clone(), physical, array_size, storage)?,
        ];
        let uniforms = Buffer::new(
            device.clone(),
            physical,
            std::mem::size_of::<CullUniforms>() as vk::DeviceSize,
            vk::BufferUsageFlags::UNIFORM_BUFFER | vk::BufferUsageFlags::TRANSFER_DST,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
        )?;
        let tiles = tile_counts(width, height);
        let tile_lists = create_tile_lists(&device, physical, tiles)?;
        let set = descriptors.light_set()?;

        let this = Self { device, arrays, tile_lists, uniforms, set, tiles, point_count: 0, spot_count: 0 };
        this.write_descriptors();
        Ok(this)
    }

    fn write_descriptors(&self) {
        let buffer_infos: Vec<[vk::DescriptorBufferInfo; 1]> = self
            .arrays
            .iter()
            .chain(std::iter::once(&self.tile_lists))
            .map(|buffer| [vk::DescriptorBufferInfo { buffer: buffer.handle(), offset: 0, range: vk::WHOLE_SIZE }])
            .collect();
        let uniform_info = [vk::DescriptorBufferInfo {
            buffer: self.uniforms.handle(),
            offset: 0,
            range: vk::WHOLE_SIZE,
        }];

        let mut writes: Vec<vk::WriteDescriptorSet> = buffer_infos
            .iter()
            .enumerate()
            .map(|(binding, info)| {
                vk::WriteDescriptorSet::builder()
                    .dst_set(self.set)
                    .dst_binding(binding as u32)
                    .descriptor_type(vk::DescriptorType::STORAGE_BUFFER)
                    .buffer_info(info)
                    .build()
            })
            .collect();
        writes.push(
            vk::WriteDescriptorSet::builder()
                .dst_set(self.set)
                .dst_binding(CULL_UNIFORM_BINDING)
                .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
                .buffer_info(&uniform_info)
                .build(),
        );

        unsafe { self.device.update_descriptor_sets(&writes, &[]) };
    }

    /// Recreate the tile list buffer for a new surface size.
    ///
    /// Must not run while a frame referencing the light set is recorded.
    pub fn resize(&mut self, physical: &PhysicalDeviceInfo, width: u32, height: u32) -> VulkanResult<()> {
        let tiles = tile_counts(width, height);
        if tiles == self.tiles {
            return Ok(());
        }
        self.tile_lists = create_tile_lists(&self.device, physical, tiles)?;
        self.tiles = tiles;
        self.write_descriptors();
        log::debug!("Tile grid resized to {}x{}", tiles.0, tiles.1);
        Ok(())
    }

    /// Copy the active light prefix into the storage buffers.
    ///
    /// The copy is immediate, so every dispatch recorded in the current frame
    /// reads the last upload.
    pub fn upload(&mut self, lights: &LightBuffers<'_>) -> VulkanResult<()> {
        assert!(lights.point_count() <= MAX_LIGHTS && lights.spot_count() <= MAX_LIGHTS);
        let sources = [
            lights.point_center_and_radius,
            lights.point_colors,
            lights.spot_center_and_radius,
            lights.spot_params,
            lights.spot_colors,
        ];
        for (buffer, data) in self.arrays.iter().zip(sources) {
            buffer.write(0, data)?;
        }
        self.point_count = lights.point_count() as u32;
        self.spot_count = lights.spot_count() as u32;
        Ok(())
    }

    /// The light set, bound as set 1 by graphics and set 0 by compute
    pub fn descriptor_set(&self) -> vk::DescriptorSet {
        self.set
    }

    /// Tiles across and down
    pub fn tiles(&self) -> (u32, u32) {
        self.tiles
    }

    /// Record the parameter update, the dispatch and the barrier that makes
    /// the lists visible to fragment shaders. Must be recorded outside a pass.
    pub fn record_dispatch(
        &self,
        cmd: vk::CommandBuffer,
        pipeline: vk::Pipeline,
        layout: vk::PipelineLayout,
        depth_set: vk::DescriptorSet,
        dispatch: &LightCullDispatch,
    ) {
        let wanted = (LightTiler::num_tiles_x(dispatch.width), LightTiler::num_tiles_y(dispatch.height));
        let tiles_x = wanted.0.min(self.tiles.0);
        let tiles_y = wanted.1.min(self.tiles.1);
        if (tiles_x, tiles_y) != wanted {
            log::warn!(
                "Culling {}x{} tiles clamped to the {}x{} surface grid",
                wanted.0,
                wanted.1,
                self.tiles.0,
                self.tiles.1
            );
        }
        let uniforms = CullUniforms {
            projection: to_column_major(&dispatch.projection),
            view: to_column_major(&dispatch.view),
            screen_and_counts: [dispatch.width, dispatch.height, self.point_count, self.spot_count],
            tiles_and_flags: [tiles_x, tiles_y, u32::from(dispatch.depth_normal_target.is_some()), 0],
        };

        let device = &self.device;
        let shader_stages = vk::PipelineStageFlags::FRAGMENT_SHADER | vk::PipelineStageFlags::COMPUTE_SHADER;
        unsafe {
            // Earlier dispatches and draws of this frame may still read the parameters.
            buffer_barrier(
                device,
                cmd,
                self.uniforms.handle(),
                (shader_stages, vk::AccessFlags::UNIFORM_READ),
                (vk::PipelineStageFlags::TRANSFER, vk::AccessFlags::TRANSFER_WRITE),
            );
            device.cmd_update_buffer(cmd, self.uniforms.handle(), 0, bytemuck::bytes_of(&uniforms));
            buffer_barrier(
                device,
                cmd,
                self.uniforms.handle(),
                (vk::PipelineStageFlags::TRANSFER, vk::AccessFlags::TRANSFER_WRITE),
                (vk::PipelineStageFlags::COMPUTE_SHADER, vk::AccessFlags::UNIFORM_READ),
            );
            buffer_barrier(
                device,
                cmd,
                self.tile_lists.handle(),
                (vk::PipelineStageFlags::FRAGMENT_SHADER, vk::AccessFlags::SHADER_READ),
                (vk::PipelineStageFlags::COMPUTE_SHADER, vk::AccessFlags::SHADER_WRITE),
            );

            device.cmd_bind_pipeline(cmd, vk::PipelineBindPoint::COMPUTE, pipeline);
            device.cmd_bind_descriptor_sets(
                cmd,
                vk::PipelineBindPoint::COMPUTE,
                layout,
                0,
                &[self.set, depth_set],
                &[],
            );
            device.cmd_dispatch(cmd, tiles_x, tiles_y, 1);

            buffer_barrier(
                device,
                cmd,
                self.tile_lists.handle(),
                (vk::PipelineStageFlags::COMPUTE_SHADER, vk::AccessFlags::SHADER_WRITE),
                (vk::PipelineStageFlags::FRAGMENT_SHADER, vk::AccessFlags::SHADER_READ),
            );
        }
    }
}

/// Tile grid covering a `width` x `height` surface
pub fn tile_counts(width: u32, height: u32) -> (u32, u32) {
    (LightTiler::num_tiles_x(width).max(1), LightTiler::num_tiles_y(height).max(1))
}

fn create_tile_lists(device: &Device, physical: &PhysicalDeviceInfo, tiles: (u32, u32)) -> VulkanResult<Buffer> {
    let entries = tiles.0 as usize * tiles.1 as usize * TILE_LIST_STRIDE;
    let buffer = Buffer::host_visible(
        device.clone(),
        physical,
        (entries * std::mem::size_of::<u32>()) as vk::DeviceSize,
        vk::BufferUsageFlags::STORAGE_BUFFER,
    )?;
    // Empty lists until the first dispatch.
    buffer.write(0, &vec![SENTINEL; entries])?;
    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tile_counts_round_up() {
        assert_eq!(tile_counts(1280, 720), (80, 45));
        assert_eq!(tile_counts(1281, 721), (81, 46));
        assert_eq!(tile_counts(0, 0), (1, 1));
        assert_eq!(TILE_RES, 16);
    }

    #[test]
    fn test_uniform_layout() {
        assert_eq!(std::mem::size_of::<CullUniforms>(), 160);
        // vkCmdUpdateBuffer needs a multiple of four bytes.
        assert_eq!(std::mem::size_of::<CullUniforms>() % 4, 0);
    }
}
