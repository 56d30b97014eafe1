//! Descriptor set layouts and allocation
//!
//! Two layouts cover every shader:
//!
//! - texture set: binding 0, combined image sampler (fragment and compute)
//! - light set: bindings 0-4 light arrays, 5 tile lists, 6 culling
//!   parameters (fragment and compute)
//!
//! Every texture owns one texture set for its whole life. There is a single
//! light set.

use ash::{vk, Device};

use super::context::{VulkanError, VulkanResult};

/// Upper bound on live textures
pub const MAX_TEXTURES: u32 = 1024;

/// Storage buffer bindings of the light set, in binding order
pub const LIGHT_STORAGE_BINDINGS: u32 = 6;

/// Binding of the culling parameter uniform
pub const CULL_UNIFORM_BINDING: u32 = 6;

/// Layouts and the pool every set is allocated from
pub struct Descriptors {
    device: Device,
    pool: vk::DescriptorPool,
    texture_layout: vk::DescriptorSetLayout,
    light_layout: vk::DescriptorSetLayout,
}

impl Descriptors {
    /// Create both layouts and a pool sized for [`MAX_TEXTURES`]
    pub fn new(device: Device) -> VulkanResult<Self> {
        let stages = vk::ShaderStageFlags::FRAGMENT | vk::ShaderStageFlags::COMPUTE;

        let texture_bindings = [vk::DescriptorSetLayoutBinding::builder()
            .binding(0)
            .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
            .descriptor_count(1)
            .stage_flags(stages)
            .build()];
        let texture_layout = create_layout(&device, &texture_bindings)?;

        let mut light_bindings: Vec<vk::DescriptorSetLayoutBinding> = (0..LIGHT_STORAGE_BINDINGS)
            .map(|binding| {
                vk::DescriptorSetLayoutBinding::builder()
                    .binding(binding)
                    .descriptor_type(vk::DescriptorType::STORAGE_BUFFER)
                    .descriptor_count(1)
                    .stage_flags(stages)
                    .build()
            })
            .collect();
        light_bindings.push(
            vk::DescriptorSetLayoutBinding::builder()
                .binding(CULL_UNIFORM_BINDING)
                .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
                .descriptor_count(1)
                .stage_flags(stages)
                .build(),
        );
        let light_layout = match create_layout(&device, &light_bindings) {
            Ok(layout) => layout,
            Err(e) => {
                unsafe { device.destroy_descriptor_set_layout(texture_layout, None) };
                return Err(e);
            }
        };

        let pool_sizes = [
            vk::DescriptorPoolSize {
                ty: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
                descriptor_count: MAX_TEXTURES,
            },
            vk::DescriptorPoolSize {
                ty: vk::DescriptorType::STORAGE_BUFFER,
                descriptor_count: LIGHT_STORAGE_BINDINGS,
            },
            vk::DescriptorPoolSize {
                ty: vk::DescriptorType::UNIFORM_BUFFER,
                descriptor_count: 1,
            },
        ];
        let pool_info = vk::DescriptorPoolCreateInfo::builder()
            .flags(vk::DescriptorPoolCreateFlags::FREE_DESCRIPTOR_SET)
            .max_sets(MAX_TEXTURES + 1)
            .pool_sizes(&pool_sizes);
        let pool = match unsafe { device.create_descriptor_pool(&pool_info, None) } {
            Ok(pool) => pool,
            Err(e) => {
                unsafe {
                    device.destroy_descriptor_set_layout(texture_layout, None);
                    device.destroy_descriptor_set_layout(light_layout, None);
                }
                return Err(VulkanError::Api(e));
            }
        };

        Ok(Self { device, pool, texture_layout, light_layout })
    }

    /// Layout of per-texture sets
    pub fn texture_layout(&self) -> vk::DescriptorSetLayout {
        self.texture_layout
    }

    /// Layout of the light set
    pub fn light_layout(&self) -> vk::DescriptorSetLayout {
        self.light_layout
    }

    fn allocate(&self, layout: vk::DescriptorSetLayout) -> VulkanResult<vk::DescriptorSet> {
        let layouts = [layout];
        let alloc_info = vk::DescriptorSetAllocateInfo::builder()
            .descriptor_pool(self.pool)
            .set_layouts(&layouts);
        let sets = unsafe { self.device.allocate_descriptor_sets(&alloc_info) }.map_err(VulkanError::Api)?;
        Ok(sets[0])
    }

    /// Allocate a texture set pointing at `view`
    pub fn texture_binding(
        &self,
        view: vk::ImageView,
        sampler: vk::Sampler,
    ) -> VulkanResult<TextureBinding> {
        let set = self.allocate(self.texture_layout)?;
        let image_info = [vk::DescriptorImageInfo {
            sampler,
            image_view: view,
            image_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        }];
        let write = vk::WriteDescriptorSet::builder()
            .dst_set(set)
            .dst_binding(0)
            .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
            .image_info(&image_info)
            .build();
        unsafe { self.device.update_descriptor_sets(&[write], &[]) };

        Ok(TextureBinding { device: self.device.clone(), pool: self.pool, set })
    }

    /// Allocate the light set. It lives as long as the pool.
    pub fn light_set(&self) -> VulkanResult<vk::DescriptorSet> {
        self.allocate(self.light_layout)
    }
}

impl Drop for Descriptors {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_descriptor_pool(self.pool, None);
            self.device.destroy_descriptor_set_layout(self.texture_layout, None);
            self.device.destroy_descriptor_set_layout(self.light_layout, None);
        }
    }
}

fn create_layout(device: &Device, bindings: &[vk::DescriptorSetLayoutBinding]) -> VulkanResult<vk::DescriptorSetLayout> {
    let create_info = vk::DescriptorSetLayoutCreateInfo::builder().bindings(bindings);
    unsafe { device.create_descriptor_set_layout(&create_info, None) }.map_err(VulkanError::Api)
}

/// A texture's descriptor set, returned to the pool on drop
pub struct TextureBinding {
    device: Device,
    pool: vk::DescriptorPool,
    set: vk::DescriptorSet,
}

impl TextureBinding {
    /// Get descriptor set handle
    pub fn handle(&self) -> vk::DescriptorSet {
        self.set
    }
}

impl Drop for TextureBinding {
    fn drop(&mut self) {
        unsafe {
            let _ = self.device.free_descriptor_sets(self.pool, &[self.set]);
        }
    }
}
