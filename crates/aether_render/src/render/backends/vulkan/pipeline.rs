//! Shader modules and the pipeline cache
//!
//! Graphics pipelines are created on first use and cached per
//! (shader, vertex format, blend, depth, target kind). Viewport and scissor
//! are dynamic, so resizing never invalidates the cache.
//!
//! Graphics layout: set 0 texture, set 1 lights, 64 bytes of vertex push
//! constants holding the projection-model matrix. Compute layout: set 0
//! lights, set 1 the depth texture.

use std::collections::HashMap;
use std::ffi::CStr;

use ash::{vk, Device};

use super::context::{VulkanError, VulkanResult};
use super::descriptors::Descriptors;
use super::render_pass::{RenderPass, TargetKind};
use crate::render::api::{BlendMode, DepthFunc, DrawUniforms, ShaderId};
use crate::render::vertex::{AttributeFormat, VertexFormat};

const ENTRY_POINT: &CStr = unsafe { CStr::from_bytes_with_nul_unchecked(b"main\0") };

fn create_module(device: &Device, name: &str, code: &[u32]) -> VulkanResult<vk::ShaderModule> {
    if code.is_empty() {
        return Err(VulkanError::InvalidShader { name: name.to_string(), reason: "no SPIR-V".to_string() });
    }
    let create_info = vk::ShaderModuleCreateInfo::builder().code(code);
    unsafe { device.create_shader_module(&create_info, None) }.map_err(|e| VulkanError::InvalidShader {
        name: name.to_string(),
        reason: format!("{:?}", e),
    })
}

/// Vertex and fragment modules of a graphics program
pub struct ShaderProgram {
    device: Device,
    name: String,
    vertex: vk::ShaderModule,
    fragment: vk::ShaderModule,
}

impl ShaderProgram {
    /// Create both modules
    pub fn new(device: Device, name: &str, vertex_spirv: &[u32], fragment_spirv: &[u32]) -> VulkanResult<Self> {
        let vertex = create_module(&device, name, vertex_spirv)?;
        let fragment = match create_module(&device, name, fragment_spirv) {
            Ok(module) => module,
            Err(e) => {
                unsafe { device.destroy_shader_module(vertex, None) };
                return Err(e);
            }
        };
        Ok(Self { device, name: name.to_string(), vertex, fragment })
    }

    /// Debug name
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for ShaderProgram {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_shader_module(self.vertex, None);
            self.device.destroy_shader_module(self.fragment, None);
        }
    }
}

/// Compute program with its pipeline
pub struct ComputeProgram {
    device: Device,
    module: vk::ShaderModule,
    pipeline: vk::Pipeline,
}

impl ComputeProgram {
    /// Create the module and its pipeline on `layout`
    pub fn new(device: Device, name: &str, spirv: &[u32], layout: vk::PipelineLayout) -> VulkanResult<Self> {
        let module = create_module(&device, name, spirv)?;
        let stage = vk::PipelineShaderStageCreateInfo::builder()
            .stage(vk::ShaderStageFlags::COMPUTE)
            .module(module)
            .name(ENTRY_POINT)
            .build();
        let create_info = [vk::ComputePipelineCreateInfo::builder().stage(stage).layout(layout).build()];
        let pipeline = match unsafe { device.create_compute_pipelines(vk::PipelineCache::null(), &create_info, None) } {
            Ok(pipelines) => pipelines[0],
            Err((_, e)) => {
                unsafe { device.destroy_shader_module(module, None) };
                return Err(VulkanError::Api(e));
            }
        };
        Ok(Self { device, module, pipeline })
    }

    /// Get pipeline handle
    pub fn pipeline(&self) -> vk::Pipeline {
        self.pipeline
    }
}

impl Drop for ComputeProgram {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_pipeline(self.pipeline, None);
            self.device.destroy_shader_module(self.module, None);
        }
    }
}

/// Everything that selects a distinct graphics pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PipelineKey {
    /// Graphics program
    pub shader: ShaderId,
    /// Vertex layout
    pub format: VertexFormat,
    /// Blend state
    pub blend: BlendMode,
    /// Depth state
    pub depth: DepthFunc,
    /// Render pass family
    pub target: TargetKind,
}

/// Pipeline layouts plus every graphics pipeline created so far
pub struct PipelineCache {
    device: Device,
    graphics_layout: vk::PipelineLayout,
    compute_layout: vk::PipelineLayout,
    pipelines: HashMap<PipelineKey, vk::Pipeline>,
}

impl PipelineCache {
    /// Create both pipeline layouts
    pub fn new(device: Device, descriptors: &Descriptors) -> VulkanResult<Self> {
        let push_constants = [vk::PushConstantRange {
            stage_flags: vk::ShaderStageFlags::VERTEX,
            offset: 0,
            size: std::mem::size_of::<DrawUniforms>() as u32,
        }];
        let graphics_sets = [descriptors.texture_layout(), descriptors.light_layout()];
        let graphics_info = vk::PipelineLayoutCreateInfo::builder()
            .set_layouts(&graphics_sets)
            .push_constant_ranges(&push_constants);
        let graphics_layout =
            unsafe { device.create_pipeline_layout(&graphics_info, None) }.map_err(VulkanError::Api)?;

        let compute_sets = [descriptors.light_layout(), descriptors.texture_layout()];
        let compute_info = vk::PipelineLayoutCreateInfo::builder().set_layouts(&compute_sets);
        let compute_layout = match unsafe { device.create_pipeline_layout(&compute_info, None) } {
            Ok(layout) => layout,
            Err(e) => {
                unsafe { device.destroy_pipeline_layout(graphics_layout, None) };
                return Err(VulkanError::Api(e));
            }
        };

        Ok(Self { device, graphics_layout, compute_layout, pipelines: HashMap::new() })
    }

    /// Layout of every graphics pipeline
    pub fn graphics_layout(&self) -> vk::PipelineLayout {
        self.graphics_layout
    }

    /// Layout of every compute pipeline
    pub fn compute_layout(&self) -> vk::PipelineLayout {
        self.compute_layout
    }

    /// Number of cached graphics pipelines
    pub fn len(&self) -> usize {
        self.pipelines.len()
    }

    /// Whether no pipeline was created yet
    pub fn is_empty(&self) -> bool {
        self.pipelines.is_empty()
    }

    /// Fetch or build the pipeline for `key`
    pub fn get_or_create(
        &mut self,
        key: PipelineKey,
        program: &ShaderProgram,
        render_pass: &RenderPass,
    ) -> VulkanResult<vk::Pipeline> {
        debug_assert_eq!(render_pass.kind(), key.target);
        if let Some(&pipeline) = self.pipelines.get(&key) {
            return Ok(pipeline);
        }
        let pipeline = self.build(&key, program, render_pass)?;
        log::debug!("Created pipeline for '{}' {:?}", program.name(), key);
        self.pipelines.insert(key, pipeline);
        Ok(pipeline)
    }

    fn build(&self, key: &PipelineKey, program: &ShaderProgram, render_pass: &RenderPass) -> VulkanResult<vk::Pipeline> {
        let stages = [
            vk::PipelineShaderStageCreateInfo::builder()
                .stage(vk::ShaderStageFlags::VERTEX)
                .module(program.vertex)
                .name(ENTRY_POINT)
                .build(),
            vk::PipelineShaderStageCreateInfo::builder()
                .stage(vk::ShaderStageFlags::FRAGMENT)
                .module(program.fragment)
                .name(ENTRY_POINT)
                .build(),
        ];

        let bindings = [vk::VertexInputBindingDescription {
            binding: 0,
            stride: key.format.stride() as u32,
            input_rate: vk::VertexInputRate::VERTEX,
        }];
        let attributes: Vec<vk::VertexInputAttributeDescription> = key
            .format
            .attributes()
            .iter()
            .map(|attribute| vk::VertexInputAttributeDescription {
                location: attribute.location,
                binding: 0,
                format: vk_attribute_format(attribute.format),
                offset: attribute.offset,
            })
            .collect();
        let vertex_input = vk::PipelineVertexInputStateCreateInfo::builder()
            .vertex_binding_descriptions(&bindings)
            .vertex_attribute_descriptions(&attributes);

        let input_assembly =
            vk::PipelineInputAssemblyStateCreateInfo::builder().topology(vk::PrimitiveTopology::TRIANGLE_LIST);
        let viewport = vk::PipelineViewportStateCreateInfo::builder().viewport_count(1).scissor_count(1);
        let rasterization = vk::PipelineRasterizationStateCreateInfo::builder()
            .polygon_mode(vk::PolygonMode::FILL)
            .cull_mode(vk::CullModeFlags::NONE)
            .front_face(vk::FrontFace::COUNTER_CLOCKWISE)
            .line_width(1.0);
        let multisample =
            vk::PipelineMultisampleStateCreateInfo::builder().rasterization_samples(vk::SampleCountFlags::TYPE_1);
        let depth_stencil = depth_state(key.depth);
        let blend_attachments = [blend_state(key.blend)];
        let color_blend = vk::PipelineColorBlendStateCreateInfo::builder().attachments(&blend_attachments);
        let dynamic_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
        let dynamic = vk::PipelineDynamicStateCreateInfo::builder().dynamic_states(&dynamic_states);

        let create_info = [vk::GraphicsPipelineCreateInfo::builder()
            .stages(&stages)
            .vertex_input_state(&vertex_input)
            .input_assembly_state(&input_assembly)
            .viewport_state(&viewport)
            .rasterization_state(&rasterization)
            .multisample_state(&multisample)
            .depth_stencil_state(&depth_stencil)
            .color_blend_state(&color_blend)
            .dynamic_state(&dynamic)
            .layout(self.graphics_layout)
            .render_pass(render_pass.handle())
            .subpass(0)
            .build()];

        unsafe { self.device.create_graphics_pipelines(vk::PipelineCache::null(), &create_info, None) }
            .map(|pipelines| pipelines[0])
            .map_err(|(_, e)| VulkanError::Api(e))
    }
}

impl Drop for PipelineCache {
    fn drop(&mut self) {
        unsafe {
            for (_, pipeline) in self.pipelines.drain() {
                self.device.destroy_pipeline(pipeline, None);
            }
            self.device.destroy_pipeline_layout(self.graphics_layout, None);
            self.device.destroy_pipeline_layout(self.compute_layout, None);
        }
    }
}

fn vk_attribute_format(format: AttributeFormat) -> vk::Format {
    match format {
        AttributeFormat::Float2 => vk::Format::R32G32_SFLOAT,
        AttributeFormat::Float3 => vk::Format::R32G32B32_SFLOAT,
        AttributeFormat::Float4 => vk::Format::R32G32B32A32_SFLOAT,
    }
}

fn depth_state(depth: DepthFunc) -> vk::PipelineDepthStencilStateCreateInfo {
    let (test, write) = match depth {
        DepthFunc::NoneWriteOff => (false, false),
        DepthFunc::LessOrEqualWriteOn => (true, true),
        DepthFunc::LessOrEqualWriteOff => (true, false),
    };
    vk::PipelineDepthStencilStateCreateInfo::builder()
        .depth_test_enable(test)
        .depth_write_enable(write)
        .depth_compare_op(vk::CompareOp::LESS_OR_EQUAL)
        .build()
}

fn blend_state(blend: BlendMode) -> vk::PipelineColorBlendAttachmentState {
    let builder = vk::PipelineColorBlendAttachmentState::builder().color_write_mask(vk::ColorComponentFlags::RGBA);
    match blend {
        BlendMode::Off => builder.blend_enable(false),
        BlendMode::AlphaBlend => builder
            .blend_enable(true)
            .src_color_blend_factor(vk::BlendFactor::SRC_ALPHA)
            .dst_color_blend_factor(vk::BlendFactor::ONE_MINUS_SRC_ALPHA)
            .color_blend_op(vk::BlendOp::ADD)
            .src_alpha_blend_factor(vk::BlendFactor::ONE)
            .dst_alpha_blend_factor(vk::BlendFactor::ONE_MINUS_SRC_ALPHA)
            .alpha_blend_op(vk::BlendOp::ADD),
        BlendMode::Additive => builder
            .blend_enable(true)
            .src_color_blend_factor(vk::BlendFactor::ONE)
            .dst_color_blend_factor(vk::BlendFactor::ONE)
            .color_blend_op(vk::BlendOp::ADD)
            .src_alpha_blend_factor(vk::BlendFactor::ONE)
            .dst_alpha_blend_factor(vk::BlendFactor::ONE)
            .alpha_blend_op(vk::BlendOp::ADD),
    }
    .build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_depth_states() {
        let off = depth_state(DepthFunc::NoneWriteOff);
        assert_eq!((off.depth_test_enable, off.depth_write_enable), (vk::FALSE, vk::FALSE));
        let on = depth_state(DepthFunc::LessOrEqualWriteOn);
        assert_eq!((on.depth_test_enable, on.depth_write_enable), (vk::TRUE, vk::TRUE));
        let read_only = depth_state(DepthFunc::LessOrEqualWriteOff);
        assert_eq!((read_only.depth_test_enable, read_only.depth_write_enable), (vk::TRUE, vk::FALSE));
    }

    #[test]
    fn test_blend_states() {
        assert_eq!(blend_state(BlendMode::Off).blend_enable, vk::FALSE);
        let alpha = blend_state(BlendMode::AlphaBlend);
        assert_eq!(alpha.src_color_blend_factor, vk::BlendFactor::SRC_ALPHA);
        assert_eq!(alpha.dst_color_blend_factor, vk::BlendFactor::ONE_MINUS_SRC_ALPHA);
        let additive = blend_state(BlendMode::Additive);
        assert_eq!(additive.dst_color_blend_factor, vk::BlendFactor::ONE);
    }

    #[test]
    fn test_attribute_formats() {
        assert_eq!(vk_attribute_format(AttributeFormat::Float3), vk::Format::R32G32B32_SFLOAT);
        assert_eq!(vk_attribute_format(AttributeFormat::Float4), vk::Format::R32G32B32A32_SFLOAT);
    }

    #[test]
    fn test_push_constants_fit_minimum_limit() {
        assert!(std::mem::size_of::<DrawUniforms>() <= 128);
    }
}
