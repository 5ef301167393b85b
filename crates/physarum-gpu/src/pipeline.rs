//! Pipeline creation.

use crate::error::{GpuError, Result};
use ash::vk;

/// Compute pipeline and its layout.
#[derive(Debug, Clone, Copy)]
pub struct ComputePipeline {
    pub pipeline: vk::Pipeline,
    pub layout: vk::PipelineLayout,
}

unsafe fn create_shader_module(
    device: &ash::Device,
    code: &[u32],
    stage: &str,
) -> Result<vk::ShaderModule> {
    let info = vk::ShaderModuleCreateInfo::default().code(code);
    device
        .create_shader_module(&info, None)
        .map_err(|e| GpuError::ShaderModule(format!("{stage}: {e}")))
}

unsafe fn create_layout(
    device: &ash::Device,
    set_layouts: &[vk::DescriptorSetLayout],
    push_constant_ranges: &[vk::PushConstantRange],
) -> Result<vk::PipelineLayout> {
    let layout_info = vk::PipelineLayoutCreateInfo::default()
        .set_layouts(set_layouts)
        .push_constant_ranges(push_constant_ranges);

    device
        .create_pipeline_layout(&layout_info, None)
        .map_err(|e| GpuError::PipelineCreation(format!("layout: {e}")))
}

impl ComputePipeline {
    /// Create a compute pipeline from SPIR-V.
    ///
    /// # Safety
    /// The device must be valid and the shader code must be valid SPIR-V.
    pub unsafe fn new(
        device: &ash::Device,
        shader_code: &[u32],
        set_layouts: &[vk::DescriptorSetLayout],
        push_constant_ranges: &[vk::PushConstantRange],
    ) -> Result<Self> {
        let module = create_shader_module(device, shader_code, "compute")?;
        let layout = match create_layout(device, set_layouts, push_constant_ranges) {
            Ok(layout) => layout,
            Err(e) => {
                device.destroy_shader_module(module, None);
                return Err(e);
            }
        };

        let stage_info = vk::PipelineShaderStageCreateInfo::default()
            .stage(vk::ShaderStageFlags::COMPUTE)
            .module(module)
            .name(c"main");

        let pipeline_info = vk::ComputePipelineCreateInfo::default()
            .stage(stage_info)
            .layout(layout);

        let created =
            device.create_compute_pipelines(vk::PipelineCache::null(), &[pipeline_info], None);
        device.destroy_shader_module(module, None);

        match created {
            Ok(pipelines) => Ok(Self {
                pipeline: pipelines[0],
                layout,
            }),
            Err((_, e)) => {
                device.destroy_pipeline_layout(layout, None);
                Err(GpuError::PipelineCreation(format!("compute: {e}")))
            }
        }
    }
}

/// Graphics pipeline configuration.
///
/// Pipelines render with dynamic rendering, so only attachment formats are
/// needed rather than a render pass object.
#[derive(Clone)]
pub struct GraphicsPipelineConfig<'a> {
    pub vertex_shader: &'a [u32],
    pub fragment_shader: &'a [u32],
    pub topology: vk::PrimitiveTopology,
    pub cull_mode: vk::CullModeFlags,
    pub front_face: vk::FrontFace,
    pub color_format: vk::Format,
}

impl<'a> GraphicsPipelineConfig<'a> {
    /// Attribute-less triangle list with no culling, drawing into one color attachment.
    pub const fn fullscreen(
        vertex_shader: &'a [u32],
        fragment_shader: &'a [u32],
        color_format: vk::Format,
    ) -> Self {
        Self {
            vertex_shader,
            fragment_shader,
            topology: vk::PrimitiveTopology::TRIANGLE_LIST,
            cull_mode: vk::CullModeFlags::NONE,
            front_face: vk::FrontFace::COUNTER_CLOCKWISE,
            color_format,
        }
    }
}

/// Graphics pipeline and its layout.
#[derive(Debug, Clone, Copy)]
pub struct GraphicsPipeline {
    pub pipeline: vk::Pipeline,
    pub layout: vk::PipelineLayout,
}

impl GraphicsPipeline {
    /// Create a graphics pipeline using dynamic rendering (Vulkan 1.3).
    ///
    /// Viewport and scissor are dynamic state.
    ///
    /// # Safety
    /// The device must be valid and shader code must be valid SPIR-V.
    pub unsafe fn new(
        device: &ash::Device,
        config: &GraphicsPipelineConfig<'_>,
        set_layouts: &[vk::DescriptorSetLayout],
        push_constant_ranges: &[vk::PushConstantRange],
    ) -> Result<Self> {
        let vert_module = create_shader_module(device, config.vertex_shader, "vertex")?;
        let frag_module = match create_shader_module(device, config.fragment_shader, "fragment") {
            Ok(module) => module,
            Err(e) => {
                device.destroy_shader_module(vert_module, None);
                return Err(e);
            }
        };
        let destroy_modules = || {
            device.destroy_shader_module(vert_module, None);
            device.destroy_shader_module(frag_module, None);
        };

        let layout = match create_layout(device, set_layouts, push_constant_ranges) {
            Ok(layout) => layout,
            Err(e) => {
                destroy_modules();
                return Err(e);
            }
        };

        let shader_stages = [
            vk::PipelineShaderStageCreateInfo::default()
                .stage(vk::ShaderStageFlags::VERTEX)
                .module(vert_module)
                .name(c"main"),
            vk::PipelineShaderStageCreateInfo::default()
                .stage(vk::ShaderStageFlags::FRAGMENT)
                .module(frag_module)
                .name(c"main"),
        ];

        let vertex_input = vk::PipelineVertexInputStateCreateInfo::default();

        let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::default()
            .topology(config.topology)
            .primitive_restart_enable(false);

        let viewport_state = vk::PipelineViewportStateCreateInfo::default()
            .viewport_count(1)
            .scissor_count(1);

        let rasterization = vk::PipelineRasterizationStateCreateInfo::default()
            .polygon_mode(vk::PolygonMode::FILL)
            .cull_mode(config.cull_mode)
            .front_face(config.front_face)
            .line_width(1.0);

        let multisampling = vk::PipelineMultisampleStateCreateInfo::default()
            .rasterization_samples(vk::SampleCountFlags::TYPE_1);

        let depth_stencil = vk::PipelineDepthStencilStateCreateInfo::default()
            .depth_test_enable(false)
            .depth_write_enable(false);

        let color_blend_attachment = vk::PipelineColorBlendAttachmentState::default()
            .blend_enable(false)
            .color_write_mask(vk::ColorComponentFlags::RGBA);

        let color_blending = vk::PipelineColorBlendStateCreateInfo::default()
            .attachments(std::slice::from_ref(&color_blend_attachment));

        let dynamic_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
        let dynamic_state =
            vk::PipelineDynamicStateCreateInfo::default().dynamic_states(&dynamic_states);

        let mut rendering_info = vk::PipelineRenderingCreateInfo::default()
            .color_attachment_formats(std::slice::from_ref(&config.color_format));

        let pipeline_info = vk::GraphicsPipelineCreateInfo::default()
            .stages(&shader_stages)
            .vertex_input_state(&vertex_input)
            .input_assembly_state(&input_assembly)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterization)
            .multisample_state(&multisampling)
            .depth_stencil_state(&depth_stencil)
            .color_blend_state(&color_blending)
            .dynamic_state(&dynamic_state)
            .layout(layout)
            .push_next(&mut rendering_info);

        let created =
            device.create_graphics_pipelines(vk::PipelineCache::null(), &[pipeline_info], None);
        destroy_modules();

        match created {
            Ok(pipelines) => Ok(Self {
                pipeline: pipelines[0],
                layout,
            }),
            Err((_, e)) => {
                device.destroy_pipeline_layout(layout, None);
                Err(GpuError::PipelineCreation(format!("graphics: {e}")))
            }
        }
    }
}
