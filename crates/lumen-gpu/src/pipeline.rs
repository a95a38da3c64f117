//! Graphics pipelines bound to a render pass subpass.

use crate::error::{GpuError, Result};
use crate::render_pass::{RenderPass, SubpassCounts};
use ash::vk;

/// Graphics pipeline configuration.
#[derive(Clone)]
pub struct GraphicsPipelineConfig {
    pub vertex_shader: Vec<u32>,
    pub fragment_shader: Vec<u32>,
    pub vertex_bindings: Vec<vk::VertexInputBindingDescription>,
    pub vertex_attributes: Vec<vk::VertexInputAttributeDescription>,
    pub topology: vk::PrimitiveTopology,
    pub polygon_mode: vk::PolygonMode,
    pub cull_mode: vk::CullModeFlags,
    pub front_face: vk::FrontFace,
    pub depth_test: bool,
    pub depth_write: bool,
}

impl Default for GraphicsPipelineConfig {
    fn default() -> Self {
        Self {
            vertex_shader: Vec::new(),
            fragment_shader: Vec::new(),
            vertex_bindings: Vec::new(),
            vertex_attributes: Vec::new(),
            topology: vk::PrimitiveTopology::TRIANGLE_LIST,
            polygon_mode: vk::PolygonMode::FILL,
            cull_mode: vk::CullModeFlags::BACK,
            front_face: vk::FrontFace::COUNTER_CLOCKWISE,
            depth_test: true,
            depth_write: true,
        }
    }
}

impl GraphicsPipelineConfig {
    /// Pipeline for a full-screen triangle generated in the vertex shader.
    pub fn full_screen(vertex_shader: Vec<u32>, fragment_shader: Vec<u32>) -> Self {
        Self {
            vertex_shader,
            fragment_shader,
            cull_mode: vk::CullModeFlags::NONE,
            depth_test: false,
            depth_write: false,
            ..Self::default()
        }
    }

    /// Returns true if the pipeline consumes vertex buffers.
    pub fn has_vertex_input(&self) -> bool {
        !self.vertex_bindings.is_empty()
    }
}

/// Per-subpass state derived from a config and the subpass's bindings.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SubpassState {
    pub color_attachments: u32,
    pub depth_test: bool,
    pub depth_write: bool,
}

/// Match a config to a subpass: one blend state per colour output, depth
/// only when the subpass has a depth output.
pub fn resolve_subpass_state(
    config: &GraphicsPipelineConfig,
    counts: SubpassCounts,
) -> Result<SubpassState> {
    if config.vertex_shader.is_empty() || config.fragment_shader.is_empty() {
        return Err(GpuError::PipelineCreation(
            "vertex and fragment shaders are required".to_string(),
        ));
    }
    if counts.colors == 0 && !counts.depth_stencil {
        return Err(GpuError::PipelineCreation(
            "subpass writes no attachments".to_string(),
        ));
    }

    Ok(SubpassState {
        color_attachments: counts.colors,
        depth_test: config.depth_test && counts.depth_stencil,
        depth_write: config.depth_write && counts.depth_stencil,
    })
}

/// Graphics pipeline wrapper.
pub struct GraphicsPipeline {
    pub pipeline: vk::Pipeline,
    pub layout: vk::PipelineLayout,
    pub subpass: u32,
}

impl GraphicsPipeline {
    /// Create a pipeline for `subpass` of `render_pass`.
    ///
    /// # Safety
    /// The device must be valid and shader code must be valid SPIR-V.
    pub unsafe fn new(
        device: &ash::Device,
        config: &GraphicsPipelineConfig,
        render_pass: &RenderPass,
        subpass: u32,
        descriptor_set_layouts: &[vk::DescriptorSetLayout],
        push_constant_ranges: &[vk::PushConstantRange],
    ) -> Result<Self> {
        let counts = render_pass.counts(subpass).ok_or_else(|| {
            GpuError::InvalidRenderGraph(format!(
                "render pass has {} subpasses, pipeline targets subpass {subpass}",
                render_pass.subpass_count()
            ))
        })?;
        let state = resolve_subpass_state(config, counts)?;

        let layout_info = vk::PipelineLayoutCreateInfo::default()
            .set_layouts(descriptor_set_layouts)
            .push_constant_ranges(push_constant_ranges);
        let layout = device
            .create_pipeline_layout(&layout_info, None)
            .map_err(|e| GpuError::PipelineCreation(e.to_string()))?;

        match create_pipeline(device, config, state, render_pass.handle(), subpass, layout) {
            Ok(pipeline) => {
                tracing::debug!(subpass, ?state, "Graphics pipeline created");
                Ok(Self {
                    pipeline,
                    layout,
                    subpass,
                })
            }
            Err(err) => {
                device.destroy_pipeline_layout(layout, None);
                Err(err)
            }
        }
    }

    /// Destroy the pipeline.
    ///
    /// # Safety
    /// The device must be valid and the pipeline must not be in use.
    pub unsafe fn destroy(&self, device: &ash::Device) {
        device.destroy_pipeline(self.pipeline, None);
        device.destroy_pipeline_layout(self.layout, None);
    }
}

unsafe fn create_shader_module(device: &ash::Device, code: &[u32], stage: &str) -> Result<vk::ShaderModule> {
    let info = vk::ShaderModuleCreateInfo::default().code(code);
    device
        .create_shader_module(&info, None)
        .map_err(|e| GpuError::ShaderModule(format!("{stage}: {e}")))
}

unsafe fn create_pipeline(
    device: &ash::Device,
    config: &GraphicsPipelineConfig,
    state: SubpassState,
    render_pass: vk::RenderPass,
    subpass: u32,
    layout: vk::PipelineLayout,
) -> Result<vk::Pipeline> {
    let vert_module = create_shader_module(device, &config.vertex_shader, "vertex")?;
    let frag_module = match create_shader_module(device, &config.fragment_shader, "fragment") {
        Ok(module) => module,
        Err(err) => {
            device.destroy_shader_module(vert_module, None);
            return Err(err);
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

    let vertex_input = vk::PipelineVertexInputStateCreateInfo::default()
        .vertex_binding_descriptions(&config.vertex_bindings)
        .vertex_attribute_descriptions(&config.vertex_attributes);

    let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::default()
        .topology(config.topology)
        .primitive_restart_enable(false);

    // Viewport and scissor are dynamic
    let viewport_state = vk::PipelineViewportStateCreateInfo::default()
        .viewport_count(1)
        .scissor_count(1);

    let rasterization = vk::PipelineRasterizationStateCreateInfo::default()
        .polygon_mode(config.polygon_mode)
        .cull_mode(config.cull_mode)
        .front_face(config.front_face)
        .line_width(1.0);

    let multisampling = vk::PipelineMultisampleStateCreateInfo::default()
        .rasterization_samples(vk::SampleCountFlags::TYPE_1);

    let depth_stencil = vk::PipelineDepthStencilStateCreateInfo::default()
        .depth_test_enable(state.depth_test)
        .depth_write_enable(state.depth_write)
        .depth_compare_op(vk::CompareOp::LESS);

    let color_blend_attachments = vec![
        vk::PipelineColorBlendAttachmentState::default()
            .blend_enable(false)
            .color_write_mask(vk::ColorComponentFlags::RGBA);
        state.color_attachments as usize
    ];
    let color_blending =
        vk::PipelineColorBlendStateCreateInfo::default().attachments(&color_blend_attachments);

    let dynamic_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
    let dynamic_state =
        vk::PipelineDynamicStateCreateInfo::default().dynamic_states(&dynamic_states);

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
        .render_pass(render_pass)
        .subpass(subpass);

    let result =
        device.create_graphics_pipelines(vk::PipelineCache::null(), &[pipeline_info], None);

    device.destroy_shader_module(vert_module, None);
    device.destroy_shader_module(frag_module, None);

    let pipelines = result.map_err(|(_, e)| GpuError::PipelineCreation(e.to_string()))?;
    Ok(pipelines[0])
}
