use {
    crate::{
        HandleRegistry, PipelineHandle, PipelineLayoutHandle,
        RenderPassHandle, ShaderModuleHandle, VkalError,
    },
    anyhow::anyhow,
    ash::vk,
};

/// A registered shader module bound to one pipeline stage.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ShaderStage {
    pub module: ShaderModuleHandle,
    pub stage: vk::ShaderStageFlags,
}

impl ShaderStage {
    pub fn vertex(module: ShaderModuleHandle) -> Self {
        Self {
            module,
            stage: vk::ShaderStageFlags::VERTEX,
        }
    }

    pub fn fragment(module: ShaderModuleHandle) -> Self {
        Self {
            module,
            stage: vk::ShaderStageFlags::FRAGMENT,
        }
    }
}

/// Fixed-function state and shaders for a graphics pipeline.
///
/// Viewport and scissor are always dynamic so pipelines survive swapchain
/// recreation.
#[derive(Debug, Clone)]
pub struct GraphicsPipelineDesc {
    pub vertex_bindings: Vec<vk::VertexInputBindingDescription>,
    pub vertex_attributes: Vec<vk::VertexInputAttributeDescription>,
    pub stages: Vec<ShaderStage>,
    pub depth_test_enable: bool,
    pub depth_write_enable: bool,
    pub depth_compare_op: vk::CompareOp,
    pub cull_mode: vk::CullModeFlags,
    pub polygon_mode: vk::PolygonMode,
    pub topology: vk::PrimitiveTopology,
    pub front_face: vk::FrontFace,
    pub blend_enable: bool,
    pub render_pass: RenderPassHandle,
    pub subpass: u32,
    pub layout: PipelineLayoutHandle,
}

impl GraphicsPipelineDesc {
    /// Depth tested, back-face culled, filled triangle lists without
    /// blending.
    pub fn new(
        stages: Vec<ShaderStage>,
        render_pass: RenderPassHandle,
        layout: PipelineLayoutHandle,
    ) -> Self {
        Self {
            vertex_bindings: Vec::new(),
            vertex_attributes: Vec::new(),
            stages,
            depth_test_enable: true,
            depth_write_enable: true,
            depth_compare_op: vk::CompareOp::LESS,
            cull_mode: vk::CullModeFlags::BACK,
            polygon_mode: vk::PolygonMode::FILL,
            topology: vk::PrimitiveTopology::TRIANGLE_LIST,
            front_face: vk::FrontFace::COUNTER_CLOCKWISE,
            blend_enable: false,
            render_pass,
            subpass: 0,
            layout,
        }
    }

    /// Check the parts of the description which only reference each other.
    pub fn validate(&self) -> Result<(), VkalError> {
        let has_vertex_stage = self
            .stages
            .iter()
            .any(|s| s.stage == vk::ShaderStageFlags::VERTEX);
        if !has_vertex_stage {
            return Err(
                anyhow!("Graphics pipelines need a vertex stage").into()
            );
        }
        for (index, stage) in self.stages.iter().enumerate() {
            if self.stages[..index].iter().any(|s| s.stage == stage.stage) {
                return Err(
                    anyhow!("Stage {:?} is given twice", stage.stage).into()
                );
            }
        }
        for attribute in &self.vertex_attributes {
            let bound = self
                .vertex_bindings
                .iter()
                .any(|binding| binding.binding == attribute.binding);
            if !bound {
                return Err(anyhow!(
                    "Attribute at location {} reads unknown binding {}",
                    attribute.location,
                    attribute.binding
                )
                .into());
            }
        }
        Ok(())
    }
}

/// Build one graphics pipeline and register it.
///
/// # Safety
///
/// The pipeline must be destroyed before the device.
pub unsafe fn create_graphics_pipeline(
    device: &ash::Device,
    registry: &mut HandleRegistry,
    desc: &GraphicsPipelineDesc,
) -> Result<PipelineHandle, VkalError> {
    desc.validate()?;

    let entry = c"main";
    let stages = desc
        .stages
        .iter()
        .map(|stage| {
            Ok(vk::PipelineShaderStageCreateInfo::default()
                .stage(stage.stage)
                .module(*registry.shader_modules.get(stage.module)?)
                .name(entry))
        })
        .collect::<Result<Vec<_>, VkalError>>()?;

    let vertex_input = vk::PipelineVertexInputStateCreateInfo::default()
        .vertex_binding_descriptions(&desc.vertex_bindings)
        .vertex_attribute_descriptions(&desc.vertex_attributes);
    let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::default()
        .topology(desc.topology)
        .primitive_restart_enable(false);
    let viewport_state = vk::PipelineViewportStateCreateInfo::default()
        .viewport_count(1)
        .scissor_count(1);
    let rasterizer = vk::PipelineRasterizationStateCreateInfo::default()
        .depth_clamp_enable(false)
        .rasterizer_discard_enable(false)
        .polygon_mode(desc.polygon_mode)
        .line_width(1.0)
        .cull_mode(desc.cull_mode)
        .front_face(desc.front_face)
        .depth_bias_enable(false);
    let multisampling = vk::PipelineMultisampleStateCreateInfo::default()
        .sample_shading_enable(false)
        .rasterization_samples(vk::SampleCountFlags::TYPE_1);
    let depth_stencil = vk::PipelineDepthStencilStateCreateInfo::default()
        .depth_test_enable(desc.depth_test_enable)
        .depth_write_enable(desc.depth_write_enable)
        .depth_compare_op(desc.depth_compare_op)
        .depth_bounds_test_enable(false)
        .stencil_test_enable(false);
    let blend_attachments = [vk::PipelineColorBlendAttachmentState::default()
        .color_write_mask(vk::ColorComponentFlags::RGBA)
        .blend_enable(desc.blend_enable)
        .src_color_blend_factor(vk::BlendFactor::SRC_ALPHA)
        .dst_color_blend_factor(vk::BlendFactor::ONE_MINUS_SRC_ALPHA)
        .color_blend_op(vk::BlendOp::ADD)
        .src_alpha_blend_factor(vk::BlendFactor::ONE)
        .dst_alpha_blend_factor(vk::BlendFactor::ZERO)
        .alpha_blend_op(vk::BlendOp::ADD)];
    let color_blending = vk::PipelineColorBlendStateCreateInfo::default()
        .logic_op_enable(false)
        .attachments(&blend_attachments);
    let dynamic_states =
        [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
    let dynamic_state = vk::PipelineDynamicStateCreateInfo::default()
        .dynamic_states(&dynamic_states);

    let create_info = vk::GraphicsPipelineCreateInfo::default()
        .stages(&stages)
        .vertex_input_state(&vertex_input)
        .input_assembly_state(&input_assembly)
        .viewport_state(&viewport_state)
        .rasterization_state(&rasterizer)
        .multisample_state(&multisampling)
        .depth_stencil_state(&depth_stencil)
        .color_blend_state(&color_blending)
        .dynamic_state(&dynamic_state)
        .layout(*registry.pipeline_layouts.get(desc.layout)?)
        .render_pass(*registry.render_passes.get(desc.render_pass)?)
        .subpass(desc.subpass);

    let pipeline = device
        .create_graphics_pipelines(
            vk::PipelineCache::null(),
            &[create_info],
            None,
        )
        .map_err(|(_, err)| VkalError::from_vk(err))?
        .into_iter()
        .next()
        .ok_or_else(|| anyhow!("No pipeline was returned"))?;
    let handle = registry.pipelines.insert(pipeline).map_err(|err| {
        device.destroy_pipeline(pipeline, None);
        err
    })?;
    log::debug!(
        "Created graphics pipeline {:?} with {} stages",
        handle,
        desc.stages.len()
    );
    Ok(handle)
}

#[cfg(test)]
mod test {
    use {super::*, crate::SlotTable};

    fn handles() -> (
        ShaderModuleHandle,
        ShaderModuleHandle,
        RenderPassHandle,
        PipelineLayoutHandle,
    ) {
        let mut modules = SlotTable::new("shader module", 4);
        let mut passes = SlotTable::new("render pass", 1);
        let mut layouts = SlotTable::new("pipeline layout", 1);
        (
            modules.insert(vk::ShaderModule::null()).unwrap(),
            modules.insert(vk::ShaderModule::null()).unwrap(),
            passes.insert(vk::RenderPass::null()).unwrap(),
            layouts.insert(vk::PipelineLayout::null()).unwrap(),
        )
    }

    #[test]
    fn defaults_describe_depth_tested_triangles() {
        let (vertex, fragment, pass, layout) = handles();
        let desc = GraphicsPipelineDesc::new(
            vec![ShaderStage::vertex(vertex), ShaderStage::fragment(fragment)],
            pass,
            layout,
        );
        assert!(desc.validate().is_ok());
        assert!(desc.depth_test_enable);
        assert_eq!(desc.topology, vk::PrimitiveTopology::TRIANGLE_LIST);
    }

    #[test]
    fn a_vertex_stage_is_required() {
        let (_, fragment, pass, layout) = handles();
        let desc = GraphicsPipelineDesc::new(
            vec![ShaderStage::fragment(fragment)],
            pass,
            layout,
        );
        assert!(desc.validate().is_err());
    }

    #[test]
    fn stages_may_not_repeat() {
        let (vertex, other, pass, layout) = handles();
        let desc = GraphicsPipelineDesc::new(
            vec![ShaderStage::vertex(vertex), ShaderStage::vertex(other)],
            pass,
            layout,
        );
        assert!(desc.validate().is_err());
    }

    #[test]
    fn attributes_must_reference_a_binding() {
        let (vertex, _, pass, layout) = handles();
        let mut desc = GraphicsPipelineDesc::new(
            vec![ShaderStage::vertex(vertex)],
            pass,
            layout,
        );
        desc.vertex_attributes.push(vk::VertexInputAttributeDescription {
            location: 0,
            binding: 1,
            format: vk::Format::R32G32B32_SFLOAT,
            offset: 0,
        });
        assert!(desc.validate().is_err());

        desc.vertex_bindings.push(vk::VertexInputBindingDescription {
            binding: 1,
            stride: 32,
            input_rate: vk::VertexInputRate::VERTEX,
        });
        assert!(desc.validate().is_ok());
    }
}
