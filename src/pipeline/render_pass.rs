use {
    crate::{FramebufferHandle, HandleRegistry, RenderPassHandle, VkalError},
    anyhow::Context,
    ash::vk,
};

/// A single-subpass render pass with one color attachment and an optional
/// depth attachment.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct RenderPassDesc {
    pub color_format: vk::Format,
    pub color_final_layout: vk::ImageLayout,
    pub depth_format: Option<vk::Format>,
    pub clear_color: bool,
}

impl RenderPassDesc {
    /// Renders into swapchain images, which are presented afterwards.
    pub fn swapchain(
        color_format: vk::Format,
        depth_format: vk::Format,
    ) -> Self {
        Self {
            color_format,
            color_final_layout: vk::ImageLayout::PRESENT_SRC_KHR,
            depth_format: Some(depth_format),
            clear_color: true,
        }
    }

    /// Renders into a texture which is sampled afterwards.
    pub fn offscreen(color_format: vk::Format) -> Self {
        Self {
            color_format,
            color_final_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            depth_format: None,
            clear_color: true,
        }
    }

    pub(super) fn attachments(&self) -> Vec<vk::AttachmentDescription> {
        let color_load_op = if self.clear_color {
            vk::AttachmentLoadOp::CLEAR
        } else {
            vk::AttachmentLoadOp::LOAD
        };
        let color_initial_layout = if self.clear_color {
            vk::ImageLayout::UNDEFINED
        } else {
            self.color_final_layout
        };
        let mut attachments = vec![vk::AttachmentDescription::default()
            .format(self.color_format)
            .samples(vk::SampleCountFlags::TYPE_1)
            .load_op(color_load_op)
            .store_op(vk::AttachmentStoreOp::STORE)
            .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
            .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
            .initial_layout(color_initial_layout)
            .final_layout(self.color_final_layout)];
        if let Some(depth_format) = self.depth_format {
            attachments.push(
                vk::AttachmentDescription::default()
                    .format(depth_format)
                    .samples(vk::SampleCountFlags::TYPE_1)
                    .load_op(vk::AttachmentLoadOp::CLEAR)
                    .store_op(vk::AttachmentStoreOp::DONT_CARE)
                    .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
                    .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
                    .initial_layout(vk::ImageLayout::UNDEFINED)
                    .final_layout(
                        vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
                    ),
            );
        }
        attachments
    }
}

/// Create and register a render pass.
///
/// # Safety
///
/// The render pass must be destroyed before the device.
pub unsafe fn create_render_pass(
    device: &ash::Device,
    registry: &mut HandleRegistry,
    desc: &RenderPassDesc,
) -> Result<RenderPassHandle, VkalError> {
    let attachments = desc.attachments();
    let color_refs = [vk::AttachmentReference {
        attachment: 0,
        layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
    }];
    let depth_ref = vk::AttachmentReference {
        attachment: 1,
        layout: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
    };
    let mut subpass = vk::SubpassDescription::default()
        .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
        .color_attachments(&color_refs);
    if desc.depth_format.is_some() {
        subpass = subpass.depth_stencil_attachment(&depth_ref);
    }

    let stages = vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
        | vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS;
    let dependencies = [vk::SubpassDependency::default()
        .src_subpass(vk::SUBPASS_EXTERNAL)
        .dst_subpass(0)
        .src_stage_mask(stages)
        .src_access_mask(vk::AccessFlags::empty())
        .dst_stage_mask(stages)
        .dst_access_mask(
            vk::AccessFlags::COLOR_ATTACHMENT_WRITE
                | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
        )];

    let subpasses = [subpass];
    let create_info = vk::RenderPassCreateInfo::default()
        .attachments(&attachments)
        .subpasses(&subpasses)
        .dependencies(&dependencies);
    let render_pass = device
        .create_render_pass(&create_info, None)
        .with_context(|| format!("Error creating render pass {:#?}", desc))?;
    let handle = registry.render_passes.insert(render_pass).map_err(|err| {
        device.destroy_render_pass(render_pass, None);
        err
    })?;
    log::debug!("Created render pass {:?}: {:?}", handle, desc);
    Ok(handle)
}

/// Create and register a framebuffer for a registered render pass.
///
/// # Safety
///
/// The attachments must outlive the framebuffer.
pub unsafe fn create_framebuffer(
    device: &ash::Device,
    registry: &mut HandleRegistry,
    render_pass: RenderPassHandle,
    attachments: &[vk::ImageView],
    extent: vk::Extent2D,
) -> Result<FramebufferHandle, VkalError> {
    let create_info = vk::FramebufferCreateInfo::default()
        .render_pass(*registry.render_passes.get(render_pass)?)
        .attachments(attachments)
        .width(extent.width)
        .height(extent.height)
        .layers(1);
    let framebuffer = device
        .create_framebuffer(&create_info, None)
        .context("Error creating framebuffer")?;
    registry.framebuffers.insert(framebuffer).map_err(|err| {
        device.destroy_framebuffer(framebuffer, None);
        err
    })
}
