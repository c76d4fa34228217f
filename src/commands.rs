use {
    crate::{FramebufferHandle, RenderPassHandle, VkalContext, VkalError},
    anyhow::Context,
    ash::vk,
};

/// Create a command pool whose buffers can be individually reset.
///
/// # Safety
///
/// The pool must be destroyed before the device.
pub unsafe fn create_command_pool(
    device: &ash::Device,
    queue_family_index: u32,
) -> Result<vk::CommandPool, VkalError> {
    let create_info = vk::CommandPoolCreateInfo::default()
        .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER)
        .queue_family_index(queue_family_index);
    Ok(device
        .create_command_pool(&create_info, None)
        .context("Error creating a command pool")?)
}

/// Allocate `count` primary command buffers.
///
/// # Safety
///
/// The buffers are freed along with their pool.
pub unsafe fn allocate_command_buffers(
    device: &ash::Device,
    pool: vk::CommandPool,
    count: u32,
) -> Result<Vec<vk::CommandBuffer>, VkalError> {
    let allocate_info = vk::CommandBufferAllocateInfo::default()
        .command_pool(pool)
        .level(vk::CommandBufferLevel::PRIMARY)
        .command_buffer_count(count);
    Ok(device
        .allocate_command_buffers(&allocate_info)
        .with_context(|| {
            format!("Error allocating {} command buffers", count)
        })?)
}

/// Wait for a fence with a bounded timeout.
///
/// # Safety
///
/// The fence must belong to the device.
pub unsafe fn wait_for_fence(
    device: &ash::Device,
    fence: vk::Fence,
    timeout_ns: u64,
) -> Result<(), VkalError> {
    match device.wait_for_fences(&[fence], true, timeout_ns) {
        Ok(()) => Ok(()),
        Err(vk::Result::TIMEOUT) => Err(VkalError::FenceTimeout(timeout_ns)),
        Err(err) => Err(VkalError::from_vk(err)),
    }
}

/// Records and synchronously executes short command sequences such as
/// staging copies and image layout transitions.
pub struct TransferCommands {
    pool: vk::CommandPool,
    queue: vk::Queue,
    fence: vk::Fence,
    timeout_ns: u64,
}

impl TransferCommands {
    /// # Safety
    ///
    /// [TransferCommands::destroy] must be called before the device is
    /// destroyed.
    pub unsafe fn new(
        device: &ash::Device,
        queue: vk::Queue,
        queue_family_index: u32,
        timeout_ns: u64,
    ) -> Result<Self, VkalError> {
        let pool = create_command_pool(device, queue_family_index)?;
        let fence = match device
            .create_fence(&vk::FenceCreateInfo::default(), None)
        {
            Ok(fence) => fence,
            Err(err) => {
                device.destroy_command_pool(pool, None);
                return Err(VkalError::from_vk(err));
            }
        };
        Ok(Self {
            pool,
            queue,
            fence,
            timeout_ns,
        })
    }

    /// Record commands with `record`, submit them, and block until they have
    /// executed.
    ///
    /// # Safety
    ///
    /// Everything referenced by the recorded commands must stay alive until
    /// this returns.
    pub unsafe fn submit_and_wait(
        &self,
        device: &ash::Device,
        record: impl FnOnce(vk::CommandBuffer),
    ) -> Result<(), VkalError> {
        let command_buffer =
            allocate_command_buffers(device, self.pool, 1)?[0];
        let result = self.record_and_submit(device, command_buffer, record);
        device.free_command_buffers(self.pool, &[command_buffer]);
        result
    }

    /// # Safety
    ///
    /// No transfer may be in flight.
    pub unsafe fn destroy(&mut self, device: &ash::Device) {
        device.destroy_fence(self.fence, None);
        device.destroy_command_pool(self.pool, None);
    }

    unsafe fn record_and_submit(
        &self,
        device: &ash::Device,
        command_buffer: vk::CommandBuffer,
        record: impl FnOnce(vk::CommandBuffer),
    ) -> Result<(), VkalError> {
        let begin_info = vk::CommandBufferBeginInfo::default()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        device
            .begin_command_buffer(command_buffer, &begin_info)
            .map_err(VkalError::from_vk)?;
        record(command_buffer);
        device
            .end_command_buffer(command_buffer)
            .map_err(VkalError::from_vk)?;

        device
            .reset_fences(&[self.fence])
            .map_err(VkalError::from_vk)?;
        let command_buffers = [command_buffer];
        let submit_info =
            vk::SubmitInfo::default().command_buffers(&command_buffers);
        device
            .queue_submit(self.queue, &[submit_info], self.fence)
            .map_err(VkalError::from_vk)?;
        wait_for_fence(device, self.fence, self.timeout_ns)
    }
}

/// Copy a region between two buffers.
///
/// # Safety
///
/// Must be called while `command_buffer` is recording.
pub unsafe fn cmd_copy_buffer(
    device: &ash::Device,
    command_buffer: vk::CommandBuffer,
    src: vk::Buffer,
    src_offset: u64,
    dst: vk::Buffer,
    dst_offset: u64,
    size: u64,
) {
    device.cmd_copy_buffer(
        command_buffer,
        src,
        dst,
        &[vk::BufferCopy {
            src_offset,
            dst_offset,
            size,
        }],
    );
}

/// A viewport and scissor covering the whole extent with depth 0..1.
pub fn full_viewport(extent: vk::Extent2D) -> (vk::Viewport, vk::Rect2D) {
    let viewport = vk::Viewport {
        x: 0.0,
        y: 0.0,
        width: extent.width as f32,
        height: extent.height as f32,
        min_depth: 0.0,
        max_depth: 1.0,
    };
    let scissor = vk::Rect2D {
        offset: vk::Offset2D { x: 0, y: 0 },
        extent,
    };
    (viewport, scissor)
}

/// Clear values for a color attachment followed by a depth attachment.
pub fn clear_values(color: [f32; 4]) -> [vk::ClearValue; 2] {
    [
        vk::ClearValue {
            color: vk::ClearColorValue { float32: color },
        },
        vk::ClearValue {
            depth_stencil: vk::ClearDepthStencilValue {
                depth: 1.0,
                stencil: 0,
            },
        },
    ]
}

// Frame recording
// ---------------

impl VkalContext {
    /// Reset and begin the acquired image's command buffer.
    ///
    /// # Safety
    ///
    /// The image must have been returned by
    /// [VkalContext::acquire_image] for this frame.
    pub unsafe fn begin_command_buffer(
        &mut self,
        image_index: u32,
    ) -> Result<vk::CommandBuffer, VkalError> {
        let command_buffer = self.command_buffer(image_index)?;
        self.frames.begin_recording(image_index)?;
        let begun = self
            .device
            .reset_command_buffer(
                command_buffer,
                vk::CommandBufferResetFlags::empty(),
            )
            .and_then(|()| {
                self.device.begin_command_buffer(
                    command_buffer,
                    &vk::CommandBufferBeginInfo::default(),
                )
            });
        if let Err(err) = begun {
            self.frames.abandon();
            return Err(VkalError::from_vk(err));
        }
        Ok(command_buffer)
    }

    /// Begin the default render pass on the image's framebuffer, clearing
    /// to the configured color and a depth of 1.0.
    ///
    /// # Safety
    ///
    /// The command buffer must be recording.
    pub unsafe fn begin_render_pass(
        &mut self,
        image_index: u32,
    ) -> Result<(), VkalError> {
        let framebuffer = self.swapchain.framebuffer(image_index)?;
        self.begin_render_pass_to(
            image_index,
            self.render_pass,
            framebuffer,
            self.swapchain.extent(),
        )
    }

    /// Begin any registered render pass, for example one targeting a render
    /// target texture's framebuffer.
    ///
    /// # Safety
    ///
    /// The command buffer must be recording.
    pub unsafe fn begin_render_pass_to(
        &mut self,
        image_index: u32,
        render_pass: RenderPassHandle,
        framebuffer: FramebufferHandle,
        extent: vk::Extent2D,
    ) -> Result<(), VkalError> {
        let command_buffer = self.command_buffer(image_index)?;
        let render_pass = *self.registry.render_passes.get(render_pass)?;
        let framebuffer = *self.registry.framebuffers.get(framebuffer)?;
        self.frames.begin_render_pass(image_index)?;

        let clear_values = clear_values(self.config.clear_color);
        let begin_info = vk::RenderPassBeginInfo::default()
            .render_pass(render_pass)
            .framebuffer(framebuffer)
            .render_area(full_viewport(extent).1)
            .clear_values(&clear_values);
        self.device.cmd_begin_render_pass(
            command_buffer,
            &begin_info,
            vk::SubpassContents::INLINE,
        );
        Ok(())
    }

    /// Cover the whole swapchain extent.
    ///
    /// # Safety
    ///
    /// The command buffer must be recording.
    pub unsafe fn set_viewport_and_scissor(
        &self,
        image_index: u32,
    ) -> Result<(), VkalError> {
        self.set_viewport_and_scissor_to(image_index, self.swapchain.extent())
    }

    /// # Safety
    ///
    /// The command buffer must be recording.
    pub unsafe fn set_viewport_and_scissor_to(
        &self,
        image_index: u32,
        extent: vk::Extent2D,
    ) -> Result<(), VkalError> {
        self.frames
            .check_recording("set_viewport_and_scissor", image_index)?;
        let command_buffer = self.command_buffer(image_index)?;
        let (viewport, scissor) = full_viewport(extent);
        self.device.cmd_set_viewport(command_buffer, 0, &[viewport]);
        self.device.cmd_set_scissor(command_buffer, 0, &[scissor]);
        Ok(())
    }

    /// Bind the vertex buffer at binding 0 and the index buffer as 32 bit
    /// indices, both from offset zero. Draw calls pass the offsets returned
    /// by `add_*` divided by the element size.
    ///
    /// # Safety
    ///
    /// The command buffer must be recording.
    pub unsafe fn bind_default_buffers(
        &self,
        image_index: u32,
    ) -> Result<(), VkalError> {
        self.frames
            .check_recording("bind_default_buffers", image_index)?;
        let command_buffer = self.command_buffer(image_index)?;
        self.device.cmd_bind_vertex_buffers(
            command_buffer,
            0,
            &[self.vertex_buffer()],
            &[0],
        );
        self.device.cmd_bind_index_buffer(
            command_buffer,
            self.index_buffer(),
            0,
            vk::IndexType::UINT32,
        );
        Ok(())
    }

    /// # Safety
    ///
    /// A render pass must have been begun on the command buffer.
    pub unsafe fn end_render_pass(
        &mut self,
        image_index: u32,
    ) -> Result<(), VkalError> {
        self.frames.check_recording("end_render_pass", image_index)?;
        let command_buffer = self.command_buffer(image_index)?;
        self.frames.end_render_pass()?;
        self.device.cmd_end_render_pass(command_buffer);
        Ok(())
    }

    /// # Safety
    ///
    /// The command buffer must be recording.
    pub unsafe fn end_command_buffer(
        &mut self,
        image_index: u32,
    ) -> Result<(), VkalError> {
        let command_buffer = self.command_buffer(image_index)?;
        self.frames.end_recording(image_index)?;
        if let Err(err) = self.device.end_command_buffer(command_buffer) {
            self.frames.abandon();
            return Err(VkalError::from_vk(err));
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use {super::*, pretty_assertions::assert_eq};

    #[test]
    fn viewport_covers_the_extent() {
        let extent = vk::Extent2D {
            width: 1280,
            height: 720,
        };
        let (viewport, scissor) = full_viewport(extent);
        assert_eq!(viewport.width, 1280.0);
        assert_eq!(viewport.height, 720.0);
        assert_eq!(viewport.max_depth, 1.0);
        assert_eq!(scissor.extent, extent);
        assert_eq!(scissor.offset, vk::Offset2D { x: 0, y: 0 });
    }

    #[test]
    fn clear_values_put_color_before_depth() {
        let values = clear_values([0.1, 0.2, 0.3, 1.0]);
        unsafe {
            assert_eq!(values[0].color.float32, [0.1, 0.2, 0.3, 1.0]);
            assert_eq!(values[1].depth_stencil.depth, 1.0);
        }
    }
}
