use {
    crate::{
        commands::{
            allocate_command_buffers, create_command_pool, wait_for_fence,
            TransferCommands,
        },
        descriptor::{self, DescriptorPool},
        frame::{FramePhase, FrameRing, FrameSync},
        image::{self, ImageDesc, ImageMemory, SamplerDesc},
        pipeline::{
            self, DescriptorBinding, GraphicsPipelineDesc, RenderPassDesc,
        },
        swapchain::{
            choose_surface_format, find_depth_format, SwapchainSettings,
            SwapchainState,
        },
        allocate_block, BlockAllocator, DefaultBuffers,
        DescriptorSetLayoutHandle, DeviceAllocator, DeviceMemoryBlock,
        FramebufferHandle, HandleRegistry, ImageHandle, ImageViewHandle,
        MemoryBlockHandle, MemoryProperties, PipelineHandle,
        PipelineLayoutHandle, RenderPassHandle, SamplerHandle,
        ShaderModuleHandle, SurfaceBinding, TextureHandle, TraceAllocator,
        UniformBuffer, VkalConfig, VkalError, WindowSurface,
    },
    anyhow::Context,
    ash::vk,
};

/// The device objects a context is built on. All of them are owned by the
/// caller and outlive the context.
#[derive(Clone)]
pub struct DeviceInfo {
    pub instance: ash::Instance,
    pub physical_device: vk::PhysicalDevice,
    pub device: ash::Device,
    pub graphics_queue: vk::Queue,
    pub graphics_queue_family_index: u32,
    pub present_queue: vk::Queue,
    pub present_queue_family_index: u32,
    pub surface: SurfaceBinding,
}

/// Everything one logical device needs to load resources and render frames.
///
/// Every mutating call takes `&mut self`. Threads which share a context wrap
/// it in a `Mutex`.
pub struct VkalContext {
    pub(crate) device: ash::Device,
    pub(crate) device_limits: vk::PhysicalDeviceLimits,
    pub(crate) memory_properties: MemoryProperties,
    pub(crate) config: VkalConfig,
    pub(crate) registry: HandleRegistry,
    pub(crate) allocator: TraceAllocator<DeviceAllocator>,
    pub(crate) buffers: DefaultBuffers,
    pub(crate) transfer: TransferCommands,
    pub(crate) descriptors: DescriptorPool,
    pub(crate) swapchain: SwapchainState,
    pub(crate) render_pass: RenderPassHandle,
    pub(crate) command_buffers: Vec<vk::CommandBuffer>,
    pub(crate) frames: FrameRing,
    graphics_queue: vk::Queue,
    present_queue: vk::Queue,
    surface: SurfaceBinding,
    window: Box<dyn WindowSurface + Send>,
    swapchain_settings: SwapchainSettings,
    depth_format: vk::Format,
    command_pool: vk::CommandPool,
    frame_sync: Vec<FrameSync>,
    image_fences: Vec<vk::Fence>,
}

struct Presentation {
    settings: SwapchainSettings,
    swapchain: SwapchainState,
    render_pass: RenderPassHandle,
    depth_format: vk::Format,
    command_pool: vk::CommandPool,
    command_buffers: Vec<vk::CommandBuffer>,
    frame_sync: Vec<FrameSync>,
}

// Public API
// ----------

impl VkalContext {
    /// Build the default buffers, the descriptor pool, the swapchain and
    /// everything needed to render into it.
    ///
    /// # Safety
    ///
    /// [VkalContext::destroy] must be called before any of the objects in
    /// `device_info` are destroyed.
    pub unsafe fn new(
        device_info: &DeviceInfo,
        window: impl WindowSurface + Send + 'static,
        config: VkalConfig,
    ) -> Result<Self, VkalError> {
        config.validate()?;
        let device = device_info.device.clone();
        let memory_properties = MemoryProperties::new(
            &device_info.instance,
            device_info.physical_device,
        );
        let device_limits = device_info
            .instance
            .get_physical_device_properties(device_info.physical_device)
            .limits;
        log::trace!("{}", memory_properties);

        let mut allocator = TraceAllocator::new(
            memory_properties.clone(),
            DeviceAllocator::new(device.clone()),
            "vkal",
        );
        let mut registry = HandleRegistry::default();

        let mut transfer = TransferCommands::new(
            &device,
            device_info.graphics_queue,
            device_info.graphics_queue_family_index,
            config.fence_timeout_ns,
        )?;
        let buffers = match DefaultBuffers::new(
            &device,
            &memory_properties,
            &mut allocator,
            &config,
        ) {
            Ok(buffers) => buffers,
            Err(err) => {
                transfer.destroy(&device);
                return Err(err);
            }
        };
        let mut descriptors = match DescriptorPool::new(&device, &config) {
            Ok(descriptors) => descriptors,
            Err(err) => {
                buffers.destroy(&device, &mut allocator);
                transfer.destroy(&device);
                return Err(err);
            }
        };
        let presentation = match Self::create_presentation(
            device_info,
            &memory_properties,
            &mut registry,
            &mut allocator,
            &config,
            window.drawable_size(),
        ) {
            Ok(presentation) => presentation,
            Err(err) => {
                descriptors.destroy(&device);
                buffers.destroy(&device, &mut allocator);
                transfer.destroy(&device);
                registry.destroy_all(&device, &mut allocator);
                return Err(err);
            }
        };

        let image_count = presentation.swapchain.image_count();
        log::info!(
            indoc::indoc!(
                "
                Created vkal context
                  swapchain: {}x{}, {} images, {:?}
                  frames in flight: {}
                  vertex / index / uniform / staging: {} / {} / {} / {}
                "
            ),
            presentation.swapchain.extent().width,
            presentation.swapchain.extent().height,
            image_count,
            presentation.swapchain.present_mode(),
            config.frames_in_flight,
            crate::PrettySize(config.vertex_buffer_size),
            crate::PrettySize(config.index_buffer_size),
            crate::PrettySize(config.uniform_buffer_size),
            crate::PrettySize(config.staging_buffer_size),
        );

        Ok(Self {
            device,
            device_limits,
            memory_properties,
            registry,
            allocator,
            buffers,
            transfer,
            descriptors,
            swapchain: presentation.swapchain,
            render_pass: presentation.render_pass,
            command_buffers: presentation.command_buffers,
            frames: FrameRing::new(config.frames_in_flight),
            graphics_queue: device_info.graphics_queue,
            present_queue: device_info.present_queue,
            surface: device_info.surface.clone(),
            window: Box::new(window),
            swapchain_settings: presentation.settings,
            depth_format: presentation.depth_format,
            command_pool: presentation.command_pool,
            frame_sync: presentation.frame_sync,
            image_fences: vec![vk::Fence::null(); image_count],
            config,
        })
    }

    /// Wait for the device to go idle and destroy everything the context
    /// created. The device, surface and instance are left alone.
    ///
    /// # Safety
    ///
    /// No handle from this context may be used afterwards.
    pub unsafe fn destroy(mut self) -> Result<(), VkalError> {
        let idle = self.device.device_wait_idle().map_err(VkalError::from_vk);
        let live = self.registry.live_count();
        let swapchain = self.swapchain.destroy(
            &self.device,
            &mut self.registry,
            &mut self.allocator,
        );
        for sync in self.frame_sync.drain(..) {
            sync.destroy(&self.device);
        }
        self.device.destroy_command_pool(self.command_pool, None);
        self.descriptors.destroy(&self.device);
        self.transfer.destroy(&self.device);
        self.registry.destroy_all(&self.device, &mut self.allocator);
        self.buffers.destroy(&self.device, &mut self.allocator);
        log::info!(
            "Destroyed vkal context with {} live objects after {} frames",
            live,
            self.frames.frames_presented()
        );
        idle.and(swapchain)
    }

    pub fn device(&self) -> &ash::Device {
        &self.device
    }

    pub fn config(&self) -> &VkalConfig {
        &self.config
    }

    pub fn registry(&self) -> &HandleRegistry {
        &self.registry
    }

    pub fn swapchain(&self) -> &SwapchainState {
        &self.swapchain
    }

    pub fn extent(&self) -> vk::Extent2D {
        self.swapchain.extent()
    }

    /// The render pass used for swapchain framebuffers.
    pub fn default_render_pass(&self) -> RenderPassHandle {
        self.render_pass
    }

    pub fn buffers(&self) -> &DefaultBuffers {
        &self.buffers
    }

    pub fn vertex_buffer(&self) -> vk::Buffer {
        self.buffers.vertex.buffer().raw()
    }

    pub fn index_buffer(&self) -> vk::Buffer {
        self.buffers.index.buffer().raw()
    }

    pub fn frame_phase(&self) -> FramePhase {
        self.frames.phase()
    }

    /// The in-flight slot the current (or next) frame uses.
    pub fn frame_slot(&self) -> usize {
        self.frames.slot()
    }

    pub fn descriptor_sets_remaining(&self) -> u32 {
        self.descriptors.remaining()
    }

    /// Per memory type block counts, as logged at teardown.
    pub fn memory_report(&self) -> String {
        self.allocator.report()
    }

    /// # Safety
    ///
    /// Blocks the calling thread until all submitted work has finished.
    pub unsafe fn wait_idle(&self) -> Result<(), VkalError> {
        self.device.device_wait_idle().map_err(VkalError::from_vk)
    }
}

// Geometry and uniforms
// ---------------------

impl VkalContext {
    /// Append vertices and return the byte offset of the first one.
    ///
    /// # Safety
    ///
    /// The vertex buffer range being written must not be read by pending
    /// GPU work.
    pub unsafe fn add_vertices<T: bytemuck::Pod>(
        &mut self,
        vertices: &[T],
    ) -> Result<u64, VkalError> {
        self.add_vertex_bytes(
            bytemuck::cast_slice(vertices),
            std::mem::size_of::<T>() as u64,
            vertices.len() as u64,
        )
    }

    /// # Safety
    ///
    /// See [VkalContext::add_vertices].
    pub unsafe fn add_vertex_bytes(
        &mut self,
        bytes: &[u8],
        element_size: u64,
        count: u64,
    ) -> Result<u64, VkalError> {
        self.buffers.add_vertex_bytes(
            &self.device,
            &self.transfer,
            bytes,
            element_size,
            count,
        )
    }

    /// Append indices and return the byte offset of the first one.
    ///
    /// # Safety
    ///
    /// The index buffer range being written must not be read by pending GPU
    /// work.
    pub unsafe fn add_indices<T: bytemuck::Pod>(
        &mut self,
        indices: &[T],
    ) -> Result<u64, VkalError> {
        self.add_index_bytes(
            bytemuck::cast_slice(indices),
            std::mem::size_of::<T>() as u64,
            indices.len() as u64,
        )
    }

    /// # Safety
    ///
    /// See [VkalContext::add_indices].
    pub unsafe fn add_index_bytes(
        &mut self,
        bytes: &[u8],
        element_size: u64,
        count: u64,
    ) -> Result<u64, VkalError> {
        self.buffers.add_index_bytes(
            &self.device,
            &self.transfer,
            bytes,
            element_size,
            count,
        )
    }

    /// Rewind the vertex buffer. Every vertex offset handed out so far is
    /// invalid afterwards.
    pub fn reset_vertex_buffer(&mut self) {
        self.buffers.vertex.reset();
    }

    /// Rewind the index buffer. Every index offset handed out so far is
    /// invalid afterwards.
    pub fn reset_index_buffer(&mut self) {
        self.buffers.index.reset();
    }

    /// Reserve `count` uniform elements of `element_size` bytes for
    /// `binding`.
    pub fn create_uniform_buffer(
        &mut self,
        element_size: u64,
        count: u32,
        binding: u32,
    ) -> Result<UniformBuffer, VkalError> {
        UniformBuffer::reserve(
            &mut self.buffers.uniform,
            element_size,
            count,
            binding,
            self.device_limits.min_uniform_buffer_offset_alignment,
        )
    }

    /// Overwrite one element of a uniform buffer.
    pub fn update_uniform(
        &mut self,
        uniform: &UniformBuffer,
        index: u32,
        bytes: &[u8],
    ) -> Result<(), VkalError> {
        uniform.write(&mut self.buffers.uniform, index, bytes)
    }

    pub fn update_uniform_value<T: bytemuck::Pod>(
        &mut self,
        uniform: &UniformBuffer,
        index: u32,
        value: &T,
    ) -> Result<(), VkalError> {
        self.update_uniform(uniform, index, bytemuck::bytes_of(value))
    }
}

// Builders
// --------

impl VkalContext {
    /// # Safety
    ///
    /// Destroy the module with [VkalContext::destroy_shader_module] or let
    /// [VkalContext::destroy] release it.
    pub unsafe fn create_shader_module(
        &mut self,
        bytes: &[u8],
    ) -> Result<ShaderModuleHandle, VkalError> {
        pipeline::create_shader_module(&self.device, &mut self.registry, bytes)
    }

    /// # Safety
    ///
    /// The layout is released by [VkalContext::destroy] at the latest.
    pub unsafe fn create_descriptor_set_layout(
        &mut self,
        bindings: &[DescriptorBinding],
    ) -> Result<DescriptorSetLayoutHandle, VkalError> {
        pipeline::create_descriptor_set_layout(
            &self.device,
            &mut self.registry,
            bindings,
        )
    }

    /// # Safety
    ///
    /// The layout is released by [VkalContext::destroy] at the latest.
    pub unsafe fn create_pipeline_layout(
        &mut self,
        set_layouts: &[DescriptorSetLayoutHandle],
        push_constant_ranges: &[vk::PushConstantRange],
    ) -> Result<PipelineLayoutHandle, VkalError> {
        pipeline::create_pipeline_layout(
            &self.device,
            &mut self.registry,
            set_layouts,
            push_constant_ranges,
        )
    }

    /// # Safety
    ///
    /// The render pass is released by [VkalContext::destroy] at the latest.
    pub unsafe fn create_render_pass(
        &mut self,
        desc: &RenderPassDesc,
    ) -> Result<RenderPassHandle, VkalError> {
        pipeline::create_render_pass(&self.device, &mut self.registry, desc)
    }

    /// # Safety
    ///
    /// The pipeline is released by [VkalContext::destroy] at the latest.
    pub unsafe fn create_graphics_pipeline(
        &mut self,
        desc: &GraphicsPipelineDesc,
    ) -> Result<PipelineHandle, VkalError> {
        pipeline::create_graphics_pipeline(
            &self.device,
            &mut self.registry,
            desc,
        )
    }

    /// Allocate one descriptor set per layout from the context's pool.
    ///
    /// # Safety
    ///
    /// The sets are freed when the context is destroyed.
    pub unsafe fn allocate_descriptor_sets(
        &mut self,
        layouts: &[DescriptorSetLayoutHandle],
    ) -> Result<Vec<vk::DescriptorSet>, VkalError> {
        self.descriptors
            .allocate(&self.device, &self.registry, layouts)
    }

    /// Point the uniform's binding at one of its elements.
    ///
    /// # Safety
    ///
    /// The set must not be in use by pending GPU work.
    pub unsafe fn update_descriptor_set_uniform(
        &self,
        set: vk::DescriptorSet,
        uniform: &UniformBuffer,
        index: u32,
    ) -> Result<(), VkalError> {
        let info = uniform
            .descriptor_info(self.buffers.uniform.buffer().raw(), index)?;
        descriptor::update_descriptor_set_uniform(
            &self.device,
            set,
            uniform.binding,
            info,
        );
        Ok(())
    }

    /// # Safety
    ///
    /// The set must not be in use by pending GPU work.
    pub unsafe fn update_descriptor_set_storage_buffer(
        &self,
        set: vk::DescriptorSet,
        binding: u32,
        info: vk::DescriptorBufferInfo,
    ) {
        descriptor::update_descriptor_set_storage_buffer(
            &self.device,
            set,
            binding,
            info,
        );
    }

    /// # Safety
    ///
    /// The set must not be in use by pending GPU work.
    pub unsafe fn update_descriptor_set_texture(
        &self,
        set: vk::DescriptorSet,
        binding: u32,
        texture: TextureHandle,
    ) -> Result<(), VkalError> {
        descriptor::update_descriptor_set_texture(
            &self.device,
            &self.registry,
            set,
            binding,
            texture,
        )
    }

    /// # Safety
    ///
    /// The set must not be in use by pending GPU work.
    pub unsafe fn update_descriptor_set_texture_array(
        &self,
        set: vk::DescriptorSet,
        binding: u32,
        textures: &[TextureHandle],
    ) -> Result<(), VkalError> {
        descriptor::update_descriptor_set_texture_array(
            &self.device,
            &self.registry,
            set,
            binding,
            textures,
        )
    }

    /// # Safety
    ///
    /// The module must not be used to build pipelines afterwards.
    pub unsafe fn destroy_shader_module(
        &mut self,
        module: ShaderModuleHandle,
    ) -> Result<(), VkalError> {
        self.registry.destroy_shader_module(&self.device, module)
    }

    /// # Safety
    ///
    /// The pipeline must not be used by pending GPU work.
    pub unsafe fn destroy_pipeline(
        &mut self,
        pipeline: PipelineHandle,
    ) -> Result<(), VkalError> {
        self.registry.destroy_pipeline(&self.device, pipeline)
    }

    /// # Safety
    ///
    /// No pipeline built with the layout may be in use.
    pub unsafe fn destroy_pipeline_layout(
        &mut self,
        layout: PipelineLayoutHandle,
    ) -> Result<(), VkalError> {
        self.registry.destroy_pipeline_layout(&self.device, layout)
    }

    /// # Safety
    ///
    /// The layout must not be used for new allocations afterwards.
    pub unsafe fn destroy_descriptor_set_layout(
        &mut self,
        layout: DescriptorSetLayoutHandle,
    ) -> Result<(), VkalError> {
        self.registry.destroy_descriptor_set_layout(&self.device, layout)
    }

    /// # Safety
    ///
    /// Framebuffers and pipelines built against the render pass must not be
    /// used afterwards. The default render pass cannot be destroyed here.
    pub unsafe fn destroy_render_pass(
        &mut self,
        render_pass: RenderPassHandle,
    ) -> Result<(), VkalError> {
        if render_pass == self.render_pass {
            return Err(anyhow::anyhow!(
                "The default render pass is owned by the swapchain"
            )
            .into());
        }
        self.registry.destroy_render_pass(&self.device, render_pass)
    }
}

// Images and memory
// -----------------

impl VkalContext {
    /// Allocate and register a block of device memory for buffers with
    /// `usage`.
    ///
    /// The first memory type carrying every flag in `memory_property_flags`
    /// is used, a partial match is an error.
    ///
    /// # Safety
    ///
    /// Free the block with [VkalContext::destroy_memory_block] or let
    /// [VkalContext::destroy] release it.
    pub unsafe fn allocate_device_memory(
        &mut self,
        size_in_bytes: u64,
        usage: vk::BufferUsageFlags,
        memory_property_flags: vk::MemoryPropertyFlags,
        extra_allocate_flags: vk::MemoryAllocateFlags,
    ) -> Result<MemoryBlockHandle, VkalError> {
        allocate_block(
            &self.device,
            &self.memory_properties,
            &mut self.registry.memory_blocks,
            &mut self.allocator,
            size_in_bytes,
            usage,
            memory_property_flags,
            extra_allocate_flags,
        )
    }

    pub fn memory_block(
        &self,
        block: MemoryBlockHandle,
    ) -> Result<&DeviceMemoryBlock, VkalError> {
        self.registry.memory_blocks.get(block)
    }

    /// # Safety
    ///
    /// Everything bound into the block must already be destroyed. The depth
    /// buffer's block belongs to the swapchain and is refused.
    pub unsafe fn destroy_memory_block(
        &mut self,
        block: MemoryBlockHandle,
    ) -> Result<(), VkalError> {
        if self.swapchain.depth().is_some_and(|depth| depth.memory == block) {
            return Err(anyhow::anyhow!(
                "The depth buffer memory is owned by the swapchain"
            )
            .into());
        }
        self.registry.destroy_memory_block(&mut self.allocator, block)
    }

    /// Create an image and bind it to registered device memory.
    ///
    /// # Safety
    ///
    /// The image is released by [VkalContext::destroy] at the latest.
    pub unsafe fn create_image(
        &mut self,
        desc: &ImageDesc,
        placement: ImageMemory,
    ) -> Result<(ImageHandle, MemoryBlockHandle), VkalError> {
        image::create_image(
            &self.device,
            &self.memory_properties,
            &mut self.registry,
            &mut self.allocator,
            desc,
            placement,
        )
    }

    /// # Safety
    ///
    /// The view is released by [VkalContext::destroy] at the latest.
    pub unsafe fn create_image_view(
        &mut self,
        image: ImageHandle,
        format: vk::Format,
        aspect_mask: vk::ImageAspectFlags,
        layer_count: u32,
    ) -> Result<ImageViewHandle, VkalError> {
        let raw_image = *self.registry.images.get(image)?;
        image::create_image_view(
            &self.device,
            &mut self.registry,
            raw_image,
            format,
            aspect_mask,
            layer_count,
        )
    }

    /// # Safety
    ///
    /// The sampler is released by [VkalContext::destroy] at the latest.
    pub unsafe fn create_sampler(
        &mut self,
        desc: &SamplerDesc,
    ) -> Result<SamplerHandle, VkalError> {
        image::create_sampler(&self.device, &mut self.registry, desc)
    }

    /// # Safety
    ///
    /// The views must outlive the framebuffer.
    pub unsafe fn create_framebuffer(
        &mut self,
        render_pass: RenderPassHandle,
        attachments: &[ImageViewHandle],
        extent: vk::Extent2D,
    ) -> Result<FramebufferHandle, VkalError> {
        let views = attachments
            .iter()
            .map(|&view| self.registry.image_views.get(view).copied())
            .collect::<Result<Vec<_>, _>>()?;
        pipeline::create_framebuffer(
            &self.device,
            &mut self.registry,
            render_pass,
            &views,
            extent,
        )
    }

    /// Destroy an image. Its memory stays claimed in the block.
    ///
    /// # Safety
    ///
    /// The image must not be in use and its views must be destroyed first.
    pub unsafe fn destroy_image(
        &mut self,
        image: ImageHandle,
    ) -> Result<(), VkalError> {
        self.registry.destroy_image(&self.device, image)
    }

    /// # Safety
    ///
    /// The view must not be referenced by pending GPU work.
    pub unsafe fn destroy_image_view(
        &mut self,
        view: ImageViewHandle,
    ) -> Result<(), VkalError> {
        self.registry.destroy_image_view(&self.device, view)
    }

    /// # Safety
    ///
    /// The sampler must not be referenced by pending GPU work.
    pub unsafe fn destroy_sampler(
        &mut self,
        sampler: SamplerHandle,
    ) -> Result<(), VkalError> {
        self.registry.destroy_sampler(&self.device, sampler)
    }

    /// # Safety
    ///
    /// The framebuffer must not be referenced by pending GPU work.
    pub unsafe fn destroy_framebuffer(
        &mut self,
        framebuffer: FramebufferHandle,
    ) -> Result<(), VkalError> {
        self.registry.destroy_framebuffer(&self.device, framebuffer)
    }
}

// Frame loop
// ----------

impl VkalContext {
    /// Start a frame by acquiring the next swapchain image.
    ///
    /// Recreates the swapchain first when it was flagged. Returns `None`
    /// when the frame has to be skipped, either because the swapchain just
    /// went out of date or because the window is minimised. Skipping is not
    /// an error, call again next iteration.
    ///
    /// # Safety
    ///
    /// Must be called from the thread driving the frame loop.
    pub unsafe fn acquire_image(&mut self) -> Result<Option<u32>, VkalError> {
        self.frames.check_acquire()?;
        if self.swapchain.should_recreate() && !self.recreate_swapchain()? {
            self.frames.skipped()?;
            return Ok(None);
        }

        let sync = self.frame_sync[self.frames.slot()];
        let timeout_ns = self.config.fence_timeout_ns;

        // image_available is about to be signaled again.
        wait_for_fence(&self.device, sync.in_flight, timeout_ns)?;

        let image_index = match self
            .swapchain
            .acquire_next_image(sync.image_available, timeout_ns)?
        {
            Some(image_index) => image_index,
            None => {
                log::warn!("Swapchain out of date, skipping frame");
                self.frames.skipped()?;
                return Ok(None);
            }
        };

        let image_fence = self.image_fences[image_index as usize];
        if image_fence != vk::Fence::null() {
            wait_for_fence(&self.device, image_fence, timeout_ns)?;
        }
        self.frames.image_acquired(image_index)?;
        Ok(Some(image_index))
    }

    /// Wait until the slot's previous submission has finished, then submit
    /// the commands recorded for the acquired image.
    ///
    /// # Safety
    ///
    /// Every resource referenced by the commands must stay alive until the
    /// slot's fence signals.
    pub unsafe fn submit(&mut self) -> Result<(), VkalError> {
        let image_index = self.frames.check_submit()?;
        let sync = self.frame_sync[self.frames.slot()];
        wait_for_fence(
            &self.device,
            sync.in_flight,
            self.config.fence_timeout_ns,
        )?;
        self.device
            .reset_fences(&[sync.in_flight])
            .map_err(VkalError::from_vk)?;

        let wait_semaphores = [sync.image_available];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let command_buffers = [self.command_buffer(image_index)?];
        let signal_semaphores = [sync.render_finished];
        let submit_info = vk::SubmitInfo::default()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);
        if let Err(err) = self.device.queue_submit(
            self.graphics_queue,
            &[submit_info],
            sync.in_flight,
        ) {
            self.frames.abandon();
            return Err(VkalError::from_vk(err));
        }
        self.image_fences[image_index as usize] = sync.in_flight;
        self.frames.submitted()
    }

    /// Present the submitted image and move on to the next in-flight slot.
    ///
    /// An out of date or suboptimal swapchain, or a window whose size no
    /// longer matches it, flags the swapchain for recreation at the next
    /// acquire.
    ///
    /// # Safety
    ///
    /// Must follow [VkalContext::submit] for the same frame.
    pub unsafe fn present(&mut self) -> Result<(), VkalError> {
        let image_index = self.frames.check_present()?;
        let sync = self.frame_sync[self.frames.slot()];
        let presented = self.swapchain.present(
            self.present_queue,
            sync.render_finished,
            image_index,
        );
        self.frames.presented()?;
        presented?;

        if self.swapchain.is_stale_for(self.window.drawable_size()) {
            self.swapchain.request_recreate();
        }
        Ok(())
    }

    /// Rebuild the swapchain, depth buffer, per-image targets and command
    /// buffers for the window's current size.
    ///
    /// Returns `false` while the window is minimised or the surface has no
    /// area. The swapchain stays flagged then. Pipelines keep working
    /// because the default render pass is kept and viewport and scissor are
    /// dynamic.
    ///
    /// # Safety
    ///
    /// Must not be called in the middle of a frame.
    pub unsafe fn recreate_swapchain(&mut self) -> Result<bool, VkalError> {
        self.frames.check_acquire()?;
        let drawable_size = self.window.drawable_size();
        if drawable_size.0 == 0 || drawable_size.1 == 0 {
            log::debug!("Window is minimised, swapchain recreation deferred");
            self.swapchain.request_recreate();
            return Ok(false);
        }

        self.device.device_wait_idle().map_err(VkalError::from_vk)?;
        self.swapchain.release_targets(
            &self.device,
            &mut self.registry,
            &mut self.allocator,
        )?;
        let rebuilt = self.swapchain.rebuild_swapchain(
            &self.surface,
            &self.swapchain_settings,
            drawable_size,
        )?;
        if !rebuilt {
            return Ok(false);
        }
        self.swapchain.build_targets(
            &self.device,
            &self.memory_properties,
            &mut self.registry,
            &mut self.allocator,
            self.render_pass,
            self.depth_format,
        )?;

        let image_count = self.swapchain.image_count();
        if image_count != self.command_buffers.len() {
            self.device
                .free_command_buffers(self.command_pool, &self.command_buffers);
            self.command_buffers = allocate_command_buffers(
                &self.device,
                self.command_pool,
                image_count as u32,
            )?;
        }
        self.image_fences = vec![vk::Fence::null(); image_count];
        log::debug!(
            "Swapchain recreated at {}x{} with {} images",
            self.swapchain.extent().width,
            self.swapchain.extent().height,
            image_count
        );
        Ok(true)
    }

    /// The command buffer recorded for a swapchain image.
    pub fn command_buffer(
        &self,
        image_index: u32,
    ) -> Result<vk::CommandBuffer, VkalError> {
        self.command_buffers
            .get(image_index as usize)
            .copied()
            .with_context(|| {
                format!("No command buffer for swapchain image {}", image_index)
            })
            .map_err(VkalError::from)
    }
}

// Private API
// -----------

impl VkalContext {
    unsafe fn create_presentation(
        device_info: &DeviceInfo,
        memory_properties: &MemoryProperties,
        registry: &mut HandleRegistry,
        allocator: &mut impl BlockAllocator,
        config: &VkalConfig,
        drawable_size: (u32, u32),
    ) -> Result<Presentation, VkalError> {
        let device = &device_info.device;
        let formats = device_info.surface.support()?.formats;
        let format = choose_surface_format(&formats)
            .context("The surface reports no formats")?;
        let depth_format = find_depth_format(
            &device_info.instance,
            device_info.physical_device,
        )?;
        let mut queue_family_indices =
            vec![device_info.graphics_queue_family_index];
        if device_info.present_queue_family_index
            != device_info.graphics_queue_family_index
        {
            queue_family_indices.push(device_info.present_queue_family_index);
        }
        let settings = SwapchainSettings {
            format,
            prefer_mailbox: config.prefer_mailbox,
            queue_family_indices,
        };

        let mut swapchain = SwapchainState::new(
            &device_info.instance,
            device,
            &device_info.surface,
            &settings,
            drawable_size,
        )?;
        let targets = pipeline::create_render_pass(
            device,
            registry,
            &RenderPassDesc::swapchain(format.format, depth_format),
        )
        .and_then(|render_pass| {
            swapchain.build_targets(
                device,
                memory_properties,
                registry,
                allocator,
                render_pass,
                depth_format,
            )?;
            Ok(render_pass)
        });
        let render_pass = match targets {
            Ok(render_pass) => render_pass,
            Err(err) => {
                swapchain.destroy(device, registry, allocator)?;
                return Err(err);
            }
        };

        let commands = create_command_pool(
            device,
            device_info.graphics_queue_family_index,
        )
        .and_then(|pool| {
            let prepared = allocate_command_buffers(
                device,
                pool,
                swapchain.image_count() as u32,
            )
            .and_then(|buffers| {
                let sync =
                    FrameSync::for_slots(device, config.frames_in_flight)?;
                Ok((buffers, sync))
            });
            match prepared {
                Ok((buffers, frame_sync)) => Ok((pool, buffers, frame_sync)),
                Err(err) => {
                    device.destroy_command_pool(pool, None);
                    Err(err)
                }
            }
        });
        let (command_pool, command_buffers, frame_sync) = match commands {
            Ok(commands) => commands,
            Err(err) => {
                swapchain.destroy(device, registry, allocator)?;
                return Err(err);
            }
        };

        Ok(Presentation {
            settings,
            swapchain,
            render_pass,
            depth_format,
            command_pool,
            command_buffers,
            frame_sync,
        })
    }
}
