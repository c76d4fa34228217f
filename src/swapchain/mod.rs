//! The swapchain, its per-image targets, and the depth buffer.

mod depth_buffer;
mod selection;
mod targets;

use {
    crate::{
        image::create_image_view, pipeline::create_framebuffer,
        BlockAllocator, FramebufferHandle, HandleRegistry, MemoryProperties,
        RenderPassHandle, SurfaceBinding, VkalError,
    },
    anyhow::{anyhow, Context},
    ash::vk,
};

pub use self::{
    depth_buffer::DepthBuffer,
    selection::{
        choose_depth_format, choose_extent, choose_image_count,
        choose_present_mode, choose_surface_format,
    },
    targets::ImageTargets,
};

/// The current swapchain and everything sized to it.
pub struct SwapchainState {
    loader: ash::khr::swapchain::Device,
    swapchain: vk::SwapchainKHR,
    images: Vec<vk::Image>,
    targets: ImageTargets,
    depth: Option<DepthBuffer>,
    extent: vk::Extent2D,
    format: vk::SurfaceFormatKHR,
    present_mode: vk::PresentModeKHR,
    built_for: (u32, u32),
    should_recreate: bool,
}

/// What the native swapchain is created with.
#[derive(Debug, Clone)]
pub struct SwapchainSettings {
    pub format: vk::SurfaceFormatKHR,
    pub prefer_mailbox: bool,

    /// More than one family makes the images shared between queues.
    pub queue_family_indices: Vec<u32>,
}

// Public API
// ----------

impl SwapchainState {
    /// Create the native swapchain. Targets are built separately with
    /// [SwapchainState::build_targets].
    ///
    /// # Safety
    ///
    /// [SwapchainState::destroy] must be called before the device is
    /// destroyed.
    pub unsafe fn new(
        instance: &ash::Instance,
        device: &ash::Device,
        surface: &SurfaceBinding,
        settings: &SwapchainSettings,
        drawable_size: (u32, u32),
    ) -> Result<Self, VkalError> {
        let loader = ash::khr::swapchain::Device::new(instance, device);
        let mut state = Self {
            loader,
            swapchain: vk::SwapchainKHR::null(),
            images: Vec::new(),
            targets: ImageTargets::default(),
            depth: None,
            extent: vk::Extent2D::default(),
            format: settings.format,
            present_mode: vk::PresentModeKHR::FIFO,
            built_for: (0, 0),
            should_recreate: false,
        };
        if !state.rebuild_swapchain(surface, settings, drawable_size)? {
            return Err(anyhow!(
                "Cannot build a swapchain while the surface has no area"
            )
            .into());
        }
        Ok(state)
    }

    /// Replace the native swapchain with one sized for the window.
    ///
    /// The old swapchain is handed to the driver for reuse and destroyed
    /// afterwards. Returns `false` and changes nothing while the surface has
    /// no area, the swapchain stays flagged for recreation.
    ///
    /// # Safety
    ///
    /// The device must be idle.
    pub unsafe fn rebuild_swapchain(
        &mut self,
        surface: &SurfaceBinding,
        settings: &SwapchainSettings,
        drawable_size: (u32, u32),
    ) -> Result<bool, VkalError> {
        let support = surface.support()?;
        let extent =
            match choose_extent(&support.capabilities, drawable_size) {
                Some(extent) => extent,
                None => {
                    log::debug!("Surface has no area, swapchain deferred");
                    self.should_recreate = true;
                    return Ok(false);
                }
            };
        let present_mode = choose_present_mode(
            &support.present_modes,
            settings.prefer_mailbox,
        );
        let image_count = choose_image_count(&support.capabilities);

        let mut create_info = vk::SwapchainCreateInfoKHR::default()
            .surface(surface.surface)
            .min_image_count(image_count)
            .image_format(settings.format.format)
            .image_color_space(settings.format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .pre_transform(support.capabilities.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(present_mode)
            .clipped(true)
            .old_swapchain(self.swapchain);
        create_info = if settings.queue_family_indices.len() > 1 {
            create_info
                .image_sharing_mode(vk::SharingMode::CONCURRENT)
                .queue_family_indices(&settings.queue_family_indices)
        } else {
            create_info.image_sharing_mode(vk::SharingMode::EXCLUSIVE)
        };

        let swapchain = self
            .loader
            .create_swapchain(&create_info, None)
            .map_err(VkalError::from_vk)?;
        let images = match self.loader.get_swapchain_images(swapchain) {
            Ok(images) => images,
            Err(err) => {
                self.loader.destroy_swapchain(swapchain, None);
                return Err(VkalError::from_vk(err));
            }
        };

        if self.swapchain != vk::SwapchainKHR::null() {
            self.loader.destroy_swapchain(self.swapchain, None);
        }
        log::debug!(
            "Swapchain {}x{} with {} images, {:?} {:?}",
            extent.width,
            extent.height,
            images.len(),
            settings.format.format,
            present_mode
        );
        self.swapchain = swapchain;
        self.images = images;
        self.extent = extent;
        self.format = settings.format;
        self.present_mode = present_mode;
        self.built_for = drawable_size;
        self.should_recreate = false;
        Ok(true)
    }

    /// Build the depth buffer and one view and framebuffer per swapchain
    /// image.
    ///
    /// # Safety
    ///
    /// Existing targets must have been released with
    /// [SwapchainState::release_targets].
    pub unsafe fn build_targets(
        &mut self,
        device: &ash::Device,
        memory_properties: &MemoryProperties,
        registry: &mut HandleRegistry,
        allocator: &mut impl BlockAllocator,
        render_pass: RenderPassHandle,
        depth_format: vk::Format,
    ) -> Result<(), VkalError> {
        let depth = DepthBuffer::new(
            device,
            memory_properties,
            registry,
            allocator,
            depth_format,
            self.extent,
        )?;
        self.depth = Some(depth);
        let depth_view = *registry.image_views.get(depth.view)?;

        let images = &self.images;
        let format = self.format.format;
        let extent = self.extent;
        self.targets.build(images.len(), |index| {
            let view = create_image_view(
                device,
                registry,
                images[index],
                format,
                vk::ImageAspectFlags::COLOR,
                1,
            )?;
            let raw_view = *registry.image_views.get(view)?;
            match create_framebuffer(
                device,
                registry,
                render_pass,
                &[raw_view, depth_view],
                extent,
            ) {
                Ok(framebuffer) => Ok((view, framebuffer)),
                Err(err) => {
                    registry.destroy_image_view(device, view)?;
                    Err(err)
                }
            }
        })
    }

    /// Destroy the per-image views and framebuffers and the depth buffer.
    ///
    /// # Safety
    ///
    /// None of them may be in use by pending GPU work.
    pub unsafe fn release_targets(
        &mut self,
        device: &ash::Device,
        registry: &mut HandleRegistry,
        allocator: &mut impl BlockAllocator,
    ) -> Result<(), VkalError> {
        let released = self.targets.release(|view, framebuffer| {
            registry.destroy_framebuffer(device, framebuffer)?;
            registry.destroy_image_view(device, view)
        });
        if let Some(depth) = self.depth.take() {
            depth.destroy(device, registry, allocator)?;
        }
        released
    }

    /// Acquire the next image, signalling `image_available` once it can be
    /// rendered to.
    ///
    /// Returns `None` when the swapchain is out of date, after flagging it
    /// for recreation.
    ///
    /// # Safety
    ///
    /// The semaphore must be unsignaled with no pending signal operation.
    pub unsafe fn acquire_next_image(
        &mut self,
        image_available: vk::Semaphore,
        timeout_ns: u64,
    ) -> Result<Option<u32>, VkalError> {
        let acquired = self.loader.acquire_next_image(
            self.swapchain,
            timeout_ns,
            image_available,
            vk::Fence::null(),
        );
        match acquired {
            Ok((index, suboptimal)) => {
                if suboptimal {
                    self.should_recreate = true;
                }
                Ok(Some(index))
            }
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                self.should_recreate = true;
                Ok(None)
            }
            Err(vk::Result::TIMEOUT | vk::Result::NOT_READY) => {
                Err(VkalError::FenceTimeout(timeout_ns))
            }
            Err(err) => Err(VkalError::from_vk(err)),
        }
    }

    /// Present an image once `render_finished` is signaled. An out of date
    /// or suboptimal swapchain is flagged for recreation, not reported.
    ///
    /// # Safety
    ///
    /// The image must have been acquired and rendered to.
    pub unsafe fn present(
        &mut self,
        queue: vk::Queue,
        render_finished: vk::Semaphore,
        image_index: u32,
    ) -> Result<(), VkalError> {
        let wait_semaphores = [render_finished];
        let swapchains = [self.swapchain];
        let image_indices = [image_index];
        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);
        match self.loader.queue_present(queue, &present_info) {
            Ok(false) => Ok(()),
            Ok(true) | Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                self.should_recreate = true;
                Ok(())
            }
            Err(err) => Err(VkalError::from_vk(err)),
        }
    }

    /// # Safety
    ///
    /// The device must be idle.
    pub unsafe fn destroy(
        &mut self,
        device: &ash::Device,
        registry: &mut HandleRegistry,
        allocator: &mut impl BlockAllocator,
    ) -> Result<(), VkalError> {
        let released = self.release_targets(device, registry, allocator);
        if self.swapchain != vk::SwapchainKHR::null() {
            self.loader.destroy_swapchain(self.swapchain, None);
            self.swapchain = vk::SwapchainKHR::null();
        }
        self.images.clear();
        released
    }

    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    pub fn format(&self) -> vk::SurfaceFormatKHR {
        self.format
    }

    pub fn present_mode(&self) -> vk::PresentModeKHR {
        self.present_mode
    }

    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    pub fn targets(&self) -> &ImageTargets {
        &self.targets
    }

    pub fn depth(&self) -> Option<&DepthBuffer> {
        self.depth.as_ref()
    }

    pub fn framebuffer(
        &self,
        image_index: u32,
    ) -> Result<FramebufferHandle, VkalError> {
        self.targets.framebuffer(image_index)
    }

    pub fn should_recreate(&self) -> bool {
        self.should_recreate
    }

    pub fn request_recreate(&mut self) {
        self.should_recreate = true;
    }

    /// True when the window has been resized since the swapchain was built.
    pub fn is_stale_for(&self, drawable_size: (u32, u32)) -> bool {
        drawable_size != self.built_for
    }
}

/// Find a depth format the physical device supports.
///
/// # Safety
///
/// The physical device must belong to the instance.
pub unsafe fn find_depth_format(
    instance: &ash::Instance,
    physical_device: vk::PhysicalDevice,
) -> Result<vk::Format, VkalError> {
    choose_depth_format(|format| {
        instance
            .get_physical_device_format_properties(physical_device, format)
            .optimal_tiling_features
            .contains(vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT)
    })
    .context("No supported depth attachment format")
    .map_err(VkalError::from)
}
