use {
    crate::{
        image::{
            create_image, create_image_view, release_dedicated_image,
            ImageDesc, ImageMemory,
        },
        BlockAllocator, HandleRegistry, ImageHandle, ImageViewHandle,
        MemoryBlockHandle, MemoryProperties, VkalError,
    },
    ash::vk,
};

/// The depth attachment shared by every swapchain framebuffer.
///
/// It lives in a block of its own so recreating it at a new size returns
/// the old memory instead of leaving it claimed.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct DepthBuffer {
    pub image: ImageHandle,
    pub view: ImageViewHandle,
    pub memory: MemoryBlockHandle,
    pub format: vk::Format,
}

impl DepthBuffer {
    /// # Safety
    ///
    /// [DepthBuffer::destroy] must be called with the same allocator.
    pub unsafe fn new(
        device: &ash::Device,
        memory_properties: &MemoryProperties,
        registry: &mut HandleRegistry,
        allocator: &mut impl BlockAllocator,
        format: vk::Format,
        extent: vk::Extent2D,
    ) -> Result<Self, VkalError> {
        let desc = ImageDesc::new(
            extent.width,
            extent.height,
            format,
            vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
        );
        let (image, memory) = create_image(
            device,
            memory_properties,
            registry,
            allocator,
            &desc,
            ImageMemory::Dedicated,
        )?;
        let raw_image = *registry.images.get(image)?;
        let view = match create_image_view(
            device,
            registry,
            raw_image,
            format,
            vk::ImageAspectFlags::DEPTH,
            1,
        ) {
            Ok(view) => view,
            Err(err) => {
                release_dedicated_image(
                    device, registry, allocator, image, memory,
                )?;
                return Err(err);
            }
        };
        Ok(Self {
            image,
            view,
            memory,
            format,
        })
    }

    /// # Safety
    ///
    /// The depth buffer must not be in use by pending GPU work.
    pub unsafe fn destroy(
        self,
        device: &ash::Device,
        registry: &mut HandleRegistry,
        allocator: &mut impl BlockAllocator,
    ) -> Result<(), VkalError> {
        registry.destroy_image_view(device, self.view)?;
        release_dedicated_image(
            device,
            registry,
            allocator,
            self.image,
            self.memory,
        )
    }
}
