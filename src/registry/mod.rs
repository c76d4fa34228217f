//! Per-kind tables of native objects addressed by generational handles.
//!
//! Each kind has its own fixed-capacity table. Creation is done by the
//! builder modules, which insert the native object once it exists. The
//! `destroy_*` functions here remove the entry and release the native object.

mod handle;
mod slot_table;

use {
    crate::{
        limits::*, BlockAllocator, DeviceMemoryBlock, VkalError, VkalTexture,
    },
    ash::vk,
};

pub use self::{handle::Handle, slot_table::SlotTable};

pub type MemoryBlockHandle = Handle<DeviceMemoryBlock>;
pub type ImageHandle = Handle<vk::Image>;
pub type ImageViewHandle = Handle<vk::ImageView>;
pub type ShaderModuleHandle = Handle<vk::ShaderModule>;
pub type PipelineLayoutHandle = Handle<vk::PipelineLayout>;
pub type DescriptorSetLayoutHandle = Handle<vk::DescriptorSetLayout>;
pub type PipelineHandle = Handle<vk::Pipeline>;
pub type SamplerHandle = Handle<vk::Sampler>;
pub type FramebufferHandle = Handle<vk::Framebuffer>;
pub type RenderPassHandle = Handle<vk::RenderPass>;
pub type TextureHandle = Handle<VkalTexture>;

pub struct HandleRegistry {
    pub memory_blocks: SlotTable<DeviceMemoryBlock>,
    pub images: SlotTable<vk::Image>,
    pub image_views: SlotTable<vk::ImageView>,
    pub shader_modules: SlotTable<vk::ShaderModule>,
    pub pipeline_layouts: SlotTable<vk::PipelineLayout>,
    pub descriptor_set_layouts: SlotTable<vk::DescriptorSetLayout>,
    pub pipelines: SlotTable<vk::Pipeline>,
    pub samplers: SlotTable<vk::Sampler>,
    pub framebuffers: SlotTable<vk::Framebuffer>,
    pub render_passes: SlotTable<vk::RenderPass>,
    pub textures: SlotTable<VkalTexture>,
}

impl Default for HandleRegistry {
    fn default() -> Self {
        Self {
            memory_blocks: SlotTable::new("memory block", MAX_MEMORY_BLOCKS),
            images: SlotTable::new("image", MAX_IMAGES),
            image_views: SlotTable::new("image view", MAX_IMAGE_VIEWS),
            shader_modules: SlotTable::new(
                "shader module",
                MAX_SHADER_MODULES,
            ),
            pipeline_layouts: SlotTable::new(
                "pipeline layout",
                MAX_PIPELINE_LAYOUTS,
            ),
            descriptor_set_layouts: SlotTable::new(
                "descriptor set layout",
                MAX_DESCRIPTOR_SET_LAYOUTS,
            ),
            pipelines: SlotTable::new("pipeline", MAX_PIPELINES),
            samplers: SlotTable::new("sampler", MAX_SAMPLERS),
            framebuffers: SlotTable::new("framebuffer", MAX_FRAMEBUFFERS),
            render_passes: SlotTable::new("render pass", MAX_RENDER_PASSES),
            textures: SlotTable::new("texture", MAX_TEXTURES),
        }
    }
}

// Public API
// ----------

impl HandleRegistry {
    /// The total number of live objects across every table.
    pub fn live_count(&self) -> usize {
        self.memory_blocks.len()
            + self.images.len()
            + self.image_views.len()
            + self.shader_modules.len()
            + self.pipeline_layouts.len()
            + self.descriptor_set_layouts.len()
            + self.pipelines.len()
            + self.samplers.len()
            + self.framebuffers.len()
            + self.render_passes.len()
            + self.textures.len()
    }

    /// Unregister a memory block and return it to the allocator.
    ///
    /// # Safety
    ///
    /// Every image or buffer bound into the block must already be destroyed.
    pub unsafe fn destroy_memory_block(
        &mut self,
        allocator: &mut impl BlockAllocator,
        handle: MemoryBlockHandle,
    ) -> Result<(), VkalError> {
        allocator.free(self.memory_blocks.remove(handle)?);
        Ok(())
    }

    /// # Safety
    ///
    /// The image must not be in use by the GPU, and its memory is not
    /// returned (see [DeviceMemoryBlock]).
    pub unsafe fn destroy_image(
        &mut self,
        device: &ash::Device,
        handle: ImageHandle,
    ) -> Result<(), VkalError> {
        device.destroy_image(self.images.remove(handle)?, None);
        Ok(())
    }

    /// # Safety
    ///
    /// The view must not be referenced by pending GPU work.
    pub unsafe fn destroy_image_view(
        &mut self,
        device: &ash::Device,
        handle: ImageViewHandle,
    ) -> Result<(), VkalError> {
        device.destroy_image_view(self.image_views.remove(handle)?, None);
        Ok(())
    }

    /// # Safety
    ///
    /// Pipelines built from the module may still be used afterwards, but the
    /// module itself must not be referenced again.
    pub unsafe fn destroy_shader_module(
        &mut self,
        device: &ash::Device,
        handle: ShaderModuleHandle,
    ) -> Result<(), VkalError> {
        device
            .destroy_shader_module(self.shader_modules.remove(handle)?, None);
        Ok(())
    }

    /// # Safety
    ///
    /// No pipeline created with this layout may be in use.
    pub unsafe fn destroy_pipeline_layout(
        &mut self,
        device: &ash::Device,
        handle: PipelineLayoutHandle,
    ) -> Result<(), VkalError> {
        device.destroy_pipeline_layout(
            self.pipeline_layouts.remove(handle)?,
            None,
        );
        Ok(())
    }

    /// # Safety
    ///
    /// Descriptor sets allocated with this layout must not be used for new
    /// allocations or updates afterwards.
    pub unsafe fn destroy_descriptor_set_layout(
        &mut self,
        device: &ash::Device,
        handle: DescriptorSetLayoutHandle,
    ) -> Result<(), VkalError> {
        device.destroy_descriptor_set_layout(
            self.descriptor_set_layouts.remove(handle)?,
            None,
        );
        Ok(())
    }

    /// # Safety
    ///
    /// The pipeline must not be bound in any command buffer still in flight.
    pub unsafe fn destroy_pipeline(
        &mut self,
        device: &ash::Device,
        handle: PipelineHandle,
    ) -> Result<(), VkalError> {
        device.destroy_pipeline(self.pipelines.remove(handle)?, None);
        Ok(())
    }

    /// # Safety
    ///
    /// The sampler must not be referenced by pending GPU work.
    pub unsafe fn destroy_sampler(
        &mut self,
        device: &ash::Device,
        handle: SamplerHandle,
    ) -> Result<(), VkalError> {
        device.destroy_sampler(self.samplers.remove(handle)?, None);
        Ok(())
    }

    /// # Safety
    ///
    /// The framebuffer must not be referenced by pending GPU work.
    pub unsafe fn destroy_framebuffer(
        &mut self,
        device: &ash::Device,
        handle: FramebufferHandle,
    ) -> Result<(), VkalError> {
        device.destroy_framebuffer(self.framebuffers.remove(handle)?, None);
        Ok(())
    }

    /// # Safety
    ///
    /// Framebuffers and pipelines built against the render pass must be
    /// destroyed or rebuilt by the caller.
    pub unsafe fn destroy_render_pass(
        &mut self,
        device: &ash::Device,
        handle: RenderPassHandle,
    ) -> Result<(), VkalError> {
        device.destroy_render_pass(self.render_passes.remove(handle)?, None);
        Ok(())
    }

    /// Destroy every live object in every table.
    ///
    /// # Safety
    ///
    /// The device must be idle.
    pub unsafe fn destroy_all(
        &mut self,
        device: &ash::Device,
        allocator: &mut impl BlockAllocator,
    ) {
        let live = self.live_count();
        // Textures only bundle handles from the other tables.
        self.textures.drain();
        for pipeline in self.pipelines.drain() {
            device.destroy_pipeline(pipeline, None);
        }
        for layout in self.pipeline_layouts.drain() {
            device.destroy_pipeline_layout(layout, None);
        }
        for layout in self.descriptor_set_layouts.drain() {
            device.destroy_descriptor_set_layout(layout, None);
        }
        for module in self.shader_modules.drain() {
            device.destroy_shader_module(module, None);
        }
        for framebuffer in self.framebuffers.drain() {
            device.destroy_framebuffer(framebuffer, None);
        }
        for render_pass in self.render_passes.drain() {
            device.destroy_render_pass(render_pass, None);
        }
        for sampler in self.samplers.drain() {
            device.destroy_sampler(sampler, None);
        }
        for view in self.image_views.drain() {
            device.destroy_image_view(view, None);
        }
        for image in self.images.drain() {
            device.destroy_image(image, None);
        }
        for block in self.memory_blocks.drain() {
            allocator.free(block);
        }
        log::info!("Destroyed {} registered objects", live);
    }
}
