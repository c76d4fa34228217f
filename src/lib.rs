//! A thin resource layer over Vulkan: generational handles for native
//! objects, bump-allocated buffers on large memory blocks, and a frame loop
//! which survives swapchain invalidation.

pub mod commands;
pub mod descriptor;
pub mod frame;
pub mod image;
pub mod limits;
pub mod pipeline;
pub mod swapchain;

mod buffer;
mod config;
mod context;
mod error;
mod memory;
mod pretty_wrappers;
mod registry;
mod surface;
mod texture;

pub use self::{
    buffer::{
        Buffer, DefaultBuffers, HostMapping, HostOnly, LinearBuffer,
        StagingUploader, UniformBuffer, Uploader,
    },
    config::VkalConfig,
    context::{DeviceInfo, VkalContext},
    error::VkalError,
    memory::{
        allocate_block, best_fit_block, claim_from_blocks, into_shared,
        register_block, AllocationRequirements, BlockAllocator, BlockMetrics,
        DeviceAllocator, DeviceMemoryBlock, FakeAllocator, LinearCursor,
        MemoryProperties, TraceAllocator,
    },
    pretty_wrappers::{PrettyBitflag, PrettySize},
    registry::{
        DescriptorSetLayoutHandle, FramebufferHandle, Handle, HandleRegistry,
        ImageHandle, ImageViewHandle, MemoryBlockHandle, PipelineHandle,
        PipelineLayoutHandle, RenderPassHandle, SamplerHandle,
        ShaderModuleHandle, SlotTable, TextureHandle,
    },
    surface::{SurfaceBinding, SurfaceSupport, WindowSurface},
    texture::{
        expected_pixel_bytes, format_channels, row_bands, VkalTexture,
    },
};
