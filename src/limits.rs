//! Fixed capacities for every registry table and per-frame ring.
//!
//! Running out of any of these is a configuration error. Raise the constant
//! rather than expecting the tables to grow.

pub const MAX_MEMORY_BLOCKS: usize = 32;
pub const MAX_IMAGES: usize = 128;
pub const MAX_IMAGE_VIEWS: usize = 128;
pub const MAX_SHADER_MODULES: usize = 64;
pub const MAX_PIPELINE_LAYOUTS: usize = 32;
pub const MAX_DESCRIPTOR_SET_LAYOUTS: usize = 32;
pub const MAX_PIPELINES: usize = 32;
pub const MAX_SAMPLERS: usize = 32;
pub const MAX_FRAMEBUFFERS: usize = 32;
pub const MAX_RENDER_PASSES: usize = 8;
pub const MAX_TEXTURES: usize = 64;
pub const MAX_SWAPCHAIN_IMAGES: usize = 8;
pub const MAX_FRAMES_IN_FLIGHT: usize = 4;
