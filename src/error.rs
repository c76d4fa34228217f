use {
    crate::pretty_wrappers::{PrettyBitflag, PrettySize},
    ash::vk,
    thiserror::Error,
};

#[derive(Error, Debug)]
pub enum VkalError {
    #[error("No memory type for bits {0} and flags {1:#?}")]
    NoSupportedTypeForProperties(PrettyBitflag, vk::MemoryPropertyFlags),

    #[error("The {kind} table is full ({capacity} slots)")]
    RegistryFull { kind: &'static str, capacity: usize },

    #[error("Stale {kind} handle: slot {index} generation {generation}")]
    StaleHandle {
        kind: &'static str,
        index: u32,
        generation: u32,
    },

    #[error("Requested {requested} but only {available} remain in {name}")]
    OutOfSpace {
        name: &'static str,
        requested: PrettySize,
        available: PrettySize,
    },

    #[error("Host mapping access at {offset} with {len} bytes exceeds {size}")]
    MappingOutOfBounds { offset: u64, len: u64, size: u64 },

    #[error("{0} is not host visible")]
    NotHostVisible(&'static str),

    #[error("No descriptor sets left: {requested} wanted, {remaining} left")]
    DescriptorPoolExhausted { requested: u32, remaining: u32 },

    #[error("Shader byte-code is not valid SPIR-V: {0}")]
    InvalidShaderCode(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Frame operation {operation} called while {phase}")]
    FrameOrder {
        operation: &'static str,
        phase: &'static str,
    },

    #[error("The swapchain is out of date")]
    SwapchainOutOfDate,

    #[error("Timed out waiting on a fence after {0} ns")]
    FenceTimeout(u64),

    #[error("The logical device was lost")]
    DeviceLost,

    #[error("The presentation surface was lost")]
    SurfaceLost,

    #[error("Out of device memory")]
    OutOfDeviceMemory,

    #[error("Vulkan call failed: {0}")]
    Vulkan(vk::Result),

    #[error(transparent)]
    RuntimeError(#[from] anyhow::Error),
}

impl VkalError {
    /// Classify a raw Vulkan result into the error taxonomy.
    pub fn from_vk(result: vk::Result) -> Self {
        match result {
            vk::Result::ERROR_DEVICE_LOST => Self::DeviceLost,
            vk::Result::ERROR_SURFACE_LOST_KHR => Self::SurfaceLost,
            vk::Result::ERROR_OUT_OF_DEVICE_MEMORY => Self::OutOfDeviceMemory,
            vk::Result::ERROR_OUT_OF_DATE_KHR => Self::SwapchainOutOfDate,
            other => Self::Vulkan(other),
        }
    }

    /// True when the application cannot continue rendering with the current
    /// device and must tear everything down.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::DeviceLost
                | Self::SurfaceLost
                | Self::OutOfDeviceMemory
                | Self::FenceTimeout(_)
        )
    }
}

impl From<vk::Result> for VkalError {
    fn from(result: vk::Result) -> Self {
        Self::from_vk(result)
    }
}
