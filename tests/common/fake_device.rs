//! An `ash::Device` whose few needed entry points are local functions.
//!
//! Create calls hand out increasing fake handles and destroy calls only
//! count. Any other entry point is left unloaded and panics when called.

use {
    ash::vk::{self, Handle},
    std::{
        ffi::{c_void, CStr},
        sync::atomic::{AtomicU64, AtomicUsize, Ordering},
    },
};

static NEXT_HANDLE: AtomicU64 = AtomicU64::new(0x1000);
static DESTROYED: AtomicUsize = AtomicUsize::new(0);

/// How many destroy calls reached the device so far, across every test in
/// the binary.
pub fn destroyed_count() -> usize {
    DESTROYED.load(Ordering::SeqCst)
}

/// A device where `vkBindImageMemory` either succeeds or reports
/// `ERROR_OUT_OF_DEVICE_MEMORY`.
///
/// Every image asks for 4 KiB aligned to 256 bytes from memory type 0.
/// Every buffer asks for 256 bytes aligned to 64 from memory types 1 or 2.
pub fn fake_device(bind_succeeds: bool) -> ash::Device {
    unsafe {
        ash::Device::load_with(
            |name| entry_point(name, bind_succeeds),
            vk::Device::null(),
        )
    }
}

fn entry_point(name: &CStr, bind_succeeds: bool) -> *const c_void {
    match name.to_bytes() {
        b"vkCreateBuffer" => create_buffer as *const c_void,
        b"vkGetBufferMemoryRequirements" => {
            buffer_memory_requirements as *const c_void
        }
        b"vkDestroyBuffer" => destroy_buffer as *const c_void,
        b"vkCreateImage" => create_image as *const c_void,
        b"vkCreateImageView" => create_image_view as *const c_void,
        b"vkCreateSampler" => create_sampler as *const c_void,
        b"vkCreateFramebuffer" => create_framebuffer as *const c_void,
        b"vkGetImageMemoryRequirements" => {
            image_memory_requirements as *const c_void
        }
        b"vkBindImageMemory" if bind_succeeds => {
            bind_image_memory_ok as *const c_void
        }
        b"vkBindImageMemory" => bind_image_memory_oom as *const c_void,
        b"vkDestroyImage" => destroy_image as *const c_void,
        b"vkDestroyImageView" => destroy_image_view as *const c_void,
        b"vkDestroySampler" => destroy_sampler as *const c_void,
        b"vkDestroyFramebuffer" => destroy_framebuffer as *const c_void,
        _ => std::ptr::null(),
    }
}

fn next_handle<T: Handle>() -> T {
    T::from_raw(NEXT_HANDLE.fetch_add(1, Ordering::SeqCst))
}

unsafe extern "system" fn create_buffer(
    _device: vk::Device,
    _create_info: *const vk::BufferCreateInfo<'_>,
    _allocator: *const vk::AllocationCallbacks<'_>,
    buffer: *mut vk::Buffer,
) -> vk::Result {
    *buffer = next_handle();
    vk::Result::SUCCESS
}

unsafe extern "system" fn buffer_memory_requirements(
    _device: vk::Device,
    _buffer: vk::Buffer,
    requirements: *mut vk::MemoryRequirements,
) {
    *requirements = vk::MemoryRequirements {
        size: 256,
        alignment: 64,
        memory_type_bits: 0b110,
    };
}

unsafe extern "system" fn destroy_buffer(
    _device: vk::Device,
    _buffer: vk::Buffer,
    _allocator: *const vk::AllocationCallbacks<'_>,
) {
    DESTROYED.fetch_add(1, Ordering::SeqCst);
}

unsafe extern "system" fn create_image(
    _device: vk::Device,
    _create_info: *const vk::ImageCreateInfo<'_>,
    _allocator: *const vk::AllocationCallbacks<'_>,
    image: *mut vk::Image,
) -> vk::Result {
    *image = next_handle();
    vk::Result::SUCCESS
}

unsafe extern "system" fn create_image_view(
    _device: vk::Device,
    _create_info: *const vk::ImageViewCreateInfo<'_>,
    _allocator: *const vk::AllocationCallbacks<'_>,
    view: *mut vk::ImageView,
) -> vk::Result {
    *view = next_handle();
    vk::Result::SUCCESS
}

unsafe extern "system" fn create_sampler(
    _device: vk::Device,
    _create_info: *const vk::SamplerCreateInfo<'_>,
    _allocator: *const vk::AllocationCallbacks<'_>,
    sampler: *mut vk::Sampler,
) -> vk::Result {
    *sampler = next_handle();
    vk::Result::SUCCESS
}

unsafe extern "system" fn create_framebuffer(
    _device: vk::Device,
    _create_info: *const vk::FramebufferCreateInfo<'_>,
    _allocator: *const vk::AllocationCallbacks<'_>,
    framebuffer: *mut vk::Framebuffer,
) -> vk::Result {
    *framebuffer = next_handle();
    vk::Result::SUCCESS
}

unsafe extern "system" fn image_memory_requirements(
    _device: vk::Device,
    _image: vk::Image,
    requirements: *mut vk::MemoryRequirements,
) {
    *requirements = vk::MemoryRequirements {
        size: 4096,
        alignment: 256,
        memory_type_bits: 0b001,
    };
}

unsafe extern "system" fn bind_image_memory_ok(
    _device: vk::Device,
    _image: vk::Image,
    _memory: vk::DeviceMemory,
    _offset: vk::DeviceSize,
) -> vk::Result {
    vk::Result::SUCCESS
}

unsafe extern "system" fn bind_image_memory_oom(
    _device: vk::Device,
    _image: vk::Image,
    _memory: vk::DeviceMemory,
    _offset: vk::DeviceSize,
) -> vk::Result {
    vk::Result::ERROR_OUT_OF_DEVICE_MEMORY
}

unsafe extern "system" fn destroy_image(
    _device: vk::Device,
    _image: vk::Image,
    _allocator: *const vk::AllocationCallbacks<'_>,
) {
    DESTROYED.fetch_add(1, Ordering::SeqCst);
}

unsafe extern "system" fn destroy_image_view(
    _device: vk::Device,
    _view: vk::ImageView,
    _allocator: *const vk::AllocationCallbacks<'_>,
) {
    DESTROYED.fetch_add(1, Ordering::SeqCst);
}

unsafe extern "system" fn destroy_sampler(
    _device: vk::Device,
    _sampler: vk::Sampler,
    _allocator: *const vk::AllocationCallbacks<'_>,
) {
    DESTROYED.fetch_add(1, Ordering::SeqCst);
}

unsafe extern "system" fn destroy_framebuffer(
    _device: vk::Device,
    _framebuffer: vk::Framebuffer,
    _allocator: *const vk::AllocationCallbacks<'_>,
) {
    DESTROYED.fetch_add(1, Ordering::SeqCst);
}
