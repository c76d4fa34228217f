use {crate::VkalError, ash::vk};

/// The synchronization objects for one in-flight slot.
#[derive(Debug, Copy, Clone)]
pub struct FrameSync {
    pub image_available: vk::Semaphore,
    pub render_finished: vk::Semaphore,

    /// Signaled when the GPU has finished the slot's last submission.
    pub in_flight: vk::Fence,
}

impl FrameSync {
    /// The fence starts signaled so the first wait on a fresh slot returns
    /// immediately.
    ///
    /// # Safety
    ///
    /// [FrameSync::destroy] must be called before the device is destroyed.
    pub unsafe fn new(device: &ash::Device) -> Result<Self, VkalError> {
        let semaphore_info = vk::SemaphoreCreateInfo::default();
        let image_available = device
            .create_semaphore(&semaphore_info, None)
            .map_err(VkalError::from_vk)?;
        let created = device.create_semaphore(&semaphore_info, None);
        let render_finished = match created {
            Ok(semaphore) => semaphore,
            Err(err) => {
                device.destroy_semaphore(image_available, None);
                return Err(VkalError::from_vk(err));
            }
        };
        let fence_info = vk::FenceCreateInfo::default()
            .flags(vk::FenceCreateFlags::SIGNALED);
        let in_flight = match device.create_fence(&fence_info, None) {
            Ok(fence) => fence,
            Err(err) => {
                device.destroy_semaphore(image_available, None);
                device.destroy_semaphore(render_finished, None);
                return Err(VkalError::from_vk(err));
            }
        };
        Ok(Self {
            image_available,
            render_finished,
            in_flight,
        })
    }

    /// Create one set of objects per slot.
    ///
    /// # Safety
    ///
    /// Every returned set must be destroyed before the device.
    pub unsafe fn for_slots(
        device: &ash::Device,
        count: usize,
    ) -> Result<Vec<Self>, VkalError> {
        let mut syncs = Vec::with_capacity(count);
        for _ in 0..count {
            match Self::new(device) {
                Ok(sync) => syncs.push(sync),
                Err(err) => {
                    for sync in syncs {
                        sync.destroy(device);
                    }
                    return Err(err);
                }
            }
        }
        Ok(syncs)
    }

    /// # Safety
    ///
    /// The objects must not be in use.
    pub unsafe fn destroy(self, device: &ash::Device) {
        device.destroy_fence(self.in_flight, None);
        device.destroy_semaphore(self.render_finished, None);
        device.destroy_semaphore(self.image_available, None);
    }
}
