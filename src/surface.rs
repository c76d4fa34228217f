//! The window collaborator and the surface queries the swapchain needs.

use {crate::VkalError, anyhow::Context, ash::vk};

/// Supplies the current drawable size of the window a surface was created
/// for.
///
/// A size of zero in either dimension means the window is minimised and no
/// swapchain can be built for it.
pub trait WindowSurface {
    fn drawable_size(&self) -> (u32, u32);
}

impl<F> WindowSurface for F
where
    F: Fn() -> (u32, u32),
{
    fn drawable_size(&self) -> (u32, u32) {
        self()
    }
}

/// A surface together with the loader and physical device used to query it.
///
/// The surface is owned by the caller, it is never destroyed here.
#[derive(Clone)]
pub struct SurfaceBinding {
    pub loader: ash::khr::surface::Instance,
    pub surface: vk::SurfaceKHR,
    pub physical_device: vk::PhysicalDevice,
}

/// Everything the surface supports right now.
#[derive(Debug, Clone)]
pub struct SurfaceSupport {
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    pub formats: Vec<vk::SurfaceFormatKHR>,
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl SurfaceBinding {
    /// # Safety
    ///
    /// The surface must still be alive.
    pub unsafe fn support(&self) -> Result<SurfaceSupport, VkalError> {
        let capabilities = self
            .loader
            .get_physical_device_surface_capabilities(
                self.physical_device,
                self.surface,
            )
            .map_err(VkalError::from_vk)?;
        let formats = self
            .loader
            .get_physical_device_surface_formats(
                self.physical_device,
                self.surface,
            )
            .map_err(VkalError::from_vk)?;
        let present_modes = self
            .loader
            .get_physical_device_surface_present_modes(
                self.physical_device,
                self.surface,
            )
            .map_err(VkalError::from_vk)?;
        Ok(SurfaceSupport {
            capabilities,
            formats,
            present_modes,
        })
    }

    /// # Safety
    ///
    /// The surface must still be alive.
    pub unsafe fn supports_queue_family(
        &self,
        queue_family_index: u32,
    ) -> Result<bool, VkalError> {
        Ok(self
            .loader
            .get_physical_device_surface_support(
                self.physical_device,
                queue_family_index,
                self.surface,
            )
            .with_context(|| {
                format!(
                    "Error checking present support for queue family {}",
                    queue_family_index
                )
            })?)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn closures_are_window_surfaces() {
        let window = || (640, 480);
        assert_eq!(window.drawable_size(), (640, 480));
    }
}
