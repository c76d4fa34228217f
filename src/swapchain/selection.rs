//! Pure choices made when (re)building a swapchain.

use {crate::limits::MAX_SWAPCHAIN_IMAGES, ash::vk};

/// Prefer 8-bit BGRA sRGB, otherwise take whatever the surface lists first.
pub fn choose_surface_format(
    formats: &[vk::SurfaceFormatKHR],
) -> Option<vk::SurfaceFormatKHR> {
    formats
        .iter()
        .find(|format| {
            format.format == vk::Format::B8G8R8A8_SRGB
                && format.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
        })
        .or_else(|| formats.first())
        .copied()
}

/// Mailbox when preferred and available, FIFO (always supported) otherwise.
pub fn choose_present_mode(
    present_modes: &[vk::PresentModeKHR],
    prefer_mailbox: bool,
) -> vk::PresentModeKHR {
    if prefer_mailbox && present_modes.contains(&vk::PresentModeKHR::MAILBOX) {
        vk::PresentModeKHR::MAILBOX
    } else {
        vk::PresentModeKHR::FIFO
    }
}

/// The surface's current extent when it dictates one, otherwise the window's
/// drawable size clamped to what the surface allows.
///
/// `None` while the surface has no area, for example when the window is
/// minimised. That state passes, so the swapchain should be built later.
pub fn choose_extent(
    capabilities: &vk::SurfaceCapabilitiesKHR,
    drawable_size: (u32, u32),
) -> Option<vk::Extent2D> {
    let extent = if capabilities.current_extent.width != u32::MAX {
        capabilities.current_extent
    } else {
        let (width, height) = drawable_size;
        vk::Extent2D {
            width: width.clamp(
                capabilities.min_image_extent.width,
                capabilities.max_image_extent.width,
            ),
            height: height.clamp(
                capabilities.min_image_extent.height,
                capabilities.max_image_extent.height,
            ),
        }
    };
    Some(extent).filter(|extent| extent.width > 0 && extent.height > 0)
}

/// One more image than the minimum, within the surface's maximum (zero means
/// unbounded) and the registry's per-image capacity.
pub fn choose_image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let mut count = capabilities.min_image_count + 1;
    if capabilities.max_image_count > 0 {
        count = count.min(capabilities.max_image_count);
    }
    count.min(MAX_SWAPCHAIN_IMAGES as u32)
}

/// The first candidate the device can use as an optimally tiled depth
/// attachment.
pub fn choose_depth_format(
    supports_depth_attachment: impl Fn(vk::Format) -> bool,
) -> Option<vk::Format> {
    [
        vk::Format::D32_SFLOAT,
        vk::Format::D32_SFLOAT_S8_UINT,
        vk::Format::D24_UNORM_S8_UINT,
    ]
    .into_iter()
    .find(|&format| supports_depth_attachment(format))
}

#[cfg(test)]
mod test {
    use {super::*, pretty_assertions::assert_eq};

    fn capabilities(min: u32, max: u32) -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            min_image_count: min,
            max_image_count: max,
            current_extent: vk::Extent2D {
                width: u32::MAX,
                height: u32::MAX,
            },
            min_image_extent: vk::Extent2D {
                width: 1,
                height: 1,
            },
            max_image_extent: vk::Extent2D {
                width: 4096,
                height: 2048,
            },
            ..Default::default()
        }
    }

    #[test]
    fn srgb_bgra_is_preferred() {
        let unorm = vk::SurfaceFormatKHR {
            format: vk::Format::B8G8R8A8_UNORM,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        };
        let srgb = vk::SurfaceFormatKHR {
            format: vk::Format::B8G8R8A8_SRGB,
            ..unorm
        };
        assert_eq!(choose_surface_format(&[unorm, srgb]), Some(srgb));
        assert_eq!(choose_surface_format(&[unorm]), Some(unorm));
        assert_eq!(choose_surface_format(&[]), None);
    }

    #[test]
    fn fifo_is_the_fallback() {
        let modes = [vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX];
        assert_eq!(
            choose_present_mode(&modes, true),
            vk::PresentModeKHR::MAILBOX
        );
        assert_eq!(
            choose_present_mode(&modes, false),
            vk::PresentModeKHR::FIFO
        );
        assert_eq!(
            choose_present_mode(&[vk::PresentModeKHR::FIFO], true),
            vk::PresentModeKHR::FIFO
        );
    }

    #[test]
    fn extent_is_clamped_to_the_surface() {
        let caps = capabilities(2, 0);
        assert_eq!(
            choose_extent(&caps, (8000, 600)),
            Some(vk::Extent2D {
                width: 4096,
                height: 600
            })
        );

        let fixed = vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D {
                width: 800,
                height: 600,
            },
            ..caps
        };
        assert_eq!(
            choose_extent(&fixed, (1, 1)),
            Some(vk::Extent2D {
                width: 800,
                height: 600
            })
        );
    }

    #[test]
    fn zero_surface_extent_defers_the_swapchain() {
        let minimised = vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D::default(),
            ..capabilities(2, 0)
        };
        assert_eq!(choose_extent(&minimised, (1280, 720)), None);

        let unbounded_but_empty = vk::SurfaceCapabilitiesKHR {
            min_image_extent: vk::Extent2D::default(),
            ..capabilities(2, 0)
        };
        assert_eq!(choose_extent(&unbounded_but_empty, (0, 720)), None);
    }

    #[test]
    fn image_count_respects_every_maximum() {
        assert_eq!(choose_image_count(&capabilities(2, 0)), 3);
        assert_eq!(choose_image_count(&capabilities(2, 2)), 2);
        assert_eq!(
            choose_image_count(&capabilities(16, 0)),
            MAX_SWAPCHAIN_IMAGES as u32
        );
    }

    #[test]
    fn depth_format_falls_through_candidates() {
        assert_eq!(
            choose_depth_format(|format| format != vk::Format::D32_SFLOAT),
            Some(vk::Format::D32_SFLOAT_S8_UINT)
        );
        assert_eq!(choose_depth_format(|_| false), None);
    }
}
