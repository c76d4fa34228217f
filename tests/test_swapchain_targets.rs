//! Tests for rebuilding the per-image swapchain targets, using registry
//! tables in place of a device.

use {
    anyhow::Result,
    ash::vk::{self, Handle as _},
    assert2::check,
    ccthw_vkal::{swapchain::ImageTargets, HandleRegistry, VkalError},
    scopeguard::defer,
    std::cell::Cell,
};

mod common;

fn build(
    targets: &mut ImageTargets,
    registry: &mut HandleRegistry,
    image_count: usize,
) -> Result<(), VkalError> {
    targets.build(image_count, |index| {
        let view = registry
            .image_views
            .insert(vk::ImageView::from_raw(index as u64 + 1))?;
        let framebuffer = registry
            .framebuffers
            .insert(vk::Framebuffer::from_raw(index as u64 + 1))?;
        Ok((view, framebuffer))
    })
}

fn release(
    targets: &mut ImageTargets,
    registry: &mut HandleRegistry,
) -> Result<(), VkalError> {
    targets.release(|view, framebuffer| {
        registry.framebuffers.remove(framebuffer)?;
        registry.image_views.remove(view)?;
        Ok(())
    })
}

#[test]
fn test_target_count_follows_image_count() -> Result<()> {
    common::setup_logger();

    let mut registry = HandleRegistry::default();
    let mut targets = ImageTargets::default();

    for image_count in [3, 2, 4, 4, 3] {
        release(&mut targets, &mut registry)?;
        build(&mut targets, &mut registry, image_count)?;

        check!(targets.len() == image_count);
        check!(targets.views().len() == image_count);
        check!(registry.image_views.len() == image_count);
        check!(registry.framebuffers.len() == image_count);
        check!(targets.framebuffer(image_count as u32 - 1).is_ok());
        check!(targets.framebuffer(image_count as u32).is_err());
    }

    release(&mut targets, &mut registry)?;
    check!(targets.is_empty());
    check!(registry.live_count() == 0);

    Ok(())
}

#[test]
fn test_building_twice_without_release_is_refused() -> Result<()> {
    common::setup_logger();

    let mut registry = HandleRegistry::default();
    let mut targets = ImageTargets::default();
    build(&mut targets, &mut registry, 3)?;

    check!(build(&mut targets, &mut registry, 3).is_err());
    check!(targets.len() == 3);
    check!(registry.live_count() == 6);

    Ok(())
}

#[test]
fn test_partial_builds_are_still_released() -> Result<()> {
    common::setup_logger();

    let mut registry = HandleRegistry::default();
    let mut targets = ImageTargets::default();

    let failed = targets.build(4, |index| {
        if index == 2 {
            return Err(VkalError::OutOfDeviceMemory);
        }
        let view = registry.image_views.insert(vk::ImageView::null())?;
        let framebuffer =
            registry.framebuffers.insert(vk::Framebuffer::null())?;
        Ok((view, framebuffer))
    });
    check!(failed.is_err());
    check!(targets.len() == 2);

    release(&mut targets, &mut registry)?;
    check!(registry.live_count() == 0);

    Ok(())
}

#[test]
fn test_release_continues_past_failures() -> Result<()> {
    common::setup_logger();

    let mut registry = HandleRegistry::default();
    let mut targets = ImageTargets::default();
    build(&mut targets, &mut registry, 3)?;

    let released = Cell::new(0);
    defer! {
        check!(released.get() == 3);
    }

    let result = targets.release(|view, framebuffer| {
        released.set(released.get() + 1);
        registry.framebuffers.remove(framebuffer)?;
        registry.image_views.remove(view)?;
        if released.get() == 1 {
            return Err(VkalError::DeviceLost);
        }
        Ok(())
    });

    check!(matches!(result, Err(VkalError::DeviceLost)));
    check!(targets.is_empty());
    check!(registry.live_count() == 0);

    Ok(())
}
