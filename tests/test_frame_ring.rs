//! Tests for driving whole frames through the frame ring, including frames
//! skipped while the swapchain is rebuilt.

use {
    anyhow::Result,
    assert2::{check, let_assert},
    ccthw_vkal::{
        frame::{FramePhase, FrameRing},
        VkalError,
    },
};

mod common;

fn run_frame(ring: &mut FrameRing, image_index: u32) -> Result<()> {
    ring.image_acquired(image_index)?;
    ring.begin_recording(image_index)?;
    ring.begin_render_pass(image_index)?;
    ring.check_recording("draw_indexed", image_index)?;
    ring.end_render_pass()?;
    ring.end_recording(image_index)?;
    let submitted = ring.check_submit()?;
    check!(submitted == image_index);
    ring.submitted()?;
    let presented = ring.check_present()?;
    check!(presented == image_index);
    ring.presented()?;
    Ok(())
}

#[test]
fn test_slots_cycle_independently_of_images() -> Result<()> {
    common::setup_logger();

    let mut ring = FrameRing::new(2);
    let mut slots = vec![];
    for image_index in [0, 1, 2, 0, 1, 2] {
        slots.push(ring.slot());
        run_frame(&mut ring, image_index)?;
    }

    check!(slots == vec![0, 1, 0, 1, 0, 1]);
    check!(ring.frames_presented() == 6);
    check!(ring.phase() == FramePhase::Presented);

    Ok(())
}

#[test]
fn test_resize_skips_frames_without_advancing() -> Result<()> {
    common::setup_logger();

    let mut ring = FrameRing::new(2);
    run_frame(&mut ring, 0)?;
    let slot = ring.slot();

    // Out of date swapchain, then a minimised window.
    ring.skipped()?;
    ring.skipped()?;
    check!(ring.slot() == slot);
    check!(ring.phase() == FramePhase::Idle);
    check!(ring.image_index() == None);

    run_frame(&mut ring, 1)?;
    check!(ring.frames_presented() == 2);

    Ok(())
}

#[test]
fn test_out_of_order_calls_are_refused() -> Result<()> {
    common::setup_logger();

    let mut ring = FrameRing::new(2);
    let_assert!(
        Err(VkalError::FrameOrder {
            operation: "present",
            phase: "idle"
        }) = ring.check_present()
    );

    ring.image_acquired(1)?;
    check!(ring.image_acquired(1).is_err());
    check!(ring.submitted().is_err());
    check!(ring.begin_recording(0).is_err());
    check!(ring.phase() == FramePhase::ImageAcquired);

    ring.begin_recording(1)?;
    ring.begin_render_pass(1)?;
    let_assert!(
        Err(VkalError::FrameOrder {
            operation: "end_command_buffer",
            ..
        }) = ring.end_recording(1)
    );

    ring.abandon();
    check!(ring.phase() == FramePhase::Idle);
    check!(!ring.in_render_pass());
    run_frame(&mut ring, 0)?;

    Ok(())
}
