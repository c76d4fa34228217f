//! The per-frame state machine and the ring of in-flight slots.
//!
//! A frame moves through
//! `Idle -> ImageAcquired -> Recording -> CommandsRecorded -> Submitted ->
//! Presented`, and the next acquire starts over from `Presented` (or from
//! `Idle` after a skipped frame). Calls out of order fail with
//! [VkalError::FrameOrder] and leave the state untouched.

mod sync;

use crate::VkalError;

pub use self::sync::FrameSync;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum FramePhase {
    Idle,
    ImageAcquired,
    Recording,
    CommandsRecorded,
    Submitted,
    Presented,
}

impl FramePhase {
    pub fn name(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::ImageAcquired => "image acquired",
            Self::Recording => "recording",
            Self::CommandsRecorded => "commands recorded",
            Self::Submitted => "submitted",
            Self::Presented => "presented",
        }
    }
}

/// Tracks the in-flight slot and the phase of the current frame.
///
/// Slots are decoupled from swapchain images: the slot picks the
/// synchronization objects, the acquired image index picks the command
/// buffer and framebuffer.
#[derive(Debug)]
pub struct FrameRing {
    slot_count: usize,
    slot: usize,
    phase: FramePhase,
    image_index: Option<u32>,
    in_render_pass: bool,
    frames_presented: u64,
}

impl FrameRing {
    pub fn new(slot_count: usize) -> Self {
        Self {
            slot_count: slot_count.max(1),
            slot: 0,
            phase: FramePhase::Idle,
            image_index: None,
            in_render_pass: false,
            frames_presented: 0,
        }
    }

    pub fn slot(&self) -> usize {
        self.slot
    }

    pub fn slot_count(&self) -> usize {
        self.slot_count
    }

    pub fn phase(&self) -> FramePhase {
        self.phase
    }

    pub fn image_index(&self) -> Option<u32> {
        self.image_index
    }

    pub fn in_render_pass(&self) -> bool {
        self.in_render_pass
    }

    pub fn frames_presented(&self) -> u64 {
        self.frames_presented
    }

    /// Check that a new frame may start.
    pub fn check_acquire(&self) -> Result<(), VkalError> {
        self.expect("acquire_image", &[FramePhase::Idle, FramePhase::Presented])
    }

    /// An image was acquired for the current slot.
    pub fn image_acquired(
        &mut self,
        image_index: u32,
    ) -> Result<(), VkalError> {
        self.check_acquire()?;
        self.phase = FramePhase::ImageAcquired;
        self.image_index = Some(image_index);
        Ok(())
    }

    /// The frame was skipped, typically because the swapchain is out of date.
    pub fn skipped(&mut self) -> Result<(), VkalError> {
        self.check_acquire()?;
        self.phase = FramePhase::Idle;
        self.image_index = None;
        Ok(())
    }

    pub fn begin_recording(
        &mut self,
        image_index: u32,
    ) -> Result<(), VkalError> {
        self.expect("begin_command_buffer", &[FramePhase::ImageAcquired])?;
        self.check_image("begin_command_buffer", image_index)?;
        self.phase = FramePhase::Recording;
        Ok(())
    }

    pub fn begin_render_pass(
        &mut self,
        image_index: u32,
    ) -> Result<(), VkalError> {
        self.expect("begin_render_pass", &[FramePhase::Recording])?;
        self.check_image("begin_render_pass", image_index)?;
        if self.in_render_pass {
            return Err(self.order_error("begin_render_pass"));
        }
        self.in_render_pass = true;
        Ok(())
    }

    /// Commands which need the image's command buffer to be recording.
    pub fn check_recording(
        &self,
        operation: &'static str,
        image_index: u32,
    ) -> Result<(), VkalError> {
        self.expect(operation, &[FramePhase::Recording])?;
        self.check_image(operation, image_index)
    }

    pub fn end_render_pass(&mut self) -> Result<(), VkalError> {
        self.expect("end_render_pass", &[FramePhase::Recording])?;
        if !self.in_render_pass {
            return Err(self.order_error("end_render_pass"));
        }
        self.in_render_pass = false;
        Ok(())
    }

    pub fn end_recording(
        &mut self,
        image_index: u32,
    ) -> Result<(), VkalError> {
        self.expect("end_command_buffer", &[FramePhase::Recording])?;
        self.check_image("end_command_buffer", image_index)?;
        if self.in_render_pass {
            return Err(self.order_error("end_command_buffer"));
        }
        self.phase = FramePhase::CommandsRecorded;
        Ok(())
    }

    /// Check that the recorded commands may be submitted. Returns the image
    /// they were recorded for.
    pub fn check_submit(&self) -> Result<u32, VkalError> {
        self.expect("submit", &[FramePhase::CommandsRecorded])?;
        self.current_image("submit")
    }

    pub fn submitted(&mut self) -> Result<(), VkalError> {
        self.check_submit()?;
        self.phase = FramePhase::Submitted;
        Ok(())
    }

    /// Check that the frame may be presented. Returns the image to present.
    pub fn check_present(&self) -> Result<u32, VkalError> {
        self.expect("present", &[FramePhase::Submitted])?;
        self.current_image("present")
    }

    /// The frame was handed to the presentation engine, the next frame uses
    /// the next slot.
    pub fn presented(&mut self) -> Result<(), VkalError> {
        self.check_present()?;
        self.phase = FramePhase::Presented;
        self.image_index = None;
        self.slot = (self.slot + 1) % self.slot_count;
        self.frames_presented += 1;
        Ok(())
    }

    /// Abandon the current frame after a failure part way through.
    pub fn abandon(&mut self) {
        self.phase = FramePhase::Idle;
        self.image_index = None;
        self.in_render_pass = false;
    }

    fn expect(
        &self,
        operation: &'static str,
        allowed: &[FramePhase],
    ) -> Result<(), VkalError> {
        if allowed.contains(&self.phase) {
            Ok(())
        } else {
            Err(self.order_error(operation))
        }
    }

    fn check_image(
        &self,
        operation: &'static str,
        image_index: u32,
    ) -> Result<(), VkalError> {
        let current = self.current_image(operation)?;
        if current != image_index {
            return Err(anyhow::anyhow!(
                "{} called for image {} but image {} was acquired",
                operation,
                image_index,
                current
            )
            .into());
        }
        Ok(())
    }

    fn current_image(
        &self,
        operation: &'static str,
    ) -> Result<u32, VkalError> {
        self.image_index.ok_or_else(|| self.order_error(operation))
    }

    fn order_error(&self, operation: &'static str) -> VkalError {
        VkalError::FrameOrder {
            operation,
            phase: self.phase.name(),
        }
    }
}

#[cfg(test)]
mod test {
    use {super::*, pretty_assertions::assert_eq};

    fn run_frame(ring: &mut FrameRing, image_index: u32) {
        ring.image_acquired(image_index).unwrap();
        ring.begin_recording(image_index).unwrap();
        ring.begin_render_pass(image_index).unwrap();
        ring.check_recording("draw", image_index).unwrap();
        ring.end_render_pass().unwrap();
        ring.end_recording(image_index).unwrap();
        ring.submitted().unwrap();
        ring.presented().unwrap();
    }

    #[test]
    fn slots_cycle_independently_of_images() {
        let mut ring = FrameRing::new(2);
        let mut slots = vec![];
        for image_index in [0, 1, 2, 0, 1, 2] {
            slots.push(ring.slot());
            run_frame(&mut ring, image_index);
        }
        assert_eq!(slots, vec![0, 1, 0, 1, 0, 1]);
        assert_eq!(ring.frames_presented(), 6);
        assert_eq!(ring.phase(), FramePhase::Presented);
    }

    #[test]
    fn submit_before_recording_is_an_order_error() {
        let mut ring = FrameRing::new(2);
        ring.image_acquired(0).unwrap();
        let err = ring.submitted().unwrap_err();
        assert!(matches!(
            err,
            VkalError::FrameOrder {
                operation: "submit",
                phase: "image acquired"
            }
        ));
        assert_eq!(ring.phase(), FramePhase::ImageAcquired);
    }

    #[test]
    fn acquiring_twice_is_an_order_error() {
        let mut ring = FrameRing::new(3);
        ring.image_acquired(1).unwrap();
        assert!(ring.image_acquired(2).is_err());
        assert_eq!(ring.image_index(), Some(1));
    }

    #[test]
    fn skipped_frames_keep_the_slot() {
        let mut ring = FrameRing::new(2);
        ring.skipped().unwrap();
        assert_eq!(ring.phase(), FramePhase::Idle);
        assert_eq!(ring.slot(), 0);
        run_frame(&mut ring, 0);
        assert_eq!(ring.slot(), 1);
    }

    #[test]
    fn render_passes_must_be_closed_before_ending() {
        let mut ring = FrameRing::new(2);
        ring.image_acquired(0).unwrap();
        ring.begin_recording(0).unwrap();
        ring.begin_render_pass(0).unwrap();
        assert!(ring.begin_render_pass(0).is_err());
        assert!(ring.end_recording(0).is_err());
        ring.end_render_pass().unwrap();
        assert!(ring.end_render_pass().is_err());
        ring.end_recording(0).unwrap();
    }

    #[test]
    fn recording_for_another_image_is_rejected() {
        let mut ring = FrameRing::new(2);
        ring.image_acquired(2).unwrap();
        assert!(ring.begin_recording(1).is_err());
        assert_eq!(ring.phase(), FramePhase::ImageAcquired);
    }

    #[test]
    fn abandoned_frames_can_start_over() {
        let mut ring = FrameRing::new(2);
        ring.image_acquired(0).unwrap();
        ring.begin_recording(0).unwrap();
        ring.abandon();
        assert!(ring.check_acquire().is_ok());
        assert_eq!(ring.slot(), 0);
    }
}
