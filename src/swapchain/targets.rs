use crate::{FramebufferHandle, ImageViewHandle, VkalError};

type Target = (ImageViewHandle, FramebufferHandle);

/// The color view and framebuffer built for each swapchain image.
#[derive(Debug, Default)]
pub struct ImageTargets {
    views: Vec<ImageViewHandle>,
    framebuffers: Vec<FramebufferHandle>,
}

impl ImageTargets {
    pub fn len(&self) -> usize {
        self.framebuffers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.framebuffers.is_empty()
    }

    pub fn views(&self) -> &[ImageViewHandle] {
        &self.views
    }

    pub fn framebuffer(
        &self,
        image_index: u32,
    ) -> Result<FramebufferHandle, VkalError> {
        self.framebuffers
            .get(image_index as usize)
            .copied()
            .ok_or_else(|| {
                anyhow::anyhow!(
                    "No framebuffer for swapchain image {} of {}",
                    image_index,
                    self.framebuffers.len()
                )
                .into()
            })
    }

    /// Build one target per image. Targets must have been released first.
    ///
    /// When building fails part way the targets built so far are kept, so a
    /// later release still finds them.
    pub fn build(
        &mut self,
        image_count: usize,
        mut build: impl FnMut(usize) -> Result<Target, VkalError>,
    ) -> Result<(), VkalError> {
        if !self.is_empty() {
            return Err(anyhow::anyhow!(
                "{} swapchain targets were not released",
                self.len()
            )
            .into());
        }
        for index in 0..image_count {
            let (view, framebuffer) = build(index)?;
            self.views.push(view);
            self.framebuffers.push(framebuffer);
        }
        Ok(())
    }

    /// Release every target.
    ///
    /// Releasing continues past failures so no target is leaked, the first
    /// error is reported.
    pub fn release(
        &mut self,
        mut release: impl FnMut(
            ImageViewHandle,
            FramebufferHandle,
        ) -> Result<(), VkalError>,
    ) -> Result<(), VkalError> {
        let mut first_error = None;
        for (view, framebuffer) in
            self.views.drain(..).zip(self.framebuffers.drain(..))
        {
            if let Err(err) = release(view, framebuffer) {
                first_error.get_or_insert(err);
            }
        }
        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}
