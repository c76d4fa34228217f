use {
    crate::{
        image::{
            cmd_copy_buffer_to_image, cmd_transition_image_layout,
            create_image, create_image_view, create_sampler, ImageDesc,
            ImageMemory, SamplerDesc,
        },
        pipeline::create_framebuffer,
        FramebufferHandle, HostOnly, ImageHandle, ImageViewHandle,
        MemoryBlockHandle, PrettySize, RenderPassHandle, SamplerHandle,
        TextureHandle, VkalContext, VkalError,
    },
    anyhow::anyhow,
    ash::vk,
};

/// A sampled image and everything needed to bind it.
///
/// The texture only bundles handles which live in the other registry tables.
/// Render targets additionally own a framebuffer.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct VkalTexture {
    pub image: ImageHandle,
    pub view: ImageViewHandle,
    pub sampler: SamplerHandle,
    pub memory: MemoryBlockHandle,
    pub framebuffer: Option<FramebufferHandle>,
    pub width: u32,
    pub height: u32,
    pub channels: u32,
    pub format: vk::Format,
}

/// The number of bytes a tightly packed image with these dimensions holds.
pub fn expected_pixel_bytes(
    width: u32,
    height: u32,
    channels: u32,
) -> Result<u64, VkalError> {
    (width as u64)
        .checked_mul(height as u64)
        .and_then(|texels| texels.checked_mul(channels as u64))
        .filter(|&bytes| bytes > 0)
        .ok_or_else(|| {
            anyhow!(
                "Invalid texture dimensions {}x{} with {} channels",
                width,
                height,
                channels
            )
            .into()
        })
}

/// The number of color channels in an uncompressed color format.
pub fn format_channels(format: vk::Format) -> Option<u32> {
    let channels = match format {
        vk::Format::R8_UNORM
        | vk::Format::R8_SRGB
        | vk::Format::R16_SFLOAT
        | vk::Format::R32_SFLOAT => 1,
        vk::Format::R8G8_UNORM
        | vk::Format::R8G8_SRGB
        | vk::Format::R16G16_SFLOAT
        | vk::Format::R32G32_SFLOAT => 2,
        vk::Format::R8G8B8_UNORM
        | vk::Format::R8G8B8_SRGB
        | vk::Format::B8G8R8_UNORM
        | vk::Format::B8G8R8_SRGB
        | vk::Format::B10G11R11_UFLOAT_PACK32
        | vk::Format::R32G32B32_SFLOAT => 3,
        vk::Format::R8G8B8A8_UNORM
        | vk::Format::R8G8B8A8_SRGB
        | vk::Format::B8G8R8A8_UNORM
        | vk::Format::B8G8R8A8_SRGB
        | vk::Format::A2B10G10R10_UNORM_PACK32
        | vk::Format::R16G16B16A16_SFLOAT
        | vk::Format::R32G32B32A32_SFLOAT => 4,
        _ => return None,
    };
    Some(channels)
}

/// Split an upload of `height` rows into bands of whole rows which each fit
/// in `capacity` bytes of staging memory.
///
/// Returns `(first_row, row_count)` for every band, in order.
pub fn row_bands(
    row_bytes: u64,
    height: u32,
    capacity: u64,
) -> Result<Vec<(u32, u32)>, VkalError> {
    if row_bytes == 0 || row_bytes > capacity {
        return Err(VkalError::OutOfSpace {
            name: "staging",
            requested: PrettySize(row_bytes),
            available: PrettySize(capacity),
        });
    }
    let rows_per_band = (capacity / row_bytes).min(height as u64) as u32;
    let mut bands = vec![];
    let mut first_row = 0;
    while first_row < height {
        let rows = rows_per_band.min(height - first_row);
        bands.push((first_row, rows));
        first_row += rows;
    }
    Ok(bands)
}

// Public API
// ----------

impl VkalContext {
    /// Upload pixels into a new sampled texture.
    ///
    /// `pixels` must be tightly packed rows of `channels` bytes per texel in
    /// `format`. The upload goes through the staging buffer and blocks until
    /// it has finished.
    ///
    /// # Safety
    ///
    /// The staging buffer must not be in use by pending GPU work.
    pub unsafe fn create_texture(
        &mut self,
        width: u32,
        height: u32,
        channels: u32,
        format: vk::Format,
        pixels: &[u8],
        sampler: &SamplerDesc,
    ) -> Result<TextureHandle, VkalError> {
        let expected = expected_pixel_bytes(width, height, channels)?;
        if pixels.len() as u64 != expected {
            return Err(anyhow!(
                "Texture {}x{}x{} needs {} bytes but got {}",
                width,
                height,
                channels,
                expected,
                pixels.len()
            )
            .into());
        }

        let desc = ImageDesc::new(
            width,
            height,
            format,
            vk::ImageUsageFlags::TRANSFER_DST | vk::ImageUsageFlags::SAMPLED,
        );
        let (image, memory) = create_image(
            &self.device,
            &self.memory_properties,
            &mut self.registry,
            &mut self.allocator,
            &desc,
            ImageMemory::Shared {
                min_block_size: self.config.image_block_size,
            },
        )?;
        let raw_image = *self.registry.images.get(image)?;

        let uploaded = self.upload_pixels(raw_image, width, height, pixels);
        if let Err(err) = uploaded {
            self.registry.destroy_image(&self.device, image)?;
            return Err(err);
        }

        self.register_texture(
            image, memory, width, height, channels, format, sampler,
        )
    }

    /// Create a texture which can be rendered into with the returned
    /// framebuffer and sampled afterwards.
    ///
    /// The render pass must have exactly one color attachment of `format`
    /// and should leave it in SHADER_READ_ONLY_OPTIMAL.
    ///
    /// # Safety
    ///
    /// The render pass must outlive the framebuffer.
    pub unsafe fn create_render_target(
        &mut self,
        width: u32,
        height: u32,
        format: vk::Format,
        render_pass: RenderPassHandle,
        sampler: &SamplerDesc,
    ) -> Result<TextureHandle, VkalError> {
        let channels = format_channels(format).ok_or_else(|| {
            anyhow!("{:?} is not a supported render target format", format)
        })?;
        let desc = ImageDesc::new(
            width,
            height,
            format,
            vk::ImageUsageFlags::COLOR_ATTACHMENT
                | vk::ImageUsageFlags::SAMPLED,
        );
        let (image, memory) = create_image(
            &self.device,
            &self.memory_properties,
            &mut self.registry,
            &mut self.allocator,
            &desc,
            ImageMemory::Shared {
                min_block_size: self.config.image_block_size,
            },
        )?;
        let raw_image = *self.registry.images.get(image)?;

        // Targets may be sampled before anything was rendered into them.
        let mut recorded = Ok(());
        let transitioned =
            self.transfer.submit_and_wait(&self.device, |command_buffer| {
                recorded = cmd_transition_image_layout(
                    &self.device,
                    command_buffer,
                    raw_image,
                    vk::ImageAspectFlags::COLOR,
                    1,
                    vk::ImageLayout::UNDEFINED,
                    vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                );
            });
        if let Err(err) = transitioned.and(recorded) {
            self.registry.destroy_image(&self.device, image)?;
            return Err(err);
        }

        let texture = self.register_texture(
            image, memory, width, height, channels, format, sampler,
        )?;
        let view = *self
            .registry
            .image_views
            .get(self.registry.textures.get(texture)?.view)?;
        let framebuffer = create_framebuffer(
            &self.device,
            &mut self.registry,
            render_pass,
            &[view],
            vk::Extent2D { width, height },
        );
        match framebuffer {
            Ok(framebuffer) => {
                self.registry.textures.get_mut(texture)?.framebuffer =
                    Some(framebuffer);
                Ok(texture)
            }
            Err(err) => {
                self.destroy_texture(texture)?;
                Err(err)
            }
        }
    }

    pub fn texture(
        &self,
        texture: TextureHandle,
    ) -> Result<&VkalTexture, VkalError> {
        self.registry.textures.get(texture)
    }

    /// Destroy a texture's framebuffer, sampler, view and image.
    ///
    /// The memory stays claimed in its block.
    ///
    /// # Safety
    ///
    /// The texture must not be referenced by pending GPU work.
    pub unsafe fn destroy_texture(
        &mut self,
        texture: TextureHandle,
    ) -> Result<(), VkalError> {
        let texture = self.registry.textures.remove(texture)?;
        if let Some(framebuffer) = texture.framebuffer {
            self.registry.destroy_framebuffer(&self.device, framebuffer)?;
        }
        self.registry.destroy_sampler(&self.device, texture.sampler)?;
        self.registry.destroy_image_view(&self.device, texture.view)?;
        self.registry.destroy_image(&self.device, texture.image)?;
        log::trace!(
            "Destroyed {}x{} texture",
            texture.width,
            texture.height
        );
        Ok(())
    }
}

// Private API
// -----------

impl VkalContext {
    /// Copy pixels into the image one staging-sized band of rows at a time.
    ///
    /// The image ends up in SHADER_READ_ONLY_OPTIMAL.
    unsafe fn upload_pixels(
        &mut self,
        image: vk::Image,
        width: u32,
        height: u32,
        pixels: &[u8],
    ) -> Result<(), VkalError> {
        let row_bytes = pixels.len() as u64 / height as u64;
        self.buffers.staging.reset();
        let capacity = self.buffers.staging.free();
        let bands = row_bands(row_bytes, height, capacity)?;
        let last = bands.len() - 1;
        log::trace!(
            "Uploading {}x{} texture in {} band(s)",
            width,
            height,
            bands.len()
        );
        let mut uploaded = Ok(());
        for (band, &(first_row, rows)) in bands.iter().enumerate() {
            let start = (first_row as u64 * row_bytes) as usize;
            let end = start + (rows as u64 * row_bytes) as usize;
            uploaded = self.upload_band(
                image,
                width,
                (first_row, rows),
                &pixels[start..end],
                band == 0,
                band == last,
            );
            if uploaded.is_err() {
                break;
            }
        }
        self.buffers.staging.reset();
        uploaded
    }

    unsafe fn upload_band(
        &mut self,
        image: vk::Image,
        width: u32,
        (first_row, rows): (u32, u32),
        band_pixels: &[u8],
        is_first: bool,
        is_last: bool,
    ) -> Result<(), VkalError> {
        let staging = &mut self.buffers.staging;
        staging.reset();
        let offset = staging.add_bytes(
            band_pixels,
            1,
            band_pixels.len() as u64,
            &mut HostOnly,
        )?;
        let src = staging.buffer().raw();

        let mut recorded = Ok(());
        let submitted =
            self.transfer.submit_and_wait(&self.device, |command_buffer| {
                let to_transfer = if is_first {
                    cmd_transition_image_layout(
                        &self.device,
                        command_buffer,
                        image,
                        vk::ImageAspectFlags::COLOR,
                        1,
                        vk::ImageLayout::UNDEFINED,
                        vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                    )
                } else {
                    Ok(())
                };
                recorded = to_transfer.and_then(|()| {
                    cmd_copy_buffer_to_image(
                        &self.device,
                        command_buffer,
                        src,
                        offset,
                        image,
                        width,
                        first_row,
                        rows,
                        0,
                    );
                    if !is_last {
                        return Ok(());
                    }
                    cmd_transition_image_layout(
                        &self.device,
                        command_buffer,
                        image,
                        vk::ImageAspectFlags::COLOR,
                        1,
                        vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                        vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                    )
                });
            });
        submitted.and(recorded)
    }

    #[allow(clippy::too_many_arguments)]
    unsafe fn register_texture(
        &mut self,
        image: ImageHandle,
        memory: MemoryBlockHandle,
        width: u32,
        height: u32,
        channels: u32,
        format: vk::Format,
        sampler: &SamplerDesc,
    ) -> Result<TextureHandle, VkalError> {
        let raw_image = *self.registry.images.get(image)?;
        let view = create_image_view(
            &self.device,
            &mut self.registry,
            raw_image,
            format,
            vk::ImageAspectFlags::COLOR,
            1,
        )?;
        let sampler = match create_sampler(
            &self.device,
            &mut self.registry,
            sampler,
        ) {
            Ok(sampler) => sampler,
            Err(err) => {
                self.registry.destroy_image_view(&self.device, view)?;
                self.registry.destroy_image(&self.device, image)?;
                return Err(err);
            }
        };
        let texture = VkalTexture {
            image,
            view,
            sampler,
            memory,
            framebuffer: None,
            width,
            height,
            channels,
            format,
        };
        match self.registry.textures.insert(texture) {
            Ok(handle) => {
                log::debug!(
                    "Created {}x{} {:?} texture {:?}",
                    width,
                    height,
                    format,
                    handle
                );
                Ok(handle)
            }
            Err(err) => {
                self.registry.destroy_sampler(&self.device, sampler)?;
                self.registry.destroy_image_view(&self.device, view)?;
                self.registry.destroy_image(&self.device, image)?;
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn pixel_bytes_are_tightly_packed() {
        assert_eq!(expected_pixel_bytes(4, 2, 4).unwrap(), 32);
        assert_eq!(expected_pixel_bytes(1, 1, 1).unwrap(), 1);
    }

    #[test]
    fn render_target_channels_follow_the_format() {
        assert_eq!(format_channels(vk::Format::R8G8B8A8_SRGB), Some(4));
        assert_eq!(format_channels(vk::Format::R16G16_SFLOAT), Some(2));
        assert_eq!(format_channels(vk::Format::R32_SFLOAT), Some(1));
        assert_eq!(format_channels(vk::Format::D32_SFLOAT), None);
    }

    #[test]
    fn rows_are_split_into_bands_which_fit_staging() {
        // 4096x4096 RGBA against 32 MiB of staging.
        let bands = row_bands(4096 * 4, 4096, 32 * 1024 * 1024).unwrap();
        assert_eq!(bands, vec![(0, 2048), (2048, 2048)]);

        let uneven = row_bands(100, 10, 350).unwrap();
        assert_eq!(uneven, vec![(0, 3), (3, 3), (6, 3), (9, 1)]);
        let covered: u32 = uneven.iter().map(|(_, rows)| rows).sum();
        assert_eq!(covered, 10);
    }

    #[test]
    fn small_uploads_take_a_single_band() {
        assert_eq!(row_bands(64, 16, 1 << 20).unwrap(), vec![(0, 16)]);
    }

    #[test]
    fn rows_wider_than_staging_are_refused() {
        assert!(matches!(
            row_bands(1024, 4, 1000),
            Err(VkalError::OutOfSpace {
                name: "staging",
                ..
            })
        ));
    }

    #[test]
    fn empty_textures_are_rejected() {
        assert!(expected_pixel_bytes(0, 16, 4).is_err());
        assert!(expected_pixel_bytes(16, 16, 0).is_err());
    }
}
