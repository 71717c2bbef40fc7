use std::any::Any;
use std::sync::Arc;

use frame_protocol::{ContentId, PixelRect, PixelSize, ResourceId};

use crate::buffer::{
    RasterBuffer, RasterBufferError, RasterTaskClient, has_previous_content, playback_rect,
};
use crate::format::{ResourceFormat, convert_from_rgba};
use crate::resource::ResourceProvider;
use crate::source::RasterSource;

/// Rasters into RGBA staging memory and copies into the resource on release,
/// converting to the resource format on the way.
pub struct OneCopyBufferProvider {
    resources: Arc<ResourceProvider>,
    format: ResourceFormat,
    max_staging_buffers: usize,
    staging_in_use: usize,
    free_staging: Vec<Vec<u8>>,
}

impl OneCopyBufferProvider {
    pub fn new(
        resources: Arc<ResourceProvider>,
        format: ResourceFormat,
        max_staging_buffers: usize,
    ) -> Self {
        Self {
            resources,
            format,
            max_staging_buffers,
            staging_in_use: 0,
            free_staging: Vec::new(),
        }
    }

    pub fn staging_in_use(&self) -> usize {
        self.staging_in_use
    }

    pub fn max_staging_buffers(&self) -> usize {
        self.max_staging_buffers
    }

    fn take_staging(&mut self, byte_len: usize) -> Vec<u8> {
        let mut staging = self.free_staging.pop().unwrap_or_default();
        staging.clear();
        staging.resize(byte_len, 0);
        staging
    }
}

struct OneCopyRasterBuffer {
    resource: ResourceId,
    size: PixelSize,
    staging: Vec<u8>,
    resource_has_previous_content: bool,
    rastered_content: Option<ContentId>,
}

impl RasterBuffer for OneCopyRasterBuffer {
    fn resource_id(&self) -> ResourceId {
        self.resource
    }

    fn playback(
        &mut self,
        source: &dyn RasterSource,
        full_rect: PixelRect,
        dirty_rect: PixelRect,
        new_content_id: ContentId,
    ) {
        let target = playback_rect(full_rect, dirty_rect, self.resource_has_previous_content);
        if target.is_empty() {
            return;
        }
        source.playback_to_memory(
            &mut self.staging,
            ResourceFormat::Rgba8888,
            self.size,
            full_rect,
            target,
        );
        self.rastered_content = Some(new_content_id);
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any + Send> {
        self
    }
}

impl RasterTaskClient for OneCopyBufferProvider {
    fn acquire_buffer_for_raster(
        &mut self,
        resource: ResourceId,
        _content_id: ContentId,
        previous_content_id: ContentId,
    ) -> Result<Box<dyn RasterBuffer>, RasterBufferError> {
        let (Some(size), Some(current)) = (
            self.resources.size(resource),
            self.resources.content_id(resource),
        ) else {
            return Err(RasterBufferError::UnknownResource(resource));
        };
        if self.staging_in_use >= self.max_staging_buffers {
            log::warn!(
                "staging pool exhausted ({} buffers); raster of {resource:?} fails",
                self.max_staging_buffers
            );
            return Err(RasterBufferError::StagingExhausted {
                limit: self.max_staging_buffers,
            });
        }

        let resource_has_previous_content = has_previous_content(current, previous_content_id);
        let mut staging = self.take_staging(size.area() * 4);
        // Partial raster builds on the old contents, so they are brought into staging first.
        if resource_has_previous_content {
            self.resources.with_pixels_mut(resource, |pixels, _, format| {
                expand_to_rgba(pixels, format, &mut staging);
            });
        }
        self.staging_in_use += 1;
        Ok(Box::new(OneCopyRasterBuffer {
            resource,
            size,
            staging,
            resource_has_previous_content,
            rastered_content: None,
        }))
    }

    fn release_buffer_for_raster(
        &mut self,
        buffer: Box<dyn RasterBuffer>,
    ) -> Result<(), RasterBufferError> {
        let Ok(buffer) = buffer.into_any().downcast::<OneCopyRasterBuffer>() else {
            return Err(RasterBufferError::ForeignBuffer);
        };
        let OneCopyRasterBuffer {
            resource,
            staging,
            rastered_content,
            ..
        } = *buffer;
        self.staging_in_use -= 1;

        let copied = match rastered_content {
            Some(content_id) => {
                let copied = self
                    .resources
                    .with_pixels_mut(resource, |pixels, _, format| {
                        convert_from_rgba(&staging, format, pixels);
                    })
                    .is_some();
                if copied {
                    self.resources.set_content_id(resource, content_id);
                }
                copied
            }
            None => true,
        };
        if self.free_staging.len() < self.max_staging_buffers {
            self.free_staging.push(staging);
        }
        if copied {
            Ok(())
        } else {
            Err(RasterBufferError::UnknownResource(resource))
        }
    }

    fn resource_format(&self, _must_support_alpha: bool) -> ResourceFormat {
        self.format
    }
}

fn expand_to_rgba(pixels: &[u8], format: ResourceFormat, rgba: &mut [u8]) {
    let bytes_per_pixel = format.bytes_per_pixel();
    for (source, target) in pixels
        .chunks_exact(bytes_per_pixel)
        .zip(rgba.chunks_exact_mut(4))
    {
        let color = match format {
            ResourceFormat::Rgba8888 => [source[0], source[1], source[2], source[3]],
            ResourceFormat::Bgra8888 => [source[2], source[1], source[0], source[3]],
            ResourceFormat::Alpha8 => [0, 0, 0, source[0]],
        };
        target.copy_from_slice(&color);
    }
}
