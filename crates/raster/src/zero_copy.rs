use std::any::Any;
use std::sync::Arc;

use frame_protocol::{ContentId, PixelRect, ResourceId};

use crate::buffer::{
    RasterBuffer, RasterBufferError, RasterTaskClient, has_previous_content, playback_rect,
};
use crate::format::ResourceFormat;
use crate::resource::ResourceProvider;
use crate::source::RasterSource;

/// Rasters straight into resource memory. Nothing to copy on release.
pub struct ZeroCopyBufferProvider {
    resources: Arc<ResourceProvider>,
    format: ResourceFormat,
    outstanding: usize,
}

impl ZeroCopyBufferProvider {
    pub fn new(resources: Arc<ResourceProvider>, format: ResourceFormat) -> Self {
        Self {
            resources,
            format,
            outstanding: 0,
        }
    }

    pub fn outstanding_buffers(&self) -> usize {
        self.outstanding
    }
}

struct ZeroCopyRasterBuffer {
    resources: Arc<ResourceProvider>,
    resource: ResourceId,
    resource_has_previous_content: bool,
}

impl RasterBuffer for ZeroCopyRasterBuffer {
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
            log::trace!("resource {:?} has nothing dirty to raster", self.resource);
            return;
        }
        let written = self
            .resources
            .with_pixels_mut(self.resource, |pixels, size, format| {
                source.playback_to_memory(pixels, format, size, full_rect, target);
            });
        if written.is_none() {
            log::warn!("resource {:?} deleted during raster", self.resource);
            return;
        }
        self.resources.set_content_id(self.resource, new_content_id);
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any + Send> {
        self
    }
}

impl RasterTaskClient for ZeroCopyBufferProvider {
    fn acquire_buffer_for_raster(
        &mut self,
        resource: ResourceId,
        _content_id: ContentId,
        previous_content_id: ContentId,
    ) -> Result<Box<dyn RasterBuffer>, RasterBufferError> {
        let Some(current) = self.resources.content_id(resource) else {
            return Err(RasterBufferError::UnknownResource(resource));
        };
        self.outstanding += 1;
        Ok(Box::new(ZeroCopyRasterBuffer {
            resources: self.resources.clone(),
            resource,
            resource_has_previous_content: has_previous_content(current, previous_content_id),
        }))
    }

    fn release_buffer_for_raster(
        &mut self,
        buffer: Box<dyn RasterBuffer>,
    ) -> Result<(), RasterBufferError> {
        if buffer.into_any().downcast::<ZeroCopyRasterBuffer>().is_err() {
            return Err(RasterBufferError::ForeignBuffer);
        }
        self.outstanding -= 1;
        Ok(())
    }

    fn resource_format(&self, _must_support_alpha: bool) -> ResourceFormat {
        self.format
    }
}
