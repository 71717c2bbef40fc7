use std::any::Any;

use frame_protocol::{ContentId, PixelRect, ResourceId};
use thiserror::Error;

use crate::format::{ResourceFormat, resource_format_requires_swizzle};
use crate::source::RasterSource;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RasterBufferError {
    #[error("resource {0:?} does not exist")]
    UnknownResource(ResourceId),
    #[error("all {limit} staging buffers are in use")]
    StagingExhausted { limit: usize },
    #[error("buffer was not acquired from this provider")]
    ForeignBuffer,
}

/// Destination of one raster task's output.
pub trait RasterBuffer: Send {
    fn resource_id(&self) -> ResourceId;

    /// Rasters `source` into the buffer. Only `dirty_rect` is redrawn when the
    /// buffer still holds the resource's previous contents.
    fn playback(
        &mut self,
        source: &dyn RasterSource,
        full_rect: PixelRect,
        dirty_rect: PixelRect,
        new_content_id: ContentId,
    );

    fn into_any(self: Box<Self>) -> Box<dyn Any + Send>;
}

/// Buffer strategy handed to the tile task scheduler. Origin thread only.
pub trait RasterTaskClient {
    fn acquire_buffer_for_raster(
        &mut self,
        resource: ResourceId,
        content_id: ContentId,
        previous_content_id: ContentId,
    ) -> Result<Box<dyn RasterBuffer>, RasterBufferError>;

    fn release_buffer_for_raster(
        &mut self,
        buffer: Box<dyn RasterBuffer>,
    ) -> Result<(), RasterBufferError>;

    fn resource_format(&self, must_support_alpha: bool) -> ResourceFormat;

    fn resource_requires_swizzle(&self, must_support_alpha: bool) -> bool {
        resource_format_requires_swizzle(self.resource_format(must_support_alpha))
    }
}

/// Whether the resource still holds the contents a partial raster can build on.
pub(crate) fn has_previous_content(current: ContentId, previous: ContentId) -> bool {
    !previous.is_none() && current == previous
}

/// Area to redraw: everything, or only the dirty part when the old contents are kept.
pub(crate) fn playback_rect(
    full_rect: PixelRect,
    dirty_rect: PixelRect,
    resource_has_previous_content: bool,
) -> PixelRect {
    if resource_has_previous_content {
        full_rect.intersect(dirty_rect)
    } else {
        full_rect
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn previous_content_requires_a_known_matching_id() {
        assert!(has_previous_content(ContentId(3), ContentId(3)));
        assert!(!has_previous_content(ContentId(3), ContentId(4)));
        assert!(!has_previous_content(ContentId::NONE, ContentId::NONE));
    }

    #[test]
    fn playback_rect_shrinks_only_with_previous_content() {
        let full = PixelRect::new(0, 0, 8, 8);
        let dirty = PixelRect::new(2, 2, 2, 2);
        assert_eq!(playback_rect(full, dirty, false), full);
        assert_eq!(playback_rect(full, dirty, true), dirty);
    }
}
