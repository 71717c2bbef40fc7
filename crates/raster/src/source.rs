use std::sync::Arc;

use frame_protocol::{PixelRect, PixelSize};

use crate::decode::{DecodedImageCache, ImageId};
use crate::format::ResourceFormat;

/// Produces tile pixels. Called on worker threads.
pub trait RasterSource: Send + Sync {
    /// Rasters `playback_rect` into `memory`, which covers `full_rect` at
    /// `size` in `format`. Pixels outside `playback_rect` are left untouched.
    fn playback_to_memory(
        &self,
        memory: &mut [u8],
        format: ResourceFormat,
        size: PixelSize,
        full_rect: PixelRect,
        playback_rect: PixelRect,
    );
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlacedImage {
    pub image: ImageId,
    pub x: u32,
    pub y: u32,
}

/// A solid background with decoded images drawn on top, in order.
#[derive(Debug, Clone)]
pub struct RecordedRasterSource {
    background: [u8; 4],
    images: Vec<PlacedImage>,
    cache: Arc<DecodedImageCache>,
}

impl RecordedRasterSource {
    pub fn new(background: [u8; 4], cache: Arc<DecodedImageCache>) -> Self {
        Self {
            background,
            images: Vec::new(),
            cache,
        }
    }

    pub fn with_image(mut self, image: ImageId, x: u32, y: u32) -> Self {
        self.images.push(PlacedImage { image, x, y });
        self
    }

    pub fn images(&self) -> &[PlacedImage] {
        &self.images
    }
}

impl RasterSource for RecordedRasterSource {
    fn playback_to_memory(
        &self,
        memory: &mut [u8],
        format: ResourceFormat,
        size: PixelSize,
        full_rect: PixelRect,
        playback_rect: PixelRect,
    ) {
        let bytes_per_pixel = format.bytes_per_pixel();
        assert_eq!(
            memory.len(),
            size.area() * bytes_per_pixel,
            "raster memory does not match its size"
        );
        let target = playback_rect
            .intersect(full_rect)
            .intersect(PixelRect::new(full_rect.x, full_rect.y, size.width, size.height));
        if target.is_empty() {
            return;
        }

        // Images missing from the cache were not decoded; they are skipped.
        let decoded: Vec<_> = self
            .images
            .iter()
            .filter_map(|placed| self.cache.get(placed.image).map(|image| (placed, image)))
            .collect();

        for y in target.y..target.max_y() {
            for x in target.x..target.max_x() {
                let mut color = self.background;
                for (placed, image) in &decoded {
                    if x < placed.x || y < placed.y {
                        continue;
                    }
                    if let Some(pixel) = image.pixel(x - placed.x, y - placed.y) {
                        if pixel[3] != 0 {
                            color = pixel;
                        }
                    }
                }
                let local_x = (x - full_rect.x) as usize;
                let local_y = (y - full_rect.y) as usize;
                let offset = (local_y * size.width as usize + local_x) * bytes_per_pixel;
                format.write_pixel(&mut memory[offset..offset + bytes_per_pixel], color);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::DecodedImage;

    fn rgba_at(memory: &[u8], size: PixelSize, x: u32, y: u32) -> [u8; 4] {
        let offset = (y as usize * size.width as usize + x as usize) * 4;
        [
            memory[offset],
            memory[offset + 1],
            memory[offset + 2],
            memory[offset + 3],
        ]
    }

    #[test]
    fn draws_background_and_cached_images() {
        let cache = Arc::new(DecodedImageCache::new());
        cache.insert(
            ImageId(1),
            DecodedImage {
                size: PixelSize::new(1, 1),
                rgba: vec![255, 0, 0, 255],
            },
        );
        let source = RecordedRasterSource::new([0, 0, 255, 255], cache)
            .with_image(ImageId(1), 5, 5)
            .with_image(ImageId(2), 4, 4);
        let size = PixelSize::new(2, 2);
        let full_rect = PixelRect::new(4, 4, 2, 2);
        let mut memory = vec![0; 16];
        source.playback_to_memory(
            &mut memory,
            ResourceFormat::Rgba8888,
            size,
            full_rect,
            full_rect,
        );

        assert_eq!(rgba_at(&memory, size, 0, 0), [0, 0, 255, 255]);
        assert_eq!(rgba_at(&memory, size, 1, 1), [255, 0, 0, 255]);
    }

    #[test]
    fn partial_playback_leaves_the_rest_alone() {
        let cache = Arc::new(DecodedImageCache::new());
        let source = RecordedRasterSource::new([9, 9, 9, 9], cache);
        let size = PixelSize::new(2, 1);
        let mut memory = vec![1; 8];
        source.playback_to_memory(
            &mut memory,
            ResourceFormat::Rgba8888,
            size,
            PixelRect::new(0, 0, 2, 1),
            PixelRect::new(1, 0, 1, 1),
        );
        assert_eq!(memory, vec![1, 1, 1, 1, 9, 9, 9, 9]);
    }
}
