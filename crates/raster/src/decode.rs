use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use frame_protocol::PixelSize;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ImageId(pub u64);

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("image {0:?} has no encoded bytes")]
    Empty(ImageId),
    #[error("failed to decode image {id:?}")]
    Image {
        id: ImageId,
        #[source]
        source: image::ImageError,
    },
}

/// Decoded pixels in tightly packed RGBA order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedImage {
    pub size: PixelSize,
    pub rgba: Vec<u8>,
}

impl DecodedImage {
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.size.width || y >= self.size.height {
            return None;
        }
        let offset = (y as usize * self.size.width as usize + x as usize) * 4;
        let bytes = self.rgba.get(offset..offset + 4)?;
        Some([bytes[0], bytes[1], bytes[2], bytes[3]])
    }
}

pub fn decode_image(id: ImageId, encoded: &[u8]) -> Result<DecodedImage, DecodeError> {
    if encoded.is_empty() {
        return Err(DecodeError::Empty(id));
    }
    let decoded = image::load_from_memory(encoded)
        .map_err(|source| DecodeError::Image { id, source })?
        .to_rgba8();
    Ok(DecodedImage {
        size: PixelSize::new(decoded.width(), decoded.height()),
        rgba: decoded.into_raw(),
    })
}

/// Decoded images shared by decode tasks (writers) and raster sources (readers).
#[derive(Debug, Default)]
pub struct DecodedImageCache {
    images: Mutex<HashMap<ImageId, Arc<DecodedImage>>>,
}

impl DecodedImageCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, id: ImageId, image: DecodedImage) -> Arc<DecodedImage> {
        let image = Arc::new(image);
        self.lock_images().insert(id, image.clone());
        image
    }

    pub fn get(&self, id: ImageId) -> Option<Arc<DecodedImage>> {
        self.lock_images().get(&id).cloned()
    }

    pub fn contains(&self, id: ImageId) -> bool {
        self.lock_images().contains_key(&id)
    }

    pub fn remove(&self, id: ImageId) -> Option<Arc<DecodedImage>> {
        self.lock_images().remove(&id)
    }

    pub fn len(&self) -> usize {
        self.lock_images().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock_images(&self) -> MutexGuard<'_, HashMap<ImageId, Arc<DecodedImage>>> {
        self.images
            .lock()
            .expect("decoded image cache lock poisoned")
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::io::Cursor;

    use image::{ImageFormat, Rgba, RgbaImage};

    use super::*;

    pub(crate) fn encode_png(width: u32, height: u32, color: [u8; 4]) -> Vec<u8> {
        let image = RgbaImage::from_pixel(width, height, Rgba(color));
        let mut encoded = Cursor::new(Vec::new());
        image
            .write_to(&mut encoded, ImageFormat::Png)
            .expect("encode test png");
        encoded.into_inner()
    }

    #[test]
    fn decodes_png_into_rgba() {
        let encoded = encode_png(3, 2, [10, 20, 30, 255]);
        let decoded = decode_image(ImageId(1), &encoded).expect("valid png");
        assert_eq!(decoded.size, PixelSize::new(3, 2));
        assert_eq!(decoded.pixel(2, 1), Some([10, 20, 30, 255]));
        assert_eq!(decoded.pixel(3, 0), None);
    }

    #[test]
    fn garbage_bytes_fail_to_decode() {
        let result = decode_image(ImageId(4), b"definitely not an image");
        assert!(matches!(result, Err(DecodeError::Image { id: ImageId(4), .. })));
        assert!(matches!(
            decode_image(ImageId(5), &[]),
            Err(DecodeError::Empty(ImageId(5)))
        ));
    }

    #[test]
    fn cache_shares_decoded_images() {
        let cache = DecodedImageCache::new();
        let stored = cache.insert(
            ImageId(1),
            DecodedImage {
                size: PixelSize::new(1, 1),
                rgba: vec![1, 2, 3, 4],
            },
        );
        let fetched = cache.get(ImageId(1)).expect("cached");
        assert!(Arc::ptr_eq(&stored, &fetched));
        assert_eq!(cache.len(), 1);
    }
}
