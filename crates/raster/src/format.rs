/// Pixel layout of a raster resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceFormat {
    Rgba8888,
    Bgra8888,
    Alpha8,
}

impl ResourceFormat {
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            ResourceFormat::Rgba8888 | ResourceFormat::Bgra8888 => 4,
            ResourceFormat::Alpha8 => 1,
        }
    }

    /// Encodes one RGBA color in this format's byte order.
    pub fn write_pixel(self, destination: &mut [u8], rgba: [u8; 4]) {
        match self {
            ResourceFormat::Rgba8888 => destination[..4].copy_from_slice(&rgba),
            ResourceFormat::Bgra8888 => {
                destination[..4].copy_from_slice(&[rgba[2], rgba[1], rgba[0], rgba[3]])
            }
            ResourceFormat::Alpha8 => destination[0] = rgba[3],
        }
    }
}

/// Raster output is produced in RGBA order; anything else must be converted on copy.
pub fn resource_format_requires_swizzle(format: ResourceFormat) -> bool {
    matches!(format, ResourceFormat::Bgra8888)
}

/// Converts tightly packed RGBA rows into `format`.
pub fn convert_from_rgba(rgba: &[u8], format: ResourceFormat, destination: &mut [u8]) {
    let bytes_per_pixel = format.bytes_per_pixel();
    assert_eq!(
        rgba.len() / 4 * bytes_per_pixel,
        destination.len(),
        "pixel conversion size mismatch"
    );
    for (source, target) in rgba
        .chunks_exact(4)
        .zip(destination.chunks_exact_mut(bytes_per_pixel))
    {
        format.write_pixel(target, [source[0], source[1], source[2], source[3]]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_bgra_needs_swizzle() {
        assert!(resource_format_requires_swizzle(ResourceFormat::Bgra8888));
        assert!(!resource_format_requires_swizzle(ResourceFormat::Rgba8888));
        assert!(!resource_format_requires_swizzle(ResourceFormat::Alpha8));
    }

    #[test]
    fn conversion_reorders_channels() {
        let rgba = [1, 2, 3, 4, 5, 6, 7, 8];
        let mut bgra = [0; 8];
        convert_from_rgba(&rgba, ResourceFormat::Bgra8888, &mut bgra);
        assert_eq!(bgra, [3, 2, 1, 4, 7, 6, 5, 8]);

        let mut alpha = [0; 2];
        convert_from_rgba(&rgba, ResourceFormat::Alpha8, &mut alpha);
        assert_eq!(alpha, [4, 8]);
    }
}
