//! Identifiers and pixel geometry shared by the frame pipeline crates.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SurfaceId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceId(pub u64);

/// Identifies the contents rastered into a resource.
///
/// Zero means "unknown contents" and never matches another id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ContentId(pub u64);

impl ContentId {
    pub const NONE: ContentId = ContentId(0);

    pub fn is_none(self) -> bool {
        self.0 == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct PixelSize {
    pub width: u32,
    pub height: u32,
}

impl PixelSize {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn is_empty(self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn area(self) -> usize {
        (self.width as usize)
            .checked_mul(self.height as usize)
            .expect("pixel area overflow")
    }

    pub fn full_rect(self) -> PixelRect {
        PixelRect::new(0, 0, self.width, self.height)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct PixelRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl PixelRect {
    pub const fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn is_empty(self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn max_x(self) -> u32 {
        self.x.checked_add(self.width).expect("rect max x overflow")
    }

    pub fn max_y(self) -> u32 {
        self.y.checked_add(self.height).expect("rect max y overflow")
    }

    pub fn contains(self, x: u32, y: u32) -> bool {
        x >= self.x && x < self.max_x() && y >= self.y && y < self.max_y()
    }

    /// Returns the overlapping area, or an empty rect when the two do not overlap.
    pub fn intersect(self, other: PixelRect) -> PixelRect {
        let min_x = self.x.max(other.x);
        let min_y = self.y.max(other.y);
        let max_x = self.max_x().min(other.max_x());
        let max_y = self.max_y().min(other.max_y());
        if min_x >= max_x || min_y >= max_y {
            return PixelRect::default();
        }
        PixelRect::new(min_x, min_y, max_x - min_x, max_y - min_y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intersect_returns_overlap() {
        let a = PixelRect::new(0, 0, 10, 10);
        let b = PixelRect::new(4, 6, 10, 10);
        assert_eq!(a.intersect(b), PixelRect::new(4, 6, 6, 4));
    }

    #[test]
    fn intersect_of_disjoint_rects_is_empty() {
        let a = PixelRect::new(0, 0, 4, 4);
        let b = PixelRect::new(4, 0, 4, 4);
        assert!(a.intersect(b).is_empty());
    }

    #[test]
    fn content_id_zero_is_none() {
        assert!(ContentId::NONE.is_none());
        assert!(!ContentId(3).is_none());
    }
}
