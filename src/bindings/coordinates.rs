// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/**
Raster coordinates for texture levels.  The origin is the top-left texel of a level:

```text
           x
      0 ────────▶
      │ ┌───────┐
    y │ │       │
      │ │       │
      │ │       │
      ▼ └───────┘
 ```
*/
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct RasterCoord2D {
    pub x: u32,
    pub y: u32,
}

impl RasterCoord2D {
    pub const fn new(x: u32, y: u32) -> Self {
        RasterCoord2D { x, y }
    }
}

/**
A rectangle of texels, half-open on the right and bottom edges.

Used for partial locks and for dirty rects.
*/
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rect {
    pub left: u32,
    pub top: u32,
    pub right: u32,
    pub bottom: u32,
}

impl Rect {
    pub const fn new(left: u32, top: u32, right: u32, bottom: u32) -> Self {
        Rect {
            left,
            top,
            right,
            bottom,
        }
    }

    /// A rect covering a whole `width` x `height` level.
    pub const fn full(width: u32, height: u32) -> Self {
        Rect::new(0, 0, width, height)
    }

    pub const fn from_origin(origin: RasterCoord2D, width: u32, height: u32) -> Self {
        Rect::new(origin.x, origin.y, origin.x + width, origin.y + height)
    }

    pub const fn origin(&self) -> RasterCoord2D {
        RasterCoord2D::new(self.left, self.top)
    }

    pub const fn width(&self) -> u32 {
        self.right.saturating_sub(self.left)
    }

    pub const fn height(&self) -> u32 {
        self.bottom.saturating_sub(self.top)
    }

    pub const fn is_empty(&self) -> bool {
        self.width() == 0 || self.height() == 0
    }

    /// Whether the rect lies inside a level of the given size.
    pub const fn fits_within(&self, width: u32, height: u32) -> bool {
        self.left <= self.right
            && self.top <= self.bottom
            && self.right <= width
            && self.bottom <= height
    }

    /// Smallest rect containing both.
    pub fn union(&self, other: &Rect) -> Rect {
        if self.is_empty() {
            return *other;
        }
        if other.is_empty() {
            return *self;
        }
        Rect::new(
            self.left.min(other.left),
            self.top.min(other.top),
            self.right.max(other.right),
            self.bottom.max(other.bottom),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::{RasterCoord2D, Rect};

    #[test]
    fn union_ignores_empty() {
        let a = Rect::new(2, 2, 4, 4);
        let empty = Rect::new(7, 7, 7, 9);
        assert_eq!(a.union(&empty), a);
        assert_eq!(empty.union(&a), a);
        assert_eq!(a.union(&Rect::new(0, 3, 3, 8)), Rect::new(0, 2, 4, 8));
    }

    #[test]
    fn bounds() {
        let r = Rect::from_origin(RasterCoord2D::new(60, 0), 4, 64);
        assert!(r.fits_within(64, 64));
        assert!(!r.fits_within(63, 64));
        assert_eq!(r.width(), 4);
        assert_eq!(r.origin(), RasterCoord2D::new(60, 0));
        //inverted rects never fit
        assert!(!Rect::new(5, 0, 2, 1).fits_within(64, 64));
    }
}
