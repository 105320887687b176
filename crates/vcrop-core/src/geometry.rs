//! Geometric primitives for mapping the on-screen mask onto source pixels.

use serde::{Deserialize, Serialize};

/// Axis-aligned rectangle in on-screen (CSS-like) coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    /// Create a new rectangle.
    #[inline]
    pub const fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Area of the rectangle.
    #[inline]
    pub fn area(self) -> f32 {
        self.width * self.height
    }

    /// A rectangle with a non-positive or non-finite extent cannot be mapped.
    #[inline]
    pub fn is_degenerate(self) -> bool {
        !(self.width.is_finite() && self.height.is_finite() && self.x.is_finite() && self.y.is_finite())
            || self.width <= 0.0
            || self.height <= 0.0
    }

    /// Check if two rectangles overlap.
    pub fn overlaps(self, other: Self) -> bool {
        self.x < other.x + other.width
            && self.x + self.width > other.x
            && self.y < other.y + other.height
            && self.y + self.height > other.y
    }

    /// Compute intersection with another rectangle.
    pub fn intersection(self, other: Self) -> Option<Self> {
        let x1 = self.x.max(other.x);
        let y1 = self.y.max(other.y);
        let x2 = (self.x + self.width).min(other.x + other.width);
        let y2 = (self.y + self.height).min(other.y + other.height);

        if x1 < x2 && y1 < y2 {
            Some(Self::new(x1, y1, x2 - x1, y2 - y1))
        } else {
            None
        }
    }
}

/// Rectangle in intrinsic source-pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SourceRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl SourceRect {
    #[inline]
    pub const fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Map the mask's on-screen rectangle onto the source frame.
    ///
    /// Both rectangles are in the same screen space; the mask offset relative
    /// to the rendered video is scaled by the intrinsic source size
    /// (`source_coord = relative_offset * source_dimension`). The result is
    /// clamped to the source bounds. Returns `None` when the video rectangle is
    /// degenerate or the mask lies entirely outside it.
    pub fn from_mask(mask: Rect, video: Rect, source_width: u32, source_height: u32) -> Option<Self> {
        if video.is_degenerate() || mask.is_degenerate() || source_width == 0 || source_height == 0 {
            return None;
        }

        let visible = mask.intersection(video)?;

        let sw = source_width as f32;
        let sh = source_height as f32;
        let rel_x = (visible.x - video.x) / video.width;
        let rel_y = (visible.y - video.y) / video.height;
        let rel_w = visible.width / video.width;
        let rel_h = visible.height / video.height;

        let x = (rel_x * sw).round().clamp(0.0, sw - 1.0) as u32;
        let y = (rel_y * sh).round().clamp(0.0, sh - 1.0) as u32;
        let width = ((rel_w * sw).round() as u32).clamp(1, source_width - x);
        let height = ((rel_h * sh).round() as u32).clamp(1, source_height - y);

        Some(Self::new(x, y, width, height))
    }

    /// Area in pixels.
    #[inline]
    pub fn area(self) -> u64 {
        self.width as u64 * self.height as u64
    }
}
