// THEORY:
// A `FrameRegion` is the axis-aligned bounding rectangle of one exterior region
// of "on" mask pixels. It lives for a single frame: it is produced by the
// region detector, classified by size, drawn onto the overlay, and dropped.

/// A rectangle in frame pixel coordinates. `x`/`y` is the top-left pixel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameRegion {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl FrameRegion {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }

    /// Builds the rectangle spanning two inclusive corner pixels.
    pub fn from_corners(min_x: u32, min_y: u32, max_x: u32, max_y: u32) -> Self {
        Self {
            x: min_x,
            y: min_y,
            width: max_x - min_x + 1,
            height: max_y - min_y + 1,
        }
    }

    /// Both dimensions strictly greater than the given minimums.
    pub fn exceeds(&self, min_width: u32, min_height: u32) -> bool {
        self.width > min_width && self.height > min_height
    }

    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }
}
