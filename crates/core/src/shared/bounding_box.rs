/// A face box in pixel coordinates, centred at (`x`, `y`).
///
/// Trackers may report boxes that hang off the frame edges; use
/// [`BoundingBox::clamp_to`] before reading pixels.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoundingBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// An integer pixel window fully inside a frame. May be empty.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CropRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl BoundingBox {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Builds a box from `[x1, y1, x2, y2]` corners.
    pub fn from_corners(corners: [f64; 4]) -> Self {
        let [x1, y1, x2, y2] = corners;
        Self {
            x: (x1 + x2) / 2.0,
            y: (y1 + y2) / 2.0,
            width: x2 - x1,
            height: y2 - y1,
        }
    }

    pub fn corners(&self) -> [f64; 4] {
        let hw = self.width / 2.0;
        let hh = self.height / 2.0;
        [self.x - hw, self.y - hh, self.x + hw, self.y + hh]
    }

    pub fn area(&self) -> f64 {
        self.width.max(0.0) * self.height.max(0.0)
    }

    /// Intersection over union with `other`; 0 when they don't overlap.
    pub fn iou(&self, other: &BoundingBox) -> f64 {
        let [ax1, ay1, ax2, ay2] = self.corners();
        let [bx1, by1, bx2, by2] = other.corners();
        let inter = (ax2.min(bx2) - ax1.max(bx1)).max(0.0) * (ay2.min(by2) - ay1.max(by1)).max(0.0);
        if inter == 0.0 {
            return 0.0;
        }
        inter / (self.area() + other.area() - inter)
    }

    /// Clamps all four edges to `[0, frame_w] x [0, frame_h]`.
    ///
    /// Edges are rounded outward before clamping. A box entirely outside the
    /// frame, or with non-finite coordinates, yields an empty rect.
    pub fn clamp_to(&self, frame_w: u32, frame_h: u32) -> CropRect {
        let [x1, y1, x2, y2] = self.corners();
        let (left, right) = clamp_span(x1, x2, frame_w);
        let (top, bottom) = clamp_span(y1, y2, frame_h);
        CropRect {
            x: left,
            y: top,
            width: right - left,
            height: bottom - top,
        }
    }
}

impl CropRect {
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

fn clamp_span(start: f64, end: f64, limit: u32) -> (u32, u32) {
    if !start.is_finite() || !end.is_finite() {
        return (0, 0);
    }
    let max = limit as f64;
    let lo = start.floor().clamp(0.0, max) as u32;
    let hi = end.ceil().clamp(0.0, max) as u32;
    (lo, hi.max(lo))
}
