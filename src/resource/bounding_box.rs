//! Axis-aligned bounding boxes produced by detection stages.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A detected region within an image.
///
/// `x`/`y` are signed so an expanded box can temporarily extend past the
/// top-left corner before [`BoundingBox::fit_in_size`] clamps it back.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl BoundingBox {
    pub fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Grows the box by the given proportion of its size, keeping the center.
    ///
    /// A proportion of 0.8 widens and heightens the box by 80%, half of the
    /// growth on each side. The result may extend past the image edges; clamp
    /// it with [`fit_in_size`](Self::fit_in_size) afterwards.
    pub fn expand(&self, proportion: f64) -> Self {
        let grow_w = (self.width as f64 * proportion) as i32;
        let grow_h = (self.height as f64 * proportion) as i32;

        Self {
            x: self.x - grow_w / 2,
            y: self.y - grow_h / 2,
            width: (self.width as i32 + grow_w).max(0) as u32,
            height: (self.height as i32 + grow_h).max(0) as u32,
        }
    }

    /// Clamps the box into an image of the given dimensions.
    ///
    /// The clamped box never extends past the image edges; a box entirely
    /// outside the image collapses to zero size at the nearest edge.
    pub fn fit_in_size(&self, image_width: u32, image_height: u32) -> Self {
        let x = self.x.clamp(0, image_width as i32);
        let y = self.y.clamp(0, image_height as i32);

        let right = (self.x + self.width as i32).clamp(x, image_width as i32);
        let bottom = (self.y + self.height as i32).clamp(y, image_height as i32);

        Self {
            x,
            y,
            width: (right - x) as u32,
            height: (bottom - y) as u32,
        }
    }
}

impl fmt::Display for BoundingBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}, {}, {}, {}]",
            self.x, self.y, self.width, self.height
        )
    }
}
