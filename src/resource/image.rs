//! Pixel-level operations on image resources.
//!
//! The services never decode or encode image files; they only carry already
//! decoded RGBA buffers and crop regions out of them for downstream stages.

use super::{BoundingBox, Fingerprint};
use image::RgbaImage;
use sha2::{Digest, Sha256};

/// Hashes raw pixel bytes plus dimensions into a content fingerprint.
///
/// Dimensions participate in the hash so two buffers with the same bytes but
/// a different shape do not collide.
pub fn content_fingerprint(content: &RgbaImage) -> Fingerprint {
    let mut hasher = Sha256::new();
    hasher.update(content.width().to_le_bytes());
    hasher.update(content.height().to_le_bytes());
    hasher.update(content.as_raw());
    Fingerprint(format!("{:x}", hasher.finalize()))
}

/// Copies the region described by `bbox` out of `content`.
///
/// The region is clamped to the image bounds first; a region entirely
/// outside the image yields an empty (0x0) buffer.
pub fn crop_region(content: &RgbaImage, bbox: &BoundingBox) -> RgbaImage {
    let fitted = bbox.fit_in_size(content.width(), content.height());
    let x = fitted.x.max(0) as u32;
    let y = fitted.y.max(0) as u32;

    let mut out = RgbaImage::new(fitted.width, fitted.height);
    for (dx, dy, pixel) in out.enumerate_pixels_mut() {
        *pixel = *content.get_pixel(x + dx, y + dy);
    }
    out
}
