//! Random training-time augmentation: horizontal flip, rotation and zoom
//!
//! All three are folded into a single inverse affine map around the image
//! centre and sampled bilinearly, with out-of-range coordinates reflected back
//! into the image.

use ndarray::{Array2, ArrayView2};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::f32::consts::TAU;

/// Ranges the random transforms are drawn from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Augmentation {
    /// Mirror left-right with probability 0.5
    pub horizontal_flip: bool,
    /// Maximum rotation as a fraction of a full turn
    pub rotation_factor: f32,
    /// Maximum relative zoom in or out
    pub zoom_factor: f32,
}

impl Default for Augmentation {
    fn default() -> Self {
        Self {
            horizontal_flip: true,
            rotation_factor: 0.1,
            zoom_factor: 0.1,
        }
    }
}

impl Augmentation {
    /// No-op augmentation
    pub fn none() -> Self {
        Self {
            horizontal_flip: false,
            rotation_factor: 0.0,
            zoom_factor: 0.0,
        }
    }

    /// Draw one concrete transform
    pub fn sample<R: Rng>(&self, rng: &mut R) -> Transform {
        let flip = self.horizontal_flip && rng.gen_bool(0.5);
        let angle = if self.rotation_factor > 0.0 {
            rng.gen_range(-self.rotation_factor..=self.rotation_factor) * TAU
        } else {
            0.0
        };
        let zoom = if self.zoom_factor > 0.0 {
            1.0 + rng.gen_range(-self.zoom_factor..=self.zoom_factor)
        } else {
            1.0
        };
        Transform { flip, angle, zoom }
    }
}

/// A concrete flip/rotate/zoom transform
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub flip: bool,
    /// Radians
    pub angle: f32,
    /// Source-to-output scale; above 1 zooms out
    pub zoom: f32,
}

impl Transform {
    pub fn identity() -> Self {
        Self {
            flip: false,
            angle: 0.0,
            zoom: 1.0,
        }
    }

    /// Apply to an 8-bit image, producing intensities in the same 0..=255 range
    pub fn apply(&self, image: ArrayView2<'_, u8>) -> Array2<f32> {
        let (h, w) = image.dim();
        let cy = (h as f32 - 1.0) / 2.0;
        let cx = (w as f32 - 1.0) / 2.0;
        let (sin, cos) = self.angle.sin_cos();

        Array2::from_shape_fn((h, w), |(y, x)| {
            let mut dx = x as f32 - cx;
            let dy = y as f32 - cy;
            if self.flip {
                dx = -dx;
            }
            let sx = cx + self.zoom * (cos * dx - sin * dy);
            let sy = cy + self.zoom * (sin * dx + cos * dy);
            bilinear(&image, sy, sx)
        })
    }
}

fn bilinear(image: &ArrayView2<'_, u8>, y: f32, x: f32) -> f32 {
    let (h, w) = image.dim();
    let y0 = y.floor();
    let x0 = x.floor();
    let fy = y - y0;
    let fx = x - x0;
    let (y0, x0) = (y0 as i64, x0 as i64);

    let px = |yy: i64, xx: i64| image[[reflect(yy, h), reflect(xx, w)]] as f32;

    let top = px(y0, x0) * (1.0 - fx) + px(y0, x0 + 1) * fx;
    let bottom = px(y0 + 1, x0) * (1.0 - fx) + px(y0 + 1, x0 + 1) * fx;
    top * (1.0 - fy) + bottom * fy
}

/// Reflect an index into `0..len` as `d c b a | a b c d | d c b a`
fn reflect(i: i64, len: usize) -> usize {
    let n = len as i64;
    let period = 2 * n;
    let m = i.rem_euclid(period);
    if m < n {
        m as usize
    } else {
        (period - 1 - m) as usize
    }
}
