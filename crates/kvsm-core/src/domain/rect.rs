//! Reference rectangle and absolute pointer mapping.
//!
//! The controller's absolute pointer space is 0..=4095 on both axes no
//! matter what resolution the target runs at.  The UI knows where on screen
//! the remote picture is drawn; that region is the *reference rectangle*.
//! A raw window coordinate `p` becomes `(p - origin) * 4096 / size`,
//! clamped into range, so a click on the picture's centre lands on the
//! target's centre.

use serde::{Deserialize, Serialize};

use crate::domain::mouse::ABSOLUTE_MAX;

/// Number of device units spanned by one reference-rect width/height.
const DEVICE_SPAN: f32 = 4096.0;

/// Screen region the remote picture occupies, in UI coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReferenceRect {
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
}

impl Default for ReferenceRect {
    /// Identity mapping: raw coordinates are already device coordinates.
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            w: DEVICE_SPAN,
            h: DEVICE_SPAN,
        }
    }
}

impl ReferenceRect {
    pub fn new(x: f32, y: f32, w: f32, h: f32) -> Self {
        Self { x, y, w, h }
    }

    /// Maps a raw UI point into device coordinates.
    ///
    /// A degenerate (zero or negative) size maps that axis to 0.
    ///
    /// ```rust
    /// use kvsm_core::ReferenceRect;
    ///
    /// let rect = ReferenceRect::new(100.0, 100.0, 200.0, 200.0);
    /// assert_eq!(rect.map_absolute(200.0, 200.0), (2048, 2048));
    /// assert_eq!(rect.map_absolute(50.0, 50.0), (0, 0));
    /// ```
    pub fn map_absolute(&self, x: f32, y: f32) -> (u16, u16) {
        (scale_axis(x, self.x, self.w), scale_axis(y, self.y, self.h))
    }
}

fn scale_axis(raw: f32, origin: f32, size: f32) -> u16 {
    if size.is_nan() || size <= 0.0 {
        return 0;
    }
    let scaled = (raw - origin) * DEVICE_SPAN / size;
    // NaN falls through `clamp` unchanged and `as` turns it into 0.
    scaled.clamp(0.0, ABSOLUTE_MAX as f32) as u16
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_centre_of_rect_maps_to_device_centre() {
        // Arrange
        let rect = ReferenceRect::new(100.0, 100.0, 200.0, 200.0);

        // Act
        let (x, y) = rect.map_absolute(200.0, 200.0);

        // Assert
        assert!((2047..=2048).contains(&x), "x = {x}");
        assert!((2047..=2048).contains(&y), "y = {y}");
    }

    #[test]
    fn test_point_above_left_clamps_to_zero() {
        let rect = ReferenceRect::new(100.0, 100.0, 200.0, 200.0);
        assert_eq!(rect.map_absolute(50.0, 50.0), (0, 0));
    }

    #[test]
    fn test_point_below_right_clamps_to_max() {
        let rect = ReferenceRect::new(100.0, 100.0, 200.0, 200.0);
        assert_eq!(rect.map_absolute(300.0, 1000.0), (ABSOLUTE_MAX, ABSOLUTE_MAX));
    }

    #[test]
    fn test_default_rect_is_identity() {
        let rect = ReferenceRect::default();
        assert_eq!(rect.map_absolute(1234.0, 17.0), (1234, 17));
    }

    #[test]
    fn test_degenerate_rect_maps_to_origin() {
        let rect = ReferenceRect::new(0.0, 0.0, 0.0, -5.0);
        assert_eq!(rect.map_absolute(10.0, 10.0), (0, 0));
    }

    #[test]
    fn test_axes_scale_independently() {
        let rect = ReferenceRect::new(0.0, 0.0, 1024.0, 512.0);
        assert_eq!(rect.map_absolute(256.0, 256.0), (1024, 2048));
    }
}
