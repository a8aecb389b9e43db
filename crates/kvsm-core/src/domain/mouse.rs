//! Mouse button state and mouse report layouts.
//!
//! Relative report (command 0x05), 5 bytes:
//! ```text
//! [0x01][buttons][dx:i8][dy:i8][wheel:i8]
//! ```
//! Absolute report (command 0x04), 7 bytes:
//! ```text
//! [0x02][buttons][x lo][x hi][y lo][y hi][wheel:i8]
//! ```
//! The controller has no memory of which buttons are down, so the same
//! bitmask has to ride along in every motion and wheel frame.

use serde::{Deserialize, Serialize};

/// Report id byte of the relative mouse report.
pub const RELATIVE_REPORT_ID: u8 = 0x01;

/// Report id byte of the absolute mouse report.
pub const ABSOLUTE_REPORT_ID: u8 = 0x02;

/// Largest coordinate on either axis of the absolute pointer space.
pub const ABSOLUTE_MAX: u16 = 4095;

/// Mouse buttons as reported by the UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MouseButton {
    Left,
    Right,
    Middle,
    /// Side button "back".
    Button4,
    /// Side button "forward".
    Button5,
}

impl MouseButton {
    /// Bit of this button in the report's button byte.
    ///
    /// Only left, right and middle are forwarded; side buttons return `None`.
    pub fn mask(self) -> Option<u8> {
        match self {
            MouseButton::Left => Some(0x01),
            MouseButton::Right => Some(0x02),
            MouseButton::Middle => Some(0x04),
            MouseButton::Button4 | MouseButton::Button5 => None,
        }
    }
}

/// Held-button bitmask persisted across mouse frames.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MouseButtons(u8);

impl MouseButtons {
    pub fn bits(self) -> u8 {
        self.0
    }

    pub fn is_pressed(self, button: MouseButton) -> bool {
        button.mask().is_some_and(|m| self.0 & m != 0)
    }

    /// Updates the bit for `button`.  Returns `false` if the button is not
    /// representable and was ignored.
    pub fn set(&mut self, button: MouseButton, pressed: bool) -> bool {
        let Some(mask) = button.mask() else {
            return false;
        };
        if pressed {
            self.0 |= mask;
        } else {
            self.0 &= !mask;
        }
        true
    }

    /// Relative report carrying the held buttons.
    pub fn relative_report(self, dx: i8, dy: i8, wheel: i8) -> [u8; 5] {
        [
            RELATIVE_REPORT_ID,
            self.0,
            dx as u8,
            dy as u8,
            wheel as u8,
        ]
    }

    /// Absolute report carrying the held buttons.  Coordinates above
    /// [`ABSOLUTE_MAX`] are clamped.
    pub fn absolute_report(self, x: u16, y: u16) -> [u8; 7] {
        let [xl, xh] = x.min(ABSOLUTE_MAX).to_le_bytes();
        let [yl, yh] = y.min(ABSOLUTE_MAX).to_le_bytes();
        [ABSOLUTE_REPORT_ID, self.0, xl, xh, yl, yh, 0]
    }
}

/// Saturates `value` into the signed 8-bit range used by relative reports.
pub fn clamp_i8(value: i32) -> i8 {
    value.clamp(i8::MIN as i32, i8::MAX as i32) as i8
}
