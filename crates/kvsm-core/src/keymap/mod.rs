//! Key code tables.
//!
//! The canonical representation is USB HID Usage IDs (page 0x07,
//! Keyboard/Keypad), which is also what the bridge controller expects.

pub mod hid;

pub use hid::{modifier_mask, HidKeyCode};
