//! USB HID Usage IDs (page 0x07, Keyboard/Keypad page).
//!
//! The bridge controller speaks raw Usage IDs: every byte in the six key
//! slots of a keyboard report is one of these values, and the eight modifier
//! keys (0xE0–0xE7) are folded into the report's modifier bitmask instead.
//!
//! Reference: USB HID Usage Tables 1.3, Section 10 (Keyboard/Keypad page 0x07).
//!
//! # Why keep a typed table at all? (for beginners)
//!
//! The protocol engine works on plain `u8` usages, because the UI hands us
//! whatever its windowing library reports and the controller accepts any
//! byte.  The typed [`HidKeyCode`] exists for the edges: readable log output
//! (`KeyA` instead of `0x04`), the modifier-bit arithmetic, and the ASCII
//! table used by the text-typing helper.

use num_enum::{IntoPrimitive, TryFromPrimitive};
use serde::{Deserialize, Serialize};

/// First modifier usage (Left Control); modifiers occupy 0xE0..=0xE7.
pub const FIRST_MODIFIER: u8 = 0xE0;

/// Last modifier usage (Right GUI).
pub const LAST_MODIFIER: u8 = 0xE7;

/// USB HID Usage ID for keyboard keys (page 0x07).
///
/// The numeric value of each variant is its HID Usage ID on the keyboard/keypad page.
/// Convert from a raw byte with `HidKeyCode::try_from(byte)`.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    TryFromPrimitive,
    IntoPrimitive,
)]
#[repr(u8)]
pub enum HidKeyCode {
    // Letters (HID 0x04–0x1D)
    KeyA = 0x04,
    KeyB = 0x05,
    KeyC = 0x06,
    KeyD = 0x07,
    KeyE = 0x08,
    KeyF = 0x09,
    KeyG = 0x0A,
    KeyH = 0x0B,
    KeyI = 0x0C,
    KeyJ = 0x0D,
    KeyK = 0x0E,
    KeyL = 0x0F,
    KeyM = 0x10,
    KeyN = 0x11,
    KeyO = 0x12,
    KeyP = 0x13,
    KeyQ = 0x14,
    KeyR = 0x15,
    KeyS = 0x16,
    KeyT = 0x17,
    KeyU = 0x18,
    KeyV = 0x19,
    KeyW = 0x1A,
    KeyX = 0x1B,
    KeyY = 0x1C,
    KeyZ = 0x1D,

    // Digits (HID 0x1E–0x27)
    Digit1 = 0x1E,
    Digit2 = 0x1F,
    Digit3 = 0x20,
    Digit4 = 0x21,
    Digit5 = 0x22,
    Digit6 = 0x23,
    Digit7 = 0x24,
    Digit8 = 0x25,
    Digit9 = 0x26,
    Digit0 = 0x27,

    // Control and punctuation (HID 0x28–0x38)
    Enter = 0x28,
    Escape = 0x29,
    Backspace = 0x2A,
    Tab = 0x2B,
    Space = 0x2C,
    Minus = 0x2D,
    Equal = 0x2E,
    BracketLeft = 0x2F,
    BracketRight = 0x30,
    Backslash = 0x31,
    NonUsHash = 0x32,
    Semicolon = 0x33,
    Quote = 0x34,
    Backquote = 0x35,
    Comma = 0x36,
    Period = 0x37,
    Slash = 0x38,

    CapsLock = 0x39,

    // Function keys (HID 0x3A–0x45)
    F1 = 0x3A,
    F2 = 0x3B,
    F3 = 0x3C,
    F4 = 0x3D,
    F5 = 0x3E,
    F6 = 0x3F,
    F7 = 0x40,
    F8 = 0x41,
    F9 = 0x42,
    F10 = 0x43,
    F11 = 0x44,
    F12 = 0x45,

    // Navigation cluster (HID 0x46–0x52)
    PrintScreen = 0x46,
    ScrollLock = 0x47,
    Pause = 0x48,
    Insert = 0x49,
    Home = 0x4A,
    PageUp = 0x4B,
    Delete = 0x4C,
    End = 0x4D,
    PageDown = 0x4E,
    ArrowRight = 0x4F,
    ArrowLeft = 0x50,
    ArrowDown = 0x51,
    ArrowUp = 0x52,

    // Keypad (HID 0x53–0x63)
    NumLock = 0x53,
    NumpadDivide = 0x54,
    NumpadMultiply = 0x55,
    NumpadSubtract = 0x56,
    NumpadAdd = 0x57,
    NumpadEnter = 0x58,
    Numpad1 = 0x59,
    Numpad2 = 0x5A,
    Numpad3 = 0x5B,
    Numpad4 = 0x5C,
    Numpad5 = 0x5D,
    Numpad6 = 0x5E,
    Numpad7 = 0x5F,
    Numpad8 = 0x60,
    Numpad9 = 0x61,
    Numpad0 = 0x62,
    NumpadDecimal = 0x63,

    IntlBackslash = 0x64,
    ContextMenu = 0x65,

    // Modifier keys (HID 0xE0–0xE7); bit = usage - 0xE0
    ControlLeft = 0xE0,
    ShiftLeft = 0xE1,
    AltLeft = 0xE2,
    MetaLeft = 0xE3,
    ControlRight = 0xE4,
    ShiftRight = 0xE5,
    AltRight = 0xE6,
    MetaRight = 0xE7,
}

impl HidKeyCode {
    /// Returns the raw Usage ID.
    pub fn usage(self) -> u8 {
        self.into()
    }

    /// Returns `true` if this is one of the eight modifier keys.
    pub fn is_modifier(self) -> bool {
        modifier_mask(self.usage()).is_some()
    }

    /// Maps a printable ASCII character to the key that produces it on a
    /// US layout, plus whether Shift must be held.
    ///
    /// Only letters, digits and space are covered; everything else returns
    /// `None` and is skipped by the typing helper.
    ///
    /// ```rust
    /// use kvsm_core::HidKeyCode;
    ///
    /// assert_eq!(HidKeyCode::from_ascii('a'), Some((HidKeyCode::KeyA, false)));
    /// assert_eq!(HidKeyCode::from_ascii('Z'), Some((HidKeyCode::KeyZ, true)));
    /// assert_eq!(HidKeyCode::from_ascii('!'), None);
    /// ```
    pub fn from_ascii(c: char) -> Option<(HidKeyCode, bool)> {
        let (usage, shift) = match c {
            'a'..='z' => (c as u8 - b'a' + 0x04, false),
            'A'..='Z' => (c as u8 - b'A' + 0x04, true),
            '1'..='9' => (c as u8 - b'1' + 0x1E, false),
            '0' => (0x27, false),
            ' ' => (0x2C, false),
            _ => return None,
        };
        HidKeyCode::try_from(usage).ok().map(|key| (key, shift))
    }
}

/// Returns the modifier-byte bit for `usage`, or `None` if it is not a modifier.
pub fn modifier_mask(usage: u8) -> Option<u8> {
    if (FIRST_MODIFIER..=LAST_MODIFIER).contains(&usage) {
        Some(1 << (usage - FIRST_MODIFIER))
    } else {
        None
    }
}
