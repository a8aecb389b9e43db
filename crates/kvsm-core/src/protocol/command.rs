//! Command codes and device error codes of the bridge controller protocol.
//!
//! # Requests and responses (for beginners)
//!
//! Every frame the host sends carries a *command code* in the range
//! 0x01–0x0F.  The controller answers with the same code plus the high bit
//! set (`0x01` → `0x81`).  When a command fails the controller sets the two
//! top bits instead (`0x01` → `0xC1`) and puts a single *error code* byte in
//! the payload.
//!
//! | Request | Response | Meaning                          |
//! |---------|----------|----------------------------------|
//! | 0x01    | 0x81     | chip version, USB and LED status |
//! | 0x02    | 0x82     | standard keyboard report         |
//! | 0x03    | 0x83     | media / ACPI keyboard report     |
//! | 0x04    | 0x84     | absolute mouse report            |
//! | 0x05    | 0x85     | relative mouse report            |
//! | 0x0F    | 0x8F     | software reset                   |

use std::fmt;

use num_enum::{IntoPrimitive, TryFromPrimitive};

/// Bit OR'd into a request code to form its response code.
pub const RESPONSE_BIT: u8 = 0x80;

/// Both top bits set marks an error response.
pub const ERROR_RESPONSE_BITS: u8 = 0xC0;

/// Request command codes understood by the controller.
///
/// Frames store the raw byte, so codes outside this table still travel
/// through the codec untouched; this enum only names the known ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum Command {
    /// Chip version, USB enumeration state and keyboard LED state.
    GetInfo = 0x01,
    /// Standard 8-byte keyboard report.
    SendKeyboardGeneral = 0x02,
    /// Multimedia or ACPI keyboard report.
    SendKeyboardMedia = 0x03,
    /// Absolute pointer report (0..4095 per axis).
    SendMouseAbs = 0x04,
    /// Relative pointer report (signed 8-bit deltas).
    SendMouseRel = 0x05,
    /// Raw data for the custom HID interface.
    SendMyHidData = 0x06,
    /// Custom HID data pushed by the chip (already carries the response bit).
    ReadMyHidData = 0x87,
    GetParaCfg = 0x08,
    SetParaCfg = 0x09,
    GetUsbString = 0x0A,
    SetUsbString = 0x0B,
    /// Restore factory configuration.
    SetDefaultCfg = 0x0C,
    /// Software reset.
    Reset = 0x0F,
}

impl Command {
    /// The code a successful response to this command carries.
    pub fn response_code(self) -> u8 {
        u8::from(self) | RESPONSE_BIT
    }
}

/// Status byte carried in single-byte response payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// 0x00 – command executed.
    Success,
    /// 0xE1 – the chip timed out waiting for the rest of a frame.
    Timeout,
    /// 0xE2 – sync bytes were wrong.
    BadHeader,
    /// 0xE3 – unknown command code.
    BadCommand,
    /// 0xE4 – checksum of the request did not match.
    BadChecksum,
    /// 0xE5 – payload content was rejected.
    BadParameter,
    /// 0xE6 – the request was understood but could not be carried out.
    OperationFailed,
}

impl ErrorCode {
    /// Returns the wire byte for this code.
    pub fn as_byte(self) -> u8 {
        match self {
            ErrorCode::Success => 0x00,
            ErrorCode::Timeout => 0xE1,
            ErrorCode::BadHeader => 0xE2,
            ErrorCode::BadCommand => 0xE3,
            ErrorCode::BadChecksum => 0xE4,
            ErrorCode::BadParameter => 0xE5,
            ErrorCode::OperationFailed => 0xE6,
        }
    }
}

impl From<u8> for ErrorCode {
    /// Unrecognised bytes are reported as [`ErrorCode::OperationFailed`].
    fn from(byte: u8) -> Self {
        match byte {
            0x00 => ErrorCode::Success,
            0xE1 => ErrorCode::Timeout,
            0xE2 => ErrorCode::BadHeader,
            0xE3 => ErrorCode::BadCommand,
            0xE4 => ErrorCode::BadChecksum,
            0xE5 => ErrorCode::BadParameter,
            _ => ErrorCode::OperationFailed,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            ErrorCode::Success => "success",
            ErrorCode::Timeout => "device receive timeout",
            ErrorCode::BadHeader => "bad frame header",
            ErrorCode::BadCommand => "bad command code",
            ErrorCode::BadChecksum => "checksum mismatch",
            ErrorCode::BadParameter => "bad parameter",
            ErrorCode::OperationFailed => "operation failed",
        };
        f.write_str(text)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
