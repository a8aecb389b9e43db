//! Binary codec for bridge controller frames.
//!
//! Wire format:
//! ```text
//! [0x57][0xAB][address:1][command:1][length:1][payload:length][checksum:1]
//! ```
//! The checksum is the low byte of the sum of every preceding byte
//! (header and payload).  The address is always zero in this design.
//!
//! # Why an additive checksum? (for beginners)
//!
//! The controller is a tiny microcontroller; a one-byte running sum is what
//! it can verify cheaply.  It catches single-bit flips on the serial line,
//! which is the failure we actually see with long or noisy cables.  It does
//! **not** catch reordered bytes, so a mismatch is always treated as fatal
//! for that frame rather than something to repair.

use thiserror::Error;

use crate::protocol::command::{ErrorCode, RESPONSE_BIT};

/// Constant sync marker that starts every frame.
pub const SYNC: [u8; 2] = [0x57, 0xAB];

/// Sync (2) + address (1) + command (1) + length (1).
pub const HEADER_SIZE: usize = 5;

/// Largest payload the one-byte length field can describe.
///
/// A 256-byte payload would need a length byte of 256, which wraps to 0 on
/// the wire, so 255 is the real ceiling and anything longer is refused
/// before encoding.
pub const MAX_PAYLOAD_LEN: usize = u8::MAX as usize;

/// Address byte used for every frame we send.
pub const DEFAULT_ADDRESS: u8 = 0x00;

/// Errors that can occur during frame encoding or decoding.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FrameError {
    /// The payload does not fit the one-byte length field.
    #[error("payload of {0} bytes exceeds the {MAX_PAYLOAD_LEN}-byte frame limit")]
    PayloadTooLarge(usize),

    /// The byte slice is shorter than header + checksum.
    #[error("insufficient data: need at least {needed} bytes, got {available}")]
    InsufficientData { needed: usize, available: usize },

    /// The first two bytes are not the sync marker.
    #[error("bad sync marker: {0:02X?}")]
    BadSync([u8; 2]),

    /// The length field disagrees with the number of bytes supplied.
    #[error("payload length mismatch: header says {declared}, available is {available}")]
    PayloadLengthMismatch { declared: usize, available: usize },

    /// The trailing checksum byte does not match the computed sum.
    #[error("checksum mismatch: frame carries 0x{received:02X}, computed 0x{computed:02X}")]
    ChecksumMismatch { received: u8, computed: u8 },
}

/// One protocol message: header fields plus payload.
///
/// The checksum is not stored; it is computed from the other fields whenever
/// the frame is serialised, so a `Frame` can never carry a stale one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    address: u8,
    command: u8,
    payload: Vec<u8>,
}

impl Frame {
    /// The raw command byte (request code, or request code | 0x80 for responses).
    pub fn command(&self) -> u8 {
        self.command
    }

    pub fn address(&self) -> u8 {
        self.address
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Returns `true` when the command byte carries the response bit.
    pub fn is_response(&self) -> bool {
        self.command & RESPONSE_BIT != 0
    }

    /// The 5-byte header exactly as it appears on the wire.
    pub fn header(&self) -> [u8; HEADER_SIZE] {
        [
            SYNC[0],
            SYNC[1],
            self.address,
            self.command,
            self.payload.len() as u8,
        ]
    }

    /// Sum of all header and payload bytes, truncated to 8 bits.
    pub fn checksum(&self) -> u8 {
        checksum(&self.header()).wrapping_add(checksum(&self.payload))
    }

    /// Serialises the frame including its trailing checksum.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(HEADER_SIZE + self.payload.len() + 1);
        buf.extend_from_slice(&self.header());
        buf.extend_from_slice(&self.payload);
        buf.push(self.checksum());
        buf
    }

    /// Classifies the device status this frame reports.
    ///
    /// - A frame without the response bit is not an answer at all and is
    ///   reported as [`ErrorCode::OperationFailed`].
    /// - A response whose payload is exactly one byte carries a status byte;
    ///   that byte is decoded (0x00 = success, 0xE1..0xE6 = failure kinds).
    /// - Any other response shape carries structured data and counts as
    ///   success.
    ///
    /// A command whose genuine answer is a single data byte cannot be told
    /// apart from a status byte; such payloads are always read as status.
    pub fn error_code(&self) -> ErrorCode {
        if !self.is_response() {
            return ErrorCode::OperationFailed;
        }
        match self.payload.as_slice() {
            [status] => ErrorCode::from(*status),
            _ => ErrorCode::Success,
        }
    }
}

// ── Public API ────────────────────────────────────────────────────────────────

/// Builds a frame for `command` carrying `payload`.
///
/// The sync bytes and the address are filled in deterministically.
///
/// # Errors
///
/// Returns [`FrameError::PayloadTooLarge`] if `payload` is longer than
/// [`MAX_PAYLOAD_LEN`].
///
/// # Examples
///
/// ```rust
/// use kvsm_core::protocol::{decode_frame, encode_frame, Command};
///
/// let frame = encode_frame(Command::GetInfo, &[]).unwrap();
/// assert_eq!(frame.to_bytes(), vec![0x57, 0xAB, 0x00, 0x01, 0x00, 0x03]);
/// assert_eq!(decode_frame(&frame.to_bytes()).unwrap(), frame);
/// ```
pub fn encode_frame(command: impl Into<u8>, payload: &[u8]) -> Result<Frame, FrameError> {
    if payload.len() > MAX_PAYLOAD_LEN {
        return Err(FrameError::PayloadTooLarge(payload.len()));
    }
    Ok(Frame {
        address: DEFAULT_ADDRESS,
        command: command.into(),
        payload: payload.to_vec(),
    })
}

/// Decodes exactly one frame from `bytes` (header, payload and checksum).
///
/// # Errors
///
/// Returns [`FrameError`] if the slice is truncated, does not start with the
/// sync marker, has a length field that disagrees with the slice, or fails
/// checksum verification.
pub fn decode_frame(bytes: &[u8]) -> Result<Frame, FrameError> {
    if bytes.len() < HEADER_SIZE + 1 {
        return Err(FrameError::InsufficientData {
            needed: HEADER_SIZE + 1,
            available: bytes.len(),
        });
    }

    if bytes[..2] != SYNC {
        return Err(FrameError::BadSync([bytes[0], bytes[1]]));
    }

    let declared = bytes[4] as usize;
    let available = bytes.len() - HEADER_SIZE - 1;
    if declared != available {
        return Err(FrameError::PayloadLengthMismatch {
            declared,
            available,
        });
    }

    let body = &bytes[..HEADER_SIZE + declared];
    let received = bytes[HEADER_SIZE + declared];
    let computed = checksum(body);
    if received != computed {
        return Err(FrameError::ChecksumMismatch { received, computed });
    }

    Ok(Frame {
        address: bytes[2],
        command: bytes[3],
        payload: bytes[HEADER_SIZE..HEADER_SIZE + declared].to_vec(),
    })
}

/// Additive 8-bit checksum over `bytes`.
pub fn checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |acc, b| acc.wrapping_add(*b))
}

// ── Tests ─────────────────────────────────────────────────────────────────────
