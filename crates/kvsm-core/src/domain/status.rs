//! Device status as reported by the GetInfo command.
//!
//! Response payload (8 bytes):
//! ```text
//! [version][usb connected = 0x01][lock LEDs][reserved x5]
//! ```
//! LED bits: num lock 0x01, caps lock 0x02, scroll lock 0x04.

use serde::Serialize;

/// Exact length of a GetInfo response payload.
pub const STATUS_PAYLOAD_LEN: usize = 8;

const LED_NUM_LOCK: u8 = 0x01;
const LED_CAPS_LOCK: u8 = 0x02;
const LED_SCROLL_LOCK: u8 = 0x04;

/// Cached result of the last successful status poll.
///
/// The default value (all false, version 0) is what the UI sees before the
/// first poll succeeds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusSnapshot {
    pub version: u8,
    pub connected: bool,
    pub num_lock: bool,
    pub caps_lock: bool,
    pub scroll_lock: bool,
}

impl StatusSnapshot {
    /// Decodes a GetInfo payload.  Returns `None` unless the payload is
    /// exactly [`STATUS_PAYLOAD_LEN`] bytes.
    pub fn from_payload(payload: &[u8]) -> Option<Self> {
        if payload.len() != STATUS_PAYLOAD_LEN {
            return None;
        }
        let leds = payload[2];
        Some(Self {
            version: payload[0],
            connected: payload[1] == 0x01,
            num_lock: leds & LED_NUM_LOCK != 0,
            caps_lock: leds & LED_CAPS_LOCK != 0,
            scroll_lock: leds & LED_SCROLL_LOCK != 0,
        })
    }

    /// Encodes the snapshot back into a GetInfo payload.
    pub fn to_payload(&self) -> [u8; STATUS_PAYLOAD_LEN] {
        let mut leds = 0;
        if self.num_lock {
            leds |= LED_NUM_LOCK;
        }
        if self.caps_lock {
            leds |= LED_CAPS_LOCK;
        }
        if self.scroll_lock {
            leds |= LED_SCROLL_LOCK;
        }
        [self.version, u8::from(self.connected), leds, 0, 0, 0, 0, 0]
    }

    /// Firmware version as `V<hi>.<lo>`, e.g. `0x30` → `V3.0`.
    pub fn version_string(&self) -> String {
        format!("V{}.{}", self.version >> 4, self.version & 0x0F)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decodes_connection_and_lock_bits() {
        // Arrange
        let payload = [0x30, 0x01, 0x05, 0, 0, 0, 0, 0];

        // Act
        let status = StatusSnapshot::from_payload(&payload).unwrap();

        // Assert
        assert_eq!(
            status,
            StatusSnapshot {
                version: 0x30,
                connected: true,
                num_lock: true,
                caps_lock: false,
                scroll_lock: true,
            }
        );
    }

    #[test]
    fn test_connection_byte_other_than_one_is_disconnected() {
        let status = StatusSnapshot::from_payload(&[0x30, 0x00, 0x02, 0, 0, 0, 0, 0]).unwrap();
        assert!(!status.connected);
        assert!(status.caps_lock);
    }

    #[test]
    fn test_wrong_length_is_rejected() {
        assert_eq!(StatusSnapshot::from_payload(&[0x30, 0x01, 0x00]), None);
        assert_eq!(StatusSnapshot::from_payload(&[0u8; 9]), None);
    }

    #[test]
    fn test_payload_encoding_inverts_decoding() {
        let status = StatusSnapshot {
            version: 0x31,
            connected: true,
            num_lock: false,
            caps_lock: true,
            scroll_lock: true,
        };
        assert_eq!(StatusSnapshot::from_payload(&status.to_payload()), Some(status));
    }

    #[test]
    fn test_version_string_splits_nibbles() {
        let status = StatusSnapshot { version: 0x30, ..Default::default() };
        assert_eq!(status.version_string(), "V3.0");
    }
}
