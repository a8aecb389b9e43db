//! Multimedia (consumer) and ACPI keys.
//!
//! Both ride on command 0x03 as a 4-byte report whose first byte selects the
//! report id:
//!
//! ```text
//! ACPI      [0x01][power|sleep|wake bits][0][0]
//! Consumer  [0x02][byte1 bits][byte2 bits][byte3 bits]
//! ```
//!
//! Like the keyboard report, each is a full snapshot of held keys, so both
//! bitmasks are kept here and the whole report is resent on every change.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Report id of the ACPI (power management) report.
pub const ACPI_REPORT_ID: u8 = 0x01;

/// Report id of the consumer (multimedia) report.
pub const CONSUMER_REPORT_ID: u8 = 0x02;

/// Length of either media report.
pub const MEDIA_REPORT_LEN: usize = 4;

/// Which of the two media reports a key belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaPage {
    Acpi,
    Consumer,
}

/// Keys sent through the media/ACPI report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MediaKey {
    // ACPI
    Power,
    Sleep,
    Wake,

    // Consumer, byte 1
    VolumeUp,
    VolumeDown,
    Mute,
    PlayPause,
    NextTrack,
    PrevTrack,
    Stop,
    Eject,

    // Consumer, byte 2
    Email,
    Search,
    Favorites,
    Home,
    Back,
    Forward,
    WwwStop,
    Refresh,

    // Consumer, byte 3
    Media,
    Explorer,
    Calculator,
    ScreenSave,
    MyComputer,
    Minimize,
    Record,
    Rewind,
}

/// Name table used by `FromStr`/`Display`, in bit order within each page.
const NAMES: &[(MediaKey, &str)] = &[
    (MediaKey::Power, "power"),
    (MediaKey::Sleep, "sleep"),
    (MediaKey::Wake, "wake"),
    (MediaKey::VolumeUp, "volume-up"),
    (MediaKey::VolumeDown, "volume-down"),
    (MediaKey::Mute, "mute"),
    (MediaKey::PlayPause, "play-pause"),
    (MediaKey::NextTrack, "next-track"),
    (MediaKey::PrevTrack, "prev-track"),
    (MediaKey::Stop, "stop"),
    (MediaKey::Eject, "eject"),
    (MediaKey::Email, "email"),
    (MediaKey::Search, "search"),
    (MediaKey::Favorites, "favorites"),
    (MediaKey::Home, "home"),
    (MediaKey::Back, "back"),
    (MediaKey::Forward, "forward"),
    (MediaKey::WwwStop, "www-stop"),
    (MediaKey::Refresh, "refresh"),
    (MediaKey::Media, "media"),
    (MediaKey::Explorer, "explorer"),
    (MediaKey::Calculator, "calculator"),
    (MediaKey::ScreenSave, "screen-save"),
    (MediaKey::MyComputer, "my-computer"),
    (MediaKey::Minimize, "minimize"),
    (MediaKey::Record, "record"),
    (MediaKey::Rewind, "rewind"),
];

impl MediaKey {
    pub fn page(self) -> MediaPage {
        match self {
            MediaKey::Power | MediaKey::Sleep | MediaKey::Wake => MediaPage::Acpi,
            _ => MediaPage::Consumer,
        }
    }

    /// Bit index within the 24 bits following the report id.
    fn bit(self) -> u32 {
        match self {
            MediaKey::Power => 0,
            MediaKey::Sleep => 1,
            MediaKey::Wake => 2,

            MediaKey::VolumeUp => 0,
            MediaKey::VolumeDown => 1,
            MediaKey::Mute => 2,
            MediaKey::PlayPause => 3,
            MediaKey::NextTrack => 4,
            MediaKey::PrevTrack => 5,
            MediaKey::Stop => 6,
            MediaKey::Eject => 7,

            MediaKey::Email => 8,
            MediaKey::Search => 9,
            MediaKey::Favorites => 10,
            MediaKey::Home => 11,
            MediaKey::Back => 12,
            MediaKey::Forward => 13,
            MediaKey::WwwStop => 14,
            MediaKey::Refresh => 15,

            MediaKey::Media => 16,
            MediaKey::Explorer => 17,
            MediaKey::Calculator => 18,
            MediaKey::ScreenSave => 19,
            MediaKey::MyComputer => 20,
            MediaKey::Minimize => 21,
            MediaKey::Record => 22,
            MediaKey::Rewind => 23,
        }
    }

    pub fn name(self) -> &'static str {
        NAMES
            .iter()
            .find(|(key, _)| *key == self)
            .map(|(_, name)| *name)
            .unwrap_or("unknown")
    }

    /// Every key, in report bit order.
    pub fn all() -> impl Iterator<Item = MediaKey> {
        NAMES.iter().map(|(key, _)| *key)
    }
}

impl fmt::Display for MediaKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Error returned when parsing an unknown media key name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown media key: {0}")]
pub struct UnknownMediaKey(pub String);

impl FromStr for MediaKey {
    type Err = UnknownMediaKey;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase().replace('_', "-");
        NAMES
            .iter()
            .find(|(_, name)| *name == wanted)
            .map(|(key, _)| *key)
            .ok_or_else(|| UnknownMediaKey(s.to_string()))
    }
}

/// Persistent held-key bitmasks for both media reports.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MediaReports {
    acpi: u32,
    consumer: u32,
}

impl MediaReports {
    /// Sets or clears the key's bit and returns the full report to send.
    pub fn apply(&mut self, key: MediaKey, pressed: bool) -> [u8; MEDIA_REPORT_LEN] {
        let mask = 1u32 << key.bit();
        let (bits, id) = match key.page() {
            MediaPage::Acpi => (&mut self.acpi, ACPI_REPORT_ID),
            MediaPage::Consumer => (&mut self.consumer, CONSUMER_REPORT_ID),
        };
        if pressed {
            *bits |= mask;
        } else {
            *bits &= !mask;
        }
        let [b1, b2, b3, _] = bits.to_le_bytes();
        [id, b1, b2, b3]
    }
}
