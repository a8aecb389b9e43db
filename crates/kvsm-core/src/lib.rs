//! # kvsm-core
//!
//! Shared library for kvsm containing the serial frame codec, the device-side
//! keyboard/mouse state that is mirrored on the host, and the USB HID usage
//! table.
//!
//! It has zero dependencies on OS APIs, serial devices, or threads, so every
//! piece in here can be unit-tested without hardware.
//!
//! # Architecture overview (for beginners)
//!
//! kvsm drives a *bridge controller*: a small chip (CH9329 and compatibles)
//! that sits on a serial line on one side and appears as a USB keyboard and
//! mouse on the other.  The host sends it short binary *frames*; the chip
//! turns each frame into a USB HID report for the target machine and answers
//! with a response frame.
//!
//! This crate (`kvsm-core`) is the shared foundation.  It defines:
//!
//! - **`protocol`** – How bytes travel over the serial line.  A frame is a
//!   5-byte header, up to 255 payload bytes and a one-byte additive checksum.
//!
//! - **`domain`** – The state the chip cannot remember for us: which keys are
//!   held, which mouse buttons are down, the last status the chip reported,
//!   and how window coordinates map onto the chip's absolute pointer space.
//!
//! - **`keymap`** – USB HID Usage IDs for the keyboard page, plus the small
//!   ASCII table used when typing text.

pub mod domain;
pub mod keymap;
pub mod protocol;

pub use domain::event::InputEvent;
pub use domain::keyboard::{KeyboardReport, PressOutcome, ROLLOVER_SLOTS};
pub use domain::media::{MediaKey, MediaReports};
pub use domain::mouse::{MouseButton, MouseButtons};
pub use domain::rect::ReferenceRect;
pub use domain::status::StatusSnapshot;
pub use keymap::hid::HidKeyCode;
pub use protocol::command::{Command, ErrorCode, RESPONSE_BIT};
pub use protocol::frame::{decode_frame, encode_frame, Frame, FrameError};
