//! Domain entities for kvsm.
//!
//! This module contains pure state and arithmetic with no infrastructure
//! dependencies.
//!
//! # What lives here? (for beginners)
//!
//! The bridge controller is *stateless* from the host's point of view: every
//! keyboard frame must carry the complete set of held keys, and every mouse
//! frame must carry the complete set of held buttons.  If the host forgot that
//! Shift was down, the next frame would silently release it on the target.
//!
//! So the host keeps a mirror of the device-side state:
//!
//! - [`keyboard::KeyboardReport`] – modifier bitmask plus six key slots.
//! - [`mouse::MouseButtons`] – held-button bitmask shared by every mouse frame.
//! - [`media::MediaReports`] – consumer and ACPI key bitmasks.
//!
//! and a few value types describing what flows in and out:
//!
//! - [`event::InputEvent`] – what the UI hands to the pipeline.
//! - [`status::StatusSnapshot`] – what the device reports when polled.
//! - [`rect::ReferenceRect`] – how window coordinates become device coordinates.
//!
//! None of these types touch a serial port, so all of them are tested in
//! isolation.

pub mod event;
pub mod keyboard;
pub mod media;
pub mod mouse;
pub mod rect;
pub mod status;
