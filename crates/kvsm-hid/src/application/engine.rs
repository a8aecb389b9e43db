//! HidEngine: request/response correlation and stateful report encoding.
//!
//! Every public operation is one synchronous round trip: encode a frame,
//! write it, read exactly one response frame, check it.  Unread input is
//! discarded before each write, so a response that turned up after its
//! request timed out can never be mistaken for the next one's answer.  There is never more
//! than one request in flight and nothing is retried; the caller decides what
//! a failure means (the CLI exits, the pipeline logs and moves on).
//!
//! # Why does the engine keep state? (for beginners)
//!
//! The controller turns each frame into one USB report.  A USB keyboard
//! report lists *every* key currently held, so to press `B` while `A` is
//! still down the host must send "A and B", not just "B".  The engine keeps
//! that picture in a [`KeyboardReport`], and the same goes for mouse buttons
//! (which ride along in every motion frame) and media keys.

use std::fmt;
use std::time::Duration;

use kvsm_core::protocol::frame::{HEADER_SIZE, SYNC};
use kvsm_core::{
    decode_frame, encode_frame, Command, ErrorCode, Frame, FrameError, HidKeyCode,
    KeyboardReport, MediaKey, MediaReports, MouseButton, MouseButtons, PressOutcome,
    ReferenceRect, StatusSnapshot, RESPONSE_BIT,
};
use thiserror::Error;
use tracing::{debug, trace};

use crate::infrastructure::serial::{LinkError, SerialLink};

/// Coarse classification of an [`EngineError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The device could not be opened or configured.
    TransportOpen,
    /// A read or write failed or came up short.
    Io,
    /// No response within the receive timeout.
    Timeout,
    /// A response failed its integrity check.
    Checksum,
    /// A response was well-formed but not the expected answer.
    Protocol,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            ErrorKind::TransportOpen => "transport-open",
            ErrorKind::Io => "io",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Checksum => "checksum",
            ErrorKind::Protocol => "protocol",
        };
        f.write_str(text)
    }
}

/// Errors returned by [`HidEngine`] operations.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Link(#[from] LinkError),

    #[error("bad response frame: {0}")]
    Frame(#[from] FrameError),

    /// The response had the wrong command code or carried a failure status.
    #[error("request 0x{request:02X} answered with 0x{actual:02X} ({code})")]
    Protocol { request: u8, actual: u8, code: ErrorCode },

    /// A successful response whose payload has the wrong shape.
    #[error("unexpected {len}-byte payload in response to 0x{command:02X}")]
    UnexpectedPayload { command: u8, len: usize },
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::Link(LinkError::Open { .. } | LinkError::Configure { .. }) => {
                ErrorKind::TransportOpen
            }
            EngineError::Link(LinkError::Timeout(_)) => ErrorKind::Timeout,
            EngineError::Link(_) => ErrorKind::Io,
            EngineError::Frame(FrameError::ChecksumMismatch { .. }) => ErrorKind::Checksum,
            EngineError::Frame(_)
            | EngineError::Protocol { .. }
            | EngineError::UnexpectedPayload { .. } => ErrorKind::Protocol,
        }
    }
}

/// Protocol engine over a [`SerialLink`].
pub struct HidEngine<L> {
    link: L,
    receive_timeout: Duration,
    keyboard: KeyboardReport,
    buttons: MouseButtons,
    media: MediaReports,
}

impl<L: SerialLink> HidEngine<L> {
    /// Wraps `link`; every response must start arriving within `receive_timeout`.
    pub fn new(link: L, receive_timeout: Duration) -> Self {
        Self {
            link,
            receive_timeout,
            keyboard: KeyboardReport::default(),
            buttons: MouseButtons::default(),
            media: MediaReports::default(),
        }
    }

    pub fn link(&self) -> &L {
        &self.link
    }

    /// Gives the transport back, e.g. to close it explicitly.
    pub fn into_link(self) -> L {
        self.link
    }

    pub fn keyboard(&self) -> &KeyboardReport {
        &self.keyboard
    }

    pub fn buttons(&self) -> MouseButtons {
        self.buttons
    }

    // ── Round trip ────────────────────────────────────────────────────────────

    /// Sends `frame` and returns the controller's answer.
    ///
    /// # Errors
    ///
    /// Transport failures and undecodable responses are passed through;
    /// a response that reports a failure status or answers a different
    /// command is [`EngineError::Protocol`].
    pub fn request(&mut self, frame: &Frame) -> Result<Frame, EngineError> {
        let bytes = frame.to_bytes();
        trace!(tx = ?bytes, "request");
        self.link.discard_input()?;
        self.link.write_exact(&bytes)?;

        let response = self.receive()?;
        let code = response.error_code();
        let expected = frame.command() | RESPONSE_BIT;
        if code != ErrorCode::Success || response.command() != expected {
            return Err(EngineError::Protocol {
                request: frame.command(),
                actual: response.command(),
                code,
            });
        }
        Ok(response)
    }

    fn receive(&mut self) -> Result<Frame, EngineError> {
        let timeout = Some(self.receive_timeout);
        let mut bytes = self.link.read_exact(HEADER_SIZE, timeout)?;
        if bytes[..2] != SYNC {
            // The rest of that frame, if any, is unusable.
            if let Err(e) = self.link.discard_input() {
                debug!(error = %e, "could not discard input after bad header");
            }
            return Err(FrameError::BadSync([bytes[0], bytes[1]]).into());
        }
        let remaining = bytes[HEADER_SIZE - 1] as usize + 1;
        bytes.extend(self.link.read_exact(remaining, timeout)?);
        trace!(rx = ?bytes, "response");
        Ok(decode_frame(&bytes)?)
    }

    fn send(&mut self, command: Command, payload: &[u8]) -> Result<Frame, EngineError> {
        let frame = encode_frame(command, payload)?;
        self.request(&frame)
    }

    // ── Status ────────────────────────────────────────────────────────────────

    /// Queries firmware version, USB connection and lock indicators.
    pub fn get_status(&mut self) -> Result<StatusSnapshot, EngineError> {
        let response = self.send(Command::GetInfo, &[])?;
        StatusSnapshot::from_payload(response.payload()).ok_or(EngineError::UnexpectedPayload {
            command: response.command(),
            len: response.payload().len(),
        })
    }

    /// Software-resets the controller.
    pub fn reset(&mut self) -> Result<(), EngineError> {
        self.send(Command::Reset, &[])?;
        Ok(())
    }

    // ── Keyboard ──────────────────────────────────────────────────────────────

    /// Marks `usage` as held and sends the full keyboard report.
    ///
    /// The report is sent even when nothing changed (rollover full, key
    /// already held), so the device always ends up matching the mirror.
    pub fn key_down(&mut self, usage: u8) -> Result<PressOutcome, EngineError> {
        let outcome = self.keyboard.press(usage);
        if outcome == PressOutcome::RolloverFull {
            debug!(usage = format_args!("0x{usage:02X}"), "rollover full, key dropped");
        }
        self.send_keyboard()?;
        Ok(outcome)
    }

    /// Marks `usage` as released and sends the full keyboard report.
    pub fn key_up(&mut self, usage: u8) -> Result<(), EngineError> {
        self.keyboard.release(usage);
        self.send_keyboard()
    }

    /// Releases every key and modifier.
    pub fn release_all_keys(&mut self) -> Result<(), EngineError> {
        self.keyboard.clear();
        self.send_keyboard()
    }

    fn send_keyboard(&mut self) -> Result<(), EngineError> {
        let report = self.keyboard.to_bytes();
        self.send(Command::SendKeyboardGeneral, &report)?;
        Ok(())
    }

    /// Presses or releases a multimedia / ACPI key.
    pub fn media_key(&mut self, key: MediaKey, pressed: bool) -> Result<(), EngineError> {
        let report = self.media.apply(key, pressed);
        self.send(Command::SendKeyboardMedia, &report)?;
        Ok(())
    }

    /// Types `text` as a sequence of key presses on a US layout.
    ///
    /// Upper-case letters are wrapped in a Left-Shift press.  Characters
    /// without a mapping are skipped.  Returns the number typed.
    pub fn type_text(&mut self, text: &str) -> Result<usize, EngineError> {
        let shift = HidKeyCode::ShiftLeft.usage();
        let mut typed = 0;
        for c in text.chars() {
            let Some((key, shifted)) = HidKeyCode::from_ascii(c) else {
                debug!(character = ?c, "no key for character, skipped");
                continue;
            };
            if shifted {
                self.key_down(shift)?;
            }
            self.key_down(key.usage())?;
            self.key_up(key.usage())?;
            if shifted {
                self.key_up(shift)?;
            }
            typed += 1;
        }
        Ok(typed)
    }

    // ── Mouse ─────────────────────────────────────────────────────────────────

    /// Updates the held-button mask and sends it in a zero-motion frame.
    ///
    /// Buttons the report cannot carry are ignored without touching the wire.
    pub fn mouse_button(&mut self, button: MouseButton, pressed: bool) -> Result<(), EngineError> {
        if !self.buttons.set(button, pressed) {
            debug!(?button, "button not representable, ignored");
            return Ok(());
        }
        self.send_relative(0, 0, 0)
    }

    pub fn mouse_move_relative(&mut self, dx: i8, dy: i8) -> Result<(), EngineError> {
        self.send_relative(dx, dy, 0)
    }

    pub fn mouse_wheel(&mut self, delta: i8) -> Result<(), EngineError> {
        self.send_relative(0, 0, delta)
    }

    /// Moves to a UI point, scaled through `rect` into device space.
    pub fn mouse_move_absolute(
        &mut self,
        x: f32,
        y: f32,
        rect: &ReferenceRect,
    ) -> Result<(), EngineError> {
        let (dx, dy) = rect.map_absolute(x, y);
        self.mouse_move_device(dx, dy)
    }

    /// Moves to device coordinates (0..=4095 per axis).
    pub fn mouse_move_device(&mut self, x: u16, y: u16) -> Result<(), EngineError> {
        let report = self.buttons.absolute_report(x, y);
        self.send(Command::SendMouseAbs, &report)?;
        Ok(())
    }

    fn send_relative(&mut self, dx: i8, dy: i8, wheel: i8) -> Result<(), EngineError> {
        let report = self.buttons.relative_report(dx, dy, wheel);
        self.send(Command::SendMouseRel, &report)?;
        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::serial::mock::{Fault, SimulatedBridge};
    use crate::infrastructure::serial::MockSerialLink;

    const TIMEOUT: Duration = Duration::from_millis(20);

    fn engine() -> (HidEngine<SimulatedBridge>, SimulatedBridge) {
        let bridge = SimulatedBridge::new();
        (HidEngine::new(bridge.clone(), TIMEOUT), bridge)
    }

    fn payloads(bridge: &SimulatedBridge, command: Command) -> Vec<Vec<u8>> {
        bridge
            .frames_with(command)
            .iter()
            .map(|f| f.payload().to_vec())
            .collect()
    }

    // ── Status ────────────────────────────────────────────────────────────────

    #[test]
    fn test_get_status_decodes_device_report() {
        // Arrange
        let (mut engine, bridge) = engine();
        bridge.set_status(StatusSnapshot {
            version: 0x30,
            connected: true,
            num_lock: true,
            caps_lock: true,
            scroll_lock: false,
        });

        // Act
        let status = engine.get_status().unwrap();

        // Assert
        assert!(status.connected && status.num_lock && status.caps_lock);
        assert!(!status.scroll_lock);
        assert_eq!(payloads(&bridge, Command::GetInfo), vec![Vec::<u8>::new()]);
    }

    #[test]
    fn test_short_status_payload_is_unexpected_payload() {
        let (mut engine, bridge) = engine();
        bridge.inject(Fault::ShortStatus);

        let err = engine.get_status().unwrap_err();

        assert!(matches!(err, EngineError::UnexpectedPayload { command: 0x81, len: 3 }));
        assert_eq!(err.kind(), ErrorKind::Protocol);
    }

    #[test]
    fn test_device_error_is_protocol_error() {
        let (mut engine, bridge) = engine();
        bridge.inject(Fault::DeviceError(ErrorCode::BadParameter));

        let err = engine.reset().unwrap_err();

        assert!(matches!(
            err,
            EngineError::Protocol { request: 0x0F, actual: 0xCF, code: ErrorCode::BadParameter }
        ));
    }

    #[test]
    fn test_response_to_other_command_is_protocol_error() {
        let (mut engine, bridge) = engine();
        bridge.inject(Fault::WrongCommand);

        let err = engine.mouse_wheel(1).unwrap_err();

        assert!(matches!(err, EngineError::Protocol { request: 0x05, actual: 0x86, .. }));
    }

    #[test]
    fn test_corrupt_response_is_checksum_error() {
        let (mut engine, bridge) = engine();
        bridge.inject(Fault::CorruptChecksum);

        let err = engine.get_status().unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Checksum);
    }

    #[test]
    fn test_silent_device_is_timeout_and_next_request_recovers() {
        // Arrange
        let (mut engine, bridge) = engine();
        bridge.inject(Fault::Silence);

        // Act
        let first = engine.get_status();
        let second = engine.get_status();

        // Assert
        assert_eq!(first.unwrap_err().kind(), ErrorKind::Timeout);
        assert!(second.is_ok());
    }

    // ── Error paths without retries ───────────────────────────────────────────

    #[test]
    fn test_late_response_does_not_shift_later_exchanges() {
        // Arrange
        let (mut engine, bridge) = engine();
        bridge.inject(Fault::Late);

        // Act
        let missed = engine.get_status();
        let pressed = engine.key_down(0x04);
        let released = engine.key_up(0x04);
        let status = engine.get_status();

        // Assert
        assert_eq!(missed.unwrap_err().kind(), ErrorKind::Timeout);
        assert_eq!(pressed.unwrap(), PressOutcome::Inserted(0));
        assert!(released.is_ok());
        assert_eq!(status.unwrap(), bridge.status());
    }

    #[test]
    fn test_input_is_discarded_before_every_write() {
        // Arrange
        let mut seq = mockall::Sequence::new();
        let mut link = MockSerialLink::new();
        link.expect_discard_input()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| Ok(()));
        link.expect_write_exact()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|b| Ok(b.len()));
        link.expect_read_exact()
            .returning(|_, t| Err(LinkError::Timeout(t.unwrap_or_default())));
        let mut engine = HidEngine::new(link, TIMEOUT);

        // Act / Assert
        assert!(engine.reset().is_err());
    }

    #[test]
    fn test_timeout_is_not_retried() {
        // Arrange
        let mut link = MockSerialLink::new();
        link.expect_discard_input().returning(|| Ok(()));
        link.expect_write_exact().times(1).returning(|b| Ok(b.len()));
        link.expect_read_exact()
            .times(1)
            .returning(|_, t| Err(LinkError::Timeout(t.unwrap_or_default())));
        let mut engine = HidEngine::new(link, TIMEOUT);

        // Act
        let err = engine.get_status().unwrap_err();

        // Assert
        assert_eq!(err.kind(), ErrorKind::Timeout);
    }

    #[test]
    fn test_short_write_fails_before_reading() {
        let mut link = MockSerialLink::new();
        link.expect_discard_input().returning(|| Ok(()));
        link.expect_write_exact()
            .times(1)
            .returning(|b| Err(LinkError::ShortWrite { written: 2, expected: b.len() }));
        link.expect_read_exact().never();
        let mut engine = HidEngine::new(link, TIMEOUT);

        let err = engine.key_down(0x04).unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Io);
    }

    #[test]
    fn test_garbage_header_is_rejected_without_reading_body() {
        let mut link = MockSerialLink::new();
        // Once before the write, once after the bad header.
        link.expect_discard_input().times(2).returning(|| Ok(()));
        link.expect_write_exact().returning(|b| Ok(b.len()));
        link.expect_read_exact()
            .times(1)
            .returning(|len, _| Ok(vec![0xFF; len]));
        let mut engine = HidEngine::new(link, TIMEOUT);

        let err = engine.reset().unwrap_err();

        assert!(matches!(err, EngineError::Frame(FrameError::BadSync([0xFF, 0xFF]))));
    }

    #[test]
    fn test_error_kind_of_open_failure() {
        let err = EngineError::from(LinkError::Open {
            path: "/dev/null".into(),
            source: std::io::Error::from(std::io::ErrorKind::NotFound),
        });
        assert_eq!(err.kind(), ErrorKind::TransportOpen);
    }

    // ── Keyboard ──────────────────────────────────────────────────────────────

    #[test]
    fn test_key_down_and_up_send_full_reports() {
        // Arrange
        let (mut engine, bridge) = engine();

        // Act
        engine.key_down(HidKeyCode::ShiftLeft.usage()).unwrap();
        engine.key_down(HidKeyCode::KeyA.usage()).unwrap();
        engine.key_down(HidKeyCode::KeyB.usage()).unwrap();
        engine.key_up(HidKeyCode::KeyA.usage()).unwrap();

        // Assert
        assert_eq!(
            payloads(&bridge, Command::SendKeyboardGeneral),
            vec![
                vec![0x02, 0, 0, 0, 0, 0, 0, 0],
                vec![0x02, 0, 0x04, 0, 0, 0, 0, 0],
                vec![0x02, 0, 0x04, 0x05, 0, 0, 0, 0],
                vec![0x02, 0, 0, 0x05, 0, 0, 0, 0],
            ]
        );
    }

    #[test]
    fn test_seventh_key_resends_unchanged_report() {
        let (mut engine, bridge) = engine();
        for usage in 0x04..0x0A {
            engine.key_down(usage).unwrap();
        }

        let outcome = engine.key_down(0x0A).unwrap();

        let sent = payloads(&bridge, Command::SendKeyboardGeneral);
        assert_eq!(outcome, PressOutcome::RolloverFull);
        assert_eq!(sent[5], sent[6]);
    }

    #[test]
    fn test_type_text_wraps_capitals_in_shift() {
        // Arrange
        let (mut engine, bridge) = engine();

        // Act
        let typed = engine.type_text("Hi!").unwrap();

        // Assert
        let modifiers_and_first_slot: Vec<(u8, u8)> = payloads(&bridge, Command::SendKeyboardGeneral)
            .iter()
            .map(|p| (p[0], p[2]))
            .collect();
        assert_eq!(typed, 2);
        assert_eq!(
            modifiers_and_first_slot,
            vec![(0x02, 0), (0x02, 0x0B), (0x02, 0), (0, 0), (0, 0x0C), (0, 0)]
        );
        assert_eq!(engine.keyboard(), &KeyboardReport::default());
    }

    #[test]
    fn test_media_keys_send_four_byte_reports() {
        let (mut engine, bridge) = engine();

        engine.media_key(MediaKey::Mute, true).unwrap();
        engine.media_key(MediaKey::Mute, false).unwrap();

        assert_eq!(
            payloads(&bridge, Command::SendKeyboardMedia),
            vec![vec![0x02, 0x04, 0, 0], vec![0x02, 0, 0, 0]]
        );
    }

    // ── Mouse ─────────────────────────────────────────────────────────────────

    #[test]
    fn test_button_state_persists_into_motion_and_wheel_frames() {
        // Arrange
        let (mut engine, bridge) = engine();

        // Act
        engine.mouse_button(MouseButton::Left, true).unwrap();
        engine.mouse_move_relative(10, -3).unwrap();
        engine.mouse_wheel(-1).unwrap();
        engine.mouse_button(MouseButton::Left, false).unwrap();

        // Assert
        assert_eq!(
            payloads(&bridge, Command::SendMouseRel),
            vec![
                vec![0x01, 0x01, 0, 0, 0],
                vec![0x01, 0x01, 10, 0xFD, 0],
                vec![0x01, 0x01, 0, 0, 0xFF],
                vec![0x01, 0x00, 0, 0, 0],
            ]
        );
    }

    #[test]
    fn test_unrepresentable_button_sends_nothing() {
        let (mut engine, bridge) = engine();
        engine.mouse_button(MouseButton::Button4, true).unwrap();
        assert!(bridge.frames().is_empty());
    }

    #[test]
    fn test_absolute_move_scales_through_reference_rect() {
        // Arrange
        let (mut engine, bridge) = engine();
        engine.mouse_button(MouseButton::Right, true).unwrap();
        let rect = ReferenceRect::new(100.0, 100.0, 200.0, 200.0);

        // Act
        engine.mouse_move_absolute(200.0, 50.0, &rect).unwrap();

        // Assert – x = 2048 → 0x0800, y clamps to 0
        assert_eq!(
            payloads(&bridge, Command::SendMouseAbs),
            vec![vec![0x02, 0x02, 0x00, 0x08, 0x00, 0x00, 0x00]]
        );
    }
}
