//! In-memory bridge controller for tests and hardware-free runs.
//!
//! # How it works
//!
//! `SimulatedBridge` implements [`SerialLink`] by decoding every frame
//! written to it, recording the frame, and queueing the response bytes the
//! real controller would send back:
//!
//! - `GetInfo` (0x01) → `0x81` with the 8-byte status payload from
//!   [`SimulatedBridge::set_status`].
//! - any other command `c` → `c | 0x80` with a single `0x00` status byte.
//! - an undecodable frame → `0xC0`-style error response carrying the
//!   matching error code.
//!
//! The bridge is cheaply cloneable; clones share state.  Hand one clone to
//! the engine and keep another in the test to inspect what was sent and to
//! script faults.
//!
//! # Faults
//!
//! [`SimulatedBridge::inject`] queues a one-shot [`Fault`] applied to the
//! next response; [`SimulatedBridge::set_persistent_fault`] applies one to
//! every response until cleared.
//!
//! [`Fault::Late`] models a real tty buffer: the response only lands once
//! the reader has already timed out, and stays there until read or
//! discarded.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use kvsm_core::protocol::command::ERROR_RESPONSE_BITS;
use kvsm_core::{decode_frame, encode_frame, Command, ErrorCode, Frame, FrameError, StatusSnapshot};
use parking_lot::Mutex;

use super::{LinkError, SerialLink};

/// Misbehaviour the simulated controller can be told to exhibit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// No response at all; the reader times out.
    Silence,
    /// A well-formed response whose checksum byte is wrong.
    CorruptChecksum,
    /// An error response carrying this code.
    DeviceError(ErrorCode),
    /// A success response for a different command than the one asked.
    WrongCommand,
    /// A GetInfo response with a truncated payload.  Other commands answer normally.
    ShortStatus,
    /// The normal response, delivered just after the reader's wait expires.
    Late,
}

#[derive(Debug)]
struct BridgeState {
    status: StatusSnapshot,
    frames: Vec<(Instant, Frame)>,
    pending: VecDeque<u8>,
    late: Vec<u8>,
    one_shot: VecDeque<Fault>,
    persistent: Option<Fault>,
    latency: Duration,
}

impl Default for BridgeState {
    fn default() -> Self {
        Self {
            status: StatusSnapshot {
                version: 0x30,
                connected: true,
                ..StatusSnapshot::default()
            },
            frames: Vec::new(),
            pending: VecDeque::new(),
            late: Vec::new(),
            one_shot: VecDeque::new(),
            persistent: None,
            latency: Duration::ZERO,
        }
    }
}

/// Shared-state simulated controller.  See the module docs.
#[derive(Debug, Clone, Default)]
pub struct SimulatedBridge {
    state: Arc<Mutex<BridgeState>>,
}

impl SimulatedBridge {
    /// A connected controller reporting firmware V3.0 with all locks off.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(&self) -> StatusSnapshot {
        self.state.lock().status
    }

    /// Changes what the next GetInfo will report.
    pub fn set_status(&self, status: StatusSnapshot) {
        self.state.lock().status = status;
    }

    /// Applies `fault` to the next response only.
    pub fn inject(&self, fault: Fault) {
        self.state.lock().one_shot.push_back(fault);
    }

    /// Applies `fault` to every response until called again with `None`.
    pub fn set_persistent_fault(&self, fault: Option<Fault>) {
        self.state.lock().persistent = fault;
    }

    /// Makes every write take `latency` before it is answered.
    pub fn set_latency(&self, latency: Duration) {
        self.state.lock().latency = latency;
    }

    /// Every well-formed frame received so far, oldest first.
    pub fn frames(&self) -> Vec<Frame> {
        self.state.lock().frames.iter().map(|(_, f)| f.clone()).collect()
    }

    /// Received frames carrying `command`.
    pub fn frames_with(&self, command: Command) -> Vec<Frame> {
        let code = u8::from(command);
        self.state
            .lock()
            .frames
            .iter()
            .filter(|(_, f)| f.command() == code)
            .map(|(_, f)| f.clone())
            .collect()
    }

    /// When each frame carrying `command` arrived, oldest first.
    pub fn arrival_times(&self, command: Command) -> Vec<Instant> {
        let code = u8::from(command);
        self.state
            .lock()
            .frames
            .iter()
            .filter(|(_, f)| f.command() == code)
            .map(|(at, _)| *at)
            .collect()
    }

    /// Bytes received by the host side but not yet read.
    pub fn pending_len(&self) -> usize {
        self.state.lock().pending.len()
    }

    /// Received frames other than status polls, i.e. what the input events produced.
    pub fn input_frames(&self) -> Vec<Frame> {
        let info = u8::from(Command::GetInfo);
        self.state
            .lock()
            .frames
            .iter()
            .filter(|(_, f)| f.command() != info)
            .map(|(_, f)| f.clone())
            .collect()
    }

    pub fn clear_frames(&self) {
        self.state.lock().frames.clear();
    }
}

impl BridgeState {
    fn respond(&mut self, request: &Frame) -> Option<Vec<u8>> {
        let fault = self.one_shot.pop_front().or(self.persistent);
        let command = request.command();
        let is_info = command == u8::from(Command::GetInfo);

        let mut bytes = match fault {
            Some(Fault::Silence) => return None,
            Some(Fault::DeviceError(code)) => error_response(command | ERROR_RESPONSE_BITS, code),
            Some(Fault::WrongCommand) => success_response(command.wrapping_add(1), &[0x00]),
            Some(Fault::ShortStatus) if is_info => {
                success_response(command, &self.status.to_payload()[..3])
            }
            _ if is_info => success_response(command, &self.status.to_payload()),
            _ => success_response(command, &[ErrorCode::Success.as_byte()]),
        };

        if fault == Some(Fault::CorruptChecksum) {
            if let Some(last) = bytes.last_mut() {
                *last ^= 0xFF;
            }
        }
        if fault == Some(Fault::Late) {
            self.late.extend(bytes);
            return None;
        }
        Some(bytes)
    }
}

fn success_response(request: u8, payload: &[u8]) -> Vec<u8> {
    frame_bytes(request | kvsm_core::RESPONSE_BIT, payload)
}

fn error_response(code: u8, error: ErrorCode) -> Vec<u8> {
    frame_bytes(code, &[error.as_byte()])
}

/// Simulated payloads are at most 8 bytes; an encode failure yields no
/// response, which the reader sees as silence.
fn frame_bytes(command: u8, payload: &[u8]) -> Vec<u8> {
    encode_frame(command, payload)
        .map(|frame| frame.to_bytes())
        .unwrap_or_default()
}

/// The error code the controller reports for a frame it cannot decode.
fn rejection_code(err: &FrameError) -> ErrorCode {
    match err {
        FrameError::BadSync(_) => ErrorCode::BadHeader,
        FrameError::ChecksumMismatch { .. } => ErrorCode::BadChecksum,
        FrameError::InsufficientData { .. } | FrameError::PayloadLengthMismatch { .. } => {
            ErrorCode::Timeout
        }
        FrameError::PayloadTooLarge(_) => ErrorCode::BadParameter,
    }
}

impl SerialLink for SimulatedBridge {
    fn write_exact(&mut self, bytes: &[u8]) -> Result<usize, LinkError> {
        let latency = self.state.lock().latency;
        if !latency.is_zero() {
            std::thread::sleep(latency);
        }

        let mut state = self.state.lock();
        match decode_frame(bytes) {
            Ok(frame) => {
                let response = state.respond(&frame);
                state.frames.push((Instant::now(), frame));
                if let Some(response) = response {
                    state.pending.extend(response);
                }
            }
            Err(err) => {
                let command = bytes.get(3).copied().unwrap_or(0);
                let response = error_response(command | ERROR_RESPONSE_BITS, rejection_code(&err));
                state.pending.extend(response);
            }
        }
        Ok(bytes.len())
    }

    fn wait_readable(&mut self, timeout: Duration) -> Result<bool, LinkError> {
        if !self.state.lock().pending.is_empty() {
            return Ok(true);
        }
        std::thread::sleep(timeout);
        let mut state = self.state.lock();
        let ready = !state.pending.is_empty();
        // A late response lands only after this wait has already given up.
        let late = std::mem::take(&mut state.late);
        state.pending.extend(late);
        Ok(ready)
    }

    fn read_exact(&mut self, len: usize, timeout: Option<Duration>) -> Result<Vec<u8>, LinkError> {
        if let Some(timeout) = timeout {
            if !self.wait_readable(timeout)? {
                return Err(LinkError::Timeout(timeout));
            }
        }

        let mut state = self.state.lock();
        if state.pending.len() < len {
            let read = state.pending.len();
            state.pending.clear();
            return Err(LinkError::ShortRead { read, expected: len });
        }
        Ok(state.pending.drain(..len).collect())
    }

    fn discard_input(&mut self) -> Result<(), LinkError> {
        self.state.lock().pending.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kvsm_core::protocol::frame::HEADER_SIZE;

    fn response_len(payload_len: usize) -> usize {
        HEADER_SIZE + payload_len + 1
    }

    fn exchange(bridge: &mut SimulatedBridge, frame: &Frame, len: usize) -> Frame {
        bridge.write_exact(&frame.to_bytes()).unwrap();
        decode_frame(&bridge.read_exact(len, None).unwrap()).unwrap()
    }

    #[test]
    fn test_get_info_returns_status_payload() {
        // Arrange
        let mut bridge = SimulatedBridge::new();
        bridge.set_status(StatusSnapshot {
            version: 0x31,
            connected: true,
            num_lock: true,
            ..Default::default()
        });
        let request = encode_frame(Command::GetInfo, &[]).unwrap();

        // Act
        let response = exchange(&mut bridge, &request, response_len(8));

        // Assert
        assert_eq!(response.command(), 0x81);
        assert_eq!(response.payload(), &[0x31, 0x01, 0x01, 0, 0, 0, 0, 0]);
        assert_eq!(bridge.frames(), vec![request]);
    }

    #[test]
    fn test_other_commands_are_acknowledged_with_success_byte() {
        let mut bridge = SimulatedBridge::new();
        let request = encode_frame(Command::SendMouseRel, &[1, 0, 5, 5, 0]).unwrap();

        let response = exchange(&mut bridge, &request, response_len(1));

        assert_eq!(response.command(), 0x85);
        assert_eq!(response.error_code(), ErrorCode::Success);
    }

    #[test]
    fn test_device_error_fault_sets_error_bits() {
        let mut bridge = SimulatedBridge::new();
        bridge.inject(Fault::DeviceError(ErrorCode::BadParameter));
        let request = encode_frame(Command::SendKeyboardGeneral, &[0; 8]).unwrap();

        let response = exchange(&mut bridge, &request, response_len(1));

        assert_eq!(response.command(), 0xC2);
        assert_eq!(response.error_code(), ErrorCode::BadParameter);
    }

    #[test]
    fn test_silence_times_out_and_one_shot_faults_expire() {
        // Arrange
        let mut bridge = SimulatedBridge::new();
        bridge.inject(Fault::Silence);
        let request = encode_frame(Command::GetInfo, &[]).unwrap();

        // Act
        bridge.write_exact(&request.to_bytes()).unwrap();
        let first = bridge.read_exact(HEADER_SIZE, Some(Duration::from_millis(5)));
        bridge.write_exact(&request.to_bytes()).unwrap();
        let second = bridge.read_exact(HEADER_SIZE, Some(Duration::from_millis(5)));

        // Assert
        assert!(matches!(first, Err(LinkError::Timeout(_))));
        assert!(second.is_ok());
    }

    #[test]
    fn test_corrupt_checksum_fault_breaks_decoding() {
        let mut bridge = SimulatedBridge::new();
        bridge.inject(Fault::CorruptChecksum);
        bridge
            .write_exact(&encode_frame(Command::Reset, &[]).unwrap().to_bytes())
            .unwrap();

        let bytes = bridge.read_exact(response_len(1), None).unwrap();

        assert!(matches!(decode_frame(&bytes), Err(FrameError::ChecksumMismatch { .. })));
    }

    #[test]
    fn test_garbled_request_is_rejected_with_bad_checksum() {
        let mut bridge = SimulatedBridge::new();
        let mut bytes = encode_frame(Command::SendMouseRel, &[1, 0, 0, 0, 0]).unwrap().to_bytes();
        let last = bytes.len() - 1;
        bytes[last] ^= 0x01;

        bridge.write_exact(&bytes).unwrap();
        let response = decode_frame(&bridge.read_exact(response_len(1), None).unwrap()).unwrap();

        assert_eq!(response.command(), 0xC5);
        assert_eq!(response.error_code(), ErrorCode::BadChecksum);
        assert!(bridge.frames().is_empty());
    }

    #[test]
    fn test_late_response_arrives_after_timeout_until_discarded() {
        // Arrange
        let mut bridge = SimulatedBridge::new();
        bridge.inject(Fault::Late);
        let request = encode_frame(Command::GetInfo, &[]).unwrap();

        // Act
        bridge.write_exact(&request.to_bytes()).unwrap();
        let first = bridge.read_exact(HEADER_SIZE, Some(Duration::from_millis(5)));
        let stale = bridge.pending_len();
        bridge.discard_input().unwrap();

        // Assert
        assert!(matches!(first, Err(LinkError::Timeout(_))));
        assert_eq!(stale, response_len(8));
        assert_eq!(bridge.pending_len(), 0);
    }

    #[test]
    fn test_arrival_times_are_recorded_in_order() {
        let mut bridge = SimulatedBridge::new();
        let request = encode_frame(Command::GetInfo, &[]).unwrap();
        for _ in 0..3 {
            bridge.write_exact(&request.to_bytes()).unwrap();
        }

        let times = bridge.arrival_times(Command::GetInfo);

        assert_eq!(times.len(), 3);
        assert!(times.windows(2).all(|w| w[0] <= w[1]));
        assert!(bridge.arrival_times(Command::Reset).is_empty());
    }

    #[test]
    fn test_short_pending_data_is_a_short_read() {
        let mut bridge = SimulatedBridge::new();
        bridge
            .write_exact(&encode_frame(Command::Reset, &[]).unwrap().to_bytes())
            .unwrap();

        let result = bridge.read_exact(32, None);

        assert!(matches!(result, Err(LinkError::ShortRead { read: 7, expected: 32 })));
    }
}
