//! Serial transport to the bridge controller.
//!
//! # Why a trait? (for beginners)
//!
//! The protocol engine only needs three things from the wire: write these
//! bytes, tell me when something is readable, give me exactly N bytes.  By
//! putting those behind [`SerialLink`], the engine and the input pipeline run
//! unchanged against:
//!
//! - [`termios::TtyPort`] – a real POSIX serial device (Linux, macOS, BSD).
//! - [`mock::SimulatedBridge`] – an in-memory controller that decodes the
//!   frames it receives and answers the way the hardware does.  Used by the
//!   unit and integration tests, and handy for running the pipeline without
//!   hardware attached.
//!
//! Unit tests additionally use the `mockall`-generated `MockSerialLink` to
//! script exact failure sequences.

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

pub mod mock;

#[cfg(unix)]
pub mod termios;

/// Baud rate the controller is factory-configured for.
pub const BAUD_RATE: u32 = 115_200;

/// Errors raised by a [`SerialLink`].
#[derive(Debug, Error)]
pub enum LinkError {
    /// The device node could not be opened.
    #[error("cannot open serial device {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The device opened but rejected the line settings.
    #[error("cannot configure serial device {path}: {source}")]
    Configure {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Any other read/write/poll failure.
    #[error("serial I/O error: {0}")]
    Io(#[from] io::Error),

    /// The device accepted fewer bytes than were written.
    #[error("short write: {written} of {expected} bytes accepted")]
    ShortWrite { written: usize, expected: usize },

    /// The device delivered fewer bytes than were requested.
    #[error("short read: {read} of {expected} bytes received")]
    ShortRead { read: usize, expected: usize },

    /// Nothing became readable within the allowed time.
    #[error("no data within {0:?}")]
    Timeout(Duration),
}

/// Byte-level access to the bridge controller.
///
/// Implementations are owned by exactly one thread at a time (the pipeline
/// worker, or the CLI's main thread), hence `Send` but not `Sync`.
#[cfg_attr(test, mockall::automock)]
pub trait SerialLink: Send {
    /// Writes all of `bytes`.  Accepting fewer is a [`LinkError::ShortWrite`].
    fn write_exact(&mut self, bytes: &[u8]) -> Result<usize, LinkError>;

    /// Waits up to `timeout` for input.  Returns `Ok(false)` on timeout
    /// without consuming anything.
    fn wait_readable(&mut self, timeout: Duration) -> Result<bool, LinkError>;

    /// Reads exactly `len` bytes.
    ///
    /// With `Some(timeout)`, readiness is awaited before every read and a
    /// miss fails with [`LinkError::Timeout`].  A read that ends early fails
    /// with [`LinkError::ShortRead`]; partial data is discarded.
    fn read_exact(&mut self, len: usize, timeout: Option<Duration>) -> Result<Vec<u8>, LinkError>;

    /// Drops everything received but not yet read, e.g. a response that
    /// arrived after its reader gave up.
    fn discard_input(&mut self) -> Result<(), LinkError>;
}
