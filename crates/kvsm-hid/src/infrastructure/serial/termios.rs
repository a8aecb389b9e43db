//! POSIX serial device configured through termios.
//!
//! The line is set to 115200 baud, 8 data bits, no parity, 1 stop bit,
//! receiver enabled, modem control lines ignored, fully raw (no canonical
//! mode, echo, signals, software flow control or output processing).
//!
//! The settings found at open time are restored on [`TtyPort::close`] or,
//! failing that, when the port is dropped.
//!
//! # VMIN / VTIME (for beginners)
//!
//! In raw mode `read(2)` behaviour is governed by two control characters.
//! With `VMIN = 0` and `VTIME = t`, a read returns as soon as *any* byte is
//! available, or returns 0 bytes after `t` tenths of a second of silence.  So
//! a read can never block forever, and a 0-byte read means "the device went
//! quiet", which this module reports as a short read.

use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::os::fd::AsFd;
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use nix::poll::{poll, PollFd, PollFlags, PollTimeout};
use nix::sys::termios::{
    cfsetspeed, tcflush, tcgetattr, tcsetattr, BaudRate, ControlFlags, FlushArg, InputFlags,
    LocalFlags, OutputFlags, SetArg, SpecialCharacterIndices, Termios,
};
use tracing::{debug, trace};

use super::{LinkError, SerialLink};

/// An open, configured serial device.
pub struct TtyPort {
    file: File,
    path: PathBuf,
    /// Settings to restore; `None` once restored.
    saved: Option<Termios>,
}

impl TtyPort {
    /// Opens `path` and configures the line for the bridge controller.
    ///
    /// `receive_timeout` becomes the inter-byte silence limit (VTIME), rounded
    /// up to whole tenths of a second and capped at 25.5 s.
    ///
    /// # Errors
    ///
    /// [`LinkError::Open`] if the node cannot be opened,
    /// [`LinkError::Configure`] if it is not a terminal or rejects the settings.
    pub fn open(path: impl AsRef<Path>, receive_timeout: Duration) -> Result<Self, LinkError> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(nix::libc::O_NOCTTY | nix::libc::O_SYNC)
            .open(&path)
            .map_err(|source| LinkError::Open {
                path: path.clone(),
                source,
            })?;

        let configure_err = |errno: nix::errno::Errno| LinkError::Configure {
            path: path.clone(),
            source: errno.into(),
        };

        let saved = tcgetattr(file.as_fd()).map_err(configure_err)?;
        let mut raw = saved.clone();
        make_raw(&mut raw, receive_timeout).map_err(configure_err)?;
        tcsetattr(file.as_fd(), SetArg::TCSANOW, &raw).map_err(configure_err)?;
        // Drop anything the controller sent before we were listening.
        tcflush(file.as_fd(), FlushArg::TCIOFLUSH).map_err(configure_err)?;

        debug!(path = %path.display(), "serial device configured");
        Ok(Self {
            file,
            path,
            saved: Some(saved),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Restores the original terminal settings and closes the device.
    ///
    /// # Errors
    ///
    /// Returns [`LinkError::Io`] if the settings could not be restored; the
    /// descriptor is closed regardless.
    pub fn close(mut self) -> Result<(), LinkError> {
        self.restore()
    }

    fn restore(&mut self) -> Result<(), LinkError> {
        if let Some(saved) = self.saved.take() {
            tcsetattr(self.file.as_fd(), SetArg::TCSANOW, &saved)
                .map_err(std::io::Error::from)?;
            debug!(path = %self.path.display(), "serial settings restored");
        }
        Ok(())
    }
}

impl Drop for TtyPort {
    fn drop(&mut self) {
        if let Err(e) = self.restore() {
            tracing::warn!(path = %self.path.display(), error = %e, "failed to restore serial settings");
        }
    }
}

/// Applies the 8N1 raw profile.  The speed is set on the struct before it is
/// handed to `tcsetattr`, so a single call commits everything.
fn make_raw(t: &mut Termios, receive_timeout: Duration) -> nix::Result<()> {
    t.control_flags &= !(ControlFlags::CSIZE | ControlFlags::PARENB | ControlFlags::CSTOPB);
    t.control_flags |= ControlFlags::CS8 | ControlFlags::CREAD | ControlFlags::CLOCAL;

    t.local_flags &= !(LocalFlags::ICANON
        | LocalFlags::ECHO
        | LocalFlags::ECHOE
        | LocalFlags::ECHONL
        | LocalFlags::ISIG
        | LocalFlags::IEXTEN);

    t.input_flags &= !(InputFlags::IXON
        | InputFlags::IXOFF
        | InputFlags::IXANY
        | InputFlags::ICRNL
        | InputFlags::INLCR
        | InputFlags::IGNCR
        | InputFlags::ISTRIP
        | InputFlags::BRKINT);

    t.output_flags &= !OutputFlags::OPOST;

    let tenths = receive_timeout.as_millis().div_ceil(100).clamp(1, u8::MAX as u128) as u8;
    t.control_chars[SpecialCharacterIndices::VMIN as usize] = 0;
    t.control_chars[SpecialCharacterIndices::VTIME as usize] = tenths;

    cfsetspeed(t, BaudRate::B115200)
}

fn poll_timeout(timeout: Duration) -> PollTimeout {
    let ms = timeout.as_millis().min(u16::MAX as u128) as u16;
    PollTimeout::from(ms)
}

impl SerialLink for TtyPort {
    fn write_exact(&mut self, bytes: &[u8]) -> Result<usize, LinkError> {
        trace!(tx = ?bytes, "serial write");
        let written = self.file.write(bytes)?;
        if written != bytes.len() {
            return Err(LinkError::ShortWrite {
                written,
                expected: bytes.len(),
            });
        }
        Ok(written)
    }

    fn wait_readable(&mut self, timeout: Duration) -> Result<bool, LinkError> {
        let mut fds = [PollFd::new(self.file.as_fd(), PollFlags::POLLIN)];
        let ready = poll(&mut fds, poll_timeout(timeout)).map_err(std::io::Error::from)?;
        Ok(ready > 0)
    }

    fn read_exact(&mut self, len: usize, timeout: Option<Duration>) -> Result<Vec<u8>, LinkError> {
        let mut buf = vec![0u8; len];
        let mut filled = 0;
        while filled < len {
            if let Some(timeout) = timeout {
                if !self.wait_readable(timeout)? {
                    return Err(LinkError::Timeout(timeout));
                }
            }
            let n = self.file.read(&mut buf[filled..])?;
            if n == 0 {
                return Err(LinkError::ShortRead {
                    read: filled,
                    expected: len,
                });
            }
            filled += n;
        }
        trace!(rx = ?buf, "serial read");
        Ok(buf)
    }

    fn discard_input(&mut self) -> Result<(), LinkError> {
        tcflush(self.file.as_fd(), FlushArg::TCIFLUSH).map_err(std::io::Error::from)?;
        Ok(())
    }
}
