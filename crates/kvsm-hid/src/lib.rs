//! kvsm-hid library entry point.
//!
//! Re-exports all public modules so that integration tests in `tests/`
//! and the binary entry point in `main.rs` share the same module tree.
//!
//! # What does kvsm-hid do? (for beginners)
//!
//! A UI (a KVM viewer, typically) shows the remote machine's screen and
//! captures local keyboard and mouse input.  It hands each input to this
//! crate, which forwards it over a serial line to a bridge controller that
//! pretends to be a USB keyboard and mouse on the remote machine:
//!
//! ```text
//! UI thread ─submit()─► InputPipeline queue ─► worker thread
//!                                                 │
//!                                          HidEngine (state + frames)
//!                                                 │
//!                                          SerialLink (bytes) ─► controller
//! ```
//!
//! In the other direction the worker polls the controller every 100 ms for
//! USB connection state and the Num/Caps/Scroll Lock LEDs, so the UI can
//! draw indicators.
//!
//! The crate is split the same way as the rest of the workspace:
//!
//! - **`application`** – the protocol engine and the input pipeline.
//! - **`infrastructure`** – the serial device, a simulated controller for
//!   tests, and configuration storage.

/// Application layer: protocol engine and input pipeline.
pub mod application;

/// Infrastructure layer: serial transport and configuration storage.
pub mod infrastructure;

pub use application::engine::{EngineError, ErrorKind, HidEngine};
pub use application::pipeline::{InputPipeline, PipelineError, PipelineOptions, Submission};
pub use infrastructure::serial::{LinkError, SerialLink};
