//! Infrastructure layer: OS-facing adapters.
//!
//! **Dependency rule**: this layer may depend on `kvsm_core`, and the
//! application layer depends on the traits defined here, never on a concrete
//! device type.
//!
//! # Sub-modules
//!
//! - **`serial`** – the [`serial::SerialLink`] trait, the termios-backed
//!   [`serial::termios::TtyPort`] (Unix only) and the in-memory
//!   [`serial::mock::SimulatedBridge`].
//!
//! - **`storage`** – TOML configuration file persistence.

pub mod serial;
pub mod storage;
