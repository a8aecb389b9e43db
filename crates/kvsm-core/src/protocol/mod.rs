//! Protocol module containing command codes and the binary frame codec.

pub mod command;
pub mod frame;

pub use command::{Command, ErrorCode, RESPONSE_BIT};
pub use frame::{checksum, decode_frame, encode_frame, Frame, FrameError};
