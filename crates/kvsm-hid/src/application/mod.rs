//! Application layer: the protocol engine and the input pipeline.
//!
//! - **`engine`** – [`engine::HidEngine`] turns high-level operations (press
//!   a key, move the mouse, read status) into request/response round trips,
//!   keeping the device-side keyboard/mouse state mirrored on the host.
//!
//! - **`queue`** – [`queue::EventQueue`], the bounded FIFO with motion
//!   coalescing that sits between the UI and the worker thread.
//!
//! - **`pipeline`** – [`pipeline::InputPipeline`], the worker thread that
//!   drains the queue into the engine and polls device status on a fixed
//!   interval.

pub mod engine;
pub mod pipeline;
pub mod queue;
