//! Input events handed from the UI to the pipeline.

use serde::{Deserialize, Serialize};

use crate::domain::mouse::MouseButton;

/// One user input, consumed exactly once by the pipeline worker.
///
/// Key events carry raw HID usage IDs; translating platform scancodes is the
/// UI's job.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum InputEvent {
    KeyDown(u8),
    KeyUp(u8),
    /// Pointer motion.  With `relative` set, `x`/`y` are deltas; otherwise
    /// they are UI coordinates mapped through the reference rectangle.
    MouseMove { x: f32, y: f32, relative: bool },
    MouseButton { button: MouseButton, pressed: bool },
    MouseWheel(i32),
}

impl InputEvent {
    /// Motion events are the only ones that may be coalesced.
    pub fn is_motion(&self) -> bool {
        matches!(self, InputEvent::MouseMove { .. })
    }
}
