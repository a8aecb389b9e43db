//! Keyboard report state: one modifier byte plus six key slots.
//!
//! The controller accepts an 8-byte "boot keyboard" report:
//!
//! ```text
//! [modifiers][reserved=0][slot0][slot1][slot2][slot3][slot4][slot5]
//! ```
//!
//! Modifier usages (0xE0–0xE7) never occupy a slot; each toggles one bit of
//! the modifier byte.  Every other usage goes into the first slot that
//! already holds it or, failing that, the first empty slot.  When all six
//! slots hold *other* keys the new key is dropped and the report is left
//! unchanged.  Nothing is ever evicted to make room.

use crate::keymap::hid::modifier_mask;

/// Number of simultaneously held non-modifier keys a report can carry.
pub const ROLLOVER_SLOTS: usize = 6;

/// Size of the serialised report.
pub const KEYBOARD_REPORT_LEN: usize = 2 + ROLLOVER_SLOTS;

/// What a call to [`KeyboardReport::press`] did to the report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PressOutcome {
    /// A modifier bit was set.
    Modifier,
    /// The usage was written into the given slot.
    Inserted(usize),
    /// The usage was already held in the given slot.
    AlreadyHeld(usize),
    /// All slots hold other keys; the press was dropped.
    RolloverFull,
    /// Usage 0 means "no key" and is never stored.
    Ignored,
}

/// Host-side mirror of the keyboard report held by the controller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KeyboardReport {
    modifiers: u8,
    slots: [u8; ROLLOVER_SLOTS],
}

impl KeyboardReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn modifiers(&self) -> u8 {
        self.modifiers
    }

    pub fn slots(&self) -> &[u8; ROLLOVER_SLOTS] {
        &self.slots
    }

    /// Number of occupied key slots.
    pub fn held_keys(&self) -> usize {
        self.slots.iter().filter(|&&s| s != 0).count()
    }

    /// Records `usage` as pressed.
    pub fn press(&mut self, usage: u8) -> PressOutcome {
        if usage == 0 {
            return PressOutcome::Ignored;
        }
        if let Some(mask) = modifier_mask(usage) {
            self.modifiers |= mask;
            return PressOutcome::Modifier;
        }

        match self.slots.iter().position(|&s| s == usage || s == 0) {
            Some(i) if self.slots[i] == usage => PressOutcome::AlreadyHeld(i),
            Some(i) => {
                self.slots[i] = usage;
                PressOutcome::Inserted(i)
            }
            None => PressOutcome::RolloverFull,
        }
    }

    /// Records `usage` as released, clearing every slot that holds it.
    ///
    /// Returns `true` if anything changed.
    pub fn release(&mut self, usage: u8) -> bool {
        if usage == 0 {
            return false;
        }
        if let Some(mask) = modifier_mask(usage) {
            let before = self.modifiers;
            self.modifiers &= !mask;
            return before != self.modifiers;
        }

        let mut changed = false;
        for slot in self.slots.iter_mut().filter(|s| **s == usage) {
            *slot = 0;
            changed = true;
        }
        changed
    }

    /// Releases everything.
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// The 8-byte wire representation.
    pub fn to_bytes(&self) -> [u8; KEYBOARD_REPORT_LEN] {
        let mut out = [0u8; KEYBOARD_REPORT_LEN];
        out[0] = self.modifiers;
        out[2..].copy_from_slice(&self.slots);
        out
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keymap::hid::HidKeyCode;

    fn full_report() -> KeyboardReport {
        let mut report = KeyboardReport::new();
        for usage in 0x04..0x04 + ROLLOVER_SLOTS as u8 {
            report.press(usage);
        }
        report
    }

    #[test]
    fn test_press_fills_first_empty_slot() {
        // Arrange
        let mut report = KeyboardReport::new();

        // Act
        let first = report.press(HidKeyCode::KeyA.usage());
        let second = report.press(HidKeyCode::KeyB.usage());

        // Assert
        assert_eq!(first, PressOutcome::Inserted(0));
        assert_eq!(second, PressOutcome::Inserted(1));
        assert_eq!(report.to_bytes(), [0, 0, 0x04, 0x05, 0, 0, 0, 0]);
    }

    #[test]
    fn test_press_of_held_key_reuses_its_slot() {
        let mut report = KeyboardReport::new();
        report.press(0x04);
        assert_eq!(report.press(0x04), PressOutcome::AlreadyHeld(0));
        assert_eq!(report.held_keys(), 1);
    }

    #[test]
    fn test_press_reuses_gap_left_by_release() {
        // Arrange
        let mut report = KeyboardReport::new();
        report.press(0x04);
        report.press(0x05);
        report.press(0x06);

        // Act
        report.release(0x05);
        let outcome = report.press(0x07);

        // Assert
        assert_eq!(outcome, PressOutcome::Inserted(1));
        assert_eq!(report.slots(), &[0x04, 0x07, 0x06, 0, 0, 0]);
    }

    #[test]
    fn test_six_keys_fill_every_slot() {
        let report = full_report();
        assert_eq!(report.held_keys(), ROLLOVER_SLOTS);
        assert_eq!(report.slots(), &[0x04, 0x05, 0x06, 0x07, 0x08, 0x09]);
    }

    #[test]
    fn test_seventh_key_is_dropped_and_report_unchanged() {
        // Arrange
        let mut report = full_report();
        let before = report;

        // Act
        let outcome = report.press(0x0A);

        // Assert
        assert_eq!(outcome, PressOutcome::RolloverFull);
        assert_eq!(report, before);
    }

    #[test]
    fn test_held_key_is_still_accepted_when_full() {
        let mut report = full_report();
        assert_eq!(report.press(0x09), PressOutcome::AlreadyHeld(5));
    }

    #[test]
    fn test_release_clears_only_matching_slot() {
        // Arrange
        let mut report = full_report();

        // Act
        let changed = report.release(0x06);

        // Assert
        assert!(changed);
        assert_eq!(report.slots(), &[0x04, 0x05, 0, 0x07, 0x08, 0x09]);
    }

    #[test]
    fn test_release_of_unheld_key_changes_nothing() {
        let mut report = KeyboardReport::new();
        report.press(0x04);
        assert!(!report.release(0x05));
        assert_eq!(report.slots()[0], 0x04);
    }

    #[test]
    fn test_modifiers_set_bits_without_using_slots() {
        // Arrange
        let mut report = KeyboardReport::new();

        // Act
        assert_eq!(report.press(HidKeyCode::ShiftLeft.usage()), PressOutcome::Modifier);
        report.press(HidKeyCode::ControlRight.usage());
        report.press(HidKeyCode::KeyA.usage());

        // Assert
        assert_eq!(report.modifiers(), 0x02 | 0x10);
        assert_eq!(report.held_keys(), 1);
        assert_eq!(report.to_bytes(), [0x12, 0, 0x04, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn test_modifier_release_leaves_slots_alone() {
        let mut report = KeyboardReport::new();
        report.press(HidKeyCode::ShiftLeft.usage());
        report.press(0x04);

        assert!(report.release(HidKeyCode::ShiftLeft.usage()));
        assert_eq!(report.modifiers(), 0);
        assert_eq!(report.slots()[0], 0x04);
    }

    #[test]
    fn test_modifiers_still_work_when_slots_are_full() {
        let mut report = full_report();
        assert_eq!(report.press(HidKeyCode::AltLeft.usage()), PressOutcome::Modifier);
        assert_eq!(report.modifiers(), 0x04);
    }

    #[test]
    fn test_usage_zero_is_ignored() {
        let mut report = KeyboardReport::new();
        assert_eq!(report.press(0), PressOutcome::Ignored);
        assert!(!report.release(0));
        assert_eq!(report, KeyboardReport::default());
    }

    #[test]
    fn test_clear_releases_everything() {
        let mut report = full_report();
        report.press(HidKeyCode::MetaLeft.usage());
        report.clear();
        assert_eq!(report.to_bytes(), [0; KEYBOARD_REPORT_LEN]);
    }
}
