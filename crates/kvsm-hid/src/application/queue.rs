//! Bounded FIFO of pending input events with motion coalescing.
//!
//! # Full-queue policy
//!
//! - If the newest queued event and the incoming event are both motion,
//!   the incoming event is merged into that slot instead of taking a new
//!   one ([`Admission::Coalesced`]).  This applies whether or not the queue
//!   is full, so a burst of pointer motion occupies a single slot.
//! - Otherwise the event is appended if there is room
//!   ([`Admission::Appended`]) and rejected with [`QueueFull`] if not.
//!   Nothing already queued is ever evicted or reordered.
//!
//! # Merging motion
//!
//! Merging is deliberately narrower than "the newest motion event
//! overwrites the queued one".  An absolute move replaces a queued absolute
//! move: only the latest position matters.  Two relative moves are summed
//! instead of overwritten, so no distance is lost.  A relative and an
//! absolute move are not merged at all (the result would mean neither),
//! the new one takes its own slot.

use std::collections::VecDeque;

use kvsm_core::InputEvent;
use thiserror::Error;

/// Default number of pending events.
pub const DEFAULT_CAPACITY: usize = 16;

/// How an accepted event entered the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Appended,
    Coalesced,
}

/// The queue was full and the event could not be coalesced.
#[derive(Debug, Clone, Copy, PartialEq, Error)]
#[error("event queue full, dropped {0:?}")]
pub struct QueueFull(pub InputEvent);

/// Whether consecutive motion events share a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CoalescePolicy {
    /// Every event takes its own slot.
    Never,
    /// Consecutive compatible motion events share the newest slot.
    #[default]
    Motion,
}

#[derive(Debug)]
pub struct EventQueue {
    events: VecDeque<InputEvent>,
    capacity: usize,
    policy: CoalescePolicy,
}

impl Default for EventQueue {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY, CoalescePolicy::default())
    }
}

impl EventQueue {
    /// A queue holding at most `capacity` events (minimum 1).
    pub fn new(capacity: usize, policy: CoalescePolicy) -> Self {
        let capacity = capacity.max(1);
        Self {
            events: VecDeque::with_capacity(capacity),
            capacity,
            policy,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.events.len() >= self.capacity
    }

    /// `true` when the most recently queued event is motion.
    pub fn last_is_motion(&self) -> bool {
        self.events.back().is_some_and(InputEvent::is_motion)
    }

    /// Queues `event` according to the full-queue policy.
    ///
    /// # Errors
    ///
    /// Returns [`QueueFull`] carrying the rejected event.
    pub fn try_push(&mut self, event: InputEvent) -> Result<Admission, QueueFull> {
        if self.policy == CoalescePolicy::Motion {
            if let Some(last) = self.events.back_mut() {
                if let Some(merged) = merge_motion(last, &event) {
                    *last = merged;
                    return Ok(Admission::Coalesced);
                }
            }
        }

        if self.is_full() {
            return Err(QueueFull(event));
        }
        self.events.push_back(event);
        Ok(Admission::Appended)
    }

    /// Removes the oldest event.
    pub fn pop(&mut self) -> Option<InputEvent> {
        self.events.pop_front()
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }
}

fn merge_motion(queued: &InputEvent, incoming: &InputEvent) -> Option<InputEvent> {
    match (*queued, *incoming) {
        (
            InputEvent::MouseMove { relative: false, .. },
            InputEvent::MouseMove { relative: false, .. },
        ) => Some(*incoming),
        (
            InputEvent::MouseMove { x: qx, y: qy, relative: true },
            InputEvent::MouseMove { x, y, relative: true },
        ) => Some(InputEvent::MouseMove {
            x: qx + x,
            y: qy + y,
            relative: true,
        }),
        _ => None,
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use kvsm_core::MouseButton;

    fn abs(x: f32, y: f32) -> InputEvent {
        InputEvent::MouseMove { x, y, relative: false }
    }

    fn rel(x: f32, y: f32) -> InputEvent {
        InputEvent::MouseMove { x, y, relative: true }
    }

    fn click() -> InputEvent {
        InputEvent::MouseButton { button: MouseButton::Left, pressed: true }
    }

    fn drain(queue: &mut EventQueue) -> Vec<InputEvent> {
        std::iter::from_fn(|| queue.pop()).collect()
    }

    #[test]
    fn test_three_moves_and_a_click_drain_as_two_entries() {
        // Arrange
        let mut queue = EventQueue::default();

        // Act
        queue.try_push(abs(1.0, 1.0)).unwrap();
        queue.try_push(abs(2.0, 2.0)).unwrap();
        queue.try_push(abs(3.0, 3.0)).unwrap();
        queue.try_push(click()).unwrap();

        // Assert
        assert_eq!(drain(&mut queue), vec![abs(3.0, 3.0), click()]);
    }

    #[test]
    fn test_relative_moves_are_summed() {
        let mut queue = EventQueue::default();
        assert_eq!(queue.try_push(rel(3.0, -1.0)), Ok(Admission::Appended));
        assert_eq!(queue.try_push(rel(4.0, -2.0)), Ok(Admission::Coalesced));
        assert_eq!(drain(&mut queue), vec![rel(7.0, -3.0)]);
    }

    #[test]
    fn test_mixed_motion_kinds_are_not_merged() {
        let mut queue = EventQueue::default();
        queue.try_push(rel(1.0, 1.0)).unwrap();
        assert_eq!(queue.try_push(abs(5.0, 5.0)), Ok(Admission::Appended));
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn test_motion_after_non_motion_takes_new_slot() {
        let mut queue = EventQueue::default();
        queue.try_push(abs(1.0, 1.0)).unwrap();
        queue.try_push(click()).unwrap();
        queue.try_push(abs(2.0, 2.0)).unwrap();
        assert_eq!(drain(&mut queue), vec![abs(1.0, 1.0), click(), abs(2.0, 2.0)]);
    }

    #[test]
    fn test_overflow_drops_newest_and_keeps_fifo() {
        // Arrange
        let mut queue = EventQueue::default();
        let events: Vec<InputEvent> = (0..DEFAULT_CAPACITY as u8).map(InputEvent::KeyDown).collect();
        for event in &events {
            queue.try_push(*event).unwrap();
        }

        // Act
        let overflow = queue.try_push(InputEvent::KeyDown(0xFF));

        // Assert
        assert_eq!(overflow, Err(QueueFull(InputEvent::KeyDown(0xFF))));
        assert_eq!(drain(&mut queue), events);
    }

    #[test]
    fn test_full_queue_still_coalesces_motion() {
        let mut queue = EventQueue::new(2, CoalescePolicy::Motion);
        queue.try_push(click()).unwrap();
        queue.try_push(abs(1.0, 1.0)).unwrap();

        assert_eq!(queue.try_push(abs(9.0, 9.0)), Ok(Admission::Coalesced));
        assert!(queue.try_push(click()).is_err());
        assert_eq!(drain(&mut queue), vec![click(), abs(9.0, 9.0)]);
    }

    #[test]
    fn test_never_policy_keeps_every_motion_event() {
        let mut queue = EventQueue::new(4, CoalescePolicy::Never);
        queue.try_push(abs(1.0, 1.0)).unwrap();
        queue.try_push(abs(2.0, 2.0)).unwrap();
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn test_last_is_motion_tracks_newest_entry() {
        let mut queue = EventQueue::default();
        assert!(!queue.last_is_motion());
        queue.try_push(click()).unwrap();
        assert!(!queue.last_is_motion());
        queue.try_push(rel(1.0, 0.0)).unwrap();
        assert!(queue.last_is_motion());
    }

    #[test]
    fn test_zero_capacity_is_raised_to_one() {
        let mut queue = EventQueue::new(0, CoalescePolicy::Motion);
        assert_eq!(queue.capacity(), 1);
        assert!(queue.try_push(click()).is_ok());
        assert!(queue.try_push(click()).is_err());
    }
}
