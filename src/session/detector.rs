//! New-message detection over wholesale list replacement.
//!
//! The service returns the full message list on every poll, so "did anything
//! arrive" is derived client-side. The production strategy compares list
//! lengths and inspects only the last entry; it assumes messages are only
//! ever appended. The trait seam exists so an id-set diff can replace it
//! without touching the controller.

use crate::session::ChatMessage;

/// What the latest replacement implies for cue side effects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageEvent {
    /// The list grew and the last message is the partner's.
    Received,
    /// The list grew and the last message is the user's own.
    Sent,
}

/// Strategy for detecting arrivals across wholesale list replacements.
pub trait NewMessageDetector: Send {
    /// Inspect the replacement list and report at most one event.
    fn on_replace(&mut self, messages: &[ChatMessage]) -> Option<MessageEvent>;
}

/// Count-based detection: the list grew past the previously recorded length.
///
/// Only the last entry decides attribution, and the recorded count follows
/// the list even if it shrinks. A reordered or truncated server list will
/// therefore misfire; that is a known, accepted property of this strategy.
#[derive(Debug, Default)]
pub struct CountDetector {
    prev_count: usize,
}

impl CountDetector {
    pub fn new() -> Self {
        Self::default()
    }
}

impl NewMessageDetector for CountDetector {
    fn on_replace(&mut self, messages: &[ChatMessage]) -> Option<MessageEvent> {
        let event = if messages.len() > self.prev_count {
            messages.last().map(|last| {
                if last.from_partner() {
                    MessageEvent::Received
                } else {
                    MessageEvent::Sent
                }
            })
        } else {
            None
        };
        self.prev_count = messages.len();
        event
    }
}
