//! Side-effect events emitted by the core.
//!
//! Haptics, sounds, and local notifications are platform capabilities; the
//! core only announces that a cue-worthy moment happened and a presentation
//! layer decides what that feels like.

use crate::session::Partner;

/// A cue-worthy moment in the session or payment flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// A new message from the partner arrived (haptic + receive sound).
    ReceiveCue,
    /// The most recent message is the user's own (send sound).
    SendCue,
    /// A partner was assigned; views show a local "Matched!" notification.
    Matched { partner: Partner },
    /// An explicit action completed (success haptic).
    Success,
    /// An explicit action failed (error haptic).
    Error,
}

/// Sink for side-effect events.
pub trait EffectSink: Send + Sync {
    fn emit(&self, effect: Effect);
}

/// Sink that drops every effect. Useful for headless operation and tests
/// that don't assert on cues.
#[derive(Debug, Default)]
pub struct NoopEffects;

impl EffectSink for NoopEffects {
    fn emit(&self, _effect: Effect) {}
}

/// Sink that records effects for assertions.
#[derive(Debug, Default)]
pub struct RecordingEffects {
    events: std::sync::Mutex<Vec<Effect>>,
}

impl RecordingEffects {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn drain(&self) -> Vec<Effect> {
        self.events
            .lock()
            .map(|mut guard| std::mem::take(&mut *guard))
            .unwrap_or_default()
    }
}

impl EffectSink for RecordingEffects {
    fn emit(&self, effect: Effect) {
        if let Ok(mut guard) = self.events.lock() {
            guard.push(effect);
        }
    }
}
