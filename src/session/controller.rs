//! Connection lifecycle against the matching/chat service.
//!
//! The controller owns idle → waiting → active transitions, backed by a
//! fixed-interval poll. Transitions are adopted from server responses only;
//! the client never asserts one on its own. The single exception is
//! [`SessionController::stop`], which resets locally without waiting for the
//! server to confirm — that optimism is observable behavior and kept on
//! purpose.
//!
//! Failure policy: background polling swallows every error and relies on the
//! next tick as its retry mechanism. Explicit actions (start/next, send)
//! surface failures and leave prior state intact.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use secrecy::ExposeSecret;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::api::{ChatApi, PartnerField};
use crate::avatar;
use crate::credentials::CredentialStore;
use crate::effects::{Effect, EffectSink};
use crate::error::SessionError;
use crate::session::detector::{CountDetector, MessageEvent, NewMessageDetector};
use crate::session::{ChatMessage, Partner, SessionStatus};

/// Point-in-time copy of the session state for rendering.
#[derive(Debug, Clone, Default)]
pub struct SessionSnapshot {
    pub status: SessionStatus,
    pub partner: Option<Partner>,
    pub messages: Vec<ChatMessage>,
    /// Presentation seed derived per match so repeat-named partners still get
    /// distinct avatars.
    pub stranger_seed: Option<String>,
    pub stranger_twitter: Option<String>,
    pub my_twitter: Option<String>,
}

#[derive(Debug, Default)]
struct State {
    status: SessionStatus,
    partner: Option<Partner>,
    messages: Vec<ChatMessage>,
    stranger_seed: Option<String>,
    stranger_twitter: Option<String>,
    my_twitter: Option<String>,
}

impl State {
    fn clear_match(&mut self) {
        self.partner = None;
        self.messages.clear();
        self.stranger_seed = None;
    }

    fn reset_to_idle(&mut self) {
        self.status = SessionStatus::Idle;
        self.clear_match();
        self.stranger_twitter = None;
    }
}

/// Owns the connection lifecycle to the matching/chat service.
pub struct SessionController {
    api: Arc<dyn ChatApi>,
    store: Arc<CredentialStore>,
    effects: Arc<dyn EffectSink>,
    poll_interval: Duration,
    state: Mutex<State>,
    detector: Mutex<Box<dyn NewMessageDetector>>,
    /// Held for the duration of one poll cycle; a tick that finds it taken
    /// is skipped rather than queued.
    poll_gate: tokio::sync::Mutex<()>,
    poll_task: Mutex<Option<JoinHandle<()>>>,
}

impl SessionController {
    pub fn new(
        api: Arc<dyn ChatApi>,
        store: Arc<CredentialStore>,
        effects: Arc<dyn EffectSink>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            api,
            store,
            effects,
            poll_interval,
            state: Mutex::new(State::default()),
            detector: Mutex::new(Box::new(CountDetector::new())),
            poll_gate: tokio::sync::Mutex::new(()),
            poll_task: Mutex::new(None),
        }
    }

    /// Swap the arrival-detection strategy. Must be called before polling
    /// starts; the default is [`CountDetector`].
    pub fn with_detector(self, detector: Box<dyn NewMessageDetector>) -> Self {
        if let Ok(mut guard) = self.detector.lock() {
            *guard = detector;
        }
        self
    }

    /// Current state for rendering.
    pub fn snapshot(&self) -> SessionSnapshot {
        self.state
            .lock()
            .map(|state| SessionSnapshot {
                status: state.status,
                partner: state.partner.clone(),
                messages: state.messages.clone(),
                stranger_seed: state.stranger_seed.clone(),
                stranger_twitter: state.stranger_twitter.clone(),
                my_twitter: state.my_twitter.clone(),
            })
            .unwrap_or_default()
    }

    pub fn status(&self) -> SessionStatus {
        self.state
            .lock()
            .map(|state| state.status)
            .unwrap_or_default()
    }

    /// Join the matching queue. If a session is already active, disconnects
    /// from it first ("next" semantics), clearing the local match state.
    ///
    /// On success the server-reported status and partner are adopted; a newly
    /// assigned partner produces a presentation seed and a matched
    /// notification. On failure local state is left unchanged.
    pub async fn start(&self) -> Result<(), SessionError> {
        let token = self.store.api_key().ok_or(SessionError::NotAuthenticated)?;
        let token = token.expose_secret();

        if self.status().is_active() {
            self.api.disconnect(token).await?;
            if let Ok(mut state) = self.state.lock() {
                state.clear_match();
            }
        }

        let join = self.api.join(token).await?;
        if !join.success {
            return Err(SessionError::Rejected(
                join.error.unwrap_or_else(|| "Failed to join queue".into()),
            ));
        }

        let matched = {
            let mut state = match self.state.lock() {
                Ok(state) => state,
                Err(_) => return Ok(()),
            };
            if let Some(status) = join.status {
                state.status = status;
            }
            join.partner.map(PartnerField::into_partner).map(|partner| {
                state.stranger_twitter = partner.twitter.clone();
                state.stranger_seed = Some(avatar::stranger_seed(&partner.name));
                state.partner = Some(partner.clone());
                partner
            })
        };
        if let Some(partner) = matched {
            self.effects.emit(Effect::Success);
            self.effects.emit(Effect::Matched { partner });
        }
        Ok(())
    }

    /// Leave the current session and find a new partner.
    pub async fn next(&self) -> Result<(), SessionError> {
        self.start().await
    }

    /// Leave the current session.
    ///
    /// The local reset to idle happens regardless of what the disconnect
    /// request returned; transport errors are swallowed. Calling this while
    /// already idle leaves state unchanged.
    pub async fn stop(&self) {
        let Some(token) = self.store.api_key() else {
            return;
        };
        if let Err(e) = self.api.disconnect(token.expose_secret()).await {
            tracing::debug!(error = %e, "disconnect failed; resetting locally anyway");
        }
        if let Ok(mut state) = self.state.lock() {
            state.reset_to_idle();
        }
    }

    /// Send a chat message to the current partner.
    pub async fn send_message(&self, content: &str) -> Result<(), SessionError> {
        let token = self.store.api_key().ok_or(SessionError::NotAuthenticated)?;
        let ack = self.api.send_message(token.expose_secret(), content).await?;
        if ack.success {
            Ok(())
        } else {
            Err(SessionError::Rejected(
                ack.error.unwrap_or_else(|| "Failed to send message".into()),
            ))
        }
    }

    /// One poll cycle: adopt server status/partner, and while active replace
    /// the message list wholesale, firing at most one cue for an arrival.
    ///
    /// Every failure path returns silently; the next tick is the retry. If a
    /// previous cycle is still in flight the call is skipped entirely.
    pub async fn poll(&self) {
        let Ok(_gate) = self.poll_gate.try_lock() else {
            tracing::trace!("poll already in flight; skipping tick");
            return;
        };
        let Some(token) = self.store.api_key() else {
            return;
        };
        let token = token.expose_secret();

        let status = match self.api.status(token).await {
            Ok(res) => res,
            Err(e) => {
                tracing::debug!(error = %e, "status poll failed");
                return;
            }
        };
        if !status.success {
            return;
        }

        let active = {
            let Ok(mut state) = self.state.lock() else {
                return;
            };
            if let Some(reported) = status.status {
                state.status = reported;
            }
            state.partner = status.partner.map(PartnerField::into_partner);
            if let Some(handle) = state.partner.as_ref().and_then(|p| p.twitter.clone()) {
                state.stranger_twitter = Some(handle);
            }
            if let Some(handle) = status.self_info.and_then(|info| info.twitter) {
                state.my_twitter = Some(handle);
            }
            // Messages exist only while a session is active.
            if !state.status.is_active() {
                state.messages.clear();
            }
            state.status.is_active()
        };
        if !active {
            return;
        }

        let messages = match self.api.messages(token).await {
            Ok(res) if res.success => res.messages,
            Ok(_) => return,
            Err(e) => {
                tracing::debug!(error = %e, "messages poll failed");
                return;
            }
        };
        let event = self
            .detector
            .lock()
            .ok()
            .and_then(|mut detector| detector.on_replace(&messages));
        if let Ok(mut state) = self.state.lock() {
            state.messages = messages;
        }
        match event {
            Some(MessageEvent::Received) => self.effects.emit(Effect::ReceiveCue),
            Some(MessageEvent::Sent) => self.effects.emit(Effect::SendCue),
            None => {}
        }
    }

    /// Drive [`poll`](Self::poll) on the configured cadence.
    ///
    /// The loop runs while a credential exists and the session is not idle,
    /// then exits on its own. Spawning again replaces (and aborts) any
    /// previous driver, so at most one timer is live per controller.
    pub fn spawn_poll_loop(self: Arc<Self>) {
        let weak = Arc::downgrade(&self);
        let interval = self.poll_interval;
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // interval fires immediately; consume that so the cadence starts
            // one period after spawn.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(controller) = weak.upgrade() else {
                    break;
                };
                if !controller.should_poll() {
                    break;
                }
                controller.poll().await;
            }
        });
        if let Ok(mut guard) = self.poll_task.lock()
            && let Some(previous) = guard.replace(handle)
        {
            previous.abort();
        }
    }

    /// Cancel the poll driver, if one is running.
    pub fn stop_poll_loop(&self) {
        if let Ok(mut guard) = self.poll_task.lock()
            && let Some(handle) = guard.take()
        {
            handle.abort();
        }
    }

    fn should_poll(&self) -> bool {
        self.store.api_key().is_some() && self.status() != SessionStatus::Idle
    }
}

impl Drop for SessionController {
    fn drop(&mut self) {
        self.stop_poll_loop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    use async_trait::async_trait;
    use pretty_assertions::assert_eq;

    use crate::api::{AckResponse, JoinResponse, MessagesResponse, StatusResponse};
    use crate::effects::RecordingEffects;
    use crate::error::ApiError;

    #[derive(Default)]
    struct FakeChat {
        status: StdMutex<Option<StatusResponse>>,
        messages: StdMutex<Option<MessagesResponse>>,
        join: StdMutex<Option<JoinResponse>>,
        calls: StdMutex<Vec<&'static str>>,
    }

    impl FakeChat {
        fn record(&self, endpoint: &'static str) {
            self.calls.lock().unwrap().push(endpoint);
        }

        fn calls(&self) -> Vec<&'static str> {
            self.calls.lock().unwrap().clone()
        }

        fn count(&self, endpoint: &str) -> usize {
            self.calls().iter().filter(|c| **c == endpoint).count()
        }

        fn set_status(&self, raw: serde_json::Value) {
            *self.status.lock().unwrap() = Some(serde_json::from_value(raw).unwrap());
        }

        fn set_messages(&self, raw: serde_json::Value) {
            *self.messages.lock().unwrap() = Some(serde_json::from_value(raw).unwrap());
        }

        fn set_join(&self, raw: serde_json::Value) {
            *self.join.lock().unwrap() = Some(serde_json::from_value(raw).unwrap());
        }
    }

    fn transport_error() -> ApiError {
        ApiError::Json(serde_json::from_str::<()>("simulated failure").unwrap_err())
    }

    #[async_trait]
    impl ChatApi for FakeChat {
        async fn status(&self, _token: &str) -> Result<StatusResponse, ApiError> {
            self.record("status");
            self.status
                .lock()
                .unwrap()
                .clone()
                .ok_or_else(transport_error)
        }

        async fn messages(&self, _token: &str) -> Result<MessagesResponse, ApiError> {
            self.record("messages");
            self.messages
                .lock()
                .unwrap()
                .clone()
                .ok_or_else(transport_error)
        }

        async fn join(&self, _token: &str) -> Result<JoinResponse, ApiError> {
            self.record("join");
            self.join
                .lock()
                .unwrap()
                .clone()
                .ok_or_else(transport_error)
        }

        async fn disconnect(&self, _token: &str) -> Result<(), ApiError> {
            self.record("disconnect");
            Ok(())
        }

        async fn send_message(&self, _token: &str, _content: &str) -> Result<AckResponse, ApiError> {
            self.record("message");
            Ok(AckResponse {
                success: true,
                error: None,
            })
        }
    }

    struct Fixture {
        api: Arc<FakeChat>,
        effects: Arc<RecordingEffects>,
        controller: Arc<SessionController>,
        _dir: tempfile::TempDir,
    }

    fn fixture(authenticated: bool) -> Fixture {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = Arc::new(CredentialStore::open_at(dir.path().join("creds.json")));
        if authenticated {
            store.save("clawmegle_testkey").expect("save key");
        }
        let api = Arc::new(FakeChat::default());
        let effects = Arc::new(RecordingEffects::new());
        let controller = Arc::new(SessionController::new(
            api.clone(),
            store,
            effects.clone(),
            Duration::from_millis(10),
        ));
        Fixture {
            api,
            effects,
            controller,
            _dir: dir,
        }
    }

    #[tokio::test]
    async fn start_requires_credential() {
        let fx = fixture(false);
        let err = fx.controller.start().await.unwrap_err();
        assert!(matches!(err, SessionError::NotAuthenticated));
        assert!(fx.api.calls().is_empty());
    }

    #[tokio::test]
    async fn start_adopts_partner_and_fires_match_notification_once() {
        let fx = fixture(true);
        fx.api.set_join(serde_json::json!({
            "success": true,
            "status": "active",
            "partner": {"name": "agent42"}
        }));

        fx.controller.start().await.expect("start");

        let snapshot = fx.controller.snapshot();
        assert_eq!(snapshot.status, SessionStatus::Active);
        assert_eq!(snapshot.partner.as_ref().map(|p| p.name.as_str()), Some("agent42"));
        let seed = snapshot.stranger_seed.expect("seed derived");
        assert!(seed.starts_with("agent42_"));
        assert!(seed.len() > "agent42_".len());

        let matched: Vec<_> = fx
            .effects
            .drain()
            .into_iter()
            .filter(|e| matches!(e, Effect::Matched { .. }))
            .collect();
        assert_eq!(matched.len(), 1);
    }

    #[tokio::test]
    async fn start_surfaces_rejection_and_leaves_state_unchanged() {
        let fx = fixture(true);
        fx.api
            .set_join(serde_json::json!({"success": false, "error": "queue full"}));

        let err = fx.controller.start().await.unwrap_err();
        assert_eq!(err.to_string(), "queue full");
        assert_eq!(fx.controller.status(), SessionStatus::Idle);
        assert!(fx.controller.snapshot().partner.is_none());
    }

    #[tokio::test]
    async fn next_disconnects_before_rejoining_when_active() {
        let fx = fixture(true);
        fx.api.set_join(serde_json::json!({
            "success": true,
            "status": "active",
            "partner": {"name": "first"}
        }));
        fx.controller.start().await.expect("first match");
        assert_eq!(fx.api.count("disconnect"), 0);

        fx.api.set_join(serde_json::json!({
            "success": true,
            "status": "waiting"
        }));
        fx.controller.next().await.expect("next");

        assert_eq!(fx.api.count("disconnect"), 1);
        assert_eq!(fx.api.count("join"), 2);
        let snapshot = fx.controller.snapshot();
        assert_eq!(snapshot.status, SessionStatus::Waiting);
        assert!(snapshot.partner.is_none());
        assert!(snapshot.messages.is_empty());
    }

    #[tokio::test]
    async fn stop_when_idle_leaves_state_unchanged() {
        let fx = fixture(true);
        fx.controller.stop().await;

        let snapshot = fx.controller.snapshot();
        assert_eq!(snapshot.status, SessionStatus::Idle);
        assert!(snapshot.messages.is_empty());
        assert!(snapshot.partner.is_none());
    }

    #[tokio::test]
    async fn poll_without_credential_is_a_noop() {
        let fx = fixture(false);
        fx.controller.poll().await;
        assert!(fx.api.calls().is_empty());
    }

    #[tokio::test]
    async fn poll_adopts_waiting_without_fetching_messages() {
        let fx = fixture(true);
        fx.api
            .set_status(serde_json::json!({"success": true, "status": "waiting"}));

        fx.controller.poll().await;

        assert_eq!(fx.controller.status(), SessionStatus::Waiting);
        assert!(fx.controller.snapshot().partner.is_none());
        assert_eq!(fx.api.count("messages"), 0);
    }

    #[tokio::test]
    async fn poll_active_replaces_messages_and_fires_one_receive_cue() {
        let fx = fixture(true);
        fx.api.set_status(serde_json::json!({
            "success": true,
            "status": "active",
            "partner": {"name": "agent42"}
        }));
        fx.api.set_messages(serde_json::json!({
            "success": true,
            "messages": [
                {"content": "hey", "is_you": false}
            ]
        }));

        fx.controller.poll().await;

        let snapshot = fx.controller.snapshot();
        assert_eq!(snapshot.messages.len(), 1);
        let effects = fx.effects.drain();
        assert_eq!(
            effects.iter().filter(|e| **e == Effect::ReceiveCue).count(),
            1
        );
        assert_eq!(effects.iter().filter(|e| **e == Effect::SendCue).count(), 0);
    }

    #[tokio::test]
    async fn poll_adopting_non_active_status_clears_messages() {
        let fx = fixture(true);
        fx.api.set_status(serde_json::json!({
            "success": true,
            "status": "active",
            "partner": {"name": "agent42"}
        }));
        fx.api.set_messages(serde_json::json!({
            "success": true,
            "messages": [{"content": "hey", "is_you": false}]
        }));
        fx.controller.poll().await;
        assert_eq!(fx.controller.snapshot().messages.len(), 1);

        // Partner left; the server reports idle again.
        fx.api
            .set_status(serde_json::json!({"success": true, "status": "idle"}));
        fx.controller.poll().await;

        let snapshot = fx.controller.snapshot();
        assert_eq!(snapshot.status, SessionStatus::Idle);
        assert!(snapshot.messages.is_empty());
        assert!(snapshot.partner.is_none());
    }

    #[tokio::test]
    async fn poll_failure_is_swallowed_and_state_kept() {
        let fx = fixture(true);
        fx.api
            .set_status(serde_json::json!({"success": true, "status": "waiting"}));
        fx.controller.poll().await;

        // Next poll fails at transport level; the adopted state survives.
        *fx.api.status.lock().unwrap() = None;
        fx.controller.poll().await;
        assert_eq!(fx.controller.status(), SessionStatus::Waiting);
    }

    #[tokio::test]
    async fn send_message_requires_credential() {
        let fx = fixture(false);
        let err = fx.controller.send_message("hi").await.unwrap_err();
        assert!(matches!(err, SessionError::NotAuthenticated));
        assert!(fx.api.calls().is_empty());
    }
}
