//! Session state shared between the controller and the remote service.
//!
//! The server is the authority on session state; the client only ever adopts
//! what a response reports. The one deliberate exception is the optimistic
//! local reset in [`controller::SessionController::stop`].

mod controller;
mod detector;

pub use controller::{SessionController, SessionSnapshot};
pub use detector::{CountDetector, MessageEvent, NewMessageDetector};

use serde::{Deserialize, Serialize};

/// Server-reported connection state.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    #[default]
    Idle,
    Waiting,
    Active,
}

impl SessionStatus {
    pub fn is_active(self) -> bool {
        self == Self::Active
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Idle => "idle",
            Self::Waiting => "waiting",
            Self::Active => "active",
        };
        f.write_str(label)
    }
}

/// The matched remote partner. Present only while the session is (or is
/// transitioning into) `active`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Partner {
    pub name: String,
    /// Optional social handle, used by views for profile pictures.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub twitter: Option<String>,
}

/// Server-assigned message identifier. Some deployments return numbers,
/// some strings; either way it is opaque to the client. When absent,
/// position in the list serves as fallback identity for rendering.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum MessageId {
    Number(i64),
    Text(String),
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

/// A single chat message. Immutable once received.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<MessageId>,
    pub content: String,
    #[serde(default)]
    pub is_you: bool,
    /// Legacy author marker; older servers send `"stranger"` here instead of
    /// setting `is_you`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

impl ChatMessage {
    /// Whether the remote partner authored this message.
    pub fn from_partner(&self) -> bool {
        self.sender.as_deref() == Some("stranger") || !self.is_you
    }
}
