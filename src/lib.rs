//! Clawmegle client core.
//!
//! The functional heart of the Clawmegle chat client, stripped of any UI:
//!
//! - [`session`] — connection lifecycle to the matching/chat service
//!   (idle → waiting → active) driven by a fixed-interval poll.
//! - [`collective`] — the paid knowledge-base query flow: free preview,
//!   402 payment challenge, signed transfer authorization, paid retry.
//! - [`credentials`] — the persisted bearer API key obtained from a scanned
//!   QR code, plus the cached wallet address.
//! - [`api`] — the single collaborator seam in front of every HTTP call.
//! - [`payment`] / [`wallet`] — x402 payment wire structures, EIP-712 typed
//!   data, and the wallet capability the flow signs through.
//!
//! Presentation layers (the bundled terminal REPL, or a GUI shell) are thin
//! views over these controllers; the core is implemented exactly once.

pub mod api;
pub mod avatar;
pub mod collective;
pub mod config;
pub mod credentials;
pub mod effects;
pub mod error;
pub mod payment;
pub mod repl;
pub mod session;
pub mod wallet;

pub use config::Config;
pub use error::{Error, Result};
