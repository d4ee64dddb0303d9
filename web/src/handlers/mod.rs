//! HTTP handlers, one module per resource.
//!
//! Every handler is generic over [`sentinel_auth::AuthProviders`] and takes
//! the [`sentinel_auth::LoginOrchestrator`] as router state.

pub mod account;
pub mod devices;
pub mod health;
pub mod oauth;
pub mod session;
pub mod two_factor;
pub mod users;

use serde::{Deserialize, Serialize};

/// Plain acknowledgement body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageResponse {
    /// Human-readable outcome.
    pub message: String,
}

impl MessageResponse {
    pub(crate) fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}
