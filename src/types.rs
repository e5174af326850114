//! Shared session model types.

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// A complete credential pair issued by the backend.
///
/// A pair is either fully present or absent: callers never see an access
/// token without its refresh token. Expiry instants are absolute so the pair
/// survives process restarts without losing lifetime information.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenPair {
    pub access_token: String,
    /// Unix timestamp after which the access token is no longer usable.
    pub access_expires_at_unix: i64,
    pub refresh_token: String,
    /// Unix timestamp after which the refresh token is no longer usable.
    pub refresh_expires_at_unix: i64,
}

impl TokenPair {
    /// Seconds of access-token lifetime left, clamped at zero.
    pub fn remaining_access_lifetime_secs(&self) -> u64 {
        self.access_expires_at_unix
            .saturating_sub(unix_now_secs())
            .max(0) as u64
    }

    /// True when the refresh token itself is already past its expiry.
    pub fn refresh_token_expired(&self) -> bool {
        self.refresh_expires_at_unix != 0 && self.refresh_expires_at_unix <= unix_now_secs()
    }
}

/// User profile persisted alongside the credential pair for page-reload
/// continuity. Not authoritative: the backend profile endpoint may overwrite
/// it after validation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: String,
    pub display_name: String,
    pub login_identifier: String,
    /// Preferred UI locale, e.g. `en-US`.
    #[serde(default)]
    pub locale: Option<String>,
}

/// Current session mode. Exactly one is active; owned by the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Fresh process, persisted state not yet evaluated.
    Anonymous,
    /// A credential exchange (login or refresh) is in flight.
    Authenticating,
    /// A valid credential pair is installed; domain calls go to the server.
    Authenticated,
    /// Degraded/offline mode; domain calls use local non-authoritative data.
    Guest,
}

pub(crate) fn unix_now_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}
