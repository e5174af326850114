//! Shared fixtures for the session lifecycle integration suite.

// The stub backend lives with the library's inline-test fixtures; pull the
// same file in here since `cfg(test)` library items are invisible to
// integration binaries.
#[allow(dead_code)]
#[path = "../../src/testsupport/stub.rs"]
mod stub;

pub use stub::StubServer;

use roomkey::types::{TokenPair, UserProfile};
use serde_json::json;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Once;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing_subscriber::EnvFilter;

static TEST_DIR_COUNTER: AtomicU64 = AtomicU64::new(0);
static TRACING: Once = Once::new();

/// Install a subscriber once per test binary so the controller's absorbed
/// failures show up under `RUST_LOG` when debugging a scenario.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// Temporary directory fixture with best-effort cleanup.
pub struct TestTempDir {
    path: PathBuf,
}

impl TestTempDir {
    pub fn new(prefix: &str) -> Self {
        let suffix = TEST_DIR_COUNTER.fetch_add(1, Ordering::Relaxed);
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis();
        let dir = std::env::temp_dir().join(format!("roomkey-it-{prefix}-{millis}-{suffix}"));
        std::fs::create_dir_all(&dir).expect("failed to create temporary fixture directory");
        Self { path: dir }
    }

    pub fn child(&self, relative: &str) -> PathBuf {
        self.path.join(relative)
    }
}

impl Drop for TestTempDir {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.path);
    }
}

pub fn unix_now_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

pub fn sample_profile(identifier: &str) -> UserProfile {
    UserProfile {
        id: format!("u-{identifier}"),
        display_name: identifier.to_string(),
        login_identifier: identifier.to_string(),
        locale: Some("en-US".into()),
    }
}

/// Pair with the given seconds of access life left and a long-lived refresh
/// token. Negative lifetimes produce an already-expired access token.
pub fn sample_pair(access_token: &str, access_lifetime_secs: i64, refresh_token: &str) -> TokenPair {
    let now = unix_now_secs();
    TokenPair {
        access_token: access_token.to_string(),
        access_expires_at_unix: now + access_lifetime_secs,
        refresh_token: refresh_token.to_string(),
        refresh_expires_at_unix: now + 30 * 24 * 3600,
    }
}

/// Serialized `{user, tokens}` auth envelope in the backend's wire shape.
pub fn auth_response_json(
    identifier: &str,
    access_token: &str,
    expires_in_secs: i64,
    refresh_token: &str,
) -> String {
    json!({
        "user": {
            "id": format!("u-{identifier}"),
            "displayName": identifier,
            "loginIdentifier": identifier,
            "locale": "en-US"
        },
        "tokens": {
            "accessToken": access_token,
            "accessTokenExpiresIn": expires_in_secs,
            "refreshToken": refresh_token,
            "refreshTokenExpiresAt": "2099-01-01T00:00:00Z"
        }
    })
    .to_string()
}

/// Serialized `{user}` envelope returned by the profile endpoint.
pub fn profile_response_json(identifier: &str) -> String {
    json!({
        "user": {
            "id": format!("u-{identifier}"),
            "displayName": identifier,
            "loginIdentifier": identifier,
            "locale": "en-US"
        }
    })
    .to_string()
}
