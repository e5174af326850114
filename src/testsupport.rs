//! Shared test fixtures for store/exchange/session test modules.
//!
//! Keeping tiny but reusable helpers here prevents each test module from
//! rebuilding ad-hoc temp-dir, wire-payload, and stub-backend code.

mod stub;

pub use stub::{StubResponse, StubServer};

use crate::types::{unix_now_secs, TokenPair, UserProfile};
use serde_json::json;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

static TEST_DIR_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Temporary directory fixture with best-effort cleanup.
#[derive(Debug)]
pub struct TestTempDir {
    path: PathBuf,
}

impl TestTempDir {
    /// Create a unique temporary directory with a readable prefix.
    pub fn new(prefix: &str) -> Self {
        let suffix = TEST_DIR_COUNTER.fetch_add(1, Ordering::Relaxed);
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis();
        let dir = std::env::temp_dir().join(format!("roomkey-{prefix}-{millis}-{suffix}"));
        fs::create_dir_all(&dir).expect("failed to create temporary fixture directory");
        Self { path: dir }
    }

    /// Root directory path for this fixture.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Build a child path under the fixture root.
    pub fn child(&self, relative: &str) -> PathBuf {
        self.path.join(relative)
    }

    /// Write UTF-8 text to a child path, creating parent directories as needed.
    pub fn write_text(&self, relative: &str, content: &str) -> PathBuf {
        let path = self.child(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("failed to create parent directories for fixture");
        }
        fs::write(&path, content).expect("failed to write fixture file");
        path
    }
}

impl Drop for TestTempDir {
    fn drop(&mut self) {
        let _ = fs::remove_dir_all(&self.path);
    }
}

/// Profile fixture for one dashboard user.
pub fn sample_profile() -> UserProfile {
    UserProfile {
        id: "u-100".into(),
        display_name: "Alice".into(),
        login_identifier: "alice".into(),
        locale: Some("en-US".into()),
    }
}

/// Credential-pair fixture with `access_lifetime_secs` of access life left.
pub fn sample_pair(access_lifetime_secs: i64) -> TokenPair {
    let now = unix_now_secs();
    TokenPair {
        access_token: "access-fixture".into(),
        access_expires_at_unix: now + access_lifetime_secs,
        refresh_token: "refresh-fixture".into(),
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn temp_dir_fixture_writes_and_resolves_paths() {
        let fixture = TestTempDir::new("fixture");
        let file = fixture.write_text("nested/file.txt", "hello");
        assert_eq!(fs::read_to_string(file).unwrap(), "hello");
    }

    #[test]
    fn auth_fixture_matches_wire_casing() {
        let raw = auth_response_json("alice", "acc", 900, "ref");
        assert!(raw.contains("\"accessTokenExpiresIn\":900"), "got: {raw}");
        assert!(raw.contains("\"refreshTokenExpiresAt\""), "got: {raw}");
    }

    #[tokio::test]
    async fn stub_server_serves_queue_and_records_requests() {
        let server = StubServer::start(vec![StubServer::json(204, "")]).await;
        let url = format!("{}/auth/logout", server.base_url());
        let response = reqwest::Client::new()
            .post(url)
            .json(&serde_json::json!({ "refreshToken": "ref" }))
            .send()
            .await
            .expect("stub request");
        assert_eq!(response.status().as_u16(), 204);
        let requests = server.finish().await;
        assert_eq!(requests.len(), 1);
        assert!(requests[0].starts_with("POST /auth/logout"));
        assert!(requests[0].contains("refreshToken"));
    }
}
