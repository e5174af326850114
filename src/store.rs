//! Credential persistence over a narrow key/value seam.
//!
//! The durable medium is abstracted as [`KeyValueStore`] so the session core
//! never depends on where credentials actually live. Two implementations are
//! provided: a JSON-file store for real use and an in-memory store for tests
//! and storage-disabled environments. All persistence failures are absorbed
//! here: unavailable storage degrades to in-memory operation and corrupted
//! records degrade to logged-out.

use crate::error::StoreError;
use crate::types::{TokenPair, UserProfile};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Current storage keys, one logical record each.
pub const KEY_ACCESS_TOKEN: &str = "access_token";
pub const KEY_REFRESH_TOKEN: &str = "refresh_token";
pub const KEY_USER_PROFILE: &str = "user_profile";

// Key names used by the previous storage scheme; migrated once at startup.
const LEGACY_KEY_ACCESS: &str = "accessToken";
const LEGACY_KEY_REFRESH: &str = "refreshToken";

/// Narrow seam over the durable key/value medium.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;
    fn remove(&self, key: &str) -> Result<(), StoreError>;
}

// ---------------------------------------------------------------------------
// Key/value implementations
// ---------------------------------------------------------------------------

/// In-memory key/value store.
#[derive(Debug, Default)]
pub struct MemoryKeyValue {
    entries: Mutex<BTreeMap<String, String>>,
}

impl MemoryKeyValue {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryKeyValue {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.entries.lock().expect("kv lock").get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.entries
            .lock()
            .expect("kv lock")
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.entries.lock().expect("kv lock").remove(key);
        Ok(())
    }
}

/// File-backed key/value store: one JSON object per file.
#[derive(Debug, Clone)]
pub struct FileKeyValue {
    path: PathBuf,
}

impl FileKeyValue {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn load_map(&self) -> Result<BTreeMap<String, String>, StoreError> {
        match std::fs::read_to_string(&self.path) {
            Ok(text) => serde_json::from_str(&text).map_err(|err| {
                StoreError::Corrupt(format!(
                    "failed to parse session store `{}`: {err}",
                    self.path.display()
                ))
            }),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(err) => Err(StoreError::Io(err)),
        }
    }

    /// Persist the map with restrictive permissions, via a sibling temp file
    /// so partial writes never corrupt the last known-good state.
    fn write_map(&self, map: &BTreeMap<String, String>) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                let _ = std::fs::set_permissions(parent, std::fs::Permissions::from_mode(0o700));
            }
        }
        let text = serde_json::to_string_pretty(map)
            .map_err(|err| StoreError::Corrupt(format!("failed to serialize store: {err}")))?;
        let tmp_path = self.path.with_extension("json.tmp");
        let mut options = std::fs::OpenOptions::new();
        options.create(true).truncate(true).write(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let mut file = options.open(&tmp_path)?;
        file.write_all(text.as_bytes())?;
        file.flush()?;
        std::fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }
}

impl KeyValueStore for FileKeyValue {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.load_map()?.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        // An unreadable backing file is replaced rather than propagated; the
        // credential layer has already decided to overwrite.
        let mut map = self.load_map().unwrap_or_default();
        map.insert(key.to_string(), value.to_string());
        self.write_map(&map)
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        let mut map = self.load_map().unwrap_or_default();
        if map.remove(key).is_some() || !self.path.exists() {
            if map.is_empty() {
                // Dropping the last key removes the file entirely.
                match std::fs::remove_file(&self.path) {
                    Ok(()) => return Ok(()),
                    Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(()),
                    Err(err) => return Err(StoreError::Io(err)),
                }
            }
            self.write_map(&map)?;
        }
        Ok(())
    }
}

/// Default session-store location (`~/.config/roomkey/session.json`).
pub fn default_store_path() -> Option<PathBuf> {
    config_root_dir().map(|dir| dir.join("roomkey").join("session.json"))
}

/// Resolve the platform config root, honoring `XDG_CONFIG_HOME`.
pub(crate) fn config_root_dir() -> Option<PathBuf> {
    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        if !xdg.trim().is_empty() {
            return Some(PathBuf::from(xdg));
        }
    }
    dirs::config_dir()
}

// ---------------------------------------------------------------------------
// Credential store
// ---------------------------------------------------------------------------

/// Serialized token record stored under each token key.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredToken {
    token: String,
    expires_at_unix: i64,
}

/// Durable representation of the credential pair and user profile.
///
/// All operations absorb medium failures: `save` is best-effort, `load`
/// treats anything unreadable or partial as absent (clearing first), and
/// `clear` leaves no key behind that a subsequent `load` could observe.
pub struct CredentialStore {
    kv: Box<dyn KeyValueStore>,
}

impl CredentialStore {
    pub fn new(kv: Box<dyn KeyValueStore>) -> Self {
        Self { kv }
    }

    /// Open a file-backed store at `path`.
    pub fn open(path: impl AsRef<Path>) -> Self {
        Self::new(Box::new(FileKeyValue::new(path.as_ref())))
    }

    /// Persist the profile and credential pair. Idempotent overwrite;
    /// failures are logged and swallowed so the session keeps operating
    /// in-memory when the medium is unavailable.
    pub fn save(&self, profile: &UserProfile, pair: &TokenPair) {
        let access = StoredToken {
            token: pair.access_token.clone(),
            expires_at_unix: pair.access_expires_at_unix,
        };
        let refresh = StoredToken {
            token: pair.refresh_token.clone(),
            expires_at_unix: pair.refresh_expires_at_unix,
        };
        let records = [
            (KEY_USER_PROFILE, serde_json::to_string(profile)),
            (KEY_ACCESS_TOKEN, serde_json::to_string(&access)),
            (KEY_REFRESH_TOKEN, serde_json::to_string(&refresh)),
        ];
        for (key, serialized) in records {
            let value = match serialized {
                Ok(value) => value,
                Err(err) => {
                    tracing::warn!(key, "failed to serialize session record: {err}");
                    return;
                }
            };
            if let Err(err) = self.kv.set(key, &value) {
                tracing::warn!(key, "session store unavailable, not persisted: {err}");
                return;
            }
        }
    }

    /// Load the persisted profile and credential pair.
    ///
    /// Partial pairs and undecodable records are never surfaced as errors:
    /// the store is cleared and the session starts logged-out.
    pub fn load(&self) -> Option<(UserProfile, TokenPair)> {
        let profile_raw = self.read_key(KEY_USER_PROFILE)?;
        let access_raw = self.read_key(KEY_ACCESS_TOKEN);
        let refresh_raw = self.read_key(KEY_REFRESH_TOKEN);

        let (Some(profile_raw), Some(access_raw), Some(refresh_raw)) =
            (profile_raw, access_raw?, refresh_raw?)
        else {
            return self.absent_unless_empty();
        };

        let profile: UserProfile = match serde_json::from_str(&profile_raw) {
            Ok(profile) => profile,
            Err(err) => {
                tracing::warn!("corrupted stored profile, clearing session store: {err}");
                self.clear();
                return None;
            }
        };
        let (Some(access), Some(refresh)) = (
            decode_stored_token(&access_raw),
            decode_stored_token(&refresh_raw),
        ) else {
            tracing::warn!("corrupted stored token record, clearing session store");
            self.clear();
            return None;
        };
        Some((
            profile,
            TokenPair {
                access_token: access.token,
                access_expires_at_unix: access.expires_at_unix,
                refresh_token: refresh.token,
                refresh_expires_at_unix: refresh.expires_at_unix,
            },
        ))
    }

    /// Remove all three keys. After this returns, `load` observes nothing.
    pub fn clear(&self) {
        for key in [KEY_ACCESS_TOKEN, KEY_REFRESH_TOKEN, KEY_USER_PROFILE] {
            if let Err(err) = self.kv.remove(key) {
                tracing::warn!(key, "failed to clear session store key: {err}");
            }
        }
    }

    /// One-time migration of legacy key names.
    ///
    /// Copies bare-string token values found under the deprecated keys into
    /// the current keys only when the current key is empty, then deletes the
    /// deprecated keys. Safe to call repeatedly.
    pub fn migrate_legacy_keys(&self) {
        let pairs = [
            (LEGACY_KEY_ACCESS, KEY_ACCESS_TOKEN),
            (LEGACY_KEY_REFRESH, KEY_REFRESH_TOKEN),
        ];
        for (legacy, current) in pairs {
            let legacy_value = match self.kv.get(legacy) {
                Ok(Some(value)) if !value.trim().is_empty() => value,
                Ok(_) => continue,
                Err(err) => {
                    tracing::warn!(key = legacy, "legacy key unreadable, skipping: {err}");
                    continue;
                }
            };
            let current_empty = matches!(self.kv.get(current), Ok(None))
                || matches!(self.kv.get(current), Ok(Some(ref v)) if v.trim().is_empty());
            if current_empty {
                if let Err(err) = self.kv.set(current, &legacy_value) {
                    tracing::warn!(key = current, "failed to migrate legacy key: {err}");
                    continue;
                }
            }
            if let Err(err) = self.kv.remove(legacy) {
                tracing::warn!(key = legacy, "failed to delete legacy key: {err}");
            }
        }
    }

    /// Read one key, folding medium errors into "treat the store as absent".
    ///
    /// Returns `None` (outer) on read failure so the caller can clear and
    /// bail; `Some(None)` means the key is genuinely missing.
    fn read_key(&self, key: &str) -> Option<Option<String>> {
        match self.kv.get(key) {
            Ok(value) => Some(value.filter(|v| !v.trim().is_empty())),
            Err(err) => {
                tracing::warn!(key, "session store unreadable: {err}");
                self.clear();
                None
            }
        }
    }

    /// A partially-present pair violates the all-or-nothing invariant; clear
    /// it. A fully-empty store is plain absence and needs no clear.
    fn absent_unless_empty(&self) -> Option<(UserProfile, TokenPair)> {
        let any_present = [KEY_ACCESS_TOKEN, KEY_REFRESH_TOKEN, KEY_USER_PROFILE]
            .iter()
            .any(|key| matches!(self.kv.get(key), Ok(Some(ref v)) if !v.trim().is_empty()));
        if any_present {
            tracing::warn!("partial credential pair in session store, clearing");
            self.clear();
        }
        None
    }
}

/// Decode a stored token record, tolerating bare-string values left behind by
/// legacy-key migration. Bare tokens get a zero expiry, which bootstraps into
/// the refresh path rather than being trusted as-is.
fn decode_stored_token(raw: &str) -> Option<StoredToken> {
    if let Ok(record) = serde_json::from_str::<StoredToken>(raw) {
        return Some(record);
    }
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.starts_with('{') {
        return None;
    }
    Some(StoredToken {
        token: trimmed.to_string(),
        expires_at_unix: 0,
    })
}
