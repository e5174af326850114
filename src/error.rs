//! Unified error types for the session core.

use std::fmt;

// ---------------------------------------------------------------------------
// ExchangeError
// ---------------------------------------------------------------------------

/// Classified outcome of a credential-producing network call.
#[derive(Debug)]
pub enum ExchangeError {
    /// The credential was rejected by the backend. Terminal for that
    /// credential. Carries the server's message when present.
    Unauthorized(String),
    /// Network-level failure (connect, DNS, timeout) or an unexpected
    /// server-side status. Potentially transient.
    Transport(String),
    /// The request was malformed (e.g. empty fields). Carries a human-readable
    /// message for the UI; never changes session state.
    Validation(String),
}

impl fmt::Display for ExchangeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unauthorized(msg) => write!(f, "{msg}"),
            Self::Transport(msg) => write!(f, "transport: {msg}"),
            Self::Validation(msg) => write!(f, "{msg}"),
        }
    }
}

impl std::error::Error for ExchangeError {}

impl From<reqwest::Error> for ExchangeError {
    fn from(value: reqwest::Error) -> Self {
        Self::Transport(value.to_string())
    }
}

// ---------------------------------------------------------------------------
// StoreError
// ---------------------------------------------------------------------------

/// Errors from the key/value persistence medium.
///
/// These never escape the credential store's public surface: unavailable
/// storage degrades to in-memory operation and corrupted records degrade to
/// logged-out, both logged rather than thrown.
#[derive(Debug)]
pub enum StoreError {
    Io(std::io::Error),
    /// Persisted data could not be decoded.
    Corrupt(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(err) => write!(f, "io: {err}"),
            Self::Corrupt(msg) => write!(f, "corrupt store: {msg}"),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<std::io::Error> for StoreError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

// ---------------------------------------------------------------------------
// ConfigError
// ---------------------------------------------------------------------------

/// Errors when loading or parsing configuration.
#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Toml(toml::de::Error),
    Invalid(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "io: {e}"),
            Self::Toml(e) => write!(f, "toml: {e}"),
            Self::Invalid(msg) => write!(f, "invalid config: {msg}"),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(e: toml::de::Error) -> Self {
        Self::Toml(e)
    }
}

// ---------------------------------------------------------------------------
// SessionError — top-level
// ---------------------------------------------------------------------------

/// Errors surfaced by the session controller to the UI/domain layer.
#[derive(Debug)]
pub enum SessionError {
    /// A credential action failed; the message comes from the server's error
    /// payload when present, otherwise a generic fallback.
    Exchange(ExchangeError),
    /// The session is in guest mode; the operation needs a server session.
    GuestMode,
    /// Silent recovery failed and the stored credentials were discarded.
    SignInRequired,
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exchange(e) => write!(f, "{e}"),
            Self::GuestMode => write!(f, "operating in guest mode; sign in to reach the server"),
            Self::SignInRequired => {
                write!(f, "this action could not be completed, please sign in again")
            }
        }
    }
}

impl std::error::Error for SessionError {}

impl From<ExchangeError> for SessionError {
    fn from(e: ExchangeError) -> Self {
        Self::Exchange(e)
    }
}
