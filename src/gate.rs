//! Mode gate consulted by the domain layer.
//!
//! The single dual-mode decision point: domain operations ask
//! [`ModeGate::is_guest_mode`] once per operation (never cached across
//! operations, since a failed reactive refresh can flip it mid-session) to
//! choose between the backend and the local mirror.

use crate::types::SessionState;
use tokio::sync::watch;

/// Read-only projection of the controller's session state.
#[derive(Debug, Clone)]
pub struct ModeGate {
    rx: watch::Receiver<SessionState>,
}

impl ModeGate {
    pub(crate) fn new(rx: watch::Receiver<SessionState>) -> Self {
        Self { rx }
    }

    /// True exactly when the session is in guest mode. Anonymous (pending
    /// bootstrap check), Authenticating, and Authenticated all read false.
    pub fn is_guest_mode(&self) -> bool {
        matches!(*self.rx.borrow(), SessionState::Guest)
    }

    /// Current session state snapshot.
    pub fn state(&self) -> SessionState {
        *self.rx.borrow()
    }

    /// Wait until the session state changes, returning the new state.
    ///
    /// Lets the application react to explicit transitions ("on entering
    /// Authenticated, load server data") instead of polling.
    pub async fn changed(&mut self) -> SessionState {
        // A closed channel means the controller is gone; report guest mode.
        if self.rx.changed().await.is_err() {
            return SessionState::Guest;
        }
        *self.rx.borrow()
    }
}
