//! roomkey — client-side session core for the roomkey property dashboard.
//!
//! This crate owns the authentication credential lifecycle: acquiring tokens
//! (password or federated sign-in), persisting them across reloads,
//! proactively refreshing them before expiry, recovering once from rejected
//! requests, and degrading to a local guest mode when the backend is
//! unusable. The rest of the application consumes it through two signals:
//! the [`gate::ModeGate`] mode check and the
//! [`session::SessionController::with_access_token`] dispatch wrapper.
//!
//! # Quick start
//!
//! ```no_run
//! use roomkey::config::load_config;
//! use roomkey::session::SessionController;
//!
//! # async fn example() {
//! let config = load_config(None).unwrap();
//! let controller = SessionController::new(&config);
//! controller.bootstrap().await;
//! let gate = controller.gate();
//! if !gate.is_guest_mode() {
//!     // dispatch domain operations through controller.with_access_token
//! }
//! # }
//! ```

pub mod config;
pub mod error;
pub mod exchange;
pub mod gate;
pub mod scheduler;
pub mod session;
pub mod store;
#[cfg(test)]
pub mod testsupport;
pub mod types;
