//! Proactive refresh timing.
//!
//! At most one deferred refresh is pending at any time: arming implicitly
//! cancels whatever was armed before, and the scheduler disarms itself on
//! drop so a stale timer can never fire against a torn-down controller.

use std::future::Future;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Fire this many seconds before the access token actually expires, so the
/// refresh completes before in-flight requests can race an expiring token.
const REFRESH_SAFETY_OFFSET_SECS: u64 = 60;

/// Floor on the computed delay. Short-lived tokens (under ~90s) would
/// otherwise refresh immediately and never get used.
const MIN_REFRESH_DELAY_SECS: u64 = 30;

/// Delay before a token with `lifetime_secs` remaining should be refreshed:
/// `max(lifetime - 60, 30)`.
pub fn refresh_delay(lifetime_secs: u64) -> Duration {
    Duration::from_secs(
        lifetime_secs
            .saturating_sub(REFRESH_SAFETY_OFFSET_SECS)
            .max(MIN_REFRESH_DELAY_SECS),
    )
}

/// Owner of the single pending refresh timer.
#[derive(Debug, Default)]
pub struct RefreshScheduler {
    pending: Option<JoinHandle<()>>,
}

impl RefreshScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm `on_due` to run once, `refresh_delay(lifetime_secs)` from now.
    /// Any previously armed timer is cancelled first.
    pub fn arm<F>(&mut self, lifetime_secs: u64, on_due: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.disarm();
        let delay = refresh_delay(lifetime_secs);
        tracing::debug!(delay_secs = delay.as_secs(), "refresh timer armed");
        // Anchor the deadline now, not at the task's first poll, so the
        // timer really measures from arm time.
        let sleep = tokio::time::sleep(delay);
        self.pending = Some(tokio::spawn(async move {
            sleep.await;
            on_due.await;
        }));
    }

    /// Cancel any pending timer. Safe to call when nothing is armed.
    pub fn disarm(&mut self) {
        if let Some(handle) = self.pending.take() {
            handle.abort();
        }
    }

    /// True while a timer is pending and has not fired.
    pub fn is_armed(&self) -> bool {
        self.pending
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }
}

impl Drop for RefreshScheduler {
    fn drop(&mut self) {
        self.disarm();
    }
}
