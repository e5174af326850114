//! Session controller: the state machine that owns the credential lifecycle.
//!
//! One controller instance per application root owns the session state, the
//! in-memory credential mirror, and the single pending refresh timer.
//! Collaborators receive handles ([`ModeGate`], the state channel) rather
//! than reaching into globals. Refresh attempts are serialized: concurrent
//! triggers (scheduled timer, reactive 401) coalesce into one network call
//! and every waiter adopts the same outcome.

use crate::config::ClientConfig;
use crate::error::{ExchangeError, SessionError};
use crate::exchange::{AuthPayload, TokenExchangeClient};
use crate::gate::ModeGate;
use crate::scheduler::RefreshScheduler;
use crate::store::{CredentialStore, MemoryKeyValue};
use crate::types::{SessionState, TokenPair, UserProfile};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::{watch, Mutex as AsyncMutex};

/// Outcome of a (possibly coalesced) refresh attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RefreshOutcome {
    /// A new credential pair is installed; the session stays authenticated.
    Renewed,
    /// The refresh token is spent or unusable; the session degraded to guest
    /// mode and the store was cleared.
    SignedOut,
}

/// Coalescing slot guarding the single in-flight refresh.
#[derive(Debug, Default)]
struct RefreshSlot {
    /// Bumped after every completed refresh attempt.
    generation: u64,
    /// Outcome of the most recent attempt, adopted by late waiters.
    last: Option<RefreshOutcome>,
}

/// Client-side session and token-lifecycle manager.
pub struct SessionController {
    inner: Arc<Inner>,
}

struct Inner {
    exchange: TokenExchangeClient,
    store: CredentialStore,
    state_tx: watch::Sender<SessionState>,
    scheduler: StdMutex<RefreshScheduler>,
    profile: StdMutex<Option<UserProfile>>,
    credentials: StdMutex<Option<TokenPair>>,
    /// Lock-free mirror of `RefreshSlot::generation`, read before awaiting
    /// the slot so waiters can tell whether a refresh completed while they
    /// were queued.
    refresh_generation: AtomicU64,
    refresh_slot: AsyncMutex<RefreshSlot>,
}

impl SessionController {
    /// Build a controller from resolved configuration.
    pub fn new(config: &ClientConfig) -> Self {
        let store = match &config.storage.path {
            Some(path) => CredentialStore::open(path),
            None => CredentialStore::new(Box::new(MemoryKeyValue::new())),
        };
        Self::with_parts(TokenExchangeClient::new(&config.api), store)
    }

    /// Build a controller from explicit collaborators.
    pub fn with_parts(exchange: TokenExchangeClient, store: CredentialStore) -> Self {
        let (state_tx, _) = watch::channel(SessionState::Anonymous);
        Self {
            inner: Arc::new(Inner {
                exchange,
                store,
                state_tx,
                scheduler: StdMutex::new(RefreshScheduler::new()),
                profile: StdMutex::new(None),
                credentials: StdMutex::new(None),
                refresh_generation: AtomicU64::new(0),
                refresh_slot: AsyncMutex::new(RefreshSlot::default()),
            }),
        }
    }

    /// Current session state.
    pub fn state(&self) -> SessionState {
        *self.inner.state_tx.borrow()
    }

    /// Gate handle for the domain layer's per-operation mode checks.
    pub fn gate(&self) -> ModeGate {
        ModeGate::new(self.inner.state_tx.subscribe())
    }

    /// Profile of the signed-in user, if any.
    pub fn profile(&self) -> Option<UserProfile> {
        self.inner.profile.lock().expect("profile lock").clone()
    }

    /// True while a proactive refresh timer is pending.
    pub fn refresh_timer_armed(&self) -> bool {
        self.inner
            .scheduler
            .lock()
            .expect("scheduler lock")
            .is_armed()
    }

    /// Evaluate persisted state once at application start.
    ///
    /// Runs the one-time legacy-key migration, then settles the session into
    /// `Authenticated` (valid persisted pair), `Authenticated` via a refresh
    /// (stale access token, live refresh token), or `Guest` (nothing usable).
    /// An unreachable backend at this point enters guest mode while keeping
    /// the stored pair for the next start.
    pub async fn bootstrap(&self) {
        let inner = &self.inner;
        inner.store.migrate_legacy_keys();

        let Some((profile, pair)) = inner.store.load() else {
            tracing::info!("no persisted session, entering guest mode");
            inner.set_state(SessionState::Guest);
            return;
        };
        if pair.refresh_token_expired() {
            tracing::info!("persisted refresh token expired, entering guest mode");
            inner.set_state(SessionState::Guest);
            inner.store.clear();
            return;
        }

        // Mirror before validation so the refresh path can reach the tokens.
        *inner.profile.lock().expect("profile lock") = Some(profile);
        *inner.credentials.lock().expect("credentials lock") = Some(pair.clone());

        if pair.remaining_access_lifetime_secs() > 0 {
            match inner.exchange.fetch_profile(&pair.access_token).await {
                Ok(server_profile) => {
                    let lifetime = pair.remaining_access_lifetime_secs();
                    inner.set_state(SessionState::Authenticated);
                    // The backend profile is authoritative; overwrite the
                    // stored copy after validation.
                    *inner.profile.lock().expect("profile lock") = Some(server_profile.clone());
                    inner.store.save(&server_profile, &pair);
                    Inner::arm_scheduler(inner, lifetime);
                    return;
                }
                Err(ExchangeError::Transport(msg)) => {
                    tracing::warn!("backend unreachable at startup, running in guest mode: {msg}");
                    inner.set_state(SessionState::Guest);
                    return;
                }
                Err(err) => {
                    tracing::debug!("persisted access token rejected: {err}");
                }
            }
        }

        // Access token stale or rejected; the refresh token gets one chance.
        let _ = Inner::coalesced_refresh(inner).await;
    }

    /// Exchange a password login for an authenticated session.
    ///
    /// Failures surface to the caller and leave session state, the credential
    /// mirror, and the store untouched.
    pub async fn login(
        &self,
        identifier: &str,
        secret: &str,
    ) -> Result<UserProfile, SessionError> {
        let payload = self.inner.exchange.login(identifier, secret).await?;
        tracing::info!(identifier, "login succeeded");
        Inner::install_session(&self.inner, &payload);
        Ok(payload.profile)
    }

    /// Trade a federated provider token for an authenticated session.
    pub async fn login_federated(&self, provider_token: &str) -> Result<UserProfile, SessionError> {
        let payload = self.inner.exchange.exchange_federated(provider_token).await?;
        tracing::info!("federated sign-in succeeded");
        Inner::install_session(&self.inner, &payload);
        Ok(payload.profile)
    }

    /// Tear down the session. Local teardown always succeeds; the remote
    /// notification is best-effort and its failure is absorbed.
    pub async fn logout(&self) {
        let refresh_token = self
            .inner
            .credentials
            .lock()
            .expect("credentials lock")
            .as_ref()
            .map(|pair| pair.refresh_token.clone());
        self.inner.sign_out_locally();
        if let Some(token) = refresh_token {
            if let Err(err) = self.inner.exchange.logout(&token).await {
                tracing::warn!("remote logout notification failed (ignored): {err}");
            }
        }
    }

    /// Dispatch one authorized operation against the backend.
    ///
    /// This is the single boundary between domain operations and the
    /// transport: it attaches the current access token, and on an
    /// unauthorized response performs one coalesced refresh and retries the
    /// operation exactly once. A second rejection (or a failed refresh)
    /// surfaces as [`SessionError::SignInRequired`].
    pub async fn with_access_token<T, F, Fut>(&self, operation: F) -> Result<T, SessionError>
    where
        F: Fn(String) -> Fut,
        Fut: Future<Output = Result<T, ExchangeError>>,
    {
        if self.state() == SessionState::Guest {
            return Err(SessionError::GuestMode);
        }
        let Some(token) = self.inner.access_token() else {
            return Err(SessionError::SignInRequired);
        };
        match operation(token).await {
            Ok(value) => Ok(value),
            Err(ExchangeError::Unauthorized(_)) => {
                match Inner::coalesced_refresh(&self.inner).await {
                    RefreshOutcome::Renewed => {
                        let Some(token) = self.inner.access_token() else {
                            return Err(SessionError::SignInRequired);
                        };
                        operation(token).await.map_err(|err| match err {
                            ExchangeError::Unauthorized(_) => SessionError::SignInRequired,
                            other => SessionError::Exchange(other),
                        })
                    }
                    RefreshOutcome::SignedOut => Err(SessionError::SignInRequired),
                }
            }
            Err(other) => Err(SessionError::Exchange(other)),
        }
    }
}

impl Inner {
    fn set_state(&self, next: SessionState) {
        let previous = *self.state_tx.borrow();
        if previous != next {
            tracing::info!(?previous, ?next, "session state transition");
        }
        self.state_tx.send_replace(next);
    }

    fn access_token(&self) -> Option<String> {
        self.credentials
            .lock()
            .expect("credentials lock")
            .as_ref()
            .map(|pair| pair.access_token.clone())
    }

    /// Install a freshly issued session: transition first, persist after,
    /// then arm the proactive refresh timer.
    fn install_session(inner: &Arc<Self>, payload: &AuthPayload) {
        let lifetime = payload.tokens.remaining_access_lifetime_secs();
        *inner.credentials.lock().expect("credentials lock") = Some(payload.tokens.clone());
        *inner.profile.lock().expect("profile lock") = Some(payload.profile.clone());
        inner.set_state(SessionState::Authenticated);
        inner.store.save(&payload.profile, &payload.tokens);
        Self::arm_scheduler(inner, lifetime);
    }

    /// Arm the single proactive refresh timer against this controller.
    fn arm_scheduler(inner: &Arc<Self>, lifetime_secs: u64) {
        let weak = Arc::downgrade(inner);
        inner
            .scheduler
            .lock()
            .expect("scheduler lock")
            .arm(lifetime_secs, async move {
                // A torn-down controller leaves nothing to refresh.
                let Some(inner) = weak.upgrade() else {
                    return;
                };
                if *inner.state_tx.borrow() != SessionState::Authenticated {
                    return;
                }
                tracing::debug!("proactive refresh due");
                let _ = Self::coalesced_refresh(&inner).await;
            });
    }

    /// Discard the local session: disarm the timer, drop the mirrors, enter
    /// guest mode, then clear the store (transition before persistence).
    fn sign_out_locally(&self) {
        self.scheduler
            .lock()
            .expect("scheduler lock")
            .disarm();
        *self.credentials.lock().expect("credentials lock") = None;
        *self.profile.lock().expect("profile lock") = None;
        self.set_state(SessionState::Guest);
        self.store.clear();
    }

    /// Run one refresh attempt, coalescing concurrent triggers.
    ///
    /// The generation snapshot taken before awaiting the slot tells a waiter
    /// whether a refresh completed while it was queued; if so it adopts that
    /// outcome instead of issuing a second network call. A failed refresh is
    /// terminal for the refresh token: the store is cleared and the session
    /// is in guest mode before the slot is released, so no later trigger can
    /// replay the spent token.
    async fn coalesced_refresh(inner: &Arc<Self>) -> RefreshOutcome {
        let seen = inner.refresh_generation.load(Ordering::Acquire);
        let mut slot = inner.refresh_slot.lock().await;
        if slot.generation != seen {
            tracing::debug!("refresh already performed by a concurrent trigger");
            return slot.last.unwrap_or(RefreshOutcome::SignedOut);
        }

        let refresh_token = inner
            .credentials
            .lock()
            .expect("credentials lock")
            .as_ref()
            .map(|pair| pair.refresh_token.clone());
        let outcome = match refresh_token {
            None => {
                inner.sign_out_locally();
                RefreshOutcome::SignedOut
            }
            Some(token) => {
                inner.set_state(SessionState::Authenticating);
                match inner.exchange.refresh(&token).await {
                    Ok(payload) => {
                        Self::install_session(inner, &payload);
                        RefreshOutcome::Renewed
                    }
                    Err(err) => {
                        // Unauthorized and transport failures degrade alike:
                        // stale credentials are never retried silently.
                        tracing::warn!("token refresh failed, degrading to guest mode: {err}");
                        inner.sign_out_locally();
                        RefreshOutcome::SignedOut
                    }
                }
            }
        };

        slot.generation = slot.generation.wrapping_add(1);
        inner
            .refresh_generation
            .store(slot.generation, Ordering::Release);
        slot.last = Some(outcome);
        outcome
    }
}
