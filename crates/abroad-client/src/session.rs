//! Session store
//!
//! Single owner of the authenticated identity: current user, bearer token
//! and lifecycle state. It is the only component that writes the persisted
//! session, and every other component (request wrapper, refresh monitor,
//! bootstrapper) goes through it instead of reading storage.
//!
//! Lifecycle states:
//!
//! ```text
//!   Unknown ──initialize──▶ Anonymous | Authenticated | Expired
//!   Anonymous/Expired ──login──▶ Authenticating ──▶ Authenticated | Anonymous
//!   Authenticated ──refresh──▶ Refreshing ──▶ Authenticated | Expired
//!   any ──logout──▶ Anonymous
//! ```
//!
//! `Unknown` is left exactly once and never re-entered. Each login and
//! logout starts a new generation; a login or refresh that completes after
//! its generation was superseded discards its result.

use crate::backend::AuthBackend;
use crate::error::{ClientError, Result};
use crate::storage::{self, PersistedState, SessionStorage};
use crate::token;
use abroad_core::{Credentials, RegisterRequest, User};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;

/// Authenticated identity
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub user: User,
    pub token: String,
}

/// Lifecycle state of the client session
#[derive(Debug, Clone, PartialEq, Default)]
pub enum SessionState {
    /// Not reconciled with storage yet
    #[default]
    Unknown,
    /// No session
    Anonymous,
    /// Login in flight
    Authenticating,
    Authenticated(Session),
    /// Refresh in flight; the stale session stays usable meanwhile
    Refreshing(Session),
    /// Session ended because the token could not be refreshed
    Expired,
}

impl SessionState {
    pub fn session(&self) -> Option<&Session> {
        match self {
            Self::Authenticated(session) | Self::Refreshing(session) => Some(session),
            _ => None,
        }
    }

    pub fn token(&self) -> Option<&str> {
        self.session().map(|s| s.token.as_str())
    }

    pub fn user(&self) -> Option<&User> {
        self.session().map(|s| &s.user)
    }

    pub fn is_authenticated(&self) -> bool {
        self.session().is_some()
    }

    pub fn is_initialized(&self) -> bool {
        !matches!(self, Self::Unknown)
    }

    pub fn is_loading(&self) -> bool {
        matches!(self, Self::Authenticating | Self::Refreshing(_))
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Anonymous => "anonymous",
            Self::Authenticating => "authenticating",
            Self::Authenticated(_) => "authenticated",
            Self::Refreshing(_) => "refreshing",
            Self::Expired => "expired",
        }
    }
}

struct Inner {
    state: SessionState,
    generation: u64,
    initializing: bool,
    /// Registrations in flight
    registering: usize,
    /// Session restored from storage at construction, trusted by `initialize`
    hydrated: Option<Session>,
}

/// Where `initialize` found its candidate token
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Source {
    Hydrated,
    Storage,
}

/// Persisted auth state store
pub struct SessionStore {
    backend: Arc<dyn AuthBackend>,
    storage: Arc<dyn SessionStorage>,
    inner: Mutex<Inner>,
    changes: watch::Sender<SessionState>,
    /// Serializes refreshes so a burst of 401s triggers one exchange
    refresh_lock: tokio::sync::Mutex<()>,
}

impl SessionStore {
    /// Create a store, hydrating from durable storage
    pub fn new(backend: Arc<dyn AuthBackend>, storage: Arc<dyn SessionStorage>) -> Self {
        let hydrated = match storage::read_session(storage.as_ref()) {
            Ok(Some(PersistedState {
                user: Some(user),
                token: Some(token),
                is_authenticated: true,
            })) => Some(Session { user, token }),
            Ok(_) => None,
            Err(e) => {
                tracing::warn!(error = %e, "Ignoring unreadable persisted session");
                None
            }
        };

        let (changes, _) = watch::channel(SessionState::Unknown);
        Self {
            backend,
            storage,
            inner: Mutex::new(Inner {
                state: SessionState::Unknown,
                generation: 0,
                initializing: false,
                registering: 0,
                hydrated,
            }),
            changes,
            refresh_lock: tokio::sync::Mutex::new(()),
        }
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    pub fn state(&self) -> SessionState {
        self.lock().state.clone()
    }

    pub fn token(&self) -> Option<String> {
        self.lock().state.token().map(str::to_string)
    }

    pub fn user(&self) -> Option<User> {
        self.lock().state.user().cloned()
    }

    pub fn is_authenticated(&self) -> bool {
        self.lock().state.is_authenticated()
    }

    pub fn is_initialized(&self) -> bool {
        self.lock().state.is_initialized()
    }

    pub fn is_loading(&self) -> bool {
        let inner = self.lock();
        inner.initializing || inner.registering > 0 || inner.state.is_loading()
    }

    /// Bumped by every login, logout and expiry, but not by a refresh
    pub(crate) fn generation(&self) -> u64 {
        self.lock().generation
    }

    /// Receive every state transition
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.changes.subscribe()
    }

    // ------------------------------------------------------------------
    // Operations
    // ------------------------------------------------------------------

    /// Reconcile with durable storage; runs once per process
    ///
    /// Never fails: whatever happens, the store leaves `Unknown`.
    pub async fn initialize(&self) -> SessionState {
        let (candidate, generation) = {
            let mut inner = self.lock();
            if inner.state.is_initialized() || inner.initializing {
                return inner.state.clone();
            }
            inner.initializing = true;

            let candidate = match inner.hydrated.take() {
                Some(session) => Some((Some(session.user), session.token, Source::Hydrated)),
                None => self.read_storage_candidate(),
            };
            (candidate, inner.generation)
        };

        let next = match candidate {
            None => {
                tracing::debug!("No stored session");
                SessionState::Anonymous
            }
            Some((Some(user), bearer, Source::Hydrated)) if !token::is_token_expired(&bearer) => {
                tracing::debug!(user = %user.username, "Restored session without revalidation");
                SessionState::Authenticated(Session {
                    user,
                    token: bearer,
                })
            }
            Some((_, bearer, _)) if token::is_token_expired(&bearer) => {
                tracing::info!("Stored token expired, attempting refresh");
                self.recover(&bearer).await
            }
            Some((_, bearer, _)) => match self.backend.current_user(&bearer).await {
                Ok(user) => SessionState::Authenticated(Session {
                    user,
                    token: bearer,
                }),
                Err(e) => {
                    tracing::info!(error = %e, "Stored token rejected, attempting refresh");
                    self.recover(&bearer).await
                }
            },
        };

        let mut inner = self.lock();
        inner.initializing = false;
        if inner.generation != generation || inner.state.is_initialized() {
            // login/logout ran meanwhile; its outcome stands
            return inner.state.clone();
        }
        match next.session() {
            Some(session) => self.persist(session),
            None => self.clear_storage(),
        }
        tracing::debug!(state = next.name(), "Session initialized");
        self.set_state(&mut inner, next);
        inner.state.clone()
    }

    /// Log in and load the current user
    ///
    /// Any failure clears the session and is returned to the caller.
    pub async fn login(&self, credentials: Credentials) -> Result<Session> {
        let generation = {
            let mut inner = self.lock();
            inner.generation += 1;
            inner.hydrated = None;
            self.set_state(&mut inner, SessionState::Authenticating);
            inner.generation
        };

        let outcome = self.authenticate(&credentials).await;

        let mut inner = self.lock();
        if inner.generation != generation {
            return Err(ClientError::Superseded);
        }
        match outcome {
            Ok(session) => {
                tracing::info!(user = %session.user.username, "Logged in");
                self.persist(&session);
                self.set_state(&mut inner, SessionState::Authenticated(session.clone()));
                Ok(session)
            }
            Err(e) => {
                tracing::info!(username = %credentials.username, error = %e, "Login failed");
                self.clear_storage();
                self.set_state(&mut inner, SessionState::Anonymous);
                Err(e)
            }
        }
    }

    /// Create an account, then log in with the same credentials
    ///
    /// A failed registration leaves any existing session untouched.
    pub async fn register(&self, request: RegisterRequest) -> Result<Session> {
        let user = {
            let _pending = Registering::start(self);
            self.backend.register(&request).await.map_err(|e| {
                tracing::info!(username = %request.username, error = %e, "Registration failed");
                e
            })?
        };
        tracing::info!(user = %user.username, "Registered");

        self.login(request.credentials()).await
    }

    /// End the session and wipe durable storage; idempotent
    pub fn logout(&self) {
        let mut inner = self.lock();
        inner.generation += 1;
        inner.hydrated = None;
        self.clear_storage();
        if inner.state.is_authenticated() {
            tracing::info!("Logged out");
        }
        self.set_state(&mut inner, SessionState::Anonymous);
    }

    /// Exchange the current token for a fresh one and reload the user
    ///
    /// Fails with [`ClientError::NoToken`] without touching the state when
    /// no token is held. Any other failure ends the session.
    pub async fn refresh_token(&self) -> Result<Session> {
        let stale = self.token().ok_or(ClientError::NoToken)?;
        self.refresh_if_current(&stale).await
    }

    /// Refresh unless `stale` has already been replaced
    ///
    /// Used after a 401: if another caller refreshed meanwhile, the newer
    /// session is returned without another round trip.
    pub async fn refresh_if_current(&self, stale: &str) -> Result<Session> {
        let _guard = self.refresh_lock.lock().await;

        let (session, generation) = {
            let mut inner = self.lock();
            let Some(session) = inner.state.session().cloned() else {
                return Err(ClientError::NoToken);
            };
            if session.token != stale {
                tracing::debug!("Token already refreshed by another caller");
                return Ok(session);
            }
            self.set_state(&mut inner, SessionState::Refreshing(session.clone()));
            (session, inner.generation)
        };

        let outcome = self.exchange(&session.token).await;

        let mut inner = self.lock();
        if inner.generation != generation {
            tracing::debug!("Discarding refresh result for a superseded session");
            return Err(ClientError::Superseded);
        }
        match outcome {
            Ok(fresh) => {
                tracing::debug!(user = %fresh.user.username, "Token refreshed");
                self.persist(&fresh);
                self.set_state(&mut inner, SessionState::Authenticated(fresh.clone()));
                Ok(fresh)
            }
            Err(e) => {
                tracing::warn!(error = %e, "Token refresh failed, ending session");
                self.expire_locked(&mut inner);
                Err(e)
            }
        }
    }

    /// End the session because `stale` could not be kept alive
    ///
    /// Does nothing once `stale` is no longer the current token.
    pub(crate) fn expire_if_current(&self, stale: &str) -> bool {
        let mut inner = self.lock();
        if inner.state.token() != Some(stale) {
            return false;
        }
        self.expire_locked(&mut inner);
        true
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn set_state(&self, inner: &mut Inner, next: SessionState) {
        debug_assert!(next.is_initialized(), "Unknown is never re-entered");
        inner.state = next.clone();
        self.changes.send_replace(next);
    }

    fn expire_locked(&self, inner: &mut Inner) {
        inner.generation += 1;
        inner.hydrated = None;
        self.clear_storage();
        self.set_state(inner, SessionState::Expired);
    }

    fn read_storage_candidate(&self) -> Option<(Option<User>, String, Source)> {
        match storage::read_session(self.storage.as_ref()) {
            Ok(Some(state)) => state.token.map(|token| (state.user, token, Source::Storage)),
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(error = %e, "Persisted session unreadable, starting anonymous");
                None
            }
        }
    }

    /// Refresh during `initialize`, ending in `Authenticated` or `Expired`
    async fn recover(&self, token: &str) -> SessionState {
        match self.exchange(token).await {
            Ok(session) => SessionState::Authenticated(session),
            Err(e) => {
                tracing::info!(error = %e, "Could not recover stored session");
                SessionState::Expired
            }
        }
    }

    async fn authenticate(&self, credentials: &Credentials) -> Result<Session> {
        let issued = self.backend.login(credentials).await?;
        let user = self.backend.current_user(&issued.access_token).await?;
        Ok(Session {
            user,
            token: issued.access_token,
        })
    }

    async fn exchange(&self, token: &str) -> Result<Session> {
        let issued = self.backend.refresh(token).await?;
        let user = self.backend.current_user(&issued.access_token).await?;
        Ok(Session {
            user,
            token: issued.access_token,
        })
    }

    fn persist(&self, session: &Session) {
        let state = PersistedState {
            user: Some(session.user.clone()),
            token: Some(session.token.clone()),
            is_authenticated: true,
        };
        if let Err(e) = storage::write_session(self.storage.as_ref(), &state) {
            tracing::warn!(error = %e, "Failed to persist session");
        }
    }

    fn clear_storage(&self) {
        if let Err(e) = storage::clear_session(self.storage.as_ref()) {
            tracing::warn!(error = %e, "Failed to clear persisted session");
        }
    }
}

/// Marks a registration as in flight until dropped
struct Registering<'a>(&'a SessionStore);

impl<'a> Registering<'a> {
    fn start(store: &'a SessionStore) -> Self {
        store.lock().registering += 1;
        Self(store)
    }
}

impl Drop for Registering<'_> {
    fn drop(&mut self) {
        self.0.lock().registering -= 1;
    }
}
