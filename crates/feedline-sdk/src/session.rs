//! Session lifecycle.
//!
//! The session is `Unknown` until [`SessionManager::rehydrate`] has looked at
//! the stored credential, then either `Authenticated` or `Anonymous`.
//! Controllers never read ambient state: they receive a [`SessionHandle`]
//! and ask it for an [`AuthenticatedClient`] when they need one.

use std::sync::{Arc, PoisonError, RwLock, RwLockWriteGuard};

use feedline_client::{
    with_credential, AccessToken, ApiError, AuthenticatedClient, CurrentUser, FeedGateway,
    RegisterReceipt, RegisterRequest, UserId,
};
use tracing::{debug, info, warn};

use crate::credential::CredentialStore;
use crate::error::{Result, SdkError};

/// The signed-in identity and the token proving it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    user: CurrentUser,
    token: AccessToken,
}

impl Session {
    pub fn user(&self) -> &CurrentUser {
        &self.user
    }

    pub fn user_id(&self) -> UserId {
        self.user.id
    }

    pub fn username(&self) -> &str {
        &self.user.username
    }

    pub fn token(&self) -> &AccessToken {
        &self.token
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SessionState {
    /// Startup, before the stored credential has been checked
    #[default]
    Unknown,
    Anonymous,
    Authenticated(Session),
}

impl SessionState {
    pub fn session(&self) -> Option<&Session> {
        match self {
            SessionState::Authenticated(session) => Some(session),
            _ => None,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.session().is_some()
    }
}

/// Session state plus the counters that order transitions.
#[derive(Default)]
struct Slot {
    state: SessionState,
    /// Bumped whenever a transition starts
    epoch: u64,
    /// Epoch at which `state` was committed
    settled: u64,
}

struct SessionInner {
    gateway: Arc<dyn FeedGateway>,
    credentials: CredentialStore,
    slot: RwLock<Slot>,
}

impl SessionInner {
    fn read(&self) -> SessionState {
        self.slot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .state
            .clone()
    }

    fn write(&self) -> RwLockWriteGuard<'_, Slot> {
        self.slot.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start a transition. Results of older transitions become stale.
    fn begin(&self) -> u64 {
        let mut slot = self.write();
        slot.epoch += 1;
        slot.epoch
    }

    /// Start a login transition, persisting its token in the same step.
    fn begin_with_token(&self, token: &AccessToken) -> Result<u64> {
        let mut slot = self.write();
        self.credentials.save(token)?;
        slot.epoch += 1;
        Ok(slot.epoch)
    }

    /// Apply `next` unless another transition started after `epoch`.
    fn commit(&self, epoch: u64, next: SessionState) -> bool {
        let mut slot = self.write();
        if slot.epoch != epoch {
            return false;
        }
        slot.state = next;
        slot.settled = epoch;
        true
    }

    /// Give up on a transition whose credential turned out unusable.
    ///
    /// A known token is only removed if it is still the stored one. Without a
    /// token (unreadable store) the store is cleared if the transition is
    /// still current.
    fn abandon(&self, epoch: u64, token: Option<&AccessToken>) -> bool {
        let mut slot = self.write();
        let current = slot.epoch == epoch;
        match token {
            Some(token) => self.forget(token),
            None if current => self.clear_all(),
            None => {}
        }
        if current {
            slot.state = SessionState::Anonymous;
            slot.settled = epoch;
        }
        current
    }

    /// Expire the settled session if it still runs on `token`.
    fn invalidate(&self, token: &AccessToken) -> bool {
        let mut slot = self.write();
        let live = slot.epoch == slot.settled
            && slot
                .state
                .session()
                .map(|s| s.token == *token)
                .unwrap_or(false);
        if !live {
            return false;
        }
        slot.epoch += 1;
        slot.settled = slot.epoch;
        slot.state = SessionState::Anonymous;
        self.forget(token);
        true
    }

    /// Drop to `Anonymous` and forget the credential. Never fails.
    fn logout(&self) {
        let mut slot = self.write();
        slot.epoch += 1;
        slot.settled = slot.epoch;
        slot.state = SessionState::Anonymous;
        self.clear_all();
    }

    fn forget(&self, token: &AccessToken) {
        if let Err(e) = self.credentials.clear_if(token) {
            warn!(error = %e, "Failed to clear stored credential");
        }
    }

    fn clear_all(&self) {
        if let Err(e) = self.credentials.clear() {
            warn!(error = %e, "Failed to clear stored credential");
        }
    }
}

/// Cheap, cloneable view of the session for controllers.
#[derive(Clone)]
pub struct SessionHandle {
    inner: Arc<SessionInner>,
}

impl SessionHandle {
    pub fn state(&self) -> SessionState {
        self.inner.read()
    }

    pub fn current_user(&self) -> Option<CurrentUser> {
        self.state().session().map(|s| s.user.clone())
    }

    pub fn is_authenticated(&self) -> bool {
        self.state().is_authenticated()
    }

    /// Gateway for anonymous reads.
    pub fn gateway(&self) -> Arc<dyn FeedGateway> {
        self.inner.gateway.clone()
    }

    /// Token of the live session, if any.
    pub fn token(&self) -> Option<AccessToken> {
        self.state().session().map(|s| s.token.clone())
    }

    /// Client bound to the live session's credential.
    ///
    /// Fails with [`SdkError::NotAuthenticated`] while `Unknown` or `Anonymous`.
    pub fn authenticated_client(&self) -> Result<AuthenticatedClient> {
        let token = self.token().ok_or(SdkError::NotAuthenticated)?;
        Ok(with_credential(self.inner.gateway.clone(), token))
    }

    /// Expire the session if it is still the one that presented `token`.
    ///
    /// A sign-in in flight wins over a rejection of the token it replaces.
    /// The stored credential is only removed while it still holds `token`.
    /// Returns true when the session was dropped.
    pub fn invalidate(&self, token: &AccessToken) -> bool {
        let dropped = self.inner.invalidate(token);
        if dropped {
            warn!("Service rejected the session token, signing out");
        }
        dropped
    }

    /// Convert a service result, expiring the session on `Unauthorized`.
    pub(crate) fn settle<T>(
        &self,
        token: Option<&AccessToken>,
        result: std::result::Result<T, ApiError>,
    ) -> Result<T> {
        result.map_err(|err| {
            if let Some(token) = token.filter(|_| err.is_unauthorized()) {
                self.invalidate(token);
            }
            err.into()
        })
    }
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle")
            .field("state", &self.state())
            .finish()
    }
}

/// Owns the session state machine.
pub struct SessionManager {
    handle: SessionHandle,
}

impl SessionManager {
    pub fn new(gateway: Arc<dyn FeedGateway>, credentials: CredentialStore) -> Self {
        Self {
            handle: SessionHandle {
                inner: Arc::new(SessionInner {
                    gateway,
                    credentials,
                    slot: RwLock::new(Slot::default()),
                }),
            },
        }
    }

    pub fn handle(&self) -> SessionHandle {
        self.handle.clone()
    }

    pub fn state(&self) -> SessionState {
        self.handle.state()
    }

    pub fn current_user(&self) -> Option<CurrentUser> {
        self.handle.current_user()
    }

    fn inner(&self) -> &SessionInner {
        &self.handle.inner
    }

    /// Restore the session from the stored credential.
    ///
    /// Any failure to confirm the token, transport errors included, clears
    /// the credential and leaves the session `Anonymous`. If a login or
    /// logout happens meanwhile, its outcome stands and the restored
    /// identity is dropped.
    pub async fn rehydrate(&self) -> SessionState {
        let inner = self.inner();
        let epoch = inner.begin();

        let token = match inner.credentials.load() {
            Ok(Some(token)) => token,
            Ok(None) => {
                debug!("No stored credential");
                inner.commit(epoch, SessionState::Anonymous);
                return self.state();
            }
            Err(e) => {
                warn!(error = %e, "Could not read stored credential");
                inner.abandon(epoch, None);
                return self.state();
            }
        };

        match inner.gateway.fetch_current_user(&token).await {
            Ok(user) => {
                let (user_id, username) = (user.id, user.username.clone());
                if inner.commit(epoch, SessionState::Authenticated(Session { user, token })) {
                    info!(user_id, %username, "Session restored");
                } else {
                    debug!("Session changed during rehydration, dropping restored identity");
                }
            }
            Err(e) => {
                warn!(error = %e, "Stored credential rejected, clearing it");
                inner.abandon(epoch, Some(&token));
            }
        }
        self.state()
    }

    /// Sign in and persist the new credential.
    ///
    /// A rejected login leaves the state untouched. If the token is issued
    /// but the identity lookup fails, the token is discarded and the session
    /// ends up `Anonymous`. A logout or another login started while this one
    /// waits on the identity lookup wins, and this call fails with
    /// [`SdkError::SessionChanged`].
    pub async fn login(&self, email: &str, password: &str) -> Result<CurrentUser> {
        if email.trim().is_empty() || password.is_empty() {
            return Err(SdkError::Validation(
                "email and password are required".to_string(),
            ));
        }

        let inner = self.inner();
        let token = inner.gateway.login(email, password).await.map_err(|e| {
            debug!(error = %e, "Login rejected");
            SdkError::from(e)
        })?;

        let epoch = inner.begin_with_token(&token)?;

        match inner.gateway.fetch_current_user(&token).await {
            Ok(user) => {
                let session = Session {
                    user: user.clone(),
                    token: token.clone(),
                };
                if !inner.commit(epoch, SessionState::Authenticated(session)) {
                    debug!("Session changed during login, discarding its token");
                    inner.forget(&token);
                    return Err(SdkError::SessionChanged);
                }
                info!(user_id = user.id, username = %user.username, "Logged in");
                Ok(user)
            }
            Err(e) => {
                warn!(error = %e, "Token issued but identity lookup failed");
                inner.abandon(epoch, Some(&token));
                Err(e.into())
            }
        }
    }

    /// Create an account. Does not sign in.
    pub async fn register(
        &self,
        email: &str,
        username: &str,
        password: &str,
    ) -> Result<RegisterReceipt> {
        let email = email.trim();
        let username = username.trim();
        if email.is_empty() || !email.contains('@') {
            return Err(SdkError::Validation("a valid email is required".to_string()));
        }
        if username.is_empty() {
            return Err(SdkError::Validation("username is required".to_string()));
        }
        if password.is_empty() {
            return Err(SdkError::Validation("password is required".to_string()));
        }

        let receipt = self
            .inner()
            .gateway
            .register(&RegisterRequest {
                email: email.to_string(),
                username: username.to_string(),
                password: password.to_string(),
            })
            .await?;

        info!(%username, "Account registered");
        Ok(receipt)
    }

    /// Sign out locally. No network call; calling it again is harmless.
    pub fn logout(&self) {
        self.inner().logout();
        info!("Logged out");
    }
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("state", &self.state())
            .finish()
    }
}
