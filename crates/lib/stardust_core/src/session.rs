//! Authentication state and credential lifecycle.
//!
//! [`SessionService`] is the single owner of session state and the only
//! writer of the [`TokenStore`]. Expected failures (bad credentials,
//! expired session, network loss) come back as [`AuthOutcome`] values;
//! only malformed payloads and storage faults are `Err`.
//!
//! ```text
//! Anonymous ──login/check──▶ Authenticating ──▶ Authenticated
//! Authenticated ──refresh──▶ Refreshing ──▶ Authenticated | Anonymous
//! any ──logout──▶ Anonymous
//! ```

use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use serde_json::json;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::config::{ClientConfig, Endpoints};
use crate::identifier::Identifier;
use crate::models::{AccessToken, ProfileUpdate, Registration, TokenPair, UserProfile};
use crate::store::{StoreError, StoreKey, TokenStore};
use crate::transport::{ApiRequest, ApiResponse, Transport};

const REGISTERED_MESSAGE: &str = "Registration successful! Please verify your email/phone.";

/// Hard session failures.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Malformed server payload: {0}")]
    MalformedPayload(String),

    #[error("Token store error: {0}")]
    Storage(#[from] StoreError),
}

/// Where the session is in its lifecycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SessionStatus {
    #[default]
    Anonymous,
    Authenticating,
    Authenticated,
    Refreshing,
}

/// In-memory session, mirroring the token store.
///
/// `Authenticated` implies both `access_token` and `user` are present.
#[derive(Clone, Default, PartialEq)]
pub struct Session {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub user: Option<UserProfile>,
    pub status: SessionStatus,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("access_token", &self.access_token.as_ref().map(|_| "<redacted>"))
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
            .field("user", &self.user)
            .field("status", &self.status)
            .finish()
    }
}

/// Result of a user-facing account operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthOutcome {
    Success { message: Option<String> },
    /// The server (or local input checks) refused; `message` is shown verbatim.
    Rejected { status: Option<u16>, message: String },
    /// No response reached the client.
    NetworkFailure { message: String },
}

impl AuthOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, AuthOutcome::Success { .. })
    }

    fn rejected(message: impl Into<String>) -> Self {
        AuthOutcome::Rejected {
            status: None,
            message: message.into(),
        }
    }
}

/// Result of exchanging the refresh token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    Refreshed,
    /// No refresh token, or the server refused it. The session is cleared.
    Expired,
}

/// Owns authentication state; see the module docs for the state machine.
pub struct SessionService {
    transport: Arc<dyn Transport>,
    store: Arc<dyn TokenStore>,
    endpoints: Endpoints,
    logout_timeout: Duration,
    state: RwLock<Session>,
    status_tx: watch::Sender<SessionStatus>,
}

impl SessionService {
    /// Build a service, seeding in-memory tokens from `store`.
    ///
    /// The status starts as `Anonymous` until [`Self::check_status`] runs.
    pub fn new(
        transport: Arc<dyn Transport>,
        store: Arc<dyn TokenStore>,
        config: &ClientConfig,
    ) -> Result<Self, SessionError> {
        let session = Session {
            access_token: store.get(StoreKey::AccessToken)?,
            refresh_token: store.get(StoreKey::RefreshToken)?,
            user: None,
            status: SessionStatus::Anonymous,
        };
        let (status_tx, _) = watch::channel(SessionStatus::Anonymous);
        Ok(Self {
            transport,
            store,
            endpoints: config.endpoints.clone(),
            logout_timeout: config.logout_timeout,
            state: RwLock::new(session),
            status_tx,
        })
    }

    // -------------------------------------------------------------------------
    // Read access
    // -------------------------------------------------------------------------

    pub fn session(&self) -> Session {
        self.state.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn status(&self) -> SessionStatus {
        self.state.read().unwrap_or_else(PoisonError::into_inner).status
    }

    pub fn is_authenticated(&self) -> bool {
        self.status() == SessionStatus::Authenticated
    }

    pub fn user(&self) -> Option<UserProfile> {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .user
            .clone()
    }

    pub fn access_token(&self) -> Option<String> {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .access_token
            .clone()
    }

    /// Watch status transitions (e.g. a forced logout after refresh failure).
    pub fn subscribe(&self) -> watch::Receiver<SessionStatus> {
        self.status_tx.subscribe()
    }

    fn update(&self, f: impl FnOnce(&mut Session)) {
        let status = {
            let mut session = self.state.write().unwrap_or_else(PoisonError::into_inner);
            let before = session.status;
            f(&mut session);
            if session.status != before {
                info!(from = ?before, to = ?session.status, "session status changed");
            }
            session.status
        };
        self.status_tx.send_replace(status);
    }

    fn set_status(&self, status: SessionStatus) {
        self.update(|s| s.status = status);
    }

    // -------------------------------------------------------------------------
    // Lifecycle
    // -------------------------------------------------------------------------

    /// Validate the stored access token against the "current user" endpoint.
    ///
    /// No token: `Anonymous` without a network call. Any failure clears the
    /// stored tokens. A 2xx with an unreadable profile clears them too and is
    /// reported as [`SessionError::MalformedPayload`].
    pub async fn check_status(&self) -> Result<SessionStatus, SessionError> {
        let Some(token) = self.store.get(StoreKey::AccessToken)? else {
            self.update(|s| *s = Session::default());
            return Ok(SessionStatus::Anonymous);
        };
        self.set_status(SessionStatus::Authenticating);

        let request = ApiRequest::get(&self.endpoints.me)
            .authenticated()
            .with_bearer(Some(&token));
        let profile = match self.transport.execute(&request).await {
            Ok(resp) if resp.is_success() => resp.json::<UserProfile>().map_err(|e| {
                SessionError::MalformedPayload(format!("current user: {e}"))
            }),
            Ok(resp) => {
                debug!(status = resp.status.as_u16(), "stored token rejected");
                self.clear_local()?;
                return Ok(SessionStatus::Anonymous);
            }
            Err(e) => {
                warn!(error = %e, "status check failed, treating token as invalid");
                self.clear_local()?;
                return Ok(SessionStatus::Anonymous);
            }
        };
        let profile = match profile {
            Ok(p) => p,
            Err(e) => {
                self.clear_local()?;
                return Err(e);
            }
        };

        if let Some(id) = profile.id_string() {
            self.store.set(StoreKey::UserId, &id)?;
        }
        let refresh = self.store.get(StoreKey::RefreshToken)?;
        info!(user = profile.display_name(), "session authenticated");
        self.update(|s| {
            s.access_token = Some(token);
            s.refresh_token = refresh;
            s.user = Some(profile);
            s.status = SessionStatus::Authenticated;
        });
        Ok(SessionStatus::Authenticated)
    }

    /// Sign in with an email or E.164 phone number.
    pub async fn login(&self, identifier: &str, password: &str) -> Result<AuthOutcome, SessionError> {
        let Some(identifier) = Identifier::parse(identifier) else {
            return Ok(AuthOutcome::rejected(
                "Enter a valid email address or phone number (e.g. +14165550100)",
            ));
        };
        let previous = self.status();
        self.set_status(SessionStatus::Authenticating);

        let mut body = serde_json::Map::new();
        body.insert(identifier.field().to_string(), json!(identifier.value()));
        body.insert("password".to_string(), json!(password));
        let request = ApiRequest::post(&self.endpoints.login).json(body.into());
        let resp = match self.call(&request, "Login failed").await {
            Ok(resp) => resp,
            Err(outcome) => {
                self.set_status(previous);
                return Ok(outcome);
            }
        };
        let tokens: TokenPair = match resp.json() {
            Ok(tokens) => tokens,
            Err(e) => {
                self.set_status(previous);
                return Err(SessionError::MalformedPayload(format!("login: {e}")));
            }
        };

        self.store.set(StoreKey::AccessToken, &tokens.access)?;
        self.store.set(StoreKey::RefreshToken, &tokens.refresh)?;
        self.update(|s| {
            s.access_token = Some(tokens.access);
            s.refresh_token = Some(tokens.refresh);
        });

        match self.check_status().await? {
            SessionStatus::Authenticated => Ok(AuthOutcome::Success { message: None }),
            _ => Ok(AuthOutcome::rejected(
                "Signed in, but the profile could not be loaded",
            )),
        }
    }

    /// Create an account. Does not sign in.
    pub async fn register(&self, registration: &Registration) -> Result<AuthOutcome, SessionError> {
        let body = serde_json::to_value(registration)
            .map_err(|e| SessionError::MalformedPayload(format!("registration: {e}")))?;
        let request = ApiRequest::post(&self.endpoints.register).json(body);
        Ok(match self.call(&request, "Registration failed").await {
            Ok(_) => AuthOutcome::Success {
                message: Some(REGISTERED_MESSAGE.to_string()),
            },
            Err(outcome) => outcome,
        })
    }

    /// Sign out. Local state is always cleared; the server call is
    /// best-effort and bounded by the logout timeout.
    pub async fn logout(&self) -> Result<(), SessionError> {
        let (access, refresh) = {
            let s = self.state.read().unwrap_or_else(PoisonError::into_inner);
            (s.access_token.clone(), s.refresh_token.clone())
        };

        if let Some(token) = access {
            let request = ApiRequest::post(&self.endpoints.logout)
                .authenticated()
                .json(json!({ "refresh_token": refresh }))
                .with_bearer(Some(&token));
            match tokio::time::timeout(self.logout_timeout, self.transport.execute(&request)).await
            {
                Ok(Ok(resp)) if resp.is_success() => debug!("server acknowledged logout"),
                Ok(Ok(resp)) => warn!(status = resp.status.as_u16(), "logout rejected by server"),
                Ok(Err(e)) => warn!(error = %e, "logout request failed"),
                Err(_) => warn!(timeout = ?self.logout_timeout, "logout request timed out"),
            }
        }

        self.clear_local()?;
        info!("signed out");
        Ok(())
    }

    /// Drop tokens and profile without contacting the server.
    ///
    /// The in-memory session is reset even if the store cannot be cleared.
    fn clear_local(&self) -> Result<(), SessionError> {
        let cleared = self.store.clear();
        self.update(|s| *s = Session::default());
        cleared.map_err(SessionError::from)
    }

    /// Exchange the refresh token for a new access token.
    ///
    /// Any failure forces a logout. Not safe to run concurrently with
    /// itself; [`ResilientClient`] serializes callers.
    ///
    /// [`ResilientClient`]: crate::client::ResilientClient
    pub async fn refresh(&self) -> RefreshOutcome {
        let refresh = match self.store.get(StoreKey::RefreshToken) {
            Ok(Some(token)) => token,
            Ok(None) => {
                debug!("no refresh token stored");
                self.force_logout().await;
                return RefreshOutcome::Expired;
            }
            Err(e) => {
                warn!(error = %e, "could not read refresh token");
                self.force_logout().await;
                return RefreshOutcome::Expired;
            }
        };

        let previous = self.status();
        self.set_status(SessionStatus::Refreshing);
        debug!("refreshing access token");

        let request =
            ApiRequest::post(&self.endpoints.token_refresh).json(json!({ "refresh": refresh }));
        let renewed = match self.transport.execute(&request).await {
            Ok(resp) if resp.is_success() => match resp.json::<AccessToken>() {
                Ok(body) => Some(body),
                Err(e) => {
                    warn!(error = %e, "malformed refresh response");
                    None
                }
            },
            Ok(resp) => {
                debug!(status = resp.status.as_u16(), "refresh token rejected");
                None
            }
            Err(e) => {
                warn!(error = %e, "refresh request failed");
                None
            }
        };
        let Some(renewed) = renewed else {
            self.force_logout().await;
            return RefreshOutcome::Expired;
        };

        let persisted = self
            .store
            .set(StoreKey::AccessToken, &renewed.access)
            .and_then(|()| match &renewed.refresh {
                Some(rotated) => self.store.set(StoreKey::RefreshToken, rotated),
                None => Ok(()),
            });
        if let Err(e) = persisted {
            warn!(error = %e, "could not persist refreshed token");
            self.force_logout().await;
            return RefreshOutcome::Expired;
        }

        self.update(|s| {
            s.access_token = Some(renewed.access);
            if let Some(rotated) = renewed.refresh {
                s.refresh_token = Some(rotated);
            }
            s.status = if s.user.is_some() {
                SessionStatus::Authenticated
            } else {
                previous
            };
        });
        info!("access token refreshed");
        RefreshOutcome::Refreshed
    }

    async fn force_logout(&self) {
        if let Err(e) = self.logout().await {
            warn!(error = %e, "forced logout could not clear token store");
        }
    }

    // -------------------------------------------------------------------------
    // Account maintenance
    // -------------------------------------------------------------------------

    /// Partially update the signed-in user's profile.
    pub async fn update_profile(&self, update: &ProfileUpdate) -> Result<AuthOutcome, SessionError> {
        let Some(token) = self.access_token() else {
            return Ok(AuthOutcome::rejected("Not signed in"));
        };
        let body = serde_json::to_value(update)
            .map_err(|e| SessionError::MalformedPayload(format!("profile update: {e}")))?;
        let request = ApiRequest::patch(&self.endpoints.me)
            .authenticated()
            .json(body)
            .with_bearer(Some(&token));
        let resp = match self.call(&request, "Update failed").await {
            Ok(resp) => resp,
            Err(outcome) => return Ok(outcome),
        };
        let profile: UserProfile = resp
            .json()
            .map_err(|e| SessionError::MalformedPayload(format!("profile update: {e}")))?;
        self.update(|s| s.user = Some(profile));
        Ok(AuthOutcome::Success { message: None })
    }

    pub async fn change_password(
        &self,
        current_password: &str,
        new_password: &str,
    ) -> Result<AuthOutcome, SessionError> {
        let Some(token) = self.access_token() else {
            return Ok(AuthOutcome::rejected("Not signed in"));
        };
        let request = ApiRequest::post(&self.endpoints.password_change)
            .authenticated()
            .json(json!({
                "current_password": current_password,
                "new_password": new_password,
            }))
            .with_bearer(Some(&token));
        Ok(self.acknowledge(&request, "Password change failed").await)
    }

    /// Ask for password reset instructions.
    pub async fn reset_password(&self, identifier: &str) -> Result<AuthOutcome, SessionError> {
        let Some(identifier) = Identifier::parse(identifier) else {
            return Ok(AuthOutcome::rejected(
                "Enter a valid email address or phone number",
            ));
        };
        let request = ApiRequest::post(&self.endpoints.password_reset)
            .json(json!({ "phone_or_email": identifier.value() }));
        Ok(self.acknowledge(&request, "Password reset failed").await)
    }

    pub async fn verify_email(&self, key: &str) -> Result<AuthOutcome, SessionError> {
        let request = ApiRequest::post(&self.endpoints.verify_email).json(json!({ "key": key }));
        Ok(self.acknowledge(&request, "Email verification failed").await)
    }

    pub async fn verify_phone(&self, phone: &str, otp: &str) -> Result<AuthOutcome, SessionError> {
        let request = ApiRequest::post(&self.endpoints.verify_phone)
            .json(json!({ "phone": phone, "otp": otp }));
        Ok(self.acknowledge(&request, "Phone verification failed").await)
    }

    // -------------------------------------------------------------------------
    // Helpers
    // -------------------------------------------------------------------------

    /// Send `request`; a non-2xx or missing response becomes the outcome to
    /// hand back to the caller.
    async fn call(&self, request: &ApiRequest, fallback: &str) -> Result<ApiResponse, AuthOutcome> {
        match self.transport.execute(request).await {
            Ok(resp) if resp.is_success() => Ok(resp),
            Ok(resp) => Err(AuthOutcome::Rejected {
                status: Some(resp.status.as_u16()),
                message: resp.error_message().unwrap_or_else(|| fallback.to_string()),
            }),
            Err(e) => Err(AuthOutcome::NetworkFailure {
                message: e.to_string(),
            }),
        }
    }

    /// Like [`Self::call`], reporting the server's message on success.
    async fn acknowledge(&self, request: &ApiRequest, fallback: &str) -> AuthOutcome {
        match self.call(request, fallback).await {
            Ok(resp) => AuthOutcome::Success {
                message: resp.error_message(),
            },
            Err(outcome) => outcome,
        }
    }
}
