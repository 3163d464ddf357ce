//! Outbound requests with bearer injection and coordinated token refresh.
//!
//! When several authenticated requests fail with 401 at once, only the
//! first one starts [`SessionService::refresh`]; the others await the same
//! in-flight refresh and share its outcome. Each request is then retried at
//! most once with the refreshed token.

use std::sync::{Arc, Mutex, PoisonError};

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use thiserror::Error;
use tracing::debug;

use crate::session::{RefreshOutcome, SessionService};
use crate::transport::{ApiRequest, ApiResponse, Transport, TransportError};

/// Client errors. Every HTTP status, 401 included, is a response, not an error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientError {
    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl ClientError {
    /// True when no response reached the client.
    pub fn is_network(&self) -> bool {
        matches!(self, ClientError::Transport(TransportError::Network(_)))
    }
}

type SharedRefresh = Shared<BoxFuture<'static, RefreshOutcome>>;

/// The refresh currently in flight, tagged so a finished waiter only clears
/// its own entry.
struct InFlight {
    generation: u64,
    refresh: SharedRefresh,
}

#[derive(Default)]
struct RefreshGate {
    current: Option<InFlight>,
    generations: u64,
}

/// HTTP client that keeps authenticated calls working across token expiry.
pub struct ResilientClient {
    transport: Arc<dyn Transport>,
    session: Arc<SessionService>,
    gate: Mutex<RefreshGate>,
}

impl ResilientClient {
    pub fn new(transport: Arc<dyn Transport>, session: Arc<SessionService>) -> Self {
        Self {
            transport,
            session,
            gate: Mutex::new(RefreshGate::default()),
        }
    }

    pub fn session(&self) -> &Arc<SessionService> {
        &self.session
    }

    /// Send `request`, refreshing the session and retrying once on 401.
    ///
    /// Requests that do not require authentication go out without a
    /// credential and are returned as-is, whatever their status. When the
    /// refresh fails the original 401 response is returned.
    pub async fn send(&self, request: ApiRequest) -> Result<ApiResponse, ClientError> {
        if !request.requires_auth {
            return Ok(self.transport.execute(&request.with_bearer(None)).await?);
        }

        let used = self.session.access_token();
        let first = self
            .transport
            .execute(&request.with_bearer(used.as_deref()))
            .await?;
        if !first.is_unauthorized() {
            return Ok(first);
        }

        debug!(path = %request.path, "request unauthorized, refreshing session");
        match self.refreshed_token(used.as_deref()).await {
            Some(token) => {
                debug!(path = %request.path, "retrying with refreshed token");
                Ok(self
                    .transport
                    .execute(&request.with_bearer(Some(&token)))
                    .await?)
            }
            None => Ok(first),
        }
    }

    /// A token newer than `used`, refreshing if nobody has done so yet.
    async fn refreshed_token(&self, used: Option<&str>) -> Option<String> {
        // A refresh that finished while this request was in flight already
        // replaced the token.
        if let Some(current) = self.session.access_token()
            && Some(current.as_str()) != used
        {
            return Some(current);
        }

        let (generation, refresh) = self.join_or_start_refresh();
        let outcome = refresh.await;
        {
            let mut gate = self.gate.lock().unwrap_or_else(PoisonError::into_inner);
            if gate
                .current
                .as_ref()
                .is_some_and(|inflight| inflight.generation == generation)
            {
                gate.current = None;
            }
        }

        match outcome {
            RefreshOutcome::Refreshed => self.session.access_token(),
            RefreshOutcome::Expired => None,
        }
    }

    fn join_or_start_refresh(&self) -> (u64, SharedRefresh) {
        let mut gate = self.gate.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(inflight) = &gate.current {
            debug!(generation = inflight.generation, "joining in-flight refresh");
            return (inflight.generation, inflight.refresh.clone());
        }

        gate.generations += 1;
        let generation = gate.generations;
        let session = Arc::clone(&self.session);
        let refresh = async move { session.refresh().await }.boxed().shared();
        gate.current = Some(InFlight {
            generation,
            refresh: refresh.clone(),
        });
        debug!(generation, "starting refresh");
        (generation, refresh)
    }
}
