//! Wiring of the client components.
//!
//! There is no ambient session: everything that needs one receives the
//! [`SessionService`] held here.

use std::sync::Arc;

use crate::api::MarketplaceApi;
use crate::client::ResilientClient;
use crate::config::ClientConfig;
use crate::session::{SessionError, SessionService};
use crate::store::TokenStore;
use crate::transport::Transport;

/// The assembled client: one session, one resilient client, one API.
pub struct ClientContext {
    pub config: ClientConfig,
    pub session: Arc<SessionService>,
    pub client: Arc<ResilientClient>,
    pub api: MarketplaceApi,
}

impl ClientContext {
    /// Assemble the components around `transport` and `store`.
    ///
    /// The session status is `Anonymous` until [`SessionService::check_status`]
    /// is awaited.
    pub fn new(
        config: ClientConfig,
        transport: Arc<dyn Transport>,
        store: Arc<dyn TokenStore>,
    ) -> Result<Self, SessionError> {
        let session = Arc::new(SessionService::new(
            Arc::clone(&transport),
            store,
            &config,
        )?);
        let client = Arc::new(ResilientClient::new(transport, Arc::clone(&session)));
        let api = MarketplaceApi::new(Arc::clone(&client), config.endpoints.clone());
        Ok(Self {
            config,
            session,
            client,
            api,
        })
    }
}
