//! Typed marketplace endpoints on top of [`ResilientClient`].

use std::sync::Arc;

use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::debug;

use crate::client::{ClientError, ResilientClient};
use crate::config::Endpoints;
use crate::filters::{FilterState, LatestRequest};
use crate::hierarchy::HierarchyNode;
use crate::models::{AdDetail, AdListingBody, AdPage, MediaFile, NewAd};
use crate::session::SessionStatus;
use crate::transport::{
    ApiRequest, ApiResponse, MultipartField, MultipartValue, StatusCode, TransportError,
};

/// Marketplace API errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    #[error("Not signed in")]
    Unauthenticated,

    #[error("Session expired, please sign in again")]
    SessionExpired,

    #[error("Request rejected ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Malformed server payload: {0}")]
    MalformedPayload(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl From<ClientError> for ApiError {
    fn from(e: ClientError) -> Self {
        match e {
            ClientError::Transport(TransportError::Network(msg)) => ApiError::Network(msg),
            ClientError::Transport(TransportError::InvalidRequest(msg)) => {
                ApiError::InvalidRequest(msg)
            }
        }
    }
}

/// Marketplace endpoints: categories, locations and ads.
#[derive(Clone)]
pub struct MarketplaceApi {
    client: Arc<ResilientClient>,
    endpoints: Endpoints,
}

impl MarketplaceApi {
    pub fn new(client: Arc<ResilientClient>, endpoints: Endpoints) -> Self {
        Self { client, endpoints }
    }

    pub fn client(&self) -> &Arc<ResilientClient> {
        &self.client
    }

    // -------------------------------------------------------------------------
    // Public reads
    // -------------------------------------------------------------------------

    /// Category → subcategory tree.
    pub async fn categories(&self) -> Result<Vec<HierarchyNode>, ApiError> {
        self.fetch(ApiRequest::get(&self.endpoints.categories)).await
    }

    /// Country → province → city tree.
    pub async fn locations(&self) -> Result<Vec<HierarchyNode>, ApiError> {
        self.fetch(ApiRequest::get(&self.endpoints.locations)).await
    }

    /// One page of ads matching `filters`.
    pub async fn list_ads(&self, filters: &FilterState) -> Result<AdPage, ApiError> {
        let request = ApiRequest::get(&self.endpoints.ads).query(filters.api_params());
        let body: AdListingBody = self.fetch(request).await?;
        Ok(body.into_page(filters.offset()))
    }

    /// Like [`Self::list_ads`], but yields `None` when a later fetch was
    /// issued on `latest` before this one completed, whether this one
    /// succeeded or failed.
    pub async fn list_ads_latest(
        &self,
        filters: &FilterState,
        latest: &LatestRequest,
    ) -> Result<Option<AdPage>, ApiError> {
        let ticket = latest.issue();
        let result = self.list_ads(filters).await;
        if !latest.is_current(ticket) {
            debug!(?ticket, ok = result.is_ok(), "discarding superseded listing response");
            return Ok(None);
        }
        result.map(Some)
    }

    pub async fn ad(&self, id: u64) -> Result<AdDetail, ApiError> {
        self.fetch(ApiRequest::get(self.endpoints.ad(id))).await
    }

    // -------------------------------------------------------------------------
    // Authenticated
    // -------------------------------------------------------------------------

    /// Ads posted by the signed-in user.
    pub async fn user_ads(&self) -> Result<AdPage, ApiError> {
        let body: AdListingBody = self
            .fetch(ApiRequest::get(&self.endpoints.user_ads).authenticated())
            .await?;
        Ok(body.into_page(0))
    }

    /// Post a new ad; returns the created record as sent back by the server.
    pub async fn create_ad(&self, ad: &NewAd) -> Result<serde_json::Value, ApiError> {
        let body = serde_json::to_value(ad)
            .map_err(|e| ApiError::MalformedPayload(format!("new ad: {e}")))?;
        self.fetch(
            ApiRequest::post(&self.endpoints.ads)
                .authenticated()
                .json(body),
        )
        .await
    }

    /// Partially update an ad.
    pub async fn update_ad(
        &self,
        id: u64,
        fields: serde_json::Value,
    ) -> Result<serde_json::Value, ApiError> {
        self.fetch(
            ApiRequest::patch(self.endpoints.ad(id))
                .authenticated()
                .json(fields),
        )
        .await
    }

    pub async fn delete_ad(&self, id: u64) -> Result<(), ApiError> {
        self.execute(ApiRequest::delete(self.endpoints.ad(id)).authenticated())
            .await
            .map(drop)
    }

    /// Attach images to an ad as `multipart/form-data` (`files[]`).
    pub async fn upload_media(
        &self,
        id: u64,
        files: &[MediaFile],
    ) -> Result<serde_json::Value, ApiError> {
        let fields = files
            .iter()
            .map(|file| MultipartField {
                name: "files[]".to_string(),
                value: MultipartValue::File {
                    file_name: file.file_name.clone(),
                    content_type: file.content_type.clone(),
                    bytes: file.bytes.clone(),
                },
            })
            .collect();
        self.fetch(
            ApiRequest::post(self.endpoints.ad_action(id, "upload-media"))
                .authenticated()
                .multipart(fields),
        )
        .await
    }

    pub async fn deactivate_ad(&self, id: u64) -> Result<(), ApiError> {
        self.execute(ApiRequest::post(self.endpoints.ad_action(id, "deactivate")).authenticated())
            .await
            .map(drop)
    }

    pub async fn reactivate_ad(&self, id: u64) -> Result<(), ApiError> {
        self.execute(ApiRequest::post(self.endpoints.ad_action(id, "reactivate")).authenticated())
            .await
            .map(drop)
    }

    // -------------------------------------------------------------------------
    // Helpers
    // -------------------------------------------------------------------------

    async fn fetch<T: DeserializeOwned>(&self, request: ApiRequest) -> Result<T, ApiError> {
        let path = request.path.clone();
        let resp = self.execute(request).await?;
        resp.json()
            .map_err(|e| ApiError::MalformedPayload(format!("{path}: {e}")))
    }

    /// Send and map non-2xx statuses to [`ApiError`].
    async fn execute(&self, request: ApiRequest) -> Result<ApiResponse, ApiError> {
        let requires_auth = request.requires_auth;
        let had_token = self.client.session().access_token().is_some();
        let resp = self.client.send(request).await?;
        if resp.is_success() {
            return Ok(resp);
        }
        if resp.status == StatusCode::UNAUTHORIZED && requires_auth {
            let cleared = self.client.session().status() == SessionStatus::Anonymous
                && self.client.session().access_token().is_none();
            return Err(if had_token && cleared {
                ApiError::SessionExpired
            } else {
                ApiError::Unauthenticated
            });
        }
        Err(ApiError::Rejected {
            status: resp.status.as_u16(),
            message: resp
                .error_message()
                .unwrap_or_else(|| resp.status.to_string()),
        })
    }
}
