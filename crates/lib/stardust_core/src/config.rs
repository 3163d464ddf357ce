//! Client configuration.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use url::Url;

use crate::store::FileTokenStore;

/// Backend default page size (`LimitOffsetPagination.default_limit`).
pub const DEFAULT_PAGE_SIZE: u32 = 20;

/// Backend cap on `limit`.
pub const MAX_PAGE_SIZE: u32 = 100;

const DEFAULT_API_URL: &str = "http://127.0.0.1:8000";

/// Endpoint paths, relative to [`ClientConfig::base_url`].
///
/// Only the request/response shape of each endpoint is fixed; the prefixes
/// have moved between backend releases, so they live here.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Endpoints {
    pub login: String,
    pub register: String,
    pub logout: String,
    pub me: String,
    pub token_refresh: String,
    pub password_change: String,
    pub password_reset: String,
    pub verify_email: String,
    pub verify_phone: String,
    pub categories: String,
    pub locations: String,
    pub ads: String,
    pub user_ads: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        let accounts = "/accounts/api/accounts";
        let ads = "/api/v1/ads";
        Self {
            login: format!("{accounts}/login/"),
            register: format!("{accounts}/register/"),
            logout: format!("{accounts}/logout/"),
            me: format!("{accounts}/me/"),
            token_refresh: format!("{accounts}/token/refresh/"),
            password_change: format!("{accounts}/password/change/"),
            password_reset: format!("{accounts}/password/reset/"),
            verify_email: format!("{accounts}/verify/email/"),
            verify_phone: format!("{accounts}/verify/phone/"),
            categories: format!("{ads}/categories/"),
            locations: format!("{ads}/locations/"),
            ads: format!("{ads}/ads/"),
            user_ads: format!("{ads}/user/ads/"),
        }
    }
}

impl Endpoints {
    /// Path of a single ad, e.g. `/api/v1/ads/ads/42/`.
    pub fn ad(&self, id: u64) -> String {
        format!("{}{id}/", self.ads)
    }

    /// Path of an action on a single ad, e.g. `/api/v1/ads/ads/42/deactivate/`.
    pub fn ad_action(&self, id: u64, action: &str) -> String {
        format!("{}{id}/{action}/", self.ads)
    }
}

/// Configuration for the marketplace client.
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// Backend origin, e.g. `https://stardust.example`.
    pub base_url: Url,
    /// Ads per page; sent as `limit` on every listing request.
    pub page_size: u32,
    /// Timeout applied to every HTTP request.
    pub request_timeout: Duration,
    /// Upper bound on the best-effort logout call.
    pub logout_timeout: Duration,
    /// Location of the persisted session file.
    pub token_file: PathBuf,
    pub endpoints: Endpoints,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: Url::parse(DEFAULT_API_URL).expect("default API URL is valid"),
            page_size: DEFAULT_PAGE_SIZE,
            request_timeout: Duration::from_secs(30),
            logout_timeout: Duration::from_secs(5),
            token_file: FileTokenStore::default_path(),
            endpoints: Endpoints::default(),
        }
    }
}

impl ClientConfig {
    /// Reads configuration from environment variables with sensible defaults.
    ///
    /// | Variable                       | Default                              |
    /// |--------------------------------|--------------------------------------|
    /// | `STARDUST_API_URL`             | `http://127.0.0.1:8000`              |
    /// | `STARDUST_PAGE_SIZE`           | `20` (clamped to 1..=100)            |
    /// | `STARDUST_TIMEOUT_SECS`        | `30`                                 |
    /// | `STARDUST_LOGOUT_TIMEOUT_SECS` | `5`                                  |
    /// | `STARDUST_TOKEN_FILE`          | `<data_dir>/stardust/session.json`   |
    ///
    /// Unparseable values fall back to the default.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            base_url: env::var("STARDUST_API_URL")
                .ok()
                .and_then(|v| Url::parse(&v).ok())
                .unwrap_or(defaults.base_url),
            page_size: env::var("STARDUST_PAGE_SIZE")
                .ok()
                .and_then(|v| v.parse::<u32>().ok())
                .map(clamp_page_size)
                .unwrap_or(defaults.page_size),
            request_timeout: env_secs("STARDUST_TIMEOUT_SECS").unwrap_or(defaults.request_timeout),
            logout_timeout: env_secs("STARDUST_LOGOUT_TIMEOUT_SECS")
                .unwrap_or(defaults.logout_timeout),
            token_file: env::var("STARDUST_TOKEN_FILE")
                .ok()
                .filter(|v| !v.is_empty())
                .map(PathBuf::from)
                .unwrap_or(defaults.token_file),
            endpoints: defaults.endpoints,
        }
    }

    /// Builder-style override of the backend origin.
    pub fn with_base_url(mut self, base_url: Url) -> Self {
        self.base_url = base_url;
        self
    }

    /// Builder-style override of the page size (clamped to 1..=100).
    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = clamp_page_size(page_size);
        self
    }
}

fn clamp_page_size(n: u32) -> u32 {
    n.clamp(1, MAX_PAGE_SIZE)
}

fn env_secs(name: &str) -> Option<Duration> {
    env::var(name)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map(Duration::from_secs)
}
