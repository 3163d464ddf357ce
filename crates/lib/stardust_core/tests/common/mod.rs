//! In-process fake of the marketplace backend for integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use stardust_core::config::{ClientConfig, Endpoints};
use stardust_core::context::ClientContext;
use stardust_core::store::{MemoryTokenStore, StoreKey, TokenStore};
use stardust_core::transport::{
    ApiRequest, ApiResponse, Method, RequestBody, StatusCode, Transport, TransportError,
};

pub const EMAIL: &str = "jane@example.com";
pub const PASSWORD: &str = "correct-horse";
pub const REFRESH: &str = "refresh-1";

#[derive(Default)]
struct BackendState {
    /// Access token the server currently accepts.
    valid_access: Option<String>,
    issued: u32,
    refresh_accepted: bool,
    offline: bool,
    full_name: String,
    /// Paths answered with 401 regardless of credentials.
    always_unauthorized: Vec<String>,
    /// Per-path artificial latency.
    delays: HashMap<String, Duration>,
    /// Per-path responses that replace the normal route handling.
    canned: HashMap<String, ApiResponse>,
    /// Per-path one-shot failures: the next call waits, then fails.
    failures: HashMap<String, Duration>,
    calls: Vec<ApiRequest>,
}

/// Fake backend speaking the default [`Endpoints`] routes.
pub struct FakeBackend {
    endpoints: Endpoints,
    state: Mutex<BackendState>,
}

impl FakeBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            endpoints: Endpoints::default(),
            state: Mutex::new(BackendState {
                refresh_accepted: true,
                full_name: "Jane Doe".into(),
                ..BackendState::default()
            }),
        })
    }

    /// Issue a fresh access token and make it the only valid one.
    pub fn issue_access(&self) -> String {
        let mut s = self.state.lock().unwrap();
        s.issued += 1;
        let token = format!("access-{}", s.issued);
        s.valid_access = Some(token.clone());
        token
    }

    /// Expire the current access token (the refresh token stays valid).
    pub fn expire_access(&self) {
        self.state.lock().unwrap().valid_access = None;
    }

    pub fn reject_refresh(&self) {
        self.state.lock().unwrap().refresh_accepted = false;
    }

    pub fn set_offline(&self, offline: bool) {
        self.state.lock().unwrap().offline = offline;
    }

    pub fn always_unauthorized(&self, path: &str) {
        self.state
            .lock()
            .unwrap()
            .always_unauthorized
            .push(path.to_string());
    }

    pub fn delay(&self, path: &str, delay: Duration) {
        self.state
            .lock()
            .unwrap()
            .delays
            .insert(path.to_string(), delay);
    }

    /// Answer every call to `path` with `response`.
    pub fn respond_with(&self, path: &str, response: ApiResponse) {
        self.state
            .lock()
            .unwrap()
            .canned
            .insert(path.to_string(), response);
    }

    /// Make the next call to `path` fail with a network error after `after`.
    pub fn fail_next(&self, path: &str, after: Duration) {
        self.state
            .lock()
            .unwrap()
            .failures
            .insert(path.to_string(), after);
    }

    pub fn calls(&self) -> Vec<ApiRequest> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn calls_to(&self, path: &str) -> Vec<ApiRequest> {
        self.calls().into_iter().filter(|r| r.path == path).collect()
    }

    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    fn handle(&self, req: &ApiRequest) -> Result<ApiResponse, TransportError> {
        let mut s = self.state.lock().unwrap();
        s.calls.push(req.clone());
        if s.offline {
            return Err(TransportError::Network("connection refused".into()));
        }
        if s.always_unauthorized.contains(&req.path) {
            return Ok(unauthorized());
        }
        if let Some(resp) = s.canned.get(&req.path) {
            return Ok(resp.clone());
        }

        let ep = &self.endpoints;
        let authorized = req.bearer.is_some() && req.bearer == s.valid_access;
        let body = match &req.body {
            RequestBody::Json(v) => v.clone(),
            _ => Value::Null,
        };

        let resp = if req.path == ep.login {
            let id_ok = body["email"] == EMAIL || body["phone"] == "+14165550100";
            if id_ok && body["password"] == PASSWORD {
                s.issued += 1;
                let access = format!("access-{}", s.issued);
                s.valid_access = Some(access.clone());
                ok(json!({ "access": access, "refresh": REFRESH }))
            } else {
                ApiResponse::json_body(
                    StatusCode::UNAUTHORIZED,
                    &json!({ "error": { "code": "INVALID_CREDENTIALS",
                                        "message": "Invalid email or password" } }),
                )
            }
        } else if req.path == ep.register {
            if body["email"] == EMAIL {
                ApiResponse::json_body(
                    StatusCode::BAD_REQUEST,
                    &json!({ "message": "A user with this email already exists." }),
                )
            } else {
                ApiResponse::json_body(StatusCode::CREATED, &json!({ "id": 2 }))
            }
        } else if req.path == ep.token_refresh {
            if s.refresh_accepted && body["refresh"] == REFRESH {
                s.issued += 1;
                let access = format!("access-{}", s.issued);
                s.valid_access = Some(access.clone());
                ok(json!({ "access": access }))
            } else {
                ApiResponse::json_body(
                    StatusCode::UNAUTHORIZED,
                    &json!({ "detail": "Token is invalid or expired" }),
                )
            }
        } else if req.path == ep.logout {
            if authorized {
                ok(json!({ "message": "Successfully logged out" }))
            } else {
                unauthorized()
            }
        } else if req.path == ep.me {
            if !authorized {
                unauthorized()
            } else {
                if req.method == Method::PATCH
                    && let Some(name) = body["full_name"].as_str()
                {
                    s.full_name = name.to_string();
                }
                ok(profile(&s.full_name))
            }
        } else if req.path == ep.categories {
            ok(json!([
                { "id": 1, "name": "Vehicles", "slug": "vehicles",
                  "subcategories": [ { "id": 10, "name": "Cars", "slug": "cars" },
                                     { "id": 11, "name": "Bikes", "slug": "bikes" } ] }
            ]))
        } else if req.path == ep.locations {
            ok(json!([
                { "id": 1, "name": "Canada", "code": "CA", "currency_code": "CAD",
                  "provinces": [ { "id": 5, "name": "Ontario",
                                   "cities": [ { "id": 9, "name": "Toronto" } ] } ] }
            ]))
        } else if req.path == ep.ads && req.method == Method::GET {
            let offset: u64 = req
                .query
                .iter()
                .find(|(k, _)| k == "offset")
                .and_then(|(_, v)| v.parse().ok())
                .unwrap_or(0);
            ok(json!({
                "data": [ { "id": 100 + offset, "title": "Road bike", "price": "$ 250.00",
                            "location": "Toronto, Ontario" } ],
                "pagination": { "total": 45, "limit": 20, "offset": offset,
                                "has_next": offset + 20 < 45, "has_previous": offset > 0 }
            }))
        } else if req.path == ep.password_reset {
            ok(json!({ "message": "Password reset instructions sent" }))
        } else if req.path == ep.verify_email {
            if body["key"] == "good-key" {
                ok(json!({ "message": "Email verified" }))
            } else {
                ApiResponse::json_body(
                    StatusCode::BAD_REQUEST,
                    &json!({ "message": "Invalid or expired verification key" }),
                )
            }
        } else if !authorized {
            unauthorized()
        } else if req.path == ep.password_change {
            if body["current_password"] == PASSWORD {
                ok(json!({ "message": "Password changed" }))
            } else {
                ApiResponse::json_body(
                    StatusCode::BAD_REQUEST,
                    &json!({ "message": "Current password is incorrect" }),
                )
            }
        } else if req.path == ep.user_ads {
            ok(json!({
                "data": [ { "id": 7, "title": "My sofa" } ],
                "pagination": { "total": 1, "limit": 20, "offset": 0,
                                "has_next": false, "has_previous": false }
            }))
        } else if req.path == ep.ads && req.method == Method::POST {
            let mut created = body.clone();
            created["id"] = json!(501);
            ApiResponse::json_body(StatusCode::CREATED, &created)
        } else if req.path == ep.ad_action(501, "upload-media") {
            let count = match &req.body {
                RequestBody::Multipart(fields) => fields.len(),
                _ => 0,
            };
            ok(json!({ "uploaded": count }))
        } else {
            ApiResponse::json_body(StatusCode::NOT_FOUND, &json!({ "detail": "Not found." }))
        };
        Ok(resp)
    }
}

fn ok(value: Value) -> ApiResponse {
    ApiResponse::json_body(StatusCode::OK, &value)
}

fn unauthorized() -> ApiResponse {
    ApiResponse::json_body(
        StatusCode::UNAUTHORIZED,
        &json!({ "detail": "Authentication credentials were not provided." }),
    )
}

fn profile(full_name: &str) -> Value {
    json!({
        "id": 1, "email": EMAIL, "phone_number": "+14165550100", "full_name": full_name,
        "role": "user", "is_verified": true, "email_verified": true, "phone_verified": false
    })
}

#[async_trait]
impl Transport for FakeBackend {
    async fn execute(&self, request: &ApiRequest) -> Result<ApiResponse, TransportError> {
        let failure = self.state.lock().unwrap().failures.remove(&request.path);
        if let Some(after) = failure {
            self.state.lock().unwrap().calls.push(request.clone());
            tokio::time::sleep(after).await;
            return Err(TransportError::Network("connection reset".into()));
        }
        let delay = self.state.lock().unwrap().delays.get(&request.path).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.handle(request)
    }
}

pub fn test_config() -> ClientConfig {
    ClientConfig {
        logout_timeout: Duration::from_millis(200),
        ..ClientConfig::default()
    }
}

/// Context over `backend` with an empty in-memory token store.
pub fn context(backend: &Arc<FakeBackend>) -> (ClientContext, Arc<MemoryTokenStore>) {
    context_with_store(backend, Arc::new(MemoryTokenStore::new()))
}

pub fn context_with_store(
    backend: &Arc<FakeBackend>,
    store: Arc<MemoryTokenStore>,
) -> (ClientContext, Arc<MemoryTokenStore>) {
    let ctx = ClientContext::new(
        test_config(),
        Arc::clone(backend) as Arc<dyn Transport>,
        Arc::clone(&store) as Arc<dyn TokenStore>,
    )
    .unwrap();
    (ctx, store)
}

/// Context already signed in as [`EMAIL`].
pub async fn signed_in(backend: &Arc<FakeBackend>) -> (ClientContext, Arc<MemoryTokenStore>) {
    let (ctx, store) = context(backend);
    let outcome = ctx.session.login(EMAIL, PASSWORD).await.unwrap();
    assert!(outcome.is_success(), "login failed: {outcome:?}");
    (ctx, store)
}

pub fn stored(store: &MemoryTokenStore, key: StoreKey) -> Option<String> {
    store.get(key).unwrap()
}
