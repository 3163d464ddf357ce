//! Integration tests: bearer injection, single-flight refresh and retry.

mod common;

use std::time::Duration;

use common::{FakeBackend, context, signed_in};
use futures::future::join_all;
use stardust_core::session::SessionStatus;
use stardust_core::transport::{ApiRequest, StatusCode};

#[tokio::test]
async fn authenticated_request_carries_bearer() {
    let backend = FakeBackend::new();
    let (ctx, _store) = signed_in(&backend).await;
    let ep = backend.endpoints().clone();

    let resp = ctx
        .client
        .send(ApiRequest::get(&ep.user_ads).authenticated())
        .await
        .unwrap();

    assert!(resp.is_success());
    assert_eq!(
        backend.calls_to(&ep.user_ads)[0].bearer.as_deref(),
        Some("access-1")
    );
}

#[tokio::test]
async fn public_request_never_carries_bearer() {
    let backend = FakeBackend::new();
    let (ctx, _store) = signed_in(&backend).await;
    let ep = backend.endpoints().clone();

    ctx.client
        .send(ApiRequest::get(&ep.categories))
        .await
        .unwrap();

    assert!(backend.calls_to(&ep.categories)[0].bearer.is_none());
}

#[tokio::test]
async fn concurrent_401s_share_one_refresh() {
    let backend = FakeBackend::new();
    let (ctx, _store) = signed_in(&backend).await;
    let ep = backend.endpoints().clone();
    backend.expire_access();
    backend.delay(&ep.token_refresh, Duration::from_millis(20));

    let requests = (0..5).map(|_| {
        ctx.client
            .send(ApiRequest::get(&ep.user_ads).authenticated())
    });
    let responses = join_all(requests).await;

    for resp in responses {
        assert_eq!(resp.unwrap().status, StatusCode::OK);
    }
    assert_eq!(backend.calls_to(&ep.token_refresh).len(), 1);
    // Five originals plus five retries.
    let ads_calls = backend.calls_to(&ep.user_ads);
    assert_eq!(ads_calls.len(), 10);
    assert!(
        ads_calls[5..]
            .iter()
            .all(|c| c.bearer.as_deref() == Some("access-2"))
    );
    assert_eq!(ctx.session.status(), SessionStatus::Authenticated);
}

#[tokio::test]
async fn sequential_expiries_refresh_again() {
    let backend = FakeBackend::new();
    let (ctx, _store) = signed_in(&backend).await;
    let ep = backend.endpoints().clone();

    for _ in 0..2 {
        backend.expire_access();
        let resp = ctx
            .client
            .send(ApiRequest::get(&ep.user_ads).authenticated())
            .await
            .unwrap();
        assert!(resp.is_success());
    }

    assert_eq!(backend.calls_to(&ep.token_refresh).len(), 2);
    assert_eq!(ctx.session.access_token().as_deref(), Some("access-3"));
}

#[tokio::test(start_paused = true)]
async fn token_renewed_in_flight_skips_refresh() {
    let backend = FakeBackend::new();
    let (ctx, _store) = signed_in(&backend).await;
    let ep = backend.endpoints().clone();
    backend.delay(&ep.user_ads, Duration::from_millis(20));

    let (resp, _) = tokio::join!(
        ctx.client
            .send(ApiRequest::get(&ep.user_ads).authenticated()),
        ctx.session.refresh(),
    );

    assert!(resp.unwrap().is_success());
    assert_eq!(backend.calls_to(&ep.token_refresh).len(), 1);
    let ads_calls = backend.calls_to(&ep.user_ads);
    assert_eq!(ads_calls.len(), 2);
    assert_eq!(ads_calls[1].bearer.as_deref(), Some("access-2"));
}

#[tokio::test]
async fn public_401_is_returned_without_refresh() {
    let backend = FakeBackend::new();
    let (ctx, _store) = signed_in(&backend).await;
    let ep = backend.endpoints().clone();
    backend.always_unauthorized(&ep.categories);

    let resp = ctx
        .client
        .send(ApiRequest::get(&ep.categories))
        .await
        .unwrap();

    assert_eq!(resp.status, StatusCode::UNAUTHORIZED);
    assert!(backend.calls_to(&ep.token_refresh).is_empty());
    assert_eq!(ctx.session.status(), SessionStatus::Authenticated);
}

#[tokio::test]
async fn failed_refresh_returns_original_401_and_signs_out() {
    let backend = FakeBackend::new();
    let (ctx, store) = signed_in(&backend).await;
    let ep = backend.endpoints().clone();
    backend.expire_access();
    backend.reject_refresh();

    let resp = ctx
        .client
        .send(ApiRequest::get(&ep.user_ads).authenticated())
        .await
        .unwrap();

    assert_eq!(resp.status, StatusCode::UNAUTHORIZED);
    assert_eq!(backend.calls_to(&ep.user_ads).len(), 1);
    assert_eq!(ctx.session.status(), SessionStatus::Anonymous);
    assert!(store.is_empty());
}

#[tokio::test]
async fn second_401_after_retry_is_returned() {
    let backend = FakeBackend::new();
    let (ctx, _store) = signed_in(&backend).await;
    let ep = backend.endpoints().clone();
    backend.always_unauthorized(&ep.user_ads);

    let resp = ctx
        .client
        .send(ApiRequest::get(&ep.user_ads).authenticated())
        .await
        .unwrap();

    assert_eq!(resp.status, StatusCode::UNAUTHORIZED);
    assert_eq!(backend.calls_to(&ep.user_ads).len(), 2);
    assert_eq!(backend.calls_to(&ep.token_refresh).len(), 1);
}

#[tokio::test]
async fn anonymous_authenticated_request_gets_401_without_refresh_call() {
    let backend = FakeBackend::new();
    let (ctx, _store) = context(&backend);
    let ep = backend.endpoints().clone();

    let resp = ctx
        .client
        .send(ApiRequest::get(&ep.user_ads).authenticated())
        .await
        .unwrap();

    assert_eq!(resp.status, StatusCode::UNAUTHORIZED);
    assert!(backend.calls_to(&ep.user_ads)[0].bearer.is_none());
    assert!(backend.calls_to(&ep.token_refresh).is_empty());
}

#[tokio::test]
async fn network_failure_is_not_retried() {
    let backend = FakeBackend::new();
    let (ctx, _store) = signed_in(&backend).await;
    let ep = backend.endpoints().clone();
    backend.set_offline(true);

    let err = ctx
        .client
        .send(ApiRequest::get(&ep.user_ads).authenticated())
        .await
        .unwrap_err();

    assert!(err.is_network());
    assert_eq!(backend.calls_to(&ep.user_ads).len(), 1);
    assert_eq!(ctx.session.status(), SessionStatus::Authenticated);
}
