mod support;

use std::sync::Arc;

use axum::{
    body::Body,
    http::{header::CONTENT_TYPE, Method, Request, StatusCode},
};
use basket_service::build_router;
use basket_service::tokens::{SessionError, SessionIssuer, StoredRefreshToken};
use common_auth::{hash_refresh_token, JwtConfig, TokenCodec};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use support::{memory_state, MemoryBackend, RecordingNotifier, StaleRefreshTokens, TEST_SECRET};
use tower::ServiceExt;

fn issuer(backend: &Arc<MemoryBackend>) -> SessionIssuer {
    let codec = TokenCodec::new(JwtConfig::new(TEST_SECRET)).expect("codec");
    SessionIssuer::new(
        Arc::new(codec),
        backend.clone(),
        backend.clone(),
        backend.clone(),
    )
}

#[tokio::test]
async fn refresh_tokens_are_single_use() {
    let backend = MemoryBackend::new();
    let account = backend.add_user("ana@example.test", false);
    let sessions = issuer(&backend);

    let first = sessions.issue_for(&account).await.expect("issue session");
    assert_eq!(first.token_type, "Bearer");
    assert_eq!(
        backend.refresh_hash_for(account.id),
        Some(hash_refresh_token(&first.refresh_token))
    );

    let second = sessions
        .refresh(&first.refresh_token)
        .await
        .expect("rotate refresh token");
    assert_ne!(second.refresh_token, first.refresh_token);
    assert_eq!(
        backend.refresh_hash_for(account.id),
        Some(hash_refresh_token(&second.refresh_token))
    );

    let replay = sessions.refresh(&first.refresh_token).await;
    assert!(matches!(replay, Err(SessionError::InvalidRefreshToken)));

    sessions
        .refresh(&second.refresh_token)
        .await
        .expect("latest token still redeemable");
}

#[tokio::test]
async fn new_login_revokes_the_previous_refresh_token() {
    let backend = MemoryBackend::new();
    let account = backend.add_user("ben@example.test", false);
    let sessions = issuer(&backend);

    let first = sessions.issue_for(&account).await.expect("first login");
    let second = sessions.issue_for(&account).await.expect("second login");

    let stale = sessions.refresh(&first.refresh_token).await;
    assert!(matches!(stale, Err(SessionError::InvalidRefreshToken)));
    sessions
        .refresh(&second.refresh_token)
        .await
        .expect("current token works");
}

#[tokio::test]
async fn refresh_loses_to_a_concurrent_rotation() {
    let backend = MemoryBackend::new();
    let account = backend.add_user("dora@example.test", false);
    let sessions = issuer(&backend);

    let session = sessions.issue_for(&account).await.expect("issue session");
    let codec = TokenCodec::new(JwtConfig::new(TEST_SECRET)).expect("codec");
    let lagging = SessionIssuer::new(
        Arc::new(codec),
        backend.clone(),
        backend.clone(),
        Arc::new(StaleRefreshTokens {
            inner: backend.clone(),
            snapshot: StoredRefreshToken {
                user_id: account.id,
                expires_at: session.refresh_expires_at,
            },
        }),
    );

    let winner = sessions
        .refresh(&session.refresh_token)
        .await
        .expect("first refresh wins");
    let late = lagging.refresh(&session.refresh_token).await;
    assert!(matches!(late, Err(SessionError::InvalidRefreshToken)));
    assert_eq!(
        backend.refresh_hash_for(account.id),
        Some(hash_refresh_token(&winner.refresh_token))
    );

    sessions
        .refresh(&winner.refresh_token)
        .await
        .expect("winning token still redeemable");
}

#[tokio::test]
async fn concurrent_refreshes_rotate_once() {
    let backend = MemoryBackend::new();
    let account = backend.add_user("eli@example.test", false);
    let sessions = issuer(&backend);

    let session = sessions.issue_for(&account).await.expect("issue session");
    let (first, second) = tokio::join!(
        sessions.refresh(&session.refresh_token),
        sessions.refresh(&session.refresh_token),
    );

    let rotated = match (first, second) {
        (Ok(session), Err(SessionError::InvalidRefreshToken))
        | (Err(SessionError::InvalidRefreshToken), Ok(session)) => session,
        other => panic!("expected exactly one rotation, got {other:?}"),
    };
    assert_eq!(
        backend.refresh_hash_for(account.id),
        Some(hash_refresh_token(&rotated.refresh_token))
    );
}

#[tokio::test]
async fn expired_and_unknown_refresh_tokens_are_rejected() {
    let backend = MemoryBackend::new();
    let account = backend.add_user("cleo@example.test", false);
    let sessions = issuer(&backend);

    let session = sessions.issue_for(&account).await.expect("issue session");
    backend.expire_refresh_token(account.id);

    let expired = sessions.refresh(&session.refresh_token).await;
    assert!(matches!(expired, Err(SessionError::RefreshTokenExpired)));

    let unknown = sessions.refresh("never-issued").await;
    assert!(matches!(unknown, Err(SessionError::InvalidRefreshToken)));

    let blank = sessions.refresh("  ").await;
    assert!(matches!(blank, Err(SessionError::InvalidRefreshToken)));
}

#[tokio::test]
async fn refreshed_claims_pick_up_new_memberships() {
    let backend = MemoryBackend::new();
    let owner = backend.add_user("owner@example.test", false);
    let merchant = backend.add_merchant(owner.id);
    let store = backend.add_store(merchant.id);
    let staff = backend.add_user("dina@example.test", false);
    let sessions = issuer(&backend);
    let codec = TokenCodec::new(JwtConfig::new(TEST_SECRET)).expect("codec");

    let session = sessions.issue_for(&staff).await.expect("issue session");
    let claims = codec
        .verify_access_token(&session.access_token)
        .expect("verify access token");
    assert!(claims.staff_store_ids.is_empty());

    backend.add_staff(store.id, staff.id);
    let refreshed = sessions
        .refresh(&session.refresh_token)
        .await
        .expect("refresh");
    let claims = codec
        .verify_access_token(&refreshed.access_token)
        .expect("verify access token");
    assert_eq!(claims.staff_store_ids, vec![store.id]);
    assert!(!claims.is_merchant);

    let owner_session = sessions.issue_for(&owner).await.expect("owner session");
    let owner_claims = codec
        .verify_access_token(&owner_session.access_token)
        .expect("verify access token");
    assert!(owner_claims.is_merchant);
}

async fn post_refresh(app: axum::Router, token: &str) -> (StatusCode, Value) {
    let response = app
        .oneshot(
            Request::builder()
                .method(Method::POST)
                .uri("/auth/refresh")
                .header(CONTENT_TYPE, "application/json")
                .body(Body::from(json!({ "refresh_token": token }).to_string()))
                .expect("request"),
        )
        .await
        .expect("router response");
    let status = response.status();
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("body")
        .to_bytes();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

#[tokio::test]
async fn refresh_endpoint_rotates_and_rejects_replays() {
    let backend = MemoryBackend::new();
    let account = backend.add_user("eve@example.test", false);
    let state = memory_state(&backend, Arc::new(RecordingNotifier::default())).expect("state");
    let first = state.sessions.issue_for(&account).await.expect("issue session");
    let app = build_router(state);

    let (status, body) = post_refresh(app.clone(), &first.refresh_token).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["token_type"], "Bearer");
    assert!(body["refresh_token"].as_str().is_some());

    let (status, body) = post_refresh(app, &first.refresh_token).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "unauthenticated");
    assert_eq!(body["message"], "invalid refresh token");
}
