use std::sync::Arc;

use axum::body::{Body, Bytes};
use axum::extract::{Query, Request, State};
use axum::http::header::AUTHORIZATION;
use axum::middleware::Next;
use axum::response::Response;
use common_auth::{
    ensure_admin, ensure_merchant, ensure_store_staff, parse_bearer, AuthContext, AuthError,
    GuardError, StoreScope, TokenCodec,
};
use common_http_errors::ApiError;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, error};

use crate::directory::AccountDirectory;

const MAX_BODY_BYTES: usize = 64 * 1024;

/// Verifies the bearer token and attaches an [`AuthContext`]. Must run
/// before every other gate.
pub async fn authenticate(
    State(codec): State<Arc<TokenCodec>>,
    mut req: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let header = req
        .headers()
        .get(AUTHORIZATION)
        .ok_or(AuthError::MissingAuthorization)?;
    let token = parse_bearer(header)?;

    let claims = codec.verify_access_token(&token).map_err(|err| {
        debug!(error = %err, "rejected access token");
        AuthError::from(err)
    })?;

    req.extensions_mut()
        .insert(AuthContext::from_claims(claims, token));
    Ok(next.run(req).await)
}

fn context(req: &Request) -> Result<&AuthContext, ApiError> {
    req.extensions()
        .get::<AuthContext>()
        .ok_or_else(|| AuthError::MissingContext.into())
}

pub async fn require_admin(req: Request, next: Next) -> Result<Response, ApiError> {
    let auth = context(&req)?;
    ensure_admin(auth).map_err(|err| {
        debug!(user_id = auth.user_id, "admin gate rejected request");
        err
    })?;
    Ok(next.run(req).await)
}

pub async fn require_merchant(req: Request, next: Next) -> Result<Response, ApiError> {
    let auth = context(&req)?;
    ensure_merchant(auth).map_err(|err| {
        debug!(user_id = auth.user_id, "merchant gate rejected request");
        err
    })?;
    Ok(next.run(req).await)
}

/// Like [`require_merchant`], but falls back to a live lookup when the
/// token predates the merchant grant. A successful lookup only updates
/// this request's context.
pub async fn require_merchant_with_sync(
    State(accounts): State<Arc<dyn AccountDirectory>>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let auth = req
        .extensions_mut()
        .get_mut::<AuthContext>()
        .ok_or(AuthError::MissingContext)?;

    if !auth.is_merchant {
        match accounts.is_merchant(auth.user_id).await {
            Ok(true) => {
                debug!(user_id = auth.user_id, "merchant flag synced from directory");
                auth.mark_merchant();
            }
            Ok(false) => {
                return Err(GuardError::Forbidden {
                    reason: "merchant access required",
                }
                .into());
            }
            Err(err) => {
                error!(?err, user_id = auth.user_id, "merchant lookup failed");
                return Err(GuardError::Lookup(err.to_string()).into());
            }
        }
    }

    Ok(next.run(req).await)
}

/// Store staff gate for operations that carry `store_id` in a JSON body.
/// The body is buffered and handed on unchanged.
pub async fn require_store_staff_from_body(req: Request, next: Next) -> Result<Response, ApiError> {
    let (parts, body) = req.into_parts();
    let bytes = axum::body::to_bytes(body, MAX_BODY_BYTES)
        .await
        .map_err(|_| ApiError::bad_request("invalid_body", "request body could not be read"))?;

    let store_id = store_id_from_body(&bytes)?;
    let mut req = Request::from_parts(parts, Body::from(bytes));
    authorize_store(&mut req, store_id)?;
    Ok(next.run(req).await)
}

#[derive(Debug, Deserialize)]
struct StoreIdQuery {
    store_id: Option<String>,
}

/// Store staff gate for operations that carry `store_id` in the query string.
pub async fn require_store_staff_from_query(
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let query = Query::<StoreIdQuery>::try_from_uri(req.uri())
        .map_err(|err| GuardError::InvalidStoreId(err.body_text()))?;
    let raw = query.0.store_id.ok_or(GuardError::MissingStoreId)?;
    let store_id = parse_store_id(&raw)?;

    authorize_store(&mut req, store_id)?;
    Ok(next.run(req).await)
}

fn authorize_store(req: &mut Request, store_id: u64) -> Result<(), ApiError> {
    let auth = context(req)?;
    ensure_store_staff(auth, store_id).map_err(|err| {
        debug!(user_id = auth.user_id, store_id, "store staff gate rejected request");
        err
    })?;
    req.extensions_mut().insert(StoreScope(store_id));
    Ok(())
}

fn store_id_from_body(bytes: &Bytes) -> Result<u64, GuardError> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Err(GuardError::MissingStoreId);
    }
    let value: Value = serde_json::from_slice(bytes)
        .map_err(|err| GuardError::InvalidStoreId(format!("body is not valid JSON: {err}")))?;

    match value.get("store_id") {
        None | Some(Value::Null) => Err(GuardError::MissingStoreId),
        Some(Value::Number(number)) => number
            .as_u64()
            .filter(|id| *id > 0)
            .ok_or_else(|| GuardError::InvalidStoreId(number.to_string())),
        Some(Value::String(raw)) => parse_store_id(raw),
        Some(other) => Err(GuardError::InvalidStoreId(other.to_string())),
    }
}

fn parse_store_id(raw: &str) -> Result<u64, GuardError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(GuardError::MissingStoreId);
    }
    trimmed
        .parse::<u64>()
        .ok()
        .filter(|id| *id > 0)
        .ok_or_else(|| GuardError::InvalidStoreId(trimmed.to_string()))
}
