use async_trait::async_trait;
use axum::extract::FromRequestParts;
use axum::http::{request::Parts, HeaderValue};
use common_http_errors::ApiError;

use crate::claims::AccessClaims;
use crate::error::{AuthError, AuthResult};
use crate::guards::is_staff_of_store;

/// Request-scoped identity attached by the authentication gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthContext {
    pub user_id: u64,
    pub email: String,
    pub is_admin: bool,
    pub is_merchant: bool,
    pub staff_store_ids: Vec<u64>,
    pub token: String,
}

impl AuthContext {
    pub fn from_claims(claims: AccessClaims, token: impl Into<String>) -> Self {
        Self {
            user_id: claims.user_id,
            email: claims.email,
            is_admin: claims.is_admin,
            is_merchant: claims.is_merchant,
            staff_store_ids: claims.staff_store_ids,
            token: token.into(),
        }
    }

    pub fn is_staff_of_store(&self, store_id: u64) -> bool {
        is_staff_of_store(&self.staff_store_ids, self.is_admin, self.is_merchant, store_id)
    }

    /// Records a live merchant check for the rest of this request only.
    pub fn mark_merchant(&mut self) {
        self.is_merchant = true;
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthContext
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthContext>()
            .cloned()
            .ok_or(AuthError::MissingContext)
    }
}

/// Store id resolved by the store-staff gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreScope(pub u64);

#[async_trait]
impl<S> FromRequestParts<S> for StoreScope
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<StoreScope>()
            .copied()
            .ok_or_else(|| ApiError::internal("store scope was not resolved for this route"))
    }
}

/// Extracts the token from an authorization header. Both `Bearer <token>`
/// and a bare token are accepted.
pub fn parse_bearer(value: &HeaderValue) -> AuthResult<String> {
    let raw = value
        .to_str()
        .map_err(|_| AuthError::InvalidAuthorization)?
        .trim();

    let token = match raw.split_once(' ') {
        Some((scheme, rest)) if scheme.eq_ignore_ascii_case("bearer") => rest.trim(),
        Some(_) => return Err(AuthError::InvalidAuthorization),
        None if raw.eq_ignore_ascii_case("bearer") => return Err(AuthError::InvalidAuthorization),
        None => raw,
    };

    if token.is_empty() || token.contains(char::is_whitespace) {
        return Err(AuthError::InvalidAuthorization);
    }

    Ok(token.to_owned())
}
