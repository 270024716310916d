use axum::response::{IntoResponse, Response};
use common_http_errors::ApiError;
use jsonwebtoken::errors::ErrorKind;
use thiserror::Error;

pub type CodecResult<T> = Result<T, CodecError>;
pub type AuthResult<T> = Result<T, AuthError>;

/// Failures produced by the token codec. Verification is pure, so none of
/// these are worth retrying.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("signing secret is not configured")]
    MissingSecret,
    #[error("token signature or algorithm is invalid")]
    InvalidSignature,
    #[error("token has expired")]
    Expired,
    #[error("malformed claims: {0}")]
    MalformedClaims(String),
    #[error("malformed token: {0}")]
    MalformedToken(String),
    #[error("token is not a valid {expected} token")]
    WrongTokenType { expected: &'static str },
    #[error("id {0} exceeds the safe integer range of token claims")]
    IdOutOfRange(u64),
    #[error("failed to sign token: {0}")]
    Signing(String),
    #[error("random source unavailable: {0}")]
    Randomness(String),
}

impl From<jsonwebtoken::errors::Error> for CodecError {
    fn from(value: jsonwebtoken::errors::Error) -> Self {
        match value.kind() {
            ErrorKind::InvalidSignature
            | ErrorKind::InvalidAlgorithm
            | ErrorKind::InvalidAlgorithmName
            | ErrorKind::MissingAlgorithm => Self::InvalidSignature,
            ErrorKind::ExpiredSignature => Self::Expired,
            ErrorKind::MissingRequiredClaim(claim) => {
                Self::MalformedClaims(format!("missing required claim '{claim}'"))
            }
            ErrorKind::Json(err) => Self::MalformedClaims(err.to_string()),
            _ => Self::MalformedToken(value.to_string()),
        }
    }
}

/// Request-level authentication failures. All of them surface as 401.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("authorization header missing")]
    MissingAuthorization,
    #[error("authorization header malformed")]
    InvalidAuthorization,
    #[error("invalid token: {0}")]
    Token(#[from] CodecError),
    #[error("request has not been authenticated")]
    MissingContext,
}

impl From<AuthError> for ApiError {
    fn from(value: AuthError) -> Self {
        ApiError::unauthenticated(value.to_string())
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        ApiError::from(self).into_response()
    }
}
