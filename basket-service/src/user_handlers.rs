use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use axum::{extract::State, http::StatusCode, Json};
use common_http_errors::{ApiError, ApiResult};
use rand_core::{OsRng, RngCore};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use tracing::{error, info, warn};

use crate::directory::Account;
use crate::notifications::validation_code_message;
use crate::repo::is_unique_violation;
use crate::tokens::IssuedSession;
use crate::AppState;

const MIN_PASSWORD_LEN: usize = 8;

#[derive(Debug, Deserialize)]
pub struct SignupRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct SignupResponse {
    pub id: u64,
    pub email: String,
    pub message: &'static str,
}

#[derive(Debug, Deserialize)]
pub struct ValidateCodeRequest {
    pub email: String,
    pub code: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: &'static str,
}

#[derive(FromRow)]
struct CredentialRow {
    id: i64,
    email: String,
    password_hash: String,
    is_admin: bool,
    is_email_confirmed: bool,
}

#[derive(FromRow)]
struct ValidationRow {
    validation_code: Option<String>,
    is_email_confirmed: bool,
}

pub(crate) fn normalize_email(value: &str) -> String {
    value.trim().to_ascii_lowercase()
}

fn hash_password(password: &str) -> ApiResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|err| {
            error!(error = %err, "password hashing failed");
            ApiError::internal(err)
        })
}

fn verify_password(password: &str, stored_hash: &str) -> bool {
    match PasswordHash::new(stored_hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(err) => {
            warn!(error = %err, "stored password hash is unreadable");
            false
        }
    }
}

fn generate_validation_code() -> ApiResult<String> {
    let mut bytes = [0u8; 4];
    OsRng
        .try_fill_bytes(&mut bytes)
        .map_err(ApiError::internal)?;
    Ok(format!("{:06}", u32::from_le_bytes(bytes) % 1_000_000))
}

fn invalid_credentials() -> ApiError {
    ApiError::unauthenticated("invalid credentials")
}

pub async fn signup(
    State(state): State<AppState>,
    Json(payload): Json<SignupRequest>,
) -> ApiResult<(StatusCode, Json<SignupResponse>)> {
    let email = normalize_email(&payload.email);
    if email.is_empty() || !email.contains('@') {
        return Err(ApiError::bad_request("invalid_email", "a valid email is required"));
    }
    if payload.password.len() < MIN_PASSWORD_LEN {
        return Err(ApiError::bad_request(
            "weak_password",
            format!("password must be at least {MIN_PASSWORD_LEN} characters"),
        ));
    }

    let password_hash = hash_password(&payload.password)?;
    let code = generate_validation_code()?;

    let id: i64 = sqlx::query_scalar(
        "INSERT INTO users (email, password_hash, validation_code, is_email_confirmed)
         VALUES ($1, $2, $3, FALSE)
         RETURNING id",
    )
    .bind(&email)
    .bind(&password_hash)
    .bind(&code)
    .fetch_one(&state.db)
    .await
    .map_err(|err| {
        if is_unique_violation(&err) {
            ApiError::conflict("user_exists", "user already exists")
        } else {
            ApiError::internal(err)
        }
    })?;

    if let Err(err) = state
        .notifier
        .notify(&email, &validation_code_message(&code))
        .await
    {
        warn!(?err, user_id = id, "Failed to deliver validation code");
    }

    info!(user_id = id, "user registered");
    Ok((
        StatusCode::CREATED,
        Json(SignupResponse {
            id: u64::try_from(id).map_err(ApiError::internal)?,
            email,
            message: "user created, check your email for the validation code",
        }),
    ))
}

pub async fn validate_code(
    State(state): State<AppState>,
    Json(payload): Json<ValidateCodeRequest>,
) -> ApiResult<Json<MessageResponse>> {
    let email = normalize_email(&payload.email);

    let row = sqlx::query_as::<_, ValidationRow>(
        "SELECT validation_code, is_email_confirmed FROM users WHERE email = $1",
    )
    .bind(&email)
    .fetch_optional(&state.db)
    .await
    .map_err(ApiError::internal)?
    .ok_or_else(|| ApiError::not_found("user_not_found", "user not found"))?;

    if row.is_email_confirmed {
        return Err(ApiError::bad_request("already_confirmed", "email already confirmed"));
    }
    if row.validation_code.as_deref() != Some(payload.code.trim()) {
        return Err(ApiError::unauthenticated("invalid validation code"));
    }

    sqlx::query(
        "UPDATE users SET is_email_confirmed = TRUE, validation_code = NULL WHERE email = $1",
    )
    .bind(&email)
    .execute(&state.db)
    .await
    .map_err(ApiError::internal)?;

    Ok(Json(MessageResponse {
        message: "email confirmed",
    }))
}

pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> ApiResult<Json<IssuedSession>> {
    let email = normalize_email(&payload.email);

    let row = sqlx::query_as::<_, CredentialRow>(
        "SELECT id, email, password_hash, is_admin, is_email_confirmed FROM users WHERE email = $1",
    )
    .bind(&email)
    .fetch_optional(&state.db)
    .await
    .map_err(|err| {
        state.metrics.login_attempt("error");
        ApiError::internal(err)
    })?;

    let Some(row) = row else {
        state.metrics.login_attempt("unknown_user");
        return Err(invalid_credentials());
    };

    if !verify_password(&payload.password, &row.password_hash) {
        state.metrics.login_attempt("bad_password");
        return Err(invalid_credentials());
    }

    if !row.is_email_confirmed {
        state.metrics.login_attempt("unconfirmed");
        return Err(ApiError::unauthenticated("email not confirmed"));
    }

    let account = Account {
        id: u64::try_from(row.id).map_err(ApiError::internal)?,
        email: row.email,
        is_admin: row.is_admin,
        email_confirmed: row.is_email_confirmed,
    };

    let session = state.sessions.issue_for(&account).await.map_err(|err| {
        state.metrics.login_attempt("error");
        ApiError::from(err)
    })?;

    state.metrics.login_attempt("success");
    info!(user_id = account.id, "login succeeded");
    Ok(Json(session))
}

pub async fn refresh(
    State(state): State<AppState>,
    Json(payload): Json<RefreshRequest>,
) -> ApiResult<Json<IssuedSession>> {
    match state.sessions.refresh(&payload.refresh_token).await {
        Ok(session) => {
            state.metrics.token_refresh("rotated");
            Ok(Json(session))
        }
        Err(err) => {
            state.metrics.token_refresh("rejected");
            Err(err.into())
        }
    }
}
