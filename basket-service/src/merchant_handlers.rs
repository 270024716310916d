use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use common_auth::AuthContext;
use common_http_errors::{ApiError, ApiResult};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use tracing::info;

use crate::repo::{is_unique_violation, sql_id};
use crate::user_handlers::normalize_email;
use crate::AppState;

const SIRET_LEN: usize = 14;

#[derive(Debug, Deserialize)]
pub struct MerchantRequestInput {
    pub business_name: String,
    pub email_pro: String,
    pub siret: String,
    #[serde(default)]
    pub phone_number: Option<String>,
}

#[derive(Debug, Serialize, FromRow)]
pub struct MerchantRequest {
    pub id: i64,
    pub user_id: i64,
    pub business_name: String,
    pub email_pro: String,
    pub siret: String,
    pub phone_number: Option<String>,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Approved,
    Rejected,
}

impl Decision {
    fn as_status(&self) -> &'static str {
        match self {
            Decision::Approved => "approved",
            Decision::Rejected => "rejected",
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ProcessRequestInput {
    pub status: Decision,
}

const REQUEST_COLUMNS: &str =
    "id, user_id, business_name, email_pro, siret, phone_number, status, created_at, processed_at";

/// Strips spaces, dots and dashes; the remainder must be exactly 14 digits.
pub fn normalize_siret(raw: &str) -> Option<String> {
    let digits: String = raw
        .chars()
        .filter(|c| !matches!(c, ' ' | '-' | '.'))
        .collect();
    if digits.len() == SIRET_LEN && digits.chars().all(|c| c.is_ascii_digit()) {
        Some(digits)
    } else {
        None
    }
}

pub async fn create_merchant_request(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(input): Json<MerchantRequestInput>,
) -> ApiResult<(StatusCode, Json<MerchantRequest>)> {
    let business_name = input.business_name.trim().to_string();
    if business_name.is_empty() {
        return Err(ApiError::bad_request(
            "invalid_business_name",
            "business_name is required",
        ));
    }
    let email_pro = normalize_email(&input.email_pro);
    if !email_pro.contains('@') {
        return Err(ApiError::bad_request("invalid_email", "email_pro must be an email"));
    }
    let siret = normalize_siret(&input.siret)
        .ok_or_else(|| ApiError::bad_request("invalid_siret", "siret must contain 14 digits"))?;

    if state
        .accounts
        .is_merchant(auth.user_id)
        .await
        .map_err(ApiError::internal)?
    {
        return Err(ApiError::conflict("already_merchant", "user is already a merchant"));
    }

    let sql = format!(
        "INSERT INTO merchant_requests (user_id, business_name, email_pro, siret, phone_number)
         VALUES ($1, $2, $3, $4, $5)
         RETURNING {REQUEST_COLUMNS}"
    );
    let request = sqlx::query_as::<_, MerchantRequest>(&sql)
        .bind(sql_id(auth.user_id).map_err(ApiError::internal)?)
        .bind(&business_name)
        .bind(&email_pro)
        .bind(&siret)
        .bind(input.phone_number.as_deref().map(str::trim))
        .fetch_one(&state.db)
        .await
        .map_err(|err| {
            if is_unique_violation(&err) {
                ApiError::conflict("request_pending", "a merchant request is already pending")
            } else {
                ApiError::internal(err)
            }
        })?;

    info!(request_id = request.id, user_id = auth.user_id, "merchant request submitted");
    Ok((StatusCode::CREATED, Json(request)))
}

pub async fn list_pending_merchant_requests(
    State(state): State<AppState>,
) -> ApiResult<Json<Vec<MerchantRequest>>> {
    let sql = format!(
        "SELECT {REQUEST_COLUMNS} FROM merchant_requests WHERE status = 'pending' ORDER BY created_at, id"
    );
    let requests = sqlx::query_as::<_, MerchantRequest>(&sql)
        .fetch_all(&state.db)
        .await
        .map_err(ApiError::internal)?;
    Ok(Json(requests))
}

/// Approval creates the merchant record in the same transaction as the
/// status change.
pub async fn process_merchant_request(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(request_id): Path<u64>,
    Json(input): Json<ProcessRequestInput>,
) -> ApiResult<Json<MerchantRequest>> {
    let request_id = sql_id(request_id).map_err(ApiError::internal)?;
    let mut tx = state.db.begin().await.map_err(ApiError::internal)?;

    let sql = format!("SELECT {REQUEST_COLUMNS} FROM merchant_requests WHERE id = $1 FOR UPDATE");
    let current = sqlx::query_as::<_, MerchantRequest>(&sql)
        .bind(request_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(ApiError::internal)?
        .ok_or_else(|| ApiError::not_found("request_not_found", "merchant request not found"))?;

    if current.status != "pending" {
        return Err(ApiError::conflict(
            "request_processed",
            "merchant request was already processed",
        ));
    }

    if input.status == Decision::Approved {
        sqlx::query(
            "INSERT INTO merchants (user_id, business_name, email_pro, siret, phone_number)
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(current.user_id)
        .bind(&current.business_name)
        .bind(&current.email_pro)
        .bind(&current.siret)
        .bind(&current.phone_number)
        .execute(&mut *tx)
        .await
        .map_err(|err| {
            if is_unique_violation(&err) {
                ApiError::conflict(
                    "merchant_exists",
                    "a merchant already exists for this user or siret",
                )
            } else {
                ApiError::internal(err)
            }
        })?;
    }

    let sql = format!(
        "UPDATE merchant_requests SET status = $2, processed_at = NOW() WHERE id = $1 RETURNING {REQUEST_COLUMNS}"
    );
    let updated = sqlx::query_as::<_, MerchantRequest>(&sql)
        .bind(request_id)
        .bind(input.status.as_status())
        .fetch_one(&mut *tx)
        .await
        .map_err(ApiError::internal)?;

    tx.commit().await.map_err(ApiError::internal)?;

    info!(
        request_id = updated.id,
        admin_id = auth.user_id,
        status = %updated.status,
        "merchant request processed"
    );
    Ok(Json(updated))
}
