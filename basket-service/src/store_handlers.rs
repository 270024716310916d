use axum::{extract::State, http::StatusCode, Json};
use chrono::{DateTime, Utc};
use common_auth::AuthContext;
use common_http_errors::{ApiError, ApiResult};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use tracing::info;

use crate::repo::sql_id;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct NewStore {
    pub name: String,
    pub address: String,
    pub city: String,
    pub postal_code: String,
    #[serde(default)]
    pub phone_number: Option<String>,
}

#[derive(Debug, Serialize, FromRow)]
pub struct StoreRecord {
    pub id: i64,
    pub merchant_id: i64,
    pub name: String,
    pub address: String,
    pub city: String,
    pub postal_code: String,
    pub phone_number: Option<String>,
    pub created_at: DateTime<Utc>,
}

const STORE_COLUMNS: &str =
    "id, merchant_id, name, address, city, postal_code, phone_number, created_at";

pub async fn create_store(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(input): Json<NewStore>,
) -> ApiResult<(StatusCode, Json<StoreRecord>)> {
    let name = input.name.trim();
    if name.is_empty() {
        return Err(ApiError::bad_request("invalid_name", "store name is required"));
    }

    let merchant = state
        .accounts
        .merchant_by_user(auth.user_id)
        .await
        .map_err(ApiError::internal)?
        .ok_or_else(|| ApiError::forbidden("merchant access required"))?;

    let sql = format!(
        "INSERT INTO stores (merchant_id, name, address, city, postal_code, phone_number)
         VALUES ($1, $2, $3, $4, $5, $6)
         RETURNING {STORE_COLUMNS}"
    );
    let store = sqlx::query_as::<_, StoreRecord>(&sql)
        .bind(sql_id(merchant.id).map_err(ApiError::internal)?)
        .bind(name)
        .bind(input.address.trim())
        .bind(input.city.trim())
        .bind(input.postal_code.trim())
        .bind(input.phone_number.as_deref().map(str::trim))
        .fetch_one(&state.db)
        .await
        .map_err(ApiError::internal)?;

    info!(store_id = store.id, merchant_id = merchant.id, "store created");
    Ok((StatusCode::CREATED, Json(store)))
}

pub async fn list_my_stores(
    State(state): State<AppState>,
    auth: AuthContext,
) -> ApiResult<Json<Vec<StoreRecord>>> {
    let sql = format!(
        "SELECT s.{} FROM stores s
         JOIN merchants m ON m.id = s.merchant_id
         WHERE m.user_id = $1
         ORDER BY s.id",
        STORE_COLUMNS.replace(", ", ", s.")
    );
    let stores = sqlx::query_as::<_, StoreRecord>(&sql)
        .bind(sql_id(auth.user_id).map_err(ApiError::internal)?)
        .fetch_all(&state.db)
        .await
        .map_err(ApiError::internal)?;
    Ok(Json(stores))
}
