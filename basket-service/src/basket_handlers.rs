use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use common_auth::StoreScope;
use common_http_errors::{ApiError, ApiResult};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use tracing::info;

use crate::repo::{is_foreign_key_violation, sql_id};
use crate::AppState;

/// The body also carries `store_id`, which the store staff gate consumes
/// before the handler runs.
#[derive(Debug, Deserialize)]
pub struct BasketInput {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub original_price: f64,
    #[serde(default)]
    pub discount_percentage: f64,
    #[serde(default)]
    pub quantity: i32,
}

#[derive(Debug, Serialize, FromRow)]
pub struct Basket {
    pub id: i64,
    pub store_id: i64,
    pub name: String,
    pub description: Option<String>,
    pub original_price: f64,
    pub discount_percentage: f64,
    pub quantity: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

const BASKET_COLUMNS: &str = "id, store_id, name, description, original_price, discount_percentage, quantity, created_at, updated_at";

pub async fn create_basket(
    State(state): State<AppState>,
    StoreScope(store_id): StoreScope,
    Json(input): Json<BasketInput>,
) -> ApiResult<(StatusCode, Json<Basket>)> {
    let sql = format!(
        "INSERT INTO baskets (store_id, name, description, original_price, discount_percentage, quantity)
         VALUES ($1, $2, $3, $4, $5, $6)
         RETURNING {BASKET_COLUMNS}"
    );
    let basket = sqlx::query_as::<_, Basket>(&sql)
        .bind(sql_id(store_id).map_err(ApiError::internal)?)
        .bind(input.name.trim())
        .bind(input.description.as_deref())
        .bind(input.original_price)
        .bind(input.discount_percentage)
        .bind(input.quantity)
        .fetch_one(&state.db)
        .await
        .map_err(|err| {
            if is_foreign_key_violation(&err) {
                ApiError::not_found("store_not_found", "store not found")
            } else {
                ApiError::internal(err)
            }
        })?;

    info!(basket_id = basket.id, store_id, "basket created");
    Ok((StatusCode::CREATED, Json(basket)))
}

/// Only baskets belonging to the authorized store can be changed.
pub async fn update_basket(
    State(state): State<AppState>,
    StoreScope(store_id): StoreScope,
    Path(basket_id): Path<u64>,
    Json(input): Json<BasketInput>,
) -> ApiResult<Json<Basket>> {
    let sql = format!(
        "UPDATE baskets
         SET name = $3, description = $4, original_price = $5, discount_percentage = $6,
             quantity = $7, updated_at = NOW()
         WHERE id = $1 AND store_id = $2
         RETURNING {BASKET_COLUMNS}"
    );
    let basket = sqlx::query_as::<_, Basket>(&sql)
        .bind(sql_id(basket_id).map_err(ApiError::internal)?)
        .bind(sql_id(store_id).map_err(ApiError::internal)?)
        .bind(input.name.trim())
        .bind(input.description.as_deref())
        .bind(input.original_price)
        .bind(input.discount_percentage)
        .bind(input.quantity)
        .fetch_optional(&state.db)
        .await
        .map_err(ApiError::internal)?
        .ok_or_else(|| ApiError::not_found("basket_not_found", "basket not found"))?;

    Ok(Json(basket))
}

pub async fn delete_basket(
    State(state): State<AppState>,
    StoreScope(store_id): StoreScope,
    Path(basket_id): Path<u64>,
) -> ApiResult<StatusCode> {
    let result = sqlx::query("DELETE FROM baskets WHERE id = $1 AND store_id = $2")
        .bind(sql_id(basket_id).map_err(ApiError::internal)?)
        .bind(sql_id(store_id).map_err(ApiError::internal)?)
        .execute(&state.db)
        .await
        .map_err(ApiError::internal)?;

    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("basket_not_found", "basket not found"));
    }
    info!(basket_id, store_id, "basket deleted");
    Ok(StatusCode::NO_CONTENT)
}
