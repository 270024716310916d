use common_http_errors::ApiError;
use thiserror::Error;

use crate::extractors::AuthContext;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GuardError {
    #[error("{reason}")]
    Forbidden { reason: &'static str },
    #[error("store_id is required")]
    MissingStoreId,
    #[error("store_id is invalid: {0}")]
    InvalidStoreId(String),
    #[error("authorization lookup failed: {0}")]
    Lookup(String),
}

impl From<GuardError> for ApiError {
    fn from(value: GuardError) -> Self {
        match value {
            GuardError::Forbidden { reason } => ApiError::forbidden(reason),
            GuardError::MissingStoreId => ApiError::bad_request("missing_store_id", value.to_string()),
            GuardError::InvalidStoreId(_) => {
                ApiError::bad_request("invalid_store_id", value.to_string())
            }
            GuardError::Lookup(_) => ApiError::internal(value),
        }
    }
}

/// Authorization union for acting on a store: listed staff, any admin, or
/// any account carrying the merchant flag. The merchant arm is not scoped
/// to the owning merchant.
pub fn is_staff_of_store(
    staff_store_ids: &[u64],
    is_admin: bool,
    is_merchant: bool,
    store_id: u64,
) -> bool {
    is_admin || is_merchant || staff_store_ids.contains(&store_id)
}

pub fn ensure_admin(auth: &AuthContext) -> Result<(), GuardError> {
    if auth.is_admin {
        Ok(())
    } else {
        Err(GuardError::Forbidden {
            reason: "admin access required",
        })
    }
}

pub fn ensure_merchant(auth: &AuthContext) -> Result<(), GuardError> {
    if auth.is_merchant {
        Ok(())
    } else {
        Err(GuardError::Forbidden {
            reason: "merchant access required",
        })
    }
}

pub fn ensure_store_staff(auth: &AuthContext, store_id: u64) -> Result<(), GuardError> {
    if auth.is_staff_of_store(store_id) {
        Ok(())
    } else {
        Err(GuardError::Forbidden {
            reason: "not a staff member of this store",
        })
    }
}
