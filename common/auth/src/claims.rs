use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CodecError, CodecResult};

/// Largest id that survives a trip through a JSON number (2^53 - 1).
pub const MAX_SAFE_ID: u64 = (1 << 53) - 1;

/// Identity and role flags to embed in an access token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenSubject {
    pub email: String,
    pub user_id: u64,
    pub is_admin: bool,
    pub is_merchant: bool,
    pub staff_store_ids: Vec<u64>,
}

/// Verified access-token claims.
///
/// The merchant flag and staff list are a snapshot taken when the token was
/// issued; grants made afterwards only show up after a login or refresh.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccessClaims {
    pub email: String,
    pub user_id: u64,
    pub is_admin: bool,
    pub is_merchant: bool,
    pub staff_store_ids: Vec<u64>,
    pub expires_at: DateTime<Utc>,
    pub issued_at: Option<DateTime<Utc>>,
}

/// Verified invitation-token claims.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvitationClaims {
    pub store_id: u64,
    pub email: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct AccessClaimsRepr {
    pub email: String,
    pub user_id: u64,
    pub is_admin: bool,
    pub is_merchant: bool,
    pub staff_store_ids: Vec<u64>,
    pub exp: i64,
    #[serde(default)]
    pub iat: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct InvitationClaimsRepr {
    pub store_id: u64,
    pub email: String,
    pub invitation: bool,
    pub exp: i64,
}

pub(crate) fn ensure_safe_id(id: u64) -> CodecResult<u64> {
    if id > MAX_SAFE_ID {
        Err(CodecError::IdOutOfRange(id))
    } else {
        Ok(id)
    }
}

fn timestamp(claim: &'static str, value: i64) -> CodecResult<DateTime<Utc>> {
    Utc.timestamp_opt(value, 0)
        .single()
        .ok_or_else(|| CodecError::MalformedClaims(format!("invalid '{claim}' timestamp {value}")))
}

fn safe_claim_id(claim: &'static str, id: u64) -> CodecResult<u64> {
    ensure_safe_id(id)
        .map_err(|_| CodecError::MalformedClaims(format!("'{claim}' value {id} out of range")))
}

fn is_invitation(value: &serde_json::Value) -> bool {
    matches!(value.get("invitation"), Some(serde_json::Value::Bool(true)))
}

impl TryFrom<serde_json::Value> for AccessClaims {
    type Error = CodecError;

    fn try_from(value: serde_json::Value) -> CodecResult<Self> {
        if is_invitation(&value) {
            return Err(CodecError::WrongTokenType { expected: "access" });
        }

        let repr: AccessClaimsRepr = serde_json::from_value(value)
            .map_err(|err| CodecError::MalformedClaims(err.to_string()))?;

        let user_id = safe_claim_id("user_id", repr.user_id)?;
        let staff_store_ids = repr
            .staff_store_ids
            .into_iter()
            .map(|id| safe_claim_id("staff_store_ids", id))
            .collect::<CodecResult<Vec<_>>>()?;
        let issued_at = repr.iat.map(|iat| timestamp("iat", iat)).transpose()?;

        Ok(Self {
            email: repr.email,
            user_id,
            is_admin: repr.is_admin,
            is_merchant: repr.is_merchant,
            staff_store_ids,
            expires_at: timestamp("exp", repr.exp)?,
            issued_at,
        })
    }
}

impl TryFrom<serde_json::Value> for InvitationClaims {
    type Error = CodecError;

    fn try_from(value: serde_json::Value) -> CodecResult<Self> {
        if !is_invitation(&value) {
            return Err(CodecError::WrongTokenType { expected: "invitation" });
        }

        let repr: InvitationClaimsRepr = serde_json::from_value(value)
            .map_err(|err| CodecError::MalformedClaims(err.to_string()))?;

        Ok(Self {
            store_id: safe_claim_id("store_id", repr.store_id)?,
            email: repr.email,
            expires_at: timestamp("exp", repr.exp)?,
        })
    }
}
