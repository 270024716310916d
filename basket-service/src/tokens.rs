use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common_auth::{hash_refresh_token, CodecError, TokenCodec, TokenSubject};
use common_http_errors::ApiError;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error};

use crate::directory::{Account, AccountDirectory, StaffRegistry};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredRefreshToken {
    pub user_id: u64,
    pub expires_at: DateTime<Utc>,
}

/// One active refresh token per user, stored as a SHA-256 digest.
#[async_trait]
pub trait RefreshTokenStore: Send + Sync {
    /// Overwrites whatever token the user held before.
    async fn replace(&self, user_id: u64, token_hash: &[u8], expires_at: DateTime<Utc>)
        -> Result<()>;
    /// Swaps `current_hash` for `next_hash` only if it is still the user's
    /// active token. Returns false when another writer got there first.
    async fn rotate(
        &self,
        user_id: u64,
        current_hash: &[u8],
        next_hash: &[u8],
        expires_at: DateTime<Utc>,
    ) -> Result<bool>;
    async fn find(&self, token_hash: &[u8]) -> Result<Option<StoredRefreshToken>>;
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("invalid refresh token")]
    InvalidRefreshToken,
    #[error("refresh token expired")]
    RefreshTokenExpired,
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl From<SessionError> for ApiError {
    fn from(value: SessionError) -> Self {
        match value {
            SessionError::InvalidRefreshToken | SessionError::RefreshTokenExpired => {
                ApiError::unauthenticated(value.to_string())
            }
            SessionError::Codec(err) => {
                error!(error = %err, "failed to mint session tokens");
                ApiError::internal(err)
            }
            SessionError::Internal(err) => {
                error!(error = ?err, "session store failure");
                ApiError::internal(err)
            }
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct IssuedSession {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: &'static str,
    pub expires_in: i64,
    pub refresh_expires_at: DateTime<Utc>,
}

struct MintedSession {
    session: IssuedSession,
    refresh_hash: Vec<u8>,
}

/// Issues access/refresh pairs and redeems refresh tokens.
pub struct SessionIssuer {
    codec: Arc<TokenCodec>,
    accounts: Arc<dyn AccountDirectory>,
    staff: Arc<dyn StaffRegistry>,
    refresh_tokens: Arc<dyn RefreshTokenStore>,
}

impl SessionIssuer {
    pub fn new(
        codec: Arc<TokenCodec>,
        accounts: Arc<dyn AccountDirectory>,
        staff: Arc<dyn StaffRegistry>,
        refresh_tokens: Arc<dyn RefreshTokenStore>,
    ) -> Self {
        Self {
            codec,
            accounts,
            staff,
            refresh_tokens,
        }
    }

    /// Loads the live merchant flag and staff list so the claims reflect the
    /// same authorization union used elsewhere.
    pub async fn subject_for(&self, account: &Account) -> Result<TokenSubject> {
        let is_merchant = self.accounts.is_merchant(account.id).await?;
        let staff_store_ids = self.staff.store_ids_for_user(account.id).await?;
        Ok(TokenSubject {
            email: account.email.clone(),
            user_id: account.id,
            is_admin: account.is_admin,
            is_merchant,
            staff_store_ids,
        })
    }

    pub async fn issue_for(&self, account: &Account) -> Result<IssuedSession, SessionError> {
        let minted = self.mint(account).await?;
        self.refresh_tokens
            .replace(
                account.id,
                &minted.refresh_hash,
                minted.session.refresh_expires_at,
            )
            .await?;
        debug!(user_id = account.id, "issued session");
        Ok(minted.session)
    }

    pub async fn refresh(&self, token: &str) -> Result<IssuedSession, SessionError> {
        let token = token.trim();
        if token.is_empty() {
            return Err(SessionError::InvalidRefreshToken);
        }

        let current_hash = hash_refresh_token(token);
        let stored = self
            .refresh_tokens
            .find(&current_hash)
            .await?
            .ok_or(SessionError::InvalidRefreshToken)?;

        if stored.expires_at <= Utc::now() {
            return Err(SessionError::RefreshTokenExpired);
        }

        let account = self
            .accounts
            .account_by_id(stored.user_id)
            .await?
            .ok_or(SessionError::InvalidRefreshToken)?;

        let minted = self.mint(&account).await?;
        let rotated = self
            .refresh_tokens
            .rotate(
                account.id,
                &current_hash,
                &minted.refresh_hash,
                minted.session.refresh_expires_at,
            )
            .await?;
        if !rotated {
            return Err(SessionError::InvalidRefreshToken);
        }

        debug!(user_id = account.id, "rotated refresh token");
        Ok(minted.session)
    }

    async fn mint(&self, account: &Account) -> Result<MintedSession, SessionError> {
        let subject = self.subject_for(account).await?;
        let access_token = self.codec.issue_access_token(&subject)?;
        let (refresh_token, refresh_expires_at) = self.codec.issue_refresh_token()?;
        let refresh_hash = hash_refresh_token(&refresh_token);

        Ok(MintedSession {
            session: IssuedSession {
                access_token,
                refresh_token,
                token_type: "Bearer",
                expires_in: self.codec.config().access_ttl_seconds,
                refresh_expires_at,
            },
            refresh_hash,
        })
    }
}
