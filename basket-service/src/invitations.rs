use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use common_http_errors::ApiError;
use rand_core::{OsRng, RngCore};
use serde::Serialize;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::directory::{AccountDirectory, StaffRegistry};
use crate::notifications::{invitation_message, Notifier};

const INVITE_CODE_BYTES: usize = 6;
const MAX_CODE_ATTEMPTS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InvitationStatus {
    Pending,
    Accepted,
    Rejected,
    Expired,
}

impl InvitationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvitationStatus::Pending => "PENDING",
            InvitationStatus::Accepted => "ACCEPTED",
            InvitationStatus::Rejected => "REJECTED",
            InvitationStatus::Expired => "EXPIRED",
        }
    }
}

impl fmt::Display for InvitationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InvitationStatus {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value {
            "PENDING" => Ok(InvitationStatus::Pending),
            "ACCEPTED" => Ok(InvitationStatus::Accepted),
            "REJECTED" => Ok(InvitationStatus::Rejected),
            "EXPIRED" => Ok(InvitationStatus::Expired),
            other => Err(anyhow!("unknown invitation status '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Invitation {
    pub id: u64,
    pub store_id: u64,
    pub sender_id: u64,
    pub email: String,
    pub code: String,
    pub status: InvitationStatus,
    pub expires_at: DateTime<Utc>,
    pub accepted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewInvitation {
    pub store_id: u64,
    pub sender_id: u64,
    pub email: String,
    pub code: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug)]
pub enum InsertOutcome {
    Created(Invitation),
    DuplicateCode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcceptOutcome {
    Accepted,
    /// The conditional status update matched no pending row.
    NotPending,
    /// The staff row already existed.
    AlreadyMember,
}

#[async_trait]
pub trait InvitationStore: Send + Sync {
    async fn insert(&self, invitation: &NewInvitation) -> Result<InsertOutcome>;
    async fn find_by_code(&self, code: &str) -> Result<Option<Invitation>>;
    async fn find_by_id(&self, id: u64) -> Result<Option<Invitation>>;
    /// Pending invitations of a store whose expiry is after `now`.
    async fn list_pending(&self, store_id: u64, now: DateTime<Utc>) -> Result<Vec<Invitation>>;
    /// Pending to Expired; false when the row was no longer pending.
    async fn mark_expired(&self, id: u64) -> Result<bool>;
    /// Pending to Accepted plus the `(store_id, user_id)` staff row, in one
    /// transaction. Nothing is written unless both succeed.
    async fn accept(
        &self,
        id: u64,
        store_id: u64,
        user_id: u64,
        accepted_at: DateTime<Utc>,
    ) -> Result<AcceptOutcome>;
    /// Pending to Rejected; false when the row was no longer pending.
    async fn reject(&self, id: u64) -> Result<bool>;
}

#[derive(Debug, Error)]
pub enum InvitationError {
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("{0}")]
    Unauthorized(&'static str),
    #[error("{0}")]
    InvalidInput(&'static str),
    #[error("invitation is no longer valid")]
    InvalidState,
    #[error("invitation has expired")]
    Expired,
    #[error("you are already a staff member of this store")]
    AlreadyMember,
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl From<InvitationError> for ApiError {
    fn from(value: InvitationError) -> Self {
        match value {
            InvitationError::NotFound(_) => ApiError::not_found("not_found", value.to_string()),
            InvitationError::Unauthorized(_) => ApiError::forbidden(value.to_string()),
            InvitationError::InvalidInput(_) => {
                ApiError::bad_request("invalid_input", value.to_string())
            }
            InvitationError::InvalidState => {
                ApiError::conflict("invitation_not_pending", value.to_string())
            }
            InvitationError::Expired => {
                ApiError::bad_request("invitation_expired", value.to_string())
            }
            InvitationError::AlreadyMember => {
                ApiError::conflict("already_member", value.to_string())
            }
            InvitationError::Internal(err) => {
                error!(error = ?err, "invitation operation failed");
                ApiError::internal(err)
            }
        }
    }
}

pub type InvitationResult<T> = Result<T, InvitationError>;

/// Invitation lifecycle: `Pending` moves once to `Accepted`, `Rejected` or
/// `Expired` and never leaves those states.
pub struct InvitationService {
    store: Arc<dyn InvitationStore>,
    accounts: Arc<dyn AccountDirectory>,
    staff: Arc<dyn StaffRegistry>,
    notifier: Arc<dyn Notifier>,
    accept_url: String,
    ttl: Duration,
}

impl InvitationService {
    pub fn new(
        store: Arc<dyn InvitationStore>,
        accounts: Arc<dyn AccountDirectory>,
        staff: Arc<dyn StaffRegistry>,
        notifier: Arc<dyn Notifier>,
        accept_url: impl Into<String>,
    ) -> Self {
        Self {
            store,
            accounts,
            staff,
            notifier,
            accept_url: accept_url.into(),
            ttl: Duration::days(7),
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub async fn create_invitation(
        &self,
        sender_id: u64,
        store_id: u64,
        email: &str,
    ) -> InvitationResult<Invitation> {
        let email = email.trim().to_ascii_lowercase();
        if email.is_empty() || !email.contains('@') {
            return Err(InvitationError::InvalidInput("a valid email is required"));
        }

        self.ensure_owner(sender_id, store_id).await?;

        let expires_at = Utc::now() + self.ttl;
        let mut created = None;
        for attempt in 1..=MAX_CODE_ATTEMPTS {
            let new = NewInvitation {
                store_id,
                sender_id,
                email: email.clone(),
                code: generate_invite_code()?,
                expires_at,
            };
            match self.store.insert(&new).await? {
                InsertOutcome::Created(invitation) => {
                    created = Some(invitation);
                    break;
                }
                InsertOutcome::DuplicateCode => {
                    warn!(attempt, store_id, "invitation code collision, regenerating");
                }
            }
        }
        let invitation = created.ok_or_else(|| {
            anyhow!("could not allocate a unique invitation code after {MAX_CODE_ATTEMPTS} attempts")
        })?;

        let message = invitation_message(&self.accept_url, &invitation.code);
        if let Err(err) = self.notifier.notify(&invitation.email, &message).await {
            warn!(
                ?err,
                invitation_id = invitation.id,
                store_id,
                "Failed to deliver invitation notification"
            );
        }

        info!(invitation_id = invitation.id, store_id, sender_id, "invitation created");
        Ok(invitation)
    }

    pub async fn accept_invitation(&self, code: &str, user_id: u64) -> InvitationResult<Invitation> {
        let code = code.trim();
        if code.is_empty() {
            return Err(InvitationError::InvalidInput("an invitation code is required"));
        }

        let mut invitation = self
            .store
            .find_by_code(code)
            .await?
            .ok_or(InvitationError::NotFound("invitation"))?;

        if invitation.status != InvitationStatus::Pending {
            return Err(InvitationError::InvalidState);
        }

        let now = Utc::now();
        if invitation.expires_at <= now {
            if !self.store.mark_expired(invitation.id).await? {
                return Err(InvitationError::InvalidState);
            }
            info!(invitation_id = invitation.id, "invitation expired on redemption");
            return Err(InvitationError::Expired);
        }

        if self.staff.is_member(invitation.store_id, user_id).await? {
            return Err(InvitationError::AlreadyMember);
        }

        match self
            .store
            .accept(invitation.id, invitation.store_id, user_id, now)
            .await?
        {
            AcceptOutcome::Accepted => {}
            AcceptOutcome::NotPending => return Err(InvitationError::InvalidState),
            AcceptOutcome::AlreadyMember => return Err(InvitationError::AlreadyMember),
        }

        info!(
            invitation_id = invitation.id,
            store_id = invitation.store_id,
            user_id,
            "invitation accepted"
        );
        invitation.status = InvitationStatus::Accepted;
        invitation.accepted_at = Some(now);
        Ok(invitation)
    }

    pub async fn get_pending_invitations(
        &self,
        store_id: u64,
        user_id: u64,
    ) -> InvitationResult<Vec<Invitation>> {
        self.ensure_owner(user_id, store_id).await?;
        Ok(self.store.list_pending(store_id, Utc::now()).await?)
    }

    /// Only the original sender may cancel, whoever owns the store now.
    pub async fn cancel_invitation(&self, invitation_id: u64, user_id: u64) -> InvitationResult<()> {
        let invitation = self
            .store
            .find_by_id(invitation_id)
            .await?
            .ok_or(InvitationError::NotFound("invitation"))?;

        if invitation.sender_id != user_id {
            return Err(InvitationError::Unauthorized(
                "only the sender can cancel the invitation",
            ));
        }
        if invitation.status != InvitationStatus::Pending {
            return Err(InvitationError::InvalidState);
        }
        if !self.store.reject(invitation_id).await? {
            return Err(InvitationError::InvalidState);
        }

        info!(invitation_id, user_id, "invitation cancelled");
        Ok(())
    }

    pub async fn remove_staff_member(
        &self,
        store_id: u64,
        member_id: u64,
        requester_id: u64,
    ) -> InvitationResult<()> {
        self.ensure_owner(requester_id, store_id).await?;
        if !self.staff.remove_member(store_id, member_id).await? {
            return Err(InvitationError::NotFound("staff member"));
        }
        info!(store_id, member_id, requester_id, "staff member removed");
        Ok(())
    }

    /// Strict ownership: the caller's merchant record must own the store.
    /// Admin and staff status do not count here.
    async fn ensure_owner(&self, user_id: u64, store_id: u64) -> InvitationResult<()> {
        let store = self
            .accounts
            .store_by_id(store_id)
            .await?
            .ok_or(InvitationError::NotFound("store"))?;

        match self.accounts.merchant_by_user(user_id).await? {
            Some(merchant) if merchant.id == store.merchant_id => Ok(()),
            _ => Err(InvitationError::Unauthorized("you don't own this store")),
        }
    }
}

fn generate_invite_code() -> Result<String> {
    let mut bytes = [0u8; INVITE_CODE_BYTES];
    OsRng
        .try_fill_bytes(&mut bytes)
        .map_err(|err| anyhow!("random source unavailable: {err}"))?;
    Ok(hex::encode(bytes))
}
