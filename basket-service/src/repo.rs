use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};

use crate::directory::{Account, AccountDirectory, Merchant, StaffRegistry, Store};
use crate::invitations::{
    AcceptOutcome, InsertOutcome, Invitation, InvitationStatus, InvitationStore, NewInvitation,
};
use crate::tokens::{RefreshTokenStore, StoredRefreshToken};

const UNIQUE_VIOLATION: &str = "23505";
const FOREIGN_KEY_VIOLATION: &str = "23503";

/// Postgres implementation of every persistence seam the core talks to.
#[derive(Clone)]
pub struct PgRepository {
    pool: PgPool,
}

impl PgRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

pub(crate) fn sql_id(id: u64) -> Result<i64> {
    i64::try_from(id).map_err(|_| anyhow!("id {id} does not fit a BIGINT column"))
}

pub(crate) fn row_id(row: &PgRow, column: &str) -> Result<u64> {
    let value: i64 = row.try_get(column)?;
    u64::try_from(value).map_err(|_| anyhow!("column '{column}' holds negative id {value}"))
}

pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    has_sql_state(err, UNIQUE_VIOLATION)
}

/// The referenced parent row (a store, a user) does not exist.
pub(crate) fn is_foreign_key_violation(err: &sqlx::Error) -> bool {
    has_sql_state(err, FOREIGN_KEY_VIOLATION)
}

fn has_sql_state(err: &sqlx::Error, state: &str) -> bool {
    match err {
        sqlx::Error::Database(db) => db.code().as_deref() == Some(state),
        _ => false,
    }
}

const INVITATION_COLUMNS: &str =
    "id, store_id, sender_id, email, code, status, expires_at, accepted_at, created_at";

fn invitation_from_row(row: &PgRow) -> Result<Invitation> {
    let status: String = row.try_get("status")?;
    Ok(Invitation {
        id: row_id(row, "id")?,
        store_id: row_id(row, "store_id")?,
        sender_id: row_id(row, "sender_id")?,
        email: row.try_get("email")?,
        code: row.try_get("code")?,
        status: status.parse()?,
        expires_at: row.try_get("expires_at")?,
        accepted_at: row.try_get("accepted_at")?,
        created_at: row.try_get("created_at")?,
    })
}

#[async_trait]
impl AccountDirectory for PgRepository {
    async fn account_by_id(&self, user_id: u64) -> Result<Option<Account>> {
        let row = sqlx::query(
            "SELECT id, email, is_admin, is_email_confirmed FROM users WHERE id = $1",
        )
        .bind(sql_id(user_id)?)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to load account")?;

        row.map(|row| {
            Ok(Account {
                id: row_id(&row, "id")?,
                email: row.try_get("email")?,
                is_admin: row.try_get("is_admin")?,
                email_confirmed: row.try_get("is_email_confirmed")?,
            })
        })
        .transpose()
    }

    async fn store_by_id(&self, store_id: u64) -> Result<Option<Store>> {
        let row = sqlx::query("SELECT id, merchant_id, name FROM stores WHERE id = $1")
            .bind(sql_id(store_id)?)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to load store")?;

        row.map(|row| {
            Ok(Store {
                id: row_id(&row, "id")?,
                merchant_id: row_id(&row, "merchant_id")?,
                name: row.try_get("name")?,
            })
        })
        .transpose()
    }

    async fn merchant_by_user(&self, user_id: u64) -> Result<Option<Merchant>> {
        let row =
            sqlx::query("SELECT id, user_id, business_name FROM merchants WHERE user_id = $1")
                .bind(sql_id(user_id)?)
                .fetch_optional(&self.pool)
                .await
                .context("Failed to load merchant")?;

        row.map(|row| {
            Ok(Merchant {
                id: row_id(&row, "id")?,
                user_id: row_id(&row, "user_id")?,
                business_name: row.try_get("business_name")?,
            })
        })
        .transpose()
    }

    async fn is_merchant(&self, user_id: u64) -> Result<bool> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM merchants WHERE user_id = $1)")
                .bind(sql_id(user_id)?)
                .fetch_one(&self.pool)
                .await
                .context("Failed to check merchant status")?;
        Ok(exists)
    }
}

#[async_trait]
impl StaffRegistry for PgRepository {
    async fn is_member(&self, store_id: u64, user_id: u64) -> Result<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM store_staff WHERE store_id = $1 AND user_id = $2)",
        )
        .bind(sql_id(store_id)?)
        .bind(sql_id(user_id)?)
        .fetch_one(&self.pool)
        .await
        .context("Failed to check staff membership")?;
        Ok(exists)
    }

    async fn store_ids_for_user(&self, user_id: u64) -> Result<Vec<u64>> {
        let rows = sqlx::query("SELECT store_id FROM store_staff WHERE user_id = $1 ORDER BY store_id")
            .bind(sql_id(user_id)?)
            .fetch_all(&self.pool)
            .await
            .context("Failed to load staff stores")?;

        rows.iter().map(|row| row_id(row, "store_id")).collect()
    }

    async fn remove_member(&self, store_id: u64, user_id: u64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM store_staff WHERE store_id = $1 AND user_id = $2")
            .bind(sql_id(store_id)?)
            .bind(sql_id(user_id)?)
            .execute(&self.pool)
            .await
            .context("Failed to remove staff member")?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl RefreshTokenStore for PgRepository {
    async fn replace(
        &self,
        user_id: u64,
        token_hash: &[u8],
        expires_at: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO refresh_tokens (user_id, token_hash, expires_at, issued_at)
             VALUES ($1, $2, $3, NOW())
             ON CONFLICT (user_id) DO UPDATE
             SET token_hash = EXCLUDED.token_hash, expires_at = EXCLUDED.expires_at, issued_at = NOW()",
        )
        .bind(sql_id(user_id)?)
        .bind(token_hash)
        .bind(expires_at)
        .execute(&self.pool)
        .await
        .map(|_| ())
        .map_err(|err| anyhow!("Failed to persist refresh token: {err}"))
    }

    async fn rotate(
        &self,
        user_id: u64,
        current_hash: &[u8],
        next_hash: &[u8],
        expires_at: DateTime<Utc>,
    ) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE refresh_tokens
             SET token_hash = $3, expires_at = $4, issued_at = NOW()
             WHERE user_id = $1 AND token_hash = $2",
        )
        .bind(sql_id(user_id)?)
        .bind(current_hash)
        .bind(next_hash)
        .bind(expires_at)
        .execute(&self.pool)
        .await
        .map_err(|err| anyhow!("Failed to rotate refresh token: {err}"))?;
        Ok(result.rows_affected() == 1)
    }

    async fn find(&self, token_hash: &[u8]) -> Result<Option<StoredRefreshToken>> {
        let row = sqlx::query("SELECT user_id, expires_at FROM refresh_tokens WHERE token_hash = $1")
            .bind(token_hash)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to look up refresh token")?;

        row.map(|row| {
            Ok(StoredRefreshToken {
                user_id: row_id(&row, "user_id")?,
                expires_at: row.try_get("expires_at")?,
            })
        })
        .transpose()
    }
}

#[async_trait]
impl InvitationStore for PgRepository {
    async fn insert(&self, invitation: &NewInvitation) -> Result<InsertOutcome> {
        let sql = format!(
            "INSERT INTO invitations (store_id, sender_id, email, code, status, expires_at)
             VALUES ($1, $2, $3, $4, $5, $6)
             RETURNING {INVITATION_COLUMNS}"
        );
        let result = sqlx::query(&sql)
            .bind(sql_id(invitation.store_id)?)
            .bind(sql_id(invitation.sender_id)?)
            .bind(&invitation.email)
            .bind(&invitation.code)
            .bind(InvitationStatus::Pending.as_str())
            .bind(invitation.expires_at)
            .fetch_one(&self.pool)
            .await;

        match result {
            Ok(row) => Ok(InsertOutcome::Created(invitation_from_row(&row)?)),
            Err(err) if is_unique_violation(&err) => Ok(InsertOutcome::DuplicateCode),
            Err(err) => Err(anyhow!("Failed to insert invitation: {err}")),
        }
    }

    async fn find_by_code(&self, code: &str) -> Result<Option<Invitation>> {
        let sql = format!("SELECT {INVITATION_COLUMNS} FROM invitations WHERE code = $1");
        let row = sqlx::query(&sql)
            .bind(code)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to look up invitation by code")?;
        row.as_ref().map(invitation_from_row).transpose()
    }

    async fn find_by_id(&self, id: u64) -> Result<Option<Invitation>> {
        let sql = format!("SELECT {INVITATION_COLUMNS} FROM invitations WHERE id = $1");
        let row = sqlx::query(&sql)
            .bind(sql_id(id)?)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to look up invitation")?;
        row.as_ref().map(invitation_from_row).transpose()
    }

    async fn list_pending(&self, store_id: u64, now: DateTime<Utc>) -> Result<Vec<Invitation>> {
        let sql = format!(
            "SELECT {INVITATION_COLUMNS} FROM invitations
             WHERE store_id = $1 AND status = $2 AND expires_at > $3
             ORDER BY created_at, id"
        );
        let rows = sqlx::query(&sql)
            .bind(sql_id(store_id)?)
            .bind(InvitationStatus::Pending.as_str())
            .bind(now)
            .fetch_all(&self.pool)
            .await
            .context("Failed to list pending invitations")?;
        rows.iter().map(invitation_from_row).collect()
    }

    async fn mark_expired(&self, id: u64) -> Result<bool> {
        self.transition(id, InvitationStatus::Expired).await
    }

    async fn accept(
        &self,
        id: u64,
        store_id: u64,
        user_id: u64,
        accepted_at: DateTime<Utc>,
    ) -> Result<AcceptOutcome> {
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            "UPDATE invitations SET status = $2, accepted_at = $3 WHERE id = $1 AND status = $4",
        )
        .bind(sql_id(id)?)
        .bind(InvitationStatus::Accepted.as_str())
        .bind(accepted_at)
        .bind(InvitationStatus::Pending.as_str())
        .execute(&mut *tx)
        .await
        .context("Failed to accept invitation")?;

        if updated.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(AcceptOutcome::NotPending);
        }

        let inserted = sqlx::query(
            "INSERT INTO store_staff (store_id, user_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
        )
        .bind(sql_id(store_id)?)
        .bind(sql_id(user_id)?)
        .execute(&mut *tx)
        .await
        .context("Failed to add staff member")?;

        if inserted.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(AcceptOutcome::AlreadyMember);
        }

        tx.commit().await?;
        Ok(AcceptOutcome::Accepted)
    }

    async fn reject(&self, id: u64) -> Result<bool> {
        self.transition(id, InvitationStatus::Rejected).await
    }
}

impl PgRepository {
    async fn transition(&self, id: u64, to: InvitationStatus) -> Result<bool> {
        let result = sqlx::query("UPDATE invitations SET status = $2 WHERE id = $1 AND status = $3")
            .bind(sql_id(id)?)
            .bind(to.as_str())
            .bind(InvitationStatus::Pending.as_str())
            .execute(&self.pool)
            .await
            .with_context(|| format!("Failed to mark invitation {id} as {to}"))?;
        Ok(result.rows_affected() > 0)
    }
}
