use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Account {
    pub id: u64,
    pub email: String,
    pub is_admin: bool,
    pub email_confirmed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Store {
    pub id: u64,
    pub merchant_id: u64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Merchant {
    pub id: u64,
    pub user_id: u64,
    pub business_name: String,
}

/// Read-side lookups the authorization core depends on.
#[async_trait]
pub trait AccountDirectory: Send + Sync {
    async fn account_by_id(&self, user_id: u64) -> Result<Option<Account>>;
    async fn store_by_id(&self, store_id: u64) -> Result<Option<Store>>;
    async fn merchant_by_user(&self, user_id: u64) -> Result<Option<Merchant>>;
    async fn is_merchant(&self, user_id: u64) -> Result<bool>;
}

/// Store staff membership. Rows are only created by invitation acceptance,
/// which owns that write inside its own transaction.
#[async_trait]
pub trait StaffRegistry: Send + Sync {
    async fn is_member(&self, store_id: u64, user_id: u64) -> Result<bool>;
    /// Ascending by store id.
    async fn store_ids_for_user(&self, user_id: u64) -> Result<Vec<u64>>;
    /// Returns false when no row existed.
    async fn remove_member(&self, store_id: u64, user_id: u64) -> Result<bool>;
}
