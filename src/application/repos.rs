//! Repository traits describing the external account and document stores.
//!
//! The export core treats both stores as key-value lookups with owner
//! metadata; the production adapters live in `infra::db`.

use async_trait::async_trait;
use thiserror::Error;
use time::Date;

use crate::domain::accounts::AccountRecord;
use crate::domain::documents::{DocumentKind, DocumentRecord};

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("resource not found")]
    NotFound,
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
    #[error("database timeout")]
    Timeout,
}

impl RepoError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }
}

#[async_trait]
pub trait AccountsRepo: Send + Sync {
    /// Fetch an account snapshot. `None` means the store has never seen the
    /// caller; the export flow treats that as a free account with no usage.
    async fn fetch_account(&self, account_id: &str) -> Result<Option<AccountRecord>, RepoError>;

    /// Record one consumed export for `today` and return the new count.
    ///
    /// Must be atomic at the storage layer: concurrent commits for the same
    /// account may never read-modify-write from the same base. A stale
    /// usage date resets the counter to one.
    async fn advance_usage(&self, account_id: &str, today: Date) -> Result<u32, RepoError>;
}

#[async_trait]
pub trait DocumentsRepo: Send + Sync {
    async fn fetch_document(
        &self,
        kind: DocumentKind,
        document_id: &str,
    ) -> Result<Option<DocumentRecord>, RepoError>;
}
