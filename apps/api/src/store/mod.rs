//! Remote association store: the system of record for tag and permission links.
//!
//! `AppState` carries an `Arc<dyn AssociationStore>` chosen at startup from
//! `STORE_BACKEND`. Handlers and the batch committer only ever see the trait.

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::models::association::AssociationKind;

pub mod memory;
pub mod postgres;
pub mod rest;

pub use memory::InMemoryAssociationStore;
pub use postgres::PgAssociationStore;
pub use rest::RestAssociationStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Store API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Store returned malformed data: {0}")]
    Schema(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Add/remove/list contract over many-to-many links.
///
/// `add` and `remove` are idempotent: adding a present link or removing an
/// absent one succeeds.
#[async_trait]
pub trait AssociationStore: Send + Sync {
    /// Child ids currently linked to `parent_id`, in ascending order.
    async fn list(&self, kind: AssociationKind, parent_id: Uuid) -> Result<Vec<Uuid>, StoreError>;

    async fn add(
        &self,
        kind: AssociationKind,
        parent_id: Uuid,
        child_id: Uuid,
    ) -> Result<(), StoreError>;

    async fn remove(
        &self,
        kind: AssociationKind,
        parent_id: Uuid,
        child_id: Uuid,
    ) -> Result<(), StoreError>;
}
