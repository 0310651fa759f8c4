use anyhow::Result;
use async_trait::async_trait;
use sqlx::migrate::Migrator;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::{debug, info};
use uuid::Uuid;

use super::{AssociationStore, StoreError};
use crate::models::association::AssociationKind;

/// Schema for the association tables, embedded from `migrations/`.
static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// Postgres-backed store over the `application_tags` / `role_permissions` tables.
///
/// Table and column names come from `AssociationKind`, never from input.
#[derive(Clone)]
pub struct PgAssociationStore {
    pool: PgPool,
}

impl PgAssociationStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Creates the connection pool and brings the schema up to date.
    pub async fn connect(database_url: &str) -> Result<Self> {
        info!("Connecting to PostgreSQL...");

        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await?;

        info!("PostgreSQL connection pool established");

        MIGRATOR.run(&pool).await?;
        info!("Schema up to date ({} migration(s) known)", MIGRATOR.iter().count());

        Ok(Self::new(pool))
    }
}

#[async_trait]
impl AssociationStore for PgAssociationStore {
    async fn list(&self, kind: AssociationKind, parent_id: Uuid) -> Result<Vec<Uuid>, StoreError> {
        let sql = format!(
            "SELECT {child} FROM {table} WHERE {parent} = $1 ORDER BY {child}",
            child = kind.child_column(),
            table = kind.table(),
            parent = kind.parent_column(),
        );
        let ids = sqlx::query_scalar::<_, Uuid>(&sql)
            .bind(parent_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(ids)
    }

    async fn add(
        &self,
        kind: AssociationKind,
        parent_id: Uuid,
        child_id: Uuid,
    ) -> Result<(), StoreError> {
        // Idempotent: the (parent, child) pair is unique
        let sql = format!(
            "INSERT INTO {table} ({parent}, {child}) VALUES ($1, $2) ON CONFLICT DO NOTHING",
            table = kind.table(),
            parent = kind.parent_column(),
            child = kind.child_column(),
        );
        let result = sqlx::query(&sql)
            .bind(parent_id)
            .bind(child_id)
            .execute(&self.pool)
            .await?;
        debug!(
            "add {kind} {parent_id} -> {child_id}: {} row(s)",
            result.rows_affected()
        );
        Ok(())
    }

    async fn remove(
        &self,
        kind: AssociationKind,
        parent_id: Uuid,
        child_id: Uuid,
    ) -> Result<(), StoreError> {
        let sql = format!(
            "DELETE FROM {table} WHERE {parent} = $1 AND {child} = $2",
            table = kind.table(),
            parent = kind.parent_column(),
            child = kind.child_column(),
        );
        let result = sqlx::query(&sql)
            .bind(parent_id)
            .bind(child_id)
            .execute(&self.pool)
            .await?;
        debug!(
            "remove {kind} {parent_id} -> {child_id}: {} row(s)",
            result.rows_affected()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrations_create_every_association_table() {
        let sql: String = MIGRATOR.iter().map(|m| m.sql.as_ref()).collect();
        for kind in [AssociationKind::ApplicationTags, AssociationKind::RolePermissions] {
            assert!(sql.contains(&format!("CREATE TABLE IF NOT EXISTS {}", kind.table())));
            assert!(sql.contains(&format!(
                "PRIMARY KEY ({}, {})",
                kind.parent_column(),
                kind.child_column()
            )));
        }
    }
}
