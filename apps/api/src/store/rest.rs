//! REST association store: talks to the hosted backend's auto-generated table API.
//!
//! Filters use the `column=eq.value` query convention. Responses are
//! untyped JSON rows; `parse_rows` validates them before any id reaches the
//! domain.

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::{debug, warn};
use uuid::Uuid;

use super::{AssociationStore, StoreError};
use crate::models::association::AssociationKind;

#[derive(Debug, Deserialize)]
struct RestErrorBody {
    message: String,
}

#[derive(Clone)]
pub struct RestAssociationStore {
    client: Client,
    base_url: String,
    api_key: String,
}

impl RestAssociationStore {
    pub fn new(base_url: &str, api_key: String) -> Result<Self, StoreError> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    fn resource_url(&self, kind: AssociationKind) -> String {
        format!("{}/{}", self.base_url, kind.table())
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
    }

    async fn check(response: Response) -> Result<Response, StoreError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        warn!("Association store returned {}: {}", status, body);
        let message = serde_json::from_str::<RestErrorBody>(&body)
            .map(|e| e.message)
            .unwrap_or(body);
        Err(StoreError::Api {
            status: status.as_u16(),
            message,
        })
    }
}

#[async_trait]
impl AssociationStore for RestAssociationStore {
    async fn list(&self, kind: AssociationKind, parent_id: Uuid) -> Result<Vec<Uuid>, StoreError> {
        let select = format!("{},{}", kind.parent_column(), kind.child_column());
        let response = self
            .authorized(self.client.get(self.resource_url(kind)))
            .query(&[
                ("select", select),
                (kind.parent_column(), format!("eq.{parent_id}")),
            ])
            .send()
            .await?;
        let rows: Vec<Value> = Self::check(response).await?.json().await?;
        debug!("Fetched {} {kind} row(s) for {parent_id}", rows.len());
        parse_rows(kind, parent_id, rows)
    }

    async fn add(
        &self,
        kind: AssociationKind,
        parent_id: Uuid,
        child_id: Uuid,
    ) -> Result<(), StoreError> {
        let mut row = Map::new();
        row.insert(kind.parent_column().to_string(), json!(parent_id));
        row.insert(kind.child_column().to_string(), json!(child_id));

        let response = self
            .authorized(self.client.post(self.resource_url(kind)))
            // Duplicate pair is not an error
            .header("Prefer", "resolution=ignore-duplicates,return=minimal")
            .json(&Value::Object(row))
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    async fn remove(
        &self,
        kind: AssociationKind,
        parent_id: Uuid,
        child_id: Uuid,
    ) -> Result<(), StoreError> {
        let response = self
            .authorized(self.client.delete(self.resource_url(kind)))
            .header("Prefer", "return=minimal")
            .query(&[
                (kind.parent_column(), format!("eq.{parent_id}")),
                (kind.child_column(), format!("eq.{child_id}")),
            ])
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }
}

/// Validates raw rows and extracts the child ids, sorted and deduplicated.
///
/// Every row must be an object holding the kind's parent and child columns
/// as UUID strings, and its parent must be the one that was asked for.
pub fn parse_rows(
    kind: AssociationKind,
    parent_id: Uuid,
    rows: Vec<Value>,
) -> Result<Vec<Uuid>, StoreError> {
    let mut ids = Vec::with_capacity(rows.len());
    for (index, row) in rows.iter().enumerate() {
        let object = row
            .as_object()
            .ok_or_else(|| StoreError::Schema(format!("row {index} is not an object")))?;
        let row_parent = uuid_column(object, kind.parent_column(), index)?;
        if row_parent != parent_id {
            return Err(StoreError::Schema(format!(
                "row {index} belongs to {row_parent}, expected {parent_id}"
            )));
        }
        ids.push(uuid_column(object, kind.child_column(), index)?);
    }
    ids.sort();
    ids.dedup();
    Ok(ids)
}

fn uuid_column(object: &Map<String, Value>, column: &str, index: usize) -> Result<Uuid, StoreError> {
    let raw = object
        .get(column)
        .and_then(|v| v.as_str())
        .ok_or_else(|| StoreError::Schema(format!("row {index} is missing string column '{column}'")))?;
    Uuid::parse_str(raw)
        .map_err(|e| StoreError::Schema(format!("row {index} column '{column}' is not a UUID: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_rows_sorted_and_deduplicated() {
        let parent = Uuid::new_v4();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let rows = vec![
            json!({ "application_id": parent, "tag_id": b }),
            json!({ "application_id": parent, "tag_id": a }),
            json!({ "application_id": parent, "tag_id": b }),
        ];
        let ids = parse_rows(AssociationKind::ApplicationTags, parent, rows).unwrap();
        let mut expected = vec![a, b];
        expected.sort();
        assert_eq!(ids, expected);
    }

    #[test]
    fn test_parse_rows_rejects_missing_column() {
        let parent = Uuid::new_v4();
        let rows = vec![json!({ "role_id": parent })];
        let err = parse_rows(AssociationKind::RolePermissions, parent, rows).unwrap_err();
        assert!(matches!(err, StoreError::Schema(msg) if msg.contains("permission_id")));
    }

    #[test]
    fn test_parse_rows_rejects_non_uuid() {
        let parent = Uuid::new_v4();
        let rows = vec![json!({ "role_id": parent, "permission_id": 42 })];
        assert!(matches!(
            parse_rows(AssociationKind::RolePermissions, parent, rows),
            Err(StoreError::Schema(_))
        ));
        let rows = vec![json!({ "role_id": parent, "permission_id": "jobs.edit" })];
        assert!(matches!(
            parse_rows(AssociationKind::RolePermissions, parent, rows),
            Err(StoreError::Schema(_))
        ));
    }

    #[test]
    fn test_parse_rows_rejects_foreign_parent() {
        let parent = Uuid::new_v4();
        let rows = vec![json!({ "application_id": Uuid::new_v4(), "tag_id": Uuid::new_v4() })];
        assert!(matches!(
            parse_rows(AssociationKind::ApplicationTags, parent, rows),
            Err(StoreError::Schema(_))
        ));
    }

    #[test]
    fn test_parse_rows_rejects_non_object() {
        let parent = Uuid::new_v4();
        let rows = vec![json!("tag")];
        assert!(matches!(
            parse_rows(AssociationKind::ApplicationTags, parent, rows),
            Err(StoreError::Schema(_))
        ));
    }

    #[test]
    fn test_resource_url_trims_trailing_slash() {
        let store = RestAssociationStore::new("https://store.example.com/rest/v1/", "key".into())
            .unwrap();
        assert_eq!(
            store.resource_url(AssociationKind::RolePermissions),
            "https://store.example.com/rest/v1/role_permissions"
        );
    }
}
