//! Change feed: realtime notifications for association edits.
//!
//! `AppState` holds an `Arc<dyn ChangeFeed>`: `RedisChangeFeed` when
//! `REDIS_URL` is set, `NoopChangeFeed` otherwise. Publishing is best-effort;
//! callers log failures and carry on.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use thiserror::Error;
use tokio::sync::OnceCell;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::models::association::{AssociationChanged, AssociationKind};
use crate::selection::diff::Change;

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Encode error: {0}")]
    Encode(#[from] serde_json::Error),
}

#[async_trait]
pub trait ChangeFeed: Send + Sync {
    async fn publish(&self, event: &AssociationChanged) -> Result<(), FeedError>;
}

/// Channel subscribers listen on for one association kind.
pub fn channel_for(kind: AssociationKind) -> String {
    format!("ats:associations:{kind}")
}

pub struct RedisChangeFeed {
    client: redis::Client,
    connection: OnceCell<MultiplexedConnection>,
}

impl RedisChangeFeed {
    pub fn new(client: redis::Client) -> Self {
        Self {
            client,
            connection: OnceCell::new(),
        }
    }

    async fn connection(&self) -> Result<MultiplexedConnection, FeedError> {
        let conn = self
            .connection
            .get_or_try_init(|| self.client.get_multiplexed_async_connection())
            .await?;
        Ok(conn.clone())
    }
}

#[async_trait]
impl ChangeFeed for RedisChangeFeed {
    async fn publish(&self, event: &AssociationChanged) -> Result<(), FeedError> {
        let channel = channel_for(event.kind);
        let payload = serde_json::to_string(event)?;
        let mut conn = self.connection().await?;
        let receivers: i64 = conn.publish(&channel, payload).await?;
        debug!("Published change on {channel} to {receivers} subscriber(s)");
        Ok(())
    }
}

/// Used when no Redis is configured.
pub struct NoopChangeFeed;

#[async_trait]
impl ChangeFeed for NoopChangeFeed {
    async fn publish(&self, event: &AssociationChanged) -> Result<(), FeedError> {
        debug!(
            "Change feed disabled; dropping {} event for {}",
            event.kind, event.parent_id
        );
        Ok(())
    }
}

/// Publishes the applied part of one commit on behalf of `actor`.
///
/// Cloned into the late-result drain so calls that land after a cancel are
/// still announced.
#[derive(Clone)]
pub struct ChangePublisher {
    feed: Arc<dyn ChangeFeed>,
    kind: AssociationKind,
    parent_id: Uuid,
    actor: Uuid,
}

impl ChangePublisher {
    pub fn new(feed: Arc<dyn ChangeFeed>, kind: AssociationKind, parent_id: Uuid, actor: Uuid) -> Self {
        Self {
            feed,
            kind,
            parent_id,
            actor,
        }
    }

    /// Sends one event for `applied`. Nothing is sent when it is empty.
    pub async fn publish_applied(&self, applied: impl IntoIterator<Item = (Uuid, Change)>) {
        let (added, removed): (Vec<_>, Vec<_>) = applied
            .into_iter()
            .partition(|(_, change)| *change == Change::Add);
        if added.is_empty() && removed.is_empty() {
            return;
        }

        let event = AssociationChanged {
            kind: self.kind,
            parent_id: self.parent_id,
            added: added.into_iter().map(|(id, _)| id).collect(),
            removed: removed.into_iter().map(|(id, _)| id).collect(),
            actor: self.actor,
            occurred_at: Utc::now(),
        };
        if let Err(e) = self.feed.publish(&event).await {
            warn!(
                "Failed to publish {} change for {}: {e}",
                self.kind, self.parent_id
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    #[derive(Default)]
    struct CollectingFeed {
        events: Mutex<Vec<AssociationChanged>>,
    }

    #[async_trait]
    impl ChangeFeed for CollectingFeed {
        async fn publish(&self, event: &AssociationChanged) -> Result<(), FeedError> {
            self.events.lock().unwrap().push(event.clone());
            Ok(())
        }
    }

    #[test]
    fn test_channel_per_kind() {
        assert_eq!(
            channel_for(AssociationKind::ApplicationTags),
            "ats:associations:application_tags"
        );
        assert_eq!(
            channel_for(AssociationKind::RolePermissions),
            "ats:associations:role_permissions"
        );
    }

    #[tokio::test]
    async fn test_noop_feed_accepts_events() {
        let event = AssociationChanged {
            kind: AssociationKind::ApplicationTags,
            parent_id: Uuid::new_v4(),
            added: vec![Uuid::new_v4()],
            removed: vec![],
            actor: Uuid::new_v4(),
            occurred_at: Utc::now(),
        };
        assert!(NoopChangeFeed.publish(&event).await.is_ok());
    }

    #[tokio::test]
    async fn test_publisher_splits_adds_and_removes() {
        let feed = Arc::new(CollectingFeed::default());
        let (parent, actor, a, b) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let publisher =
            ChangePublisher::new(feed.clone(), AssociationKind::RolePermissions, parent, actor);

        publisher
            .publish_applied([(a, Change::Add), (b, Change::Remove)])
            .await;

        let events = feed.events.lock().unwrap().clone();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].added, vec![a]);
        assert_eq!(events[0].removed, vec![b]);
        assert_eq!(events[0].actor, actor);
        assert_eq!(events[0].parent_id, parent);
    }

    #[tokio::test]
    async fn test_publisher_skips_empty_batches() {
        let feed = Arc::new(CollectingFeed::default());
        let publisher = ChangePublisher::new(
            feed.clone(),
            AssociationKind::ApplicationTags,
            Uuid::new_v4(),
            Uuid::new_v4(),
        );
        publisher.publish_applied(Vec::new()).await;
        assert!(feed.events.lock().unwrap().is_empty());
    }
}
