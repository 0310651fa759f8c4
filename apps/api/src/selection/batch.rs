//! Batch commit: applies pending changes as independent, concurrent store calls.
//!
//! Every pending id gets exactly one add or remove call. Calls are spawned
//! together and joined; their order is unspecified. Failures are reported per
//! id and never rolled back.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::models::association::AssociationKind;
use crate::notify::ChangePublisher;
use crate::selection::diff::Change;
use crate::store::{AssociationStore, StoreError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ItemStatus {
    Applied,
    Failed { error: String },
    /// The commit was cancelled before this call reported back.
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemOutcome {
    pub change: Change,
    #[serde(flatten)]
    pub status: ItemStatus,
}

/// Per-id outcome of one commit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchResult {
    pub outcomes: BTreeMap<Uuid, ItemOutcome>,
}

impl BatchResult {
    /// True when every call was applied. An empty batch succeeds.
    pub fn is_success(&self) -> bool {
        self.outcomes
            .values()
            .all(|o| o.status == ItemStatus::Applied)
    }

    pub fn was_cancelled(&self) -> bool {
        self.outcomes
            .values()
            .any(|o| o.status == ItemStatus::Cancelled)
    }

    pub fn applied(&self) -> impl Iterator<Item = (Uuid, Change)> + '_ {
        self.outcomes
            .iter()
            .filter(|(_, o)| o.status == ItemStatus::Applied)
            .map(|(id, o)| (*id, o.change))
    }

    pub fn failed(&self) -> impl Iterator<Item = (Uuid, &str)> + '_ {
        self.outcomes.iter().filter_map(|(id, o)| match &o.status {
            ItemStatus::Failed { error } => Some((*id, error.as_str())),
            _ => None,
        })
    }
}

type CallReport = (Uuid, Change, Result<(), StoreError>);

/// Issues one store call per entry in `changes` and waits for all of them.
///
/// Returns immediately, with no calls, when `changes` is empty. If `cancel`
/// fires first, unsettled ids come back `Cancelled`; their calls keep running,
/// their late results are logged and the ones that applied go to `late`.
pub async fn commit_changes(
    store: Arc<dyn AssociationStore>,
    kind: AssociationKind,
    parent_id: Uuid,
    changes: &BTreeMap<Uuid, Change>,
    cancel: &CancellationToken,
    late: Option<ChangePublisher>,
) -> BatchResult {
    let mut result = BatchResult::default();
    if changes.is_empty() {
        debug!("No pending {kind} changes for {parent_id}; nothing to commit");
        return result;
    }
    if cancel.is_cancelled() {
        for (&id, &change) in changes {
            result.outcomes.insert(
                id,
                ItemOutcome {
                    change,
                    status: ItemStatus::Cancelled,
                },
            );
        }
        return result;
    }

    let (tx, mut rx) = mpsc::channel::<CallReport>(changes.len());
    for (&child_id, &change) in changes {
        let store = Arc::clone(&store);
        let tx = tx.clone();
        tokio::spawn(async move {
            let outcome = match change {
                Change::Add => store.add(kind, parent_id, child_id).await,
                Change::Remove => store.remove(kind, parent_id, child_id).await,
            };
            // Receiver outlives every sender: see drain_late_results
            let _ = tx.send((child_id, change, outcome)).await;
        });
    }
    drop(tx);

    let mut cancelled = false;
    while result.outcomes.len() < changes.len() {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                cancelled = true;
                break;
            }
            report = rx.recv() => match report {
                Some((id, change, outcome)) => {
                    result.outcomes.insert(id, to_item_outcome(kind, parent_id, id, change, outcome));
                }
                // All senders gone without reporting: a call task panicked
                None => break,
            },
        }
    }

    for (&id, &change) in changes {
        result.outcomes.entry(id).or_insert_with(|| ItemOutcome {
            change,
            status: if cancelled {
                ItemStatus::Cancelled
            } else {
                ItemStatus::Failed {
                    error: "store call aborted before reporting".to_string(),
                }
            },
        });
    }

    if cancelled {
        warn!("Commit of {kind} changes for {parent_id} cancelled with calls in flight");
        tokio::spawn(drain_late_results(rx, kind, parent_id, late));
    }

    let applied = result.applied().count();
    info!(
        "Committed {applied}/{} {kind} change(s) for {parent_id}",
        changes.len()
    );
    result
}

fn to_item_outcome(
    kind: AssociationKind,
    parent_id: Uuid,
    child_id: Uuid,
    change: Change,
    outcome: Result<(), StoreError>,
) -> ItemOutcome {
    let status = match outcome {
        Ok(()) => ItemStatus::Applied,
        Err(e) => {
            warn!("{change:?} {kind} {parent_id} -> {child_id} failed: {e}");
            ItemStatus::Failed {
                error: e.to_string(),
            }
        }
    };
    ItemOutcome { change, status }
}

/// Logs results that arrive after the commit stopped listening, then
/// publishes the late applied ones as a single follow-up change.
async fn drain_late_results(
    mut rx: mpsc::Receiver<CallReport>,
    kind: AssociationKind,
    parent_id: Uuid,
    late: Option<ChangePublisher>,
) {
    let mut applied = Vec::new();
    while let Some((child_id, change, outcome)) = rx.recv().await {
        match outcome {
            Ok(()) => {
                info!(
                    "Late result after cancel: {change:?} {kind} {parent_id} -> {child_id} applied"
                );
                applied.push((child_id, change));
            }
            Err(e) => warn!(
                "Late result after cancel: {change:?} {kind} {parent_id} -> {child_id} failed: {e}"
            ),
        }
    }
    if let Some(publisher) = late {
        publisher.publish_applied(applied).await;
    }
}
