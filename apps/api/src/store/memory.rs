use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use super::{AssociationStore, StoreError};
use crate::models::association::AssociationKind;

/// A single add/remove call seen by the in-memory store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreCall {
    Add(Uuid),
    Remove(Uuid),
}

/// Process-local store for `STORE_BACKEND=memory` and tests.
///
/// Test builds can seed links, inject per-child failures (`fail_on`, which
/// makes add/remove return `StoreError::Unavailable`) and delay every
/// mutation (`with_latency`).
#[derive(Default)]
pub struct InMemoryAssociationStore {
    links: Mutex<HashMap<(AssociationKind, Uuid), BTreeSet<Uuid>>>,
    failing: Mutex<HashSet<Uuid>>,
    calls: Mutex<Vec<StoreCall>>,
    latency: Option<Duration>,
}

impl InMemoryAssociationStore {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Seeds links without recording calls.
    #[cfg(test)]
    pub fn seed(&self, kind: AssociationKind, parent_id: Uuid, children: &[Uuid]) {
        let mut links = self.links.lock().unwrap_or_else(|e| e.into_inner());
        links
            .entry((kind, parent_id))
            .or_default()
            .extend(children.iter().copied());
    }

    #[cfg(test)]
    pub fn fail_on(&self, child_id: Uuid) {
        self.failing
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(child_id);
    }

    /// Every mutation attempted so far, in arrival order.
    #[cfg(test)]
    pub fn calls(&self) -> Vec<StoreCall> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn record(&self, call: StoreCall) {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(call);
    }

    fn check_failure(&self, child_id: Uuid) -> Result<(), StoreError> {
        let failing = self.failing.lock().unwrap_or_else(|e| e.into_inner());
        if failing.contains(&child_id) {
            return Err(StoreError::Unavailable(format!("write rejected for {child_id}")));
        }
        Ok(())
    }

    async fn simulate_latency(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }
}

#[async_trait]
impl AssociationStore for InMemoryAssociationStore {
    async fn list(&self, kind: AssociationKind, parent_id: Uuid) -> Result<Vec<Uuid>, StoreError> {
        let links = self.links.lock().unwrap_or_else(|e| e.into_inner());
        Ok(links
            .get(&(kind, parent_id))
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default())
    }

    async fn add(
        &self,
        kind: AssociationKind,
        parent_id: Uuid,
        child_id: Uuid,
    ) -> Result<(), StoreError> {
        self.record(StoreCall::Add(child_id));
        self.simulate_latency().await;
        self.check_failure(child_id)?;
        let mut links = self.links.lock().unwrap_or_else(|e| e.into_inner());
        links.entry((kind, parent_id)).or_default().insert(child_id);
        Ok(())
    }

    async fn remove(
        &self,
        kind: AssociationKind,
        parent_id: Uuid,
        child_id: Uuid,
    ) -> Result<(), StoreError> {
        self.record(StoreCall::Remove(child_id));
        self.simulate_latency().await;
        self.check_failure(child_id)?;
        let mut links = self.links.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(set) = links.get_mut(&(kind, parent_id)) {
            set.remove(&child_id);
        }
        Ok(())
    }
}
