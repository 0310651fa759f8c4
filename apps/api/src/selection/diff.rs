//! Selection Diff: tracks a multi-select edit against the associations that
//! existed when the dialog opened.
//!
//! Invariant: an id is in `pending` iff its membership in `selected` differs
//! from its membership in `original`, and the recorded `Change` is the
//! direction that reconciles the store with `selected`.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Change {
    Add,
    Remove,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionDiff<Id: Ord> {
    original: BTreeSet<Id>,
    selected: BTreeSet<Id>,
    pending: BTreeMap<Id, Change>,
}

impl<Id: Ord + Clone> SelectionDiff<Id> {
    /// Starts an edit: `selected` mirrors `original`, nothing pending.
    pub fn new(original: impl IntoIterator<Item = Id>) -> Self {
        let original: BTreeSet<Id> = original.into_iter().collect();
        Self {
            selected: original.clone(),
            original,
            pending: BTreeMap::new(),
        }
    }

    /// Records the user checking (`checked = true`) or unchecking `id`.
    pub fn toggle(&mut self, id: Id, checked: bool) {
        match (checked, self.original.contains(&id)) {
            (true, false) => {
                self.pending.insert(id.clone(), Change::Add);
            }
            (false, true) => {
                self.pending.insert(id.clone(), Change::Remove);
            }
            // Back to the original state for this id
            _ => {
                self.pending.remove(&id);
            }
        }

        if checked {
            self.selected.insert(id);
        } else {
            self.selected.remove(&id);
        }
    }

    pub fn original(&self) -> &BTreeSet<Id> {
        &self.original
    }

    pub fn selected(&self) -> &BTreeSet<Id> {
        &self.selected
    }

    pub fn pending_changes(&self) -> &BTreeMap<Id, Change> {
        &self.pending
    }

    pub fn has_changes(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Folds changes the store confirmed into `original`.
    ///
    /// Confirmed ids drop out of `pending`; anything not confirmed stays
    /// pending so it can be retried. Once every pending change is confirmed,
    /// `original == selected`.
    pub fn settle(&mut self, applied: impl IntoIterator<Item = (Id, Change)>) {
        for (id, change) in applied {
            match change {
                Change::Add => {
                    self.original.insert(id.clone());
                }
                Change::Remove => {
                    self.original.remove(&id);
                }
            }

            let in_original = self.original.contains(&id);
            if self.selected.contains(&id) == in_original {
                self.pending.remove(&id);
            } else {
                let change = if in_original { Change::Remove } else { Change::Add };
                self.pending.insert(id, change);
            }
        }
    }

    /// Discards the edit without touching the store.
    pub fn cancel(self) {}
}
