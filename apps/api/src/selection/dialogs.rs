//! Dialog registry: server-held selection dialogs, one per open edit.
//!
//! Lifecycle per dialog: `open` → `toggle`* → `begin_commit` → `finish_commit`
//! (closed on full success, reopened with the failed items otherwise), or
//! `cancel` at any point. A dialog belongs to the session that opened it.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::Uuid;

use crate::models::association::AssociationKind;
use crate::selection::batch::BatchResult;
use crate::selection::diff::{Change, SelectionDiff};
use crate::session::Session;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DialogError {
    #[error("Dialog {0} not found")]
    NotFound(Uuid),

    #[error("Dialog belongs to another session")]
    NotOwner,

    #[error("Dialog {0} is already committing")]
    Committing(Uuid),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DialogPhase {
    Open,
    Committing,
}

/// Client-facing view of a dialog.
#[derive(Debug, Clone, Serialize)]
pub struct DialogSnapshot {
    pub dialog_id: Uuid,
    pub kind: AssociationKind,
    pub parent_id: Uuid,
    pub state: DialogPhase,
    pub opened_at: DateTime<Utc>,
    pub original: Vec<Uuid>,
    pub selected: Vec<Uuid>,
    pub pending: BTreeMap<Uuid, Change>,
}

/// Everything a commit needs once the dialog is locked in `Committing`.
#[derive(Debug, Clone)]
pub struct CommitTicket {
    pub kind: AssociationKind,
    pub parent_id: Uuid,
    pub changes: BTreeMap<Uuid, Change>,
    pub cancel: CancellationToken,
}

enum DialogState {
    Open,
    Committing(CancellationToken),
}

struct Dialog {
    owner: Uuid,
    kind: AssociationKind,
    parent_id: Uuid,
    opened_at: DateTime<Utc>,
    last_active: Instant,
    diff: SelectionDiff<Uuid>,
    state: DialogState,
}

impl Dialog {
    fn snapshot(&self, dialog_id: Uuid) -> DialogSnapshot {
        DialogSnapshot {
            dialog_id,
            kind: self.kind,
            parent_id: self.parent_id,
            state: match self.state {
                DialogState::Open => DialogPhase::Open,
                DialogState::Committing(_) => DialogPhase::Committing,
            },
            opened_at: self.opened_at,
            original: self.diff.original().iter().copied().collect(),
            selected: self.diff.selected().iter().copied().collect(),
            pending: self.diff.pending_changes().clone(),
        }
    }
}

#[derive(Default)]
pub struct DialogRegistry {
    dialogs: Mutex<HashMap<Uuid, Dialog>>,
}

impl DialogRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_owned<T>(
        &self,
        session: &Session,
        dialog_id: Uuid,
        f: impl FnOnce(&mut Dialog) -> Result<T, DialogError>,
    ) -> Result<T, DialogError> {
        let mut dialogs = self.dialogs.lock().unwrap_or_else(|e| e.into_inner());
        let dialog = dialogs
            .get_mut(&dialog_id)
            .ok_or(DialogError::NotFound(dialog_id))?;
        if dialog.owner != session.user_id {
            return Err(DialogError::NotOwner);
        }
        dialog.last_active = Instant::now();
        f(dialog)
    }

    /// Registers a new dialog seeded with the associations that exist now.
    pub fn open(
        &self,
        session: &Session,
        kind: AssociationKind,
        parent_id: Uuid,
        original: Vec<Uuid>,
    ) -> DialogSnapshot {
        let dialog_id = Uuid::new_v4();
        let dialog = Dialog {
            owner: session.user_id,
            kind,
            parent_id,
            opened_at: Utc::now(),
            last_active: Instant::now(),
            diff: SelectionDiff::new(original),
            state: DialogState::Open,
        };
        let snapshot = dialog.snapshot(dialog_id);
        self.dialogs
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(dialog_id, dialog);
        info!("Opened {kind} dialog {dialog_id} on {parent_id}");
        snapshot
    }

    pub fn snapshot(&self, session: &Session, dialog_id: Uuid) -> Result<DialogSnapshot, DialogError> {
        self.with_owned(session, dialog_id, |dialog| Ok(dialog.snapshot(dialog_id)))
    }

    pub fn toggle(
        &self,
        session: &Session,
        dialog_id: Uuid,
        child_id: Uuid,
        checked: bool,
    ) -> Result<DialogSnapshot, DialogError> {
        self.with_owned(session, dialog_id, |dialog| {
            if let DialogState::Committing(_) = dialog.state {
                return Err(DialogError::Committing(dialog_id));
            }
            dialog.diff.toggle(child_id, checked);
            Ok(dialog.snapshot(dialog_id))
        })
    }

    /// Moves the dialog to `Committing` and hands out the changes to apply.
    pub fn begin_commit(&self, session: &Session, dialog_id: Uuid) -> Result<CommitTicket, DialogError> {
        self.with_owned(session, dialog_id, |dialog| {
            if let DialogState::Committing(_) = dialog.state {
                return Err(DialogError::Committing(dialog_id));
            }
            let cancel = CancellationToken::new();
            dialog.state = DialogState::Committing(cancel.clone());
            Ok(CommitTicket {
                kind: dialog.kind,
                parent_id: dialog.parent_id,
                changes: dialog.diff.pending_changes().clone(),
                cancel,
            })
        })
    }

    /// Applies a commit's outcome to its dialog.
    ///
    /// Returns the reopened dialog when changes remain pending, `None` when
    /// the dialog closed (fully committed, or cancelled meanwhile).
    pub fn finish_commit(&self, dialog_id: Uuid, result: &BatchResult) -> Option<DialogSnapshot> {
        let mut dialogs = self.dialogs.lock().unwrap_or_else(|e| e.into_inner());
        let dialog = dialogs.get_mut(&dialog_id)?;
        dialog.diff.settle(result.applied());
        dialog.state = DialogState::Open;
        dialog.last_active = Instant::now();

        if dialog.diff.has_changes() {
            debug!(
                "Dialog {dialog_id} reopened with {} pending change(s)",
                dialog.diff.pending_changes().len()
            );
            return Some(dialog.snapshot(dialog_id));
        }
        dialogs.remove(&dialog_id);
        info!("Dialog {dialog_id} committed and closed");
        None
    }

    /// Closes the dialog without touching the store. Signals an in-flight
    /// commit to stop waiting.
    pub fn cancel(&self, session: &Session, dialog_id: Uuid) -> Result<(), DialogError> {
        let mut dialogs = self.dialogs.lock().unwrap_or_else(|e| e.into_inner());
        match dialogs.get(&dialog_id) {
            None => return Err(DialogError::NotFound(dialog_id)),
            Some(dialog) if dialog.owner != session.user_id => return Err(DialogError::NotOwner),
            Some(_) => {}
        }
        if let Some(dialog) = dialogs.remove(&dialog_id) {
            if let DialogState::Committing(token) = &dialog.state {
                token.cancel();
            }
            dialog.diff.cancel();
        }
        info!("Dialog {dialog_id} cancelled");
        Ok(())
    }

    /// Drops open dialogs idle for longer than `max_idle`. Committing
    /// dialogs are left alone. Returns how many were dropped.
    pub fn sweep_idle(&self, max_idle: Duration) -> usize {
        let mut dialogs = self.dialogs.lock().unwrap_or_else(|e| e.into_inner());
        let before = dialogs.len();
        dialogs.retain(|_, dialog| {
            matches!(dialog.state, DialogState::Committing(_))
                || dialog.last_active.elapsed() <= max_idle
        });
        let swept = before - dialogs.len();
        if swept > 0 {
            info!("Swept {swept} idle dialog(s)");
        }
        swept
    }

    pub fn len(&self) -> usize {
        self.dialogs.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::selection::batch::{ItemOutcome, ItemStatus};

    fn session() -> Session {
        Session {
            user_id: Uuid::new_v4(),
        }
    }

    fn outcome(change: Change, status: ItemStatus) -> ItemOutcome {
        ItemOutcome { change, status }
    }

    #[test]
    fn test_open_seeds_selected_from_original() {
        let registry = DialogRegistry::new();
        let tag = Uuid::new_v4();
        let snap = registry.open(&session(), AssociationKind::ApplicationTags, Uuid::new_v4(), vec![tag]);
        assert_eq!(snap.original, vec![tag]);
        assert_eq!(snap.selected, vec![tag]);
        assert!(snap.pending.is_empty());
        assert_eq!(snap.state, DialogPhase::Open);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_other_session_is_rejected() {
        let registry = DialogRegistry::new();
        let owner = session();
        let snap = registry.open(&owner, AssociationKind::RolePermissions, Uuid::new_v4(), vec![]);
        let intruder = session();

        assert_eq!(
            registry.toggle(&intruder, snap.dialog_id, Uuid::new_v4(), true).unwrap_err(),
            DialogError::NotOwner
        );
        assert_eq!(registry.cancel(&intruder, snap.dialog_id), Err(DialogError::NotOwner));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_unknown_dialog() {
        let registry = DialogRegistry::new();
        let id = Uuid::new_v4();
        assert_eq!(
            registry.snapshot(&session(), id).unwrap_err(),
            DialogError::NotFound(id)
        );
    }

    #[test]
    fn test_toggle_and_commit_is_exclusive() {
        let registry = DialogRegistry::new();
        let owner = session();
        let snap = registry.open(&owner, AssociationKind::ApplicationTags, Uuid::new_v4(), vec![]);
        let tag = Uuid::new_v4();
        registry.toggle(&owner, snap.dialog_id, tag, true).unwrap();

        let ticket = registry.begin_commit(&owner, snap.dialog_id).unwrap();
        assert_eq!(ticket.changes.get(&tag), Some(&Change::Add));

        assert_eq!(
            registry.begin_commit(&owner, snap.dialog_id).unwrap_err(),
            DialogError::Committing(snap.dialog_id)
        );
        assert_eq!(
            registry.toggle(&owner, snap.dialog_id, tag, false).unwrap_err(),
            DialogError::Committing(snap.dialog_id)
        );
    }

    #[test]
    fn test_full_success_closes_dialog() {
        let registry = DialogRegistry::new();
        let owner = session();
        let snap = registry.open(&owner, AssociationKind::ApplicationTags, Uuid::new_v4(), vec![]);
        let tag = Uuid::new_v4();
        registry.toggle(&owner, snap.dialog_id, tag, true).unwrap();
        registry.begin_commit(&owner, snap.dialog_id).unwrap();

        let mut result = BatchResult::default();
        result.outcomes.insert(tag, outcome(Change::Add, ItemStatus::Applied));
        assert!(registry.finish_commit(snap.dialog_id, &result).is_none());
        assert_eq!(registry.len(), 0);
    }

    #[test]
    fn test_partial_failure_reopens_with_failed_items() {
        let registry = DialogRegistry::new();
        let owner = session();
        let keep = Uuid::new_v4();
        let snap = registry.open(&owner, AssociationKind::ApplicationTags, Uuid::new_v4(), vec![keep]);
        let (ok, bad) = (Uuid::new_v4(), Uuid::new_v4());
        registry.toggle(&owner, snap.dialog_id, ok, true).unwrap();
        registry.toggle(&owner, snap.dialog_id, bad, true).unwrap();
        registry.begin_commit(&owner, snap.dialog_id).unwrap();

        let mut result = BatchResult::default();
        result.outcomes.insert(ok, outcome(Change::Add, ItemStatus::Applied));
        result.outcomes.insert(
            bad,
            outcome(Change::Add, ItemStatus::Failed { error: "down".to_string() }),
        );

        let reopened = registry.finish_commit(snap.dialog_id, &result).unwrap();
        assert_eq!(reopened.state, DialogPhase::Open);
        assert_eq!(reopened.pending.len(), 1);
        assert_eq!(reopened.pending.get(&bad), Some(&Change::Add));
        assert!(reopened.original.contains(&ok));

        // Retry is allowed again
        assert!(registry.begin_commit(&owner, snap.dialog_id).is_ok());
    }

    #[test]
    fn test_cancel_while_committing_fires_token() {
        let registry = DialogRegistry::new();
        let owner = session();
        let snap = registry.open(&owner, AssociationKind::ApplicationTags, Uuid::new_v4(), vec![]);
        registry.toggle(&owner, snap.dialog_id, Uuid::new_v4(), true).unwrap();
        let ticket = registry.begin_commit(&owner, snap.dialog_id).unwrap();

        registry.cancel(&owner, snap.dialog_id).unwrap();
        assert!(ticket.cancel.is_cancelled());
        assert!(registry.finish_commit(snap.dialog_id, &BatchResult::default()).is_none());
        assert_eq!(registry.len(), 0);
    }

    #[test]
    fn test_sweep_idle_skips_committing() {
        let registry = DialogRegistry::new();
        let owner = session();
        let idle = registry.open(&owner, AssociationKind::ApplicationTags, Uuid::new_v4(), vec![]);
        let busy = registry.open(&owner, AssociationKind::ApplicationTags, Uuid::new_v4(), vec![]);
        registry.begin_commit(&owner, busy.dialog_id).unwrap();
        std::thread::sleep(Duration::from_millis(5));

        assert_eq!(registry.sweep_idle(Duration::ZERO), 1);
        assert!(registry.snapshot(&owner, idle.dialog_id).is_err());
        assert_eq!(
            registry.snapshot(&owner, busy.dialog_id).unwrap().state,
            DialogPhase::Committing
        );
    }
}
