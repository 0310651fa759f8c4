//! Axum route handlers for associations and selection dialogs.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::association::AssociationKind;
use crate::notify::ChangePublisher;
use crate::selection::batch::{commit_changes, BatchResult};
use crate::selection::dialogs::{CommitTicket, DialogSnapshot};
use crate::session::Session;
use crate::state::AppState;

// ────────────────────────────────────────────────────────────────────────────
// Request / Response types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct AssociationListResponse {
    pub kind: AssociationKind,
    pub parent_id: Uuid,
    pub child_ids: Vec<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct OpenDialogRequest {
    pub kind: AssociationKind,
    pub parent_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct ToggleRequest {
    pub id: Uuid,
    pub checked: bool,
}

#[derive(Debug, Serialize)]
pub struct CommitResponse {
    pub success: bool,
    pub result: BatchResult,
    /// Ids whose call failed; still pending in `dialog` for a targeted retry.
    pub failed_ids: Vec<Uuid>,
    /// The reopened dialog when some changes are still pending; `null` once closed.
    pub dialog: Option<DialogSnapshot>,
}

// ────────────────────────────────────────────────────────────────────────────
// Handlers
// ────────────────────────────────────────────────────────────────────────────

/// GET /api/v1/associations/:kind/:parent_id
pub async fn handle_list_associations(
    State(state): State<AppState>,
    _session: Session,
    Path((kind, parent_id)): Path<(AssociationKind, Uuid)>,
) -> Result<Json<AssociationListResponse>, AppError> {
    let child_ids = state.store.list(kind, parent_id).await?;
    Ok(Json(AssociationListResponse {
        kind,
        parent_id,
        child_ids,
    }))
}

/// POST /api/v1/dialogs
pub async fn handle_open_dialog(
    State(state): State<AppState>,
    session: Session,
    Json(req): Json<OpenDialogRequest>,
) -> Result<(StatusCode, Json<DialogSnapshot>), AppError> {
    let original = state.store.list(req.kind, req.parent_id).await?;
    let snapshot = state
        .dialogs
        .open(&session, req.kind, req.parent_id, original);
    Ok((StatusCode::CREATED, Json(snapshot)))
}

/// GET /api/v1/dialogs/:id
pub async fn handle_get_dialog(
    State(state): State<AppState>,
    session: Session,
    Path(dialog_id): Path<Uuid>,
) -> Result<Json<DialogSnapshot>, AppError> {
    Ok(Json(state.dialogs.snapshot(&session, dialog_id)?))
}

/// POST /api/v1/dialogs/:id/toggle
pub async fn handle_toggle(
    State(state): State<AppState>,
    session: Session,
    Path(dialog_id): Path<Uuid>,
    Json(req): Json<ToggleRequest>,
) -> Result<Json<DialogSnapshot>, AppError> {
    let snapshot = state
        .dialogs
        .toggle(&session, dialog_id, req.id, req.checked)?;
    Ok(Json(snapshot))
}

/// POST /api/v1/dialogs/:id/commit
///
/// The commit runs on its own task so a client disconnect cannot leave the
/// dialog stuck in `Committing`.
pub async fn handle_commit(
    State(state): State<AppState>,
    session: Session,
    Path(dialog_id): Path<Uuid>,
) -> Result<Json<CommitResponse>, AppError> {
    let ticket = state.dialogs.begin_commit(&session, dialog_id)?;
    let response = tokio::spawn(run_commit(state, session, dialog_id, ticket))
        .await
        .map_err(|e| AppError::Internal(anyhow::anyhow!("Commit task failed: {e}")))?;
    Ok(Json(response))
}

/// DELETE /api/v1/dialogs/:id
pub async fn handle_cancel(
    State(state): State<AppState>,
    session: Session,
    Path(dialog_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    state.dialogs.cancel(&session, dialog_id)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn run_commit(
    state: AppState,
    session: Session,
    dialog_id: Uuid,
    ticket: CommitTicket,
) -> CommitResponse {
    let publisher = ChangePublisher::new(
        state.feed.clone(),
        ticket.kind,
        ticket.parent_id,
        session.user_id,
    );
    let result = commit_changes(
        state.store.clone(),
        ticket.kind,
        ticket.parent_id,
        &ticket.changes,
        &ticket.cancel,
        Some(publisher.clone()),
    )
    .await;
    if result.was_cancelled() {
        info!("Commit for dialog {dialog_id} was cancelled before all calls settled");
    }
    let dialog = state.dialogs.finish_commit(dialog_id, &result);
    publisher.publish_applied(result.applied()).await;

    CommitResponse {
        success: result.is_success(),
        failed_ids: result.failed().map(|(id, _)| id).collect(),
        result,
        dialog,
    }
}
