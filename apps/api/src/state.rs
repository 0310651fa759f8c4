use std::sync::Arc;

use crate::notify::ChangeFeed;
use crate::selection::dialogs::DialogRegistry;
use crate::store::AssociationStore;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    /// Remote association store. Backend picked via STORE_BACKEND.
    pub store: Arc<dyn AssociationStore>,
    /// Realtime change notifications. No-op unless REDIS_URL is set.
    pub feed: Arc<dyn ChangeFeed>,
    /// Open selection dialogs.
    pub dialogs: Arc<DialogRegistry>,
}
