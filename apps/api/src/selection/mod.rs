// Selection editing: tags on applications, permissions on roles.
// Implements: diff tracking, concurrent batch commit, server-held dialogs.
// All store access goes through the injected AssociationStore.

pub mod batch;
pub mod dialogs;
pub mod diff;
pub mod handlers;
