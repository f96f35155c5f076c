//! The fixed handler tables wired onto every accepted connection.

pub mod ide_requests;
pub mod running_tasks;
pub mod terminal_message;

use std::sync::Arc;

pub use ide_requests::{EditorActions, LoggingEditorActions};

use crate::handler::HandlerRegistration;
use crate::registry::RunningTasksRegistry;

/// Assemble the full handler table for a hub: running-task bookkeeping,
/// terminal output relay and the editor-action requests.
pub fn handler_table(
    actions: Arc<dyn EditorActions>,
    registry: Arc<RunningTasksRegistry>,
) -> Vec<HandlerRegistration> {
    let mut table = Vec::new();
    table.extend(running_tasks::registrations(registry));
    table.extend(terminal_message::registrations(actions.clone()));
    table.extend(ide_requests::registrations(actions));
    table
}
