//! `nx/terminalMessage`: raw terminal output pushed up by tool processes.

use std::sync::Arc;

use tracing::debug;

use crate::features::EditorActions;
use crate::handler::{HandlerRegistration, NotificationRegistration};
use crate::types::methods;

pub fn registrations(actions: Arc<dyn EditorActions>) -> Vec<HandlerRegistration> {
    vec![
        NotificationRegistration::new(methods::NX_TERMINAL_MESSAGE, move |connection_id| {
            let actions = actions.clone();
            move |message: String| {
                debug!(%connection_id, bytes = message.len(), "terminal message");
                actions.terminal_message(&message);
            }
        })
        .into(),
    ]
}
