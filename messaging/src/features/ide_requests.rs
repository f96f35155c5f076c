//! `ide/*` handlers: thin decoding shims in front of the editor collaborator.

use std::sync::Arc;

use futures::FutureExt;
use futures::future::{self, BoxFuture};
use tracing::info;

use crate::handler::{HandlerRegistration, NotificationRegistration, RequestRegistration};
use crate::types::{
    FocusProjectParams, FocusTaskParams, OpenGenerateUiParams, OpenGenerateUiResponse, methods,
};

/// Editor-side actions triggered by peers. The hub's contract ends at this
/// seam: decode the parameters, invoke the callback, relay any return value
/// back as the response.
pub trait EditorActions: Send + Sync + 'static {
    fn focus_project(&self, project_name: &str);
    fn focus_task(&self, project_name: &str, task_name: &str);
    fn show_full_project_graph(&self);
    fn terminal_message(&self, message: &str);
    fn open_generate_ui(
        &self,
        params: OpenGenerateUiParams,
    ) -> BoxFuture<'static, anyhow::Result<OpenGenerateUiResponse>>;
}

pub fn registrations(actions: Arc<dyn EditorActions>) -> Vec<HandlerRegistration> {
    vec![
        focus_project(actions.clone()),
        focus_task(actions.clone()),
        show_full_project_graph(actions.clone()),
        open_generate_ui(actions),
    ]
}

fn focus_project(actions: Arc<dyn EditorActions>) -> HandlerRegistration {
    NotificationRegistration::new(methods::IDE_FOCUS_PROJECT, move |connection_id| {
        let actions = actions.clone();
        move |params: FocusProjectParams| {
            info!(%connection_id, project = %params.project_name, "focus project");
            actions.focus_project(&params.project_name);
        }
    })
    .into()
}

fn focus_task(actions: Arc<dyn EditorActions>) -> HandlerRegistration {
    NotificationRegistration::new(methods::IDE_FOCUS_TASK, move |connection_id| {
        let actions = actions.clone();
        move |params: FocusTaskParams| {
            info!(
                %connection_id,
                project = %params.project_name,
                task = %params.task_name,
                "focus task"
            );
            actions.focus_task(&params.project_name, &params.task_name);
        }
    })
    .into()
}

fn show_full_project_graph(actions: Arc<dyn EditorActions>) -> HandlerRegistration {
    NotificationRegistration::new(methods::IDE_SHOW_FULL_PROJECT_GRAPH, move |connection_id| {
        let actions = actions.clone();
        move |_: ()| {
            info!(%connection_id, "show full project graph");
            actions.show_full_project_graph();
        }
    })
    .into()
}

fn open_generate_ui(actions: Arc<dyn EditorActions>) -> HandlerRegistration {
    RequestRegistration::new(methods::IDE_OPEN_GENERATE_UI, move |connection_id| {
        let actions = actions.clone();
        move |params: OpenGenerateUiParams| {
            info!(%connection_id, generator = %params.generator_name, "open generate ui");
            actions.open_generate_ui(params)
        }
    })
    .into()
}

/// Collaborator used by the standalone host binary and in tests: every
/// action is logged, and generate-ui requests resolve to a fabricated log
/// file name.
#[derive(Debug, Default)]
pub struct LoggingEditorActions;

impl EditorActions for LoggingEditorActions {
    fn focus_project(&self, project_name: &str) {
        info!("editor action: focus project {project_name}");
    }

    fn focus_task(&self, project_name: &str, task_name: &str) {
        info!("editor action: focus task {project_name}:{task_name}");
    }

    fn show_full_project_graph(&self) {
        info!("editor action: show full project graph");
    }

    fn terminal_message(&self, message: &str) {
        info!("terminal: {message}");
    }

    fn open_generate_ui(
        &self,
        params: OpenGenerateUiParams,
    ) -> BoxFuture<'static, anyhow::Result<OpenGenerateUiResponse>> {
        let log_file_name = generator_log_file_name(&params.generator_name);
        info!(
            "editor action: open generate ui for {} (log {log_file_name})",
            params.generator_name
        );
        future::ready(Ok(OpenGenerateUiResponse { log_file_name })).boxed()
    }
}

/// `collection:generator` becomes `generate-collection-generator.log`.
fn generator_log_file_name(generator_name: &str) -> String {
    format!("generate-{}.log", generator_name.replace([':', '/'], "-"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_file_name_flattens_generator_separators() {
        assert_eq!(
            generator_log_file_name("@nx/react:component"),
            "generate-@nx-react-component.log"
        );
    }
}
