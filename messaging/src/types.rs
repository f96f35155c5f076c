//! Wire vocabulary shared by the hub and its peers.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Protocol method names. `ide/*` methods are acted on by the editor host;
/// `nx/*` methods report tool-side state up to it.
pub mod methods {
    pub const IDE_FOCUS_PROJECT: &str = "ide/focusProject";
    pub const IDE_FOCUS_TASK: &str = "ide/focusTask";
    pub const IDE_SHOW_FULL_PROJECT_GRAPH: &str = "ide/showFullProjectGraph";
    pub const IDE_OPEN_GENERATE_UI: &str = "ide/openGenerateUi";
    pub const IDE_GET_RUNNING_TASKS: &str = "ide/getRunningTasks";
    pub const NX_STARTED_RUNNING_TASKS: &str = "nx/startedRunningTasks";
    pub const NX_ENDED_RUNNING_TASKS: &str = "nx/endedRunningTasks";
    pub const NX_UPDATE_RUNNING_TASKS: &str = "nx/updateRunningTasks";
    pub const NX_TERMINAL_MESSAGE: &str = "nx/terminalMessage";
}

/// Connection lifecycle of the peer-side client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Error,
}

/// Lifecycle status of one reported task (or of the run it belongs to).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Running,
    Completed,
    Failed,
    Stopped,
}

/// One background task as reported by a tool process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunningTask {
    /// Target label, e.g. `app1:build`.
    pub name: String,
    pub status: TaskStatus,
    /// Continuous tasks (serve, watch) never complete on their own.
    pub continuous: bool,
    #[serde(default)]
    pub output: String,
    /// Stamped by the registry when reading the merged map; never trusted
    /// from the wire.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub connection_id: Option<String>,
    pub overall_run_status: TaskStatus,
}

/// One entry of an `nx/updateRunningTasks` batch: upsert when `task` is
/// present, remove the task otherwise.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatedTask {
    pub task_id: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub task: Option<RunningTask>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FocusProjectParams {
    pub project_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FocusTaskParams {
    pub project_name: String,
    pub task_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenGenerateUiParams {
    /// `collection:generator`, as accepted by the generate UI.
    pub generator_name: String,
    #[serde(default)]
    pub options: serde_json::Map<String, serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub cwd: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenGenerateUiResponse {
    pub log_file_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetRunningTasksResponse {
    pub running_tasks: HashMap<String, RunningTask>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn running_task_uses_camel_case_on_the_wire() {
        let task = RunningTask {
            name: "app1:build".to_string(),
            status: TaskStatus::Running,
            continuous: false,
            output: String::new(),
            connection_id: None,
            overall_run_status: TaskStatus::Running,
        };
        let raw = serde_json::to_value(&task).unwrap();
        assert_eq!(raw["overallRunStatus"], "running");
        assert!(raw.get("connectionId").is_none());
    }

    #[test]
    fn updated_task_without_body_means_removal() {
        let update: UpdatedTask = serde_json::from_value(json!({"taskId": "t1"})).unwrap();
        assert_eq!(update.task_id, "t1");
        assert!(update.task.is_none());
    }

    #[test]
    fn generate_ui_params_tolerate_missing_options() {
        let params: OpenGenerateUiParams =
            serde_json::from_value(json!({"generatorName": "@nx/js:library"})).unwrap();
        assert_eq!(params.generator_name, "@nx/js:library");
        assert!(params.options.is_empty());
        assert!(params.cwd.is_none());
    }
}
