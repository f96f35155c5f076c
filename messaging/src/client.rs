//! Peer-side reconnecting client.
//!
//! An [`IdeClient`] owns at most one outbound connection to the workspace
//! hub and at most one pending reconnect timer. Transport loss after a
//! successful connect is retried a bounded number of times; exhaustion is
//! reported once through the disconnection callback. Operations never queue:
//! anything attempted while not connected fails immediately.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use anyhow::Context;
use thiserror::Error;
use tokio::net::UnixStream;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::constants;
use crate::transport::{MessageConnection, TransportError};
use crate::types::{
    ConnectionStatus, FocusProjectParams, FocusTaskParams, GetRunningTasksResponse,
    OpenGenerateUiParams, OpenGenerateUiResponse, RunningTask, methods,
};

#[derive(Debug, Clone)]
pub struct IdeClientConfig {
    /// Workspace root the socket path is derived from; must match the
    /// host's convention.
    pub workspace_root: PathBuf,
    pub max_reconnect_attempts: u32,
    pub reconnect_interval: Duration,
}

impl IdeClientConfig {
    pub fn new(workspace_root: impl Into<PathBuf>) -> Self {
        Self {
            workspace_root: workspace_root.into(),
            max_reconnect_attempts: constants::DEFAULT_MAX_RECONNECT_ATTEMPTS,
            reconnect_interval: constants::DEFAULT_RECONNECT_INTERVAL,
        }
    }
}

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("not connected to the editor host")]
    NotConnected,

    #[error("failed to connect to editor host at {}: {source}", path.display())]
    ConnectionFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Transport(#[from] TransportError),
}

#[derive(Default)]
struct ClientState {
    status: ConnectionStatus,
    reconnect_attempts: u32,
    connection: Option<MessageConnection>,
    reconnect_timer: Option<JoinHandle<()>>,
}

struct ClientInner {
    config: IdeClientConfig,
    state: Mutex<ClientState>,
    on_disconnection: Mutex<Option<Box<dyn Fn() + Send + Sync>>>,
}

#[derive(Clone)]
pub struct IdeClient {
    inner: Arc<ClientInner>,
}

impl IdeClient {
    pub fn new(config: IdeClientConfig) -> Self {
        Self {
            inner: Arc::new(ClientInner {
                config,
                state: Mutex::new(ClientState::default()),
                on_disconnection: Mutex::new(None),
            }),
        }
    }

    pub fn get_status(&self) -> ConnectionStatus {
        self.inner.state.lock().unwrap().status
    }

    /// Register the handler invoked once when reconnection gives up. The
    /// owner should treat the client as dead at that point.
    pub fn on_disconnection(&self, handler: impl Fn() + Send + Sync + 'static) {
        *self.inner.on_disconnection.lock().unwrap() = Some(Box::new(handler));
    }

    /// Open the transport. No-op when already connected or connecting. A
    /// failure is returned to the caller *and* fed into the reconnect state
    /// machine, so first-attempt failures are observable synchronously.
    pub async fn connect(&self) -> Result<(), ClientError> {
        self.inner.clone().connect().await
    }

    /// Deliberate teardown: cancels any pending reconnect and disposes the
    /// transport. This is the only path that stops automatic reconnection.
    pub fn disconnect(&self) {
        let mut state = self.inner.state.lock().unwrap();
        state.status = ConnectionStatus::Disconnected;
        if let Some(timer) = state.reconnect_timer.take() {
            timer.abort();
        }
        if let Some(connection) = state.connection.take() {
            connection.dispose();
        }
    }

    pub fn focus_project(&self, project_name: &str) -> Result<(), ClientError> {
        let params = FocusProjectParams {
            project_name: project_name.to_string(),
        };
        self.notify(methods::IDE_FOCUS_PROJECT, Some(to_value(params)?))
    }

    pub fn focus_task(&self, project_name: &str, task_name: &str) -> Result<(), ClientError> {
        let params = FocusTaskParams {
            project_name: project_name.to_string(),
            task_name: task_name.to_string(),
        };
        self.notify(methods::IDE_FOCUS_TASK, Some(to_value(params)?))
    }

    pub fn show_full_project_graph(&self) -> Result<(), ClientError> {
        self.notify(methods::IDE_SHOW_FULL_PROJECT_GRAPH, None)
    }

    /// Generic fire-and-forget notification for methods without a typed
    /// helper (the `nx/*` reporting family in particular).
    pub fn send_notification(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> Result<(), ClientError> {
        self.notify(method, params)
    }

    /// Ask the editor to open its generate UI; resolves to the log file
    /// name the editor will write generator output to.
    pub async fn open_generate_ui(
        &self,
        generator_name: &str,
        options: serde_json::Map<String, serde_json::Value>,
        cwd: Option<String>,
    ) -> Result<String, ClientError> {
        let connection = self.live_connection()?;
        let params = to_value(OpenGenerateUiParams {
            generator_name: generator_name.to_string(),
            options,
            cwd,
        })?;
        let result = connection
            .send_request(methods::IDE_OPEN_GENERATE_UI, Some(params))
            .await?;
        let response: OpenGenerateUiResponse =
            serde_json::from_value(result).map_err(TransportError::from)?;
        Ok(response.log_file_name)
    }

    /// Fetch the hub's merged view of currently running tasks.
    pub async fn get_running_tasks(&self) -> Result<HashMap<String, RunningTask>, ClientError> {
        let connection = self.live_connection()?;
        let result = connection
            .send_request(methods::IDE_GET_RUNNING_TASKS, None)
            .await?;
        let response: GetRunningTasksResponse =
            serde_json::from_value(result).map_err(TransportError::from)?;
        Ok(response.running_tasks)
    }

    fn notify(&self, method: &str, params: Option<serde_json::Value>) -> Result<(), ClientError> {
        let connection = self.live_connection()?;
        connection.send_notification(method, params)?;
        Ok(())
    }

    /// Operations never queue: anything but `connected` fails fast.
    fn live_connection(&self) -> Result<MessageConnection, ClientError> {
        let state = self.inner.state.lock().unwrap();
        if state.status != ConnectionStatus::Connected {
            return Err(ClientError::NotConnected);
        }
        state.connection.clone().ok_or(ClientError::NotConnected)
    }
}

impl ClientInner {
    async fn connect(self: Arc<Self>) -> Result<(), ClientError> {
        {
            let mut state = self.state.lock().unwrap();
            match state.status {
                ConnectionStatus::Connected | ConnectionStatus::Connecting => return Ok(()),
                _ => state.status = ConnectionStatus::Connecting,
            }
            // If a reconnect timer got us here it is done with; drop the
            // handle rather than aborting ourselves.
            state.reconnect_timer.take();
        }

        let socket_path = constants::resolve_socket_path(&self.config.workspace_root);
        match UnixStream::connect(&socket_path).await {
            Ok(stream) => {
                let connection = MessageConnection::new(stream);
                let weak: Weak<ClientInner> = Arc::downgrade(&self);
                connection.on_close(Box::new(move || {
                    if let Some(inner) = weak.upgrade() {
                        inner.handle_unexpected_close();
                    }
                }));
                connection.listen();

                let mut state = self.state.lock().unwrap();
                if state.status != ConnectionStatus::Connecting {
                    // Torn down while the connect was in flight.
                    connection.dispose();
                    return Ok(());
                }
                state.connection = Some(connection);
                state.status = ConnectionStatus::Connected;
                state.reconnect_attempts = 0;
                info!("connected to editor host at {}", socket_path.display());
                Ok(())
            }
            Err(e) => {
                debug!("connection to {} failed: {e}", socket_path.display());
                self.handle_unexpected_close();
                Err(ClientError::ConnectionFailed {
                    path: socket_path,
                    source: e,
                })
            }
        }
    }

    /// Shared path for transport loss and failed connect attempts. Either
    /// schedules exactly one retry or finalizes into `disconnected`.
    fn handle_unexpected_close(self: Arc<Self>) {
        let exhausted = {
            let mut state = self.state.lock().unwrap();
            if state.status == ConnectionStatus::Disconnected {
                // Deliberate teardown already in progress.
                return;
            }
            state.status = ConnectionStatus::Error;
            if let Some(connection) = state.connection.take() {
                connection.dispose();
            }

            if state.reconnect_attempts < self.config.max_reconnect_attempts {
                state.reconnect_attempts += 1;
                info!(
                    "reconnecting to editor host (attempt {}/{})",
                    state.reconnect_attempts, self.config.max_reconnect_attempts
                );
                if let Some(previous) = state.reconnect_timer.take() {
                    previous.abort();
                }
                let inner = Arc::clone(&self);
                let interval = self.config.reconnect_interval;
                state.reconnect_timer = Some(tokio::spawn(async move {
                    tokio::time::sleep(interval).await;
                    if let Err(e) = inner.connect().await {
                        debug!("reconnect attempt failed: {e}");
                    }
                }));
                false
            } else {
                warn!(
                    "giving up on editor host after {} reconnect attempts",
                    self.config.max_reconnect_attempts
                );
                state.status = ConnectionStatus::Disconnected;
                state.reconnect_timer = None;
                true
            }
        };

        if exhausted {
            if let Some(handler) = self.on_disconnection.lock().unwrap().as_ref() {
                handler();
            }
        }
    }
}

fn to_value(params: impl serde::Serialize) -> Result<serde_json::Value, ClientError> {
    serde_json::to_value(params)
        .map_err(TransportError::from)
        .map_err(ClientError::from)
}

/// Build a client for a tool process, or find out the host is not there.
///
/// Callers get either a verified, connected client or an error - never a
/// half-initialized one: the resolved path is probed first, then the client
/// connects and its status is checked before it is handed out.
pub async fn create_ide_client(workspace_root: impl Into<PathBuf>) -> anyhow::Result<IdeClient> {
    let config = IdeClientConfig::new(workspace_root);
    let socket_path = constants::resolve_socket_path(&config.workspace_root);

    // Probe before constructing anything: a missing or dead socket means
    // there is no host to talk to.
    UnixStream::connect(&socket_path)
        .await
        .with_context(|| format!("editor host not available at {}", socket_path.display()))?;

    let client = IdeClient::new(config);
    if let Err(e) = client.connect().await {
        client.disconnect();
        return Err(anyhow::Error::from(e).context("editor host not available"));
    }
    if client.get_status() != ConnectionStatus::Connected {
        client.disconnect();
        anyhow::bail!("editor host not available: connection did not come up");
    }
    Ok(client)
}
