//! The listening multiplexer: accepts peer connections on the workspace
//! socket and applies the static handler table to each.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use tokio::net::UnixListener;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::constants;
use crate::handler::{ConnectionId, HandlerRegistration};
use crate::transport::MessageConnection;

pub struct MessagingHub {
    registrations: Arc<Vec<HandlerRegistration>>,
    listener_task: Option<JoinHandle<()>>,
    socket_path: Option<PathBuf>,
}

impl MessagingHub {
    /// The registration list is fixed here; every accepted connection gets
    /// the same table.
    pub fn new(registrations: Vec<HandlerRegistration>) -> Self {
        Self {
            registrations: Arc::new(registrations),
            listener_task: None,
            socket_path: None,
        }
    }

    /// Clear any stale socket, claim the path and start accepting peers.
    ///
    /// If another live host already owns the path, the bind fails and the
    /// error is returned - a second hub must never steal an existing one's
    /// messages.
    pub async fn listen(&mut self, socket_path: &Path) -> Result<()> {
        if self.listener_task.is_some() {
            bail!("hub is already listening");
        }

        constants::clear_stale_socket(socket_path).await;

        let listener = UnixListener::bind(socket_path)
            .with_context(|| format!("failed to claim socket {}", socket_path.display()))?;
        info!("messaging hub listening on {}", socket_path.display());

        let registrations = Arc::clone(&self.registrations);
        self.socket_path = Some(socket_path.to_path_buf());
        self.listener_task = Some(tokio::spawn(accept_loop(listener, registrations)));
        Ok(())
    }

    /// Stop accepting new peers and release the socket path. Connections
    /// that are already open are left to drain and close on their own, so a
    /// host restart does not drop in-flight messages.
    pub fn dispose(&mut self) {
        if let Some(task) = self.listener_task.take() {
            task.abort();
        }
        if let Some(path) = self.socket_path.take() {
            if let Err(e) = std::fs::remove_file(&path) {
                debug!("could not remove socket {}: {}", path.display(), e);
            } else {
                info!("messaging hub closed on {}", path.display());
            }
        }
    }
}

impl Drop for MessagingHub {
    fn drop(&mut self) {
        self.dispose();
    }
}

async fn accept_loop(listener: UnixListener, registrations: Arc<Vec<HandlerRegistration>>) {
    loop {
        match listener.accept().await {
            Ok((stream, _addr)) => {
                let connection_id: ConnectionId = Uuid::new_v4().to_string();
                let accepted_at = std::time::Instant::now();
                info!("client connected: {connection_id}");

                let connection = MessageConnection::new(stream);
                for registration in registrations.iter() {
                    match registration {
                        HandlerRegistration::Notification(n) => {
                            connection
                                .on_notification(n.method, (n.factory)(connection_id.clone()));
                        }
                        HandlerRegistration::Request(r) => {
                            connection.on_request(r.method, (r.factory)(connection_id.clone()));
                        }
                    }
                }

                let close_registrations = Arc::clone(&registrations);
                let close_id = connection_id.clone();
                connection.on_close(Box::new(move || {
                    info!(
                        "client disconnected: {close_id} (connected for {:?})",
                        accepted_at.elapsed()
                    );
                    for registration in close_registrations.iter() {
                        if let Some(on_close) = registration.on_close() {
                            on_close(&close_id);
                        }
                    }
                }));

                // From here the connection's own tasks keep it alive; the
                // hub holds no reference past this point.
                connection.listen();
            }
            Err(e) => {
                error!("failed to accept client connection: {e}");
            }
        }
    }
}
