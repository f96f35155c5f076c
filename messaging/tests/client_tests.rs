//! Reconnecting-client state machine tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use nx_messaging::constants::resolve_socket_path;
use nx_messaging::{
    ClientError, ConnectionStatus, IdeClient, IdeClientConfig, LoggingEditorActions, MessagingHub,
    RunningTasksRegistry, create_ide_client, handler_table,
};

async fn wait_for(what: &str, condition: impl Fn() -> bool) {
    for _ in 0..250 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("timed out waiting for {what}");
}

fn fast_config(workspace_root: &std::path::Path, max_reconnect_attempts: u32) -> IdeClientConfig {
    IdeClientConfig {
        workspace_root: workspace_root.to_path_buf(),
        max_reconnect_attempts,
        reconnect_interval: Duration::from_millis(50),
    }
}

#[test]
fn operations_fail_fast_while_disconnected() {
    let dir = tempfile::tempdir().unwrap();
    let client = IdeClient::new(IdeClientConfig::new(dir.path()));

    assert_eq!(client.get_status(), ConnectionStatus::Disconnected);
    let err = client.focus_project("app1").unwrap_err();
    assert!(matches!(err, ClientError::NotConnected));

    let err = client
        .send_notification("nx/terminalMessage", Some(serde_json::json!("hi")))
        .unwrap_err();
    assert!(matches!(err, ClientError::NotConnected));
}

#[tokio::test]
async fn requests_fail_fast_while_disconnected() {
    let dir = tempfile::tempdir().unwrap();
    let client = IdeClient::new(IdeClientConfig::new(dir.path()));

    let err = client.get_running_tasks().await.unwrap_err();
    assert!(matches!(err, ClientError::NotConnected));
}

#[tokio::test]
async fn first_connect_failure_is_observable_synchronously() {
    let _ = tracing_subscriber::fmt::try_init();
    let dir = tempfile::tempdir().unwrap();

    // Nothing is listening for this workspace.
    let client = IdeClient::new(fast_config(dir.path(), 0));
    let err = client.connect().await.unwrap_err();
    assert!(matches!(err, ClientError::ConnectionFailed { .. }));

    client.disconnect();
}

#[tokio::test]
async fn bounded_reconnect_then_single_disconnection_callback() {
    let _ = tracing_subscriber::fmt::try_init();
    let dir = tempfile::tempdir().unwrap();
    let socket_path = resolve_socket_path(dir.path());

    // A host that accepts the first connection, holds it, then dies: every
    // reconnect attempt afterwards is refused outright.
    let listener = tokio::net::UnixListener::bind(&socket_path).unwrap();
    let first_host = tokio::spawn(async move {
        let mut streams = Vec::new();
        loop {
            if let Ok((stream, _)) = listener.accept().await {
                streams.push(stream);
            }
        }
    });

    let client = IdeClient::new(fast_config(dir.path(), 3));
    let disconnections = Arc::new(AtomicU32::new(0));
    let disconnections_in_callback = disconnections.clone();
    client.on_disconnection(move || {
        disconnections_in_callback.fetch_add(1, Ordering::SeqCst);
    });

    client.connect().await.unwrap();
    assert_eq!(client.get_status(), ConnectionStatus::Connected);
    first_host.abort();

    wait_for("retries to exhaust", || {
        client.get_status() == ConnectionStatus::Disconnected
            && disconnections.load(Ordering::SeqCst) > 0
    })
    .await;
    assert_eq!(disconnections.load(Ordering::SeqCst), 1);

    // A host coming back now must see no further attempts: the client gave
    // up for good and only a fresh connect() could revive it.
    let _ = std::fs::remove_file(&socket_path);
    let listener = tokio::net::UnixListener::bind(&socket_path).unwrap();
    let no_client = tokio::time::timeout(Duration::from_millis(300), listener.accept()).await;
    assert!(no_client.is_err(), "a stray reconnect attempt fired");
    assert_eq!(disconnections.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn disconnect_cancels_the_pending_reconnect() {
    let _ = tracing_subscriber::fmt::try_init();
    let dir = tempfile::tempdir().unwrap();

    // First connect fails (no host) and schedules a retry.
    let client = IdeClient::new(IdeClientConfig {
        workspace_root: dir.path().to_path_buf(),
        max_reconnect_attempts: 5,
        reconnect_interval: Duration::from_millis(100),
    });
    assert!(client.connect().await.is_err());
    assert_eq!(client.get_status(), ConnectionStatus::Error);

    client.disconnect();
    assert_eq!(client.get_status(), ConnectionStatus::Disconnected);

    // Had the timer fired, the failed retry would flip the status back to
    // error. It stays down.
    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(client.get_status(), ConnectionStatus::Disconnected);
}

#[tokio::test]
async fn client_recovers_over_a_host_restart() {
    let _ = tracing_subscriber::fmt::try_init();
    let dir = tempfile::tempdir().unwrap();
    let socket_path = resolve_socket_path(dir.path());

    // First incarnation of the host: a raw listener that keeps accepted
    // streams alive until it is killed, like a host process crashing.
    let listener = tokio::net::UnixListener::bind(&socket_path).unwrap();
    let first_host = tokio::spawn(async move {
        let mut streams = Vec::new();
        loop {
            if let Ok((stream, _)) = listener.accept().await {
                streams.push(stream);
            }
        }
    });

    let client = IdeClient::new(fast_config(dir.path(), 5));
    client.connect().await.unwrap();
    assert_eq!(client.get_status(), ConnectionStatus::Connected);

    // Crash the host: its connections die and its socket file stays behind.
    first_host.abort();
    wait_for("the crash to reach the client", || {
        client.get_status() != ConnectionStatus::Connected
    })
    .await;

    // The replacement host clears the stale socket and rebinds the path.
    let registry = Arc::new(RunningTasksRegistry::new());
    let mut hub = MessagingHub::new(handler_table(
        Arc::new(LoggingEditorActions),
        registry.clone(),
    ));
    hub.listen(&socket_path).await.unwrap();

    wait_for("the client to reconnect", || {
        client.get_status() == ConnectionStatus::Connected
    })
    .await;

    client
        .send_notification("nx/startedRunningTasks", Some(serde_json::json!(7)))
        .unwrap();
    wait_for("the new hub to hear the client", || {
        registry.connection_count() == 1
    })
    .await;

    client.disconnect();
    hub.dispose();
}

#[tokio::test]
async fn connect_is_a_noop_when_already_connected() {
    let _ = tracing_subscriber::fmt::try_init();
    let dir = tempfile::tempdir().unwrap();

    let mut hub = MessagingHub::new(Vec::new());
    hub.listen(&resolve_socket_path(dir.path())).await.unwrap();

    let client = IdeClient::new(IdeClientConfig::new(dir.path()));
    client.connect().await.unwrap();
    client.connect().await.unwrap();
    assert_eq!(client.get_status(), ConnectionStatus::Connected);

    client.disconnect();
    hub.dispose();
}

#[tokio::test]
async fn factory_refuses_when_no_host_listens() {
    let _ = tracing_subscriber::fmt::try_init();
    let dir = tempfile::tempdir().unwrap();

    let result = create_ide_client(dir.path()).await;
    assert!(result.is_err(), "factory must not hand out a dead client");
}

#[tokio::test]
async fn factory_hands_out_a_connected_client() {
    let _ = tracing_subscriber::fmt::try_init();
    let dir = tempfile::tempdir().unwrap();

    let mut hub = MessagingHub::new(Vec::new());
    hub.listen(&resolve_socket_path(dir.path())).await.unwrap();

    let client = create_ide_client(dir.path()).await.unwrap();
    assert_eq!(client.get_status(), ConnectionStatus::Connected);

    client.disconnect();
    assert_eq!(client.get_status(), ConnectionStatus::Disconnected);
    hub.dispose();
}
