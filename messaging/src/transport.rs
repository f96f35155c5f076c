//! Framed message transport over one duplex byte stream.
//!
//! A [`MessageConnection`] turns a raw unix stream into a bidirectional
//! request/notification connection: register handlers, call `listen`, then
//! send in either direction until the peer goes away. Messages are framed as
//! newline-delimited JSON (see [`crate::protocol`]).

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use futures::future::BoxFuture;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::protocol::{Payload, RpcError, WireMessage};

/// Handler for an inbound notification. Decode failures are the handler's
/// problem; the transport hands over raw params.
pub type NotificationHandler = Box<dyn FnMut(serde_json::Value) + Send>;

/// Handler for an inbound request. The returned future resolves to the
/// response value or a protocol error to send back.
pub type RequestHandler =
    Box<dyn FnMut(serde_json::Value) -> BoxFuture<'static, Result<serde_json::Value, RpcError>> + Send>;

/// Invoked once when the peer closes the connection or the stream errors.
/// Not invoked on [`MessageConnection::dispose`].
pub type CloseCallback = Box<dyn FnOnce() + Send>;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("connection closed")]
    Closed,

    #[error("failed to serialize message: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error(transparent)]
    Rpc(#[from] RpcError),
}

#[derive(Default)]
struct Dispatch {
    notifications: HashMap<String, NotificationHandler>,
    requests: HashMap<String, RequestHandler>,
    on_close: Option<CloseCallback>,
}

/// State handed to the read loop when `listen` is called.
struct Setup {
    read_half: OwnedReadHalf,
    dispatch: Dispatch,
}

struct ConnectionInner {
    outgoing_tx: mpsc::UnboundedSender<WireMessage>,
    pending: Mutex<HashMap<String, oneshot::Sender<Result<serde_json::Value, RpcError>>>>,
    closed: AtomicBool,
    setup: Mutex<Option<Setup>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl ConnectionInner {
    /// Mark the connection dead and fail every request still waiting for a
    /// reply. Dropping the senders wakes the waiters with a closed channel.
    fn shutdown(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.pending.lock().unwrap().clear();
    }
}

/// One live framed connection. Cheap to clone; all clones share the link.
#[derive(Clone)]
pub struct MessageConnection {
    inner: Arc<ConnectionInner>,
}

impl MessageConnection {
    pub fn new(stream: UnixStream) -> Self {
        let (read_half, write_half) = stream.into_split();
        let (outgoing_tx, outgoing_rx) = mpsc::unbounded_channel();

        let inner = Arc::new(ConnectionInner {
            outgoing_tx,
            pending: Mutex::new(HashMap::new()),
            closed: AtomicBool::new(false),
            setup: Mutex::new(Some(Setup {
                read_half,
                dispatch: Dispatch::default(),
            })),
            tasks: Mutex::new(Vec::new()),
        });

        let writer = tokio::spawn(write_loop(outgoing_rx, write_half));
        inner.tasks.lock().unwrap().push(writer);

        Self { inner }
    }

    /// Register a handler for an inbound notification method.
    /// Must be called before `listen`.
    pub fn on_notification(&self, method: &str, handler: NotificationHandler) {
        let mut setup = self.inner.setup.lock().unwrap();
        match setup.as_mut() {
            Some(setup) => {
                if setup
                    .dispatch
                    .notifications
                    .insert(method.to_string(), handler)
                    .is_some()
                {
                    warn!("duplicate notification handler for {method} replaced");
                }
            }
            None => warn!("ignoring notification handler for {method}: connection already listening"),
        }
    }

    /// Register a handler for an inbound request method.
    /// Must be called before `listen`.
    pub fn on_request(&self, method: &str, handler: RequestHandler) {
        let mut setup = self.inner.setup.lock().unwrap();
        match setup.as_mut() {
            Some(setup) => {
                if setup
                    .dispatch
                    .requests
                    .insert(method.to_string(), handler)
                    .is_some()
                {
                    warn!("duplicate request handler for {method} replaced");
                }
            }
            None => warn!("ignoring request handler for {method}: connection already listening"),
        }
    }

    /// Register the close callback. Must be called before `listen`.
    pub fn on_close(&self, callback: CloseCallback) {
        let mut setup = self.inner.setup.lock().unwrap();
        match setup.as_mut() {
            Some(setup) => setup.dispatch.on_close = Some(callback),
            None => warn!("ignoring close callback: connection already listening"),
        }
    }

    /// Start dispatching inbound messages to the registered handlers.
    pub fn listen(&self) {
        let Some(setup) = self.inner.setup.lock().unwrap().take() else {
            warn!("listen called twice on one connection");
            return;
        };
        let inner = Arc::clone(&self.inner);
        let reader = tokio::spawn(read_loop(inner, setup));
        self.inner.tasks.lock().unwrap().push(reader);
    }

    /// Send a request and wait for the peer's response. No timeout is
    /// applied here; callers wanting one wrap this in their own.
    pub async fn send_request(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> Result<serde_json::Value, TransportError> {
        if self.inner.closed.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }

        let id = Uuid::new_v4().to_string();
        let (reply_tx, reply_rx) = oneshot::channel();
        self.inner
            .pending
            .lock()
            .unwrap()
            .insert(id.clone(), reply_tx);

        // Re-check after registering: a close that raced past the first
        // check has already drained the pending map and would never wake us.
        if self.inner.closed.load(Ordering::SeqCst) {
            self.inner.pending.lock().unwrap().remove(&id);
            return Err(TransportError::Closed);
        }

        let message = WireMessage::request(id.clone(), method, params);
        if self.inner.outgoing_tx.send(message).is_err() {
            self.inner.pending.lock().unwrap().remove(&id);
            return Err(TransportError::Closed);
        }

        match reply_rx.await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(rpc)) => Err(TransportError::Rpc(rpc)),
            // The pending map was cleared because the connection died.
            Err(_) => Err(TransportError::Closed),
        }
    }

    /// Send a fire-and-forget notification.
    pub fn send_notification(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> Result<(), TransportError> {
        if self.inner.closed.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        self.inner
            .outgoing_tx
            .send(WireMessage::notification(method, params))
            .map_err(|_| TransportError::Closed)
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// Tear the connection down without running the close callback. This is
    /// the deliberate-teardown path; in-flight requests fail with `Closed`.
    pub fn dispose(&self) {
        self.inner.shutdown();
        for task in self.inner.tasks.lock().unwrap().drain(..) {
            task.abort();
        }
    }
}

async fn write_loop(mut outgoing_rx: mpsc::UnboundedReceiver<WireMessage>, mut write_half: OwnedWriteHalf) {
    while let Some(message) = outgoing_rx.recv().await {
        let mut line = match serde_json::to_vec(&message) {
            Ok(bytes) => bytes,
            Err(e) => {
                // Unserializable outbound values are a local bug; surface in
                // logs and keep the connection alive.
                warn!("failed to serialize outbound message: {e}");
                continue;
            }
        };
        line.push(b'\n');
        if let Err(e) = write_half.write_all(&line).await {
            debug!("write failed, stopping writer: {e}");
            break;
        }
        if let Err(e) = write_half.flush().await {
            debug!("flush failed, stopping writer: {e}");
            break;
        }
    }
}

async fn read_loop(inner: Arc<ConnectionInner>, setup: Setup) {
    let Setup { read_half, mut dispatch } = setup;
    let mut reader = BufReader::new(read_half);
    let mut line = String::new();

    loop {
        line.clear();
        match reader.read_line(&mut line).await {
            Ok(0) => {
                debug!("peer closed the connection");
                break;
            }
            Ok(_) => {
                let raw = line.trim();
                if raw.is_empty() {
                    continue;
                }
                match serde_json::from_str::<WireMessage>(raw) {
                    Ok(message) => handle_message(&inner, &mut dispatch, message).await,
                    Err(e) => {
                        warn!("dropping unparseable frame: {e}");
                        let _ = inner
                            .outgoing_tx
                            .send(WireMessage::response_err(None, RpcError::parse_error()));
                    }
                }
            }
            Err(e) => {
                debug!("read error, closing connection: {e}");
                break;
            }
        }
    }

    inner.shutdown();
    if let Some(callback) = dispatch.on_close.take() {
        callback();
    }
}

async fn handle_message(inner: &Arc<ConnectionInner>, dispatch: &mut Dispatch, message: WireMessage) {
    let Some(payload) = message.into_payload() else {
        warn!("dropping frame with neither method nor id");
        return;
    };

    match payload {
        Payload::Request { id, method, params } => {
            // Awaited inline: messages framed off one connection are handled
            // in order. Other connections run on their own tasks.
            let reply = match dispatch.requests.get_mut(&method) {
                Some(handler) => handler(params).await,
                None => {
                    debug!("request for unregistered method {method}");
                    Err(RpcError::method_not_found(&method))
                }
            };
            let response = match reply {
                Ok(value) => WireMessage::response_ok(id, value),
                Err(error) => WireMessage::response_err(Some(id), error),
            };
            let _ = inner.outgoing_tx.send(response);
        }
        Payload::Notification { method, params } => match dispatch.notifications.get_mut(&method) {
            Some(handler) => handler(params),
            // Notifications have no error channel: unknown ones are dropped.
            None => debug!("notification for unregistered method {method}"),
        },
        Payload::Response { id, result } => {
            let reply_tx = inner.pending.lock().unwrap().remove(&id);
            match reply_tx {
                Some(reply_tx) => {
                    if reply_tx.send(result).is_err() {
                        debug!("requester for response {id} went away");
                    }
                }
                None => debug!("response with unknown id {id}"),
            }
        }
    }
}
