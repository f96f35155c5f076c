//! Declarative handler registrations applied to every accepted connection.
//!
//! The hub is configured once with a list of [`HandlerRegistration`] values.
//! Each one binds a protocol method to a handler factory; the factory is
//! applied per connection so handler bodies know which peer they serve. The
//! two registration kinds are a proper enum, dispatched exhaustively when a
//! connection is wired up.

use futures::FutureExt;
use futures::future;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::warn;

use crate::protocol::RpcError;
use crate::transport::{NotificationHandler, RequestHandler};

/// Opaque identity of one accepted connection, generated at accept time.
pub type ConnectionId = String;

/// Binding of a notification method to per-connection behavior.
pub struct NotificationRegistration {
    pub(crate) method: &'static str,
    pub(crate) factory: Box<dyn Fn(ConnectionId) -> NotificationHandler + Send + Sync>,
    pub(crate) on_close: Option<Box<dyn Fn(&ConnectionId) + Send + Sync>>,
}

/// Binding of a request method to per-connection behavior.
pub struct RequestRegistration {
    pub(crate) method: &'static str,
    pub(crate) factory: Box<dyn Fn(ConnectionId) -> RequestHandler + Send + Sync>,
    pub(crate) on_close: Option<Box<dyn Fn(&ConnectionId) + Send + Sync>>,
}

pub enum HandlerRegistration {
    Notification(NotificationRegistration),
    Request(RequestRegistration),
}

impl HandlerRegistration {
    pub fn method(&self) -> &'static str {
        match self {
            HandlerRegistration::Notification(n) => n.method,
            HandlerRegistration::Request(r) => r.method,
        }
    }

    pub(crate) fn on_close(&self) -> Option<&(dyn Fn(&ConnectionId) + Send + Sync)> {
        match self {
            HandlerRegistration::Notification(n) => n.on_close.as_deref(),
            HandlerRegistration::Request(r) => r.on_close.as_deref(),
        }
    }
}

impl From<NotificationRegistration> for HandlerRegistration {
    fn from(registration: NotificationRegistration) -> Self {
        HandlerRegistration::Notification(registration)
    }
}

impl From<RequestRegistration> for HandlerRegistration {
    fn from(registration: RequestRegistration) -> Self {
        HandlerRegistration::Request(registration)
    }
}

impl NotificationRegistration {
    /// Typed notification registration. The factory receives the connection
    /// id and returns the handler body; params are decoded into `P` before
    /// the body runs. Decode failures are logged and swallowed - there is no
    /// error channel for notifications.
    pub fn new<P, F, H>(method: &'static str, factory: F) -> Self
    where
        P: DeserializeOwned,
        F: Fn(ConnectionId) -> H + Send + Sync + 'static,
        H: FnMut(P) + Send + 'static,
    {
        Self {
            method,
            factory: Box::new(move |connection_id| {
                let mut handler = factory(connection_id);
                Box::new(move |params: serde_json::Value| {
                    match serde_json::from_value::<P>(params) {
                        Ok(decoded) => handler(decoded),
                        Err(e) => warn!("ignoring {method} with malformed params: {e}"),
                    }
                })
            }),
            on_close: None,
        }
    }

    /// Attach a callback invoked when a connection closes, with that
    /// connection's id.
    pub fn on_close(mut self, callback: impl Fn(&ConnectionId) + Send + Sync + 'static) -> Self {
        self.on_close = Some(Box::new(callback));
        self
    }
}

impl RequestRegistration {
    /// Typed request registration. Params are decoded into `P` (an
    /// `invalid_params` error response on failure), the handler's `Ok` value
    /// is serialized into the response, and handler errors become protocol
    /// errors carrying the error text.
    pub fn new<P, R, F, H, Fut>(method: &'static str, factory: F) -> Self
    where
        P: DeserializeOwned,
        R: Serialize,
        F: Fn(ConnectionId) -> H + Send + Sync + 'static,
        H: FnMut(P) -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<R>> + Send + 'static,
    {
        Self {
            method,
            factory: Box::new(move |connection_id| {
                let mut handler = factory(connection_id);
                Box::new(move |params: serde_json::Value| {
                    let decoded = match serde_json::from_value::<P>(params) {
                        Ok(decoded) => decoded,
                        Err(e) => return future::ready(Err(RpcError::invalid_params(e))).boxed(),
                    };
                    let invocation = handler(decoded);
                    async move {
                        match invocation.await {
                            Ok(value) => {
                                serde_json::to_value(value).map_err(RpcError::internal_error)
                            }
                            Err(e) => Err(RpcError::internal_error(e)),
                        }
                    }
                    .boxed()
                })
            }),
            on_close: None,
        }
    }

    /// Attach a callback invoked when a connection closes, with that
    /// connection's id.
    pub fn on_close(mut self, callback: impl Fn(&ConnectionId) + Send + Sync + 'static) -> Self {
        self.on_close = Some(Box::new(callback));
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::{Arc, Mutex};

    #[tokio::test]
    async fn notification_registration_decodes_typed_params() {
        let seen: Arc<Mutex<Vec<(ConnectionId, u32)>>> = Arc::default();

        let seen_in_handler = seen.clone();
        let registration = NotificationRegistration::new(
            "test/number",
            move |connection_id: ConnectionId| {
                let seen = seen_in_handler.clone();
                move |value: u32| seen.lock().unwrap().push((connection_id.clone(), value))
            },
        );

        let mut handler = (registration.factory)("conn-1".to_string());
        handler(json!(7));
        handler(json!("not a number")); // swallowed, logged
        handler(json!(9));

        assert_eq!(
            *seen.lock().unwrap(),
            vec![("conn-1".to_string(), 7), ("conn-1".to_string(), 9)]
        );
    }

    #[tokio::test]
    async fn request_registration_maps_errors_to_protocol_errors() {
        let registration = RequestRegistration::new(
            "test/fallible",
            move |_connection_id: ConnectionId| {
                move |ok: bool| async move {
                    if ok {
                        Ok(json!({"fine": true}))
                    } else {
                        Err(anyhow::anyhow!("handler exploded"))
                    }
                }
            },
        );

        let mut handler = (registration.factory)("conn-2".to_string());

        let ok = handler(json!(true)).await.unwrap();
        assert_eq!(ok, json!({"fine": true}));

        let err = handler(json!(false)).await.unwrap_err();
        assert_eq!(err.code, -32603);
        assert!(err.message.contains("handler exploded"));

        let bad_params = handler(json!("nope")).await.unwrap_err();
        assert_eq!(bad_params.code, -32602);
    }
}
