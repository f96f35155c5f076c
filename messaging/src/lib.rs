//! Local socket messaging between an editor host and workspace tools.
//!
//! One long-lived host per workspace runs a [`MessagingHub`] on a socket
//! path derived from the workspace root. Any number of short- or long-lived
//! tool processes connect through an [`IdeClient`] and exchange typed
//! notifications and requests with it: the host pushes editor actions, the
//! tools report running tasks and terminal output. Peers may start, crash or
//! exit at any time; the hub's picture of running work is cleaned up per
//! connection, not per goodwill of the peer.

pub mod client;
pub mod constants;
pub mod features;
pub mod handler;
pub mod hub;
pub mod protocol;
pub mod registry;
pub mod structured_logging;
pub mod transport;
pub mod types;

pub use client::{ClientError, IdeClient, IdeClientConfig, create_ide_client};
pub use features::{EditorActions, LoggingEditorActions, handler_table};
pub use hub::MessagingHub;
pub use registry::RunningTasksRegistry;
pub use types::ConnectionStatus;
