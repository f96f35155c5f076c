//! Constants and socket naming shared by the hub host and tool processes.

use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use sha2::{Digest, Sha256};
use tokio::net::UnixStream;
use tracing::{debug, info};

/// Filename prefix for hub sockets in the system temp directory.
pub const SOCKET_PREFIX: &str = "nx-messaging";

/// Default log file name for development mode
pub const DEV_LOG_FILENAME: &str = "nx-messaging.log";

/// Reconnect policy applied when a client is built without an explicit config.
pub const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 5;
pub const DEFAULT_RECONNECT_INTERVAL: Duration = Duration::from_secs(2);

/// Development log file path
pub fn dev_log_path() -> PathBuf {
    std::env::temp_dir().join(DEV_LOG_FILENAME)
}

/// Derive the hub socket path for a workspace root.
///
/// Host and tool processes run this independently and must end up at the
/// same file, so the path is a pure function of the root: the canonical
/// root is hashed and the first 16 bytes of the digest name the socket.
/// Hashing also keeps the filename under the unix socket path length limit
/// regardless of how deeply the workspace is nested.
pub fn resolve_socket_path(workspace_root: &Path) -> PathBuf {
    let canonical = workspace_root
        .canonicalize()
        .unwrap_or_else(|_| workspace_root.to_path_buf());

    let hash = Sha256::digest(canonical.to_string_lossy().as_bytes());
    let hex: String = hash[..16].iter().map(|b| format!("{b:02x}")).collect();

    std::env::temp_dir().join(format!("{SOCKET_PREFIX}-{hex}.sock"))
}

/// Remove a socket file left behind by a host that died without cleaning up.
///
/// A socket that still accepts connections belongs to a live host and is
/// left in place; the caller's own bind will then fail with `AddrInUse`
/// instead of hijacking it. Every failure mode here is treated as "nothing
/// to clean".
pub async fn clear_stale_socket(path: &Path) {
    match UnixStream::connect(path).await {
        Ok(_) => {
            debug!("socket {} is owned by a live host, leaving it", path.display());
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) if e.kind() == io::ErrorKind::ConnectionRefused => {
            info!("clearing stale socket {}", path.display());
            if let Err(e) = std::fs::remove_file(path) {
                if e.kind() != io::ErrorKind::NotFound {
                    debug!("could not remove stale socket {}: {}", path.display(), e);
                }
            }
        }
        Err(e) => {
            debug!("probe of socket {} failed: {}", path.display(), e);
        }
    }
}
