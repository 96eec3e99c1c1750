//! SSH agent socket handling
//!
//! The agent is dialed through a plain unix socket. Transient dial errors
//! are retried with bounded jitter; anything else abandons the agent path.

use std::io;
use std::path::Path;
use std::time::Duration;

use rand::Rng;
use russh::keys::agent::client::AgentClient;
use russh::keys::ssh_key::PublicKey;
use tokio::net::UnixStream;
use tracing::{debug, warn};

/// Environment variable naming the agent socket
pub const AUTH_SOCK_ENV: &str = "SSH_AUTH_SOCK";

/// Upper bound for the randomized retry delay
const RETRY_JITTER_MS: u64 = 100;

/// Classify a dial error as transient (worth retrying) or permanent.
pub(crate) fn is_transient(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::Interrupted
            | io::ErrorKind::WouldBlock
            | io::ErrorKind::TimedOut
            | io::ErrorKind::ConnectionReset
    )
}

/// Dial the agent socket, retrying transient errors indefinitely.
///
/// Returns `None` on a permanent error, after reporting it.
pub(crate) async fn connect(socket: &Path) -> Option<UnixStream> {
    loop {
        match UnixStream::connect(socket).await {
            Ok(stream) => return Some(stream),
            Err(e) if is_transient(&e) => {
                let delay = rand::thread_rng().gen_range(0..RETRY_JITTER_MS);
                debug!(
                    socket = %socket.display(),
                    error = %e,
                    delay_ms = delay,
                    "transient agent socket error, retrying"
                );
                tokio::time::sleep(Duration::from_millis(delay)).await;
            }
            Err(e) => {
                warn!(
                    socket = %socket.display(),
                    error = %e,
                    "cannot open connection to SSH agent"
                );
                return None;
            }
        }
    }
}

/// Connect to the agent and list the identities it holds.
///
/// Returns `None` if the agent is unreachable or refuses the query.
pub(crate) async fn identities(socket: &Path) -> Option<Vec<PublicKey>> {
    let stream = connect(socket).await?;
    let mut agent = AgentClient::connect(stream);

    match agent.request_identities().await {
        Ok(keys) => {
            debug!(count = keys.len(), "agent identities listed");
            Some(keys)
        }
        Err(e) => {
            warn!(error = %e, "cannot request identities from SSH agent");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_kinds_are_retried() {
        for kind in [
            io::ErrorKind::Interrupted,
            io::ErrorKind::WouldBlock,
            io::ErrorKind::TimedOut,
            io::ErrorKind::ConnectionReset,
        ] {
            assert!(is_transient(&io::Error::from(kind)), "{kind:?}");
        }
    }

    #[test]
    fn permanent_kinds_are_not_retried() {
        for kind in [
            io::ErrorKind::NotFound,
            io::ErrorKind::ConnectionRefused,
            io::ErrorKind::PermissionDenied,
        ] {
            assert!(!is_transient(&io::Error::from(kind)), "{kind:?}");
        }
    }

    #[tokio::test]
    async fn dead_socket_is_abandoned() {
        let dir = tempfile::tempdir().unwrap();
        let socket = dir.path().join("no-agent.sock");

        assert!(connect(&socket).await.is_none());
        assert!(identities(&socket).await.is_none());
    }
}
