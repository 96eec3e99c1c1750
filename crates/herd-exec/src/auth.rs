//! Credential resolution
//!
//! Builds the ordered list of authentication methods once, before any host
//! is dialed. The result is immutable and shared read-only by every
//! concurrent session.

use std::env;
use std::path::{Path, PathBuf};

use russh::keys::ssh_key::PublicKey;
use tracing::{debug, instrument};

use crate::agent;
use crate::keys::{Keyring, load_signer};

/// One way of authenticating to a remote host, tried in order
#[derive(Debug, Clone)]
pub enum AuthMethod {
    /// Credentials held by an ssh-agent, reached through a unix socket.
    /// The identity list is captured once at resolution time.
    Agent {
        socket: PathBuf,
        identities: Vec<PublicKey>,
    },
    /// Signers owned by this process, in key-file order
    Keyring(Keyring),
}

/// Immutable per-invocation client configuration
///
/// Built once at startup and shared across all host tasks; never mutated
/// after construction.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Login user for every host
    pub user: String,
    /// Ordered authentication methods; may be empty
    pub methods: Vec<AuthMethod>,
}

impl ClientConfig {
    /// Resolve credentials from the agent socket and the given key files.
    ///
    /// Failures along the way skip the affected credential and are reported
    /// as they occur; an empty method list is legal and surfaces later as
    /// per-host authentication failure.
    #[instrument(skip_all, fields(user = %user.as_ref()))]
    pub async fn resolve(
        user: impl AsRef<str>,
        agent_socket: Option<PathBuf>,
        key_paths: &[PathBuf],
    ) -> Self {
        let mut methods = Vec::new();

        if let Some(socket) = agent_socket {
            if let Some(identities) = agent::identities(&socket).await {
                if identities.is_empty() {
                    debug!(socket = %socket.display(), "agent holds no identities");
                } else {
                    methods.push(AuthMethod::Agent { socket, identities });
                }
            }
        }

        let mut keyring = Keyring::new();
        for path in key_paths {
            if let Some(signer) = load_signer(path).await {
                keyring.push(signer);
            }
        }
        if !keyring.is_empty() {
            methods.push(AuthMethod::Keyring(keyring));
        }

        debug!(methods = methods.len(), "credentials resolved");

        Self {
            user: user.as_ref().to_string(),
            methods,
        }
    }
}

/// Login name of the invoking user
#[must_use]
pub fn login_user() -> String {
    env::var("LOGNAME")
        .or_else(|_| env::var("USER"))
        .unwrap_or_else(|_| "root".to_string())
}

/// Agent socket advertised by the environment, if any
#[must_use]
pub fn agent_socket_from_env() -> Option<PathBuf> {
    env::var_os(agent::AUTH_SOCK_ENV)
        .filter(|value| !value.is_empty())
        .map(PathBuf::from)
}

/// The two well-known private key locations under the user's home
#[must_use]
pub fn default_key_paths() -> Vec<PathBuf> {
    match env::var_os("HOME") {
        Some(home) => key_paths_in(Path::new(&home)),
        None => Vec::new(),
    }
}

fn key_paths_in(home: &Path) -> Vec<PathBuf> {
    let ssh_dir = home.join(".ssh");
    vec![ssh_dir.join("id_rsa"), ssh_dir.join("id_dsa")]
}

#[cfg(test)]
mod tests {
    use super::*;

    use russh::keys::PrivateKey;
    use russh::keys::ssh_key::LineEnding;
    use russh::keys::ssh_key::private::{Ed25519Keypair, KeypairData};

    #[tokio::test]
    async fn no_credentials_yields_zero_methods() {
        let dir = tempfile::tempdir().unwrap();
        let paths = key_paths_in(dir.path());

        let config = ClientConfig::resolve("tester", None, &paths).await;

        assert_eq!(config.user, "tester");
        assert!(config.methods.is_empty());
    }

    #[tokio::test]
    async fn dead_agent_socket_is_abandoned() {
        let dir = tempfile::tempdir().unwrap();
        let socket = dir.path().join("agent.sock");

        let config = ClientConfig::resolve("tester", Some(socket), &[]).await;

        assert!(config.methods.is_empty());
    }

    #[tokio::test]
    async fn parsable_keys_form_one_keyring_method() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("id_rsa");
        let bad = dir.path().join("id_dsa");

        let pair = Ed25519Keypair::from_seed(&[3u8; 32]);
        let key = PrivateKey::new(KeypairData::Ed25519(pair), "test").unwrap();
        std::fs::write(&good, key.to_openssh(LineEnding::LF).unwrap().as_bytes()).unwrap();
        std::fs::write(&bad, "not a key at all").unwrap();

        let config = ClientConfig::resolve("tester", None, &[good, bad]).await;

        assert_eq!(config.methods.len(), 1);
        match &config.methods[0] {
            AuthMethod::Keyring(keyring) => assert_eq!(keyring.len(), 1),
            other => panic!("expected keyring method, got {other:?}"),
        }
    }

    #[test]
    fn default_paths_name_the_two_well_known_keys() {
        let paths = key_paths_in(Path::new("/home/me"));
        assert_eq!(
            paths,
            vec![
                PathBuf::from("/home/me/.ssh/id_rsa"),
                PathBuf::from("/home/me/.ssh/id_dsa"),
            ]
        );
    }
}
