//! herd-exec: multi-host SSH execution
//!
//! Resolves a set of SSH credentials once, then fans a unit of work (run a
//! command, upload a file) out across many hosts concurrently and collects
//! one outcome per host.

pub mod agent;
pub mod auth;
pub mod dispatch;
pub mod error;
pub mod keys;
pub mod result;
pub mod session;

pub use auth::{AuthMethod, ClientConfig};
pub use dispatch::dispatch;
pub use error::ExecError;
pub use keys::Keyring;
pub use result::{TaskOutcome, summarize};
pub use session::{RemoteSession, SessionFactory};
