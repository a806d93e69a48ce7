//! # remotekit
//!
//! Run shell commands on one target host and stream their output line by
//! line.
//!
//! - [`SshSession`](ssh::SshSession): the system `ssh`/`scp`, multiplexed
//!   over a control master for the lifetime of the session
//! - [`LocalSession`](local::LocalSession): `sh -c` on this machine
//! - [`ScriptedSession`](mock::ScriptedSession): rule-driven, for tests
//!
//! A command's exit status is data, not an error: callers decide what a
//! non-zero status means.

#![deny(unsafe_code)]
#![warn(clippy::all)]

pub mod error;
pub mod local;
pub mod mock;
pub mod quote;
pub mod session;
pub mod ssh;

pub use error::{Error, Result};
pub use local::LocalSession;
pub use session::{LineHandler, RunOptions, Session};
pub use ssh::{IdentityFile, SshSession, SshTarget};

/// Whether a host name refers to this machine.
#[must_use]
pub fn is_local_host(host: &str) -> bool {
    matches!(host, "localhost" | "127.0.0.1" | "::1")
}
