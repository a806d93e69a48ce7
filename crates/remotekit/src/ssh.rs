//! Session over the system `ssh` and `scp` binaries.
//!
//! `connect` starts a control master in the background; every command and
//! transfer multiplexes over its socket, and `close` tells it to exit. That
//! keeps one authenticated connection for the whole deploy.

use crate::error::{Error, Result};
use crate::quote;
use crate::session::{RunOptions, Session, run_streaming};
use log::{debug, warn};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::{NamedTempFile, TempDir};

/// Seconds ssh waits for the TCP connection.
const CONNECT_TIMEOUT_SECS: u32 = 10;

/// Where and as whom to connect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SshTarget {
    pub host: String,
    pub user: String,
    pub port: u16,
    pub identity_file: Option<PathBuf>,
}

impl SshTarget {
    #[must_use]
    pub fn new(host: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            user: user.into(),
            port: 22,
            identity_file: None,
        }
    }

    #[must_use]
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    #[must_use]
    pub fn identity_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.identity_file = Some(path.into());
        self
    }

    /// `user@host`
    #[must_use]
    pub fn destination(&self) -> String {
        format!("{}@{}", self.user, self.host)
    }
}

impl std::fmt::Display for SshTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.port == 22 {
            write!(f, "{}", self.destination())
        } else {
            write!(f, "{}:{}", self.destination(), self.port)
        }
    }
}

/// Private key material written to a file ssh can read.
///
/// The file is created with owner-only permissions and removed on drop.
pub struct IdentityFile {
    file: NamedTempFile,
}

impl IdentityFile {
    /// Write key content to a fresh temporary file.
    pub fn from_key_material(key: &str) -> Result<Self> {
        let mut file = tempfile::Builder::new()
            .prefix("landfall-key-")
            .tempfile()?;
        file.write_all(key.as_bytes())?;
        if !key.ends_with('\n') {
            file.write_all(b"\n")?;
        }
        file.flush()?;
        Ok(Self { file })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        self.file.path()
    }
}

impl std::fmt::Debug for IdentityFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityFile")
            .field("path", &self.file.path())
            .finish_non_exhaustive()
    }
}

/// An open ssh connection to one host.
#[derive(Debug)]
pub struct SshSession {
    target: SshTarget,
    // Holds the control socket; removed when the session is dropped.
    control_dir: TempDir,
    closed: bool,
}

impl SshSession {
    /// Authenticate and start the control master.
    pub fn connect(target: SshTarget) -> Result<Self> {
        let control_dir = tempfile::Builder::new().prefix("landfall-ssh-").tempdir()?;
        let mut session = Self {
            target,
            control_dir,
            closed: false,
        };

        let mut cmd = Command::new("ssh");
        cmd.args(session.common_args())
            .args(["-o", "ControlMaster=yes", "-o", "ControlPersist=yes", "-f", "-N"])
            .args(["-p", &session.target.port.to_string()])
            .arg(session.target.destination());

        debug!("ssh: connecting to {}", session.target);
        let output = match cmd.output() {
            Ok(output) => output,
            Err(source) => {
                session.closed = true;
                return Err(Error::Spawn {
                    program: "ssh".to_string(),
                    source,
                });
            }
        };
        if !output.status.success() {
            // No master is running; nothing for drop to shut down.
            session.closed = true;
            return Err(Error::Connect {
                target: session.target.to_string(),
                message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(session)
    }

    fn control_path(&self) -> PathBuf {
        self.control_dir.path().join("ctl")
    }

    fn common_args(&self) -> Vec<String> {
        let mut args = vec![
            "-o".to_string(),
            "BatchMode=yes".to_string(),
            "-o".to_string(),
            format!("ConnectTimeout={CONNECT_TIMEOUT_SECS}"),
            "-o".to_string(),
            "ServerAliveInterval=15".to_string(),
            "-o".to_string(),
            "ServerAliveCountMax=3".to_string(),
            "-o".to_string(),
            format!("ControlPath={}", self.control_path().display()),
        ];
        if let Some(identity) = &self.target.identity_file {
            args.push("-o".to_string());
            args.push("IdentitiesOnly=yes".to_string());
            args.push("-i".to_string());
            args.push(identity.display().to_string());
        }
        args
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            return Err(Error::Closed);
        }
        Ok(())
    }
}

impl Session for SshSession {
    fn run(&mut self, command: &str, opts: RunOptions<'_>) -> Result<i32> {
        self.ensure_open()?;

        let remote = match &opts.cwd {
            Some(cwd) => quote::in_dir(cwd, command),
            None => command.to_string(),
        };
        debug!("ssh {}: {remote}", self.target);

        let mut cmd = Command::new("ssh");
        cmd.args(self.common_args())
            .args(["-p", &self.target.port.to_string()])
            .arg(self.target.destination())
            .arg(remote);
        run_streaming(cmd, opts)
    }

    fn transfer_file(&mut self, local: &Path, remote: &str) -> Result<()> {
        self.ensure_open()?;
        debug!("scp {} -> {}:{remote}", local.display(), self.target);

        let output = Command::new("scp")
            .args(self.common_args())
            .args(["-q", "-P", &self.target.port.to_string()])
            .arg(local)
            .arg(format!("{}:{remote}", self.target.destination()))
            .output()
            .map_err(|source| Error::Spawn {
                program: "scp".to_string(),
                source,
            })?;

        if !output.status.success() {
            return Err(Error::Transfer {
                local: local.to_path_buf(),
                remote: remote.to_string(),
                message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        let output = Command::new("ssh")
            .args(self.common_args())
            .args(["-O", "exit"])
            .arg(self.target.destination())
            .output()
            .map_err(|source| Error::Spawn {
                program: "ssh".to_string(),
                source,
            })?;
        if !output.status.success() {
            warn!(
                "ssh control master for {} did not exit cleanly: {}",
                self.target,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Ok(())
    }

    fn target(&self) -> String {
        self.target.to_string()
    }
}

impl Drop for SshSession {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!("failed to close ssh session to {}: {e}", self.target);
        }
    }
}
