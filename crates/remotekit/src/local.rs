//! Session that runs commands on this machine.

use crate::error::{Error, Result};
use crate::session::{RunOptions, Session, run_streaming};
use log::debug;
use std::fs;
use std::path::Path;
use std::process::Command;

/// Runs commands with `sh -c` on the local host.
///
/// Used when the target is `localhost`, and to exercise the deploy
/// protocol against a temporary directory in tests.
#[derive(Debug, Default)]
pub struct LocalSession {
    closed: bool,
}

impl LocalSession {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            return Err(Error::Closed);
        }
        Ok(())
    }
}

impl Session for LocalSession {
    fn run(&mut self, command: &str, opts: RunOptions<'_>) -> Result<i32> {
        self.ensure_open()?;
        debug!("local: {command}");

        let mut cmd = Command::new("sh");
        cmd.args(["-c", command]);
        if let Some(cwd) = &opts.cwd {
            cmd.current_dir(cwd);
        }
        match run_streaming(cmd, opts) {
            // A missing working directory fails the command, as `cd` would.
            Err(Error::Spawn { source, .. }) if source.kind() == std::io::ErrorKind::NotFound => {
                Ok(127)
            }
            other => other,
        }
    }

    fn transfer_file(&mut self, local: &Path, remote: &str) -> Result<()> {
        self.ensure_open()?;
        debug!("local: copy {} -> {remote}", local.display());
        fs::copy(local, remote).map_err(|e| Error::Transfer {
            local: local.to_path_buf(),
            remote: remote.to_string(),
            message: e.to_string(),
        })?;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.closed = true;
        Ok(())
    }

    fn target(&self) -> String {
        "localhost".to_string()
    }
}
