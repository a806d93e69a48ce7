//! Scripted session for testing.
//!
//! Records every command and transfer and answers from rules matched by
//! substring. Commands with no matching rule succeed silently.
//!
//! ```
//! use remotekit::mock::ScriptedSession;
//! use remotekit::{RunOptions, Session};
//!
//! let session = ScriptedSession::new();
//! session.fail_when("docker compose", 1);
//!
//! let mut handle = session.clone();
//! assert_eq!(handle.run("mkdir -p /srv/app", RunOptions::new()).unwrap(), 0);
//! assert_eq!(handle.run("docker compose up -d", RunOptions::new()).unwrap(), 1);
//! assert_eq!(session.commands().len(), 2);
//! ```

use crate::error::{Error, Result};
use crate::session::{RunOptions, Session};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// One recorded interaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Invocation {
    Run { command: String, cwd: Option<String> },
    Transfer { local: PathBuf, remote: String },
    Close,
}

#[derive(Debug, Clone)]
struct Rule {
    pattern: String,
    exit_status: i32,
    stdout: Vec<String>,
    stderr: Vec<String>,
    // Remaining matches; None means unlimited.
    remaining: Option<usize>,
}

#[derive(Debug, Default)]
struct ScriptState {
    rules: Vec<Rule>,
    log: Vec<Invocation>,
    fail_transfer: Option<String>,
    drop_connection_on: Option<String>,
    closed: bool,
}

/// In-memory [`Session`] driven by rules.
///
/// Clones share state, so a test can keep one handle for assertions while
/// the code under test owns another.
#[derive(Debug, Clone, Default)]
pub struct ScriptedSession {
    state: Arc<Mutex<ScriptState>>,
}

impl ScriptedSession {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, ScriptState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn push_rule(&self, pattern: &str, exit_status: i32, stdout: &[&str], stderr: &[&str]) {
        self.lock().rules.push(Rule {
            pattern: pattern.to_string(),
            exit_status,
            stdout: stdout.iter().map(ToString::to_string).collect(),
            stderr: stderr.iter().map(ToString::to_string).collect(),
            remaining: None,
        });
    }

    /// Commands containing `pattern` exit with `exit_status`.
    pub fn fail_when(&self, pattern: &str, exit_status: i32) {
        self.push_rule(pattern, exit_status, &[], &[]);
    }

    /// Only the next command containing `pattern` exits with `exit_status`.
    pub fn fail_once_when(&self, pattern: &str, exit_status: i32) {
        self.push_rule(pattern, exit_status, &[], &[]);
        if let Some(rule) = self.lock().rules.last_mut() {
            rule.remaining = Some(1);
        }
    }

    /// Commands containing `pattern` succeed but print `line` to stderr.
    pub fn stderr_when(&self, pattern: &str, line: &str) {
        self.push_rule(pattern, 0, &[], &[line]);
    }

    /// Commands containing `pattern` succeed and print `line` to stdout.
    pub fn stdout_when(&self, pattern: &str, line: &str) {
        self.push_rule(pattern, 0, &[line], &[]);
    }

    /// Every transfer fails with `message`.
    pub fn fail_transfers(&self, message: &str) {
        self.lock().fail_transfer = Some(message.to_string());
    }

    /// The connection drops when a command containing `pattern` is run;
    /// that command and everything after it fails with [`Error::Closed`].
    pub fn drop_connection_on(&self, pattern: &str) {
        self.lock().drop_connection_on = Some(pattern.to_string());
    }

    /// Everything recorded so far.
    #[must_use]
    pub fn invocations(&self) -> Vec<Invocation> {
        self.lock().log.clone()
    }

    /// Just the commands run, in order.
    #[must_use]
    pub fn commands(&self) -> Vec<String> {
        self.lock()
            .log
            .iter()
            .filter_map(|i| match i {
                Invocation::Run { command, .. } => Some(command.clone()),
                _ => None,
            })
            .collect()
    }

    /// Index of the first command containing `pattern`.
    #[must_use]
    pub fn position(&self, pattern: &str) -> Option<usize> {
        self.commands().iter().position(|c| c.contains(pattern))
    }

    /// Whether the session has been closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }
}

impl Session for ScriptedSession {
    fn run(&mut self, command: &str, mut opts: RunOptions<'_>) -> Result<i32> {
        let rule = {
            let mut state = self.lock();
            if state.closed {
                return Err(Error::Closed);
            }
            state.log.push(Invocation::Run {
                command: command.to_string(),
                cwd: opts.cwd.clone(),
            });
            if state
                .drop_connection_on
                .as_deref()
                .is_some_and(|p| command.contains(p))
            {
                state.closed = true;
                return Err(Error::Closed);
            }

            let found = state.rules.iter_mut().find(|r| {
                command.contains(r.pattern.as_str()) && r.remaining.is_none_or(|n| n > 0)
            });
            found.map(|rule| {
                if let Some(n) = rule.remaining.as_mut() {
                    *n -= 1;
                }
                rule.clone()
            })
        };

        let Some(rule) = rule else {
            return Ok(0);
        };
        for line in &rule.stdout {
            opts.emit_stdout(line);
        }
        for line in &rule.stderr {
            opts.emit_stderr(line);
        }
        Ok(rule.exit_status)
    }

    fn transfer_file(&mut self, local: &Path, remote: &str) -> Result<()> {
        let mut state = self.lock();
        if state.closed {
            return Err(Error::Closed);
        }
        state.log.push(Invocation::Transfer {
            local: local.to_path_buf(),
            remote: remote.to_string(),
        });
        match &state.fail_transfer {
            Some(message) => Err(Error::Transfer {
                local: local.to_path_buf(),
                remote: remote.to_string(),
                message: message.clone(),
            }),
            None => Ok(()),
        }
    }

    fn close(&mut self) -> Result<()> {
        let mut state = self.lock();
        state.log.push(Invocation::Close);
        state.closed = true;
        Ok(())
    }

    fn target(&self) -> String {
        "scripted".to_string()
    }
}
