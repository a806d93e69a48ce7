//! Error taxonomy for a landfall run.
//!
//! Each variant maps to its own process exit code so an operator (or a CI
//! step) can tell "the host never came up" from "the deploy command failed"
//! from "the host is in an unknown state".

use crate::deploy::Step;
use std::fmt;
use std::time::Duration;

pub type Result<T> = std::result::Result<T, Error>;

/// What a timeout was waiting for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutKind {
    /// The freshly reconciled host never answered.
    Readiness,
    /// A post-deploy health endpoint never returned success.
    HealthCheck,
}

impl fmt::Display for TimeoutKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Readiness => "readiness wait",
            Self::HealthCheck => "health check",
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Malformed input, detected before any provider or remote call.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A provider API call failed. Never retried.
    #[error("provider error: {0}")]
    Provider(#[from] cloudkit::Error),

    #[error("{kind} timed out after {}s waiting for {url}{}", .elapsed.as_secs(), last_seen(.last_status))]
    Timeout {
        kind: TimeoutKind,
        url: String,
        elapsed: Duration,
        last_status: Option<String>,
    },

    /// A deploy command exited non-zero or wrote to a stream its policy
    /// treats as failure.
    #[error("{step} step failed: {}", describe_failure(.command, .exit_status, .stderr))]
    RemoteCommand {
        step: Step,
        command: String,
        exit_status: i32,
        stderr: Vec<String>,
    },

    /// The transport failed (connect, transfer, dropped session).
    #[error("remote error: {0}")]
    Remote(#[from] remotekit::Error),

    /// Rollback did not complete; the host needs manual attention.
    #[error("{original}; rollback also failed, host state is unknown: {rollback}")]
    RollbackFailed {
        original: Box<Error>,
        rollback: Box<Error>,
    },

    #[error("cancelled")]
    Cancelled,
}

fn last_seen(status: &Option<String>) -> String {
    match status {
        Some(s) => format!(" (last: {s})"),
        None => String::new(),
    }
}

fn describe_failure(command: &str, exit_status: &i32, stderr: &[String]) -> String {
    let mut message = if *exit_status == 0 {
        format!("`{command}` wrote to stderr")
    } else {
        format!("`{command}` exited with status {exit_status}")
    };
    if let Some(last) = stderr.last() {
        message.push_str(": ");
        message.push_str(last);
    }
    message
}

impl Error {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Process exit code for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Configuration(_) => 2,
            Self::Provider(_) => 3,
            Self::Timeout { .. } => 4,
            Self::RemoteCommand { .. } => 5,
            Self::Remote(_) => 6,
            Self::RollbackFailed { .. } => 7,
            Self::Cancelled => 130,
        }
    }

    /// Convert an error from the reconciliation framework.
    ///
    /// Resources raise provider and landfall errors through `anyhow`; both
    /// are recovered here so the exit code stays meaningful.
    pub fn from_reconcile(err: anyhow::Error) -> Self {
        let err = match err.downcast::<Self>() {
            Ok(own) => return own,
            Err(err) => err,
        };
        let err = match err.downcast::<cloudkit::Error>() {
            Ok(provider) => return Self::Provider(provider),
            Err(err) => err,
        };
        if err.downcast_ref::<declarative::Declined>().is_some() {
            return Self::Cancelled;
        }
        Self::Provider(cloudkit::Error::Other(format!("{err:#}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes_are_distinct() {
        let errors = [
            Error::config("bad"),
            Error::Provider(cloudkit::Error::Other("x".into())),
            Error::Timeout {
                kind: TimeoutKind::Readiness,
                url: "http://192.0.2.1".into(),
                elapsed: Duration::from_secs(1),
                last_status: None,
            },
            Error::RemoteCommand {
                step: Step::Launch,
                command: "./start".into(),
                exit_status: 1,
                stderr: vec![],
            },
            Error::Remote(remotekit::Error::Closed),
            Error::RollbackFailed {
                original: Box::new(Error::Cancelled),
                rollback: Box::new(Error::Cancelled),
            },
            Error::Cancelled,
        ];
        let mut codes: Vec<_> = errors.iter().map(Error::exit_code).collect();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), errors.len());
    }

    #[test]
    fn test_remote_command_message() {
        let err = Error::RemoteCommand {
            step: Step::Launch,
            command: "docker compose up -d".into(),
            exit_status: 1,
            stderr: vec!["pull access denied".into()],
        };
        assert_eq!(
            err.to_string(),
            "launch step failed: `docker compose up -d` exited with status 1: pull access denied"
        );

        let err = Error::RemoteCommand {
            step: Step::Stage,
            command: "tar -xzf build.tar.gz".into(),
            exit_status: 0,
            stderr: vec!["tar: Ignoring unknown keyword".into()],
        };
        assert!(err.to_string().contains("wrote to stderr"));
    }

    #[test]
    fn test_timeout_message() {
        let err = Error::Timeout {
            kind: TimeoutKind::HealthCheck,
            url: "http://192.0.2.1/health".into(),
            elapsed: Duration::from_secs(60),
            last_status: Some("HTTP 502".into()),
        };
        assert_eq!(
            err.to_string(),
            "health check timed out after 60s waiting for http://192.0.2.1/health (last: HTTP 502)"
        );
    }

    #[test]
    fn test_from_reconcile_recovers_types() {
        let provider = anyhow::Error::new(cloudkit::Error::NotFound {
            kind: "domain",
            id: "7".into(),
        });
        assert!(matches!(Error::from_reconcile(provider), Error::Provider(_)));

        let own = anyhow::Error::new(Error::config("no ipv4"));
        assert!(matches!(Error::from_reconcile(own), Error::Configuration(_)));

        let declined = anyhow::Error::new(declarative::Declined {
            resource_type: "instance".into(),
            resource_id: "web".into(),
        });
        assert!(matches!(Error::from_reconcile(declined), Error::Cancelled));
    }
}
