//! The deploy transaction.
//!
//! ```text
//! START -> BACKUP_CREATED -> STAGED -> SWAPPED -> HEALTH_CHECKED -> COMMITTED
//!                 \___________ any failure ___________/
//!                              v
//!                    ROLLING_BACK -> ROLLED_BACK
//! ```
//!
//! Cleanup runs after every attempt, committed or not.

pub mod layout;
pub mod orchestrator;
pub mod policy;

pub use layout::RemoteLayout;
pub use orchestrator::{DeployPlan, DeployReport, Orchestrator};
pub use policy::{StderrPolicy, StreamClassifier, ToolChatter};

use std::fmt;

/// Where a deploy attempt has got to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Start,
    BackupCreated,
    Staged,
    Swapped,
    HealthChecked,
    Committed,
    RollingBack,
    RolledBack,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Start => "start",
            Self::BackupCreated => "backup created",
            Self::Staged => "staged",
            Self::Swapped => "swapped",
            Self::HealthChecked => "health checked",
            Self::Committed => "committed",
            Self::RollingBack => "rolling back",
            Self::RolledBack => "rolled back",
        })
    }
}

/// The group of remote commands a command belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Prepare,
    Backup,
    Stage,
    Swap,
    Launch,
    HealthCheck,
    Commit,
    Rollback,
    Cleanup,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Prepare => "prepare",
            Self::Backup => "backup",
            Self::Stage => "stage",
            Self::Swap => "swap",
            Self::Launch => "launch",
            Self::HealthCheck => "health check",
            Self::Commit => "commit",
            Self::Rollback => "rollback",
            Self::Cleanup => "cleanup",
        })
    }
}
