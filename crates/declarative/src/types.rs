//! Core types for declarative reconciliation

use serde::{Deserialize, Serialize};
use std::fmt;

/// What reconciliation did to a resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    /// Live resource already matched; nothing was sent
    Reused,
    /// Live resource differed and was updated in place
    Updated,
    /// No live resource existed; one was created
    Created,
}

impl Action {
    /// Check if the action changed provider state
    pub fn is_change(&self) -> bool {
        !matches!(self, Self::Reused)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Reused => "reused",
            Self::Updated => "updated",
            Self::Created => "created",
        })
    }
}

/// Result of reconciling one resource, carrying the live resource
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome<T> {
    /// Existing resource returned unchanged
    Reused(T),
    /// Existing resource updated; `fields` lists what changed
    Updated { live: T, fields: Vec<String> },
    /// New resource created
    Created(T),
}

impl<T> Outcome<T> {
    /// Borrow the live resource
    pub fn live(&self) -> &T {
        match self {
            Self::Reused(live) | Self::Created(live) | Self::Updated { live, .. } => live,
        }
    }

    /// Take the live resource
    pub fn into_live(self) -> T {
        match self {
            Self::Reused(live) | Self::Created(live) | Self::Updated { live, .. } => live,
        }
    }

    /// Which branch was taken
    pub fn action(&self) -> Action {
        match self {
            Self::Reused(_) => Action::Reused,
            Self::Updated { .. } => Action::Updated,
            Self::Created(_) => Action::Created,
        }
    }

    /// Check if reconciliation changed provider state
    pub fn is_change(&self) -> bool {
        self.action().is_change()
    }
}

/// Summary of reconciliation results
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileSummary {
    pub created: usize,
    pub updated: usize,
    pub reused: usize,
}

impl ReconcileSummary {
    /// Total number of resources that were created or updated
    pub fn total_changes(&self) -> usize {
        self.created + self.updated
    }

    /// Total number of resources processed
    pub fn total(&self) -> usize {
        self.created + self.updated + self.reused
    }

    /// Merge another summary into this one
    pub fn merge(&mut self, other: &ReconcileSummary) {
        self.created += other.created;
        self.updated += other.updated;
        self.reused += other.reused;
    }

    /// Count one action
    pub fn add(&mut self, action: Action) {
        match action {
            Action::Reused => self.reused += 1,
            Action::Updated => self.updated += 1,
            Action::Created => self.created += 1,
        }
    }

    /// Build a summary from outcomes
    pub fn from_outcomes<T>(outcomes: &[Outcome<T>]) -> Self {
        let mut summary = Self::default();
        for outcome in outcomes {
            summary.add(outcome.action());
        }
        summary
    }
}

/// Options for batch reconciliation
#[derive(Debug, Clone)]
pub struct ExecuteOptions {
    /// Number of resources reconciled concurrently
    pub jobs: usize,
}

impl Default for ExecuteOptions {
    fn default() -> Self {
        Self { jobs: 4 }
    }
}
