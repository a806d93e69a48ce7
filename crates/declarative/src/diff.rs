//! Diff computation for resources

use crate::resource::Resource;
use anyhow::Result;
use serde::{Deserialize, Serialize};

/// What reconciliation would do to one resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Change {
    /// Live resource matches desired state
    None,
    /// No live resource exists
    Create,
    /// Live resource exists but these fields differ
    Update { fields: Vec<String> },
}

/// A planned change for a resource
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceDiff {
    /// Unique identifier of the resource
    pub resource_id: String,
    /// Type of the resource
    pub resource_type: String,
    /// Human-readable description
    pub description: String,
    /// What would happen
    pub change: Change,
}

impl ResourceDiff {
    /// Describe a resource with a change decided by the caller
    pub fn new<R: Resource>(resource: &R, change: Change) -> Self {
        Self {
            resource_id: resource.id(),
            resource_type: resource.resource_type().to_string(),
            description: resource.description(),
            change,
        }
    }

    /// Plan a resource; only list calls are made
    pub fn from_resource<R: Resource>(resource: &R) -> Result<Self> {
        Ok(Self::new(resource, resource.plan()?))
    }

    /// Check if this diff represents an addition
    pub fn is_addition(&self) -> bool {
        matches!(self.change, Change::Create)
    }

    /// Check if this diff represents a modification
    pub fn is_modification(&self) -> bool {
        matches!(self.change, Change::Update { .. })
    }

    /// Check if nothing would change
    pub fn is_unchanged(&self) -> bool {
        matches!(self.change, Change::None)
    }
}

/// Diff summary statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiffSummary {
    /// Number of resources to create
    pub additions: usize,
    /// Number of resources to update
    pub modifications: usize,
    /// Number of resources already in desired state
    pub unchanged: usize,
}

impl DiffSummary {
    /// Create a summary from a list of diffs
    pub fn from_diffs(diffs: &[ResourceDiff]) -> Self {
        let mut summary = Self::default();
        for diff in diffs {
            match diff.change {
                Change::Create => summary.additions += 1,
                Change::Update { .. } => summary.modifications += 1,
                Change::None => summary.unchanged += 1,
            }
        }
        summary
    }

    /// Total number of changes
    pub fn total(&self) -> usize {
        self.additions + self.modifications
    }

    /// Check if there are any changes
    pub fn has_changes(&self) -> bool {
        self.total() > 0
    }
}

/// Group diffs by resource type
pub fn group_by_type(
    diffs: &[ResourceDiff],
) -> std::collections::BTreeMap<String, Vec<&ResourceDiff>> {
    let mut groups: std::collections::BTreeMap<String, Vec<&ResourceDiff>> =
        std::collections::BTreeMap::new();
    for diff in diffs {
        groups
            .entry(diff.resource_type.clone())
            .or_default()
            .push(diff);
    }
    groups
}
