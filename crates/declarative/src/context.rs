//! Callback traits for reconciliation
//!
//! These traits allow the declarative crate to be used without
//! depending on a specific terminal UI.

use crate::types::Action;
use anyhow::Result;
use thiserror::Error;

/// Progress callback for reconciliation
///
/// Implement this trait to receive progress updates while resources are
/// reconciled.
pub trait ProgressCallback: Send {
    /// Called when starting a batch of resources
    fn on_batch_start(&mut self, count: usize);

    /// Called when starting a single resource
    fn on_resource_start(&mut self, id: &str, description: &str);

    /// Called when a resource has been reused, updated or created
    fn on_resource_complete(&mut self, id: &str, action: Action);

    /// Called when a batch completes
    fn on_batch_complete(&mut self);
}

/// Confirmation callback for user interaction
///
/// Implement this trait to handle user confirmations.
pub trait ConfirmCallback: Send {
    /// Ask the user to confirm an action
    ///
    /// # Returns
    /// `true` if the user confirmed, `false` otherwise
    fn confirm(&mut self, prompt: &str) -> Result<bool>;
}

/// No-op progress callback
pub struct NoProgress;

impl ProgressCallback for NoProgress {
    fn on_batch_start(&mut self, _count: usize) {}
    fn on_resource_start(&mut self, _id: &str, _description: &str) {}
    fn on_resource_complete(&mut self, _id: &str, _action: Action) {}
    fn on_batch_complete(&mut self) {}
}

/// Auto-confirm callback (always returns true)
pub struct AutoConfirm;

impl ConfirmCallback for AutoConfirm {
    fn confirm(&mut self, _prompt: &str) -> Result<bool> {
        Ok(true)
    }
}

/// Auto-decline callback (always returns false)
pub struct AutoDecline;

impl ConfirmCallback for AutoDecline {
    fn confirm(&mut self, _prompt: &str) -> Result<bool> {
        Ok(false)
    }
}

/// Returned when the operator declines creating a resource
#[derive(Debug, Error)]
#[error("creation of {resource_type} '{resource_id}' was declined")]
pub struct Declined {
    pub resource_type: String,
    pub resource_id: String,
}
