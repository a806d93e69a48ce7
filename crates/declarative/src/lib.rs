//! # Declarative
//!
//! A framework for declarative reconciliation of externally owned resources.
//!
//! A resource declares desired state, knows how to find its live
//! counterpart, and converges it with a three-way branch: reuse it when it
//! matches, update it with a minimal patch when it differs, create it when
//! it is missing.
//!
//! ## Core Concepts
//!
//! - **Resource**: Something owned by a provider (an instance, a zone, a record)
//! - **Outcome**: What reconciliation did, carrying the live resource
//! - **Change**: What reconciliation would do, for dry runs
//! - **Executor**: Reconciles resources, in parallel where allowed
//!
//! ## Example
//!
//! ```ignore
//! use declarative::{reconcile_all, AutoConfirm, ExecuteOptions, NoProgress};
//!
//! let records = vec![
//!     AddressRecord::new(&provider, &zone, "", ip),
//!     AddressRecord::new(&provider, &zone, "www", ip),
//! ];
//! let outcomes = reconcile_all(
//!     &records,
//!     &ExecuteOptions { jobs: 4 },
//!     &mut NoProgress,
//!     &mut AutoConfirm,
//! )?;
//! ```
//!
//! ## Callback Traits
//!
//! - [`ProgressCallback`]: Receives progress updates
//! - [`ConfirmCallback`]: Handles user confirmations
//!
//! This allows the crate to be used without hard dependencies on a
//! specific UI framework.

pub mod context;
pub mod diff;
pub mod executor;
pub mod resource;
pub mod types;

// Re-export main types at crate root
pub use context::{AutoConfirm, AutoDecline, ConfirmCallback, Declined, NoProgress, ProgressCallback};
pub use diff::{Change, DiffSummary, ResourceDiff, group_by_type};
pub use executor::{reconcile, reconcile_all, reconcile_simple};
pub use resource::Resource;
pub use types::{Action, ExecuteOptions, Outcome, ReconcileSummary};
