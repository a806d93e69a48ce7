//! # cloudkit
//!
//! Blocking client for the cloud resources landfall reconciles: compute
//! instances, DNS zones and DNS records.
//!
//! The [`Provisioner`](backend::Provisioner) trait is the whole surface
//! consumed by reconciliation. [`LinodeBackend`](backend::linode::LinodeBackend)
//! implements it against Linode's API v4; [`MockProvisioner`](backend::MockProvisioner)
//! implements it in memory for tests.
//!
//! ## Example
//!
//! ```no_run
//! use cloudkit::backend::Provisioner;
//! use cloudkit::backend::linode::LinodeBackend;
//!
//! let provider = LinodeBackend::new(std::env::var("LINODE_TOKEN").unwrap());
//! for domain in provider.list_domains().unwrap() {
//!     println!("{domain}");
//! }
//! ```
//!
//! Credentials live on the backend value that is passed around. Nothing is
//! configured process-wide.

#![deny(unsafe_code)]
#![warn(clippy::all)]

/// Provisioner trait and backend implementations.
pub mod backend;
/// Error types for provider operations.
pub mod error;
/// Provider resource and request types.
pub mod types;

pub use backend::Provisioner;
pub use error::{Error, ErrorCategory, Result};
pub use types::{
    Domain, DomainId, DomainRecord, DomainSpec, Instance, InstanceId, InstanceSpec, RecordId,
    RecordPatch, RecordSpec, RecordType, ZoneType,
};
