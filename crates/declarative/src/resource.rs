//! Resource trait for declarative reconciliation
//!
//! A Resource describes desired state for something owned by an external
//! provider, and knows how to find, compare, create and update it.

use crate::diff::Change;
use anyhow::Result;
use std::fmt;

/// Core trait for reconcilable resources
///
/// Every resource provides:
/// - Identity (id, description, type)
/// - Lookup of the live resource matching its identity
/// - A diff of desired against live state
/// - Create and (optionally) update
///
/// Reconciliation follows a three-way branch: reuse when the live resource
/// matches, update with exactly the differing fields when it doesn't, create
/// when nothing matches. Running it twice with identical desired state
/// makes no create or update calls the second time.
///
/// # Example
///
/// ```ignore
/// use declarative::Resource;
///
/// #[derive(Debug)]
/// struct Zone<'a> { provider: &'a Dns, name: String }
///
/// impl Resource for Zone<'_> {
///     type Live = LiveZone;
///     type Patch = ();
///
///     fn id(&self) -> String { self.name.clone() }
///     fn description(&self) -> String { format!("Zone {}", self.name) }
///     fn resource_type(&self) -> &'static str { "domain" }
///
///     fn lookup(&self) -> anyhow::Result<Option<LiveZone>> {
///         Ok(self.provider.zones()?.into_iter().find(|z| z.name == self.name))
///     }
///
///     fn create(&self) -> anyhow::Result<LiveZone> {
///         Ok(self.provider.create_zone(&self.name)?)
///     }
/// }
/// ```
pub trait Resource: Send + Sync + fmt::Debug {
    /// The provider's representation of the resource
    type Live: Clone + Send + fmt::Debug;

    /// A minimal change set turning a live resource into the desired one
    type Patch: Send + fmt::Debug;

    /// Unique identifier for this resource within its type
    ///
    /// Examples:
    /// - "web-production" for an instance label
    /// - "example.com" for a zone
    /// - "example.com/A/www" for an address record
    fn id(&self) -> String;

    /// Human-readable description of what this resource is
    fn description(&self) -> String;

    /// Resource type category ("instance", "domain", "record")
    fn resource_type(&self) -> &'static str;

    /// Find the live resource matching this resource's identity
    fn lookup(&self) -> Result<Option<Self::Live>>;

    /// Compare desired state against a live resource
    ///
    /// Return `None` when the live resource should be reused as-is. The
    /// default never updates: resources without an update path are
    /// reused whenever they exist.
    fn diff(&self, _live: &Self::Live) -> Option<Self::Patch> {
        None
    }

    /// Names of the fields a patch changes, for reporting
    fn patch_fields(&self, _patch: &Self::Patch) -> Vec<String> {
        Vec::new()
    }

    /// Create the resource from desired state
    fn create(&self) -> Result<Self::Live>;

    /// Apply a patch to a live resource
    fn update(&self, _live: &Self::Live, _patch: Self::Patch) -> Result<Self::Live> {
        anyhow::bail!("{} resources cannot be updated in place", self.resource_type())
    }

    /// Whether creating this resource should be confirmed first
    ///
    /// Override for resources that are expensive or slow to create.
    fn requires_confirmation(&self) -> bool {
        false
    }

    /// Whether this resource can be reconciled in parallel with others
    fn can_parallelize(&self) -> bool {
        true
    }

    /// Work out what reconciliation would do, without changing anything
    fn plan(&self) -> Result<Change> {
        Ok(match self.lookup()? {
            None => Change::Create,
            Some(live) => match self.diff(&live) {
                None => Change::None,
                Some(patch) => Change::Update {
                    fields: self.patch_fields(&patch),
                },
            },
        })
    }
}
