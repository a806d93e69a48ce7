//! DNS zone resource

use cloudkit::{Domain, DomainSpec, Provisioner, ZoneType};
use declarative::Resource;
use std::fmt;

/// Desired state for one zone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DesiredDomain {
    pub name: String,
    pub soa_email: String,
    /// Defaults to a primary zone.
    pub zone_type: Option<ZoneType>,
}

impl DesiredDomain {
    pub fn new(name: impl Into<String>, soa_email: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            soa_email: soa_email.into(),
            zone_type: None,
        }
    }

    pub fn spec(&self) -> DomainSpec {
        DomainSpec {
            domain: self.name.clone(),
            zone_type: self.zone_type.unwrap_or_default(),
            soa_email: self.soa_email.clone(),
        }
    }
}

/// Zone looked up by exact name; existing zones are reused as-is.
pub struct DomainResource<'a> {
    provider: &'a dyn Provisioner,
    desired: DesiredDomain,
}

impl<'a> DomainResource<'a> {
    pub fn new(provider: &'a dyn Provisioner, desired: DesiredDomain) -> Self {
        Self { provider, desired }
    }
}

impl fmt::Debug for DomainResource<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DomainResource")
            .field("desired", &self.desired)
            .finish_non_exhaustive()
    }
}

impl Resource for DomainResource<'_> {
    type Live = Domain;
    type Patch = ();

    fn id(&self) -> String {
        self.desired.name.clone()
    }

    fn description(&self) -> String {
        format!("zone {}", self.desired.name)
    }

    fn resource_type(&self) -> &'static str {
        "domain"
    }

    fn lookup(&self) -> anyhow::Result<Option<Domain>> {
        let domains = self.provider.list_domains()?;
        Ok(domains.into_iter().find(|d| d.domain == self.desired.name))
    }

    fn create(&self) -> anyhow::Result<Domain> {
        Ok(self.provider.create_domain(&self.desired.spec())?)
    }
}
