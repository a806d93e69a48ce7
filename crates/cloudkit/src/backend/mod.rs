//! Provisioner trait and implementations.
//!
//! [`linode::LinodeBackend`] talks to the Linode API v4. [`MockProvisioner`]
//! keeps everything in memory and records every call, so reconciliation can
//! be tested without network access:
//!
//! ```
//! use cloudkit::backend::{Call, MockProvisioner, Provisioner};
//! use cloudkit::{DomainSpec, ZoneType};
//!
//! let mock = MockProvisioner::new();
//! mock.create_domain(&DomainSpec {
//!     domain: "example.com".to_string(),
//!     zone_type: ZoneType::Master,
//!     soa_email: "ops@example.com".to_string(),
//! })
//! .unwrap();
//!
//! assert_eq!(mock.list_domains().unwrap().len(), 1);
//! assert_eq!(mock.mutating_calls().len(), 1);
//! ```

pub mod linode;

use crate::error::{Error, Result};
use crate::types::{
    Domain, DomainId, DomainRecord, DomainSpec, Instance, InstanceSpec, RecordId, RecordPatch,
    RecordSpec,
};
use std::collections::{BTreeMap, HashSet};
use std::net::Ipv4Addr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// The provider surface reconciliation consumes.
///
/// Implementations carry their own credentials; there is no process-wide
/// client configuration.
pub trait Provisioner: Send + Sync {
    /// List every compute instance on the account.
    fn list_instances(&self) -> Result<Vec<Instance>>;

    /// Create a compute instance. Returns once the create call succeeded,
    /// not once the instance has booted.
    fn create_instance(&self, spec: &InstanceSpec) -> Result<Instance>;

    /// List every DNS zone on the account.
    fn list_domains(&self) -> Result<Vec<Domain>>;

    /// Create a DNS zone.
    fn create_domain(&self, spec: &DomainSpec) -> Result<Domain>;

    /// List the records of a zone.
    fn list_records(&self, domain_id: DomainId) -> Result<Vec<DomainRecord>>;

    /// Create a record in a zone.
    fn create_record(&self, domain_id: DomainId, spec: &RecordSpec) -> Result<DomainRecord>;

    /// Update only the fields present in `patch`.
    fn update_record(
        &self,
        domain_id: DomainId,
        record_id: RecordId,
        patch: &RecordPatch,
    ) -> Result<DomainRecord>;
}

/// Which provider call was made.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallKind {
    ListInstances,
    CreateInstance,
    ListDomains,
    CreateDomain,
    ListRecords,
    CreateRecord,
    UpdateRecord,
}

impl CallKind {
    /// Whether the call changes provider state.
    #[must_use]
    pub fn is_mutating(&self) -> bool {
        matches!(
            self,
            Self::CreateInstance | Self::CreateDomain | Self::CreateRecord | Self::UpdateRecord
        )
    }
}

/// A recorded call, with the payload that was sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    ListInstances,
    CreateInstance { label: String },
    ListDomains,
    CreateDomain { domain: String },
    ListRecords { domain_id: DomainId },
    CreateRecord { domain_id: DomainId, spec: RecordSpec },
    UpdateRecord {
        domain_id: DomainId,
        record_id: RecordId,
        patch: RecordPatch,
    },
}

impl Call {
    /// The kind of this call.
    #[must_use]
    pub fn kind(&self) -> CallKind {
        match self {
            Call::ListInstances => CallKind::ListInstances,
            Call::CreateInstance { .. } => CallKind::CreateInstance,
            Call::ListDomains => CallKind::ListDomains,
            Call::CreateDomain { .. } => CallKind::CreateDomain,
            Call::ListRecords { .. } => CallKind::ListRecords,
            Call::CreateRecord { .. } => CallKind::CreateRecord,
            Call::UpdateRecord { .. } => CallKind::UpdateRecord,
        }
    }
}

#[derive(Debug, Default)]
struct MockState {
    next_id: u64,
    instances: Vec<Instance>,
    domains: Vec<Domain>,
    records: BTreeMap<DomainId, Vec<DomainRecord>>,
    calls: Vec<Call>,
    failing: HashSet<CallKind>,
}

impl MockState {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }
}

/// In-memory provisioner for tests.
///
/// Clones share state, so a test can hand one clone to the code under test
/// and inspect the other.
#[derive(Debug, Clone, Default)]
pub struct MockProvisioner {
    state: Arc<Mutex<MockState>>,
}

impl MockProvisioner {
    /// Create an empty mock provider.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Seed an existing instance. Not recorded as a call.
    pub fn seed_instance(&self, label: &str, address: Ipv4Addr) -> Instance {
        let mut state = self.state();
        let instance = Instance {
            id: state.next_id(),
            label: label.to_string(),
            ipv4: vec![address],
            region: "us-central".to_string(),
            instance_type: "g6-nanode-1".to_string(),
            image: None,
            status: "running".to_string(),
        };
        state.instances.push(instance.clone());
        instance
    }

    /// Seed an existing zone. Not recorded as a call.
    pub fn seed_domain(&self, name: &str) -> Domain {
        let mut state = self.state();
        let domain = Domain {
            id: state.next_id(),
            domain: name.to_string(),
            zone_type: crate::types::ZoneType::Master,
            soa_email: format!("hostmaster@{name}"),
        };
        state.domains.push(domain.clone());
        domain
    }

    /// Seed an existing record. Not recorded as a call.
    pub fn seed_record(&self, domain_id: DomainId, spec: &RecordSpec) -> DomainRecord {
        let mut state = self.state();
        let record = DomainRecord {
            id: state.next_id(),
            record_type: spec.record_type,
            name: spec.name.clone(),
            target: spec.target.clone(),
            ttl_sec: spec.ttl_sec.unwrap_or(0),
        };
        state.records.entry(domain_id).or_default().push(record.clone());
        record
    }

    /// Make every future call of `kind` fail with a provider API error.
    pub fn fail_on(&self, kind: CallKind) {
        self.state().failing.insert(kind);
    }

    /// Every call made so far, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<Call> {
        self.state().calls.clone()
    }

    /// Only the calls that changed state.
    #[must_use]
    pub fn mutating_calls(&self) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|c| c.kind().is_mutating())
            .collect()
    }

    /// Forget recorded calls (state is kept).
    pub fn clear_calls(&self) {
        self.state().calls.clear();
    }

    fn record_call(&self, call: Call) -> Result<MutexGuard<'_, MockState>> {
        let mut state = self.state();
        let kind = call.kind();
        state.calls.push(call);
        if state.failing.contains(&kind) {
            return Err(Error::Api {
                status: 500,
                reasons: vec![format!("injected failure for {kind:?}")],
            });
        }
        Ok(state)
    }
}

impl Provisioner for MockProvisioner {
    fn list_instances(&self) -> Result<Vec<Instance>> {
        let state = self.record_call(Call::ListInstances)?;
        Ok(state.instances.clone())
    }

    fn create_instance(&self, spec: &InstanceSpec) -> Result<Instance> {
        let mut state = self.record_call(Call::CreateInstance {
            label: spec.label.clone(),
        })?;
        let id = state.next_id();
        let octet = u8::try_from(id % 250 + 1).unwrap_or(1);
        let instance = Instance {
            id,
            label: spec.label.clone(),
            ipv4: vec![Ipv4Addr::new(192, 0, 2, octet)],
            region: spec.region.clone(),
            instance_type: spec.instance_type.clone(),
            image: Some(spec.image.clone()),
            status: "provisioning".to_string(),
        };
        state.instances.push(instance.clone());
        Ok(instance)
    }

    fn list_domains(&self) -> Result<Vec<Domain>> {
        let state = self.record_call(Call::ListDomains)?;
        Ok(state.domains.clone())
    }

    fn create_domain(&self, spec: &DomainSpec) -> Result<Domain> {
        let mut state = self.record_call(Call::CreateDomain {
            domain: spec.domain.clone(),
        })?;
        let domain = Domain {
            id: state.next_id(),
            domain: spec.domain.clone(),
            zone_type: spec.zone_type,
            soa_email: spec.soa_email.clone(),
        };
        state.domains.push(domain.clone());
        Ok(domain)
    }

    fn list_records(&self, domain_id: DomainId) -> Result<Vec<DomainRecord>> {
        let state = self.record_call(Call::ListRecords { domain_id })?;
        if !state.domains.iter().any(|d| d.id == domain_id) {
            return Err(Error::NotFound {
                kind: "domain",
                id: domain_id.to_string(),
            });
        }
        Ok(state.records.get(&domain_id).cloned().unwrap_or_default())
    }

    fn create_record(&self, domain_id: DomainId, spec: &RecordSpec) -> Result<DomainRecord> {
        let mut state = self.record_call(Call::CreateRecord {
            domain_id,
            spec: spec.clone(),
        })?;
        let record = DomainRecord {
            id: state.next_id(),
            record_type: spec.record_type,
            name: spec.name.clone(),
            target: spec.target.clone(),
            ttl_sec: spec.ttl_sec.unwrap_or(0),
        };
        state.records.entry(domain_id).or_default().push(record.clone());
        Ok(record)
    }

    fn update_record(
        &self,
        domain_id: DomainId,
        record_id: RecordId,
        patch: &RecordPatch,
    ) -> Result<DomainRecord> {
        let mut state = self.record_call(Call::UpdateRecord {
            domain_id,
            record_id,
            patch: patch.clone(),
        })?;
        let record = state
            .records
            .get_mut(&domain_id)
            .and_then(|records| records.iter_mut().find(|r| r.id == record_id))
            .ok_or_else(|| Error::NotFound {
                kind: "record",
                id: record_id.to_string(),
            })?;
        *record = patch.apply_to(record);
        Ok(record.clone())
    }
}
