//! Provider-side reconciliation: one instance, its zones, their address records.
//!
//! The instance is reconciled first because its address is the target of
//! every record. Zones are then linked independently of each other, and
//! within a zone every address record is reconciled independently.

pub mod domain;
pub mod instance;
pub mod record;

pub use domain::{DesiredDomain, DomainResource};
pub use instance::{DesiredInstance, InstanceResource, InstanceTemplate, instance_address};
pub use record::RecordResource;

use crate::domains::DomainGroup;
use crate::error::{Error, Result};
use crate::progress::{ProgressSink, ReconcileProgress};
use cloudkit::{Domain, DomainRecord, Instance, Provisioner, RecordSpec};
use declarative::{
    Change, ConfirmCallback, ExecuteOptions, Outcome, ReconcileSummary, Resource, ResourceDiff,
    reconcile, reconcile_all,
};
use log::info;
use rayon::prelude::*;
use std::net::Ipv4Addr;

/// Everything a run should converge at the provider.
#[derive(Debug, Clone)]
pub struct DesiredState {
    pub instance: DesiredInstance,
    pub domains: Vec<DomainGroup>,
    /// SOA contact for zones that have to be created.
    pub soa_email: String,
    pub ttl_sec: Option<u32>,
}

/// A zone and the address records now pointing at the instance.
#[derive(Debug, Clone)]
pub struct LinkedDomain {
    pub domain: Outcome<Domain>,
    pub records: Vec<Outcome<DomainRecord>>,
}

#[derive(Debug, Clone)]
pub struct ReconcileReport {
    pub instance: Outcome<Instance>,
    pub address: Ipv4Addr,
    pub domains: Vec<LinkedDomain>,
    pub summary: ReconcileSummary,
}

/// Converges provider state through an explicit provider handle.
pub struct Reconciler<'a> {
    provider: &'a dyn Provisioner,
    sink: &'a dyn ProgressSink,
    opts: ExecuteOptions,
}

impl<'a> Reconciler<'a> {
    pub fn new(provider: &'a dyn Provisioner, sink: &'a dyn ProgressSink) -> Self {
        Self {
            provider,
            sink,
            opts: ExecuteOptions::default(),
        }
    }

    #[must_use]
    pub fn jobs(mut self, jobs: usize) -> Self {
        self.opts.jobs = jobs.max(1);
        self
    }

    /// Find the instance by label, creating it (after `confirm`) if missing.
    pub fn reconcile_instance<C: ConfirmCallback>(
        &self,
        desired: DesiredInstance,
        confirm: &mut C,
    ) -> Result<Outcome<Instance>> {
        let resource = InstanceResource::new(self.provider, desired);
        reconcile(&resource, &mut ReconcileProgress::new(self.sink), confirm)
            .map_err(Error::from_reconcile)
    }

    /// Find the zone by exact name, creating it if missing.
    pub fn reconcile_domain(&self, desired: DesiredDomain) -> Result<Outcome<Domain>> {
        let resource = DomainResource::new(self.provider, desired);
        reconcile(
            &resource,
            &mut ReconcileProgress::new(self.sink),
            &mut declarative::AutoConfirm,
        )
        .map_err(Error::from_reconcile)
    }

    /// Reconcile records of one zone. The zone is listed once.
    pub fn reconcile_records(
        &self,
        domain: &Domain,
        specs: Vec<RecordSpec>,
    ) -> Result<Vec<Outcome<DomainRecord>>> {
        let existing = self.provider.list_records(domain.id)?;
        let resources: Vec<_> = specs
            .into_iter()
            .map(|spec| RecordResource::new(self.provider, domain, &existing, spec))
            .collect();
        reconcile_all(
            &resources,
            &self.opts,
            &mut ReconcileProgress::new(self.sink),
            &mut declarative::AutoConfirm,
        )
        .map_err(Error::from_reconcile)
    }

    /// Ensure the zone exists and its apex and subdomains point at `address`.
    pub fn link_domain(
        &self,
        group: &DomainGroup,
        soa_email: &str,
        address: Ipv4Addr,
        ttl_sec: Option<u32>,
    ) -> Result<LinkedDomain> {
        let domain = self.reconcile_domain(DesiredDomain::new(&group.domain, soa_email))?;
        let records = self.reconcile_records(domain.live(), address_specs(group, address, ttl_sec))?;
        Ok(LinkedDomain { domain, records })
    }

    /// Link every zone, concurrently when `jobs` allows. The first error
    /// aborts the run.
    pub fn link_domains(
        &self,
        groups: &[DomainGroup],
        soa_email: &str,
        address: Ipv4Addr,
        ttl_sec: Option<u32>,
    ) -> Result<Vec<LinkedDomain>> {
        if self.opts.jobs <= 1 || groups.len() <= 1 {
            return groups
                .iter()
                .map(|g| self.link_domain(g, soa_email, address, ttl_sec))
                .collect();
        }

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.opts.jobs.min(groups.len()))
            .build()
            .map_err(|e| Error::config(format!("failed to start worker pool: {e}")))?;
        pool.install(|| {
            groups
                .par_iter()
                .map(|g| self.link_domain(g, soa_email, address, ttl_sec))
                .collect()
        })
    }

    /// Converge instance, zones and records.
    pub fn run<C: ConfirmCallback>(
        &self,
        desired: &DesiredState,
        confirm: &mut C,
    ) -> Result<ReconcileReport> {
        let instance = self.reconcile_instance(desired.instance.clone(), confirm)?;
        let address = instance_address(instance.live())?;
        info!("instance {} at {address}", instance.live().label);

        let domains =
            self.link_domains(&desired.domains, &desired.soa_email, address, desired.ttl_sec)?;

        let mut summary = ReconcileSummary::default();
        summary.add(instance.action());
        for linked in &domains {
            summary.add(linked.domain.action());
            summary.merge(&ReconcileSummary::from_outcomes(&linked.records));
        }

        Ok(ReconcileReport {
            instance,
            address,
            domains,
            summary,
        })
    }

    /// What [`run`](Self::run) would do. Only list calls are made.
    ///
    /// When the instance does not exist yet its address is unknown, so every
    /// existing record is reported as a target update.
    pub fn plan(&self, desired: &DesiredState) -> Result<Vec<ResourceDiff>> {
        let instance = InstanceResource::new(self.provider, desired.instance.clone());
        let live = instance.lookup().map_err(Error::from_reconcile)?;
        let address = live.as_ref().map(instance_address).transpose()?;
        let mut diffs = vec![ResourceDiff::new(
            &instance,
            if live.is_some() { Change::None } else { Change::Create },
        )];

        let zones = self.provider.list_domains()?;
        for group in &desired.domains {
            let zone = DomainResource::new(
                self.provider,
                DesiredDomain::new(&group.domain, &desired.soa_email),
            );
            let Some(live_zone) = zones.iter().find(|z| z.domain == group.domain) else {
                diffs.push(ResourceDiff::new(&zone, Change::Create));
                let placeholder = Domain {
                    id: 0,
                    domain: group.domain.clone(),
                    zone_type: cloudkit::ZoneType::Master,
                    soa_email: desired.soa_email.clone(),
                };
                let target = address.unwrap_or(Ipv4Addr::UNSPECIFIED);
                for spec in address_specs(group, target, desired.ttl_sec) {
                    let record = RecordResource::new(self.provider, &placeholder, &[], spec);
                    diffs.push(ResourceDiff::new(&record, Change::Create));
                }
                continue;
            };
            diffs.push(ResourceDiff::new(&zone, Change::None));

            let existing = self.provider.list_records(live_zone.id)?;
            let target = address.unwrap_or(Ipv4Addr::UNSPECIFIED);
            for spec in address_specs(group, target, desired.ttl_sec) {
                let record = RecordResource::new(self.provider, live_zone, &existing, spec);
                let diff = match (address, record.lookup().map_err(Error::from_reconcile)?) {
                    (_, None) => ResourceDiff::new(&record, Change::Create),
                    (None, Some(_)) => ResourceDiff::new(
                        &record,
                        Change::Update {
                            fields: vec!["target".to_string()],
                        },
                    ),
                    (Some(_), Some(_)) => {
                        ResourceDiff::from_resource(&record).map_err(Error::from_reconcile)?
                    }
                };
                diffs.push(diff);
            }
        }
        Ok(diffs)
    }
}

fn address_specs(group: &DomainGroup, address: Ipv4Addr, ttl_sec: Option<u32>) -> Vec<RecordSpec> {
    group
        .record_names()
        .into_iter()
        .map(|name| RecordSpec::a(name, address).ttl(ttl_sec))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domains::{SuffixParser, parse_domains};
    use crate::progress::{Event, RecordingSink};
    use cloudkit::backend::{Call, CallKind, MockProvisioner};
    use declarative::{Action, AutoConfirm, AutoDecline, DiffSummary};

    fn desired(hosts: &str) -> DesiredState {
        DesiredState {
            instance: DesiredInstance::new("shop-production"),
            domains: parse_domains([hosts], &SuffixParser).unwrap(),
            soa_email: "ops@example.com".into(),
            ttl_sec: None,
        }
    }

    fn record_names(report: &ReconcileReport) -> Vec<String> {
        report
            .domains
            .iter()
            .flat_map(|d| d.records.iter().map(|r| r.live().name.clone()))
            .collect()
    }

    #[test]
    fn test_second_run_makes_no_changes() {
        let mock = MockProvisioner::new();
        let sink = RecordingSink::default();
        let reconciler = Reconciler::new(&mock, &sink);
        let state = desired("example.com,www.example.com,api.example.org");

        let first = reconciler.run(&state, &mut AutoConfirm).unwrap();
        assert_eq!(first.summary.created, 1 + 2 + 4);

        mock.clear_calls();
        let second = reconciler.run(&state, &mut AutoConfirm).unwrap();
        assert!(mock.mutating_calls().is_empty());
        assert_eq!(second.summary.total_changes(), 0);
        assert_eq!(second.instance.live().id, first.instance.live().id);

        let ids = |r: &ReconcileReport| -> Vec<u64> {
            r.domains
                .iter()
                .flat_map(|d| {
                    std::iter::once(d.domain.live().id).chain(d.records.iter().map(|r| r.live().id))
                })
                .collect()
        };
        assert_eq!(ids(&first), ids(&second));
    }

    #[test]
    fn test_apex_fan_out() {
        let mock = MockProvisioner::new();
        let sink = RecordingSink::default();
        let report = Reconciler::new(&mock, &sink)
            .run(&desired("api.example.com,www.example.com,api.example.com"), &mut AutoConfirm)
            .unwrap();

        assert_eq!(record_names(&report), vec!["", "api", "www"]);
        let created: Vec<_> = mock
            .mutating_calls()
            .into_iter()
            .filter(|c| c.kind() == CallKind::CreateRecord)
            .collect();
        assert_eq!(created.len(), 3);
    }

    #[test]
    fn test_moved_instance_updates_only_targets() {
        let mock = MockProvisioner::new();
        let new_ip = Ipv4Addr::new(198, 51, 100, 20);
        mock.seed_instance("shop-production", new_ip);
        let zone = mock.seed_domain("example.com");
        let apex = mock.seed_record(zone.id, &RecordSpec::a("", Ipv4Addr::new(192, 0, 2, 1)));
        let sink = RecordingSink::default();

        let report = Reconciler::new(&mock, &sink)
            .jobs(1)
            .run(&desired("example.com"), &mut AutoConfirm)
            .unwrap();

        assert_eq!(report.address, new_ip);
        assert_eq!(
            mock.mutating_calls(),
            vec![Call::UpdateRecord {
                domain_id: zone.id,
                record_id: apex.id,
                patch: cloudkit::RecordPatch {
                    target: Some(new_ip.to_string()),
                    ..Default::default()
                },
            }]
        );
        assert_eq!(report.summary.updated, 1);
        assert_eq!(report.summary.reused, 2);
    }

    #[test]
    fn test_provider_failure_aborts() {
        let mock = MockProvisioner::new();
        mock.fail_on(CallKind::CreateDomain);
        let sink = RecordingSink::default();

        let err = Reconciler::new(&mock, &sink)
            .run(&desired("example.com"), &mut AutoConfirm)
            .unwrap_err();
        assert!(matches!(err, Error::Provider(cloudkit::Error::Api { status: 500, .. })));
        assert!(!mock.calls().iter().any(|c| c.kind() == CallKind::CreateRecord));
    }

    #[test]
    fn test_declined_instance_creation() {
        let mock = MockProvisioner::new();
        let sink = RecordingSink::default();
        let err = Reconciler::new(&mock, &sink)
            .run(&desired("example.com"), &mut AutoDecline)
            .unwrap_err();
        assert!(matches!(err, Error::Cancelled));
        assert!(mock.mutating_calls().is_empty());
    }

    #[test]
    fn test_progress_events_reach_sink() {
        let mock = MockProvisioner::new();
        let sink = RecordingSink::default();
        Reconciler::new(&mock, &sink)
            .jobs(1)
            .run(&desired("example.com"), &mut AutoConfirm)
            .unwrap();

        let reconciled: Vec<_> = sink
            .events()
            .into_iter()
            .filter_map(|e| match e {
                Event::ResourceReconciled { id, action } => Some((id, action)),
                _ => None,
            })
            .collect();
        assert_eq!(
            reconciled,
            vec![
                ("shop-production".to_string(), Action::Created),
                ("example.com".to_string(), Action::Created),
                ("example.com/A/@".to_string(), Action::Created),
            ]
        );
    }

    #[test]
    fn test_plan_only_lists() {
        let mock = MockProvisioner::new();
        mock.seed_instance("shop-production", Ipv4Addr::new(198, 51, 100, 20));
        let zone = mock.seed_domain("example.com");
        mock.seed_record(zone.id, &RecordSpec::a("", Ipv4Addr::new(192, 0, 2, 1)));
        let sink = RecordingSink::default();

        let diffs = Reconciler::new(&mock, &sink)
            .plan(&desired("www.example.com,example.org"))
            .unwrap();

        assert!(mock.mutating_calls().is_empty());
        let summary = DiffSummary::from_diffs(&diffs);
        // instance + example.com zone unchanged; apex target differs;
        // www, example.org zone and its apex are new
        assert_eq!(summary.unchanged, 2);
        assert_eq!(summary.modifications, 1);
        assert_eq!(summary.additions, 3);
    }

    #[test]
    fn test_plan_without_instance() {
        let mock = MockProvisioner::new();
        let zone = mock.seed_domain("example.com");
        mock.seed_record(zone.id, &RecordSpec::a("", Ipv4Addr::new(192, 0, 2, 1)));
        let sink = RecordingSink::default();

        let diffs = Reconciler::new(&mock, &sink)
            .plan(&desired("example.com"))
            .unwrap();

        assert_eq!(diffs[0].change, Change::Create);
        assert_eq!(
            diffs[2].change,
            Change::Update {
                fields: vec!["target".into()]
            }
        );
        assert!(mock.mutating_calls().is_empty());
    }
}
