//! DNS record resource

use cloudkit::{Domain, DomainRecord, Provisioner, RecordPatch, RecordSpec};
use declarative::Resource;
use log::warn;
use std::fmt;

/// Record keyed by `(type, name)` within one zone.
///
/// `existing` is the zone's record list, fetched once for the whole batch
/// so each record does not list the zone again.
pub struct RecordResource<'a> {
    provider: &'a dyn Provisioner,
    domain: &'a Domain,
    existing: &'a [DomainRecord],
    spec: RecordSpec,
}

impl<'a> RecordResource<'a> {
    pub fn new(
        provider: &'a dyn Provisioner,
        domain: &'a Domain,
        existing: &'a [DomainRecord],
        spec: RecordSpec,
    ) -> Self {
        Self {
            provider,
            domain,
            existing,
            spec,
        }
    }

    fn display_name(&self) -> &str {
        if self.spec.name.is_empty() {
            "@"
        } else {
            &self.spec.name
        }
    }
}

impl fmt::Debug for RecordResource<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordResource")
            .field("domain", &self.domain.domain)
            .field("spec", &self.spec)
            .finish_non_exhaustive()
    }
}

impl Resource for RecordResource<'_> {
    type Live = DomainRecord;
    type Patch = RecordPatch;

    fn id(&self) -> String {
        format!(
            "{}/{}/{}",
            self.domain.domain,
            self.spec.record_type,
            self.display_name()
        )
    }

    fn description(&self) -> String {
        format!(
            "{} record {} in {} -> {}",
            self.spec.record_type,
            self.display_name(),
            self.domain.domain,
            self.spec.target
        )
    }

    fn resource_type(&self) -> &'static str {
        "record"
    }

    fn lookup(&self) -> anyhow::Result<Option<DomainRecord>> {
        let mut matching = self
            .existing
            .iter()
            .filter(|r| r.record_type == self.spec.record_type && r.name == self.spec.name);
        let first = matching.next().cloned();
        let extra = matching.count();
        if extra > 0 {
            warn!(
                "{} has {} duplicate records for {}; updating the first",
                self.domain.domain,
                extra,
                self.id()
            );
        }
        Ok(first)
    }

    fn diff(&self, live: &DomainRecord) -> Option<RecordPatch> {
        let patch = RecordPatch {
            name: None,
            target: (live.target != self.spec.target).then(|| self.spec.target.clone()),
            ttl_sec: self.spec.ttl_sec.filter(|ttl| *ttl != live.ttl_sec),
        };
        (!patch.is_empty()).then_some(patch)
    }

    fn patch_fields(&self, patch: &RecordPatch) -> Vec<String> {
        patch.fields().into_iter().map(String::from).collect()
    }

    fn create(&self) -> anyhow::Result<DomainRecord> {
        Ok(self.provider.create_record(self.domain.id, &self.spec)?)
    }

    fn update(&self, live: &DomainRecord, patch: RecordPatch) -> anyhow::Result<DomainRecord> {
        Ok(self.provider.update_record(self.domain.id, live.id, &patch)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cloudkit::backend::{Call, MockProvisioner};
    use declarative::{Change, Outcome, reconcile_simple};
    use std::net::Ipv4Addr;

    const OLD: Ipv4Addr = Ipv4Addr::new(192, 0, 2, 1);
    const NEW: Ipv4Addr = Ipv4Addr::new(192, 0, 2, 2);

    #[test]
    fn test_matching_record_is_reused() {
        let mock = MockProvisioner::new();
        let domain = mock.seed_domain("example.com");
        let seeded = mock.seed_record(domain.id, &RecordSpec::a("www", OLD));
        let existing = mock.list_records(domain.id).unwrap();
        mock.clear_calls();

        let resource = RecordResource::new(&mock, &domain, &existing, RecordSpec::a("www", OLD));
        assert_eq!(reconcile_simple(&resource).unwrap(), Outcome::Reused(seeded));
        assert!(mock.calls().is_empty());
    }

    #[test]
    fn test_update_sends_only_target() {
        let mock = MockProvisioner::new();
        let domain = mock.seed_domain("example.com");
        let seeded = mock.seed_record(domain.id, &RecordSpec::a("www", OLD).ttl(Some(300)));
        let existing = mock.list_records(domain.id).unwrap();
        mock.clear_calls();

        let resource = RecordResource::new(&mock, &domain, &existing, RecordSpec::a("www", NEW));
        let outcome = reconcile_simple(&resource).unwrap();

        assert_eq!(
            outcome,
            Outcome::Updated {
                live: DomainRecord {
                    target: NEW.to_string(),
                    ..seeded.clone()
                },
                fields: vec!["target".into()],
            }
        );
        assert_eq!(
            mock.mutating_calls(),
            vec![Call::UpdateRecord {
                domain_id: domain.id,
                record_id: seeded.id,
                patch: RecordPatch {
                    target: Some(NEW.to_string()),
                    ..Default::default()
                },
            }]
        );
    }

    #[test]
    fn test_unset_ttl_is_not_drift() {
        let mock = MockProvisioner::new();
        let domain = mock.seed_domain("example.com");
        mock.seed_record(domain.id, &RecordSpec::a("", OLD).ttl(Some(3600)));
        let existing = mock.list_records(domain.id).unwrap();

        let resource = RecordResource::new(&mock, &domain, &existing, RecordSpec::a("", OLD));
        assert_eq!(resource.plan().unwrap(), Change::None);

        let resource = RecordResource::new(
            &mock,
            &domain,
            &existing,
            RecordSpec::a("", OLD).ttl(Some(300)),
        );
        assert_eq!(
            resource.plan().unwrap(),
            Change::Update {
                fields: vec!["ttl_sec".into()]
            }
        );
    }

    #[test]
    fn test_missing_record_is_created() {
        let mock = MockProvisioner::new();
        let domain = mock.seed_domain("example.com");
        let resource = RecordResource::new(&mock, &domain, &[], RecordSpec::a("api", NEW));

        let outcome = reconcile_simple(&resource).unwrap();
        assert!(matches!(outcome, Outcome::Created(ref r) if r.name == "api"));
        assert_eq!(resource.id(), "example.com/A/api");
    }

    #[test]
    fn test_duplicate_records_update_the_first() {
        let mock = MockProvisioner::new();
        let domain = mock.seed_domain("example.com");
        let first = mock.seed_record(domain.id, &RecordSpec::a("", OLD));
        mock.seed_record(domain.id, &RecordSpec::a("", OLD));
        let existing = mock.list_records(domain.id).unwrap();
        mock.clear_calls();

        let resource = RecordResource::new(&mock, &domain, &existing, RecordSpec::a("", NEW));
        let outcome = reconcile_simple(&resource).unwrap();

        assert_eq!(outcome.live().id, first.id);
        assert_eq!(mock.mutating_calls().len(), 1);
        assert_eq!(resource.id(), "example.com/A/@");
    }
}
