//! Provider resource types.
//!
//! Live resources (`Instance`, `Domain`, `DomainRecord`) deserialize from the
//! provider's JSON. Request types (`InstanceSpec`, `DomainSpec`, `RecordSpec`,
//! `RecordPatch`) serialize to it.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::net::Ipv4Addr;

/// Provider identifier of a compute instance.
pub type InstanceId = u64;
/// Provider identifier of a DNS zone.
pub type DomainId = u64;
/// Provider identifier of a DNS record.
pub type RecordId = u64;

/// A compute instance as reported by the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instance {
    /// Provider id.
    pub id: InstanceId,
    /// Unique label chosen by the caller.
    pub label: String,
    /// IPv4 addresses, public first.
    #[serde(default)]
    pub ipv4: Vec<Ipv4Addr>,
    /// Region the instance lives in.
    #[serde(default)]
    pub region: String,
    /// Plan/size identifier.
    #[serde(rename = "type", default)]
    pub instance_type: String,
    /// Image the instance was built from.
    #[serde(default)]
    pub image: Option<String>,
    /// Provider status ("provisioning", "running", ...).
    #[serde(default)]
    pub status: String,
}

impl Instance {
    /// The address DNS records should point at.
    #[must_use]
    pub fn primary_ipv4(&self) -> Option<Ipv4Addr> {
        self.ipv4.first().copied()
    }
}

impl fmt::Display for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.primary_ipv4() {
            Some(ip) => write!(f, "{}@{} ({})", self.label, ip, self.id),
            None => write!(f, "{} ({})", self.label, self.id),
        }
    }
}

/// Request body for creating a compute instance.
#[derive(Clone, PartialEq, Eq, Serialize)]
pub struct InstanceSpec {
    /// Unique label.
    pub label: String,
    /// Plan/size identifier.
    #[serde(rename = "type")]
    pub instance_type: String,
    /// Region.
    pub region: String,
    /// Image.
    pub image: String,
    /// Whether to boot right after creation.
    pub booted: bool,
    /// Root password. Never printed.
    pub root_pass: String,
    /// Boot-time customization script.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stackscript_id: Option<u64>,
    /// Inputs for the boot-time customization script.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub stackscript_data: BTreeMap<String, String>,
}

impl fmt::Debug for InstanceSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstanceSpec")
            .field("label", &self.label)
            .field("instance_type", &self.instance_type)
            .field("region", &self.region)
            .field("image", &self.image)
            .field("booted", &self.booted)
            .field("root_pass", &"<redacted>")
            .field("stackscript_id", &self.stackscript_id)
            .field(
                "stackscript_data",
                &self.stackscript_data.keys().collect::<Vec<_>>(),
            )
            .finish()
    }
}

/// DNS zone type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ZoneType {
    /// Primary zone served by the provider.
    #[default]
    Master,
    /// Secondary zone transferred from elsewhere.
    Slave,
}

/// A DNS zone as reported by the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Domain {
    /// Provider id.
    pub id: DomainId,
    /// Registrable domain name.
    pub domain: String,
    /// Zone type.
    #[serde(rename = "type", default)]
    pub zone_type: ZoneType,
    /// Administrative contact.
    #[serde(default)]
    pub soa_email: String,
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.domain, self.id)
    }
}

/// Request body for creating a DNS zone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DomainSpec {
    /// Registrable domain name.
    pub domain: String,
    /// Zone type.
    #[serde(rename = "type")]
    pub zone_type: ZoneType,
    /// Administrative contact.
    pub soa_email: String,
}

/// DNS record type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RecordType {
    /// IPv4 address.
    A,
    /// IPv6 address.
    Aaaa,
    /// Canonical name.
    Cname,
    /// Mail exchanger.
    Mx,
    /// Name server.
    Ns,
    /// Text.
    Txt,
    /// Service locator.
    Srv,
    /// Certification authority authorization.
    Caa,
    /// Pointer.
    Ptr,
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::A => "A",
            Self::Aaaa => "AAAA",
            Self::Cname => "CNAME",
            Self::Mx => "MX",
            Self::Ns => "NS",
            Self::Txt => "TXT",
            Self::Srv => "SRV",
            Self::Caa => "CAA",
            Self::Ptr => "PTR",
        };
        f.write_str(name)
    }
}

/// A DNS record as reported by the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainRecord {
    /// Provider id.
    pub id: RecordId,
    /// Record type.
    #[serde(rename = "type")]
    pub record_type: RecordType,
    /// Subdomain label; empty for the zone apex.
    #[serde(default)]
    pub name: String,
    /// Record value.
    #[serde(default)]
    pub target: String,
    /// Time to live; 0 means the zone default.
    #[serde(default)]
    pub ttl_sec: u32,
}

impl fmt::Display for DomainRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} record '{}' ({}) -> {}",
            self.record_type, self.name, self.id, self.target
        )
    }
}

/// Request body for creating a DNS record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordSpec {
    /// Record type.
    #[serde(rename = "type")]
    pub record_type: RecordType,
    /// Subdomain label; empty for the zone apex.
    pub name: String,
    /// Record value.
    pub target: String,
    /// Time to live; `None` leaves the provider default.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ttl_sec: Option<u32>,
}

impl RecordSpec {
    /// An A record for `name` pointing at `address`.
    pub fn a(name: impl Into<String>, address: Ipv4Addr) -> Self {
        Self {
            record_type: RecordType::A,
            name: name.into(),
            target: address.to_string(),
            ttl_sec: None,
        }
    }

    /// Set the time to live.
    #[must_use]
    pub fn ttl(mut self, ttl_sec: Option<u32>) -> Self {
        self.ttl_sec = ttl_sec;
        self
    }
}

/// Partial update of a DNS record. Only `Some` fields are sent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RecordPatch {
    /// New subdomain label.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// New record value.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    /// New time to live.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ttl_sec: Option<u32>,
}

impl RecordPatch {
    /// True when the patch would change nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.target.is_none() && self.ttl_sec.is_none()
    }

    /// Names of the fields this patch changes.
    #[must_use]
    pub fn fields(&self) -> Vec<&'static str> {
        let mut fields = Vec::new();
        if self.name.is_some() {
            fields.push("name");
        }
        if self.target.is_some() {
            fields.push("target");
        }
        if self.ttl_sec.is_some() {
            fields.push("ttl_sec");
        }
        fields
    }

    /// Apply the patch to a record, as the provider would.
    #[must_use]
    pub fn apply_to(&self, record: &DomainRecord) -> DomainRecord {
        let mut updated = record.clone();
        if let Some(name) = &self.name {
            updated.name = name.clone();
        }
        if let Some(target) = &self.target {
            updated.target = target.clone();
        }
        if let Some(ttl) = self.ttl_sec {
            updated.ttl_sec = ttl;
        }
        updated
    }
}

/// One page of a provider list response.
#[derive(Debug, Clone, Deserialize)]
pub struct Page<T> {
    /// Items on this page.
    pub data: Vec<T>,
    /// 1-based page number.
    #[serde(default = "first_page")]
    pub page: u32,
    /// Total number of pages.
    #[serde(default = "first_page")]
    pub pages: u32,
}

fn first_page() -> u32 {
    1
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_record_patch_serializes_only_changed_fields() {
        let patch = RecordPatch {
            target: Some("203.0.113.7".to_string()),
            ..Default::default()
        };
        assert_eq!(
            serde_json::to_value(&patch).unwrap(),
            json!({ "target": "203.0.113.7" })
        );
        assert_eq!(patch.fields(), vec!["target"]);
    }

    #[test]
    fn test_empty_patch() {
        assert!(RecordPatch::default().is_empty());
        assert!(RecordPatch::default().fields().is_empty());
    }

    #[test]
    fn test_patch_apply_to() {
        let record = DomainRecord {
            id: 9,
            record_type: RecordType::A,
            name: "www".to_string(),
            target: "192.0.2.1".to_string(),
            ttl_sec: 300,
        };
        let patch = RecordPatch {
            target: Some("192.0.2.2".to_string()),
            ..Default::default()
        };
        let updated = patch.apply_to(&record);
        assert_eq!(updated.target, "192.0.2.2");
        assert_eq!(updated.name, "www");
        assert_eq!(updated.ttl_sec, 300);
        assert_eq!(updated.id, 9);
    }

    #[test]
    fn test_record_spec_serialization() {
        let spec = RecordSpec::a("", Ipv4Addr::new(192, 0, 2, 10));
        assert_eq!(
            serde_json::to_value(&spec).unwrap(),
            json!({ "type": "A", "name": "", "target": "192.0.2.10" })
        );
        let spec = spec.ttl(Some(300));
        assert_eq!(serde_json::to_value(&spec).unwrap()["ttl_sec"], json!(300));
    }

    #[test]
    fn test_record_type_round_names() {
        let record: DomainRecord = serde_json::from_value(json!({
            "id": 1, "type": "AAAA", "name": "v6", "target": "2001:db8::1", "ttl_sec": 0
        }))
        .unwrap();
        assert_eq!(record.record_type, RecordType::Aaaa);
        assert_eq!(record.record_type.to_string(), "AAAA");
    }

    #[test]
    fn test_instance_deserialize_and_primary_ip() {
        let instance: Instance = serde_json::from_value(json!({
            "id": 42,
            "label": "web-1",
            "ipv4": ["198.51.100.4", "192.168.1.9"],
            "region": "us-central",
            "type": "g6-nanode-1",
            "image": "linode/centos7",
            "status": "running",
            "specs": { "disk": 25600 }
        }))
        .unwrap();
        assert_eq!(instance.primary_ipv4(), Some(Ipv4Addr::new(198, 51, 100, 4)));
        assert_eq!(instance.instance_type, "g6-nanode-1");
        assert_eq!(instance.to_string(), "web-1@198.51.100.4 (42)");
    }

    #[test]
    fn test_instance_spec_debug_redacts_password() {
        let spec = InstanceSpec {
            label: "web-1".to_string(),
            instance_type: "g6-nanode-1".to_string(),
            region: "us-central".to_string(),
            image: "linode/centos7".to_string(),
            booted: true,
            root_pass: "hunter2-hunter2".to_string(),
            stackscript_id: None,
            stackscript_data: BTreeMap::new(),
        };
        let debug = format!("{spec:?}");
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("<redacted>"));

        let body = serde_json::to_value(&spec).unwrap();
        assert!(body.get("stackscript_id").is_none());
        assert_eq!(body["type"], json!("g6-nanode-1"));
    }

    #[test]
    fn test_domain_zone_type_default() {
        let domain: Domain =
            serde_json::from_value(json!({ "id": 3, "domain": "example.com" })).unwrap();
        assert_eq!(domain.zone_type, ZoneType::Master);
        let spec = DomainSpec {
            domain: "example.com".to_string(),
            zone_type: ZoneType::Master,
            soa_email: "ops@example.com".to_string(),
        };
        assert_eq!(serde_json::to_value(&spec).unwrap()["type"], json!("master"));
    }

    #[test]
    fn test_page_defaults() {
        let page: Page<Domain> = serde_json::from_value(json!({ "data": [] })).unwrap();
        assert_eq!(page.page, 1);
        assert_eq!(page.pages, 1);
    }
}
