//! Compute instance resource

use crate::error::{Error, Result};
use cloudkit::{Instance, InstanceSpec, Provisioner};
use declarative::Resource;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt;
use std::net::Ipv4Addr;

pub const DEFAULT_TYPE: &str = "g6-nanode-1";
pub const DEFAULT_REGION: &str = "us-central";
pub const DEFAULT_IMAGE: &str = "linode/centos7";
pub const DEFAULT_STACKSCRIPT_ID: u64 = 693_032;

/// Provisioning template; unset fields fall back to the defaults above.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct InstanceTemplate {
    #[serde(rename = "type")]
    pub instance_type: Option<String>,
    pub region: Option<String>,
    pub image: Option<String>,
    pub stackscript_id: Option<u64>,
    pub booted: Option<bool>,
}

/// Desired state for the single instance a run targets.
#[derive(Clone)]
pub struct DesiredInstance {
    pub label: String,
    pub template: InstanceTemplate,
    pub root_pass: String,
    pub stackscript_data: BTreeMap<String, String>,
}

impl DesiredInstance {
    /// A desired instance with a generated root password and no boot data.
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            template: InstanceTemplate::default(),
            root_pass: generate_root_pass(),
            stackscript_data: BTreeMap::new(),
        }
    }

    /// Use `pass` as root password, or keep the generated one.
    #[must_use]
    pub fn root_pass(mut self, pass: Option<String>) -> Self {
        if let Some(pass) = pass.filter(|p| !p.is_empty()) {
            self.root_pass = pass;
        }
        self
    }

    #[must_use]
    pub fn template(mut self, template: InstanceTemplate) -> Self {
        self.template = template;
        self
    }

    /// Fill the boot script inputs the deploy user setup expects.
    #[must_use]
    pub fn boot_data(
        mut self,
        admin_users_json: Option<String>,
        deploy_user: &str,
        deploy_public_key: Option<&str>,
    ) -> Self {
        self.stackscript_data.insert(
            "admin_users_json".to_string(),
            admin_users_json.unwrap_or_else(|| "[]".to_string()),
        );
        self.stackscript_data
            .insert("deploy_user".to_string(), deploy_user.to_string());
        self.stackscript_data.insert(
            "deploy_user_public_key".to_string(),
            deploy_public_key.unwrap_or_default().to_string(),
        );
        self
    }

    /// The create request: template merged over the defaults.
    pub fn spec(&self) -> InstanceSpec {
        let t = &self.template;
        InstanceSpec {
            label: self.label.clone(),
            instance_type: t.instance_type.clone().unwrap_or_else(|| DEFAULT_TYPE.into()),
            region: t.region.clone().unwrap_or_else(|| DEFAULT_REGION.into()),
            image: t.image.clone().unwrap_or_else(|| DEFAULT_IMAGE.into()),
            booted: t.booted.unwrap_or(true),
            root_pass: self.root_pass.clone(),
            stackscript_id: Some(t.stackscript_id.unwrap_or(DEFAULT_STACKSCRIPT_ID)),
            stackscript_data: self.stackscript_data.clone(),
        }
    }
}

impl fmt::Debug for DesiredInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DesiredInstance")
            .field("label", &self.label)
            .field("template", &self.template)
            .field("root_pass", &"<redacted>")
            .field("stackscript_data", &self.stackscript_data.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

fn generate_root_pass() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

/// Instance looked up by label and created when missing.
///
/// Never updated: an existing instance is reused whatever its template.
pub struct InstanceResource<'a> {
    provider: &'a dyn Provisioner,
    desired: DesiredInstance,
}

impl<'a> InstanceResource<'a> {
    pub fn new(provider: &'a dyn Provisioner, desired: DesiredInstance) -> Self {
        Self { provider, desired }
    }
}

impl fmt::Debug for InstanceResource<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstanceResource")
            .field("desired", &self.desired)
            .finish_non_exhaustive()
    }
}

impl Resource for InstanceResource<'_> {
    type Live = Instance;
    type Patch = ();

    fn id(&self) -> String {
        self.desired.label.clone()
    }

    fn description(&self) -> String {
        let spec = self.desired.spec();
        format!(
            "instance {} ({} in {}, {})",
            spec.label, spec.instance_type, spec.region, spec.image
        )
    }

    fn resource_type(&self) -> &'static str {
        "instance"
    }

    fn lookup(&self) -> anyhow::Result<Option<Instance>> {
        let instances = self.provider.list_instances()?;
        Ok(instances.into_iter().find(|i| i.label == self.desired.label))
    }

    fn create(&self) -> anyhow::Result<Instance> {
        Ok(self.provider.create_instance(&self.desired.spec())?)
    }

    fn requires_confirmation(&self) -> bool {
        true
    }

    fn can_parallelize(&self) -> bool {
        false
    }
}

/// The address DNS records point at.
pub fn instance_address(instance: &Instance) -> Result<Ipv4Addr> {
    instance.primary_ipv4().ok_or_else(|| {
        Error::Provider(cloudkit::Error::InvalidResponse(format!(
            "instance {} has no IPv4 address",
            instance.label
        )))
    })
}
