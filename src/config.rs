//! `landfall.toml` and its merge with command-line flags.
//!
//! ```toml
//! project = "shop"
//! environment = "production"
//!
//! [instance]
//! type = "g6-standard-1"
//! admin_users_file = "~/ops/admins.json"
//!
//! [dns]
//! domains = ["shop.example.com", "www.shop.example.com"]
//! soa_email = "ops@example.com"
//!
//! [deploy]
//! artifact = "dist/shop.tar.gz"
//! command = "docker compose up -d --build"
//! health_checks = ["https://shop.example.com/health"]
//! ```
//!
//! Flags win over the file. Secrets only come from flags or the
//! environment, never from the file.

use crate::cli::{DeployArgs, ProvisionArgs, TargetArgs};
use crate::deploy::layout::{DEFAULT_BASE_DIR, DEFAULT_SCRATCH_ROOT};
use crate::domains::{SuffixParser, parse_domains};
use crate::error::{Error, Result};
use crate::paths;
use crate::readiness::{HEALTH_INTERVAL, HEALTH_TIMEOUT, StatusAccept, WaitOptions};
use crate::reconcile::{DesiredInstance, DesiredState, InstanceTemplate};
use serde::Deserialize;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_DEPLOY_USER: &str = "deploy";
pub const DEFAULT_SSH_PORT: u16 = 22;
/// Longest wait or interval accepted from flags or the file (one week).
pub const MAX_WAIT_SECS: u64 = 7 * 24 * 60 * 60;

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub project: Option<String>,
    pub environment: Option<String>,
    pub instance: InstanceSection,
    pub dns: DnsSection,
    pub readiness: ReadinessSection,
    pub deploy: DeploySection,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct InstanceSection {
    pub label: Option<String>,
    #[serde(rename = "type")]
    pub instance_type: Option<String>,
    pub region: Option<String>,
    pub image: Option<String>,
    pub stackscript_id: Option<u64>,
    pub booted: Option<bool>,
    pub admin_users_file: Option<String>,
}

impl InstanceSection {
    pub fn template(&self) -> InstanceTemplate {
        InstanceTemplate {
            instance_type: self.instance_type.clone(),
            region: self.region.clone(),
            image: self.image.clone(),
            stackscript_id: self.stackscript_id,
            booted: self.booted,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DnsSection {
    pub domains: Vec<String>,
    pub soa_email: Option<String>,
    pub ttl_sec: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReadinessSection {
    /// Defaults to `http://<instance address>`.
    pub url: Option<String>,
    pub interval_secs: Option<u64>,
    pub timeout_secs: Option<u64>,
    pub min_status: Option<u16>,
    pub max_status: Option<u16>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DeploySection {
    pub user: Option<String>,
    pub artifact: Option<String>,
    pub command: Option<String>,
    pub base_dir: Option<String>,
    pub scratch_dir: Option<String>,
    pub health_checks: Vec<String>,
    pub health_timeout_secs: Option<u64>,
    pub health_interval_secs: Option<u64>,
    pub stderr_tolerant: Option<Vec<String>>,
    pub port: Option<u16>,
    pub identity_file: Option<String>,
}

impl FileConfig {
    /// Load `path`, or the default config file if it exists.
    ///
    /// An explicit path must exist; a missing default file means an empty
    /// config.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let (path, explicit) = match path {
            Some(p) => (p.to_path_buf(), true),
            None => (paths::config_file()?, false),
        };
        if !explicit && !path.exists() {
            log::debug!("no config file at {}, using flags only", path.display());
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&path)
            .map_err(|e| Error::config(format!("could not read {}: {e}", path.display())))?;
        let config = Self::parse(&content)
            .map_err(|e| Error::config(format!("{}: {e}", path.display())))?;
        log::debug!("loaded config from {}", path.display());
        Ok(config)
    }

    pub fn parse(content: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    pub fn target(&self, args: &TargetArgs) -> Result<Target> {
        let project = pick(&args.project, &self.project)
            .ok_or_else(|| Error::config("project is required (--project or `project`)"))?;
        let environment = pick(&args.environment, &self.environment)
            .ok_or_else(|| Error::config("environment is required (--env or `environment`)"))?;
        let deploy_user = pick(&args.deploy_user, &self.deploy.user)
            .unwrap_or_else(|| DEFAULT_DEPLOY_USER.to_string());
        Ok(Target {
            project,
            environment,
            deploy_user,
        })
    }

    pub fn provision(&self, target: &Target, args: &ProvisionArgs) -> Result<ProvisionSettings> {
        let token = args
            .token
            .clone()
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| Error::config("a Linode API token is required (LINODE_TOKEN)"))?;

        let hosts: Vec<String> = match &args.domains {
            Some(list) => vec![list.clone()],
            None => self.dns.domains.clone(),
        };
        let domains = parse_domains(&hosts, &SuffixParser)?;

        let soa_email = pick(&args.email, &self.dns.soa_email)
            .ok_or_else(|| Error::config("an SOA email is required (--email or dns.soa_email)"))?;
        if !soa_email.contains('@') {
            return Err(Error::config(format!("invalid SOA email '{soa_email}'")));
        }

        let admin_users = match args
            .admin_users_file
            .clone()
            .or_else(|| self.instance.admin_users_file.as_deref().map(paths::expand))
        {
            Some(path) => Some(read_admin_users(&path)?),
            None => None,
        };

        let label = pick(&args.label, &self.instance.label)
            .unwrap_or_else(|| format!("{}-{}", target.project, target.environment));
        let instance = DesiredInstance::new(label)
            .template(self.instance.template())
            .root_pass(args.root_pass.clone())
            .boot_data(
                admin_users,
                &target.deploy_user,
                args.deploy_public_key.as_deref(),
            );

        Ok(ProvisionSettings {
            token,
            desired: DesiredState {
                instance,
                domains,
                soa_email,
                ttl_sec: self.dns.ttl_sec,
            },
            readiness_url: self.readiness.url.clone(),
            readiness: self.readiness_options(None)?,
        })
    }

    /// Boot wait options, with `timeout_override` (seconds) taking priority.
    pub fn readiness_options(&self, timeout_override: Option<u64>) -> Result<WaitOptions> {
        let r = &self.readiness;
        let mut opts = WaitOptions::boot();
        if let Some(secs) = r.interval_secs {
            opts = opts.interval(positive_secs("readiness.interval_secs", secs)?);
        }
        if let Some(secs) = timeout_override.or(r.timeout_secs) {
            opts = opts.timeout(positive_secs("readiness timeout", secs)?);
        }
        if r.min_status.is_some() || r.max_status.is_some() {
            let min = r.min_status.unwrap_or(200);
            let max = r.max_status.unwrap_or(503);
            if min > max || !(100..=599).contains(&min) || !(100..=599).contains(&max) {
                return Err(Error::config(format!(
                    "invalid readiness status range {min}-{max}"
                )));
            }
            opts = opts.accept(StatusAccept::Range(min..=max));
        }
        Ok(opts)
    }

    pub fn deploy(&self, args: &DeployArgs) -> Result<DeploySettings> {
        let d = &self.deploy;
        let artifact = args
            .artifact
            .clone()
            .or_else(|| d.artifact.as_deref().map(paths::expand))
            .ok_or_else(|| Error::config("an artifact is required (--artifact or deploy.artifact)"))?;
        let command = pick(&args.command, &d.command)
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| {
                Error::config("a deploy command is required (--deploy-command or deploy.command)")
            })?;

        let health_checks = if args.health_checks.is_empty() {
            d.health_checks.clone()
        } else {
            args.health_checks.clone()
        };
        for url in &health_checks {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(Error::config(format!("health check '{url}' is not an http(s) URL")));
            }
        }
        let health_timeout = match args.health_timeout.or(d.health_timeout_secs) {
            Some(secs) => positive_secs("health timeout", secs)?,
            None => HEALTH_TIMEOUT,
        };
        let health_interval = match d.health_interval_secs {
            Some(secs) => positive_secs("deploy.health_interval_secs", secs)?,
            None => HEALTH_INTERVAL,
        };

        let stderr_tolerant = if args.stderr_tolerant.is_empty() {
            d.stderr_tolerant
                .clone()
                .unwrap_or_else(|| vec!["docker".to_string()])
        } else {
            args.stderr_tolerant.clone()
        };

        let key = match (&args.deploy_key, &args.identity_file) {
            (Some(material), _) if !material.trim().is_empty() => KeySource::Material(material.clone()),
            (_, Some(path)) => KeySource::File(path.clone()),
            _ => match &d.identity_file {
                Some(path) => KeySource::File(paths::expand(path)),
                None => KeySource::Default,
            },
        };

        Ok(DeploySettings {
            artifact,
            command,
            base_dir: d.base_dir.clone().unwrap_or_else(|| DEFAULT_BASE_DIR.to_string()),
            scratch_dir: d
                .scratch_dir
                .clone()
                .unwrap_or_else(|| DEFAULT_SCRATCH_ROOT.to_string()),
            health_checks,
            health: WaitOptions::health(health_timeout, health_interval),
            stderr_tolerant,
            port: args.port.or(d.port).unwrap_or(DEFAULT_SSH_PORT),
            key,
        })
    }
}

fn pick(flag: &Option<String>, file: &Option<String>) -> Option<String> {
    flag.clone()
        .or_else(|| file.clone())
        .filter(|v| !v.trim().is_empty())
}

fn positive_secs(what: &str, secs: u64) -> Result<Duration> {
    if secs == 0 {
        return Err(Error::config(format!("{what} must be at least one second")));
    }
    if secs > MAX_WAIT_SECS {
        return Err(Error::config(format!(
            "{what} must be at most {MAX_WAIT_SECS} seconds, got {secs}"
        )));
    }
    Ok(Duration::from_secs(secs))
}

/// Read the admin users file; it must hold a JSON array.
fn read_admin_users(path: &Path) -> Result<String> {
    let content = fs::read_to_string(path).map_err(|e| {
        Error::config(format!("could not read admin users file {}: {e}", path.display()))
    })?;
    match serde_json::from_str::<serde_json::Value>(&content) {
        Ok(serde_json::Value::Array(_)) => Ok(content.trim().to_string()),
        Ok(_) => Err(Error::config(format!(
            "admin users file {} must contain a JSON array",
            path.display()
        ))),
        Err(e) => Err(Error::config(format!(
            "admin users file {} is not valid JSON: {e}",
            path.display()
        ))),
    }
}

/// Which deployment a run is about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub project: String,
    pub environment: String,
    pub deploy_user: String,
}

pub struct ProvisionSettings {
    pub token: String,
    pub desired: DesiredState,
    pub readiness_url: Option<String>,
    pub readiness: WaitOptions,
}

impl fmt::Debug for ProvisionSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProvisionSettings")
            .field("token", &"<redacted>")
            .field("desired", &self.desired)
            .field("readiness_url", &self.readiness_url)
            .field("readiness", &self.readiness)
            .finish()
    }
}

/// How ssh authenticates as the deploy user.
#[derive(Clone, PartialEq, Eq)]
pub enum KeySource {
    /// Private key content, written to a private temp file for the session.
    Material(String),
    File(PathBuf),
    /// Whatever ssh finds on its own (agent, `~/.ssh/id_*`).
    Default,
}

impl fmt::Debug for KeySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Material(_) => f.write_str("Material(<redacted>)"),
            Self::File(path) => f.debug_tuple("File").field(path).finish(),
            Self::Default => f.write_str("Default"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DeploySettings {
    pub artifact: PathBuf,
    pub command: String,
    pub base_dir: String,
    pub scratch_dir: String,
    pub health_checks: Vec<String>,
    pub health: WaitOptions,
    pub stderr_tolerant: Vec<String>,
    pub port: u16,
    pub key: KeySource,
}
