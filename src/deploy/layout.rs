//! Remote paths of a deployment.
//!
//! The paths are a convention shared by every run: backup and rollback only
//! find the previous deployment because they are derived the same way each
//! time.

use crate::error::{Error, Result};
use regex::Regex;
use std::sync::LazyLock;

pub const DEFAULT_BASE_DIR: &str = "/srv/deploy";
pub const DEFAULT_SCRATCH_ROOT: &str = "/tmp";

static NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._-]*$").expect("name pattern compiles"));

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteLayout {
    pub project: String,
    pub environment: String,
    /// `<base>/<project>/<project>-<environment>`
    pub live: String,
    /// `<scratch_root>/<project>-<environment>`
    pub scratch: String,
    pub staging: String,
    pub backup: String,
    /// Where the artifact is uploaded before staging.
    pub artifact: String,
    pub artifact_name: String,
}

impl RemoteLayout {
    pub fn new(
        base_dir: &str,
        scratch_root: &str,
        project: &str,
        environment: &str,
        artifact_name: &str,
    ) -> Result<Self> {
        for (what, value) in [
            ("project", project),
            ("environment", environment),
            ("artifact name", artifact_name),
        ] {
            if !NAME.is_match(value) {
                return Err(Error::config(format!("invalid {what} '{value}'")));
            }
        }
        let base = absolute_dir("base directory", base_dir)?;
        let scratch_root = absolute_dir("scratch directory", scratch_root)?;

        let name = format!("{project}-{environment}");
        let scratch = format!("{scratch_root}/{name}");
        Ok(Self {
            project: project.to_string(),
            environment: environment.to_string(),
            live: format!("{base}/{project}/{name}"),
            staging: format!("{scratch}/staging"),
            backup: format!("{scratch}/backup"),
            artifact: format!("{scratch}/{artifact_name}"),
            artifact_name: artifact_name.to_string(),
            scratch,
        })
    }

    /// Layout under the default base and scratch directories.
    #[cfg(test)]
    pub fn with_defaults(project: &str, environment: &str, artifact_name: &str) -> Result<Self> {
        Self::new(
            DEFAULT_BASE_DIR,
            DEFAULT_SCRATCH_ROOT,
            project,
            environment,
            artifact_name,
        )
    }
}

fn absolute_dir(what: &str, dir: &str) -> Result<String> {
    let trimmed = dir.trim_end_matches('/');
    if !dir.starts_with('/') || trimmed.is_empty() || trimmed.split('/').any(|c| c == "..") {
        return Err(Error::config(format!(
            "{what} must be an absolute path below /, got '{dir}'"
        )));
    }
    Ok(trimmed.to_string())
}
