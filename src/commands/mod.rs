pub mod deploy;
pub mod plan;
pub mod up;

use crate::artifact::Artifact;
use crate::cancel::CancelToken;
use crate::config::{DeploySettings, FileConfig, KeySource, Target};
use crate::deploy::{DeployPlan, DeployReport, Orchestrator, RemoteLayout, ToolChatter};
use crate::error::Result;
use crate::progress::ProgressSink;
use crate::ui;
use declarative::ConfirmCallback;
use remotekit::{IdentityFile, LocalSession, Session, SshSession, SshTarget};
use std::path::PathBuf;

/// Global context for a run
pub struct Context {
    pub verbose: u8,
    pub quiet: bool,
    pub yes: bool,
    pub jobs: usize,
    pub config: Option<PathBuf>,
    pub cancel: CancelToken,
}

impl Context {
    pub fn load_config(&self) -> Result<FileConfig> {
        FileConfig::load(self.config.as_deref())
    }
}

/// Asks on the terminal before a resource is created.
pub struct PromptConfirm;

impl ConfirmCallback for PromptConfirm {
    fn confirm(&mut self, prompt: &str) -> anyhow::Result<bool> {
        let confirmed = dialoguer::Confirm::new()
            .with_prompt(prompt)
            .default(false)
            .interact()?;
        Ok(confirmed)
    }
}

/// Everything a deploy needs that can be checked locally.
///
/// Built before any provider or remote call so bad input fails fast.
pub fn prepare_deploy(target: &Target, settings: &DeploySettings) -> Result<(DeployPlan, ToolChatter)> {
    let artifact = Artifact::inspect(&settings.artifact)?;
    let layout = RemoteLayout::new(
        &settings.base_dir,
        &settings.scratch_dir,
        &target.project,
        &target.environment,
        &artifact.file_name,
    )?;
    let plan = DeployPlan {
        artifact,
        layout,
        command: settings.command.clone(),
        health_checks: settings.health_checks.clone(),
        health: settings.health.clone(),
    };
    Ok((plan, ToolChatter::new(settings.stderr_tolerant.clone())))
}

/// An open session plus the key file it authenticates with.
pub struct Connection {
    pub session: Box<dyn Session>,
    // Removed on drop, so it must outlive the session.
    _identity: Option<IdentityFile>,
}

/// Open a session to `host` as `user`; local hosts run commands directly.
pub fn connect(host: &str, user: &str, settings: &DeploySettings) -> Result<Connection> {
    if remotekit::is_local_host(host) {
        ui::info(&format!("{host} is this machine, running commands locally"));
        return Ok(Connection {
            session: Box::new(LocalSession::new()),
            _identity: None,
        });
    }

    let mut target = SshTarget::new(host, user).port(settings.port);
    let identity = match &settings.key {
        KeySource::Material(key) => {
            let file = IdentityFile::from_key_material(key)?;
            target = target.identity_file(file.path());
            Some(file)
        }
        KeySource::File(path) => {
            target = target.identity_file(path.clone());
            None
        }
        KeySource::Default => None,
    };
    let session = SshSession::connect(target)?;
    Ok(Connection {
        session: Box::new(session),
        _identity: identity,
    })
}

/// Run the deploy transaction, print its report and close the session.
pub fn run_deploy(
    ctx: &Context,
    connection: &mut Connection,
    plan: &DeployPlan,
    policy: &ToolChatter,
    sink: &dyn ProgressSink,
) -> Result<DeployReport> {
    log::debug!("stderr tolerated for: {}", policy.tools().join(", "));
    let report = Orchestrator::new(
        connection.session.as_mut(),
        policy,
        sink,
        ctx.cancel.clone(),
    )
    .execute(plan);

    if let Err(e) = connection.session.close() {
        log::warn!("closing session: {e}");
    }
    print_report(&report, ctx.verbose > 0);
    report.into_result()
}

fn print_report(report: &DeployReport, verbose: bool) {
    ui::section("Deploy");
    ui::kv("artifact", &report.artifact.to_string());
    if verbose {
        ui::kv("blake3", &report.artifact.digest);
    }
    ui::kv("size", &ui::format_size(report.artifact.size));
    ui::kv("live", &report.layout.live);
    ui::kv("phase", &report.final_phase.to_string());
    ui::kv("duration", &ui::format_duration(report.duration()));
    ui::kv(
        "finished",
        &report.finished_at.format("%Y-%m-%d %H:%M:%S").to_string(),
    );
    for warning in &report.cleanup_warnings {
        ui::warn(&format!("cleanup: {warning}"));
    }

    if report.is_committed() {
        ui::success(&format!(
            "{}-{} deployed",
            report.layout.project, report.layout.environment
        ));
    } else if report.rolled_back {
        let detail = if report.relaunched {
            "previous version restored and relaunched"
        } else {
            "previous state restored"
        };
        ui::warn(&format!("Deploy failed, {detail}"));
    }
}
