//! Drives one deploy attempt over a [`Session`].
//!
//! Every step is a short sequence of remote commands; a command only runs
//! if the one before it succeeded. Failures after the backup exists are
//! compensated by restoring the backup. Cleanup runs regardless and never
//! changes the outcome.

use super::layout::RemoteLayout;
use super::policy::{StderrPolicy, StreamClassifier};
use super::{Phase, Step};
use crate::artifact::Artifact;
use crate::cancel::CancelToken;
use crate::error::{Error, Result};
use crate::progress::{Event, OutputStream, ProgressSink};
use crate::readiness::{ReadinessWaiter, WaitOptions};
use chrono::{DateTime, Local};
use log::{debug, info};
use remotekit::quote::quote_path;
use remotekit::{RunOptions, Session};
use std::time::Duration;

/// Inputs of one deploy attempt.
#[derive(Debug, Clone)]
pub struct DeployPlan {
    pub artifact: Artifact,
    pub layout: RemoteLayout,
    /// Shell command that starts the deployment, run inside the live path.
    pub command: String,
    /// Endpoints that must return 200 after launch. Empty skips the check.
    pub health_checks: Vec<String>,
    pub health: WaitOptions,
}

/// What happened to one attempt.
#[derive(Debug)]
pub struct DeployReport {
    pub artifact: Artifact,
    pub layout: RemoteLayout,
    pub final_phase: Phase,
    pub rolled_back: bool,
    /// Whether the previous version was started again after rollback.
    pub relaunched: bool,
    pub started_at: DateTime<Local>,
    pub finished_at: DateTime<Local>,
    pub cleanup_warnings: Vec<String>,
    /// Set when the attempt did not commit.
    pub failure: Option<Error>,
}

impl DeployReport {
    pub fn is_committed(&self) -> bool {
        self.final_phase == Phase::Committed
    }

    pub fn duration(&self) -> Duration {
        (self.finished_at - self.started_at)
            .to_std()
            .unwrap_or_default()
    }

    /// The report on success, the failure otherwise.
    pub fn into_result(mut self) -> Result<Self> {
        match self.failure.take() {
            Some(err) => Err(err),
            None => Ok(self),
        }
    }
}

/// Working state of the attempt in progress.
#[derive(Debug)]
struct Attempt {
    phase: Phase,
    backed_up: bool,
    /// The live directory held something before this attempt.
    had_previous: bool,
    /// The live directory has been removed or replaced.
    live_touched: bool,
}

impl Default for Attempt {
    fn default() -> Self {
        Self {
            phase: Phase::Start,
            backed_up: false,
            had_previous: false,
            live_touched: false,
        }
    }
}

pub struct Orchestrator<'a> {
    session: &'a mut dyn Session,
    policy: &'a dyn StreamClassifier,
    sink: &'a dyn ProgressSink,
    cancel: CancelToken,
}

impl<'a> Orchestrator<'a> {
    pub fn new(
        session: &'a mut dyn Session,
        policy: &'a dyn StreamClassifier,
        sink: &'a dyn ProgressSink,
        cancel: CancelToken,
    ) -> Self {
        Self {
            session,
            policy,
            sink,
            cancel,
        }
    }

    /// Run the attempt: forward steps, rollback on failure, then cleanup.
    pub fn execute(&mut self, plan: &DeployPlan) -> DeployReport {
        let started_at = Local::now();
        let mut attempt = Attempt::default();
        self.enter(&mut attempt, Phase::Start);
        info!(
            "deploying {} to {} on {}",
            plan.artifact,
            plan.layout.live,
            self.session.target()
        );

        let mut rolled_back = false;
        let mut relaunched = false;
        let failure = match self.forward(plan, &mut attempt) {
            Ok(()) => None,
            Err(err) if attempt.backed_up => {
                rolled_back = true;
                match self.rollback(plan, &mut attempt, &err) {
                    Ok(did_relaunch) => {
                        relaunched = did_relaunch;
                        Some(err)
                    }
                    Err(rollback) => Some(Error::RollbackFailed {
                        original: Box::new(err),
                        rollback: Box::new(rollback),
                    }),
                }
            }
            Err(err) => Some(err),
        };

        let cleanup_warnings = self.cleanup(&plan.layout);

        DeployReport {
            artifact: plan.artifact.clone(),
            layout: plan.layout.clone(),
            final_phase: attempt.phase,
            rolled_back,
            relaunched,
            started_at,
            finished_at: Local::now(),
            cleanup_warnings,
            failure,
        }
    }

    fn forward(&mut self, plan: &DeployPlan, attempt: &mut Attempt) -> Result<()> {
        let layout = &plan.layout;

        self.cancel.check()?;
        self.exec(Step::Prepare, &format!("mkdir -p {}", quote_path(&layout.live)), None)?;
        self.exec(Step::Prepare, &format!("mkdir -p {}", quote_path(&layout.scratch)), None)?;
        self.upload(&plan.artifact, &layout.artifact)?;

        self.cancel.check()?;
        self.exec(Step::Backup, &format!("rm -rf {}", quote_path(&layout.backup)), None)?;
        attempt.had_previous = self.live_exists(layout)?;
        self.exec(
            Step::Backup,
            &format!("cp -a {} {}", quote_path(&layout.live), quote_path(&layout.backup)),
            None,
        )?;
        attempt.backed_up = true;
        self.enter(attempt, Phase::BackupCreated);

        self.cancel.check()?;
        self.exec(Step::Stage, &format!("rm -rf {}", quote_path(&layout.staging)), None)?;
        self.exec(Step::Stage, &format!("mkdir -p {}", quote_path(&layout.staging)), None)?;
        self.exec(
            Step::Stage,
            &format!(
                "mv {} {}/",
                quote_path(&layout.artifact),
                quote_path(&layout.staging)
            ),
            None,
        )?;
        let archive = quote_path(&layout.artifact_name);
        self.exec(Step::Stage, &format!("tar -xzf {archive}"), Some(&layout.staging))?;
        self.exec(Step::Stage, &format!("rm -f {archive}"), Some(&layout.staging))?;
        self.enter(attempt, Phase::Staged);

        self.cancel.check()?;
        attempt.live_touched = true;
        self.exec(Step::Swap, &format!("rm -rf {}", quote_path(&layout.live)), None)?;
        self.exec(
            Step::Swap,
            &format!(
                "mv {} {}",
                quote_path(&layout.staging),
                quote_path(&layout.live)
            ),
            None,
        )?;
        self.enter(attempt, Phase::Swapped);

        self.cancel.check()?;
        self.exec(Step::Launch, &plan.command, Some(&layout.live))?;

        if !plan.health_checks.is_empty() {
            self.cancel.check()?;
            ReadinessWaiter::new(self.sink, self.cancel.clone())
                .wait_all(&plan.health_checks, &plan.health)?;
            self.enter(attempt, Phase::HealthChecked);
        }

        self.enter(attempt, Phase::Committed);
        info!("{} committed at {}", plan.artifact.file_name, layout.live);
        Ok(())
    }

    /// Put the backup back. Returns whether the previous version was
    /// relaunched.
    fn rollback(&mut self, plan: &DeployPlan, attempt: &mut Attempt, cause: &Error) -> Result<bool> {
        let layout = &plan.layout;
        self.sink.emit(&Event::RollbackStarted {
            reason: cause.to_string(),
        });
        self.enter(attempt, Phase::RollingBack);

        let mut relaunched = false;
        if attempt.live_touched {
            self.exec(Step::Rollback, &format!("rm -rf {}", quote_path(&layout.live)), None)?;
            self.exec(
                Step::Rollback,
                &format!(
                    "mv {} {}",
                    quote_path(&layout.backup),
                    quote_path(&layout.live)
                ),
                None,
            )?;
            if attempt.had_previous {
                self.exec(Step::Rollback, &plan.command, Some(&layout.live))?;
                relaunched = true;
            }
        } else {
            debug!("failed before swap, {} untouched", layout.live);
        }

        self.enter(attempt, Phase::RolledBack);
        self.sink.emit(&Event::RollbackFinished { relaunched });
        Ok(relaunched)
    }

    /// Remove transient state. Failures become warnings.
    fn cleanup(&mut self, layout: &RemoteLayout) -> Vec<String> {
        let commands = [
            format!("rm -f {}", quote_path(&layout.artifact)),
            format!("rm -rf {}", quote_path(&layout.staging)),
            format!("rm -rf {}", quote_path(&layout.backup)),
            format!("rmdir {}", quote_path(&layout.scratch)),
        ];

        let mut warnings = Vec::new();
        for command in &commands {
            if let Err(err) = self.exec(Step::Cleanup, command, None) {
                let message = err.to_string();
                self.sink.emit(&Event::CleanupWarning {
                    message: message.clone(),
                });
                warnings.push(message);
                if matches!(err, Error::Remote(_)) {
                    break;
                }
            }
        }
        warnings
    }

    fn enter(&self, attempt: &mut Attempt, phase: Phase) {
        attempt.phase = phase;
        self.sink.emit(&Event::PhaseEntered(phase));
    }

    fn upload(&mut self, artifact: &Artifact, remote: &str) -> Result<()> {
        self.sink.emit(&Event::CommandStarted {
            step: Step::Prepare,
            command: format!("upload {} -> {remote}", artifact.path.display()),
        });
        self.session.transfer_file(&artifact.path, remote)?;
        Ok(())
    }

    /// Whether the live directory has any content.
    fn live_exists(&mut self, layout: &RemoteLayout) -> Result<bool> {
        let command = format!(
            "[ -n \"$(ls -A {} 2>/dev/null)\" ]",
            quote_path(&layout.live)
        );
        Ok(self.session.run(&command, RunOptions::new())? == 0)
    }

    /// Run one command. A non-zero exit fails it, and so does stderr output
    /// unless the policy calls it chatter.
    fn exec(&mut self, step: Step, command: &str, cwd: Option<&str>) -> Result<()> {
        self.sink.emit(&Event::CommandStarted {
            step,
            command: command.to_string(),
        });

        let policy = self.policy.classify(command);
        let stderr_stream = match policy {
            StderrPolicy::Fail => OutputStream::Stderr,
            StderrPolicy::Log => OutputStream::StderrChatter,
        };
        let sink = self.sink;
        let mut stderr = Vec::new();

        let mut opts = RunOptions::new()
            .on_stdout(|line| {
                sink.emit(&Event::OutputLine {
                    stream: OutputStream::Stdout,
                    line: line.to_string(),
                });
            })
            .on_stderr(|line| {
                sink.emit(&Event::OutputLine {
                    stream: stderr_stream,
                    line: line.to_string(),
                });
                stderr.push(line.to_string());
            });
        if let Some(cwd) = cwd {
            opts = opts.in_dir(cwd);
        }

        let exit_status = self.session.run(command, opts)?;
        if exit_status != 0 || (policy == StderrPolicy::Fail && !stderr.is_empty()) {
            return Err(Error::RemoteCommand {
                step,
                command: command.to_string(),
                exit_status,
                stderr,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::testing::write_tar_gz;
    use crate::deploy::policy::ToolChatter;
    use crate::error::TimeoutKind;
    use crate::progress::RecordingSink;
    use remotekit::LocalSession;
    use remotekit::mock::{Invocation, ScriptedSession};
    use std::collections::BTreeMap;
    use std::path::{Path, PathBuf};
    use std::time::Instant;
    use tempfile::TempDir;
    use walkdir::WalkDir;

    /// A temp "host" with base and scratch directories, plus local artifacts.
    struct Host {
        root: TempDir,
        local: TempDir,
    }

    impl Host {
        fn new() -> Self {
            Self {
                root: TempDir::new().unwrap(),
                local: TempDir::new().unwrap(),
            }
        }

        fn base(&self) -> PathBuf {
            self.root.path().join("srv")
        }

        fn layout(&self) -> RemoteLayout {
            let scratch = self.root.path().join("tmp");
            std::fs::create_dir_all(&scratch).unwrap();
            RemoteLayout::new(
                self.base().to_str().unwrap(),
                scratch.to_str().unwrap(),
                "shop",
                "production",
                "build.tar.gz",
            )
            .unwrap()
        }

        fn plan(&self, version: &str, command: &str) -> DeployPlan {
            let dir = self.local.path().join(version);
            std::fs::create_dir_all(&dir).unwrap();
            let path = dir.join("build.tar.gz");
            write_tar_gz(
                &path,
                &[("VERSION", version), ("public/index.html", "<h1>shop</h1>")],
            );
            DeployPlan {
                artifact: Artifact::inspect(&path).unwrap(),
                layout: self.layout(),
                command: command.to_string(),
                health_checks: vec![],
                health: WaitOptions::health(Duration::from_secs(5), Duration::from_millis(50)),
            }
        }

        fn launches(&self) -> usize {
            std::fs::read_to_string(self.base().join("shop/launches"))
                .map(|s| s.lines().count())
                .unwrap_or(0)
        }
    }

    /// Relative path -> file contents (`None` for directories).
    fn snapshot(dir: &Path) -> BTreeMap<PathBuf, Option<Vec<u8>>> {
        WalkDir::new(dir)
            .into_iter()
            .map(|e| e.unwrap())
            .map(|e| {
                let rel = e.path().strip_prefix(dir).unwrap().to_path_buf();
                let contents = e
                    .file_type()
                    .is_file()
                    .then(|| std::fs::read(e.path()).unwrap());
                (rel, contents)
            })
            .collect()
    }

    /// Starts only version 1, recording every launch outside the live path.
    const LAUNCH_V1_ONLY: &str = "echo run >> ../launches && test \"$(cat VERSION)\" = 1";

    fn run_local(host: &Host, plan: &DeployPlan, sink: &RecordingSink) -> DeployReport {
        let mut session = LocalSession::new();
        let policy = ToolChatter::default();
        Orchestrator::new(&mut session, &policy, sink, CancelToken::new()).execute(plan)
    }

    fn scripted_plan() -> DeployPlan {
        let host = Host::new();
        let mut plan = host.plan("1", "./start");
        plan.layout = RemoteLayout::with_defaults("shop", "production", "build.tar.gz").unwrap();
        plan
    }

    fn run_scripted(session: &ScriptedSession, plan: &DeployPlan, sink: &RecordingSink) -> DeployReport {
        let mut handle = session.clone();
        let policy = ToolChatter::default();
        Orchestrator::new(&mut handle, &policy, sink, CancelToken::new()).execute(plan)
    }

    /// Cancels the token once a command starting with `trigger` has run.
    struct CancelAfter {
        inner: ScriptedSession,
        trigger: String,
        cancel: CancelToken,
    }

    impl Session for CancelAfter {
        fn run(&mut self, command: &str, opts: RunOptions<'_>) -> remotekit::Result<i32> {
            let status = self.inner.run(command, opts)?;
            if command.starts_with(&self.trigger) {
                self.cancel.cancel();
            }
            Ok(status)
        }

        fn transfer_file(&mut self, local: &Path, remote: &str) -> remotekit::Result<()> {
            self.inner.transfer_file(local, remote)
        }

        fn close(&mut self) -> remotekit::Result<()> {
            self.inner.close()
        }

        fn target(&self) -> String {
            self.inner.target()
        }
    }

    fn run_cancelled_after(trigger: &str, plan: &DeployPlan) -> (ScriptedSession, DeployReport) {
        let session = ScriptedSession::new();
        let cancel = CancelToken::new();
        let mut handle = CancelAfter {
            inner: session.clone(),
            trigger: trigger.to_string(),
            cancel: cancel.clone(),
        };
        let policy = ToolChatter::default();
        let sink = RecordingSink::default();
        let report = Orchestrator::new(&mut handle, &policy, &sink, cancel).execute(plan);
        (session, report)
    }

    #[test]
    fn test_fresh_host_commits() {
        let host = Host::new();
        let plan = host.plan("1", "touch launched");
        let sink = RecordingSink::default();

        let report = run_local(&host, &plan, &sink);
        assert!(report.failure.is_none(), "{:?}", report.failure);
        assert!(report.is_committed());
        assert!(!report.rolled_back);

        let live = Path::new(&plan.layout.live);
        assert_eq!(std::fs::read_to_string(live.join("VERSION")).unwrap(), "1");
        assert!(live.join("public/index.html").is_file());
        assert!(live.join("launched").is_file());
        assert!(!live.join("build.tar.gz").exists());
        assert!(!Path::new(&plan.layout.scratch).exists());
        assert!(report.cleanup_warnings.is_empty());

        assert_eq!(
            sink.phases(),
            vec![
                Phase::Start,
                Phase::BackupCreated,
                Phase::Staged,
                Phase::Swapped,
                Phase::Committed
            ]
        );
    }

    #[test]
    fn test_redeploy_replaces_live() {
        let host = Host::new();
        let sink = RecordingSink::default();
        run_local(&host, &host.plan("1", "true"), &sink).into_result().unwrap();

        let plan = host.plan("2", "true");
        std::fs::write(Path::new(&plan.layout.live).join("stale"), "x").unwrap();
        run_local(&host, &plan, &sink).into_result().unwrap();

        let live = Path::new(&plan.layout.live);
        assert_eq!(std::fs::read_to_string(live.join("VERSION")).unwrap(), "2");
        assert!(!live.join("stale").exists());
        assert!(!Path::new(&plan.layout.scratch).exists());
    }

    #[test]
    fn test_failed_launch_restores_previous() {
        let host = Host::new();
        let sink = RecordingSink::default();
        run_local(&host, &host.plan("1", LAUNCH_V1_ONLY), &sink)
            .into_result()
            .unwrap();
        let plan = host.plan("2", LAUNCH_V1_ONLY);
        let before = snapshot(Path::new(&plan.layout.live));
        assert_eq!(host.launches(), 1);

        let sink = RecordingSink::default();
        let report = run_local(&host, &plan, &sink);

        assert!(report.rolled_back);
        assert!(report.relaunched);
        assert_eq!(report.final_phase, Phase::RolledBack);
        assert_eq!(snapshot(Path::new(&plan.layout.live)), before);
        // v1, failed v2, relaunched v1
        assert_eq!(host.launches(), 3);
        assert!(!Path::new(&plan.layout.scratch).exists());
        assert!(matches!(
            report.failure,
            Some(Error::RemoteCommand {
                step: Step::Launch,
                exit_status: 1,
                ..
            })
        ));
        assert!(sink.phases().ends_with(&[Phase::RollingBack, Phase::RolledBack]));
    }

    #[test]
    fn test_failed_health_check_rolls_back() {
        let host = Host::new();
        let sink = RecordingSink::default();
        run_local(&host, &host.plan("1", "true"), &sink).into_result().unwrap();

        let mut plan = host.plan("2", "true");
        let before = snapshot(Path::new(&plan.layout.live));
        let closed = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        plan.health_checks = vec![format!("http://{}/health", closed.local_addr().unwrap())];
        drop(closed);
        plan.health = WaitOptions::health(Duration::from_millis(400), Duration::from_millis(100));

        let start = Instant::now();
        let report = run_local(&host, &plan, &sink);
        assert!(start.elapsed() < Duration::from_secs(3));

        assert!(report.rolled_back);
        assert!(report.relaunched);
        assert_eq!(snapshot(Path::new(&plan.layout.live)), before);
        assert!(matches!(
            report.failure,
            Some(Error::Timeout {
                kind: TimeoutKind::HealthCheck,
                ..
            })
        ));
    }

    #[test]
    fn test_command_order() {
        let session = ScriptedSession::new();
        let plan = scripted_plan();
        let sink = RecordingSink::default();
        run_scripted(&session, &plan, &sink).into_result().unwrap();

        let l = &plan.layout;
        let order = [
            format!("mkdir -p '{}'", l.live),
            format!("cp -a '{}' '{}'", l.live, l.backup),
            "tar -xzf 'build.tar.gz'".to_string(),
            format!("rm -rf '{}'", l.live),
            format!("mv '{}' '{}'", l.staging, l.live),
            "./start".to_string(),
            format!("rmdir '{}'", l.scratch),
        ];
        let positions: Vec<_> = order
            .iter()
            .map(|c| session.position(c).unwrap_or_else(|| panic!("missing {c}")))
            .collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]), "{positions:?}");

        let invocations = session.invocations();
        assert!(invocations.contains(&Invocation::Transfer {
            local: plan.artifact.path.clone(),
            remote: l.artifact.clone(),
        }));
        assert!(invocations.contains(&Invocation::Run {
            command: "./start".into(),
            cwd: Some(l.live.clone()),
        }));
        assert!(invocations.contains(&Invocation::Run {
            command: "tar -xzf 'build.tar.gz'".into(),
            cwd: Some(l.staging.clone()),
        }));
    }

    #[test]
    fn test_stderr_policy() {
        let plan = scripted_plan();
        let sink = RecordingSink::default();

        let session = ScriptedSession::new();
        session.fail_when("ls -A", 1);
        session.stderr_when("./start", "warning: low disk");
        let report = run_scripted(&session, &plan, &sink);
        assert!(matches!(
            report.failure,
            Some(Error::RemoteCommand {
                exit_status: 0,
                ref stderr,
                ..
            }) if stderr == &["warning: low disk".to_string()]
        ));
        assert!(report.rolled_back);

        let mut plan = plan;
        plan.command = "docker compose up -d".into();
        let session = ScriptedSession::new();
        session.stderr_when("docker compose", "Pulling web ... done");
        let report = run_scripted(&session, &plan, &sink);
        assert!(report.failure.is_none());
        assert!(sink.events().contains(&Event::OutputLine {
            stream: OutputStream::StderrChatter,
            line: "Pulling web ... done".into(),
        }));
    }

    #[test]
    fn test_first_deploy_failure_does_not_relaunch() {
        let plan = scripted_plan();
        let session = ScriptedSession::new();
        session.fail_when("ls -A", 1);
        session.fail_when("./start", 1);
        let sink = RecordingSink::default();

        let report = run_scripted(&session, &plan, &sink);
        assert!(report.rolled_back);
        assert!(!report.relaunched);
        let starts = session.commands().iter().filter(|c| *c == "./start").count();
        assert_eq!(starts, 1);
        assert!(session.position(&format!("mv '{}' '{}'", plan.layout.backup, plan.layout.live)).is_some());
    }

    #[test]
    fn test_failure_before_swap_leaves_live_alone() {
        let plan = scripted_plan();
        let session = ScriptedSession::new();
        session.fail_when("tar -xzf", 2);
        let sink = RecordingSink::default();

        let report = run_scripted(&session, &plan, &sink);
        assert!(matches!(
            report.failure,
            Some(Error::RemoteCommand {
                step: Step::Stage,
                exit_status: 2,
                ..
            })
        ));
        assert!(report.rolled_back);
        assert!(!report.relaunched);
        assert!(session.position(&format!("rm -rf '{}'", plan.layout.live)).is_none());
        assert!(!session.commands().iter().any(|c| c == "./start"));
        assert_eq!(report.final_phase, Phase::RolledBack);
    }

    #[test]
    fn test_failure_before_backup_skips_rollback() {
        let plan = scripted_plan();
        let session = ScriptedSession::new();
        session.fail_transfers("disk full");
        let sink = RecordingSink::default();

        let report = run_scripted(&session, &plan, &sink);
        assert!(matches!(report.failure, Some(Error::Remote(_))));
        assert!(!report.rolled_back);
        assert_eq!(report.final_phase, Phase::Start);
        assert!(session.position("rmdir").is_some());
    }

    #[test]
    fn test_rollback_failure_is_distinct() {
        let plan = scripted_plan();
        let session = ScriptedSession::new();
        session.fail_when("./start", 1);
        session.drop_connection_on(&format!("mv '{}'", plan.layout.backup));
        let sink = RecordingSink::default();

        let report = run_scripted(&session, &plan, &sink);
        let err = report.into_result().unwrap_err();
        assert_eq!(err.exit_code(), 7);
        match err {
            Error::RollbackFailed { original, rollback } => {
                assert!(matches!(*original, Error::RemoteCommand { step: Step::Launch, .. }));
                assert!(matches!(*rollback, Error::Remote(remotekit::Error::Closed)));
            }
            other => panic!("expected rollback failure, got {other:?}"),
        }
    }

    #[test]
    fn test_cleanup_warnings_do_not_fail() {
        let plan = scripted_plan();
        let session = ScriptedSession::new();
        session.fail_when("rmdir", 1);
        let sink = RecordingSink::default();

        let report = run_scripted(&session, &plan, &sink);
        assert!(report.failure.is_none());
        assert_eq!(report.cleanup_warnings.len(), 1);
        assert!(report.cleanup_warnings[0].contains("cleanup step failed"));
    }

    #[test]
    fn test_cancelled_before_start() {
        let plan = scripted_plan();
        let session = ScriptedSession::new();
        let sink = RecordingSink::default();
        let cancel = CancelToken::new();
        cancel.cancel();

        let mut handle = session.clone();
        let policy = ToolChatter::default();
        let report = Orchestrator::new(&mut handle, &policy, &sink, cancel).execute(&plan);

        assert!(matches!(report.failure, Some(Error::Cancelled)));
        assert!(session.position("mkdir").is_none());
        assert!(session.position("rmdir").is_some());
    }

    #[test]
    fn test_cancel_after_backup_rolls_back_and_cleans_up() {
        let plan = scripted_plan();
        let (session, report) = run_cancelled_after("cp -a", &plan);
        let l = &plan.layout;

        assert!(report.rolled_back);
        assert!(!report.relaunched);
        assert!(matches!(report.failure, Some(Error::Cancelled)));
        assert_eq!(report.final_phase, Phase::RolledBack);
        assert!(session.position("tar -xzf").is_none());
        assert!(session.position(&format!("rm -rf '{}'", l.live)).is_none());

        let backup = session.position(&format!("cp -a '{}' '{}'", l.live, l.backup)).unwrap();
        let commands = session.commands();
        let cleanup = [
            format!("rm -f '{}'", l.artifact),
            format!("rm -rf '{}'", l.staging),
            format!("rm -rf '{}'", l.backup),
            format!("rmdir '{}'", l.scratch),
        ];
        let positions: Vec<_> = cleanup
            .iter()
            .map(|c| commands.iter().rposition(|run| run == c).unwrap_or_else(|| panic!("missing {c}")))
            .collect();
        assert!(positions.iter().all(|p| *p > backup), "{positions:?}");
        assert_eq!(commands.last(), Some(&cleanup[3]));
        assert_eq!(report.into_result().unwrap_err().exit_code(), 130);
    }

    #[test]
    fn test_cancel_after_swap_restores_backup() {
        let plan = scripted_plan();
        let l = &plan.layout;
        let swap = format!("mv '{}' '{}'", l.staging, l.live);
        let (session, report) = run_cancelled_after(&swap, &plan);

        assert!(report.rolled_back);
        assert!(report.relaunched);
        let starts = session.commands().iter().filter(|c| *c == "./start").count();
        assert_eq!(starts, 1);
        assert!(matches!(report.failure, Some(Error::Cancelled)));
        assert!(session.position(&format!("mv '{}' '{}'", l.backup, l.live)).is_some());
        assert!(session.position(&format!("rmdir '{}'", l.scratch)).is_some());
    }
}
