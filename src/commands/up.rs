//! `landfall up`: reconcile, wait, deploy.

use super::{Context, PromptConfirm, connect, prepare_deploy, run_deploy};
use crate::cli::UpArgs;
use crate::error::Result;
use crate::progress::TerminalSink;
use crate::readiness::ReadinessWaiter;
use crate::reconcile::{ReconcileReport, Reconciler};
use crate::ui;
use cloudkit::backend::linode::LinodeBackend;
use declarative::AutoConfirm;

const STEPS: usize = 4;

pub fn run(ctx: &Context, args: UpArgs) -> Result<()> {
    let config = ctx.load_config()?;
    let target = config.target(&args.target)?;
    let mut provision = config.provision(&target, &args.provision)?;
    provision.readiness = config.readiness_options(args.ready_timeout)?;
    let deploy = config.deploy(&args.deploy)?;
    let (plan, policy) = prepare_deploy(&target, &deploy)?;

    ui::header(&format!("{}-{}", target.project, target.environment));
    log::debug!("{provision:?}");

    let provider = LinodeBackend::new(provision.token.clone());
    let sink = TerminalSink::new(!ctx.quiet);

    ui::step(1, STEPS, "Reconciling instance and DNS");
    ctx.cancel.check()?;
    let reconciler = Reconciler::new(&provider, &sink).jobs(ctx.jobs);
    let report = if ctx.yes {
        reconciler.run(&provision.desired, &mut AutoConfirm)?
    } else {
        reconciler.run(&provision.desired, &mut PromptConfirm)?
    };
    print_reconcile(&report);

    let url = provision
        .readiness_url
        .clone()
        .unwrap_or_else(|| format!("http://{}", report.address));
    ui::step(2, STEPS, &format!("Waiting for {url}"));
    ReadinessWaiter::new(&sink, ctx.cancel.clone()).wait_until_ready(&url, &provision.readiness)?;

    ui::step(
        3,
        STEPS,
        &format!("Connecting as {}@{}", target.deploy_user, report.address),
    );
    ctx.cancel.check()?;
    let mut connection = connect(&report.address.to_string(), &target.deploy_user, &deploy)?;

    ui::step(4, STEPS, &format!("Deploying {}", plan.artifact));
    run_deploy(ctx, &mut connection, &plan, &policy, &sink)?;
    Ok(())
}

fn print_reconcile(report: &ReconcileReport) {
    ui::kv("instance", &report.instance.live().to_string());
    for linked in &report.domains {
        ui::kv(
            "zone",
            &format!(
                "{} ({} records)",
                linked.domain.live().domain,
                linked.records.len()
            ),
        );
    }
    let s = &report.summary;
    if s.total_changes() == 0 {
        ui::dim("provider already up to date");
    } else {
        ui::dim(&format!(
            "{} created, {} updated, {} unchanged",
            s.created, s.updated, s.reused
        ));
    }
}
