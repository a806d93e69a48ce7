//! `landfall plan`: what `up` would change at the provider.

use super::Context;
use crate::cli::PlanArgs;
use crate::error::Result;
use crate::progress::LogSink;
use crate::reconcile::Reconciler;
use crate::ui;
use cloudkit::backend::linode::LinodeBackend;
use colored::Colorize;
use declarative::{Change, DiffSummary, ResourceDiff, group_by_type};

pub fn run(ctx: &Context, args: PlanArgs) -> Result<()> {
    let config = ctx.load_config()?;
    let target = config.target(&args.target)?;
    let provision = config.provision(&target, &args.provision)?;

    ui::header(&format!("Plan for {}-{}", target.project, target.environment));

    let provider = LinodeBackend::new(provision.token.clone());
    let diffs = Reconciler::new(&provider, &LogSink).plan(&provision.desired)?;
    print_plan(&diffs);
    Ok(())
}

fn print_plan(diffs: &[ResourceDiff]) {
    for (resource_type, group) in group_by_type(diffs) {
        ui::section(&resource_type);
        for diff in group {
            println!("  {}", describe(diff));
        }
    }

    let summary = DiffSummary::from_diffs(diffs);
    println!();
    if summary.has_changes() {
        println!(
            "{} to create, {} to update, {} unchanged",
            summary.additions.to_string().green(),
            summary.modifications.to_string().yellow(),
            summary.unchanged
        );
    } else {
        ui::success("Nothing to change");
    }
}

fn describe(diff: &ResourceDiff) -> String {
    match &diff.change {
        Change::None => format!("{} {}", "=".dimmed(), diff.description.dimmed()),
        Change::Create => format!("{} {}", "+".green(), diff.description),
        Change::Update { fields } => format!(
            "{} {} ({})",
            "~".yellow(),
            diff.description,
            fields.join(", ")
        ),
    }
}
