//! `landfall deploy`: only the deploy transaction, against a known host.

use super::{Context, connect, prepare_deploy, run_deploy};
use crate::cli::DeployCommandArgs;
use crate::error::{Error, Result};
use crate::progress::TerminalSink;
use crate::ui;

pub fn run(ctx: &Context, args: DeployCommandArgs) -> Result<()> {
    let host = args.host.trim();
    if host.is_empty() {
        return Err(Error::config("--host must not be empty"));
    }

    let config = ctx.load_config()?;
    let target = config.target(&args.target)?;
    let settings = config.deploy(&args.deploy)?;
    let (plan, policy) = prepare_deploy(&target, &settings)?;

    ui::header(&format!(
        "Deploying {}-{} to {host}",
        target.project, target.environment
    ));
    ctx.cancel.check()?;

    let sink = TerminalSink::new(!ctx.quiet);
    let mut connection = connect(host, &target.deploy_user, &settings)?;
    run_deploy(ctx, &mut connection, &plan, &policy, &sink)?;
    Ok(())
}
