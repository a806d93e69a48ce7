mod artifact;
mod cancel;
mod cli;
mod commands;
mod config;
mod deploy;
mod domains;
mod error;
mod paths;
mod progress;
mod readiness;
mod reconcile;
mod ui;

use clap::{CommandFactory, Parser};
use clap_complete::generate;
use cli::{Cli, Command};
use commands::Context;
use error::{Error, Result};
use std::io;

fn main() {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    let log_level = match cli.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    env_logger::Builder::new()
        .filter_level(if cli.quiet {
            log::LevelFilter::Error
        } else {
            log_level
        })
        .format_timestamp(None)
        .init();

    let cancel = cancel::CancelToken::new();
    if let Err(e) = cancel.install_handler() {
        log::warn!("Ctrl+C handler not installed: {e}");
    }

    let ctx = Context {
        verbose: cli.verbose,
        quiet: cli.quiet,
        yes: cli.yes,
        jobs: cli.jobs,
        config: cli.config,
        cancel,
    };

    if let Err(err) = dispatch(&ctx, cli.command) {
        report_error(&err);
        std::process::exit(err.exit_code());
    }
}

fn dispatch(ctx: &Context, command: Command) -> Result<()> {
    match command {
        Command::Up(args) => commands::up::run(ctx, args),
        Command::Plan(args) => commands::plan::run(ctx, args),
        Command::Deploy(args) => commands::deploy::run(ctx, args),
        Command::Completions { shell } => {
            let mut cmd = Cli::command();
            generate(shell, &mut cmd, "landfall", &mut io::stdout());
            Ok(())
        }
    }
}

fn report_error(err: &Error) {
    ui::error(&err.to_string());
    match err {
        Error::Provider(provider) => {
            let category = provider.category();
            ui::dim(&format!("{category}: {}", category.advice()));
        }
        Error::RollbackFailed { .. } => {
            ui::dim("The live directory may be missing or partial; inspect the host before redeploying");
        }
        Error::Cancelled => ui::dim("Interrupted"),
        _ => {}
    }
}
