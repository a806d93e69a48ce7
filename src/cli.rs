use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "landfall")]
#[command(author = "Alberto Cavalcante")]
#[command(version)]
#[command(about = "Provision a node, point DNS at it, and deploy with rollback", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Config file (default: ~/.config/landfall/landfall.toml)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Don't ask before creating a new instance
    #[arg(short, long, global = true)]
    pub yes: bool,

    /// Number of DNS resources reconciled in parallel
    #[arg(short, long, global = true, default_value = "4")]
    pub jobs: usize,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Reconcile instance and DNS, wait for the host, then deploy
    Up(UpArgs),

    /// Show what `up` would change at the provider without changing it
    Plan(PlanArgs),

    /// Run only the deploy transaction against an existing host
    Deploy(DeployCommandArgs),

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

// ============================================================================
// Shared argument groups
// ============================================================================

/// Identifies the deployment
#[derive(Args, Debug, Default, Clone)]
pub struct TargetArgs {
    /// Project name (used in remote paths)
    #[arg(long)]
    pub project: Option<String>,

    /// Environment name, e.g. production or staging
    #[arg(long = "env", value_name = "ENV")]
    pub environment: Option<String>,

    /// User that owns deployments on the host
    #[arg(long)]
    pub deploy_user: Option<String>,
}

/// Provider-side inputs
#[derive(Args, Debug, Default, Clone)]
pub struct ProvisionArgs {
    /// Linode API token
    #[arg(long, env = "LINODE_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Instance label (default: <project>-<env>)
    #[arg(long)]
    pub label: Option<String>,

    /// Comma-separated host names to point at the instance
    #[arg(long)]
    pub domains: Option<String>,

    /// SOA contact for newly created zones
    #[arg(long)]
    pub email: Option<String>,

    /// Root password for a new instance (generated when absent)
    #[arg(long, env = "LANDFALL_ROOT_PASS", hide_env_values = true)]
    pub root_pass: Option<String>,

    /// JSON file listing admin users for the boot script
    #[arg(long)]
    pub admin_users_file: Option<PathBuf>,

    /// Public key installed for the deploy user
    #[arg(long, env = "LANDFALL_DEPLOY_PUBLIC_KEY", hide_env_values = true)]
    pub deploy_public_key: Option<String>,
}

/// Deploy-side inputs
#[derive(Args, Debug, Default, Clone)]
pub struct DeployArgs {
    /// Build artifact (.tar.gz) to deploy
    #[arg(long)]
    pub artifact: Option<PathBuf>,

    /// Command that starts the deployment, run inside the live directory
    #[arg(long = "deploy-command", value_name = "COMMAND")]
    pub command: Option<String>,

    /// Private key content for the deploy user
    #[arg(long, env = "LANDFALL_DEPLOY_KEY", hide_env_values = true)]
    pub deploy_key: Option<String>,

    /// Private key file for the deploy user (instead of --deploy-key)
    #[arg(long)]
    pub identity_file: Option<PathBuf>,

    /// SSH port
    #[arg(long)]
    pub port: Option<u16>,

    /// URL that must return 200 after launch (repeatable)
    #[arg(long = "health-check", value_name = "URL")]
    pub health_checks: Vec<String>,

    /// Seconds to wait for health checks
    #[arg(long)]
    pub health_timeout: Option<u64>,

    /// Tools whose stderr output is not a failure (repeatable)
    #[arg(long = "stderr-tolerant", value_name = "TOOL")]
    pub stderr_tolerant: Vec<String>,
}

// ============================================================================
// Subcommands
// ============================================================================

#[derive(Args, Debug)]
pub struct UpArgs {
    #[command(flatten)]
    pub target: TargetArgs,

    #[command(flatten)]
    pub provision: ProvisionArgs,

    #[command(flatten)]
    pub deploy: DeployArgs,

    /// Seconds to wait for the host to answer HTTP
    #[arg(long)]
    pub ready_timeout: Option<u64>,
}

#[derive(Args, Debug)]
pub struct PlanArgs {
    #[command(flatten)]
    pub target: TargetArgs,

    #[command(flatten)]
    pub provision: ProvisionArgs,
}

#[derive(Args, Debug)]
pub struct DeployCommandArgs {
    /// Host to deploy to; `localhost` runs commands on this machine
    #[arg(long)]
    pub host: String,

    #[command(flatten)]
    pub target: TargetArgs,

    #[command(flatten)]
    pub deploy: DeployArgs,
}
