//! Clap derive structures for the `cyborg` CLI.
//!
//! Defines the command tree, global flags, and shared types.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;

use cyborg_core::DeviceType;

// ── Top-Level CLI ────────────────────────────────────────────────────

/// cyborg -- reconcile accelerator inventory with Placement
#[derive(Debug, Parser)]
#[command(
    name = "cyborg",
    version,
    about = "Reconcile accelerator inventory with OpenStack Placement",
    long_about = "Diffs discovered accelerator device trees against persisted inventory,\n\
        applies the changes to a local state file, and reports resource providers,\n\
        inventories, and traits to the Placement service.",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Configuration profile to use
    #[arg(long, short = 'p', env = "CYBORG_PROFILE", global = true)]
    pub profile: Option<String>,

    /// Placement endpoint (overrides profile)
    #[arg(long, env = "CYBORG_PLACEMENT_URL", global = true)]
    pub placement_url: Option<String>,

    /// Placement auth token
    #[arg(long, env = "CYBORG_AUTH_TOKEN", global = true, hide_env = true)]
    pub token: Option<String>,

    /// Inventory state file (overrides profile)
    #[arg(long, env = "CYBORG_STATE_FILE", global = true)]
    pub state: Option<PathBuf>,

    /// Output format
    #[arg(
        long,
        short = 'o',
        env = "CYBORG_OUTPUT",
        default_value = "table",
        global = true
    )]
    pub output: OutputFormat,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Skip confirmation prompts
    #[arg(long, short = 'y', global = true)]
    pub yes: bool,

    /// Accept self-signed TLS certificates
    #[arg(long, short = 'k', env = "CYBORG_INSECURE", global = true)]
    pub insecure: bool,

    /// Request timeout in seconds (overrides profile)
    #[arg(long, env = "CYBORG_TIMEOUT", global = true)]
    pub timeout: Option<u64>,

    /// Placement microversion (overrides profile)
    #[arg(long, env = "CYBORG_MICROVERSION", global = true)]
    pub microversion: Option<String>,
}

// ── Output Enum ──────────────────────────────────────────────────────

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    /// Pretty table (default, interactive)
    Table,
    /// Pretty-printed JSON
    Json,
    /// Compact single-line JSON
    JsonCompact,
    /// YAML
    Yaml,
    /// Plain text, one value per line (scripting)
    Plain,
}

// ── Top-Level Command Enum ───────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run a reconciliation pass for a host
    Report(ReportArgs),

    /// Diff two device tree files without touching state or Placement
    Diff(DiffArgs),

    /// Show what a pass would do against the state file
    Plan(PlanArgs),

    /// Inspect and manage resource providers
    #[command(alias = "rp")]
    Providers(ProvidersArgs),

    /// Inspect persisted devices
    #[command(alias = "dev")]
    Devices(DevicesArgs),

    /// Manage CLI configuration and profiles
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ── Reconciliation ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ReportArgs {
    /// Compute host whose devices are being reported
    #[arg(long)]
    pub host: String,

    /// JSON device tree as discovered on the host
    #[arg(long)]
    pub tree: PathBuf,
}

#[derive(Debug, Args)]
pub struct DiffArgs {
    /// Previous device tree (JSON)
    #[arg(long)]
    pub old: PathBuf,

    /// Current device tree (JSON)
    #[arg(long)]
    pub new: PathBuf,

    /// Host name recorded in the plan
    #[arg(long, default_value = "localhost")]
    pub host: String,
}

#[derive(Debug, Args)]
pub struct PlanArgs {
    /// Compute host to diff
    #[arg(long)]
    pub host: String,

    /// JSON device tree as discovered on the host
    #[arg(long)]
    pub tree: PathBuf,
}

// ── Providers ────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ProvidersArgs {
    #[command(subcommand)]
    pub command: ProvidersCommand,
}

#[derive(Debug, Subcommand)]
pub enum ProvidersCommand {
    /// Compute the provider name and UUID for a device or deployable
    Uuid {
        /// Deployable (or any provider) name
        #[arg(conflicts_with_all = ["device_type", "cpid"])]
        name: Option<String>,

        /// Device type, used with --cpid
        #[arg(long, value_parser = parse_device_type, requires = "cpid")]
        device_type: Option<DeviceType>,

        /// Control path locator (BDF or JSON), used with --device-type
        #[arg(long, requires = "device_type")]
        cpid: Option<String>,
    },

    /// Report a single provider with one inventory class under a parent
    Report {
        /// Provider name
        #[arg(long)]
        name: String,

        /// Resource class (e.g. FPGA, PGPU, CUSTOM_QAT)
        #[arg(long)]
        resource_class: String,

        /// Inventory total
        #[arg(long, default_value = "1")]
        total: u32,

        /// Parent provider UUID
        #[arg(long)]
        parent: uuid::Uuid,

        /// Trait to set (repeatable)
        #[arg(long = "trait")]
        traits: Vec<String>,
    },

    /// List the provider tree under a host's compute node
    #[command(alias = "ls")]
    List {
        /// Compute host name
        #[arg(long)]
        host: String,
    },

    /// Delete a provider
    #[command(alias = "rm")]
    Delete {
        /// Provider UUID
        uuid: uuid::Uuid,

        /// Also delete every descendant, leaves first
        #[arg(long, short = 'r')]
        recursive: bool,
    },
}

fn parse_device_type(raw: &str) -> Result<DeviceType, String> {
    raw.parse()
        .map_err(|_| format!("unknown device type '{raw}' (expected GPU, FPGA, AICHIP, or QAT)"))
}

// ── Devices ──────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct DevicesArgs {
    #[command(subcommand)]
    pub command: DevicesCommand,
}

#[derive(Debug, Subcommand)]
pub enum DevicesCommand {
    /// List persisted devices
    #[command(alias = "ls")]
    List {
        /// Only devices of this host
        #[arg(long)]
        host: Option<String>,
    },
}

// ── Config ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Interactive configuration wizard
    Init,

    /// Display the resolved configuration (secrets masked)
    Show,

    /// Print the config file path
    Path,
}

// ── Completions ──────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: Shell,
}
