//! CLI structure and command definitions
//!
//! Warehouse commands take a target of the form `server/name` or
//! `resource-group/server/name`. `--subscription` narrows every lookup to one
//! subscription, by id or display name.

use clap::{Parser, Subcommand};
use warehousectl_core::ScaleStrategy;

/// Control panel for Azure dedicated SQL pools
#[derive(Parser, Debug)]
#[command(name = "warehousectl")]
#[command(
    version,
    about = "Control panel for Azure dedicated SQL pools across all your subscriptions"
)]
#[command(long_about = "
Control panel for Azure dedicated SQL pools across all your subscriptions

Lists every DataWarehouse-tier database the signed-in identity can see and
lets you pause, resume and scale them.

EXAMPLES:
    # Sign in with the Azure CLI first
    warehousectl auth login

    # Show the subscription/warehouse tree
    warehousectl tree

    # Interactive panel that refreshes when anything changes
    warehousectl watch

    # Pause and resume
    warehousectl pause mysrv/dw1
    warehousectl resume analytics-rg/mysrv/dw1

    # Scale, picking the level interactively or passing it
    warehousectl scale mysrv/dw1
    warehousectl scale mysrv/dw1 --level DW500c --yes

    # Filter output with JMESPath
    warehousectl list -o json -q '[?status==`Paused`].name'

For more help on a specific command, run:
    warehousectl <command> --help
")]
pub struct Cli {
    /// Limit to one subscription (id or display name)
    #[arg(long, short, global = true, env = "WAREHOUSECTL_SUBSCRIPTION")]
    pub subscription: Option<String>,

    /// Path to alternate configuration file
    #[arg(long, global = true, env = "WAREHOUSECTL_CONFIG_FILE")]
    pub config_file: Option<String>,

    /// Output format
    #[arg(long, short = 'o', global = true, value_enum, default_value = "auto")]
    pub output: OutputFormat,

    /// JMESPath query to filter output
    #[arg(long, short = 'q', global = true)]
    pub query: Option<String>,

    /// Enable verbose logging
    #[arg(long, short, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Automatically choose format based on command and context
    Auto,
    /// JSON output
    Json,
    /// YAML output
    Yaml,
    /// Human-readable table format
    Table,
}

/// Top-level commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Show subscriptions and their warehouses as a tree
    #[command(visible_alias = "t")]
    #[command(after_help = "EXAMPLES:
    # Collapsed or expanded according to expand_subscriptions
    warehousectl tree

    # Always show warehouses
    warehousectl tree --expand
")]
    Tree {
        /// Expand every subscription regardless of configuration
        #[arg(long, short)]
        expand: bool,
    },

    /// List warehouses with status and performance level
    #[command(visible_alias = "ls")]
    #[command(after_help = "EXAMPLES:
    # All subscriptions
    warehousectl list

    # One subscription as JSON
    warehousectl list --subscription Production -o json

    # Names of paused warehouses
    warehousectl list -q '[?status==`Paused`].name'
")]
    List,

    /// Interactive panel that polls and redraws on change
    #[command(visible_alias = "w")]
    #[command(after_help = "PANEL COMMANDS:
    r, refresh                 Redraw now
    pause <target>             Pause a warehouse
    resume <target>            Resume a warehouse
    scale <target> [level]     Scale a warehouse
    e, expand                  Toggle subscription expansion
    q, quit                    Leave the panel
")]
    Watch {
        /// Seconds between polls (overrides poll_interval_secs)
        #[arg(long)]
        interval: Option<u64>,

        /// Expand every subscription regardless of configuration
        #[arg(long, short)]
        expand: bool,
    },

    /// Pause a warehouse
    Pause {
        /// Warehouse as server/name or resource-group/server/name
        target: String,
    },

    /// Resume a paused warehouse
    Resume {
        /// Warehouse as server/name or resource-group/server/name
        target: String,
    },

    /// Change the performance level of a warehouse
    #[command(after_help = "EXAMPLES:
    # Pick the level from a list
    warehousectl scale mysrv/dw1

    # Non-interactive
    warehousectl scale mysrv/dw1 --level DW1000c --yes

    # Go through the Azure CLI / PowerShell instead of the API
    warehousectl scale mysrv/dw1 --level 500c --strategy cli
")]
    Scale {
        /// Warehouse as server/name or resource-group/server/name
        target: String,

        /// Target level such as DW500c (the DW prefix is optional)
        #[arg(long, short)]
        level: Option<String>,

        /// How the change is applied (overrides scale_strategy)
        #[arg(long, value_enum)]
        strategy: Option<ScaleStrategy>,

        /// Skip the confirmation prompt
        #[arg(long, short)]
        yes: bool,
    },

    /// Show the performance levels a warehouse can be scaled to
    Levels {
        /// Warehouse as server/name or resource-group/server/name
        target: String,

        /// Which candidate list to show (overrides scale_strategy)
        #[arg(long, value_enum)]
        strategy: Option<ScaleStrategy>,
    },

    /// Print the Azure portal link of a warehouse
    Link {
        /// Warehouse as server/name or resource-group/server/name
        target: String,
    },

    /// Azure sign-in
    #[command(subcommand)]
    Auth(AuthCommands),

    /// Configuration file management
    #[command(subcommand, visible_alias = "cfg")]
    Config(ConfigCommands),

    /// Version information
    #[command(visible_alias = "ver")]
    Version,

    /// Generate shell completions
    #[command(visible_alias = "comp")]
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Supported shells for completion generation
#[derive(Debug, Clone, Copy, clap::ValueEnum)]
#[allow(clippy::enum_variant_names)]
pub enum Shell {
    /// Bourne Again Shell
    Bash,
    /// Z Shell
    Zsh,
    /// Friendly Interactive Shell
    Fish,
    /// PowerShell
    #[value(name = "powershell", alias = "power-shell")]
    PowerShell,
    /// Elvish
    Elvish,
}

#[derive(Subcommand, Debug)]
pub enum AuthCommands {
    /// Check that the Azure CLI is installed and signed in
    Status,
    /// Run `az login`
    Login,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Print the effective configuration
    #[command(visible_alias = "sh")]
    Show,
    /// Print the path of the configuration file
    Path,
    /// Set one key, e.g. `scale-strategy cli` or `tools.az /opt/az/bin/az`
    #[command(after_help = "KEYS:
    expand-subscriptions     true | false
    poll-interval-secs       seconds between polls
    operation-timeout-secs   upper bound on pause/resume/scale
    scale-strategy           api | cli
    credential.kind          default | cli | client-secret
    credential.tenant_id
    credential.client_id
    credential.client_secret
    tools.az, tools.pwsh
    endpoints.management, endpoints.authority, endpoints.portal
")]
    Set {
        key: String,
        value: String,
    },
    /// Store the service principal secret in the OS keyring
    SetSecret {
        /// Secret value; prompted for when omitted
        #[arg(long)]
        value: Option<String>,
    },
}
