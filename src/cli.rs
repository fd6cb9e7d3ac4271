use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;

use crate::paths;

#[derive(Parser)]
#[command(name = "openvpn-provision")]
#[command(author = "Alberto Cavalcante")]
#[command(version)]
#[command(about = "Converge a Debian/Ubuntu host to a declared OpenVPN server", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Configuration file [default: /etc/openvpn-provision/config.toml]
    #[arg(short, long, global = true, env = paths::ENV_CONFIG)]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Converge the host to the declared state
    Apply(ApplyArgs),

    /// Show what apply would change
    Plan(PlatformArgs),

    /// Print the resource graph
    Graph(GraphArgs),

    /// Validate the configuration and the resource graph
    Check(PlatformArgs),

    /// Show the last apply run
    Last,

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Args, Default)]
pub struct PlatformArgs {
    /// Distribution codename (overrides config and /etc/os-release)
    #[arg(long)]
    pub codename: Option<String>,
}

#[derive(Args)]
pub struct ApplyArgs {
    /// Show what would change without changing anything
    #[arg(short = 'n', long)]
    pub dry_run: bool,

    /// Skip the confirmation prompt
    #[arg(short, long)]
    pub yes: bool,

    #[command(flatten)]
    pub platform: PlatformArgs,
}

#[derive(Args)]
pub struct GraphArgs {
    /// Print as JSON
    #[arg(long)]
    pub json: bool,

    #[command(flatten)]
    pub platform: PlatformArgs,
}
