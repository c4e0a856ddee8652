//! pharsync: keep PocketMine plugin artifacts in line with declared specs.
//!
//! # Usage
//!
//! ```text
//! pharsync run [--mount-path <dir>] [--store-dir <dir>] [-v] [--log-format text|json]
//! pharsync reconcile [--mount-path <dir>] [--store-dir <dir>]
//! pharsync plugin add <ns/name> (--url <url> [--timeout-seconds <n>] | --data-file <file>)
//! pharsync plugin list [--json]
//! pharsync plugin show|remove|reset <ns/name>
//! ```

mod commands;

use std::fmt;
use std::str::FromStr;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{plugin::PluginCommand, run::DaemonArgs};
use pharsync_core::DependencyPolicy;

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "pharsync",
    version,
    about = "Reconcile plugin artifacts on disk against a desired-state store",
    long_about = None,
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the reconciler in the foreground until SIGINT or SIGTERM.
    Run(DaemonArgs),

    /// Reconcile every declared plugin once and exit.
    Reconcile(DaemonArgs),

    /// Manage plugin resources in the store.
    Plugin {
        #[command(subcommand)]
        command: PluginCommand,
    },
}

// ---------------------------------------------------------------------------
// Shared DependencyPolicy argument
// ---------------------------------------------------------------------------

/// Thin wrapper so clap can parse `DependencyPolicy` from kebab-case input.
#[derive(Debug, Clone, Default)]
pub struct DependencyPolicyArg(pub DependencyPolicy);

impl FromStr for DependencyPolicyArg {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "auto-create" | "autocreate" => Ok(Self(DependencyPolicy::AutoCreate)),
            "fail-on-missing" | "failonmissing" => Ok(Self(DependencyPolicy::FailOnMissing)),
            other => Err(format!(
                "unknown dependency policy '{other}'; expected: auto-create, fail-on-missing"
            )),
        }
    }
}

impl fmt::Display for DependencyPolicyArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<DependencyPolicyArg> for DependencyPolicy {
    fn from(p: DependencyPolicyArg) -> Self {
        p.0
    }
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Run(args) => commands::run::run(args),
        Commands::Reconcile(args) => commands::run::reconcile(args),
        Commands::Plugin { command } => commands::plugin::run(command),
    }
}
