//! `pharsync plugin add|list|show|remove|reset`

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Args, Subcommand};
use colored::Colorize;
use tabled::{settings::Style, Table, Tabled};

use pharsync_core::{
    DesiredStateStore, HttpSource, Identity, PluginResource, PluginSource, PluginSpec,
};

use super::super::DependencyPolicyArg;
use super::{block_on, StoreArgs};

#[derive(Subcommand, Debug)]
pub enum PluginCommand {
    /// Declare a new plugin.
    Add(AddArgs),

    /// List declared plugins.
    List(ListArgs),

    /// Print one plugin resource as JSON.
    Show(TargetArgs),

    /// Delete a plugin; the reconciler removes its artifact.
    Remove(TargetArgs),

    /// Clear the recorded checksum so the next reconcile re-downloads.
    Reset(TargetArgs),
}

#[derive(Args, Debug)]
pub struct AddArgs {
    /// Plugin identity as <namespace>/<name>.
    pub identity: Identity,

    /// Download URL for the plugin archive.
    #[arg(long, required_unless_present = "data_file", conflicts_with = "data_file")]
    pub url: Option<String>,

    /// Per-request timeout for --url, in seconds.
    #[arg(long, requires = "url", value_name = "SECONDS")]
    pub timeout_seconds: Option<u64>,

    /// Embed the contents of this file as inline plugin data.
    #[arg(long, value_name = "FILE")]
    pub data_file: Option<PathBuf>,

    /// auto-create | fail-on-missing. Defaults to auto-create.
    #[arg(long, value_name = "POLICY")]
    pub dependency_policy: Option<DependencyPolicyArg>,

    #[command(flatten)]
    pub store: StoreArgs,
}

#[derive(Args, Debug)]
pub struct ListArgs {
    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,

    #[command(flatten)]
    pub store: StoreArgs,
}

#[derive(Args, Debug)]
pub struct TargetArgs {
    /// Plugin identity as <namespace>/<name>.
    pub identity: Identity,

    #[command(flatten)]
    pub store: StoreArgs,
}

pub fn run(cmd: PluginCommand) -> Result<()> {
    match cmd {
        PluginCommand::Add(args) => add(args),
        PluginCommand::List(args) => list(args),
        PluginCommand::Show(args) => show(args),
        PluginCommand::Remove(args) => remove(args),
        PluginCommand::Reset(args) => reset(args),
    }
}

fn add(args: AddArgs) -> Result<()> {
    let source = match (args.url, args.data_file) {
        (Some(url), None) => {
            let mut http = HttpSource::new(url);
            if let Some(timeout) = args.timeout_seconds {
                http.timeout_seconds = timeout;
            }
            PluginSource::http(http)
        }
        (None, Some(path)) => {
            let data = std::fs::read(&path)
                .with_context(|| format!("failed to read plugin data from {}", path.display()))?;
            if data.is_empty() {
                bail!("{} is empty; inline plugin data must not be empty", path.display());
            }
            PluginSource::inline(data)
        }
        _ => bail!("exactly one of --url or --data-file is required"),
    };

    let spec = PluginSpec {
        source,
        dependency_policy: args.dependency_policy.unwrap_or_default().into(),
    };
    let store = args.store.open()?;
    let created = block_on(store.create(PluginResource::new(&args.identity, spec)))?
        .with_context(|| format!("failed to add plugin '{}'", args.identity))?;

    println!("✓ Added plugin '{}'", created.identity());
    Ok(())
}

#[derive(Tabled)]
struct PluginTableRow {
    #[tabled(rename = "plugin")]
    plugin: String,
    #[tabled(rename = "source")]
    source: String,
    #[tabled(rename = "dependencies")]
    policy: String,
    #[tabled(rename = "checksum")]
    checksum: String,
    #[tabled(rename = "version")]
    version: u64,
}

fn list(args: ListArgs) -> Result<()> {
    let store = args.store.open()?;
    let plugins = block_on(store.list())?.context("failed to list plugins")?;

    if args.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&plugins).context("failed to serialize plugin JSON")?
        );
        return Ok(());
    }

    if plugins.is_empty() {
        println!("No plugins declared.");
        println!("Run: pharsync plugin add <namespace>/<name> --url <url>");
        return Ok(());
    }

    let rows: Vec<PluginTableRow> = plugins
        .iter()
        .map(|plugin| PluginTableRow {
            plugin: plugin.identity().to_string(),
            source: describe_source(&plugin.spec.source),
            policy: plugin.spec.dependency_policy.to_string(),
            checksum: match plugin.status.expected_checksum {
                Some(checksum) => format!("{checksum:08x}"),
                None => "pending".yellow().to_string(),
            },
            version: plugin.resource_version,
        })
        .collect();
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");
    Ok(())
}

fn show(args: TargetArgs) -> Result<()> {
    let store = args.store.open()?;
    let plugin = block_on(store.get(&args.identity))?
        .with_context(|| format!("failed to load plugin '{}'", args.identity))?;
    println!(
        "{}",
        serde_json::to_string_pretty(&plugin).context("failed to serialize plugin JSON")?
    );
    Ok(())
}

fn remove(args: TargetArgs) -> Result<()> {
    let store = args.store.open()?;
    block_on(store.delete(&args.identity))?
        .with_context(|| format!("failed to remove plugin '{}'", args.identity))?;
    println!("✓ Removed plugin '{}'", args.identity);
    Ok(())
}

fn reset(args: TargetArgs) -> Result<()> {
    let store = args.store.open()?;
    let reset = block_on(async {
        let mut plugin = store.get(&args.identity).await?;
        plugin.status.expected_checksum = None;
        store.update(&plugin).await
    })?
    .with_context(|| format!("failed to reset plugin '{}'", args.identity))?;

    println!(
        "✓ Cleared checksum for '{}' (version {})",
        reset.identity(),
        reset.resource_version
    );
    Ok(())
}

fn describe_source(source: &PluginSource) -> String {
    match source.kind() {
        Some(pharsync_core::SourceKind::Inline(data)) => format!("inline ({} bytes)", data.len()),
        Some(pharsync_core::SourceKind::Http(http)) => http.url.clone(),
        None => "none".red().to_string(),
    }
}
