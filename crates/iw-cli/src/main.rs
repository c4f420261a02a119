//! Inventory Warden CLI
//!
//! Command-line interface for the Inventory Warden reconciliation engine.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;

mod config;

use config::{AppConfig, SourceConfig};
use iw_core::enrichment::PtrResolver;
use iw_core::inventory::export::export;
use iw_core::{EngineSettings, Reconciler, RunReport};
use iw_sources::{Source, StaticFileSource};

#[derive(Parser)]
#[command(name = "inventory-warden")]
#[command(version)]
#[command(about = "Reconciles infrastructure inventory from external sources", long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Output format (text, json)
    #[arg(long, default_value = "text")]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum OutputFormat {
    Text,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            _ => Err(format!("Invalid output format: {}", s)),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Run a full reconciliation over every enabled source
    Run {
        /// Collect and reconcile, then print the graph export instead of
        /// handing it to the registry
        #[arg(long)]
        dry_run: bool,

        /// Write the dry-run export here instead of stdout
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },

    /// Validate configuration and source settings without running
    CheckConfig {
        /// Configuration file to validate
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Run reconciliation and write the graph export as JSON
    Export {
        /// Write the export here instead of stdout
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },

    /// List configured sources
    Sources,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    iw_observability::logging::init_logging_with_config(iw_observability::logging::LoggingConfig {
        level: log_level,
        json_format: cli.format == OutputFormat::Json,
        ..Default::default()
    });

    let config_path = cli.config.clone().unwrap_or_else(default_config_path);
    let config = AppConfig::load(&config_path).unwrap_or_else(|_| {
        if cli.verbose {
            eprintln!("Using default configuration (no config file found)");
        }
        AppConfig::default()
    });

    match cli.command {
        Commands::Run { dry_run, output } => cmd_run(config, dry_run, output, cli.format).await,
        Commands::CheckConfig { config: cfg_path } => {
            cmd_check_config(cfg_path.unwrap_or(config_path)).await
        }
        Commands::Export { output } => cmd_export(config, output).await,
        Commands::Sources => cmd_sources(config),
    }
}

fn default_config_path() -> PathBuf {
    if let Some(dirs) = directories::ProjectDirs::from("com", "inventory-warden", "inventory-warden")
    {
        dirs.config_dir().join("config.yaml")
    } else {
        PathBuf::from("config/default.yaml")
    }
}

/// Builds adapters for every enabled source in the config.
fn build_sources(config: &AppConfig) -> Result<Vec<Box<dyn Source>>> {
    let mut sources: Vec<Box<dyn Source>> = Vec::new();
    for (name, source) in &config.sources {
        if !source.enabled {
            continue;
        }
        sources.push(build_source(name, source)?);
    }
    Ok(sources)
}

fn build_source(name: &str, source: &SourceConfig) -> Result<Box<dyn Source>> {
    match source.source_type.as_str() {
        "static-file" => {
            let mut adapter = StaticFileSource::new(name, &source.path);
            if source.resolve_hostnames {
                adapter = adapter.with_hostname_resolution(source.dns_servers.clone());
            }
            Ok(Box::new(adapter))
        }
        other => bail!("source '{}': unknown source type '{}'", name, other),
    }
}

#[cfg(feature = "ptr-lookup")]
fn ptr_resolver() -> impl PtrResolver {
    iw_core::enrichment::dns::ptr::TrustDnsPtrResolver
}

/// Without the ptr-lookup feature no PTR answers are available and DNS
/// enrichment resolves nothing.
#[cfg(not(feature = "ptr-lookup"))]
fn ptr_resolver() -> impl PtrResolver {
    iw_core::enrichment::MockPtrResolver::new()
}

/// Collects every enabled source and runs the reconciliation phases.
async fn run_reconciliation(config: &AppConfig) -> Result<(iw_core::InventoryStore, RunReport)> {
    let settings = EngineSettings::compile(&config.engine).context("invalid engine settings")?;
    let sources = build_sources(config)?;
    if sources.is_empty() {
        bail!("no enabled sources configured");
    }

    for source in &sources {
        let ctx = source.context();
        source
            .validate()
            .await
            .with_context(|| format!("source '{}' failed validation", ctx.name))?;
    }

    let mut reconciler = Reconciler::new(settings);
    for source in &sources {
        let ctx = source.context();
        let records = source
            .collect()
            .await
            .with_context(|| format!("source '{}' failed to collect", ctx.name))?;
        reconciler.ingest_source(&ctx, records);
    }

    let resolver = ptr_resolver();
    Ok(reconciler.reconcile(&resolver).await)
}

async fn cmd_run(
    config: AppConfig,
    dry_run: bool,
    output: Option<PathBuf>,
    format: OutputFormat,
) -> Result<()> {
    let (store, report) = run_reconciliation(&config).await?;

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        OutputFormat::Text => print_report(&report),
    }

    if dry_run {
        let graph = export(&store);
        write_json(&graph, output.as_deref())?;
        println!();
        println!("{}", "Dry run: export printed, nothing pushed".yellow());
    }

    Ok(())
}

async fn cmd_export(config: AppConfig, output: Option<PathBuf>) -> Result<()> {
    let (store, _report) = run_reconciliation(&config).await?;
    let graph = export(&store);
    write_json(&graph, output.as_deref())
}

fn write_json(value: &serde_json::Value, output: Option<&std::path::Path>) -> Result<()> {
    let rendered = serde_json::to_string_pretty(value)?;
    match output {
        Some(path) => std::fs::write(path, rendered)
            .with_context(|| format!("Failed to write {}", path.display()))?,
        None => println!("{}", rendered),
    }
    Ok(())
}

async fn cmd_check_config(path: PathBuf) -> Result<()> {
    println!("Validating configuration: {}", path.display().to_string().cyan());
    let config = AppConfig::load(&path)?;

    let mut errors = 0usize;

    match EngineSettings::compile(&config.engine) {
        Ok(settings) => {
            println!(
                "  {} engine settings ({} permitted subnets, policy {})",
                "ok".green(),
                settings.permitted_subnets.len(),
                settings.primary_ip_policy
            );
        }
        Err(e) => {
            errors += 1;
            println!("  {} engine settings: {}", "error".red(), e);
        }
    }

    if config.sources.is_empty() {
        println!("  {} no sources configured", "warning".yellow());
    }

    for (name, source_config) in &config.sources {
        if !source_config.enabled {
            println!("  {} source '{}' disabled, skipping", "note".cyan(), name);
            continue;
        }
        match build_source(name, source_config) {
            Ok(source) => match source.validate().await {
                Ok(()) => println!("  {} source '{}'", "ok".green(), name),
                Err(e) => {
                    errors += 1;
                    println!("  {} source '{}': {}", "error".red(), name, e);
                }
            },
            Err(e) => {
                errors += 1;
                println!("  {} source '{}': {}", "error".red(), name, e);
            }
        }
    }

    println!();
    if errors > 0 {
        println!("{}", format!("{} error(s) found", errors).red().bold());
        std::process::exit(1);
    }
    println!("{}", "Configuration is valid".green().bold());
    Ok(())
}

fn cmd_sources(config: AppConfig) -> Result<()> {
    println!("{}", "Configured Sources".bold());
    println!("──────────────────");
    if config.sources.is_empty() {
        println!("  (none)");
        return Ok(());
    }
    for (name, source) in &config.sources {
        let status = if source.enabled {
            "enabled".green()
        } else {
            "disabled".red()
        };
        let dns = if source.resolve_hostnames {
            ", resolves hostnames"
        } else {
            ""
        };
        println!(
            "  {} ({}) - {}{}",
            name.cyan(),
            source.source_type,
            status,
            dns
        );
    }
    Ok(())
}

fn print_report(report: &RunReport) {
    println!("{} {}", "Run".bold(), report.run_id.to_string().cyan());
    println!("  Started:  {}", report.started_at.format("%Y-%m-%d %H:%M:%S"));
    if let Some(finished) = report.finished_at {
        println!("  Finished: {}", finished.format("%Y-%m-%d %H:%M:%S"));
    }
    println!();
    println!("{}", "Sources".bold());
    for (name, stats) in &report.sources {
        println!(
            "  {}: {} records, {} skipped",
            name.cyan(),
            stats.records,
            stats.skipped
        );
    }
    println!();
    println!("{}", "Objects".bold());
    println!("  Created:  {}", report.objects_created);
    println!("  Updated:  {}", report.objects_updated);
    println!("  Orphaned: {}", report.orphans_marked);
    println!();
    println!("{}", "Enrichment".bold());
    println!("  Prefixes matched:   {}", report.prefixes_matched);
    println!("  Hostnames resolved: {}", report.hostnames_resolved);
    println!("  Primaries assigned: {}", report.primaries_assigned);
    println!();
    if report.is_clean() {
        println!("{}", "Run completed cleanly".green());
    } else {
        println!(
            "{}",
            format!("{} error(s) absorbed during the run", report.absorbed_errors).yellow()
        );
    }
}
