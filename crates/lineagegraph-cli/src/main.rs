use clap::{Parser, Subcommand};
use colored::Colorize;
use anyhow::Result;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use lineagegraph_catalog::{CatalogSource, PostgresCatalog};
use lineagegraph_core::{Config, ImportReport, NodeRef, Severity};
use lineagegraph_dbt::ProjectCompiler;
use lineagegraph_store::{GraphStore, Importer, MemoryGraphStore, Neo4jStore, UpsertEngine};

const DEFAULT_CONFIG: &str = "lineagegraph.toml";

/// LineageGraph - table and column lineage from dbt and the warehouse into Neo4j
#[derive(Parser)]
#[command(name = "lineagegraph")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to config file (default: lineagegraph.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile every model file with the dbt compiler
    Compile {
        /// Compile the whole project in one invocation instead of per file
        #[arg(long)]
        all: bool,
    },

    /// Import model and column lineage from the dbt manifest
    ImportDbt {
        #[command(flatten)]
        output: OutputArgs,
    },

    /// Import tables, columns and foreign keys from the warehouse catalog
    ImportWarehouse {
        #[command(flatten)]
        output: OutputArgs,
    },

    /// Import the manifest, then the warehouse catalog
    Import {
        #[command(flatten)]
        output: OutputArgs,
    },

    /// Show upstream or downstream impact for a model, table or column
    Impact {
        /// Model name, model unique_id, table key (db.schema.table) or column key
        node: String,

        /// Show what the node is derived from instead of what it feeds
        #[arg(long)]
        upstream: bool,

        /// Also replay the warehouse catalog
        #[arg(long)]
        with_warehouse: bool,
    },
}

#[derive(clap::Args)]
struct OutputArgs {
    /// Assemble and report without writing to the graph store
    #[arg(long)]
    dry_run: bool,

    /// Write the import report(s) as JSON to this file
    #[arg(short, long)]
    report: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_tracing(cli.verbose);

    // .env is optional
    let _ = dotenvy::dotenv();

    let config = load_config(cli.config.as_deref(), cli.verbose)?;

    match cli.command {
        Commands::Compile { all } => compile_command(&config, all, cli.verbose),
        Commands::ImportDbt { output } => {
            let importer = importer(&config, output.dry_run, cli.verbose).await?;
            let report = importer.import_manifest().await?;
            finish(vec![report], &output)
        }
        Commands::ImportWarehouse { output } => {
            let source = connect_warehouse(&config, cli.verbose).await?;
            let importer = importer(&config, output.dry_run, cli.verbose).await?;
            let report = importer.import_warehouse(source.as_ref()).await?;
            finish(vec![report], &output)
        }
        Commands::Import { output } => {
            let importer = importer(&config, output.dry_run, cli.verbose).await?;

            // The manifest pass does not need the warehouse, so connect after it
            let mut reports = vec![importer.import_manifest().await?];
            if config.warehouse.is_some() {
                let source = connect_warehouse(&config, cli.verbose).await?;
                reports.push(importer.import_warehouse(source.as_ref()).await?);
            } else if cli.verbose {
                eprintln!("{}", "No [warehouse] section, skipping the warehouse pass".yellow());
            }
            finish(reports, &output)
        }
        Commands::Impact { node, upstream, with_warehouse } => {
            impact_command(&config, &node, upstream, with_warehouse, cli.verbose).await
        }
    }
}

/// Log to stderr; RUST_LOG wins over the verbosity flag
fn init_tracing(verbose: bool) {
    let default_level = if verbose { "info" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

fn load_config(path: Option<&Path>, verbose: bool) -> Result<Config> {
    let config = if let Some(config_path) = path {
        Config::from_file(config_path)?
    } else if Path::new(DEFAULT_CONFIG).exists() {
        Config::from_file(Path::new(DEFAULT_CONFIG))?
    } else {
        if verbose {
            eprintln!("{}", "No config file found, using defaults".yellow());
        }
        Config::default()
    };

    let config = config.with_env_overrides();

    if verbose {
        eprintln!("{} dialect: {:?}", "Using".cyan(), config.dialect);
        eprintln!("{} {}", "Project:".cyan(), config.project.path.display());
    }

    Ok(config)
}

/// Compile command - run the dbt compiler
fn compile_command(config: &Config, all: bool, verbose: bool) -> Result<()> {
    let compiler = ProjectCompiler::from_config(&config.project);

    if all {
        if verbose {
            eprintln!("{} {}", "Compiling project:".cyan(), compiler.project_path().display());
        }
        compiler.compile_all()?;
        println!("{}", "✓ Project compiled".green());
        return Ok(());
    }

    let summary = compiler.compile_each()?;

    println!("Compiled: {}", format!("{}", summary.compiled.len()).green());
    if summary.is_success() {
        println!("Failed:   {}", "0".green());
    } else {
        println!("Failed:   {}", format!("{}", summary.failed.len()).red().bold());
        for (model, message) in &summary.failed {
            println!("  {} {}", "✗".red(), model.display());
            if verbose {
                println!("    {}", message);
            }
        }
    }

    Ok(())
}

/// Importer writing to Neo4j, or a dry-run importer
async fn importer(config: &Config, dry_run: bool, verbose: bool) -> Result<Importer<'_>> {
    if dry_run {
        if verbose {
            eprintln!("{}", "Dry run: nothing will be written".yellow());
        }
        return Ok(Importer::dry_run(config));
    }

    let store = Neo4jStore::from_config(&config.graph)?;

    if verbose {
        eprintln!("{} {}", "Connecting to graph store at".cyan(), config.graph.uri);
    }
    store.test_connection().await
        .map_err(|e| anyhow::anyhow!("Failed to connect to graph store: {}", e))?;

    let engine = UpsertEngine::from_config(Arc::new(store), &config.graph);
    Ok(Importer::new(config, engine))
}

async fn connect_warehouse(config: &Config, verbose: bool) -> Result<Box<dyn CatalogSource>> {
    let warehouse_config = config.warehouse.as_ref()
        .ok_or_else(|| anyhow::anyhow!(
            "No warehouse configuration found in {}. \
             Add a [warehouse] section or set RED_SHIFT_HOST.",
            DEFAULT_CONFIG
        ))?;

    let source: Box<dyn CatalogSource> = match warehouse_config.warehouse_type.to_lowercase().as_str() {
        "redshift" | "postgres" | "postgresql" => {
            if verbose {
                eprintln!(
                    "{} {} at {}:{}...",
                    "Connecting to".cyan(),
                    warehouse_config.warehouse_type,
                    warehouse_config.host,
                    warehouse_config.port()
                );
            }
            Box::new(PostgresCatalog::from_config(warehouse_config).await?)
        }
        _ => {
            return Err(anyhow::anyhow!(
                "Unsupported warehouse type '{}'. Supported: redshift, postgres",
                warehouse_config.warehouse_type
            ));
        }
    };

    source.test_connection().await
        .map_err(|e| anyhow::anyhow!("Failed to connect to warehouse: {}", e))?;

    if verbose {
        eprintln!("{}", "✓ Connection successful".green());
    }

    Ok(source)
}

/// Print and optionally save the reports
fn finish(reports: Vec<ImportReport>, output: &OutputArgs) -> Result<()> {
    for report in &reports {
        print_report_summary(report);
    }

    if let Some(path) = &output.report {
        match reports.as_slice() {
            [report] => report.save_to_file(path)?,
            _ => std::fs::write(path, serde_json::to_string_pretty(&reports)?)?,
        }
        eprintln!("{} {}", "Report saved to:".green(), path.display());
    }

    Ok(())
}

/// Impact command - replay the imports in memory and walk the graph
async fn impact_command(
    config: &Config,
    node: &str,
    upstream: bool,
    with_warehouse: bool,
    verbose: bool,
) -> Result<()> {
    let store = MemoryGraphStore::new();
    let engine = UpsertEngine::from_config(Arc::new(store.clone()), &config.graph);
    let importer = Importer::new(config, engine);

    if verbose {
        eprintln!("{}", "Building lineage graph in memory...".cyan());
    }
    importer.import_manifest().await?;
    if with_warehouse {
        let source = connect_warehouse(config, verbose).await?;
        importer.import_warehouse(source.as_ref()).await?;
    }

    let impact = store.impact().await;
    let graph = store.snapshot().await;

    // A bare model name is looked up among model nodes
    let start = impact
        .find(node)
        .cloned()
        .or_else(|| {
            graph
                .models()
                .find(|m| m.name.as_deref() == Some(node))
                .map(|m| NodeRef::Model(m.key.clone()))
        })
        .ok_or_else(|| anyhow::anyhow!(
            "'{}' has no lineage in the graph. Try a model unique_id (e.g. 'model.project.{}') or a table/column key",
            node,
            node
        ))?;

    let (title, related) = if upstream {
        ("Upstream Lineage", impact.upstream(&start))
    } else {
        ("Downstream Impact", impact.downstream(&start))
    };

    println!("\n{}", "=".repeat(60).bright_blue());
    println!("{}", title.bold().bright_blue());
    println!("{}", "=".repeat(60).bright_blue());
    println!();

    println!("{} {}", "Node:".bold(), start.to_string().green());
    println!("{} {}", "Related nodes:".bold(), related.len());
    println!();

    if related.is_empty() {
        println!("{}", "✓ Nothing related".green());
    } else {
        for (i, dep) in related.iter().enumerate() {
            println!("  {}. {}", i + 1, dep.to_string().yellow());
        }
    }

    println!();
    println!("{}", "=".repeat(60).bright_blue());

    Ok(())
}

/// Print report summary to stdout
fn print_report_summary(report: &ImportReport) {
    println!("\n{}", "=".repeat(60).bright_blue());
    println!("{}", format!("Import Report ({})", report.source).bold().bright_blue());
    println!("{}", "=".repeat(60).bright_blue());
    println!();

    println!("Version: {}", report.version);
    println!("Timestamp: {}", report.timestamp);
    println!();

    let summary = &report.summary;
    println!("{}", "Nodes:".bold());
    println!("  Tables:  {}", summary.tables);
    println!("  Columns: {}", summary.columns);
    println!("  Models:  {}", summary.models);
    println!();

    println!("{} {}", "Relationships:".bold(), report.total_relationships());
    for (rel_type, count) in &summary.relationships {
        println!("  {:<16} {}", rel_type, count);
    }
    println!();

    if summary.models > 0 {
        println!("Models with column lineage:    {}", summary.models_with_lineage);
        println!("Models without column lineage: {}", summary.models_without_lineage);
    }
    println!("Units applied: {}", summary.units_applied);

    if summary.warnings > 0 {
        println!("Warnings: {}", format!("{}", summary.warnings).yellow());
    } else {
        println!("Warnings: {}", format!("{}", summary.warnings).green());
    }
    println!();

    if !report.diagnostics.is_empty() {
        println!("{}", "Skipped items:".bold());
        for diag in &report.diagnostics {
            let severity_str = match diag.severity {
                Severity::Error => "ERROR".red().bold(),
                Severity::Warn => "WARN".yellow().bold(),
                Severity::Info => "INFO".cyan(),
            };

            println!("  [{}] {}: {}", severity_str, diag.code, diag.message);

            if let Some(subject) = &diag.subject {
                println!("    Subject: {}", subject);
            }
        }
        println!();
    }

    println!("{}", "=".repeat(60).bright_blue());
}

#[cfg(test)]
mod tests {
    use super::*;
    use lineagegraph_core::{GraphBatch, ImportSource};

    #[test]
    fn verify_cli() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn import_flags_parse() {
        let cli = Cli::try_parse_from(["lineagegraph", "import-dbt", "--dry-run", "--report", "out.json"]).unwrap();
        match cli.command {
            Commands::ImportDbt { output } => {
                assert!(output.dry_run);
                assert_eq!(output.report, Some(PathBuf::from("out.json")));
            }
            _ => panic!("expected import-dbt"),
        }
    }

    #[test]
    fn single_report_is_saved_as_an_object() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.json");
        let output = OutputArgs { dry_run: true, report: Some(path.clone()) };
        let report = ImportReport::from_batch(ImportSource::Manifest, &GraphBatch::new(), Vec::new());

        finish(vec![report], &output).unwrap();

        let saved: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert!(saved.is_object());
        assert_eq!(saved["source"], "manifest");
    }

    #[test]
    fn several_reports_are_saved_as_an_array() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reports.json");
        let output = OutputArgs { dry_run: true, report: Some(path.clone()) };
        let reports = vec![
            ImportReport::from_batch(ImportSource::Manifest, &GraphBatch::new(), Vec::new()),
            ImportReport::from_batch(ImportSource::Warehouse, &GraphBatch::new(), Vec::new()),
        ];

        finish(reports, &output).unwrap();

        let saved: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(saved.as_array().map(Vec::len), Some(2));
    }

    #[test]
    fn impact_flags_parse() {
        let cli = Cli::try_parse_from(["lineagegraph", "-v", "impact", "stg_orders", "--upstream"]).unwrap();
        assert!(cli.verbose);
        assert!(matches!(cli.command, Commands::Impact { upstream: true, with_warehouse: false, .. }));
    }
}
