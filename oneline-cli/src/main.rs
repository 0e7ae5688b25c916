//! Oneline CLI - single-line diagram validation, bus resolution and layout
//! from the command line.

use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use oneline::diagnostics::{Alert, AlertLevel, ValidationIssue};
use oneline::layout::capture_overrides;
use oneline::topology::{ElementIndex, LoadOutcome};
use oneline::{
    AlertCode, IssueCode, LayoutConfig, Network, OnelineCore, OnelineError, PipelineOptions,
    PipelineResult, TopologyGraph, ValidationReport,
};
use std::fs;
use std::path::{Path, PathBuf};
use std::process;

#[derive(Parser)]
#[command(name = "oneline")]
#[command(about = "Single-line diagram topology resolver and layout engine", long_about = None)]
#[command(version)]
struct Cli {
    /// Log to stderr (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check connectivity declarations without resolving
    Validate {
        /// Network JSON file
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Output format
        #[arg(short, long, value_enum, default_value = "human")]
        format: OutputFormat,

        /// Exit with error code if diagnostics found at this severity or higher
        #[arg(long, value_enum)]
        fail_on: Option<FailOnSeverity>,
    },

    /// Validate and resolve every branch to a bus on each end
    Resolve {
        /// Network JSON file
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Output format
        #[arg(short, long, value_enum, default_value = "human")]
        format: OutputFormat,

        /// Exit with error code if diagnostics found at this severity or higher
        #[arg(long, value_enum)]
        fail_on: Option<FailOnSeverity>,
    },

    /// Run the full pipeline and print diagram coordinates
    Layout {
        /// Network JSON file
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Layout spacing TOML file
        #[arg(short, long, value_name = "TOML")]
        config: Option<PathBuf>,

        /// Saved coordinate overrides (JSON array)
        #[arg(long, value_name = "JSON")]
        overrides: Option<PathBuf>,

        /// Write the resulting coordinates as overrides to this file
        #[arg(long, value_name = "JSON")]
        save_overrides: Option<PathBuf>,

        /// Output format
        #[arg(short, long, value_enum, default_value = "human")]
        format: OutputFormat,

        /// Exit with error code if diagnostics found at this severity or higher
        #[arg(long, value_enum)]
        fail_on: Option<FailOnSeverity>,
    },

    /// Resolve the network and print the bus path between two buses
    Path {
        /// Network JSON file
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Starting bus tag
        from: String,

        /// Destination bus tag
        to: String,

        /// Output format
        #[arg(short, long, value_enum, default_value = "human")]
        format: OutputFormat,
    },

    /// List diagnostic codes (descriptions with -v)
    Codes,
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    /// Human-readable output
    Human,
    /// JSON output for CI/CD
    Json,
}

#[derive(Clone, ValueEnum)]
enum FailOnSeverity {
    Error,
    Warning,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let exit_code = match cli.command {
        Commands::Validate {
            file,
            format,
            fail_on,
        } => handle_validate(&file, format, fail_on),
        Commands::Resolve {
            file,
            format,
            fail_on,
        } => handle_resolve(&file, format, fail_on),
        Commands::Layout {
            file,
            config,
            overrides,
            save_overrides,
            format,
            fail_on,
        } => handle_layout(
            &file,
            config.as_deref(),
            overrides.as_deref(),
            save_overrides.as_deref(),
            format,
            fail_on,
        ),
        Commands::Path {
            file,
            from,
            to,
            format,
        } => handle_path(&file, &from, &to, format),
        Commands::Codes => {
            handle_codes(cli.verbose > 0);
            0
        }
    };

    process::exit(exit_code);
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        2 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn load(file: &Path) -> Option<Network> {
    match OnelineCore::load_network(file) {
        Ok(network) => Some(network),
        Err(e) => {
            eprintln!("Error: {}: {}", file.display(), e);
            None
        }
    }
}

fn handle_validate(file: &Path, format: OutputFormat, fail_on: Option<FailOnSeverity>) -> i32 {
    let Some(network) = load(file) else {
        return 1;
    };

    let report = OnelineCore::validate(&network);
    match format {
        OutputFormat::Human => {
            println!("\nFile: {}", file.display());
            println!("{}", "─".repeat(60));
            output_validation_human(&report);
        }
        OutputFormat::Json => print_json(&serde_json::json!({
            "file": file.display().to_string(),
            "validation": report,
        })),
    }

    let failed = match fail_on {
        Some(FailOnSeverity::Error) => !report.errors.is_empty(),
        Some(FailOnSeverity::Warning) => !report.errors.is_empty() || !report.warnings.is_empty(),
        None => false,
    };
    i32::from(failed)
}

fn handle_resolve(file: &Path, format: OutputFormat, fail_on: Option<FailOnSeverity>) -> i32 {
    let Some(network) = load(file) else {
        return 1;
    };

    let result = OnelineCore::resolve(network);
    output_result(file, &result, &format);
    exit_code(&result, fail_on)
}

fn handle_layout(
    file: &Path,
    config: Option<&Path>,
    overrides: Option<&Path>,
    save_overrides: Option<&Path>,
    format: OutputFormat,
    fail_on: Option<FailOnSeverity>,
) -> i32 {
    let Some(network) = load(file) else {
        return 1;
    };

    let options = match build_options(config, overrides) {
        Ok(options) => options,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };

    let result = match OnelineCore::run(network, &options) {
        Ok(result) => result,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };

    output_result(file, &result, &format);

    if let (Some(path), Some(layout)) = (save_overrides, &result.layout) {
        let network = &result.network;
        let index = ElementIndex::new(&network.buses, &network.branches(), &network.passives());
        let records = capture_overrides(layout, &index);
        let written = serde_json::to_string_pretty(&records)
            .map_err(OnelineError::from)
            .and_then(|json| fs::write(path, json).map_err(OnelineError::from));
        if let Err(e) = written {
            eprintln!("Error: {}: {}", path.display(), e);
            return 1;
        }
    }

    exit_code(&result, fail_on)
}

fn handle_path(file: &Path, from: &str, to: &str, format: OutputFormat) -> i32 {
    let Some(network) = load(file) else {
        return 1;
    };

    let result = OnelineCore::resolve(network);
    if result.has_errors() {
        eprintln!(
            "Error: {} does not resolve ({} errors); run `resolve` for details",
            file.display(),
            result.stats.errors
        );
        return 1;
    }

    let graph = TopologyGraph::from_buses(&result.network.buses);
    let path = graph.find_path(from, to);

    match format {
        OutputFormat::Human => match &path {
            Some(buses) => println!("{}", buses.join(" -> ")),
            None => {
                println!("No path from {} to {}", from, to);
                for end in [from, to] {
                    println!("  {} neighbours: {}", end, graph.neighbours(end).join(", "));
                }
            }
        },
        OutputFormat::Json => print_json(&serde_json::json!({
            "from": from,
            "to": to,
            "path": path,
            "neighbours": {
                from: graph.neighbours(from),
                to: graph.neighbours(to),
            },
        })),
    }

    i32::from(path.is_none())
}

fn build_options(config: Option<&Path>, overrides: Option<&Path>) -> Result<PipelineOptions, OnelineError> {
    let layout = match config {
        Some(path) => LayoutConfig::from_toml_file(path)?,
        None => LayoutConfig::default(),
    };
    let overrides = match overrides {
        Some(path) => OnelineCore::load_overrides(path)?,
        None => Vec::new(),
    };
    Ok(PipelineOptions {
        layout,
        overrides,
        skip_layout: false,
    })
}

fn exit_code(result: &PipelineResult, fail_on: Option<FailOnSeverity>) -> i32 {
    let failed = match fail_on {
        Some(FailOnSeverity::Error) => result.has_errors(),
        Some(FailOnSeverity::Warning) => result.stats.errors > 0 || result.stats.warnings > 0,
        None => false,
    };
    i32::from(failed)
}

fn print_json(value: &serde_json::Value) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("Error: {}", e),
    }
}

fn output_result(file: &Path, result: &PipelineResult, format: &OutputFormat) {
    match format {
        OutputFormat::Human => output_human(file, result),
        OutputFormat::Json => output_json(file, result),
    }
}

fn output_json(file: &Path, result: &PipelineResult) {
    let branches: Vec<_> = result
        .network
        .branches()
        .iter()
        .map(|b| {
            serde_json::json!({
                "tag": b.tag,
                "category": b.category,
                "from_bus": b.from_bus,
                "to_bus": b.to_bus,
            })
        })
        .collect();
    let alerts: Vec<&Alert> = result.all_alerts().collect();

    let output = serde_json::json!({
        "file": file.display().to_string(),
        "ok": result.ok(),
        "validation": result.validation,
        "buses": result.network.buses,
        "branches": branches,
        "alerts": alerts,
        "layout": result.layout,
        "topology": result.topology,
        "summary": {
            "errors": result.stats.errors,
            "warnings": result.stats.warnings,
            "infos": result.stats.infos,
            "total": result.total_diagnostics(),
        }
    });
    print_json(&output);
}

fn output_validation_human(report: &ValidationReport) {
    if !report.errors.is_empty() {
        println!("\n  ERRORS:");
        for issue in &report.errors {
            print_issue(issue);
        }
    }
    if !report.warnings.is_empty() {
        println!("\n  WARNINGS:");
        for issue in &report.warnings {
            print_issue(issue);
        }
    }

    let rewritten: Vec<_> = report
        .load_results
        .iter()
        .filter(|r| r.outcome != LoadOutcome::Accepted)
        .collect();
    if !rewritten.is_empty() {
        println!("\n  LOADS:");
        for load in rewritten {
            println!(
                "    - {} -> {} ({:?})",
                load.load_tag,
                load.resolved_bus.as_deref().unwrap_or("-"),
                load.outcome
            );
        }
    }

    if report.errors.is_empty() && report.warnings.is_empty() {
        println!("  No issues found");
    }
}

fn print_issue(issue: &ValidationIssue) {
    println!("    - [{}] {}", issue.code, issue.message);
}

fn output_human(file: &Path, result: &PipelineResult) {
    println!("\nFile: {}", file.display());
    println!("{}", "─".repeat(60));
    output_validation_human(&result.validation);

    if result.evaluation.is_some() {
        println!("\n  BRANCHES:");
        for branch in result.network.branches() {
            println!(
                "    - {} ({}): {} -> {}",
                branch.tag,
                oneline::ElementCategory::from(branch.category),
                branch.from_bus.as_deref().unwrap_or("?"),
                branch.to_bus.as_deref().unwrap_or("?")
            );
        }
    }

    let alerts: Vec<&Alert> = result
        .all_alerts()
        .filter(|a| a.level != AlertLevel::Info)
        .collect();
    if !alerts.is_empty() {
        println!("\n  ALERTS:");
        for alert in alerts {
            println!("    - [{}] {}", alert.code, alert.message);
        }
    }

    if let Some(layout) = &result.layout {
        println!("\n  BUSES:");
        for bus in &layout.buses {
            if let Some(at) = bus.position {
                println!(
                    "    - {:<16} ({:>8.1}, {:>8.1})  length {:.1}",
                    bus.tag,
                    at.x,
                    at.y,
                    bus.visual_length.unwrap_or_default()
                );
            }
        }
        println!("\n  ELEMENTS:");
        for (tag, at) in &layout.element_coordinates {
            println!("    - {:<16} ({:>8.1}, {:>8.1})", tag, at.x, at.y);
        }
    }

    println!("\n  Summary:");
    println!("    Errors:   {}", result.stats.errors);
    println!("    Warnings: {}", result.stats.warnings);
    println!("    Info:     {}", result.stats.infos);
}

fn handle_codes(verbose: bool) {
    println!("Validation codes:\n");
    for code in IssueCode::ALL {
        println!("  {:<24} {:?}", code.as_str(), code.severity());
        if verbose {
            println!("    {}", code.description());
        }
    }

    println!("\nAlert codes:\n");
    for code in AlertCode::ALL {
        println!("  {}", code.as_str());
        if verbose {
            println!("    {}", code.description());
        }
    }
}
