use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use biffcross_lib::diagnostics::{self, ConfigDiagnostics};
use biffcross_lib::loader::{ConfigLoader, ConfigSource, HttpFetcher, LoaderSettings};
use biffcross_lib::validate::{validate_document, ValidationReport};

#[derive(Debug, Parser)]
#[command(name = "biffcross", about = "Portfolio configuration tooling", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Inspect and check the shared portfolio configuration document.
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[derive(Debug, Subcommand)]
enum ConfigCommand {
    /// Load the remote document and report where it came from.
    Status {
        /// Emit a machine-readable JSON report.
        #[arg(long)]
        json: bool,
    },
    /// Validate a local configuration file without touching the bucket.
    Validate {
        /// Path to a JSON document; runs migration before validation.
        file: PathBuf,
        #[arg(long)]
        json: bool,
    },
    /// Fetch the raw remote bytes and classify why loading fails.
    Diagnose {
        #[arg(long)]
        json: bool,
    },
}

fn main() {
    biffcross_lib::init_logging();

    let cli = Cli::parse();
    match handle_cli(cli.command) {
        Ok(code) => process::exit(code),
        Err(err) => {
            eprintln!("Error: {err:#}");
            process::exit(1);
        }
    }
}

fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Runtime::new().context("start async runtime")
}

fn handle_cli(command: Commands) -> Result<i32> {
    match command {
        Commands::Config(config) => handle_config_command(config),
    }
}

fn handle_config_command(command: ConfigCommand) -> Result<i32> {
    match command {
        ConfigCommand::Status { json } => {
            let settings = LoaderSettings::from_env().map_err(anyhow::Error::from)?;
            let fetcher = Arc::new(HttpFetcher::new());
            let loader = ConfigLoader::new(settings.clone(), fetcher.clone());

            let rt = runtime()?;
            match rt.block_on(loader.load()) {
                Ok(outcome) => {
                    if json {
                        let payload = serde_json::json!({
                            "source": source_label(outcome.source),
                            "categories": outcome.config.categories.len(),
                            "images": outcome.config.images.len(),
                        });
                        println!("{}", serde_json::to_string_pretty(&payload)?);
                    } else {
                        println!("Configuration status");
                        println!("Document URL : {}", settings.document_url());
                        println!("Source       : {}", source_label(outcome.source));
                        println!("Categories   : {}", outcome.config.categories.len());
                        println!("Images       : {}", outcome.config.images.len());
                    }
                    Ok(0)
                }
                Err(err) => {
                    // Loading failed in a way defaults cannot paper over;
                    // fall through to diagnostics for a usable explanation.
                    eprintln!("Load failed: {err}");
                    let report = rt.block_on(diagnostics::diagnose(fetcher.as_ref(), &settings));
                    print_diagnostics(&report, json)?;
                    Ok(1)
                }
            }
        }
        ConfigCommand::Validate { file, json } => {
            let raw = std::fs::read_to_string(&file)
                .with_context(|| format!("read {}", file.display()))?;
            let parsed: serde_json::Value = match serde_json::from_str(&raw) {
                Ok(value) => value,
                Err(err) => {
                    let report = ValidationReport {
                        is_valid: false,
                        errors: vec![format!(
                            "not valid JSON (line {}, column {}): {err}",
                            err.line(),
                            err.column()
                        )],
                    };
                    print_validation(&report, json)?;
                    return Ok(1);
                }
            };
            let report = validate_document(&biffcross_lib::migrate::migrate(parsed));
            let code = if report.is_valid { 0 } else { 1 };
            print_validation(&report, json)?;
            Ok(code)
        }
        ConfigCommand::Diagnose { json } => {
            let settings = LoaderSettings::from_env().map_err(anyhow::Error::from)?;
            let fetcher = HttpFetcher::new();
            let report = runtime()?.block_on(diagnostics::diagnose(&fetcher, &settings));
            let healthy = report.accessible && report.has_valid_json;
            print_diagnostics(&report, json)?;
            Ok(if healthy { 0 } else { 1 })
        }
    }
}

fn source_label(source: ConfigSource) -> &'static str {
    match source {
        ConfigSource::Remote => "remote",
        ConfigSource::DefaultMissing => "default (no remote document)",
        ConfigSource::DefaultUnreachable => "default (storage unreachable)",
    }
}

fn print_validation(report: &ValidationReport, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }
    if report.is_valid {
        println!("Document is valid.");
    } else {
        println!("Document is invalid ({} problems):", report.errors.len());
        for error in &report.errors {
            println!("  - {error}");
        }
    }
    Ok(())
}

fn print_diagnostics(report: &ConfigDiagnostics, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }
    println!("Configuration diagnostics");
    println!("Accessible     : {}", if report.accessible { "yes" } else { "no" });
    println!(
        "Valid JSON     : {}",
        if report.has_valid_json { "yes" } else { "no" }
    );
    println!("Content length : {}", report.content_length);
    if let Some(json_error) = &report.json_error {
        println!("JSON error     : {json_error}");
    }
    if !report.suggestions.is_empty() {
        println!("\nSuggestions:");
        for suggestion in &report.suggestions {
            println!("  - {suggestion}");
        }
    }
    Ok(())
}
