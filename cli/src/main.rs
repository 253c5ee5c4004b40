mod console;
mod http;
mod interrupt;
mod scanner;

use anyhow::Context;
use clap::{ArgAction, Parser, Subcommand};
use console::{ConsoleObserver, RunReport};
use http::HttpTransport;
use scanner::DirectoryListingScanner;
use serde_json::json;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;
use vigil_core::{
    validate_script, Diagnostic, DiagnosticLevel, RunError, RunOutcome, Runner, RunnerConfig,
    Script, ScriptSummary,
};

#[derive(Debug, Parser)]
#[command(author, version, about = "Vigil scripted security-test runner")]
struct VigilCli {
    /// Log at debug level (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Validate a script and print its summary
    Plan {
        /// Path to the script (JSON, or YAML with a .yaml/.yml extension)
        input: PathBuf,
        /// Output JSON instead of a human-readable summary
        #[arg(long)]
        json: bool,
        /// Supply a script parameter (format: key=value). Repeat for multiple parameters.
        #[arg(long = "param", value_parser = parse_key_val, value_name = "KEY=VALUE", action = ArgAction::Append)]
        params: Vec<(String, String)>,
    },
    /// Run a script against its targets
    Run {
        /// Path to the script (JSON, or YAML with a .yaml/.yml extension)
        input: PathBuf,
        /// Output JSON instead of tables
        #[arg(long)]
        json: bool,
        /// Supply a script parameter (format: key=value). Repeat for multiple parameters.
        #[arg(long = "param", value_parser = parse_key_val, value_name = "KEY=VALUE", action = ArgAction::Append)]
        params: Vec<(String, String)>,
        /// Runner configuration file
        #[arg(long)]
        config: Option<PathBuf>,
        /// Send traffic through this proxy (host:port)
        #[arg(long)]
        proxy: Option<String>,
        /// Per-request timeout in seconds
        #[arg(long, default_value_t = 30)]
        timeout: u64,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = VigilCli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Command::Plan {
            input,
            json,
            params,
        } => {
            let script = load_script(&input)?;
            let params: BTreeMap<String, String> = params.into_iter().collect();
            let diagnostics = validate_script(&script);
            let has_errors = output_plan(&script, &diagnostics, &params, json)?;
            if has_errors {
                anyhow::bail!("validation failed");
            }
        }
        Command::Run {
            input,
            json,
            params,
            config,
            proxy,
            timeout,
        } => {
            let script = load_script(&input)?;
            let params: BTreeMap<String, String> = params.into_iter().collect();

            let diagnostics = validate_script(&script);
            if diagnostics.iter().any(Diagnostic::is_error) {
                print_diagnostics(&diagnostics);
                anyhow::bail!("validation failed");
            }

            let mut config = match config {
                Some(path) => load_config(&path)?,
                None => RunnerConfig::default(),
            };
            if proxy.is_some() {
                config.proxy = proxy;
            }

            let transport = Arc::new(HttpTransport::new(
                config.proxy.as_deref(),
                Duration::from_secs(timeout),
            )?);
            let scanner = Arc::new(DirectoryListingScanner::new(transport.clone())?);
            let observer = Arc::new(ConsoleObserver::new());

            let mut builder = Runner::builder(transport, observer.clone())
                .config(config)
                .scanner(scanner);
            if !json {
                builder = builder.output_writer(Box::new(std::io::stdout()));
            }
            let runner = builder.build();
            interrupt::stop_on_interrupt(runner.handle())
                .context("failed to install the Ctrl-C handler")?;

            let outcome = runner.run(&script, &params);
            output_run(&script.summary(), outcome, observer.report(), json)?;
        }
    }

    Ok(())
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn is_yaml(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|ext| ext.to_str()),
        Some("yaml") | Some("yml")
    )
}

fn load_script(path: &Path) -> anyhow::Result<Script> {
    let content =
        fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    let script = if is_yaml(path) {
        serde_yaml::from_str(&content)?
    } else {
        serde_json::from_str(&content)?
    };
    Ok(script)
}

fn load_config(path: &Path) -> anyhow::Result<RunnerConfig> {
    let content =
        fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    let config = if is_yaml(path) {
        serde_yaml::from_str(&content)?
    } else {
        serde_json::from_str(&content)?
    };
    Ok(config)
}

fn output_plan(
    script: &Script,
    diagnostics: &[Diagnostic],
    params: &BTreeMap<String, String>,
    json: bool,
) -> anyhow::Result<bool> {
    let has_errors = diagnostics.iter().any(Diagnostic::is_error);
    let summary = script.summary();
    let missing = script.parameters.missing(params);

    if json {
        let payload = json!({
            "summary": summary,
            "diagnostics": diagnostics,
            "missing_parameters": missing,
        });
        println!("{}", serde_json::to_string_pretty(&payload)?);
    } else {
        if !diagnostics.is_empty() {
            print_diagnostics(diagnostics);
        }
        println!("{summary}");
        if !missing.is_empty() {
            println!("Missing parameters (--param): {}", missing.join(", "));
        }
    }

    Ok(has_errors)
}

fn output_run(
    summary: &ScriptSummary,
    outcome: Result<RunOutcome, RunError>,
    report: RunReport,
    json: bool,
) -> anyhow::Result<()> {
    if let Ok(RunOutcome::NeedsParameters { missing }) = &outcome {
        anyhow::bail!(
            "script needs parameters: {} (supply them with --param KEY=VALUE)",
            missing.join(", ")
        );
    }

    if json {
        let (status, error) = match &outcome {
            Ok(RunOutcome::Stopped) => ("stopped", None),
            Ok(_) => ("completed", None),
            Err(err) => ("failed", Some(err.to_string())),
        };
        let payload = json!({
            "summary": summary,
            "status": status,
            "error": error,
            "output": outcome.as_ref().ok().and_then(RunOutcome::output),
            "results": report.results,
            "findings": report.findings,
            "assign_failures": report.assign_failures,
        });
        println!("{}", serde_json::to_string_pretty(&payload)?);
    } else {
        println!("\n{summary}");
        if !report.results.is_empty() {
            println!("{}", report.results_table());
        }
        if !report.findings.is_empty() {
            println!("\nFindings:");
            println!("{}", report.findings_table());
        }
        if !report.assign_failures.is_empty() {
            println!("\nAssignment failures:");
            for message in &report.assign_failures {
                println!("  - {message}");
            }
        }
        if report.has_failures() {
            println!("\n[warn] some checks failed");
        }
    }

    match outcome {
        Ok(RunOutcome::Stopped) => {
            info!("run stopped");
            Ok(())
        }
        Ok(_) => Ok(()),
        Err(err) => Err(err.into()),
    }
}

fn print_diagnostics(diagnostics: &[Diagnostic]) {
    if diagnostics.is_empty() {
        return;
    }

    println!("Diagnostics:");
    for diagnostic in diagnostics {
        let level = match diagnostic.level {
            DiagnosticLevel::Error => "error",
            DiagnosticLevel::Warning => "warn",
        };
        match &diagnostic.location {
            Some(location) => println!("  - [{level}] {location}: {}", diagnostic.message),
            None => println!("  - [{level}] {}", diagnostic.message),
        }
    }
    println!();
}

fn parse_key_val(s: &str) -> Result<(String, String), String> {
    let parts: Vec<&str> = s.splitn(2, '=').collect();
    if parts.len() != 2 || parts[0].trim().is_empty() {
        return Err(format!("expected KEY=VALUE, got '{s}'"));
    }
    Ok((parts[0].trim().to_string(), parts[1].to_string()))
}
