//! codeclean CLI entry point
//!
//! Loads an optional TOML config, runs one scan and prints the result as
//! JSON on stdout. Logs go to stderr (`RUST_LOG=codeclean_engine=debug`).

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use codeclean_engine::lint::ClippyTool;
use codeclean_engine::{scan, EngineError, Lang, ScanConfig, ScanRequest, Severity};

#[derive(Parser, Debug)]
#[command(name = "codeclean", version, about = "Scan source trees for clean-code issues")]
struct Args {
    /// Files or directories to scan
    #[arg(required = true)]
    roots: Vec<PathBuf>,

    /// TOML configuration file
    #[arg(short, long, env = "CODECLEAN_CONFIG")]
    config: Option<PathBuf>,

    /// Worker threads (default: min(cores, 8))
    #[arg(short, long)]
    workers: Option<usize>,

    /// Only scan these languages (repeatable)
    #[arg(long = "lang", value_parser = parse_lang)]
    languages: Vec<Lang>,

    /// Extra gitignore-style exclude patterns (repeatable)
    #[arg(long)]
    exclude: Vec<String>,

    /// Extra gitignore-style patterns marking test files (repeatable)
    #[arg(long = "test-pattern")]
    test_patterns: Vec<String>,

    /// Cancel the scan after this many seconds
    #[arg(long)]
    timeout_secs: Option<u64>,

    /// Also run `cargo clippy` on roots containing Cargo.toml
    #[arg(long)]
    clippy: bool,

    /// Exit with status 1 when a finding at or above this severity exists
    #[arg(long, default_value = "high", value_parser = parse_severity)]
    fail_on: Severity,
}

fn parse_lang(s: &str) -> Result<Lang, String> {
    s.parse()
}

fn parse_severity(s: &str) -> Result<Severity, String> {
    s.parse()
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    match run(&args) {
        Ok(exceeded) if exceeded => ExitCode::from(1),
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            match e.downcast_ref::<EngineError>() {
                Some(engine) => engine.exit_code(),
                None => ExitCode::from(2),
            }
        }
    }
}

/// Returns whether any finding reached `--fail-on`
fn run(args: &Args) -> anyhow::Result<bool> {
    let mut request = ScanRequest::new(args.roots.iter().cloned());

    if let Some(path) = &args.config {
        let config = ScanConfig::from_file(path)?;
        request = request.with_scan_config(&config)?;
    }
    if let Some(workers) = args.workers {
        request = request.with_workers(workers);
    }
    if !args.languages.is_empty() {
        request = request.with_languages(args.languages.clone());
    }
    if !args.exclude.is_empty() || !args.test_patterns.is_empty() {
        let mut walk = request.walk.clone();
        walk.exclude.extend(args.exclude.iter().cloned());
        walk.test_patterns.extend(args.test_patterns.iter().cloned());
        request = request.with_walk(walk);
    }
    if let Some(secs) = args.timeout_secs {
        request = request.with_timeout(Duration::from_secs(secs));
    }
    if args.clippy {
        request = request.with_tool(Arc::new(ClippyTool));
    }

    let result = scan(request)?;
    let json = serde_json::to_string_pretty(&result).context("serializing scan result")?;
    println!("{json}");

    Ok(result.max_severity().is_some_and(|max| max >= args.fail_on))
}
