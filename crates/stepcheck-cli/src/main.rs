//! stepcheck: verify supply-chain attestations against a layout

mod claims;
mod cli;
mod verify_cmd;

use clap::Parser;
use cli::{Cli, Commands};
use colored::Colorize;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.log_level.as_deref());

    let result = match cli.command {
        Commands::Verify(args) => verify_cmd::run_verify(args),
        Commands::Lint(args) => verify_cmd::run_lint(args),
        Commands::Rule(args) => verify_cmd::run_rule(args),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {e}", "error:".red().bold());
            ExitCode::FAILURE
        }
    }
}

/// Log to stderr; `--log-level` takes precedence over `RUST_LOG`, default `warn`.
fn init_tracing(level: Option<&str>) {
    let filter = match level {
        Some(level) => EnvFilter::try_new(level).ok(),
        None => EnvFilter::try_from_default_env().ok(),
    }
    .unwrap_or_else(|| EnvFilter::new("warn"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
