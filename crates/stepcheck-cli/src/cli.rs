//! Command-line argument definitions

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Verify supply-chain attestations against a layout.
#[derive(Debug, Parser)]
#[command(name = "stepcheck", version, about)]
pub struct Cli {
    /// Log filter, e.g. `info` or `stepcheck=debug` (overrides RUST_LOG)
    #[arg(long, global = true, value_name = "FILTER")]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Verify recorded attestations against a layout
    Verify(VerifyArgs),
    /// Parse every rule in a layout and print its canonical form
    Lint(LintArgs),
    /// Parse rule strings and print their structured form as JSON
    Rule(RuleArgs),
}

#[derive(Debug, Args)]
pub struct VerifyArgs {
    /// Layout file
    #[arg(long, value_name = "FILE")]
    pub layout: PathBuf,

    /// Claims directory laid out as <dir>/<step>/<attestation-id>.json
    #[arg(long, value_name = "DIR")]
    pub claims: PathBuf,

    /// Only verify these steps (repeatable; default: every step in the layout)
    #[arg(long = "step", value_name = "NAME")]
    pub steps: Vec<String>,

    /// Verifier configuration file (default: <config dir>/stepcheck/config.json)
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Fail when attestations of one step disagree on an artifact digest
    #[arg(long)]
    pub strict_merge: bool,

    /// Print step reports as JSON on stdout
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct LintArgs {
    /// Layout file
    #[arg(long, value_name = "FILE")]
    pub layout: PathBuf,
}

#[derive(Debug, Args)]
pub struct RuleArgs {
    /// Rule strings, e.g. "MATCH src/* WITH PRODUCTS FROM clone"
    #[arg(required = true, value_name = "RULE")]
    pub rules: Vec<String>,
}
