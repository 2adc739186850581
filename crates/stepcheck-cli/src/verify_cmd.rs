//! CLI commands for layout verification
//!
//! Implements `stepcheck verify|lint|rule`.

use crate::claims::load_claims_dir;
use crate::cli::{LintArgs, RuleArgs, VerifyArgs};
use colored::Colorize;
use stepcheck::rules::parse_rules;
use stepcheck::{
    load_config_from_file, load_layout_from_file, verify_step, Layout, Result, StepPolicy,
    StepReport, StepcheckError, VerifierConfig,
};
use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// verify
// ---------------------------------------------------------------------------

pub fn run_verify(args: VerifyArgs) -> Result<()> {
    let user_config = dirs::config_dir().map(|d| d.join("stepcheck").join("config.json"));
    let config = resolve_config(args.config.as_deref(), user_config, args.strict_merge)?;
    let layout = load_layout_from_file(&args.layout)?;
    let claims = load_claims_dir(&args.claims)?;
    let steps = select_steps(&layout, &args.steps)?;

    if steps.is_empty() {
        eprintln!("Layout defines no steps to verify.");
        return Ok(());
    }

    let mut reports = Vec::with_capacity(steps.len());
    for step in steps {
        match verify_step(step, &claims, &config) {
            Ok(report) => {
                print_step_report(&report);
                reports.push(report);
            }
            Err(e) => {
                eprintln!("  {} {}", "FAILED".red(), step.name);
                eprintln!("    Reason: {e}");
                eprintln!();
                eprintln!(
                    "{}",
                    format!("Verified {} step(s) before failure.", reports.len()).yellow()
                );
                return Err(e);
            }
        }
    }

    eprintln!();
    eprintln!(
        "{}",
        format!("Verified {} step(s) successfully.", reports.len()).green()
    );

    if args.json {
        let output = serde_json::to_string_pretty(&reports)
            .map_err(|e| StepcheckError::Config(format!("JSON serialization failed: {e}")))?;
        println!("{output}");
    }

    Ok(())
}

fn print_step_report(report: &StepReport) {
    eprintln!(
        "  {} {} ({} attestation(s))",
        "VERIFIED".green(),
        report.step,
        report.attestations.len()
    );
    for attestation in &report.attestations {
        for path in &attestation.unconsumed_materials {
            eprintln!(
                "    {} {}: material '{path}' not covered by any rule",
                "note".yellow(),
                attestation.id
            );
        }
        for path in &attestation.unconsumed_products {
            eprintln!(
                "    {} {}: product '{path}' not covered by any rule",
                "note".yellow(),
                attestation.id
            );
        }
    }
}

/// Layout steps to verify, in layout order.
fn select_steps<'a>(layout: &'a Layout, names: &[String]) -> Result<Vec<&'a StepPolicy>> {
    if names.is_empty() {
        return Ok(layout.steps.iter().collect());
    }
    if let Some(unknown) = names.iter().find(|n| layout.step(n).is_none()) {
        return Err(StepcheckError::Policy(format!(
            "step '{unknown}' is not defined in the layout"
        )));
    }
    Ok(layout
        .steps
        .iter()
        .filter(|s| names.contains(&s.name))
        .collect())
}

/// Resolve the verifier configuration.
///
/// An explicit path must exist. Otherwise the user configuration file is used
/// if present, falling back to defaults. `strict_merge` forces strict claim
/// merging regardless of the file.
fn resolve_config(
    explicit: Option<&Path>,
    user_config: Option<PathBuf>,
    strict_merge: bool,
) -> Result<VerifierConfig> {
    let mut config = match (explicit, user_config) {
        (Some(path), _) => load_config_from_file(path)?,
        (None, Some(path)) if path.exists() => {
            tracing::debug!(path = %path.display(), "using user configuration");
            load_config_from_file(&path)?
        }
        _ => VerifierConfig::default(),
    };
    if strict_merge {
        config.strict_claim_merge = true;
    }
    Ok(config)
}

// ---------------------------------------------------------------------------
// lint
// ---------------------------------------------------------------------------

pub fn run_lint(args: LintArgs) -> Result<()> {
    let layout = load_layout_from_file(&args.layout)?;

    for step in &layout.steps {
        eprintln!("{}", step.name.bold());
        print_rules("materials", &step.material_rules()?);
        print_rules("products", &step.product_rules()?);
        for expected in &step.expected_predicates {
            eprintln!("  {}: {}", "predicate".bold(), expected.predicate_type);
            for constraint in &expected.expected_attributes {
                let suffix = if constraint.allow_if_no_claim {
                    " (allowed if not claimed)".dimmed().to_string()
                } else {
                    String::new()
                };
                eprintln!("    {}{suffix}", constraint.rule);
            }
        }
    }

    eprintln!();
    eprintln!(
        "{}",
        format!("Layout OK: {} step(s).", layout.steps.len()).green()
    );
    Ok(())
}

fn print_rules(label: &str, rules: &[stepcheck::ArtifactRule]) {
    if rules.is_empty() {
        return;
    }
    eprintln!("  {}:", label.bold());
    for rule in rules {
        eprintln!("    {rule}");
    }
}

// ---------------------------------------------------------------------------
// rule
// ---------------------------------------------------------------------------

pub fn run_rule(args: RuleArgs) -> Result<()> {
    let parsed = parse_rules(&args.rules)?;
    let output = serde_json::to_string_pretty(&parsed)
        .map_err(|e| StepcheckError::Config(format!("JSON serialization failed: {e}")))?;
    println!("{output}");
    Ok(())
}
