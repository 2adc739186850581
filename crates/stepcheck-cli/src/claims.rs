//! Claims directory loading
//!
//! Attestations are read from a directory with one subdirectory per step and
//! one JSON statement per attestation:
//!
//! ```text
//! claims/
//!   clone/run-1.json
//!   build/run-1.json
//!   build/run-2.json
//! ```
//!
//! The file stem is the attestation id.

use stepcheck::rules::IN_TOTO_STATEMENT_TYPE;
use stepcheck::{AttestationId, ClaimsIndex, Result, Statement, StepcheckError};
use std::path::Path;

/// Load every attestation under `dir` into a claims index.
///
/// Entries that are not step directories or `.json` files are skipped.
///
/// # Errors
///
/// Returns `StepcheckError::Io` if a directory or file cannot be read, or
/// `StepcheckError::InvalidClaim` if a file is not a JSON statement.
pub fn load_claims_dir(dir: &Path) -> Result<ClaimsIndex> {
    let mut claims = ClaimsIndex::new();

    for entry in std::fs::read_dir(dir)? {
        let step_dir = entry?.path();
        if !step_dir.is_dir() {
            tracing::debug!(path = %step_dir.display(), "skipping non-directory entry");
            continue;
        }
        let Some(step) = step_dir.file_name().and_then(|n| n.to_str()) else {
            continue;
        };

        let attestations = claims.entry(step.to_string()).or_default();
        for file in std::fs::read_dir(&step_dir)? {
            let path = file?.path();
            if !path.is_file() || path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(id) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let statement = load_statement(&path)?;
            tracing::debug!(step, attestation = id, predicate_type = %statement.predicate_type, "loaded claim");
            attestations.insert(AttestationId::from(id), statement);
        }
    }

    Ok(claims)
}

fn load_statement(path: &Path) -> Result<Statement> {
    let content = std::fs::read_to_string(path)?;
    let statement: Statement =
        serde_json::from_str(&content).map_err(|e| StepcheckError::InvalidClaim {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
    if statement.statement_type != IN_TOTO_STATEMENT_TYPE {
        tracing::warn!(
            path = %path.display(),
            statement_type = %statement.statement_type,
            "unexpected statement type"
        );
    }
    Ok(statement)
}
