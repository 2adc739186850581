//! Verifier configuration
//!
//! A small JSON document controlling behavior the rule language leaves open:
//!
//! ```json
//! { "version": 1, "strictClaimMerge": false }
//! ```

use crate::error::{Result, StepcheckError};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Current configuration format version.
pub const CONFIG_VERSION: u32 = 1;

/// Options applied to every verification run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct VerifierConfig {
    /// Configuration format version
    #[serde(default = "default_version")]
    pub version: u32,
    /// Fail `MATCH` resolution when attestations of one step disagree on an
    /// artifact digest, instead of keeping the later attestation's record
    #[serde(default)]
    pub strict_claim_merge: bool,
}

fn default_version() -> u32 {
    CONFIG_VERSION
}

impl Default for VerifierConfig {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            strict_claim_merge: false,
        }
    }
}

impl VerifierConfig {
    fn validate_version(&self) -> Result<()> {
        if self.version != CONFIG_VERSION {
            return Err(StepcheckError::Config(format!(
                "unsupported configuration version {} (expected {CONFIG_VERSION})",
                self.version
            )));
        }
        Ok(())
    }
}

/// Parse a verifier configuration from a JSON string.
///
/// # Errors
///
/// Returns `StepcheckError::Config` if the JSON is malformed, has unknown
/// keys, or declares an unsupported version.
pub fn load_config_from_str(json: &str) -> Result<VerifierConfig> {
    let config: VerifierConfig = serde_json::from_str(json)
        .map_err(|e| StepcheckError::Config(format!("failed to parse configuration: {e}")))?;
    config.validate_version()?;
    Ok(config)
}

/// Parse a verifier configuration from a JSON file.
///
/// # Errors
///
/// Returns `StepcheckError::Io` if the file cannot be read, or
/// `StepcheckError::Config` if its content is invalid.
pub fn load_config_from_file<P: AsRef<Path>>(path: P) -> Result<VerifierConfig> {
    let content = std::fs::read_to_string(path.as_ref())?;
    load_config_from_str(&content)
}
