//! Layout loading
//!
//! A layout lists the steps of a supply chain and, per step, the artifact
//! rules for its materials and products plus attribute constraints per
//! predicate type:
//!
//! ```json
//! {
//!   "version": 1,
//!   "steps": [{
//!     "name": "build",
//!     "expectedMaterials": ["MATCH * WITH PRODUCTS FROM clone", "DISALLOW *"],
//!     "expectedProducts": ["CREATE dist/*", "DISALLOW *"],
//!     "expectedPredicates": [{
//!       "predicateType": "https://in-toto.io/attestation/link/v0.3",
//!       "expectedAttributes": [{"rule": "'make' in command"}]
//!     }]
//!   }]
//! }
//! ```
//!
//! Rule strings and predicate types are validated at load time so a broken
//! layout is rejected before any attestation is looked at.

use crate::error::{Result, StepcheckError};
use crate::rules::attributes::schema_for;
use crate::rules::parse::{parse_rules, ArtifactRule};
use crate::rules::types::Constraint;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

/// Current layout format version.
pub const LAYOUT_VERSION: u32 = 1;

/// A supply-chain layout.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Layout {
    /// Layout format version
    pub version: u32,
    /// Steps in declaration order
    pub steps: Vec<StepPolicy>,
}

/// Expectations for one step.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepPolicy {
    /// Step name, as used in claims and `MATCH ... FROM <step>`
    pub name: String,
    /// Rules for the step's materials
    #[serde(default)]
    pub expected_materials: Vec<String>,
    /// Rules for the step's products
    #[serde(default)]
    pub expected_products: Vec<String>,
    /// Attribute constraints, selected by the attestation's predicate type
    #[serde(default)]
    pub expected_predicates: Vec<ExpectedPredicate>,
}

/// Attribute constraints for attestations of one predicate type.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpectedPredicate {
    /// Predicate type URI the constraints apply to
    pub predicate_type: String,
    /// Constraints evaluated in order
    #[serde(default)]
    pub expected_attributes: Vec<Constraint>,
}

impl Layout {
    /// Look up a step by name.
    #[must_use]
    pub fn step(&self, name: &str) -> Option<&StepPolicy> {
        self.steps.iter().find(|s| s.name == name)
    }

    fn validate(&self) -> Result<()> {
        if self.version != LAYOUT_VERSION {
            return Err(StepcheckError::Policy(format!(
                "unsupported layout version {} (expected {LAYOUT_VERSION})",
                self.version
            )));
        }

        let mut seen = HashSet::new();
        for step in &self.steps {
            if step.name.trim().is_empty() {
                return Err(StepcheckError::Policy("step with empty name".to_string()));
            }
            if !seen.insert(step.name.as_str()) {
                return Err(StepcheckError::Policy(format!(
                    "step '{}' is defined more than once",
                    step.name
                )));
            }
            step.material_rules()?;
            step.product_rules()?;
            for expected in &step.expected_predicates {
                schema_for(&expected.predicate_type)?;
            }
        }
        Ok(())
    }
}

impl StepPolicy {
    /// Parsed material rules.
    ///
    /// # Errors
    ///
    /// Returns `StepcheckError::RuleParse` for the first malformed rule.
    pub fn material_rules(&self) -> Result<Vec<ArtifactRule>> {
        parse_rules(&self.expected_materials)
    }

    /// Parsed product rules.
    ///
    /// # Errors
    ///
    /// Returns `StepcheckError::RuleParse` for the first malformed rule.
    pub fn product_rules(&self) -> Result<Vec<ArtifactRule>> {
        parse_rules(&self.expected_products)
    }

    /// Constraints that apply to attestations of `predicate_type`.
    pub fn constraints_for<'a>(
        &'a self,
        predicate_type: &'a str,
    ) -> impl Iterator<Item = &'a Constraint> + 'a {
        self.expected_predicates
            .iter()
            .filter(move |e| e.predicate_type == predicate_type)
            .flat_map(|e| e.expected_attributes.iter())
    }
}

/// Parse and validate a layout from a JSON string.
///
/// # Errors
///
/// Returns `StepcheckError::Policy` for malformed JSON, an unsupported
/// version, or duplicate step names; `StepcheckError::RuleParse` for a
/// malformed rule; `StepcheckError::UnsupportedPredicateType` for constraints
/// on a predicate type without an attribute schema.
pub fn load_layout_from_str(json: &str) -> Result<Layout> {
    let layout: Layout = serde_json::from_str(json)
        .map_err(|e| StepcheckError::Policy(format!("failed to parse layout: {e}")))?;
    layout.validate()?;
    Ok(layout)
}

/// Parse and validate a layout from a JSON file.
///
/// # Errors
///
/// Returns `StepcheckError::Io` if the file cannot be read, otherwise as
/// [`load_layout_from_str`].
pub fn load_layout_from_file<P: AsRef<Path>>(path: P) -> Result<Layout> {
    let content = std::fs::read_to_string(path.as_ref())?;
    load_layout_from_str(&content)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::rules::types::{LINK_PREDICATE_TYPE, TEST_RESULT_PREDICATE_TYPE};

    const LAYOUT: &str = r#"{
        "version": 1,
        "steps": [
            {
                "name": "clone",
                "expectedProducts": ["CREATE *"]
            },
            {
                "name": "build",
                "expectedMaterials": ["MATCH * WITH PRODUCTS FROM clone", "DISALLOW *"],
                "expectedProducts": ["CREATE dist/*", "DISALLOW *"],
                "expectedPredicates": [
                    {
                        "predicateType": "https://in-toto.io/attestation/link/v0.3",
                        "expectedAttributes": [
                            {"rule": "'make' in command"},
                            {"rule": "environment.CI == 'true'", "allowIfNoClaim": true}
                        ]
                    },
                    {
                        "predicateType": "https://in-toto.io/attestation/test-result/v0.1",
                        "expectedAttributes": [{"rule": "result == 'PASSED'"}]
                    }
                ]
            }
        ]
    }"#;

    #[test]
    fn load_valid_layout() {
        let layout = load_layout_from_str(LAYOUT).unwrap();
        assert_eq!(layout.steps.len(), 2);

        let build = layout.step("build").unwrap();
        assert_eq!(build.material_rules().unwrap().len(), 2);
        assert_eq!(build.product_rules().unwrap()[0].to_string(), "CREATE dist/*");

        let clone = layout.step("clone").unwrap();
        assert!(clone.expected_materials.is_empty());
        assert!(clone.expected_predicates.is_empty());
        assert!(layout.step("deploy").is_none());
    }

    #[test]
    fn constraints_selected_by_predicate_type() {
        let layout = load_layout_from_str(LAYOUT).unwrap();
        let build = layout.step("build").unwrap();

        let link: Vec<_> = build.constraints_for(LINK_PREDICATE_TYPE).collect();
        assert_eq!(link.len(), 2);
        assert!(link[1].allow_if_no_claim);

        let tests: Vec<_> = build.constraints_for(TEST_RESULT_PREDICATE_TYPE).collect();
        assert_eq!(tests.len(), 1);

        assert_eq!(build.constraints_for("https://example.com/other").count(), 0);
    }

    #[test]
    fn malformed_rule_rejected_at_load() {
        let json = r#"{"version": 1, "steps": [{"name": "a", "expectedProducts": ["CREATE"]}]}"#;
        let err = load_layout_from_str(json).unwrap_err();
        assert!(matches!(err, StepcheckError::RuleParse { .. }));
    }

    #[test]
    fn duplicate_step_rejected() {
        let json = r#"{"version": 1, "steps": [{"name": "a"}, {"name": "a"}]}"#;
        let err = load_layout_from_str(json).unwrap_err();
        assert!(err.to_string().contains("more than once"));
    }

    #[test]
    fn unsupported_predicate_type_rejected() {
        let json = r#"{"version": 1, "steps": [{
            "name": "a",
            "expectedPredicates": [{"predicateType": "https://example.com/x", "expectedAttributes": []}]
        }]}"#;
        let err = load_layout_from_str(json).unwrap_err();
        assert!(matches!(err, StepcheckError::UnsupportedPredicateType(_)));
    }

    #[test]
    fn wrong_version_rejected() {
        let err = load_layout_from_str(r#"{"version": 3, "steps": []}"#).unwrap_err();
        assert!(matches!(err, StepcheckError::Policy(_)));
    }

    #[test]
    fn malformed_json_rejected() {
        let err = load_layout_from_str("{not json").unwrap_err();
        assert!(matches!(err, StepcheckError::Policy(_)));
    }

    #[test]
    fn load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("layout.json");
        std::fs::write(&path, LAYOUT).unwrap();
        assert_eq!(load_layout_from_file(&path).unwrap().steps.len(), 2);
    }
}
