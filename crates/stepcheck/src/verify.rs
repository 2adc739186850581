//! Verification entry points
//!
//! [`apply_artifact_rules`] and [`apply_attribute_rules`] check a single
//! statement. [`verify_step`] and [`verify_layout`] run both checks for every
//! attestation a layout step has in the claims index.
//!
//! ```text
//! statement --> extract --> snapshots --> reconcile --> materials pass --> products pass --> attributes
//! ```

use crate::config::VerifierConfig;
use crate::error::{Result, StepcheckError};
use crate::policy::{Layout, StepPolicy};
use crate::rules::artifacts::{ArtifactRuleEngine, ArtifactSnapshot, Reconciliation};
use crate::rules::matching::MatchRuleResolver;
use crate::rules::parse::{parse_rules, ArtifactRule};
use crate::rules::pathset::PathSet;
use crate::rules::predicate::extract_artifacts;
use crate::rules::types::{ArtifactKind, AttestationId, ClaimsIndex, Statement};
use serde::Serialize;

pub use crate::rules::attributes::apply_attribute_rules;

/// Paths left in the working sets after both artifact passes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArtifactOutcome {
    /// Materials no rule consumed
    pub unconsumed_materials: PathSet,
    /// Products no rule consumed
    pub unconsumed_products: PathSet,
}

/// Apply material and product rules to a statement.
///
/// Rules are parsed first; then the materials pass and the products pass run
/// in that order. `MATCH` rules resolve against `claims`.
///
/// # Errors
///
/// The first rule parse error, predicate decode error, or rule failure.
pub fn apply_artifact_rules<M, P>(
    statement: &Statement,
    material_rules: &[M],
    product_rules: &[P],
    claims: &ClaimsIndex,
    config: &VerifierConfig,
) -> Result<()>
where
    M: AsRef<str>,
    P: AsRef<str>,
{
    let material_rules = parse_rules(material_rules)?;
    let product_rules = parse_rules(product_rules)?;
    apply_parsed_artifact_rules(statement, &material_rules, &product_rules, claims, config)
        .map(|_| ())
}

pub(crate) fn apply_parsed_artifact_rules(
    statement: &Statement,
    material_rules: &[ArtifactRule],
    product_rules: &[ArtifactRule],
    claims: &ClaimsIndex,
    config: &VerifierConfig,
) -> Result<ArtifactOutcome> {
    let artifacts = extract_artifacts(statement)?;
    let materials = ArtifactSnapshot::from_descriptors(&artifacts.materials);
    let products = ArtifactSnapshot::from_descriptors(&artifacts.products);
    let reconciliation = Reconciliation::new(&materials, &products);
    let resolver = MatchRuleResolver::new(claims).with_strict_merge(config.strict_claim_merge);

    let unconsumed_materials = ArtifactRuleEngine::new(
        ArtifactKind::Materials,
        &materials,
        &reconciliation,
        &resolver,
    )
    .apply(material_rules, materials.paths())?;

    let unconsumed_products = ArtifactRuleEngine::new(
        ArtifactKind::Products,
        &products,
        &reconciliation,
        &resolver,
    )
    .apply(product_rules, products.paths())?;

    Ok(ArtifactOutcome {
        unconsumed_materials,
        unconsumed_products,
    })
}

/// Result of verifying one attestation.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttestationReport {
    /// Attestation identifier within the step
    pub id: AttestationId,
    /// Predicate type of the attestation
    pub predicate_type: String,
    /// Number of attribute constraints evaluated
    pub constraints_checked: usize,
    /// Materials no rule accounted for
    pub unconsumed_materials: Vec<String>,
    /// Products no rule accounted for
    pub unconsumed_products: Vec<String>,
}

/// Result of verifying every attestation of a step.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StepReport {
    /// Step name
    pub step: String,
    /// One entry per verified attestation, in id order
    pub attestations: Vec<AttestationReport>,
}

/// Verify every attestation recorded for `step`.
///
/// # Errors
///
/// `StepcheckError::MissingClaims` if the claims index has no attestation
/// for the step; otherwise the first verification error of any attestation.
pub fn verify_step(
    step: &StepPolicy,
    claims: &ClaimsIndex,
    config: &VerifierConfig,
) -> Result<StepReport> {
    let attestations = claims
        .get(&step.name)
        .filter(|a| !a.is_empty())
        .ok_or_else(|| StepcheckError::MissingClaims(step.name.clone()))?;

    let material_rules = step.material_rules()?;
    let product_rules = step.product_rules()?;

    let mut report = StepReport {
        step: step.name.clone(),
        attestations: Vec::with_capacity(attestations.len()),
    };

    for (id, statement) in attestations {
        tracing::info!(step = %step.name, attestation = %id, "verifying attestation");

        let outcome =
            apply_parsed_artifact_rules(statement, &material_rules, &product_rules, claims, config)
                .inspect_err(|e| {
                    tracing::warn!(step = %step.name, attestation = %id, error = %e, "artifact rules failed");
                })?;

        let constraints: Vec<_> = step
            .constraints_for(&statement.predicate_type)
            .cloned()
            .collect();
        if !constraints.is_empty() {
            apply_attribute_rules(&statement.predicate_type, &statement.predicate, &constraints)
                .inspect_err(|e| {
                    tracing::warn!(step = %step.name, attestation = %id, error = %e, "attribute rules failed");
                })?;
        }

        report.attestations.push(AttestationReport {
            id: id.clone(),
            predicate_type: statement.predicate_type.clone(),
            constraints_checked: constraints.len(),
            unconsumed_materials: outcome.unconsumed_materials.to_vec(),
            unconsumed_products: outcome.unconsumed_products.to_vec(),
        });
    }

    Ok(report)
}

/// Verify every step of a layout, in declaration order.
///
/// # Errors
///
/// The first error from [`verify_step`].
pub fn verify_layout(
    layout: &Layout,
    claims: &ClaimsIndex,
    config: &VerifierConfig,
) -> Result<Vec<StepReport>> {
    layout
        .steps
        .iter()
        .map(|step| verify_step(step, claims, config))
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::policy::load_layout_from_str;
    use crate::rules::types::{PredicateFields, ResourceDescriptor, LINK_PREDICATE_TYPE};
    use serde_json::json;

    fn rd(name: &str, digest: &str) -> ResourceDescriptor {
        ResourceDescriptor::new(name, "sha256", digest)
    }

    fn link(
        name: &str,
        materials: &[ResourceDescriptor],
        products: &[ResourceDescriptor],
    ) -> Statement {
        let serde_json::Value::Object(predicate) = json!({
            "name": name,
            "command": ["make"],
            "materials": materials,
        }) else {
            panic!("predicate must be an object");
        };
        Statement::new(LINK_PREDICATE_TYPE, predicate, products.to_vec())
    }

    fn index(entries: Vec<(&str, &str, Statement)>) -> ClaimsIndex {
        let mut claims = ClaimsIndex::new();
        for (step, id, statement) in entries {
            claims
                .entry(step.to_string())
                .or_default()
                .insert(AttestationId::from(id), statement);
        }
        claims
    }

    #[test]
    fn self_match_and_create_empty_products() {
        let statement = link(
            "build",
            &[rd("src/a", "1"), rd("src/b", "2")],
            &[rd("src/a", "1"), rd("out/a", "3")],
        );
        let claims = index(vec![("build", "run", statement.clone())]);
        let outcome = apply_parsed_artifact_rules(
            &statement,
            &parse_rules(&["ALLOW src/*"]).unwrap(),
            &parse_rules(&["MATCH src/* WITH MATERIALS FROM build", "CREATE out/*"]).unwrap(),
            &claims,
            &VerifierConfig::default(),
        )
        .unwrap();
        assert!(outcome.unconsumed_products.is_empty());
        assert!(outcome.unconsumed_materials.is_empty());
    }

    #[test]
    fn trailing_disallow_catches_leftovers() {
        let statement = link("build", &[rd("src/a", "1")], &[rd("src/a", "1"), rd("junk", "9")]);
        let claims = ClaimsIndex::new();
        let err = apply_artifact_rules(
            &statement,
            &["ALLOW *"],
            &["ALLOW src/*", "DISALLOW *"],
            &claims,
            &VerifierConfig::default(),
        )
        .unwrap_err();
        match err {
            StepcheckError::DisallowedArtifact { kind, paths, .. } => {
                assert_eq!(kind, ArtifactKind::Products);
                assert_eq!(paths, vec!["junk"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn materials_pass_failure_skips_products_pass() {
        let statement = link("build", &[rd("a", "1")], &[rd("b", "1")]);
        let err = apply_artifact_rules(
            &statement,
            &["DISALLOW a"],
            &["CREATE"],
            &ClaimsIndex::new(),
            &VerifierConfig::default(),
        )
        .unwrap_err();
        // Rules are parsed before either pass runs
        assert!(matches!(err, StepcheckError::RuleParse { .. }));

        let err = apply_artifact_rules(
            &statement,
            &["DISALLOW a"],
            &["DELETE b"],
            &ClaimsIndex::new(),
            &VerifierConfig::default(),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            StepcheckError::DisallowedArtifact {
                kind: ArtifactKind::Materials,
                ..
            }
        ));
    }

    #[test]
    fn strict_merge_flows_from_config() {
        let consumer = link("package", &[rd("app", "new")], &[]);
        let claims = index(vec![
            ("build", "1", link("build", &[], &[rd("app", "old")])),
            ("build", "2", link("build", &[], &[rd("app", "new")])),
        ]);
        let rules = ["MATCH app WITH PRODUCTS FROM build", "DISALLOW *"];

        apply_artifact_rules(&consumer, &rules, &[] as &[&str], &claims, &VerifierConfig::default())
            .unwrap();

        let strict = VerifierConfig {
            strict_claim_merge: true,
            ..VerifierConfig::default()
        };
        let err = apply_artifact_rules(&consumer, &rules, &[] as &[&str], &claims, &strict)
            .unwrap_err();
        assert!(matches!(err, StepcheckError::ConflictingClaims { .. }));
    }

    #[test]
    fn verify_step_checks_every_attestation() {
        let layout = load_layout_from_str(
            r#"{
                "version": 1,
                "steps": [{
                    "name": "build",
                    "expectedMaterials": ["ALLOW src/*", "DISALLOW *"],
                    "expectedProducts": ["CREATE dist/*", "DISALLOW *"],
                    "expectedPredicates": [{
                        "predicateType": "https://in-toto.io/attestation/link/v0.3",
                        "expectedAttributes": [{"rule": "'make' in command"}]
                    }]
                }]
            }"#,
        )
        .unwrap();
        let claims = index(vec![
            ("build", "a", link("build", &[rd("src/x", "1")], &[rd("dist/x", "2")])),
            ("build", "b", link("build", &[rd("src/y", "1")], &[rd("dist/y", "2")])),
        ]);

        let reports = verify_layout(&layout, &claims, &VerifierConfig::default()).unwrap();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].step, "build");
        assert_eq!(reports[0].attestations.len(), 2);
        assert_eq!(reports[0].attestations[0].id, AttestationId::from("a"));
        assert_eq!(reports[0].attestations[1].constraints_checked, 1);

        let mut bad_predicate = PredicateFields::new();
        bad_predicate.insert("command".to_string(), json!(["cargo"]));
        let claims = index(vec![(
            "build",
            "a",
            Statement::new(LINK_PREDICATE_TYPE, bad_predicate, vec![]),
        )]);
        let err = verify_step(layout.step("build").unwrap(), &claims, &VerifierConfig::default())
            .unwrap_err();
        assert!(matches!(err, StepcheckError::ConstraintNotSatisfied { .. }));
    }

    #[test]
    fn verify_step_without_claims_fails() {
        let layout =
            load_layout_from_str(r#"{"version": 1, "steps": [{"name": "deploy"}]}"#).unwrap();
        let err = verify_layout(&layout, &ClaimsIndex::new(), &VerifierConfig::default())
            .unwrap_err();
        assert!(matches!(err, StepcheckError::MissingClaims(ref s) if s == "deploy"));
    }

    #[test]
    fn report_lists_unconsumed_artifacts() {
        let layout = load_layout_from_str(
            r#"{"version": 1, "steps": [{"name": "build", "expectedProducts": ["CREATE dist/*"]}]}"#,
        )
        .unwrap();
        let claims = index(vec![(
            "build",
            "a",
            link("build", &[rd("src/x", "1")], &[rd("dist/x", "2"), rd("log.txt", "3")]),
        )]);
        let report =
            verify_step(layout.step("build").unwrap(), &claims, &VerifierConfig::default())
                .unwrap();
        let attestation = &report.attestations[0];
        assert_eq!(attestation.unconsumed_materials, vec!["src/x"]);
        assert_eq!(attestation.unconsumed_products, vec!["log.txt"]);
        assert_eq!(attestation.constraints_checked, 0);
    }
}
