//! Multi-step layout verification through the public API.

#![allow(clippy::unwrap_used)]

use serde_json::json;
use stepcheck::rules::{LINK_PREDICATE_TYPE, PROVENANCE_PREDICATE_TYPE, TEST_RESULT_PREDICATE_TYPE};
use stepcheck::{
    apply_artifact_rules, apply_attribute_rules, load_layout_from_str, verify_layout,
    AttestationId, ClaimsIndex, Constraint, ResourceDescriptor, Statement, StepcheckError,
    VerifierConfig,
};

const LAYOUT: &str = r#"{
    "version": 1,
    "steps": [
        {
            "name": "clone",
            "expectedProducts": ["CREATE src/*", "DISALLOW *"]
        },
        {
            "name": "build",
            "expectedMaterials": [
                "MATCH src/* WITH PRODUCTS FROM clone",
                "DISALLOW *"
            ],
            "expectedProducts": [
                "MATCH src/* WITH MATERIALS FROM build",
                "CREATE dist/*",
                "DISALLOW *"
            ],
            "expectedPredicates": [{
                "predicateType": "https://in-toto.io/attestation/link/v0.3",
                "expectedAttributes": [
                    {"rule": "name == 'build'"},
                    {"rule": "'make' in command"},
                    {"rule": "environment.CI == 'true'", "allowIfNoClaim": true}
                ]
            }]
        },
        {
            "name": "test",
            "expectedMaterials": [
                "MATCH dist/* WITH PRODUCTS FROM build",
                "DISALLOW *"
            ],
            "expectedPredicates": [{
                "predicateType": "https://in-toto.io/attestation/test-result/v0.1",
                "expectedAttributes": [
                    {"rule": "result == 'PASSED'"},
                    {"rule": "size(failedTests) == 0", "allowIfNoClaim": true}
                ]
            }]
        }
    ]
}"#;

fn rd(name: &str, digest: &str) -> ResourceDescriptor {
    ResourceDescriptor::new(name, "sha256", digest)
}

fn statement(
    predicate_type: &str,
    predicate: serde_json::Value,
    subject: Vec<ResourceDescriptor>,
) -> Statement {
    serde_json::from_value(json!({
        "_type": "https://in-toto.io/Statement/v1",
        "subject": subject,
        "predicateType": predicate_type,
        "predicate": predicate,
    }))
    .unwrap()
}

fn claims(binary_digest: &str) -> ClaimsIndex {
    let clone = statement(
        LINK_PREDICATE_TYPE,
        json!({"name": "clone", "command": ["git", "clone"]}),
        vec![rd("src/main.c", "c0"), rd("src/util.c", "c1")],
    );
    let build = statement(
        LINK_PREDICATE_TYPE,
        json!({
            "name": "build",
            "command": ["make", "all"],
            "materials": [rd("src/main.c", "c0"), rd("src/util.c", "c1")],
            "environment": {"CI": "true"}
        }),
        vec![
            rd("src/main.c", "c0"),
            rd("src/util.c", "c1"),
            rd("dist/app", binary_digest),
        ],
    );
    // Test-result statements have no materials, so the consumed binary is
    // recorded by a companion link attestation.
    let test_link = statement(
        LINK_PREDICATE_TYPE,
        json!({"name": "test", "materials": [rd("dist/app", "b0")]}),
        vec![],
    );
    let test_result = statement(
        TEST_RESULT_PREDICATE_TYPE,
        json!({"result": "PASSED", "passedTests": ["unit", "integration"]}),
        vec![rd("dist/app", "b0")],
    );

    let mut index = ClaimsIndex::new();
    index
        .entry("clone".to_string())
        .or_default()
        .insert(AttestationId::from("clone-1"), clone);
    index
        .entry("build".to_string())
        .or_default()
        .insert(AttestationId::from("build-1"), build);
    let test = index.entry("test".to_string()).or_default();
    test.insert(AttestationId::from("test-link"), test_link);
    test.insert(AttestationId::from("test-result"), test_result);
    index
}

#[test]
fn full_layout_verifies() {
    let layout = load_layout_from_str(LAYOUT).unwrap();
    let reports = verify_layout(&layout, &claims("b0"), &VerifierConfig::default()).unwrap();

    assert_eq!(reports.len(), 3);
    let test = &reports[2];
    assert_eq!(test.step, "test");
    assert_eq!(test.attestations.len(), 2);
    let result = test
        .attestations
        .iter()
        .find(|a| a.predicate_type == TEST_RESULT_PREDICATE_TYPE)
        .unwrap();
    assert_eq!(result.constraints_checked, 2);
    assert!(reports
        .iter()
        .flat_map(|r| &r.attestations)
        .all(|a| a.unconsumed_materials.is_empty()));
}

#[test]
fn tampered_binary_breaks_downstream_match() {
    let layout = load_layout_from_str(LAYOUT).unwrap();
    let err = verify_layout(&layout, &claims("evil"), &VerifierConfig::default()).unwrap_err();
    match err {
        StepcheckError::DisallowedArtifact { paths, .. } => {
            assert_eq!(paths, vec!["dist/app"]);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn stray_nested_build_output_is_disallowed() {
    let layout = load_layout_from_str(LAYOUT).unwrap();
    let mut index = claims("b0");
    index
        .get_mut("build")
        .unwrap()
        .get_mut(&AttestationId::from("build-1"))
        .unwrap()
        .subject
        .push(rd("evil/backdoor.so", "ff"));

    let err = verify_layout(&layout, &index, &VerifierConfig::default()).unwrap_err();
    match err {
        StepcheckError::DisallowedArtifact { paths, rule, .. } => {
            assert_eq!(paths, vec!["evil/backdoor.so"]);
            assert_eq!(rule, "DISALLOW *");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn single_statement_entry_points() {
    let index = claims("b0");
    let build = &index["build"][&AttestationId::from("build-1")];

    apply_artifact_rules(
        build,
        &["MATCH src/* WITH PRODUCTS FROM clone", "DISALLOW *"],
        &["ALLOW *"],
        &index,
        &VerifierConfig::default(),
    )
    .unwrap();

    apply_attribute_rules(
        &build.predicate_type,
        &build.predicate,
        &[
            Constraint::new("command[0] == 'make'"),
            Constraint::allow_if_no_claim("byproducts.stdout == ''"),
        ],
    )
    .unwrap();
}

#[test]
fn provenance_dependencies_are_materials() {
    let provenance = statement(
        PROVENANCE_PREDICATE_TYPE,
        json!({
            "buildDefinition": {
                "buildType": "https://example.com/make/v1",
                "resolvedDependencies": [rd("src/main.c", "c0")]
            },
            "runDetails": {"builder": {"id": "https://ci.example.com"}}
        }),
        vec![rd("dist/app", "b0")],
    );
    let index = claims("b0");

    apply_artifact_rules(
        &provenance,
        &["MATCH src/* WITH PRODUCTS FROM clone", "DISALLOW *"],
        &["MATCH dist/* WITH PRODUCTS FROM build", "DISALLOW *"],
        &index,
        &VerifierConfig::default(),
    )
    .unwrap();

    apply_attribute_rules(
        PROVENANCE_PREDICATE_TYPE,
        &provenance.predicate,
        &[Constraint::new(
            "buildDefinition.buildType == 'https://example.com/make/v1'",
        )],
    )
    .unwrap();
}
