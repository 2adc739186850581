//! Core types for attestation rule verification
//!
//! Defines the decoded statement shape consumed by the rule engines, the
//! claims index used to resolve cross-step references, and attribute
//! constraints.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Predicate type of in-toto link attestations.
pub const LINK_PREDICATE_TYPE: &str = "https://in-toto.io/attestation/link/v0.3";

/// Predicate type of in-toto test-result attestations.
pub const TEST_RESULT_PREDICATE_TYPE: &str = "https://in-toto.io/attestation/test-result/v0.1";

/// Predicate type of SLSA provenance v1 attestations.
pub const PROVENANCE_PREDICATE_TYPE: &str = "https://slsa.dev/provenance/v1";

/// Statement type of in-toto v1 statements.
pub const IN_TOTO_STATEMENT_TYPE: &str = "https://in-toto.io/Statement/v1";

/// Open field map holding a predicate payload.
pub type PredicateFields = serde_json::Map<String, serde_json::Value>;

/// A single artifact: a path-like name plus content digests.
///
/// Field names follow the in-toto `ResourceDescriptor` JSON encoding. The
/// snake_case aliases accept the protobuf field names as well.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ResourceDescriptor {
    /// Artifact name, usually a relative file path
    #[serde(default)]
    pub name: String,
    /// Algorithm name to hex-encoded digest
    #[serde(default)]
    pub digest: BTreeMap<String, String>,
    /// Resource URI
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
    /// Inline content, base64 encoded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Where the resource can be downloaded from
    #[serde(
        default,
        alias = "download_location",
        skip_serializing_if = "Option::is_none"
    )]
    pub download_location: Option<String>,
    /// Media type of the resource
    #[serde(default, alias = "media_type", skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
    /// Free-form annotations
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotations: Option<PredicateFields>,
}

impl ResourceDescriptor {
    /// Build a descriptor with a single digest entry.
    #[must_use]
    pub fn new(name: impl Into<String>, algorithm: &str, digest: impl Into<String>) -> Self {
        let mut digests = BTreeMap::new();
        digests.insert(algorithm.to_string(), digest.into());
        Self {
            name: name.into(),
            digest: digests,
            ..Self::default()
        }
    }

    /// Whether both descriptors carry exactly the same digest map.
    ///
    /// Sharing only some algorithms is not a match.
    #[must_use]
    pub fn digest_eq(&self, other: &Self) -> bool {
        self.digest == other.digest
    }
}

/// A decoded in-toto statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Statement {
    /// Statement type URI
    #[serde(rename = "_type", default = "default_statement_type")]
    pub statement_type: String,
    /// Artifacts the statement is about
    #[serde(default)]
    pub subject: Vec<ResourceDescriptor>,
    /// Predicate type URI
    pub predicate_type: String,
    /// Predicate payload
    #[serde(default)]
    pub predicate: PredicateFields,
}

fn default_statement_type() -> String {
    IN_TOTO_STATEMENT_TYPE.to_string()
}

impl Statement {
    /// Build a statement of the current in-toto statement type.
    #[must_use]
    pub fn new(
        predicate_type: impl Into<String>,
        predicate: PredicateFields,
        subject: Vec<ResourceDescriptor>,
    ) -> Self {
        Self {
            statement_type: default_statement_type(),
            subject,
            predicate_type: predicate_type.into(),
            predicate,
        }
    }
}

/// Identifies one attestation of a step, e.g. one re-run of a build.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AttestationId(pub String);

impl From<&str> for AttestationId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl fmt::Display for AttestationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Attestations of every step, keyed by step name then attestation id.
///
/// Ordered maps keep the merge order of multiple attestations for one step
/// deterministic.
pub type ClaimsIndex = BTreeMap<String, BTreeMap<AttestationId, Statement>>;

/// Which artifact list of a statement a rule refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    /// Inputs consumed by the step
    Materials,
    /// Outputs produced by the step
    Products,
}

impl ArtifactKind {
    /// Lowercase keyword used in rule strings.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Materials => "materials",
            Self::Products => "products",
        }
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A boolean constraint on a predicate's fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Constraint {
    /// CEL expression that must evaluate to `true`
    pub rule: String,
    /// Treat the constraint as satisfied when it references an absent field
    #[serde(default)]
    pub allow_if_no_claim: bool,
}

impl Constraint {
    /// Build a constraint that fails on absent fields.
    #[must_use]
    pub fn new(rule: impl Into<String>) -> Self {
        Self {
            rule: rule.into(),
            allow_if_no_claim: false,
        }
    }

    /// Build a constraint that passes when its fields are absent.
    #[must_use]
    pub fn allow_if_no_claim(rule: impl Into<String>) -> Self {
        Self {
            rule: rule.into(),
            allow_if_no_claim: true,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn digest_eq_requires_identical_maps() {
        let a = ResourceDescriptor::new("a.txt", "sha256", "aaaa");
        let b = ResourceDescriptor::new("b.txt", "sha256", "aaaa");
        assert!(a.digest_eq(&b));

        let mut c = a.clone();
        c.digest.insert("sha512".to_string(), "cccc".to_string());
        assert!(!a.digest_eq(&c));
        assert!(!c.digest_eq(&a));

        let d = ResourceDescriptor::new("a.txt", "sha256", "dddd");
        assert!(!a.digest_eq(&d));
    }

    #[test]
    fn descriptor_accepts_protobuf_field_names() {
        let rd: ResourceDescriptor = serde_json::from_value(json!({
            "name": "pkg.tar.gz",
            "digest": {"sha256": "abcd"},
            "download_location": "https://example.com/pkg.tar.gz",
            "mediaType": "application/gzip"
        }))
        .unwrap();
        assert_eq!(
            rd.download_location.as_deref(),
            Some("https://example.com/pkg.tar.gz")
        );
        assert_eq!(rd.media_type.as_deref(), Some("application/gzip"));
    }

    #[test]
    fn descriptor_rejects_unknown_fields() {
        let result: std::result::Result<ResourceDescriptor, _> =
            serde_json::from_value(json!({"name": "a", "sha": "x"}));
        assert!(result.is_err());
    }

    #[test]
    fn statement_serde_roundtrip() {
        let json = json!({
            "_type": IN_TOTO_STATEMENT_TYPE,
            "subject": [{"name": "out/app", "digest": {"sha256": "ff"}}],
            "predicateType": LINK_PREDICATE_TYPE,
            "predicate": {"name": "build", "command": ["make"]}
        });
        let statement: Statement = serde_json::from_value(json).unwrap();
        assert_eq!(statement.predicate_type, LINK_PREDICATE_TYPE);
        assert_eq!(statement.subject[0].name, "out/app");

        let back = serde_json::to_value(&statement).unwrap();
        assert_eq!(back["predicateType"], LINK_PREDICATE_TYPE);
        assert_eq!(back["_type"], IN_TOTO_STATEMENT_TYPE);
    }

    #[test]
    fn statement_type_defaults_when_missing() {
        let statement: Statement = serde_json::from_value(json!({
            "predicateType": "https://example.com/custom/v1"
        }))
        .unwrap();
        assert_eq!(statement.statement_type, IN_TOTO_STATEMENT_TYPE);
        assert!(statement.subject.is_empty());
        assert!(statement.predicate.is_empty());
    }

    #[test]
    fn constraint_allow_if_no_claim_defaults_false() {
        let c: Constraint = serde_json::from_value(json!({"rule": "name == 'x'"})).unwrap();
        assert!(!c.allow_if_no_claim);
        let c: Constraint =
            serde_json::from_value(json!({"rule": "name == 'x'", "allowIfNoClaim": true}))
                .unwrap();
        assert!(c.allow_if_no_claim);
    }

    #[test]
    fn artifact_kind_display() {
        assert_eq!(ArtifactKind::Materials.to_string(), "materials");
        assert_eq!(ArtifactKind::Products.to_string(), "products");
    }
}
