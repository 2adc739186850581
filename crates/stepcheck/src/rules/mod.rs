//! Artifact and attribute rule evaluation
//!
//! The verification core. Given a decoded statement, the rules written for
//! its step, and the attestations of other steps, decide whether the
//! statement obeys the layout.
//!
//! # Components
//!
//! - **Types** ([`types`]): statements, resource descriptors, claims index, constraints
//! - **Paths** ([`pathset`]): canonical path sets and glob patterns
//! - **Parsing** ([`parse`]): rule strings to [`ArtifactRule`]
//! - **Predicates** ([`predicate`]): materials and products per predicate type
//! - **Artifacts** ([`artifacts`]): snapshots, reconciliation, the rule engine
//! - **Matching** ([`matching`]): cross-step `MATCH` resolution
//! - **Attributes** ([`attributes`]): CEL constraints over predicate fields

pub mod artifacts;
pub mod attributes;
pub mod matching;
pub mod parse;
pub mod pathset;
pub mod predicate;
pub mod types;

pub use artifacts::{ArtifactRuleEngine, ArtifactSnapshot, Reconciliation};
pub use attributes::{schema_for, AttributeRuleEngine, Variable, VariableKind};
pub use matching::MatchRuleResolver;
pub use parse::{parse_rule, parse_rules, ArtifactRule, MatchRule};
pub use pathset::{clean_path, PathSet, Pattern};
pub use predicate::{extract_artifacts, Artifacts};
pub use types::{
    ArtifactKind, AttestationId, ClaimsIndex, Constraint, PredicateFields, ResourceDescriptor,
    Statement, IN_TOTO_STATEMENT_TYPE, LINK_PREDICATE_TYPE, PROVENANCE_PREDICATE_TYPE,
    TEST_RESULT_PREDICATE_TYPE,
};
