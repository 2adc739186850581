//! Error types for layout verification
//!
//! Every failure the verifier can report is a variant of [`StepcheckError`].
//! Verification is fail-fast: the first error aborts the current pass and is
//! returned to the caller unchanged.

use crate::rules::ArtifactKind;
use thiserror::Error;

/// Errors produced while parsing rules or verifying attestations.
#[derive(Debug, Error)]
pub enum StepcheckError {
    /// A rule string has an unknown keyword or a malformed token set
    #[error("invalid artifact rule '{rule}': {reason}")]
    RuleParse {
        /// The rule text as written in the policy
        rule: String,
        /// What was wrong with it
        reason: String,
    },

    /// A well-formed rule is not applicable to the artifact class being checked
    #[error("invalid {kind} rule type '{rule_type}' in rule '{rule}'")]
    InvalidRuleType {
        /// Artifact class of the pass (materials or products)
        kind: ArtifactKind,
        /// The rule keyword
        rule_type: String,
        /// Canonical rule text
        rule: String,
    },

    /// A `disallow` rule matched at least one artifact still in the working set
    #[error("{kind} verification failed: {paths:?} disallowed by rule '{rule}'")]
    DisallowedArtifact {
        /// Artifact class of the pass
        kind: ArtifactKind,
        /// Offending paths, sorted
        paths: Vec<String>,
        /// Canonical rule text
        rule: String,
    },

    /// A `require` rule's path is not in the working set
    #[error("{kind} verification failed: '{path}' required but not found")]
    MissingRequiredArtifact {
        /// Artifact class of the pass
        kind: ArtifactKind,
        /// The required path (canonical)
        path: String,
    },

    /// No attribute schema is registered for the predicate type
    #[error("unsupported predicate type '{0}'")]
    UnsupportedPredicateType(String),

    /// A constraint expression failed to parse
    #[error("failed to compile constraint '{rule}': {reason}")]
    ConstraintCompile {
        /// The constraint expression
        rule: String,
        /// Parser diagnostic
        reason: String,
    },

    /// A constraint expression failed to evaluate or did not yield a boolean
    #[error("failed to evaluate constraint '{rule}': {reason}")]
    ConstraintEvaluation {
        /// The constraint expression
        rule: String,
        /// Underlying evaluation error or the unexpected result type
        reason: String,
    },

    /// A constraint expression evaluated to `false`
    #[error("verification failed for rule '{rule}'")]
    ConstraintNotSatisfied {
        /// The constraint expression
        rule: String,
    },

    /// A predicate payload does not conform to its declared schema
    #[error("failed to decode {predicate_type} predicate: {reason}")]
    PredicateDecode {
        /// Declared predicate type of the statement
        predicate_type: String,
        /// Decoder diagnostic
        reason: String,
    },

    /// Two attestations of the same step disagree about an artifact (strict merge only)
    #[error("conflicting claims for step '{step}': {kind} '{path}' recorded with different digests")]
    ConflictingClaims {
        /// Destination step name
        step: String,
        /// Which artifact map the collision happened in
        kind: ArtifactKind,
        /// Colliding path (canonical)
        path: String,
    },

    /// A step named in the layout has no attestations
    #[error("no attestations found for step '{0}'")]
    MissingClaims(String),

    /// A recorded attestation could not be read as a statement
    #[error("invalid claim {path}: {reason}")]
    InvalidClaim {
        /// File the claim was read from
        path: String,
        /// Decoder diagnostic
        reason: String,
    },

    /// Layout document is malformed
    #[error("layout error: {0}")]
    Policy(String),

    /// Verifier configuration is malformed
    #[error("configuration error: {0}")]
    Config(String),

    /// I/O error while reading a policy, configuration, or claim
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, StepcheckError>;
