//! Supply-chain layout verification
//!
//! `stepcheck` checks that attestations recorded for the steps of a software
//! supply chain obey a layout: which artifacts each step may consume,
//! create, modify, or delete, how artifacts flow between steps, and which
//! constraints each step's recorded predicate must satisfy.
//!
//! # Architecture
//!
//! ```text
//! layout + claims --> per step --> per attestation --> materials pass --> products pass --> attributes --> ok/err
//! ```
//!
//! Signature verification and envelope decoding happen before this crate is
//! involved: it consumes already-decoded in-toto statements.
//!
//! # Entry points
//!
//! - [`apply_artifact_rules`]: material and product rules for one statement
//! - [`apply_attribute_rules`]: attribute constraints for one predicate
//! - [`verify_step`] / [`verify_layout`]: both, for every attestation of a step
//!
//! Every check is fail-fast: the first violated rule is returned as a
//! [`StepcheckError`] and nothing after it is evaluated.

pub mod config;
pub mod error;
pub mod policy;
pub mod rules;
pub mod verify;

pub use config::{load_config_from_file, load_config_from_str, VerifierConfig};
pub use error::{Result, StepcheckError};
pub use policy::{load_layout_from_file, load_layout_from_str, ExpectedPredicate, Layout, StepPolicy};
pub use rules::{
    ArtifactKind, ArtifactRule, AttestationId, ClaimsIndex, Constraint, PredicateFields,
    ResourceDescriptor, Statement,
};
pub use verify::{
    apply_artifact_rules, apply_attribute_rules, verify_layout, verify_step, AttestationReport,
    StepReport,
};
