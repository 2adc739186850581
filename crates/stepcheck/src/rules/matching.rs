//! Cross-step `MATCH` rule resolution
//!
//! A `MATCH` rule consumes a source artifact when the destination step
//! recorded an artifact at the corresponding path with the same digests:
//!
//! ```text
//! src/lib/a.py --strip IN src--> lib/a.py --pattern?--> pkg/ + lib/a.py --lookup--> digest equal?
//! ```
//!
//! All attestations of the destination step are merged first. By default a
//! later attestation (by ascending id) silently replaces an earlier one's
//! artifact at the same path; strict mode rejects disagreeing digests.

use crate::error::{Result, StepcheckError};
use crate::rules::artifacts::ArtifactSnapshot;
use crate::rules::parse::MatchRule;
use crate::rules::pathset::{clean_path, PathSet, Pattern};
use crate::rules::predicate::extract_artifacts;
use crate::rules::types::{ArtifactKind, AttestationId, ClaimsIndex, ResourceDescriptor, Statement};
use std::collections::BTreeMap;

/// Resolves `MATCH` rules against the claims of other steps.
#[derive(Debug, Clone, Copy)]
pub struct MatchRuleResolver<'a> {
    claims: &'a ClaimsIndex,
    strict_merge: bool,
}

impl<'a> MatchRuleResolver<'a> {
    /// Resolver over `claims` with overwrite merge semantics.
    #[must_use]
    pub fn new(claims: &'a ClaimsIndex) -> Self {
        Self {
            claims,
            strict_merge: false,
        }
    }

    /// Reject destination attestations that disagree about an artifact.
    #[must_use]
    pub fn with_strict_merge(mut self, strict: bool) -> Self {
        self.strict_merge = strict;
        self
    }

    /// Return the paths in `queue` that `rule` accounts for.
    ///
    /// Only paths still in `queue` are considered; `source` supplies their
    /// digests. A destination step with no attestations yields an empty set.
    ///
    /// # Errors
    ///
    /// - `StepcheckError::PredicateDecode` if a destination attestation's
    ///   predicate cannot be decoded
    /// - `StepcheckError::ConflictingClaims` in strict mode when two
    ///   destination attestations record different digests for one path
    /// - `StepcheckError::RuleParse` if the rule's pattern does not compile
    pub fn resolve(
        &self,
        rule: &MatchRule,
        source: &ArtifactSnapshot,
        queue: &PathSet,
    ) -> Result<PathSet> {
        let mut consumed = PathSet::new();

        let Some(attestations) = self.claims.get(&rule.dst_name) else {
            tracing::warn!(
                step = %rule.dst_name,
                "match rule references a step with no attestations; nothing matched"
            );
            return Ok(consumed);
        };

        let (dst_materials, dst_products) = self.merge_destination(&rule.dst_name, attestations)?;
        let destination = match rule.dst_type {
            ArtifactKind::Materials => &dst_materials,
            ArtifactKind::Products => &dst_products,
        };

        let pattern = if rule.pattern.is_empty() {
            Pattern::new("")
        } else {
            Pattern::canonical(&rule.pattern)
        }
        .map_err(|e| StepcheckError::RuleParse {
            rule: rule.pattern.clone(),
            reason: format!("invalid match pattern: {e}"),
        })?;
        let src_prefix = normalize_prefix(rule.src_prefix.as_deref());
        let dst_prefix = normalize_prefix(rule.dst_prefix.as_deref());

        for src_path in queue.iter() {
            let base = src_path.strip_prefix(src_prefix.as_str()).unwrap_or(src_path);
            if !pattern.is_match(base) {
                continue;
            }

            let dst_path = clean_path(&format!("{dst_prefix}{base}"));
            let Some(dst_artifact) = destination.get(&dst_path) else {
                continue;
            };
            let Some(src_artifact) = source.get(src_path) else {
                continue;
            };
            if !src_artifact.digest_eq(dst_artifact) {
                tracing::debug!(src_path, %dst_path, "digest mismatch, not consumed");
                continue;
            }

            consumed.add(src_path);
        }

        Ok(consumed)
    }

    fn merge_destination(
        &self,
        step: &str,
        attestations: &BTreeMap<AttestationId, Statement>,
    ) -> Result<(ArtifactSnapshot, ArtifactSnapshot)> {
        let mut materials = ArtifactSnapshot::new();
        let mut products = ArtifactSnapshot::new();

        for (id, statement) in attestations {
            let artifacts = extract_artifacts(statement)?;
            tracing::trace!(step, attestation = %id, "merging destination claims");
            self.merge_into(&mut materials, artifacts.materials, step, ArtifactKind::Materials)?;
            self.merge_into(&mut products, artifacts.products, step, ArtifactKind::Products)?;
        }

        Ok((materials, products))
    }

    fn merge_into(
        &self,
        snapshot: &mut ArtifactSnapshot,
        descriptors: Vec<ResourceDescriptor>,
        step: &str,
        kind: ArtifactKind,
    ) -> Result<()> {
        for descriptor in descriptors {
            let path = clean_path(&descriptor.name);
            let disagrees = snapshot
                .get(&path)
                .is_some_and(|previous| !previous.digest_eq(&descriptor));
            if disagrees {
                if self.strict_merge {
                    return Err(StepcheckError::ConflictingClaims {
                        step: step.to_string(),
                        kind,
                        path,
                    });
                }
                tracing::warn!(
                    step,
                    %kind,
                    %path,
                    "attestations disagree on artifact digest; keeping the later one"
                );
            }
            snapshot.insert(descriptor);
        }
        Ok(())
    }
}

/// Clean a prefix and give it exactly one trailing separator. Absent or
/// empty prefixes stay empty.
fn normalize_prefix(prefix: Option<&str>) -> String {
    match prefix {
        None | Some("") => String::new(),
        Some(p) => {
            let cleaned = clean_path(p);
            if cleaned.ends_with('/') {
                cleaned
            } else {
                format!("{cleaned}/")
            }
        }
    }
}
