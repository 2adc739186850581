//! Artifact snapshots, reconciliation, and the artifact rule engine
//!
//! # Rule evaluation
//!
//! ```text
//! working set --> rule 1 --> rule 2 --> ... --> rule n --> leftover
//!                   |          |                  |
//!                consumed   consumed           consumed
//! ```
//!
//! Rules run in order over a working set of artifact paths. Each rule
//! removes the paths it accounts for, so a path consumed by an earlier rule
//! is invisible to every later rule. `DISALLOW` and `REQUIRE` only inspect
//! the working set. The first failing rule aborts the pass.

use crate::error::{Result, StepcheckError};
use crate::rules::matching::MatchRuleResolver;
use crate::rules::parse::ArtifactRule;
use crate::rules::pathset::{clean_path, PathSet, Pattern};
use crate::rules::types::{ArtifactKind, ResourceDescriptor};
use std::collections::BTreeMap;

/// Artifacts of one kind keyed by canonical path.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ArtifactSnapshot {
    artifacts: BTreeMap<String, ResourceDescriptor>,
}

impl ArtifactSnapshot {
    /// Create an empty snapshot.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Index descriptors by the cleaned form of their names.
    ///
    /// When two descriptors clean to the same path the later one wins.
    pub fn from_descriptors<'a, I>(descriptors: I) -> Self
    where
        I: IntoIterator<Item = &'a ResourceDescriptor>,
    {
        let mut snapshot = Self::new();
        for descriptor in descriptors {
            snapshot.insert(descriptor.clone());
        }
        snapshot
    }

    /// Insert a descriptor under its canonical path, returning the one it replaced.
    pub fn insert(&mut self, descriptor: ResourceDescriptor) -> Option<ResourceDescriptor> {
        self.artifacts.insert(clean_path(&descriptor.name), descriptor)
    }

    /// Look up a descriptor by canonical path.
    #[must_use]
    pub fn get(&self, path: &str) -> Option<&ResourceDescriptor> {
        self.artifacts.get(path)
    }

    /// All canonical paths in the snapshot.
    #[must_use]
    pub fn paths(&self) -> PathSet {
        self.artifacts.keys().collect()
    }

    /// Number of artifacts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.artifacts.len()
    }

    /// Whether the snapshot is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.artifacts.is_empty()
    }
}

/// How a step changed its artifacts, by path and digest.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reconciliation {
    /// Products that were not materials
    pub created: PathSet,
    /// Materials that are not products
    pub deleted: PathSet,
    /// Paths present on both sides
    pub remained: PathSet,
    /// Remained paths whose digests differ
    pub modified: PathSet,
}

impl Reconciliation {
    /// Partition the paths of a materials and a products snapshot.
    #[must_use]
    pub fn new(materials: &ArtifactSnapshot, products: &ArtifactSnapshot) -> Self {
        let material_paths = materials.paths();
        let product_paths = products.paths();

        let remained = material_paths.intersection(&product_paths);
        let modified = remained
            .iter()
            .filter(|path| match (materials.get(path), products.get(path)) {
                (Some(m), Some(p)) => !m.digest_eq(p),
                _ => false,
            })
            .collect();

        Self {
            created: product_paths.difference(&material_paths),
            deleted: material_paths.difference(&product_paths),
            remained,
            modified,
        }
    }
}

/// Applies an ordered artifact rule list to one artifact class.
pub struct ArtifactRuleEngine<'a> {
    kind: ArtifactKind,
    snapshot: &'a ArtifactSnapshot,
    reconciliation: &'a Reconciliation,
    resolver: &'a MatchRuleResolver<'a>,
}

impl<'a> ArtifactRuleEngine<'a> {
    /// Build an engine for the `kind` pass over `snapshot`.
    #[must_use]
    pub fn new(
        kind: ArtifactKind,
        snapshot: &'a ArtifactSnapshot,
        reconciliation: &'a Reconciliation,
        resolver: &'a MatchRuleResolver<'a>,
    ) -> Self {
        Self {
            kind,
            snapshot,
            reconciliation,
            resolver,
        }
    }

    /// Run `rules` in order against `working`, returning the unconsumed paths.
    ///
    /// # Errors
    ///
    /// - `StepcheckError::InvalidRuleType` for a rule that does not apply to
    ///   this artifact class (e.g. `CREATE` on materials)
    /// - `StepcheckError::DisallowedArtifact` when a `DISALLOW` pattern
    ///   matches a remaining path
    /// - `StepcheckError::MissingRequiredArtifact` when a `REQUIRE` path is
    ///   not in the working set
    /// - any error from resolving a `MATCH` rule
    pub fn apply(&self, rules: &[ArtifactRule], mut working: PathSet) -> Result<PathSet> {
        tracing::info!("Applying {} rules...", self.kind);

        for rule in rules {
            tracing::debug!(kind = %self.kind, %rule, "evaluating rule");

            if !rule.applies_to(self.kind) {
                return Err(StepcheckError::InvalidRuleType {
                    kind: self.kind,
                    rule_type: rule.type_name().to_string(),
                    rule: rule.to_string(),
                });
            }

            let pattern =
                Pattern::canonical(rule.pattern()).map_err(|e| StepcheckError::RuleParse {
                    rule: rule.to_string(),
                    reason: format!("invalid pattern '{}': {e}", rule.pattern()),
                })?;
            let filtered = working.filter(&pattern);
            let rec = self.reconciliation;

            let consumed = match rule {
                ArtifactRule::Match(m) => self.resolver.resolve(m, self.snapshot, &working)?,
                ArtifactRule::Allow { .. } => filtered,
                ArtifactRule::Delete { .. } => filtered.intersection(&rec.deleted),
                ArtifactRule::Create { .. } => filtered.intersection(&rec.created),
                ArtifactRule::Modify { .. } => filtered.intersection(&rec.modified),
                ArtifactRule::Disallow { .. } => {
                    if !filtered.is_empty() {
                        return Err(StepcheckError::DisallowedArtifact {
                            kind: self.kind,
                            paths: filtered.to_vec(),
                            rule: rule.to_string(),
                        });
                    }
                    continue;
                }
                ArtifactRule::Require { pattern } => {
                    let required = clean_path(pattern);
                    if !working.has(&required) {
                        return Err(StepcheckError::MissingRequiredArtifact {
                            kind: self.kind,
                            path: required,
                        });
                    }
                    continue;
                }
            };

            tracing::debug!(consumed = consumed.len(), %rule, "rule consumed artifacts");
            working = working.difference(&consumed);
        }

        for path in working.iter() {
            tracing::debug!(kind = %self.kind, path, "artifact not consumed by any rule");
        }

        Ok(working)
    }
}
