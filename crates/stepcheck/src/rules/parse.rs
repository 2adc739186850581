//! Artifact rule parsing
//!
//! Rule strings are whitespace-separated tokens. Keywords are matched
//! case-insensitively; patterns, prefixes, and step names keep their case.
//!
//! ```text
//! CREATE|MODIFY|DELETE|ALLOW|DISALLOW|REQUIRE <pattern>
//! MATCH <pattern> [IN <srcPrefix>] WITH (MATERIALS|PRODUCTS) [IN <dstPrefix>] FROM <step>
//! ```
//!
//! Structural validation happens here so the rule engine only has to decide
//! whether a rule applies to the artifact class it is checking.

use crate::error::{Result, StepcheckError};
use crate::rules::pathset::Pattern;
use crate::rules::types::ArtifactKind;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A `MATCH` rule: artifacts correspond to another step's artifacts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchRule {
    /// Glob applied to source paths after `src_prefix` is stripped
    pub pattern: String,
    /// Prefix stripped from source paths before matching
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub src_prefix: Option<String>,
    /// Prefix prepended to the base path to find the destination artifact
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dst_prefix: Option<String>,
    /// Destination step name
    pub dst_name: String,
    /// Destination artifact list
    pub dst_type: ArtifactKind,
}

/// A parsed artifact rule, in canonical map form when serialized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ArtifactRule {
    /// Consume artifacts with a digest-equal counterpart in another step
    Match(MatchRule),
    /// Consume any matching artifact
    Allow {
        /// Glob pattern
        pattern: String,
    },
    /// Consume matching products that are not materials
    Create {
        /// Glob pattern
        pattern: String,
    },
    /// Consume matching products whose digest differs from the material
    Modify {
        /// Glob pattern
        pattern: String,
    },
    /// Consume matching materials that are not products
    Delete {
        /// Glob pattern
        pattern: String,
    },
    /// Fail if any remaining artifact matches
    Disallow {
        /// Glob pattern
        pattern: String,
    },
    /// Fail unless this exact path remains
    Require {
        /// Literal path
        pattern: String,
    },
}

impl ArtifactRule {
    /// Lowercase rule keyword.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Match(_) => "match",
            Self::Allow { .. } => "allow",
            Self::Create { .. } => "create",
            Self::Modify { .. } => "modify",
            Self::Delete { .. } => "delete",
            Self::Disallow { .. } => "disallow",
            Self::Require { .. } => "require",
        }
    }

    /// The rule's pattern as written.
    #[must_use]
    pub fn pattern(&self) -> &str {
        match self {
            Self::Match(m) => &m.pattern,
            Self::Allow { pattern }
            | Self::Create { pattern }
            | Self::Modify { pattern }
            | Self::Delete { pattern }
            | Self::Disallow { pattern }
            | Self::Require { pattern } => pattern,
        }
    }

    /// Whether the rule may appear in the rule list for `kind`.
    #[must_use]
    pub fn applies_to(&self, kind: ArtifactKind) -> bool {
        match self {
            Self::Match(_) | Self::Allow { .. } | Self::Disallow { .. } | Self::Require { .. } => {
                true
            }
            Self::Delete { .. } => kind == ArtifactKind::Materials,
            Self::Create { .. } | Self::Modify { .. } => kind == ArtifactKind::Products,
        }
    }
}

impl fmt::Display for ArtifactRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Match(m) => {
                write!(f, "MATCH {}", m.pattern)?;
                if let Some(src) = &m.src_prefix {
                    write!(f, " IN {src}")?;
                }
                write!(f, " WITH {}", m.dst_type.as_str().to_uppercase())?;
                if let Some(dst) = &m.dst_prefix {
                    write!(f, " IN {dst}")?;
                }
                write!(f, " FROM {}", m.dst_name)
            }
            other => write!(
                f,
                "{} {}",
                other.type_name().to_uppercase(),
                other.pattern()
            ),
        }
    }
}

impl FromStr for ArtifactRule {
    type Err = StepcheckError;

    fn from_str(s: &str) -> Result<Self> {
        parse_rule(s)
    }
}

/// Parse one rule string.
///
/// # Errors
///
/// Returns `StepcheckError::RuleParse` for an unknown keyword, a wrong token
/// count, a misplaced `IN`/`WITH`/`FROM`, a destination type other than
/// `materials`/`products`, or a malformed glob pattern.
pub fn parse_rule(rule: &str) -> Result<ArtifactRule> {
    let tokens: Vec<&str> = rule.split_whitespace().collect();
    let lower: Vec<String> = tokens.iter().map(|t| t.to_lowercase()).collect();
    let keyword = lower.first().map(String::as_str).unwrap_or_default();

    let parsed = match keyword {
        "create" | "modify" | "delete" | "allow" | "disallow" | "require" => {
            if tokens.len() != 2 {
                return Err(parse_error(
                    rule,
                    format!(
                        "'{}' takes exactly one pattern, got {} tokens",
                        keyword.to_uppercase(),
                        tokens.len()
                    ),
                ));
            }
            let pattern = tokens[1].to_string();
            match keyword {
                "create" => ArtifactRule::Create { pattern },
                "modify" => ArtifactRule::Modify { pattern },
                "delete" => ArtifactRule::Delete { pattern },
                "allow" => ArtifactRule::Allow { pattern },
                "disallow" => ArtifactRule::Disallow { pattern },
                _ => ArtifactRule::Require { pattern },
            }
        }
        "match" => ArtifactRule::Match(parse_match(rule, &tokens, &lower)?),
        "" => return Err(parse_error(rule, "empty rule".to_string())),
        other => return Err(parse_error(rule, format!("unknown rule type '{other}'"))),
    };

    Pattern::new(parsed.pattern())
        .map_err(|e| parse_error(rule, format!("invalid pattern '{}': {e}", parsed.pattern())))?;

    Ok(parsed)
}

/// Parse every rule of a list, stopping at the first malformed one.
///
/// # Errors
///
/// Returns the first `StepcheckError::RuleParse` encountered.
pub fn parse_rules<S: AsRef<str>>(rules: &[S]) -> Result<Vec<ArtifactRule>> {
    rules.iter().map(|r| parse_rule(r.as_ref())).collect()
}

fn parse_match(rule: &str, tokens: &[&str], lower: &[String]) -> Result<MatchRule> {
    let kw = |i: usize, expected: &str| lower.get(i).is_some_and(|t| t == expected);

    // (src_prefix, dst_type, dst_prefix, dst_name)
    let (src_prefix, dst_type, dst_prefix, dst_name) =
        if tokens.len() == 10 && kw(2, "in") && kw(4, "with") && kw(6, "in") && kw(8, "from") {
            (Some(tokens[3]), &lower[5], Some(tokens[7]), tokens[9])
        } else if tokens.len() == 8 && kw(2, "in") && kw(4, "with") && kw(6, "from") {
            (Some(tokens[3]), &lower[5], None, tokens[7])
        } else if tokens.len() == 8 && kw(2, "with") && kw(4, "in") && kw(6, "from") {
            (None, &lower[3], Some(tokens[5]), tokens[7])
        } else if tokens.len() == 6 && kw(2, "with") && kw(4, "from") {
            (None, &lower[3], None, tokens[5])
        } else {
            return Err(parse_error(
                rule,
                "expected 'MATCH <pattern> [IN <source-path-prefix>] WITH (MATERIALS|PRODUCTS) \
                 [IN <destination-path-prefix>] FROM <step>'"
                    .to_string(),
            ));
        };

    let dst_type = match dst_type.as_str() {
        "materials" => ArtifactKind::Materials,
        "products" => ArtifactKind::Products,
        other => {
            return Err(parse_error(
                rule,
                format!("destination type must be MATERIALS or PRODUCTS, got '{other}'"),
            ))
        }
    };

    Ok(MatchRule {
        pattern: tokens[1].to_string(),
        src_prefix: src_prefix.map(str::to_string),
        dst_prefix: dst_prefix.map(str::to_string),
        dst_name: dst_name.to_string(),
        dst_type,
    })
}

fn parse_error(rule: &str, reason: String) -> StepcheckError {
    StepcheckError::RuleParse {
        rule: rule.to_string(),
        reason,
    }
}
