//! Attribute constraints over predicate fields
//!
//! Constraints are CEL expressions evaluated against the top-level fields of
//! a predicate. Each supported predicate type declares which fields are
//! visible to expressions and what shape they must have:
//!
//! | predicate type | variables |
//! |----------------|-----------|
//! | link v0.3 | `name`, `command`, `materials`, `byproducts`, `environment` |
//! | test-result v0.1 | `result`, `configuration`, `passedTests`, `warnedTests`, `failedTests` |
//! | provenance v1 | `buildDefinition`, `runDetails` |
//!
//! A declared field that the predicate does not carry is left unbound.
//! Referencing it is a missing-attribute condition, which a constraint may
//! opt to tolerate with `allowIfNoClaim`. A missing key inside a field that
//! is present is not tolerated. Identifiers outside the schema are rejected
//! before evaluation.

use crate::error::{Result, StepcheckError};
use crate::rules::types::{
    Constraint, PredicateFields, ResourceDescriptor, LINK_PREDICATE_TYPE,
    PROVENANCE_PREDICATE_TYPE, TEST_RESULT_PREDICATE_TYPE,
};
use cel_interpreter::{Context, ExecutionError, Program, Value};

/// Shape a predicate field must have to be bound as a variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VariableKind {
    /// JSON string
    String,
    /// JSON array of strings
    StringList,
    /// JSON array of resource descriptors
    DescriptorList,
    /// JSON object
    Struct,
}

impl VariableKind {
    fn check(self, value: &serde_json::Value) -> std::result::Result<(), String> {
        let ok = match self {
            Self::String => value.is_string(),
            Self::StringList => value
                .as_array()
                .is_some_and(|items| items.iter().all(serde_json::Value::is_string)),
            Self::DescriptorList => {
                return serde_json::from_value::<Vec<ResourceDescriptor>>(value.clone())
                    .map(|_| ())
                    .map_err(|e| format!("expected a list of resource descriptors: {e}"));
            }
            Self::Struct => value.is_object(),
        };
        if ok {
            Ok(())
        } else {
            Err(format!("expected {}", self.describe()))
        }
    }

    fn describe(self) -> &'static str {
        match self {
            Self::String => "a string",
            Self::StringList => "a list of strings",
            Self::DescriptorList => "a list of resource descriptors",
            Self::Struct => "an object",
        }
    }
}

/// A variable visible to constraint expressions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Variable {
    /// Predicate field name
    pub name: &'static str,
    /// Required shape
    pub kind: VariableKind,
}

const fn var(name: &'static str, kind: VariableKind) -> Variable {
    Variable { name, kind }
}

const LINK_VARIABLES: &[Variable] = &[
    var("name", VariableKind::String),
    var("command", VariableKind::StringList),
    var("materials", VariableKind::DescriptorList),
    var("byproducts", VariableKind::Struct),
    var("environment", VariableKind::Struct),
];

const TEST_RESULT_VARIABLES: &[Variable] = &[
    var("result", VariableKind::String),
    var("configuration", VariableKind::DescriptorList),
    var("passedTests", VariableKind::StringList),
    var("warnedTests", VariableKind::StringList),
    var("failedTests", VariableKind::StringList),
];

const PROVENANCE_VARIABLES: &[Variable] = &[
    var("buildDefinition", VariableKind::Struct),
    var("runDetails", VariableKind::Struct),
];

/// Variables declared for a predicate type.
///
/// # Errors
///
/// Returns `StepcheckError::UnsupportedPredicateType` for types without a schema.
pub fn schema_for(predicate_type: &str) -> Result<&'static [Variable]> {
    match predicate_type {
        LINK_PREDICATE_TYPE => Ok(LINK_VARIABLES),
        TEST_RESULT_PREDICATE_TYPE => Ok(TEST_RESULT_VARIABLES),
        PROVENANCE_PREDICATE_TYPE => Ok(PROVENANCE_VARIABLES),
        other => Err(StepcheckError::UnsupportedPredicateType(other.to_string())),
    }
}

/// Evaluates constraints for one predicate type.
#[derive(Debug, Clone)]
pub struct AttributeRuleEngine {
    predicate_type: String,
    schema: &'static [Variable],
}

impl AttributeRuleEngine {
    /// Engine for `predicate_type`.
    ///
    /// # Errors
    ///
    /// Returns `StepcheckError::UnsupportedPredicateType` for types without a schema.
    pub fn for_predicate_type(predicate_type: &str) -> Result<Self> {
        Ok(Self {
            predicate_type: predicate_type.to_string(),
            schema: schema_for(predicate_type)?,
        })
    }

    /// Declared variables.
    #[must_use]
    pub fn schema(&self) -> &'static [Variable] {
        self.schema
    }

    fn declares(&self, name: &str) -> bool {
        self.schema.iter().any(|v| v.name == name)
    }

    /// Check every constraint in order against `predicate`.
    ///
    /// # Errors
    ///
    /// - `StepcheckError::PredicateDecode` if a declared field has the wrong shape
    /// - `StepcheckError::ConstraintCompile` if an expression does not parse or
    ///   references a variable outside the schema, reachable or not
    /// - `StepcheckError::ConstraintEvaluation` if evaluation fails (other than
    ///   a tolerated missing attribute) or yields a non-boolean
    /// - `StepcheckError::ConstraintNotSatisfied` if an expression yields `false`
    pub fn apply(&self, predicate: &PredicateFields, constraints: &[Constraint]) -> Result<()> {
        let mut context = Context::default();
        for variable in self.schema {
            let Some(value) = predicate.get(variable.name) else {
                continue;
            };
            variable
                .kind
                .check(value)
                .map_err(|reason| self.decode_error(format!("field '{}': {reason}", variable.name)))?;
            context
                .add_variable(variable.name, value.clone())
                .map_err(|e| self.decode_error(format!("field '{}': {e}", variable.name)))?;
        }

        tracing::info!("Applying attribute rules...");
        for constraint in constraints {
            tracing::debug!(rule = %constraint.rule, "evaluating constraint");

            let program =
                Program::compile(&constraint.rule).map_err(|e| StepcheckError::ConstraintCompile {
                    rule: constraint.rule.clone(),
                    reason: e.to_string(),
                })?;
            self.check_references(&constraint.rule, &program)?;

            let value = match program.execute(&context) {
                Ok(value) => value,
                Err(err) => match self.classify(&err) {
                    Failure::MissingAttribute if constraint.allow_if_no_claim => {
                        tracing::debug!(rule = %constraint.rule, "attribute not claimed, allowed");
                        continue;
                    }
                    Failure::UndeclaredVariable(name) => {
                        return Err(self.undeclared_reference(&constraint.rule, &name));
                    }
                    Failure::MissingAttribute | Failure::Other => {
                        return Err(StepcheckError::ConstraintEvaluation {
                            rule: constraint.rule.clone(),
                            reason: err.to_string(),
                        });
                    }
                },
            };

            match value {
                Value::Bool(true) => {}
                Value::Bool(false) => {
                    return Err(StepcheckError::ConstraintNotSatisfied {
                        rule: constraint.rule.clone(),
                    });
                }
                other => {
                    return Err(StepcheckError::ConstraintEvaluation {
                        rule: constraint.rule.clone(),
                        reason: format!("expected a boolean result, got {other:?}"),
                    });
                }
            }
        }

        Ok(())
    }

    /// Reject identifiers that are neither schema variables nor bound by a
    /// comprehension macro, whether or not evaluation would reach them.
    fn check_references(&self, rule: &str, program: &Program) -> Result<()> {
        let bound = comprehension_variables(rule);
        let references = program.references();
        let mut names = references.variables();
        names.sort_unstable();
        let undeclared = names
            .into_iter()
            .find(|name| !self.declares(name) && !bound.iter().any(|b| b == name));
        match undeclared {
            Some(name) => Err(self.undeclared_reference(rule, name)),
            None => Ok(()),
        }
    }

    // Only an unbound top-level variable is a missing attribute. A missing
    // key inside a claimed map is an evaluation failure.
    fn classify(&self, err: &ExecutionError) -> Failure {
        match err {
            ExecutionError::UndeclaredReference(name) if self.declares(name.as_str()) => {
                Failure::MissingAttribute
            }
            ExecutionError::UndeclaredReference(name) => {
                Failure::UndeclaredVariable(name.as_str().to_string())
            }
            _ => Failure::Other,
        }
    }

    fn undeclared_reference(&self, rule: &str, name: &str) -> StepcheckError {
        StepcheckError::ConstraintCompile {
            rule: rule.to_string(),
            reason: format!(
                "undeclared reference to '{name}' for predicate type {}",
                self.predicate_type
            ),
        }
    }

    fn decode_error(&self, reason: String) -> StepcheckError {
        StepcheckError::PredicateDecode {
            predicate_type: self.predicate_type.clone(),
            reason,
        }
    }
}

enum Failure {
    MissingAttribute,
    UndeclaredVariable(String),
    Other,
}

const COMPREHENSION_MACROS: &[&str] = &["all", "exists", "exists_one", "map", "filter"];

/// Names introduced by comprehension macros such as `list.exists(x, ...)`.
fn comprehension_variables(rule: &str) -> Vec<String> {
    let mut bound = Vec::new();
    for (at, _) in rule.match_indices('.') {
        let rest = &rule[at + 1..];
        let Some(open) = rest.find('(') else {
            continue;
        };
        if !COMPREHENSION_MACROS.contains(&rest[..open].trim()) {
            continue;
        }
        let args = &rest[open + 1..];
        let Some(comma) = args.find(',') else {
            continue;
        };
        let name = args[..comma].trim();
        if !name.is_empty() && name.chars().all(|c| c.is_alphanumeric() || c == '_') {
            bound.push(name.to_string());
        }
    }
    bound
}

/// Evaluate `constraints` against a predicate of `predicate_type`.
///
/// # Errors
///
/// `StepcheckError::UnsupportedPredicateType` for unknown types, otherwise as
/// [`AttributeRuleEngine::apply`].
pub fn apply_attribute_rules(
    predicate_type: &str,
    predicate: &PredicateFields,
    constraints: &[Constraint],
) -> Result<()> {
    AttributeRuleEngine::for_predicate_type(predicate_type)?.apply(predicate, constraints)
}
