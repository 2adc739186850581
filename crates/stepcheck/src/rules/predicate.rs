//! Materials and products extraction from decoded statements
//!
//! Each supported predicate type knows where a statement records its inputs.
//! Products are always the statement's subject. Decoding is strict: unknown
//! fields are rejected, matching protobuf JSON decoding of the same schemas.

use crate::error::{Result, StepcheckError};
use crate::rules::types::{
    PredicateFields, ResourceDescriptor, Statement, LINK_PREDICATE_TYPE,
    PROVENANCE_PREDICATE_TYPE,
};
use serde::de::DeserializeOwned;
use serde::Deserialize;

/// in-toto link predicate v0.3.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct LinkPredicate {
    /// Step name
    #[serde(default)]
    pub name: String,
    /// Command that was run
    #[serde(default)]
    pub command: Vec<String>,
    /// Inputs of the step
    #[serde(default)]
    pub materials: Vec<ResourceDescriptor>,
    /// Side outputs such as stdout and return value
    #[serde(default)]
    pub byproducts: PredicateFields,
    /// Recorded environment
    #[serde(default)]
    pub environment: PredicateFields,
}

/// SLSA provenance predicate v1.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ProvenancePredicate {
    /// Inputs that define the build
    #[serde(default, alias = "build_definition")]
    pub build_definition: Option<BuildDefinition>,
    /// Details about the build execution
    #[serde(default, alias = "run_details")]
    pub run_details: Option<RunDetails>,
}

/// The `buildDefinition` section of SLSA provenance.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct BuildDefinition {
    /// Build type URI
    #[serde(default, alias = "build_type")]
    pub build_type: String,
    /// Parameters under external control
    #[serde(default, alias = "external_parameters")]
    pub external_parameters: PredicateFields,
    /// Parameters under builder control
    #[serde(default, alias = "internal_parameters")]
    pub internal_parameters: PredicateFields,
    /// Artifacts fetched during the build
    #[serde(default, alias = "resolved_dependencies")]
    pub resolved_dependencies: Vec<ResourceDescriptor>,
}

/// The `runDetails` section of SLSA provenance.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RunDetails {
    /// Builder identity
    #[serde(default)]
    pub builder: Option<Builder>,
    /// Invocation metadata
    #[serde(default)]
    pub metadata: Option<BuildMetadata>,
    /// Additional build outputs
    #[serde(default)]
    pub byproducts: Vec<ResourceDescriptor>,
}

/// Identity of the platform that ran the build.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Builder {
    /// Builder URI
    #[serde(default)]
    pub id: String,
    /// Component versions
    #[serde(default)]
    pub version: std::collections::BTreeMap<String, String>,
    /// Dependencies of the builder itself
    #[serde(default, alias = "builder_dependencies")]
    pub builder_dependencies: Vec<ResourceDescriptor>,
}

/// Invocation metadata of a build.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct BuildMetadata {
    /// Builder-specific invocation id
    #[serde(default, alias = "invocation_id")]
    pub invocation_id: String,
    /// RFC 3339 start time
    #[serde(default, alias = "started_on")]
    pub started_on: Option<String>,
    /// RFC 3339 finish time
    #[serde(default, alias = "finished_on")]
    pub finished_on: Option<String>,
}

/// Materials and products recorded by a statement.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Artifacts {
    /// Inputs
    pub materials: Vec<ResourceDescriptor>,
    /// Outputs
    pub products: Vec<ResourceDescriptor>,
}

/// Extract the materials and products a statement records.
///
/// - link v0.3: the link's materials; products are the subject
/// - provenance v1: the resolved build dependencies; products are the subject
/// - any other type: no materials; products are the subject
///
/// # Errors
///
/// Returns `StepcheckError::PredicateDecode` if a link or provenance payload
/// does not conform to its schema.
pub fn extract_artifacts(statement: &Statement) -> Result<Artifacts> {
    let materials = match statement.predicate_type.as_str() {
        LINK_PREDICATE_TYPE => {
            let link: LinkPredicate = decode(&statement.predicate_type, &statement.predicate)?;
            link.materials
        }
        PROVENANCE_PREDICATE_TYPE => {
            let provenance: ProvenancePredicate =
                decode(&statement.predicate_type, &statement.predicate)?;
            provenance
                .build_definition
                .map(|b| b.resolved_dependencies)
                .unwrap_or_default()
        }
        _ => Vec::new(),
    };

    Ok(Artifacts {
        materials,
        products: statement.subject.clone(),
    })
}

/// Decode a predicate field map into a typed predicate.
///
/// # Errors
///
/// Returns `StepcheckError::PredicateDecode` naming `predicate_type`.
pub fn decode<T: DeserializeOwned>(predicate_type: &str, fields: &PredicateFields) -> Result<T> {
    T::deserialize(serde_json::Value::Object(fields.clone())).map_err(|e| {
        StepcheckError::PredicateDecode {
            predicate_type: predicate_type.to_string(),
            reason: e.to_string(),
        }
    })
}
