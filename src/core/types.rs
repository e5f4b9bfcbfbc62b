//! RG-004: Graph data model: resources, dependencies, stored records, plans.
//!
//! All persisted types derive Serialize/Deserialize for YAML snapshots.

use super::expression::Expression;
use super::path::{Path, PathError};
use super::value::Value;
use indexmap::IndexSet;
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Resources
// ============================================================================

/// One declared infrastructure object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    /// Unique name within a graph
    pub name: String,

    /// Kind name, resolved through the registry
    #[serde(rename = "type")]
    pub resource_type: String,

    /// Declared input fields (may contain unknowns)
    #[serde(default = "Value::empty_object")]
    pub input: Value,

    /// Provisioned results; null until created
    #[serde(default)]
    pub output: Value,

    /// Parents referenced by this resource's dependencies (derived by the graph)
    #[serde(default, skip_serializing_if = "IndexSet::is_empty")]
    pub deps: IndexSet<String>,

    /// Opaque content identifiers of attached artifacts
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<String>,
}

impl Resource {
    pub fn new(name: impl Into<String>, resource_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            resource_type: resource_type.into(),
            input: Value::empty_object(),
            output: Value::Null,
            deps: IndexSet::new(),
            sources: Vec::new(),
        }
    }

    pub fn with_input(mut self, input: Value) -> Self {
        self.input = input;
        self
    }

    pub fn with_output(mut self, output: Value) -> Self {
        self.output = output;
        self
    }

    pub fn with_sources(mut self, sources: Vec<String>) -> Self {
        self.sources = sources;
        self
    }

    /// The object references resolve against: `{input, output}`.
    pub fn view(&self) -> Value {
        Value::object([("input", self.input.clone()), ("output", self.output.clone())])
    }

    /// Write `value` at a field path rooted at `input` or `output`.
    pub fn set_field(&mut self, field: &Path, value: Value) -> Result<(), PathError> {
        let target = match field.root() {
            "input" => &mut self.input,
            "output" => &mut self.output,
            other => {
                return Err(PathError::Missing {
                    at: self.name.clone(),
                    key: other.to_string(),
                })
            }
        };
        field.assign(target, value)
    }
}

// ============================================================================
// Dependencies
// ============================================================================

/// Binds one field of `child` to an expression over other resources.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dependency {
    /// Resource whose field is computed
    pub child: String,

    /// Path into the child, e.g. `input.url`
    pub field: Path,

    pub expression: Expression,
}

impl Dependency {
    pub fn new(child: impl Into<String>, field: Path, expression: Expression) -> Self {
        Self {
            child: child.into(),
            field,
            expression,
        }
    }
}

// ============================================================================
// Stored records
// ============================================================================

/// What the store remembers about a provisioned resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceRecord {
    pub name: String,

    #[serde(rename = "type")]
    pub resource_type: String,

    /// Input hash at the time of the last successful provision
    pub hash: String,

    #[serde(default)]
    pub output: Value,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<String>,
}

// ============================================================================
// Plan
// ============================================================================

/// Action to take on a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanAction {
    Create,
    Update,
    Destroy,
    NoOp,
}

impl fmt::Display for PlanAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Create => write!(f, "CREATE"),
            Self::Update => write!(f, "UPDATE"),
            Self::Destroy => write!(f, "DESTROY"),
            Self::NoOp => write!(f, "NO-OP"),
        }
    }
}

/// A single planned change.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlannedChange {
    pub resource: String,

    #[serde(rename = "type")]
    pub resource_type: String,

    pub action: PlanAction,

    /// Inputs still contain unknowns; re-plan after parents provision
    pub pending_inputs: bool,

    /// Desired input hash (empty for destroys)
    pub hash: String,

    pub description: String,
}

/// Classified changes for a graph against stored records.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ChangePlan {
    pub changes: Vec<PlannedChange>,
    pub to_create: u32,
    pub to_update: u32,
    pub to_destroy: u32,
    pub unchanged: u32,
}

impl ChangePlan {
    pub fn has_changes(&self) -> bool {
        self.to_create + self.to_update + self.to_destroy > 0
    }
}
