//! RG-011: Graph snapshot documents: YAML parsing and validation.
//!
//! A snapshot lists resources and dependencies. Loading rebuilds the graph
//! through [`Graph::add_resource`] and [`Graph::add_dependency`], so a document
//! that parses is referentially sound. [`validate_document`] adds the checks
//! that need a registry:
//! - Version must be "1.0"
//! - Resource types must be registered
//! - Input keys must be declared input fields
//! - Dependency fields must be `input.<declared field>`
//! - Reference paths must name declared fields of the target kind
//! - Required inputs must be set, directly or by a dependency
//! - No dependency cycles

use super::graph::{Graph, GraphError};
use super::path::{Path as FieldPath, Step};
use super::registry::Registry;
use super::schema::{Direction, Schema};
use super::types::{Dependency, Resource};
use super::value::Value;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

pub const DOCUMENT_VERSION: &str = "1.0";

/// Validation error.
#[derive(Debug, Clone)]
pub struct ValidationError {
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

fn error(message: String) -> ValidationError {
    ValidationError { message }
}

fn default_version() -> String {
    DOCUMENT_VERSION.to_string()
}

/// Serialised graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphDocument {
    #[serde(default = "default_version")]
    pub version: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default)]
    pub resources: Vec<Resource>,

    #[serde(default)]
    pub dependencies: Vec<Dependency>,
}

impl GraphDocument {
    pub fn from_graph(graph: &Graph) -> Self {
        Self {
            version: default_version(),
            name: None,
            resources: graph.resources().cloned().collect(),
            dependencies: graph.dependencies().to_vec(),
        }
    }

    /// Rebuild the graph. Stored `deps` are ignored and re-derived.
    pub fn into_graph(self) -> Result<Graph, GraphError> {
        let mut graph = Graph::new();
        for mut resource in self.resources {
            resource.deps.clear();
            graph.add_resource(resource)?;
        }
        for dependency in self.dependencies {
            graph.add_dependency(dependency)?;
        }
        Ok(graph)
    }

    pub fn to_yaml(&self) -> Result<String, String> {
        serde_yaml_ng::to_string(self).map_err(|e| format!("YAML serialize error: {}", e))
    }
}

/// Parse a graph document file from disk.
pub fn parse_document_file(path: &Path) -> Result<GraphDocument, String> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| format!("failed to read {}: {}", path.display(), e))?;
    parse_document(&content)
}

/// Parse a graph document from a string.
pub fn parse_document(yaml: &str) -> Result<GraphDocument, String> {
    serde_yaml_ng::from_str(yaml).map_err(|e| format!("YAML parse error: {}", e))
}

/// Parse a file and rebuild its graph, without registry checks.
pub fn load_graph(path: &Path) -> Result<Graph, String> {
    parse_document_file(path)?
        .into_graph()
        .map_err(|e| format!("{}: {}", path.display(), e))
}

/// Validate a document against the registry. Returns a list of errors
/// (empty = valid).
pub fn validate_document(doc: &GraphDocument, registry: &Registry) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if doc.version != DOCUMENT_VERSION {
        errors.push(error(format!(
            "version must be \"{}\", got \"{}\"",
            DOCUMENT_VERSION, doc.version
        )));
    }

    let graph = match doc.clone().into_graph() {
        Ok(graph) => graph,
        Err(e) => {
            errors.push(error(e.to_string()));
            return errors;
        }
    };

    for resource in graph.resources() {
        let schema = match registry.schema(&resource.resource_type) {
            Ok(schema) => schema,
            Err(e) => {
                errors.push(error(format!("resource '{}': {}", resource.name, e)));
                continue;
            }
        };
        check_input(&mut errors, &resource.name, schema, "", &resource.input);
        check_required(&mut errors, &graph, resource, schema);
    }

    for dep in graph.dependencies() {
        check_dependency(&mut errors, &graph, registry, dep);
    }

    if let Some(cycle) = graph.find_cycle() {
        errors.push(error(format!("dependency cycle: {}", cycle.join(" -> "))));
    }

    errors
}

fn check_input(
    errors: &mut Vec<ValidationError>,
    resource: &str,
    schema: &Schema,
    prefix: &str,
    value: &Value,
) {
    let Some(entries) = value.as_entries() else {
        if prefix.is_empty() && !value.is_null() {
            errors.push(error(format!(
                "resource '{}' input must be an object, got {}",
                resource,
                value.type_name()
            )));
        }
        return;
    };

    for (key, v) in entries {
        let name = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{}.{}", prefix, key)
        };
        if schema
            .field(&name)
            .is_some_and(|f| f.direction == Direction::Input)
        {
            continue;
        }
        if schema.has_path(&name, Direction::Input) {
            check_input(errors, resource, schema, &name, v);
            continue;
        }
        let hint = if schema.field(&name).is_some() {
            " (it is an output)"
        } else {
            ""
        };
        errors.push(error(format!(
            "resource '{}' has unknown input field '{}'{}",
            resource, name, hint
        )));
    }
}

fn check_required(
    errors: &mut Vec<ValidationError>,
    graph: &Graph,
    resource: &Resource,
    schema: &Schema,
) {
    let wired: HashSet<String> = graph
        .dependencies_of(&resource.name)
        .iter()
        .map(|d| d.field.attr_prefix())
        .collect();

    for field in schema.inputs() {
        if field.tags.get("validate").map(String::as_str) != Some("required") {
            continue;
        }
        let declared = FieldPath::parse(&format!("input.{}", field.name))
            .ok()
            .and_then(|p| p.navigate(&resource.input).ok())
            .is_some_and(|v| !v.is_null());
        if !declared && !wired.contains(&field.name) {
            errors.push(error(format!(
                "resource '{}' ({}) has no {}",
                resource.name, resource.resource_type, field.name
            )));
        }
    }
}

fn check_dependency(
    errors: &mut Vec<ValidationError>,
    graph: &Graph,
    registry: &Registry,
    dep: &Dependency,
) {
    let schema_of = |name: &str| {
        graph
            .resource(name)
            .and_then(|r| registry.schema(&r.resource_type).ok())
    };

    if dep.field.root() != "input" {
        errors.push(error(format!(
            "resource '{}' dependency field {} must start with 'input'",
            dep.child, dep.field
        )));
    } else if let Some(schema) = schema_of(&dep.child) {
        let name = dep.field.attr_prefix();
        if !schema.has_path(&name, Direction::Input) {
            errors.push(error(format!(
                "resource '{}' dependency field {} is not a declared input",
                dep.child, dep.field
            )));
        }
    }

    for (index, reference) in dep.expression.references() {
        let Some(schema) = schema_of(reference.root()) else {
            continue;
        };
        let (direction, rest) = match reference.steps().split_first() {
            None => continue,
            Some((Step::Attr(root), rest)) if root == "input" => (Direction::Input, rest),
            Some((Step::Attr(root), rest)) if root == "output" => (Direction::Output, rest),
            Some(_) => {
                errors.push(error(format!(
                    "resource '{}' field {}: reference {} ({}) must go through input or output",
                    dep.child, dep.field, index, reference
                )));
                continue;
            }
        };
        let name: Vec<&str> = rest
            .iter()
            .map_while(|s| match s {
                Step::Attr(a) => Some(a.as_str()),
                _ => None,
            })
            .collect();
        if !name.is_empty() && !schema.has_path(&name.join("."), direction) {
            errors.push(error(format!(
                "resource '{}' field {}: reference {} ({}) names no declared {} field",
                dep.child, dep.field, index, reference, direction
            )));
        }
    }
}
