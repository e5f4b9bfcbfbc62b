//! RG-003: Expressions: literal and reference parts wiring one resource's
//! outputs into another's inputs.
//!
//! A single-part expression keeps the native type of its value. Two or more parts
//! form a string template. Unknown values propagate instead of failing, so a field
//! that waits on a parent's output evaluates to an unknown string until the parent
//! is provisioned.

use super::path::{reference_end, Path, PathError};
use super::value::{Value, ValueType};
use indexmap::IndexMap;
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use tracing::trace;

/// Evaluation failure. Unknown values are not errors.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EvalError {
    #[error("reference {index} ({path}): '{root}' is not defined")]
    UnknownRoot {
        index: usize,
        root: String,
        path: String,
    },

    #[error("reference {index}: {source}")]
    Navigate {
        index: usize,
        #[source]
        source: PathError,
    },

    #[error("part {index}: cannot interpolate a {found} value into a string")]
    NotInterpolable { index: usize, found: &'static str },
}

/// One expression part.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Part {
    Literal(Value),
    Reference(Path),
}

/// Written as a one-entry map (`literal: ...`) rather than a YAML tag, so
/// snapshots read back through the untagged expression forms.
impl Serialize for Part {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(1))?;
        match self {
            Self::Literal(v) => map.serialize_entry("literal", v)?,
            Self::Reference(p) => map.serialize_entry("reference", p)?,
        }
        map.end()
    }
}

/// Ordered literal/reference parts producing one field's value.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(try_from = "ExpressionRepr")]
pub struct Expression {
    parts: Vec<Part>,
}

/// Snapshots may spell an expression as a template string or as explicit parts.
#[derive(Deserialize)]
#[serde(untagged)]
enum ExpressionRepr {
    Template(String),
    Parts(Vec<Part>),
}

impl TryFrom<ExpressionRepr> for Expression {
    type Error = PathError;

    fn try_from(repr: ExpressionRepr) -> Result<Self, Self::Error> {
        match repr {
            ExpressionRepr::Template(s) => Expression::parse_template(&s),
            ExpressionRepr::Parts(parts) => Ok(Expression::new(parts)),
        }
    }
}

impl Serialize for Expression {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.parts.serialize(serializer)
    }
}

impl Expression {
    pub fn new(parts: Vec<Part>) -> Self {
        Self { parts }
    }

    pub fn literal(value: impl Into<Value>) -> Self {
        Self::new(vec![Part::Literal(value.into())])
    }

    pub fn reference(path: Path) -> Self {
        Self::new(vec![Part::Reference(path)])
    }

    /// Parse `"https://${api.output.host}/v1"` into parts. Text without any
    /// `${...}` becomes a single string literal; `$${` is a literal `${`.
    pub fn parse_template(template: &str) -> Result<Self, PathError> {
        let mut parts = Vec::new();
        let mut text = String::new();
        let mut rest = template;

        while let Some(open) = rest.find("${") {
            if rest[..open].ends_with('$') {
                text.push_str(&rest[..open - 1]);
                text.push_str("${");
                rest = &rest[open + 2..];
                continue;
            }
            text.push_str(&rest[..open]);
            let body = &rest[open + 2..];
            let close = reference_end(body).ok_or_else(|| PathError::Parse {
                input: template.to_string(),
                reason: format!(
                    "unclosed interpolation at offset {}",
                    template.len() - rest.len() + open
                ),
            })?;
            if !text.is_empty() {
                parts.push(Part::Literal(Value::String(std::mem::take(&mut text))));
            }
            parts.push(Part::Reference(Path::parse(&body[..close])?));
            rest = &body[close + 1..];
        }
        text.push_str(rest);
        if !text.is_empty() || parts.is_empty() {
            parts.push(Part::Literal(Value::String(text)));
        }

        Ok(Self { parts })
    }

    pub fn parts(&self) -> &[Part] {
        &self.parts
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    /// More than one part: the result is an interpolated string.
    pub fn is_template(&self) -> bool {
        self.parts.len() > 1
    }

    /// References with their part index.
    pub fn references(&self) -> impl Iterator<Item = (usize, &Path)> {
        self.parts.iter().enumerate().filter_map(|(i, p)| match p {
            Part::Reference(path) => Some((i, path)),
            Part::Literal(_) => None,
        })
    }

    /// Root resource names of every reference, in part order (may repeat).
    pub fn roots(&self) -> impl Iterator<Item = &str> {
        self.references().map(|(_, p)| p.root())
    }

    /// Evaluate against `ctx`.
    pub fn value(&self, ctx: &EvalContext) -> Result<Value, EvalError> {
        match self.parts.as_slice() {
            [] => Ok(Value::Null),
            [part] => resolve_part(0, part, ctx),
            parts => {
                let mut out = String::new();
                let mut unknown = false;
                for (index, part) in parts.iter().enumerate() {
                    let value = resolve_part(index, part, ctx)?;
                    if value.is_unknown() {
                        unknown = true;
                        continue;
                    }
                    match value.to_template_string() {
                        Some(s) => out.push_str(&s),
                        None => {
                            return Err(EvalError::NotInterpolable {
                                index,
                                found: value.type_name(),
                            })
                        }
                    }
                }
                if unknown {
                    trace!(expression = %self, "template depends on unknown values");
                    Ok(Value::unknown(ValueType::String))
                } else {
                    Ok(Value::String(out))
                }
            }
        }
    }

    /// Collapse each run of adjacent interpolable literals into one string
    /// literal. References keep their positions; a lone literal keeps its type.
    pub fn merge_literals(&self) -> Expression {
        let mut parts = Vec::with_capacity(self.parts.len());
        let mut run: Vec<&Value> = Vec::new();
        for part in &self.parts {
            match part {
                Part::Literal(v) if v.to_template_string().is_some() => run.push(v),
                other => {
                    flush_run(&mut run, &mut parts);
                    parts.push(other.clone());
                }
            }
        }
        flush_run(&mut run, &mut parts);
        Expression { parts }
    }
}

fn flush_run(run: &mut Vec<&Value>, out: &mut Vec<Part>) {
    match run.as_slice() {
        [] => {}
        [single] => out.push(Part::Literal((*single).clone())),
        many => {
            let merged: String = many.iter().filter_map(|v| v.to_template_string()).collect();
            out.push(Part::Literal(Value::String(merged)));
        }
    }
    run.clear();
}

fn resolve_part(index: usize, part: &Part, ctx: &EvalContext) -> Result<Value, EvalError> {
    match part {
        Part::Literal(v) => Ok(v.clone()),
        Part::Reference(path) => {
            let root = ctx.get(path.root()).ok_or_else(|| EvalError::UnknownRoot {
                index,
                root: path.root().to_string(),
                path: path.to_string(),
            })?;
            path.navigate(root)
                .map_err(|source| EvalError::Navigate { index, source })
        }
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for part in &self.parts {
            match part {
                Part::Literal(Value::String(s)) => write!(f, "{}", s.replace("${", "$${"))?,
                Part::Literal(v) => write!(f, "{}", v)?,
                Part::Reference(p) => write!(f, "${{{}}}", p)?,
            }
        }
        Ok(())
    }
}

/// Variable bindings for evaluation, keyed by resource name at the root.
#[derive(Debug, Clone, Default)]
pub struct EvalContext {
    variables: IndexMap<String, Value>,
}

impl EvalContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind(&mut self, name: impl Into<String>, value: Value) {
        self.variables.insert(name.into(), value);
    }

    pub fn with(mut self, name: impl Into<String>, value: Value) -> Self {
        self.bind(name, value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.variables.get(name)
    }

    pub fn len(&self) -> usize {
        self.variables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }
}
