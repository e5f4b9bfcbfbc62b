//! RG-005: Explicit resource schemas.
//!
//! Each resource kind declares its fields once with [`SchemaBuilder`]. Leaf fields
//! carry a direction (input or output), a value type, and free-form tags such as
//! validation hints. Nested groups expand to dotted names, so only leaves need a
//! direction. A field marked both input and output is rejected at build time.

use super::value::ValueType;
use indexmap::IndexMap;
use serde::Serialize;
use std::fmt;

/// Schema construction failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchemaError {
    #[error("field {field:?} is declared as both input and output")]
    ConflictingDirection { field: String },

    #[error("field {field:?} is declared more than once")]
    DuplicateField { field: String },
}

/// Whether a field is set by the user or reported back after provisioning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Input,
    Output,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Input => write!(f, "input"),
            Self::Output => write!(f, "output"),
        }
    }
}

/// A classified leaf field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Field {
    /// Exposed name; dotted for fields inside nested groups
    pub name: String,

    pub direction: Direction,

    #[serde(serialize_with = "serialize_type")]
    pub value_type: ValueType,

    /// Annotations for the decoder (e.g. `validate: required`)
    #[serde(skip_serializing_if = "IndexMap::is_empty")]
    pub tags: IndexMap<String, String>,
}

fn serialize_type<S: serde::Serializer>(ty: &ValueType, s: S) -> Result<S::Ok, S::Error> {
    s.collect_str(ty)
}

/// Declaration of one field before classification.
#[derive(Debug, Clone)]
pub struct FieldSpec {
    ident: String,
    rename: Option<String>,
    input: bool,
    output: bool,
    value_type: ValueType,
    tags: IndexMap<String, String>,
}

impl FieldSpec {
    /// A field with no direction yet; it is ignored unless one is set.
    pub fn new(ident: &str, value_type: ValueType) -> Self {
        Self {
            ident: ident.to_string(),
            rename: None,
            input: false,
            output: false,
            value_type,
            tags: IndexMap::new(),
        }
    }

    pub fn input(ident: &str, value_type: ValueType) -> Self {
        Self::new(ident, value_type).as_input()
    }

    pub fn output(ident: &str, value_type: ValueType) -> Self {
        Self::new(ident, value_type).as_output()
    }

    pub fn as_input(mut self) -> Self {
        self.input = true;
        self
    }

    pub fn as_output(mut self) -> Self {
        self.output = true;
        self
    }

    /// Override the name derived from the identifier.
    pub fn rename(mut self, name: &str) -> Self {
        self.rename = Some(name.to_string());
        self
    }

    pub fn tag(mut self, key: &str, value: &str) -> Self {
        self.tags.insert(key.to_string(), value.to_string());
        self
    }

    fn exposed_name(&self) -> String {
        self.rename
            .clone()
            .unwrap_or_else(|| to_snake_case(&self.ident))
    }
}

enum Entry {
    Leaf(FieldSpec),
    Nested { name: String, schema: Schema },
}

/// Collects field declarations; [`SchemaBuilder::build`] classifies them.
#[derive(Default)]
pub struct SchemaBuilder {
    entries: Vec<Entry>,
}

impl SchemaBuilder {
    pub fn field(mut self, spec: FieldSpec) -> Self {
        self.entries.push(Entry::Leaf(spec));
        self
    }

    /// Expand `schema`'s fields under the name derived from `ident`.
    pub fn nested(mut self, ident: &str, schema: Schema) -> Self {
        self.entries.push(Entry::Nested {
            name: to_snake_case(ident),
            schema,
        });
        self
    }

    pub fn build(self) -> Result<Schema, SchemaError> {
        let mut fields: Vec<Field> = Vec::new();
        for entry in self.entries {
            match entry {
                Entry::Leaf(spec) => {
                    let name = spec.exposed_name();
                    let direction = match (spec.input, spec.output) {
                        (true, true) => return Err(SchemaError::ConflictingDirection { field: name }),
                        (true, false) => Direction::Input,
                        (false, true) => Direction::Output,
                        (false, false) => continue,
                    };
                    fields.push(Field {
                        name,
                        direction,
                        value_type: spec.value_type,
                        tags: spec.tags,
                    });
                }
                Entry::Nested { name, schema } => {
                    fields.extend(schema.fields.into_iter().map(|f| Field {
                        name: format!("{}.{}", name, f.name),
                        ..f
                    }));
                }
            }
        }

        let mut seen = std::collections::HashSet::new();
        for f in &fields {
            if !seen.insert(f.name.as_str()) {
                return Err(SchemaError::DuplicateField {
                    field: f.name.clone(),
                });
            }
        }

        Ok(Schema { fields })
    }
}

/// Classified fields of a resource kind, in declaration order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Schema {
    fields: Vec<Field>,
}

impl Schema {
    pub fn builder() -> SchemaBuilder {
        SchemaBuilder::default()
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn inputs(&self) -> impl Iterator<Item = &Field> {
        self.fields
            .iter()
            .filter(|f| f.direction == Direction::Input)
    }

    pub fn outputs(&self) -> impl Iterator<Item = &Field> {
        self.fields
            .iter()
            .filter(|f| f.direction == Direction::Output)
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// True when `name` is a field or a nested group containing fields.
    pub fn has_path(&self, name: &str, direction: Direction) -> bool {
        let group = format!("{}.", name);
        self.fields
            .iter()
            .filter(|f| f.direction == direction)
            .any(|f| f.name == name || f.name.starts_with(&group))
    }

    /// Object type of the input fields, with nested groups rebuilt as objects.
    pub fn input_type(&self) -> ValueType {
        object_type(self.inputs())
    }

    pub fn output_type(&self) -> ValueType {
        object_type(self.outputs())
    }
}

fn object_type<'a>(fields: impl Iterator<Item = &'a Field>) -> ValueType {
    let mut attrs: Vec<(String, ValueType)> = Vec::new();
    for f in fields {
        let segments: Vec<&str> = f.name.split('.').collect();
        insert_attr(&mut attrs, &segments, &f.value_type);
    }
    ValueType::Object(attrs)
}

fn insert_attr(attrs: &mut Vec<(String, ValueType)>, segments: &[&str], ty: &ValueType) {
    let Some((head, rest)) = segments.split_first() else {
        return;
    };
    if rest.is_empty() {
        attrs.push((head.to_string(), ty.clone()));
        return;
    }
    let pos = match attrs.iter().position(|(n, _)| n == head) {
        Some(pos) => pos,
        None => {
            attrs.push((head.to_string(), ValueType::Object(Vec::new())));
            attrs.len() - 1
        }
    };
    if let ValueType::Object(inner) = &mut attrs[pos].1 {
        insert_attr(inner, rest, ty);
    }
}

/// Derive an exposed field name from an identifier by inserting word
/// boundaries: `DeadLetterConfig` → `dead_letter_config`, `HTTPEndpoint` →
/// `http_endpoint`. Snake-case input is returned unchanged.
pub fn to_snake_case(ident: &str) -> String {
    let chars: Vec<char> = ident.chars().collect();
    let mut out = String::with_capacity(ident.len() + 4);
    for (i, &c) in chars.iter().enumerate() {
        if !c.is_uppercase() {
            out.push(c);
            continue;
        }
        let prev = i.checked_sub(1).map(|p| chars[p]);
        let next = chars.get(i + 1).copied();
        let boundary = match prev {
            Some(p) if p.is_lowercase() || p.is_ascii_digit() => true,
            Some(p) if p.is_uppercase() => next.is_some_and(char::is_lowercase),
            _ => false,
        };
        if boundary {
            out.push('_');
        }
        out.extend(c.to_lowercase());
    }
    out
}
