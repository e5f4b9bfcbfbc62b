//! RG-002: Paths into value trees.
//!
//! A path is a root name followed by attribute, index, and key steps:
//! `api.output.endpoints[0]["us-east-1"]`. References use the resource name as the
//! root; dependency fields use `input` or `output`.

use super::value::Value;
use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Path navigation or parse failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PathError {
    #[error("invalid path {input:?}: {reason}")]
    Parse { input: String, reason: String },

    #[error("{at}: no attribute or key {key:?}")]
    Missing { at: String, key: String },

    #[error("{at}: index {index} out of range for list of length {len}")]
    OutOfRange { at: String, index: usize, len: usize },

    #[error("{at}: cannot traverse a null value")]
    Null { at: String },

    #[error("{at}: cannot apply {step} to a {found} value")]
    Mismatch {
        at: String,
        step: String,
        found: &'static str,
    },
}

/// A single traversal step.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Step {
    Attr(String),
    Index(usize),
    Key(String),
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Attr(name) => write!(f, ".{}", name),
            Self::Index(i) => write!(f, "[{}]", i),
            Self::Key(k) => {
                write!(f, "[\"")?;
                for c in k.chars() {
                    if c == '"' || c == '\\' {
                        write!(f, "\\")?;
                    }
                    write!(f, "{}", c)?;
                }
                write!(f, "\"]")
            }
        }
    }
}

/// Root name plus traversal steps.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Path {
    root: String,
    steps: Vec<Step>,
}

impl Path {
    pub fn new(root: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            steps: Vec::new(),
        }
    }

    pub fn attr(mut self, name: impl Into<String>) -> Self {
        self.steps.push(Step::Attr(name.into()));
        self
    }

    pub fn index(mut self, index: usize) -> Self {
        self.steps.push(Step::Index(index));
        self
    }

    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.steps.push(Step::Key(key.into()));
        self
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// Dotted name of the leading attribute steps: `input.permissions.mode[0]`
    /// gives `permissions.mode`.
    pub fn attr_prefix(&self) -> String {
        self.steps
            .iter()
            .map_while(|s| match s {
                Step::Attr(name) => Some(name.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join(".")
    }

    /// Parse `root.attr[0]["key"]`.
    pub fn parse(input: &str) -> Result<Self, PathError> {
        let err = |reason: &str| PathError::Parse {
            input: input.to_string(),
            reason: reason.to_string(),
        };
        let chars: Vec<char> = input.trim().chars().collect();
        let mut pos = 0;

        let root = read_ident(&chars, &mut pos).ok_or_else(|| err("expected a root name"))?;
        let mut path = Path::new(root);

        while pos < chars.len() {
            match chars[pos] {
                '.' => {
                    pos += 1;
                    let name = read_ident(&chars, &mut pos)
                        .ok_or_else(|| err("expected an attribute name after '.'"))?;
                    path.steps.push(Step::Attr(name));
                }
                '[' => {
                    pos += 1;
                    let step = if chars.get(pos) == Some(&'"') {
                        pos += 1;
                        let key = read_quoted(&chars, &mut pos)
                            .ok_or_else(|| err("unterminated string key"))?;
                        Step::Key(key)
                    } else {
                        let start = pos;
                        while pos < chars.len() && chars[pos].is_ascii_digit() {
                            pos += 1;
                        }
                        let digits: String = chars[start..pos].iter().collect();
                        let index = digits
                            .parse::<usize>()
                            .map_err(|_| err("expected an index or a quoted key"))?;
                        Step::Index(index)
                    };
                    if chars.get(pos) != Some(&']') {
                        return Err(err("expected ']'"));
                    }
                    pos += 1;
                    path.steps.push(step);
                }
                c => return Err(err(&format!("unexpected character {:?}", c))),
            }
        }

        Ok(path)
    }

    /// Follow the steps starting from `value`, the value bound to the root.
    /// Traversing into an unknown yields an unknown of the reached type.
    pub fn navigate(&self, value: &Value) -> Result<Value, PathError> {
        let mut at = self.root.clone();
        let mut current = value;
        for (i, step) in self.steps.iter().enumerate() {
            current = match (current, step) {
                (Value::Unknown(ty), _) => return Ok(Value::Unknown(ty.descend(&self.steps[i..]))),
                (Value::Null, _) => return Err(PathError::Null { at }),
                (Value::Object(m) | Value::Map(m), Step::Attr(k) | Step::Key(k)) => {
                    m.get(k).ok_or_else(|| PathError::Missing {
                        at: at.clone(),
                        key: k.clone(),
                    })?
                }
                (Value::List(items), Step::Index(index)) => {
                    items.get(*index).ok_or(PathError::OutOfRange {
                        at: at.clone(),
                        index: *index,
                        len: items.len(),
                    })?
                }
                (other, step) => {
                    return Err(PathError::Mismatch {
                        at,
                        step: step.to_string(),
                        found: other.type_name(),
                    })
                }
            };
            at.push_str(&step.to_string());
        }
        Ok(current.clone())
    }

    /// Write `value` at this path inside `target`, the value bound to the root.
    /// Null containers along the way become empty objects.
    pub fn assign(&self, target: &mut Value, value: Value) -> Result<(), PathError> {
        assign_steps(target, &self.steps, value, self.root.clone())
    }
}

fn assign_steps(
    target: &mut Value,
    steps: &[Step],
    value: Value,
    mut at: String,
) -> Result<(), PathError> {
    let Some((step, rest)) = steps.split_first() else {
        *target = value;
        return Ok(());
    };
    if target.is_null() {
        *target = Value::Object(IndexMap::new());
    }
    let slot = match (target, step) {
        (Value::Object(m) | Value::Map(m), Step::Attr(k) | Step::Key(k)) => {
            m.entry(k.clone()).or_insert(Value::Null)
        }
        (Value::List(items), Step::Index(index)) => {
            let len = items.len();
            items.get_mut(*index).ok_or(PathError::OutOfRange {
                at: at.clone(),
                index: *index,
                len,
            })?
        }
        (other, step) => {
            return Err(PathError::Mismatch {
                at,
                step: step.to_string(),
                found: other.type_name(),
            })
        }
    };
    at.push_str(&step.to_string());
    assign_steps(slot, rest, value, at)
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-'
}

fn read_ident(chars: &[char], pos: &mut usize) -> Option<String> {
    if !chars.get(*pos).copied().is_some_and(is_ident_start) {
        return None;
    }
    let start = *pos;
    while *pos < chars.len() && is_ident_char(chars[*pos]) {
        *pos += 1;
    }
    Some(chars[start..*pos].iter().collect())
}

/// Read until the closing quote; `pos` starts just after the opening one.
fn read_quoted(chars: &[char], pos: &mut usize) -> Option<String> {
    let mut out = String::new();
    while let Some(&c) = chars.get(*pos) {
        *pos += 1;
        match c {
            '"' => return Some(out),
            '\\' => {
                let escaped = chars.get(*pos)?;
                *pos += 1;
                out.push(*escaped);
            }
            _ => out.push(c),
        }
    }
    None
}

/// Byte offset of the `}` closing an interpolated reference, skipping braces
/// inside quoted keys.
pub(crate) fn reference_end(s: &str) -> Option<usize> {
    let mut in_quote = false;
    let mut escaped = false;
    for (i, c) in s.char_indices() {
        if in_quote {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_quote = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_quote = true,
            '}' => return Some(i),
            _ => {}
        }
    }
    None
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.root)?;
        for step in &self.steps {
            write!(f, "{}", step)?;
        }
        Ok(())
    }
}

impl std::str::FromStr for Path {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Path::parse(s)
    }
}

impl Serialize for Path {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Path {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Path::parse(&s).map_err(serde::de::Error::custom)
    }
}
