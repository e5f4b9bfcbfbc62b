//! Resource implementations: the provisioning contract and local kinds.
//!
//! Each kind provides:
//! 1. An explicit [`Schema`] classifying its input and output fields
//! 2. Value-model encoding of its input and output
//! 3. A typed [`Fingerprint`] over its input fields, in declaration order
//! 4. Async create / update / delete against the real world
//!
//! Nothing here orders or schedules calls; that belongs to an executor.

pub mod directory;
pub mod file;

use crate::core::schema::{Schema, SchemaError};
use crate::core::value::Value;
use crate::tripwire::hasher::Fingerprint;
use async_trait::async_trait;
use indexmap::IndexMap;
use std::any::Any;
use std::fmt;
use std::path::PathBuf;

pub use directory::LocalDirectory;
pub use file::LocalFile;

/// Opaque provider credentials, passed through untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Auth {
    pub profile: Option<String>,
    pub region: Option<String>,
    pub credentials: IndexMap<String, String>,
}

/// An attached artifact: content identifier plus where to read it.
#[derive(Debug, Clone, PartialEq)]
pub struct Source {
    pub id: String,
    pub path: PathBuf,
}

impl Source {
    pub fn new(id: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            id: id.into(),
            path: path.into(),
        }
    }
}

#[derive(Debug, Default)]
pub struct CreateRequest {
    pub auth: Auth,
    pub sources: Vec<Source>,
}

#[derive(Debug)]
pub struct UpdateRequest {
    pub auth: Auth,
    pub sources: Vec<Source>,
    /// The instance as last provisioned; downcast via [`ResourceImpl::as_any`].
    pub previous: Box<dyn ResourceImpl>,
    pub source_changed: bool,
    pub config_changed: bool,
}

#[derive(Debug, Default)]
pub struct DeleteRequest {
    pub auth: Auth,
}

/// Provider failure.
#[derive(Debug, thiserror::Error)]
pub enum ProvisionError {
    #[error("input field '{field}': {reason}")]
    Decode { field: String, reason: String },

    #[error("{path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("previous state is a {found}, expected {expected}")]
    PreviousMismatch {
        expected: &'static str,
        found: &'static str,
    },

    #[error("{0}")]
    Failed(String),
}

impl ProvisionError {
    pub(crate) fn io(path: impl fmt::Display, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_string(),
            source,
        }
    }
}

/// One resource kind's behaviour. Instances hold typed input and output.
#[async_trait]
pub trait ResourceImpl: Fingerprint + fmt::Debug + Send + Sync {
    /// Registered kind name.
    fn type_name(&self) -> &'static str;

    fn schema(&self) -> Result<Schema, SchemaError>;

    /// Input fields as a value-model object.
    fn input(&self) -> Value;

    /// Output fields as a value-model object.
    fn output(&self) -> Value;

    /// Replace the typed input from a fully known value-model object.
    fn decode_input(&mut self, input: &Value) -> Result<(), ProvisionError>;

    fn as_any(&self) -> &dyn Any;

    async fn create(&mut self, req: CreateRequest) -> Result<(), ProvisionError>;

    async fn update(&mut self, req: UpdateRequest) -> Result<(), ProvisionError>;

    async fn delete(&mut self, req: DeleteRequest) -> Result<(), ProvisionError>;
}

/// Downcast `previous` to the concrete kind being updated.
pub(crate) fn previous_as<'a, R: ResourceImpl + 'static>(
    expected: &'static str,
    previous: &'a dyn ResourceImpl,
) -> Result<&'a R, ProvisionError> {
    previous
        .as_any()
        .downcast_ref::<R>()
        .ok_or(ProvisionError::PreviousMismatch {
            expected,
            found: previous.type_name(),
        })
}

// ============================================================================
// Input decoding helpers
// ============================================================================

/// Look up a dotted field in an input object. Absent and null are both `None`.
fn lookup<'a>(input: &'a Value, field: &str) -> Result<Option<&'a Value>, ProvisionError> {
    let mut current = input;
    for segment in field.split('.') {
        if current.is_null() {
            return Ok(None);
        }
        let Some(entries) = current.as_entries() else {
            return Err(ProvisionError::Decode {
                field: field.to_string(),
                reason: format!("expected object, found {}", current.type_name()),
            });
        };
        match entries.get(segment) {
            Some(v) => current = v,
            None => return Ok(None),
        }
    }
    if current.is_unknown() {
        return Err(ProvisionError::Decode {
            field: field.to_string(),
            reason: "value is not known yet".to_string(),
        });
    }
    Ok((!current.is_null()).then_some(current))
}

pub(crate) fn decode_string(input: &Value, field: &str) -> Result<Option<String>, ProvisionError> {
    match lookup(input, field)? {
        None => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(other) => Err(ProvisionError::Decode {
            field: field.to_string(),
            reason: format!("expected string, found {}", other.type_name()),
        }),
    }
}

pub(crate) fn require_string(input: &Value, field: &str) -> Result<String, ProvisionError> {
    decode_string(input, field)?.ok_or_else(|| ProvisionError::Decode {
        field: field.to_string(),
        reason: "required".to_string(),
    })
}

pub(crate) fn decode_string_map(
    input: &Value,
    field: &str,
) -> Result<IndexMap<String, String>, ProvisionError> {
    let Some(value) = lookup(input, field)? else {
        return Ok(IndexMap::new());
    };
    let entries = value.as_entries().ok_or_else(|| ProvisionError::Decode {
        field: field.to_string(),
        reason: format!("expected map, found {}", value.type_name()),
    })?;
    entries
        .iter()
        .map(|(k, v)| match v.as_str() {
            Some(s) => Ok((k.clone(), s.to_string())),
            None => Err(ProvisionError::Decode {
                field: format!("{}.{}", field, k),
                reason: format!("expected string, found {}", v.type_name()),
            }),
        })
        .collect()
}

/// Parse an octal permission string such as `"0644"` or `"755"`.
pub(crate) fn parse_mode(field: &str, mode: &str) -> Result<u32, ProvisionError> {
    let digits = mode.trim_start_matches("0o");
    u32::from_str_radix(digits, 8)
        .ok()
        .filter(|m| *m <= 0o7777)
        .ok_or_else(|| ProvisionError::Decode {
            field: field.to_string(),
            reason: format!("invalid octal mode '{}'", mode),
        })
}

#[cfg(unix)]
pub(crate) async fn apply_mode(path: &std::path::Path, mode: u32) -> Result<(), ProvisionError> {
    use std::os::unix::fs::PermissionsExt;
    tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))
        .await
        .map_err(|e| ProvisionError::io(path.display(), e))
}

#[cfg(not(unix))]
pub(crate) async fn apply_mode(_path: &std::path::Path, _mode: u32) -> Result<(), ProvisionError> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rg010_decode_string_nested() {
        let input = Value::object([(
            "permissions",
            Value::object([("mode", Value::from("0644"))]),
        )]);
        assert_eq!(
            decode_string(&input, "permissions.mode").unwrap(),
            Some("0644".into())
        );
        assert_eq!(decode_string(&input, "content").unwrap(), None);
        assert!(matches!(
            require_string(&input, "path"),
            Err(ProvisionError::Decode { .. })
        ));
    }

    #[test]
    fn test_rg010_decode_rejects_unknown_and_wrong_type() {
        let input = Value::object([
            ("path", Value::unknown(crate::core::value::ValueType::String)),
            ("content", Value::from(12)),
        ]);
        let err = decode_string(&input, "path").unwrap_err();
        assert!(err.to_string().contains("not known yet"));
        let err = decode_string(&input, "content").unwrap_err();
        assert!(err.to_string().contains("expected string, found number"));
    }

    #[test]
    fn test_rg010_decode_string_map() {
        let input = Value::object([(
            "tags",
            Value::map([("team", Value::from("infra")), ("env", Value::from("prod"))]),
        )]);
        let tags = decode_string_map(&input, "tags").unwrap();
        assert_eq!(tags.get("team").map(String::as_str), Some("infra"));
        assert!(decode_string_map(&input, "labels").unwrap().is_empty());

        let bad = Value::object([("tags", Value::map([("n", Value::from(1))]))]);
        let err = decode_string_map(&bad, "tags").unwrap_err();
        assert!(err.to_string().contains("tags.n"));
    }

    #[test]
    fn test_rg010_parse_mode() {
        assert_eq!(parse_mode("mode", "0644").unwrap(), 0o644);
        assert_eq!(parse_mode("mode", "755").unwrap(), 0o755);
        assert_eq!(parse_mode("mode", "0o600").unwrap(), 0o600);
        assert!(parse_mode("mode", "rwx").is_err());
        assert!(parse_mode("mode", "99").is_err());
    }
}
