//! RG-008: Registry of resource type names to factories and schemas.
//!
//! Registration happens once at startup; lookups afterwards are read-only.
//! A registry is a plain value, so tests build their own instead of sharing a
//! process-wide table.

use super::schema::{Field, Schema};
use crate::resources::{self, ResourceImpl};
use std::collections::BTreeMap;
use std::fmt;
use tracing::warn;

/// Largest edit distance a typo suggestion may have.
pub const MAX_SUGGESTION_DISTANCE: usize = 5;

/// Lookup failure for an unregistered type name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("resource type '{name}' is not supported{}", did_you_mean(.suggestion))]
    NotSupported {
        name: String,
        suggestion: Option<String>,
    },
}

fn did_you_mean(suggestion: &Option<String>) -> String {
    match suggestion {
        Some(s) => format!(" (did you mean '{}'?)", s),
        None => String::new(),
    }
}

type Factory = fn() -> Box<dyn ResourceImpl>;

struct Kind {
    factory: Factory,
    schema: Schema,
}

/// Type name → factory + schema.
#[derive(Default)]
pub struct Registry {
    kinds: BTreeMap<String, Kind>,
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("types", &self.kinds.keys().collect::<Vec<_>>())
            .finish()
    }
}

fn make<R: ResourceImpl + Default + 'static>() -> Box<dyn ResourceImpl> {
    Box::new(R::default())
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the local kinds shipped in this crate.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register::<resources::LocalFile>(resources::file::TYPE_NAME);
        registry.register::<resources::LocalDirectory>(resources::directory::TYPE_NAME);
        registry
    }

    /// Register `R` under `name`, replacing any earlier registration.
    ///
    /// # Panics
    ///
    /// If `R`'s schema is invalid (a field declared both input and output).
    /// That is a bug in the kind, not a configuration error.
    pub fn register<R: ResourceImpl + Default + 'static>(&mut self, name: &str) {
        let schema = match R::default().schema() {
            Ok(schema) => schema,
            Err(e) => panic!("invalid schema for resource type '{}': {}", name, e),
        };
        let kind = Kind {
            factory: make::<R>,
            schema,
        };
        if self.kinds.insert(name.to_string(), kind).is_some() {
            warn!(resource_type = %name, "resource type registered twice, replacing");
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.kinds.contains_key(name)
    }

    /// Registered names in sorted order.
    pub fn types(&self) -> impl Iterator<Item = &str> {
        self.kinds.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.kinds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }

    /// A fresh zero-valued instance of `name`.
    pub fn new_instance(&self, name: &str) -> Result<Box<dyn ResourceImpl>, RegistryError> {
        self.kinds
            .get(name)
            .map(|k| (k.factory)())
            .ok_or_else(|| self.not_supported(name))
    }

    pub fn schema(&self, name: &str) -> Result<&Schema, RegistryError> {
        self.kinds
            .get(name)
            .map(|k| &k.schema)
            .ok_or_else(|| self.not_supported(name))
    }

    /// Classified fields of `name`, inputs and outputs in declaration order.
    pub fn fields(&self, name: &str) -> Result<&[Field], RegistryError> {
        self.schema(name).map(Schema::fields)
    }

    /// Closest registered name within [`MAX_SUGGESTION_DISTANCE`] edits.
    /// Ties go to the name that sorts first.
    pub fn suggest_type(&self, name: &str) -> Option<String> {
        self.kinds
            .keys()
            .map(|candidate| (strsim::levenshtein(name, candidate), candidate))
            .filter(|(distance, _)| *distance <= MAX_SUGGESTION_DISTANCE)
            .min_by_key(|(distance, _)| *distance)
            .map(|(_, candidate)| candidate.clone())
    }

    fn not_supported(&self, name: &str) -> RegistryError {
        RegistryError::NotSupported {
            name: name.to_string(),
            suggestion: self.suggest_type(name),
        }
    }
}
