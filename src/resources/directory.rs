//! RG-010: `local_directory`, a directory on the local filesystem.

use super::{
    apply_mode, decode_string, parse_mode, previous_as, require_string, CreateRequest,
    DeleteRequest, ProvisionError, ResourceImpl, UpdateRequest,
};
use crate::core::schema::{FieldSpec, Schema, SchemaError};
use crate::core::value::{Value, ValueType};
use crate::tripwire::hasher::{self, Fingerprint, Fingerprinter};
use async_trait::async_trait;
use std::any::Any;
use std::path::Path;
use tracing::debug;

pub const TYPE_NAME: &str = "local_directory";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LocalDirectory {
    pub path: String,
    pub mode: Option<String>,

    /// Digest of the tree contents at last provision
    pub tree_hash: Option<String>,
}

impl LocalDirectory {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    async fn ensure(&mut self) -> Result<(), ProvisionError> {
        let path = Path::new(&self.path);
        tokio::fs::create_dir_all(path)
            .await
            .map_err(|e| ProvisionError::io(&self.path, e))?;
        if let Some(mode) = self.mode.as_deref() {
            apply_mode(path, parse_mode("mode", mode)?).await?;
        }
        self.tree_hash = Some(hasher::hash_directory(path).map_err(ProvisionError::Failed)?);
        Ok(())
    }
}

impl Fingerprint for LocalDirectory {
    fn fingerprint(&self, fp: &mut Fingerprinter) {
        fp.field("path", &self.path);
        fp.field("mode", &self.mode);
    }
}

#[async_trait]
impl ResourceImpl for LocalDirectory {
    fn type_name(&self) -> &'static str {
        TYPE_NAME
    }

    fn schema(&self) -> Result<Schema, SchemaError> {
        Schema::builder()
            .field(FieldSpec::input("Path", ValueType::String).tag("validate", "required"))
            .field(FieldSpec::input("Mode", ValueType::String).tag("validate", "octal"))
            .field(FieldSpec::output("TreeHash", ValueType::String))
            .build()
    }

    fn input(&self) -> Value {
        Value::object([
            ("path", Value::from(self.path.as_str())),
            ("mode", Value::from(self.mode.clone())),
        ])
    }

    fn output(&self) -> Value {
        Value::object([("tree_hash", Value::from(self.tree_hash.clone()))])
    }

    fn decode_input(&mut self, input: &Value) -> Result<(), ProvisionError> {
        self.path = require_string(input, "path")?;
        self.mode = decode_string(input, "mode")?;
        if let Some(mode) = self.mode.as_deref() {
            parse_mode("mode", mode)?;
        }
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    async fn create(&mut self, _req: CreateRequest) -> Result<(), ProvisionError> {
        debug!(path = %self.path, "creating local directory");
        self.ensure().await
    }

    async fn update(&mut self, req: UpdateRequest) -> Result<(), ProvisionError> {
        let previous: &LocalDirectory = previous_as(TYPE_NAME, req.previous.as_ref())?;
        if previous.path != self.path {
            debug!(from = %previous.path, to = %self.path, "local directory moved");
            remove_empty(&previous.path).await?;
        }
        self.ensure().await
    }

    /// Removes the directory only when empty; files inside belong to other
    /// resources, which are leaves and go first.
    async fn delete(&mut self, _req: DeleteRequest) -> Result<(), ProvisionError> {
        debug!(path = %self.path, "deleting local directory");
        remove_empty(&self.path).await?;
        self.tree_hash = None;
        Ok(())
    }
}

async fn remove_empty(path: &str) -> Result<(), ProvisionError> {
    match tokio::fs::remove_dir(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(ProvisionError::io(path, e)),
    }
}
