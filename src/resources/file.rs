//! RG-010: `local_file`, a file on the local filesystem.
//!
//! Content comes from the `content` input, or from the first attached source
//! when no content is declared. Outputs report the written file's BLAKE3 hash
//! and size.

use super::{
    apply_mode, decode_string, decode_string_map, parse_mode, previous_as, require_string,
    CreateRequest, DeleteRequest, ProvisionError, ResourceImpl, Source, UpdateRequest,
};
use crate::core::schema::{FieldSpec, Schema, SchemaError};
use crate::core::value::{Value, ValueType};
use crate::tripwire::hasher::{self, Fingerprint, Fingerprinter};
use async_trait::async_trait;
use indexmap::IndexMap;
use std::any::Any;
use std::path::Path;
use tracing::debug;

pub const TYPE_NAME: &str = "local_file";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Permissions {
    pub mode: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LocalFile {
    // inputs
    pub path: String,
    pub content: Option<String>,
    pub permissions: Permissions,
    pub tags: IndexMap<String, String>,

    // outputs
    pub content_hash: Option<String>,
    pub size: Option<u64>,
}

impl LocalFile {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    fn mode(&self) -> Result<Option<u32>, ProvisionError> {
        self.permissions
            .mode
            .as_deref()
            .map(|m| parse_mode("permissions.mode", m))
            .transpose()
    }

    async fn write(&mut self, sources: &[Source]) -> Result<(), ProvisionError> {
        let path = Path::new(&self.path);
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| ProvisionError::io(parent.display(), e))?;
        }

        match (&self.content, sources.first()) {
            (Some(content), _) => tokio::fs::write(path, content).await,
            (None, Some(source)) => tokio::fs::copy(&source.path, path).await.map(|_| ()),
            (None, None) => tokio::fs::write(path, b"").await,
        }
        .map_err(|e| ProvisionError::io(&self.path, e))?;

        if let Some(mode) = self.mode()? {
            apply_mode(path, mode).await?;
        }
        self.refresh_outputs().await
    }

    async fn refresh_outputs(&mut self) -> Result<(), ProvisionError> {
        let meta = tokio::fs::metadata(&self.path)
            .await
            .map_err(|e| ProvisionError::io(&self.path, e))?;
        self.size = Some(meta.len());
        self.content_hash =
            Some(hasher::hash_file(Path::new(&self.path)).map_err(ProvisionError::Failed)?);
        Ok(())
    }
}

async fn remove_if_present(path: &str) -> Result<(), ProvisionError> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(ProvisionError::io(path, e)),
    }
}

impl Fingerprint for LocalFile {
    fn fingerprint(&self, fp: &mut Fingerprinter) {
        fp.field("path", &self.path);
        fp.field("content", &self.content);
        fp.field("permissions.mode", &self.permissions.mode);
        fp.field("tags", &self.tags);
    }
}

#[async_trait]
impl ResourceImpl for LocalFile {
    fn type_name(&self) -> &'static str {
        TYPE_NAME
    }

    fn schema(&self) -> Result<Schema, SchemaError> {
        let permissions = Schema::builder()
            .field(FieldSpec::input("Mode", ValueType::String).tag("validate", "octal"))
            .build()?;
        Schema::builder()
            .field(FieldSpec::input("Path", ValueType::String).tag("validate", "required"))
            .field(FieldSpec::input("Content", ValueType::String))
            .nested("Permissions", permissions)
            .field(FieldSpec::input("Tags", ValueType::map(ValueType::String)))
            .field(FieldSpec::output("ContentHash", ValueType::String))
            .field(FieldSpec::output("Size", ValueType::Number))
            .build()
    }

    fn input(&self) -> Value {
        Value::object([
            ("path", Value::from(self.path.as_str())),
            ("content", Value::from(self.content.clone())),
            (
                "permissions",
                Value::object([("mode", Value::from(self.permissions.mode.clone()))]),
            ),
            (
                "tags",
                Value::map(self.tags.iter().map(|(k, v)| (k.as_str(), Value::from(v.as_str())))),
            ),
        ])
    }

    fn output(&self) -> Value {
        Value::object([
            ("content_hash", Value::from(self.content_hash.clone())),
            ("size", Value::from(self.size)),
        ])
    }

    fn decode_input(&mut self, input: &Value) -> Result<(), ProvisionError> {
        self.path = require_string(input, "path")?;
        self.content = decode_string(input, "content")?;
        self.permissions.mode = decode_string(input, "permissions.mode")?;
        self.tags = decode_string_map(input, "tags")?;
        self.mode()?;
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    async fn create(&mut self, req: CreateRequest) -> Result<(), ProvisionError> {
        debug!(path = %self.path, "creating local file");
        self.write(&req.sources).await
    }

    async fn update(&mut self, req: UpdateRequest) -> Result<(), ProvisionError> {
        let previous: &LocalFile = previous_as(TYPE_NAME, req.previous.as_ref())?;
        if previous.path != self.path {
            debug!(from = %previous.path, to = %self.path, "local file moved");
            remove_if_present(&previous.path).await?;
            return self.write(&req.sources).await;
        }
        if req.config_changed || req.source_changed {
            return self.write(&req.sources).await;
        }
        self.content_hash = previous.content_hash.clone();
        self.size = previous.size;
        Ok(())
    }

    async fn delete(&mut self, _req: DeleteRequest) -> Result<(), ProvisionError> {
        debug!(path = %self.path, "deleting local file");
        remove_if_present(&self.path).await?;
        self.content_hash = None;
        self.size = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::schema::Direction;
    use crate::resources::Auth;

    fn path_in(dir: &tempfile::TempDir, name: &str) -> String {
        dir.path().join(name).to_string_lossy().to_string()
    }

    #[test]
    fn test_rg010_file_schema() {
        let schema = LocalFile::default().schema().unwrap();
        let inputs: Vec<_> = schema.inputs().map(|f| f.name.as_str()).collect();
        assert_eq!(inputs, vec!["path", "content", "permissions.mode", "tags"]);
        assert_eq!(
            schema.field("content_hash").unwrap().direction,
            Direction::Output
        );
    }

    #[test]
    fn test_rg010_file_input_roundtrip() {
        let mut f = LocalFile::new("/tmp/x").with_content("hi");
        f.permissions.mode = Some("0600".into());
        f.tags.insert("team".into(), "infra".into());

        let mut decoded = LocalFile::default();
        decoded.decode_input(&f.input()).unwrap();
        assert_eq!(decoded, f);
    }

    #[test]
    fn test_rg010_file_decode_rejects_bad_mode() {
        let input = Value::object([
            ("path", Value::from("/tmp/x")),
            ("permissions", Value::object([("mode", Value::from("abc"))])),
        ]);
        let err = LocalFile::default().decode_input(&input).unwrap_err();
        assert!(err.to_string().contains("permissions.mode"));
    }

    #[test]
    fn test_rg010_file_fingerprint_ignores_outputs() {
        let a = LocalFile::new("/etc/motd").with_content("hello");
        let mut b = a.clone();
        b.content_hash = Some("blake3:abc".into());
        b.size = Some(5);
        assert_eq!(hasher::compute_instance(&a), hasher::compute_instance(&b));
        let c = LocalFile::new("/etc/motd").with_content("bye");
        assert_ne!(hasher::compute_instance(&a), hasher::compute_instance(&c));
    }

    #[tokio::test]
    async fn test_rg010_file_create_update_delete() {
        let dir = tempfile::tempdir().unwrap();
        let path = path_in(&dir, "nested/motd");

        let mut f = LocalFile::new(&path).with_content("hello");
        f.create(CreateRequest::default()).await.unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "hello");
        assert_eq!(f.size, Some(5));
        assert_eq!(f.content_hash.as_deref(), Some(hasher::hash_string("hello").as_str()));

        let mut next = LocalFile::new(&path).with_content("goodbye");
        next.update(UpdateRequest {
            auth: Auth::default(),
            sources: Vec::new(),
            previous: Box::new(f.clone()),
            source_changed: false,
            config_changed: true,
        })
        .await
        .unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "goodbye");
        assert_eq!(next.size, Some(7));

        next.delete(DeleteRequest::default()).await.unwrap();
        assert!(!Path::new(&path).exists());
        // deleting twice is fine
        next.delete(DeleteRequest::default()).await.unwrap();
    }

    #[tokio::test]
    async fn test_rg010_file_update_moves_path() {
        let dir = tempfile::tempdir().unwrap();
        let old = path_in(&dir, "old.txt");
        let new = path_in(&dir, "new.txt");

        let mut f = LocalFile::new(&old).with_content("x");
        f.create(CreateRequest::default()).await.unwrap();

        let mut moved = LocalFile::new(&new).with_content("x");
        moved
            .update(UpdateRequest {
                auth: Auth::default(),
                sources: Vec::new(),
                previous: Box::new(f),
                source_changed: false,
                config_changed: true,
            })
            .await
            .unwrap();
        assert!(!Path::new(&old).exists());
        assert_eq!(std::fs::read_to_string(&new).unwrap(), "x");
    }

    #[tokio::test]
    async fn test_rg010_file_unchanged_update_keeps_outputs() {
        let dir = tempfile::tempdir().unwrap();
        let path = path_in(&dir, "same.txt");
        let mut f = LocalFile::new(&path).with_content("same");
        f.create(CreateRequest::default()).await.unwrap();

        let mut again = LocalFile::new(&path).with_content("same");
        again
            .update(UpdateRequest {
                auth: Auth::default(),
                sources: Vec::new(),
                previous: Box::new(f.clone()),
                source_changed: false,
                config_changed: false,
            })
            .await
            .unwrap();
        assert_eq!(again.output(), f.output());
    }

    #[tokio::test]
    async fn test_rg010_file_copies_first_source() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("artifact.bin");
        std::fs::write(&src, "payload").unwrap();
        let dest = path_in(&dir, "deployed.bin");

        let mut f = LocalFile::new(&dest);
        f.create(CreateRequest {
            sources: vec![Source::new("artifact", &src)],
            ..CreateRequest::default()
        })
        .await
        .unwrap();
        assert_eq!(std::fs::read_to_string(&dest).unwrap(), "payload");
    }

    #[tokio::test]
    async fn test_rg010_file_update_rejects_other_kind() {
        let mut f = LocalFile::new("/tmp/never-written");
        let err = f
            .update(UpdateRequest {
                auth: Auth::default(),
                sources: Vec::new(),
                previous: Box::new(crate::resources::LocalDirectory::new("/tmp")),
                source_changed: false,
                config_changed: true,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ProvisionError::PreviousMismatch { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_rg010_file_mode() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        let path = path_in(&dir, "secret");
        let mut f = LocalFile::new(&path).with_content("s");
        f.permissions.mode = Some("0600".into());
        f.create(CreateRequest::default()).await.unwrap();
        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
