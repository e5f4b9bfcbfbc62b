//! RG-012: Persistence of resource records and graph snapshots per project.
//!
//! Layout of the file store:
//!
//! ```text
//! <root>/<namespace>/<project>/graph.yaml
//! <root>/<namespace>/<project>/resources/<name>.yaml
//! ```
//!
//! Every write goes to a temp file first and is renamed into place.

use super::graph::Graph;
use super::parser::GraphDocument;
use super::types::ResourceRecord;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Store failure, naming the file involved.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("invalid {what} name '{name}'")]
    InvalidName { what: &'static str, name: String },

    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{path}: {message}")]
    Format { path: PathBuf, message: String },
}

/// Scope for stored state.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProjectKey {
    pub namespace: String,
    pub project: String,
}

impl ProjectKey {
    pub fn new(namespace: impl Into<String>, project: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            project: project.into(),
        }
    }
}

impl std::fmt::Display for ProjectKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.namespace, self.project)
    }
}

/// Where provisioned state lives. All operations are idempotent.
pub trait Store {
    fn put_resource(&self, key: &ProjectKey, record: &ResourceRecord) -> Result<(), StoreError>;

    /// Removing a record that does not exist is not an error.
    fn delete_resource(&self, key: &ProjectKey, name: &str) -> Result<(), StoreError>;

    /// Records ordered by resource name.
    fn list_resources(&self, key: &ProjectKey) -> Result<Vec<ResourceRecord>, StoreError>;

    fn put_graph(&self, key: &ProjectKey, graph: &Graph) -> Result<(), StoreError>;

    fn get_graph(&self, key: &ProjectKey) -> Result<Option<Graph>, StoreError>;
}

/// YAML files under a root directory.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding one project's state.
    pub fn project_dir(&self, key: &ProjectKey) -> Result<PathBuf, StoreError> {
        check_name("namespace", &key.namespace)?;
        check_name("project", &key.project)?;
        Ok(self.root.join(&key.namespace).join(&key.project))
    }

    pub fn graph_path(&self, key: &ProjectKey) -> Result<PathBuf, StoreError> {
        Ok(self.project_dir(key)?.join("graph.yaml"))
    }

    pub fn resource_path(&self, key: &ProjectKey, name: &str) -> Result<PathBuf, StoreError> {
        check_name("resource", name)?;
        Ok(self
            .project_dir(key)?
            .join("resources")
            .join(format!("{}.yaml", name)))
    }
}

/// Names become path components; reject anything that could escape the root.
fn check_name(what: &'static str, name: &str) -> Result<(), StoreError> {
    let valid = !name.is_empty()
        && name != "."
        && name != ".."
        && !name.starts_with('.')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if valid {
        Ok(())
    } else {
        Err(StoreError::InvalidName {
            what,
            name: name.to_string(),
        })
    }
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> StoreError + '_ {
    move |source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Write atomically (write to temp, then rename).
fn write_atomic(path: &Path, contents: &str) -> Result<(), StoreError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(io_err(parent))?;
    }
    let tmp_path = path.with_extension("yaml.tmp");
    std::fs::write(&tmp_path, contents).map_err(io_err(&tmp_path))?;
    std::fs::rename(&tmp_path, path).map_err(io_err(path))?;
    Ok(())
}

/// Read a file, or `None` if it does not exist.
fn read_optional(path: &Path) -> Result<Option<String>, StoreError> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(io_err(path)(e)),
    }
}

impl Store for FileStore {
    fn put_resource(&self, key: &ProjectKey, record: &ResourceRecord) -> Result<(), StoreError> {
        let path = self.resource_path(key, &record.name)?;
        let yaml = serde_yaml_ng::to_string(record).map_err(|e| StoreError::Format {
            path: path.clone(),
            message: e.to_string(),
        })?;
        write_atomic(&path, &yaml)?;
        debug!(project = %key, resource = %record.name, "stored resource record");
        Ok(())
    }

    fn delete_resource(&self, key: &ProjectKey, name: &str) -> Result<(), StoreError> {
        let path = self.resource_path(key, name)?;
        match std::fs::remove_file(&path) {
            Ok(()) => {
                debug!(project = %key, resource = %name, "deleted resource record");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_err(&path)(e)),
        }
    }

    fn list_resources(&self, key: &ProjectKey) -> Result<Vec<ResourceRecord>, StoreError> {
        let dir = self.project_dir(key)?.join("resources");
        let read_dir = match std::fs::read_dir(&dir) {
            Ok(rd) => rd,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(io_err(&dir)(e)),
        };

        let mut paths: Vec<PathBuf> = read_dir
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.extension().is_some_and(|ext| ext == "yaml"))
            .collect();
        paths.sort();

        let mut records = Vec::with_capacity(paths.len());
        for path in paths {
            let content = std::fs::read_to_string(&path).map_err(io_err(&path))?;
            let record: ResourceRecord =
                serde_yaml_ng::from_str(&content).map_err(|e| StoreError::Format {
                    path: path.clone(),
                    message: e.to_string(),
                })?;
            records.push(record);
        }
        records.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(records)
    }

    fn put_graph(&self, key: &ProjectKey, graph: &Graph) -> Result<(), StoreError> {
        let path = self.graph_path(key)?;
        let yaml = GraphDocument::from_graph(graph)
            .to_yaml()
            .map_err(|message| StoreError::Format {
                path: path.clone(),
                message,
            })?;
        write_atomic(&path, &yaml)?;
        debug!(project = %key, resources = graph.len(), "stored graph snapshot");
        Ok(())
    }

    fn get_graph(&self, key: &ProjectKey) -> Result<Option<Graph>, StoreError> {
        let path = self.graph_path(key)?;
        let Some(content) = read_optional(&path)? else {
            return Ok(None);
        };
        let format_err = |message: String| StoreError::Format {
            path: path.clone(),
            message,
        };
        let doc: GraphDocument = serde_yaml_ng::from_str(&content)
            .map_err(|e| format_err(e.to_string()))?;
        let graph = doc.into_graph().map_err(|e| format_err(e.to_string()))?;
        Ok(Some(graph))
    }
}
