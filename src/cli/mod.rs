//! RG-014: CLI subcommands: init, validate, plan, snapshot, status, leaves,
//! parents, hash, types.

use crate::core::graph::Graph;
use crate::core::parser;
use crate::core::planner;
use crate::core::registry::Registry;
use crate::core::state::{FileStore, ProjectKey, Store};
use crate::core::types::{ChangePlan, PlanAction};
use crate::core::value::Value;
use crate::tripwire::hasher;
use clap::Subcommand;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Initialize a new rigging project
    Init {
        /// Directory to initialize (default: current)
        #[arg(default_value = ".")]
        path: PathBuf,
    },

    /// Validate a graph document against the registered resource types
    Validate {
        /// Path to graph.yaml
        #[arg(short, long, default_value = "graph.yaml")]
        file: PathBuf,
    },

    /// Show the change plan (desired graph vs stored records)
    Plan {
        /// Path to graph.yaml
        #[arg(short, long, default_value = "graph.yaml")]
        file: PathBuf,

        /// State directory
        #[arg(long, default_value = "state")]
        state_dir: PathBuf,

        #[arg(long, default_value = "default")]
        namespace: String,

        #[arg(long, default_value = "default")]
        project: String,

        /// Print the plan as JSON
        #[arg(long)]
        json: bool,
    },

    /// Record the graph and its fully-known resources as provisioned state
    Snapshot {
        /// Path to graph.yaml
        #[arg(short, long, default_value = "graph.yaml")]
        file: PathBuf,

        /// State directory
        #[arg(long, default_value = "state")]
        state_dir: PathBuf,

        #[arg(long, default_value = "default")]
        namespace: String,

        #[arg(long, default_value = "default")]
        project: String,
    },

    /// Show stored resource records
    Status {
        /// State directory
        #[arg(long, default_value = "state")]
        state_dir: PathBuf,

        #[arg(long, default_value = "default")]
        namespace: String,

        #[arg(long, default_value = "default")]
        project: String,
    },

    /// List resources nothing depends on (safe to destroy first)
    Leaves {
        /// Path to graph.yaml
        #[arg(short, long, default_value = "graph.yaml")]
        file: PathBuf,
    },

    /// List the resources a resource depends on
    Parents {
        /// Path to graph.yaml
        #[arg(short, long, default_value = "graph.yaml")]
        file: PathBuf,

        /// Resource name
        resource: String,
    },

    /// Print input hashes
    Hash {
        /// Path to graph.yaml
        #[arg(short, long, default_value = "graph.yaml")]
        file: PathBuf,

        /// Only this resource
        resource: Option<String>,
    },

    /// List registered resource types and their fields
    Types {
        /// Print schemas as JSON
        #[arg(long)]
        json: bool,
    },
}

/// Dispatch a CLI command.
pub fn dispatch(cmd: Commands) -> Result<(), String> {
    let registry = Registry::with_builtins();
    match cmd {
        Commands::Init { path } => cmd_init(&path),
        Commands::Validate { file } => cmd_validate(&file, &registry),
        Commands::Plan {
            file,
            state_dir,
            namespace,
            project,
            json,
        } => cmd_plan(
            &file,
            &state_dir,
            &ProjectKey::new(namespace, project),
            json,
            &registry,
        ),
        Commands::Snapshot {
            file,
            state_dir,
            namespace,
            project,
        } => cmd_snapshot(
            &file,
            &state_dir,
            &ProjectKey::new(namespace, project),
            &registry,
        ),
        Commands::Status {
            state_dir,
            namespace,
            project,
        } => cmd_status(&state_dir, &ProjectKey::new(namespace, project)),
        Commands::Leaves { file } => cmd_leaves(&file, &registry),
        Commands::Parents { file, resource } => cmd_parents(&file, &resource, &registry),
        Commands::Hash { file, resource } => cmd_hash(&file, resource.as_deref(), &registry),
        Commands::Types { json } => cmd_types(&registry, json),
    }
}

fn cmd_init(path: &Path) -> Result<(), String> {
    let graph_path = path.join("graph.yaml");
    if graph_path.exists() {
        return Err(format!("{} already exists", graph_path.display()));
    }

    let state_dir = path.join("state");
    std::fs::create_dir_all(&state_dir).map_err(|e| format!("cannot create state dir: {}", e))?;

    let template = r#"version: "1.0"
name: my-infrastructure

resources:
  - name: webroot
    type: local_directory
    input:
      path: /tmp/rigging-site
      mode: "0755"
  - name: index
    type: local_file
    input:
      content: "<h1>managed by rigging</h1>"

dependencies:
  - child: index
    field: input.path
    expression: "${webroot.input.path}/index.html"
"#;
    std::fs::write(&graph_path, template)
        .map_err(|e| format!("cannot write {}: {}", graph_path.display(), e))?;

    println!("Initialized rigging project at {}", path.display());
    println!("  Created: {}", graph_path.display());
    println!("  Created: {}/", state_dir.display());
    Ok(())
}

fn cmd_validate(file: &Path, registry: &Registry) -> Result<(), String> {
    let doc = parser::parse_document_file(file)?;
    let errors = parser::validate_document(&doc, registry);

    if errors.is_empty() {
        println!(
            "OK: {} ({} resources, {} dependencies)",
            doc.name.as_deref().unwrap_or("unnamed"),
            doc.resources.len(),
            doc.dependencies.len()
        );
        Ok(())
    } else {
        for e in &errors {
            eprintln!("  ERROR: {}", e);
        }
        Err(format!("{} validation error(s)", errors.len()))
    }
}

/// Parse and validate a graph document, returning errors if invalid.
fn parse_and_validate(file: &Path, registry: &Registry) -> Result<Graph, String> {
    let doc = parser::parse_document_file(file)?;
    let errors = parser::validate_document(&doc, registry);
    if !errors.is_empty() {
        for e in &errors {
            eprintln!("  ERROR: {}", e);
        }
        return Err("validation failed".to_string());
    }
    doc.into_graph().map_err(|e| e.to_string())
}

/// Give every resource without outputs an unknown of its kind's output type,
/// so references to outputs resolve to unknowns instead of failing.
fn mark_unprovisioned(graph: &mut Graph, registry: &Registry) -> Result<(), String> {
    let names: Vec<String> = graph.resources().map(|r| r.name.clone()).collect();
    for name in names {
        let Some(resource) = graph.resource_mut(&name) else {
            continue;
        };
        if resource.output.is_null() {
            let schema = registry
                .schema(&resource.resource_type)
                .map_err(|e| e.to_string())?;
            resource.output = Value::unknown(schema.output_type());
        }
    }
    Ok(())
}

/// Fill outputs from stored records, then resolve every dependency.
fn resolve_against_store(
    graph: &mut Graph,
    store: &FileStore,
    key: &ProjectKey,
    registry: &Registry,
) -> Result<(), String> {
    for rec in store.list_resources(key).map_err(|e| e.to_string())? {
        if let Some(resource) = graph.resource_mut(&rec.name) {
            if resource.resource_type == rec.resource_type {
                resource.output = rec.output;
            }
        }
    }
    mark_unprovisioned(graph, registry)?;
    let pending = graph.resolve_all().map_err(|e| e.to_string())?;
    info!(pending, "resolved dependencies");
    Ok(())
}

fn cmd_plan(
    file: &Path,
    state_dir: &Path,
    key: &ProjectKey,
    json: bool,
    registry: &Registry,
) -> Result<(), String> {
    let mut graph = parse_and_validate(file, registry)?;
    let store = FileStore::new(state_dir);
    resolve_against_store(&mut graph, &store, key, registry)?;

    let records = store.list_resources(key).map_err(|e| e.to_string())?;
    let plan = planner::plan(&graph, &records);

    if json {
        let out = serde_json::to_string_pretty(&plan)
            .map_err(|e| format!("JSON serialize error: {}", e))?;
        println!("{}", out);
    } else {
        print_plan(key, &plan);
    }
    Ok(())
}

/// Display a plan to stdout.
fn print_plan(key: &ProjectKey, plan: &ChangePlan) {
    println!("Planning: {} ({} changes)", key, plan.changes.len());
    println!();
    for change in &plan.changes {
        let symbol = match change.action {
            PlanAction::Create => "+",
            PlanAction::Update => "~",
            PlanAction::Destroy => "-",
            PlanAction::NoOp => " ",
        };
        println!("  {} {}", symbol, change.description);
    }
    println!();
    println!(
        "Plan: {} to add, {} to change, {} to destroy, {} unchanged.",
        plan.to_create, plan.to_update, plan.to_destroy, plan.unchanged
    );
}

fn cmd_snapshot(
    file: &Path,
    state_dir: &Path,
    key: &ProjectKey,
    registry: &Registry,
) -> Result<(), String> {
    let mut graph = parse_and_validate(file, registry)?;
    let store = FileStore::new(state_dir);
    resolve_against_store(&mut graph, &store, key, registry)?;

    let mut recorded = 0;
    let mut skipped = Vec::new();
    for resource in graph.resources() {
        if !resource.input.is_known() {
            skipped.push(resource.name.clone());
            continue;
        }
        store
            .put_resource(key, &planner::record_for(resource))
            .map_err(|e| e.to_string())?;
        recorded += 1;
    }
    for rec in store.list_resources(key).map_err(|e| e.to_string())? {
        if graph.resource(&rec.name).is_none() {
            store
                .delete_resource(key, &rec.name)
                .map_err(|e| e.to_string())?;
        }
    }
    store.put_graph(key, &graph).map_err(|e| e.to_string())?;

    println!("Recorded {} resource(s) for {}", recorded, key);
    if !skipped.is_empty() {
        println!("  Pending inputs: {}", skipped.join(", "));
    }
    Ok(())
}

fn cmd_status(state_dir: &Path, key: &ProjectKey) -> Result<(), String> {
    let store = FileStore::new(state_dir);
    let records = store.list_resources(key).map_err(|e| e.to_string())?;
    if records.is_empty() {
        println!("No state for {}.", key);
        return Ok(());
    }

    println!("Project: {} ({} resources)", key, records.len());
    for rec in &records {
        println!("  {}: [{}] {}", rec.name, rec.resource_type, rec.hash);
    }
    if let Some(graph) = store.get_graph(key).map_err(|e| e.to_string())? {
        println!(
            "  Snapshot: {} resources, {} dependencies",
            graph.len(),
            graph.dependencies().len()
        );
    }
    Ok(())
}

fn cmd_leaves(file: &Path, registry: &Registry) -> Result<(), String> {
    let graph = parse_and_validate(file, registry)?;
    for r in graph.leaf_resources() {
        println!("{}", r.name);
    }
    Ok(())
}

fn cmd_parents(file: &Path, resource: &str, registry: &Registry) -> Result<(), String> {
    let graph = parse_and_validate(file, registry)?;
    if graph.resource(resource).is_none() {
        return Err(format!("resource '{}' not found", resource));
    }
    for r in graph.parent_resources(resource) {
        println!("{}", r.name);
    }
    Ok(())
}

fn cmd_hash(file: &Path, resource: Option<&str>, registry: &Registry) -> Result<(), String> {
    let mut graph = parse_and_validate(file, registry)?;
    mark_unprovisioned(&mut graph, registry)?;
    graph.resolve_all().map_err(|e| e.to_string())?;
    let mut found = false;
    for r in graph.resources() {
        if resource.is_some_and(|name| name != r.name) {
            continue;
        }
        found = true;
        println!("{}  {}", hasher::compute(r), r.name);
    }
    match resource {
        Some(name) if !found => Err(format!("resource '{}' not found", name)),
        _ => Ok(()),
    }
}

fn cmd_types(registry: &Registry, json: bool) -> Result<(), String> {
    if json {
        let mut schemas = serde_json::Map::new();
        for name in registry.types() {
            let schema = registry.schema(name).map_err(|e| e.to_string())?;
            let value = serde_json::to_value(schema.fields())
                .map_err(|e| format!("JSON serialize error: {}", e))?;
            schemas.insert(name.to_string(), value);
        }
        let out = serde_json::to_string_pretty(&schemas)
            .map_err(|e| format!("JSON serialize error: {}", e))?;
        println!("{}", out);
        return Ok(());
    }

    for name in registry.types() {
        println!("{}:", name);
        for field in registry.fields(name).map_err(|e| e.to_string())? {
            println!(
                "  {:<6} {} ({})",
                field.direction.to_string(),
                field.name,
                field.value_type
            );
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn project(dir: &Path) -> PathBuf {
        cmd_init(dir).unwrap();
        dir.join("graph.yaml")
    }

    fn key() -> ProjectKey {
        ProjectKey::new("default", "default")
    }

    #[test]
    fn test_rg014_init() {
        let dir = tempfile::tempdir().unwrap();
        let file = project(dir.path());
        assert!(file.exists());
        assert!(dir.path().join("state").is_dir());
        assert!(cmd_init(dir.path()).unwrap_err().contains("already exists"));
    }

    #[test]
    fn test_rg014_init_template_validates() {
        let dir = tempfile::tempdir().unwrap();
        let file = project(dir.path());
        cmd_validate(&file, &Registry::with_builtins()).unwrap();
    }

    #[test]
    fn test_rg014_validate_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("graph.yaml");
        std::fs::write(
            &file,
            "resources:\n  - name: a\n    type: local_fil\n    input: {}\n",
        )
        .unwrap();
        let err = cmd_validate(&file, &Registry::with_builtins()).unwrap_err();
        assert_eq!(err, "1 validation error(s)");
    }

    #[test]
    fn test_rg014_plan_then_snapshot_then_noop() {
        let dir = tempfile::tempdir().unwrap();
        let file = project(dir.path());
        let state = dir.path().join("state");
        let registry = Registry::with_builtins();

        cmd_plan(&file, &state, &key(), false, &registry).unwrap();
        cmd_snapshot(&file, &state, &key(), &registry).unwrap();

        let store = FileStore::new(&state);
        let records = store.list_resources(&key()).unwrap();
        assert_eq!(records.len(), 2);
        assert!(store.get_graph(&key()).unwrap().is_some());

        let mut graph = parse_and_validate(&file, &registry).unwrap();
        resolve_against_store(&mut graph, &store, &key(), &registry).unwrap();
        let plan = planner::plan(&graph, &records);
        assert!(!plan.has_changes(), "{:?}", plan);
        cmd_plan(&file, &state, &key(), true, &registry).unwrap();
    }

    #[test]
    fn test_rg014_snapshot_drops_removed_records() {
        let dir = tempfile::tempdir().unwrap();
        let file = project(dir.path());
        let state = dir.path().join("state");
        let registry = Registry::with_builtins();
        cmd_snapshot(&file, &state, &key(), &registry).unwrap();

        let yaml = "resources:\n  - name: webroot\n    type: local_directory\n    input:\n      path: /tmp/x\n";
        std::fs::write(&file, yaml).unwrap();
        cmd_snapshot(&file, &state, &key(), &registry).unwrap();

        let records = FileStore::new(&state).list_resources(&key()).unwrap();
        let names: Vec<_> = records.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["webroot"]);
    }

    #[test]
    fn test_rg014_status_empty() {
        let dir = tempfile::tempdir().unwrap();
        cmd_status(dir.path(), &key()).unwrap();
    }

    #[test]
    fn test_rg014_queries() {
        let dir = tempfile::tempdir().unwrap();
        let file = project(dir.path());
        let registry = Registry::with_builtins();
        cmd_leaves(&file, &registry).unwrap();
        cmd_parents(&file, "index", &registry).unwrap();
        assert!(cmd_parents(&file, "ghost", &registry).is_err());
        cmd_hash(&file, None, &registry).unwrap();
        cmd_hash(&file, Some("index"), &registry).unwrap();
        assert!(cmd_hash(&file, Some("ghost"), &registry).is_err());
    }

    #[test]
    fn test_rg014_types() {
        let registry = Registry::with_builtins();
        cmd_types(&registry, false).unwrap();
        cmd_types(&registry, true).unwrap();
    }
}
