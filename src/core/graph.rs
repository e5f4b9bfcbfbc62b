//! RG-006: Resource graph ownership, referential integrity, topology queries.
//!
//! The graph validates on insertion: names are unique, dependency children
//! exist, and every reference inside a dependency expression names a resource
//! already in the graph. Field paths are not checked against schemas here.
//!
//! No scheduling happens here. An executor provisions a resource only after all
//! of [`Graph::parent_resources`] have completed; resources with disjoint
//! parents may run concurrently.

use super::expression::{EvalContext, EvalError};
use super::path::PathError;
use super::types::{Dependency, Resource};
use indexmap::{IndexMap, IndexSet};
use std::collections::{HashMap, HashSet, VecDeque};
use tracing::debug;

/// Graph construction or resolution failure. Always caller misuse.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GraphError {
    #[error("resource name must not be empty")]
    EmptyName,

    #[error("resource '{name}' has no type")]
    EmptyType { name: String },

    #[error("resource '{name}' already exists")]
    ResourceExists { name: String },

    #[error("resource '{name}' not found")]
    ResourceNotFound { name: String },

    #[error("dependency for field {field} targets unknown resource '{child}'")]
    UnknownChild { child: String, field: String },

    #[error("resource '{child}' field {field}: reference {index} names unknown resource '{target}'")]
    UnknownReference {
        child: String,
        field: String,
        index: usize,
        target: String,
    },

    #[error("resource '{name}' is still referenced by: {}", .dependents.join(", "))]
    ResourceInUse {
        name: String,
        dependents: Vec<String>,
    },

    #[error("dependency cycle: {}", .path.join(" -> "))]
    Cycle { path: Vec<String> },

    #[error("resource '{child}': dependency field {field} must be rooted at 'input'")]
    InvalidField { child: String, field: String },

    #[error("resource '{child}' field {field}: {source}")]
    Resolve {
        child: String,
        field: String,
        #[source]
        source: EvalError,
    },

    #[error("resource '{child}' field {field}: {source}")]
    Assign {
        child: String,
        field: String,
        #[source]
        source: PathError,
    },
}

#[derive(Clone, Copy, PartialEq)]
enum Mark {
    Visiting,
    Done,
}

/// Resources and the dependencies wiring them, both in insertion order.
#[derive(Debug, Clone, Default)]
pub struct Graph {
    resources: IndexMap<String, Resource>,
    dependencies: Vec<Dependency>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    pub fn resources(&self) -> impl Iterator<Item = &Resource> {
        self.resources.values()
    }

    pub fn dependencies(&self) -> &[Dependency] {
        &self.dependencies
    }

    /// Add a resource. Fails on empty name or type, or a duplicate name.
    pub fn add_resource(&mut self, resource: Resource) -> Result<(), GraphError> {
        if resource.name.is_empty() {
            return Err(GraphError::EmptyName);
        }
        if resource.resource_type.is_empty() {
            return Err(GraphError::EmptyType {
                name: resource.name,
            });
        }
        if self.resources.contains_key(&resource.name) {
            return Err(GraphError::ResourceExists {
                name: resource.name,
            });
        }
        debug!(resource = %resource.name, kind = %resource.resource_type, "added resource");
        self.resources.insert(resource.name.clone(), resource);
        Ok(())
    }

    pub fn resource(&self, name: &str) -> Option<&Resource> {
        self.resources.get(name)
    }

    pub fn resource_mut(&mut self, name: &str) -> Option<&mut Resource> {
        self.resources.get_mut(name)
    }

    /// Add a dependency. The child and every reference root must already exist;
    /// on failure the graph is unchanged.
    pub fn add_dependency(&mut self, dependency: Dependency) -> Result<(), GraphError> {
        let Some(child) = self.resources.get(&dependency.child) else {
            return Err(GraphError::UnknownChild {
                child: dependency.child.clone(),
                field: dependency.field.to_string(),
            });
        };
        for (index, path) in dependency.expression.references() {
            if !self.resources.contains_key(path.root()) {
                return Err(GraphError::UnknownReference {
                    child: child.name.clone(),
                    field: dependency.field.to_string(),
                    index,
                    target: path.root().to_string(),
                });
            }
        }

        if let Some(child) = self.resources.get_mut(&dependency.child) {
            for root in dependency.expression.roots() {
                child.deps.insert(root.to_string());
            }
        }
        debug!(
            child = %dependency.child,
            field = %dependency.field,
            expression = %dependency.expression,
            "added dependency"
        );
        self.dependencies.push(dependency);
        Ok(())
    }

    /// Dependencies computing fields of `child`, in insertion order.
    pub fn dependencies_of(&self, child: &str) -> Vec<&Dependency> {
        self.dependencies
            .iter()
            .filter(|d| d.child == child)
            .collect()
    }

    /// Resources referenced by `child`'s dependencies, first-seen order, no duplicates.
    pub fn parent_resources(&self, child: &str) -> Vec<&Resource> {
        self.parent_names(child)
            .into_iter()
            .filter_map(|name| self.resources.get(name))
            .collect()
    }

    /// Resources whose dependencies reference `parent`, first-seen order.
    pub fn child_resources(&self, parent: &str) -> Vec<&Resource> {
        let mut children: IndexSet<&str> = IndexSet::new();
        for dep in &self.dependencies {
            if dep.expression.roots().any(|root| root == parent) {
                children.insert(dep.child.as_str());
            }
        }
        children
            .into_iter()
            .filter_map(|name| self.resources.get(name))
            .collect()
    }

    /// Resources nobody references, in resource insertion order. These can be
    /// destroyed first: nothing consumes their outputs.
    pub fn leaf_resources(&self) -> Vec<&Resource> {
        let parents: HashSet<&str> = self
            .dependencies
            .iter()
            .flat_map(|d| d.expression.roots())
            .collect();
        self.resources
            .values()
            .filter(|r| !parents.contains(r.name.as_str()))
            .collect()
    }

    /// Remove a resource and the dependencies computing its fields. Refuses
    /// while any other resource still references it.
    pub fn remove_resource(&mut self, name: &str) -> Result<Resource, GraphError> {
        if !self.resources.contains_key(name) {
            return Err(GraphError::ResourceNotFound {
                name: name.to_string(),
            });
        }
        let dependents: Vec<String> = self
            .child_resources(name)
            .into_iter()
            .filter(|r| r.name != name)
            .map(|r| r.name.clone())
            .collect();
        if !dependents.is_empty() {
            return Err(GraphError::ResourceInUse {
                name: name.to_string(),
                dependents,
            });
        }

        self.dependencies.retain(|d| d.child != name);
        debug!(resource = %name, "removed resource");
        self.resources
            .shift_remove(name)
            .ok_or_else(|| GraphError::ResourceNotFound {
                name: name.to_string(),
            })
    }

    /// A dependency cycle, if any, as the resource names along it with the
    /// first repeated at the end. Walks resources in insertion order.
    pub fn find_cycle(&self) -> Option<Vec<String>> {
        let topology = Topology::new(&self.dependencies);
        let mut marks: HashMap<&str, Mark> = HashMap::with_capacity(self.resources.len());

        for start in self.resources.keys() {
            if marks.contains_key(start.as_str()) {
                continue;
            }
            marks.insert(start, Mark::Visiting);
            // (resource, index of the next parent to visit)
            let mut stack: Vec<(&str, usize)> = vec![(start.as_str(), 0)];

            while let Some(frame) = stack.last_mut() {
                let (node, next) = *frame;
                let Some(parent) = topology.parent(node, next) else {
                    marks.insert(node, Mark::Done);
                    stack.pop();
                    continue;
                };
                frame.1 += 1;
                match marks.get(parent) {
                    Some(Mark::Done) => {}
                    Some(Mark::Visiting) => {
                        let from = stack.iter().position(|(n, _)| *n == parent).unwrap_or(0);
                        let mut cycle: Vec<String> =
                            stack[from..].iter().map(|(n, _)| n.to_string()).collect();
                        cycle.push(parent.to_string());
                        return Some(cycle);
                    }
                    None => {
                        marks.insert(parent, Mark::Visiting);
                        stack.push((parent, 0));
                    }
                }
            }
        }
        None
    }

    fn parent_names(&self, child: &str) -> IndexSet<&str> {
        self.dependencies
            .iter()
            .filter(|d| d.child == child)
            .flat_map(|d| d.expression.roots())
            .collect()
    }

    /// Bind every resource's `{input, output}` view under its name.
    pub fn eval_context(&self) -> EvalContext {
        let mut ctx = EvalContext::new();
        for resource in self.resources.values() {
            ctx.bind(resource.name.clone(), resource.view());
        }
        ctx
    }

    /// Evaluate `child`'s dependencies in order and write the results into its
    /// input. Returns how many of those fields are still unknown. On error the
    /// input is left as it was.
    pub fn resolve_inputs(&mut self, child: &str) -> Result<usize, GraphError> {
        if !self.resources.contains_key(child) {
            return Err(GraphError::ResourceNotFound {
                name: child.to_string(),
            });
        }
        let ctx = self.eval_context();
        let deps: Vec<&Dependency> = self
            .dependencies
            .iter()
            .filter(|d| d.child == child)
            .collect();
        let resource = self
            .resources
            .get_mut(child)
            .ok_or_else(|| GraphError::ResourceNotFound {
                name: child.to_string(),
            })?;
        apply_dependencies(resource, &deps, &ctx)
    }

    /// Resolve every resource, parents before children. Returns the total
    /// number of fields still unknown.
    pub fn resolve_all(&mut self) -> Result<usize, GraphError> {
        let topology = Topology::new(&self.dependencies);
        let order = resolution_order(&self.resources, &topology);
        if order.len() < self.resources.len() {
            let path = self.find_cycle().unwrap_or_else(|| {
                let ordered: HashSet<&str> = order.iter().map(String::as_str).collect();
                self.resources
                    .keys()
                    .filter(|n| !ordered.contains(n.as_str()))
                    .cloned()
                    .collect()
            });
            return Err(GraphError::Cycle { path });
        }

        let mut ctx = self.eval_context();
        let mut pending = 0;
        for name in order {
            let Some(deps) = topology.dependencies.get(name.as_str()) else {
                continue;
            };
            let Some(resource) = self.resources.get_mut(&name) else {
                continue;
            };
            pending += apply_dependencies(resource, deps, &ctx)?;
            ctx.bind(name, resource.view());
        }
        Ok(pending)
    }
}

/// Parent sets and dependency lists per child, built in one pass over the
/// dependencies.
struct Topology<'a> {
    parents: IndexMap<&'a str, IndexSet<&'a str>>,
    dependencies: IndexMap<&'a str, Vec<&'a Dependency>>,
}

impl<'a> Topology<'a> {
    fn new(dependencies: &'a [Dependency]) -> Self {
        let mut topology = Self {
            parents: IndexMap::new(),
            dependencies: IndexMap::new(),
        };
        for dep in dependencies {
            topology
                .parents
                .entry(dep.child.as_str())
                .or_default()
                .extend(dep.expression.roots());
            topology
                .dependencies
                .entry(dep.child.as_str())
                .or_default()
                .push(dep);
        }
        topology
    }

    fn parent(&self, child: &str, index: usize) -> Option<&'a str> {
        self.parents
            .get(child)
            .and_then(|parents| parents.get_index(index))
            .copied()
    }
}

/// Kahn's algorithm: resources whose parents are all ordered go next, ties in
/// resource insertion order. Resources on a cycle never reach in-degree zero
/// and are left out.
fn resolution_order(
    resources: &IndexMap<String, Resource>,
    topology: &Topology<'_>,
) -> Vec<String> {
    let mut in_degree: HashMap<&str, usize> =
        resources.keys().map(|name| (name.as_str(), 0)).collect();
    let mut children: HashMap<&str, Vec<&str>> = HashMap::new();
    for (child, parents) in &topology.parents {
        for parent in parents {
            if let Some(degree) = in_degree.get_mut(child) {
                *degree += 1;
            }
            children.entry(*parent).or_default().push(*child);
        }
    }

    let mut queue: VecDeque<&str> = resources
        .keys()
        .map(String::as_str)
        .filter(|name| in_degree.get(name) == Some(&0))
        .collect();
    let mut order = Vec::with_capacity(resources.len());
    while let Some(current) = queue.pop_front() {
        order.push(current.to_string());
        for child in children.get(current).into_iter().flatten() {
            if let Some(degree) = in_degree.get_mut(child) {
                *degree -= 1;
                if *degree == 0 {
                    queue.push_back(*child);
                }
            }
        }
    }
    order
}

/// Evaluate `deps` against `ctx` and assign the results into a copy of the
/// resource's input, written back only when every field lands.
fn apply_dependencies(
    resource: &mut Resource,
    deps: &[&Dependency],
    ctx: &EvalContext,
) -> Result<usize, GraphError> {
    let mut resolved = Vec::with_capacity(deps.len());
    for dep in deps {
        if dep.field.root() != "input" {
            return Err(GraphError::InvalidField {
                child: resource.name.clone(),
                field: dep.field.to_string(),
            });
        }
        let value = dep.expression.value(ctx).map_err(|source| GraphError::Resolve {
            child: resource.name.clone(),
            field: dep.field.to_string(),
            source,
        })?;
        resolved.push((&dep.field, value));
    }

    let mut input = resource.input.clone();
    let mut pending = 0;
    for (field, value) in resolved {
        if !value.is_known() {
            pending += 1;
        }
        field
            .assign(&mut input, value)
            .map_err(|source| GraphError::Assign {
                child: resource.name.clone(),
                field: field.to_string(),
                source,
            })?;
    }
    resource.input = input;
    debug!(resource = %resource.name, pending, "resolved inputs");
    Ok(pending)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::expression::{Expression, Part};
    use crate::core::path::Path;
    use crate::core::value::{Value, ValueType};

    fn dep(child: &str, field: &str, template: &str) -> Dependency {
        Dependency::new(
            child,
            Path::parse(field).unwrap(),
            Expression::parse_template(template).unwrap(),
        )
    }

    fn names(resources: Vec<&Resource>) -> Vec<&str> {
        resources.into_iter().map(|r| r.name.as_str()).collect()
    }

    fn foo_bar() -> Graph {
        let mut g = Graph::new();
        g.add_resource(Resource::new("foo", "aws_sqs_queue")).unwrap();
        g.add_resource(Resource::new("bar", "aws_lambda_function")).unwrap();
        g.add_dependency(dep("bar", "input.queue", "${foo.output}")).unwrap();
        g
    }

    #[test]
    fn test_rg006_add_resource_validation() {
        let mut g = Graph::new();
        assert_eq!(g.add_resource(Resource::new("", "t")), Err(GraphError::EmptyName));
        assert_eq!(
            g.add_resource(Resource::new("a", "")),
            Err(GraphError::EmptyType { name: "a".into() })
        );
        g.add_resource(Resource::new("a", "t")).unwrap();
        assert_eq!(
            g.add_resource(Resource::new("a", "other")),
            Err(GraphError::ResourceExists { name: "a".into() })
        );
        assert_eq!(g.len(), 1);
        assert_eq!(g.resource("a").unwrap().resource_type, "t");
        assert!(g.resource("missing").is_none());
    }

    #[test]
    fn test_rg006_unknown_child_leaves_graph_untouched() {
        let mut g = foo_bar();
        let before = g.dependencies().to_vec();
        let err = g.add_dependency(dep("ghost", "input.x", "${foo.output}")).unwrap_err();
        assert!(matches!(err, GraphError::UnknownChild { .. }));
        assert_eq!(g.dependencies(), before.as_slice());
    }

    #[test]
    fn test_rg006_unknown_reference_reports_index() {
        let mut g = foo_bar();
        let err = g
            .add_dependency(dep("bar", "input.url", "https://${foo.output.host}/${nope.output.path}"))
            .unwrap_err();
        assert_eq!(
            err,
            GraphError::UnknownReference {
                child: "bar".into(),
                field: "input.url".into(),
                index: 3,
                target: "nope".into()
            }
        );
        assert_eq!(g.dependencies().len(), 1);
        assert_eq!(g.resource("bar").unwrap().deps.len(), 1);
    }

    #[test]
    fn test_rg006_parents_and_leaves() {
        let g = foo_bar();
        assert_eq!(names(g.parent_resources("bar")), vec!["foo"]);
        assert!(g.parent_resources("foo").is_empty());
        assert_eq!(names(g.leaf_resources()), vec!["bar"]);
        assert_eq!(names(g.child_resources("foo")), vec!["bar"]);
        let deps: Vec<_> = g.resource("bar").unwrap().deps.iter().cloned().collect();
        assert_eq!(deps, vec!["foo".to_string()]);
    }

    #[test]
    fn test_rg006_parents_first_seen_without_duplicates() {
        let mut g = Graph::new();
        for n in ["a", "b", "c", "d"] {
            g.add_resource(Resource::new(n, "t")).unwrap();
        }
        g.add_dependency(dep("d", "input.x", "${c.output.x}-${a.output.y}")).unwrap();
        g.add_dependency(dep("d", "input.y", "${a.output.z}${b.output}")).unwrap();
        assert_eq!(names(g.parent_resources("d")), vec!["c", "a", "b"]);
        assert_eq!(names(g.leaf_resources()), vec!["d"]);
    }

    #[test]
    fn test_rg006_leaves_keep_insertion_order() {
        let mut g = Graph::new();
        for n in ["zeta", "alpha", "mid"] {
            g.add_resource(Resource::new(n, "t")).unwrap();
        }
        assert_eq!(names(g.leaf_resources()), vec!["zeta", "alpha", "mid"]);
    }

    #[test]
    fn test_rg006_dependencies_of_in_insertion_order() {
        let mut g = foo_bar();
        g.add_dependency(dep("bar", "input.b", "x")).unwrap();
        g.add_dependency(dep("foo", "input.z", "y")).unwrap();
        g.add_dependency(dep("bar", "input.a", "z")).unwrap();
        let fields: Vec<_> = g
            .dependencies_of("bar")
            .iter()
            .map(|d| d.field.to_string())
            .collect();
        assert_eq!(fields, vec!["input.queue", "input.b", "input.a"]);
        assert!(g.dependencies_of("nobody").is_empty());
    }

    #[test]
    fn test_rg006_remove_resource() {
        let mut g = foo_bar();
        let err = g.remove_resource("foo").unwrap_err();
        assert_eq!(
            err,
            GraphError::ResourceInUse {
                name: "foo".into(),
                dependents: vec!["bar".into()]
            }
        );
        assert!(err.to_string().contains("referenced by: bar"));
        let removed = g.remove_resource("bar").unwrap();
        assert_eq!(removed.name, "bar");
        assert!(g.dependencies().is_empty());
        g.remove_resource("foo").unwrap();
        assert!(g.is_empty());
        assert!(matches!(
            g.remove_resource("foo"),
            Err(GraphError::ResourceNotFound { .. })
        ));
    }

    #[test]
    fn test_rg006_find_cycle() {
        let mut g = Graph::new();
        for n in ["a", "b", "c"] {
            g.add_resource(Resource::new(n, "t")).unwrap();
        }
        g.add_dependency(dep("b", "input.x", "${a.output}")).unwrap();
        g.add_dependency(dep("c", "input.x", "${b.output}")).unwrap();
        assert_eq!(g.find_cycle(), None);
        g.add_dependency(dep("a", "input.x", "${c.output}")).unwrap();
        assert_eq!(
            g.find_cycle(),
            Some(vec!["a".into(), "c".into(), "b".into(), "a".into()])
        );
    }

    #[test]
    fn test_rg006_self_reference_is_a_cycle() {
        let mut g = Graph::new();
        g.add_resource(Resource::new("a", "t")).unwrap();
        g.add_dependency(dep("a", "input.x", "${a.input.y}")).unwrap();
        assert_eq!(g.find_cycle(), Some(vec!["a".into(), "a".into()]));
        assert!(g.leaf_resources().is_empty());
    }

    #[test]
    fn test_rg006_resolve_inputs_unknown_then_known() {
        let mut g = Graph::new();
        g.add_resource(
            Resource::new("queue", "aws_sqs_queue")
                .with_output(Value::unknown(ValueType::Object(vec![("url".into(), ValueType::String)]))),
        )
        .unwrap();
        g.add_resource(
            Resource::new("worker", "aws_lambda_function")
                .with_input(Value::object([("runtime", Value::from("provided.al2"))])),
        )
        .unwrap();
        g.add_dependency(dep("worker", "input.environment.QUEUE_URL", "${queue.output.url}"))
            .unwrap();
        g.add_dependency(dep("worker", "input.description", "reads ${queue.output.url}"))
            .unwrap();

        assert_eq!(g.resolve_inputs("worker").unwrap(), 2);
        let input = &g.resource("worker").unwrap().input;
        assert_eq!(
            Path::parse("w.environment.QUEUE_URL").unwrap().navigate(input).unwrap(),
            Value::unknown(ValueType::String)
        );

        g.resource_mut("queue").unwrap().output =
            Value::object([("url", Value::from("https://sqs/123/jobs"))]);
        assert_eq!(g.resolve_inputs("worker").unwrap(), 0);
        let input = &g.resource("worker").unwrap().input;
        assert_eq!(
            Path::parse("w.description").unwrap().navigate(input).unwrap(),
            Value::from("reads https://sqs/123/jobs")
        );
        assert_eq!(
            Path::parse("w.runtime").unwrap().navigate(input).unwrap(),
            Value::from("provided.al2")
        );
    }

    #[test]
    fn test_rg006_resolve_inputs_errors() {
        let mut g = foo_bar();
        assert!(matches!(
            g.resolve_inputs("ghost"),
            Err(GraphError::ResourceNotFound { .. })
        ));

        // foo.output is null, so navigating into it fails
        g.add_dependency(dep("bar", "input.host", "${foo.output.host}")).unwrap();
        let err = g.resolve_inputs("bar").unwrap_err();
        assert!(matches!(err, GraphError::Resolve { ref field, .. } if field == "input.host"));

        let mut g = foo_bar();
        g.add_dependency(Dependency::new(
            "bar",
            Path::parse("output.x").unwrap(),
            Expression::new(vec![Part::Literal(Value::from(1))]),
        ))
        .unwrap();
        assert!(matches!(
            g.resolve_inputs("bar"),
            Err(GraphError::InvalidField { .. })
        ));
    }

    #[test]
    fn test_rg006_resolve_all_parents_first() {
        let mut g = Graph::new();
        // child declared before its parent
        g.add_resource(Resource::new("index", "local_file")).unwrap();
        g.add_resource(Resource::new("site", "local_directory")).unwrap();
        g.add_resource(
            Resource::new("root", "local_directory")
                .with_input(Value::object([("path", Value::from("/srv"))])),
        )
        .unwrap();
        g.add_dependency(dep("index", "input.path", "${site.input.path}/index.html"))
            .unwrap();
        g.add_dependency(dep("site", "input.path", "${root.input.path}/site")).unwrap();

        assert_eq!(g.resolve_all().unwrap(), 0);
        assert_eq!(
            g.resource("index").unwrap().input,
            Value::object([("path", Value::from("/srv/site/index.html"))])
        );
    }

    #[test]
    fn test_rg006_resolve_all_rejects_cycle() {
        let mut g = Graph::new();
        g.add_resource(Resource::new("a", "t")).unwrap();
        g.add_resource(Resource::new("b", "t")).unwrap();
        g.add_dependency(dep("a", "input.x", "${b.input.x}")).unwrap();
        g.add_dependency(dep("b", "input.x", "${a.input.x}")).unwrap();
        let err = g.resolve_all().unwrap_err();
        assert_eq!(err.to_string(), "dependency cycle: a -> b -> a");
    }

    #[test]
    fn test_rg006_failed_assign_leaves_input_unchanged() {
        let mut g = Graph::new();
        g.add_resource(
            Resource::new("a", "t").with_input(Value::object([("keep", Value::from(1))])),
        )
        .unwrap();
        g.add_dependency(dep("a", "input.name", "set")).unwrap();
        g.add_dependency(dep("a", "input.keep[3]", "x")).unwrap();
        let before = g.resource("a").unwrap().input.clone();

        let err = g.resolve_inputs("a").unwrap_err();
        assert!(matches!(err, GraphError::Assign { ref field, .. } if field == "input.keep[3]"));
        assert_eq!(g.resource("a").unwrap().input, before);

        let err = g.resolve_all().unwrap_err();
        assert!(matches!(err, GraphError::Assign { .. }));
        assert_eq!(g.resource("a").unwrap().input, before);
    }

    #[test]
    fn test_rg006_resolve_all_long_chain() {
        let n = 20_000;
        let mut g = Graph::new();
        g.add_resource(
            Resource::new("r0", "t").with_input(Value::object([("x", Value::from("seed"))])),
        )
        .unwrap();
        for i in 1..n {
            g.add_resource(Resource::new(format!("r{i}"), "t")).unwrap();
            g.add_dependency(dep(&format!("r{i}"), "input.x", &format!("${{r{}.input.x}}", i - 1)))
                .unwrap();
        }
        assert_eq!(g.find_cycle(), None);
        assert_eq!(g.resolve_all().unwrap(), 0);
        assert_eq!(
            g.resource(&format!("r{}", n - 1)).unwrap().input,
            Value::object([("x", Value::from("seed"))])
        );
    }

    #[test]
    fn test_rg006_long_cycle_is_found() {
        let n = 20_000;
        let mut g = Graph::new();
        for i in 0..n {
            g.add_resource(Resource::new(format!("r{i}"), "t")).unwrap();
        }
        for i in 0..n {
            let parent = (i + 1) % n;
            g.add_dependency(dep(&format!("r{i}"), "input.x", &format!("${{r{parent}.input.x}}")))
                .unwrap();
        }
        let cycle = g.find_cycle().unwrap();
        assert_eq!(cycle.len(), n + 1);
        assert_eq!(cycle.first(), cycle.last());
        assert!(matches!(g.resolve_all(), Err(GraphError::Cycle { .. })));
    }

    #[test]
    fn test_rg006_eval_context_binds_views() {
        let g = foo_bar();
        let ctx = g.eval_context();
        assert_eq!(ctx.len(), 2);
        assert_eq!(ctx.get("foo"), Some(&g.resource("foo").unwrap().view()));
    }
}
