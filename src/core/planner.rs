//! RG-013: Plan generation: diff the desired graph against stored records.
//!
//! Classification only. Ordering the resulting calls is the executor's job
//! (parents before children for create/update, leaves first for destroy).

use super::graph::Graph;
use super::types::{ChangePlan, PlanAction, PlannedChange, Resource, ResourceRecord};
use crate::tripwire::hasher;
use std::collections::HashMap;
use tracing::debug;

/// Compare every resource in `graph` to its stored record.
///
/// - no record → CREATE
/// - stored type differs → DESTROY the old kind, then CREATE
/// - input hash or sources differ → UPDATE
/// - otherwise → NO-OP
///
/// Records with no resource in the graph become DESTROY, in record order.
pub fn plan(graph: &Graph, records: &[ResourceRecord]) -> ChangePlan {
    let stored: HashMap<&str, &ResourceRecord> =
        records.iter().map(|r| (r.name.as_str(), r)).collect();
    let mut plan = ChangePlan::default();

    for resource in graph.resources() {
        let desired_hash = hasher::compute(resource);
        let record = stored.get(resource.name.as_str()).copied();

        if let Some(rec) = record.filter(|rec| rec.resource_type != resource.resource_type) {
            push(&mut plan, destroy(rec, "type changed"));
        }

        let action = determine_action(resource, &desired_hash, record);
        let description = describe_action(resource, &desired_hash, action, record);
        push(
            &mut plan,
            PlannedChange {
                resource: resource.name.clone(),
                resource_type: resource.resource_type.clone(),
                action,
                pending_inputs: !resource.input.is_known(),
                hash: desired_hash,
                description,
            },
        );
    }

    for rec in records {
        if graph.resource(&rec.name).is_none() {
            push(&mut plan, destroy(rec, "removed from graph"));
        }
    }

    debug!(
        create = plan.to_create,
        update = plan.to_update,
        destroy = plan.to_destroy,
        unchanged = plan.unchanged,
        "planned changes"
    );
    plan
}

/// Determine what action to take for one resource.
fn determine_action(
    resource: &Resource,
    desired_hash: &str,
    record: Option<&ResourceRecord>,
) -> PlanAction {
    match record {
        None => PlanAction::Create,
        Some(rec) if rec.resource_type != resource.resource_type => PlanAction::Create,
        Some(rec) if rec.hash != desired_hash || rec.sources != resource.sources => {
            PlanAction::Update
        }
        Some(_) => PlanAction::NoOp,
    }
}

fn describe_action(
    resource: &Resource,
    desired_hash: &str,
    action: PlanAction,
    record: Option<&ResourceRecord>,
) -> String {
    let pending = if resource.input.is_known() {
        ""
    } else {
        " (inputs pending)"
    };
    match (action, record) {
        (PlanAction::Update, Some(rec)) if rec.hash == desired_hash => {
            format!("{}: sources changed{}", resource.name, pending)
        }
        (PlanAction::Update, _) => format!("{}: inputs changed{}", resource.name, pending),
        (PlanAction::Create, _) => format!(
            "{}: create {}{}",
            resource.name, resource.resource_type, pending
        ),
        (PlanAction::NoOp, _) => format!("{}: up to date", resource.name),
        (PlanAction::Destroy, _) => format!("{}: destroy", resource.name),
    }
}

fn destroy(rec: &ResourceRecord, reason: &str) -> PlannedChange {
    PlannedChange {
        resource: rec.name.clone(),
        resource_type: rec.resource_type.clone(),
        action: PlanAction::Destroy,
        pending_inputs: false,
        hash: String::new(),
        description: format!("{}: destroy {} ({})", rec.name, rec.resource_type, reason),
    }
}

fn push(plan: &mut ChangePlan, change: PlannedChange) {
    match change.action {
        PlanAction::Create => plan.to_create += 1,
        PlanAction::Update => plan.to_update += 1,
        PlanAction::Destroy => plan.to_destroy += 1,
        PlanAction::NoOp => plan.unchanged += 1,
    }
    plan.changes.push(change);
}

/// A record for a resource as it stands now.
pub fn record_for(resource: &Resource) -> ResourceRecord {
    ResourceRecord {
        name: resource.name.clone(),
        resource_type: resource.resource_type.clone(),
        hash: hasher::compute(resource),
        output: resource.output.clone(),
        sources: resource.sources.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::value::{Value, ValueType};

    fn file(name: &str, content: &str) -> Resource {
        Resource::new(name, "local_file").with_input(Value::object([
            ("path", Value::from(format!("/srv/{}", name))),
            ("content", Value::from(content)),
        ]))
    }

    fn graph(resources: Vec<Resource>) -> Graph {
        let mut g = Graph::new();
        for r in resources {
            g.add_resource(r).unwrap();
        }
        g
    }

    fn actions(plan: &ChangePlan) -> Vec<(String, PlanAction)> {
        plan.changes
            .iter()
            .map(|c| (c.resource.clone(), c.action))
            .collect()
    }

    #[test]
    fn test_rg013_all_create_when_no_records() {
        let g = graph(vec![file("a", "1"), file("b", "2")]);
        let p = plan(&g, &[]);
        assert_eq!(p.to_create, 2);
        assert!(p.has_changes());
        assert_eq!(p.changes[0].description, "a: create local_file");
        assert!(p.changes[0].hash.starts_with("blake3:"));
    }

    #[test]
    fn test_rg013_noop_when_hash_matches() {
        let a = file("a", "1");
        let records = vec![record_for(&a)];
        let p = plan(&graph(vec![a]), &records);
        assert_eq!(actions(&p), vec![("a".to_string(), PlanAction::NoOp)]);
        assert!(!p.has_changes());
    }

    #[test]
    fn test_rg013_output_change_is_noop() {
        let a = file("a", "1");
        let records = vec![record_for(&a)];
        let provisioned = a.with_output(Value::object([("size", Value::from(1))]));
        let p = plan(&graph(vec![provisioned]), &records);
        assert_eq!(p.unchanged, 1);
    }

    #[test]
    fn test_rg013_update_on_input_change() {
        let records = vec![record_for(&file("a", "old"))];
        let p = plan(&graph(vec![file("a", "new")]), &records);
        assert_eq!(p.to_update, 1);
        assert_eq!(p.changes[0].description, "a: inputs changed");
    }

    #[test]
    fn test_rg013_update_on_sources_change() {
        let a = file("a", "1");
        let records = vec![record_for(&a)];
        let with_source = a.with_sources(vec!["blake3:artifact".into()]);
        let p = plan(&graph(vec![with_source]), &records);
        assert_eq!(p.to_update, 1);
        assert_eq!(p.changes[0].description, "a: sources changed");
    }

    #[test]
    fn test_rg013_pending_inputs_flagged() {
        let mut a = file("a", "1");
        let records = vec![record_for(&a)];
        a.input = Value::object([("path", Value::unknown(ValueType::String))]);
        let p = plan(&graph(vec![a]), &records);
        assert!(p.changes[0].pending_inputs);
        assert_eq!(p.changes[0].action, PlanAction::Update);
        assert!(p.changes[0].description.ends_with("(inputs pending)"));
    }

    #[test]
    fn test_rg013_destroy_removed_records() {
        let records = vec![record_for(&file("a", "1")), record_for(&file("gone", "x"))];
        let p = plan(&graph(vec![file("a", "1")]), &records);
        assert_eq!(
            actions(&p),
            vec![
                ("a".to_string(), PlanAction::NoOp),
                ("gone".to_string(), PlanAction::Destroy)
            ]
        );
        assert_eq!(p.changes[1].hash, "");
    }

    #[test]
    fn test_rg013_type_change_replaces() {
        let old = Resource::new("site", "local_directory")
            .with_input(Value::object([("path", Value::from("/srv/site"))]));
        let records = vec![record_for(&old)];
        let p = plan(&graph(vec![file("site", "x")]), &records);
        assert_eq!(
            actions(&p),
            vec![
                ("site".to_string(), PlanAction::Destroy),
                ("site".to_string(), PlanAction::Create)
            ]
        );
        assert_eq!(p.changes[0].resource_type, "local_directory");
        assert!(p.changes[0].description.contains("type changed"));
    }
}
