//! Differ - Compare desired state with current state to generate a Plan
//!
//! Compares the desired state declared in the DSL with the current state
//! fetched from the Provider, and generates the Effects needed to converge.

use std::collections::{BTreeSet, HashMap};

use crate::effect::Effect;
use crate::plan::Plan;
use crate::resource::{Resource, ResourceId, State, Value};
use crate::schema::{AttributeSchema, AttributeType, BlockSchema, ResourceSchema};

/// Result of a diff operation
#[derive(Debug, Clone, PartialEq)]
pub enum Diff {
    /// Resource does not exist -> needs creation
    Create(Resource),
    /// Resource exists with differences that can be applied in place
    Update {
        id: ResourceId,
        from: State,
        to: Resource,
        changed_attributes: Vec<String>,
    },
    /// Resource exists and an immutable attribute changed
    Replace {
        id: ResourceId,
        from: State,
        to: Resource,
        changed_attributes: Vec<String>,
    },
    /// Resource exists with no differences -> no action needed
    NoChange(ResourceId),
}

/// Compare desired state with current state to compute a Diff
///
/// With a schema, computed and local attributes are ignored, attributes
/// removed from the configuration count as changes, and a change to a
/// `force_new` attribute turns the update into a replacement.
pub fn diff(desired: &Resource, current: &State, schema: Option<&ResourceSchema>) -> Diff {
    if !current.exists {
        return Diff::Create(desired.clone());
    }

    let changed = find_changed_attributes(&desired.attributes, &current.attributes, schema);

    if changed.is_empty() {
        return Diff::NoChange(desired.id.clone());
    }

    let forces_replacement = schema.is_some_and(|schema| {
        changed
            .iter()
            .any(|name| schema.attributes.get(name).is_some_and(|a| a.force_new))
    });

    if forces_replacement {
        Diff::Replace {
            id: desired.id.clone(),
            from: current.clone(),
            to: desired.clone(),
            changed_attributes: changed,
        }
    } else {
        Diff::Update {
            id: desired.id.clone(),
            from: current.clone(),
            to: desired.clone(),
            changed_attributes: changed,
        }
    }
}

/// Find changed attributes between desired and current state
fn find_changed_attributes(
    desired: &HashMap<String, Value>,
    current: &HashMap<String, Value>,
    schema: Option<&ResourceSchema>,
) -> Vec<String> {
    let mut names: BTreeSet<&String> = desired.keys().collect();
    if let Some(schema) = schema {
        names.extend(current.keys().filter(|k| schema.attributes.contains_key(*k)));
    }

    let mut changed = Vec::new();
    for key in names {
        // Skip internal attributes (starting with _)
        if key.starts_with('_') {
            continue;
        }

        let attr_schema = schema.and_then(|s| s.attributes.get(key));
        if attr_schema.is_some_and(|a| a.is_read_only() || a.local) {
            continue;
        }

        if !values_match(desired.get(key), current.get(key), attr_schema) {
            changed.push(key.clone());
        }
    }

    changed
}

fn values_match(
    desired: Option<&Value>,
    current: Option<&Value>,
    schema: Option<&AttributeSchema>,
) -> bool {
    let desired = desired.filter(|v| !v.is_empty());
    let current = current.filter(|v| !v.is_empty());

    match (desired, current, schema.map(|s| &s.attr_type)) {
        (None, None, _) => true,
        (Some(d), Some(c), Some(AttributeType::Block(block))) => {
            comparable_blocks(d, block) == comparable_blocks(c, block)
        }
        (Some(d), Some(c), _) => d == c,
        _ => false,
    }
}

/// Block instances with computed and empty entries removed
fn comparable_blocks(value: &Value, block: &BlockSchema) -> Option<Vec<HashMap<String, Value>>> {
    let instances = BlockSchema::instances(value)?;
    Some(
        instances
            .into_iter()
            .map(|map| {
                map.iter()
                    .filter(|(k, v)| {
                        !v.is_empty()
                            && !block
                                .attributes
                                .get(*k)
                                .is_some_and(|a| a.is_read_only() || a.local)
                    })
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect()
            })
            .collect(),
    )
}

/// Compute Diffs for all declared resources and generate a Plan.
///
/// Resources present in `current_states` but no longer declared are deleted.
/// `schemas` is keyed by resource type.
pub fn create_plan(
    desired: &[Resource],
    current_states: &HashMap<ResourceId, State>,
    schemas: &HashMap<String, ResourceSchema>,
) -> Plan {
    let mut plan = Plan::new();

    for resource in desired {
        let current = current_states
            .get(&resource.id)
            .cloned()
            .unwrap_or_else(|| State::not_found(resource.id.clone()));

        let schema = schemas.get(&resource.id.resource_type);
        match diff(resource, &current, schema) {
            Diff::Create(r) => plan.add(Effect::Create(r)),
            Diff::Update {
                id,
                from,
                to,
                changed_attributes,
            } => plan.add(Effect::Update {
                id,
                from,
                to,
                changed_attributes,
            }),
            Diff::Replace {
                id,
                from,
                to,
                changed_attributes,
            } => plan.add(Effect::Replace {
                id,
                from,
                to,
                changed_attributes,
            }),
            Diff::NoChange(_) => {}
        }
    }

    let mut orphans: Vec<&State> = current_states
        .values()
        .filter(|s| s.exists && !desired.iter().any(|r| r.id == s.id))
        .collect();
    orphans.sort_by(|a, b| a.id.name.cmp(&b.id.name));
    for state in orphans {
        if let Some(identifier) = &state.identifier {
            plan.add(Effect::Delete {
                id: state.id.clone(),
                identifier: identifier.clone(),
            });
        }
    }

    plan
}
