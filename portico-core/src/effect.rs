//! Effect - A side effect described as a value
//!
//! Effects are produced by the differ and executed by the interpreter.
//! Nothing touches the provider until an Effect is interpreted.

use crate::resource::{Resource, ResourceId, State};

#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Refresh the recorded state of a resource
    Read { id: ResourceId, identifier: String },
    /// Create a resource that does not exist yet
    Create(Resource),
    /// Change a resource in place
    Update {
        id: ResourceId,
        from: State,
        to: Resource,
        changed_attributes: Vec<String>,
    },
    /// Delete and recreate a resource because an immutable attribute changed
    Replace {
        id: ResourceId,
        from: State,
        to: Resource,
        changed_attributes: Vec<String>,
    },
    /// Delete a resource that is no longer declared
    Delete { id: ResourceId, identifier: String },
}

impl Effect {
    pub fn resource_id(&self) -> &ResourceId {
        match self {
            Effect::Create(resource) => &resource.id,
            Effect::Read { id, .. }
            | Effect::Update { id, .. }
            | Effect::Replace { id, .. }
            | Effect::Delete { id, .. } => id,
        }
    }

    /// Verb shown in plans and apply output
    pub fn action(&self) -> &'static str {
        match self {
            Effect::Read { .. } => "read",
            Effect::Create(_) => "create",
            Effect::Update { .. } => "update",
            Effect::Replace { .. } => "replace",
            Effect::Delete { .. } => "delete",
        }
    }
}

impl std::fmt::Display for Effect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.action(), self.resource_id())
    }
}
