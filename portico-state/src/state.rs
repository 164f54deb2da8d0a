//! State file structures for persisting managed domain names

use std::collections::HashMap;

use portico_core::resource::{ResourceId, State, Value};
use serde::{Deserialize, Serialize};

/// The state file persisted by a backend
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateFile {
    /// State file format version
    pub version: u32,
    /// Incremented on every write
    pub serial: u64,
    /// Identifies this state's history; a write with another lineage is rejected
    pub lineage: String,
    /// Version of Portico that last wrote this state
    pub portico_version: String,
    pub resources: Vec<ResourceState>,
}

impl StateFile {
    pub const CURRENT_VERSION: u32 = 1;

    pub fn new() -> Self {
        Self::with_lineage(uuid::Uuid::new_v4().to_string())
    }

    pub fn with_lineage(lineage: String) -> Self {
        Self {
            version: Self::CURRENT_VERSION,
            serial: 0,
            lineage,
            portico_version: env!("CARGO_PKG_VERSION").to_string(),
            resources: Vec::new(),
        }
    }

    /// Increment serial and stamp the current Portico version
    pub fn increment_serial(&mut self) {
        self.serial += 1;
        self.portico_version = env!("CARGO_PKG_VERSION").to_string();
    }

    pub fn find_resource(&self, resource_type: &str, name: &str) -> Option<&ResourceState> {
        self.resources
            .iter()
            .find(|r| r.resource_type == resource_type && r.name == name)
    }

    /// Find a resource by its `type.name` address
    pub fn find_by_address(&self, address: &str) -> Option<&ResourceState> {
        self.resources.iter().find(|r| r.address() == address)
    }

    pub fn upsert_resource(&mut self, resource: ResourceState) {
        if let Some(existing) = self
            .resources
            .iter_mut()
            .find(|r| r.resource_type == resource.resource_type && r.name == resource.name)
        {
            *existing = resource;
        } else {
            self.resources.push(resource);
        }
    }

    pub fn remove_resource(&mut self, resource_type: &str, name: &str) -> Option<ResourceState> {
        let pos = self
            .resources
            .iter()
            .position(|r| r.resource_type == resource_type && r.name == name)?;
        Some(self.resources.remove(pos))
    }

    /// Record the outcome of an operation: existing states are stored,
    /// not-found states remove the entry.
    pub fn apply_state(&mut self, state: &State, provider: &str) {
        if state.exists {
            self.upsert_resource(ResourceState::from_state(state, provider));
        } else {
            self.remove_resource(&state.id.resource_type, &state.id.name);
        }
    }
}

impl Default for StateFile {
    fn default() -> Self {
        Self::new()
    }
}

/// State of a single managed resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceState {
    /// Resource type without provider prefix (e.g., "domain_name")
    pub resource_type: String,
    /// Address name (the `let` binding, or the domain name for anonymous resources)
    pub name: String,
    pub provider: String,
    /// External identifier (the domain name)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identifier: Option<String>,
    pub attributes: HashMap<String, serde_json::Value>,
}

impl ResourceState {
    pub fn new(
        resource_type: impl Into<String>,
        name: impl Into<String>,
        provider: impl Into<String>,
    ) -> Self {
        Self {
            resource_type: resource_type.into(),
            name: name.into(),
            provider: provider.into(),
            identifier: None,
            attributes: HashMap::new(),
        }
    }

    pub fn with_identifier(mut self, identifier: impl Into<String>) -> Self {
        self.identifier = Some(identifier.into());
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }

    pub fn address(&self) -> String {
        format!("{}.{}", self.resource_type, self.name)
    }

    pub fn id(&self) -> ResourceId {
        ResourceId::new(&self.resource_type, &self.name)
    }

    pub fn from_state(state: &State, provider: &str) -> Self {
        Self {
            resource_type: state.id.resource_type.clone(),
            name: state.id.name.clone(),
            provider: provider.to_string(),
            identifier: state.identifier.clone(),
            attributes: state
                .attributes
                .iter()
                .map(|(k, v)| (k.clone(), v.to_json()))
                .collect(),
        }
    }

    pub fn to_state(&self) -> State {
        let attributes = self
            .attributes
            .iter()
            .filter_map(|(k, v)| Value::from_json(v).map(|v| (k.clone(), v)))
            .collect();
        let state = State::existing(self.id(), attributes);
        match &self.identifier {
            Some(identifier) => state.with_identifier(identifier.clone()),
            None => state,
        }
    }
}
