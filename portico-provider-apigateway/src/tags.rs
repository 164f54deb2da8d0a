//! Tag handling: provider default_tags merged with resource tags

use std::collections::HashMap;

use portico_core::resource::Value;

/// Convert a DSL tag map to plain strings. Non-string values are skipped;
/// the schema rejects them before this point.
pub fn from_value(value: Option<&Value>) -> HashMap<String, String> {
    let mut tags = HashMap::new();
    if let Some(Value::Map(map)) = value {
        for (key, value) in map {
            if let Value::String(v) = value {
                tags.insert(key.clone(), v.clone());
            }
        }
    }
    tags
}

pub fn to_value(tags: &HashMap<String, String>) -> Value {
    Value::Map(
        tags.iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect(),
    )
}

/// Merge default tags with resource tags; the resource's value wins
pub fn merge(
    default_tags: &HashMap<String, String>,
    resource_tags: &HashMap<String, String>,
) -> HashMap<String, String> {
    let mut merged = default_tags.clone();
    merged.extend(resource_tags.iter().map(|(k, v)| (k.clone(), v.clone())));
    merged
}

/// Remove tags that only exist because of the provider's default_tags
pub fn strip_defaults(
    all_tags: &HashMap<String, String>,
    default_tags: &HashMap<String, String>,
) -> HashMap<String, String> {
    all_tags
        .iter()
        .filter(|(k, v)| default_tags.get(*k) != Some(*v))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

/// Changes needed to go from `current` to `desired`
#[derive(Debug, Default, PartialEq, Eq)]
pub struct TagChanges {
    /// Tags to add or overwrite
    pub set: HashMap<String, String>,
    /// Keys to remove, sorted
    pub remove: Vec<String>,
}

impl TagChanges {
    pub fn is_empty(&self) -> bool {
        self.set.is_empty() && self.remove.is_empty()
    }
}

pub fn diff(current: &HashMap<String, String>, desired: &HashMap<String, String>) -> TagChanges {
    let set = desired
        .iter()
        .filter(|(k, v)| current.get(*k) != Some(*v))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();

    let mut remove: Vec<String> = current
        .keys()
        .filter(|k| !desired.contains_key(*k))
        .cloned()
        .collect();
    remove.sort();

    TagChanges { set, remove }
}
