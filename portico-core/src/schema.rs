//! Schema - Define type schemas for resources
//!
//! Providers define schemas for each resource type, enabling validation of
//! the declared configuration before any call is made to the provider.

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use crate::resource::Value;

/// Attribute type
#[derive(Debug, Clone)]
pub enum AttributeType {
    /// String
    String,
    /// String whose length in characters must be within `min..=max`
    BoundedString { min: usize, max: usize },
    /// Integer
    Int,
    /// Boolean
    Bool,
    /// Enum. Values may be written bare (`REGIONAL`) or namespaced
    /// (`EndpointType.REGIONAL`, `apigateway.domain_name.EndpointType.REGIONAL`).
    Enum { name: String, variants: Vec<String> },
    /// Custom type (with validation function)
    Custom {
        name: String,
        base: Box<AttributeType>,
        validate: fn(&Value) -> Result<(), String>,
    },
    /// List
    List(Box<AttributeType>),
    /// Map
    Map(Box<AttributeType>),
    /// Nested configuration block, written as `name { ... }` in the DSL
    Block(BlockSchema),
}

impl AttributeType {
    pub fn enumeration(name: impl Into<String>, variants: &[&str]) -> Self {
        AttributeType::Enum {
            name: name.into(),
            variants: variants.iter().map(|v| v.to_string()).collect(),
        }
    }

    /// Check if a value conforms to this type
    pub fn validate(&self, value: &Value) -> Result<(), TypeError> {
        match (self, value) {
            (AttributeType::String, Value::String(_)) => Ok(()),
            (AttributeType::Int, Value::Int(_)) => Ok(()),
            (AttributeType::Bool, Value::Bool(_)) => Ok(()),

            (AttributeType::BoundedString { min, max }, Value::String(s)) => {
                let length = s.chars().count();
                if length < *min || length > *max {
                    Err(TypeError::LengthOutOfRange {
                        length,
                        min: *min,
                        max: *max,
                    })
                } else {
                    Ok(())
                }
            }

            (AttributeType::Enum { name, variants }, Value::String(s)) => {
                match enum_variant(name, s) {
                    Some(variant) if variants.iter().any(|v| v == variant) => Ok(()),
                    _ => Err(TypeError::InvalidEnumVariant {
                        value: s.clone(),
                        expected: variants.clone(),
                    }),
                }
            }

            (AttributeType::Custom { validate, .. }, v) => {
                validate(v).map_err(|msg| TypeError::ValidationFailed { message: msg })
            }

            (AttributeType::List(inner), Value::List(items)) => {
                for (i, item) in items.iter().enumerate() {
                    inner.validate(item).map_err(|e| TypeError::ListItemError {
                        index: i,
                        inner: Box::new(e),
                    })?;
                }
                Ok(())
            }

            (AttributeType::Map(inner), Value::Map(map)) => {
                for (k, v) in map {
                    inner.validate(v).map_err(|e| TypeError::MapValueError {
                        key: k.clone(),
                        inner: Box::new(e),
                    })?;
                }
                Ok(())
            }

            (AttributeType::Block(block), v) => {
                let mut errors = Vec::new();
                block.validate_value("", v, &mut errors);
                match errors.into_iter().next() {
                    Some(e) => Err(e.error),
                    None => Ok(()),
                }
            }

            _ => Err(TypeError::TypeMismatch {
                expected: self.type_name(),
                got: value.type_name(),
            }),
        }
    }

    fn type_name(&self) -> String {
        match self {
            AttributeType::String => "String".to_string(),
            AttributeType::BoundedString { min, max } => format!("String({}..={})", min, max),
            AttributeType::Int => "Int".to_string(),
            AttributeType::Bool => "Bool".to_string(),
            AttributeType::Enum { name, variants } => {
                format!("{}({})", name, variants.join(" | "))
            }
            AttributeType::Custom { name, .. } => name.clone(),
            AttributeType::List(inner) => format!("List<{}>", inner.type_name()),
            AttributeType::Map(inner) => format!("Map<{}>", inner.type_name()),
            AttributeType::Block(_) => "Block".to_string(),
        }
    }
}

impl fmt::Display for AttributeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.type_name())
    }
}

/// Extract the variant from a possibly namespaced enum value.
///
/// `REGIONAL`, `EndpointType.REGIONAL` and `x.y.EndpointType.REGIONAL` all
/// yield `REGIONAL`; a namespaced value whose type segment is not `type_name`
/// yields `None`.
pub fn enum_variant<'a>(type_name: &str, value: &'a str) -> Option<&'a str> {
    let parts: Vec<&'a str> = value.split('.').collect();
    match parts.as_slice() {
        [variant] => Some(*variant),
        [.., ty, variant] if *ty == type_name => Some(*variant),
        _ => None,
    }
}

/// Type error
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TypeError {
    #[error("Type mismatch: expected {expected}, got {got}")]
    TypeMismatch { expected: String, got: String },

    #[error("Invalid enum variant '{value}', expected one of: {}", .expected.join(", "))]
    InvalidEnumVariant {
        value: String,
        expected: Vec<String>,
    },

    #[error("Length {length} is out of range, must be between {min} and {max} characters")]
    LengthOutOfRange { length: usize, min: usize, max: usize },

    #[error("Validation failed: {message}")]
    ValidationFailed { message: String },

    #[error("Required attribute '{name}' is missing")]
    MissingRequired { name: String },

    #[error("Unknown attribute '{name}'")]
    UnknownAttribute { name: String },

    #[error("Attribute '{name}' is computed by the provider and cannot be set")]
    ComputedAttribute { name: String },

    #[error("Block '{name}' appears {count} times, expected {}", block_bounds(.min, .max))]
    BlockCount {
        name: String,
        count: usize,
        min: usize,
        max: Option<usize>,
    },

    #[error("List item at index {index}: {inner}")]
    ListItemError { index: usize, inner: Box<TypeError> },

    #[error("Map value for key '{key}': {inner}")]
    MapValueError { key: String, inner: Box<TypeError> },
}

fn block_bounds(min: &usize, max: &Option<usize>) -> String {
    match *max {
        Some(max) if max == *min => format!("exactly {}", min),
        Some(max) => format!("between {} and {}", min, max),
        None => format!("at least {}", min),
    }
}

/// A type error located at an attribute path such as
/// `domain_name_configuration[0].endpoint_type`
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationError {
    pub path: String,
    pub error: TypeError,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.error)
    }
}

impl std::error::Error for ValidationError {}

impl Value {
    fn type_name(&self) -> String {
        match self {
            Value::String(_) => "String".to_string(),
            Value::Int(_) => "Int".to_string(),
            Value::Bool(_) => "Bool".to_string(),
            Value::List(_) => "List".to_string(),
            Value::Map(_) => "Map".to_string(),
        }
    }
}

/// Attribute schema
#[derive(Debug, Clone)]
pub struct AttributeSchema {
    pub name: String,
    pub attr_type: AttributeType,
    pub required: bool,
    /// Set by the provider. Computed attributes that are not also required
    /// cannot be assigned in configuration.
    pub computed: bool,
    /// Changing this attribute replaces the resource instead of updating it
    pub force_new: bool,
    /// Only meaningful to Portico itself (e.g., `timeouts`); never read back
    /// from the provider and never part of a diff
    pub local: bool,
    pub description: Option<String>,
}

impl AttributeSchema {
    pub fn new(name: impl Into<String>, attr_type: AttributeType) -> Self {
        Self {
            name: name.into(),
            attr_type,
            required: false,
            computed: false,
            force_new: false,
            local: false,
            description: None,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn computed(mut self) -> Self {
        self.computed = true;
        self
    }

    pub fn force_new(mut self) -> Self {
        self.force_new = true;
        self
    }

    pub fn local(mut self) -> Self {
        self.local = true;
        self
    }

    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = Some(desc.into());
        self
    }

    /// Whether the attribute can only be set by the provider
    pub fn is_read_only(&self) -> bool {
        self.computed && !self.required
    }
}

/// Schema of a nested block
#[derive(Debug, Clone, Default)]
pub struct BlockSchema {
    pub attributes: HashMap<String, AttributeSchema>,
    pub min_items: usize,
    pub max_items: Option<usize>,
}

impl BlockSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attribute(mut self, schema: AttributeSchema) -> Self {
        self.attributes.insert(schema.name.clone(), schema);
        self
    }

    pub fn with_min_items(mut self, min: usize) -> Self {
        self.min_items = min;
        self
    }

    pub fn with_max_items(mut self, max: usize) -> Self {
        self.max_items = Some(max);
        self
    }

    /// Block instances of a value. A bare map counts as a single block.
    pub fn instances(value: &Value) -> Option<Vec<&HashMap<String, Value>>> {
        match value {
            Value::Map(map) => Some(vec![map]),
            Value::List(items) => items.iter().map(Value::as_map).collect(),
            _ => None,
        }
    }

    fn validate_value(&self, path: &str, value: &Value, errors: &mut Vec<ValidationError>) {
        let Some(blocks) = Self::instances(value) else {
            errors.push(ValidationError {
                path: path.to_string(),
                error: TypeError::TypeMismatch {
                    expected: "Block".to_string(),
                    got: value.type_name(),
                },
            });
            return;
        };

        let count = blocks.len();
        if count < self.min_items || self.max_items.is_some_and(|max| count > max) {
            errors.push(ValidationError {
                path: path.to_string(),
                error: TypeError::BlockCount {
                    name: path.rsplit('.').next().unwrap_or(path).to_string(),
                    count,
                    min: self.min_items,
                    max: self.max_items,
                },
            });
        }

        for (i, block) in blocks.into_iter().enumerate() {
            validate_attributes(block, &self.attributes, &format!("{}[{}]", path, i), errors);
        }
    }
}

/// Per-operation timeouts of a resource type
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResourceTimeouts {
    pub create: Option<Duration>,
    pub update: Option<Duration>,
}

impl ResourceTimeouts {
    pub fn with_create(mut self, timeout: Duration) -> Self {
        self.create = Some(timeout);
        self
    }

    pub fn with_update(mut self, timeout: Duration) -> Self {
        self.update = Some(timeout);
        self
    }

    /// Apply a resource's `timeouts { ... }` block over these defaults
    pub fn resolve(&self, attributes: &HashMap<String, Value>) -> Result<Self, String> {
        let Some(block) = attributes
            .get("timeouts")
            .and_then(BlockSchema::instances)
            .and_then(|blocks| blocks.into_iter().next())
        else {
            return Ok(*self);
        };

        let read = |key: &str, default: Option<Duration>| match block.get(key) {
            Some(Value::String(s)) => parse_duration(s).map(Some),
            Some(other) => Err(format!(
                "timeouts.{}: expected a duration string, got {}",
                key,
                other.type_name()
            )),
            None => Ok(default),
        };
        Ok(Self {
            create: read("create", self.create)?,
            update: read("update", self.update)?,
        })
    }

    /// The longest wait of any operation
    pub fn longest(&self) -> Option<Duration> {
        self.create.max(self.update)
    }
}

/// Resource schema
#[derive(Debug, Clone)]
pub struct ResourceSchema {
    pub resource_type: String,
    pub attributes: HashMap<String, AttributeSchema>,
    pub description: Option<String>,
    pub timeouts: ResourceTimeouts,
}

impl ResourceSchema {
    pub fn new(resource_type: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            attributes: HashMap::new(),
            description: None,
            timeouts: ResourceTimeouts::default(),
        }
    }

    pub fn attribute(mut self, schema: AttributeSchema) -> Self {
        self.attributes.insert(schema.name.clone(), schema);
        self
    }

    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = Some(desc.into());
        self
    }

    pub fn with_timeouts(mut self, timeouts: ResourceTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Validate resource attributes, collecting every error.
    /// Internal `_`-prefixed attributes are ignored.
    pub fn validate(&self, attributes: &HashMap<String, Value>) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();
        validate_attributes(attributes, &self.attributes, "", &mut errors);

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Rewrite namespaced enum values to their bare variant, descending into
    /// nested blocks. Run after `validate`.
    pub fn normalize(&self, attributes: &mut HashMap<String, Value>) {
        normalize_attributes(attributes, &self.attributes);
    }
}

fn join_path(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", prefix, name)
    }
}

fn validate_attributes(
    attributes: &HashMap<String, Value>,
    schemas: &HashMap<String, AttributeSchema>,
    prefix: &str,
    errors: &mut Vec<ValidationError>,
) {
    let mut required: Vec<&AttributeSchema> = schemas
        .values()
        .filter(|s| s.required && !attributes.contains_key(&s.name))
        .collect();
    required.sort_by(|a, b| a.name.cmp(&b.name));
    for schema in required {
        errors.push(ValidationError {
            path: join_path(prefix, &schema.name),
            error: TypeError::MissingRequired {
                name: schema.name.clone(),
            },
        });
    }

    let mut names: Vec<&String> = attributes.keys().filter(|k| !k.starts_with('_')).collect();
    names.sort();
    for name in names {
        let value = &attributes[name];
        let path = join_path(prefix, name);
        let error = match schemas.get(name) {
            None => TypeError::UnknownAttribute { name: name.clone() },
            Some(schema) if schema.is_read_only() => {
                TypeError::ComputedAttribute { name: name.clone() }
            }
            Some(schema) => match &schema.attr_type {
                AttributeType::Block(block) => {
                    block.validate_value(&path, value, errors);
                    continue;
                }
                other => match other.validate(value) {
                    Ok(()) => continue,
                    Err(e) => e,
                },
            },
        };
        errors.push(ValidationError { path, error });
    }
}

fn normalize_attributes(
    attributes: &mut HashMap<String, Value>,
    schemas: &HashMap<String, AttributeSchema>,
) {
    for (name, value) in attributes.iter_mut() {
        let Some(schema) = schemas.get(name) else {
            continue;
        };
        match (&schema.attr_type, value) {
            (AttributeType::Enum { name: type_name, .. }, Value::String(s)) => {
                if let Some(variant) = enum_variant(type_name, s) {
                    *s = variant.to_string();
                }
            }
            (AttributeType::Block(block), value) => {
                if let Value::Map(map) = value {
                    let mut single = std::mem::take(map);
                    normalize_attributes(&mut single, &block.attributes);
                    *value = Value::List(vec![Value::Map(single)]);
                } else if let Value::List(items) = value {
                    for item in items.iter_mut() {
                        if let Value::Map(map) = item {
                            normalize_attributes(map, &block.attributes);
                        }
                    }
                }
            }
            _ => {}
        }
    }
}

/// Helper functions for common types
pub mod types {
    use super::*;

    /// Amazon Resource Name (e.g., "arn:aws:acm:us-east-1:123456789012:certificate/abc")
    pub fn arn() -> AttributeType {
        AttributeType::Custom {
            name: "Arn".to_string(),
            base: Box::new(AttributeType::String),
            validate: |value| match value {
                Value::String(s) => validate_arn(s),
                _ => Err("Expected string".to_string()),
            },
        }
    }

    /// Object storage URI (e.g., "s3://bucket/truststore.pem")
    pub fn s3_uri() -> AttributeType {
        AttributeType::Custom {
            name: "S3Uri".to_string(),
            base: Box::new(AttributeType::String),
            validate: |value| match value {
                Value::String(s) => validate_s3_uri(s),
                _ => Err("Expected string".to_string()),
            },
        }
    }

    /// Duration such as "10m", "1h30m" or "45s"
    pub fn duration() -> AttributeType {
        AttributeType::Custom {
            name: "Duration".to_string(),
            base: Box::new(AttributeType::String),
            validate: |value| match value {
                Value::String(s) => parse_duration(s).map(|_| ()),
                _ => Err("Expected string".to_string()),
            },
        }
    }
}

/// Validate ARN format: `arn:partition:service:region:account:resource`
pub fn validate_arn(arn: &str) -> Result<(), String> {
    let parts: Vec<&str> = arn.splitn(6, ':').collect();
    if parts.len() != 6 || parts[0] != "arn" {
        return Err(format!(
            "Invalid ARN '{}': expected arn:partition:service:region:account:resource",
            arn
        ));
    }
    if parts[1].is_empty() || parts[2].is_empty() || parts[5].is_empty() {
        return Err(format!(
            "Invalid ARN '{}': partition, service and resource must not be empty",
            arn
        ));
    }
    Ok(())
}

/// Validate an S3 object URI: `s3://bucket/key`
pub fn validate_s3_uri(uri: &str) -> Result<(), String> {
    let Some(rest) = uri.strip_prefix("s3://") else {
        return Err(format!("Invalid S3 URI '{}': must start with s3://", uri));
    };
    match rest.split_once('/') {
        Some((bucket, key)) if !bucket.is_empty() && !key.is_empty() => Ok(()),
        _ => Err(format!(
            "Invalid S3 URI '{}': expected s3://bucket/key",
            uri
        )),
    }
}

/// Parse a duration written as a sequence of `<number><unit>` with units
/// `h`, `m` and `s` (e.g., "1h30m")
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    let mut total = 0u64;
    let mut digits = String::new();

    for c in s.trim().chars() {
        if c.is_ascii_digit() {
            digits.push(c);
            continue;
        }
        let multiplier = match c {
            'h' => 3600,
            'm' => 60,
            's' => 1,
            other => {
                return Err(format!("Invalid duration '{}': unknown unit '{}'", s, other));
            }
        };
        let n: u64 = if digits.is_empty() {
            return Err(format!("Invalid duration '{}': missing number before '{}'", s, c));
        } else {
            digits
                .parse()
                .map_err(|_| format!("Invalid duration '{}': too large", s))?
        };
        total = n
            .checked_mul(multiplier)
            .and_then(|secs| total.checked_add(secs))
            .ok_or_else(|| format!("Invalid duration '{}': too large", s))?;
        digits.clear();
    }

    if !digits.is_empty() {
        return Err(format!("Invalid duration '{}': missing unit after {}", s, digits));
    }
    if total == 0 {
        return Err(format!("Invalid duration '{}': must be greater than zero", s));
    }
    Ok(Duration::from_secs(total))
}

/// Format a duration the way `parse_duration` reads it (e.g., "1h30m")
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    let (h, m, s) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    let mut out = String::new();
    if h > 0 {
        out.push_str(&format!("{}h", h));
    }
    if m > 0 {
        out.push_str(&format!("{}m", m));
    }
    if s > 0 || out.is_empty() {
        out.push_str(&format!("{}s", s));
    }
    out
}
