//! Provider - Trait abstracting resource operations
//!
//! A Provider maps Effects onto calls against one external API. It owns the
//! schemas of the resource types it manages.

use std::future::Future;
use std::pin::Pin;

use crate::resource::{Resource, ResourceId, State};
use crate::schema::ResourceSchema;

/// Category of a provider failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderErrorKind {
    /// Configuration rejected before any external call
    Validation,
    /// The external API rejected the request; surfaced verbatim
    Api,
    /// The external object does not exist
    NotFound,
    /// The operation did not finish within its configured timeout
    Timeout,
    /// Network or throttling failure that outlived the retry budget
    Transient,
}

/// Error type for Provider operations
#[derive(Debug)]
pub struct ProviderError {
    pub message: String,
    pub kind: ProviderErrorKind,
    pub resource_id: Option<ResourceId>,
    /// Last state observed before the failure, if the external object exists
    pub state: Option<Box<State>>,
    pub cause: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl std::fmt::Display for ProviderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(ref id) = self.resource_id {
            write!(f, "[{}.{}] {}", id.resource_type, id.name, self.message)
        } else {
            write!(f, "{}", self.message)
        }
    }
}

impl std::error::Error for ProviderError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.cause
            .as_ref()
            .map(|e| e.as_ref() as &dyn std::error::Error)
    }
}

impl ProviderError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind: ProviderErrorKind::Api,
            resource_id: None,
            state: None,
            cause: None,
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(message).with_kind(ProviderErrorKind::Validation)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(message).with_kind(ProviderErrorKind::NotFound)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(message).with_kind(ProviderErrorKind::Timeout)
    }

    pub fn with_kind(mut self, kind: ProviderErrorKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn for_resource(mut self, id: ResourceId) -> Self {
        self.resource_id = Some(id);
        self
    }

    pub fn with_state(mut self, state: State) -> Self {
        self.state = Some(Box::new(state));
        self
    }

    pub fn with_cause(mut self, cause: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }

    /// Whether running the same operation again may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind,
            ProviderErrorKind::Timeout | ProviderErrorKind::Transient
        )
    }
}

pub type ProviderResult<T> = Result<T, ProviderError>;

/// Return type for async operations
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Definition of a resource type that a Provider can handle
pub trait ResourceType: Send + Sync {
    /// Resource type name without provider prefix (e.g., "domain_name")
    fn name(&self) -> &'static str;

    /// Attribute schema used to validate declarations of this type
    fn schema(&self) -> ResourceSchema;
}

/// Main Provider trait
///
/// All operations are async and involve side effects.
pub trait Provider: Send + Sync {
    /// Name of this Provider (e.g., "apigateway")
    fn name(&self) -> &'static str;

    /// List of resource types this Provider can handle
    fn resource_types(&self) -> Vec<Box<dyn ResourceType>>;

    /// Get the current state of a resource
    ///
    /// Returns `State::not_found()` if no identifier is known or the resource
    /// no longer exists.
    fn read(
        &self,
        id: &ResourceId,
        identifier: Option<&str>,
    ) -> BoxFuture<'_, ProviderResult<State>>;

    /// Create a resource, returning its state with the identifier set
    fn create(&self, resource: &Resource) -> BoxFuture<'_, ProviderResult<State>>;

    /// Update a resource in place
    fn update(
        &self,
        id: &ResourceId,
        identifier: &str,
        from: &State,
        to: &Resource,
    ) -> BoxFuture<'_, ProviderResult<State>>;

    /// Delete a resource. Deleting a resource that is already gone succeeds.
    fn delete(&self, id: &ResourceId, identifier: &str) -> BoxFuture<'_, ProviderResult<()>>;

    /// The declared resource in the shape `read` reports it, for diffing.
    /// Providers that fill in values on the server side (e.g., inherited
    /// tags) remove them here so an unchanged resource diffs as unchanged.
    fn desired(&self, resource: &Resource) -> Resource {
        resource.clone()
    }

    /// Adopt an existing external object by its identifier
    fn import(&self, id: &ResourceId, identifier: &str) -> BoxFuture<'_, ProviderResult<State>> {
        let id = id.clone();
        let identifier = identifier.to_string();
        Box::pin(async move {
            let state = self.read(&id, Some(&identifier)).await?;
            if state.exists {
                Ok(state)
            } else {
                Err(
                    ProviderError::not_found(format!("Cannot import '{}': not found", identifier))
                        .for_resource(id),
                )
            }
        })
    }
}

/// Provider implementation for Box<dyn Provider>
/// This enables dynamic dispatch for Providers
impl Provider for Box<dyn Provider> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn resource_types(&self) -> Vec<Box<dyn ResourceType>> {
        (**self).resource_types()
    }

    fn read(
        &self,
        id: &ResourceId,
        identifier: Option<&str>,
    ) -> BoxFuture<'_, ProviderResult<State>> {
        (**self).read(id, identifier)
    }

    fn create(&self, resource: &Resource) -> BoxFuture<'_, ProviderResult<State>> {
        (**self).create(resource)
    }

    fn update(
        &self,
        id: &ResourceId,
        identifier: &str,
        from: &State,
        to: &Resource,
    ) -> BoxFuture<'_, ProviderResult<State>> {
        (**self).update(id, identifier, from, to)
    }

    fn delete(&self, id: &ResourceId, identifier: &str) -> BoxFuture<'_, ProviderResult<()>> {
        (**self).delete(id, identifier)
    }

    fn desired(&self, resource: &Resource) -> Resource {
        (**self).desired(resource)
    }

    fn import(&self, id: &ResourceId, identifier: &str) -> BoxFuture<'_, ProviderResult<State>> {
        (**self).import(id, identifier)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    use crate::resource::Value;

    // Mock Provider that knows a single external object
    struct MockProvider;

    impl Provider for MockProvider {
        fn name(&self) -> &'static str {
            "mock"
        }

        fn resource_types(&self) -> Vec<Box<dyn ResourceType>> {
            vec![]
        }

        fn read(
            &self,
            id: &ResourceId,
            identifier: Option<&str>,
        ) -> BoxFuture<'_, ProviderResult<State>> {
            let id = id.clone();
            let found = identifier == Some("known.example.com");
            Box::pin(async move {
                if found {
                    let attrs = HashMap::from([(
                        "domain_name".to_string(),
                        Value::String("known.example.com".to_string()),
                    )]);
                    Ok(State::existing(id, attrs).with_identifier("known.example.com"))
                } else {
                    Ok(State::not_found(id))
                }
            })
        }

        fn create(&self, resource: &Resource) -> BoxFuture<'_, ProviderResult<State>> {
            let id = resource.id.clone();
            let attrs = resource.attributes.clone();
            Box::pin(async move { Ok(State::existing(id, attrs).with_identifier("mock-id-123")) })
        }

        fn update(
            &self,
            id: &ResourceId,
            _identifier: &str,
            _from: &State,
            to: &Resource,
        ) -> BoxFuture<'_, ProviderResult<State>> {
            let id = id.clone();
            let attrs = to.attributes.clone();
            Box::pin(async move { Ok(State::existing(id, attrs)) })
        }

        fn delete(&self, _id: &ResourceId, _identifier: &str) -> BoxFuture<'_, ProviderResult<()>> {
            Box::pin(async { Ok(()) })
        }
    }

    #[tokio::test]
    async fn mock_provider_read_returns_not_found() {
        let provider = MockProvider;
        let id = ResourceId::new("test", "example");
        let state = provider.read(&id, None).await.unwrap();
        assert!(!state.exists);
    }

    #[tokio::test]
    async fn mock_provider_create_returns_existing() {
        let provider = MockProvider;
        let resource = Resource::new("test", "example");
        let state = provider.create(&resource).await.unwrap();
        assert!(state.exists);
        assert_eq!(state.identifier, Some("mock-id-123".to_string()));
    }

    #[tokio::test]
    async fn import_reads_by_identifier() {
        let provider: Box<dyn Provider> = Box::new(MockProvider);
        let id = ResourceId::new("test", "example");

        let state = provider.import(&id, "known.example.com").await.unwrap();
        assert_eq!(state.identifier.as_deref(), Some("known.example.com"));

        let err = provider.import(&id, "missing.example.com").await.unwrap_err();
        assert_eq!(err.kind, ProviderErrorKind::NotFound);
        assert!(err.to_string().starts_with("[test.example]"));
    }

    #[test]
    fn desired_defaults_to_the_declared_resource() {
        let resource = Resource::new("test", "example")
            .with_attribute("domain_name", Value::String("known.example.com".to_string()));
        assert_eq!(MockProvider.desired(&resource), resource);
    }

    #[test]
    fn timeouts_are_retryable() {
        assert!(ProviderError::timeout("slow").is_retryable());
        assert!(!ProviderError::new("bad certificate").is_retryable());
        assert!(!ProviderError::validation("bad").is_retryable());
    }
}
