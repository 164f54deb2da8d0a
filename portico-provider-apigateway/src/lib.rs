//! Portico API Gateway Provider
//!
//! Manages API Gateway v2 custom domain names (`apigateway.domain_name`).

pub mod api;
pub mod client;
pub mod convert;
pub mod provider;
pub mod retry;
pub mod schema;
pub mod tags;
pub mod utils;

#[cfg(test)]
mod mock;

use portico_core::provider::{
    BoxFuture, Provider, ProviderError, ProviderResult, ResourceType,
};
use portico_core::resource::{Resource, ResourceId, State};

pub use api::DomainNameApi;
pub use client::AwsDomainNameApi;
pub use provider::{ApiGatewayProvider, ProviderSettings};
pub use schema::{DomainNameType, RESOURCE_TYPE};

/// Name used in `provider apigateway { ... }` and resource types
pub const PROVIDER_NAME: &str = "apigateway";

fn unknown_resource_type(id: &ResourceId) -> ProviderError {
    ProviderError::validation(format!("Unknown resource type: {}", id.resource_type))
        .for_resource(id.clone())
}

impl<A: DomainNameApi> Provider for ApiGatewayProvider<A> {
    fn name(&self) -> &'static str {
        PROVIDER_NAME
    }

    fn resource_types(&self) -> Vec<Box<dyn ResourceType>> {
        vec![Box::new(DomainNameType)]
    }

    fn read(
        &self,
        id: &ResourceId,
        identifier: Option<&str>,
    ) -> BoxFuture<'_, ProviderResult<State>> {
        let id = id.clone();
        let identifier = identifier.map(str::to_string);
        Box::pin(async move {
            match id.resource_type.as_str() {
                RESOURCE_TYPE => self.read_domain_name(&id, identifier.as_deref()).await,
                _ => Err(unknown_resource_type(&id)),
            }
        })
    }

    fn create(&self, resource: &Resource) -> BoxFuture<'_, ProviderResult<State>> {
        let resource = resource.clone();
        Box::pin(async move {
            match resource.id.resource_type.as_str() {
                RESOURCE_TYPE => self.create_domain_name(&resource).await,
                _ => Err(unknown_resource_type(&resource.id)),
            }
        })
    }

    fn update(
        &self,
        id: &ResourceId,
        identifier: &str,
        _from: &State,
        to: &Resource,
    ) -> BoxFuture<'_, ProviderResult<State>> {
        let id = id.clone();
        let identifier = identifier.to_string();
        let to = to.clone();
        Box::pin(async move {
            match id.resource_type.as_str() {
                RESOURCE_TYPE => self.update_domain_name(&id, &identifier, &to).await,
                _ => Err(unknown_resource_type(&id)),
            }
        })
    }

    fn desired(&self, resource: &Resource) -> Resource {
        match resource.id.resource_type.as_str() {
            RESOURCE_TYPE => self.without_default_tags(resource),
            _ => resource.clone(),
        }
    }

    fn delete(&self, id: &ResourceId, identifier: &str) -> BoxFuture<'_, ProviderResult<()>> {
        let id = id.clone();
        let identifier = identifier.to_string();
        Box::pin(async move {
            match id.resource_type.as_str() {
                RESOURCE_TYPE => self.delete_domain_name(&id, &identifier).await,
                _ => Err(unknown_resource_type(&id)),
            }
        })
    }
}
