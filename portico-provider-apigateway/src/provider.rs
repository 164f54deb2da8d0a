//! API Gateway v2 domain name provider implementation
//!
//! Drives the create / read / update / delete lifecycle of custom domain
//! names through a `DomainNameApi`, waiting for the domain name to become
//! AVAILABLE after create and update.

use std::collections::HashMap;
use std::time::Duration;

use log::{debug, info, warn};
use portico_core::parser::ProviderConfig;
use portico_core::provider::{ProviderError, ProviderErrorKind, ProviderResult};
use portico_core::resource::{Resource, ResourceId, State, Value};
use portico_core::schema::{ResourceTimeouts, format_duration};

use crate::api::{
    ApiError, CreateDomainNameRequest, DomainNameApi, DomainNameDescription, DomainNameStatus,
    MutualTlsConfig, UpdateDomainNameRequest,
};
use crate::client::AwsDomainNameApi;
use crate::convert;
use crate::retry::RetryPolicy;
use crate::schema::{DEFAULT_CREATE_TIMEOUT, DEFAULT_UPDATE_TIMEOUT, domain_name_schema};
use crate::tags;
use crate::utils::{domain_name_arn, normalize_region};

/// Interval between GetDomainName calls while waiting for AVAILABLE
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Settings from the `provider apigateway { ... }` block
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProviderSettings {
    /// Falls back to the AWS SDK's region chain when unset
    pub region: Option<String>,
    pub default_tags: HashMap<String, String>,
    /// Retries of throttled or failed API calls; defaults to `RetryPolicy`'s
    pub max_retries: Option<u32>,
}

impl ProviderSettings {
    pub fn from_config(config: &ProviderConfig) -> ProviderResult<Self> {
        let mut settings = Self::default();
        for (key, value) in &config.attributes {
            match (key.as_str(), value) {
                ("region", Value::String(region)) => {
                    settings.region = Some(normalize_region(region));
                }
                ("default_tags", Value::Map(map)) => {
                    if let Some((k, _)) = map.iter().find(|(_, v)| v.as_str().is_none()) {
                        return Err(ProviderError::validation(format!(
                            "provider {}: default_tags.{} must be a string",
                            config.name, k
                        )));
                    }
                    settings.default_tags = tags::from_value(Some(value));
                }
                ("max_retries", Value::Int(n)) => {
                    let retries = u32::try_from(*n).map_err(|_| {
                        ProviderError::validation(format!(
                            "provider {}: max_retries must be between 0 and {}, got {}",
                            config.name,
                            u32::MAX,
                            n
                        ))
                    })?;
                    settings.max_retries = Some(retries);
                }
                ("region", _) | ("default_tags", _) | ("max_retries", _) => {
                    return Err(ProviderError::validation(format!(
                        "provider {}: invalid value for {}",
                        config.name, key
                    )));
                }
                _ => {
                    return Err(ProviderError::validation(format!(
                        "provider {}: unknown attribute '{}'",
                        config.name, key
                    )));
                }
            }
        }
        Ok(settings)
    }
}

/// Map an API failure onto a ProviderError, keeping the service message
fn api_failure(id: &ResourceId, action: &str, err: ApiError) -> ProviderError {
    let kind = match &err {
        ApiError::NotFound(_) => ProviderErrorKind::NotFound,
        ApiError::Throttled(_) | ApiError::Transport(_) => ProviderErrorKind::Transient,
        ApiError::Service { .. } => ProviderErrorKind::Api,
    };
    ProviderError::new(format!("Failed to {} domain name: {}", action, err))
        .with_kind(kind)
        .for_resource(id.clone())
        .with_cause(err)
}

/// API Gateway v2 custom domain name provider
pub struct ApiGatewayProvider<A: DomainNameApi = AwsDomainNameApi> {
    api: A,
    region: String,
    default_tags: HashMap<String, String>,
    poll_interval: Duration,
    retry: RetryPolicy,
}

impl ApiGatewayProvider {
    /// Create a provider talking to AWS, using the default credential chain
    pub async fn new(settings: ProviderSettings) -> ProviderResult<Self> {
        let api = AwsDomainNameApi::load(settings.region.as_deref()).await;
        let region = settings
            .region
            .or_else(|| api.region().map(str::to_string))
            .ok_or_else(|| {
                ProviderError::validation(
                    "No region configured: set region in the provider block or AWS_REGION",
                )
            })?;

        let mut retry = RetryPolicy::default();
        if let Some(max_retries) = settings.max_retries {
            retry = retry.with_max_retries(max_retries);
        }

        Ok(Self::with_api(api, region)
            .with_default_tags(settings.default_tags)
            .with_retry_policy(retry))
    }
}

impl<A: DomainNameApi> ApiGatewayProvider<A> {
    pub fn with_api(api: A, region: impl Into<String>) -> Self {
        Self {
            api,
            region: region.into(),
            default_tags: HashMap::new(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_default_tags(mut self, default_tags: HashMap<String, String>) -> Self {
        self.default_tags = default_tags;
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    fn arn(&self, domain_name: &str) -> String {
        domain_name_arn(&self.region, domain_name)
    }

    fn to_state(&self, id: &ResourceId, desc: &DomainNameDescription) -> State {
        let attributes = convert::to_attributes(
            desc,
            &self.arn(&desc.domain_name),
            &self.default_tags,
        );
        State::existing(id.clone(), attributes).with_identifier(desc.domain_name.clone())
    }

    /// Validate and normalize the declared attributes before any API call
    fn prepare(&self, resource: &Resource) -> ProviderResult<HashMap<String, Value>> {
        let schema = domain_name_schema();
        let mut attributes = resource.user_attributes();

        schema.validate(&attributes).map_err(|errors| {
            let messages: Vec<String> = errors.iter().map(ToString::to_string).collect();
            ProviderError::validation(messages.join("; ")).for_resource(resource.id.clone())
        })?;
        schema.normalize(&mut attributes);
        Ok(attributes)
    }

    /// Schema defaults overridden by the resource's `timeouts` block
    fn timeouts(
        &self,
        id: &ResourceId,
        attributes: &HashMap<String, Value>,
    ) -> ProviderResult<ResourceTimeouts> {
        domain_name_schema()
            .timeouts
            .resolve(attributes)
            .map_err(|e| ProviderError::validation(e).for_resource(id.clone()))
    }

    /// The declared resource without tags that only repeat a default tag.
    /// Read reports those under `tags_all` alone, so keeping them would
    /// show a tag change on every plan.
    pub fn without_default_tags(&self, resource: &Resource) -> Resource {
        let mut desired = resource.clone();
        if self.default_tags.is_empty() || !desired.attributes.contains_key("tags") {
            return desired;
        }

        let declared = tags::from_value(desired.attributes.get("tags"));
        let own = tags::strip_defaults(&declared, &self.default_tags);
        if own.is_empty() {
            desired.attributes.remove("tags");
        } else {
            desired
                .attributes
                .insert("tags".to_string(), tags::to_value(&own));
        }
        desired
    }

    async fn get(&self, id: &ResourceId, domain_name: &str) -> ProviderResult<Option<DomainNameDescription>> {
        self.retry
            .run("GetDomainName", move || self.api.get_domain_name(domain_name))
            .await
            .map_err(|e| api_failure(id, "read", e))
    }

    /// Poll until the domain name is AVAILABLE or `timeout` elapses.
    ///
    /// A terminal status fails immediately. On timeout the error is
    /// retryable and carries the last description seen as its state.
    async fn wait_for_available(
        &self,
        id: &ResourceId,
        initial: DomainNameDescription,
        timeout: Duration,
    ) -> ProviderResult<DomainNameDescription> {
        let domain_name = initial.domain_name.clone();
        let name = domain_name.as_str();
        let mut last_known = initial;

        let outcome: Result<ProviderResult<()>, _> = tokio::time::timeout(timeout, async {
            loop {
                match last_known.status() {
                    DomainNameStatus::Available => return Ok(()),
                    status if status.is_terminal_failure() => {
                        return Err(ProviderError::new(format!(
                            "Domain name {} is {}: {}",
                            name,
                            status,
                            last_known.status_message().unwrap_or("no status message")
                        ))
                        .with_state(self.to_state(id, &last_known)));
                    }
                    status => {
                        debug!(
                            "Domain name {} is {}, checking again in {:?}",
                            name, status, self.poll_interval
                        );
                    }
                }

                tokio::time::sleep(self.poll_interval).await;
                match self.get(id, name).await {
                    Ok(Some(desc)) => last_known = desc,
                    Ok(None) => {
                        return Err(ProviderError::not_found(format!(
                            "Domain name {} disappeared while waiting for it to become AVAILABLE",
                            name
                        )));
                    }
                    Err(e) => return Err(e),
                }
            }
        })
        .await;

        match outcome {
            Ok(Ok(())) => Ok(last_known),
            Ok(Err(e)) => Err(e.for_resource(id.clone())),
            Err(_) => Err(ProviderError::timeout(format!(
                "Timed out after {} waiting for domain name {} to become AVAILABLE (last status: {})",
                format_duration(timeout),
                domain_name,
                last_known.status()
            ))
            .for_resource(id.clone())
            .with_state(self.to_state(id, &last_known))),
        }
    }

    /// Read a domain name by its identifier (the domain name itself)
    pub async fn read_domain_name(
        &self,
        id: &ResourceId,
        identifier: Option<&str>,
    ) -> ProviderResult<State> {
        let Some(domain_name) = identifier else {
            return Ok(State::not_found(id.clone()));
        };

        match self.get(id, domain_name).await? {
            Some(desc) => Ok(self.to_state(id, &desc)),
            None => {
                warn!("Domain name {} no longer exists", domain_name);
                Ok(State::not_found(id.clone()))
            }
        }
    }

    /// Create a domain name and wait for it to become AVAILABLE
    pub async fn create_domain_name(&self, resource: &Resource) -> ProviderResult<State> {
        let id = &resource.id;
        let attributes = self.prepare(resource)?;
        let timeout = self
            .timeouts(id, &attributes)?
            .create
            .unwrap_or(DEFAULT_CREATE_TIMEOUT);

        let request = CreateDomainNameRequest {
            domain_name: convert::domain_name(&attributes)?,
            configuration: convert::configuration(&attributes)
                .map_err(|e| e.for_resource(id.clone()))?,
            mutual_tls: convert::mutual_tls(&attributes).map_err(|e| e.for_resource(id.clone()))?,
            tags: tags::merge(&self.default_tags, &tags::from_value(attributes.get("tags"))),
        };
        let request = &request;

        info!("Creating domain name {}", request.domain_name);
        let created = self
            .retry
            .run("CreateDomainName", move || self.api.create_domain_name(request))
            .await
            .map_err(|e| api_failure(id, "create", e))?;

        let available = self.wait_for_available(id, created, timeout).await?;
        info!("Domain name {} is AVAILABLE", available.domain_name);
        Ok(self.to_state(id, &available))
    }

    /// Update configuration, mutual TLS and tags in place
    pub async fn update_domain_name(
        &self,
        id: &ResourceId,
        identifier: &str,
        to: &Resource,
    ) -> ProviderResult<State> {
        let attributes = self.prepare(to)?;
        let domain_name = convert::domain_name(&attributes)?;
        if domain_name != identifier {
            return Err(ProviderError::validation(format!(
                "domain_name cannot change in place ({} -> {}); the resource must be replaced",
                identifier, domain_name
            ))
            .for_resource(id.clone()));
        }
        let timeout = self
            .timeouts(id, &attributes)?
            .update
            .unwrap_or(DEFAULT_UPDATE_TIMEOUT);

        let current = self.get(id, identifier).await?.ok_or_else(|| {
            ProviderError::not_found(format!("Domain name {} no longer exists", identifier))
                .for_resource(id.clone())
        })?;
        let current_attributes = self.to_state(id, &current).attributes;

        let configuration =
            convert::configuration(&attributes).map_err(|e| e.for_resource(id.clone()))?;
        let configuration_changed =
            convert::configuration(&current_attributes).ok().as_ref() != Some(&configuration);

        let mutual_tls = match (
            convert::mutual_tls(&attributes).map_err(|e| e.for_resource(id.clone()))?,
            convert::mutual_tls(&current_attributes).ok().flatten(),
        ) {
            (Some(desired), current) if current.as_ref() != Some(&desired) => Some(desired),
            (None, Some(_)) => Some(MutualTlsConfig::disabled()),
            _ => None,
        };

        let current_tags = current.tags.clone();
        let mut latest = current;

        if configuration_changed || mutual_tls.is_some() {
            let request = UpdateDomainNameRequest {
                domain_name: domain_name.clone(),
                configuration,
                mutual_tls,
            };
            let request = &request;

            info!("Updating domain name {}", domain_name);
            latest = self
                .retry
                .run("UpdateDomainName", move || self.api.update_domain_name(request))
                .await
                .map_err(|e| api_failure(id, "update", e))?;
        }

        let desired_tags = tags::merge(&self.default_tags, &tags::from_value(attributes.get("tags")));
        let changes = tags::diff(&current_tags, &desired_tags);
        if !changes.is_empty() {
            let arn = self.arn(&domain_name);
            let arn = arn.as_str();
            if !changes.remove.is_empty() {
                let keys = changes.remove.as_slice();
                info!("Removing tags {:?} from {}", keys, domain_name);
                self.retry
                    .run("UntagResource", move || self.api.untag_resource(arn, keys))
                    .await
                    .map_err(|e| api_failure(id, "untag", e))?;
            }
            if !changes.set.is_empty() {
                let set = &changes.set;
                info!("Setting {} tag(s) on {}", set.len(), domain_name);
                self.retry
                    .run("TagResource", move || self.api.tag_resource(arn, set))
                    .await
                    .map_err(|e| api_failure(id, "tag", e))?;
            }
            latest.tags = desired_tags;
        }

        let available = self.wait_for_available(id, latest, timeout).await?;
        Ok(self.to_state(id, &available))
    }

    /// Delete a domain name. A domain name that is already gone counts as deleted.
    pub async fn delete_domain_name(&self, id: &ResourceId, identifier: &str) -> ProviderResult<()> {
        info!("Deleting domain name {}", identifier);
        match self
            .retry
            .run("DeleteDomainName", move || self.api.delete_domain_name(identifier))
            .await
        {
            Ok(()) => Ok(()),
            Err(ApiError::NotFound(_)) => {
                debug!("Domain name {} was already deleted", identifier);
                Ok(())
            }
            Err(e) => Err(api_failure(id, "delete", e)),
        }
    }
}
