//! AWS SDK implementation of `DomainNameApi`

use std::collections::HashMap;

use async_trait::async_trait;
use aws_config::Region;
use aws_config::retry::RetryConfig;
use aws_sdk_apigatewayv2::Client as ApiGatewayClient;
use aws_sdk_apigatewayv2::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_apigatewayv2::types::{
    DomainNameConfiguration, EndpointType, MutualTlsAuthentication,
    MutualTlsAuthenticationInput, SecurityPolicy,
};
use log::debug;

use crate::api::{
    ApiError, ApiResult, CreateDomainNameRequest, DomainNameApi, DomainNameConfig,
    DomainNameDescription, DomainNameStatus, EndpointDescription, MutualTlsConfig,
    MutualTlsDescription, UpdateDomainNameRequest,
};

/// DomainNameApi backed by the API Gateway v2 service
pub struct AwsDomainNameApi {
    client: ApiGatewayClient,
    region: Option<String>,
}

impl AwsDomainNameApi {
    /// Create a client using the default credential chain. Without an
    /// explicit region the SDK's region chain decides.
    ///
    /// The SDK's own retries are off; `RetryPolicy` is the only retry layer.
    pub async fn load(region: Option<&str>) -> Self {
        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .retry_config(RetryConfig::disabled());
        if let Some(region) = region {
            loader = loader.region(Region::new(region.to_string()));
        }
        let config = loader.load().await;

        Self {
            client: ApiGatewayClient::new(&config),
            region: config.region().map(|r| r.to_string()),
        }
    }

    /// Region the client resolved to
    pub fn region(&self) -> Option<&str> {
        self.region.as_deref()
    }
}

/// Classify an SDK error. Service errors keep their code and message so
/// they can be shown verbatim.
fn api_error<E>(err: SdkError<E>) -> ApiError
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
{
    if !matches!(err, SdkError::ServiceError(_)) {
        return ApiError::Transport(DisplayErrorContext(&err).to_string());
    }

    let code = err.code().unwrap_or("Unknown").to_string();
    let message = err
        .message()
        .map(str::to_string)
        .unwrap_or_else(|| DisplayErrorContext(&err).to_string());
    let status = err.raw_response().map(|r| r.status().as_u16());

    match code.as_str() {
        "NotFoundException" => ApiError::NotFound(message),
        "TooManyRequestsException" => ApiError::Throttled(message),
        _ if status.is_some_and(|s| s >= 500) => ApiError::Transport(message),
        _ => ApiError::Service { code, message },
    }
}

fn sdk_configuration(config: &DomainNameConfig) -> DomainNameConfiguration {
    DomainNameConfiguration::builder()
        .certificate_arn(&config.certificate_arn)
        .endpoint_type(EndpointType::from(config.endpoint_type.as_str()))
        .security_policy(SecurityPolicy::from(config.security_policy.as_str()))
        .set_ownership_verification_certificate_arn(
            config.ownership_verification_certificate_arn.clone(),
        )
        .build()
}

fn sdk_mutual_tls(config: &MutualTlsConfig) -> MutualTlsAuthenticationInput {
    MutualTlsAuthenticationInput::builder()
        .truststore_uri(&config.truststore_uri)
        .set_truststore_version(config.truststore_version.clone())
        .build()
}

fn endpoint_description(config: &DomainNameConfiguration) -> EndpointDescription {
    EndpointDescription {
        certificate_arn: config.certificate_arn().map(str::to_string),
        endpoint_type: config.endpoint_type().map(|e| e.as_str().to_string()),
        security_policy: config.security_policy().map(|p| p.as_str().to_string()),
        ownership_verification_certificate_arn: config
            .ownership_verification_certificate_arn()
            .map(str::to_string),
        hosted_zone_id: config.hosted_zone_id().map(str::to_string),
        target_domain_name: config.api_gateway_domain_name().map(str::to_string),
        status: config
            .domain_name_status()
            .map(|s| DomainNameStatus::parse(s.as_str()))
            .unwrap_or(DomainNameStatus::Available),
        status_message: config.domain_name_status_message().map(str::to_string),
    }
}

fn mutual_tls_description(mtls: &MutualTlsAuthentication) -> MutualTlsDescription {
    MutualTlsDescription {
        truststore_uri: mtls.truststore_uri().map(str::to_string),
        truststore_version: mtls.truststore_version().map(str::to_string),
        truststore_warnings: mtls.truststore_warnings().to_vec(),
    }
}

/// Create, Get and Update return the same shape under different output types
macro_rules! describe_output {
    ($output:expr, $fallback_name:expr) => {{
        let output = $output;
        DomainNameDescription {
            domain_name: output
                .domain_name()
                .map(str::to_string)
                .unwrap_or_else(|| $fallback_name.to_string()),
            api_mapping_selection_expression: output
                .api_mapping_selection_expression()
                .map(str::to_string),
            endpoints: output
                .domain_name_configurations()
                .iter()
                .map(endpoint_description)
                .collect(),
            mutual_tls: output.mutual_tls_authentication().map(mutual_tls_description),
            tags: output.tags().cloned().unwrap_or_default(),
        }
    }};
}

#[async_trait]
impl DomainNameApi for AwsDomainNameApi {
    async fn get_domain_name(&self, domain_name: &str) -> ApiResult<Option<DomainNameDescription>> {
        debug!("GetDomainName {}", domain_name);
        let result = self
            .client
            .get_domain_name()
            .domain_name(domain_name)
            .send()
            .await;

        match result {
            Ok(output) => Ok(Some(describe_output!(output, domain_name))),
            Err(err) => match api_error(err) {
                ApiError::NotFound(_) => Ok(None),
                other => Err(other),
            },
        }
    }

    async fn create_domain_name(
        &self,
        request: &CreateDomainNameRequest,
    ) -> ApiResult<DomainNameDescription> {
        debug!("CreateDomainName {}", request.domain_name);
        let mut builder = self
            .client
            .create_domain_name()
            .domain_name(&request.domain_name)
            .domain_name_configurations(sdk_configuration(&request.configuration));
        if let Some(mtls) = &request.mutual_tls {
            builder = builder.mutual_tls_authentication(sdk_mutual_tls(mtls));
        }
        if !request.tags.is_empty() {
            builder = builder.set_tags(Some(request.tags.clone()));
        }

        let output = builder.send().await.map_err(api_error)?;
        Ok(describe_output!(output, request.domain_name))
    }

    async fn update_domain_name(
        &self,
        request: &UpdateDomainNameRequest,
    ) -> ApiResult<DomainNameDescription> {
        debug!("UpdateDomainName {}", request.domain_name);
        let mut builder = self
            .client
            .update_domain_name()
            .domain_name(&request.domain_name)
            .domain_name_configurations(sdk_configuration(&request.configuration));
        if let Some(mtls) = &request.mutual_tls {
            builder = builder.mutual_tls_authentication(sdk_mutual_tls(mtls));
        }

        let output = builder.send().await.map_err(api_error)?;
        Ok(describe_output!(output, request.domain_name))
    }

    async fn delete_domain_name(&self, domain_name: &str) -> ApiResult<()> {
        debug!("DeleteDomainName {}", domain_name);
        self.client
            .delete_domain_name()
            .domain_name(domain_name)
            .send()
            .await
            .map_err(api_error)?;
        Ok(())
    }

    async fn tag_resource(&self, arn: &str, tags: &HashMap<String, String>) -> ApiResult<()> {
        debug!("TagResource {} ({} tags)", arn, tags.len());
        self.client
            .tag_resource()
            .resource_arn(arn)
            .set_tags(Some(tags.clone()))
            .send()
            .await
            .map_err(api_error)?;
        Ok(())
    }

    async fn untag_resource(&self, arn: &str, keys: &[String]) -> ApiResult<()> {
        debug!("UntagResource {} ({:?})", arn, keys);
        self.client
            .untag_resource()
            .resource_arn(arn)
            .set_tag_keys(Some(keys.to_vec()))
            .send()
            .await
            .map_err(api_error)?;
        Ok(())
    }
}
