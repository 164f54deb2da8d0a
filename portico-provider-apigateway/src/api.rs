//! DomainNameApi - the seam between the provider and API Gateway v2
//!
//! The lifecycle code only talks to this trait. `AwsDomainNameApi` implements
//! it with the AWS SDK; tests use an in-memory implementation.

use std::collections::HashMap;

use async_trait::async_trait;

/// Status reported for each endpoint of a domain name
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DomainNameStatus {
    Available,
    Updating,
    PendingCertificateReimport,
    PendingOwnershipVerification,
    Unknown(String),
}

impl DomainNameStatus {
    pub fn parse(s: &str) -> Self {
        match s {
            "AVAILABLE" => DomainNameStatus::Available,
            "UPDATING" => DomainNameStatus::Updating,
            "PENDING_CERTIFICATE_REIMPORT" => DomainNameStatus::PendingCertificateReimport,
            "PENDING_OWNERSHIP_VERIFICATION" => DomainNameStatus::PendingOwnershipVerification,
            other => DomainNameStatus::Unknown(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            DomainNameStatus::Available => "AVAILABLE",
            DomainNameStatus::Updating => "UPDATING",
            DomainNameStatus::PendingCertificateReimport => "PENDING_CERTIFICATE_REIMPORT",
            DomainNameStatus::PendingOwnershipVerification => "PENDING_OWNERSHIP_VERIFICATION",
            DomainNameStatus::Unknown(s) => s,
        }
    }

    /// Statuses that need operator action and will not become AVAILABLE by waiting
    pub fn is_terminal_failure(&self) -> bool {
        matches!(
            self,
            DomainNameStatus::PendingCertificateReimport
                | DomainNameStatus::PendingOwnershipVerification
        )
    }
}

impl std::fmt::Display for DomainNameStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Endpoint configuration sent on create and update
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainNameConfig {
    pub certificate_arn: String,
    pub endpoint_type: String,
    pub security_policy: String,
    pub ownership_verification_certificate_arn: Option<String>,
}

/// Mutual TLS settings. An empty `truststore_uri` disables mutual TLS.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutualTlsConfig {
    pub truststore_uri: String,
    pub truststore_version: Option<String>,
}

impl MutualTlsConfig {
    pub fn disabled() -> Self {
        Self {
            truststore_uri: String::new(),
            truststore_version: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateDomainNameRequest {
    pub domain_name: String,
    pub configuration: DomainNameConfig,
    pub mutual_tls: Option<MutualTlsConfig>,
    pub tags: HashMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateDomainNameRequest {
    pub domain_name: String,
    pub configuration: DomainNameConfig,
    /// `None` leaves mutual TLS untouched
    pub mutual_tls: Option<MutualTlsConfig>,
}

/// Endpoint configuration as reported by the service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointDescription {
    pub certificate_arn: Option<String>,
    pub endpoint_type: Option<String>,
    pub security_policy: Option<String>,
    pub ownership_verification_certificate_arn: Option<String>,
    pub hosted_zone_id: Option<String>,
    pub target_domain_name: Option<String>,
    pub status: DomainNameStatus,
    pub status_message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutualTlsDescription {
    pub truststore_uri: Option<String>,
    pub truststore_version: Option<String>,
    pub truststore_warnings: Vec<String>,
}

/// A domain name as reported by the service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainNameDescription {
    pub domain_name: String,
    pub api_mapping_selection_expression: Option<String>,
    pub endpoints: Vec<EndpointDescription>,
    pub mutual_tls: Option<MutualTlsDescription>,
    pub tags: HashMap<String, String>,
}

impl DomainNameDescription {
    /// Overall status: a terminal failure on any endpoint wins, then the
    /// first endpoint that is not yet AVAILABLE.
    pub fn status(&self) -> DomainNameStatus {
        if let Some(failed) = self.endpoints.iter().find(|e| e.status.is_terminal_failure()) {
            return failed.status.clone();
        }
        self.endpoints
            .iter()
            .find(|e| e.status != DomainNameStatus::Available)
            .map(|e| e.status.clone())
            .unwrap_or(DomainNameStatus::Available)
    }

    /// Status message of the endpoint that determines `status()`
    pub fn status_message(&self) -> Option<&str> {
        let status = self.status();
        self.endpoints
            .iter()
            .find(|e| e.status == status)
            .and_then(|e| e.status_message.as_deref())
    }
}

/// Error returned by a DomainNameApi call
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("throttled: {0}")]
    Throttled(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("{code}: {message}")]
    Service { code: String, message: String },
}

impl ApiError {
    /// Transport failures and throttling may succeed when retried
    pub fn is_transient(&self) -> bool {
        matches!(self, ApiError::Throttled(_) | ApiError::Transport(_))
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

/// Operations on API Gateway v2 custom domain names
#[async_trait]
pub trait DomainNameApi: Send + Sync {
    /// Returns `None` if the domain name does not exist
    async fn get_domain_name(&self, domain_name: &str) -> ApiResult<Option<DomainNameDescription>>;

    async fn create_domain_name(
        &self,
        request: &CreateDomainNameRequest,
    ) -> ApiResult<DomainNameDescription>;

    async fn update_domain_name(
        &self,
        request: &UpdateDomainNameRequest,
    ) -> ApiResult<DomainNameDescription>;

    /// Fails with `ApiError::NotFound` if the domain name does not exist
    async fn delete_domain_name(&self, domain_name: &str) -> ApiResult<()>;

    async fn tag_resource(&self, arn: &str, tags: &HashMap<String, String>) -> ApiResult<()>;

    async fn untag_resource(&self, arn: &str, keys: &[String]) -> ApiResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoint(status: DomainNameStatus, message: Option<&str>) -> EndpointDescription {
        EndpointDescription {
            certificate_arn: None,
            endpoint_type: None,
            security_policy: None,
            ownership_verification_certificate_arn: None,
            hosted_zone_id: None,
            target_domain_name: None,
            status,
            status_message: message.map(str::to_string),
        }
    }

    fn description(endpoints: Vec<EndpointDescription>) -> DomainNameDescription {
        DomainNameDescription {
            domain_name: "api.example.com".to_string(),
            api_mapping_selection_expression: None,
            endpoints,
            mutual_tls: None,
            tags: HashMap::new(),
        }
    }

    #[test]
    fn status_round_trips_known_values() {
        for s in [
            "AVAILABLE",
            "UPDATING",
            "PENDING_CERTIFICATE_REIMPORT",
            "PENDING_OWNERSHIP_VERIFICATION",
        ] {
            assert_eq!(DomainNameStatus::parse(s).as_str(), s);
        }
        assert_eq!(
            DomainNameStatus::parse("DELETING"),
            DomainNameStatus::Unknown("DELETING".to_string())
        );
    }

    #[test]
    fn terminal_failure_wins_over_updating() {
        let desc = description(vec![
            endpoint(DomainNameStatus::Updating, None),
            endpoint(
                DomainNameStatus::PendingCertificateReimport,
                Some("certificate expired"),
            ),
        ]);
        assert_eq!(desc.status(), DomainNameStatus::PendingCertificateReimport);
        assert_eq!(desc.status_message(), Some("certificate expired"));
    }

    #[test]
    fn no_endpoints_counts_as_available() {
        assert_eq!(description(vec![]).status(), DomainNameStatus::Available);
    }

    #[test]
    fn only_transport_and_throttling_are_transient() {
        assert!(ApiError::Throttled("slow down".into()).is_transient());
        assert!(ApiError::Transport("connection reset".into()).is_transient());
        assert!(!ApiError::NotFound("gone".into()).is_transient());
        assert!(
            !ApiError::Service {
                code: "BadRequestException".into(),
                message: "invalid certificate".into()
            }
            .is_transient()
        );
    }
}
