//! In-memory `DomainNameApi` for tests

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::api::{
    ApiError, ApiResult, CreateDomainNameRequest, DomainNameApi, DomainNameConfig,
    DomainNameDescription, DomainNameStatus, EndpointDescription, MutualTlsConfig,
    MutualTlsDescription, UpdateDomainNameRequest,
};

struct StoredDomain {
    configuration: DomainNameConfig,
    mutual_tls: Option<MutualTlsConfig>,
    tags: HashMap<String, String>,
    hosted_zone_id: String,
    /// GetDomainName calls left before the domain reports AVAILABLE
    pending_polls: usize,
    /// Never becomes AVAILABLE again
    stuck: bool,
}

#[derive(Default)]
struct MockState {
    domains: HashMap<String, StoredDomain>,
    calls: Vec<String>,
    updates: Vec<UpdateDomainNameRequest>,
    failures: VecDeque<ApiError>,
}

pub struct MockDomainNameApi {
    state: Mutex<MockState>,
    pending_polls: usize,
    stuck: bool,
    stuck_after_update: bool,
    status: Option<DomainNameStatus>,
}

impl MockDomainNameApi {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState::default()),
            pending_polls: 0,
            stuck: false,
            stuck_after_update: false,
            status: None,
        }
    }

    /// Report UPDATING for this many GetDomainName calls after create or update
    pub fn with_pending_polls(mut self, polls: usize) -> Self {
        self.pending_polls = polls;
        self
    }

    /// Never become AVAILABLE
    pub fn stuck_updating(mut self) -> Self {
        self.stuck = true;
        self
    }

    /// Create normally, then stay UPDATING after the first UpdateDomainName
    pub fn stuck_after_update(mut self) -> Self {
        self.stuck_after_update = true;
        self
    }

    /// Report a fixed status for every endpoint
    pub fn with_status(mut self, status: DomainNameStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Fail the next call with `err`
    pub fn fail_next(self, err: ApiError) -> Self {
        self.state.lock().unwrap().failures.push_back(err);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn count(&self, operation: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .calls
            .iter()
            .filter(|c| c.as_str() == operation)
            .count()
    }

    pub fn updates(&self) -> Vec<UpdateDomainNameRequest> {
        self.state.lock().unwrap().updates.clone()
    }

    fn begin(&self, operation: &str) -> ApiResult<std::sync::MutexGuard<'_, MockState>> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(operation.to_string());
        match state.failures.pop_front() {
            Some(err) => Err(err),
            None => Ok(state),
        }
    }

    fn status_of(&self, domain: &StoredDomain) -> DomainNameStatus {
        if let Some(status) = &self.status {
            status.clone()
        } else if self.stuck || domain.stuck || domain.pending_polls > 0 {
            DomainNameStatus::Updating
        } else {
            DomainNameStatus::Available
        }
    }

    fn describe(&self, name: &str, domain: &StoredDomain) -> DomainNameDescription {
        let status = self.status_of(domain);
        let status_message = match status {
            DomainNameStatus::PendingCertificateReimport => {
                Some("The certificate has expired".to_string())
            }
            _ => None,
        };
        DomainNameDescription {
            domain_name: name.to_string(),
            api_mapping_selection_expression: Some("$request.basepath".to_string()),
            endpoints: vec![EndpointDescription {
                certificate_arn: Some(domain.configuration.certificate_arn.clone()),
                endpoint_type: Some(domain.configuration.endpoint_type.clone()),
                security_policy: Some(domain.configuration.security_policy.clone()),
                ownership_verification_certificate_arn: domain
                    .configuration
                    .ownership_verification_certificate_arn
                    .clone(),
                hosted_zone_id: Some(domain.hosted_zone_id.clone()),
                target_domain_name: Some(format!(
                    "d-{:x}.execute-api.us-west-2.amazonaws.com",
                    name.len() * 7919
                )),
                status,
                status_message,
            }],
            mutual_tls: domain.mutual_tls.as_ref().map(|m| MutualTlsDescription {
                truststore_uri: Some(m.truststore_uri.clone()),
                truststore_version: m.truststore_version.clone(),
                truststore_warnings: vec![],
            }),
            tags: domain.tags.clone(),
        }
    }

    fn not_found(name: &str) -> ApiError {
        ApiError::NotFound(format!("Unable to find domain name {}", name))
    }
}

#[async_trait]
impl DomainNameApi for MockDomainNameApi {
    async fn get_domain_name(&self, domain_name: &str) -> ApiResult<Option<DomainNameDescription>> {
        let mut state = self.begin("GetDomainName")?;
        let Some(domain) = state.domains.get_mut(domain_name) else {
            return Ok(None);
        };
        domain.pending_polls = domain.pending_polls.saturating_sub(1);
        Ok(Some(self.describe(domain_name, domain)))
    }

    async fn create_domain_name(
        &self,
        request: &CreateDomainNameRequest,
    ) -> ApiResult<DomainNameDescription> {
        let mut state = self.begin("CreateDomainName")?;
        if state.domains.contains_key(&request.domain_name) {
            return Err(ApiError::Service {
                code: "ConflictException".to_string(),
                message: format!("Domain name {} already exists", request.domain_name),
            });
        }
        let domain = StoredDomain {
            configuration: request.configuration.clone(),
            mutual_tls: request.mutual_tls.clone(),
            tags: request.tags.clone(),
            hosted_zone_id: "Z2OJLYMUO9EFXC".to_string(),
            pending_polls: self.pending_polls,
            stuck: false,
        };
        let description = self.describe(&request.domain_name, &domain);
        state.domains.insert(request.domain_name.clone(), domain);
        Ok(description)
    }

    async fn update_domain_name(
        &self,
        request: &UpdateDomainNameRequest,
    ) -> ApiResult<DomainNameDescription> {
        let mut state = self.begin("UpdateDomainName")?;
        state.updates.push(request.clone());
        let pending_polls = self.pending_polls;
        let stuck_after_update = self.stuck_after_update;
        let domain = state
            .domains
            .get_mut(&request.domain_name)
            .ok_or_else(|| Self::not_found(&request.domain_name))?;

        domain.configuration = request.configuration.clone();
        if let Some(mtls) = &request.mutual_tls {
            domain.mutual_tls = (!mtls.truststore_uri.is_empty()).then(|| mtls.clone());
        }
        domain.pending_polls = pending_polls;
        domain.stuck |= stuck_after_update;
        Ok(self.describe(&request.domain_name, domain))
    }

    async fn delete_domain_name(&self, domain_name: &str) -> ApiResult<()> {
        let mut state = self.begin("DeleteDomainName")?;
        state
            .domains
            .remove(domain_name)
            .map(|_| ())
            .ok_or_else(|| Self::not_found(domain_name))
    }

    async fn tag_resource(&self, arn: &str, tags: &HashMap<String, String>) -> ApiResult<()> {
        let mut state = self.begin("TagResource")?;
        let name = arn.rsplit('/').next().unwrap_or(arn);
        let domain = state
            .domains
            .get_mut(name)
            .ok_or_else(|| Self::not_found(name))?;
        domain.tags.extend(tags.clone());
        Ok(())
    }

    async fn untag_resource(&self, arn: &str, keys: &[String]) -> ApiResult<()> {
        let mut state = self.begin("UntagResource")?;
        let name = arn.rsplit('/').next().unwrap_or(arn);
        let domain = state
            .domains
            .get_mut(name)
            .ok_or_else(|| Self::not_found(name))?;
        for key in keys {
            domain.tags.remove(key);
        }
        Ok(())
    }
}
