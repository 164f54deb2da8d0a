//! Schema of `apigateway.domain_name`

use std::time::Duration;

use portico_core::provider::ResourceType;
use portico_core::schema::{
    AttributeSchema, AttributeType, BlockSchema, ResourceSchema, ResourceTimeouts, types,
};

pub const RESOURCE_TYPE: &str = "domain_name";

pub const DEFAULT_CREATE_TIMEOUT: Duration = Duration::from_secs(10 * 60);
pub const DEFAULT_UPDATE_TIMEOUT: Duration = Duration::from_secs(60 * 60);

pub fn endpoint_type() -> AttributeType {
    AttributeType::enumeration("EndpointType", &["REGIONAL"])
}

pub fn security_policy() -> AttributeType {
    AttributeType::enumeration("SecurityPolicy", &["TLS_1_2"])
}

fn domain_name_configuration() -> BlockSchema {
    BlockSchema::new()
        .attribute(
            AttributeSchema::new("certificate_arn", types::arn())
                .required()
                .with_description("ARN of the ACM certificate served by the endpoint"),
        )
        .attribute(AttributeSchema::new("endpoint_type", endpoint_type()).required())
        .attribute(
            AttributeSchema::new("security_policy", security_policy())
                .required()
                .with_description("TLS version of the endpoint"),
        )
        .attribute(
            AttributeSchema::new("ownership_verification_certificate_arn", types::arn())
                .with_description("Public certificate proving ownership when mutual TLS uses a private certificate"),
        )
        .attribute(AttributeSchema::new("hosted_zone_id", AttributeType::String).computed())
        .attribute(
            AttributeSchema::new("target_domain_name", AttributeType::String)
                .computed()
                .with_description("Domain name to point the DNS alias record at"),
        )
        .with_min_items(1)
        .with_max_items(1)
}

fn mutual_tls_authentication() -> BlockSchema {
    BlockSchema::new()
        .attribute(AttributeSchema::new("truststore_uri", types::s3_uri()).required())
        .attribute(AttributeSchema::new("truststore_version", AttributeType::String))
        .with_max_items(1)
}

fn timeouts() -> BlockSchema {
    BlockSchema::new()
        .attribute(AttributeSchema::new("create", types::duration()))
        .attribute(AttributeSchema::new("update", types::duration()))
        .with_max_items(1)
}

fn string_map() -> AttributeType {
    AttributeType::Map(Box::new(AttributeType::String))
}

/// Schema for API Gateway v2 custom domain names
pub fn domain_name_schema() -> ResourceSchema {
    ResourceSchema::new(RESOURCE_TYPE)
        .with_description("API Gateway v2 custom domain name")
        .attribute(
            AttributeSchema::new(
                "domain_name",
                AttributeType::BoundedString { min: 1, max: 512 },
            )
            .required()
            .force_new(),
        )
        .attribute(
            AttributeSchema::new(
                "domain_name_configuration",
                AttributeType::Block(domain_name_configuration()),
            )
            .required(),
        )
        .attribute(AttributeSchema::new(
            "mutual_tls_authentication",
            AttributeType::Block(mutual_tls_authentication()),
        ))
        .attribute(AttributeSchema::new("tags", string_map()))
        .attribute(
            AttributeSchema::new("tags_all", string_map())
                .computed()
                .with_description("Resource tags merged with the provider's default_tags"),
        )
        .attribute(AttributeSchema::new("id", AttributeType::String).computed())
        .attribute(AttributeSchema::new("arn", AttributeType::String).computed())
        .attribute(
            AttributeSchema::new("api_mapping_selection_expression", AttributeType::String)
                .computed(),
        )
        .attribute(AttributeSchema::new("timeouts", AttributeType::Block(timeouts())).local())
        .with_timeouts(
            ResourceTimeouts::default()
                .with_create(DEFAULT_CREATE_TIMEOUT)
                .with_update(DEFAULT_UPDATE_TIMEOUT),
        )
}

pub struct DomainNameType;

impl ResourceType for DomainNameType {
    fn name(&self) -> &'static str {
        RESOURCE_TYPE
    }

    fn schema(&self) -> ResourceSchema {
        domain_name_schema()
    }
}
