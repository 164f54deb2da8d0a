//! Conversion between DSL attributes and DomainNameApi models

use std::collections::HashMap;

use portico_core::provider::{ProviderError, ProviderResult};
use portico_core::resource::Value;
use portico_core::schema::BlockSchema;

use crate::api::{DomainNameConfig, DomainNameDescription, MutualTlsConfig};

fn string_attr(attrs: &HashMap<String, Value>, key: &str) -> Option<String> {
    attrs.get(key).and_then(Value::as_str).map(str::to_string)
}

fn required_string(attrs: &HashMap<String, Value>, key: &str, path: &str) -> ProviderResult<String> {
    string_attr(attrs, key)
        .ok_or_else(|| ProviderError::validation(format!("{}.{} is required", path, key)))
}

/// First instance of a nested block, if any
fn first_block<'a>(
    attrs: &'a HashMap<String, Value>,
    key: &str,
) -> Option<&'a HashMap<String, Value>> {
    attrs
        .get(key)
        .and_then(BlockSchema::instances)
        .and_then(|blocks| blocks.into_iter().next())
}

pub fn domain_name(attrs: &HashMap<String, Value>) -> ProviderResult<String> {
    string_attr(attrs, "domain_name")
        .ok_or_else(|| ProviderError::validation("domain_name is required"))
}

/// `domain_name_configuration` of normalized attributes
pub fn configuration(attrs: &HashMap<String, Value>) -> ProviderResult<DomainNameConfig> {
    let block = first_block(attrs, "domain_name_configuration").ok_or_else(|| {
        ProviderError::validation("domain_name_configuration block is required")
    })?;
    let path = "domain_name_configuration[0]";

    Ok(DomainNameConfig {
        certificate_arn: required_string(block, "certificate_arn", path)?,
        endpoint_type: required_string(block, "endpoint_type", path)?,
        security_policy: required_string(block, "security_policy", path)?,
        ownership_verification_certificate_arn: string_attr(
            block,
            "ownership_verification_certificate_arn",
        ),
    })
}

/// `mutual_tls_authentication`, or `None` when the block is absent
pub fn mutual_tls(attrs: &HashMap<String, Value>) -> ProviderResult<Option<MutualTlsConfig>> {
    let Some(block) = first_block(attrs, "mutual_tls_authentication") else {
        return Ok(None);
    };
    Ok(Some(MutualTlsConfig {
        truststore_uri: required_string(block, "truststore_uri", "mutual_tls_authentication[0]")?,
        truststore_version: string_attr(block, "truststore_version"),
    }))
}

fn insert_opt(map: &mut HashMap<String, Value>, key: &str, value: &Option<String>) {
    if let Some(v) = value {
        map.insert(key.to_string(), Value::String(v.clone()));
    }
}

/// Attributes of a domain name as stored in state
///
/// `tags` excludes values inherited from `default_tags`; `tags_all` is
/// everything the service reports.
pub fn to_attributes(
    desc: &DomainNameDescription,
    arn: &str,
    default_tags: &HashMap<String, String>,
) -> HashMap<String, Value> {
    let mut attributes = HashMap::new();
    attributes.insert("id".to_string(), Value::String(desc.domain_name.clone()));
    attributes.insert(
        "domain_name".to_string(),
        Value::String(desc.domain_name.clone()),
    );
    attributes.insert("arn".to_string(), Value::String(arn.to_string()));
    insert_opt(
        &mut attributes,
        "api_mapping_selection_expression",
        &desc.api_mapping_selection_expression,
    );

    let configurations: Vec<Value> = desc
        .endpoints
        .iter()
        .map(|endpoint| {
            let mut block = HashMap::new();
            insert_opt(&mut block, "certificate_arn", &endpoint.certificate_arn);
            insert_opt(&mut block, "endpoint_type", &endpoint.endpoint_type);
            insert_opt(&mut block, "security_policy", &endpoint.security_policy);
            insert_opt(
                &mut block,
                "ownership_verification_certificate_arn",
                &endpoint.ownership_verification_certificate_arn,
            );
            insert_opt(&mut block, "hosted_zone_id", &endpoint.hosted_zone_id);
            insert_opt(&mut block, "target_domain_name", &endpoint.target_domain_name);
            Value::Map(block)
        })
        .collect();
    if !configurations.is_empty() {
        attributes.insert(
            "domain_name_configuration".to_string(),
            Value::List(configurations),
        );
    }

    // An empty truststore URI means mutual TLS is off
    if let Some(mtls) = &desc.mutual_tls
        && mtls.truststore_uri.as_deref().is_some_and(|uri| !uri.is_empty())
    {
        let mut block = HashMap::new();
        insert_opt(&mut block, "truststore_uri", &mtls.truststore_uri);
        insert_opt(&mut block, "truststore_version", &mtls.truststore_version);
        attributes.insert(
            "mutual_tls_authentication".to_string(),
            Value::List(vec![Value::Map(block)]),
        );
    }

    let resource_tags = crate::tags::strip_defaults(&desc.tags, default_tags);
    if !resource_tags.is_empty() {
        attributes.insert("tags".to_string(), crate::tags::to_value(&resource_tags));
    }
    if !desc.tags.is_empty() {
        attributes.insert("tags_all".to_string(), crate::tags::to_value(&desc.tags));
    }

    attributes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{DomainNameStatus, EndpointDescription, MutualTlsDescription};

    fn s(v: &str) -> Value {
        Value::String(v.to_string())
    }

    fn block(entries: &[(&str, &str)]) -> Value {
        Value::List(vec![Value::Map(
            entries.iter().map(|(k, v)| (k.to_string(), s(v))).collect(),
        )])
    }

    #[test]
    fn builds_configuration_from_block() {
        let attrs = HashMap::from([(
            "domain_name_configuration".to_string(),
            block(&[
                ("certificate_arn", "arn:aws:acm:us-east-1:1:certificate/a"),
                ("endpoint_type", "REGIONAL"),
                ("security_policy", "TLS_1_2"),
            ]),
        )]);

        let config = configuration(&attrs).unwrap();
        assert_eq!(config.certificate_arn, "arn:aws:acm:us-east-1:1:certificate/a");
        assert_eq!(config.ownership_verification_certificate_arn, None);
        assert_eq!(mutual_tls(&attrs).unwrap(), None);
    }

    #[test]
    fn missing_configuration_is_a_validation_error() {
        let err = configuration(&HashMap::new()).unwrap_err();
        assert_eq!(err.kind, portico_core::provider::ProviderErrorKind::Validation);
    }

    #[test]
    fn description_to_attributes() {
        let desc = DomainNameDescription {
            domain_name: "api.example.com".to_string(),
            api_mapping_selection_expression: Some("$request.basepath".to_string()),
            endpoints: vec![EndpointDescription {
                certificate_arn: Some("arn:aws:acm:us-east-1:1:certificate/a".to_string()),
                endpoint_type: Some("REGIONAL".to_string()),
                security_policy: Some("TLS_1_2".to_string()),
                ownership_verification_certificate_arn: None,
                hosted_zone_id: Some("Z1UJRXOUMOOFQ8".to_string()),
                target_domain_name: Some("d-abc.execute-api.us-east-1.amazonaws.com".to_string()),
                status: DomainNameStatus::Available,
                status_message: None,
            }],
            mutual_tls: Some(MutualTlsDescription {
                truststore_uri: Some(String::new()),
                truststore_version: None,
                truststore_warnings: vec![],
            }),
            tags: HashMap::from([
                ("team".to_string(), "edge".to_string()),
                ("env".to_string(), "prod".to_string()),
            ]),
        };
        let defaults = HashMap::from([("team".to_string(), "edge".to_string())]);

        let attrs = to_attributes(&desc, "arn:aws:apigateway:us-east-1::/domainnames/api.example.com", &defaults);

        assert_eq!(attrs.get("id"), Some(&s("api.example.com")));
        assert!(!attrs.contains_key("mutual_tls_authentication"));
        assert_eq!(
            attrs.get("tags"),
            Some(&Value::Map(HashMap::from([("env".to_string(), s("prod"))])))
        );
        assert_eq!(attrs.get("tags_all").and_then(Value::as_map).map(|m| m.len()), Some(2));

        let configs = BlockSchema::instances(&attrs["domain_name_configuration"]).unwrap();
        assert_eq!(configs[0].get("hosted_zone_id"), Some(&s("Z1UJRXOUMOOFQ8")));
    }
}
