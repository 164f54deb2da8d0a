//! Utility functions for value normalization and ARN construction

/// Normalize region value (e.g., "aws.Region.ap_northeast_1" -> "ap-northeast-1")
pub fn normalize_region(s: &str) -> String {
    let region_part = if s.contains('.') {
        s.split('.').next_back().unwrap_or(s)
    } else {
        s
    };
    region_part.replace('_', "-")
}

/// AWS partition a region belongs to
pub fn partition(region: &str) -> &'static str {
    if region.starts_with("cn-") {
        "aws-cn"
    } else if region.starts_with("us-gov-") {
        "aws-us-gov"
    } else if region.starts_with("us-iso-") {
        "aws-iso"
    } else if region.starts_with("us-isob-") {
        "aws-iso-b"
    } else {
        "aws"
    }
}

/// ARN of a custom domain name, used for tagging
pub fn domain_name_arn(region: &str, domain_name: &str) -> String {
    format!(
        "arn:{}:apigateway:{}::/domainnames/{}",
        partition(region),
        region,
        domain_name
    )
}
