//! Parser - Parse .prt files
//!
//! Convert DSL to resources, provider and backend configuration using pest

use pest::Parser;
use pest::iterators::{Pair, Pairs};
use pest_derive::Parser;
use std::collections::HashMap;
use std::env;

use crate::resource::{Resource, ResourceId, Value};

#[derive(Parser)]
#[grammar = "parser/portico.pest"]
struct PorticoParser;

/// Parse error
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("Syntax error: {0}")]
    Syntax(#[from] Box<pest::error::Error<Rule>>),

    #[error("Invalid expression at line {line}: {message}")]
    InvalidExpression { line: usize, message: String },

    #[error("Undefined variable: {0}")]
    UndefinedVariable(String),

    #[error("Environment variable not set: {0}")]
    EnvVarNotSet(String),

    #[error("Invalid resource type: {0}")]
    InvalidResourceType(String),

    #[error("Duplicate resource address: {0}")]
    DuplicateResource(String),
}

/// Provider configuration
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub name: String,
    pub attributes: HashMap<String, Value>,
}

/// Backend configuration for state storage
#[derive(Debug, Clone)]
pub struct BackendConfig {
    /// Backend type (e.g., "local")
    pub backend_type: String,
    /// Backend-specific attributes
    pub attributes: HashMap<String, Value>,
}

/// Parse result
#[derive(Debug, Clone, Default)]
pub struct ParsedFile {
    pub providers: Vec<ProviderConfig>,
    pub resources: Vec<Resource>,
    pub variables: HashMap<String, Value>,
    /// Backend configuration for state storage
    pub backend: Option<BackendConfig>,
}

impl ParsedFile {
    pub fn provider(&self, name: &str) -> Option<&ProviderConfig> {
        self.providers.iter().find(|p| p.name == name)
    }
}

/// Parse context (variable scope)
struct ParseContext {
    variables: HashMap<String, Value>,
}

impl ParseContext {
    fn new() -> Self {
        Self {
            variables: HashMap::new(),
        }
    }

    fn set_variable(&mut self, name: String, value: Value) {
        self.variables.insert(name, value);
    }

    fn get_variable(&self, name: &str) -> Option<&Value> {
        self.variables.get(name)
    }
}

/// Parse a .prt file
pub fn parse(input: &str) -> Result<ParsedFile, ParseError> {
    let pairs = PorticoParser::parse(Rule::file, input).map_err(Box::new)?;

    let mut ctx = ParseContext::new();
    let mut providers = Vec::new();
    let mut resources: Vec<Resource> = Vec::new();
    let mut backend = None;

    for pair in pairs {
        if pair.as_rule() != Rule::file {
            continue;
        }
        for inner in pair.into_inner() {
            if inner.as_rule() != Rule::statement {
                continue;
            }
            for stmt in inner.into_inner() {
                let resource = match stmt.as_rule() {
                    Rule::backend_block => {
                        backend = Some(parse_backend_block(stmt, &ctx)?);
                        None
                    }
                    Rule::provider_block => {
                        providers.push(parse_provider_block(stmt, &ctx)?);
                        None
                    }
                    Rule::let_binding => {
                        let (name, value, maybe_resource) = parse_let_binding(stmt, &ctx)?;
                        ctx.set_variable(name, value);
                        maybe_resource
                    }
                    Rule::anonymous_resource => Some(parse_anonymous_resource(stmt, &ctx)?),
                    _ => None,
                };

                if let Some(resource) = resource {
                    if resources.iter().any(|r| r.id == resource.id) {
                        return Err(ParseError::DuplicateResource(resource.id.to_string()));
                    }
                    resources.push(resource);
                }
            }
        }
    }

    Ok(ParsedFile {
        providers,
        resources,
        variables: ctx.variables,
        backend,
    })
}

fn line_of(pair: &Pair<Rule>) -> usize {
    pair.as_span().start_pos().line_col().0
}

/// Next child of a pair whose shape the grammar guarantees
fn next_pair<'i>(pairs: &mut Pairs<'i, Rule>, line: usize) -> Result<Pair<'i, Rule>, ParseError> {
    pairs.next().ok_or_else(|| ParseError::InvalidExpression {
        line,
        message: "Unexpected end of expression".to_string(),
    })
}

fn parse_let_binding(
    pair: Pair<Rule>,
    ctx: &ParseContext,
) -> Result<(String, Value, Option<Resource>), ParseError> {
    let line = line_of(&pair);
    let mut inner = pair.into_inner();
    let name = next_pair(&mut inner, line)?.as_str().to_string();
    let expr_pair = next_pair(&mut inner, line)?;

    match expr_pair.as_rule() {
        Rule::resource_expr => {
            let resource = parse_resource_expr(expr_pair, ctx, Some(&name))?;
            let ref_value = Value::String(format!("${{{}}}", name));
            Ok((name, ref_value, Some(resource)))
        }
        _ => {
            let value = parse_expression(expr_pair, ctx)?;
            Ok((name, value, None))
        }
    }
}

fn parse_attribute(pair: Pair<Rule>, ctx: &ParseContext) -> Result<(String, Value), ParseError> {
    let line = line_of(&pair);
    let mut inner = pair.into_inner();
    let key = next_pair(&mut inner, line)?.as_str().to_string();
    let value = parse_expression(next_pair(&mut inner, line)?, ctx)?;
    Ok((key, value))
}

/// Parse `<keyword> <name> { attr = value ... }`
fn parse_named_block(
    pair: Pair<Rule>,
    ctx: &ParseContext,
) -> Result<(String, HashMap<String, Value>), ParseError> {
    let line = line_of(&pair);
    let mut inner = pair.into_inner();
    let name = next_pair(&mut inner, line)?.as_str().to_string();

    let mut attributes = HashMap::new();
    for attr_pair in inner {
        if attr_pair.as_rule() == Rule::attribute {
            let (key, value) = parse_attribute(attr_pair, ctx)?;
            attributes.insert(key, value);
        }
    }

    Ok((name, attributes))
}

fn parse_provider_block(pair: Pair<Rule>, ctx: &ParseContext) -> Result<ProviderConfig, ParseError> {
    let (name, attributes) = parse_named_block(pair, ctx)?;
    Ok(ProviderConfig { name, attributes })
}

fn parse_backend_block(pair: Pair<Rule>, ctx: &ParseContext) -> Result<BackendConfig, ParseError> {
    let (backend_type, attributes) = parse_named_block(pair, ctx)?;
    Ok(BackendConfig {
        backend_type,
        attributes,
    })
}

fn parse_anonymous_resource(pair: Pair<Rule>, ctx: &ParseContext) -> Result<Resource, ParseError> {
    parse_resource_expr(pair, ctx, None)
}

/// Parse block contents (attributes and nested blocks)
/// Nested blocks with the same name are collected into a list
fn parse_block_contents(
    pairs: Pairs<Rule>,
    ctx: &ParseContext,
) -> Result<HashMap<String, Value>, ParseError> {
    let mut attributes: HashMap<String, Value> = HashMap::new();
    let mut nested_blocks: HashMap<String, Vec<Value>> = HashMap::new();

    for content_pair in pairs {
        if content_pair.as_rule() != Rule::block_content {
            continue;
        }
        let line = line_of(&content_pair);
        let inner = next_pair(&mut content_pair.into_inner(), line)?;
        match inner.as_rule() {
            Rule::attribute => {
                let (key, value) = parse_attribute(inner, ctx)?;
                attributes.insert(key, value);
            }
            Rule::nested_block => {
                let (block_name, block_attrs) = parse_named_block(inner, ctx)?;
                nested_blocks
                    .entry(block_name)
                    .or_default()
                    .push(Value::Map(block_attrs));
            }
            _ => {}
        }
    }

    // Convert nested blocks to list attributes
    for (name, blocks) in nested_blocks {
        attributes.insert(name, Value::List(blocks));
    }

    Ok(attributes)
}

/// Parse `provider.type { ... }`. The resource is addressed by its binding
/// name, or by its `domain_name` attribute when anonymous.
fn parse_resource_expr(
    pair: Pair<Rule>,
    ctx: &ParseContext,
    binding_name: Option<&str>,
) -> Result<Resource, ParseError> {
    let line = line_of(&pair);
    let mut inner = pair.into_inner();

    let namespaced_type = next_pair(&mut inner, line)?.as_str().to_string();

    // First part is provider name, the rest is resource type
    let Some((provider, resource_type)) = namespaced_type.split_once('.') else {
        return Err(ParseError::InvalidResourceType(namespaced_type.clone()));
    };

    let mut attributes = parse_block_contents(inner, ctx)?;

    let resource_name = match binding_name {
        Some(name) => name.to_string(),
        None => match attributes.get("domain_name") {
            Some(Value::String(s)) => s.clone(),
            _ => {
                return Err(ParseError::InvalidExpression {
                    line,
                    message: format!(
                        "Anonymous {} resource must have a 'domain_name' attribute",
                        namespaced_type
                    ),
                });
            }
        },
    };

    attributes.insert("_provider".to_string(), Value::String(provider.to_string()));
    attributes.insert("_type".to_string(), Value::String(namespaced_type.clone()));
    if let Some(binding) = binding_name {
        attributes.insert("_binding".to_string(), Value::String(binding.to_string()));
    }

    Ok(Resource {
        id: ResourceId::new(resource_type, resource_name),
        attributes,
    })
}

fn parse_expression(pair: Pair<Rule>, ctx: &ParseContext) -> Result<Value, ParseError> {
    let line = line_of(&pair);
    let inner = if pair.as_rule() == Rule::expression {
        next_pair(&mut pair.into_inner(), line)?
    } else {
        pair
    };
    parse_primary_value(inner, ctx)
}

fn parse_primary_value(pair: Pair<Rule>, ctx: &ParseContext) -> Result<Value, ParseError> {
    let line = line_of(&pair);
    // For primary, get inner content; otherwise process directly
    let inner = if pair.as_rule() == Rule::primary {
        next_pair(&mut pair.into_inner(), line)?
    } else {
        pair
    };

    match inner.as_rule() {
        Rule::env_var => {
            let var_name = parse_string(next_pair(&mut inner.into_inner(), line)?);
            match env::var(&var_name) {
                Ok(val) => Ok(Value::String(val)),
                Err(_) => Err(ParseError::EnvVarNotSet(var_name)),
            }
        }
        Rule::list => {
            let items: Result<Vec<Value>, ParseError> = inner
                .into_inner()
                .map(|item| parse_expression(item, ctx))
                .collect();
            Ok(Value::List(items?))
        }
        Rule::map => {
            let mut map = HashMap::new();
            for entry in inner.into_inner() {
                if entry.as_rule() == Rule::map_entry {
                    let mut entry_inner = entry.into_inner();
                    let key_pair = next_pair(&mut entry_inner, line)?;
                    let key = if key_pair.as_rule() == Rule::string {
                        parse_string(key_pair)
                    } else {
                        key_pair.as_str().to_string()
                    };
                    let value = parse_expression(next_pair(&mut entry_inner, line)?, ctx)?;
                    map.insert(key, value);
                }
            }
            Ok(Value::Map(map))
        }
        Rule::namespaced_id => {
            // Member access into a map variable (common.env), otherwise a
            // namespaced value such as EndpointType.REGIONAL
            let full_str = inner.as_str();
            if let Some((var, key)) = full_str.split_once('.')
                && !key.contains('.')
                && let Some(Value::Map(map)) = ctx.get_variable(var)
            {
                return map.get(key).cloned().ok_or_else(|| ParseError::InvalidExpression {
                    line,
                    message: format!("'{}' has no key '{}'", var, key),
                });
            }
            Ok(Value::String(full_str.to_string()))
        }
        Rule::boolean => Ok(Value::Bool(inner.as_str() == "true")),
        Rule::number => {
            let n: i64 = inner
                .as_str()
                .parse()
                .map_err(|e| ParseError::InvalidExpression {
                    line,
                    message: format!("Invalid number '{}': {}", inner.as_str(), e),
                })?;
            Ok(Value::Int(n))
        }
        Rule::string => Ok(Value::String(parse_string(inner))),
        Rule::variable_ref => {
            let name = inner.as_str();
            match ctx.get_variable(name) {
                Some(val) => Ok(val.clone()),
                None => Err(ParseError::UndefinedVariable(name.to_string())),
            }
        }
        Rule::expression => parse_expression(inner, ctx),
        _ => Ok(Value::String(inner.as_str().to_string())),
    }
}

fn parse_string(pair: Pair<Rule>) -> String {
    let s = pair.as_str();
    // Remove quotes
    let inner = &s[1..s.len() - 1];

    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('t') => out.push('\t'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn s(v: &str) -> Value {
        Value::String(v.to_string())
    }

    #[test]
    fn parse_provider_block() {
        let input = r#"
            provider apigateway {
                region = "us-west-2"
                default_tags = { team = "edge" }
            }
        "#;

        let result = parse(input).unwrap();
        let provider = result.provider("apigateway").unwrap();
        assert_eq!(provider.attributes.get("region"), Some(&s("us-west-2")));
        assert_eq!(
            provider.attributes.get("default_tags"),
            Some(&Value::Map(HashMap::from([("team".to_string(), s("edge"))])))
        );
    }

    #[test]
    fn parse_backend_block() {
        let input = r#"
            backend local {
                path = "portico.state.json"
            }
        "#;

        let result = parse(input).unwrap();
        let backend = result.backend.unwrap();
        assert_eq!(backend.backend_type, "local");
        assert_eq!(
            backend.attributes.get("path"),
            Some(&s("portico.state.json"))
        );
    }

    #[test]
    fn parse_bound_resource_with_nested_blocks() {
        let input = r#"
            # HTTP API domain
            let api = apigateway.domain_name {
                domain_name = "http-api.example.com"
                domain_name_configuration {
                    certificate_arn = "arn:aws:acm:us-west-2:123456789012:certificate/abc"
                    endpoint_type   = EndpointType.REGIONAL
                    security_policy = "TLS_1_2"
                }
                tags = { env = "prod", "cost-center" = "42" }
                timeouts {
                    create = "15m"
                }
            }
        "#;

        let result = parse(input).unwrap();
        assert_eq!(result.resources.len(), 1);

        let resource = &result.resources[0];
        assert_eq!(resource.id, ResourceId::new("domain_name", "api"));
        assert_eq!(resource.provider(), Some("apigateway"));
        assert_eq!(resource.attributes.get("_binding"), Some(&s("api")));

        let Some(Value::List(blocks)) = resource.attributes.get("domain_name_configuration") else {
            panic!("expected a block list");
        };
        assert_eq!(blocks.len(), 1);
        assert_eq!(
            blocks[0].as_map().unwrap().get("endpoint_type"),
            Some(&s("EndpointType.REGIONAL"))
        );

        let tags = resource.attributes.get("tags").unwrap().as_map().unwrap();
        assert_eq!(tags.get("cost-center"), Some(&s("42")));
    }

    #[test]
    fn anonymous_resource_is_addressed_by_domain_name() {
        let input = r#"
            apigateway.domain_name {
                domain_name = "ws-api.example.com"
            }
        "#;

        let result = parse(input).unwrap();
        assert_eq!(result.resources[0].id.name, "ws-api.example.com");
    }

    #[test]
    fn anonymous_resource_without_domain_name_fails() {
        let input = r#"
            apigateway.domain_name {
                tags = {}
            }
        "#;

        assert!(matches!(
            parse(input),
            Err(ParseError::InvalidExpression { line: 2, .. })
        ));
    }

    #[test]
    fn parse_variables_and_member_access() {
        let input = r#"
            let common = { env = "prod", team = "edge" }
            let cert = "arn:aws:acm:us-east-1:123456789012:certificate/abc"
            let retries = -3
            let enabled = true

            let api = apigateway.domain_name {
                domain_name = "api.example.com"
                domain_name_configuration {
                    certificate_arn = cert
                }
                tags = { env = common.env }
            }
        "#;

        let result = parse(input).unwrap();
        assert_eq!(result.variables.get("retries"), Some(&Value::Int(-3)));
        assert_eq!(result.variables.get("enabled"), Some(&Value::Bool(true)));

        let resource = &result.resources[0];
        let tags = resource.attributes.get("tags").unwrap().as_map().unwrap();
        assert_eq!(tags.get("env"), Some(&s("prod")));
    }

    #[test]
    fn parse_list_and_escapes() {
        let input = r#"
            // line comment
            let names = ["a\"b", "tab\there",]
        "#;

        let result = parse(input).unwrap();
        assert_eq!(
            result.variables.get("names"),
            Some(&Value::List(vec![s("a\"b"), s("tab\there")]))
        );
    }

    #[test]
    fn parse_env_var() {
        // SAFETY: This test runs in isolation
        unsafe {
            env::set_var("PORTICO_TEST_CERT", "arn:aws:acm:us-east-1:1:certificate/x");
        }

        let input = r#"
            let cert = env("PORTICO_TEST_CERT")
        "#;

        let result = parse(input).unwrap();
        assert_eq!(
            result.variables.get("cert"),
            Some(&s("arn:aws:acm:us-east-1:1:certificate/x"))
        );
    }

    #[test]
    fn missing_env_var_fails() {
        let input = r#"let x = env("PORTICO_SURELY_UNSET_VAR")"#;
        assert!(matches!(parse(input), Err(ParseError::EnvVarNotSet(_))));
    }

    #[test]
    fn undefined_variable_fails() {
        let input = r#"
            let api = apigateway.domain_name {
                domain_name = missing
            }
        "#;
        assert!(matches!(parse(input), Err(ParseError::UndefinedVariable(_))));
    }

    #[test]
    fn duplicate_address_fails() {
        let input = r#"
            apigateway.domain_name {
                domain_name = "a.example.com"
            }
            apigateway.domain_name {
                domain_name = "a.example.com"
            }
        "#;
        assert!(matches!(parse(input), Err(ParseError::DuplicateResource(_))));
    }

    #[test]
    fn syntax_error_carries_location() {
        let err = parse("let = 1").unwrap_err();
        assert!(matches!(err, ParseError::Syntax(_)));
        assert!(err.to_string().contains("1:"));
    }
}
