//! Portico Core
//!
//! Core library for a declarative tool that manages API Gateway custom domain
//! names: resource model, schema validation, DSL parsing and planning.

pub mod differ;
pub mod effect;
pub mod interpreter;
pub mod parser;
pub mod plan;
pub mod provider;
pub mod resource;
pub mod schema;
