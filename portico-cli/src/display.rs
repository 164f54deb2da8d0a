//! Terminal rendering of plans and values

use std::collections::HashMap;

use colored::Colorize;
use portico_core::effect::Effect;
use portico_core::plan::Plan;
use portico_core::resource::{Resource, State, Value};
use portico_core::schema::ResourceSchema;

pub fn format_value(value: &Value) -> String {
    match value {
        Value::String(s) => format!("\"{}\"", s),
        Value::Int(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::List(items) => {
            let strs: Vec<_> = items.iter().map(format_value).collect();
            format!("[{}]", strs.join(", "))
        }
        Value::Map(map) => {
            let mut keys: Vec<_> = map.keys().collect();
            keys.sort();
            let strs: Vec<_> = keys
                .into_iter()
                .map(|k| format!("{}: {}", k, format_value(&map[k])))
                .collect();
            format!("{{{}}}", strs.join(", "))
        }
    }
}

fn sorted_user_attributes(attributes: &HashMap<String, Value>) -> Vec<(&String, &Value)> {
    let mut attrs: Vec<_> = attributes
        .iter()
        .filter(|(k, _)| !k.starts_with('_'))
        .collect();
    attrs.sort_by(|a, b| a.0.cmp(b.0));
    attrs
}

fn print_changes(
    from: &State,
    to: &Resource,
    changed_attributes: &[String],
    schema: Option<&ResourceSchema>,
) {
    for name in changed_attributes {
        let old = from
            .attributes
            .get(name)
            .map(format_value)
            .unwrap_or_else(|| "(none)".to_string());
        let new = to
            .attributes
            .get(name)
            .map(format_value)
            .unwrap_or_else(|| "(none)".to_string());
        let forces_replacement = schema
            .and_then(|s| s.attributes.get(name))
            .is_some_and(|a| a.force_new);

        if forces_replacement {
            println!(
                "      {}: {} → {} {}",
                name,
                old.red(),
                new.green(),
                "(forces replacement)".red()
            );
        } else {
            println!("      {}: {} → {}", name, old.red(), new.green());
        }
    }
}

pub fn print_plan(plan: &Plan, schemas: &HashMap<String, ResourceSchema>) {
    if plan.is_empty() {
        println!("{}", "No changes. Infrastructure is up-to-date.".green());
        return;
    }

    println!("{}", "Execution Plan:".cyan().bold());
    println!();

    for effect in plan.effects() {
        let id = effect.resource_id();
        let schema = schemas.get(&id.resource_type);
        match effect {
            Effect::Create(resource) => {
                println!("  {} {}", "+".green().bold(), id.to_string().bold());
                for (key, value) in sorted_user_attributes(&resource.attributes) {
                    println!("      {}: {}", key, format_value(value).green());
                }
            }
            Effect::Update {
                from,
                to,
                changed_attributes,
                ..
            } => {
                println!("  {} {}", "~".yellow().bold(), id.to_string().bold());
                print_changes(from, to, changed_attributes, schema);
            }
            Effect::Replace {
                from,
                to,
                changed_attributes,
                ..
            } => {
                println!("  {} {}", "-/+".magenta().bold(), id.to_string().bold());
                print_changes(from, to, changed_attributes, schema);
            }
            Effect::Delete { identifier, .. } => {
                println!(
                    "  {} {} ({})",
                    "-".red().bold(),
                    id.to_string().bold(),
                    identifier
                );
            }
            Effect::Read { .. } => {
                println!("  {} {}", "?".normal(), id);
            }
        }
    }

    println!();
    println!("{}", plan.summary().to_string().bold());
}

pub fn print_state_attributes(attributes: &HashMap<String, Value>) {
    for (key, value) in sorted_user_attributes(attributes) {
        println!("  {} = {}", key, format_value(value));
    }
}
