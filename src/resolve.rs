use std::env;

use indexmap::IndexMap;
use serde_json::Value;

use crate::coordinate::Coordinate;
use crate::entity::EntityMap;
use crate::error::{DeployerError, Result};
use crate::model::{Config, Parameter, ReferenceProperty};

/// Reserved parameter name carrying the insert-position hint for settings
/// objects.
pub const INSERT_AFTER_PARAMETER: &str = "insertAfter";

/// Position hint passed to the settings upsert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertPosition {
    Front,
    Back,
    After(String),
}

/// Resolve every parameter of `config` against the environment's resolved
/// entities, reading OS variables for environment parameters.
///
/// The input config is not mutated; callers receive a standalone properties
/// map to render with and to attach to the published ResolvedEntity.
pub fn resolve_parameters(
    config: &Config,
    entities: &EntityMap,
) -> Result<IndexMap<String, Value>> {
    resolve_parameters_with_env(config, entities, |key| env::var(key).ok())
}

pub fn resolve_parameters_with_env<F>(
    config: &Config,
    entities: &EntityMap,
    get_env: F,
) -> Result<IndexMap<String, Value>>
where
    F: Fn(&str) -> Option<String>,
{
    let mut properties: IndexMap<String, Value> = IndexMap::new();

    // Compound parameters format over their siblings, so simple parameters
    // resolve first.
    for (name, parameter) in &config.parameters {
        if matches!(parameter, Parameter::Compound { .. }) {
            continue;
        }
        let value = resolve_simple(config, name, parameter, entities, &get_env)?;
        properties.insert(name.clone(), value);
    }

    for (name, parameter) in &config.parameters {
        let Parameter::Compound { format, references } = parameter else {
            continue;
        };
        let mut rendered = format.clone();
        for reference in references {
            let value = properties.get(reference).ok_or_else(|| {
                DeployerError::Parameter {
                    coordinate: config.coordinate.clone(),
                    parameter: name.clone(),
                    reason: format!("compound references unknown parameter '{reference}'"),
                }
            })?;
            rendered = substitute(&rendered, reference, &value_to_string(value));
        }
        properties.insert(name.clone(), Value::String(rendered));
    }

    Ok(properties)
}

fn resolve_simple<F>(
    config: &Config,
    name: &str,
    parameter: &Parameter,
    entities: &EntityMap,
    get_env: &F,
) -> Result<Value>
where
    F: Fn(&str) -> Option<String>,
{
    match parameter {
        Parameter::Value { value } => Ok(value.clone()),
        Parameter::Environment {
            name: var,
            default_value,
        } => match get_env(var).or_else(|| default_value.clone()) {
            Some(value) => Ok(Value::String(value)),
            None => Err(DeployerError::MissingEnvVar {
                coordinate: config.coordinate.clone(),
                name: var.clone(),
            }),
        },
        Parameter::Reference {
            coordinate,
            property,
        } => resolve_reference(config, coordinate, *property, entities),
        Parameter::Compound { .. } => Err(DeployerError::Parameter {
            coordinate: config.coordinate.clone(),
            parameter: name.to_string(),
            reason: "compound parameters cannot reference other compounds".to_string(),
        }),
    }
}

fn resolve_reference(
    config: &Config,
    referenced: &Coordinate,
    property: ReferenceProperty,
    entities: &EntityMap,
) -> Result<Value> {
    // The graph deploys dependencies first; an absent entity here means the
    // ordering was violated.
    let entity = entities
        .get(referenced)
        .ok_or_else(|| DeployerError::UnresolvedReference {
            coordinate: config.coordinate.clone(),
            referenced: referenced.clone(),
        })?;
    let value = match property {
        ReferenceProperty::Id => entity.id,
        ReferenceProperty::Name => entity.name,
    };
    Ok(Value::String(value))
}

/// Apply `{{name}}` substitution over the template using the resolved
/// properties. Placeholders without a matching property are left untouched.
pub fn render_template(template: &str, properties: &IndexMap<String, Value>) -> String {
    let mut rendered = template.to_string();
    for (name, value) in properties {
        rendered = substitute(&rendered, name, &value_to_string(value));
    }
    rendered
}

fn substitute(template: &str, name: &str, replacement: &str) -> String {
    template.replace(&format!("{{{{{name}}}}}"), replacement)
}

/// Render a resolved property for template insertion. Strings are inserted
/// verbatim; everything else keeps its JSON encoding.
pub fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

/// Extract the settings insert-position hint from resolved properties. The
/// magic tokens FRONT and BACK are case-insensitive; anything else is an
/// opaque predecessor object id.
pub fn insert_position(properties: &IndexMap<String, Value>) -> Option<InsertPosition> {
    let value = properties.get(INSERT_AFTER_PARAMETER)?;
    let text = value_to_string(value);
    match text.to_ascii_uppercase().as_str() {
        "FRONT" => Some(InsertPosition::Front),
        "BACK" => Some(InsertPosition::Back),
        _ => Some(InsertPosition::After(text)),
    }
}
