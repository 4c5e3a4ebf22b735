//! Configuration validation against a [`ResourceSchema`]
//!
//! Raw attribute maps come straight from the declarative document. Numbers
//! may arrive as JSON numbers or as numeric strings (`fall_count = "2"`);
//! both are parsed here so nothing downstream sees string-typed numbers.

use super::registry::{AttributeDef, AttributeKind, ResourceSchema};
use crate::error::{Diagnostic, ProviderError};
use crate::nsx::model::Tag;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Attribute map as written by the user
pub type RawConfig = Map<String, Value>;

/// Attribute value after type checking
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigValue {
    Str(String),
    Int(u32),
    Port(u16),
    Tags(Vec<Tag>),
}

/// Type-checked configuration with defaults applied
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidatedConfig {
    values: BTreeMap<String, ConfigValue>,
}

impl ValidatedConfig {
    pub fn string(&self, name: &str) -> Option<String> {
        match self.values.get(name) {
            Some(ConfigValue::Str(s)) => Some(s.clone()),
            _ => None,
        }
    }

    pub fn int(&self, name: &str) -> Option<u32> {
        match self.values.get(name) {
            Some(ConfigValue::Int(n)) => Some(*n),
            _ => None,
        }
    }

    pub fn port(&self, name: &str) -> Option<u16> {
        match self.values.get(name) {
            Some(ConfigValue::Port(p)) => Some(*p),
            _ => None,
        }
    }

    pub fn tags(&self, name: &str) -> Vec<Tag> {
        match self.values.get(name) {
            Some(ConfigValue::Tags(tags)) => tags.clone(),
            _ => Vec::new(),
        }
    }
}

/// Sort and deduplicate a tag set so that comparisons ignore order
pub fn canonical_tags(mut tags: Vec<Tag>) -> Vec<Tag> {
    tags.sort();
    tags.dedup();
    tags
}

/// Validate `raw` against `schema`, collecting every problem rather than stopping at the first
pub fn validate(schema: &ResourceSchema, raw: &RawConfig) -> Result<ValidatedConfig, ProviderError> {
    let mut diagnostics = Vec::new();
    let mut values = BTreeMap::new();

    for name in raw.keys() {
        match schema.attributes.get(name) {
            None => diagnostics.push(Diagnostic::new(name, "unknown attribute")),
            Some(def) if !def.is_configurable() => diagnostics.push(Diagnostic::new(
                name,
                "attribute is computed and cannot be set",
            )),
            Some(_) => {}
        }
    }

    for (name, def) in &schema.attributes {
        if !def.is_configurable() {
            continue;
        }

        let supplied = raw.get(name).filter(|v| !v.is_null());
        let value = match (supplied, &def.default) {
            (Some(value), _) => value,
            (None, Some(default)) => default,
            (None, None) => {
                if def.required {
                    diagnostics.push(Diagnostic::new(name, "required attribute is missing"));
                }
                continue;
            }
        };

        match convert(name, def, value) {
            Ok(converted) => {
                values.insert(name.clone(), converted);
            }
            Err(mut errs) => diagnostics.append(&mut errs),
        }
    }

    if diagnostics.is_empty() {
        Ok(ValidatedConfig { values })
    } else {
        Err(ProviderError::Validation(diagnostics))
    }
}

fn convert(name: &str, def: &AttributeDef, value: &Value) -> Result<ConfigValue, Vec<Diagnostic>> {
    let single = |message: String| vec![Diagnostic::new(name, message)];

    match def.kind {
        AttributeKind::String => match value {
            Value::String(s) => Ok(ConfigValue::Str(s.clone())),
            other => Err(single(format!("expected a string, got {}", type_name(other)))),
        },
        AttributeKind::Int => {
            let n = parse_unsigned(value).map_err(single)?;
            let n = u32::try_from(n).map_err(|_| single(format!("{} is too large", n)))?;
            if let Some(min) = def.min {
                if u64::from(n) < min {
                    return Err(single(format!("must be at least {}, got {}", min, n)));
                }
            }
            Ok(ConfigValue::Int(n))
        }
        AttributeKind::Port => {
            let n = parse_unsigned(value).map_err(single)?;
            match u16::try_from(n) {
                Ok(port) if port > 0 => Ok(ConfigValue::Port(port)),
                _ => Err(single(format!("{} is not a valid port (1-65535)", n))),
            }
        }
        AttributeKind::Tags => convert_tags(name, value),
    }
}

fn parse_unsigned(value: &Value) -> Result<u64, String> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .ok_or_else(|| format!("expected a non-negative integer, got {}", n)),
        Value::String(s) => s
            .trim()
            .parse::<u64>()
            .map_err(|_| format!("expected a non-negative integer, got {:?}", s)),
        other => Err(format!("expected an integer, got {}", type_name(other))),
    }
}

fn convert_tags(name: &str, value: &Value) -> Result<ConfigValue, Vec<Diagnostic>> {
    let Value::Array(blocks) = value else {
        return Err(vec![Diagnostic::new(
            name,
            format!("expected a list of tag blocks, got {}", type_name(value)),
        )]);
    };

    let mut diagnostics = Vec::new();
    let mut tags = Vec::with_capacity(blocks.len());

    for (index, block) in blocks.iter().enumerate() {
        let path = format!("{}[{}]", name, index);
        let Value::Object(fields) = block else {
            diagnostics.push(Diagnostic::new(&path, "expected a block with scope and tag"));
            continue;
        };

        let mut tag = Tag::default();
        for (key, field) in fields {
            let target = match key.as_str() {
                "scope" => &mut tag.scope,
                "tag" => &mut tag.tag,
                other => {
                    diagnostics.push(Diagnostic::new(
                        format!("{}.{}", path, other),
                        "unknown attribute",
                    ));
                    continue;
                }
            };
            match field {
                Value::String(s) => *target = s.clone(),
                Value::Null => {}
                other => diagnostics.push(Diagnostic::new(
                    format!("{}.{}", path, key),
                    format!("expected a string, got {}", type_name(other)),
                )),
            }
        }
        tags.push(tag);
    }

    if diagnostics.is_empty() {
        Ok(ConfigValue::Tags(canonical_tags(tags)))
    } else {
        Err(diagnostics)
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "a block",
    }
}
