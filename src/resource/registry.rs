//! Resource Registry - Load resource schemas from JSON
//!
//! Attribute descriptors for every resource kind are embedded at compile
//! time and parsed once on first access.

use super::lb_l4_monitor::Protocol;
use serde::Deserialize;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::OnceLock;

/// Embedded resource JSON files (compiled into the binary)
const RESOURCE_FILES: &[&str] = &[include_str!("../resources/lb_monitors.json")];

/// Value type of an attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttributeKind {
    String,
    /// Non-negative integer; numeric strings are accepted
    Int,
    /// TCP/UDP port, 1-65535
    Port,
    /// Repeatable `{scope, tag}` block
    Tags,
}

/// Attribute definition from JSON
#[derive(Debug, Clone, Deserialize)]
pub struct AttributeDef {
    #[serde(rename = "type")]
    pub kind: AttributeKind,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub optional: bool,
    #[serde(default)]
    pub computed: bool,
    #[serde(default)]
    pub default: Option<Value>,
    #[serde(default)]
    pub min: Option<u64>,
    #[serde(default)]
    pub description: String,
}

impl AttributeDef {
    /// Attribute the user may set in configuration
    pub fn is_configurable(&self) -> bool {
        self.required || self.optional
    }
}

/// Attribute set of one or more resource kinds
#[derive(Debug, Clone, Deserialize)]
#[serde(transparent)]
pub struct ResourceSchema {
    pub attributes: BTreeMap<String, AttributeDef>,
}

/// Resource definition from JSON
#[derive(Debug, Clone, Deserialize)]
pub struct ResourceDef {
    pub display_name: String,
    pub protocol: Protocol,
    pub schema: String,
}

/// Root structure of resources/*.json
#[derive(Debug, Clone, Deserialize)]
pub struct ResourceConfig {
    #[serde(default)]
    pub schemas: HashMap<String, ResourceSchema>,
    #[serde(default)]
    pub resources: HashMap<String, ResourceDef>,
}

/// Global registry loaded from JSON
static REGISTRY: OnceLock<ResourceConfig> = OnceLock::new();

/// Get the resource registry (loads from embedded JSON on first access)
pub fn get_registry() -> &'static ResourceConfig {
    REGISTRY.get_or_init(|| {
        let mut final_config = ResourceConfig {
            schemas: HashMap::new(),
            resources: HashMap::new(),
        };

        for content in RESOURCE_FILES {
            let partial: ResourceConfig = serde_json::from_str(content)
                .unwrap_or_else(|e| panic!("Failed to parse embedded resource JSON: {}", e));
            final_config.schemas.extend(partial.schemas);
            final_config.resources.extend(partial.resources);
        }

        final_config
    })
}

/// Get a resource definition by kind (e.g. `nsxt_lb_tcp_monitor`)
pub fn get_resource(kind: &str) -> Option<&'static ResourceDef> {
    get_registry().resources.get(kind)
}

/// Get the attribute schema of a resource kind
pub fn get_schema(kind: &str) -> Option<&'static ResourceSchema> {
    let resource = get_resource(kind)?;
    get_registry().schemas.get(&resource.schema)
}

/// Get all resource kinds, sorted
pub fn get_all_resource_kinds() -> Vec<&'static str> {
    let mut kinds: Vec<&'static str> = get_registry()
        .resources
        .keys()
        .map(|s| s.as_str())
        .collect();
    kinds.sort_unstable();
    kinds
}
