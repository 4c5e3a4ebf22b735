//! Local state
//!
//! The state file caches the last observed attributes of every managed
//! object, keyed by resource address. Only the host writes it.

use super::lb_l4_monitor::{L4MonitorState, Protocol};
use super::registry::get_resource;
use crate::error::ProviderError;
use crate::nsx::model::Tag;
use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use uuid::Uuid;

const STATE_VERSION: u32 = 1;

/// `<kind>.<name>`, e.g. `nsxt_lb_tcp_monitor.test`
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ResourceAddress {
    pub kind: String,
    pub name: String,
}

impl ResourceAddress {
    pub fn new(kind: &str, name: &str) -> Self {
        Self {
            kind: kind.to_string(),
            name: name.to_string(),
        }
    }
}

impl fmt::Display for ResourceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.kind, self.name)
    }
}

impl FromStr for ResourceAddress {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let Some((kind, name)) = s.split_once('.') else {
            bail!("Invalid resource address {:?}, expected <type>.<name>", s);
        };
        if kind.is_empty() || name.is_empty() || name.contains('.') {
            bail!("Invalid resource address {:?}, expected <type>.<name>", s);
        }
        if get_resource(kind).is_none() {
            bail!("Unknown resource type {:?}", kind);
        }
        Ok(Self::new(kind, name))
    }
}

/// Flat attribute value: a scalar or a list of nested blocks
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Scalar(String),
    Blocks(Vec<BTreeMap<String, String>>),
}

/// Cached mirror of one remote object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateEntry {
    #[serde(rename = "type")]
    pub kind: String,
    pub id: String,
    pub attributes: BTreeMap<String, AttributeValue>,
    pub refreshed_at: DateTime<Utc>,
}

fn scalar(value: impl ToString) -> AttributeValue {
    AttributeValue::Scalar(value.to_string())
}

impl StateEntry {
    pub fn from_monitor(state: &L4MonitorState) -> Self {
        let mut attributes = BTreeMap::new();
        attributes.insert("id".to_string(), scalar(&state.id));
        attributes.insert("display_name".to_string(), scalar(&state.display_name));
        attributes.insert("revision".to_string(), scalar(state.revision));
        attributes.insert("fall_count".to_string(), scalar(state.fall_count));
        attributes.insert("rise_count".to_string(), scalar(state.rise_count));
        attributes.insert("interval".to_string(), scalar(state.interval));
        attributes.insert("timeout".to_string(), scalar(state.timeout));

        let optional = [
            ("description", state.description.clone()),
            ("monitor_port", state.monitor_port.map(|p| p.to_string())),
            ("send", state.send.clone()),
            ("receive", state.receive.clone()),
        ];
        for (key, value) in optional {
            if let Some(value) = value {
                attributes.insert(key.to_string(), AttributeValue::Scalar(value));
            }
        }

        let tags = state
            .tags
            .iter()
            .map(|t| {
                BTreeMap::from([
                    ("scope".to_string(), t.scope.clone()),
                    ("tag".to_string(), t.tag.clone()),
                ])
            })
            .collect();
        attributes.insert("tag".to_string(), AttributeValue::Blocks(tags));

        Self {
            kind: state.protocol.resource_kind().to_string(),
            id: state.id.clone(),
            attributes,
            refreshed_at: Utc::now(),
        }
    }

    /// Flattened attribute lookup; `<block>.#` yields the block count
    pub fn attribute(&self, key: &str) -> Option<String> {
        if let Some(block) = key.strip_suffix(".#") {
            return match self.attributes.get(block) {
                Some(AttributeValue::Blocks(blocks)) => Some(blocks.len().to_string()),
                Some(AttributeValue::Scalar(_)) => None,
                None => Some("0".to_string()),
            };
        }

        match self.attributes.get(key) {
            Some(AttributeValue::Scalar(value)) => Some(value.clone()),
            _ => None,
        }
    }

    pub fn protocol(&self) -> Result<Protocol, ProviderError> {
        get_resource(&self.kind)
            .map(|r| r.protocol)
            .ok_or_else(|| ProviderError::validation("type", format!("unknown resource type {}", self.kind)))
    }

    /// Rebuild the typed monitor state from the flat attributes
    pub fn to_monitor_state(&self) -> Result<L4MonitorState, ProviderError> {
        let text = |key: &str| self.attribute(key);
        let number = |key: &str| -> Result<u32, ProviderError> {
            text(key)
                .ok_or_else(|| ProviderError::validation(key, "missing from state"))?
                .parse()
                .map_err(|_| ProviderError::validation(key, "corrupt value in state"))
        };

        let monitor_port = text("monitor_port")
            .map(|p| p.parse::<u16>())
            .transpose()
            .map_err(|_| ProviderError::validation("monitor_port", "corrupt value in state"))?;
        let revision = text("revision")
            .unwrap_or_default()
            .parse::<i64>()
            .map_err(|_| ProviderError::validation("revision", "corrupt value in state"))?;

        let tags = match self.attributes.get("tag") {
            Some(AttributeValue::Blocks(blocks)) => blocks
                .iter()
                .map(|b| Tag {
                    scope: b.get("scope").cloned().unwrap_or_default(),
                    tag: b.get("tag").cloned().unwrap_or_default(),
                })
                .collect(),
            _ => Vec::new(),
        };

        Ok(L4MonitorState {
            id: self.id.clone(),
            protocol: self.protocol()?,
            revision,
            display_name: text("display_name").unwrap_or_else(|| self.id.clone()),
            description: text("description"),
            fall_count: number("fall_count")?,
            rise_count: number("rise_count")?,
            interval: number("interval")?,
            timeout: number("timeout")?,
            monitor_port,
            send: text("send"),
            receive: text("receive"),
            tags,
        })
    }
}

/// Persisted state document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateFile {
    pub version: u32,
    pub lineage: Uuid,
    pub serial: u64,
    #[serde(default)]
    pub resources: BTreeMap<String, StateEntry>,
}

impl Default for StateFile {
    fn default() -> Self {
        Self::new()
    }
}

impl StateFile {
    pub fn new() -> Self {
        Self {
            version: STATE_VERSION,
            lineage: Uuid::new_v4(),
            serial: 0,
            resources: BTreeMap::new(),
        }
    }

    /// Load state from disk; a missing file is an empty state
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::new());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read state file {}", path.display()))?;
        let state: Self = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse state file {}", path.display()))?;

        if state.version != STATE_VERSION {
            bail!(
                "Unsupported state version {} in {} (expected {})",
                state.version,
                path.display(),
                STATE_VERSION
            );
        }
        Ok(state)
    }

    /// Write state to disk, bumping the serial
    pub fn save(&mut self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        self.serial += 1;
        let content = serde_json::to_string_pretty(self)?;

        let tmp = path.with_extension("tmp");
        std::fs::write(&tmp, content)
            .with_context(|| format!("Failed to write state file {}", tmp.display()))?;
        std::fs::rename(&tmp, path)
            .with_context(|| format!("Failed to replace state file {}", path.display()))?;

        tracing::debug!("State serial {} written to {:?}", self.serial, path);
        Ok(())
    }

    pub fn get(&self, address: &ResourceAddress) -> Option<&StateEntry> {
        self.resources.get(&address.to_string())
    }

    pub fn insert(&mut self, address: &ResourceAddress, entry: StateEntry) {
        self.resources.insert(address.to_string(), entry);
    }

    pub fn remove(&mut self, address: &ResourceAddress) -> Option<StateEntry> {
        self.resources.remove(&address.to_string())
    }

    /// Addresses in state, parsed
    pub fn addresses(&self) -> Vec<ResourceAddress> {
        self.resources
            .keys()
            .filter_map(|key| key.split_once('.'))
            .map(|(kind, name)| ResourceAddress::new(kind, name))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn monitor_state() -> L4MonitorState {
        L4MonitorState {
            id: "3f0c".to_string(),
            protocol: Protocol::Tcp,
            revision: 4,
            display_name: "web".to_string(),
            description: None,
            fall_count: 2,
            rise_count: 2,
            interval: 9,
            timeout: 12,
            monitor_port: Some(7887),
            send: Some("Client hello".to_string()),
            receive: None,
            tags: vec![Tag::new("scope1", "tag1")],
        }
    }

    #[test]
    fn test_entry_flattens_attributes() {
        let entry = StateEntry::from_monitor(&monitor_state());
        assert_eq!(entry.kind, "nsxt_lb_tcp_monitor");
        assert_eq!(entry.attribute("fall_count").as_deref(), Some("2"));
        assert_eq!(entry.attribute("monitor_port").as_deref(), Some("7887"));
        assert_eq!(entry.attribute("tag.#").as_deref(), Some("1"));
        assert_eq!(entry.attribute("receive"), None);
        assert_eq!(entry.to_monitor_state().unwrap(), monitor_state());
    }

    #[test]
    fn test_address_parsing() {
        let address: ResourceAddress = "nsxt_lb_udp_monitor.dns".parse().unwrap();
        assert_eq!(address, ResourceAddress::new("nsxt_lb_udp_monitor", "dns"));
        assert_eq!(address.to_string(), "nsxt_lb_udp_monitor.dns");

        assert!("nsxt_lb_udp_monitor".parse::<ResourceAddress>().is_err());
        assert!("nsxt_lb_http_monitor.web".parse::<ResourceAddress>().is_err());
    }

    #[test]
    fn test_save_and_load_bumps_serial() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");

        let mut state = StateFile::load(&path).unwrap();
        assert_eq!(state.serial, 0);

        let address = ResourceAddress::new("nsxt_lb_tcp_monitor", "web");
        state.insert(&address, StateEntry::from_monitor(&monitor_state()));
        state.save(&path).unwrap();

        let loaded = StateFile::load(&path).unwrap();
        assert_eq!(loaded.serial, 1);
        assert_eq!(loaded.lineage, state.lineage);
        assert_eq!(loaded.get(&address), state.get(&address));
        assert_eq!(loaded.addresses(), vec![address]);
    }
}
