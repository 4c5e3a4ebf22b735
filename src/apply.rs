//! Declarative documents and the apply engine
//!
//! A small stand-in for the host process: it reads a document of resource
//! blocks, refreshes the local state, decides per address whether to create,
//! update, delete or leave the object alone, and runs those operations.
//! Independent addresses are processed concurrently; the state file is only
//! touched after all of them have finished.

use crate::error::OperationError;
use crate::nsx::LoadBalancerApi;
use crate::provider::Provider;
use crate::resource::{get_resource, RawConfig, ResourceAddress, StateEntry, StateFile};
use anyhow::{bail, Context, Result};
use futures::future::join_all;
use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::path::Path;
use thiserror::Error;

/// One `resource "<type>" "<name>" { ... }` block
#[derive(Debug, Clone, Deserialize)]
pub struct ResourceBlock {
    #[serde(rename = "type")]
    pub kind: String,
    pub name: String,
    #[serde(default)]
    pub config: RawConfig,
}

impl ResourceBlock {
    pub fn address(&self) -> ResourceAddress {
        ResourceAddress::new(&self.kind, &self.name)
    }
}

/// Declarative document: the complete desired set of resources
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Document {
    #[serde(default)]
    pub resources: Vec<ResourceBlock>,
}

impl Document {
    /// Parse a YAML document and check addresses
    pub fn parse(text: &str) -> Result<Self> {
        let document: Document = serde_yaml::from_str(text).context("Failed to parse document")?;

        let mut seen = HashSet::new();
        for block in &document.resources {
            if get_resource(&block.kind).is_none() {
                bail!("Unknown resource type {:?} in block {:?}", block.kind, block.name);
            }
            if block.name.is_empty() || block.name.contains('.') {
                bail!("Invalid resource name {:?}", block.name);
            }
            if !seen.insert(block.address()) {
                bail!("Duplicate resource {}", block.address());
            }
        }

        Ok(document)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read document {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("Invalid document {}", path.display()))
    }
}

/// What will happen to one address
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Create,
    Update,
    Delete,
    NoOp,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = match self {
            Action::Create => "+ create",
            Action::Update => "~ update",
            Action::Delete => "- delete",
            Action::NoOp => "  no-op",
        };
        f.write_str(symbol)
    }
}

#[derive(Debug, Clone)]
pub struct PlannedChange {
    pub address: ResourceAddress,
    pub action: Action,
    config: RawConfig,
}

/// Ordered list of changes
#[derive(Debug, Clone, Default)]
pub struct Plan {
    pub changes: Vec<PlannedChange>,
}

impl Plan {
    pub fn is_empty(&self) -> bool {
        self.changes.iter().all(|c| c.action == Action::NoOp)
    }

    pub fn count(&self, action: Action) -> usize {
        self.changes.iter().filter(|c| c.action == action).count()
    }
}

/// Operations that failed during one command
#[derive(Debug, Error)]
#[error("{} operation(s) failed:\n{}", .0.len(), list_errors(.0))]
pub struct ApplyErrors(pub Vec<OperationError>);

fn list_errors(errors: &[OperationError]) -> String {
    errors
        .iter()
        .map(|e| format!("  {}", e))
        .collect::<Vec<_>>()
        .join("\n")
}

fn into_result(errors: Vec<OperationError>) -> Result<(), ApplyErrors> {
    if errors.is_empty() {
        Ok(())
    } else {
        Err(ApplyErrors(errors))
    }
}

/// Refresh every state entry from NSX, pruning objects deleted out of band
pub async fn refresh<A: LoadBalancerApi + Clone>(
    provider: &Provider<A>,
    state: &mut StateFile,
) -> Result<(), ApplyErrors> {
    let entries: Vec<(ResourceAddress, StateEntry)> = state
        .addresses()
        .into_iter()
        .filter_map(|address| state.get(&address).cloned().map(|entry| (address, entry)))
        .collect();

    let results = join_all(
        entries
            .iter()
            .map(|(address, entry)| async move { (address, provider.read(address, entry).await) }),
    )
    .await;

    let mut errors = Vec::new();
    for (address, result) in results {
        match result {
            Ok(Some(entry)) => state.insert(address, entry),
            Ok(None) => {
                state.remove(address);
            }
            Err(e) => errors.push(e),
        }
    }

    into_result(errors)
}

/// Validate the document, refresh state, and work out what has to change
pub async fn plan<A: LoadBalancerApi + Clone>(
    provider: &Provider<A>,
    document: &Document,
    state: &mut StateFile,
) -> Result<Plan, ApplyErrors> {
    let validation: Vec<OperationError> = document
        .resources
        .iter()
        .filter_map(|block| provider.validate(&block.address(), &block.config).err())
        .collect();
    into_result(validation)?;

    refresh(provider, state).await?;

    let mut changes = Vec::new();
    let mut errors = Vec::new();
    let mut desired = HashSet::new();

    for block in &document.resources {
        let address = block.address();
        desired.insert(address.clone());

        let action = match state.get(&address) {
            None => Action::Create,
            Some(entry) => match provider.needs_update(&address, entry, &block.config) {
                Ok(true) => Action::Update,
                Ok(false) => Action::NoOp,
                Err(e) => {
                    errors.push(e);
                    continue;
                }
            },
        };
        changes.push(PlannedChange {
            address,
            action,
            config: block.config.clone(),
        });
    }

    for address in state.addresses() {
        if !desired.contains(&address) {
            changes.push(PlannedChange {
                address,
                action: Action::Delete,
                config: RawConfig::new(),
            });
        }
    }

    into_result(errors)?;
    Ok(Plan { changes })
}

enum Outcome {
    Stored(StateEntry),
    Removed,
    Unchanged,
}

/// Execute a plan; successful changes are recorded in `state` even when others fail
pub async fn apply<A: LoadBalancerApi + Clone>(
    provider: &Provider<A>,
    plan: &Plan,
    state: &mut StateFile,
) -> Result<(), ApplyErrors> {
    let work: Vec<(&PlannedChange, Option<StateEntry>)> = plan
        .changes
        .iter()
        .map(|change| (change, state.get(&change.address).cloned()))
        .collect();

    let results = join_all(work.iter().map(|(change, entry)| async move {
        let address = &change.address;
        let outcome = match (change.action, entry) {
            (Action::Create, _) => provider
                .create(address, &change.config)
                .await
                .map(Outcome::Stored),
            (Action::Update, Some(entry)) => provider
                .update(address, entry, &change.config)
                .await
                .map(Outcome::Stored),
            (Action::Delete, Some(entry)) => provider
                .delete(address, entry)
                .await
                .map(|()| Outcome::Removed),
            (Action::Update | Action::Delete, None) | (Action::NoOp, _) => Ok(Outcome::Unchanged),
        };
        (address, outcome)
    }))
    .await;

    let mut errors = Vec::new();
    for (address, outcome) in results {
        match outcome {
            Ok(Outcome::Stored(entry)) => state.insert(address, entry),
            Ok(Outcome::Removed) => {
                state.remove(address);
            }
            Ok(Outcome::Unchanged) => {}
            Err(e) => errors.push(e),
        }
    }

    into_result(errors)
}

/// Delete every object in state
pub async fn destroy<A: LoadBalancerApi + Clone>(
    provider: &Provider<A>,
    state: &mut StateFile,
) -> Result<(), ApplyErrors> {
    let plan = Plan {
        changes: state
            .addresses()
            .into_iter()
            .map(|address| PlannedChange {
                address,
                action: Action::Delete,
                config: RawConfig::new(),
            })
            .collect(),
    };
    apply(provider, &plan, state).await
}

/// Adopt an existing object into state under `address`
pub async fn import<A: LoadBalancerApi + Clone>(
    provider: &Provider<A>,
    state: &mut StateFile,
    address: &ResourceAddress,
    id: &str,
) -> Result<()> {
    if let Some(existing) = state.get(address) {
        bail!("{} is already managed (id {})", address, existing.id);
    }

    let entry = provider.import(address, id).await?;
    state.insert(address, entry);
    Ok(())
}

/// Attributes of every entry, keyed by address, for display
pub fn describe(state: &StateFile) -> BTreeMap<String, BTreeMap<String, String>> {
    state
        .resources
        .iter()
        .map(|(address, entry)| {
            let mut flat = BTreeMap::new();
            for key in entry.attributes.keys() {
                if let Some(value) = entry.attribute(key) {
                    flat.insert(key.clone(), value);
                } else if let Some(count) = entry.attribute(&format!("{}.#", key)) {
                    flat.insert(format!("{}.#", key), count);
                }
            }
            (address.clone(), flat)
        })
        .collect()
}
