//! LB L4 monitor lifecycle
//!
//! One controller serves both `nsxt_lb_tcp_monitor` and `nsxt_lb_udp_monitor`;
//! the [`Protocol`] picks the `resource_type` sent to NSX and the type
//! accepted back.

use super::schema::{canonical_tags, ValidatedConfig};
use crate::error::ProviderError;
use crate::nsx::model::{
    LbMonitor, MonitorType, Tag, SERVER_DEFAULT_FALL_COUNT, SERVER_DEFAULT_INTERVAL,
    SERVER_DEFAULT_RISE_COUNT, SERVER_DEFAULT_TIMEOUT,
};
use crate::nsx::LoadBalancerApi;
use serde::{Deserialize, Serialize};
use std::fmt;

/// L4 protocol the monitor checks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Tcp,
    Udp,
}

impl Protocol {
    pub fn monitor_type(self) -> MonitorType {
        match self {
            Self::Tcp => MonitorType::LbTcpMonitor,
            Self::Udp => MonitorType::LbUdpMonitor,
        }
    }

    /// Resource kind name used in documents and state
    pub fn resource_kind(self) -> &'static str {
        match self {
            Self::Tcp => "nsxt_lb_tcp_monitor",
            Self::Udp => "nsxt_lb_udp_monitor",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Tcp => "tcp",
            Self::Udp => "udp",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Desired state of a monitor, after validation and defaulting
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct L4MonitorConfig {
    /// `None` lets NSX name the object after its id
    pub display_name: Option<String>,
    pub description: Option<String>,
    pub fall_count: u32,
    pub rise_count: u32,
    pub interval: u32,
    pub timeout: u32,
    pub monitor_port: Option<u16>,
    pub send: Option<String>,
    pub receive: Option<String>,
    pub tags: Vec<Tag>,
}

impl L4MonitorConfig {
    /// Empty strings count as unset; NSX does not keep them apart from absent fields
    pub fn from_validated(config: &ValidatedConfig) -> Result<Self, ProviderError> {
        let text = |name: &str| config.string(name).filter(|s| !s.is_empty());
        let int = |name: &str| {
            config
                .int(name)
                .ok_or_else(|| ProviderError::validation(name, "missing value"))
        };

        Ok(Self {
            display_name: text("display_name"),
            description: text("description"),
            fall_count: int("fall_count")?,
            rise_count: int("rise_count")?,
            interval: int("interval")?,
            timeout: int("timeout")?,
            monitor_port: config.port("monitor_port"),
            send: text("send"),
            receive: text("receive"),
            tags: config.tags("tag"),
        })
    }

    /// Full request body; every update sends all of it
    pub fn to_payload(&self, protocol: Protocol) -> LbMonitor {
        LbMonitor {
            display_name: self.display_name.clone(),
            description: self.description.clone(),
            fall_count: Some(self.fall_count),
            rise_count: Some(self.rise_count),
            interval: Some(self.interval),
            timeout: Some(self.timeout),
            monitor_port: self.monitor_port,
            send: self.send.clone(),
            receive: self.receive.clone(),
            tags: self.tags.clone(),
            ..LbMonitor::new(protocol.monitor_type())
        }
    }
}

/// Observed state of a monitor as returned by NSX
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct L4MonitorState {
    pub id: String,
    pub protocol: Protocol,
    pub revision: i64,
    pub display_name: String,
    pub description: Option<String>,
    pub fall_count: u32,
    pub rise_count: u32,
    pub interval: u32,
    pub timeout: u32,
    pub monitor_port: Option<u16>,
    pub send: Option<String>,
    pub receive: Option<String>,
    pub tags: Vec<Tag>,
}

impl L4MonitorState {
    /// Convert a server object, rejecting monitors of another protocol
    pub fn from_monitor(protocol: Protocol, monitor: LbMonitor) -> Result<Self, ProviderError> {
        let Some(id) = monitor.id.filter(|id| !id.is_empty()) else {
            return Err(ProviderError::RemoteRejected {
                status: 200,
                body: "response has no object id".to_string(),
            });
        };

        if monitor.resource_type != protocol.monitor_type() {
            return Err(ProviderError::validation(
                "id",
                format!(
                    "object {} is a {:?}, not an LB {} monitor",
                    id, monitor.resource_type, protocol
                ),
            ));
        }

        Ok(Self {
            display_name: monitor.display_name.unwrap_or_else(|| id.clone()),
            id,
            protocol,
            revision: monitor.revision.unwrap_or(0),
            description: monitor.description.filter(|d| !d.is_empty()),
            fall_count: monitor.fall_count.unwrap_or(SERVER_DEFAULT_FALL_COUNT),
            rise_count: monitor.rise_count.unwrap_or(SERVER_DEFAULT_RISE_COUNT),
            interval: monitor.interval.unwrap_or(SERVER_DEFAULT_INTERVAL),
            timeout: monitor.timeout.unwrap_or(SERVER_DEFAULT_TIMEOUT),
            monitor_port: monitor.monitor_port,
            send: monitor.send.filter(|s| !s.is_empty()),
            receive: monitor.receive.filter(|s| !s.is_empty()),
            tags: canonical_tags(monitor.tags),
        })
    }

    /// Whether applying `desired` would change anything
    pub fn matches(&self, desired: &L4MonitorConfig) -> bool {
        let name_matches = desired
            .display_name
            .as_ref()
            .map_or(true, |name| *name == self.display_name);

        name_matches
            && self.description == desired.description
            && self.fall_count == desired.fall_count
            && self.rise_count == desired.rise_count
            && self.interval == desired.interval
            && self.timeout == desired.timeout
            && self.monitor_port == desired.monitor_port
            && self.send == desired.send
            && self.receive == desired.receive
            && self.tags == desired.tags
    }
}

/// Create/Read/Update/Delete/Exists for one L4 monitor protocol
///
/// The API handle is injected; the controller keeps no other state.
#[derive(Clone)]
pub struct LbL4MonitorController<A> {
    api: A,
    protocol: Protocol,
}

impl<A: LoadBalancerApi> LbL4MonitorController<A> {
    pub fn new(api: A, protocol: Protocol) -> Self {
        Self { api, protocol }
    }

    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    pub async fn create(&self, config: &L4MonitorConfig) -> Result<L4MonitorState, ProviderError> {
        tracing::info!(
            "Creating LB {} monitor {}",
            self.protocol,
            config.display_name.as_deref().unwrap_or("<unnamed>")
        );

        let payload = config.to_payload(self.protocol);
        let monitor = self.api.create_monitor(&payload).await?.into_value()?;
        let created_id = monitor.id.clone();
        let state = L4MonitorState::from_monitor(self.protocol, monitor).map_err(|e| {
            tracing::error!(
                "LB {} monitor {} was created but cannot be tracked: {}",
                self.protocol,
                created_id.as_deref().unwrap_or("<no id>"),
                e
            );
            e
        })?;

        tracing::info!("Created LB {} monitor {}", self.protocol, state.id);
        Ok(state)
    }

    /// Fetch the monitor; `NotFound` means it was deleted out of band
    pub async fn read(&self, id: &str) -> Result<L4MonitorState, ProviderError> {
        tracing::debug!("Reading LB {} monitor {}", self.protocol, id);

        let monitor = self.api.read_monitor(id).await?.into_result(id)?;
        L4MonitorState::from_monitor(self.protocol, monitor)
    }

    /// Replace the whole attribute set; `revision` must be the last one observed
    pub async fn update(
        &self,
        id: &str,
        revision: i64,
        config: &L4MonitorConfig,
    ) -> Result<L4MonitorState, ProviderError> {
        tracing::info!("Updating LB {} monitor {} (revision {})", self.protocol, id, revision);

        let mut payload = config.to_payload(self.protocol);
        payload.id = Some(id.to_string());
        payload.revision = Some(revision);

        let monitor = self.api.update_monitor(id, &payload).await?.into_result(id)?;
        L4MonitorState::from_monitor(self.protocol, monitor)
    }

    /// Delete the monitor; an already missing monitor counts as deleted
    pub async fn delete(&self, id: &str) -> Result<(), ProviderError> {
        tracing::info!("Deleting LB {} monitor {}", self.protocol, id);

        match self.api.delete_monitor(id).await?.into_result(id) {
            Ok(()) => Ok(()),
            Err(e) if e.is_not_found() => {
                tracing::info!("LB {} monitor {} was already deleted", self.protocol, id);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    pub async fn exists(&self, id: &str) -> Result<bool, ProviderError> {
        match self.read(id).await {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Build state for an existing monitor that has no local record
    pub async fn import(&self, id: &str) -> Result<L4MonitorState, ProviderError> {
        tracing::info!("Importing LB {} monitor {}", self.protocol, id);
        self.read(id).await
    }
}
