//! Resource layer
//!
//! Everything between a raw configuration block and the NSX API facade.
//!
//! # Architecture
//!
//! - [`registry`] - Loads attribute schemas for every resource kind from embedded JSON
//! - [`schema`] - Validates raw configuration against a schema
//! - [`lb_l4_monitor`] - Lifecycle controller for TCP/UDP load balancer monitors
//! - [`state`] - Local state entries and the state file
//!
//! # Resource Definitions
//!
//! Resources are defined in JSON files under `src/resources/`:
//! - `lb_monitors.json` - `nsxt_lb_tcp_monitor`, `nsxt_lb_udp_monitor`

pub mod lb_l4_monitor;
mod registry;
pub mod schema;
pub mod state;

pub use lb_l4_monitor::{L4MonitorConfig, L4MonitorState, LbL4MonitorController, Protocol};
pub use registry::*;
pub use schema::{validate, RawConfig, ValidatedConfig};
pub use state::{AttributeValue, ResourceAddress, StateEntry, StateFile};
