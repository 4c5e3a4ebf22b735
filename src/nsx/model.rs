//! NSX Manager wire types
//!
//! Only the load balancer monitor objects the provider manages are modelled.

use serde::{Deserialize, Serialize};

/// Values NSX Manager fills in when a monitor is created without them
pub const SERVER_DEFAULT_FALL_COUNT: u32 = 3;
pub const SERVER_DEFAULT_RISE_COUNT: u32 = 3;
pub const SERVER_DEFAULT_INTERVAL: u32 = 5;
pub const SERVER_DEFAULT_TIMEOUT: u32 = 15;

/// `resource_type` discriminator of an LB monitor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MonitorType {
    LbTcpMonitor,
    LbUdpMonitor,
    /// HTTP, HTTPS, ICMP and passive monitors share the collection
    #[serde(other)]
    Other,
}

/// Key/value tag attached to an NSX object
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Tag {
    #[serde(default)]
    pub scope: String,
    #[serde(default)]
    pub tag: String,
}

impl Tag {
    pub fn new(scope: &str, tag: &str) -> Self {
        Self {
            scope: scope.to_string(),
            tag: tag.to_string(),
        }
    }
}

/// Active L4 load balancer monitor (`LbTcpMonitor` / `LbUdpMonitor`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LbMonitor {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub resource_type: MonitorType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fall_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rise_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u32>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "port_string"
    )]
    pub monitor_port: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub send: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receive: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<Tag>,
    #[serde(
        rename = "_revision",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub revision: Option<i64>,
}

impl LbMonitor {
    /// Empty monitor of the given type
    pub fn new(resource_type: MonitorType) -> Self {
        Self {
            id: None,
            resource_type,
            display_name: None,
            description: None,
            fall_count: None,
            rise_count: None,
            interval: None,
            timeout: None,
            monitor_port: None,
            send: None,
            receive: None,
            tags: Vec::new(),
            revision: None,
        }
    }
}

/// Error document returned by NSX Manager on non-2xx responses
#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorBody {
    #[serde(default)]
    pub error_code: Option<i64>,
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default, rename = "httpStatus")]
    pub http_status: Option<String>,
}

/// NSX carries ports as strings (`PortElement`); keep them numeric in memory.
mod port_string {
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(port: &Option<u16>, serializer: S) -> Result<S::Ok, S::Error> {
        match port {
            Some(p) => serializer.serialize_str(&p.to_string()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u16>, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Text(String),
            Number(u16),
        }

        match Option::<Raw>::deserialize(deserializer)? {
            None => Ok(None),
            Some(Raw::Number(n)) => Ok(Some(n)),
            Some(Raw::Text(s)) if s.is_empty() => Ok(None),
            Some(Raw::Text(s)) => s
                .parse()
                .map(Some)
                .map_err(|_| de::Error::custom(format!("invalid monitor_port {:?}", s))),
        }
    }
}
