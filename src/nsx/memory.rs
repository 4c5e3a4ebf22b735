//! In-memory NSX backend
//!
//! Mimics the monitor endpoints of NSX Manager closely enough for the
//! acceptance harness: server-side defaults, generated ids, `_revision`
//! checks on update, and NSX-shaped error documents.

use super::model::{
    LbMonitor, MonitorType, SERVER_DEFAULT_FALL_COUNT, SERVER_DEFAULT_INTERVAL,
    SERVER_DEFAULT_RISE_COUNT, SERVER_DEFAULT_TIMEOUT,
};
use super::{ApiResponse, LoadBalancerApi};
use crate::error::ProviderError;
use reqwest::StatusCode;
use serde_json::json;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Shared in-process monitor store
#[derive(Clone, Default)]
pub struct InMemoryNsx {
    monitors: Arc<RwLock<HashMap<String, LbMonitor>>>,
    offline: Arc<AtomicBool>,
}

fn error_body(status: StatusCode, error_code: i64, message: &str) -> String {
    json!({
        "httpStatus": status.canonical_reason().unwrap_or("ERROR").to_uppercase().replace(' ', "_"),
        "error_code": error_code,
        "module_name": "LOAD-BALANCER",
        "error_message": message,
    })
    .to_string()
}

fn not_found<T>(id: &str) -> ApiResponse<T> {
    ApiResponse::failure(
        StatusCode::NOT_FOUND,
        error_body(
            StatusCode::NOT_FOUND,
            600,
            &format!("The requested object : {} could not be found. Object identifiers are case sensitive.", id),
        ),
    )
}

fn bad_request<T>(message: &str) -> ApiResponse<T> {
    ApiResponse::failure(
        StatusCode::BAD_REQUEST,
        error_body(StatusCode::BAD_REQUEST, 255, message),
    )
}

/// Reject what NSX would reject, then fill in server defaults
fn normalize(mut monitor: LbMonitor, id: &str) -> Result<LbMonitor, String> {
    if monitor.resource_type == MonitorType::Other {
        return Err("resource_type must be LbTcpMonitor or LbUdpMonitor".to_string());
    }

    for (name, value) in [
        ("fall_count", monitor.fall_count),
        ("rise_count", monitor.rise_count),
        ("interval", monitor.interval),
        ("timeout", monitor.timeout),
    ] {
        if value == Some(0) {
            return Err(format!("Field level validation errors: {{{} must be at least 1}}", name));
        }
    }

    if monitor.monitor_port == Some(0) {
        return Err("Field level validation errors: {monitor_port is not a valid port}".to_string());
    }

    monitor.id = Some(id.to_string());
    monitor.fall_count.get_or_insert(SERVER_DEFAULT_FALL_COUNT);
    monitor.rise_count.get_or_insert(SERVER_DEFAULT_RISE_COUNT);
    monitor.interval.get_or_insert(SERVER_DEFAULT_INTERVAL);
    monitor.timeout.get_or_insert(SERVER_DEFAULT_TIMEOUT);
    if monitor.display_name.as_deref().map_or(true, str::is_empty) {
        monitor.display_name = Some(id.to_string());
    }
    Ok(monitor)
}

impl InMemoryNsx {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every call fail as if the manager were unreachable
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    fn check_reachable(&self) -> Result<(), ProviderError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(ProviderError::network("connection refused"));
        }
        Ok(())
    }

    /// Create a monitor without going through the API (simulates out-of-band changes)
    pub async fn insert(&self, monitor: LbMonitor) -> Result<String, String> {
        let id = monitor
            .id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let mut stored = normalize(monitor, &id)?;
        stored.revision = Some(0);
        self.monitors.write().await.insert(id.clone(), stored);
        Ok(id)
    }

    /// Remove a monitor without going through the API
    pub async fn remove(&self, id: &str) -> Option<LbMonitor> {
        self.monitors.write().await.remove(id)
    }

    /// Snapshot of a stored monitor
    pub async fn get(&self, id: &str) -> Option<LbMonitor> {
        self.monitors.read().await.get(id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.monitors.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.monitors.read().await.is_empty()
    }
}

impl LoadBalancerApi for InMemoryNsx {
    async fn create_monitor(&self, monitor: &LbMonitor) -> Result<ApiResponse<LbMonitor>, ProviderError> {
        self.check_reachable()?;

        if monitor.id.is_some() {
            return Ok(bad_request("id must not be set on create"));
        }

        let id = Uuid::new_v4().to_string();
        let mut stored = match normalize(monitor.clone(), &id) {
            Ok(stored) => stored,
            Err(message) => return Ok(bad_request(&message)),
        };
        stored.revision = Some(0);

        self.monitors.write().await.insert(id, stored.clone());
        Ok(ApiResponse::success(StatusCode::CREATED, stored))
    }

    async fn read_monitor(&self, id: &str) -> Result<ApiResponse<LbMonitor>, ProviderError> {
        self.check_reachable()?;

        match self.monitors.read().await.get(id) {
            Some(monitor) => Ok(ApiResponse::success(StatusCode::OK, monitor.clone())),
            None => Ok(not_found(id)),
        }
    }

    async fn update_monitor(
        &self,
        id: &str,
        monitor: &LbMonitor,
    ) -> Result<ApiResponse<LbMonitor>, ProviderError> {
        self.check_reachable()?;

        let mut monitors = self.monitors.write().await;
        let Some(current) = monitors.get(id) else {
            return Ok(not_found(id));
        };

        if monitor.resource_type != current.resource_type {
            return Ok(bad_request("resource_type cannot be changed"));
        }

        if monitor.revision != current.revision {
            return Ok(ApiResponse::failure(
                StatusCode::PRECONDITION_FAILED,
                error_body(
                    StatusCode::PRECONDITION_FAILED,
                    602,
                    "The object was modified by somebody else. Please retry.",
                ),
            ));
        }

        let next_revision = current.revision.unwrap_or(0) + 1;
        let mut stored = match normalize(monitor.clone(), id) {
            Ok(stored) => stored,
            Err(message) => return Ok(bad_request(&message)),
        };
        stored.revision = Some(next_revision);

        monitors.insert(id.to_string(), stored.clone());
        Ok(ApiResponse::success(StatusCode::OK, stored))
    }

    async fn delete_monitor(&self, id: &str) -> Result<ApiResponse<()>, ProviderError> {
        self.check_reachable()?;

        match self.monitors.write().await.remove(id) {
            Some(_) => Ok(ApiResponse::success(StatusCode::OK, ())),
            None => Ok(not_found(id)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_bare_create_applies_server_defaults() {
        let nsx = InMemoryNsx::new();
        let response = nsx
            .create_monitor(&LbMonitor::new(MonitorType::LbTcpMonitor))
            .await
            .unwrap();

        assert_eq!(response.status, StatusCode::CREATED);
        let monitor = response.value.unwrap();
        let id = monitor.id.clone().unwrap();
        assert_eq!(monitor.display_name.as_deref(), Some(id.as_str()));
        assert_eq!(monitor.fall_count, Some(SERVER_DEFAULT_FALL_COUNT));
        assert_eq!(monitor.timeout, Some(SERVER_DEFAULT_TIMEOUT));
        assert_eq!(monitor.monitor_port, None);
        assert_eq!(monitor.revision, Some(0));
    }

    #[tokio::test]
    async fn test_update_with_stale_revision_is_rejected() {
        let nsx = InMemoryNsx::new();
        let created = nsx
            .create_monitor(&LbMonitor::new(MonitorType::LbUdpMonitor))
            .await
            .unwrap()
            .value
            .unwrap();
        let id = created.id.clone().unwrap();

        let mut update = created.clone();
        update.revision = Some(7);
        let response = nsx.update_monitor(&id, &update).await.unwrap();
        assert_eq!(response.status, StatusCode::PRECONDITION_FAILED);

        update.revision = Some(0);
        let response = nsx.update_monitor(&id, &update).await.unwrap();
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.value.unwrap().revision, Some(1));
    }

    #[tokio::test]
    async fn test_offline_backend_reports_network_error() {
        let nsx = InMemoryNsx::new();
        nsx.set_offline(true);
        let err = nsx.read_monitor("anything").await.unwrap_err();
        assert!(matches!(err, ProviderError::Network { .. }));
    }

    #[tokio::test]
    async fn test_zero_counts_are_rejected() {
        let nsx = InMemoryNsx::new();
        let mut monitor = LbMonitor::new(MonitorType::LbTcpMonitor);
        monitor.rise_count = Some(0);
        let response = nsx.create_monitor(&monitor).await.unwrap();
        assert_eq!(response.status, StatusCode::BAD_REQUEST);
        assert!(nsx.is_empty().await);
    }
}
