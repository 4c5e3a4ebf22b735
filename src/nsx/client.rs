//! NSX Client
//!
//! REST implementation of the load balancer API on top of [`NsxHttpClient`].

use super::http::{NsxHttpClient, RawResponse};
use super::model::LbMonitor;
use super::{ApiResponse, LoadBalancerApi};
use crate::config::ProviderConfig;
use crate::error::ProviderError;
use anyhow::Result;
use reqwest::Method;
use serde::de::DeserializeOwned;

/// Collection path of all load balancer monitors
const MONITORS_PATH: &str = "api/v1/loadbalancer/monitors";

/// Main NSX Manager client
#[derive(Clone)]
pub struct NsxClient {
    pub http: NsxHttpClient,
}

impl NsxClient {
    /// Create a new client for the configured manager
    pub fn new(config: &ProviderConfig) -> Result<Self> {
        let http = NsxHttpClient::new(config)?;
        Ok(Self { http })
    }

    /// Path of a single monitor
    pub fn monitor_path(id: &str) -> String {
        format!("{}/{}", MONITORS_PATH, urlencoding::encode(id))
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<&LbMonitor>,
    ) -> Result<ApiResponse<T>, ProviderError> {
        let payload = body
            .map(serde_json::to_value)
            .transpose()
            .map_err(|e| ProviderError::validation("payload", format!("cannot encode request: {}", e)))?;

        let raw = self.http.send(method, path, payload.as_ref()).await?;
        decode(raw)
    }
}

fn decode<T: DeserializeOwned>(raw: RawResponse) -> Result<ApiResponse<T>, ProviderError> {
    if !raw.status.is_success() {
        return Ok(ApiResponse::failure(raw.status, raw.body));
    }

    match serde_json::from_str(&raw.body) {
        Ok(value) => Ok(ApiResponse::success(raw.status, value)),
        Err(e) => {
            tracing::error!("Failed to parse response JSON: {}", e);
            Ok(ApiResponse::failure(
                raw.status,
                format!("unparseable response body: {}", e),
            ))
        }
    }
}

impl LoadBalancerApi for NsxClient {
    async fn create_monitor(&self, monitor: &LbMonitor) -> Result<ApiResponse<LbMonitor>, ProviderError> {
        self.send_json(Method::POST, MONITORS_PATH, Some(monitor)).await
    }

    async fn read_monitor(&self, id: &str) -> Result<ApiResponse<LbMonitor>, ProviderError> {
        self.send_json(Method::GET, &Self::monitor_path(id), None).await
    }

    async fn update_monitor(
        &self,
        id: &str,
        monitor: &LbMonitor,
    ) -> Result<ApiResponse<LbMonitor>, ProviderError> {
        self.send_json(Method::PUT, &Self::monitor_path(id), Some(monitor))
            .await
    }

    async fn delete_monitor(&self, id: &str) -> Result<ApiResponse<()>, ProviderError> {
        let raw = self
            .http
            .send(Method::DELETE, &Self::monitor_path(id), None)
            .await?;

        if raw.status.is_success() {
            Ok(ApiResponse::success(raw.status, ()))
        } else {
            Ok(ApiResponse::failure(raw.status, raw.body))
        }
    }
}
