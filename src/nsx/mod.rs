//! NSX Manager API interaction module
//!
//! # Module Structure
//!
//! - [`client`] - REST implementation of [`LoadBalancerApi`]
//! - [`http`] - HTTP utilities for REST API calls
//! - [`memory`] - In-process implementation used by the acceptance harness and tests
//! - [`model`] - Wire types
//!
//! # Example
//!
//! ```ignore
//! use nsxt_provider::nsx::{client::NsxClient, LoadBalancerApi};
//!
//! async fn example(config: &ProviderConfig) -> anyhow::Result<()> {
//!     let client = NsxClient::new(config)?;
//!     let response = client.read_monitor("4b7b1b0a").await?;
//!     println!("HTTP {}", response.status);
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod http;
pub mod memory;
pub mod model;

use crate::error::ProviderError;
use model::LbMonitor;
use reqwest::StatusCode;

/// Typed result of one API call: the status plus either the decoded value or the raw error body
#[derive(Debug, Clone)]
pub struct ApiResponse<T> {
    pub status: StatusCode,
    pub value: Option<T>,
    pub error_body: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(status: StatusCode, value: T) -> Self {
        Self {
            status,
            value: Some(value),
            error_body: None,
        }
    }

    pub fn failure(status: StatusCode, body: impl Into<String>) -> Self {
        Self {
            status,
            value: None,
            error_body: Some(body.into()),
        }
    }

    /// 2xx with a value is success, 404 is `NotFound`, anything else is `RemoteRejected`
    pub fn into_result(self, id: &str) -> Result<T, ProviderError> {
        if self.status == StatusCode::NOT_FOUND {
            return Err(ProviderError::not_found(id));
        }
        self.into_value()
    }

    /// Like [`into_result`](Self::into_result) but without a not-found case (collection calls)
    pub fn into_value(self) -> Result<T, ProviderError> {
        match (self.status.is_success(), self.value) {
            (true, Some(value)) => Ok(value),
            (true, None) => Err(ProviderError::RemoteRejected {
                status: self.status.as_u16(),
                body: self.error_body.unwrap_or_else(|| "empty response body".to_string()),
            }),
            (false, _) => Err(ProviderError::RemoteRejected {
                status: self.status.as_u16(),
                body: self.error_body.unwrap_or_default(),
            }),
        }
    }
}

/// Load balancer monitor endpoints of the NSX Manager API
///
/// Implementations report every HTTP status through [`ApiResponse`] and reserve
/// `Err` for transport failures.
#[allow(async_fn_in_trait)]
pub trait LoadBalancerApi {
    async fn create_monitor(&self, monitor: &LbMonitor) -> Result<ApiResponse<LbMonitor>, ProviderError>;

    async fn read_monitor(&self, id: &str) -> Result<ApiResponse<LbMonitor>, ProviderError>;

    async fn update_monitor(
        &self,
        id: &str,
        monitor: &LbMonitor,
    ) -> Result<ApiResponse<LbMonitor>, ProviderError>;

    async fn delete_monitor(&self, id: &str) -> Result<ApiResponse<()>, ProviderError>;
}
