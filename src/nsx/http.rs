//! HTTP utilities for NSX Manager REST calls

use crate::config::ProviderConfig;
use super::model::ApiErrorBody;
use crate::error::ProviderError;
use anyhow::{Context, Result};
use reqwest::{Client, Method, StatusCode};
use serde_json::Value;
use std::time::Duration;
use url::Url;

/// Maximum length of response body to log (to avoid logging sensitive data)
const MAX_LOG_BODY_LENGTH: usize = 200;

/// Sanitize response body for logging
/// Truncates long responses and drops control characters
pub(crate) fn sanitize_for_log(body: &str) -> String {
    let truncated = if body.len() > MAX_LOG_BODY_LENGTH {
        let mut end = MAX_LOG_BODY_LENGTH;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}... [truncated, {} bytes total]", &body[..end], body.len())
    } else {
        body.to_string()
    };

    truncated.replace(|c: char| !c.is_ascii_graphic() && c != ' ', "")
}

/// Status and body of a completed HTTP exchange
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: StatusCode,
    pub body: String,
}

/// HTTP client wrapper for NSX Manager API calls
#[derive(Clone)]
pub struct NsxHttpClient {
    client: Client,
    base_url: Url,
    username: String,
    password: String,
}

impl NsxHttpClient {
    /// Create a new HTTP client for the configured manager
    pub fn new(config: &ProviderConfig) -> Result<Self> {
        let base_url = config.base_url()?;

        let client = Client::builder()
            .user_agent(concat!("nsxt-provider/", env!("CARGO_PKG_VERSION")))
            .danger_accept_invalid_certs(config.allow_unverified_ssl)
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .context("Failed to create HTTP client")?;

        if config.allow_unverified_ssl {
            tracing::warn!("TLS certificate verification disabled for {}", base_url);
        }

        Ok(Self {
            client,
            base_url,
            username: config.username.clone(),
            password: config.password.clone(),
        })
    }

    /// Resolve an API path (e.g. `api/v1/loadbalancer/monitors`) against the manager
    pub fn url(&self, path: &str) -> Result<Url, ProviderError> {
        self.base_url
            .join(path)
            .map_err(|e| ProviderError::validation("host", format!("cannot build URL: {}", e)))
    }

    /// Send a request and collect the status and body
    ///
    /// Only transport failures are errors here; every HTTP status is returned to the caller.
    pub async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<RawResponse, ProviderError> {
        let url = self.url(path)?;
        tracing::debug!("{} {}", method, url);

        let mut request = self
            .client
            .request(method.clone(), url)
            .basic_auth(&self.username, Some(&self.password))
            .header(reqwest::header::ACCEPT, "application/json");

        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ProviderError::network(format!("failed to send request: {}", e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ProviderError::network(format!("failed to read response body: {}", e)))?;

        if !status.is_success() && status != StatusCode::NOT_FOUND {
            // Security: Only log sanitized/truncated error body to avoid leaking sensitive data
            tracing::error!("API error: {} {} - {}", method, status, sanitize_for_log(&body));
        }

        Ok(RawResponse { status, body })
    }
}

/// One-line, user-facing description of a provider error
///
/// NSX error documents are reduced to their `error_message`; statuses with a
/// usual fix get a hint instead of the raw body.
pub fn format_nsx_error(error: &ProviderError) -> String {
    let ProviderError::RemoteRejected { status, body } = error else {
        return error.to_string();
    };

    match status {
        401 => return "Authentication failed. Check NSXT_USERNAME and NSXT_PASSWORD.".to_string(),
        403 => return "Permission denied. The NSX user needs the LB admin role.".to_string(),
        412 => {
            return "The object was modified concurrently (stale _revision). Run refresh and retry."
                .to_string()
        }
        _ => {}
    }

    let message = serde_json::from_str::<ApiErrorBody>(body)
        .ok()
        .and_then(|b| match (b.error_code, b.error_message) {
            (Some(code), Some(message)) => Some(format!("{} (error code {})", message, code)),
            (None, Some(message)) => Some(message),
            _ => None,
        })
        .unwrap_or_else(|| sanitize_for_log(body));

    format!("NSX rejected the request (HTTP {}): {}", status, message)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_truncates_long_bodies() {
        let body = "x".repeat(500);
        let sanitized = sanitize_for_log(&body);
        assert!(sanitized.starts_with(&"x".repeat(MAX_LOG_BODY_LENGTH)));
        assert!(sanitized.ends_with("[truncated, 500 bytes total]"));
    }

    #[test]
    fn test_sanitize_strips_control_characters() {
        assert_eq!(sanitize_for_log("bad\r\nrequest\t"), "badrequest");
    }

    #[test]
    fn test_format_nsx_error_extracts_message() {
        let err = ProviderError::RemoteRejected {
            status: 400,
            body: r#"{"httpStatus":"BAD_REQUEST","error_code":255,"error_message":"Field level validation errors"}"#
                .to_string(),
        };
        assert_eq!(
            format_nsx_error(&err),
            "NSX rejected the request (HTTP 400): Field level validation errors (error code 255)"
        );

        let stale = ProviderError::RemoteRejected {
            status: 412,
            body: String::new(),
        };
        assert!(format_nsx_error(&stale).contains("stale _revision"));
        assert_eq!(format_nsx_error(&ProviderError::network("timed out")), "network error: timed out");
    }

    #[test]
    fn test_url_joins_api_path() {
        let config = ProviderConfig {
            host: "nsx.example.com".to_string(),
            username: "admin".to_string(),
            password: "secret".to_string(),
            ..ProviderConfig::default()
        };
        let client = NsxHttpClient::new(&config).unwrap();
        let url = client.url("api/v1/loadbalancer/monitors").unwrap();
        assert_eq!(
            url.as_str(),
            "https://nsx.example.com/api/v1/loadbalancer/monitors"
        );
    }
}
