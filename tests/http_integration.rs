//! Integration tests for the NSX REST client using wiremock
//!
//! These tests verify the wire format of monitor requests and how each
//! HTTP status surfaces through the lifecycle controller.

use nsxt_provider::nsx::client::NsxClient;
use nsxt_provider::nsx::model::Tag;
use nsxt_provider::resource::{L4MonitorConfig, LbL4MonitorController, Protocol};
use nsxt_provider::{ProviderConfig, ProviderError};
use serde_json::json;
use wiremock::matchers::{basic_auth, body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const MONITORS: &str = "/api/v1/loadbalancer/monitors";

fn client_for(server: &MockServer) -> NsxClient {
    let config = ProviderConfig {
        host: server.uri(),
        username: "admin".to_string(),
        password: "VMware1!".to_string(),
        ..ProviderConfig::default()
    };
    NsxClient::new(&config).unwrap()
}

fn monitor_config() -> L4MonitorConfig {
    L4MonitorConfig {
        display_name: Some("test-nsx-monitor".to_string()),
        description: Some("test description".to_string()),
        fall_count: 2,
        rise_count: 2,
        interval: 9,
        timeout: 12,
        monitor_port: Some(7887),
        send: Some("Client hello".to_string()),
        receive: Some("Server hello".to_string()),
        tags: vec![Tag::new("scope1", "tag1")],
    }
}

/// Monitor document as NSX returns it
fn server_monitor(id: &str, resource_type: &str, revision: i64) -> serde_json::Value {
    json!({
        "id": id,
        "resource_type": resource_type,
        "display_name": "test-nsx-monitor",
        "description": "test description",
        "fall_count": 2,
        "rise_count": 2,
        "interval": 9,
        "timeout": 12,
        "monitor_port": "7887",
        "send": "Client hello",
        "receive": "Server hello",
        "tags": [{"scope": "scope1", "tag": "tag1"}],
        "_create_user": "admin",
        "_revision": revision
    })
}

/// Test module for lifecycle calls over HTTP
mod lifecycle_tests {
    use super::*;

    /// Create posts the full payload with the port as a string
    #[tokio::test]
    async fn test_create_posts_typed_payload() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path(MONITORS))
            .and(basic_auth("admin", "VMware1!"))
            .and(body_partial_json(json!({
                "resource_type": "LbTcpMonitor",
                "monitor_port": "7887",
                "fall_count": 2,
                "tags": [{"scope": "scope1", "tag": "tag1"}]
            })))
            .respond_with(
                ResponseTemplate::new(201).set_body_json(server_monitor("m-1", "LbTcpMonitor", 0)),
            )
            .expect(1)
            .mount(&server)
            .await;

        let controller = LbL4MonitorController::new(client_for(&server), Protocol::Tcp);
        let state = controller.create(&monitor_config()).await.unwrap();

        assert_eq!(state.id, "m-1");
        assert_eq!(state.monitor_port, Some(7887));
        assert!(state.matches(&monitor_config()));
    }

    /// Read maps 404 to NotFound so the caller can prune state
    #[tokio::test]
    async fn test_read_not_found() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path(format!("{}/gone", MONITORS)))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({
                "httpStatus": "NOT_FOUND",
                "error_code": 600,
                "error_message": "The requested object : gone could not be found."
            })))
            .mount(&server)
            .await;

        let controller = LbL4MonitorController::new(client_for(&server), Protocol::Udp);
        let err = controller.read("gone").await.unwrap_err();
        assert!(err.is_not_found());
        assert!(!controller.exists("gone").await.unwrap());
    }

    /// Update sends the last observed revision and the complete attribute set
    #[tokio::test]
    async fn test_update_sends_revision() {
        let server = MockServer::start().await;

        Mock::given(method("PUT"))
            .and(path(format!("{}/m-1", MONITORS)))
            .and(body_partial_json(json!({
                "id": "m-1",
                "resource_type": "LbUdpMonitor",
                "_revision": 3,
                "send": "Client hello",
                "receive": "Server hello"
            })))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(server_monitor("m-1", "LbUdpMonitor", 4)),
            )
            .expect(1)
            .mount(&server)
            .await;

        let controller = LbL4MonitorController::new(client_for(&server), Protocol::Udp);
        let state = controller.update("m-1", 3, &monitor_config()).await.unwrap();
        assert_eq!(state.revision, 4);
    }

    /// A stale revision is rejected, not retried
    #[tokio::test]
    async fn test_update_stale_revision() {
        let server = MockServer::start().await;

        Mock::given(method("PUT"))
            .and(path(format!("{}/m-1", MONITORS)))
            .respond_with(ResponseTemplate::new(412).set_body_string("revision mismatch"))
            .expect(1)
            .mount(&server)
            .await;

        let controller = LbL4MonitorController::new(client_for(&server), Protocol::Tcp);
        let err = controller.update("m-1", 1, &monitor_config()).await.unwrap_err();
        assert!(matches!(err, ProviderError::RemoteRejected { status: 412, .. }));
    }

    /// Deleting an already missing monitor succeeds
    #[tokio::test]
    async fn test_delete_tolerates_404() {
        let server = MockServer::start().await;

        Mock::given(method("DELETE"))
            .and(path(format!("{}/m-1", MONITORS)))
            .respond_with(ResponseTemplate::new(404))
            .expect(2)
            .mount(&server)
            .await;

        let controller = LbL4MonitorController::new(client_for(&server), Protocol::Tcp);
        controller.delete("m-1").await.unwrap();
        controller.delete("m-1").await.unwrap();
    }
}

/// Test module for error handling
mod error_handling_tests {
    use super::*;

    /// The server's error body reaches the caller unchanged
    #[tokio::test]
    async fn test_rejection_keeps_body_verbatim() {
        let server = MockServer::start().await;
        let body = r#"{"httpStatus":"BAD_REQUEST","error_code":255,"error_message":"Field level validation errors"}"#;

        Mock::given(method("POST"))
            .and(path(MONITORS))
            .respond_with(ResponseTemplate::new(400).set_body_string(body))
            .mount(&server)
            .await;

        let controller = LbL4MonitorController::new(client_for(&server), Protocol::Tcp);
        match controller.create(&monitor_config()).await.unwrap_err() {
            ProviderError::RemoteRejected { status, body: actual } => {
                assert_eq!(status, 400);
                assert_eq!(actual, body);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    /// 5xx on read is a rejection, never a silent "gone"
    #[tokio::test]
    async fn test_server_error_on_read() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path(format!("{}/m-1", MONITORS)))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let controller = LbL4MonitorController::new(client_for(&server), Protocol::Tcp);
        let err = controller.exists("m-1").await.unwrap_err();
        assert!(matches!(err, ProviderError::RemoteRejected { status: 503, .. }));
    }

    /// A monitor of the other protocol is refused on read
    #[tokio::test]
    async fn test_read_wrong_protocol() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path(format!("{}/m-1", MONITORS)))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(server_monitor("m-1", "LbHttpMonitor", 0)),
            )
            .mount(&server)
            .await;

        let controller = LbL4MonitorController::new(client_for(&server), Protocol::Tcp);
        let err = controller.read("m-1").await.unwrap_err();
        assert!(matches!(err, ProviderError::Validation(_)));
    }

    /// A malformed success body is reported, not panicked on
    #[tokio::test]
    async fn test_unparseable_body() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path(format!("{}/m-1", MONITORS)))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>login</html>"))
            .mount(&server)
            .await;

        let controller = LbL4MonitorController::new(client_for(&server), Protocol::Tcp);
        match controller.read("m-1").await.unwrap_err() {
            ProviderError::RemoteRejected { status, body } => {
                assert_eq!(status, 200);
                assert!(body.starts_with("unparseable response body"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    /// Connection refused surfaces as a network error
    #[tokio::test]
    async fn test_unreachable_manager() {
        let config = ProviderConfig {
            host: "http://127.0.0.1:1".to_string(),
            username: "admin".to_string(),
            password: "secret".to_string(),
            request_timeout_secs: 5,
            ..ProviderConfig::default()
        };
        let client = NsxClient::new(&config).unwrap();
        let controller = LbL4MonitorController::new(client, Protocol::Tcp);

        let err = controller.read("m-1").await.unwrap_err();
        assert!(matches!(err, ProviderError::Network { .. }));
    }
}
