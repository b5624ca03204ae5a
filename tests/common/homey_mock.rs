//! WireMock-based HomeyPro API mocking infrastructure
//!
//! Serves the manager endpoints the fetchers read, so the HTTP client can be
//! tested without a controller on the network.

use homey_mcp_rust::config::HomeyConfig;
use serde_json::{json, Value};
use std::time::Duration;
use url::Url;
use wiremock::{
    matchers::{header, method, path},
    Mock, MockServer, ResponseTemplate,
};

pub const TEST_TOKEN: &str = "test-token-0123456789";

/// Mock HomeyPro controller
pub struct MockHomeyServer {
    pub server: MockServer,
}

impl MockHomeyServer {
    pub async fn start() -> Self {
        Self {
            server: MockServer::start().await,
        }
    }

    /// Client configuration pointing at this server
    pub fn config(&self) -> HomeyConfig {
        HomeyConfig {
            url: Url::parse(&self.server.uri()).expect("mock server URI is valid"),
            token: TEST_TOKEN.to_string(),
            timeout: Duration::from_secs(2),
            verify_ssl: false,
        }
    }

    /// Answer authenticated GETs on `endpoint` with `body`
    pub async fn mock_json(&self, endpoint: &str, body: Value) {
        Mock::given(method("GET"))
            .and(path(endpoint))
            .and(header("authorization", format!("Bearer {TEST_TOKEN}").as_str()))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(&self.server)
            .await;
    }

    /// Answer GETs on `endpoint` with a bare status code
    pub async fn mock_status(&self, endpoint: &str, status: u16) {
        Mock::given(method("GET"))
            .and(path(endpoint))
            .respond_with(ResponseTemplate::new(status).set_body_string("nope"))
            .mount(&self.server)
            .await;
    }

    pub async fn mock_devices(&self) {
        self.mock_json(
            "/api/manager/devices/device/",
            json!({
                "d2": {"id": "d2", "name": "Kitchen Light", "class": "light", "zone": "z2",
                       "capabilities": ["onoff", "dim"], "available": true},
                "d1": {"id": "d1", "name": "Hallway Sensor", "class": "sensor", "zone": "z1",
                       "capabilities": ["measure_temperature"], "available": false},
                "d3": {"id": "d3", "name": "Hidden Relay", "class": "socket", "zone": "z2",
                       "capabilities": ["onoff"], "available": true, "hidden": true}
            }),
        )
        .await;
    }

    pub async fn mock_zones(&self) {
        self.mock_json(
            "/api/manager/zones/zone/",
            json!([
                {"id": "z2", "name": "Kitchen", "parent": "z0"},
                {"id": "z0", "name": "Home", "parent": null, "icon": "home"},
                {"id": "z1", "name": "Hallway", "parent": "z0"}
            ]),
        )
        .await;
    }

    pub async fn mock_flows(&self) {
        self.mock_json(
            "/api/manager/flow/flow/",
            json!({"f1": {"id": "f1", "name": "Morning", "enabled": true}}),
        )
        .await;
        self.mock_json(
            "/api/manager/flow/advancedflow/",
            json!({"a1": {"id": "a1", "name": "Away Mode", "enabled": false}}),
        )
        .await;
    }

    pub async fn mock_system(&self) {
        self.mock_json(
            "/api/manager/system/",
            json!({"name": "Homey Pro", "version": "12.2.0", "platform": "local", "uptime": 86400}),
        )
        .await;
    }
}
