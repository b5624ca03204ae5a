//! HomeyHttpClient and HomeyFetcher against a mocked controller

mod common;

use common::homey_mock::MockHomeyServer;
use homey_mcp_rust::client::{Fetcher, HomeyFetcher, HomeyHttpClient};
use homey_mcp_rust::error::{FetchError, FetchErrorKind};
use homey_mcp_rust::server::ResourceKind;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use std::sync::Arc;

fn fetcher(mock: &MockHomeyServer, kind: ResourceKind) -> HomeyFetcher {
    let client = HomeyHttpClient::new(&mock.config()).expect("client builds");
    HomeyFetcher::new(Arc::new(client), kind)
}

fn ids(value: &Value) -> Vec<&str> {
    value
        .as_array()
        .unwrap()
        .iter()
        .map(|record| record["id"].as_str().unwrap())
        .collect()
}

#[tokio::test]
async fn test_devices_are_visible_sorted_and_flagged() {
    let mock = MockHomeyServer::start().await;
    mock.mock_devices().await;

    let devices = fetcher(&mock, ResourceKind::Devices)
        .fetch("devices")
        .await
        .unwrap();

    assert_eq!(ids(&devices), vec!["d1", "d2"]);
    assert_eq!(devices[0]["is_online"], false);
    assert_eq!(devices[1]["is_online"], true);
}

#[tokio::test]
async fn test_zone_hierarchy() {
    let mock = MockHomeyServer::start().await;
    mock.mock_zones().await;
    mock.mock_devices().await;

    let zones = fetcher(&mock, ResourceKind::Zones)
        .fetch("zones")
        .await
        .unwrap();
    assert_eq!(ids(&zones), vec!["z1", "z0", "z2"]);

    let home = &zones[1];
    assert_eq!(home["type"], "home");
    assert_eq!(home["children"], json!(["z1", "z2"]));
    assert_eq!(home["device_count"], 0);

    let hallway = &zones[0];
    assert_eq!(hallway["type"], "general");
    assert_eq!(hallway["device_count"], 1);
    assert_eq!(hallway["online_device_count"], 0);

    // Hidden relay in the kitchen is left out
    let kitchen = &zones[2];
    assert_eq!(kitchen["type"], "room");
    assert_eq!(
        kitchen["devices"],
        json!([{"id": "d2", "name": "Kitchen Light", "class": "light", "available": true}])
    );
    assert_eq!(kitchen["online_device_count"], 1);
}

#[tokio::test]
async fn test_flows_merge_standard_and_advanced() {
    let mock = MockHomeyServer::start().await;
    mock.mock_flows().await;

    let flows = fetcher(&mock, ResourceKind::Flows)
        .fetch("flows")
        .await
        .unwrap();

    assert_eq!(ids(&flows), vec!["a1", "f1"]);
    assert_eq!(flows[0]["flow_type"], "advanced");
    assert_eq!(flows[1]["flow_type"], "standard");
}

#[tokio::test]
async fn test_system_overview_document() {
    let mock = MockHomeyServer::start().await;
    mock.mock_system().await;
    mock.mock_devices().await;
    mock.mock_zones().await;

    let overview = fetcher(&mock, ResourceKind::SystemOverview)
        .fetch("system-overview")
        .await
        .unwrap();

    assert_eq!(
        overview["system_info"],
        json!({"name": "Homey Pro", "version": "12.2.0", "platform": "local", "uptime": 86400})
    );
    assert_eq!(overview["device_summary"]["total_count"], 2);
    assert_eq!(overview["device_summary"]["online_count"], 1);
    assert_eq!(overview["device_summary"]["health_percentage"], 50.0);
    assert_eq!(
        overview["zone_summary"]["zone_names"],
        json!(["Hallway", "Home", "Kitchen"])
    );
}

#[tokio::test]
async fn test_unauthorized_maps_to_authentication() {
    let mock = MockHomeyServer::start().await;
    mock.mock_status("/api/manager/zones/zone/", 401).await;
    mock.mock_devices().await;

    let err = fetcher(&mock, ResourceKind::Zones)
        .fetch("zones")
        .await
        .unwrap_err();
    assert_eq!(err.kind(), FetchErrorKind::Authentication);
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn test_server_error_maps_to_retryable_upstream() {
    let mock = MockHomeyServer::start().await;
    mock.mock_status("/api/manager/devices/device/", 503).await;

    let err = fetcher(&mock, ResourceKind::Devices)
        .fetch("devices")
        .await
        .unwrap_err();
    assert!(matches!(err, FetchError::Upstream { status: 503, .. }));
    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_non_json_body_is_decode_error() {
    let mock = MockHomeyServer::start().await;
    mock.mock_devices().await;
    wiremock::Mock::given(wiremock::matchers::path("/api/manager/zones/zone/"))
        .respond_with(wiremock::ResponseTemplate::new(200).set_body_string("<html>"))
        .mount(&mock.server)
        .await;

    let err = fetcher(&mock, ResourceKind::Zones)
        .fetch("zones")
        .await
        .unwrap_err();
    assert_eq!(err.kind(), FetchErrorKind::Decode);
}

#[tokio::test]
async fn test_unreachable_controller_is_connection_error() {
    let mock = MockHomeyServer::start().await;
    let mut config = mock.config();
    drop(mock);
    config.url = url::Url::parse("http://127.0.0.1:9").unwrap();

    let client = HomeyHttpClient::new(&config).unwrap();
    let err = HomeyFetcher::new(Arc::new(client), ResourceKind::Devices)
        .fetch("devices")
        .await
        .unwrap_err();
    assert!(matches!(
        err.kind(),
        FetchErrorKind::Connection | FetchErrorKind::Timeout
    ));
}
