//! HTTP client for the HomeyPro REST API
//!
//! [`HomeyHttpClient`] does authenticated GETs and maps transport and status
//! failures onto [`FetchError`]. [`HomeyFetcher`] turns those responses into the
//! resource values the cache stores: sorted record arrays for devices and flows,
//! zone records joined with their devices and child zones, and a summary document
//! for the system overview.

use crate::client::{FetchResult, Fetcher};
use crate::config::HomeyConfig;
use crate::error::{FetchError, HomeyError, Result};
use crate::server::resources::ResourceKind;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::{Client, ClientBuilder};
use serde_json::{json, Map, Value};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};
use url::Url;

const DEVICES_PATH: &str = "/api/manager/devices/device/";
const ZONES_PATH: &str = "/api/manager/zones/zone/";
const FLOWS_PATH: &str = "/api/manager/flow/flow/";
const ADVANCED_FLOWS_PATH: &str = "/api/manager/flow/advancedflow/";
const SYSTEM_PATH: &str = "/api/manager/system/";

/// Number of zone names included in the system overview
const OVERVIEW_ZONE_NAMES: usize = 10;

/// Name fragments that classify a zone without an icon
const ROOM_KEYWORDS: [&str; 4] = ["bedroom", "living", "kitchen", "bathroom"];
const OUTDOOR_KEYWORDS: [&str; 3] = ["outdoor", "garden", "garage"];

/// Longest error body echoed into an error message
const MAX_ERROR_BODY: usize = 200;

/// HTTP client for a HomeyPro controller
#[derive(Debug, Clone)]
pub struct HomeyHttpClient {
    client: Client,
    base_url: Url,
}

impl HomeyHttpClient {
    /// Create a new HTTP client
    pub fn new(config: &HomeyConfig) -> Result<Self> {
        let mut client_builder = ClientBuilder::new()
            .timeout(config.timeout)
            .user_agent(format!("homey-mcp-rust/{}", env!("CARGO_PKG_VERSION")));

        if !config.verify_ssl {
            warn!("SSL verification disabled - this is insecure for production use");
            client_builder = client_builder.danger_accept_invalid_certs(true);
        }

        let mut default_headers = HeaderMap::new();
        let mut auth_value = HeaderValue::from_str(&format!("Bearer {}", config.token.trim()))
            .map_err(|e| HomeyError::config(format!("Invalid API token: {e}")))?;
        auth_value.set_sensitive(true);
        default_headers.insert(AUTHORIZATION, auth_value);
        client_builder = client_builder.default_headers(default_headers);

        let client = client_builder
            .build()
            .map_err(|e| HomeyError::config(format!("Failed to build HTTP client: {e}")))?;

        info!("HomeyPro client configured for {}", config.url);

        Ok(Self {
            client,
            base_url: config.url.clone(),
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn build_url(&self, path: &str) -> std::result::Result<Url, FetchError> {
        self.base_url
            .join(path)
            .map_err(|e| FetchError::internal(format!("Invalid URL path {path}: {e}")))
    }

    /// GET `path` and parse the body as JSON
    pub async fn get_json(&self, path: &str) -> FetchResult {
        let url = self.build_url(path)?;
        debug!("GET {}", url);

        let response = self.client.get(url.clone()).send().await.map_err(|e| {
            let error_msg = format!("HTTP request to {url} failed: {e}");
            if e.is_timeout() {
                FetchError::timeout(error_msg)
            } else {
                FetchError::connection(error_msg)
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let mut body = response.text().await.unwrap_or_default();
            body.truncate(
                body.char_indices()
                    .nth(MAX_ERROR_BODY)
                    .map(|(idx, _)| idx)
                    .unwrap_or(body.len()),
            );
            let error_msg = format!("HTTP error {status} from {path}: {body}");

            return Err(match status.as_u16() {
                401 => FetchError::authentication(error_msg),
                403 => FetchError::authentication(format!("Access denied to {path}")),
                code => FetchError::upstream(code, error_msg),
            });
        }

        let bytes = response.bytes().await.map_err(|e| {
            if e.is_timeout() {
                FetchError::timeout(format!("Reading response from {path} timed out: {e}"))
            } else {
                FetchError::connection(format!("Reading response from {path} failed: {e}"))
            }
        })?;

        serde_json::from_slice(&bytes)
            .map_err(|e| FetchError::decode(format!("Invalid JSON from {path}: {e}")))
    }
}

/// Fetcher for one HomeyPro resource kind
#[derive(Debug, Clone)]
pub struct HomeyFetcher {
    client: Arc<HomeyHttpClient>,
    kind: ResourceKind,
}

impl HomeyFetcher {
    pub fn new(client: Arc<HomeyHttpClient>, kind: ResourceKind) -> Self {
        Self { client, kind }
    }

    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    async fn devices(&self) -> std::result::Result<Vec<Value>, FetchError> {
        let raw = self.client.get_json(DEVICES_PATH).await?;
        Ok(normalize_devices(records(raw, "devices")?))
    }

    async fn zone_records(&self) -> std::result::Result<Vec<Value>, FetchError> {
        let raw = self.client.get_json(ZONES_PATH).await?;
        let mut zones = records(raw, "zones")?;
        sort_records(&mut zones);
        Ok(zones)
    }

    async fn zones(&self) -> std::result::Result<Vec<Value>, FetchError> {
        let (zones, devices) = futures::try_join!(self.zone_records(), self.devices())?;
        let hierarchy = build_zone_hierarchy(zones, &devices);
        debug!(
            "Zone hierarchy: {} zones, {} with devices",
            hierarchy.len(),
            hierarchy
                .iter()
                .filter(|zone| zone["device_count"].as_u64().unwrap_or(0) > 0)
                .count()
        );
        Ok(hierarchy)
    }

    async fn flows(&self) -> std::result::Result<Vec<Value>, FetchError> {
        let (standard, advanced) = futures::try_join!(
            self.client.get_json(FLOWS_PATH),
            self.client.get_json(ADVANCED_FLOWS_PATH),
        )?;

        let mut flows = tag_flows(records(standard, "flows")?, "standard");
        flows.extend(tag_flows(records(advanced, "advanced flows")?, "advanced"));
        sort_records(&mut flows);
        Ok(flows)
    }

    async fn system_overview(&self) -> FetchResult {
        let (system, devices, zones) = futures::try_join!(
            self.client.get_json(SYSTEM_PATH),
            self.devices(),
            self.zone_records(),
        )?;
        Ok(summarize_system(&system, &devices, &zones))
    }
}

#[async_trait]
impl Fetcher for HomeyFetcher {
    async fn fetch(&self, key: &str) -> FetchResult {
        debug!("Fetching {} from HomeyPro", key);
        let value = match self.kind {
            ResourceKind::Devices => Value::Array(self.devices().await?),
            ResourceKind::Zones => Value::Array(self.zones().await?),
            ResourceKind::Flows => Value::Array(self.flows().await?),
            ResourceKind::SystemOverview => self.system_overview().await?,
        };

        if let Value::Array(items) = &value {
            info!("Fetched {} {} from HomeyPro", items.len(), key);
        }
        Ok(value)
    }
}

/// Accept both `{id: record}` maps and plain arrays
fn records(raw: Value, what: &str) -> std::result::Result<Vec<Value>, FetchError> {
    match raw {
        Value::Array(items) => Ok(items),
        Value::Object(map) => Ok(map.into_iter().map(|(_, record)| record).collect()),
        other => Err(FetchError::decode(format!(
            "expected {what} as object or array, got {}",
            json_type(&other)
        ))),
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn str_field<'a>(record: &'a Value, field: &str) -> &'a str {
    record.get(field).and_then(Value::as_str).unwrap_or_default()
}

/// Stable order for pagination: by name, then id
fn sort_records(records: &mut [Value]) {
    records.sort_by(|a, b| {
        str_field(a, "name")
            .cmp(str_field(b, "name"))
            .then_with(|| str_field(a, "id").cmp(str_field(b, "id")))
    });
}

/// Drop hidden devices, add `is_online`, sort
fn normalize_devices(devices: Vec<Value>) -> Vec<Value> {
    let mut visible: Vec<Value> = devices
        .into_iter()
        .filter(|device| !device.get("hidden").and_then(Value::as_bool).unwrap_or(false))
        .map(|mut device| {
            let online = device
                .get("available")
                .and_then(Value::as_bool)
                .unwrap_or(false);
            if let Value::Object(fields) = &mut device {
                fields.insert("is_online".to_string(), Value::Bool(online));
            }
            device
        })
        .collect();
    sort_records(&mut visible);
    visible
}

fn tag_flows(flows: Vec<Value>, flow_type: &str) -> Vec<Value> {
    flows
        .into_iter()
        .map(|mut flow| {
            if let Value::Object(fields) = &mut flow {
                fields.insert("flow_type".to_string(), Value::String(flow_type.to_string()));
            }
            flow
        })
        .collect()
}

/// Attach each zone's visible devices, its child zone ids and a zone type
fn build_zone_hierarchy(zones: Vec<Value>, devices: &[Value]) -> Vec<Value> {
    let mut devices_by_zone: HashMap<&str, Vec<Value>> = HashMap::new();
    for device in devices {
        let zone = str_field(device, "zone");
        if zone.is_empty() {
            continue;
        }
        devices_by_zone.entry(zone).or_default().push(json!({
            "id": str_field(device, "id"),
            "name": str_field(device, "name"),
            "class": str_field(device, "class"),
            "available": device.get("is_online").and_then(Value::as_bool).unwrap_or(false),
        }));
    }

    // Zones arrive sorted, so children are listed in name order
    let mut children: HashMap<String, Vec<String>> = HashMap::new();
    {
        let known: HashSet<&str> = zones.iter().map(|zone| str_field(zone, "id")).collect();
        for zone in &zones {
            let parent = str_field(zone, "parent");
            if known.contains(parent) {
                children
                    .entry(parent.to_string())
                    .or_default()
                    .push(str_field(zone, "id").to_string());
            }
        }
    }

    zones
        .into_iter()
        .map(|mut zone| {
            let id = str_field(&zone, "id").to_string();
            let zone_devices = devices_by_zone.remove(id.as_str()).unwrap_or_default();
            let online = zone_devices
                .iter()
                .filter(|device| device["available"] == true)
                .count();
            let zone_type = zone_type(&zone);
            let child_ids = children.remove(&id).unwrap_or_default();

            if let Value::Object(fields) = &mut zone {
                fields.insert("device_count".to_string(), json!(zone_devices.len()));
                fields.insert("online_device_count".to_string(), json!(online));
                fields.insert("devices".to_string(), Value::Array(zone_devices));
                fields.insert("children".to_string(), json!(child_ids));
                fields.insert("type".to_string(), Value::String(zone_type));
            }
            zone
        })
        .collect()
}

/// Icon if the zone has one, otherwise guessed from the name
fn zone_type(zone: &Value) -> String {
    let icon = str_field(zone, "icon");
    if !icon.is_empty() {
        return icon.to_string();
    }

    let name = str_field(zone, "name").to_lowercase();
    let zone_type = if ROOM_KEYWORDS.iter().any(|k| name.contains(k)) {
        "room"
    } else if OUTDOOR_KEYWORDS.iter().any(|k| name.contains(k)) {
        "outdoor"
    } else {
        "general"
    };
    zone_type.to_string()
}

fn capability_names(device: &Value) -> Vec<String> {
    match device.get("capabilities") {
        Some(Value::Array(caps)) => caps
            .iter()
            .filter_map(Value::as_str)
            .map(String::from)
            .collect(),
        Some(Value::Object(caps)) => caps.keys().cloned().collect(),
        _ => Vec::new(),
    }
}

/// Build the system overview document
fn summarize_system(system: &Value, devices: &[Value], zones: &[Value]) -> Value {
    let total = devices.len();
    let online = devices
        .iter()
        .filter(|d| d.get("is_online").and_then(Value::as_bool).unwrap_or(false))
        .count();

    let device_types: BTreeSet<&str> = devices
        .iter()
        .map(|d| str_field(d, "class"))
        .filter(|class| !class.is_empty())
        .collect();
    let capabilities: BTreeSet<String> = devices.iter().flat_map(capability_names).collect();

    let health = if total == 0 {
        100.0
    } else {
        (online as f64 / total as f64 * 1000.0).round() / 10.0
    };

    let mut system_info = Map::new();
    for field in ["name", "version", "platform"] {
        let value = system
            .get(field)
            .and_then(Value::as_str)
            .unwrap_or("Unknown");
        system_info.insert(field.to_string(), Value::String(value.to_string()));
    }
    system_info.insert(
        "uptime".to_string(),
        system.get("uptime").cloned().unwrap_or(json!(0)),
    );

    let zone_names: Vec<&str> = zones
        .iter()
        .take(OVERVIEW_ZONE_NAMES)
        .map(|z| z.get("name").and_then(Value::as_str).unwrap_or("Unknown"))
        .collect();

    json!({
        "system_info": system_info,
        "device_summary": {
            "total_count": total,
            "online_count": online,
            "offline_count": total - online,
            "device_types_count": device_types.len(),
            "capabilities_count": capabilities.len(),
            "health_percentage": health,
        },
        "zone_summary": {
            "total_count": zones.len(),
            "zone_names": zone_names,
        },
    })
}
