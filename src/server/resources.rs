//! Resource catalog
//!
//! The HomeyPro data the server exposes, keyed both by the short resource key used
//! by the cache and by the `homey://` URI clients see. TTLs reflect how quickly
//! each kind of data changes on a typical installation: device state moves fast,
//! zone layout and system info hardly at all.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Kinds of data served through the query facade
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResourceKind {
    /// Aggregated system information and health summary
    SystemOverview,
    /// All visible devices with capabilities and availability
    Devices,
    /// Zone hierarchy
    Zones,
    /// Standard and advanced flows
    Flows,
}

impl ResourceKind {
    /// Every catalogued resource, in listing order
    pub const ALL: [ResourceKind; 4] = [
        ResourceKind::SystemOverview,
        ResourceKind::Devices,
        ResourceKind::Zones,
        ResourceKind::Flows,
    ];

    /// Cache key
    pub fn key(&self) -> &'static str {
        match self {
            ResourceKind::SystemOverview => "system-overview",
            ResourceKind::Devices => "devices",
            ResourceKind::Zones => "zones",
            ResourceKind::Flows => "flows",
        }
    }

    /// Client-facing URI
    pub fn uri(&self) -> &'static str {
        match self {
            ResourceKind::SystemOverview => "homey://system/overview",
            ResourceKind::Devices => "homey://devices/registry",
            ResourceKind::Zones => "homey://zones/hierarchy",
            ResourceKind::Flows => "homey://flows/catalog",
        }
    }

    /// Human-readable name
    pub fn name(&self) -> &'static str {
        match self {
            ResourceKind::SystemOverview => "System Overview",
            ResourceKind::Devices => "Device Registry",
            ResourceKind::Zones => "Zone Hierarchy",
            ResourceKind::Flows => "Flow Catalog",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            ResourceKind::SystemOverview => {
                "System information with device counts, zone counts and health indicators"
            }
            ResourceKind::Devices => {
                "Device inventory with capabilities and online/offline indicators"
            }
            ResourceKind::Zones => "Zones with their devices and child zones",
            ResourceKind::Flows => "Standard and advanced flows with enabled status",
        }
    }

    /// Default time-to-live for cached values
    pub fn default_ttl(&self) -> Duration {
        match self {
            ResourceKind::SystemOverview => Duration::from_secs(300),
            ResourceKind::Devices => Duration::from_secs(30),
            ResourceKind::Zones => Duration::from_secs(300),
            ResourceKind::Flows => Duration::from_secs(120),
        }
    }

    /// Whether the value is a paginated sequence rather than a single document
    pub fn is_collection(&self) -> bool {
        !matches!(self, ResourceKind::SystemOverview)
    }

    /// Suffix for the per-resource TTL environment variable
    pub fn env_suffix(&self) -> &'static str {
        match self {
            ResourceKind::SystemOverview => "SYSTEM_OVERVIEW",
            ResourceKind::Devices => "DEVICES",
            ResourceKind::Zones => "ZONES",
            ResourceKind::Flows => "FLOWS",
        }
    }

    /// Look up by cache key
    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.key() == key)
    }

    /// Look up by URI, ignoring any query string
    pub fn from_uri(uri: &str) -> Option<Self> {
        let path = uri.split('?').next().unwrap_or(uri);
        Self::ALL.into_iter().find(|kind| kind.uri() == path)
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.key())
    }
}
