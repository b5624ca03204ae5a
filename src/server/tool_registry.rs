//! Tool table
//!
//! The set of exposed tools is fixed at startup from the candidate list and the
//! configured allow/deny lists. An allow list wins over a deny list; with neither,
//! everything is exposed. Names that match no candidate are reported, not fatal.

use crate::config::ToolsConfig;
use serde::Serialize;
use std::collections::BTreeSet;
use tracing::{info, warn};

/// Tool grouping, mirroring the controller's managers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolCategory {
    Devices,
    Flows,
    Zones,
    System,
}

/// Static description of a tool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ToolSpec {
    pub name: &'static str,
    pub category: ToolCategory,
    pub description: &'static str,
}

const fn tool(name: &'static str, category: ToolCategory, description: &'static str) -> ToolSpec {
    ToolSpec {
        name,
        category,
        description,
    }
}

/// Every tool the server knows about
pub const CANDIDATE_TOOLS: &[ToolSpec] = &[
    tool("list_devices", ToolCategory::Devices, "List devices with pagination"),
    tool("get_device", ToolCategory::Devices, "Get one device with capabilities"),
    tool("get_devices_classes", ToolCategory::Devices, "List device classes in use"),
    tool("get_devices_capabilities", ToolCategory::Devices, "List capabilities in use"),
    tool("search_devices_by_name", ToolCategory::Devices, "Find devices by name"),
    tool("search_devices_by_class", ToolCategory::Devices, "Find devices by class"),
    tool("control_device", ToolCategory::Devices, "Set a device capability value"),
    tool("get_device_insights", ToolCategory::Devices, "Historical capability data"),
    tool("list_flows", ToolCategory::Flows, "List flows with pagination"),
    tool("trigger_flow", ToolCategory::Flows, "Trigger a flow"),
    tool("get_flow_folders", ToolCategory::Flows, "List flow folders"),
    tool("get_flows_by_folder", ToolCategory::Flows, "List flows in a folder"),
    tool("get_flows_without_folder", ToolCategory::Flows, "List flows outside any folder"),
    tool("list_zones", ToolCategory::Zones, "List zones with pagination"),
    tool("get_zone_devices", ToolCategory::Zones, "List devices in a zone"),
    tool("get_zone_temp", ToolCategory::Zones, "Temperature readings in a zone"),
    tool("get_system_info", ToolCategory::System, "Controller system information"),
];

/// How the table was selected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionMode {
    All,
    AllowList,
    DenyList,
}

/// Immutable set of exposed tools
#[derive(Debug, Clone)]
pub struct ToolTable {
    tools: Vec<ToolSpec>,
    unknown: Vec<String>,
    mode: SelectionMode,
}

impl ToolTable {
    /// Filter `candidates` by `selection`
    pub fn build(candidates: &[ToolSpec], selection: &ToolsConfig) -> Self {
        let known: BTreeSet<&str> = candidates.iter().map(|t| t.name).collect();

        let (mode, requested) = if !selection.enabled.is_empty() {
            (SelectionMode::AllowList, &selection.enabled)
        } else if !selection.disabled.is_empty() {
            (SelectionMode::DenyList, &selection.disabled)
        } else {
            (SelectionMode::All, &selection.enabled)
        };

        let tools = candidates
            .iter()
            .filter(|t| match mode {
                SelectionMode::AllowList => requested.contains(t.name),
                SelectionMode::DenyList => !requested.contains(t.name),
                SelectionMode::All => true,
            })
            .copied()
            .collect();

        let unknown = requested
            .iter()
            .filter(|name| !known.contains(name.as_str()))
            .cloned()
            .collect();

        Self {
            tools,
            unknown,
            mode,
        }
    }

    /// Build from the built-in candidates, logging the outcome
    pub fn from_config(selection: &ToolsConfig) -> Self {
        let table = Self::build(CANDIDATE_TOOLS, selection);

        match table.mode {
            SelectionMode::AllowList => {
                info!("Enabling only specific tools: {:?}", selection.enabled)
            }
            SelectionMode::DenyList => info!("Disabling specific tools: {:?}", selection.disabled),
            SelectionMode::All => info!("All tools enabled (default configuration)"),
        }
        for name in &table.unknown {
            warn!("Tool '{}' not found, ignoring", name);
        }

        table
    }

    pub fn is_enabled(&self, name: &str) -> bool {
        self.tools.iter().any(|t| t.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ToolSpec> {
        self.tools.iter()
    }

    pub fn by_category(&self, category: ToolCategory) -> impl Iterator<Item = &ToolSpec> {
        self.tools.iter().filter(move |t| t.category == category)
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Configured names that match no candidate
    pub fn unknown_names(&self) -> &[String] {
        &self.unknown
    }

    pub fn mode(&self) -> SelectionMode {
        self.mode
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn selection(enabled: &[&str], disabled: &[&str]) -> ToolsConfig {
        ToolsConfig {
            enabled: enabled.iter().map(|s| s.to_string()).collect(),
            disabled: disabled.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn test_all_tools_by_default() {
        let table = ToolTable::build(CANDIDATE_TOOLS, &ToolsConfig::default());
        assert_eq!(table.len(), 17);
        assert_eq!(table.mode(), SelectionMode::All);
        assert!(table.unknown_names().is_empty());
    }

    #[test]
    fn test_allow_list_intersects() {
        let table = ToolTable::build(
            CANDIDATE_TOOLS,
            &selection(&["get_system_info", "list_zones", "make_coffee"], &[]),
        );
        let names: Vec<_> = table.iter().map(|t| t.name).collect();
        assert_eq!(names, vec!["list_zones", "get_system_info"]);
        assert_eq!(table.unknown_names(), &["make_coffee".to_string()]);
    }

    #[test]
    fn test_allow_list_wins_over_deny_list() {
        let table = ToolTable::build(
            CANDIDATE_TOOLS,
            &selection(&["list_devices"], &["list_devices", "list_flows"]),
        );
        assert!(table.is_enabled("list_devices"));
        assert!(!table.is_enabled("list_flows"));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_deny_list_subtracts() {
        let table = ToolTable::build(
            CANDIDATE_TOOLS,
            &selection(&[], &["control_device", "trigger_flow"]),
        );
        assert_eq!(table.len(), 15);
        assert!(!table.is_enabled("control_device"));
        assert_eq!(table.by_category(ToolCategory::Flows).count(), 4);
    }
}
