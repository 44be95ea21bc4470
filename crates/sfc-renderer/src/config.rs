//! Renderer configuration.

use crate::flow::TableIndex;
use serde::{Deserialize, Serialize};
use sfc_types::VlanId;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid YAML configuration: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("invalid JSON configuration: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Inclusive VLAN id range the VLAN transport allocates from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VlanRange {
    pub start: u16,
    pub end: u16,
}

impl Default for VlanRange {
    fn default() -> Self {
        Self { start: 100, end: 4000 }
    }
}

/// Table numbering used when forwarders are addressed by logical
/// interfaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogicalTables {
    pub classifier: u8,
    pub transport_ingress: u8,
    pub path_mapper: u8,
    pub path_mapper_acl: u8,
    pub next_hop: u8,
    pub transport_egress: u8,
    /// Externally owned table packets are handed back to after the chain.
    pub dispatcher: u8,
}

impl Default for LogicalTables {
    fn default() -> Self {
        Self {
            classifier: 82,
            transport_ingress: 83,
            path_mapper: 84,
            path_mapper_acl: 85,
            next_hop: 86,
            transport_egress: 87,
            dispatcher: 17,
        }
    }
}

impl LogicalTables {
    pub fn table_index(&self) -> TableIndex {
        TableIndex {
            classifier: self.classifier,
            transport_ingress: self.transport_ingress,
            path_mapper: self.path_mapper,
            path_mapper_acl: self.path_mapper_acl,
            next_hop: self.next_hop,
            transport_egress: self.transport_egress,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    /// Added to every standard pipeline table number.
    pub table_offset: u8,
    /// When set, unmatched egress traffic continues here instead of being
    /// dropped.
    pub app_egress_table: Option<u8>,
    pub app_coexistence_table: u8,
    pub vlan_range: VlanRange,
    pub logical_tables: LogicalTables,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            table_offset: 0,
            app_egress_table: None,
            app_coexistence_table: 0,
            vlan_range: VlanRange::default(),
            logical_tables: LogicalTables::default(),
        }
    }
}

impl RendererConfig {
    /// Loads a config file; `.json` files are parsed as JSON, anything else
    /// as YAML.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json_str(&content),
            _ => Self::from_yaml_str(&content),
        }
    }

    pub fn from_yaml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let VlanRange { start, end } = self.vlan_range;
        if start > end {
            return Err(ConfigError::Invalid(format!(
                "vlan_range start {start} is above end {end}"
            )));
        }
        for id in [start, end] {
            VlanId::new(id).map_err(|e| ConfigError::Invalid(format!("vlan_range: {e}")))?;
        }
        if self.table_offset.checked_add(10).is_none() {
            return Err(ConfigError::Invalid(format!(
                "table_offset {} leaves no room for the transport egress table",
                self.table_offset
            )));
        }
        Ok(())
    }

    /// Standard pipeline tables after applying `table_offset`.
    pub fn standard_tables(&self) -> TableIndex {
        TableIndex::standard(self.table_offset)
    }
}
