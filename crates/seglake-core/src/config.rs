//! Configuration management for SegLake
//!
//! Settings are layered from:
//! - hardcoded defaults
//! - an optional YAML/TOML file (`SEGLAKE_CONFIG`, then `./config/seglake`)
//! - `SEGLAKE__*` environment variables
//!
//! and validated before use.

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::ids::NodeId;

/// Root configuration structure for SegLake
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct SegLakeConfig {
    #[serde(default)]
    pub datacoord: DataCoordConfig,

    #[serde(default)]
    pub datanode: DataNodeConfig,
}

impl SegLakeConfig {
    /// Load configuration from multiple sources with precedence:
    /// 1. Environment variables (highest priority)
    /// 2. Config file specified by SEGLAKE_CONFIG env var
    /// 3. ./config/seglake.yaml
    /// 4. Hardcoded defaults (lowest priority)
    pub fn load() -> Result<Self, ConfigError> {
        let mut builder = Self::set_defaults(Config::builder())?;

        if let Ok(config_path) = std::env::var("SEGLAKE_CONFIG") {
            builder = builder.add_source(File::with_name(&config_path).required(false));
        }

        builder = builder.add_source(File::with_name("./config/seglake").required(false));

        // Example: SEGLAKE__DATANODE__SEGMENT_MAX_SIZE_MB=1024
        builder = builder.add_source(
            Environment::with_prefix("SEGLAKE")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let config: SegLakeConfig = builder.build()?.try_deserialize()?;
        config.validate()?;

        Ok(config)
    }

    fn set_defaults(
        builder: config::ConfigBuilder<config::builder::DefaultState>,
    ) -> Result<config::ConfigBuilder<config::builder::DefaultState>, ConfigError> {
        let coord = DataCoordConfig::default();
        let node = DataNodeConfig::default();
        builder
            .set_default("datacoord.kv_root_path", coord.kv_root_path)?
            .set_default("datacoord.max_txn_ops", coord.max_txn_ops as u64)?
            .set_default("datanode.node_id", node.node_id.get())?
            .set_default("datanode.segment_max_size_mb", node.segment_max_size_mb)?
            .set_default(
                "datanode.bloom_false_positive_rate",
                node.bloom_false_positive_rate,
            )
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.datacoord.kv_root_path.trim().is_empty() {
            return Err(ConfigError::Message(
                "datacoord.kv_root_path must not be empty".to_string(),
            ));
        }

        if self.datacoord.max_txn_ops < 2 {
            return Err(ConfigError::Message(
                "datacoord.max_txn_ops must be >= 2".to_string(),
            ));
        }

        if !(self.datanode.segment_max_size_mb > 0.0) {
            return Err(ConfigError::Message(
                "datanode.segment_max_size_mb must be > 0".to_string(),
            ));
        }

        let fpr = self.datanode.bloom_false_positive_rate;
        if !(fpr > 0.0 && fpr < 1.0) {
            return Err(ConfigError::Message(
                "datanode.bloom_false_positive_rate must be in (0, 1)".to_string(),
            ));
        }

        Ok(())
    }

    /// Load configuration from a specific file path
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config: SegLakeConfig = Self::set_defaults(Config::builder())?
            .add_source(File::from(path.as_ref()))
            .build()?
            .try_deserialize()?;
        config.validate()?;

        Ok(config)
    }
}

/// Coordinator catalog settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DataCoordConfig {
    /// Prefix of every catalog key in the KV store
    pub kv_root_path: String,

    /// Largest number of keys written in one KV transaction
    pub max_txn_ops: usize,
}

impl Default for DataCoordConfig {
    fn default() -> Self {
        Self {
            kv_root_path: "datacoord-meta".to_string(),
            max_txn_ops: 128,
        }
    }
}

/// Data node write-path settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DataNodeConfig {
    pub node_id: NodeId,

    /// Target segment size; bounds the row capacity of fresh bloom filters
    pub segment_max_size_mb: f64,

    pub bloom_false_positive_rate: f64,
}

impl Default for DataNodeConfig {
    fn default() -> Self {
        Self {
            node_id: NodeId::new(1),
            segment_max_size_mb: 512.0,
            bloom_false_positive_rate: 0.005,
        }
    }
}

impl DataNodeConfig {
    /// Sizing parameters handed to the primary-key index builder.
    #[must_use]
    pub fn pk_index(&self) -> PkIndexConfig {
        PkIndexConfig {
            segment_max_size_mb: self.segment_max_size_mb,
            false_positive_rate: self.bloom_false_positive_rate,
        }
    }
}

/// Sizing of a freshly built primary-key index
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct PkIndexConfig {
    pub segment_max_size_mb: f64,
    pub false_positive_rate: f64,
}

impl Default for PkIndexConfig {
    fn default() -> Self {
        DataNodeConfig::default().pk_index()
    }
}

impl PkIndexConfig {
    /// Expected row count of a full segment whose records are `size_per_record`
    /// bytes each. Never below one.
    #[must_use]
    pub fn max_row_count(&self, size_per_record: usize) -> i64 {
        if size_per_record == 0 {
            return 1;
        }
        let bytes = self.segment_max_size_mb * 1024.0 * 1024.0;
        ((bytes / size_per_record as f64) as i64).max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_configuration() {
        let config = SegLakeConfig::default();

        assert_eq!(config.datacoord.kv_root_path, "datacoord-meta");
        assert_eq!(config.datacoord.max_txn_ops, 128);
        assert_eq!(config.datanode.node_id, NodeId::new(1));
        assert_eq!(config.datanode.segment_max_size_mb, 512.0);
        assert_eq!(config.datanode.bloom_false_positive_rate, 0.005);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_max_row_count() {
        let pk = PkIndexConfig {
            segment_max_size_mb: 1.0,
            false_positive_rate: 0.01,
        };
        assert_eq!(pk.max_row_count(1024), 1024);
        assert_eq!(pk.max_row_count(0), 1);
        assert_eq!(pk.max_row_count(usize::MAX), 1);
    }

    #[test]
    fn test_validation_errors() {
        let mut config = SegLakeConfig::default();

        config.datacoord.max_txn_ops = 1;
        assert!(config.validate().is_err());
        config.datacoord.max_txn_ops = 64;
        assert!(config.validate().is_ok());

        config.datanode.bloom_false_positive_rate = 1.5;
        assert!(config.validate().is_err());
        config.datanode.bloom_false_positive_rate = 0.01;

        config.datanode.segment_max_size_mb = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_file_overrides_defaults() {
        let dir = std::env::temp_dir().join(format!("seglake-config-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("seglake.toml");
        std::fs::write(&path, "[datanode]\nsegment_max_size_mb = 64.0\n").unwrap();

        let config = SegLakeConfig::from_file(&path).unwrap();
        assert_eq!(config.datanode.segment_max_size_mb, 64.0);
        assert_eq!(config.datacoord.max_txn_ops, 128);

        std::fs::remove_dir_all(&dir).ok();
    }
}
