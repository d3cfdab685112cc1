//! Control-node configuration and environment parameters
//!
//! The control node reads a TOML file with a `[master]` table:
//!
//! ```toml
//! [master]
//! block_size = 67108864
//! default_ttl = 86400
//! replication_factor = 2
//! minions = ["A:storage1:50051", "B:storage2:50051", "C:storage3:50051"]
//! ```
//!
//! Everything else the services need (backup address, data directory,
//! debug toggle) comes from the environment, see [`Environment`].

use crate::error::{DeedsError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default block size (64 MiB)
pub const DEFAULT_BLOCK_SIZE: u64 = 64 * 1024 * 1024;

/// Default time-to-live for namespace entries (one day)
pub const DEFAULT_TTL_SECS: i64 = 86_400;

/// Longest finite `default_ttl` accepted (one hundred years)
pub const MAX_TTL_SECS: i64 = 100 * 365 * 86_400;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub master: MasterConfig,
}

/// Settings for the control node
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MasterConfig {
    /// Fixed block size in bytes
    pub block_size: u64,

    /// TTL applied to every created or touched path (< 0 means immortal)
    pub default_ttl: i64,

    /// Number of storage daemons holding each block
    pub replication_factor: usize,

    /// Storage daemon registrations as `id:host:port`
    pub minions: Vec<String>,

    /// Capacity reported per storage daemon by `statfs`
    pub blocks_per_minion: u64,

    /// Inode capacity reported by `statfs`
    pub max_files: u64,

    /// Resolution of the expiry timer in milliseconds
    pub expiry_tick_ms: u64,

    /// Bound on concurrently handled requests
    pub workers: usize,

    /// Timeout for outbound RPC calls in milliseconds
    pub rpc_timeout_ms: u64,
}

impl Default for MasterConfig {
    fn default() -> Self {
        MasterConfig {
            block_size: DEFAULT_BLOCK_SIZE,
            default_ttl: DEFAULT_TTL_SECS,
            replication_factor: 1,
            minions: Vec::new(),
            blocks_per_minion: 1 << 20,
            max_files: 1 << 20,
            expiry_tick_ms: 200,
            workers: 10,
            rpc_timeout_ms: 30_000,
        }
    }
}

impl MasterConfig {
    /// Parse a configuration from TOML text
    pub fn from_toml(text: &str) -> Result<Self> {
        let config: Config =
            toml::from_str(text).map_err(|e| DeedsError::Config(e.to_string()))?;
        config.master.validate()?;
        Ok(config.master)
    }

    /// Load configuration from a file on disk
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            DeedsError::Config(format!("cannot read {}: {}", path.as_ref().display(), e))
        })?;
        Self::from_toml(&text)
    }

    pub fn validate(&self) -> Result<()> {
        if self.block_size == 0 {
            return Err(DeedsError::Config("block_size must be positive".to_string()));
        }
        if self.default_ttl == 0 {
            return Err(DeedsError::Config(
                "default_ttl of 0 would expire every entry immediately".to_string(),
            ));
        }
        if self.default_ttl > MAX_TTL_SECS {
            return Err(DeedsError::Config(format!(
                "default_ttl must be at most {} seconds (use a negative value for no expiry)",
                MAX_TTL_SECS
            )));
        }
        if self.minions.is_empty() {
            return Err(DeedsError::Config("no minions registered".to_string()));
        }
        if self.replication_factor == 0 {
            return Err(DeedsError::Config(
                "replication_factor must be at least 1".to_string(),
            ));
        }
        if self.workers == 0 {
            return Err(DeedsError::Config("workers must be at least 1".to_string()));
        }
        Ok(())
    }

    pub fn expiry_tick(&self) -> Duration {
        Duration::from_millis(self.expiry_tick_ms.max(1))
    }

    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_millis(self.rpc_timeout_ms)
    }
}

/// Parameters taken from the process environment
#[derive(Debug, Clone)]
pub struct Environment {
    /// `DEEDS_BACKUP_ADDR`
    pub backup_addr: String,
    /// `GFS_DATA_DIR`
    pub data_dir: PathBuf,
    /// `DEEDS_BACKUP_LOCATION`
    pub backup_location: PathBuf,
    /// `DEEDS_WIPE_PASSES`
    pub wipe_passes: usize,
    /// `DEBUG_MODE`
    pub debug: bool,
}

impl Environment {
    pub fn from_env() -> Self {
        let home = std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("."));

        Environment {
            backup_addr: std::env::var("DEEDS_BACKUP_ADDR")
                .unwrap_or_else(|_| "backup:50051".to_string()),
            data_dir: std::env::var("GFS_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| home.join("gfs_root")),
            backup_location: std::env::var("DEEDS_BACKUP_LOCATION")
                .map(PathBuf::from)
                .unwrap_or_else(|_| home.join("deeds.backup")),
            wipe_passes: std::env::var("DEEDS_WIPE_PASSES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(1),
            debug: std::env::var("DEBUG_MODE")
                .map(|v| v.eq_ignore_ascii_case("true"))
                .unwrap_or(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_master_table() {
        let config = MasterConfig::from_toml(
            r#"
            [master]
            block_size = 1024
            replication_factor = 2
            minions = ["A:storage1:50051", "B:storage2:50051"]
            "#,
        )
        .unwrap();

        assert_eq!(config.block_size, 1024);
        assert_eq!(config.replication_factor, 2);
        assert_eq!(config.minions.len(), 2);
        assert_eq!(config.default_ttl, DEFAULT_TTL_SECS);
        assert_eq!(config.workers, 10);
    }

    #[test]
    fn test_rejects_zero_block_size() {
        let err = MasterConfig::from_toml(
            r#"
            [master]
            block_size = 0
            minions = ["A:localhost:1"]
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, DeedsError::Config(_)));
    }

    #[test]
    fn test_rejects_unrepresentable_default_ttl() {
        let err = MasterConfig::from_toml(
            r#"
            [master]
            default_ttl = 9223372036854775807
            minions = ["A:localhost:1"]
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, DeedsError::Config(_)));

        let immortal = MasterConfig::from_toml(
            r#"
            [master]
            default_ttl = -1
            minions = ["A:localhost:1"]
            "#,
        )
        .unwrap();
        assert_eq!(immortal.default_ttl, -1);
    }

    #[test]
    fn test_rejects_missing_minions() {
        let err = MasterConfig::from_toml("[master]\nblock_size = 10\n").unwrap_err();
        assert!(matches!(err, DeedsError::Config(_)));
    }
}
