//! Node configuration.
//!
//! Loaded from a TOML file and overridden by command-line flags.

use scvm_types::ForkVersion;
use scvm_vm::{PoolConfig, VmSettings, CHAIN_SERVICE};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Node configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// VM pool and execution settings
    pub vm: VmConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
}

impl NodeConfig {
    /// Load configuration from file.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        if path.to_string_lossy().contains("..") {
            anyhow::bail!("Invalid path: directory traversal detected");
        }
        let contents = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read config file '{}': {}", path.display(), e))?;
        let config: NodeConfig = toml::from_str(&contents)
            .map_err(|e| anyhow::anyhow!("Failed to parse config file '{}': {}", path.display(), e))?;
        Ok(config)
    }

    /// Save configuration to file.
    pub fn to_file(&self, path: &Path) -> anyhow::Result<()> {
        if path.to_string_lossy().contains("..") {
            anyhow::bail!("Invalid path: directory traversal detected");
        }
        let contents = toml::to_string_pretty(self)?;
        std::fs::write(path, contents)
            .map_err(|e| anyhow::anyhow!("Failed to write config file '{}': {}", path.display(), e))?;
        Ok(())
    }

    /// Validate configuration.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.vm.pool_size == 0 {
            anyhow::bail!("VM pool size cannot be 0");
        }
        if self.vm.timeout_ms == 0 {
            anyhow::bail!("VM timeout cannot be 0");
        }
        if self.vm.max_context <= CHAIN_SERVICE {
            anyhow::bail!(
                "max_context must be greater than {} to leave room for queries",
                CHAIN_SERVICE
            );
        }
        match self.logging.format.as_str() {
            "pretty" | "json" => Ok(()),
            other => anyhow::bail!("Unknown log format '{}'", other),
        }
    }
}

/// VM pool configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VmConfig {
    /// Number of worker processes
    pub pool_size: usize,
    /// Worker executable; looked up next to the node when unset
    pub vm_path: Option<PathBuf>,
    /// Execution deadline of a query (ms)
    pub timeout_ms: u64,
    /// Execution context slots, including the block factory and chain service
    pub max_context: usize,
    /// Public network
    pub pub_net: bool,
    /// Block number to trace (0 = off)
    pub trace_block_no: u64,
    /// Charge no fees
    pub zero_fee: bool,
    /// Fork version the workers start on
    pub fork: ForkVersion,
    /// Record internal operations
    pub internal_ops: bool,
}

impl Default for VmConfig {
    fn default() -> Self {
        Self {
            pool_size: 4,
            vm_path: None,
            timeout_ms: 250,
            max_context: 24,
            pub_net: false,
            trace_block_no: 0,
            zero_fee: false,
            fork: 4,
            internal_ops: false,
        }
    }
}

impl VmConfig {
    pub fn pool_config(&self) -> PoolConfig {
        PoolConfig {
            size: self.pool_size,
            fork: self.fork,
            pub_net: self.pub_net,
        }
    }

    pub fn settings(&self) -> VmSettings {
        VmSettings {
            pub_net: self.pub_net,
            trace_block_no: self.trace_block_no,
            timeout: Duration::from_millis(self.timeout_ms),
            internal_ops: self.internal_ops,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level
    pub level: String,
    /// Log to file
    pub log_file: Option<PathBuf>,
    /// Log format (json|pretty)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            log_file: None,
            format: "pretty".to_string(),
        }
    }
}
