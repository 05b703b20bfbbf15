use elastimem_core::ElasticPolicy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::scan::ScanSettings;

/// Main configuration for the elastimem daemon
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Where the memory controller and containers live
    #[serde(default)]
    pub controller: ControllerConfig,

    /// Elastic algorithm tunables
    #[serde(default)]
    pub elastic: ElasticConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LogConfig,
}

/// Memory controller location
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControllerConfig {
    /// Memory controller mount point (default: detected from /proc/self/mounts)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cgroup_root: Option<PathBuf>,

    /// Directory under the controller root holding container cgroups (default: "docker")
    pub container_dir: PathBuf,

    /// Mount path or identifier of this filesystem instance (default: "/var/lib/lxcfs")
    /// Containers whose tasks do not mount it are left alone
    pub mount_tag: String,
}

/// Elastic algorithm settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElasticConfig {
    /// Scan period in seconds (default: 3)
    pub period_secs: u64,

    /// Run the reclamation pass every N scan cycles (default: 16)
    pub reclaim_every: u32,

    /// Limit changes are multiples of this many bytes (default: 8192)
    pub alignment_bytes: u64,

    /// Smaller adjustments are dropped (default: 8192)
    pub min_adjust_bytes: u64,

    /// Share of the headroom to the ceiling added per grow (default: 0.25)
    pub grow_fraction: f64,

    /// Share of `ceiling - usage` removed per shrink (default: 0.25)
    pub shrink_fraction: f64,

    /// Initial ceiling as a multiple of the observed limit (default: 4)
    pub ceiling_multiplier: u64,

    /// Watermark scale factor k in min = k * sqrt(bytes) (default: 512)
    pub watermark_scale: u64,

    /// Successive grows halve the growth fraction up to this many times (default: 4)
    pub max_growth_step: u32,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Log directory path (default: ./logs)
    pub log_dir: PathBuf,

    /// Daily-rotated log file name (default: elastimem-daemon.log)
    pub file_name: String,

    /// Filter used when RUST_LOG is not set (default: info)
    pub level: String,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            cgroup_root: None,
            container_dir: PathBuf::from("docker"),
            mount_tag: "/var/lib/lxcfs".to_string(),
        }
    }
}

impl Default for ElasticConfig {
    fn default() -> Self {
        let policy = ElasticPolicy::default();
        Self {
            period_secs: 3,
            reclaim_every: 16,
            alignment_bytes: policy.alignment,
            min_adjust_bytes: policy.min_adjust,
            grow_fraction: policy.grow_fraction,
            shrink_fraction: policy.shrink_fraction,
            ceiling_multiplier: policy.ceiling_multiplier,
            watermark_scale: policy.watermark_scale,
            max_growth_step: policy.max_growth_step,
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            log_dir: PathBuf::from("./logs"),
            file_name: "elastimem-daemon.log".to_string(),
            level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from TOML file
    ///
    /// # Example
    /// ```no_run
    /// use elastimem_daemon::config::Config;
    ///
    /// let config = Config::load_from_file("/etc/elastimem/config.toml").unwrap();
    /// println!("Scan period: {}s", config.elastic.period_secs);
    /// ```
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, Box<dyn std::error::Error>> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to TOML file
    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<(), Box<dyn std::error::Error>> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), String> {
        if self.controller.container_dir.as_os_str().is_empty() {
            return Err("Container dir must not be empty".to_string());
        }

        if self.controller.mount_tag.is_empty() {
            return Err("Mount tag must not be empty".to_string());
        }

        let elastic = &self.elastic;
        if elastic.period_secs == 0 {
            return Err("Scan period must be > 0".to_string());
        }

        if elastic.reclaim_every == 0 {
            return Err("Reclaim cadence must be > 0".to_string());
        }

        if !elastic.alignment_bytes.is_power_of_two() {
            return Err(format!(
                "Alignment must be a non-zero power of two, got: {}",
                elastic.alignment_bytes
            ));
        }

        if elastic.min_adjust_bytes == 0 {
            return Err("Minimum adjustment must be > 0".to_string());
        }

        for (name, value) in [
            ("Grow fraction", elastic.grow_fraction),
            ("Shrink fraction", elastic.shrink_fraction),
        ] {
            if !(value > 0.0 && value <= 1.0) {
                return Err(format!("{} must be in (0, 1], got: {}", name, value));
            }
        }

        if elastic.ceiling_multiplier == 0 {
            return Err("Ceiling multiplier must be >= 1".to_string());
        }

        if elastic.watermark_scale == 0 {
            return Err("Watermark scale must be > 0".to_string());
        }

        if self.logging.level.is_empty() {
            return Err("Log level must not be empty".to_string());
        }

        Ok(())
    }

    /// Algorithm tunables for the rebalancer
    pub fn policy(&self) -> ElasticPolicy {
        ElasticPolicy {
            alignment: self.elastic.alignment_bytes,
            min_adjust: self.elastic.min_adjust_bytes,
            grow_fraction: self.elastic.grow_fraction,
            shrink_fraction: self.elastic.shrink_fraction,
            ceiling_multiplier: self.elastic.ceiling_multiplier,
            watermark_scale: self.elastic.watermark_scale,
            max_growth_step: self.elastic.max_growth_step,
        }
    }

    /// Loop settings for the scanner
    pub fn scan_settings(&self) -> ScanSettings {
        ScanSettings {
            container_dir: self.controller.container_dir.clone(),
            period: Duration::from_secs(self.elastic.period_secs),
            reclaim_every: self.elastic.reclaim_every,
        }
    }

    /// Get full path to the log file
    pub fn log_path(&self) -> PathBuf {
        self.logging.log_dir.join(&self.logging.file_name)
    }
}
