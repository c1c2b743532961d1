//! Runtime configuration
//!
//! Configuration is read from YAML. Every section and field has a default, so
//! an empty document is a valid configuration. Priority, highest first:
//!
//! 1. Environment variables (`PADDOCK_LOG`, `PADDOCK_DATA_DIR`, `PADDOCK_CACHE_DIR`)
//! 2. Config file
//! 3. Built-in defaults
//!
//! ```yaml
//! cache:
//!   ttl_secs: 3600
//!   capacity: 32
//!   disk_dir: /var/cache/paddock
//! source:
//!   fetch_timeout_secs: 20
//!   data_dir: /srv/timing
//! pipeline:
//!   max_parallel_analyzers: 8
//!   analyzer_timeout_ms: 5000
//! logging:
//!   level: debug
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable overriding the log filter.
pub const ENV_LOG: &str = "PADDOCK_LOG";
/// Environment variable overriding `source.data_dir`.
pub const ENV_DATA_DIR: &str = "PADDOCK_DATA_DIR";
/// Environment variable overriding `cache.disk_dir`.
pub const ENV_CACHE_DIR: &str = "PADDOCK_CACHE_DIR";

/// Complete configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PaddockConfig {
    pub cache: CacheConfig,
    pub source: SourceConfig,
    pub pipeline: PipelineConfig,
    pub logging: LoggingConfig,
}

/// Session cache settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CacheConfig {
    /// Age after which a cached session is reloaded; unset keeps sessions forever
    pub ttl_secs: Option<u64>,

    /// Maximum number of sessions kept in memory; least recently used go first
    pub capacity: Option<usize>,

    /// Directory for the on-disk tier; unset disables it
    pub disk_dir: Option<PathBuf>,
}

impl CacheConfig {
    pub fn ttl(&self) -> Option<Duration> {
        self.ttl_secs.map(Duration::from_secs)
    }
}

/// Raw session source settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SourceConfig {
    /// Upper bound on one upstream fetch
    pub fetch_timeout_secs: u64,

    /// Root directory for the file source
    pub data_dir: Option<PathBuf>,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self { fetch_timeout_secs: 30, data_dir: None }
    }
}

impl SourceConfig {
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }
}

/// Analyzer execution settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    /// Run analyzers of one request concurrently
    pub parallel: bool,

    /// Concurrency limit when `parallel` is set
    pub max_parallel_analyzers: usize,

    /// Per-analyzer deadline; unset means no limit
    pub analyzer_timeout_ms: Option<u64>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self { parallel: true, max_parallel_analyzers: 4, analyzer_timeout_ms: None }
    }
}

impl PipelineConfig {
    pub fn analyzer_timeout(&self) -> Option<Duration> {
        self.analyzer_timeout_ms.map(Duration::from_millis)
    }

    /// Effective number of analyzers allowed to run at once.
    pub fn concurrency(&self) -> usize {
        if self.parallel { self.max_parallel_analyzers.max(1) } else { 1 }
    }
}

/// Log output settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingConfig {
    /// `EnvFilter` directive, e.g. `info` or `paddock=debug,warn`
    pub level: String,

    /// Emit JSON lines instead of human readable output
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string(), json: false }
    }
}

impl PaddockConfig {
    /// Parse and validate a YAML document. Environment overrides are not applied.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: Self = if yaml.trim().is_empty() {
            Self::default()
        } else {
            serde_yaml_ng::from_str(yaml).context("Failed to parse configuration YAML")?
        };
        config.validate()?;
        Ok(config)
    }

    /// Load a config file, apply environment overrides and validate.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Self = if yaml.trim().is_empty() {
            Self::default()
        } else {
            serde_yaml_ng::from_str(&yaml)
                .with_context(|| format!("Failed to parse config file {}", path.display()))?
        };

        let config = config.with_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Apply `PADDOCK_*` overrides from the process environment.
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(|name| std::env::var(name).ok())
    }

    /// Apply overrides from an arbitrary lookup; blank values are ignored.
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(level) = get(ENV_LOG) {
            self.logging.level = level;
        }
        if let Some(dir) = get(ENV_DATA_DIR) {
            self.source.data_dir = Some(PathBuf::from(dir));
        }
        if let Some(dir) = get(ENV_CACHE_DIR) {
            self.cache.disk_dir = Some(PathBuf::from(dir));
        }
        self
    }

    /// Validate configuration parameters
    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(
            self.source.fetch_timeout_secs > 0,
            "source.fetch_timeout_secs must be greater than zero"
        );
        anyhow::ensure!(
            self.cache.ttl_secs != Some(0),
            "cache.ttl_secs must be greater than zero when set"
        );
        anyhow::ensure!(
            self.cache.capacity.is_none_or(|c| c >= 1),
            "cache.capacity must be at least 1 when set"
        );
        anyhow::ensure!(
            self.pipeline.max_parallel_analyzers >= 1,
            "pipeline.max_parallel_analyzers must be at least 1"
        );
        anyhow::ensure!(
            self.pipeline.analyzer_timeout_ms != Some(0),
            "pipeline.analyzer_timeout_ms must be greater than zero when set"
        );
        anyhow::ensure!(!self.logging.level.trim().is_empty(), "logging.level cannot be empty");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn empty_document_gives_defaults() {
        let config = PaddockConfig::from_yaml_str("").unwrap();
        assert_eq!(config, PaddockConfig::default());
        assert_eq!(config.source.fetch_timeout(), Duration::from_secs(30));
        assert_eq!(config.pipeline.concurrency(), 4);
        assert_eq!(config.cache.ttl(), None);
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config = PaddockConfig::from_yaml_str(
            "cache:\n  ttl_secs: 600\n  capacity: 8\npipeline:\n  parallel: false\n",
        )
        .unwrap();
        assert_eq!(config.cache.ttl(), Some(Duration::from_secs(600)));
        assert_eq!(config.cache.capacity, Some(8));
        assert_eq!(config.pipeline.concurrency(), 1);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn unknown_fields_and_bad_values_are_rejected() {
        assert!(PaddockConfig::from_yaml_str("cache:\n  ttl: 5\n").is_err());
        assert!(PaddockConfig::from_yaml_str("source:\n  fetch_timeout_secs: 0\n").is_err());
        assert!(PaddockConfig::from_yaml_str("cache:\n  capacity: 0\n").is_err());
        assert!(PaddockConfig::from_yaml_str("pipeline:\n  max_parallel_analyzers: 0\n").is_err());
    }

    #[test]
    fn overrides_take_priority() {
        let env: HashMap<&str, &str> = [
            (ENV_LOG, "paddock=trace"),
            (ENV_DATA_DIR, "/srv/timing"),
            (ENV_CACHE_DIR, "  "),
        ]
        .into_iter()
        .collect();

        let config = PaddockConfig::default()
            .with_overrides(|name| env.get(name).map(|v| v.to_string()));
        assert_eq!(config.logging.level, "paddock=trace");
        assert_eq!(config.source.data_dir, Some(PathBuf::from("/srv/timing")));
        assert_eq!(config.cache.disk_dir, None);
    }

    #[test]
    fn reads_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("paddock.yaml");
        std::fs::write(&path, "source:\n  fetch_timeout_secs: 12\n").unwrap();

        let config = PaddockConfig::from_file(&path).unwrap();
        assert_eq!(config.source.fetch_timeout(), Duration::from_secs(12));

        let missing = PaddockConfig::from_file(dir.path().join("absent.yaml"));
        assert!(missing.unwrap_err().to_string().contains("absent.yaml"));
    }
}
