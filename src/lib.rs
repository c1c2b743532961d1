//! Motorsport session data cache and analyzer pipeline.
//!
//! Paddock loads timing, telemetry and weather for a race weekend session from
//! a pluggable source, normalizes it into an immutable [`Session`], keeps it in
//! a single-flight cache and runs named analyzers against it concurrently.
//!
//! # Features
//!
//! - **Single-flight cache**: concurrent requests for one session share one load
//! - **Isolation**: a failing or panicking analyzer never affects the others
//! - **Pluggable sources**: implement [`RawSessionSource`] for any upstream
//! - **Structured results**: every request yields a serializable [`PipelineEnvelope`]
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use paddock::{AnalyzerParams, Paddock, PaddockConfig, SessionKey, SessionType};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = PaddockConfig::from_file("paddock.yaml")?;
//!     let paddock = Paddock::with_file_source(&config)?;
//!
//!     let key = SessionKey::new(2024, "Bahrain", SessionType::Race);
//!     let params = AnalyzerParams::for_driver("VER");
//!     let envelope = paddock.run(&key, &["TirePerformance", "RaceStrategy"], &params).await;
//!
//!     println!("{}", envelope.to_json()?);
//!     Ok(())
//! }
//! ```

// Core types and error handling
mod error;
pub mod model;
pub mod stats;
#[cfg_attr(any(test, feature = "benchmark"), path = "test_utils.rs")]
#[cfg(any(test, feature = "benchmark"))]
pub mod test_utils;

// Loading and caching
pub mod cache;
pub mod loader;
pub mod source;
pub mod sources;

// Analysis
pub mod analyzers;
pub mod pipeline;

// Runtime setup
pub mod config;
pub mod logging;

use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

// Core exports
pub use error::*;
pub use model::*;

// Main API exports
pub use analyzers::{Analyzer, AnalyzerParams, AnalyzerPayload, AnalyzerRegistry};
pub use cache::{CacheStats, SessionCache};
pub use config::PaddockConfig;
pub use loader::SessionLoader;
pub use pipeline::{Cancelled, EnvelopeStatus, PipelineEnvelope, PipelineExecutor};
pub use source::{RawSessionBundle, RawSessionSource};

/// Composition root wiring a source, the cache, the analyzer registry and
/// the pipeline together.
///
/// Cheap to share behind an `Arc`; every method takes `&self`.
///
/// ```rust
/// use std::sync::Arc;
/// use paddock::{Paddock, PaddockConfig};
/// use paddock::sources::MemorySource;
///
/// let paddock = Paddock::from_config(&PaddockConfig::default(), Arc::new(MemorySource::new()));
/// assert_eq!(paddock.registry().len(), 9);
/// assert!(paddock.cache().is_empty());
/// ```
#[derive(Debug)]
pub struct Paddock {
    executor: PipelineExecutor,
}

impl Paddock {
    /// Build with the built-in analyzers.
    pub fn from_config(config: &PaddockConfig, source: Arc<dyn RawSessionSource>) -> Self {
        Self::with_registry(config, source, AnalyzerRegistry::with_defaults())
    }

    /// Build with a caller-assembled registry.
    pub fn with_registry(
        config: &PaddockConfig,
        source: Arc<dyn RawSessionSource>,
        registry: AnalyzerRegistry,
    ) -> Self {
        info!(
            source = source.name(),
            analyzers = registry.len(),
            disk_tier = config.cache.disk_dir.is_some(),
            "Paddock starting"
        );
        let loader = SessionLoader::new(source).with_timeout(config.source.fetch_timeout());
        let cache = SessionCache::new(loader, &config.cache);
        let executor = PipelineExecutor::new(Arc::new(cache), Arc::new(registry), config.pipeline.clone());
        Self { executor }
    }

    /// Build over the JSON tree configured as `source.data_dir`.
    pub fn with_file_source(config: &PaddockConfig) -> anyhow::Result<Self> {
        let dir = config
            .source
            .data_dir
            .clone()
            .ok_or_else(|| anyhow::anyhow!("source.data_dir is not configured"))?;
        Ok(Self::from_config(config, Arc::new(sources::FileSource::new(dir))))
    }

    /// Run analyzers against a session; see [`PipelineExecutor::run`].
    pub async fn run<S: AsRef<str>>(
        &self,
        key: &SessionKey,
        analyzers: &[S],
        params: &AnalyzerParams,
    ) -> PipelineEnvelope {
        self.executor.run(key, analyzers, params).await
    }

    /// Run analyzers, giving up when `cancel` fires.
    pub async fn run_with_cancel<S: AsRef<str>>(
        &self,
        key: &SessionKey,
        analyzers: &[S],
        params: &AnalyzerParams,
        cancel: CancellationToken,
    ) -> std::result::Result<PipelineEnvelope, Cancelled> {
        self.executor.run_with_cancel(key, analyzers, params, cancel).await
    }

    /// Drop a session from every cache tier so the next request reloads it.
    pub async fn invalidate(&self, key: &SessionKey) -> bool {
        self.executor.cache().invalidate(key).await
    }

    pub fn cache(&self) -> &SessionCache {
        self.executor.cache()
    }

    pub fn registry(&self) -> &AnalyzerRegistry {
        self.executor.registry()
    }
}
