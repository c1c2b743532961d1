//! Runs requested analyzers against a cached session

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::assembler::ResponseAssembler;
use super::envelope::{AnalyzerResult, PipelineEnvelope};
use crate::analyzers::{Analyzer, AnalyzerParams, AnalyzerRegistry};
use crate::cache::SessionCache;
use crate::config::PipelineConfig;
use crate::error::AnalyzerError;
use crate::model::{Session, SessionKey};

/// The caller cancelled the request before the envelope was ready.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("Pipeline request cancelled")]
pub struct Cancelled;

/// Resolves a session through the cache and fans analyzers out over the
/// blocking pool.
///
/// One analyzer failing, panicking or timing out never affects the others:
/// each becomes a `Failed` entry in its request slot.
pub struct PipelineExecutor {
    cache: Arc<SessionCache>,
    registry: Arc<AnalyzerRegistry>,
    config: PipelineConfig,
}

impl std::fmt::Debug for PipelineExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineExecutor")
            .field("analyzers", &self.registry.len())
            .field("config", &self.config)
            .finish()
    }
}

impl PipelineExecutor {
    pub fn new(cache: Arc<SessionCache>, registry: Arc<AnalyzerRegistry>, config: PipelineConfig) -> Self {
        Self { cache, registry, config }
    }

    pub fn registry(&self) -> &Arc<AnalyzerRegistry> {
        &self.registry
    }

    pub fn cache(&self) -> &Arc<SessionCache> {
        &self.cache
    }

    /// Load `key` and run every named analyzer against it.
    ///
    /// Never fails as a whole: a session that cannot be loaded yields a
    /// `Failed` envelope carrying the session error.
    pub async fn run<S: AsRef<str>>(&self, key: &SessionKey, analyzers: &[S], params: &AnalyzerParams) -> PipelineEnvelope {
        let started = Instant::now();
        let names = dedup(analyzers);
        info!(key = %key, analyzers = names.len(), "Pipeline request");

        let session = match self.cache.get(key).await {
            Ok(session) => session,
            Err(e) => {
                warn!(key = %key, error = %e, "Session unavailable, failing request");
                return ResponseAssembler::assemble_failure(&key.canonical(), &e);
            }
        };

        let results = self.execute(&session, &names, params).await;
        let envelope = ResponseAssembler::assemble(&session.key, session.summary(), results);
        info!(
            key = %key,
            status = ?envelope.status,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Pipeline request complete"
        );
        envelope
    }

    /// [`run`](Self::run), abandoned when `cancel` fires.
    ///
    /// Queued analyzers are dropped with the request. A session load already
    /// in flight is owned by the cache and still completes for other callers.
    pub async fn run_with_cancel<S: AsRef<str>>(
        &self,
        key: &SessionKey,
        analyzers: &[S],
        params: &AnalyzerParams,
        cancel: CancellationToken,
    ) -> Result<PipelineEnvelope, Cancelled> {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!(key = %key, "Pipeline request cancelled");
                Err(Cancelled)
            }
            envelope = self.run(key, analyzers, params) => Ok(envelope),
        }
    }

    async fn execute(&self, session: &Arc<Session>, names: &[String], params: &AnalyzerParams) -> Vec<AnalyzerResult> {
        let mut slots: Vec<Option<AnalyzerResult>> = vec![None; names.len()];
        let permits = Arc::new(Semaphore::new(self.config.concurrency()));
        let timeout = self.config.analyzer_timeout();
        let params = Arc::new(params.clone());
        let mut tasks = JoinSet::new();

        for (slot, name) in names.iter().enumerate() {
            let analyzer = match self.registry.get(name) {
                Ok(analyzer) => analyzer,
                Err(e) => {
                    warn!(analyzer = %name, "Unknown analyzer requested");
                    slots[slot] = Some(AnalyzerResult::failed(name.as_str(), &e, Duration::ZERO));
                    continue;
                }
            };
            let name = name.clone();
            let session = Arc::clone(session);
            let params = Arc::clone(&params);
            let permits = Arc::clone(&permits);

            tasks.spawn(async move {
                let result = match permits.acquire_owned().await {
                    Ok(_permit) => run_one(analyzer, &name, session, params, timeout).await,
                    Err(_) => AnalyzerResult::failed(
                        name.as_str(),
                        &AnalyzerError::internal("analyzer pool closed"),
                        Duration::ZERO,
                    ),
                };
                (slot, result)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((slot, result)) => slots[slot] = Some(result),
                Err(e) => warn!(error = %e, "Analyzer task did not complete"),
            }
        }

        names
            .iter()
            .zip(slots)
            .map(|(name, slot)| {
                slot.unwrap_or_else(|| {
                    AnalyzerResult::failed(
                        name.as_str(),
                        &AnalyzerError::internal("analyzer task aborted"),
                        Duration::ZERO,
                    )
                })
            })
            .collect()
    }
}

/// Run one analyzer on the blocking pool, mapping panics and timeouts to
/// `Internal` failures.
async fn run_one(
    analyzer: Arc<dyn Analyzer>,
    name: &str,
    session: Arc<Session>,
    params: Arc<AnalyzerParams>,
    timeout: Option<Duration>,
) -> AnalyzerResult {
    let started = Instant::now();
    let handle = tokio::task::spawn_blocking(move || analyzer.analyze(&session, &params));

    let joined = match timeout {
        Some(limit) => match tokio::time::timeout(limit, handle).await {
            Ok(joined) => joined,
            Err(_) => {
                warn!(analyzer = name, timeout_ms = limit.as_millis() as u64, "Analyzer timed out");
                let error = AnalyzerError::internal(format!("timed out after {}ms", limit.as_millis()));
                return AnalyzerResult::failed(name, &error, started.elapsed());
            }
        },
        None => handle.await,
    };
    let elapsed = started.elapsed();

    let outcome = match joined {
        Ok(outcome) => outcome,
        Err(e) if e.is_panic() => {
            warn!(analyzer = name, "Analyzer panicked");
            Err(AnalyzerError::internal(format!("{} panicked", name)))
        }
        Err(e) => Err(AnalyzerError::internal(format!("{} was cancelled: {}", name, e))),
    };

    match &outcome {
        Ok(payload) => debug!(
            analyzer = name,
            partial = payload.partial,
            elapsed_ms = elapsed.as_millis() as u64,
            "Analyzer finished"
        ),
        Err(e) => warn!(analyzer = name, error = %e, "Analyzer failed"),
    }
    AnalyzerResult::from_outcome(name, outcome, elapsed)
}

/// Requested names with repeats removed, first occurrence kept. Names that
/// resolve to the same analyzer but are spelled differently stay separate.
fn dedup<S: AsRef<str>>(names: &[S]) -> Vec<String> {
    let mut seen = HashSet::new();
    names
        .iter()
        .map(|n| n.as_ref().trim().to_string())
        .filter(|n| seen.insert(n.clone()))
        .collect()
}
