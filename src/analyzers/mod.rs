//! Analyzers: independent metric computations over a loaded session
//!
//! Every analyzer implements [`Analyzer`]: it reads an immutable
//! [`Session`], takes the request's [`AnalyzerParams`] and produces an
//! [`AnalyzerPayload`] holding a JSON document. Analyzers keep no state between
//! calls, so one instance serves every request concurrently.
//!
//! Failure semantics are shared:
//! - [`AnalyzerError::InvalidParameters`] when a driver, lap, compound or stint
//!   selector does not resolve in this session
//! - [`AnalyzerError::InsufficientData`] when the session lacks what the metric
//!   needs, e.g. no telemetry for the selected driver
//!
//! Analyzers are looked up by name through the [`AnalyzerRegistry`].
//!
//! ```rust
//! use paddock::analyzers::AnalyzerRegistry;
//!
//! let registry = AnalyzerRegistry::with_defaults();
//! assert!(registry.get("stress-index").is_ok());
//! assert!(registry.get("nonexistent-metric").is_err());
//! ```

mod brake;
mod composite;
mod dominance;
mod downforce;
mod progression;
mod registry;
mod strategy;
mod stress;
pub(crate) mod telemetry;
mod tire;
mod weather;

pub use brake::BrakeAnalysis;
pub use composite::CompositePerformance;
pub use dominance::TrackDominance;
pub use downforce::DownforceAnalysis;
pub use progression::SessionProgression;
pub use registry::{AnalyzerRegistry, AnalyzerRegistryBuilder, RegistryError};
pub use strategy::RaceStrategy;
pub use stress::StressIndex;
pub use tire::TirePerformance;
pub use weather::WeatherAnalytics;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::error::AnalyzerError;
use crate::model::{Compound, Driver, Lap, Session};

/// A named, stateless metric computation.
pub trait Analyzer: Send + Sync + 'static {
    /// Registered name, e.g. `"TirePerformance"`.
    fn name(&self) -> &'static str;

    /// One-line description for listings.
    fn description(&self) -> &'static str;

    /// Compute the metric document.
    fn analyze(&self, session: &Session, params: &AnalyzerParams) -> Result<AnalyzerPayload, AnalyzerError>;
}

/// Request parameters shared by all analyzers; each reads the selectors it
/// understands and ignores the rest.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerParams {
    pub driver: Option<String>,
    pub lap: Option<u32>,
    pub compound: Option<Compound>,
    pub stint: Option<u32>,
    /// Time lost to a pit stop in seconds, for pit window estimates
    pub pit_loss: Option<f64>,
    /// Analyzer specific options
    pub extra: BTreeMap<String, Value>,
}

impl AnalyzerParams {
    pub fn for_driver(driver: impl Into<String>) -> Self {
        Self { driver: Some(driver.into()), ..Self::default() }
    }

    pub fn with_compound(mut self, compound: Compound) -> Self {
        self.compound = Some(compound);
        self
    }

    pub fn with_stint(mut self, stint: u32) -> Self {
        self.stint = Some(stint);
        self
    }

    pub fn with_lap(mut self, lap: u32) -> Self {
        self.lap = Some(lap);
        self
    }

    pub fn with_pit_loss(mut self, secs: f64) -> Self {
        self.pit_loss = Some(secs);
        self
    }

    /// The selected driver, `None` when no driver filter was given.
    pub fn resolve_driver<'s>(&self, session: &'s Session) -> Result<Option<&'s Driver>, AnalyzerError> {
        match self.driver.as_deref() {
            None => Ok(None),
            Some(id) => session.driver(id.trim()).map(Some).ok_or_else(|| {
                AnalyzerError::invalid_parameters(format!("driver '{}' did not take part in {}", id, session.key))
            }),
        }
    }

    /// The selected driver, or every driver in session order.
    pub fn drivers<'s>(&self, session: &'s Session) -> Result<Vec<&'s Driver>, AnalyzerError> {
        Ok(match self.resolve_driver(session)? {
            Some(driver) => vec![driver],
            None => session.drivers.iter().collect(),
        })
    }

    /// The selected lap of a driver, `None` when no lap filter was given.
    pub fn resolve_lap<'s>(&self, session: &'s Session, driver: &str) -> Result<Option<&'s Lap>, AnalyzerError> {
        match self.lap {
            None => Ok(None),
            Some(number) => session
                .laps_for(driver)
                .iter()
                .find(|lap| lap.number == number)
                .map(Some)
                .ok_or_else(|| {
                    AnalyzerError::invalid_parameters(format!("driver {} has no lap {}", driver, number))
                }),
        }
    }
}

/// Output of one analyzer run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyzerPayload {
    pub document: Value,
    /// Some of the requested scope could not be analyzed
    pub partial: bool,
    pub notes: Vec<String>,
}

impl AnalyzerPayload {
    pub fn complete(document: Value) -> Self {
        Self { document, partial: false, notes: Vec::new() }
    }

    /// Serialize a typed document; marked partial when any notes were raised.
    pub fn from_document<T: Serialize>(document: &T, notes: Vec<String>) -> Result<Self, AnalyzerError> {
        let document = serde_json::to_value(document)
            .map_err(|e| AnalyzerError::internal(format!("failed to encode document: {}", e)))?;
        Ok(Self { document, partial: !notes.is_empty(), notes })
    }
}

/// Valid, timed laps in order.
pub(crate) fn valid_laps(laps: &[Lap]) -> impl Iterator<Item = (&Lap, f64)> {
    laps.iter().filter(|lap| lap.is_valid()).filter_map(|lap| lap.seconds().map(|secs| (lap, secs)))
}

/// Fastest lap that carries telemetry, falling back to any lap with telemetry.
pub(crate) fn fastest_lap_with_telemetry(laps: &[Lap]) -> Option<&Lap> {
    valid_laps(laps)
        .filter(|(lap, _)| lap.has_telemetry())
        .min_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(lap, _)| lap)
        .or_else(|| {
            laps.iter()
                .filter(|lap| lap.has_telemetry())
                .min_by_key(|lap| lap.time.unwrap_or(std::time::Duration::MAX))
        })
}
