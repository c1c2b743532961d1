//! Name to analyzer mapping, fixed after startup

use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

use super::{
    Analyzer, BrakeAnalysis, CompositePerformance, DownforceAnalysis, RaceStrategy, SessionProgression,
    StressIndex, TirePerformance, TrackDominance, WeatherAnalytics,
};
use crate::error::AnalyzerError;

/// Errors raised while building a registry.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Analyzer '{name}' is already registered")]
    Duplicate { name: String },

    #[error("Analyzer name must not be empty")]
    EmptyName,
}

/// Lookup key: lowercase with `-`, `_` and whitespace removed, so
/// "stress-index", "stress_index" and "StressIndex" are one name.
fn normalize(name: &str) -> String {
    name.chars()
        .filter(|c| !c.is_whitespace() && *c != '-' && *c != '_')
        .flat_map(char::to_lowercase)
        .collect()
}

/// Builder for [`AnalyzerRegistry`]; registration is append-only.
#[derive(Default)]
pub struct AnalyzerRegistryBuilder {
    analyzers: Vec<Arc<dyn Analyzer>>,
    index: HashMap<String, usize>,
}

impl AnalyzerRegistryBuilder {
    /// Register an analyzer under its own name.
    pub fn register<A: Analyzer>(self, analyzer: A) -> Result<Self, RegistryError> {
        self.register_shared(Arc::new(analyzer))
    }

    pub fn register_shared(mut self, analyzer: Arc<dyn Analyzer>) -> Result<Self, RegistryError> {
        let key = normalize(analyzer.name());
        if key.is_empty() {
            return Err(RegistryError::EmptyName);
        }
        if self.index.contains_key(&key) {
            return Err(RegistryError::Duplicate { name: analyzer.name().to_string() });
        }
        self.index.insert(key, self.analyzers.len());
        self.analyzers.push(analyzer);
        Ok(self)
    }

    /// Add every built-in analyzer whose name is not taken yet.
    pub fn with_defaults(mut self) -> Self {
        for analyzer in builtins() {
            let key = normalize(analyzer.name());
            if self.index.contains_key(&key) {
                debug!(analyzer = analyzer.name(), "Built-in analyzer overridden");
                continue;
            }
            self.index.insert(key, self.analyzers.len());
            self.analyzers.push(analyzer);
        }
        self
    }

    pub fn build(self) -> AnalyzerRegistry {
        AnalyzerRegistry { analyzers: self.analyzers, index: self.index }
    }
}

fn builtins() -> Vec<Arc<dyn Analyzer>> {
    vec![
        Arc::new(TirePerformance),
        Arc::new(RaceStrategy),
        Arc::new(WeatherAnalytics),
        Arc::new(StressIndex),
        Arc::new(BrakeAnalysis),
        Arc::new(DownforceAnalysis),
        Arc::new(CompositePerformance),
        Arc::new(TrackDominance),
        Arc::new(SessionProgression),
    ]
}

/// Immutable set of analyzers available to the pipeline.
pub struct AnalyzerRegistry {
    analyzers: Vec<Arc<dyn Analyzer>>,
    index: HashMap<String, usize>,
}

impl std::fmt::Debug for AnalyzerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnalyzerRegistry").field("analyzers", &self.names()).finish()
    }
}

impl AnalyzerRegistry {
    pub fn builder() -> AnalyzerRegistryBuilder {
        AnalyzerRegistryBuilder::default()
    }

    /// Registry holding every built-in analyzer.
    pub fn with_defaults() -> Self {
        Self::builder().with_defaults().build()
    }

    /// Resolve a requested name.
    pub fn get(&self, name: &str) -> Result<Arc<dyn Analyzer>, AnalyzerError> {
        self.index
            .get(&normalize(name))
            .map(|&i| Arc::clone(&self.analyzers[i]))
            .ok_or_else(|| AnalyzerError::unknown(name))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(&normalize(name))
    }

    /// Registered names in registration order.
    pub fn names(&self) -> Vec<&'static str> {
        self.analyzers.iter().map(|a| a.name()).collect()
    }

    /// `(name, description)` pairs in registration order.
    pub fn describe(&self) -> Vec<(&'static str, &'static str)> {
        self.analyzers.iter().map(|a| (a.name(), a.description())).collect()
    }

    pub fn len(&self) -> usize {
        self.analyzers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.analyzers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzers::{AnalyzerParams, AnalyzerPayload};
    use crate::model::Session;

    struct Fixed(&'static str);

    impl Analyzer for Fixed {
        fn name(&self) -> &'static str {
            self.0
        }

        fn description(&self) -> &'static str {
            "fixed document"
        }

        fn analyze(&self, _: &Session, _: &AnalyzerParams) -> Result<AnalyzerPayload, AnalyzerError> {
            Ok(AnalyzerPayload::complete(serde_json::json!({"source": "custom"})))
        }
    }

    #[test]
    fn defaults_are_registered_in_order() {
        let registry = AnalyzerRegistry::with_defaults();
        assert_eq!(
            registry.names(),
            vec![
                "TirePerformance",
                "RaceStrategy",
                "WeatherAnalytics",
                "StressIndex",
                "BrakeAnalysis",
                "DownforceAnalysis",
                "CompositePerformance",
                "TrackDominance",
                "SessionProgression",
            ]
        );
        assert!(registry.describe().iter().all(|(_, d)| !d.is_empty()));
    }

    #[test]
    fn lookup_ignores_case_and_separators() {
        let registry = AnalyzerRegistry::with_defaults();
        for name in ["StressIndex", "stress-index", "STRESS_INDEX", "stress index"] {
            assert_eq!(registry.get(name).unwrap().name(), "StressIndex", "{}", name);
        }
        let err = registry.get("nonexistent-metric").err().unwrap();
        assert_eq!(err, AnalyzerError::unknown("nonexistent-metric"));
    }

    #[test]
    fn duplicates_are_rejected() {
        let err = AnalyzerRegistry::builder()
            .register(Fixed("Lap-Chart"))
            .and_then(|b| b.register(Fixed("lap_chart")))
            .err()
            .unwrap();
        assert_eq!(err, RegistryError::Duplicate { name: "lap_chart".to_string() });
        assert_eq!(AnalyzerRegistry::builder().register(Fixed("--")).err(), Some(RegistryError::EmptyName));
    }

    #[test]
    fn custom_analyzers_take_precedence_over_builtins() {
        let registry = AnalyzerRegistry::builder().register(Fixed("RaceStrategy")).unwrap().with_defaults().build();
        assert_eq!(registry.len(), 9);
        assert_eq!(registry.get("race-strategy").unwrap().description(), "fixed document");
    }
}
