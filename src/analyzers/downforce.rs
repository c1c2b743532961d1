//! Aerodynamic setup inferred from corner and straight-line speed

use serde::Serialize;
use std::collections::BTreeMap;

use super::telemetry;
use super::{Analyzer, AnalyzerParams, AnalyzerPayload};
use crate::error::AnalyzerError;
use crate::model::Session;
use crate::stats::{self, round_to};

/// Speed below which a local minimum counts as a corner apex, km/h.
pub const CORNER_SPEED_CEILING: f64 = 200.0;

const HIGH_DOWNFORCE_RATIO: f64 = 0.45;
const MEDIUM_DOWNFORCE_RATIO: f64 = 0.38;

#[derive(Debug, Clone, Copy, Default)]
pub struct DownforceAnalysis;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum Level {
    High,
    Medium,
    Low,
}

fn classify(efficiency: f64) -> Level {
    if efficiency >= HIGH_DOWNFORCE_RATIO {
        Level::High
    } else if efficiency >= MEDIUM_DOWNFORCE_RATIO {
        Level::Medium
    } else {
        Level::Low
    }
}

#[derive(Debug, Serialize)]
struct Document {
    drivers: Vec<DriverDownforce>,
    teams: Vec<TeamDownforce>,
}

#[derive(Debug, Serialize)]
struct DriverDownforce {
    driver: String,
    team: String,
    lap: u32,
    top_speed: f64,
    corners: usize,
    mean_corner_speed: f64,
    full_throttle_fraction: Option<f64>,
    /// Mean corner speed over top speed
    efficiency: f64,
    level: Level,
}

#[derive(Debug, Serialize)]
struct TeamDownforce {
    team: String,
    drivers: usize,
    mean_efficiency: f64,
    mean_top_speed: f64,
    level: Level,
}

impl Analyzer for DownforceAnalysis {
    fn name(&self) -> &'static str {
        "DownforceAnalysis"
    }

    fn description(&self) -> &'static str {
        "Downforce level inferred from corner speed, top speed and full throttle share"
    }

    fn analyze(&self, session: &Session, params: &AnalyzerParams) -> Result<AnalyzerPayload, AnalyzerError> {
        let mut drivers = Vec::new();
        let mut notes = Vec::new();

        for driver in params.drivers(session)? {
            let Some(lap) = super::fastest_lap_with_telemetry(session.laps_for(&driver.id)) else {
                notes.push(format!("no telemetry for {}", driver.id));
                continue;
            };
            let samples = &lap.telemetry;
            let Some(top_speed) = telemetry::top_speed(samples).filter(|s| *s > 0.0) else {
                notes.push(format!("speed channel empty for {} lap {}", driver.id, lap.number));
                continue;
            };
            let minima = telemetry::corner_minima(samples, CORNER_SPEED_CEILING);
            let Some(mean_corner_speed) = stats::mean(&minima) else {
                notes.push(format!("no corners below {} km/h for {}", CORNER_SPEED_CEILING, driver.id));
                continue;
            };

            let efficiency = mean_corner_speed / top_speed;
            drivers.push(DriverDownforce {
                driver: driver.id.clone(),
                team: driver.team.clone(),
                lap: lap.number,
                top_speed: round_to(top_speed, 1),
                corners: minima.len(),
                mean_corner_speed: round_to(mean_corner_speed, 1),
                full_throttle_fraction: telemetry::full_throttle_fraction(samples).map(|f| round_to(f, 3)),
                efficiency: round_to(efficiency, 4),
                level: classify(efficiency),
            });
        }

        if drivers.is_empty() {
            return Err(AnalyzerError::insufficient(self.name(), "no usable speed telemetry for the selection"));
        }

        let mut by_team: BTreeMap<&str, Vec<&DriverDownforce>> = BTreeMap::new();
        for d in &drivers {
            by_team.entry(d.team.as_str()).or_default().push(d);
        }
        let teams = by_team
            .into_iter()
            .map(|(team, members)| {
                let eff: Vec<f64> = members.iter().map(|d| d.efficiency).collect();
                let top: Vec<f64> = members.iter().map(|d| d.top_speed).collect();
                let mean_efficiency = stats::mean(&eff).unwrap_or_default();
                TeamDownforce {
                    team: team.to_string(),
                    drivers: members.len(),
                    mean_efficiency: round_to(mean_efficiency, 4),
                    mean_top_speed: round_to(stats::mean(&top).unwrap_or_default(), 1),
                    level: classify(mean_efficiency),
                }
            })
            .collect();

        AnalyzerPayload::from_document(&Document { drivers, teams }, notes)
    }
}
