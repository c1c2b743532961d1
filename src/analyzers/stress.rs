//! Driver stress index from braking, throttle and lap time variability

use serde::Serialize;

use super::telemetry::{self, EVENT_THRESHOLD, ZONE_THRESHOLD};
use super::{Analyzer, AnalyzerParams, AnalyzerPayload};
use crate::error::AnalyzerError;
use crate::model::{Compound, Lap, Session, Stint};
use crate::stats::{self, round_to};

/// Braking events per lap treated as maximal.
const REF_EVENTS_PER_LAP: f64 = 15.0;
/// Largest possible variance of a 0-100 channel.
const REF_THROTTLE_VARIANCE: f64 = 2_500.0;
/// Lap time CV treated as maximal.
const REF_LAP_CV: f64 = 0.05;

const W_BRAKING: f64 = 0.30;
const W_PRESSURE: f64 = 0.25;
const W_THROTTLE: f64 = 0.20;
const W_VARIABILITY: f64 = 0.25;

/// 0-100 score combining how hard and how often a driver works the car.
#[derive(Debug, Clone, Copy, Default)]
pub struct StressIndex;

#[derive(Debug, Serialize)]
struct Document {
    drivers: Vec<DriverStress>,
    ranking: Vec<String>,
}

#[derive(Debug, Serialize)]
struct DriverStress {
    driver: String,
    stints: Vec<StintStress>,
    mean_score: f64,
}

#[derive(Debug, Serialize)]
struct StintStress {
    stint: u32,
    compound: Compound,
    laps_with_telemetry: usize,
    braking_events_per_lap: f64,
    mean_peak_pressure: f64,
    throttle_variance: f64,
    lap_time_cv: Option<f64>,
    components: Components,
    score: f64,
}

#[derive(Debug, Serialize)]
struct Components {
    braking: f64,
    pressure: f64,
    throttle: f64,
    variability: f64,
}

impl Components {
    fn score(&self) -> f64 {
        100.0
            * (W_BRAKING * self.braking
                + W_PRESSURE * self.pressure
                + W_THROTTLE * self.throttle
                + W_VARIABILITY * self.variability)
    }
}

fn unit(value: f64, reference: f64) -> f64 {
    (value / reference).clamp(0.0, 1.0)
}

fn stint_stress(stint: &Stint, laps: &[Lap]) -> Option<StintStress> {
    let in_stint: Vec<&Lap> = laps.iter().filter(|l| stint.contains(l.number)).collect();
    let traced: Vec<&Lap> = in_stint.iter().copied().filter(|l| l.has_telemetry()).collect();
    if traced.is_empty() {
        return None;
    }

    let events: Vec<f64> = traced
        .iter()
        .map(|l| telemetry::braking_events(&l.telemetry, EVENT_THRESHOLD) as f64)
        .collect();
    let peaks: Vec<f64> = traced
        .iter()
        .flat_map(|l| telemetry::braking_zones(&l.telemetry, ZONE_THRESHOLD))
        .map(|z| z.peak_pressure)
        .collect();
    let variances: Vec<f64> = traced.iter().filter_map(|l| telemetry::throttle_variance(&l.telemetry)).collect();
    let times: Vec<f64> = in_stint.iter().filter(|l| l.is_valid()).filter_map(|l| l.seconds()).collect();

    let braking_events_per_lap = stats::mean(&events).unwrap_or_default();
    let mean_peak_pressure = stats::mean(&peaks).unwrap_or_default();
    let throttle_variance = stats::mean(&variances).unwrap_or_default();
    let lap_time_cv = if times.len() >= 2 { stats::coefficient_of_variation(&times) } else { None };

    let components = Components {
        braking: unit(braking_events_per_lap, REF_EVENTS_PER_LAP),
        pressure: unit(mean_peak_pressure, 100.0),
        throttle: unit(throttle_variance, REF_THROTTLE_VARIANCE),
        variability: unit(lap_time_cv.unwrap_or_default(), REF_LAP_CV),
    };
    let score = round_to(components.score(), 1);

    Some(StintStress {
        stint: stint.number,
        compound: stint.compound,
        laps_with_telemetry: traced.len(),
        braking_events_per_lap: round_to(braking_events_per_lap, 2),
        mean_peak_pressure: round_to(mean_peak_pressure, 1),
        throttle_variance: round_to(throttle_variance, 1),
        lap_time_cv: lap_time_cv.map(|cv| round_to(cv, 4)),
        components: Components {
            braking: round_to(components.braking, 3),
            pressure: round_to(components.pressure, 3),
            throttle: round_to(components.throttle, 3),
            variability: round_to(components.variability, 3),
        },
        score,
    })
}

impl Analyzer for StressIndex {
    fn name(&self) -> &'static str {
        "StressIndex"
    }

    fn description(&self) -> &'static str {
        "Per-stint driver stress score from braking load, throttle variance and lap time spread"
    }

    fn analyze(&self, session: &Session, params: &AnalyzerParams) -> Result<AnalyzerPayload, AnalyzerError> {
        let mut drivers = Vec::new();
        let mut notes = Vec::new();
        for driver in params.drivers(session)? {
            let laps = session.laps_for(&driver.id);
            let stints: Vec<StintStress> = session
                .stints_for(&driver.id)
                .iter()
                .filter(|s| params.stint.is_none_or(|n| s.number == n))
                .filter_map(|s| stint_stress(s, laps))
                .collect();
            if stints.is_empty() {
                notes.push(format!("no telemetry for {}", driver.id));
                continue;
            }
            let scores: Vec<f64> = stints.iter().map(|s| s.score).collect();
            let mean_score = round_to(stats::mean(&scores).unwrap_or_default(), 1);
            drivers.push(DriverStress { driver: driver.id.clone(), stints, mean_score });
        }

        if drivers.is_empty() {
            return Err(AnalyzerError::insufficient(self.name(), "no telemetry for the selected drivers"));
        }

        let mut order: Vec<&DriverStress> = drivers.iter().collect();
        order.sort_by(|a, b| b.mean_score.total_cmp(&a.mean_score).then(a.driver.cmp(&b.driver)));
        let ranking = order.iter().map(|d| d.driver.clone()).collect();

        AnalyzerPayload::from_document(&Document { drivers, ranking }, notes)
    }
}
