//! Tyre degradation and pit window estimation per stint

use serde::Serialize;

use super::{Analyzer, AnalyzerParams, AnalyzerPayload};
use crate::error::AnalyzerError;
use crate::model::{Compound, Lap, Session, Stint};
use crate::stats::{self, round_to};

/// Time lost to a pit stop when the request does not say otherwise.
pub const DEFAULT_PIT_LOSS_SECS: f64 = 22.0;

/// Fewest valid laps a stint needs for a degradation fit.
pub const MIN_STINT_LAPS: usize = 3;

/// Laps either side of the optimal stop included in the window.
const WINDOW_HALF_WIDTH: u32 = 2;

/// Spread of lap-to-lap deltas below which a stint has no cliff to find.
const CLIFF_NOISE_FLOOR: f64 = 0.001;

/// Longest run of further laps a pit window is projected over.
const MAX_WINDOW_HORIZON: u32 = 200;

/// Lap time vs tyre age regression for each selected stint.
#[derive(Debug, Clone, Copy, Default)]
pub struct TirePerformance;

#[derive(Debug, Serialize)]
struct Document {
    pit_loss_secs: f64,
    stints: Vec<StintDegradation>,
    skipped: Vec<SkippedStint>,
}

#[derive(Debug, Serialize)]
struct StintDegradation {
    driver: String,
    stint: u32,
    compound: Compound,
    start_lap: u32,
    end_lap: u32,
    valid_laps: usize,
    /// Seconds per lap of tyre age
    degradation_per_lap: f64,
    intercept: f64,
    r_squared: f64,
    total_degradation: f64,
    average_lap: f64,
    best_lap: f64,
    cliff_lap: Option<u32>,
    pit_window: Option<PitWindow>,
}

#[derive(Debug, Serialize)]
struct PitWindow {
    optimal_tyre_age: u32,
    optimal_lap: u32,
    earliest_lap: u32,
    latest_lap: u32,
}

#[derive(Debug, Serialize)]
struct SkippedStint {
    driver: String,
    stint: u32,
    reason: String,
}

impl TirePerformance {
    fn select<'s>(session: &'s Session, params: &AnalyzerParams) -> Result<Vec<&'s Stint>, AnalyzerError> {
        let drivers = params.drivers(session)?;
        let selected: Vec<&Stint> = drivers
            .iter()
            .flat_map(|d| session.stints_for(&d.id))
            .filter(|s| params.compound.is_none_or(|c| s.compound == c))
            .filter(|s| params.stint.is_none_or(|n| s.number == n))
            .collect();

        if selected.is_empty() {
            let mut selector = Vec::new();
            if let Some(driver) = &params.driver {
                selector.push(format!("driver {}", driver));
            }
            if let Some(compound) = params.compound {
                selector.push(format!("compound {}", compound));
            }
            if let Some(stint) = params.stint {
                selector.push(format!("stint {}", stint));
            }
            let selector = if selector.is_empty() { "this session".to_string() } else { selector.join(", ") };
            return Err(AnalyzerError::invalid_parameters(format!("no stint matches {}", selector)));
        }
        Ok(selected)
    }

    fn analyze_stint(stint: &Stint, laps: &[Lap], pit_loss: f64) -> Result<StintDegradation, String> {
        let valid: Vec<(&Lap, f64)> =
            super::valid_laps(laps).filter(|(lap, _)| stint.contains(lap.number)).collect();
        if valid.len() < MIN_STINT_LAPS {
            return Err(format!(
                "{} valid laps, at least {} needed",
                valid.len(),
                MIN_STINT_LAPS
            ));
        }

        let ages: Vec<f64> = valid.iter().map(|(lap, _)| lap.tyre_age as f64).collect();
        let times: Vec<f64> = valid.iter().map(|(_, secs)| *secs).collect();
        let fit = stats::linear_regression(&ages, &times)
            .ok_or_else(|| "tyre age does not vary across the stint".to_string())?;

        let age_span = stats::max(&ages).unwrap_or_default() - stats::min(&ages).unwrap_or_default();

        Ok(StintDegradation {
            driver: stint.driver.clone(),
            stint: stint.number,
            compound: stint.compound,
            start_lap: stint.start_lap,
            end_lap: stint.end_lap,
            valid_laps: valid.len(),
            degradation_per_lap: round_to(fit.slope, 4),
            intercept: round_to(fit.intercept, 3),
            r_squared: round_to(fit.r_squared, 3),
            total_degradation: round_to(fit.slope * age_span, 3),
            average_lap: round_to(stats::mean(&times).unwrap_or_default(), 3),
            best_lap: round_to(stats::min(&times).unwrap_or_default(), 3),
            cliff_lap: cliff_lap(&valid),
            pit_window: pit_window(fit.slope, pit_loss, stint, valid[0].0),
        })
    }
}

/// First lap whose lap-to-lap loss exceeds the mean delta by two standard deviations.
fn cliff_lap(valid: &[(&Lap, f64)]) -> Option<u32> {
    let deltas: Vec<f64> = valid.windows(2).map(|w| w[1].1 - w[0].1).collect();
    let mean = stats::mean(&deltas)?;
    let sd = stats::std_dev(&deltas)?;
    if sd < CLIFF_NOISE_FLOOR {
        return None;
    }
    deltas.iter().position(|d| *d > mean + 2.0 * sd).map(|i| valid[i + 1].0.number)
}

/// Tyre age at which accumulated degradation outweighs the cost of a stop.
///
/// Loss after `k` more laps is `slope * k(k+1)/2`; the optimal stop is the
/// smallest `k` where that reaches `pit_loss`.
fn pit_window(slope: f64, pit_loss: f64, stint: &Stint, first: &Lap) -> Option<PitWindow> {
    if slope <= 0.0 || pit_loss <= 0.0 {
        return None;
    }
    let k = ((-1.0 + (1.0 + 8.0 * pit_loss / slope).sqrt()) / 2.0).ceil().max(1.0);
    if k > MAX_WINDOW_HORIZON as f64 {
        return None;
    }
    let k = k as u32;
    let optimal_tyre_age = first.tyre_age.saturating_add(k);
    let optimal_lap = first.number.saturating_add(k);
    Some(PitWindow {
        optimal_tyre_age,
        optimal_lap,
        earliest_lap: optimal_lap.saturating_sub(WINDOW_HALF_WIDTH).max(stint.start_lap),
        latest_lap: optimal_lap.saturating_add(WINDOW_HALF_WIDTH),
    })
}

impl Analyzer for TirePerformance {
    fn name(&self) -> &'static str {
        "TirePerformance"
    }

    fn description(&self) -> &'static str {
        "Per-stint tyre degradation slope, performance cliff and optimal pit window"
    }

    fn analyze(&self, session: &Session, params: &AnalyzerParams) -> Result<AnalyzerPayload, AnalyzerError> {
        let pit_loss = params.pit_loss.unwrap_or(DEFAULT_PIT_LOSS_SECS);
        if !pit_loss.is_finite() || pit_loss < 0.0 {
            return Err(AnalyzerError::invalid_parameters(format!("invalid pit loss {}", pit_loss)));
        }

        let mut stints = Vec::new();
        let mut skipped = Vec::new();
        for stint in Self::select(session, params)? {
            match Self::analyze_stint(stint, session.laps_for(&stint.driver), pit_loss) {
                Ok(result) => stints.push(result),
                Err(reason) => skipped.push(SkippedStint { driver: stint.driver.clone(), stint: stint.number, reason }),
            }
        }

        if stints.is_empty() {
            return Err(AnalyzerError::insufficient(
                self.name(),
                format!("no selected stint has at least {} valid laps", MIN_STINT_LAPS),
            ));
        }

        let notes = skipped
            .iter()
            .map(|s| format!("stint {} of {} skipped: {}", s.stint, s.driver, s.reason))
            .collect();
        AnalyzerPayload::from_document(&Document { pit_loss_secs: pit_loss, stints, skipped }, notes)
    }
}
