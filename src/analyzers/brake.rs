//! Braking zones, deceleration profile and braking consistency

use serde::Serialize;

use super::telemetry::{self, BrakingZone, ZONE_THRESHOLD};
use super::{Analyzer, AnalyzerParams, AnalyzerPayload};
use crate::error::AnalyzerError;
use crate::model::{Lap, Session};
use crate::stats::{self, round_to};

/// Upper edges of the deceleration histogram bins, in g; the last bin is open.
const DECEL_BINS_G: [f64; 5] = [1.0, 2.0, 3.0, 4.0, 5.0];

#[derive(Debug, Clone, Copy, Default)]
pub struct BrakeAnalysis;

#[derive(Debug, Serialize)]
struct Document {
    laps: Vec<LapBraking>,
    drivers: Vec<DriverBraking>,
    deceleration_profile: Vec<HistogramBin>,
}

#[derive(Debug, Serialize)]
struct LapBraking {
    driver: String,
    lap: u32,
    zone_count: usize,
    total_braking_secs: f64,
    peak_pressure: f64,
    zones: Vec<ZoneReport>,
}

#[derive(Debug, Serialize)]
struct ZoneReport {
    start_distance: f64,
    entry_speed: f64,
    min_speed: f64,
    duration: f64,
    peak_pressure: f64,
    deceleration_ms2: Option<f64>,
    deceleration_g: Option<f64>,
}

impl From<&BrakingZone> for ZoneReport {
    fn from(zone: &BrakingZone) -> Self {
        Self {
            start_distance: round_to(zone.start_distance, 1),
            entry_speed: round_to(zone.entry_speed, 1),
            min_speed: round_to(zone.min_speed, 1),
            duration: round_to(zone.duration, 3),
            peak_pressure: round_to(zone.peak_pressure, 1),
            deceleration_ms2: zone.deceleration.map(|d| round_to(d, 2)),
            deceleration_g: zone.deceleration_g().map(|g| round_to(g, 2)),
        }
    }
}

/// Session comparison entry.
#[derive(Debug, Serialize)]
struct DriverBraking {
    driver: String,
    laps: usize,
    zones_per_lap: f64,
    mean_deceleration_g: Option<f64>,
    max_deceleration_g: Option<f64>,
    consistency: Option<f64>,
}

#[derive(Debug, Serialize)]
struct HistogramBin {
    /// e.g. "1-2g" or "5g+"
    range: String,
    zones: usize,
}

fn histogram(decels_g: &[f64]) -> Vec<HistogramBin> {
    let mut counts = [0usize; DECEL_BINS_G.len() + 1];
    for g in decels_g {
        let bin = DECEL_BINS_G.iter().position(|edge| g < edge).unwrap_or(DECEL_BINS_G.len());
        counts[bin] += 1;
    }
    counts
        .iter()
        .enumerate()
        .map(|(i, zones)| {
            let lower = if i == 0 { 0.0 } else { DECEL_BINS_G[i - 1] };
            let range = match DECEL_BINS_G.get(i) {
                Some(upper) => format!("{}-{}g", lower, upper),
                None => format!("{}g+", lower),
            };
            HistogramBin { range, zones: *zones }
        })
        .collect()
}

fn selected_laps<'s>(
    session: &'s Session,
    params: &AnalyzerParams,
    driver: &str,
) -> Result<Vec<&'s Lap>, AnalyzerError> {
    Ok(match params.resolve_lap(session, driver)? {
        Some(lap) => vec![lap],
        None => session.laps_for(driver).iter().collect(),
    })
}

impl Analyzer for BrakeAnalysis {
    fn name(&self) -> &'static str {
        "BrakeAnalysis"
    }

    fn description(&self) -> &'static str {
        "Braking zones, deceleration profile and braking consistency by driver"
    }

    fn analyze(&self, session: &Session, params: &AnalyzerParams) -> Result<AnalyzerPayload, AnalyzerError> {
        let mut laps = Vec::new();
        let mut drivers = Vec::new();
        let mut all_decels = Vec::new();
        let mut notes = Vec::new();

        for driver in params.drivers(session)? {
            let traced: Vec<&Lap> =
                selected_laps(session, params, &driver.id)?.into_iter().filter(|l| l.has_telemetry()).collect();
            if traced.is_empty() {
                notes.push(format!("no telemetry for {}", driver.id));
                continue;
            }

            let mut driver_zones = Vec::new();
            for lap in &traced {
                let zones = telemetry::braking_zones(&lap.telemetry, ZONE_THRESHOLD);
                laps.push(LapBraking {
                    driver: driver.id.clone(),
                    lap: lap.number,
                    zone_count: zones.len(),
                    total_braking_secs: round_to(zones.iter().map(|z| z.duration).sum(), 3),
                    peak_pressure: zones.iter().map(|z| z.peak_pressure).fold(0.0, f64::max),
                    zones: zones.iter().map(ZoneReport::from).collect(),
                });
                driver_zones.extend(zones);
            }

            let decels: Vec<f64> = driver_zones.iter().filter_map(BrakingZone::deceleration_g).collect();
            all_decels.extend_from_slice(&decels);
            drivers.push(DriverBraking {
                driver: driver.id.clone(),
                laps: traced.len(),
                zones_per_lap: round_to(driver_zones.len() as f64 / traced.len() as f64, 2),
                mean_deceleration_g: stats::mean(&decels).map(|g| round_to(g, 2)),
                max_deceleration_g: stats::max(&decels).map(|g| round_to(g, 2)),
                consistency: telemetry::braking_consistency(&driver_zones).map(|c| round_to(c, 3)),
            });
        }

        if laps.is_empty() {
            return Err(AnalyzerError::insufficient(self.name(), "no brake telemetry for the selection"));
        }
        if laps.iter().all(|l| l.zone_count == 0) {
            return Err(AnalyzerError::insufficient(self.name(), "brake channel never exceeds the zone threshold"));
        }

        let document = Document { laps, drivers, deceleration_profile: histogram(&all_decels) };
        AnalyzerPayload::from_document(&document, notes)
    }
}
