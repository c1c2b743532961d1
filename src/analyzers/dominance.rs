//! Who owns which part of the lap: sector and mini-segment dominance

use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

use super::{Analyzer, AnalyzerParams, AnalyzerPayload};
use crate::error::AnalyzerError;
use crate::model::{Lap, Session, TelemetrySample};
use crate::stats::round_to;

pub const DEFAULT_SEGMENTS: usize = 10;
const MAX_SEGMENTS: usize = 50;

#[derive(Debug, Clone, Copy, Default)]
pub struct TrackDominance;

#[derive(Debug, Serialize)]
struct Document {
    drivers: Vec<DriverSectors>,
    sector_best: Vec<SectorBest>,
    segments: Vec<SegmentWinner>,
    /// Share of sector and segment wins per driver, summing to 100
    dominance: BTreeMap<String, f64>,
}

#[derive(Debug, Serialize)]
struct DriverSectors {
    driver: String,
    lap: u32,
    lap_time: f64,
    sectors: [Option<f64>; 3],
}

#[derive(Debug, Serialize)]
struct SectorBest {
    sector: usize,
    driver: String,
    time: f64,
}

#[derive(Debug, Serialize)]
struct SegmentWinner {
    segment: usize,
    start_distance: f64,
    end_distance: f64,
    driver: String,
    time: f64,
}

/// Session time at which the trace passes `distance`, linearly interpolated.
fn time_at(samples: &[TelemetrySample], distance: f64) -> Option<f64> {
    let idx = samples.partition_point(|s| s.distance < distance);
    if idx == 0 {
        return samples.first().filter(|s| s.distance >= distance).map(|s| s.time.as_secs_f64());
    }
    let after = samples.get(idx)?;
    let before = &samples[idx - 1];
    let span = after.distance - before.distance;
    let t0 = before.time.as_secs_f64();
    let t1 = after.time.as_secs_f64();
    if span <= 0.0 {
        return Some(t1);
    }
    Some(t0 + (t1 - t0) * (distance - before.distance) / span)
}

fn segment_count(params: &AnalyzerParams) -> Result<usize, AnalyzerError> {
    match params.extra.get("segments") {
        None => Ok(DEFAULT_SEGMENTS),
        Some(Value::Number(n)) => match n.as_u64() {
            Some(count) if (1..=MAX_SEGMENTS as u64).contains(&count) => Ok(count as usize),
            _ => Err(AnalyzerError::invalid_parameters(format!("segments must be 1 to {}, got {}", MAX_SEGMENTS, n))),
        },
        Some(other) => Err(AnalyzerError::invalid_parameters(format!("segments must be a number, got {}", other))),
    }
}

fn fastest_valid(laps: &[Lap]) -> Option<(&Lap, f64)> {
    super::valid_laps(laps).min_by(|a, b| a.1.total_cmp(&b.1))
}

fn segment_winners<'a>(traces: &[(&'a str, &'a [TelemetrySample])], segments: usize) -> Vec<SegmentWinner> {
    let length = traces
        .iter()
        .filter_map(|(_, samples)| samples.last().map(|s| s.distance))
        .min_by(f64::total_cmp)
        .unwrap_or_default();
    if length <= 0.0 {
        return Vec::new();
    }
    let width = length / segments as f64;

    (0..segments)
        .filter_map(|i| {
            let start = i as f64 * width;
            let end = if i + 1 == segments { length } else { start + width };
            traces
                .iter()
                .filter_map(|(driver, samples)| {
                    let elapsed = time_at(samples, end)? - time_at(samples, start)?;
                    (elapsed > 0.0).then_some((*driver, elapsed))
                })
                .min_by(|a, b| a.1.total_cmp(&b.1))
                .map(|(driver, time)| SegmentWinner {
                    segment: i + 1,
                    start_distance: round_to(start, 1),
                    end_distance: round_to(end, 1),
                    driver: driver.to_string(),
                    time: round_to(time, 3),
                })
        })
        .collect()
}

impl Analyzer for TrackDominance {
    fn name(&self) -> &'static str {
        "TrackDominance"
    }

    fn description(&self) -> &'static str {
        "Fastest driver per sector and per track segment, with overall dominance share"
    }

    fn analyze(&self, session: &Session, params: &AnalyzerParams) -> Result<AnalyzerPayload, AnalyzerError> {
        let segments = segment_count(params)?;
        let mut notes = Vec::new();

        let mut drivers = Vec::new();
        let mut traces = Vec::new();
        for driver in params.drivers(session)? {
            let laps = session.laps_for(&driver.id);
            if let Some((lap, secs)) = fastest_valid(laps) {
                drivers.push(DriverSectors {
                    driver: driver.id.clone(),
                    lap: lap.number,
                    lap_time: round_to(secs, 3),
                    sectors: [1, 2, 3].map(|s| lap.sectors.get(s).map(|d| round_to(d.as_secs_f64(), 3))),
                });
            }
            match super::fastest_lap_with_telemetry(laps) {
                Some(lap) => traces.push((driver.id.as_str(), lap.telemetry.as_slice())),
                None => notes.push(format!("no telemetry for {}, excluded from segments", driver.id)),
            }
        }

        let sector_best: Vec<SectorBest> = (0..3)
            .filter_map(|i| {
                drivers
                    .iter()
                    .filter_map(|d| d.sectors[i].map(|t| (d, t)))
                    .min_by(|a, b| a.1.total_cmp(&b.1))
                    .map(|(d, time)| SectorBest { sector: i + 1, driver: d.driver.clone(), time })
            })
            .collect();
        let segments = segment_winners(&traces, segments);

        if sector_best.is_empty() && segments.is_empty() {
            return Err(AnalyzerError::insufficient(self.name(), "no sector times or telemetry for the selection"));
        }

        let mut points: BTreeMap<String, f64> = BTreeMap::new();
        for winner in sector_best.iter().map(|s| &s.driver).chain(segments.iter().map(|s| &s.driver)) {
            *points.entry(winner.clone()).or_default() += 1.0;
        }
        let total: f64 = points.values().sum();
        let dominance = points.into_iter().map(|(driver, p)| (driver, round_to(p / total * 100.0, 1))).collect();

        AnalyzerPayload::from_document(&Document { drivers, sector_best, segments, dominance }, notes)
    }
}
