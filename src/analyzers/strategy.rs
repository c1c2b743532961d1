//! Pit stop reconstruction and strategy comparison

use serde::Serialize;
use std::collections::BTreeMap;

use super::{Analyzer, AnalyzerParams, AnalyzerPayload};
use crate::error::AnalyzerError;
use crate::model::{Compound, Lap, Session};
use crate::stats::{self, round_to};

/// Pit stop sequence per driver and a comparison by time lost in the pit lane.
#[derive(Debug, Clone, Copy, Default)]
pub struct RaceStrategy;

#[derive(Debug, Serialize)]
struct Document {
    drivers: Vec<DriverStrategy>,
    /// Drivers ordered by total time lost, least first
    ranking: Vec<RankEntry>,
    most_common_stops: Option<usize>,
}

#[derive(Debug, Serialize)]
struct DriverStrategy {
    driver: String,
    team: String,
    laps: usize,
    stops: Vec<PitStop>,
    stints: Vec<StintSummary>,
    total_time_lost: f64,
}

#[derive(Debug, Serialize)]
struct PitStop {
    /// The in-lap
    lap: u32,
    /// Pit entry to pit exit, when both were recorded
    pit_lane_secs: Option<f64>,
    /// In-lap plus out-lap time over two median racing laps
    lap_time_lost: Option<f64>,
    compound_before: Compound,
    compound_after: Option<Compound>,
}

#[derive(Debug, Serialize)]
struct StintSummary {
    stint: u32,
    compound: Compound,
    start_lap: u32,
    end_lap: u32,
    laps: u32,
}

#[derive(Debug, Serialize)]
struct RankEntry {
    position: usize,
    driver: String,
    stops: usize,
    total_time_lost: f64,
}

fn pit_stops(laps: &[Lap]) -> Vec<PitStop> {
    let times: Vec<f64> = super::valid_laps(laps).map(|(_, secs)| secs).collect();
    let median = stats::percentile(&times, 50.0);

    laps.iter()
        .enumerate()
        .filter_map(|(i, lap)| lap.pit_in.map(|entry| (i, lap, entry)))
        .map(|(i, lap, entry)| {
            let next = laps.get(i + 1).filter(|n| Some(n.number) == lap.number.checked_add(1));
            let pit_lane_secs = next
                .and_then(|n| n.pit_out)
                .and_then(|exit| exit.checked_sub(entry))
                .map(|d| round_to(d.as_secs_f64(), 3));
            let lap_time_lost = match (median, lap.seconds(), next.and_then(Lap::seconds)) {
                (Some(median), Some(in_lap), Some(out_lap)) => Some(round_to(in_lap + out_lap - 2.0 * median, 3)),
                _ => None,
            };
            PitStop {
                lap: lap.number,
                pit_lane_secs,
                lap_time_lost,
                compound_before: lap.compound,
                compound_after: next.map(|n| n.compound),
            }
        })
        .collect()
}

/// Most frequent stop count; ties go to the fewer stops.
fn most_common(counts: impl Iterator<Item = usize>) -> Option<usize> {
    let mut tally: BTreeMap<usize, usize> = BTreeMap::new();
    for count in counts {
        *tally.entry(count).or_default() += 1;
    }
    tally.into_iter().max_by(|a, b| a.1.cmp(&b.1).then(b.0.cmp(&a.0))).map(|(stops, _)| stops)
}

impl Analyzer for RaceStrategy {
    fn name(&self) -> &'static str {
        "RaceStrategy"
    }

    fn description(&self) -> &'static str {
        "Pit stop sequence, stints and time lost per driver, ranked across the field"
    }

    fn analyze(&self, session: &Session, params: &AnalyzerParams) -> Result<AnalyzerPayload, AnalyzerError> {
        let mut drivers = Vec::new();
        for driver in params.drivers(session)? {
            let laps = session.laps_for(&driver.id);
            if laps.is_empty() {
                continue;
            }
            let stops = pit_stops(laps);
            let total_time_lost = round_to(stops.iter().filter_map(|s| s.pit_lane_secs).sum(), 3);
            let stints = session
                .stints_for(&driver.id)
                .iter()
                .map(|s| StintSummary {
                    stint: s.number,
                    compound: s.compound,
                    start_lap: s.start_lap,
                    end_lap: s.end_lap,
                    laps: s.lap_count,
                })
                .collect();
            drivers.push(DriverStrategy {
                driver: driver.id.clone(),
                team: driver.team.clone(),
                laps: laps.len(),
                stops,
                stints,
                total_time_lost,
            });
        }

        if drivers.is_empty() {
            return Err(AnalyzerError::insufficient(self.name(), "no laps recorded for the selected drivers"));
        }

        let mut order: Vec<&DriverStrategy> = drivers.iter().collect();
        order.sort_by(|a, b| a.total_time_lost.total_cmp(&b.total_time_lost).then(a.driver.cmp(&b.driver)));
        let ranking = order
            .iter()
            .enumerate()
            .map(|(i, d)| RankEntry {
                position: i + 1,
                driver: d.driver.clone(),
                stops: d.stops.len(),
                total_time_lost: d.total_time_lost,
            })
            .collect();

        let notes = drivers
            .iter()
            .flat_map(|d| {
                d.stops
                    .iter()
                    .filter(|s| s.pit_lane_secs.is_none())
                    .map(move |s| format!("pit lane time for {} lap {} was not recorded", d.driver, s.lap))
            })
            .collect();

        let most_common_stops = most_common(drivers.iter().map(|d| d.stops.len()));
        AnalyzerPayload::from_document(&Document { drivers, ranking, most_common_stops }, notes)
    }
}
