//! Pace evolution over the session clock

use serde::Serialize;
use std::time::Duration;

use super::{Analyzer, AnalyzerParams, AnalyzerPayload};
use crate::error::AnalyzerError;
use crate::model::{Lap, Session};
use crate::stats::{self, round_to};

pub const TIME_SEGMENTS: usize = 4;

#[derive(Debug, Clone, Copy, Default)]
pub struct SessionProgression;

#[derive(Debug, Serialize)]
struct Document {
    segments: Vec<Segment>,
    overall: Option<Improvement>,
}

#[derive(Debug, Serialize)]
struct Segment {
    segment: usize,
    start_secs: f64,
    end_secs: f64,
    laps: usize,
    valid_laps: usize,
    mean_lap: Option<f64>,
    best_lap: Option<f64>,
    /// Change in lap time per lap within the segment; negative is improving
    improvement_rate: Option<f64>,
}

#[derive(Debug, Serialize)]
struct Improvement {
    /// First segment mean minus last segment mean; positive is faster
    seconds: f64,
    percent: f64,
}

fn segment_index(start: Duration, first: Duration, width: f64) -> usize {
    if width <= 0.0 {
        return 0;
    }
    let offset = start.saturating_sub(first).as_secs_f64();
    ((offset / width) as usize).min(TIME_SEGMENTS - 1)
}

impl Analyzer for SessionProgression {
    fn name(&self) -> &'static str {
        "SessionProgression"
    }

    fn description(&self) -> &'static str {
        "Lap time evolution across four equal slices of the session clock"
    }

    fn analyze(&self, session: &Session, params: &AnalyzerParams) -> Result<AnalyzerPayload, AnalyzerError> {
        let mut laps: Vec<(&Lap, Duration)> = Vec::new();
        for driver in params.drivers(session)? {
            laps.extend(session.laps_for(&driver.id).iter().filter_map(|l| l.start_time.map(|t| (l, t))));
        }
        let (Some(first), Some(last)) = (laps.iter().map(|(_, t)| *t).min(), laps.iter().map(|(_, t)| *t).max())
        else {
            return Err(AnalyzerError::insufficient(self.name(), "no laps with a recorded start time"));
        };
        laps.sort_by_key(|(lap, t)| (*t, lap.number));

        let width = last.saturating_sub(first).as_secs_f64() / TIME_SEGMENTS as f64;
        let mut buckets: Vec<Vec<&Lap>> = vec![Vec::new(); TIME_SEGMENTS];
        for (lap, start) in &laps {
            buckets[segment_index(*start, first, width)].push(lap);
        }

        let segments: Vec<Segment> = buckets
            .iter()
            .enumerate()
            .map(|(i, bucket)| {
                let times: Vec<f64> =
                    bucket.iter().filter(|l| l.is_valid()).filter_map(|l| l.seconds()).collect();
                let start = first.as_secs_f64() + i as f64 * width;
                Segment {
                    segment: i + 1,
                    start_secs: round_to(start, 1),
                    end_secs: round_to(start + width, 1),
                    laps: bucket.len(),
                    valid_laps: times.len(),
                    mean_lap: stats::mean(&times).map(|m| round_to(m, 3)),
                    best_lap: stats::min(&times).map(|m| round_to(m, 3)),
                    improvement_rate: stats::trend(&times).map(|fit| round_to(fit.slope, 4)),
                }
            })
            .collect();

        let populated: Vec<f64> = segments.iter().filter_map(|s| s.mean_lap).collect();
        let mut notes = Vec::new();
        let overall = match (populated.first(), populated.last()) {
            (Some(early), Some(late)) if populated.len() >= 2 => Some(Improvement {
                seconds: round_to(early - late, 3),
                percent: round_to((early - late) / early * 100.0, 3),
            }),
            _ => {
                notes.push("fewer than two segments hold valid laps".to_string());
                None
            }
        };

        AnalyzerPayload::from_document(&Document { segments, overall }, notes)
    }
}
