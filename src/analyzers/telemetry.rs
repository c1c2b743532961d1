//! Telemetry trace helpers shared by the car-behaviour analyzers

use serde::Serialize;

use crate::model::TelemetrySample;
use crate::stats;

/// Standard gravity, for expressing deceleration in g.
pub const G: f64 = 9.80665;

/// Brake pressure above which a sample counts as part of a braking zone.
pub const ZONE_THRESHOLD: f64 = 10.0;

/// Brake pressure above which a sample counts toward a braking event.
pub const EVENT_THRESHOLD: f64 = 20.0;

/// Throttle position treated as flat out.
pub const FULL_THROTTLE: f64 = 98.0;

/// One contiguous stretch of braking.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BrakingZone {
    pub start_distance: f64,
    pub end_distance: f64,
    pub entry_speed: f64,
    pub min_speed: f64,
    /// Seconds from first braking sample to last
    pub duration: f64,
    pub peak_pressure: f64,
    /// Mean deceleration from entry to minimum speed, m/s²
    pub deceleration: Option<f64>,
}

impl BrakingZone {
    pub fn deceleration_g(&self) -> Option<f64> {
        self.deceleration.map(|d| d / G)
    }
}

/// Split a trace into braking zones: runs of samples with brake above `threshold`.
pub fn braking_zones(samples: &[TelemetrySample], threshold: f64) -> Vec<BrakingZone> {
    let mut zones = Vec::new();
    let mut start = None;

    for (i, sample) in samples.iter().enumerate() {
        match (sample.braking_above(threshold), start) {
            (true, None) => start = Some(i),
            (false, Some(s)) => {
                zones.push(zone(&samples[s..i]));
                start = None;
            }
            _ => {}
        }
    }
    if let Some(s) = start {
        zones.push(zone(&samples[s..]));
    }
    zones
}

fn zone(run: &[TelemetrySample]) -> BrakingZone {
    let first = run[0];
    let last = run[run.len() - 1];
    let (min_index, min_sample) = run
        .iter()
        .enumerate()
        .min_by(|a, b| a.1.speed.total_cmp(&b.1.speed))
        .map(|(i, s)| (i, *s))
        .unwrap_or((0, first));

    let to_min = (min_sample.time.saturating_sub(first.time)).as_secs_f64();
    let deceleration = (min_index > 0 && to_min > 0.0)
        .then(|| (first.speed - min_sample.speed) / 3.6 / to_min)
        .filter(|d| *d >= 0.0);

    BrakingZone {
        start_distance: first.distance,
        end_distance: last.distance,
        entry_speed: first.speed,
        min_speed: min_sample.speed,
        duration: last.time.saturating_sub(first.time).as_secs_f64(),
        peak_pressure: run.iter().map(|s| s.brake).fold(0.0, f64::max),
        deceleration,
    }
}

/// Number of separate brake applications above `threshold`.
pub fn braking_events(samples: &[TelemetrySample], threshold: f64) -> usize {
    let mut events = 0;
    let mut braking = false;
    for sample in samples {
        let now = sample.braking_above(threshold);
        if now && !braking {
            events += 1;
        }
        braking = now;
    }
    events
}

/// Share of lap time spent at full throttle, 0-1.
pub fn full_throttle_fraction(samples: &[TelemetrySample]) -> Option<f64> {
    if samples.len() < 2 {
        return None;
    }
    let mut flat = 0.0;
    let mut total = 0.0;
    for pair in samples.windows(2) {
        let dt = pair[1].time.saturating_sub(pair[0].time).as_secs_f64();
        total += dt;
        if pair[0].throttle >= FULL_THROTTLE {
            flat += dt;
        }
    }
    (total > 0.0).then(|| flat / total)
}

/// Local speed minima below `ceiling` km/h: the apex speeds of slow and
/// medium corners.
pub fn corner_minima(samples: &[TelemetrySample], ceiling: f64) -> Vec<f64> {
    samples
        .windows(3)
        .filter(|w| w[1].speed < ceiling && w[1].speed <= w[0].speed && w[1].speed < w[2].speed)
        .map(|w| w[1].speed)
        .collect()
}

pub fn top_speed(samples: &[TelemetrySample]) -> Option<f64> {
    samples.iter().map(|s| s.speed).max_by(f64::total_cmp)
}

pub fn throttle_variance(samples: &[TelemetrySample]) -> Option<f64> {
    let throttle: Vec<f64> = samples.iter().map(|s| s.throttle).collect();
    stats::variance(&throttle)
}

/// Braking consistency across zones: `1 - CV` of zone peak pressures, 0-1.
pub fn braking_consistency(zones: &[BrakingZone]) -> Option<f64> {
    if zones.len() < 2 {
        return None;
    }
    let peaks: Vec<f64> = zones.iter().map(|z| z.peak_pressure).collect();
    stats::coefficient_of_variation(&peaks).map(|cv| (1.0 - cv).clamp(0.0, 1.0))
}
