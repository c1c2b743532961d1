//! Weather summary, trends, grip estimate and lap time correlation

use serde::Serialize;
use std::time::Duration;

use super::{Analyzer, AnalyzerParams, AnalyzerPayload};
use crate::error::AnalyzerError;
use crate::model::{Session, WeatherSample};
use crate::stats::{self, round_to};

/// Slope per sample beyond which a channel counts as trending.
pub const TREND_THRESHOLD: f64 = 0.1;

/// Joined laps needed before correlations mean anything.
pub const MIN_CORRELATION_LAPS: usize = 6;

#[derive(Debug, Clone, Copy, Default)]
pub struct WeatherAnalytics;

#[derive(Debug, Serialize)]
struct Document {
    samples: usize,
    summary: Summary,
    trends: Trends,
    grip: Grip,
    joined_laps: usize,
    correlations: Option<Correlations>,
}

#[derive(Debug, Serialize)]
struct Range {
    min: f64,
    max: f64,
    avg: f64,
}

impl Range {
    fn of(values: &[f64]) -> Option<Self> {
        Some(Self {
            min: round_to(stats::min(values)?, 2),
            max: round_to(stats::max(values)?, 2),
            avg: round_to(stats::mean(values)?, 2),
        })
    }
}

#[derive(Debug, Serialize)]
struct Summary {
    air_temp: Option<Range>,
    track_temp: Option<Range>,
    humidity: Option<Range>,
    pressure: Option<Range>,
    wind_speed: Option<Range>,
    rainfall: bool,
    rain_periods: Vec<RainPeriod>,
}

#[derive(Debug, Serialize)]
struct RainPeriod {
    start_secs: f64,
    end_secs: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum Direction {
    Increasing,
    Decreasing,
    Stable,
}

#[derive(Debug, Serialize)]
struct Trend {
    slope: f64,
    direction: Direction,
}

#[derive(Debug, Serialize)]
struct Trends {
    air_temp: Option<Trend>,
    track_temp: Option<Trend>,
    humidity: Option<Trend>,
}

#[derive(Debug, Serialize)]
struct Grip {
    temperature_grip: &'static str,
    humidity_effect: &'static str,
    overall: &'static str,
}

#[derive(Debug, Serialize)]
struct Correlations {
    track_temp: Option<f64>,
    air_temp: Option<f64>,
    humidity: Option<f64>,
    wind_speed: Option<f64>,
}

fn trend(values: &[f64]) -> Option<Trend> {
    let fit = stats::trend(values)?;
    let direction = if fit.slope > TREND_THRESHOLD {
        Direction::Increasing
    } else if fit.slope < -TREND_THRESHOLD {
        Direction::Decreasing
    } else {
        Direction::Stable
    };
    Some(Trend { slope: round_to(fit.slope, 4), direction })
}

fn rain_periods(weather: &[WeatherSample]) -> Vec<RainPeriod> {
    let mut periods = Vec::new();
    let mut start: Option<Duration> = None;
    let mut last = Duration::ZERO;
    for sample in weather {
        match (sample.rainfall, start) {
            (true, None) => start = Some(sample.time),
            (false, Some(s)) => {
                periods.push(RainPeriod { start_secs: s.as_secs_f64(), end_secs: sample.time.as_secs_f64() });
                start = None;
            }
            _ => {}
        }
        last = sample.time;
    }
    if let Some(s) = start {
        periods.push(RainPeriod { start_secs: s.as_secs_f64(), end_secs: last.as_secs_f64() });
    }
    periods
}

/// Grip estimate from track temperature band and humidity.
fn grip(track_temp: f64, humidity: f64, raining: bool) -> Grip {
    let temperature_grip = if track_temp > 45.0 {
        "low"
    } else if track_temp > 35.0 {
        "medium-high"
    } else if track_temp > 25.0 {
        "high"
    } else {
        "medium"
    };
    let humidity_effect = if humidity > 80.0 {
        "reduced"
    } else if humidity < 40.0 {
        "enhanced"
    } else {
        "normal"
    };

    let overall = if raining {
        "very_low_wet"
    } else {
        match (temperature_grip, humidity_effect) {
            ("low", "reduced") => "very_low",
            ("low", "normal") => "low",
            ("low", _) => "medium_low",
            ("medium", "reduced") => "low",
            ("medium", "normal") => "medium",
            ("medium", _) => "medium_high",
            ("medium-high", "reduced") => "medium",
            ("medium-high", "normal") => "medium_high",
            ("medium-high", _) => "high",
            (_, "reduced") => "medium_high",
            (_, "normal") => "high",
            _ => "very_high",
        }
    };
    Grip { temperature_grip, humidity_effect, overall }
}

/// Valid laps joined with the latest weather reading taken before each lap started.
fn join<'s>(session: &'s Session, params: &AnalyzerParams) -> Result<Vec<(f64, &'s WeatherSample)>, AnalyzerError> {
    let mut joined = Vec::new();
    for driver in params.drivers(session)? {
        let laps: Vec<_> = super::valid_laps(session.laps_for(&driver.id)).collect();
        let Some(best) = laps.iter().map(|(_, secs)| *secs).min_by(f64::total_cmp) else {
            continue;
        };
        for (lap, secs) in laps {
            let Some(start) = lap.start_time else { continue };
            if let Some(weather) = session.weather_before(start) {
                joined.push((secs - best, weather));
            }
        }
    }
    Ok(joined)
}

impl Analyzer for WeatherAnalytics {
    fn name(&self) -> &'static str {
        "WeatherAnalytics"
    }

    fn description(&self) -> &'static str {
        "Weather summary and trends, grip estimate and weather to lap time correlation"
    }

    fn analyze(&self, session: &Session, params: &AnalyzerParams) -> Result<AnalyzerPayload, AnalyzerError> {
        let weather = &session.weather;
        if weather.is_empty() {
            return Err(AnalyzerError::insufficient(self.name(), "session has no weather samples"));
        }

        let air: Vec<f64> = weather.iter().map(|w| w.air_temp).collect();
        let track: Vec<f64> = weather.iter().map(|w| w.track_temp).collect();
        let humidity: Vec<f64> = weather.iter().map(|w| w.humidity).collect();
        let pressure: Vec<f64> = weather.iter().filter_map(|w| w.pressure).collect();
        let wind: Vec<f64> = weather.iter().map(|w| w.wind_speed).collect();
        let raining = weather.iter().any(|w| w.rainfall);

        let summary = Summary {
            air_temp: Range::of(&air),
            track_temp: Range::of(&track),
            humidity: Range::of(&humidity),
            pressure: Range::of(&pressure),
            wind_speed: Range::of(&wind),
            rainfall: raining,
            rain_periods: rain_periods(weather),
        };
        let trends = Trends { air_temp: trend(&air), track_temp: trend(&track), humidity: trend(&humidity) };
        let grip = grip(
            stats::mean(&track).unwrap_or_default(),
            stats::mean(&humidity).unwrap_or_default(),
            raining,
        );

        let joined = join(session, params)?;
        let mut notes = Vec::new();
        let correlations = if joined.len() < MIN_CORRELATION_LAPS {
            notes.push(format!(
                "{} laps joined with weather, {} needed for correlations",
                joined.len(),
                MIN_CORRELATION_LAPS
            ));
            None
        } else {
            let deltas: Vec<f64> = joined.iter().map(|(delta, _)| *delta).collect();
            let against = |channel: fn(&WeatherSample) -> f64| {
                let values: Vec<f64> = joined.iter().map(|(_, w)| channel(w)).collect();
                stats::pearson(&values, &deltas).map(|r| round_to(r, 3))
            };
            Some(Correlations {
                track_temp: against(|w| w.track_temp),
                air_temp: against(|w| w.air_temp),
                humidity: against(|w| w.humidity),
                wind_speed: against(|w| w.wind_speed),
            })
        };

        let document = Document {
            samples: weather.len(),
            summary,
            trends,
            grip,
            joined_laps: joined.len(),
            correlations,
        };
        AnalyzerPayload::from_document(&document, notes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{SessionKey, SessionType};
    use crate::test_utils::{bahrain_race, full_race};

    #[test]
    fn no_weather_is_insufficient() {
        let err = WeatherAnalytics.analyze(&bahrain_race().session(), &AnalyzerParams::default()).unwrap_err();
        assert!(matches!(err, AnalyzerError::InsufficientData { .. }));
    }

    #[test]
    fn full_race_summary_trends_and_correlations() {
        let session = full_race(SessionKey::new(2024, "monza", SessionType::Race), 10).session();
        let payload = WeatherAnalytics.analyze(&session, &AnalyzerParams::default()).unwrap();
        assert!(!payload.partial, "{:?}", payload.notes);

        let doc = &payload.document;
        assert_eq!(doc["summary"]["air_temp"]["min"], 26.0);
        assert_eq!(doc["summary"]["rainfall"], false);
        assert_eq!(doc["trends"]["air_temp"]["direction"], "stable");
        assert_eq!(doc["trends"]["track_temp"]["direction"], "decreasing");
        assert_eq!(doc["trends"]["humidity"]["direction"], "increasing");
        assert_eq!(doc["joined_laps"], 24);
        assert!(doc["correlations"]["track_temp"].is_number());
    }

    #[test]
    fn few_joined_laps_omit_correlations() {
        let session = full_race(SessionKey::new(2024, "monza", SessionType::Race), 4).session();
        let payload = WeatherAnalytics.analyze(&session, &AnalyzerParams::for_driver("VER")).unwrap();
        assert!(payload.partial);
        assert!(payload.document["correlations"].is_null());
    }

    #[test]
    fn grip_table() {
        assert_eq!(grip(50.0, 85.0, false).overall, "very_low");
        assert_eq!(grip(50.0, 30.0, false).overall, "medium_low");
        assert_eq!(grip(40.0, 60.0, false).overall, "medium_high");
        assert_eq!(grip(30.0, 60.0, false).overall, "high");
        assert_eq!(grip(30.0, 30.0, false).overall, "very_high");
        assert_eq!(grip(20.0, 60.0, false).overall, "medium");
        assert_eq!(grip(20.0, 90.0, false).overall, "low");
        assert_eq!(grip(30.0, 60.0, true).overall, "very_low_wet");
        assert_eq!(grip(40.0, 60.0, false).temperature_grip, "medium-high");
    }

    #[test]
    fn rain_periods_are_contiguous_runs() {
        let sample = |secs: u64, rain: bool| WeatherSample {
            time: Duration::from_secs(secs),
            air_temp: 18.0,
            track_temp: 22.0,
            humidity: 90.0,
            pressure: None,
            wind_speed: 3.0,
            wind_direction: None,
            rainfall: rain,
        };
        let weather = [sample(0, false), sample(60, true), sample(120, true), sample(180, false), sample(240, true)];
        let periods = rain_periods(&weather);
        assert_eq!(periods.len(), 2);
        assert_eq!((periods[0].start_secs, periods[0].end_secs), (60.0, 180.0));
        assert_eq!((periods[1].start_secs, periods[1].end_secs), (240.0, 240.0));
    }
}
