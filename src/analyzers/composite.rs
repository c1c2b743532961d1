//! Weighted multi-dimension driver performance score

use serde::Serialize;

use super::telemetry::{self, ZONE_THRESHOLD};
use super::{Analyzer, AnalyzerParams, AnalyzerPayload};
use crate::error::AnalyzerError;
use crate::model::{Lap, Session};
use crate::stats::{self, round_to};

const W_PACE: f64 = 0.30;
const W_CONSISTENCY: f64 = 0.25;
const W_TECHNICAL: f64 = 0.25;
const W_ADAPTATION: f64 = 0.20;

/// Pace points lost per percent of gap to the session best.
const PACE_POINTS_PER_PERCENT: f64 = 20.0;

/// Full-throttle share that earns the whole throttle half of the technical score.
const REFERENCE_FULL_THROTTLE: f64 = 0.7;

/// Valid laps needed to compare early and late session pace.
pub const MIN_ADAPTATION_LAPS: usize = 6;

#[derive(Debug, Clone, Copy, Default)]
pub struct CompositePerformance;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum Rating {
    Excellent,
    VeryGood,
    Good,
    Average,
    Fair,
    NeedsImprovement,
}

impl Rating {
    fn from_score(score: f64) -> Self {
        if score >= 90.0 {
            Rating::Excellent
        } else if score >= 80.0 {
            Rating::VeryGood
        } else if score >= 70.0 {
            Rating::Good
        } else if score >= 60.0 {
            Rating::Average
        } else if score >= 50.0 {
            Rating::Fair
        } else {
            Rating::NeedsImprovement
        }
    }

    fn score(self) -> f64 {
        match self {
            Rating::Excellent => 95.0,
            Rating::VeryGood => 85.0,
            Rating::Good => 75.0,
            Rating::Average => 65.0,
            Rating::Fair => 55.0,
            Rating::NeedsImprovement => 45.0,
        }
    }

    /// Consistency bands on the lap time coefficient of variation.
    fn from_cv(cv: f64) -> Self {
        if cv < 0.01 {
            Rating::Excellent
        } else if cv < 0.02 {
            Rating::Good
        } else if cv < 0.04 {
            Rating::Average
        } else {
            Rating::NeedsImprovement
        }
    }
}

#[derive(Debug, Serialize)]
struct Document {
    session_best: f64,
    drivers: Vec<DriverComposite>,
    ranking: Vec<RankEntry>,
    competitiveness_index: Option<f64>,
}

#[derive(Debug, Serialize)]
struct DriverComposite {
    driver: String,
    team: String,
    valid_laps: usize,
    fastest_lap: f64,
    average_lap: f64,
    gap_to_best_pct: f64,
    lap_time_cv: Option<f64>,
    consistency_rating: Option<Rating>,
    scores: ComponentScores,
    overall_score: f64,
    rating: Rating,
}

#[derive(Debug, Default, Serialize)]
struct ComponentScores {
    pace: f64,
    consistency: Option<f64>,
    technical: Option<f64>,
    adaptation: Option<f64>,
}

impl ComponentScores {
    /// Weighted mean over the components present.
    fn overall(&self) -> f64 {
        let parts = [
            (Some(self.pace), W_PACE),
            (self.consistency, W_CONSISTENCY),
            (self.technical, W_TECHNICAL),
            (self.adaptation, W_ADAPTATION),
        ];
        let (sum, weight) = parts
            .iter()
            .filter_map(|(score, w)| score.map(|s| (s * w, *w)))
            .fold((0.0, 0.0), |acc, (s, w)| (acc.0 + s, acc.1 + w));
        if weight > 0.0 { sum / weight } else { 0.0 }
    }
}

#[derive(Debug, Serialize)]
struct RankEntry {
    position: usize,
    driver: String,
    overall_score: f64,
}

fn pace_score(gap_pct: f64) -> f64 {
    (100.0 - gap_pct * PACE_POINTS_PER_PERCENT).clamp(0.0, 100.0)
}

fn technical_score(laps: &[Lap]) -> Option<f64> {
    let lap = super::fastest_lap_with_telemetry(laps)?;
    let full_throttle = telemetry::full_throttle_fraction(&lap.telemetry)?;
    let zones = telemetry::braking_zones(&lap.telemetry, ZONE_THRESHOLD);
    let braking = telemetry::braking_consistency(&zones)?;
    Some(100.0 * (0.5 * (full_throttle / REFERENCE_FULL_THROTTLE).min(1.0) + 0.5 * braking))
}

/// Early third against late third of the valid laps; positive when the driver got faster.
fn adaptation_score(times: &[f64]) -> Option<f64> {
    if times.len() < MIN_ADAPTATION_LAPS {
        return None;
    }
    let third = times.len() / 3;
    let early = stats::mean(&times[..third])?;
    let late = stats::mean(&times[times.len() - third..])?;
    Some((50.0 + 10.0 * (early - late)).clamp(0.0, 100.0))
}

/// `max(0, 1 - CV)` of the overall scores, as a percentage.
fn competitiveness(scores: &[f64]) -> Option<f64> {
    if scores.len() < 2 {
        return None;
    }
    stats::coefficient_of_variation(scores).map(|cv| (1.0 - cv).max(0.0) * 100.0)
}

impl Analyzer for CompositePerformance {
    fn name(&self) -> &'static str {
        "CompositePerformance"
    }

    fn description(&self) -> &'static str {
        "Weighted pace, consistency, technical and adaptation score with a field ranking"
    }

    fn analyze(&self, session: &Session, params: &AnalyzerParams) -> Result<AnalyzerPayload, AnalyzerError> {
        let session_best = session
            .best_lap_seconds()
            .ok_or_else(|| AnalyzerError::insufficient(self.name(), "session has no valid timed laps"))?;

        let mut drivers = Vec::new();
        let mut notes = Vec::new();
        for driver in params.drivers(session)? {
            let laps = session.laps_for(&driver.id);
            let times: Vec<f64> = super::valid_laps(laps).map(|(_, secs)| secs).collect();
            let (Some(fastest), Some(average)) = (stats::min(&times), stats::mean(&times)) else {
                notes.push(format!("no valid laps for {}", driver.id));
                continue;
            };

            let gap_pct = (fastest - session_best) / session_best * 100.0;
            let lap_time_cv = if times.len() >= 2 { stats::coefficient_of_variation(&times) } else { None };
            let consistency_rating = lap_time_cv.map(Rating::from_cv);

            let scores = ComponentScores {
                pace: pace_score(gap_pct),
                consistency: consistency_rating.map(Rating::score),
                technical: technical_score(laps),
                adaptation: adaptation_score(&times),
            };
            if scores.technical.is_none() {
                notes.push(format!("technical score omitted for {}: no usable telemetry", driver.id));
            }
            let overall = scores.overall();

            drivers.push(DriverComposite {
                driver: driver.id.clone(),
                team: driver.team.clone(),
                valid_laps: times.len(),
                fastest_lap: round_to(fastest, 3),
                average_lap: round_to(average, 3),
                gap_to_best_pct: round_to(gap_pct, 3),
                lap_time_cv: lap_time_cv.map(|cv| round_to(cv, 4)),
                consistency_rating,
                scores: ComponentScores {
                    pace: round_to(scores.pace, 1),
                    consistency: scores.consistency,
                    technical: scores.technical.map(|s| round_to(s, 1)),
                    adaptation: scores.adaptation.map(|s| round_to(s, 1)),
                },
                overall_score: round_to(overall, 1),
                rating: Rating::from_score(overall),
            });
        }

        if drivers.is_empty() {
            return Err(AnalyzerError::insufficient(self.name(), "no valid laps for the selected drivers"));
        }

        let mut order: Vec<&DriverComposite> = drivers.iter().collect();
        order.sort_by(|a, b| b.overall_score.total_cmp(&a.overall_score).then(a.driver.cmp(&b.driver)));
        let ranking = order
            .iter()
            .enumerate()
            .map(|(i, d)| RankEntry { position: i + 1, driver: d.driver.clone(), overall_score: d.overall_score })
            .collect();
        let scores: Vec<f64> = drivers.iter().map(|d| d.overall_score).collect();

        let document = Document {
            session_best: round_to(session_best, 3),
            drivers,
            ranking,
            competitiveness_index: competitiveness(&scores).map(|c| round_to(c, 1)),
        };
        AnalyzerPayload::from_document(&document, notes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{SessionKey, SessionType};
    use crate::test_utils::{SessionFixture, bahrain_race, full_race};

    #[test]
    fn rating_bands() {
        assert_eq!(Rating::from_score(90.0), Rating::Excellent);
        assert_eq!(Rating::from_score(89.9), Rating::VeryGood);
        assert_eq!(Rating::from_score(70.0), Rating::Good);
        assert_eq!(Rating::from_score(49.9), Rating::NeedsImprovement);
        assert_eq!(Rating::from_cv(0.005), Rating::Excellent);
        assert_eq!(Rating::from_cv(0.03), Rating::Average);
        assert_eq!(Rating::from_cv(0.05).score(), 45.0);
    }

    #[test]
    fn missing_components_renormalize_weights() {
        let pace_only = ComponentScores { pace: 80.0, ..ComponentScores::default() };
        assert!((pace_only.overall() - 80.0).abs() < 1e-9);

        let two = ComponentScores { pace: 100.0, consistency: Some(50.0), technical: None, adaptation: None };
        let expected = (100.0 * 0.30 + 50.0 * 0.25) / 0.55;
        assert!((two.overall() - expected).abs() < 1e-9);
    }

    #[test]
    fn adaptation_needs_six_laps() {
        assert_eq!(adaptation_score(&[90.0; 5]), None);
        let improving = [91.0, 91.0, 90.5, 90.5, 90.0, 90.0];
        assert_eq!(adaptation_score(&improving), Some(60.0));
        assert_eq!(adaptation_score(&[80.0, 80.0, 80.0, 80.0, 95.0, 95.0]), Some(0.0));
    }

    #[test]
    fn full_race_ranking_follows_pace() {
        let session = full_race(SessionKey::new(2024, "monza", SessionType::Race), 12).session();
        let payload = CompositePerformance.analyze(&session, &AnalyzerParams::default()).unwrap();
        assert!(!payload.partial, "{:?}", payload.notes);

        let doc = &payload.document;
        assert_eq!(doc["ranking"][0]["driver"], "VER");
        assert_eq!(doc["drivers"][0]["scores"]["pace"], 100.0);
        assert!(doc["drivers"][0]["scores"]["technical"].is_number());
        assert!(doc["drivers"][0]["scores"]["adaptation"].is_number());
        let index = doc["competitiveness_index"].as_f64().unwrap();
        assert!(index > 0.0 && index <= 100.0);
    }

    #[test]
    fn technical_is_omitted_without_telemetry() {
        let fixture = SessionFixture::new(SessionKey::new(2024, "hungaroring", SessionType::Practice2))
            .driver("RUS", "Mercedes")
            .lap("RUS", 1, 79.8, "MEDIUM", 1)
            .lap("RUS", 2, 79.6, "MEDIUM", 2);
        let payload = CompositePerformance.analyze(&fixture.session(), &AnalyzerParams::default()).unwrap();
        assert!(payload.partial);
        assert!(payload.document["drivers"][0]["scores"]["technical"].is_null());
        assert!(payload.document["competitiveness_index"].is_null());
    }

    #[test]
    fn bahrain_single_valid_lap() {
        let payload = CompositePerformance.analyze(&bahrain_race().session(), &AnalyzerParams::default()).unwrap();
        let ver = &payload.document["drivers"][0];
        assert_eq!(ver["valid_laps"], 1);
        assert!(ver["consistency_rating"].is_null());
        assert_eq!(ver["rating"], "excellent");
    }
}
