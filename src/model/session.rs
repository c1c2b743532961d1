//! The normalized session entity shared by every analyzer

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

use super::key::SessionKey;
use super::lap::{Compound, Lap};
use crate::stats;

/// A session participant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Driver {
    /// Stable identifier: three-letter code or car number
    pub id: String,
    pub number: Option<u32>,
    pub name: String,
    pub team: String,
}

/// A contiguous run of laps by one driver on one set of tyres.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stint {
    pub driver: String,
    /// 1-based stint number for this driver
    pub number: u32,
    pub start_lap: u32,
    pub end_lap: u32,
    pub compound: Compound,
    pub lap_count: u32,
    /// Seconds of lap time lost per lap of tyre age across valid laps
    pub degradation: Option<f64>,
}

impl Stint {
    /// Whether a lap number falls within this stint.
    pub fn contains(&self, lap: u32) -> bool {
        (self.start_lap..=self.end_lap).contains(&lap)
    }

    /// Group one driver's ordered laps into stints.
    ///
    /// A stint ends on a compound change or after an in-lap, so a pit stop
    /// onto the same compound still opens a new stint.
    pub fn derive(driver: &str, laps: &[Lap]) -> Vec<Stint> {
        let mut stints = Vec::new();
        let mut current: Vec<&Lap> = Vec::new();

        for lap in laps {
            let boundary = current
                .last()
                .map(|prev| prev.compound != lap.compound || prev.is_in_lap())
                .unwrap_or(false);
            if boundary {
                stints.push(Self::from_laps(driver, stints.len() as u32 + 1, &current));
                current.clear();
            }
            current.push(lap);
        }
        if !current.is_empty() {
            stints.push(Self::from_laps(driver, stints.len() as u32 + 1, &current));
        }
        stints
    }

    fn from_laps(driver: &str, number: u32, laps: &[&Lap]) -> Stint {
        let (ages, times): (Vec<f64>, Vec<f64>) = laps
            .iter()
            .filter(|lap| lap.is_valid())
            .filter_map(|lap| lap.seconds().map(|secs| (lap.tyre_age as f64, secs)))
            .unzip();

        let degradation = stats::linear_regression(&ages, &times).map(|fit| fit.slope);

        Stint {
            driver: driver.to_string(),
            number,
            start_lap: laps.first().map(|l| l.number).unwrap_or_default(),
            end_lap: laps.last().map(|l| l.number).unwrap_or_default(),
            compound: laps.first().map(|l| l.compound).unwrap_or(Compound::Unknown),
            lap_count: laps.len() as u32,
            degradation,
        }
    }
}

/// Track-side weather reading.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WeatherSample {
    /// Session-relative timestamp
    pub time: Duration,
    /// Air temperature in °C
    pub air_temp: f64,
    /// Track surface temperature in °C
    pub track_temp: f64,
    /// Relative humidity in %
    pub humidity: f64,
    /// Air pressure in mbar
    pub pressure: Option<f64>,
    /// Wind speed in m/s
    pub wind_speed: f64,
    /// Wind direction in degrees
    pub wind_direction: Option<f64>,
    pub rainfall: bool,
}

/// A run of consecutive lap numbers missing from a driver's laps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LapGap {
    pub first: u32,
    /// Inclusive
    pub last: u32,
}

impl LapGap {
    /// Number of missing laps in the run.
    pub fn lap_count(&self) -> u64 {
        u64::from(self.last - self.first) + 1
    }

    pub fn contains(&self, lap: u32) -> bool {
        (self.first..=self.last).contains(&lap)
    }
}

/// Headline counts describing a loaded session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub drivers: usize,
    pub laps: usize,
    pub laps_with_telemetry: usize,
    pub weather_samples: usize,
    pub stints: usize,
}

/// One complete, normalized session.
///
/// Built once by the loader and never mutated afterwards; the cache hands out
/// `Arc<Session>` so concurrent analyzers read it without locking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub key: SessionKey,
    /// Participants in source order
    pub drivers: Vec<Driver>,
    /// Laps per driver, strictly increasing by lap number
    pub laps: BTreeMap<String, Vec<Lap>>,
    /// Stints per driver, derived from `laps`
    pub stints: BTreeMap<String, Vec<Stint>>,
    /// Weather readings ordered by time
    pub weather: Vec<WeatherSample>,
    /// Runs of lap numbers known to be missing per driver
    pub lap_gaps: BTreeMap<String, Vec<LapGap>>,
}

impl Session {
    /// Assemble a session from already ordered and validated parts.
    pub fn new(
        key: SessionKey,
        drivers: Vec<Driver>,
        laps: BTreeMap<String, Vec<Lap>>,
        weather: Vec<WeatherSample>,
    ) -> Self {
        let stints = laps
            .iter()
            .map(|(driver, driver_laps)| (driver.clone(), Stint::derive(driver, driver_laps)))
            .collect();

        let lap_gaps = laps
            .iter()
            .filter_map(|(driver, driver_laps)| {
                let gaps: Vec<LapGap> = driver_laps
                    .windows(2)
                    .filter(|pair| pair[1].number > pair[0].number.saturating_add(1))
                    .map(|pair| LapGap { first: pair[0].number + 1, last: pair[1].number - 1 })
                    .collect();
                (!gaps.is_empty()).then(|| (driver.clone(), gaps))
            })
            .collect();

        Self { key, drivers, laps, stints, weather, lap_gaps }
    }

    /// Find a driver by id, ignoring case, or by car number.
    pub fn driver(&self, id: &str) -> Option<&Driver> {
        self.drivers.iter().find(|d| d.id.eq_ignore_ascii_case(id)).or_else(|| {
            let number = id.parse::<u32>().ok()?;
            self.drivers.iter().find(|d| d.number == Some(number))
        })
    }

    /// Laps for a driver, or an empty slice for unknown drivers.
    pub fn laps_for(&self, id: &str) -> &[Lap] {
        self.laps.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn stints_for(&self, id: &str) -> &[Stint] {
        self.stints.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Iterate drivers in session order together with their laps.
    pub fn driver_laps(&self) -> impl Iterator<Item = (&Driver, &[Lap])> {
        self.drivers.iter().map(move |d| (d, self.laps_for(&d.id)))
    }

    pub fn all_laps(&self) -> impl Iterator<Item = &Lap> {
        self.laps.values().flatten()
    }

    /// Latest weather reading taken at or before `time`.
    pub fn weather_before(&self, time: Duration) -> Option<&WeatherSample> {
        let idx = self.weather.partition_point(|w| w.time <= time);
        idx.checked_sub(1).and_then(|i| self.weather.get(i))
    }

    /// Fastest valid lap time across all drivers, in seconds.
    pub fn best_lap_seconds(&self) -> Option<f64> {
        self.all_laps()
            .filter(|l| l.is_valid())
            .filter_map(Lap::seconds)
            .min_by(f64::total_cmp)
    }

    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            drivers: self.drivers.len(),
            laps: self.all_laps().count(),
            laps_with_telemetry: self.all_laps().filter(|l| l.has_telemetry()).count(),
            weather_samples: self.weather.len(),
            stints: self.stints.values().map(Vec::len).sum(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{SectorTimes, SessionType};

    fn lap(number: u32, compound: Compound, age: u32, secs: f64) -> Lap {
        Lap {
            driver: "HAM".to_string(),
            number,
            time: Some(Duration::from_secs_f64(secs)),
            sectors: SectorTimes::default(),
            start_time: Some(Duration::from_secs(number as u64 * 90)),
            deleted: false,
            pit_in: None,
            pit_out: None,
            compound,
            tyre_age: age,
            telemetry: Vec::new(),
        }
    }

    #[test]
    fn stints_split_on_compound_change_and_pit_stop() {
        let mut laps = vec![
            lap(1, Compound::Medium, 1, 92.0),
            lap(2, Compound::Medium, 2, 92.2),
            lap(3, Compound::Medium, 3, 92.4),
            lap(4, Compound::Hard, 1, 93.0),
            lap(5, Compound::Hard, 2, 93.1),
            lap(6, Compound::Hard, 1, 92.9),
        ];
        laps[4].pit_in = Some(Duration::from_secs(540));
        laps[5].pit_out = Some(Duration::from_secs(562));

        let stints = Stint::derive("HAM", &laps);
        assert_eq!(stints.len(), 3);
        assert_eq!((stints[0].start_lap, stints[0].end_lap), (1, 3));
        assert_eq!((stints[1].start_lap, stints[1].end_lap), (4, 5));
        assert_eq!((stints[2].start_lap, stints[2].end_lap), (6, 6));
        assert_eq!(stints[1].compound, Compound::Hard);
        assert_eq!(stints[2].number, 3);

        let slope = stints[0].degradation.expect("three valid laps give a slope");
        assert!((slope - 0.2).abs() < 1e-6);
        assert_eq!(stints[2].degradation, None);
    }

    #[test]
    fn gaps_are_recorded_and_weather_lookup_is_nearest_preceding() {
        let key = SessionKey::new(2024, "bahrain", SessionType::Race);
        let mut laps = BTreeMap::new();
        laps.insert(
            "HAM".to_string(),
            vec![lap(1, Compound::Soft, 1, 95.0), lap(4, Compound::Soft, 4, 95.5)],
        );
        let weather = [0u64, 60, 120]
            .iter()
            .map(|secs| WeatherSample {
                time: Duration::from_secs(*secs),
                air_temp: 20.0 + *secs as f64 / 60.0,
                track_temp: 30.0,
                humidity: 50.0,
                pressure: None,
                wind_speed: 1.0,
                wind_direction: None,
                rainfall: false,
            })
            .collect();

        let session = Session::new(key, Vec::new(), laps, weather);
        assert_eq!(session.lap_gaps.get("HAM"), Some(&vec![LapGap { first: 2, last: 3 }]));

        let w = session.weather_before(Duration::from_secs(90)).unwrap();
        assert_eq!(w.time, Duration::from_secs(60));
        let exact = session.weather_before(Duration::from_secs(120)).unwrap();
        assert_eq!(exact.time, Duration::from_secs(120));
        assert!(session.weather_before(Duration::ZERO).is_some());

        assert_eq!(session.summary().laps, 2);
        assert_eq!(session.best_lap_seconds(), Some(95.0));
    }

    #[test]
    fn huge_lap_number_gap_is_one_range() {
        let key = SessionKey::new(2024, "bahrain", SessionType::Race);
        let mut laps = BTreeMap::new();
        laps.insert(
            "HAM".to_string(),
            vec![lap(1, Compound::Soft, 1, 95.0), lap(u32::MAX, Compound::Soft, 2, 95.5)],
        );

        let session = Session::new(key, Vec::new(), laps, Vec::new());
        let gaps = &session.lap_gaps["HAM"];
        assert_eq!(gaps, &vec![LapGap { first: 2, last: u32::MAX - 1 }]);
        assert_eq!(gaps[0].lap_count(), u64::from(u32::MAX) - 2);
        assert!(gaps[0].contains(1_000_000));
        assert!(!gaps[0].contains(u32::MAX));
    }
}
