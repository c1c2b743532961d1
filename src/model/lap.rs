//! Laps, tyre compounds and telemetry samples

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Tyre compound fitted for a lap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Compound {
    Soft,
    Medium,
    Hard,
    Intermediate,
    Wet,
    Unknown,
}

impl Compound {
    /// Whether this is a wet-weather tyre.
    pub fn is_wet(self) -> bool {
        matches!(self, Compound::Intermediate | Compound::Wet)
    }
}

impl fmt::Display for Compound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Compound::Soft => "SOFT",
            Compound::Medium => "MEDIUM",
            Compound::Hard => "HARD",
            Compound::Intermediate => "INTERMEDIATE",
            Compound::Wet => "WET",
            Compound::Unknown => "UNKNOWN",
        };
        f.write_str(name)
    }
}

impl FromStr for Compound {
    type Err = String;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match input.trim().to_ascii_lowercase().as_str() {
            "soft" | "s" | "c5" | "c4" => Ok(Compound::Soft),
            "medium" | "m" | "c3" => Ok(Compound::Medium),
            "hard" | "h" | "c2" | "c1" => Ok(Compound::Hard),
            "intermediate" | "inter" | "i" => Ok(Compound::Intermediate),
            "wet" | "w" | "full wet" => Ok(Compound::Wet),
            "unknown" | "" | "test_unknown" => Ok(Compound::Unknown),
            other => Err(format!("unrecognised tyre compound '{}'", other)),
        }
    }
}

/// Sector split times for a lap; any of the three may be missing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SectorTimes {
    pub s1: Option<Duration>,
    pub s2: Option<Duration>,
    pub s3: Option<Duration>,
}

impl SectorTimes {
    /// Sector time by 1-based index.
    pub fn get(&self, sector: usize) -> Option<Duration> {
        match sector {
            1 => self.s1,
            2 => self.s2,
            3 => self.s3,
            _ => None,
        }
    }
}

/// One reading of car state during a lap.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TelemetrySample {
    /// Session-relative timestamp
    pub time: Duration,
    /// Distance along the lap in metres
    pub distance: f64,
    /// Speed in km/h
    pub speed: f64,
    /// Throttle pedal position, 0-100
    pub throttle: f64,
    /// Brake pressure, 0-100 (on/off sources report 0 or 100)
    pub brake: f64,
    pub gear: u8,
    pub rpm: f64,
    pub drs: bool,
}

impl TelemetrySample {
    /// Whether the brake is applied above the given pressure threshold.
    pub fn braking_above(&self, threshold: f64) -> bool {
        self.brake > threshold
    }
}

/// One lap by one driver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lap {
    pub driver: String,
    pub number: u32,
    /// Lap time; absent for laps that were not completed or not timed
    pub time: Option<Duration>,
    pub sectors: SectorTimes,
    /// Session-relative time at which the lap started
    pub start_time: Option<Duration>,
    /// Lap time deleted by race control (track limits etc.)
    pub deleted: bool,
    /// Session-relative pit lane entry time when the lap ended in the pits
    pub pit_in: Option<Duration>,
    /// Session-relative pit lane exit time when the lap started from the pits
    pub pit_out: Option<Duration>,
    pub compound: Compound,
    /// Tyre age in laps at the end of this lap
    pub tyre_age: u32,
    /// Telemetry for the lap; empty when nothing was recorded
    pub telemetry: Vec<TelemetrySample>,
}

impl Lap {
    /// Lap time in seconds, if timed.
    pub fn seconds(&self) -> Option<f64> {
        self.time.map(|t| t.as_secs_f64())
    }

    pub fn is_in_lap(&self) -> bool {
        self.pit_in.is_some()
    }

    pub fn is_out_lap(&self) -> bool {
        self.pit_out.is_some()
    }

    /// A representative racing lap: timed, not deleted, not an in or out lap.
    pub fn is_valid(&self) -> bool {
        self.time.is_some() && !self.deleted && !self.is_in_lap() && !self.is_out_lap()
    }

    pub fn has_telemetry(&self) -> bool {
        !self.telemetry.is_empty()
    }

    /// Session-relative time at which the lap finished, when derivable.
    pub fn end_time(&self) -> Option<Duration> {
        match (self.start_time, self.time) {
            (Some(start), Some(time)) => Some(start + time),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lap(number: u32) -> Lap {
        Lap {
            driver: "VER".to_string(),
            number,
            time: Some(Duration::from_millis(95_250)),
            sectors: SectorTimes::default(),
            start_time: Some(Duration::from_secs(600)),
            deleted: false,
            pit_in: None,
            pit_out: None,
            compound: Compound::Soft,
            tyre_age: number,
            telemetry: Vec::new(),
        }
    }

    #[test]
    fn compound_parsing_is_case_insensitive() {
        assert_eq!("SOFT".parse::<Compound>().unwrap(), Compound::Soft);
        assert_eq!("medium".parse::<Compound>().unwrap(), Compound::Medium);
        assert_eq!(" Inter ".parse::<Compound>().unwrap(), Compound::Intermediate);
        assert!("slick".parse::<Compound>().is_err());
        assert!(Compound::Wet.is_wet());
        assert!(!Compound::Hard.is_wet());
    }

    #[test]
    fn validity_excludes_pit_and_deleted_laps() {
        let clean = lap(5);
        assert!(clean.is_valid());
        assert_eq!(clean.end_time(), Some(Duration::from_millis(695_250)));

        let mut in_lap = lap(6);
        in_lap.pit_in = Some(Duration::from_secs(690));
        assert!(!in_lap.is_valid());

        let mut deleted = lap(7);
        deleted.deleted = true;
        assert!(!deleted.is_valid());

        let mut untimed = lap(8);
        untimed.time = None;
        assert!(!untimed.is_valid());
        assert_eq!(untimed.end_time(), None);
    }

    #[test]
    fn sectors_by_index() {
        let sectors = SectorTimes {
            s1: Some(Duration::from_secs(30)),
            s2: None,
            s3: Some(Duration::from_secs(32)),
        };
        assert_eq!(sectors.get(1), Some(Duration::from_secs(30)));
        assert_eq!(sectors.get(2), None);
        assert_eq!(sectors.get(4), None);
    }
}
