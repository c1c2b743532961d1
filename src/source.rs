//! Raw session sources
//!
//! A [`RawSessionSource`] is the only network or disk facing dependency of the
//! core. It returns records the way an upstream timing feed delivers them:
//! optional fields, millisecond floats and free-form strings. Turning those into
//! a [`Session`](crate::Session) is the loader's job.

use serde::{Deserialize, Serialize};

use crate::error::SessionError;
use crate::model::SessionKey;

/// Trait for upstream session data providers
///
/// Implementations must be cheap to share: the loader holds one behind an
/// `Arc` and may call `fetch` from several tasks at once for different keys.
#[async_trait::async_trait]
pub trait RawSessionSource: Send + Sync + 'static {
    /// Fetch every raw record for one session.
    ///
    /// Returns:
    /// - `Ok(bundle)` - Records for the session, not yet validated
    /// - `Err(SessionError::NotFound)` - The key names no real session
    /// - `Err(SessionError::SourceUnavailable)` - The upstream could not be reached
    async fn fetch(&self, key: &SessionKey) -> Result<RawSessionBundle, SessionError>;

    /// Short name used in logs.
    fn name(&self) -> &str;
}

/// Everything a source knows about one session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawSessionBundle {
    pub drivers: Vec<RawDriver>,
    pub laps: Vec<RawLap>,
    pub telemetry: Vec<RawTelemetry>,
    pub weather: Vec<RawWeather>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawDriver {
    /// Abbreviation such as "VER"; falls back to the car number when absent
    pub id: Option<String>,
    pub number: Option<u32>,
    pub name: Option<String>,
    pub team: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawLap {
    pub driver: Option<String>,
    pub lap_number: Option<u32>,
    pub lap_time_ms: Option<f64>,
    pub sector1_ms: Option<f64>,
    pub sector2_ms: Option<f64>,
    pub sector3_ms: Option<f64>,
    /// Session time at which the lap started
    pub lap_start_ms: Option<f64>,
    pub deleted: Option<bool>,
    pub pit_in_ms: Option<f64>,
    pub pit_out_ms: Option<f64>,
    pub compound: Option<String>,
    pub tyre_life: Option<u32>,
}

/// Brake channel as reported upstream: an on/off flag or a pressure percentage.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawBrake {
    Flag(bool),
    Pressure(f64),
}

impl RawBrake {
    /// Brake pressure in percent; flags map to 0 or 100.
    pub fn pressure(self) -> f64 {
        match self {
            RawBrake::Flag(true) => 100.0,
            RawBrake::Flag(false) => 0.0,
            RawBrake::Pressure(value) => value,
        }
    }
}

impl Default for RawBrake {
    fn default() -> Self {
        RawBrake::Flag(false)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawTelemetry {
    pub driver: Option<String>,
    pub lap_number: Option<u32>,
    /// Session time of the sample
    pub time_ms: Option<f64>,
    pub distance: Option<f64>,
    pub speed: Option<f64>,
    pub throttle: Option<f64>,
    pub brake: Option<RawBrake>,
    pub gear: Option<u8>,
    pub rpm: Option<f64>,
    /// Upstream DRS code; 10 and above means the flap is open
    pub drs: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawWeather {
    pub time_ms: Option<f64>,
    pub air_temp: Option<f64>,
    pub track_temp: Option<f64>,
    pub humidity: Option<f64>,
    pub pressure: Option<f64>,
    pub wind_speed: Option<f64>,
    pub wind_direction: Option<f64>,
    pub rainfall: Option<bool>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bundle_deserializes_loose_records() {
        let json = r#"{
            "drivers": [{"id": "VER", "number": 1, "name": "Max Verstappen", "team": "Red Bull Racing"}],
            "laps": [{"driver": "VER", "lap_number": 1, "lap_time_ms": 97284.0, "compound": "SOFT", "tyre_life": 1}],
            "telemetry": [
                {"driver": "VER", "lap_number": 1, "time_ms": 1000.0, "speed": 288.0, "brake": false},
                {"driver": "VER", "lap_number": 1, "time_ms": 1250.0, "speed": 212.0, "brake": 87.5}
            ]
        }"#;

        let bundle: RawSessionBundle = serde_json::from_str(json).unwrap();
        assert_eq!(bundle.drivers.len(), 1);
        assert_eq!(bundle.laps[0].lap_number, Some(1));
        assert_eq!(bundle.laps[0].deleted, None);
        assert!(bundle.weather.is_empty());

        let brakes: Vec<f64> =
            bundle.telemetry.iter().map(|t| t.brake.unwrap_or_default().pressure()).collect();
        assert_eq!(brakes, vec![0.0, 87.5]);
    }

    #[test]
    fn boolean_brake_maps_to_full_pressure() {
        assert_eq!(RawBrake::Flag(true).pressure(), 100.0);
        assert_eq!(RawBrake::default().pressure(), 0.0);
    }
}
