//! Session loader: raw records in, validated [`Session`] out
//!
//! The loader is the single boundary between a [`RawSessionSource`] and the
//! rest of the crate. It fetches under a timeout, converts upstream records
//! into typed entities and rejects anything structurally unsound:
//!
//! - laps without a driver or lap number, or for an unknown driver
//! - duplicate lap numbers for one driver
//! - telemetry for a lap that does not exist
//! - telemetry timestamps that do not strictly increase within a lap
//! - negative durations and non-finite channel values
//!
//! Laps are sorted by number and weather by time; telemetry is never reordered.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

use crate::error::{Result, SessionError};
use crate::model::{
    Compound, Driver, Lap, SectorTimes, Session, SessionKey, TelemetrySample, WeatherSample,
};
use crate::source::{RawDriver, RawLap, RawSessionBundle, RawSessionSource, RawTelemetry, RawWeather};

/// Default upper bound on a single source fetch.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Turns raw source output into normalized sessions.
#[derive(Clone)]
pub struct SessionLoader {
    source: Arc<dyn RawSessionSource>,
    fetch_timeout: Duration,
}

impl std::fmt::Debug for SessionLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionLoader")
            .field("source", &self.source.name())
            .field("fetch_timeout", &self.fetch_timeout)
            .finish()
    }
}

impl SessionLoader {
    pub fn new(source: Arc<dyn RawSessionSource>) -> Self {
        Self { source, fetch_timeout: DEFAULT_FETCH_TIMEOUT }
    }

    pub fn with_timeout(mut self, fetch_timeout: Duration) -> Self {
        self.fetch_timeout = fetch_timeout;
        self
    }

    pub fn source_name(&self) -> &str {
        self.source.name()
    }

    /// Fetch and normalize one session.
    pub async fn load(&self, key: &SessionKey) -> Result<Session> {
        let key = key.canonical();
        let started = Instant::now();
        info!(key = %key, source = self.source.name(), "Loading session");

        let bundle = tokio::time::timeout(self.fetch_timeout, self.source.fetch(&key))
            .await
            .map_err(|_| SessionError::timed_out(self.fetch_timeout))??;

        let session = normalize(key.clone(), bundle).inspect_err(|e| {
            warn!(key = %key, error = %e, "Rejected session data");
        })?;

        let summary = session.summary();
        info!(
            key = %key,
            drivers = summary.drivers,
            laps = summary.laps,
            laps_with_telemetry = summary.laps_with_telemetry,
            stints = summary.stints,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Session loaded"
        );
        Ok(session)
    }
}

/// Validate and convert a raw bundle.
///
/// Deterministic: the same bundle always yields an equal [`Session`].
pub fn normalize(key: SessionKey, bundle: RawSessionBundle) -> Result<Session> {
    let RawSessionBundle { drivers, laps, telemetry, weather } = bundle;

    let drivers = convert_drivers(drivers)?;
    let lookup = DriverLookup::new(&drivers);

    let mut by_driver = convert_laps(laps, &lookup)?;
    if by_driver.values().all(BTreeMap::is_empty) {
        return Err(SessionError::malformed("laps", "session contains no laps"));
    }
    attach_telemetry(telemetry, &lookup, &mut by_driver)?;

    let laps = by_driver
        .into_iter()
        .filter(|(_, laps)| !laps.is_empty())
        .map(|(driver, laps)| (driver, laps.into_values().collect()))
        .collect();

    let weather = convert_weather(weather)?;

    Ok(Session::new(key, drivers, laps, weather))
}

fn convert_drivers(raw: Vec<RawDriver>) -> Result<Vec<Driver>> {
    if raw.is_empty() {
        return Err(SessionError::malformed("drivers", "session contains no drivers"));
    }

    let mut drivers: Vec<Driver> = Vec::with_capacity(raw.len());
    for (index, driver) in raw.into_iter().enumerate() {
        let id = driver
            .id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .or_else(|| driver.number.map(|n| n.to_string()))
            .ok_or_else(|| {
                SessionError::malformed(format!("drivers[{}]", index), "driver has no id or number")
            })?;

        if drivers.iter().any(|d| d.id.eq_ignore_ascii_case(&id)) {
            return Err(SessionError::malformed(
                format!("drivers[{}]", index),
                format!("duplicate driver '{}'", id),
            ));
        }

        drivers.push(Driver {
            name: driver.name.unwrap_or_else(|| id.clone()),
            team: driver.team.unwrap_or_default(),
            number: driver.number,
            id,
        });
    }
    Ok(drivers)
}

/// Resolves the driver references used by lap and telemetry records.
struct DriverLookup {
    ids: HashMap<String, String>,
}

impl DriverLookup {
    fn new(drivers: &[Driver]) -> Self {
        let mut ids = HashMap::new();
        for driver in drivers {
            if let Some(number) = driver.number {
                ids.entry(number.to_string()).or_insert_with(|| driver.id.clone());
            }
            ids.insert(driver.id.to_ascii_lowercase(), driver.id.clone());
        }
        Self { ids }
    }

    fn resolve(&self, context: &str, reference: Option<&str>) -> Result<String> {
        let reference = reference
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .ok_or_else(|| SessionError::malformed(context, "record has no driver"))?;
        self.ids
            .get(&reference.to_ascii_lowercase())
            .cloned()
            .ok_or_else(|| SessionError::malformed(context, format!("unknown driver '{}'", reference)))
    }
}

type LapsByDriver = BTreeMap<String, BTreeMap<u32, Lap>>;

fn convert_laps(raw: Vec<RawLap>, lookup: &DriverLookup) -> Result<LapsByDriver> {
    let mut by_driver: LapsByDriver = BTreeMap::new();

    for (index, lap) in raw.into_iter().enumerate() {
        let context = format!("laps[{}]", index);
        let driver = lookup.resolve(&context, lap.driver.as_deref())?;
        let number = lap
            .lap_number
            .ok_or_else(|| SessionError::malformed(&context, "lap has no lap number"))?;

        let compound = lap
            .compound
            .as_deref()
            .map(|c| c.parse::<Compound>().unwrap_or(Compound::Unknown))
            .unwrap_or(Compound::Unknown);

        let converted = Lap {
            driver: driver.clone(),
            number,
            time: millis(&context, "lap_time_ms", lap.lap_time_ms)?,
            sectors: SectorTimes {
                s1: millis(&context, "sector1_ms", lap.sector1_ms)?,
                s2: millis(&context, "sector2_ms", lap.sector2_ms)?,
                s3: millis(&context, "sector3_ms", lap.sector3_ms)?,
            },
            start_time: millis(&context, "lap_start_ms", lap.lap_start_ms)?,
            deleted: lap.deleted.unwrap_or(false),
            pit_in: millis(&context, "pit_in_ms", lap.pit_in_ms)?,
            pit_out: millis(&context, "pit_out_ms", lap.pit_out_ms)?,
            compound,
            tyre_age: lap.tyre_life.unwrap_or(0),
            telemetry: Vec::new(),
        };

        let laps = by_driver.entry(driver.clone()).or_default();
        if laps.insert(number, converted).is_some() {
            return Err(SessionError::malformed(
                context,
                format!("duplicate lap {} for driver {}", number, driver),
            ));
        }
    }
    Ok(by_driver)
}

fn attach_telemetry(
    raw: Vec<RawTelemetry>,
    lookup: &DriverLookup,
    by_driver: &mut LapsByDriver,
) -> Result<()> {
    for (index, sample) in raw.into_iter().enumerate() {
        let context = format!("telemetry[{}]", index);
        let driver = lookup.resolve(&context, sample.driver.as_deref())?;
        let number = sample
            .lap_number
            .ok_or_else(|| SessionError::malformed(&context, "sample has no lap number"))?;

        let lap = by_driver
            .get_mut(&driver)
            .and_then(|laps| laps.get_mut(&number))
            .ok_or_else(|| {
                SessionError::malformed(
                    &context,
                    format!("telemetry for missing lap {} of driver {}", number, driver),
                )
            })?;

        let time = millis(&context, "time_ms", sample.time_ms)?
            .ok_or_else(|| SessionError::malformed(&context, "sample has no timestamp"))?;

        let previous = lap.telemetry.last().map(|s| s.time);
        if previous.is_some_and(|previous| time <= previous) {
            return Err(SessionError::malformed(
                context,
                format!(
                    "telemetry timestamps not strictly increasing in lap {} of driver {} ({:?} after {:?})",
                    number,
                    driver,
                    time,
                    previous.unwrap_or_default()
                ),
            ));
        }

        lap.telemetry.push(TelemetrySample {
            time,
            distance: non_negative(&context, "distance", sample.distance)?,
            speed: non_negative(&context, "speed", sample.speed)?,
            throttle: non_negative(&context, "throttle", sample.throttle)?,
            brake: non_negative(&context, "brake", sample.brake.map(|b| b.pressure()))?,
            gear: sample.gear.unwrap_or(0),
            rpm: non_negative(&context, "rpm", sample.rpm)?,
            drs: sample.drs.is_some_and(|code| code >= 10),
        });
    }
    Ok(())
}

fn convert_weather(raw: Vec<RawWeather>) -> Result<Vec<WeatherSample>> {
    let mut weather = Vec::with_capacity(raw.len());
    for (index, sample) in raw.into_iter().enumerate() {
        let context = format!("weather[{}]", index);
        let time = millis(&context, "time_ms", sample.time_ms)?
            .ok_or_else(|| SessionError::malformed(&context, "sample has no timestamp"))?;

        weather.push(WeatherSample {
            time,
            air_temp: finite(&context, "air_temp", sample.air_temp)?,
            track_temp: finite(&context, "track_temp", sample.track_temp)?,
            humidity: non_negative(&context, "humidity", sample.humidity)?,
            pressure: optional_finite(&context, "pressure", sample.pressure)?,
            wind_speed: non_negative(&context, "wind_speed", sample.wind_speed)?,
            wind_direction: optional_finite(&context, "wind_direction", sample.wind_direction)?,
            rainfall: sample.rainfall.unwrap_or(false),
        });
    }
    weather.sort_by_key(|w| w.time);
    Ok(weather)
}

fn millis(context: &str, field: &str, value: Option<f64>) -> Result<Option<Duration>> {
    match value {
        None => Ok(None),
        Some(ms) if ms.is_finite() && ms >= 0.0 => Duration::try_from_secs_f64(ms / 1000.0)
            .map(Some)
            .map_err(|_| SessionError::malformed(context, format!("invalid {}: {}", field, ms))),
        Some(ms) => Err(SessionError::malformed(context, format!("invalid {}: {}", field, ms))),
    }
}

fn optional_finite(context: &str, field: &str, value: Option<f64>) -> Result<Option<f64>> {
    match value {
        Some(v) if !v.is_finite() => {
            Err(SessionError::malformed(context, format!("invalid {}: {}", field, v)))
        }
        other => Ok(other),
    }
}

fn finite(context: &str, field: &str, value: Option<f64>) -> Result<f64> {
    Ok(optional_finite(context, field, value)?.unwrap_or(0.0))
}

fn non_negative(context: &str, field: &str, value: Option<f64>) -> Result<f64> {
    let v = finite(context, field, value)?;
    if v < 0.0 {
        return Err(SessionError::malformed(context, format!("negative {}: {}", field, v)));
    }
    Ok(v)
}
