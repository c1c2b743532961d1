//! Test utilities: fixture builders and a scripted source
//!
//! This module provides the helpers shared by unit tests, integration tests and
//! benchmarks. Fixtures are built as [`RawSessionBundle`]s so that everything
//! downstream of the source (loader, cache, analyzers) is exercised for real.

#![cfg(any(test, feature = "benchmark"))]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use crate::error::SessionError;
use crate::loader;
use crate::model::{Session, SessionKey, SessionType};
use crate::source::{
    RawBrake, RawDriver, RawLap, RawSessionBundle, RawSessionSource, RawTelemetry, RawWeather,
};
use crate::sources::MemorySource;

/// Track length used by synthetic telemetry, in metres.
pub const TRACK_LENGTH_M: f64 = 5_412.0;

/// Interval between synthetic telemetry samples.
pub const SAMPLE_INTERVAL_MS: f64 = 250.0;

/// Corners of the synthetic track: (fraction of lap, minimum speed km/h).
const CORNERS: [(f64, f64); 6] =
    [(0.08, 92.0), (0.21, 165.0), (0.38, 118.0), (0.55, 240.0), (0.71, 135.0), (0.88, 78.0)];

/// Session time before the first lap starts.
const SESSION_OFFSET_MS: f64 = 300_000.0;

/// Fluent builder for raw session bundles.
///
/// Lap start times are chained per driver, so laps should be added in order
/// for each driver.
#[derive(Debug, Clone)]
pub struct SessionFixture {
    key: SessionKey,
    bundle: RawSessionBundle,
    clock_ms: HashMap<String, f64>,
}

impl SessionFixture {
    pub fn new(key: SessionKey) -> Self {
        Self { key, bundle: RawSessionBundle::default(), clock_ms: HashMap::new() }
    }

    pub fn key(&self) -> &SessionKey {
        &self.key
    }

    pub fn driver(mut self, id: &str, team: &str) -> Self {
        self.bundle.drivers.push(RawDriver {
            id: Some(id.to_string()),
            number: None,
            name: Some(id.to_string()),
            team: Some(team.to_string()),
        });
        self
    }

    /// Add a timed lap with evenly split sectors.
    pub fn lap(mut self, driver: &str, number: u32, secs: f64, compound: &str, tyre_life: u32) -> Self {
        let start = *self.clock_ms.get(driver).unwrap_or(&SESSION_OFFSET_MS);
        let ms = secs * 1000.0;
        self.clock_ms.insert(driver.to_string(), start + ms);

        self.bundle.laps.push(RawLap {
            driver: Some(driver.to_string()),
            lap_number: Some(number),
            lap_time_ms: Some(ms),
            sector1_ms: Some(ms * 0.31),
            sector2_ms: Some(ms * 0.37),
            sector3_ms: Some(ms * 0.32),
            lap_start_ms: Some(start),
            deleted: Some(false),
            pit_in_ms: None,
            pit_out_ms: None,
            compound: Some(compound.to_string()),
            tyre_life: Some(tyre_life),
        });
        self
    }

    /// Mark a pit stop: `in_lap` ends in the pit lane and the following lap
    /// starts from it, `lane_secs` apart.
    pub fn pit_stop(mut self, driver: &str, in_lap: u32, lane_secs: f64) -> Self {
        let half = lane_secs * 500.0;
        if let Some(lap) = self.raw_lap_mut(driver, in_lap) {
            let end = lap.lap_start_ms.unwrap_or(0.0) + lap.lap_time_ms.unwrap_or(0.0);
            lap.pit_in_ms = Some(end - half);
        }
        if let Some(lap) = self.raw_lap_mut(driver, in_lap + 1) {
            lap.pit_out_ms = Some(lap.lap_start_ms.unwrap_or(0.0) + half);
        }
        self
    }

    /// Mark a lap as deleted by race control.
    pub fn deleted(mut self, driver: &str, number: u32) -> Self {
        if let Some(lap) = self.raw_lap_mut(driver, number) {
            lap.deleted = Some(true);
        }
        self
    }

    /// Generate a plausible telemetry trace for an existing lap.
    ///
    /// Cars brake into six corners and run flat out in between; lap number
    /// and driver nudge the braking pressure so traces are not identical.
    pub fn synthetic_telemetry(mut self, driver: &str, number: u32) -> Self {
        let Some(lap) = self.raw_lap_mut(driver, number).cloned() else {
            return self;
        };
        let start = lap.lap_start_ms.unwrap_or(0.0);
        let duration = lap.lap_time_ms.unwrap_or(90_000.0);
        let samples = (duration / SAMPLE_INTERVAL_MS) as usize;
        let bias = driver.bytes().map(f64::from).sum::<f64>() % 7.0 + (number % 4) as f64;

        let mut distance = 0.0;
        for i in 0..samples {
            let phase = i as f64 / samples as f64;
            let (speed, braking) = synthetic_speed(phase);
            let brake = if braking { (72.0 + bias * 3.0).min(100.0) } else { 0.0 };
            let throttle = if braking {
                0.0
            } else if speed > 270.0 {
                100.0
            } else {
                (55.0 + speed / 6.0).min(100.0)
            };

            self.bundle.telemetry.push(RawTelemetry {
                driver: Some(driver.to_string()),
                lap_number: Some(number),
                time_ms: Some(start + i as f64 * SAMPLE_INTERVAL_MS),
                distance: Some(distance),
                speed: Some(speed),
                throttle: Some(throttle),
                brake: Some(RawBrake::Pressure(brake)),
                gear: Some(((speed / 42.0).ceil() as u8).clamp(1, 8)),
                rpm: Some(7_500.0 + (speed % 42.0) * 90.0),
                drs: Some(if phase > 0.92 { 12 } else { 0 }),
            });
            distance += speed / 3.6 * SAMPLE_INTERVAL_MS / 1000.0;
        }
        self
    }

    pub fn weather(mut self, time_secs: f64, air: f64, track: f64, humidity: f64, rain: bool) -> Self {
        self.bundle.weather.push(RawWeather {
            time_ms: Some(time_secs * 1000.0),
            air_temp: Some(air),
            track_temp: Some(track),
            humidity: Some(humidity),
            pressure: Some(1_012.0),
            wind_speed: Some(2.4),
            wind_direction: Some(180.0),
            rainfall: Some(rain),
        });
        self
    }

    pub fn bundle(&self) -> RawSessionBundle {
        self.bundle.clone()
    }

    /// Normalize the fixture, panicking on invalid data.
    pub fn session(&self) -> Session {
        loader::normalize(self.key.clone(), self.bundle())
            .unwrap_or_else(|e| panic!("fixture for {} is invalid: {}", self.key, e))
    }

    fn raw_lap_mut(&mut self, driver: &str, number: u32) -> Option<&mut RawLap> {
        self.bundle
            .laps
            .iter_mut()
            .find(|l| l.driver.as_deref() == Some(driver) && l.lap_number == Some(number))
    }
}

/// Speed at a point of the synthetic lap and whether the car is braking.
fn synthetic_speed(phase: f64) -> (f64, bool) {
    const TOP: f64 = 318.0;
    const APPROACH: f64 = 0.045;
    const EXIT: f64 = 0.06;

    let mut speed = TOP;
    let mut braking = false;
    for (apex, min) in CORNERS {
        let d = phase - apex;
        let factor = if (-APPROACH..=0.0).contains(&d) {
            braking |= d < -APPROACH * 0.15;
            1.0 + d / APPROACH
        } else if (0.0..=EXIT).contains(&d) {
            1.0 - d / EXIT
        } else {
            continue;
        };
        speed = speed.min(TOP - (TOP - min) * factor);
    }
    (speed, braking)
}

/// The 2024 Bahrain race scenario.
///
/// One driver: laps 1 and 2 on softs with telemetry, lap 2 ends in the pits;
/// lap 3 on mediums was recorded without telemetry.
pub fn bahrain_race() -> SessionFixture {
    SessionFixture::new(SessionKey::new(2024, "Bahrain", SessionType::Race))
        .driver("VER", "Red Bull Racing")
        .lap("VER", 1, 97.284, "SOFT", 1)
        .lap("VER", 2, 98.910, "SOFT", 2)
        .lap("VER", 3, 117.450, "MEDIUM", 1)
        .pit_stop("VER", 2, 23.1)
        .synthetic_telemetry("VER", 1)
        .synthetic_telemetry("VER", 2)
}

/// A three-driver race with stints, telemetry on every lap and weather.
pub fn full_race(key: SessionKey, laps_per_driver: u32) -> SessionFixture {
    let drivers = [("VER", "Red Bull Racing", 0.0), ("LEC", "Ferrari", 0.35), ("HAM", "Mercedes", 0.6)];
    let pit_lap = laps_per_driver / 2;

    let mut fixture = SessionFixture::new(key);
    for (id, team, _) in drivers {
        fixture = fixture.driver(id, team);
    }

    for (id, _, offset) in drivers {
        for n in 1..=laps_per_driver {
            let (compound, age) = if n <= pit_lap { ("SOFT", n) } else { ("HARD", n - pit_lap) };
            let wear = if compound == "SOFT" { 0.11 } else { 0.05 };
            let fuel = -0.03 * n as f64;
            let jitter = ((n * 7 + id.len() as u32) % 5) as f64 * 0.04;
            let secs = 93.0 + offset + wear * age as f64 + fuel + jitter;
            fixture = fixture.lap(id, n, secs, compound, age);
        }
        fixture = fixture.pit_stop(id, pit_lap, 22.0 + offset * 4.0);
        for n in 1..=laps_per_driver {
            fixture = fixture.synthetic_telemetry(id, n);
        }
    }

    let total_secs = SESSION_OFFSET_MS / 1000.0 + 100.0 * laps_per_driver as f64;
    let mut t = 0.0;
    let mut step = 0.0;
    while t <= total_secs {
        fixture = fixture.weather(t, 26.0 + step * 0.05, 38.0 - step * 0.2, 45.0 + step * 0.3, false);
        t += 60.0;
        step += 1.0;
    }
    fixture
}

/// Source double that counts fetches and can be scripted to fail or stall.
#[derive(Debug, Default)]
pub struct MockSource {
    sessions: MemorySource,
    fetches: AtomicUsize,
    delay: Duration,
    failures: Mutex<VecDeque<SessionError>>,
}

impl MockSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_session(self, key: SessionKey, bundle: RawSessionBundle) -> Self {
        self.sessions.insert(key, bundle);
        self
    }

    pub fn with_fixture(self, fixture: &SessionFixture) -> Self {
        self.with_session(fixture.key().clone(), fixture.bundle())
    }

    /// Delay every fetch by `delay` before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Make the next fetch fail with `error`; queued failures are consumed in order.
    pub fn fail_next(&self, error: SessionError) {
        self.failures.lock().unwrap_or_else(PoisonError::into_inner).push_back(error);
    }

    /// Number of fetches started so far.
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl RawSessionSource for MockSource {
    async fn fetch(&self, key: &SessionKey) -> Result<RawSessionBundle, SessionError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let scripted = self.failures.lock().unwrap_or_else(PoisonError::into_inner).pop_front();
        if let Some(error) = scripted {
            return Err(error);
        }
        self.sessions.fetch(key).await
    }

    fn name(&self) -> &str {
        "mock"
    }
}
