//! Shared fixtures for integration tests
//!
//! Bundles are built from the public raw record types, the same way a real
//! upstream adapter would produce them.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use paddock::source::{RawBrake, RawDriver, RawLap, RawTelemetry, RawWeather};
use paddock::sources::MemorySource;
use paddock::{RawSessionBundle, RawSessionSource, SessionError, SessionKey, SessionType};

const SAMPLE_MS: f64 = 250.0;

pub fn bahrain_key() -> SessionKey {
    SessionKey::new(2024, "Bahrain", SessionType::Race)
}

fn driver(id: &str, number: u32, team: &str) -> RawDriver {
    RawDriver { id: Some(id.into()), number: Some(number), name: Some(id.into()), team: Some(team.into()) }
}

fn lap(driver: &str, number: u32, start_ms: f64, time_ms: f64, compound: &str, tyre_life: u32) -> RawLap {
    RawLap {
        driver: Some(driver.into()),
        lap_number: Some(number),
        lap_time_ms: Some(time_ms),
        sector1_ms: Some(time_ms * 0.3),
        sector2_ms: Some(time_ms * 0.4),
        sector3_ms: Some(time_ms * 0.3),
        lap_start_ms: Some(start_ms),
        deleted: Some(false),
        pit_in_ms: None,
        pit_out_ms: None,
        compound: Some(compound.into()),
        tyre_life: Some(tyre_life),
    }
}

/// A repeating 10 second pattern: 7.5 s flat out, 1.5 s braking, 1 s on exit.
fn trace(driver: &str, number: u32, start_ms: f64, time_ms: f64, pressure: f64) -> Vec<RawTelemetry> {
    let samples = (time_ms / SAMPLE_MS) as usize;
    let mut distance = 0.0;
    (0..samples)
        .map(|i| {
            let (speed, throttle, brake) = match i % 40 {
                step @ 0..30 => (300.0 + step as f64 * 0.5, 100.0, 0.0),
                step @ 30..36 => (300.0 - (step - 29) as f64 * 30.0, 0.0, pressure),
                step => (120.0 + (step - 35) as f64 * 35.0, 60.0, 0.0),
            };
            distance += speed / 3.6 * SAMPLE_MS / 1000.0;
            RawTelemetry {
                driver: Some(driver.into()),
                lap_number: Some(number),
                time_ms: Some(start_ms + i as f64 * SAMPLE_MS),
                distance: Some(distance),
                speed: Some(speed),
                throttle: Some(throttle),
                brake: Some(RawBrake::Pressure(brake)),
                gear: Some(((speed / 40.0) as u8).clamp(1, 8)),
                rpm: Some(10_500.0),
                drs: Some(0),
            }
        })
        .collect()
}

/// VER: two laps on softs with telemetry, pit at the end of lap 2, lap 3 on
/// mediums without telemetry.
pub fn bahrain_bundle() -> RawSessionBundle {
    let start = 300_000.0;
    let mut laps = vec![
        lap("VER", 1, start, 97_284.0, "SOFT", 1),
        lap("VER", 2, start + 97_284.0, 98_910.0, "SOFT", 2),
        lap("VER", 3, start + 196_194.0, 117_450.0, "MEDIUM", 1),
    ];
    laps[1].pit_in_ms = Some(start + 196_194.0 - 11_550.0);
    laps[2].pit_out_ms = Some(start + 196_194.0 + 11_550.0);

    let mut telemetry = trace("VER", 1, start, 97_284.0, 88.0);
    telemetry.extend(trace("VER", 2, start + 97_284.0, 98_910.0, 84.0));

    RawSessionBundle { drivers: vec![driver("VER", 1, "Red Bull Racing")], laps, telemetry, weather: Vec::new() }
}

/// Three drivers, `laps` laps each, one stop at half distance and weather
/// every minute.
pub fn grid_bundle(laps: u32) -> RawSessionBundle {
    let grid = [("VER", 1, "Red Bull Racing", 0.0), ("NOR", 4, "McLaren", 250.0), ("LEC", 16, "Ferrari", 480.0)];
    let pit_lap = laps / 2;
    let mut bundle = RawSessionBundle::default();

    for (id, number, team, offset_ms) in grid {
        bundle.drivers.push(driver(id, number, team));
        let mut start = 300_000.0;
        for n in 1..=laps {
            let (compound, age) = if n <= pit_lap { ("MEDIUM", n) } else { ("HARD", n - pit_lap) };
            let time = 94_000.0 + offset_ms + age as f64 * 70.0 + (n % 3) as f64 * 40.0;
            let mut raw = lap(id, n, start, time, compound, age);
            if n == pit_lap {
                raw.pit_in_ms = Some(start + time - 11_000.0);
            }
            if n == pit_lap + 1 {
                raw.pit_out_ms = Some(start + 11_000.0);
            }
            bundle.telemetry.extend(trace(id, n, start, time, 80.0 + (n % 4) as f64));
            bundle.laps.push(raw);
            start += time;
        }
    }

    for minute in 0..=(laps * 2 + 6) {
        bundle.weather.push(RawWeather {
            time_ms: Some(minute as f64 * 60_000.0),
            air_temp: Some(24.0 + minute as f64 * 0.02),
            track_temp: Some(36.0 - minute as f64 * 0.15),
            humidity: Some(52.0),
            pressure: Some(1_010.0),
            wind_speed: Some(1.8),
            wind_direction: Some(90.0),
            rainfall: Some(false),
        });
    }
    bundle
}

/// Source that counts fetches, can stall, and can be told to fail.
#[derive(Debug, Default)]
pub struct CountingSource {
    sessions: MemorySource,
    fetches: AtomicUsize,
    delay: Duration,
    failures: Mutex<VecDeque<SessionError>>,
}

impl CountingSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(self, key: SessionKey, bundle: RawSessionBundle) -> Self {
        self.sessions.insert(key, bundle);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn fail_next(&self, error: SessionError) {
        self.failures.lock().unwrap_or_else(PoisonError::into_inner).push_back(error);
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl RawSessionSource for CountingSource {
    async fn fetch(&self, key: &SessionKey) -> Result<RawSessionBundle, SessionError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let scripted = self.failures.lock().unwrap_or_else(PoisonError::into_inner).pop_front();
        match scripted {
            Some(error) => Err(error),
            None => self.sessions.fetch(key).await,
        }
    }

    fn name(&self) -> &str {
        "counting"
    }
}
