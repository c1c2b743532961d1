//! Core types for normalized session data.
//!
//! The model is what every analyzer consumes:
//! - [`SessionKey`] identifies a session and is canonicalized before any cache lookup
//! - [`Session`] is the immutable root entity (drivers, laps, stints, weather)
//! - [`Lap`] carries timing, tyre state and its own [`TelemetrySample`] series
//! - [`Stint`] groups contiguous laps on one set of tyres and is always derived
//!
//! Times inside a session are [`std::time::Duration`]s relative to the session
//! start; speeds are km/h, distances metres and pedal inputs percentages.
//!
//! ```rust
//! use paddock::model::{SessionKey, SessionType};
//!
//! let key = SessionKey::parse(2024, " Bahrain ", "race").unwrap();
//! assert_eq!(key, SessionKey::new(2024, "bahrain", SessionType::Race));
//! ```

mod key;
mod lap;
mod session;

pub use key::{EventId, SessionKey, SessionType};
pub use lap::{Compound, Lap, SectorTimes, TelemetrySample};
pub use session::{Driver, LapGap, Session, SessionSummary, Stint, WeatherSample};
