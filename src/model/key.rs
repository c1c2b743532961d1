//! Session identity and key canonicalization

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::SessionError;

/// Kind of session within an event weekend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SessionType {
    Practice1,
    Practice2,
    Practice3,
    Qualifying,
    Sprint,
    Race,
}

impl SessionType {
    /// All session types in weekend order.
    pub const ALL: [SessionType; 6] = [
        SessionType::Practice1,
        SessionType::Practice2,
        SessionType::Practice3,
        SessionType::Qualifying,
        SessionType::Sprint,
        SessionType::Race,
    ];

    /// Short code used in file names and logs.
    pub fn code(self) -> &'static str {
        match self {
            SessionType::Practice1 => "fp1",
            SessionType::Practice2 => "fp2",
            SessionType::Practice3 => "fp3",
            SessionType::Qualifying => "q",
            SessionType::Sprint => "s",
            SessionType::Race => "r",
        }
    }
}

impl fmt::Display for SessionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionType::Practice1 => "Practice1",
            SessionType::Practice2 => "Practice2",
            SessionType::Practice3 => "Practice3",
            SessionType::Qualifying => "Qualifying",
            SessionType::Sprint => "Sprint",
            SessionType::Race => "Race",
        };
        f.write_str(name)
    }
}

impl FromStr for SessionType {
    type Err = SessionError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let folded: String = input
            .chars()
            .filter(|c| !c.is_whitespace() && *c != '-' && *c != '_')
            .flat_map(char::to_lowercase)
            .collect();

        match folded.as_str() {
            "fp1" | "practice1" | "p1" => Ok(SessionType::Practice1),
            "fp2" | "practice2" | "p2" => Ok(SessionType::Practice2),
            "fp3" | "practice3" | "p3" => Ok(SessionType::Practice3),
            "q" | "quali" | "qualifying" => Ok(SessionType::Qualifying),
            "s" | "sprint" | "sprintrace" => Ok(SessionType::Sprint),
            "r" | "race" | "grandprix" | "gp" => Ok(SessionType::Race),
            _ => Err(SessionError::invalid_key(input, "unrecognised session type")),
        }
    }
}

/// Event identifier: a round number or an event name.
///
/// The two forms are distinct keys. Whether round 1 and "bahrain" refer to the
/// same event is decided by the source, not by the cache.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventId {
    Round(u32),
    Name(String),
}

impl EventId {
    /// Canonical form: names trimmed, lowercased, with runs of whitespace,
    /// `_` and `-` collapsed to a single `-`; numeric names become rounds.
    pub fn canonical(&self) -> EventId {
        match self {
            EventId::Round(round) => EventId::Round(*round),
            EventId::Name(name) => {
                let trimmed = name.trim();
                if let Ok(round) = trimmed.parse::<u32>() {
                    return EventId::Round(round);
                }

                let mut slug = String::with_capacity(trimmed.len());
                let mut pending_sep = false;
                for ch in trimmed.chars() {
                    if ch.is_whitespace() || ch == '_' || ch == '-' {
                        pending_sep = !slug.is_empty();
                        continue;
                    }
                    if pending_sep {
                        slug.push('-');
                        pending_sep = false;
                    }
                    slug.extend(ch.to_lowercase());
                }
                EventId::Name(slug)
            }
        }
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventId::Round(round) => write!(f, "round-{}", round),
            EventId::Name(name) => f.write_str(name),
        }
    }
}

impl From<u32> for EventId {
    fn from(round: u32) -> Self {
        EventId::Round(round)
    }
}

impl From<&str> for EventId {
    fn from(name: &str) -> Self {
        EventId::Name(name.to_string())
    }
}

impl From<String> for EventId {
    fn from(name: String) -> Self {
        EventId::Name(name)
    }
}

/// Identity of one session: season, event and session type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionKey {
    pub season: u16,
    pub event: EventId,
    pub session: SessionType,
}

impl SessionKey {
    /// Build a key in canonical form.
    pub fn new(season: u16, event: impl Into<EventId>, session: SessionType) -> Self {
        Self { season, event: event.into(), session }.canonical()
    }

    /// Parse loosely formatted request values into a canonical key.
    pub fn parse(season: u16, event: &str, session: &str) -> Result<Self, SessionError> {
        if event.trim().is_empty() {
            return Err(SessionError::invalid_key(event, "event must not be empty"));
        }
        let session = session.parse::<SessionType>()?;
        Ok(Self::new(season, event, session))
    }

    /// Equivalent key with the event identifier canonicalized.
    pub fn canonical(&self) -> SessionKey {
        SessionKey { season: self.season, event: self.event.canonical(), session: self.session }
    }

    /// File stem used by the disk tier and file sources.
    pub fn file_stem(&self) -> String {
        let key = self.canonical();
        format!("{}-{}-{}", key.season, key.event, key.session.code())
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.season, self.event, self.session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn session_type_accepts_common_spellings() {
        assert_eq!("FP1".parse::<SessionType>().unwrap(), SessionType::Practice1);
        assert_eq!("Practice 2".parse::<SessionType>().unwrap(), SessionType::Practice2);
        assert_eq!("q".parse::<SessionType>().unwrap(), SessionType::Qualifying);
        assert_eq!("Sprint".parse::<SessionType>().unwrap(), SessionType::Sprint);
        assert_eq!("RACE".parse::<SessionType>().unwrap(), SessionType::Race);
        assert!("warmup".parse::<SessionType>().is_err());
    }

    #[test]
    fn equivalent_event_names_share_a_key() {
        let a = SessionKey::new(2024, "Bahrain", SessionType::Race);
        let b = SessionKey::new(2024, "  BAHRAIN ", SessionType::Race);
        let c = SessionKey::parse(2024, "bahrain", "R").unwrap();
        assert_eq!(a, b);
        assert_eq!(a, c);

        let spaced = SessionKey::new(2024, "Emilia  Romagna", SessionType::Race);
        let underscored = SessionKey::new(2024, "emilia_romagna", SessionType::Race);
        assert_eq!(spaced, underscored);
        assert_eq!(spaced.event, EventId::Name("emilia-romagna".to_string()));
    }

    #[test]
    fn numeric_event_names_become_rounds() {
        let key = SessionKey::parse(2023, " 7 ", "qualifying").unwrap();
        assert_eq!(key.event, EventId::Round(7));
        assert_ne!(key, SessionKey::new(2023, "monaco", SessionType::Qualifying));
    }

    #[test]
    fn display_and_file_stem() {
        let key = SessionKey::new(2024, "Bahrain", SessionType::Race);
        assert_eq!(key.to_string(), "2024/bahrain/Race");
        assert_eq!(key.file_stem(), "2024-bahrain-r");
        assert!(SessionKey::parse(2024, "   ", "race").is_err());
    }

    proptest! {
        #[test]
        fn prop_canonicalization_is_idempotent(name in "[ A-Za-z_-]{1,24}") {
            let once = EventId::Name(name).canonical();
            let twice = once.canonical();
            prop_assert_eq!(&once, &twice);
            if let EventId::Name(slug) = &once {
                prop_assert!(!slug.starts_with('-'));
                prop_assert!(!slug.ends_with('-'));
                prop_assert!(!slug.contains("--"));
                prop_assert_eq!(slug.to_lowercase(), slug.clone());
            }
        }

        #[test]
        fn prop_case_does_not_split_keys(name in "[A-Za-z]{1,16}") {
            let upper = SessionKey::new(2024, name.to_uppercase(), SessionType::Sprint);
            let lower = SessionKey::new(2024, name.to_lowercase(), SessionType::Sprint);
            prop_assert_eq!(upper, lower);
        }
    }
}
