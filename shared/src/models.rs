//! Shared data models.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Days, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::{Error, Result};

/// Family identifier. Always positive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FamilyId(i64);

impl FamilyId {
    pub fn new(id: i64) -> Result<Self> {
        if id > 0 {
            Ok(Self(id))
        } else {
            Err(Error::BadRequest(format!(
                "family: must be a positive integer, got {}",
                id
            )))
        }
    }

    pub fn get(self) -> i64 {
        self.0
    }
}

impl FromStr for FamilyId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let id: i64 = s
            .trim()
            .parse()
            .map_err(|_| Error::BadRequest("family: must be an integer".to_string()))?;
        Self::new(id)
    }
}

impl fmt::Display for FamilyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Calendar date that keys an event, written `YYYY-MM-DD`.
///
/// Ordering is chronological, which coincides with the lexicographic order of
/// the textual key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EventDate(NaiveDate);

impl EventDate {
    pub fn from_naive(date: NaiveDate) -> Self {
        Self(date)
    }

    pub fn as_naive(&self) -> NaiveDate {
        self.0
    }

    /// The date `days` after this one, saturating at the calendar's end.
    pub fn plus_days(&self, days: u64) -> Self {
        Self(self.0.checked_add_days(Days::new(days)).unwrap_or(NaiveDate::MAX))
    }
}

impl FromStr for EventDate {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let bad = || Error::BadRequest(format!("date: expected YYYY-MM-DD, got {:?}", s));

        let bytes = s.as_bytes();
        let shape_ok = bytes.len() == 10
            && bytes[4] == b'-'
            && bytes[7] == b'-'
            && bytes
                .iter()
                .enumerate()
                .all(|(i, b)| i == 4 || i == 7 || b.is_ascii_digit());
        if !shape_ok {
            return Err(bad());
        }

        NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .map(Self)
            .map_err(|_| bad())
    }
}

impl fmt::Display for EventDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%d"))
    }
}

impl Serialize for EventDate {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for EventDate {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// A member of a family.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Person {
    pub id: i64,
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub is_child: bool,
    #[serde(default)]
    pub birth_date: Option<NaiveDate>,
    #[serde(default)]
    pub diet_notes: String,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub contact_info: Vec<String>,
}

/// A family that RSVPs as one unit.
///
/// `Debug` is implemented by hand so the access token never reaches a log line.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Family {
    pub id: FamilyId,
    pub name: String,
    #[serde(skip_serializing)]
    pub token: String,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub people: Vec<Person>,
}

impl fmt::Debug for Family {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Family")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("token", &"<redacted>")
            .field("notes", &self.notes)
            .field("people", &self.people)
            .finish()
    }
}

/// A scheduled event families can RSVP to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventInstance {
    pub date: EventDate,
    pub cap: u32,
    #[serde(default)]
    pub notes: String,
}

/// One family's attendance decision for one event.
///
/// `attending == 0` means the family declined; a missing response means it
/// has not answered yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RsvpResponse {
    pub event_date: EventDate,
    pub family_id: FamilyId,
    pub attending: u32,
    pub note: String,
    pub updated_at: DateTime<Utc>,
}

/// Acknowledgement returned after a committed RSVP.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RsvpAck {
    pub family_id: FamilyId,
    pub event_date: EventDate,
    pub attending: u32,
    pub message: String,
}

/// One row of a family's upcoming-events listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpcomingRsvp {
    pub event: EventInstance,
    pub response: Option<RsvpResponse>,
    pub seats_remaining: u32,
}

/// All responses recorded for one event, for administrators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventSummary {
    pub event: EventInstance,
    pub responses: Vec<RsvpResponse>,
    pub total_attending: u32,
}
