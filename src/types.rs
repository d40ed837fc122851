//! Core types used throughout the engine
//!
//! Defines outcome events, candidates, signals and their lifecycle enums.

use chrono::{DateTime, Duration, FixedOffset, Timelike};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::IngestError;

/// Instant in the engine's reference timezone
pub type Timestamp = DateTime<FixedOffset>;

/// Outcome category of a single round
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Red,
    Black,
    /// The neutral outcome. Signals wait for this one by default.
    White,
}

impl Default for Category {
    fn default() -> Self {
        Category::White
    }
}

impl Category {
    /// Numeric code used by the outcome feed (0 = white, 1 = red, 2 = black)
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(Category::White),
            1 => Some(Category::Red),
            2 => Some(Category::Black),
            _ => None,
        }
    }

    pub fn code(&self) -> i64 {
        match self {
            Category::White => 0,
            Category::Red => 1,
            Category::Black => 2,
        }
    }

    /// Parse from string
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "white" | "w" | "0" => Some(Category::White),
            "red" | "r" | "1" => Some(Category::Red),
            "black" | "b" | "2" => Some(Category::Black),
            _ => None,
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Category::Red => write!(f, "RED"),
            Category::Black => write!(f, "BLACK"),
            Category::White => write!(f, "WHITE"),
        }
    }
}

/// One timestamped outcome. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Feed-assigned identifier, used to skip re-delivered rounds
    pub id: Option<String>,
    pub category: Category,
    pub value: i64,
    pub timestamp: Timestamp,
}

impl Event {
    pub fn new(category: Category, value: i64, timestamp: Timestamp) -> Self {
        Self {
            id: None,
            category,
            value,
            timestamp,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }
}

/// Unvalidated ingestion input, as handed over by the feed collaborator.
///
/// Category accepts a name or the feed's numeric code; timestamp is RFC 3339
/// in any offset.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawEvent {
    pub id: Option<String>,
    pub category: Option<String>,
    pub value: Option<i64>,
    pub timestamp: Option<String>,
}

impl RawEvent {
    /// Validate and shift the timestamp into `offset`
    pub fn parse(self, offset: FixedOffset) -> Result<Event, IngestError> {
        let category = self.category.ok_or(IngestError::MissingCategory)?;
        let category =
            Category::from_str(&category).ok_or(IngestError::UnknownCategory(category))?;
        let value = self.value.ok_or(IngestError::MissingValue)?;
        let timestamp = self.timestamp.ok_or(IngestError::MissingTimestamp)?;
        let timestamp = DateTime::parse_from_rfc3339(timestamp.trim())
            .map_err(|_| IngestError::InvalidTimestamp(timestamp))?
            .with_timezone(&offset);
        Ok(Event {
            id: self.id,
            category,
            value,
            timestamp,
        })
    }
}

impl From<Event> for RawEvent {
    fn from(event: Event) -> Self {
        Self {
            id: event.id,
            category: Some(event.category.code().to_string()),
            value: Some(event.value),
            timestamp: Some(event.timestamp.to_rfc3339()),
        }
    }
}

/// A single rule's prediction, waiting in the pool for confluence
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candidate {
    pub rule_name: String,
    /// Predicted instant (always at second 30 of the target minute)
    pub predicted_time: Timestamp,
    /// Grouping key: `predicted_time` truncated to the minute
    pub target_minute_key: Timestamp,
    /// Instant the prediction was derived from (triggering event or anchor)
    pub base_time: Timestamp,
    pub created_at: Timestamp,
    pub window_end: Timestamp,
}

impl Candidate {
    pub fn new(
        rule_name: impl Into<String>,
        predicted_time: Timestamp,
        base_time: Timestamp,
        created_at: Timestamp,
    ) -> Self {
        Self {
            rule_name: rule_name.into(),
            predicted_time,
            target_minute_key: truncate_to_minute(predicted_time),
            base_time,
            created_at,
            window_end: at_second_30(predicted_time) + Duration::minutes(1),
        }
    }
}

/// Confluence strength of a signal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConfluenceLevel {
    /// Single-rule signal that bypassed grouping
    #[serde(rename = "DIRECT")]
    Direct,
    #[serde(rename = "LOW")]
    Low,
    #[serde(rename = "MED")]
    Medium,
    #[serde(rename = "HIGH")]
    High,
    #[serde(rename = "MIN")]
    Min,
}

impl fmt::Display for ConfluenceLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfluenceLevel::Direct => write!(f, "DIRECT"),
            ConfluenceLevel::Low => write!(f, "LOW"),
            ConfluenceLevel::Medium => write!(f, "MED"),
            ConfluenceLevel::High => write!(f, "HIGH"),
            ConfluenceLevel::Min => write!(f, "MIN"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SignalStatus {
    Waiting,
    Finalized,
}

/// Signal result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SignalResult {
    Pending,
    Win,
    Loss,
}

impl fmt::Display for SignalResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignalResult::Pending => write!(f, "PENDING"),
            SignalResult::Win => write!(f, "WIN"),
            SignalResult::Loss => write!(f, "LOSS"),
        }
    }
}

/// Trackable prediction with a resolution window
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signal {
    /// Unique signal ID
    pub id: String,
    pub target_minute_key: Timestamp,
    /// Midpoint of the window, at second 30 of the target minute
    pub predicted_time: Timestamp,
    /// Grouped contributors in insertion order, duplicates preserved
    pub contributing_rules: Vec<String>,
    /// Rules that attached directly without grouping
    #[serde(default)]
    pub direct_rules: Vec<String>,
    pub confluence_count: usize,
    pub level: ConfluenceLevel,
    pub status: SignalStatus,
    pub window_start: Timestamp,
    pub window_end: Timestamp,
    pub result: SignalResult,
    pub created_at: Timestamp,
    pub resolved_at: Option<Timestamp>,
}

impl Signal {
    pub(crate) fn waiting(predicted_time: Timestamp, level: ConfluenceLevel, now: Timestamp) -> Self {
        let predicted_time = at_second_30(predicted_time);
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            target_minute_key: truncate_to_minute(predicted_time),
            predicted_time,
            contributing_rules: Vec::new(),
            direct_rules: Vec::new(),
            confluence_count: 0,
            level,
            status: SignalStatus::Waiting,
            window_start: predicted_time - Duration::minutes(1),
            window_end: predicted_time + Duration::minutes(1),
            result: SignalResult::Pending,
            created_at: now,
            resolved_at: None,
        }
    }

    pub fn is_waiting(&self) -> bool {
        self.status == SignalStatus::Waiting
    }

    pub fn is_direct(&self) -> bool {
        self.contributing_rules.is_empty() && !self.direct_rules.is_empty()
    }

    /// Every rule occurrence that backs this signal, grouped first
    pub fn rules(&self) -> impl Iterator<Item = &str> {
        self.contributing_rules
            .iter()
            .chain(self.direct_rules.iter())
            .map(String::as_str)
    }

    pub(crate) fn finalize(&mut self, result: SignalResult, at: Timestamp) {
        self.status = SignalStatus::Finalized;
        self.result = result;
        self.resolved_at = Some(at);
    }
}

/// Zero the seconds and sub-seconds of an instant
pub fn truncate_to_minute(t: Timestamp) -> Timestamp {
    t - Duration::seconds(i64::from(t.second())) - Duration::nanoseconds(i64::from(t.nanosecond()))
}

/// Zero the minutes, seconds and sub-seconds of an instant
pub fn truncate_to_hour(t: Timestamp) -> Timestamp {
    truncate_to_minute(t) - Duration::minutes(i64::from(t.minute()))
}

/// Same minute, second 30
pub fn at_second_30(t: Timestamp) -> Timestamp {
    truncate_to_minute(t) + Duration::seconds(30)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(h: u32, m: u32, s: u32) -> Timestamp {
        FixedOffset::west_opt(3 * 3600)
            .unwrap()
            .with_ymd_and_hms(2024, 5, 10, h, m, s)
            .unwrap()
    }

    #[test]
    fn test_raw_event_parse() {
        let raw = RawEvent {
            id: Some("r1".into()),
            category: Some("red".into()),
            value: Some(7),
            timestamp: Some("2024-05-10T17:22:05Z".into()),
        };
        let event = raw.parse(FixedOffset::west_opt(3 * 3600).unwrap()).unwrap();
        assert_eq!(event.category, Category::Red);
        assert_eq!(event.timestamp, ts(14, 22, 5));
        assert_eq!(event.id.as_deref(), Some("r1"));

        let back = RawEvent::from(Event::new(Category::White, 0, ts(14, 22, 5)));
        assert_eq!(back.category.as_deref(), Some("0"));
    }

    #[test]
    fn test_raw_event_rejects_malformed() {
        let offset = FixedOffset::west_opt(3 * 3600).unwrap();
        let base = RawEvent {
            id: None,
            category: Some("black".into()),
            value: Some(3),
            timestamp: Some("2024-05-10T17:22:05Z".into()),
        };

        let missing = RawEvent {
            category: None,
            ..base.clone()
        };
        assert_eq!(missing.parse(offset), Err(IngestError::MissingCategory));

        let unknown = RawEvent {
            category: Some("green".into()),
            ..base.clone()
        };
        assert_eq!(unknown.parse(offset), Err(IngestError::UnknownCategory("green".into())));

        let no_time = RawEvent {
            timestamp: None,
            ..base.clone()
        };
        assert_eq!(no_time.parse(offset), Err(IngestError::MissingTimestamp));

        let bad_time = RawEvent {
            timestamp: Some("yesterday".into()),
            ..base
        };
        assert_eq!(bad_time.parse(offset), Err(IngestError::InvalidTimestamp("yesterday".into())));
    }

    #[test]
    fn test_category_codes() {
        assert_eq!(Category::from_code(0), Some(Category::White));
        assert_eq!(Category::from_code(2), Some(Category::Black));
        assert_eq!(Category::from_code(7), None);
        assert_eq!(Category::from_str(" Red "), Some(Category::Red));
        assert_eq!(Category::from_str("green"), None);
    }

    #[test]
    fn test_truncation_helpers() {
        let t = ts(14, 22, 47) + Duration::milliseconds(250);
        assert_eq!(truncate_to_minute(t), ts(14, 22, 0));
        assert_eq!(truncate_to_hour(t), ts(14, 0, 0));
        assert_eq!(at_second_30(t), ts(14, 22, 30));
    }

    #[test]
    fn test_candidate_window() {
        let c = Candidate::new("r", ts(14, 22, 30), ts(14, 10, 0), ts(14, 10, 1));
        assert_eq!(c.target_minute_key, ts(14, 22, 0));
        assert_eq!(c.window_end, ts(14, 23, 30));
    }

    #[test]
    fn test_signal_window_is_centered() {
        let s = Signal::waiting(ts(14, 22, 5), ConfluenceLevel::Direct, ts(14, 0, 0));
        assert_eq!(s.predicted_time, ts(14, 22, 30));
        assert_eq!(s.window_end - s.window_start, Duration::minutes(2));
        assert_eq!(s.predicted_time - s.window_start, s.window_end - s.predicted_time);
        assert!(s.is_waiting());
    }
}
