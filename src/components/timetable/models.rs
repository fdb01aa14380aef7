use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::btree_map;
use std::collections::BTreeMap;
use std::fmt;

/// Title used when the source record has none
pub const NO_TITLE: &str = "No Title";

/// Text format of a schedule source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SourceFormat {
    /// iCalendar (`.ics`) document
    ICalendar,
    /// Header-driven delimited table export
    Tabular,
}

/// Ingestion path that produced a snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    File,
    StaticEndpoint,
    Identifier,
}

/// When an event happens.
///
/// Calendar sources give real instants. Tabular exports only give
/// display strings for the date and time, which are kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventTiming {
    Instant {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
    Slot {
        date: String,
        time: String,
    },
}

/// A single schedule entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleEvent {
    pub title: String,
    pub timing: EventTiming,
    pub location: String,
    pub description: String,
    pub teacher: String,
    /// Source record, for diagnostics only
    pub raw: String,
}

// `raw` is ignored: two events are the same entry however the source spelled them
impl PartialEq for ScheduleEvent {
    fn eq(&self, other: &Self) -> bool {
        self.title == other.title
            && self.timing == other.timing
            && self.location == other.location
            && self.description == other.description
            && self.teacher == other.teacher
    }
}

/// Ordering key of an event inside a snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SortKey<'a> {
    At(DateTime<Utc>),
    Text(&'a str, &'a str),
}

impl ScheduleEvent {
    /// Start instant, if the source provided one
    pub fn start(&self) -> Option<DateTime<Utc>> {
        match &self.timing {
            EventTiming::Instant { start, .. } => Some(*start),
            EventTiming::Slot { .. } => None,
        }
    }

    /// End instant, if the source provided one
    pub fn end(&self) -> Option<DateTime<Utc>> {
        match &self.timing {
            EventTiming::Instant { end, .. } => Some(*end),
            EventTiming::Slot { .. } => None,
        }
    }

    /// Key used for the chronological sort
    pub fn sort_key(&self) -> SortKey<'_> {
        match &self.timing {
            EventTiming::Instant { start, .. } => SortKey::At(*start),
            EventTiming::Slot { date, time } => SortKey::Text(date, time),
        }
    }
}

/// One complete ingestion result.
///
/// Built once and never modified; a refresh produces a new snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleSnapshot {
    events: Vec<ScheduleEvent>,
    fetched_at: DateTime<Utc>,
    source: SourceKind,
}

impl ScheduleSnapshot {
    /// Build a snapshot, sorting events by start while keeping source order on ties
    pub fn new(mut events: Vec<ScheduleEvent>, fetched_at: DateTime<Utc>, source: SourceKind) -> Self {
        events.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));

        Self {
            events,
            fetched_at,
            source,
        }
    }

    pub fn events(&self) -> &[ScheduleEvent] {
        &self.events
    }

    pub fn fetched_at(&self) -> DateTime<Utc> {
        self.fetched_at
    }

    pub fn source(&self) -> SourceKind {
        self.source
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

/// Calendar day an event is grouped under
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DayKey {
    Date(NaiveDate),
    /// Tabular date string that matched no known date format
    Unparsed(String),
}

impl fmt::Display for DayKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DayKey::Date(date) => write!(f, "{}", date.format("%A, %B %-d, %Y")),
            DayKey::Unparsed(raw) => f.write_str(raw),
        }
    }
}

/// Upcoming events grouped by day, computed at read time
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GroupedView {
    days: BTreeMap<DayKey, Vec<ScheduleEvent>>,
}

impl GroupedView {
    pub(crate) fn push(&mut self, key: DayKey, event: ScheduleEvent) {
        self.days.entry(key).or_default().push(event);
    }

    /// Days in chronological order
    pub fn days(&self) -> btree_map::Iter<'_, DayKey, Vec<ScheduleEvent>> {
        self.days.iter()
    }

    /// Events of one day
    pub fn get(&self, key: &DayKey) -> Option<&[ScheduleEvent]> {
        self.days.get(key).map(Vec::as_slice)
    }

    /// Number of days with at least one event
    pub fn len(&self) -> usize {
        self.days.len()
    }

    pub fn is_empty(&self) -> bool {
        self.days.is_empty()
    }

    /// Total number of events across all days
    pub fn event_count(&self) -> usize {
        self.days.values().map(Vec::len).sum()
    }
}

/// Non-fatal notice shown next to the timetable
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Advisory {
    /// The static endpoint has no timetable yet
    NotConfigured,
    /// Transport failure, a later refresh may succeed
    NetworkError(String),
    /// Rejected request or malformed source
    Error(String),
    /// The snapshot is older than the freshness threshold
    Stale { age_hours: i64 },
}

impl Advisory {
    /// Whether the user can dismiss the notice
    pub fn is_dismissible(&self) -> bool {
        matches!(self, Advisory::NetworkError(_) | Advisory::Stale { .. })
    }

    pub fn message(&self) -> String {
        match self {
            Advisory::NotConfigured => "No timetable configured".to_string(),
            Advisory::NetworkError(cause) => {
                format!("Could not reach the timetable source: {}", cause)
            }
            Advisory::Error(cause) => cause.clone(),
            Advisory::Stale { age_hours } => format!(
                "Timetable data is {} hours old. Consider refreshing to get the latest schedule.",
                age_hours
            ),
        }
    }
}

impl fmt::Display for Advisory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message())
    }
}
