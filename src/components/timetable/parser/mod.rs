//! Decoding of raw schedule text into events.
//!
//! Both formats are parsed synchronously from fully buffered text.
//! A failure anywhere fails the whole document.

mod ical;
mod tabular;

pub use ical::parse_calendar;
pub use tabular::parse_table;

use super::models::{ScheduleEvent, SourceFormat};
use crate::error::DashResult;
use chrono_tz::Tz;

/// Parse `text` in the given format.
///
/// `tz` resolves floating and date-only calendar times.
pub fn parse(text: &str, format: SourceFormat, tz: Tz) -> DashResult<Vec<ScheduleEvent>> {
    match format {
        SourceFormat::ICalendar => parse_calendar(text, tz),
        SourceFormat::Tabular => parse_table(text),
    }
}
