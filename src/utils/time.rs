use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;

/// Days covered by an identifier-keyed export when the caller gives no window
pub const DEFAULT_WINDOW_DAYS: i64 = 14;

/// Date formats accepted for tabular date columns
const SLOT_DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%d.%m.%Y", "%d. %m. %Y", "%Y%m%d", "%d/%m/%Y"];

/// Calendar date of `now` in the given timezone
pub fn local_today(now: DateTime<Utc>, tz: Tz) -> NaiveDate {
    now.with_timezone(&tz).date_naive()
}

/// Resolve a wall-clock time in `tz` to an instant.
///
/// Ambiguous times (DST fold) take the earlier instant. Times inside a
/// DST gap are moved forward by an hour.
pub fn resolve_local(naive: NaiveDateTime, tz: Tz) -> Option<DateTime<Utc>> {
    tz.from_local_datetime(&naive)
        .earliest()
        .or_else(|| tz.from_local_datetime(&(naive + Duration::hours(1))).earliest())
        .map(|dt| dt.with_timezone(&Utc))
}

/// Instant of local midnight at the start of `date`
pub fn local_midnight(date: NaiveDate, tz: Tz) -> Option<DateTime<Utc>> {
    resolve_local(date.and_hms_opt(0, 0, 0)?, tz)
}

/// Default export window: today through today + 14 days
pub fn default_window(now: DateTime<Utc>, tz: Tz) -> (NaiveDate, NaiveDate) {
    let today = local_today(now, tz);
    (today, today + Duration::days(DEFAULT_WINDOW_DAYS))
}

/// Parse an HTTP date header such as `Last-Modified`
pub fn parse_http_date(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(value.trim())
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Parse the date column of a tabular export
pub fn parse_slot_date(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    SLOT_DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(value, format).ok())
}
