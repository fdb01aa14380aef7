use crate::components::timetable::models::{EventTiming, ScheduleEvent, NO_TITLE};
use crate::error::{parse_error, DashResult};
use crate::utils::time::{local_midnight, resolve_local};
use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;
use icalendar::parser::{read_calendar, unfold, Component};
use icalendar::{CalendarDateTime, DatePerhapsTime};
use tracing::debug;

/// Parse an iCalendar document into events, one per VEVENT.
///
/// Missing SUMMARY becomes [`NO_TITLE`]. Without DTEND the end is derived
/// from DURATION, or is the start when both are missing.
pub fn parse_calendar(text: &str, tz: Tz) -> DashResult<Vec<ScheduleEvent>> {
    if text.trim().is_empty() {
        return Err(parse_error("calendar file is empty"));
    }

    let unfolded = unfold(text);
    check_structure(&unfolded)?;

    let calendar = read_calendar(&unfolded)
        .map_err(|e| parse_error(&format!("malformed calendar: {}", e)))?;

    let mut vevents = Vec::new();
    collect_vevents(&calendar.components, &mut vevents);

    let events = vevents
        .into_iter()
        .enumerate()
        .map(|(index, vevent)| to_event(vevent, index, tz))
        .collect::<DashResult<Vec<_>>>()?;

    debug!(count = events.len(), "Parsed calendar events");
    Ok(events)
}

/// Check that BEGIN/END lines nest properly inside a VCALENDAR.
///
/// The parser accepts truncated input, which must not yield a partial schedule.
fn check_structure(unfolded: &str) -> DashResult<()> {
    let mut open: Vec<String> = Vec::new();
    let mut saw_calendar = false;

    for line in unfolded.lines() {
        if let Some(name) = strip_keyword(line, "BEGIN:") {
            if name == "VCALENDAR" {
                saw_calendar = true;
            }
            open.push(name);
        } else if let Some(name) = strip_keyword(line, "END:") {
            match open.pop() {
                Some(begun) if begun == name => {}
                Some(begun) => {
                    return Err(parse_error(&format!(
                        "END:{} does not close BEGIN:{}",
                        name, begun
                    )))
                }
                None => {
                    return Err(parse_error(&format!(
                        "END:{} without matching BEGIN",
                        name
                    )))
                }
            }
        }
    }

    if !saw_calendar {
        return Err(parse_error("no VCALENDAR component found"));
    }

    if let Some(begun) = open.pop() {
        return Err(parse_error(&format!("BEGIN:{} is never closed", begun)));
    }

    Ok(())
}

/// Upper-cased component name after a BEGIN:/END: keyword
fn strip_keyword(line: &str, keyword: &str) -> Option<String> {
    let head = line.get(..keyword.len())?;
    if !head.eq_ignore_ascii_case(keyword) {
        return None;
    }

    Some(line[keyword.len()..].trim().to_ascii_uppercase())
}

fn collect_vevents<'a, 'b>(components: &'b [Component<'a>], found: &mut Vec<&'b Component<'a>>) {
    for component in components {
        if component.name.as_str().eq_ignore_ascii_case("VEVENT") {
            found.push(component);
        } else {
            collect_vevents(&component.components, found);
        }
    }
}

fn to_event(vevent: &Component<'_>, index: usize, tz: Tz) -> DashResult<ScheduleEvent> {
    let start_prop = vevent
        .find_prop("DTSTART")
        .ok_or_else(|| parse_error(&format!("event #{} has no DTSTART", index + 1)))?;
    let start = DatePerhapsTime::try_from(start_prop)
        .ok()
        .and_then(|value| to_instant(value, tz))
        .ok_or_else(|| parse_error(&format!("event #{} has an invalid DTSTART", index + 1)))?;

    // An unreadable DTEND is treated like a missing one
    let end = vevent
        .find_prop("DTEND")
        .and_then(|prop| DatePerhapsTime::try_from(prop).ok())
        .and_then(|value| to_instant(value, tz))
        .or_else(|| {
            vevent
                .find_prop("DURATION")
                .and_then(|prop| parse_duration(prop.val.as_ref()))
                .and_then(|duration| start.checked_add_signed(duration))
        })
        .map(|end| end.max(start))
        .unwrap_or(start);

    let title = text_prop(vevent, "SUMMARY")
        .filter(|title| !title.trim().is_empty())
        .unwrap_or_else(|| NO_TITLE.to_string());

    Ok(ScheduleEvent {
        title,
        timing: EventTiming::Instant { start, end },
        location: text_prop(vevent, "LOCATION").unwrap_or_default(),
        description: text_prop(vevent, "DESCRIPTION").unwrap_or_default(),
        teacher: String::new(),
        raw: raw_record(vevent),
    })
}

fn to_instant(value: DatePerhapsTime, tz: Tz) -> Option<DateTime<Utc>> {
    match value {
        DatePerhapsTime::Date(date) => local_midnight(date, tz),
        DatePerhapsTime::DateTime(CalendarDateTime::Utc(date_time)) => Some(date_time),
        DatePerhapsTime::DateTime(CalendarDateTime::Floating(naive)) => resolve_local(naive, tz),
        DatePerhapsTime::DateTime(CalendarDateTime::WithTimezone { date_time, tzid }) => {
            let zone = tzid.parse::<Tz>().unwrap_or_else(|_| {
                debug!(%tzid, "Unknown TZID, using configured timezone");
                tz
            });
            resolve_local(date_time, zone)
        }
    }
}

/// RFC 5545 dur-value such as `PT1H30M` or `P1W`
fn parse_duration(value: &str) -> Option<Duration> {
    let value = value.trim();
    let (negative, value) = match value.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, value.strip_prefix('+').unwrap_or(value)),
    };

    let parsed = iso8601::duration(value).ok()?;
    let duration = Duration::from_std(parsed.into()).ok()?;
    Some(if negative { -duration } else { duration })
}

fn text_prop(vevent: &Component<'_>, name: &str) -> Option<String> {
    vevent
        .find_prop(name)
        .map(|prop| unescape_text(prop.val.as_ref()))
}

/// Undo RFC 5545 TEXT escaping
fn unescape_text(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();

    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') | Some('N') => out.push('\n'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }

    out
}

fn raw_record(vevent: &Component<'_>) -> String {
    vevent
        .properties
        .iter()
        .map(|prop| format!("{}:{}", prop.name.as_ref(), prop.val.as_ref()))
        .collect::<Vec<_>>()
        .join("\n")
}
