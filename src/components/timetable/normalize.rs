use super::models::{Advisory, DayKey, EventTiming, GroupedView, ScheduleEvent};
use crate::utils::time::{local_today, parse_slot_date};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use chrono_tz::Tz;

/// Day key of an event, or `None` when it started before `today`.
///
/// Slot dates that match no known format are always kept since they
/// cannot be compared with today.
fn classify(event: &ScheduleEvent, today: NaiveDate, tz: Tz) -> Option<DayKey> {
    match &event.timing {
        EventTiming::Instant { start, .. } => {
            let date = start.with_timezone(&tz).date_naive();
            (date >= today).then_some(DayKey::Date(date))
        }
        EventTiming::Slot { date, .. } => match parse_slot_date(date) {
            Some(date) => (date >= today).then_some(DayKey::Date(date)),
            None => Some(DayKey::Unparsed(date.trim().to_string())),
        },
    }
}

/// Group events by local day, keeping only those starting on or after
/// local midnight of `now`.
///
/// Events must already be in snapshot order; each day keeps that order.
pub fn group_by_day(events: &[ScheduleEvent], now: DateTime<Utc>, tz: Tz) -> GroupedView {
    let today = local_today(now, tz);
    let mut view = GroupedView::default();

    for event in events {
        if let Some(key) = classify(event, today, tz) {
            view.push(key, event.clone());
        }
    }

    view
}

/// Staleness advisory when `fetched_at` is older than `threshold`
pub fn staleness(fetched_at: DateTime<Utc>, now: DateTime<Utc>, threshold: Duration) -> Option<Advisory> {
    let age = now.signed_duration_since(fetched_at);
    (age > threshold).then(|| Advisory::Stale {
        age_hours: age.num_hours(),
    })
}
