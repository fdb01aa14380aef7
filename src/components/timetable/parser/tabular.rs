use crate::components::timetable::models::{EventTiming, ScheduleEvent, NO_TITLE};
use crate::error::{parse_error, DashResult};
use tracing::debug;

const DATE_HEADERS: &[&str] = &["date", "day", "datum", "den"];
const TIME_HEADERS: &[&str] = &["time", "hours", "čas", "cas", "hodina", "od"];
const SUBJECT_HEADERS: &[&str] = &["subject", "course", "title", "předmět", "predmet", "název", "nazev"];
const LOCATION_HEADERS: &[&str] = &["location", "room", "místnost", "mistnost", "učebna", "ucebna"];
const TEACHER_HEADERS: &[&str] = &["teacher", "lecturer", "vyučující", "vyucujici", "učitel", "ucitel"];

/// Column positions resolved from the header row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Columns {
    date: usize,
    time: Option<usize>,
    subject: Option<usize>,
    location: Option<usize>,
    teacher: Option<usize>,
}

impl Columns {
    fn resolve(headers: &csv::StringRecord) -> DashResult<Self> {
        let names: Vec<String> = headers
            .iter()
            .map(|h| h.trim_start_matches('\u{feff}').trim().to_lowercase())
            .collect();
        let find = |aliases: &[&str]| names.iter().position(|name| aliases.contains(&name.as_str()));

        let date = find(DATE_HEADERS)
            .ok_or_else(|| parse_error("table has no date column"))?;

        Ok(Self {
            date,
            time: find(TIME_HEADERS),
            subject: find(SUBJECT_HEADERS),
            location: find(LOCATION_HEADERS),
            teacher: find(TEACHER_HEADERS),
        })
    }
}

/// Most frequent of `;`, `,` and tab in the header line, `,` on ties
fn sniff_delimiter(header_line: &str) -> u8 {
    let count = |c: char| header_line.matches(c).count();
    let candidates = [(b',', count(',')), (b';', count(';')), (b'\t', count('\t'))];

    candidates
        .iter()
        .fold((b',', 0), |best, &(delim, n)| if n > best.1 { (delim, n) } else { best })
        .0
}

fn field(record: &csv::StringRecord, index: Option<usize>) -> String {
    index
        .and_then(|i| record.get(i))
        .map(|value| value.trim().to_string())
        .unwrap_or_default()
}

/// Parse a header-driven delimited table into slot events.
///
/// Rows with an empty date are dropped; the rest keep source order.
pub fn parse_table(text: &str) -> DashResult<Vec<ScheduleEvent>> {
    let text = text.trim_start_matches('\u{feff}');
    let header_line = text.lines().next().unwrap_or_default();
    if header_line.trim().is_empty() {
        return Err(parse_error("table has no header row"));
    }

    let delimiter = sniff_delimiter(header_line);
    let mut rdr = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(text.as_bytes());

    let headers = rdr
        .headers()
        .map_err(|e| parse_error(&format!("unreadable header row: {}", e)))?
        .clone();
    let columns = Columns::resolve(&headers)?;

    let mut events = Vec::new();
    let mut skipped = 0usize;

    for (index, result) in rdr.records().enumerate() {
        let record =
            result.map_err(|e| parse_error(&format!("malformed row {}: {}", index + 2, e)))?;

        let date = field(&record, Some(columns.date));
        if date.is_empty() {
            skipped += 1;
            continue;
        }

        let title = field(&record, columns.subject);
        let title = if title.is_empty() {
            NO_TITLE.to_string()
        } else {
            title
        };

        events.push(ScheduleEvent {
            title,
            timing: EventTiming::Slot {
                date,
                time: field(&record, columns.time),
            },
            location: field(&record, columns.location),
            description: String::new(),
            teacher: field(&record, columns.teacher),
            raw: record
                .iter()
                .collect::<Vec<_>>()
                .join(&char::from(delimiter).to_string()),
        });
    }

    if skipped > 0 {
        debug!(skipped, "Dropped table rows with empty date");
    }

    debug!(count = events.len(), "Parsed table rows");
    Ok(events)
}
