use chrono::{DateTime, NaiveDate, NaiveDateTime};

/// Shown when an event has neither a start nor an end.
pub const DATE_NOT_SPECIFIED: &str = "Date and time not specified";

const DATE_TIME_FORMAT: &str = "%B %d, %Y %I:%M %p";
const TIME_FORMAT: &str = "%I:%M %p";

/// Parse a remote timestamp. Offsets are dropped in favour of the local wall
/// clock they describe; date-only values are taken as midnight.
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.naive_local());
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(dt);
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M") {
        return Some(dt);
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

fn format_full(raw: &str) -> String {
    match parse_timestamp(raw) {
        Some(dt) => dt.format(DATE_TIME_FORMAT).to_string(),
        None => raw.to_string(),
    }
}

/// Build the human-readable date range shown for an event.
pub fn human_readable_date(start: Option<&str>, end: Option<&str>) -> String {
    let start = start.filter(|s| !s.is_empty());
    let end = end.filter(|s| !s.is_empty());

    match (start, end) {
        (None, None) => DATE_NOT_SPECIFIED.to_string(),
        // A start on its own keeps the trailing separator space.
        (Some(start), None) => format!("{} ", format_full(start)),
        (None, Some(end)) => format!("Ends on {}", format_full(end)),
        (Some(start), Some(end)) => match (parse_timestamp(start), parse_timestamp(end)) {
            (Some(s), Some(e)) if s.date() == e.date() => format!(
                "{} → {}",
                s.format(DATE_TIME_FORMAT),
                e.format(TIME_FORMAT)
            ),
            _ => format!("{} → {}", format_full(start), format_full(end)),
        },
    }
}

/// Join a base URL and a relative path with exactly one slash between them.
pub fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}
