//! iCalendar (RFC 5545) encode/decode for single-event payloads.
//!
//! Simple line-based parsing: unfold continuation lines, split
//! `NAME;PARAMS:VALUE`, and read the handful of VEVENT properties the
//! sync layer needs. Unknown properties pass through untouched; decoding
//! is best-effort and only fails when no VEVENT block exists at all.

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};

use crate::error::IcalError;
use crate::model::{Event, EventStatus, Frequency, RecurrenceRule, Weekday};

const PRODID: &str = "-//calsync//calsync//EN";

/// Render one event as a complete VCALENDAR document (CRLF line endings).
pub fn encode_event(event: &Event) -> String {
    let mut lines: Vec<String> = vec![
        "BEGIN:VCALENDAR".into(),
        "VERSION:2.0".into(),
        format!("PRODID:{PRODID}"),
        "BEGIN:VEVENT".into(),
        format!("UID:{}", event.uid),
        format!("DTSTAMP:{}", fmt_utc(event.modified)),
    ];

    if event.all_day {
        lines.push(format!(
            "DTSTART;VALUE=DATE:{}",
            event.start.format("%Y%m%d")
        ));
        lines.push(format!("DTEND;VALUE=DATE:{}", event.end.format("%Y%m%d")));
    } else {
        lines.push(format!("DTSTART:{}", fmt_utc(event.start)));
        lines.push(format!("DTEND:{}", fmt_utc(event.end)));
    }

    lines.push(format!("SUMMARY:{}", escape_text(&event.title)));
    if !event.description.is_empty() {
        lines.push(format!("DESCRIPTION:{}", escape_text(&event.description)));
    }
    if !event.location.is_empty() {
        lines.push(format!("LOCATION:{}", escape_text(&event.location)));
    }
    lines.push(format!(
        "STATUS:{}",
        event.status.as_str().to_ascii_uppercase()
    ));
    if let Some(rule) = &event.recurrence {
        lines.push(format!("RRULE:{}", encode_rrule(rule)));
    }
    for minutes in &event.reminders {
        lines.push("BEGIN:VALARM".into());
        lines.push("ACTION:DISPLAY".into());
        lines.push(format!("TRIGGER:-PT{minutes}M"));
        lines.push("END:VALARM".into());
    }
    lines.push("END:VEVENT".into());
    lines.push("END:VCALENDAR".into());
    lines.join("\r\n") + "\r\n"
}

/// Decode the first VEVENT of an iCalendar document.
pub fn decode_event(ics: &str) -> Result<Event, IcalError> {
    decode_events(ics)?
        .into_iter()
        .next()
        .ok_or(IcalError::NoVEvent)
}

/// Decode every VEVENT of an iCalendar document.
pub fn decode_events(ics: &str) -> Result<Vec<Event>, IcalError> {
    let lines = unfold_lines(ics);
    let mut events = Vec::new();
    let mut current: Option<Event> = None;
    let mut in_alarm = false;

    for line in &lines {
        let (name, params, value) = split_property(line);
        match name.as_str() {
            "BEGIN" if value == "VEVENT" => {
                current = Some(Event::empty());
                in_alarm = false;
            }
            "END" if value == "VEVENT" => {
                if let Some(event) = current.take() {
                    events.push(event);
                }
            }
            "BEGIN" if value == "VALARM" => in_alarm = true,
            "END" if value == "VALARM" => in_alarm = false,
            _ => {
                let Some(event) = current.as_mut() else {
                    continue;
                };
                if in_alarm {
                    if name == "TRIGGER" {
                        if let Some(minutes) = parse_trigger(value) {
                            event.reminders.push(minutes);
                        }
                    }
                    continue;
                }
                apply_property(event, &name, &params, value);
            }
        }
    }

    if events.is_empty() {
        return Err(IcalError::NoVEvent);
    }
    Ok(events)
}

fn apply_property(event: &mut Event, name: &str, params: &[(String, String)], value: &str) {
    match name {
        "UID" => event.uid = value.to_string(),
        "SUMMARY" => event.title = unescape_text(value),
        "DESCRIPTION" => event.description = unescape_text(value),
        "LOCATION" => event.location = unescape_text(value),
        "DTSTART" => {
            if let Some(dt) = parse_ical_datetime(value) {
                event.start = dt;
                event.all_day = is_date_only(params, value);
            }
        }
        "DTEND" => {
            if let Some(dt) = parse_ical_datetime(value) {
                event.end = dt;
            }
        }
        "CREATED" => {
            if let Some(dt) = parse_ical_datetime(value) {
                event.created = dt;
            }
        }
        "LAST-MODIFIED" => {
            if let Some(dt) = parse_ical_datetime(value) {
                event.modified = dt;
            }
        }
        "STATUS" => {
            event.status = EventStatus::parse(&value.to_ascii_lowercase());
            if event.status == EventStatus::Cancelled {
                event.cancelled = true;
            }
        }
        "RRULE" => event.recurrence = decode_rrule(value),
        _ => {}
    }
}

/// Join folded continuation lines (leading space or tab) with their parent.
fn unfold_lines(ics: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for raw in ics.lines() {
        if let Some(rest) = raw.strip_prefix(' ').or_else(|| raw.strip_prefix('\t')) {
            if let Some(last) = out.last_mut() {
                last.push_str(rest);
                continue;
            }
        }
        out.push(raw.to_string());
    }
    out
}

/// Split `NAME;PARAM=VAL;PARAM=VAL:value` into its three pieces.
fn split_property(line: &str) -> (String, Vec<(String, String)>, &str) {
    let Some(colon) = line.find(':') else {
        return (line.trim().to_ascii_uppercase(), Vec::new(), "");
    };
    let (head, value) = (&line[..colon], &line[colon + 1..]);
    let mut parts = head.split(';');
    let name = parts
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_uppercase();
    let params = parts
        .filter_map(|p| {
            let (k, v) = p.split_once('=')?;
            Some((k.trim().to_ascii_uppercase(), v.trim().to_string()))
        })
        .collect();
    (name, params, value)
}

fn is_date_only(params: &[(String, String)], value: &str) -> bool {
    params
        .iter()
        .any(|(k, v)| k == "VALUE" && v.eq_ignore_ascii_case("DATE"))
        || (value.len() == 8 && value.chars().all(|c| c.is_ascii_digit()))
}

/// Accepts `YYYYMMDD`, `YYYYMMDDTHHMMSSZ` and floating `YYYYMMDDTHHMMSS`
/// (treated as UTC).
fn parse_ical_datetime(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if value.len() == 8 {
        let date = NaiveDate::parse_from_str(value, "%Y%m%d").ok()?;
        return Some(Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0)?));
    }
    let bare = value.strip_suffix('Z').unwrap_or(value);
    let naive = NaiveDateTime::parse_from_str(bare, "%Y%m%dT%H%M%S").ok()?;
    Some(Utc.from_utc_datetime(&naive))
}

fn fmt_utc(dt: DateTime<Utc>) -> String {
    dt.format("%Y%m%dT%H%M%SZ").to_string()
}

/// `-PT15M` / `-PT1H` style alarm triggers, in minutes before start.
fn parse_trigger(value: &str) -> Option<i64> {
    let v = value.trim().strip_prefix('-')?;
    let v = v.strip_prefix("PT")?;
    if let Some(m) = v.strip_suffix('M') {
        return m.parse().ok();
    }
    if let Some(h) = v.strip_suffix('H') {
        return h.parse::<i64>().ok().map(|h| h * 60);
    }
    None
}

fn escape_text(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            ';' => out.push_str("\\;"),
            ',' => out.push_str("\\,"),
            '\n' => out.push_str("\\n"),
            '\r' => {}
            _ => out.push(c),
        }
    }
    out
}

fn unescape_text(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
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

// --- RRULE ---

fn encode_rrule(rule: &RecurrenceRule) -> String {
    let freq = match rule.frequency {
        Frequency::Daily => "DAILY",
        Frequency::Weekly => "WEEKLY",
        Frequency::Monthly => "MONTHLY",
        Frequency::Yearly => "YEARLY",
    };
    let mut parts = vec![format!("FREQ={freq}")];
    if rule.interval > 1 {
        parts.push(format!("INTERVAL={}", rule.interval));
    }
    if rule.count > 0 {
        parts.push(format!("COUNT={}", rule.count));
    }
    if let Some(until) = rule.until {
        parts.push(format!("UNTIL={}", fmt_utc(until)));
    }
    if !rule.by_day.is_empty() {
        let days: Vec<&str> = rule.by_day.iter().map(weekday_code).collect();
        parts.push(format!("BYDAY={}", days.join(",")));
    }
    if !rule.by_month_day.is_empty() {
        let days: Vec<String> = rule.by_month_day.iter().map(u8::to_string).collect();
        parts.push(format!("BYMONTHDAY={}", days.join(",")));
    }
    if !rule.by_month.is_empty() {
        let months: Vec<String> = rule.by_month.iter().map(u8::to_string).collect();
        parts.push(format!("BYMONTH={}", months.join(",")));
    }
    parts.join(";")
}

fn decode_rrule(value: &str) -> Option<RecurrenceRule> {
    let mut rule = RecurrenceRule {
        frequency: Frequency::Daily,
        interval: 1,
        count: 0,
        until: None,
        by_day: Vec::new(),
        by_month_day: Vec::new(),
        by_month: Vec::new(),
    };
    let mut has_freq = false;

    for part in value.split(';') {
        let Some((key, val)) = part.split_once('=') else {
            continue;
        };
        match key.trim().to_ascii_uppercase().as_str() {
            "FREQ" => {
                rule.frequency = match val.to_ascii_uppercase().as_str() {
                    "DAILY" => Frequency::Daily,
                    "WEEKLY" => Frequency::Weekly,
                    "MONTHLY" => Frequency::Monthly,
                    "YEARLY" => Frequency::Yearly,
                    _ => continue,
                };
                has_freq = true;
            }
            "INTERVAL" => rule.interval = val.parse().unwrap_or(1),
            "COUNT" => rule.count = val.parse().unwrap_or(0),
            "UNTIL" => rule.until = parse_ical_datetime(val),
            "BYDAY" => {
                rule.by_day = val.split(',').filter_map(parse_weekday).collect();
            }
            "BYMONTHDAY" => {
                rule.by_month_day = val.split(',').filter_map(|d| d.parse().ok()).collect();
            }
            "BYMONTH" => {
                rule.by_month = val.split(',').filter_map(|m| m.parse().ok()).collect();
            }
            _ => {}
        }
    }

    has_freq.then_some(rule)
}

fn weekday_code(day: &Weekday) -> &'static str {
    match day {
        Weekday::Monday => "MO",
        Weekday::Tuesday => "TU",
        Weekday::Wednesday => "WE",
        Weekday::Thursday => "TH",
        Weekday::Friday => "FR",
        Weekday::Saturday => "SA",
        Weekday::Sunday => "SU",
    }
}

fn parse_weekday(code: &str) -> Option<Weekday> {
    // Ignore ordinal prefixes like 2MO.
    let code: String = code
        .chars()
        .filter(|c| c.is_ascii_alphabetic())
        .collect::<String>()
        .to_ascii_uppercase();
    Some(match code.as_str() {
        "MO" => Weekday::Monday,
        "TU" => Weekday::Tuesday,
        "WE" => Weekday::Wednesday,
        "TH" => Weekday::Thursday,
        "FR" => Weekday::Friday,
        "SA" => Weekday::Saturday,
        "SU" => Weekday::Sunday,
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn encode_produces_crlf_vcalendar() {
        let event = Event::new(
            "cal",
            "Standup",
            ts("2024-06-10T09:00:00Z"),
            ts("2024-06-10T09:15:00Z"),
        );
        let ics = encode_event(&event);
        assert!(ics.starts_with("BEGIN:VCALENDAR\r\n"));
        assert!(ics.contains("\r\nDTSTART:20240610T090000Z\r\n"));
        assert!(ics.contains("\r\nSUMMARY:Standup\r\n"));
        assert!(ics.ends_with("END:VCALENDAR\r\n"));
    }

    #[test]
    fn timed_event_round_trips() {
        let mut event = Event::new(
            "cal",
            "Plan; review, etc",
            ts("2024-06-10T09:00:00Z"),
            ts("2024-06-10T10:30:00Z"),
        );
        event.description = "Line one\nLine two".into();
        event.location = "Room 4".into();
        event.status = EventStatus::Tentative;
        event.reminders = vec![15];

        let decoded = decode_event(&encode_event(&event)).unwrap();
        assert_eq!(decoded.uid, event.uid);
        assert_eq!(decoded.title, event.title);
        assert_eq!(decoded.description, event.description);
        assert_eq!(decoded.location, event.location);
        assert_eq!(decoded.start, event.start);
        assert_eq!(decoded.end, event.end);
        assert_eq!(decoded.status, EventStatus::Tentative);
        assert_eq!(decoded.reminders, vec![15]);
        assert!(!decoded.all_day);
    }

    #[test]
    fn value_date_means_all_day() {
        let ics = "BEGIN:VCALENDAR\r\nBEGIN:VEVENT\r\nUID:u1\r\nSUMMARY:Holiday\r\n\
                   DTSTART;VALUE=DATE:20240610\r\nDTEND;VALUE=DATE:20240611\r\n\
                   END:VEVENT\r\nEND:VCALENDAR\r\n";
        let event = decode_event(ics).unwrap();
        assert!(event.all_day);
        assert_eq!(event.start, ts("2024-06-10T00:00:00Z"));
        assert_eq!(event.end, ts("2024-06-11T00:00:00Z"));
    }

    #[test]
    fn all_day_event_encodes_date_values() {
        let mut event = Event::new(
            "cal",
            "Holiday",
            ts("2024-06-10T00:00:00Z"),
            ts("2024-06-11T00:00:00Z"),
        );
        event.all_day = true;
        let ics = encode_event(&event);
        assert!(ics.contains("DTSTART;VALUE=DATE:20240610"));
        assert!(ics.contains("DTEND;VALUE=DATE:20240611"));
    }

    #[test]
    fn floating_time_is_read_as_utc() {
        let ics = "BEGIN:VEVENT\r\nUID:u\r\nSUMMARY:x\r\n\
                   DTSTART:20240610T090000\r\nDTEND:20240610T100000\r\nEND:VEVENT\r\n";
        let event = decode_event(ics).unwrap();
        assert_eq!(event.start, ts("2024-06-10T09:00:00Z"));
    }

    #[test]
    fn folded_lines_are_unfolded() {
        let ics = "BEGIN:VEVENT\r\nUID:u\r\nSUMMARY:A very long\r\n  title indeed\r\n\
                   DTSTART:20240610T090000Z\r\nDTEND:20240610T100000Z\r\nEND:VEVENT\r\n";
        let event = decode_event(ics).unwrap();
        assert_eq!(event.title, "A very long title indeed");
    }

    #[test]
    fn no_vevent_is_an_error() {
        let err = decode_event("BEGIN:VCALENDAR\r\nEND:VCALENDAR\r\n").unwrap_err();
        assert!(matches!(err, IcalError::NoVEvent));
    }

    #[test]
    fn multiple_vevents_decode_in_order() {
        let ics = "BEGIN:VCALENDAR\r\n\
                   BEGIN:VEVENT\r\nUID:a\r\nSUMMARY:first\r\n\
                   DTSTART:20240610T090000Z\r\nDTEND:20240610T100000Z\r\nEND:VEVENT\r\n\
                   BEGIN:VEVENT\r\nUID:b\r\nSUMMARY:second\r\n\
                   DTSTART:20240611T090000Z\r\nDTEND:20240611T100000Z\r\nEND:VEVENT\r\n\
                   END:VCALENDAR\r\n";
        let events = decode_events(ics).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].uid, "a");
        assert_eq!(events[1].uid, "b");
    }

    #[test]
    fn rrule_round_trips() {
        let rule = RecurrenceRule {
            frequency: Frequency::Weekly,
            interval: 2,
            count: 10,
            until: None,
            by_day: vec![Weekday::Monday, Weekday::Thursday],
            by_month_day: vec![],
            by_month: vec![],
        };
        let encoded = encode_rrule(&rule);
        assert_eq!(encoded, "FREQ=WEEKLY;INTERVAL=2;COUNT=10;BYDAY=MO,TH");
        assert_eq!(decode_rrule(&encoded), Some(rule));
    }

    #[test]
    fn rrule_without_freq_is_ignored() {
        assert_eq!(decode_rrule("INTERVAL=2;COUNT=3"), None);
    }

    #[test]
    fn cancelled_status_sets_both_fields() {
        let ics = "BEGIN:VEVENT\r\nUID:u\r\nSUMMARY:x\r\nSTATUS:CANCELLED\r\n\
                   DTSTART:20240610T090000Z\r\nDTEND:20240610T100000Z\r\nEND:VEVENT\r\n";
        let event = decode_event(ics).unwrap();
        assert_eq!(event.status, EventStatus::Cancelled);
        assert!(event.cancelled);

        let ics = "BEGIN:VEVENT\r\nUID:u\r\nSUMMARY:x\r\nSTATUS:TENTATIVE\r\n\
                   DTSTART:20240610T090000Z\r\nDTEND:20240610T100000Z\r\nEND:VEVENT\r\n";
        let event = decode_event(ics).unwrap();
        assert!(!event.cancelled);
    }
}
