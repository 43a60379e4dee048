//! Domain model: accounts, calendars, events and recurrence rules.
//!
//! These are plain data types shared by the store, the providers and the
//! iCalendar codec. The only behavior here is a handful of derived
//! predicates on [`Event`].

use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// The kind of calendar source an account connects to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountType {
    Local,
    Google,
    Apple,
    Outlook,
    Samsung,
    #[serde(rename = "caldav")]
    CalDav,
}

impl AccountType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountType::Local => "local",
            AccountType::Google => "google",
            AccountType::Apple => "apple",
            AccountType::Outlook => "outlook",
            AccountType::Samsung => "samsung",
            AccountType::CalDav => "caldav",
        }
    }

    /// Parse the database/wire form. Unknown values fall back to `local`,
    /// which has no remote side effects.
    pub fn parse(s: &str) -> AccountType {
        match s {
            "google" => AccountType::Google,
            "apple" => AccountType::Apple,
            "outlook" => AccountType::Outlook,
            "samsung" => AccountType::Samsung,
            "caldav" => AccountType::CalDav,
            _ => AccountType::Local,
        }
    }
}

/// A configured calendar source (local or remote) with its credentials.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: String,
    pub name: String,
    pub kind: AccountType,
    pub email: String,
    pub enabled: bool,

    // Connection details
    pub server_url: String,
    pub username: String,

    // OAuth tokens
    pub access_token: String,
    pub refresh_token: String,
    pub token_expiry: Option<DateTime<Utc>>,

    // App password (for non-OAuth providers)
    pub app_password: String,

    pub last_sync: Option<DateTime<Utc>>,
}

impl Account {
    /// A fresh account of the given kind with a generated identifier.
    pub fn new(name: impl Into<String>, kind: AccountType) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            kind,
            email: String::new(),
            enabled: true,
            server_url: String::new(),
            username: String::new(),
            access_token: String::new(),
            refresh_token: String::new(),
            token_expiry: None,
            app_password: String::new(),
            last_sync: None,
        }
    }
}

/// A named event container owned by exactly one account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Calendar {
    pub id: String,
    pub account_id: String,
    pub name: String,
    pub description: String,
    pub color: String,
    pub visible: bool,
    pub read_only: bool,

    // Sync metadata
    pub sync_token: String,
    pub last_sync: Option<DateTime<Utc>>,
}

/// Default display color for calendars without one.
pub const DEFAULT_CALENDAR_COLOR: &str = "#4285f4";

impl Calendar {
    pub fn new(account_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            account_id: account_id.into(),
            name: name.into(),
            description: String::new(),
            color: DEFAULT_CALENDAR_COLOR.to_string(),
            visible: true,
            read_only: false,
            sync_token: String::new(),
            last_sync: None,
        }
    }
}

/// Status of an event as reported by the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    Confirmed,
    Tentative,
    Cancelled,
}

impl EventStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventStatus::Confirmed => "confirmed",
            EventStatus::Tentative => "tentative",
            EventStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> EventStatus {
        match s {
            "tentative" => EventStatus::Tentative,
            "cancelled" => EventStatus::Cancelled,
            _ => EventStatus::Confirmed,
        }
    }
}

/// Recurrence frequency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Frequency {
    Daily,
    Weekly,
    Monthly,
    Yearly,
}

/// Day of the week, iCalendar two-letter form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Weekday {
    #[serde(rename = "MO")]
    Monday,
    #[serde(rename = "TU")]
    Tuesday,
    #[serde(rename = "WE")]
    Wednesday,
    #[serde(rename = "TH")]
    Thursday,
    #[serde(rename = "FR")]
    Friday,
    #[serde(rename = "SA")]
    Saturday,
    #[serde(rename = "SU")]
    Sunday,
}

/// How an event repeats. Stored and round-tripped, never expanded into
/// concrete occurrences here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecurrenceRule {
    pub frequency: Frequency,
    /// Every N days/weeks/months/years.
    pub interval: u32,
    /// Number of occurrences, 0 = unbounded.
    pub count: u32,
    /// End instant, None = unbounded.
    pub until: Option<DateTime<Utc>>,
    /// For weekly rules: which days.
    #[serde(default)]
    pub by_day: Vec<Weekday>,
    /// For monthly rules: which days of the month.
    #[serde(default)]
    pub by_month_day: Vec<u8>,
    /// For yearly rules: which months.
    #[serde(default)]
    pub by_month: Vec<u8>,
}

/// A single calendar entry, owned by exactly one calendar.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    pub calendar_id: String,
    /// iCalendar UID, the wire-format identity (distinct from `id`).
    pub uid: String,
    pub title: String,
    pub description: String,
    pub location: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub all_day: bool,
    pub color: String,

    pub recurrence: Option<RecurrenceRule>,
    /// Reminder offsets in minutes before the event start.
    #[serde(default)]
    pub reminders: Vec<i64>,

    // Metadata
    pub created: DateTime<Utc>,
    pub modified: DateTime<Utc>,
    /// Provider change-detection token.
    pub etag: String,

    pub status: EventStatus,
    pub cancelled: bool,
}

/// The zero instant used when a provider supplies no usable timestamp.
pub fn zero_instant() -> DateTime<Utc> {
    Utc.timestamp_opt(0, 0).single().unwrap_or_else(Utc::now)
}

impl Event {
    /// A fresh event on the given calendar, spanning the given interval.
    pub fn new(
        calendar_id: impl Into<String>,
        title: impl Into<String>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Self {
        let id = uuid::Uuid::new_v4().to_string();
        Self {
            uid: id.clone(),
            id,
            calendar_id: calendar_id.into(),
            title: title.into(),
            description: String::new(),
            location: String::new(),
            start,
            end,
            all_day: false,
            color: String::new(),
            recurrence: None,
            reminders: Vec::new(),
            created: Utc::now(),
            modified: Utc::now(),
            etag: String::new(),
            status: EventStatus::Confirmed,
            cancelled: false,
        }
    }

    /// An event with every field at its zero value, for decode paths that
    /// fill fields in best-effort.
    pub fn empty() -> Self {
        Self {
            id: String::new(),
            calendar_id: String::new(),
            uid: String::new(),
            title: String::new(),
            description: String::new(),
            location: String::new(),
            start: zero_instant(),
            end: zero_instant(),
            all_day: false,
            color: String::new(),
            recurrence: None,
            reminders: Vec::new(),
            created: zero_instant(),
            modified: zero_instant(),
            etag: String::new(),
            status: EventStatus::Confirmed,
            cancelled: false,
        }
    }

    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    pub fn is_recurring(&self) -> bool {
        self.recurrence.is_some()
    }

    /// Two events overlap iff each one's start precedes the other's end.
    pub fn overlaps(&self, other: &Event) -> bool {
        self.start < other.end && self.end > other.start
    }

    /// Whether the given instant falls within `[start, end)`.
    pub fn contains_instant(&self, t: DateTime<Utc>) -> bool {
        t >= self.start && t < self.end
    }

    /// Whether the event's interval intersects the day `[D 00:00, D+1 00:00)`.
    pub fn is_on_date(&self, date: chrono::NaiveDate) -> bool {
        let day_start = Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0).unwrap_or_default());
        let day_end = day_start + Duration::hours(24);
        self.start < day_end && self.end > day_start
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn ts(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn account_type_serde_form_matches_as_str() {
        for kind in [
            AccountType::Local,
            AccountType::Google,
            AccountType::Apple,
            AccountType::Outlook,
            AccountType::Samsung,
            AccountType::CalDav,
        ] {
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json, format!("\"{}\"", kind.as_str()));
            let back: AccountType = serde_json::from_str(&json).unwrap();
            assert_eq!(back, kind);
        }
    }

    #[test]
    fn overlap_is_half_open() {
        let a = Event::new("c", "a", ts("2024-06-10T09:00:00Z"), ts("2024-06-10T10:00:00Z"));
        let b = Event::new("c", "b", ts("2024-06-10T10:00:00Z"), ts("2024-06-10T11:00:00Z"));
        let c = Event::new("c", "c", ts("2024-06-10T09:30:00Z"), ts("2024-06-10T09:45:00Z"));
        assert!(!a.overlaps(&b));
        assert!(!b.overlaps(&a));
        assert!(a.overlaps(&c));
        assert!(c.overlaps(&a));
    }

    #[test]
    fn is_on_date_spans_midnight() {
        let e = Event::new("c", "late", ts("2024-06-10T23:00:00Z"), ts("2024-06-11T01:00:00Z"));
        assert!(e.is_on_date(NaiveDate::from_ymd_opt(2024, 6, 10).unwrap()));
        assert!(e.is_on_date(NaiveDate::from_ymd_opt(2024, 6, 11).unwrap()));
        assert!(!e.is_on_date(NaiveDate::from_ymd_opt(2024, 6, 9).unwrap()));
    }

    #[test]
    fn contains_instant_excludes_end() {
        let e = Event::new("c", "x", ts("2024-06-10T09:00:00Z"), ts("2024-06-10T10:00:00Z"));
        assert!(e.contains_instant(ts("2024-06-10T09:00:00Z")));
        assert!(e.contains_instant(ts("2024-06-10T09:59:59Z")));
        assert!(!e.contains_instant(ts("2024-06-10T10:00:00Z")));
    }

    #[test]
    fn duration_subtracts() {
        let e = Event::new("c", "x", ts("2024-06-10T09:00:00Z"), ts("2024-06-10T09:15:00Z"));
        assert_eq!(e.duration(), Duration::minutes(15));
    }
}
