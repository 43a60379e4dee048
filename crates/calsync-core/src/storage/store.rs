//! SQLite persistence for accounts, calendars and events.
//!
//! One physical connection behind a mutex: every statement executes
//! atomically and writers never interleave. Saves are field-level upserts
//! (`ON CONFLICT DO UPDATE`), never `REPLACE`, so an update can never fire
//! the cascade deletes that a delete-then-insert would.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, NaiveDate, SecondsFormat, TimeZone, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::error::StoreError;
use crate::model::{
    Account, AccountType, Calendar, Event, EventStatus, RecurrenceRule, zero_instant,
    DEFAULT_CALENDAR_COLOR,
};

/// Calendar database.
pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    /// Open (and migrate) the database at the given path.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir).map_err(|e| StoreError::MigrationFailed(e.to_string()))?;
        }
        let conn = Connection::open(path).map_err(|source| StoreError::OpenFailed {
            path: PathBuf::from(path),
            source,
        })?;
        Self::from_connection(conn)
    }

    /// Open an in-memory database (for tests).
    pub fn open_memory() -> Result<Self, StoreError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, StoreError> {
        // DELETE journal mode for immediate durable writes, and FK
        // enforcement for the cascade relationships.
        conn.pragma_update(None, "journal_mode", "DELETE")?;
        conn.pragma_update(None, "synchronous", "FULL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.migrate()?;
        Ok(store)
    }

    fn migrate(&self) -> Result<(), StoreError> {
        let conn = self.lock();
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS accounts (
                id            TEXT PRIMARY KEY,
                name          TEXT NOT NULL,
                type          TEXT NOT NULL,
                email         TEXT,
                enabled       INTEGER DEFAULT 1,
                server_url    TEXT,
                username      TEXT,
                access_token  TEXT,
                refresh_token TEXT,
                token_expiry  TEXT,
                app_password  TEXT,
                last_sync     TEXT
            );

            CREATE TABLE IF NOT EXISTS calendars (
                id          TEXT PRIMARY KEY,
                account_id  TEXT NOT NULL,
                name        TEXT NOT NULL,
                description TEXT,
                color       TEXT DEFAULT '#4285f4',
                visible     INTEGER DEFAULT 1,
                read_only   INTEGER DEFAULT 0,
                sync_token  TEXT,
                last_sync   TEXT,
                FOREIGN KEY (account_id) REFERENCES accounts(id) ON DELETE CASCADE
            );

            CREATE TABLE IF NOT EXISTS events (
                id          TEXT PRIMARY KEY,
                calendar_id TEXT NOT NULL,
                uid         TEXT,
                title       TEXT NOT NULL,
                description TEXT,
                location    TEXT,
                start_time  TEXT NOT NULL,
                end_time    TEXT NOT NULL,
                all_day     INTEGER DEFAULT 0,
                color       TEXT,
                recurrence  TEXT,
                reminders   TEXT,
                created     TEXT,
                modified    TEXT,
                etag        TEXT,
                status      TEXT DEFAULT 'confirmed',
                cancelled   INTEGER DEFAULT 0,
                FOREIGN KEY (calendar_id) REFERENCES calendars(id) ON DELETE CASCADE
            );

            CREATE INDEX IF NOT EXISTS idx_events_calendar ON events(calendar_id);
            CREATE INDEX IF NOT EXISTS idx_events_start ON events(start_time);
            CREATE INDEX IF NOT EXISTS idx_events_end ON events(end_time);
            CREATE INDEX IF NOT EXISTS idx_calendars_account ON calendars(account_id);",
        )
        .map_err(|e| StoreError::MigrationFailed(e.to_string()))?;
        Ok(())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Connection> {
        // A poisoned lock means a panic mid-statement in another thread;
        // the connection itself is still usable.
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    // --- Account operations ---

    /// Insert or update an account, keyed by id.
    pub fn save_account(&self, a: &Account) -> Result<(), StoreError> {
        let conn = self.lock();
        conn.execute(
            "INSERT INTO accounts (id, name, type, email, enabled, server_url, username,
                                   access_token, refresh_token, token_expiry, app_password, last_sync)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
             ON CONFLICT(id) DO UPDATE SET
                 name = excluded.name,
                 type = excluded.type,
                 email = excluded.email,
                 enabled = excluded.enabled,
                 server_url = excluded.server_url,
                 username = excluded.username,
                 access_token = excluded.access_token,
                 refresh_token = excluded.refresh_token,
                 token_expiry = excluded.token_expiry,
                 app_password = excluded.app_password,
                 last_sync = excluded.last_sync",
            params![
                a.id,
                a.name,
                a.kind.as_str(),
                a.email,
                a.enabled,
                a.server_url,
                a.username,
                a.access_token,
                a.refresh_token,
                fmt_opt(a.token_expiry),
                a.app_password,
                fmt_opt(a.last_sync),
            ],
        )?;
        Ok(())
    }

    pub fn get_account(&self, id: &str) -> Result<Account, StoreError> {
        let conn = self.lock();
        conn.query_row(
            "SELECT id, name, type, email, enabled, server_url, username,
                    access_token, refresh_token, token_expiry, app_password, last_sync
             FROM accounts WHERE id = ?1",
            params![id],
            row_to_account,
        )
        .optional()?
        .ok_or_else(|| StoreError::not_found("account", id))
    }

    pub fn get_all_accounts(&self) -> Result<Vec<Account>, StoreError> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT id, name, type, email, enabled, server_url, username,
                    access_token, refresh_token, token_expiry, app_password, last_sync
             FROM accounts ORDER BY name",
        )?;
        let rows = stmt.query_map([], row_to_account)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Delete an account and, transitively, its calendars and events.
    pub fn delete_account(&self, id: &str) -> Result<(), StoreError> {
        let conn = self.lock();
        conn.execute("DELETE FROM accounts WHERE id = ?1", params![id])?;
        Ok(())
    }

    // --- Calendar operations ---

    /// Insert or update a calendar, keyed by id. The owning account must exist.
    pub fn save_calendar(&self, c: &Calendar) -> Result<(), StoreError> {
        let conn = self.lock();
        conn.execute(
            "INSERT INTO calendars (id, account_id, name, description, color,
                                    visible, read_only, sync_token, last_sync)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
             ON CONFLICT(id) DO UPDATE SET
                 account_id = excluded.account_id,
                 name = excluded.name,
                 description = excluded.description,
                 color = excluded.color,
                 visible = excluded.visible,
                 read_only = excluded.read_only,
                 sync_token = excluded.sync_token,
                 last_sync = excluded.last_sync",
            params![
                c.id,
                c.account_id,
                c.name,
                c.description,
                c.color,
                c.visible,
                c.read_only,
                c.sync_token,
                fmt_opt(c.last_sync),
            ],
        )?;
        Ok(())
    }

    pub fn get_calendar(&self, id: &str) -> Result<Calendar, StoreError> {
        let conn = self.lock();
        conn.query_row(
            "SELECT id, account_id, name, description, color, visible, read_only, sync_token, last_sync
             FROM calendars WHERE id = ?1",
            params![id],
            row_to_calendar,
        )
        .optional()?
        .ok_or_else(|| StoreError::not_found("calendar", id))
    }

    pub fn get_all_calendars(&self) -> Result<Vec<Calendar>, StoreError> {
        self.query_calendars("SELECT id, account_id, name, description, color, visible, read_only, sync_token, last_sync FROM calendars ORDER BY name", &[])
    }

    pub fn get_visible_calendars(&self) -> Result<Vec<Calendar>, StoreError> {
        self.query_calendars("SELECT id, account_id, name, description, color, visible, read_only, sync_token, last_sync FROM calendars WHERE visible = 1 ORDER BY name", &[])
    }

    pub fn get_calendars_by_account(&self, account_id: &str) -> Result<Vec<Calendar>, StoreError> {
        self.query_calendars(
            "SELECT id, account_id, name, description, color, visible, read_only, sync_token, last_sync
             FROM calendars WHERE account_id = ?1 ORDER BY name",
            &[account_id],
        )
    }

    fn query_calendars(&self, sql: &str, args: &[&str]) -> Result<Vec<Calendar>, StoreError> {
        let conn = self.lock();
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map(rusqlite::params_from_iter(args), row_to_calendar)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Delete a calendar and its events, leaving sibling calendars intact.
    pub fn delete_calendar(&self, id: &str) -> Result<(), StoreError> {
        let conn = self.lock();
        conn.execute("DELETE FROM calendars WHERE id = ?1", params![id])?;
        Ok(())
    }

    // --- Event operations ---

    /// Insert or update an event, keyed by id. The owning calendar must exist.
    pub fn save_event(&self, e: &Event) -> Result<(), StoreError> {
        let recurrence = serde_json::to_string(&e.recurrence).unwrap_or_else(|_| "null".into());
        let reminders = serde_json::to_string(&e.reminders).unwrap_or_else(|_| "[]".into());
        let conn = self.lock();
        conn.execute(
            "INSERT INTO events (id, calendar_id, uid, title, description, location,
                                 start_time, end_time, all_day, color, recurrence, reminders,
                                 created, modified, etag, status, cancelled)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)
             ON CONFLICT(id) DO UPDATE SET
                 calendar_id = excluded.calendar_id,
                 uid = excluded.uid,
                 title = excluded.title,
                 description = excluded.description,
                 location = excluded.location,
                 start_time = excluded.start_time,
                 end_time = excluded.end_time,
                 all_day = excluded.all_day,
                 color = excluded.color,
                 recurrence = excluded.recurrence,
                 reminders = excluded.reminders,
                 created = excluded.created,
                 modified = excluded.modified,
                 etag = excluded.etag,
                 status = excluded.status,
                 cancelled = excluded.cancelled",
            params![
                e.id,
                e.calendar_id,
                e.uid,
                e.title,
                e.description,
                e.location,
                fmt(e.start),
                fmt(e.end),
                e.all_day,
                e.color,
                recurrence,
                reminders,
                fmt(e.created),
                fmt(e.modified),
                e.etag,
                e.status.as_str(),
                e.cancelled,
            ],
        )?;
        Ok(())
    }

    pub fn get_event(&self, id: &str) -> Result<Event, StoreError> {
        let conn = self.lock();
        conn.query_row(
            &format!("{EVENT_COLUMNS} FROM events WHERE id = ?1"),
            params![id],
            row_to_event,
        )
        .optional()?
        .ok_or_else(|| StoreError::not_found("event", id))
    }

    /// Non-cancelled events of one calendar, ordered by start.
    pub fn get_events_by_calendar(&self, calendar_id: &str) -> Result<Vec<Event>, StoreError> {
        let conn = self.lock();
        let mut stmt = conn.prepare(&format!(
            "{EVENT_COLUMNS} FROM events
             WHERE calendar_id = ?1 AND cancelled = 0 ORDER BY start_time"
        ))?;
        let rows = stmt.query_map(params![calendar_id], row_to_event)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Non-cancelled events on visible calendars whose interval intersects
    /// `[start, end)`, ordered by start ascending.
    pub fn get_events_in_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Event>, StoreError> {
        let conn = self.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {EVENT_FIELDS_E} FROM events e
             JOIN calendars c ON e.calendar_id = c.id
             WHERE c.visible = 1 AND e.cancelled = 0
               AND e.start_time < ?1 AND e.end_time > ?2
             ORDER BY e.start_time"
        ))?;
        let rows = stmt.query_map(params![fmt(end), fmt(start)], row_to_event)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Events intersecting the UTC day `[date 00:00, date+1 00:00)`.
    pub fn get_events_for_date(&self, date: NaiveDate) -> Result<Vec<Event>, StoreError> {
        let day_start = Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0).unwrap_or_default());
        let day_end = day_start + chrono::Duration::hours(24);
        self.get_events_in_range(day_start, day_end)
    }

    pub fn delete_event(&self, id: &str) -> Result<(), StoreError> {
        let conn = self.lock();
        conn.execute("DELETE FROM events WHERE id = ?1", params![id])?;
        Ok(())
    }

    pub fn delete_events_by_calendar(&self, calendar_id: &str) -> Result<(), StoreError> {
        let conn = self.lock();
        conn.execute(
            "DELETE FROM events WHERE calendar_id = ?1",
            params![calendar_id],
        )?;
        Ok(())
    }
}

const EVENT_COLUMNS: &str = "SELECT id, calendar_id, uid, title, description, location, \
     start_time, end_time, all_day, color, recurrence, reminders, \
     created, modified, etag, status, cancelled";

const EVENT_FIELDS_E: &str = "e.id, e.calendar_id, e.uid, e.title, e.description, e.location, \
     e.start_time, e.end_time, e.all_day, e.color, e.recurrence, e.reminders, \
     e.created, e.modified, e.etag, e.status, e.cancelled";

// --- Row mapping and datetime helpers ---

/// Fixed-width UTC form so lexicographic comparison in SQL matches
/// chronological order.
fn fmt(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn fmt_opt(dt: Option<DateTime<Utc>>) -> Option<String> {
    dt.map(fmt)
}

fn parse_dt(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| zero_instant())
}

fn parse_opt(s: Option<String>) -> Option<DateTime<Utc>> {
    s.as_deref()
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

fn text(row: &Row, idx: usize) -> rusqlite::Result<String> {
    Ok(row.get::<_, Option<String>>(idx)?.unwrap_or_default())
}

fn row_to_account(row: &Row) -> rusqlite::Result<Account> {
    let kind: String = text(row, 2)?;
    Ok(Account {
        id: row.get(0)?,
        name: row.get(1)?,
        kind: AccountType::parse(&kind),
        email: text(row, 3)?,
        enabled: row.get(4)?,
        server_url: text(row, 5)?,
        username: text(row, 6)?,
        access_token: text(row, 7)?,
        refresh_token: text(row, 8)?,
        token_expiry: parse_opt(row.get(9)?),
        app_password: text(row, 10)?,
        last_sync: parse_opt(row.get(11)?),
    })
}

fn row_to_calendar(row: &Row) -> rusqlite::Result<Calendar> {
    let mut color = text(row, 4)?;
    if color.is_empty() {
        color = DEFAULT_CALENDAR_COLOR.to_string();
    }
    Ok(Calendar {
        id: row.get(0)?,
        account_id: row.get(1)?,
        name: row.get(2)?,
        description: text(row, 3)?,
        color,
        visible: row.get(5)?,
        read_only: row.get(6)?,
        sync_token: text(row, 7)?,
        last_sync: parse_opt(row.get(8)?),
    })
}

fn row_to_event(row: &Row) -> rusqlite::Result<Event> {
    let start: String = row.get(6)?;
    let end: String = row.get(7)?;
    let recurrence: String = text(row, 10)?;
    let reminders: String = text(row, 11)?;
    let status: String = text(row, 15)?;

    let recurrence: Option<RecurrenceRule> = if recurrence.is_empty() || recurrence == "null" {
        None
    } else {
        serde_json::from_str(&recurrence).ok()
    };
    let reminders: Vec<i64> = if reminders.is_empty() || reminders == "null" {
        Vec::new()
    } else {
        serde_json::from_str(&reminders).unwrap_or_default()
    };

    Ok(Event {
        id: row.get(0)?,
        calendar_id: row.get(1)?,
        uid: text(row, 2)?,
        title: row.get(3)?,
        description: text(row, 4)?,
        location: text(row, 5)?,
        start: parse_dt(&start),
        end: parse_dt(&end),
        all_day: row.get(8)?,
        color: text(row, 9)?,
        recurrence,
        reminders,
        created: parse_opt(row.get(12)?).unwrap_or_else(zero_instant),
        modified: parse_opt(row.get(13)?).unwrap_or_else(zero_instant),
        etag: text(row, 14)?,
        status: EventStatus::parse(&status),
        cancelled: row.get(16)?,
    })
}
