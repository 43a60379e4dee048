//! Google Calendar REST provider.
//!
//! Talks to the Calendar v3 API directly with a bearer token, bypassing
//! Google's CalDAV bridge. The API base is a field so tests can point it
//! at a mock server.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use reqwest::Client;
use serde_json::{json, Value};

use super::CalendarProvider;
use crate::error::ProviderError;
use crate::model::{Account, Calendar, Event, EventStatus};

const API_BASE: &str = "https://www.googleapis.com/calendar/v3";

/// Page size for event listing; the sync window rarely exceeds this.
const MAX_RESULTS: u32 = 250;

pub struct GoogleRestProvider {
    account: Account,
    client: Client,
    api_base: String,
    authenticated: bool,
}

impl GoogleRestProvider {
    pub fn new(account: Account) -> Self {
        Self {
            account,
            client: Client::new(),
            api_base: API_BASE.to_string(),
            authenticated: false,
        }
    }

    /// Override the API base URL (tests).
    pub fn with_api_base(mut self, base: &str) -> Self {
        self.api_base = base.trim_end_matches('/').to_string();
        self
    }

    fn ensure_auth(&self) -> Result<(), ProviderError> {
        if self.authenticated {
            Ok(())
        } else {
            Err(ProviderError::NotAuthenticated)
        }
    }

    async fn get_json(&self, url: &str, operation: &'static str) -> Result<Value, ProviderError> {
        let resp = self
            .client
            .get(url)
            .bearer_auth(&self.account.access_token)
            .send()
            .await?;
        json_body(resp, operation).await
    }
}

#[async_trait]
impl CalendarProvider for GoogleRestProvider {
    fn account(&self) -> &Account {
        &self.account
    }

    fn account_mut(&mut self) -> &mut Account {
        &mut self.account
    }

    async fn authenticate(&mut self) -> Result<(), ProviderError> {
        if self.account.access_token.is_empty() {
            return Err(ProviderError::NotAuthenticated);
        }
        self.authenticated = true;
        Ok(())
    }

    async fn list_calendars(&self) -> Result<Vec<Calendar>, ProviderError> {
        self.ensure_auth()?;
        let body = self
            .get_json(
                &format!("{}/users/me/calendarList", self.api_base),
                "calendar list",
            )
            .await?;

        let items = body
            .get("items")
            .and_then(Value::as_array)
            .ok_or_else(|| ProviderError::BadResponse("calendarList has no items".into()))?;

        let calendars = items
            .iter()
            .filter_map(|item| {
                let id = item.get("id")?.as_str()?;
                let mut calendar =
                    Calendar::new(&self.account.id, str_field(item, "summary"));
                calendar.id = id.to_string();
                calendar.description = str_field(item, "description");
                if let Some(color) = item.get("backgroundColor").and_then(Value::as_str) {
                    calendar.color = color.to_string();
                }
                calendar.read_only = matches!(
                    item.get("accessRole").and_then(Value::as_str),
                    Some("reader") | Some("freeBusyReader")
                );
                Some(calendar)
            })
            .collect();
        Ok(calendars)
    }

    async fn get_events(
        &self,
        calendar_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Event>, ProviderError> {
        self.ensure_auth()?;
        let url = format!(
            "{}/calendars/{}/events?timeMin={}&timeMax={}&singleEvents=true&maxResults={}",
            self.api_base,
            urlencoding::encode(calendar_id),
            urlencoding::encode(&start.to_rfc3339()),
            urlencoding::encode(&end.to_rfc3339()),
            MAX_RESULTS,
        );
        let body = self.get_json(&url, "event list").await?;

        let items = body
            .get("items")
            .and_then(Value::as_array)
            .ok_or_else(|| ProviderError::BadResponse("events response has no items".into()))?;

        let events = items
            .iter()
            // Cancelled items are tombstones for deleted events; drop them.
            .filter(|item| item.get("status").and_then(Value::as_str) != Some("cancelled"))
            .filter_map(|item| event_from_item(item, calendar_id))
            .collect();
        Ok(events)
    }

    async fn create_event(
        &self,
        calendar_id: &str,
        event: &mut Event,
    ) -> Result<(), ProviderError> {
        self.ensure_auth()?;
        let url = format!(
            "{}/calendars/{}/events",
            self.api_base,
            urlencoding::encode(calendar_id)
        );
        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.account.access_token)
            .json(&event_to_item(event))
            .send()
            .await?;
        let body = json_body(resp, "event create").await?;
        if let Some(id) = body.get("id").and_then(Value::as_str) {
            event.uid = id.to_string();
            event.id = id.to_string();
        }
        event.etag = str_field(&body, "etag");
        Ok(())
    }

    async fn update_event(&self, calendar_id: &str, event: &Event) -> Result<(), ProviderError> {
        self.ensure_auth()?;
        let url = format!(
            "{}/calendars/{}/events/{}",
            self.api_base,
            urlencoding::encode(calendar_id),
            urlencoding::encode(&event.uid),
        );
        let resp = self
            .client
            .put(&url)
            .bearer_auth(&self.account.access_token)
            .json(&event_to_item(event))
            .send()
            .await?;
        json_body(resp, "event update").await.map(|_| ())
    }

    async fn delete_event(&self, calendar_id: &str, event: &Event) -> Result<(), ProviderError> {
        self.ensure_auth()?;
        let url = format!(
            "{}/calendars/{}/events/{}",
            self.api_base,
            urlencoding::encode(calendar_id),
            urlencoding::encode(&event.uid),
        );
        let resp = self
            .client
            .delete(&url)
            .bearer_auth(&self.account.access_token)
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(ProviderError::Status {
                operation: "event delete",
                status: status.as_u16(),
                body: resp.text().await.unwrap_or_default(),
            });
        }
        Ok(())
    }
}

async fn json_body(resp: reqwest::Response, operation: &'static str) -> Result<Value, ProviderError> {
    let status = resp.status();
    let body = resp.text().await.unwrap_or_default();
    if !status.is_success() {
        return Err(ProviderError::Status {
            operation,
            status: status.as_u16(),
            body,
        });
    }
    serde_json::from_str(&body)
        .map_err(|e| ProviderError::BadResponse(format!("{operation}: {e}")))
}

fn str_field(item: &Value, key: &str) -> String {
    item.get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

/// Start/end come as either `{"date": "2024-06-10"}` (all-day) or
/// `{"dateTime": "..."}`.
fn parse_time_field(item: &Value, key: &str) -> Option<(DateTime<Utc>, bool)> {
    let field = item.get(key)?;
    if let Some(date) = field.get("date").and_then(Value::as_str) {
        let date: NaiveDate = date.parse().ok()?;
        let midnight = Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0)?);
        return Some((midnight, true));
    }
    let dt = field.get("dateTime").and_then(Value::as_str)?;
    let dt = DateTime::parse_from_rfc3339(dt).ok()?.with_timezone(&Utc);
    Some((dt, false))
}

fn event_from_item(item: &Value, calendar_id: &str) -> Option<Event> {
    let id = item.get("id")?.as_str()?;
    let (start, all_day) = parse_time_field(item, "start")?;
    let (end, _) = parse_time_field(item, "end")?;

    let mut event = Event::empty();
    event.id = id.to_string();
    event.uid = id.to_string();
    event.calendar_id = calendar_id.to_string();
    event.title = str_field(item, "summary");
    event.description = str_field(item, "description");
    event.location = str_field(item, "location");
    event.start = start;
    event.end = end;
    event.all_day = all_day;
    event.etag = str_field(item, "etag");
    event.status = EventStatus::parse(&str_field(item, "status"));
    if let Some(created) = item.get("created").and_then(Value::as_str) {
        if let Ok(dt) = DateTime::parse_from_rfc3339(created) {
            event.created = dt.with_timezone(&Utc);
        }
    }
    if let Some(updated) = item.get("updated").and_then(Value::as_str) {
        if let Ok(dt) = DateTime::parse_from_rfc3339(updated) {
            event.modified = dt.with_timezone(&Utc);
        }
    }
    Some(event)
}

fn event_to_item(event: &Event) -> Value {
    let time = |dt: DateTime<Utc>| {
        if event.all_day {
            json!({ "date": dt.format("%Y-%m-%d").to_string() })
        } else {
            json!({ "dateTime": dt.to_rfc3339() })
        }
    };
    let mut item = json!({
        "summary": event.title,
        "start": time(event.start),
        "end": time(event.end),
        "status": event.status.as_str(),
    });
    if !event.description.is_empty() {
        item["description"] = json!(event.description);
    }
    if !event.location.is_empty() {
        item["location"] = json!(event.location);
    }
    item
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::AccountType;

    async fn authed_provider(server: &mockito::Server) -> GoogleRestProvider {
        let mut account = Account::new("Google", AccountType::Google);
        account.access_token = "tok".into();
        let mut provider =
            GoogleRestProvider::new(account).with_api_base(&server.url());
        provider.authenticate().await.unwrap();
        provider
    }

    #[tokio::test]
    async fn authenticate_requires_a_token() {
        let account = Account::new("Google", AccountType::Google);
        let mut provider = GoogleRestProvider::new(account);
        assert!(matches!(
            provider.authenticate().await,
            Err(ProviderError::NotAuthenticated)
        ));
    }

    #[tokio::test]
    async fn list_calendars_maps_fields() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/users/me/calendarList")
            .match_header("authorization", "Bearer tok")
            .with_status(200)
            .with_body(
                r##"{"items":[
                    {"id":"primary","summary":"Main","backgroundColor":"#9fe1e7","accessRole":"owner"},
                    {"id":"team","summary":"Team","accessRole":"reader"}
                ]}"##,
            )
            .create_async()
            .await;

        let provider = authed_provider(&server).await;
        let calendars = provider.list_calendars().await.unwrap();
        assert_eq!(calendars.len(), 2);
        assert_eq!(calendars[0].id, "primary");
        assert_eq!(calendars[0].color, "#9fe1e7");
        assert!(!calendars[0].read_only);
        assert!(calendars[1].read_only);
    }

    #[tokio::test]
    async fn get_events_skips_cancelled_and_maps_all_day() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/calendars/primary/events")
            .match_query(mockito::Matcher::AllOf(vec![
                mockito::Matcher::UrlEncoded("singleEvents".into(), "true".into()),
                mockito::Matcher::UrlEncoded("maxResults".into(), "250".into()),
            ]))
            .with_status(200)
            .with_body(
                r#"{"items":[
                    {"id":"e1","summary":"Standup","status":"confirmed","etag":"\"42\"",
                     "start":{"dateTime":"2024-06-10T09:00:00Z"},
                     "end":{"dateTime":"2024-06-10T09:15:00Z"}},
                    {"id":"e2","summary":"Holiday","status":"confirmed",
                     "start":{"date":"2024-06-11"},
                     "end":{"date":"2024-06-12"}},
                    {"id":"e3","status":"cancelled",
                     "start":{"dateTime":"2024-06-10T10:00:00Z"},
                     "end":{"dateTime":"2024-06-10T11:00:00Z"}}
                ]}"#,
            )
            .create_async()
            .await;

        let provider = authed_provider(&server).await;
        let start = "2024-06-01T00:00:00Z".parse().unwrap();
        let end = "2024-07-01T00:00:00Z".parse().unwrap();
        let events = provider.get_events("primary", start, end).await.unwrap();

        assert_eq!(events.len(), 2);
        assert_eq!(events[0].uid, "e1");
        assert_eq!(events[0].etag, "\"42\"");
        assert!(!events[0].all_day);
        assert_eq!(events[1].uid, "e2");
        assert!(events[1].all_day);
        assert_eq!(events[1].start, "2024-06-11T00:00:00Z".parse::<DateTime<Utc>>().unwrap());
    }

    #[tokio::test]
    async fn non_2xx_carries_status() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/users/me/calendarList")
            .with_status(403)
            .with_body("insufficient scope")
            .create_async()
            .await;

        let provider = authed_provider(&server).await;
        let err = provider.list_calendars().await.unwrap_err();
        match err {
            ProviderError::Status { operation, status, body } => {
                assert_eq!(operation, "calendar list");
                assert_eq!(status, 403);
                assert!(body.contains("insufficient scope"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn create_event_adopts_remote_identity() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/calendars/primary/events")
            .with_status(200)
            .with_body(r#"{"id":"remote-1","etag":"\"9\""}"#)
            .create_async()
            .await;

        let provider = authed_provider(&server).await;
        let mut event = Event::new(
            "primary",
            "New",
            "2024-06-10T09:00:00Z".parse().unwrap(),
            "2024-06-10T10:00:00Z".parse().unwrap(),
        );
        provider.create_event("primary", &mut event).await.unwrap();
        assert_eq!(event.uid, "remote-1");
        assert_eq!(event.id, "remote-1");
        assert_eq!(event.etag, "\"9\"");
    }
}
