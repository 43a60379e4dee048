use chrono::{Duration, Local, Utc};
use clap::Args;
use serde_json::json;

use super::{CliResult, Ctx};

#[derive(Args)]
pub struct StatusArgs {
    /// Emit JSON instead of text
    #[arg(long)]
    pub json: bool,
}

pub async fn run(args: StatusArgs) -> CliResult {
    let ctx = Ctx::init()?;
    let accounts = ctx.store.get_all_accounts()?;

    let mut entries = Vec::new();
    for account in &accounts {
        let calendars = ctx.store.get_calendars_by_account(&account.id)?;
        let mut events = 0;
        for calendar in &calendars {
            events += ctx.store.get_events_by_calendar(&calendar.id)?.len();
        }
        entries.push(json!({
            "id": account.id,
            "name": account.name,
            "type": account.kind.as_str(),
            "enabled": account.enabled,
            "last_sync": account.last_sync.map(|t| t.to_rfc3339()),
            "calendars": calendars.len(),
            "events": events,
        }));
    }

    let today = Local::now().date_naive();
    let today_events = ctx.store.get_events_for_date(today)?;
    let tomorrow_events = ctx
        .store
        .get_events_for_date(today + Duration::days(1))?;
    let now = Utc::now();
    let next_event = today_events
        .iter()
        .find(|e| e.start > now)
        .map(|e| json!({ "title": e.title, "start": e.start.to_rfc3339() }));

    let summary = json!({
        "today": today_events.len(),
        "tomorrow": tomorrow_events.len(),
        "next_event": next_event,
        "accounts": entries,
    });

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    println!(
        "{} events today, {} tomorrow",
        today_events.len(),
        tomorrow_events.len()
    );
    if let Some(next) = summary["next_event"].as_object() {
        println!(
            "next: {} at {}",
            next["title"].as_str().unwrap_or_default(),
            next["start"].as_str().unwrap_or_default()
        );
    }
    for entry in &entries {
        println!(
            "{} [{}]: {} calendars, {} events, last sync {}",
            entry["name"].as_str().unwrap_or_default(),
            entry["type"].as_str().unwrap_or_default(),
            entry["calendars"],
            entry["events"],
            entry["last_sync"].as_str().unwrap_or("never"),
        );
    }
    Ok(())
}
