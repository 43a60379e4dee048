use chrono::{Local, NaiveDate};
use clap::Args;
use serde_json::json;

use calsync_core::Event;

use super::{CliResult, Ctx};

#[derive(Args)]
pub struct AgendaArgs {
    /// Day to show (YYYY-MM-DD); defaults to today
    #[arg(long)]
    pub date: Option<String>,
    /// Emit a status-bar JSON object (text + tooltip) instead of lines
    #[arg(long)]
    pub json: bool,
}

pub async fn run(args: AgendaArgs) -> CliResult {
    let ctx = Ctx::init()?;
    let date: NaiveDate = match &args.date {
        Some(s) => s.parse()?,
        None => Local::now().date_naive(),
    };
    let events = ctx.store.get_events_for_date(date)?;

    if args.json {
        println!("{}", status_bar_json(date, &events));
        return Ok(());
    }

    if events.is_empty() {
        println!("no events on {date}");
        return Ok(());
    }
    for event in &events {
        println!("{}", format_line(event));
    }
    Ok(())
}

fn format_line(event: &Event) -> String {
    if event.all_day {
        format!("all day      {}", event.title)
    } else {
        format!(
            "{}-{}  {}",
            event.start.format("%H:%M"),
            event.end.format("%H:%M"),
            event.title
        )
    }
}

/// Waybar-style custom module payload: next event in `text`, the whole
/// day in `tooltip`.
fn status_bar_json(date: NaiveDate, events: &[Event]) -> String {
    let text = events
        .first()
        .map(|e| {
            if e.all_day {
                e.title.clone()
            } else {
                format!("{} {}", e.start.format("%H:%M"), e.title)
            }
        })
        .unwrap_or_default();
    let tooltip = if events.is_empty() {
        format!("no events on {date}")
    } else {
        events
            .iter()
            .map(format_line)
            .collect::<Vec<_>>()
            .join("\n")
    };
    json!({ "text": text, "tooltip": tooltip }).to_string()
}
