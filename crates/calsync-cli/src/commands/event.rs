use clap::Subcommand;

use calsync_core::model::AccountType;
use calsync_core::{provider_for, CalendarProvider, Event};

use super::{parse_instant, CliResult, Ctx};

#[derive(Subcommand)]
pub enum EventAction {
    /// Create an event (pushed to the owning account if remote)
    Add {
        #[arg(long)]
        title: String,
        /// Start instant (YYYY-MM-DD or RFC 3339)
        #[arg(long)]
        start: String,
        /// End instant (YYYY-MM-DD or RFC 3339)
        #[arg(long)]
        end: String,
        /// Target calendar id; defaults to the first visible calendar
        #[arg(long)]
        calendar: Option<String>,
        #[arg(long)]
        location: Option<String>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        all_day: bool,
    },
    /// Update an event's fields
    Edit {
        id: String,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        start: Option<String>,
        #[arg(long)]
        end: Option<String>,
        #[arg(long)]
        location: Option<String>,
    },
    /// Delete an event (also from the remote account)
    Remove {
        id: String,
    },
    /// Print one event
    Show {
        id: String,
    },
}

pub async fn run(action: EventAction) -> CliResult {
    let ctx = Ctx::init()?;
    match action {
        EventAction::Add {
            title,
            start,
            end,
            calendar,
            location,
            description,
            all_day,
        } => {
            let calendar = match calendar {
                Some(id) => ctx.store.get_calendar(&id)?,
                None => ctx
                    .store
                    .get_visible_calendars()?
                    .into_iter()
                    .next()
                    .ok_or("no visible calendar to add to")?,
            };

            let mut event = Event::new(&calendar.id, title, parse_instant(&start)?, parse_instant(&end)?);
            event.all_day = all_day;
            event.location = location.unwrap_or_default();
            event.description = description.unwrap_or_default();

            if let Some(mut provider) = remote_provider(&ctx, &calendar.account_id)? {
                provider.authenticate().await?;
                provider.create_event(&calendar.id, &mut event).await?;
            }
            ctx.store.save_event(&event)?;
            println!("added event {} ({})", event.title, event.id);
            Ok(())
        }
        EventAction::Edit {
            id,
            title,
            start,
            end,
            location,
        } => {
            let mut event = ctx.store.get_event(&id)?;
            if let Some(title) = title {
                event.title = title;
            }
            if let Some(start) = start {
                event.start = parse_instant(&start)?;
            }
            if let Some(end) = end {
                event.end = parse_instant(&end)?;
            }
            if let Some(location) = location {
                event.location = location;
            }
            event.modified = chrono::Utc::now();

            let calendar = ctx.store.get_calendar(&event.calendar_id)?;
            if let Some(mut provider) = remote_provider(&ctx, &calendar.account_id)? {
                provider.authenticate().await?;
                provider.update_event(&calendar.id, &event).await?;
            }
            ctx.store.save_event(&event)?;
            println!("updated event {}", event.id);
            Ok(())
        }
        EventAction::Remove { id } => {
            let event = ctx.store.get_event(&id)?;
            let calendar = ctx.store.get_calendar(&event.calendar_id)?;
            if let Some(mut provider) = remote_provider(&ctx, &calendar.account_id)? {
                provider.authenticate().await?;
                provider.delete_event(&calendar.id, &event).await?;
            }
            ctx.store.delete_event(&id)?;
            println!("removed event {id}");
            Ok(())
        }
        EventAction::Show { id } => {
            let event = ctx.store.get_event(&id)?;
            println!("{}", serde_json::to_string_pretty(&event)?);
            Ok(())
        }
    }
}

/// A ready-to-authenticate provider for remote accounts, or `None` for
/// local ones (local events need no push).
fn remote_provider(
    ctx: &Ctx,
    account_id: &str,
) -> Result<Option<Box<dyn CalendarProvider>>, Box<dyn std::error::Error>> {
    let account = ctx.store.get_account(account_id)?;
    if account.kind == AccountType::Local {
        return Ok(None);
    }
    Ok(Some(provider_for(account, ctx.config.google_oauth().ok())))
}
