use clap::Args;

use calsync_core::SyncEngine;

use super::{CliResult, Ctx};

#[derive(Args)]
pub struct SyncArgs {
    /// Sync only this account id
    #[arg(long)]
    pub account: Option<String>,
    /// Print the sync reports as JSON
    #[arg(long)]
    pub json: bool,
}

pub async fn run(args: SyncArgs) -> CliResult {
    let ctx = Ctx::init()?;
    let engine = SyncEngine::new(
        ctx.store.clone(),
        ctx.config.google_oauth().ok(),
        &ctx.config.sync,
    );

    let reports = match args.account {
        Some(id) => {
            let account = ctx.store.get_account(&id)?;
            vec![engine.sync_account(account).await]
        }
        None => engine.sync_all().await,
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&reports)?);
        return Ok(());
    }

    for report in &reports {
        println!(
            "{}: {} calendars, {} events",
            report.account_name, report.calendars_synced, report.events_synced
        );
        for failure in &report.failures {
            eprintln!("  warning: {failure}");
        }
    }
    Ok(())
}
