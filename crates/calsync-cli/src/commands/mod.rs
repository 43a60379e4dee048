pub mod account;
pub mod agenda;
pub mod event;
pub mod status;
pub mod sync;

use std::sync::Arc;

use calsync_core::model::{AccountType, Calendar};
use calsync_core::{Account, Config, Store};

pub type CliResult = Result<(), Box<dyn std::error::Error>>;

/// Shared command context: loaded configuration and an open store,
/// bootstrapped with a local account on first run.
pub struct Ctx {
    pub config: Config,
    pub store: Arc<Store>,
}

impl Ctx {
    pub fn init() -> Result<Self, Box<dyn std::error::Error>> {
        let config = Config::load()?;
        let store = Arc::new(Store::open(&config.database_path()?)?);
        bootstrap(&store)?;
        Ok(Self { config, store })
    }
}

/// First run: create the device-local account and its default calendar so
/// events can be added before any remote account exists.
fn bootstrap(store: &Store) -> Result<(), Box<dyn std::error::Error>> {
    if !store.get_all_accounts()?.is_empty() {
        return Ok(());
    }
    let account = Account::new("Local", AccountType::Local);
    store.save_account(&account)?;
    store.save_calendar(&Calendar::new(&account.id, "My Calendar"))?;
    tracing::info!("created local account and default calendar");
    Ok(())
}

/// Accepts `YYYY-MM-DD` (midnight UTC) or a full RFC 3339 instant.
pub fn parse_instant(s: &str) -> Result<chrono::DateTime<chrono::Utc>, Box<dyn std::error::Error>> {
    use chrono::{DateTime, NaiveDate, TimeZone, Utc};
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    let date: NaiveDate = s.parse()?;
    let midnight = date
        .and_hms_opt(0, 0, 0)
        .ok_or("invalid date")?;
    Ok(Utc.from_utc_datetime(&midnight))
}
