//! Per-account synchronization engine.
//!
//! Each account syncs as an independent task; the store is the only
//! shared state. Within one account the steps are sequential: refresh
//! token, authenticate, list calendars, then fetch each calendar's
//! events one at a time. A failing calendar is logged and skipped; the
//! account's last-sync stamp is written only after every calendar has
//! been attempted.

use std::sync::Arc;

use chrono::{Duration, Utc};
use serde::Serialize;
use tokio::task::JoinSet;

use crate::error::CoreError;
use crate::model::{Account, AccountType};
use crate::oauth::{self, OAuthConfig};
use crate::providers::{provider_for, CalendarProvider};
use crate::storage::{Store, SyncConfig};

/// Outcome of one account's sync pass.
#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    pub account_id: String,
    pub account_name: String,
    pub calendars_synced: usize,
    pub events_synced: usize,
    /// Per-calendar failures, as human-readable messages.
    pub failures: Vec<String>,
}

impl SyncReport {
    fn new(account: &Account) -> Self {
        Self {
            account_id: account.id.clone(),
            account_name: account.name.clone(),
            calendars_synced: 0,
            events_synced: 0,
            failures: Vec::new(),
        }
    }
}

#[derive(Clone)]
pub struct SyncEngine {
    store: Arc<Store>,
    oauth: Option<OAuthConfig>,
    window_past: Duration,
    window_future: Duration,
}

impl SyncEngine {
    pub fn new(store: Arc<Store>, oauth: Option<OAuthConfig>, sync: &SyncConfig) -> Self {
        Self {
            store,
            oauth,
            window_past: Duration::days(sync.window_past_days),
            window_future: Duration::days(sync.window_future_days),
        }
    }

    /// Sync every enabled account concurrently. Reports come back in
    /// completion order; a crashed task is reported as a failure rather
    /// than taking the others down.
    pub async fn sync_all(&self) -> Vec<SyncReport> {
        let accounts = match self.store.get_all_accounts() {
            Ok(accounts) => accounts,
            Err(err) => {
                tracing::error!("cannot enumerate accounts: {err}");
                return Vec::new();
            }
        };

        let mut tasks = JoinSet::new();
        for account in accounts.into_iter().filter(|a| a.enabled) {
            let engine = self.clone();
            tasks.spawn(async move { engine.sync_account(account).await });
        }

        let mut reports = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(report) => reports.push(report),
                Err(err) => tracing::error!("sync task panicked: {err}"),
            }
        }
        reports
    }

    /// Sync one account. Authentication failures abort the whole pass;
    /// per-calendar failures are recorded and skipped.
    pub async fn sync_account(&self, account: Account) -> SyncReport {
        let mut report = SyncReport::new(&account);
        let provider = provider_for(account, self.oauth.clone());
        self.run_sync(provider, &mut report).await;
        report
    }

    /// Sync through a caller-supplied provider (the seam used by the
    /// account-add flow and by tests).
    pub async fn sync_with(&self, provider: Box<dyn CalendarProvider>) -> SyncReport {
        let mut report = SyncReport::new(provider.account());
        self.run_sync(provider, &mut report).await;
        report
    }

    async fn run_sync(&self, mut provider: Box<dyn CalendarProvider>, report: &mut SyncReport) {
        tracing::info!(account = %report.account_name, "starting sync");

        if let Err(err) = self.refresh_credentials(provider.account_mut()).await {
            tracing::warn!(account = %report.account_name, "token refresh failed: {err}");
            report.failures.push(format!("token refresh: {err}"));
            return;
        }

        if let Err(err) = provider.authenticate().await {
            tracing::warn!(account = %report.account_name, "authentication failed: {err}");
            report.failures.push(format!("authentication: {err}"));
            return;
        }

        let calendars = match provider.list_calendars().await {
            Ok(calendars) => calendars,
            Err(err) => {
                tracing::warn!(account = %report.account_name, "calendar list failed: {err}");
                report.failures.push(format!("calendar list: {err}"));
                return;
            }
        };

        let now = Utc::now();
        let start = now - self.window_past;
        let end = now + self.window_future;

        for mut calendar in calendars {
            calendar.account_id = report.account_id.clone();
            calendar.last_sync = Some(now);
            if let Err(err) = self.store.save_calendar(&calendar) {
                tracing::warn!(calendar = %calendar.name, "calendar save failed: {err}");
                report.failures.push(format!("{}: {err}", calendar.name));
                continue;
            }

            let events = match provider.get_events(&calendar.id, start, end).await {
                Ok(events) => events,
                Err(err) => {
                    tracing::warn!(calendar = %calendar.name, "event fetch failed: {err}");
                    report.failures.push(format!("{}: {err}", calendar.name));
                    continue;
                }
            };

            let mut saved = 0;
            for mut event in events {
                event.calendar_id = calendar.id.clone();
                match self.store.save_event(&event) {
                    Ok(()) => saved += 1,
                    Err(err) => {
                        tracing::warn!(event = %event.title, "event save failed: {err}");
                    }
                }
            }
            tracing::debug!(calendar = %calendar.name, events = saved, "calendar synced");
            report.calendars_synced += 1;
            report.events_synced += saved;
        }

        // Stamped after every calendar was attempted, even if some failed.
        provider.mark_synced();
        if let Err(err) = self.store.save_account(provider.account()) {
            tracing::warn!(account = %report.account_name, "account save failed: {err}");
            report.failures.push(format!("account save: {err}"));
        }

        tracing::info!(
            account = %report.account_name,
            calendars = report.calendars_synced,
            events = report.events_synced,
            failures = report.failures.len(),
            "sync finished"
        );
    }

    /// Refresh the access token ahead of authentication where the account
    /// type uses OAuth, persisting the rotated tokens.
    async fn refresh_credentials(&self, account: &mut Account) -> Result<(), CoreError> {
        if account.kind != AccountType::Google {
            return Ok(());
        }
        let Some(oauth) = &self.oauth else {
            return Ok(());
        };
        if oauth::ensure_fresh_token(account, oauth).await? {
            self.store.save_account(account)?;
        }
        Ok(())
    }
}
