//! Calendar provider backends.
//!
//! One implementation per account family behind [`CalendarProvider`]; the
//! sync engine selects the variant from the account type and never
//! branches on it again.

mod caldav;
mod google;
mod local;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::ProviderError;
use crate::model::{Account, AccountType, Calendar, Event};
use crate::oauth::OAuthConfig;

pub use caldav::CalDavProvider;
pub use google::GoogleRestProvider;
pub use local::LocalProvider;

/// A remote (or local no-op) calendar source.
///
/// `authenticate` must succeed before any other operation; calling them
/// out of order fails with [`ProviderError::NotAuthenticated`].
#[async_trait]
pub trait CalendarProvider: Send {
    fn account(&self) -> &Account;

    fn account_mut(&mut self) -> &mut Account;

    /// Validate credentials and resolve any server endpoints.
    async fn authenticate(&mut self) -> Result<(), ProviderError>;

    /// Enumerate the account's calendars. Calendar ids are
    /// provider-native (collection URLs for CalDAV, opaque ids for
    /// Google REST).
    async fn list_calendars(&self) -> Result<Vec<Calendar>, ProviderError>;

    /// Fetch events of one calendar intersecting `[start, end)`.
    /// Individual objects that fail to decode are skipped.
    async fn get_events(
        &self,
        calendar_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Event>, ProviderError>;

    /// Push a new event; fills in provider-assigned identity on the event.
    async fn create_event(&self, calendar_id: &str, event: &mut Event)
        -> Result<(), ProviderError>;

    async fn update_event(&self, calendar_id: &str, event: &Event) -> Result<(), ProviderError>;

    async fn delete_event(&self, calendar_id: &str, event: &Event) -> Result<(), ProviderError>;

    /// Record a completed sync pass on the account.
    fn mark_synced(&mut self) {
        self.account_mut().last_sync = Some(Utc::now());
    }
}

/// Well-known CalDAV roots for accounts configured without a server URL.
pub fn caldav_base_url(kind: AccountType) -> Option<&'static str> {
    match kind {
        AccountType::Google => Some("https://apidata.googleusercontent.com/caldav/v2/"),
        AccountType::Apple => Some("https://caldav.icloud.com/"),
        AccountType::Outlook => Some("https://outlook.office365.com/caldav/"),
        AccountType::Samsung => Some("https://caldav.samsung.com/"),
        _ => None,
    }
}

/// Pick the provider variant for an account. Google accounts use the REST
/// API rather than Google's CalDAV bridge.
pub fn provider_for(
    account: Account,
    oauth: Option<OAuthConfig>,
) -> Box<dyn CalendarProvider> {
    match account.kind {
        AccountType::Local => Box::new(LocalProvider::new(account)),
        AccountType::Google => Box::new(GoogleRestProvider::new(account)),
        _ => Box::new(CalDavProvider::new(account, oauth)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn google_accounts_get_the_rest_provider() {
        let account = Account::new("g", AccountType::Google);
        let provider = provider_for(account, None);
        assert_eq!(provider.account().kind, AccountType::Google);
    }

    #[test]
    fn mark_synced_stamps_the_account() {
        let account = Account::new("l", AccountType::Local);
        let mut provider = provider_for(account, None);
        assert!(provider.account().last_sync.is_none());
        provider.mark_synced();
        assert!(provider.account().last_sync.is_some());
    }
}
