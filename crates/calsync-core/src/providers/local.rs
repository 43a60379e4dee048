//! Device-local account: events live only in the store, so every remote
//! operation is a no-op. Exists so the sync engine treats all account
//! types uniformly.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::CalendarProvider;
use crate::error::ProviderError;
use crate::model::{Account, Calendar, Event};

pub struct LocalProvider {
    account: Account,
}

impl LocalProvider {
    pub fn new(account: Account) -> Self {
        Self { account }
    }
}

#[async_trait]
impl CalendarProvider for LocalProvider {
    fn account(&self) -> &Account {
        &self.account
    }

    fn account_mut(&mut self) -> &mut Account {
        &mut self.account
    }

    async fn authenticate(&mut self) -> Result<(), ProviderError> {
        Ok(())
    }

    async fn list_calendars(&self) -> Result<Vec<Calendar>, ProviderError> {
        Ok(Vec::new())
    }

    async fn get_events(
        &self,
        _calendar_id: &str,
        _start: DateTime<Utc>,
        _end: DateTime<Utc>,
    ) -> Result<Vec<Event>, ProviderError> {
        Ok(Vec::new())
    }

    async fn create_event(
        &self,
        _calendar_id: &str,
        _event: &mut Event,
    ) -> Result<(), ProviderError> {
        Ok(())
    }

    async fn update_event(&self, _calendar_id: &str, _event: &Event) -> Result<(), ProviderError> {
        Ok(())
    }

    async fn delete_event(&self, _calendar_id: &str, _event: &Event) -> Result<(), ProviderError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::AccountType;

    #[tokio::test]
    async fn everything_is_a_noop() {
        let mut provider = LocalProvider::new(Account::new("Local", AccountType::Local));
        provider.authenticate().await.unwrap();
        assert!(provider.list_calendars().await.unwrap().is_empty());
        let events = provider
            .get_events("any", Utc::now(), Utc::now())
            .await
            .unwrap();
        assert!(events.is_empty());
    }
}
