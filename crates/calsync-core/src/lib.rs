//! # Calsync Core Library
//!
//! Core engine for the calsync calendar tool: a local SQLite store of
//! accounts, calendars and events, provider backends that speak CalDAV
//! and the Google Calendar REST API, an OAuth2 token lifecycle for
//! Google accounts, and a per-account sync engine tying them together.
//! The CLI binary is a thin layer over this crate.
//!
//! ## Key Components
//!
//! - [`Store`]: account/calendar/event persistence with upsert semantics
//! - [`CalendarProvider`]: one implementation per account family
//! - [`SyncEngine`]: concurrent per-account synchronization
//! - [`Config`]: TOML configuration and OAuth client credentials

pub mod error;
pub mod ical;
pub mod model;
pub mod oauth;
pub mod providers;
pub mod storage;
pub mod sync;

pub use error::{ConfigError, CoreError, IcalError, OAuthError, ProviderError, StoreError};
pub use model::{Account, AccountType, Calendar, Event, EventStatus, RecurrenceRule};
pub use oauth::{OAuthConfig, TokenSet};
pub use providers::{provider_for, CalendarProvider};
pub use storage::{Config, Store};
pub use sync::{SyncEngine, SyncReport};
