//! Water intake ledger and reminder scheduling.
//!
//! [`ledger::LedgerService`] records drinks and the daily target, [`reminder::ReminderScheduler`]
//! keeps one recurring reminder in step with the configured interval. Both persist through a
//! [`store::KeyValueStore`] and take their starting values from [`settings::Settings`].

pub mod clock;
pub mod db;
pub mod error;
pub mod ledger;
pub mod models;
pub mod notify;
pub mod reminder;
pub mod settings;
pub mod store;

pub use error::{Error, NotificationError, Result, StorageError};
