use tracing::{debug, warn};

use crate::error::{self, StorageError};
use crate::models::{
    DEFAULT_DAILY_TARGET, DEFAULT_REMINDER_INTERVAL, INTERVAL_KEY, TARGET_KEY, validate_interval,
    validate_target,
};
use crate::store::KeyValueStore;

/// User settings, loaded once at startup and handed to the services.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Settings {
    /// Daily intake goal in milliliters.
    pub daily_target: i64,
    /// Minutes between recurring reminders.
    pub reminder_interval: i64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            daily_target: DEFAULT_DAILY_TARGET,
            reminder_interval: DEFAULT_REMINDER_INTERVAL,
        }
    }
}

impl Settings {
    pub async fn load(store: &dyn KeyValueStore) -> Result<Self, StorageError> {
        let daily_target =
            load_checked(store, TARGET_KEY, DEFAULT_DAILY_TARGET, validate_target).await?;
        let reminder_interval =
            load_checked(store, INTERVAL_KEY, DEFAULT_REMINDER_INTERVAL, validate_interval).await?;
        let settings = Self {
            daily_target,
            reminder_interval,
        };
        debug!(?settings, "loaded settings");
        Ok(settings)
    }
}

async fn load_checked(
    store: &dyn KeyValueStore,
    key: &str,
    default: i64,
    validate: fn(i64) -> error::Result<i64>,
) -> Result<i64, StorageError> {
    let Some(raw) = store.get(key).await? else {
        return Ok(default);
    };
    match raw.trim().parse::<i64>().ok().map(validate) {
        Some(Ok(value)) => Ok(value),
        _ => {
            warn!(key, raw = %raw, default, "ignoring invalid stored setting");
            Ok(default)
        }
    }
}
