use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{Days, NaiveDate};
use tokio::sync::Mutex;
use tracing::{debug, error, info, instrument};
use uuid::Uuid;

use crate::clock::{Clock, SystemClock};
use crate::error::Result;
use crate::models::{
    DaySummary, DayTotal, ENTRIES_KEY, NewWaterIntakeEntry, TARGET_KEY, WaterIntakeEntry,
    day_bounds, sum_amounts, validate_amount, validate_target,
};
use crate::settings::Settings;
use crate::store::{KeyValueStore, load_json, save_json};

/// Water intake entries and the daily target.
///
/// The whole entry collection lives under one store key. Every mutation is a read-modify-write of
/// that record, serialized through `write_lock` so two writers on this service cannot drop each
/// other's changes. Writers that bypass this instance can still race; the last write wins.
pub struct LedgerService {
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    target: AtomicI64,
    write_lock: Mutex<()>,
}

impl LedgerService {
    pub fn new(store: Arc<dyn KeyValueStore>, settings: &Settings) -> Self {
        Self::with_clock(store, settings, Arc::new(SystemClock))
    }

    pub fn with_clock(
        store: Arc<dyn KeyValueStore>,
        settings: &Settings,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            clock,
            target: AtomicI64::new(settings.daily_target),
            write_lock: Mutex::new(()),
        }
    }

    // --- Entries ---

    #[instrument(skip(self, entry), fields(amount = entry.amount))]
    pub async fn add_entry(&self, entry: NewWaterIntakeEntry) -> Result<WaterIntakeEntry> {
        let amount = validate_amount(entry.amount)?;
        let timestamp = entry.timestamp.unwrap_or_else(|| self.clock.now_millis());
        let note = entry
            .note
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty());

        let _guard = self.write_lock.lock().await;
        let mut entries = self.load_entries().await?;
        let new_entry = WaterIntakeEntry {
            id: unique_id(&entries),
            timestamp,
            amount,
            note,
        };
        entries.push(new_entry.clone());
        self.save_entries(&entries).await?;

        info!(id = %new_entry.id, amount, timestamp, "logged water intake");
        Ok(new_entry)
    }

    /// Remove the entry with `id`. Unknown ids are ignored.
    #[instrument(skip(self))]
    pub async fn delete_entry(&self, id: &str) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut entries = self.load_entries().await?;
        let before = entries.len();
        entries.retain(|e| e.id != id);

        if entries.len() == before {
            debug!("no entry with this id, nothing to delete");
            return Ok(());
        }

        self.save_entries(&entries).await?;
        info!("deleted water intake entry");
        Ok(())
    }

    /// Every stored entry, in storage order.
    pub async fn all_entries(&self) -> Result<Vec<WaterIntakeEntry>> {
        self.load_entries().await
    }

    /// Entries logged on `date` (local time), in no particular order.
    pub async fn entries_for_day(&self, date: NaiveDate) -> Result<Vec<WaterIntakeEntry>> {
        let entries = self.load_entries().await?;
        Ok(filter_day(entries, date))
    }

    pub async fn total_for_day(&self, date: NaiveDate) -> Result<i64> {
        let entries = self.entries_for_day(date).await?;
        Ok(sum_amounts(&entries))
    }

    pub async fn day_summary(&self, date: NaiveDate) -> Result<DaySummary> {
        let entries = self.entries_for_day(date).await?;
        Ok(DaySummary::new(date, entries, self.target()))
    }

    /// Daily totals for `days` days ending at `today`, newest day first.
    pub async fn history(&self, today: NaiveDate, days: u32) -> Result<Vec<DayTotal>> {
        let entries = self.load_entries().await?;
        let totals = (0..days)
            .filter_map(|i| today.checked_sub_days(Days::new(u64::from(i))))
            .map(|date| {
                let (start, end) = day_bounds(date);
                let on_day: Vec<&WaterIntakeEntry> = entries
                    .iter()
                    .filter(|e| e.timestamp >= start && e.timestamp <= end)
                    .collect();
                let total = sum_amounts(on_day.iter().copied());
                let entry_count = on_day.len();
                DayTotal {
                    date,
                    total,
                    entry_count,
                }
            })
            .collect();
        Ok(totals)
    }

    /// Delete every entry. Target and reminder settings are kept.
    #[instrument(skip(self))]
    pub async fn clear_all(&self) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        self.store
            .remove(ENTRIES_KEY)
            .await
            .inspect_err(|e| error!(error = %e, "failed to clear water intake data"))?;
        info!("cleared all water intake entries");
        Ok(())
    }

    // --- Target ---

    #[must_use]
    pub fn target(&self) -> i64 {
        self.target.load(Ordering::Acquire)
    }

    #[instrument(skip(self))]
    pub async fn set_target(&self, value: i64) -> Result<()> {
        let value = validate_target(value)?;
        self.store
            .set(TARGET_KEY, &value.to_string())
            .await
            .inspect_err(|e| error!(error = %e, "failed to save daily target"))?;
        self.target.store(value, Ordering::Release);
        info!(daily_target = value, "daily target updated");
        Ok(())
    }

    // --- Persistence helpers ---

    async fn load_entries(&self) -> Result<Vec<WaterIntakeEntry>> {
        let entries = load_json::<Vec<WaterIntakeEntry>>(self.store.as_ref(), ENTRIES_KEY)
            .await
            .inspect_err(|e| error!(error = %e, "failed to read water intake entries"))?;
        Ok(entries.unwrap_or_default())
    }

    async fn save_entries(&self, entries: &[WaterIntakeEntry]) -> Result<()> {
        save_json(self.store.as_ref(), ENTRIES_KEY, entries)
            .await
            .inspect_err(|e| error!(error = %e, "failed to save water intake entries"))?;
        debug!(count = entries.len(), "saved water intake entries");
        Ok(())
    }
}

fn filter_day(entries: Vec<WaterIntakeEntry>, date: NaiveDate) -> Vec<WaterIntakeEntry> {
    let (start, end) = day_bounds(date);
    entries
        .into_iter()
        .filter(|e| e.timestamp >= start && e.timestamp <= end)
        .collect()
}

fn unique_id(existing: &[WaterIntakeEntry]) -> String {
    loop {
        let id = Uuid::new_v4().to_string();
        if !existing.iter().any(|e| e.id == id) {
            return id;
        }
    }
}
