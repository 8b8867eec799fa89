use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use serde::Serialize;
use tokio::sync::{Mutex, broadcast};
use tracing::{debug, error, info, instrument, warn};

use crate::clock::{Clock, SystemClock};
use crate::error::Result;
use crate::models::{INTERVAL_KEY, validate_interval};
use crate::notify::{
    NotificationContent, NotificationId, NotificationResponse, Notifier, ReminderKind,
    ReminderPayload, Trigger,
};
use crate::settings::Settings;
use crate::store::KeyValueStore;

pub const REMINDER_TITLE: &str = "Water Reminder 💧";
pub const REMINDER_BODY: &str = "It's time to drink some water! Stay hydrated.";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ReminderState {
    Unscheduled,
    Scheduled {
        interval_minutes: i64,
        id: NotificationId,
    },
}

/// Owns the single recurring water reminder.
///
/// Notification failures never escape: they are logged and turned into `None`/`false`, leaving
/// the reminder inactive. Only interval validation and persistence report errors.
pub struct ReminderScheduler {
    store: Arc<dyn KeyValueStore>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    interval: AtomicI64,
    // Held for the whole cancel-then-schedule sequence so at most one series is ever active.
    state: Mutex<ReminderState>,
}

impl ReminderScheduler {
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        notifier: Arc<dyn Notifier>,
        settings: &Settings,
    ) -> Self {
        Self::with_clock(store, notifier, settings, Arc::new(SystemClock))
    }

    pub fn with_clock(
        store: Arc<dyn KeyValueStore>,
        notifier: Arc<dyn Notifier>,
        settings: &Settings,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            notifier,
            clock,
            interval: AtomicI64::new(settings.reminder_interval),
            state: Mutex::new(ReminderState::Unscheduled),
        }
    }

    /// Minutes between recurring reminders.
    #[must_use]
    pub fn interval(&self) -> i64 {
        self.interval.load(Ordering::Acquire)
    }

    pub async fn state(&self) -> ReminderState {
        self.state.lock().await.clone()
    }

    pub async fn ensure_permission(&self) -> bool {
        match self.notifier.request_permission().await {
            Ok(true) => true,
            Ok(false) => {
                warn!("notification permission not granted");
                false
            }
            Err(e) => {
                warn!(error = %e, "failed to request notification permission");
                false
            }
        }
    }

    /// Replace any active reminder with one firing every `interval()` minutes, starting one
    /// interval from now.
    #[instrument(skip(self))]
    pub async fn schedule_recurring(&self) -> Option<NotificationId> {
        let mut state = self.state.lock().await;
        self.reschedule(&mut state).await
    }

    #[instrument(skip(self))]
    pub async fn cancel_all(&self) {
        let mut state = self.state.lock().await;
        *state = ReminderState::Unscheduled;
        match self.notifier.cancel_all().await {
            Ok(()) => info!("all reminders cancelled"),
            Err(e) => warn!(error = %e, "failed to cancel reminders"),
        }
    }

    /// One immediate reminder, independent of the recurring schedule.
    #[instrument(skip(self))]
    pub async fn fire_now(&self) -> Option<NotificationId> {
        if !self.ensure_permission().await {
            return None;
        }
        match self
            .notifier
            .schedule(self.content(ReminderKind::OneShot), Trigger::immediate())
            .await
        {
            Ok(id) => {
                info!(%id, "sent immediate reminder");
                Some(id)
            }
            Err(e) => {
                error!(error = %e, "failed to send immediate reminder");
                None
            }
        }
    }

    /// Persist a new interval and reschedule to match it.
    ///
    /// Returns the new reminder id, or `None` when the reminder could not be scheduled. A storage
    /// failure leaves both the interval and the active schedule unchanged.
    #[instrument(skip(self))]
    pub async fn set_interval(&self, minutes: i64) -> Result<Option<NotificationId>> {
        let minutes = validate_interval(minutes)?;
        let mut state = self.state.lock().await;
        self.store
            .set(INTERVAL_KEY, &minutes.to_string())
            .await
            .inspect_err(|e| error!(error = %e, "failed to save reminder interval"))?;
        self.interval.store(minutes, Ordering::Release);
        info!(interval_minutes = minutes, "reminder interval updated");
        Ok(self.reschedule(&mut state).await)
    }

    /// Dismiss notification `id` after the user logged intake from it.
    ///
    /// Cancelling removes only that notification; the active recurring series is left alone.
    pub async fn acknowledge(&self, id: &NotificationId) {
        let state = self.state.lock().await;
        if matches!(&*state, ReminderState::Scheduled { id: active, .. } if active == id) {
            debug!(%id, "acknowledged recurring reminder, keeping series");
            return;
        }
        if let Err(e) = self.notifier.cancel(id).await {
            warn!(%id, error = %e, "failed to cancel acknowledged reminder");
        }
    }

    /// Interaction events for delivered reminders.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<NotificationResponse> {
        self.notifier.subscribe()
    }

    async fn reschedule(&self, state: &mut ReminderState) -> Option<NotificationId> {
        let interval = self.interval();

        if let Err(e) = self.notifier.cancel_all().await {
            warn!(error = %e, "failed to cancel previous reminders");
        }
        *state = ReminderState::Unscheduled;

        if !self.ensure_permission().await {
            return None;
        }

        let scheduled = match Trigger::every(interval.unsigned_abs()) {
            Ok(trigger) => {
                self.notifier
                    .schedule(self.content(ReminderKind::Recurring), trigger)
                    .await
            }
            Err(e) => Err(e),
        };
        match scheduled {
            Ok(id) => {
                info!(%id, interval_minutes = interval, "scheduled recurring reminder");
                *state = ReminderState::Scheduled {
                    interval_minutes: interval,
                    id: id.clone(),
                };
                Some(id)
            }
            Err(e) => {
                error!(error = %e, "failed to schedule recurring reminder");
                None
            }
        }
    }

    fn content(&self, kind: ReminderKind) -> NotificationContent {
        NotificationContent {
            title: REMINDER_TITLE.to_string(),
            body: REMINDER_BODY.to_string(),
            payload: ReminderPayload {
                kind,
                origin_timestamp: self.clock.now_millis(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::atomic::AtomicBool;
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::error::{Error, NotificationError, StorageError};
    use crate::notify::TokioNotifier;
    use crate::store::MemoryStore;

    /// Records every call; `active` mirrors what the platform would still fire.
    #[derive(Default)]
    struct FakeNotifier {
        denied: AtomicBool,
        fail_schedule: AtomicBool,
        next: std::sync::Mutex<u32>,
        active: std::sync::Mutex<HashMap<NotificationId, Trigger>>,
        responses: Option<broadcast::Sender<NotificationResponse>>,
    }

    impl FakeNotifier {
        fn active(&self) -> HashMap<NotificationId, Trigger> {
            self.active.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Notifier for FakeNotifier {
        async fn request_permission(&self) -> std::result::Result<bool, NotificationError> {
            Ok(!self.denied.load(Ordering::SeqCst))
        }

        async fn schedule(
            &self,
            _content: NotificationContent,
            trigger: Trigger,
        ) -> std::result::Result<NotificationId, NotificationError> {
            if self.fail_schedule.load(Ordering::SeqCst) {
                return Err(NotificationError::Schedule("boom".into()));
            }
            let mut next = self.next.lock().unwrap();
            *next += 1;
            let id = NotificationId(format!("n{next}"));
            self.active.lock().unwrap().insert(id.clone(), trigger);
            Ok(id)
        }

        async fn cancel(&self, id: &NotificationId) -> std::result::Result<(), NotificationError> {
            self.active.lock().unwrap().remove(id);
            Ok(())
        }

        async fn cancel_all(&self) -> std::result::Result<(), NotificationError> {
            self.active.lock().unwrap().clear();
            Ok(())
        }

        fn subscribe(&self) -> broadcast::Receiver<NotificationResponse> {
            match &self.responses {
                Some(tx) => tx.subscribe(),
                None => broadcast::channel(1).1,
            }
        }
    }

    struct ReadOnlyStore;

    #[async_trait]
    impl KeyValueStore for ReadOnlyStore {
        async fn get(&self, _key: &str) -> std::result::Result<Option<String>, StorageError> {
            Ok(None)
        }

        async fn set(&self, _key: &str, _value: &str) -> std::result::Result<(), StorageError> {
            Err(StorageError::Poisoned)
        }

        async fn remove(&self, _key: &str) -> std::result::Result<(), StorageError> {
            Err(StorageError::Poisoned)
        }
    }

    fn scheduler(notifier: Arc<FakeNotifier>) -> (ReminderScheduler, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let scheduler = ReminderScheduler::new(store.clone(), notifier, &Settings::default());
        (scheduler, store)
    }

    fn recurring(minutes: u64) -> Trigger {
        Trigger::every(minutes).unwrap()
    }

    #[tokio::test]
    async fn test_schedule_recurring_uses_default_interval() {
        let notifier = Arc::new(FakeNotifier::default());
        let (scheduler, _) = scheduler(notifier.clone());
        assert_eq!(scheduler.state().await, ReminderState::Unscheduled);

        let id = scheduler.schedule_recurring().await.unwrap();

        let active = notifier.active();
        assert_eq!(active.len(), 1);
        assert_eq!(active[&id], recurring(60));
        assert_eq!(active[&id].delay_seconds, 3600);
        assert_eq!(
            scheduler.state().await,
            ReminderState::Scheduled {
                interval_minutes: 60,
                id
            }
        );
    }

    #[tokio::test]
    async fn test_set_interval_replaces_schedule() {
        let notifier = Arc::new(FakeNotifier::default());
        let (scheduler, store) = scheduler(notifier.clone());

        let first = scheduler.set_interval(30).await.unwrap().unwrap();
        let second = scheduler.set_interval(15).await.unwrap().unwrap();
        assert_ne!(first, second);

        let active = notifier.active();
        assert_eq!(active.len(), 1);
        assert_eq!(active[&second], recurring(15));
        assert!(!active.contains_key(&first));

        assert_eq!(scheduler.interval(), 15);
        assert_eq!(store.get(INTERVAL_KEY).await.unwrap().as_deref(), Some("15"));
    }

    #[tokio::test]
    async fn test_set_interval_rejects_non_positive() {
        let notifier = Arc::new(FakeNotifier::default());
        let (scheduler, store) = scheduler(notifier.clone());
        let id = scheduler.schedule_recurring().await.unwrap();

        for minutes in [0, -15] {
            let err = scheduler.set_interval(minutes).await.unwrap_err();
            assert!(matches!(err, Error::Validation(_)));
        }
        assert!(store.get(INTERVAL_KEY).await.unwrap().is_none());
        assert_eq!(scheduler.interval(), 60);
        assert!(notifier.active().contains_key(&id));
    }

    #[tokio::test]
    async fn test_set_interval_rejects_out_of_range_before_persisting() {
        let notifier = Arc::new(TokioNotifier::new(true));
        let store = Arc::new(MemoryStore::new());
        let scheduler =
            ReminderScheduler::new(store.clone(), notifier.clone(), &Settings::default());
        let id = scheduler.schedule_recurring().await.unwrap();

        let err = scheduler.set_interval(i64::MAX / 2).await.unwrap_err();
        assert!(err.is_validation());
        assert!(store.get(INTERVAL_KEY).await.unwrap().is_none());
        assert_eq!(scheduler.interval(), 60);
        assert_eq!(notifier.pending(), vec![id]);

        // A stored out-of-range value from an older build is ignored on the next start
        store
            .set(INTERVAL_KEY, &(i64::MAX / 2).to_string())
            .await
            .unwrap();
        let settings = Settings::load(store.as_ref()).await.unwrap();
        let restarted = ReminderScheduler::new(store, notifier.clone(), &settings);
        assert_eq!(restarted.interval(), 60);
        assert!(restarted.schedule_recurring().await.is_some());
    }

    #[tokio::test]
    async fn test_set_interval_storage_failure_keeps_schedule() {
        let notifier = Arc::new(FakeNotifier::default());
        let scheduler =
            ReminderScheduler::new(Arc::new(ReadOnlyStore), notifier.clone(), &Settings::default());
        let id = scheduler.schedule_recurring().await.unwrap();

        let err = scheduler.set_interval(20).await.unwrap_err();
        assert!(matches!(err, Error::Storage(_)));
        assert_eq!(scheduler.interval(), 60);
        assert_eq!(notifier.active()[&id], recurring(60));
    }

    #[tokio::test]
    async fn test_permission_denied_schedules_nothing() {
        let notifier = Arc::new(FakeNotifier::default());
        notifier.denied.store(true, Ordering::SeqCst);
        let (scheduler, _) = scheduler(notifier.clone());

        assert!(!scheduler.ensure_permission().await);
        assert!(scheduler.schedule_recurring().await.is_none());
        assert!(scheduler.fire_now().await.is_none());
        assert!(notifier.active().is_empty());
        assert_eq!(scheduler.state().await, ReminderState::Unscheduled);

        // The interval is still saved even though no reminder could be scheduled
        assert_eq!(scheduler.set_interval(45).await.unwrap(), None);
        assert_eq!(scheduler.interval(), 45);
    }

    #[tokio::test]
    async fn test_permission_revoked_drops_previous_schedule() {
        let notifier = Arc::new(FakeNotifier::default());
        let (scheduler, _) = scheduler(notifier.clone());
        scheduler.schedule_recurring().await.unwrap();

        notifier.denied.store(true, Ordering::SeqCst);
        assert!(scheduler.schedule_recurring().await.is_none());
        assert!(notifier.active().is_empty());
        assert_eq!(scheduler.state().await, ReminderState::Unscheduled);
    }

    #[tokio::test]
    async fn test_schedule_failure_degrades_to_none() {
        let notifier = Arc::new(FakeNotifier::default());
        notifier.fail_schedule.store(true, Ordering::SeqCst);
        let (scheduler, _) = scheduler(notifier.clone());

        assert!(scheduler.schedule_recurring().await.is_none());
        assert!(scheduler.fire_now().await.is_none());
        assert_eq!(scheduler.state().await, ReminderState::Unscheduled);
    }

    #[tokio::test]
    async fn test_fire_now_leaves_state_alone() {
        let notifier = Arc::new(FakeNotifier::default());
        let (scheduler, _) = scheduler(notifier.clone());
        let recurring_id = scheduler.schedule_recurring().await.unwrap();
        let before = scheduler.state().await;

        let one_shot = scheduler.fire_now().await.unwrap();
        assert_ne!(one_shot, recurring_id);
        assert_eq!(notifier.active()[&one_shot], Trigger::immediate());
        assert_eq!(scheduler.state().await, before);
    }

    #[tokio::test]
    async fn test_acknowledge_keeps_recurring_series() {
        let notifier = Arc::new(FakeNotifier::default());
        let (scheduler, _) = scheduler(notifier.clone());
        let recurring_id = scheduler.schedule_recurring().await.unwrap();
        let one_shot = scheduler.fire_now().await.unwrap();

        scheduler.acknowledge(&recurring_id).await;
        assert!(notifier.active().contains_key(&recurring_id));

        scheduler.acknowledge(&one_shot).await;
        assert!(!notifier.active().contains_key(&one_shot));
        assert!(notifier.active().contains_key(&recurring_id));
    }

    #[tokio::test]
    async fn test_cancel_all() {
        let notifier = Arc::new(FakeNotifier::default());
        let (scheduler, _) = scheduler(notifier.clone());
        scheduler.schedule_recurring().await.unwrap();
        scheduler.fire_now().await.unwrap();

        scheduler.cancel_all().await;
        assert!(notifier.active().is_empty());
        assert_eq!(scheduler.state().await, ReminderState::Unscheduled);
    }

    #[tokio::test]
    async fn test_loaded_interval_is_used() {
        let notifier = Arc::new(FakeNotifier::default());
        let store = Arc::new(MemoryStore::new());
        store.set(INTERVAL_KEY, "20").await.unwrap();
        let settings = Settings::load(store.as_ref()).await.unwrap();
        let scheduler = ReminderScheduler::new(store, notifier.clone(), &settings);

        let id = scheduler.schedule_recurring().await.unwrap();
        assert_eq!(notifier.active()[&id], recurring(20));
    }

    #[tokio::test]
    async fn test_subscribe_forwards_responses() {
        let (tx, _) = broadcast::channel(4);
        let notifier = Arc::new(FakeNotifier {
            responses: Some(tx.clone()),
            ..FakeNotifier::default()
        });
        let (scheduler, _) = scheduler(notifier);
        let mut rx = scheduler.subscribe();

        let response = NotificationResponse {
            id: NotificationId::from("n1"),
            payload: ReminderPayload {
                kind: ReminderKind::Recurring,
                origin_timestamp: 42,
            },
        };
        tx.send(response.clone()).unwrap();
        assert_eq!(rx.recv().await.unwrap(), response);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rescheduled_reminder_fires_at_new_interval() {
        let notifier = Arc::new(TokioNotifier::new(true));
        let store = Arc::new(MemoryStore::new());
        let scheduler = ReminderScheduler::new(store, notifier.clone(), &Settings::default());
        let mut deliveries = notifier.deliveries();

        scheduler.set_interval(30).await.unwrap().unwrap();
        let id = scheduler.set_interval(15).await.unwrap().unwrap();
        assert_eq!(notifier.pending(), vec![id.clone()]);

        let start = tokio::time::Instant::now();
        for n in 1..=4 {
            let delivery = deliveries.recv().await.unwrap();
            assert_eq!(delivery.id, id);
            assert_eq!(delivery.content.title, REMINDER_TITLE);
            assert_eq!(delivery.content.payload.kind, ReminderKind::Recurring);
            assert_eq!(start.elapsed(), Duration::from_secs(15 * 60 * n));
        }

        scheduler.cancel_all().await;
        assert!(notifier.pending().is_empty());
    }
}
