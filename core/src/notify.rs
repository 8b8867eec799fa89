use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info};

use crate::error::NotificationError;

const CHANNEL_CAPACITY: usize = 32;
/// Fired one-shot notifications remembered so a late tap still resolves.
const FIRED_CAPACITY: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NotificationId(pub String);

impl fmt::Display for NotificationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NotificationId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReminderKind {
    Recurring,
    OneShot,
}

/// Data carried by a reminder and handed back when the user interacts with it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReminderPayload {
    pub kind: ReminderKind,
    /// When the reminder was scheduled, milliseconds since the Unix epoch.
    pub origin_timestamp: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NotificationContent {
    pub title: String,
    pub body: String,
    pub payload: ReminderPayload,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Trigger {
    pub delay_seconds: u64,
    pub repeats: bool,
}

impl Trigger {
    #[must_use]
    pub fn immediate() -> Self {
        Self {
            delay_seconds: 0,
            repeats: false,
        }
    }

    /// Fires `minutes` from now, then every `minutes` after that.
    pub fn every(minutes: u64) -> Result<Self, NotificationError> {
        let delay_seconds = minutes.checked_mul(60).ok_or_else(|| {
            NotificationError::Schedule(format!("interval of {minutes} minutes is too long"))
        })?;
        Ok(Self {
            delay_seconds,
            repeats: true,
        })
    }
}

/// The user interacted with a delivered notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NotificationResponse {
    pub id: NotificationId,
    pub payload: ReminderPayload,
}

/// A notification reaching the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Delivery {
    pub id: NotificationId,
    pub content: NotificationContent,
}

/// Platform notification scheduling.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Ask for (or confirm) permission to show notifications.
    async fn request_permission(&self) -> Result<bool, NotificationError>;

    async fn schedule(
        &self,
        content: NotificationContent,
        trigger: Trigger,
    ) -> Result<NotificationId, NotificationError>;

    /// Cancel one scheduled notification. Unknown ids are ignored.
    async fn cancel(&self, id: &NotificationId) -> Result<(), NotificationError>;

    async fn cancel_all(&self) -> Result<(), NotificationError>;

    /// Interaction events for delivered notifications.
    fn subscribe(&self) -> broadcast::Receiver<NotificationResponse>;
}

struct Scheduled {
    content: NotificationContent,
    handle: JoinHandle<()>,
}

#[derive(Default)]
struct Registry {
    scheduled: HashMap<NotificationId, Scheduled>,
    fired: VecDeque<(NotificationId, ReminderPayload)>,
}

impl Registry {
    fn payload(&self, id: &NotificationId) -> Option<ReminderPayload> {
        self.scheduled
            .get(id)
            .map(|s| s.content.payload)
            .or_else(|| {
                self.fired
                    .iter()
                    .find(|(fired, _)| fired == id)
                    .map(|(_, payload)| *payload)
            })
    }

    /// Move a one-shot that has fired out of the scheduled set.
    fn retire(&mut self, id: &NotificationId) {
        if let Some(s) = self.scheduled.remove(id) {
            self.fired.push_back((id.clone(), s.content.payload));
            if self.fired.len() > FIRED_CAPACITY {
                self.fired.pop_front();
            }
        }
    }

    fn forget(&mut self, id: &NotificationId) -> Option<Scheduled> {
        self.fired.retain(|(fired, _)| fired != id);
        self.scheduled.remove(id)
    }
}

type SharedRegistry = Arc<Mutex<Registry>>;

/// In-process notifier: every scheduled notification is a tokio task that sleeps until its
/// trigger fires and then broadcasts a [`Delivery`].
pub struct TokioNotifier {
    permission: AtomicBool,
    next_id: AtomicU64,
    registry: SharedRegistry,
    deliveries: broadcast::Sender<Delivery>,
    responses: broadcast::Sender<NotificationResponse>,
}

impl TokioNotifier {
    #[must_use]
    pub fn new(permission_granted: bool) -> Self {
        let (deliveries, _) = broadcast::channel(CHANNEL_CAPACITY);
        let (responses, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            permission: AtomicBool::new(permission_granted),
            next_id: AtomicU64::new(1),
            registry: SharedRegistry::default(),
            deliveries,
            responses,
        }
    }

    pub fn set_permission(&self, granted: bool) {
        self.permission.store(granted, Ordering::Release);
    }

    /// Delivered notifications, as they fire.
    #[must_use]
    pub fn deliveries(&self) -> broadcast::Receiver<Delivery> {
        self.deliveries.subscribe()
    }

    /// Ids of notifications that are still waiting to fire (recurring ones never finish).
    #[must_use]
    pub fn pending(&self) -> Vec<NotificationId> {
        lock(&self.registry)
            .map(|registry| registry.scheduled.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Record that the user opened notification `id`. Returns false for unknown ids.
    pub fn respond(&self, id: &NotificationId) -> bool {
        let Some(payload) = lock(&self.registry)
            .ok()
            .and_then(|registry| registry.payload(id))
        else {
            return false;
        };
        // No subscribers is not an error
        let _ = self.responses.send(NotificationResponse {
            id: id.clone(),
            payload,
        });
        true
    }
}

fn lock(registry: &SharedRegistry) -> Result<MutexGuard<'_, Registry>, NotificationError> {
    registry.lock().map_err(|_| NotificationError::Closed)
}

impl Drop for TokioNotifier {
    fn drop(&mut self) {
        if let Ok(mut registry) = lock(&self.registry) {
            for (_, s) in registry.scheduled.drain() {
                s.handle.abort();
            }
        }
    }
}

#[async_trait]
impl Notifier for TokioNotifier {
    async fn request_permission(&self) -> Result<bool, NotificationError> {
        Ok(self.permission.load(Ordering::Acquire))
    }

    async fn schedule(
        &self,
        content: NotificationContent,
        trigger: Trigger,
    ) -> Result<NotificationId, NotificationError> {
        if !self.permission.load(Ordering::Acquire) {
            return Err(NotificationError::PermissionDenied);
        }
        if trigger.repeats && trigger.delay_seconds == 0 {
            return Err(NotificationError::Schedule(
                "repeating notifications need a non-zero delay".to_string(),
            ));
        }

        let id = NotificationId(format!(
            "reminder-{}",
            self.next_id.fetch_add(1, Ordering::Relaxed)
        ));
        // Spawned under the lock so a one-shot cannot retire itself before it is registered.
        let mut registry = lock(&self.registry)?;
        let handle = tokio::spawn(deliver(
            id.clone(),
            content.clone(),
            trigger,
            self.deliveries.clone(),
            self.registry.clone(),
        ));
        registry
            .scheduled
            .insert(id.clone(), Scheduled { content, handle });
        drop(registry);

        debug!(%id, ?trigger, "scheduled notification");
        Ok(id)
    }

    async fn cancel(&self, id: &NotificationId) -> Result<(), NotificationError> {
        if let Some(s) = lock(&self.registry)?.forget(id) {
            s.handle.abort();
            debug!(%id, "cancelled notification");
        }
        Ok(())
    }

    async fn cancel_all(&self) -> Result<(), NotificationError> {
        let mut registry = lock(&self.registry)?;
        let count = registry.scheduled.len();
        for (_, s) in registry.scheduled.drain() {
            s.handle.abort();
        }
        registry.fired.clear();
        debug!(count, "cancelled all notifications");
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<NotificationResponse> {
        self.responses.subscribe()
    }
}

async fn deliver(
    id: NotificationId,
    content: NotificationContent,
    trigger: Trigger,
    deliveries: broadcast::Sender<Delivery>,
    registry: SharedRegistry,
) {
    let delay = Duration::from_secs(trigger.delay_seconds);

    if !trigger.repeats {
        tokio::time::sleep(delay).await;
        if let Ok(mut registry) = lock(&registry) {
            registry.retire(&id);
        }
        send_delivery(&id, &content, &deliveries);
        return;
    }

    let mut ticks = tokio::time::interval_at(Instant::now() + delay, delay);
    ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        ticks.tick().await;
        send_delivery(&id, &content, &deliveries);
    }
}

fn send_delivery(
    id: &NotificationId,
    content: &NotificationContent,
    deliveries: &broadcast::Sender<Delivery>,
) {
    info!(%id, title = %content.title, "delivering notification");
    let _ = deliveries.send(Delivery {
        id: id.clone(),
        content: content.clone(),
    });
}
