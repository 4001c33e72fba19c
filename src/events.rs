//! Typed publish/subscribe bus between views.
//!
//! Views never call each other. A view that mutates patients or history
//! publishes an event; every view interested in that data holds a
//! [`Subscription`] and re-fetches when it sees one. Delivery is
//! fire-and-forget; a dropped subscription is pruned on the next publish.

use std::collections::{BTreeSet, HashMap};
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::sync::{Arc, Mutex};

use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DashboardEvent {
    PatientsUpdated,
    HistoryUpdated,
}

impl DashboardEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            DashboardEvent::PatientsUpdated => "patientUpdated",
            DashboardEvent::HistoryUpdated => "historyUpdated",
        }
    }
}

/// Cheap to clone; all clones share one subscriber registry.
#[derive(Clone, Default)]
pub struct EventBus {
    subscribers: Arc<Mutex<HashMap<Uuid, Sender<DashboardEvent>>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> Subscription {
        let (tx, rx) = mpsc::channel();
        let id = Uuid::new_v4();
        self.registry().insert(id, tx);
        Subscription { id, rx }
    }

    /// Delivers `event` to every live subscriber and returns how many got it.
    pub fn publish(&self, event: DashboardEvent) -> usize {
        let mut subscribers = self.registry();
        subscribers.retain(|_, tx| tx.send(event).is_ok());
        tracing::debug!(
            event = event.as_str(),
            subscribers = subscribers.len(),
            "Published dashboard event"
        );
        subscribers.len()
    }

    /// Publishes both events, which is what every patient mutation does.
    pub fn publish_all(&self) {
        self.publish(DashboardEvent::PatientsUpdated);
        self.publish(DashboardEvent::HistoryUpdated);
    }

    pub fn subscriber_count(&self) -> usize {
        self.registry().len()
    }

    fn registry(&self) -> std::sync::MutexGuard<'_, HashMap<Uuid, Sender<DashboardEvent>>> {
        self.subscribers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Receiving end held by a view.
pub struct Subscription {
    id: Uuid,
    rx: Receiver<DashboardEvent>,
}

impl Subscription {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Drains everything queued so far, collapsing duplicates.
    pub fn drain(&self) -> BTreeSet<DashboardEvent> {
        let mut seen = BTreeSet::new();
        loop {
            match self.rx.try_recv() {
                Ok(event) => {
                    seen.insert(event);
                }
                Err(TryRecvError::Empty | TryRecvError::Disconnected) => break,
            }
        }
        seen
    }

    /// True if `event` arrived since the last drain. Other events are discarded.
    pub fn saw(&self, event: DashboardEvent) -> bool {
        self.drain().contains(&event)
    }
}
