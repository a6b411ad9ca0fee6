use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use log::{debug, info, warn};
use tokio::sync::mpsc::{self, error::TrySendError};

use crate::types::{Sample, SampleUpdate};

pub type SubscriptionId = u64;

/// A live subscriber's end of the fan-out.
pub struct Subscription {
    id: SubscriptionId,
    receiver: mpsc::Receiver<SampleUpdate>,
}

impl Subscription {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    pub async fn recv(&mut self) -> Option<SampleUpdate> {
        self.receiver.recv().await
    }

    pub fn try_recv(&mut self) -> Option<SampleUpdate> {
        self.receiver.try_recv().ok()
    }
}

/// Per-publish delivery counts.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PublishReport {
    pub delivered: usize,
    pub dropped: usize,
    pub removed: usize,
}

/// Best-effort fan-out of accepted samples.
///
/// Every subscriber owns a bounded queue. `publish` never waits: a full queue
/// loses that one update, a closed queue gets its subscriber removed.
pub struct Broadcaster {
    subscribers: Mutex<HashMap<SubscriptionId, mpsc::Sender<SampleUpdate>>>,
    next_id: AtomicU64,
    buffer: usize,
}

impl Broadcaster {
    pub fn new(buffer: usize) -> Self {
        Self {
            subscribers: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            buffer: buffer.max(1),
        }
    }

    pub fn subscribe(&self) -> Subscription {
        let (sender, receiver) = mpsc::channel(self.buffer);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);

        self.registry().insert(id, sender);
        info!("Subscriber {} connected", id);

        Subscription { id, receiver }
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let removed = self.registry().remove(&id).is_some();
        if removed {
            info!("Subscriber {} disconnected", id);
        }
        removed
    }

    pub fn subscriber_count(&self) -> usize {
        self.registry().len()
    }

    pub fn publish(&self, sample: &Sample, alert: bool) -> PublishReport {
        // 先拍快照再投递，不在持锁期间发送
        let snapshot: Vec<(SubscriptionId, mpsc::Sender<SampleUpdate>)> = self
            .registry()
            .iter()
            .map(|(id, sender)| (*id, sender.clone()))
            .collect();

        let update = SampleUpdate { sample: sample.clone(), alert };
        let mut report = PublishReport::default();
        let mut closed = Vec::new();

        for (id, sender) in snapshot {
            match sender.try_send(update.clone()) {
                Ok(()) => report.delivered += 1,
                Err(TrySendError::Full(_)) => {
                    warn!("Subscriber {} is lagging, dropping update", id);
                    report.dropped += 1;
                }
                Err(TrySendError::Closed(_)) => closed.push(id),
            }
        }

        if !closed.is_empty() {
            let mut registry = self.registry();
            for id in closed {
                if registry.remove(&id).is_some() {
                    debug!("Removed closed subscriber {}", id);
                    report.removed += 1;
                }
            }
        }

        report
    }

    fn registry(&self) -> std::sync::MutexGuard<'_, HashMap<SubscriptionId, mpsc::Sender<SampleUpdate>>> {
        self.subscribers.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
