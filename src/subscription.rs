use std::collections::HashMap;
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc, Mutex,
};
use tokio::sync::mpsc as tokio_mpsc;
use tracing::debug;

type SubscriptionId = u64;

/// Fan-out of updates to any number of subscribers.
///
/// Each subscriber gets its own unbounded receiver. Publishing never blocks and
/// never needs a runtime, so it is safe to call from engine callback threads.
/// A subscription is removed the first time a send to it fails, i.e. after the
/// receiver has been dropped.
pub struct Subscribers<T: Clone> {
    subscriptions: Arc<Mutex<HashMap<SubscriptionId, tokio_mpsc::UnboundedSender<T>>>>,
    next_id: Arc<AtomicU64>,
}

impl<T: Clone> Clone for Subscribers<T> {
    fn clone(&self) -> Self {
        Self {
            subscriptions: self.subscriptions.clone(),
            next_id: self.next_id.clone(),
        }
    }
}

impl<T: Clone> Default for Subscribers<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone> Subscribers<T> {
    pub fn new() -> Self {
        Self {
            subscriptions: Arc::new(Mutex::new(HashMap::new())),
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Subscribe to all future updates
    pub fn subscribe(&self) -> tokio_mpsc::UnboundedReceiver<T> {
        let (tx, rx) = tokio_mpsc::unbounded_channel();
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.subscriptions.lock().unwrap().insert(id, tx);
        rx
    }

    /// Subscribe and immediately receive `current` as the first item
    pub fn subscribe_with(&self, current: T) -> tokio_mpsc::UnboundedReceiver<T> {
        let (tx, rx) = tokio_mpsc::unbounded_channel();
        let _ = tx.send(current);
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.subscriptions.lock().unwrap().insert(id, tx);
        rx
    }

    pub fn publish(&self, item: T) {
        let mut subs = self.subscriptions.lock().unwrap();
        let mut to_remove = Vec::new();

        for (id, tx) in subs.iter() {
            if tx.send(item.clone()).is_err() {
                to_remove.push(*id);
            }
        }

        for id in to_remove {
            debug!("Dropping closed subscription {}", id);
            subs.remove(&id);
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscriptions.lock().unwrap().len()
    }
}
