//! Downstream subscriber registry and broadcast.
//!
//! Mirrors the teacher's `AppState::broadcast_registry` pattern: a
//! `RwLock<HashMap<Uuid, Sender<_>>>` kept separate from the Store's own
//! lock. Unlike a `tokio::sync::broadcast` channel, each subscriber gets its
//! own bounded `mpsc` — a slow or dead subscriber is evicted individually on
//! the next failed send rather than lagging the whole fan-out.

use relay_protocol::Envelope;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tracing::debug;
use uuid::Uuid;

const SUBSCRIBER_QUEUE_DEPTH: usize = 256;

pub type SubscriberSender = mpsc::Sender<Arc<Envelope>>;
pub type SubscriberReceiver = mpsc::Receiver<Arc<Envelope>>;

#[derive(Clone, Default)]
pub struct SubscriberRegistry {
    inner: Arc<RwLock<HashMap<Uuid, SubscriberSender>>>,
}

impl SubscriberRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new subscriber and return its receiving half.
    pub async fn register(&self) -> (Uuid, SubscriberReceiver) {
        let id = Uuid::new_v4();
        let (tx, rx) = mpsc::channel(SUBSCRIBER_QUEUE_DEPTH);
        self.inner.write().await.insert(id, tx);
        (id, rx)
    }

    pub async fn unregister(&self, id: Uuid) {
        self.inner.write().await.remove(&id);
    }

    #[must_use]
    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    /// Deliver `envelope` to every registered subscriber. A subscriber whose
    /// send fails (channel full or closed) is evicted; no retry, no
    /// per-subscriber persistence.
    pub async fn broadcast(&self, envelope: Envelope) {
        let envelope = Arc::new(envelope);
        let targets: Vec<(Uuid, SubscriberSender)> = self
            .inner
            .read()
            .await
            .iter()
            .map(|(id, tx)| (*id, tx.clone()))
            .collect();

        let mut dead = Vec::new();
        for (id, tx) in targets {
            if tx.try_send(envelope.clone()).is_err() {
                dead.push(id);
            }
        }
        if !dead.is_empty() {
            let mut map = self.inner.write().await;
            for id in dead {
                debug!(subscriber = %id, "evicting subscriber after failed send");
                map.remove(&id);
            }
        }
    }
}
