//! The relay binary's own modules: configuration, the live/replay
//! ingestion pipeline, and the collaborator-facing HTTP/WS surface.
//!
//! Feed-agnostic state machinery (merge rule, codec, derivation, `Store`)
//! lives in `relay-core`; wire types shared with the upstream/downstream
//! protocols live in `relay-protocol`.

pub mod config;
pub mod egress;
pub mod error;
pub mod http;
pub mod ingress;
pub mod replay;
pub mod transport;

use egress::SubscriberRegistry;
use ingress::Ingress;
use relay_core::Store;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<Store>,
    pub subscribers: SubscriberRegistry,
}

impl AppState {
    #[must_use]
    pub fn new() -> Self {
        AppState {
            store: Arc::new(Store::new()),
            subscribers: SubscriberRegistry::new(),
        }
    }

    #[must_use]
    pub fn ingress(&self) -> Ingress {
        Ingress::new(Arc::clone(&self.store), self.subscribers.clone())
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}
