//! Completion broadcaster for "something finished" signals.
//!
//! Delivery is best effort with latest-state semantics: each subscriber has
//! a one-slot buffer, and a publish that finds the slot still full is
//! dropped for that subscriber only. A subscriber that has not drained its
//! previous notification therefore sees several publishes coalesced into
//! one. This is not an event log.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

const SUBSCRIBER_BUFFER: usize = 1;

struct Subscriber {
    tx: mpsc::Sender<bool>,
    /// Fires when the caller's token ends or the receiver is found dropped.
    teardown: CancellationToken,
}

#[derive(Default)]
struct Registry {
    next_id: u64,
    subscribers: HashMap<u64, Subscriber>,
}

/// Registry of live subscribers, cheap to clone.
#[derive(Clone, Default)]
pub struct Broadcaster {
    registry: Arc<Mutex<Registry>>,
}

impl std::fmt::Debug for Broadcaster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Broadcaster")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

impl Broadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    fn registry(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Register a subscriber for as long as `token` is live.
    ///
    /// When `token` is cancelled the subscriber is removed and its channel
    /// closed, so the receiver yields `None`. Must be called inside a Tokio
    /// runtime.
    pub fn subscribe(&self, token: CancellationToken) -> mpsc::Receiver<bool> {
        let (tx, rx) = mpsc::channel(SUBSCRIBER_BUFFER);
        let teardown = token.child_token();

        let id = {
            let mut registry = self.registry();
            registry.next_id += 1;
            let id = registry.next_id;
            registry.subscribers.insert(
                id,
                Subscriber {
                    tx,
                    teardown: teardown.clone(),
                },
            );
            id
        };
        tracing::debug!(subscriber = id, "Subscriber registered");

        let broadcaster = self.clone();
        tokio::spawn(async move {
            teardown.cancelled().await;
            broadcaster.unsubscribe(id);
        });

        rx
    }

    /// Remove a subscriber, dropping its sender. Safe to call more than once.
    fn unsubscribe(&self, id: u64) -> bool {
        let removed = self.registry().subscribers.remove(&id);
        match removed {
            Some(subscriber) => {
                subscriber.teardown.cancel();
                tracing::debug!(subscriber = id, "Subscriber removed");
                true
            }
            None => false,
        }
    }

    /// Notify every live subscriber without blocking. Returns how many
    /// subscribers received the notification.
    pub fn publish(&self) -> usize {
        let mut delivered = 0;
        let mut registry = self.registry();
        let mut gone = Vec::new();

        for (id, subscriber) in registry.subscribers.iter() {
            match subscriber.tx.try_send(true) {
                Ok(()) => delivered += 1,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    tracing::trace!(subscriber = id, "Subscriber busy, notification dropped");
                }
                Err(mpsc::error::TrySendError::Closed(_)) => gone.push(*id),
            }
        }

        for id in gone {
            if let Some(subscriber) = registry.subscribers.remove(&id) {
                subscriber.teardown.cancel();
                tracing::debug!(subscriber = id, "Receiver dropped, subscriber removed");
            }
        }

        delivered
    }

    pub fn subscriber_count(&self) -> usize {
        self.registry().subscribers.len()
    }
}
