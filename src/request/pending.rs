use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use tokio::sync::watch;
use tracing::debug;

use super::RequestKey;

/// Receiving half of a pending entry's cancellation handle.
#[derive(Debug)]
pub struct CancelSignal {
    rx: watch::Receiver<bool>,
}

impl CancelSignal {
    /// A signal no registry entry owns; it never fires.
    pub fn detached() -> Self {
        let (_tx, rx) = watch::channel(false);
        Self { rx }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once the owning entry is cancelled. Pends forever if the entry is
    /// dropped without being cancelled.
    pub async fn cancelled(&mut self) {
        if self.rx.wait_for(|cancelled| *cancelled).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// Identifies one registration so settlement never removes a newer entry under the same key.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PendingTicket {
    key: RequestKey,
    id: u64,
}

impl PendingTicket {
    pub fn key(&self) -> &RequestKey {
        &self.key
    }
}

struct PendingEntry {
    id: u64,
    cancel: watch::Sender<bool>,
}

impl PendingEntry {
    fn cancel(&self) {
        self.cancel.send_replace(true);
    }
}

/// In-flight requests by key. The most recent registration for a key always wins.
#[derive(Default)]
pub struct PendingRegistry {
    entries: DashMap<RequestKey, PendingEntry>,
    next_id: AtomicU64,
}

impl PendingRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a fresh entry for `key`, cancelling whichever entry it replaces.
    pub fn register(&self, key: RequestKey) -> (PendingTicket, CancelSignal) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = watch::channel(false);
        let previous = self
            .entries
            .insert(key.clone(), PendingEntry { id, cancel: tx });
        if let Some(previous) = previous {
            previous.cancel();
            debug!(key = %key, superseded = previous.id, by = id, "request.superseded");
        }
        (PendingTicket { key, id }, CancelSignal { rx })
    }

    /// Removes the ticket's entry if it is still the live one for its key.
    pub fn release(&self, ticket: &PendingTicket) -> bool {
        self.entries
            .remove_if(&ticket.key, |_, entry| entry.id == ticket.id)
            .is_some()
    }

    /// Cancels and removes every entry, returning how many were cancelled.
    pub fn release_all(&self) -> usize {
        let mut cancelled = 0;
        self.entries.retain(|_, entry| {
            entry.cancel();
            cancelled += 1;
            false
        });
        if cancelled > 0 {
            debug!(cancelled, "request.cancel_all");
        }
        cancelled
    }

    pub fn contains(&self, key: &RequestKey) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Releases its registration when the logical call settles or its future is dropped.
pub(crate) struct PendingGuard {
    registry: Arc<PendingRegistry>,
    ticket: Option<PendingTicket>,
}

impl PendingGuard {
    pub(crate) fn new(registry: Arc<PendingRegistry>, ticket: PendingTicket) -> Self {
        Self {
            registry,
            ticket: Some(ticket),
        }
    }

    pub(crate) fn detached(registry: Arc<PendingRegistry>) -> Self {
        Self {
            registry,
            ticket: None,
        }
    }
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        if let Some(ticket) = self.ticket.take() {
            self.registry.release(&ticket);
        }
    }
}

#[cfg(test)]
mod tests {
    use reqwest::Method;

    use super::*;
    use crate::request::RequestDescriptor;

    fn key(url: &str) -> RequestKey {
        RequestKey::from_descriptor(&RequestDescriptor::new(Method::GET, url))
    }

    #[test]
    fn duplicate_registration_cancels_previous_entry() {
        let registry = PendingRegistry::new();
        let (first_ticket, first) = registry.register(key("/user/info"));
        let (second_ticket, second) = registry.register(key("/user/info"));

        assert!(first.is_cancelled());
        assert!(!second.is_cancelled());
        assert_eq!(registry.len(), 1);

        assert!(!registry.release(&first_ticket), "stale ticket must not evict the survivor");
        assert!(registry.contains(&key("/user/info")));
        assert!(registry.release(&second_ticket));
        assert!(registry.is_empty());
    }

    #[test]
    fn distinct_keys_do_not_interfere() {
        let registry = PendingRegistry::new();
        let (_a, a) = registry.register(key("/a"));
        let (_b, b) = registry.register(key("/b"));
        assert!(!a.is_cancelled());
        assert!(!b.is_cancelled());
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn release_all_cancels_everything() {
        let registry = PendingRegistry::new();
        let (_a, a) = registry.register(key("/a"));
        let (_b, b) = registry.register(key("/b"));
        assert_eq!(registry.release_all(), 2);
        assert!(a.is_cancelled());
        assert!(b.is_cancelled());
        assert!(registry.is_empty());
    }

    #[test]
    fn guard_releases_on_drop() {
        let registry = Arc::new(PendingRegistry::new());
        let (ticket, _signal) = registry.register(key("/a"));
        let guard = PendingGuard::new(Arc::clone(&registry), ticket);
        assert_eq!(registry.len(), 1);
        drop(guard);
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn cancelled_future_resolves_after_supersede() {
        let registry = PendingRegistry::new();
        let (_first_ticket, mut first) = registry.register(key("/a"));
        let _second = registry.register(key("/a"));
        tokio::time::timeout(std::time::Duration::from_secs(1), first.cancelled())
            .await
            .expect("superseded signal should fire");
    }
}
