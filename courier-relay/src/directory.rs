//! Client directory: the name → connection map.
//!
//! One directory per relay process. Every entry holds a cloned
//! [`ConnectionHandle`] plus the heartbeat flag. All state sits behind a
//! single lock, so registration, removal and the liveness sweep never
//! observe a half-updated map.

use courier_types::Envelope;
use std::collections::{BTreeSet, HashMap};
use tokio::sync::{mpsc, RwLock};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Identity of one accepted connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    /// A fresh random id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Short form is enough to correlate log lines
        write!(f, "{}", &self.0.simple().to_string()[..8])
    }
}

/// Opaque handle used to push envelopes to one connection.
///
/// Cloning is cheap; the directory, the engine and the connection loop all
/// hold clones of the same handle. Envelopes go through a bounded queue;
/// the close request travels on a separate token so a full queue can
/// never swallow it.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    id: ConnectionId,
    tx: mpsc::Sender<Envelope>,
    shutdown: CancellationToken,
}

impl ConnectionHandle {
    /// Create a handle and the queue its writer drains.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Envelope>) {
        let (tx, rx) = mpsc::channel(capacity);
        (
            Self {
                id: ConnectionId::new(),
                tx,
                shutdown: CancellationToken::new(),
            },
            rx,
        )
    }

    /// Connection id.
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Queue an envelope without waiting.
    ///
    /// Returns `false` (and logs) when the queue is full, the writer is
    /// gone, or a close was requested; the envelope is dropped in that case.
    pub fn send(&self, envelope: Envelope) -> bool {
        if self.shutdown.is_cancelled() {
            return false;
        }
        match self.tx.try_send(envelope) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!("Outbound queue full for connection {}; dropping", self.id);
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::debug!("Connection {} already closed; dropping", self.id);
                false
            }
        }
    }

    /// Ask the connection to close. Idempotent; never blocked by a full
    /// queue.
    pub fn close(&self) {
        self.shutdown.cancel();
    }

    /// Whether a close was requested.
    pub fn is_close_requested(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Resolves once a close is requested.
    pub async fn close_requested(&self) {
        self.shutdown.cancelled().await
    }

    /// The writer has stopped.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

#[derive(Debug)]
struct Entry {
    handle: ConnectionHandle,
    awaiting_pong: bool,
}

/// The registry of declared names.
#[derive(Debug, Default)]
pub struct Directory {
    entries: RwLock<HashMap<String, Entry>>,
}

impl Directory {
    /// Create an empty directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `name`, replacing any previous holder (last writer wins).
    ///
    /// Returns the replaced handle, if any.
    pub async fn register(&self, name: &str, handle: ConnectionHandle) -> Option<ConnectionHandle> {
        let mut entries = self.entries.write().await;
        entries
            .insert(
                name.to_string(),
                Entry {
                    handle,
                    awaiting_pong: false,
                },
            )
            .map(|old| old.handle)
    }

    /// Handle registered under `name`.
    pub async fn lookup(&self, name: &str) -> Option<ConnectionHandle> {
        let entries = self.entries.read().await;
        entries.get(name).map(|e| e.handle.clone())
    }

    /// Remove `name` unconditionally. Idempotent.
    pub async fn remove(&self, name: &str) -> Option<ConnectionHandle> {
        let mut entries = self.entries.write().await;
        entries.remove(name).map(|e| e.handle)
    }

    /// Remove `name` only if it is still held by connection `id`.
    pub async fn remove_if_owned(&self, name: &str, id: ConnectionId) -> bool {
        let mut entries = self.entries.write().await;
        let owned = entries.get(name).is_some_and(|e| e.handle.id() == id);
        if owned {
            entries.remove(name);
        }
        owned
    }

    /// Remove every name held by connection `id`; returns the removed names.
    pub async fn remove_connection(&self, id: ConnectionId) -> Vec<String> {
        let mut entries = self.entries.write().await;
        let owned: Vec<String> = entries
            .iter()
            .filter(|(_, e)| e.handle.id() == id)
            .map(|(name, _)| name.clone())
            .collect();
        for name in &owned {
            entries.remove(name);
        }
        owned
    }

    /// Whether `name` is held by connection `id`.
    pub async fn is_owned_by(&self, name: &str, id: ConnectionId) -> bool {
        let entries = self.entries.read().await;
        entries.get(name).is_some_and(|e| e.handle.id() == id)
    }

    /// Registered names in sorted order.
    pub async fn names(&self) -> BTreeSet<String> {
        let entries = self.entries.read().await;
        entries.keys().cloned().collect()
    }

    /// Visit every entry.
    ///
    /// Runs over a snapshot taken under the lock, so `f` may not see
    /// entries registered meanwhile and may see ones already removed.
    pub async fn for_each<F>(&self, mut f: F)
    where
        F: FnMut(&str, &ConnectionHandle),
    {
        for (name, handle) in self.snapshot().await {
            f(&name, &handle);
        }
    }

    /// Set every entry's `awaiting_pong` flag; returns the marked entries.
    pub async fn mark_all_awaiting(&self) -> Vec<(String, ConnectionHandle)> {
        let mut entries = self.entries.write().await;
        entries
            .iter_mut()
            .map(|(name, entry)| {
                entry.awaiting_pong = true;
                (name.clone(), entry.handle.clone())
            })
            .collect()
    }

    /// Clear the `awaiting_pong` flag for `name` if connection `id` holds
    /// it. Unknown or foreign names are ignored.
    pub async fn clear_awaiting(&self, name: &str, id: ConnectionId) -> bool {
        let mut entries = self.entries.write().await;
        match entries.get_mut(name) {
            Some(entry) if entry.handle.id() == id => {
                entry.awaiting_pong = false;
                true
            }
            _ => false,
        }
    }

    /// Remove and return every entry still awaiting a pong.
    pub async fn evict_unresponsive(&self) -> Vec<(String, ConnectionHandle)> {
        let mut entries = self.entries.write().await;
        let stale: Vec<String> = entries
            .iter()
            .filter(|(_, e)| e.awaiting_pong)
            .map(|(name, _)| name.clone())
            .collect();

        stale
            .into_iter()
            .filter_map(|name| entries.remove(&name).map(|e| (name, e.handle)))
            .collect()
    }

    /// Number of registered names.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Whether no names are registered.
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    async fn snapshot(&self) -> Vec<(String, ConnectionHandle)> {
        let entries = self.entries.read().await;
        entries
            .iter()
            .map(|(name, e)| (name.clone(), e.handle.clone()))
            .collect()
    }
}
