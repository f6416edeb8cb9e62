use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{RwLock, mpsc};
use tracing::{debug, info};
use uuid::Uuid;

/// What a connection's writer task is asked to do next.
#[derive(Debug, Clone)]
pub enum Outbound {
    /// A serialized event, written as one text frame
    Frame(Arc<str>),
    /// Send a close frame and stop
    Close,
}

/// Sending half of one live push connection.
///
/// Everything for a connection goes through its single outbound channel, so
/// frames are written one at a time in the order they were enqueued.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    conn_id: Uuid,
    tx: mpsc::UnboundedSender<Outbound>,
}

impl ConnectionHandle {
    /// New handle plus the receiver its writer task drains.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Outbound>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                conn_id: Uuid::new_v4(),
                tx,
            },
            rx,
        )
    }

    pub fn conn_id(&self) -> Uuid {
        self.conn_id
    }

    /// Queue a frame. Returns `false` if the writer is gone.
    pub fn send(&self, frame: Arc<str>) -> bool {
        self.tx.send(Outbound::Frame(frame)).is_ok()
    }

    /// Ask the writer to close the socket. No-op if it already stopped.
    pub fn close(&self) {
        let _ = self.tx.send(Outbound::Close);
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// user id -> the one live connection for that user.
#[derive(Clone, Default)]
pub struct ConnectionRegistry {
    connections: Arc<RwLock<HashMap<String, ConnectionHandle>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `handle` as the user's connection. Any previous connection is
    /// closed first; its id is returned.
    pub async fn register(&self, user_id: &str, handle: ConnectionHandle) -> Option<Uuid> {
        let mut connections = self.connections.write().await;
        let evicted = connections.remove(user_id).map(|old| {
            old.close();
            old.conn_id
        });

        if let Some(old_id) = evicted {
            info!("{} reconnected, evicting connection {}", user_id, old_id);
        }
        debug!("Registered connection {} for {}", handle.conn_id, user_id);
        connections.insert(user_id.to_string(), handle);
        evicted
    }

    /// Remove and close the user's connection. Safe to call repeatedly.
    pub async fn unregister(&self, user_id: &str) -> bool {
        let removed = self.connections.write().await.remove(user_id);
        match removed {
            Some(handle) => {
                handle.close();
                debug!("Unregistered connection {} for {}", handle.conn_id, user_id);
                true
            }
            None => false,
        }
    }

    /// Like `unregister`, but only if `conn_id` is still the stored
    /// connection. A connection evicted by a newer one must not remove its
    /// successor on its way out.
    pub async fn release(&self, user_id: &str, conn_id: Uuid) -> bool {
        let mut connections = self.connections.write().await;
        let is_current = connections
            .get(user_id)
            .is_some_and(|handle| handle.conn_id == conn_id);
        if !is_current {
            return false;
        }

        if let Some(handle) = connections.remove(user_id) {
            handle.close();
        }
        debug!("Released connection {} for {}", conn_id, user_id);
        true
    }

    pub async fn get(&self, user_id: &str) -> Option<ConnectionHandle> {
        self.connections.read().await.get(user_id).cloned()
    }

    pub async fn is_registered(&self, user_id: &str) -> bool {
        self.connections.read().await.contains_key(user_id)
    }

    /// Number of users with a live connection.
    pub async fn len(&self) -> usize {
        self.connections.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
