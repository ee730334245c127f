//! Ownership and lifecycle of live realtime channels.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use shared::models::ServerFrame;
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, warn};

struct ConnectionInner {
    id: u64,
    remote_addr: Option<SocketAddr>,
    connected_at: DateTime<Utc>,
    last_active_millis: AtomicI64,
    sender: mpsc::Sender<ServerFrame>,
}

/// Cloneable handle to one live bidirectional channel.
///
/// The handle only ever pushes frames; the read half stays with the
/// WebSocket task that accepted the connection.
#[derive(Clone)]
pub struct ConnectionHandle {
    inner: Arc<ConnectionInner>,
}

impl ConnectionHandle {
    /// Process-local sequence id, for logging only.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// Remote peer address, when known.
    #[must_use]
    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.inner.remote_addr
    }

    /// Timestamp at which the connection was accepted.
    #[must_use]
    pub fn connected_at(&self) -> DateTime<Utc> {
        self.inner.connected_at
    }

    /// Milliseconds-since-epoch of the last inbound frame.
    #[must_use]
    pub fn last_active_millis(&self) -> i64 {
        self.inner.last_active_millis.load(Ordering::Relaxed)
    }

    /// Records inbound activity on this connection.
    pub fn touch(&self) {
        self.inner
            .last_active_millis
            .store(Utc::now().timestamp_millis(), Ordering::Relaxed);
    }

    /// Pushes a frame to this connection.
    ///
    /// A closed or saturated channel is logged and swallowed; a failed
    /// send must never propagate into the dispatcher or crash the
    /// process. The slow or gone peer is expected to reconnect and
    /// re-authenticate on its own.
    pub fn send(&self, frame: ServerFrame) {
        match self.inner.sender.try_send(frame) {
            Ok(()) => {
                metrics::counter!("realtime_frames_sent_total").increment(1);
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!(connection_id = self.inner.id, "dropping frame for closed connection");
                metrics::counter!("realtime_frames_dropped_total", "reason" => "closed")
                    .increment(1);
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(connection_id = self.inner.id, "dropping frame for slow connection");
                metrics::counter!("realtime_frames_dropped_total", "reason" => "backpressure")
                    .increment(1);
            }
        }
    }
}

/// Owns all live connections and their metadata.
///
/// Entries exist from `accept` until `remove`; there is no TTL and no
/// channel recovery. Presence is process-local and lost on restart.
pub struct ConnectionManager {
    channel_capacity: usize,
    next_id: AtomicU64,
    connections: Mutex<HashMap<u64, ConnectionHandle>>,
}

impl ConnectionManager {
    /// Creates a manager whose per-connection outbound channels hold
    /// `channel_capacity` frames.
    #[must_use]
    pub fn new(channel_capacity: usize) -> Self {
        Self {
            channel_capacity: channel_capacity.max(1),
            next_id: AtomicU64::new(0),
            connections: Mutex::new(HashMap::new()),
        }
    }

    /// Registers a new connection and emits the `connection_established`
    /// acknowledgement on its channel.
    ///
    /// Returns the handle and the receiving half the socket writer task
    /// drains. Never blocks on the dispatcher.
    pub async fn accept(
        &self,
        remote_addr: Option<SocketAddr>,
    ) -> (ConnectionHandle, mpsc::Receiver<ServerFrame>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let (sender, receiver) = mpsc::channel(self.channel_capacity);

        let handle = ConnectionHandle {
            inner: Arc::new(ConnectionInner {
                id,
                remote_addr,
                connected_at: Utc::now(),
                last_active_millis: AtomicI64::new(Utc::now().timestamp_millis()),
                sender,
            }),
        };

        {
            let mut connections = self.connections.lock().await;
            connections.insert(id, handle.clone());
            metrics::gauge!("realtime_connections").set(usize_to_f64(connections.len()));
        }

        debug!(connection_id = id, remote_addr = ?remote_addr, "connection accepted");
        handle.send(ServerFrame::ConnectionEstablished {
            message: "Connected to PICTagram realtime channel".to_string(),
        });

        (handle, receiver)
    }

    /// Purges a connection's metadata after close or protocol error.
    ///
    /// Session registry cleanup is the caller's responsibility (see
    /// [`crate::realtime::Relay::disconnect`]).
    pub async fn remove(&self, handle: &ConnectionHandle) {
        let mut connections = self.connections.lock().await;
        if connections.remove(&handle.id()).is_some() {
            debug!(connection_id = handle.id(), "connection removed");
        }
        metrics::gauge!("realtime_connections").set(usize_to_f64(connections.len()));
    }

    /// Pushes a frame to every open connection except `origin`.
    ///
    /// This is the delivery strategy for public-interest events (likes,
    /// bookmarks, comments): authenticated or not, every other viewer
    /// gets the frame.
    pub async fn broadcast_except(&self, origin: u64, frame: &ServerFrame) {
        let connections = self.connections.lock().await;
        for (id, connection) in connections.iter() {
            if *id != origin {
                connection.send(frame.clone());
            }
        }
    }

    /// Number of currently open connections.
    pub async fn len(&self) -> usize {
        self.connections.lock().await.len()
    }

    /// Whether no connections are open.
    pub async fn is_empty(&self) -> bool {
        self.connections.lock().await.is_empty()
    }
}

#[allow(clippy::cast_precision_loss)]
fn usize_to_f64(value: usize) -> f64 {
    value as f64
}
