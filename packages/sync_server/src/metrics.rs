//! Relay counters exposed on `/metrics` and `/health`.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

#[derive(Debug)]
pub struct ServerMetrics {
    /// Relay sockets currently open
    pub active_connections: AtomicU64,
    /// Relay sockets accepted since start
    pub total_connections: AtomicU64,

    /// Decoded client frames
    pub events_received: AtomicU64,
    /// Events accepted by a recipient's outbound queue
    pub events_relayed: AtomicU64,
    /// Deliveries lost to a full or closed recipient queue
    pub deliveries_dropped: AtomicU64,
    pub malformed_frames: AtomicU64,

    pub websocket_errors: AtomicU64,

    /// Messages stored through `POST /api/messages`
    pub messages_persisted: AtomicU64,

    started: Instant,
}

impl Default for ServerMetrics {
    fn default() -> Self {
        Self::new()
    }
}

fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

fn read(counter: &AtomicU64) -> u64 {
    counter.load(Ordering::Relaxed)
}

impl ServerMetrics {
    pub fn new() -> Self {
        Self {
            active_connections: AtomicU64::new(0),
            total_connections: AtomicU64::new(0),
            events_received: AtomicU64::new(0),
            events_relayed: AtomicU64::new(0),
            deliveries_dropped: AtomicU64::new(0),
            malformed_frames: AtomicU64::new(0),
            websocket_errors: AtomicU64::new(0),
            messages_persisted: AtomicU64::new(0),
            started: Instant::now(),
        }
    }

    pub fn connection_opened(&self) {
        bump(&self.active_connections);
        bump(&self.total_connections);
    }

    pub fn connection_closed(&self) {
        // Never wraps below zero, even on a stray double close
        let _ = self
            .active_connections
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1));
    }

    pub fn event_received(&self) {
        bump(&self.events_received);
    }

    pub fn event_relayed(&self) {
        bump(&self.events_relayed);
    }

    pub fn delivery_dropped(&self) {
        bump(&self.deliveries_dropped);
    }

    pub fn malformed_frame(&self) {
        bump(&self.malformed_frames);
    }

    pub fn websocket_error(&self) {
        bump(&self.websocket_errors);
    }

    pub fn message_persisted(&self) {
        bump(&self.messages_persisted);
    }

    pub fn uptime_secs(&self) -> u64 {
        self.started.elapsed().as_secs()
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            uptime_secs: self.uptime_secs(),
            connections: ConnectionMetrics {
                active: read(&self.active_connections),
                total: read(&self.total_connections),
            },
            relay: RelayMetrics {
                received: read(&self.events_received),
                relayed: read(&self.events_relayed),
                dropped: read(&self.deliveries_dropped),
                malformed: read(&self.malformed_frames),
            },
            errors: ErrorMetrics {
                websocket: read(&self.websocket_errors),
            },
            messages_persisted: read(&self.messages_persisted),
        }
    }
}

/// JSON body of `/metrics`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub uptime_secs: u64,
    pub connections: ConnectionMetrics,
    pub relay: RelayMetrics,
    pub errors: ErrorMetrics,
    pub messages_persisted: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionMetrics {
    pub active: u64,
    pub total: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayMetrics {
    pub received: u64,
    pub relayed: u64,
    pub dropped: u64,
    pub malformed: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorMetrics {
    pub websocket: u64,
}

/// JSON body of `/health`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    pub connections: u64,
    pub online_participants: u64,
    pub uptime_secs: u64,
}
