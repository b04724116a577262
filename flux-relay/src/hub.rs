//! Fan-out of relay frames to N-1 participants with backpressure.
//!
//! All participants share one tokio broadcast channel; each subscribes and
//! filters out its own frames by connection id. The channel buffers up to
//! `capacity` frames per receiver, so a slow participant lags and drops the
//! oldest frames instead of stalling the broadcast loop.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use uuid::Uuid;

/// A frame in flight: the sender's connection id plus the verbatim text.
pub type RelayFrame = (Uuid, Arc<str>);

/// Statistics for monitoring fan-out health.
#[derive(Debug, Clone, Default)]
pub struct HubStats {
    pub frames_forwarded: u64,
    pub frames_dropped: u64,
    pub active_peers: usize,
}

/// Counters tracked via atomics so `forward()` never takes a lock.
struct AtomicHubStats {
    frames_forwarded: AtomicU64,
    frames_dropped: AtomicU64,
}

impl AtomicHubStats {
    fn new() -> Self {
        Self {
            frames_forwarded: AtomicU64::new(0),
            frames_dropped: AtomicU64::new(0),
        }
    }
}

/// The shared fan-out channel for one relay.
pub struct RelayHub {
    sender: broadcast::Sender<RelayFrame>,
    /// Connected participants: connection id → remote address (for logs).
    peers: Arc<RwLock<HashMap<Uuid, String>>>,
    capacity: usize,
    stats: Arc<AtomicHubStats>,
}

impl RelayHub {
    /// Create a hub buffering up to `capacity` frames per receiver.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            peers: Arc::new(RwLock::new(HashMap::new())),
            capacity,
            stats: Arc::new(AtomicHubStats::new()),
        }
    }

    /// Register a participant and return its fan-out receiver.
    pub async fn join(&self, id: Uuid, addr: String) -> broadcast::Receiver<RelayFrame> {
        let mut peers = self.peers.write().await;
        peers.insert(id, addr);
        self.sender.subscribe()
    }

    /// Remove a participant. Returns its remote address if it was known.
    pub async fn leave(&self, id: &Uuid) -> Option<String> {
        let mut peers = self.peers.write().await;
        peers.remove(id)
    }

    /// Forward a frame to every subscribed participant.
    ///
    /// Receivers skip frames carrying their own id, so the effective fan-out
    /// is N-1. Returns the number of subscribed receivers.
    pub fn forward(&self, from: Uuid, text: Arc<str>) -> usize {
        let count = self.sender.send((from, text)).unwrap_or(0);
        self.stats.frames_forwarded.fetch_add(1, Ordering::Relaxed);
        count
    }

    /// Record frames a lagging participant missed.
    pub fn note_dropped(&self, n: u64) {
        self.stats.frames_dropped.fetch_add(n, Ordering::Relaxed);
    }

    /// Current participant count.
    pub async fn peer_count(&self) -> usize {
        self.peers.read().await.len()
    }

    /// Whether a participant is currently registered.
    pub async fn has_peer(&self, id: &Uuid) -> bool {
        self.peers.read().await.contains_key(id)
    }

    /// Snapshot of fan-out counters.
    pub async fn stats(&self) -> HubStats {
        let peers = self.peers.read().await;
        HubStats {
            frames_forwarded: self.stats.frames_forwarded.load(Ordering::Relaxed),
            frames_dropped: self.stats.frames_dropped.load(Ordering::Relaxed),
            active_peers: peers.len(),
        }
    }

    /// Per-receiver buffer capacity.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_join_and_leave() {
        let hub = RelayHub::new(16);
        let id = Uuid::new_v4();

        let _rx = hub.join(id, "127.0.0.1:5000".into()).await;
        assert_eq!(hub.peer_count().await, 1);
        assert!(hub.has_peer(&id).await);

        assert_eq!(hub.leave(&id).await.as_deref(), Some("127.0.0.1:5000"));
        assert_eq!(hub.peer_count().await, 0);
        assert!(!hub.has_peer(&id).await);
    }

    #[tokio::test]
    async fn test_forward_reaches_all_receivers() {
        let hub = RelayHub::new(16);
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();

        let mut rx_alice = hub.join(alice, "a".into()).await;
        let mut rx_bob = hub.join(bob, "b".into()).await;

        let text: Arc<str> = Arc::from(r#"{"type":"tick"}"#);
        let count = hub.forward(alice, text.clone());
        assert_eq!(count, 2);

        // Every receiver sees the frame, tagged with the sender's id; the
        // connection loop is responsible for skipping its own.
        let (from, frame) = rx_alice.recv().await.unwrap();
        assert_eq!(from, alice);
        assert_eq!(&*frame, &*text);

        let (from, frame) = rx_bob.recv().await.unwrap();
        assert_eq!(from, alice);
        assert_eq!(&*frame, &*text);
    }

    #[tokio::test]
    async fn test_forward_with_no_receivers() {
        let hub = RelayHub::new(16);
        let count = hub.forward(Uuid::new_v4(), Arc::from("{}"));
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn test_stats_counters() {
        let hub = RelayHub::new(16);
        let id = Uuid::new_v4();
        let _rx = hub.join(id, "a".into()).await;

        hub.forward(id, Arc::from("{}"));
        hub.forward(id, Arc::from("{}"));
        hub.note_dropped(3);

        let stats = hub.stats().await;
        assert_eq!(stats.frames_forwarded, 2);
        assert_eq!(stats.frames_dropped, 3);
        assert_eq!(stats.active_peers, 1);
    }

    #[tokio::test]
    async fn test_lagging_receiver_drops_oldest() {
        let hub = RelayHub::new(2);
        let sender = Uuid::new_v4();
        let slow = Uuid::new_v4();
        let mut rx = hub.join(slow, "slow".into()).await;

        for _ in 0..5 {
            hub.forward(sender, Arc::from("{}"));
        }

        // The buffer held 2, so the receiver lags by 3.
        match rx.recv().await {
            Err(broadcast::error::RecvError::Lagged(n)) => assert_eq!(n, 3),
            other => panic!("expected lag, got {other:?}"),
        }
    }

    #[test]
    fn test_capacity() {
        let hub = RelayHub::new(64);
        assert_eq!(hub.capacity(), 64);
    }
}
