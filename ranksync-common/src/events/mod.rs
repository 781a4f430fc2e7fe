//! Change events emitted after catalog updates
//!
//! Downstream consumers (search indexer, caches) only need to know that a
//! map's ranking data changed; they re-read the map themselves. Delivery is
//! fire-and-forget and duplicates are acceptable.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::catalog::SourceKind;

/// Topic all catalog change events are published on
pub const CATALOG_TOPIC: &str = "beatmaps";

/// Which part of a map's ranking data changed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Qualified,
    Ranked,
}

impl ChangeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeKind::Qualified => "qualified",
            ChangeKind::Ranked => "ranked",
        }
    }
}

/// Catalog event types
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum CatalogEvent {
    /// Ranking data of one map was updated by a sync cycle
    MapUpdated {
        /// Map (logical item) id
        map_id: i64,
        /// Ranking service whose data changed
        source: SourceKind,
        /// Qualified or ranked data
        kind: ChangeKind,
        /// When the change was committed
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

impl CatalogEvent {
    pub fn map_updated(map_id: i64, source: SourceKind, kind: ChangeKind) -> Self {
        CatalogEvent::MapUpdated {
            map_id,
            source,
            kind,
            timestamp: crate::time::now(),
        }
    }

    /// Routing key in the `maps.{id}.updated.{kind}` form
    pub fn routing_key(&self) -> String {
        match self {
            CatalogEvent::MapUpdated { map_id, kind, .. } => {
                format!("maps.{}.updated.{}", map_id, kind.as_str())
            }
        }
    }
}

/// Destination for change events
///
/// `publish` must not block and must not fail the caller: there is no
/// acknowledgement and the engine never waits on consumers.
pub trait EventSink: Send + Sync {
    fn publish(&self, topic: &str, routing_key: &str, payload: &CatalogEvent);
}

/// Message delivered to `EventBus` subscribers
#[derive(Debug, Clone)]
pub struct Envelope {
    pub topic: String,
    pub routing_key: String,
    pub payload: CatalogEvent,
}

/// In-process event bus backed by a tokio broadcast channel
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<Envelope>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// Slow subscribers lose the oldest events once `capacity` is exceeded.
    ///
    /// # Examples
    ///
    /// ```
    /// use ranksync_common::events::EventBus;
    ///
    /// let event_bus = EventBus::new(100);
    /// assert_eq!(event_bus.capacity(), 100);
    /// ```
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<Envelope> {
        self.tx.subscribe()
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, envelope: Envelope) {
        let _ = self.tx.send(envelope);
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl EventSink for EventBus {
    fn publish(&self, topic: &str, routing_key: &str, payload: &CatalogEvent) {
        tracing::trace!(topic, routing_key, subscribers = self.subscriber_count(), "Publishing event");
        self.emit_lossy(Envelope {
            topic: topic.to_string(),
            routing_key: routing_key.to_string(),
            payload: payload.clone(),
        });
    }
}
