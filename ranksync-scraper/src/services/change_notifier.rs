//! Post-commit change notifications
//!
//! One event per affected map, published only after the cycle's
//! transaction committed. Publishing never fails the cycle.

use ranksync_common::catalog::SourceKind;
use ranksync_common::events::{CatalogEvent, ChangeKind, EventSink, CATALOG_TOPIC};
use std::sync::Arc;

/// Publishes `maps.{id}.updated.{kind}` events for one source
#[derive(Clone)]
pub struct ChangeNotifier {
    sink: Arc<dyn EventSink>,
    source: SourceKind,
}

impl ChangeNotifier {
    pub fn new(sink: Arc<dyn EventSink>, source: SourceKind) -> Self {
        Self { sink, source }
    }

    /// Publish one event per map id, returns the number published
    pub fn notify<I>(&self, map_ids: I, kind: ChangeKind) -> usize
    where
        I: IntoIterator<Item = i64>,
    {
        let mut published = 0;
        for map_id in map_ids {
            let event = CatalogEvent::map_updated(map_id, self.source, kind);
            self.sink.publish(CATALOG_TOPIC, &event.routing_key(), &event);
            published += 1;
        }

        if published > 0 {
            tracing::debug!(
                source = %self.source,
                kind = kind.as_str(),
                published,
                "Published change notifications"
            );
        }

        published
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ranksync_common::events::EventBus;

    #[tokio::test]
    async fn test_one_event_per_map() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();
        let notifier = ChangeNotifier::new(Arc::new(bus), SourceKind::ScoreSaber);

        let published = notifier.notify([3, 5], ChangeKind::Ranked);
        assert_eq!(published, 2);

        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        assert_eq!(first.topic, CATALOG_TOPIC);
        assert_eq!(first.routing_key, "maps.3.updated.ranked");
        assert_eq!(second.routing_key, "maps.5.updated.ranked");
        assert!(matches!(
            second.payload,
            CatalogEvent::MapUpdated { map_id: 5, source: SourceKind::ScoreSaber, .. }
        ));
    }

    #[test]
    fn test_nothing_to_notify() {
        let notifier = ChangeNotifier::new(Arc::new(EventBus::new(4)), SourceKind::BeatLeader);
        assert_eq!(notifier.notify(Vec::new(), ChangeKind::Qualified), 0);
    }
}
