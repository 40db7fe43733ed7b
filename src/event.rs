use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use tokio::sync::broadcast;

use crate::{
    navigator::SelectionMode,
    properties::{LinkEdge, Nid},
};

/// Buffered events per subscriber before a lagging receiver starts losing
/// the oldest entries.
pub const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// State-change notifications, fired only after a mutation succeeds and
/// carrying the minimal delta. One structural event per user gesture; link
/// events ride alongside when a gesture's content diff touched the index.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum OutlineEvent {
    /// Created block ids in pre-order, owning page
    BlocksCreated(Vec<Nid>, Nid),
    /// Block id, new content
    BlockUpdated(Nid, String),
    /// Moved block ids, owning page
    BlocksMoved(Vec<Nid>, Nid),
    /// Removed block ids, owning page
    BlocksDeleted(Vec<Nid>, Nid),
    /// New mode, ordered selected ids
    SelectionChanged(SelectionMode, Vec<Nid>),
    LinkAdded(LinkEdge),
    LinkRemoved(LinkEdge),
    /// Center id, node count, edge count of the produced view
    GraphBuilt(Nid, usize, usize),
}

impl OutlineEvent {
    /// The page a block event belongs to, `None` for selection, link and
    /// graph events.
    pub fn page(&self) -> Option<Nid> {
        match self {
            OutlineEvent::BlocksCreated(_, page) => Some(*page),
            OutlineEvent::BlocksMoved(_, page) => Some(*page),
            OutlineEvent::BlocksDeleted(_, page) => Some(*page),
            OutlineEvent::BlockUpdated(_, _)
            | OutlineEvent::SelectionChanged(_, _)
            | OutlineEvent::LinkAdded(_)
            | OutlineEvent::LinkRemoved(_)
            | OutlineEvent::GraphBuilt(_, _, _) => None,
        }
    }
}

impl Display for OutlineEvent {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self {
            OutlineEvent::BlocksCreated(_, _) => write!(f, "block:created"),
            OutlineEvent::BlockUpdated(_, _) => write!(f, "block:updated"),
            OutlineEvent::BlocksMoved(_, _) => write!(f, "block:moved"),
            OutlineEvent::BlocksDeleted(_, _) => write!(f, "block:deleted"),
            OutlineEvent::SelectionChanged(_, _) => write!(f, "selection:changed"),
            OutlineEvent::LinkAdded(_) => write!(f, "link:added"),
            OutlineEvent::LinkRemoved(_) => write!(f, "link:removed"),
            OutlineEvent::GraphBuilt(_, _, _) => write!(f, "graph:built"),
        }
    }
}

/// Publish/subscribe channel owned by one engine instance. Workspaces never
/// share a bus, so engines in one process cannot cross-talk.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<OutlineEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        EventBus { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<OutlineEvent> {
        self.tx.subscribe()
    }

    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Send one event. A send error only means nobody is subscribed.
    pub fn emit(&self, event: OutlineEvent) {
        tracing::trace!("emit {event}");
        let _ = self.tx.send(event);
    }

    pub fn emit_all<I: IntoIterator<Item = OutlineEvent>>(&self, events: I) {
        for event in events {
            self.emit(event);
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        EventBus::new(EVENT_CHANNEL_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn test_bus_delivers_in_order_to_each_subscriber() {
        let bus = EventBus::default();
        let mut rx_a = bus.subscribe();
        let mut rx_b = bus.subscribe();
        let id = Nid::new(Nid::workspace());
        bus.emit(OutlineEvent::BlocksCreated(vec![id], id));
        bus.emit(OutlineEvent::BlockUpdated(id, "edited".to_string()));
        for rx in [&mut rx_a, &mut rx_b] {
            assert_eq!(
                rx.try_recv().unwrap(),
                OutlineEvent::BlocksCreated(vec![id], id)
            );
            assert_eq!(
                rx.try_recv().unwrap(),
                OutlineEvent::BlockUpdated(id, "edited".to_string())
            );
            assert!(rx.try_recv().is_err(), "no further events queued");
        }
    }

    #[test]
    fn test_emit_without_subscribers_is_silent() {
        let bus = EventBus::new(8);
        let id = Nid::new(Nid::workspace());
        bus.emit(OutlineEvent::GraphBuilt(id, 1, 0));
        assert_eq!(bus.receiver_count(), 0);
    }

    #[test]
    fn test_event_display_names() {
        let id = Nid::new(Nid::workspace());
        assert_eq!(
            format!("{}", OutlineEvent::BlocksDeleted(vec![id], id)),
            "block:deleted"
        );
        assert_eq!(
            format!("{}", OutlineEvent::SelectionChanged(SelectionMode::None, vec![])),
            "selection:changed"
        );
    }
}
