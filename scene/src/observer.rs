use std::cell::{Cell, RefCell};

use bitflags::bitflags;

use crate::node::NodeId;

bitflags! {
    /// Event categories an observer can subscribe to.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct EventKinds: u8 {
        /// The node's world transform became stale.
        const TRANSFORM = 1 << 0;
        /// The node's world bounds became stale.
        const BOUNDS = 1 << 1;
        /// A child joined the node's child sequence.
        const CHILD_ADDED = 1 << 2;
        /// A child left the node's child sequence.
        const CHILD_REMOVED = 1 << 3;
    }
}

/// A change notification delivered synchronously from the mutating call.
///
/// Transform and bounds events fire on the clean-to-dirty transition only;
/// marking an already-stale node stays silent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraphEvent {
    TransformChanged { node: NodeId },
    BoundsChanged { node: NodeId },
    ChildAdded { parent: NodeId, child: NodeId },
    ChildRemoved { parent: NodeId, child: NodeId },
}

impl GraphEvent {
    /// The node an observer must be registered on to receive this event.
    pub fn target(&self) -> NodeId {
        match *self {
            GraphEvent::TransformChanged { node } => node,
            GraphEvent::BoundsChanged { node } => node,
            GraphEvent::ChildAdded { parent, .. } => parent,
            GraphEvent::ChildRemoved { parent, .. } => parent,
        }
    }

    pub fn kind(&self) -> EventKinds {
        match self {
            GraphEvent::TransformChanged { .. } => EventKinds::TRANSFORM,
            GraphEvent::BoundsChanged { .. } => EventKinds::BOUNDS,
            GraphEvent::ChildAdded { .. } => EventKinds::CHILD_ADDED,
            GraphEvent::ChildRemoved { .. } => EventKinds::CHILD_REMOVED,
        }
    }
}

/// Handle returned by [`crate::graph::SceneGraph::observe`], used to cancel
/// the registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

struct ObserverEntry {
    id: ObserverId,
    node: NodeId,
    kinds: EventKinds,
    handler: Box<dyn FnMut(&GraphEvent)>,
}

/// Registry of per-node observers.
///
/// Registrations live in a `RefCell` so notifications can fire from shared
/// borrows of the graph. Handlers run while that borrow is held; they must
/// not register or remove observers re-entrantly.
pub(crate) struct Observers {
    entries: RefCell<Vec<ObserverEntry>>,
    next_id: Cell<u64>,
}

impl Observers {
    pub(crate) fn new() -> Self {
        Self {
            entries: RefCell::new(Vec::new()),
            next_id: Cell::new(0),
        }
    }

    pub(crate) fn register(
        &self,
        node: NodeId,
        kinds: EventKinds,
        handler: Box<dyn FnMut(&GraphEvent)>,
    ) -> ObserverId {
        let id = ObserverId(self.next_id.get());
        self.next_id.set(self.next_id.get() + 1);
        self.entries.borrow_mut().push(ObserverEntry {
            id,
            node,
            kinds,
            handler,
        });
        id
    }

    /// Removes a registration. Returns false if the id was already gone.
    pub(crate) fn remove(&self, id: ObserverId) -> bool {
        let mut entries = self.entries.borrow_mut();
        let before = entries.len();
        entries.retain(|entry| entry.id != id);
        entries.len() != before
    }

    /// Drops every registration targeting `node`. Called when a node leaves
    /// the arena.
    pub(crate) fn drop_node(&self, node: NodeId) {
        self.entries.borrow_mut().retain(|entry| entry.node != node);
    }

    pub(crate) fn notify(&self, event: &GraphEvent) {
        let mut entries = self.entries.borrow_mut();
        for entry in entries.iter_mut() {
            if entry.node == event.target() && entry.kinds.intersects(event.kind()) {
                (entry.handler)(event);
            }
        }
    }
}
