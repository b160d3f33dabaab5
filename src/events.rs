//! Synchronous event listeners for observing a run.
//!
//! Listeners subscribe per event kind and are invoked in subscription order
//! while the engine processes a bar. Removal is by the identity token
//! returned at subscription time.

use crate::models::Bar;
use crate::orders::Order;
use crate::position::{Fill, Trade};

/// An observable engine event.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum EngineEvent {
    /// A bar finished processing
    Bar(Bar),
    /// An entry or merge fill executed
    Fill(Fill),
    /// A position (or part of one) closed
    Exit {
        /// The exit fill
        fill: Fill,
        /// The completed trade
        trade: Trade,
    },
    /// The strategy emitted an order
    Signal {
        /// Timestamp of the bar the order was emitted on
        timestamp: i64,
        /// The order as emitted
        order: Order,
    },
}

/// Event categories a listener can subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// Bar processed
    Bar,
    /// Entry/merge fill
    Fill,
    /// Position closed
    Exit,
    /// Strategy order emitted
    Signal,
}

impl EngineEvent {
    /// The category this event belongs to
    pub fn kind(&self) -> EventKind {
        match self {
            EngineEvent::Bar(_) => EventKind::Bar,
            EngineEvent::Fill(_) => EventKind::Fill,
            EngineEvent::Exit { .. } => EventKind::Exit,
            EngineEvent::Signal { .. } => EventKind::Signal,
        }
    }
}

/// Token identifying a subscription, used for removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Listener = Box<dyn FnMut(&EngineEvent) + Send>;

/// Registry of listeners, dispatched synchronously in subscription order.
#[derive(Default)]
pub struct EventHub {
    next_id: u64,
    listeners: Vec<(ListenerId, EventKind, Listener)>,
}

impl EventHub {
    /// Create an empty hub.
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe `listener` to events of `kind`; returns its identity token.
    pub fn subscribe(
        &mut self,
        kind: EventKind,
        listener: impl FnMut(&EngineEvent) + Send + 'static,
    ) -> ListenerId {
        let id = ListenerId(self.next_id);
        self.next_id += 1;
        self.listeners.push((id, kind, Box::new(listener)));
        id
    }

    /// Remove a listener by identity; returns whether it was present.
    pub fn unsubscribe(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(lid, _, _)| *lid != id);
        self.listeners.len() != before
    }

    /// Number of active subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.listeners.len()
    }

    /// Dispatch `event` to every listener of its kind, in order.
    pub fn emit(&mut self, event: &EngineEvent) {
        let kind = event.kind();
        for (_, k, listener) in self.listeners.iter_mut() {
            if *k == kind {
                listener(event);
            }
        }
    }
}
