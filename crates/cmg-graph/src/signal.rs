//! Connector events and their delivery.
//!
//! Every structural change emits a [`Notification`] to the registered
//! observers. Changes that affect results further down the pipeline are also
//! forwarded through the whole downstream fan-out, invalidating each reached
//! node's context on the way.

use std::fmt;

use tracing::{debug, trace};

use crate::engine::Engine;
use crate::node::{NodeId, PlugId, SocketId};
use crate::traversal::Direction;

/// What happened on a connector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectorEvent {
    /// No change, used to probe observers.
    Ok,
    /// A plug was connected to a socket.
    Connected,
    /// A connection or a node went away.
    Released,
    /// Upstream options or data changed.
    DataChanged,
    /// Data stored on a socket was replaced.
    StorageChanged,
    /// Connector types do not fit.
    IncompatibleData,
    /// An option value cannot be used by the module.
    IncompatibleOption,
    /// A context could not be produced or converted.
    IncompatibleContext,
    /// A required input is not connected.
    IncompleteGraph,
}

impl ConnectorEvent {
    /// Lowercase event name.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Connected => "connected",
            Self::Released => "released",
            Self::DataChanged => "data_changed",
            Self::StorageChanged => "storage_changed",
            Self::IncompatibleData => "incompatible_data",
            Self::IncompatibleOption => "incompatible_option",
            Self::IncompatibleContext => "incompatible_context",
            Self::IncompleteGraph => "incomplete_graph",
        }
    }

    /// Events after which downstream contexts must be rebuilt.
    pub const fn invalidates(self) -> bool {
        matches!(
            self,
            Self::Connected | Self::Released | Self::DataChanged | Self::StorageChanged
        )
    }
}

impl fmt::Display for ConnectorEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One delivered event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    /// Event kind.
    pub event: ConnectorEvent,
    /// Node receiving the event.
    pub node: NodeId,
    /// Plug involved, if any.
    pub plug: Option<PlugId>,
    /// Socket involved, if any.
    pub socket: Option<SocketId>,
}

impl Notification {
    /// Event for a whole node.
    pub fn node(event: ConnectorEvent, node: NodeId) -> Self {
        Self {
            event,
            node,
            plug: None,
            socket: None,
        }
    }

    /// Event for a connection.
    pub fn edge(event: ConnectorEvent, node: NodeId, plug: PlugId, socket: SocketId) -> Self {
        Self {
            event,
            node,
            plug: Some(plug),
            socket: Some(socket),
        }
    }
}

/// Id of a registered observer callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(pub(crate) u64);

pub(crate) type Callback = Box<dyn FnMut(&Notification) + Send>;

impl Engine {
    /// Registers a callback for every notification.
    ///
    /// Callbacks only see ids; they never keep nodes alive.
    pub fn observe(&mut self, callback: impl FnMut(&Notification) + Send + 'static) -> ObserverId {
        self.next_observer += 1;
        let id = ObserverId(self.next_observer);
        self.observers.push((id, Box::new(callback)));
        id
    }

    /// Removes a callback. Returns `false` if it was not registered.
    pub fn unobserve(&mut self, id: ObserverId) -> bool {
        let before = self.observers.len();
        self.observers.retain(|(o, _)| *o != id);
        self.observers.len() != before
    }

    /// Delivers one notification to the observers.
    pub(crate) fn notify(&mut self, note: Notification) {
        if self.config.signals {
            debug!(event = note.event.name(), node = %note.node, "signal");
        } else {
            trace!(event = note.event.name(), node = %note.node, "signal");
        }
        for (_, callback) in &mut self.observers {
            callback(&note);
        }
    }

    /// Forwards `event` from `origin` to every node downstream of it.
    ///
    /// Each reached plug's node is notified once per edge and, for
    /// invalidating events, loses its resolved context. Returns the number
    /// of edges signalled.
    pub fn signal_downstream(&mut self, origin: NodeId, event: ConnectorEvent) -> usize {
        let Ok(graph) = self.build_adjacency(origin, Direction::Output, None) else {
            return 0;
        };
        for edge in graph.edges() {
            if event.invalidates() {
                if let Some(node) = self.nodes.get_mut(edge.downstream) {
                    node.invalidate();
                }
            }
            self.notify(Notification::edge(event, edge.downstream, edge.plug, edge.socket));
        }
        graph.edges().len()
    }
}
