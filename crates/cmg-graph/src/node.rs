//! Graph entities.
//!
//! Nodes, plugs and sockets live in generation-checked arenas inside the
//! [`Engine`](crate::Engine). A node owns its plug and socket slots; the
//! cross references between them (plug to remote socket, socket to
//! requesting plugs, connector to owning node) are plain ids that are
//! checked on every dereference.

use cmg_core::{Artifact, Batch, Key, ObjectId, Options, Registration};
use cmg_module::{ModuleRef, NodeView};

use crate::cache::Fingerprint;

/// Node id.
pub type NodeId = Key<Node>;

/// Plug id.
pub type PlugId = Key<Plug>;

/// Socket id.
pub type SocketId = Key<Socket>;

/// Which connector array of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    /// Inputs.
    Plug,
    /// Outputs.
    Socket,
}

impl Side {
    /// `"plug"` or `"socket"`.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Plug => "plug",
            Self::Socket => "socket",
        }
    }
}

/// Connection filter for connector queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EdgeFilter {
    /// Every connector.
    #[default]
    All,
    /// Connectors without a connection.
    Free,
    /// Connectors with at least one connection.
    Connected,
}

impl EdgeFilter {
    pub(crate) fn admits(self, connected: bool) -> bool {
        match self {
            Self::All => true,
            Self::Free => !connected,
            Self::Connected => connected,
        }
    }
}

/// Context lifecycle of a node.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ContextState {
    /// Never resolved.
    #[default]
    NoContext,
    /// Resolution in progress.
    Resolving,
    /// Resolved; `backend_data` holds the artifact cached under this key.
    Cached(Fingerprint),
    /// Options, modules or upstream wiring changed since the last resolve.
    Invalidated,
}

/// A processing unit bound to modules.
#[derive(Debug)]
pub struct Node {
    pub(crate) id: ObjectId,
    pub(crate) registration: Registration,
    pub(crate) context: Option<ModuleRef>,
    pub(crate) renderer: Option<ModuleRef>,
    pub(crate) options: Options,
    pub(crate) plugs: Vec<PlugId>,
    pub(crate) sockets: Vec<SocketId>,
    pub(crate) relation: String,
    pub(crate) state: ContextState,
    pub(crate) backend_data: Option<Artifact>,
}

impl Node {
    /// Object id.
    #[inline]
    pub fn object_id(&self) -> ObjectId {
        self.id
    }

    /// Registration the node was created with.
    #[inline]
    pub fn registration(&self) -> &Registration {
        &self.registration
    }

    /// Context producing module, if any.
    #[inline]
    pub fn context_module(&self) -> Option<&ModuleRef> {
        self.context.as_ref()
    }

    /// Execution module, if any.
    #[inline]
    pub fn renderer(&self) -> Option<&ModuleRef> {
        self.renderer.as_ref()
    }

    /// Current options.
    #[inline]
    pub fn options(&self) -> &Options {
        &self.options
    }

    /// Input plugs in slot order.
    #[inline]
    pub fn plugs(&self) -> &[PlugId] {
        &self.plugs
    }

    /// Output sockets in slot order.
    #[inline]
    pub fn sockets(&self) -> &[SocketId] {
        &self.sockets
    }

    /// Position of the node in its pipeline, `"<id>: <domain>/<type>"`.
    #[inline]
    pub fn relation(&self) -> &str {
        &self.relation
    }

    /// Context lifecycle state.
    #[inline]
    pub fn state(&self) -> &ContextState {
        &self.state
    }

    /// Resolved context, if still valid.
    #[inline]
    pub fn backend_data(&self) -> Option<&Artifact> {
        self.backend_data.as_ref()
    }

    /// Registration of the bound context module, else the node's own.
    pub fn context_registration(&self) -> &Registration {
        self.context
            .as_ref()
            .map(|m| m.registration())
            .unwrap_or(&self.registration)
    }

    /// View handed to module hooks.
    pub fn view(&self) -> NodeView<'_> {
        NodeView {
            id: self.id,
            registration: self.context_registration(),
            options: &self.options,
            relation: &self.relation,
        }
    }

    /// Registration and options on one line, for diagnostics.
    pub fn nick(&self) -> String {
        let options = self.options.to_text().replace('\n', " ");
        format!("{} {}", self.registration, options.trim_end())
    }

    /// Drops the resolved context.
    pub(crate) fn invalidate(&mut self) {
        self.backend_data = None;
        if self.state != ContextState::Resolving {
            self.state = ContextState::Invalidated;
        }
    }

    pub(crate) fn connectors(&self, side: Side) -> usize {
        match side {
            Side::Plug => self.plugs.len(),
            Side::Socket => self.sockets.len(),
        }
    }
}

/// An input slot. Refers to at most one remote socket.
#[derive(Debug)]
pub struct Plug {
    pub(crate) id: ObjectId,
    pub(crate) node: NodeId,
    pub(crate) index: usize,
    pub(crate) nick: String,
    pub(crate) pattern: String,
    pub(crate) remote: Option<SocketId>,
}

impl Plug {
    /// Object id.
    #[inline]
    pub fn object_id(&self) -> ObjectId {
        self.id
    }

    /// Owning node.
    #[inline]
    pub fn node(&self) -> NodeId {
        self.node
    }

    /// Slot position on the owning node.
    #[inline]
    pub fn index(&self) -> usize {
        self.index
    }

    /// Connector nick.
    #[inline]
    pub fn nick(&self) -> &str {
        &self.nick
    }

    /// Pattern a socket's connector type must match.
    #[inline]
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Connected socket.
    #[inline]
    pub fn remote(&self) -> Option<SocketId> {
        self.remote
    }
}

/// An output slot. Fans out to any number of plugs.
#[derive(Debug)]
pub struct Socket {
    pub(crate) id: ObjectId,
    pub(crate) node: NodeId,
    pub(crate) index: usize,
    pub(crate) nick: String,
    pub(crate) connector_type: Registration,
    pub(crate) requesting: Vec<PlugId>,
    pub(crate) data: Option<Batch>,
}

impl Socket {
    /// Object id.
    #[inline]
    pub fn object_id(&self) -> ObjectId {
        self.id
    }

    /// Owning node.
    #[inline]
    pub fn node(&self) -> NodeId {
        self.node
    }

    /// Slot position on the owning node.
    #[inline]
    pub fn index(&self) -> usize {
        self.index
    }

    /// Connector nick.
    #[inline]
    pub fn nick(&self) -> &str {
        &self.nick
    }

    /// Connector type provided to plugs.
    #[inline]
    pub fn connector_type(&self) -> &Registration {
        &self.connector_type
    }

    /// Plugs reading from this socket, in connection order.
    #[inline]
    pub fn requesting(&self) -> &[PlugId] {
        &self.requesting
    }

    /// Data stored on the socket.
    #[inline]
    pub fn data(&self) -> Option<&Batch> {
        self.data.as_ref()
    }
}
