//! Pull execution.
//!
//! Data is produced on demand: a [`Ticket`] is handed to a socket and the
//! socket's node runs its renderer, which pulls its own inputs and resolves
//! its own context as needed. Nothing is resolved before the first pull.

use cmg_core::{ApiKind, Artifact, Batch, Error, ObjectId, Options, Registration, Result, RunStatus, Ticket};
use cmg_module::{NodeView, Runtime};
use tracing::{debug, trace};

use crate::engine::Engine;
use crate::node::{NodeId, PlugId, SocketId};
use crate::signal::{ConnectorEvent, Notification};

/// [`Runtime`] handed to a renderer while its node runs.
struct RunContext<'e> {
    engine: &'e mut Engine,
    node: NodeId,
    socket: Option<SocketId>,
    id: ObjectId,
    registration: Registration,
    options: Options,
    relation: String,
    plugs: Vec<PlugId>,
}

impl Runtime for RunContext<'_> {
    fn node(&self) -> NodeView<'_> {
        NodeView {
            id: self.id,
            registration: &self.registration,
            options: &self.options,
            relation: &self.relation,
        }
    }

    fn resolve_context(&mut self) -> Result<Artifact> {
        self.engine.resolve(self.node)
    }

    fn input_count(&self) -> usize {
        self.plugs.len()
    }

    fn pull_input(&mut self, index: usize, ticket: &mut Ticket) -> Result<RunStatus> {
        let Some(&plug) = self.plugs.get(index) else {
            return Err(Error::ConnectorOutOfRange {
                registration: self.registration.to_string(),
                side: "plug",
                index,
                count: self.plugs.len(),
            });
        };
        self.engine.run(plug, ticket)
    }

    fn socket_data(&self) -> Option<Batch> {
        let socket = self.socket?;
        self.engine.sockets.get(socket).and_then(|s| s.data.clone())
    }
}

impl Engine {
    /// Requests data for `plug` from its remote socket.
    pub fn run(&mut self, plug: PlugId, ticket: &mut Ticket) -> Result<RunStatus> {
        let p = self.plug(plug)?;
        let Some(socket) = p.remote else {
            let (node, index) = (p.node, p.index);
            let registration = self.node(node)?.registration.to_string();
            self.notify(Notification::node(ConnectorEvent::IncompleteGraph, node));
            return Err(Error::NotConnected {
                registration,
                plug: index,
            });
        };
        self.pull(socket, ticket)
    }

    /// Runs the node owning `socket` for `ticket`.
    pub fn pull(&mut self, socket: SocketId, ticket: &mut Ticket) -> Result<RunStatus> {
        let node = self.socket(socket)?.node;
        self.run_node(node, Some(socket), ticket)
    }

    /// Runs `node` through its first socket, or without one if it has none.
    pub fn pull_node(&mut self, node: NodeId, ticket: &mut Ticket) -> Result<RunStatus> {
        let socket = self.node(node)?.sockets.first().copied();
        self.run_node(node, socket, ticket)
    }

    fn run_node(&mut self, node: NodeId, socket: Option<SocketId>, ticket: &mut Ticket) -> Result<RunStatus> {
        let n = self.node(node)?;
        let Some(renderer) = n.renderer.as_ref().and_then(|m| m.as_renderer()).cloned() else {
            return Err(Error::module_not_found(n.registration.as_str(), ApiKind::Renderer.name()));
        };
        if self.running.contains(&node) {
            return Err(Error::ResolutionCycle {
                registration: n.registration.to_string(),
            });
        }
        trace!(node = n.relation.as_str(), ticket = ticket.id().get(), "run");

        let mut ctx = RunContext {
            node,
            socket,
            id: n.id,
            registration: n.registration.clone(),
            options: n.options.clone(),
            relation: n.relation.clone(),
            plugs: n.plugs.clone(),
            engine: self,
        };
        ctx.engine.running.push(node);
        ticket.record(ctx.id);
        let result = renderer.run(&mut ctx, ticket);
        ctx.engine.running.retain(|&r| r != node);

        if let Err(err) = &result {
            debug!(node = ctx.relation.as_str(), error = %err, "run failed");
        }
        result
    }
}
