//! Adjacency discovery.
//!
//! [`Engine::build_adjacency`] walks the wiring from a start node and returns
//! a [`Graph`] snapshot: the reached nodes and the connections between them.
//! The walk keeps a visited set, so every node appears once no matter how
//! often fan-out or accidental cycles lead back to it.

use std::collections::HashSet;
use std::fmt::Write;

use cmg_core::{Pattern, Result};

use crate::engine::Engine;
use crate::node::{NodeId, PlugId, SocketId};

/// Which way the walk goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    /// Upstream and downstream.
    #[default]
    Both,
    /// Upstream only, through plugs.
    Input,
    /// Downstream only, through socket fan-out.
    Output,
}

impl Direction {
    fn input(self) -> bool {
        matches!(self, Self::Both | Self::Input)
    }

    fn output(self) -> bool {
        matches!(self, Self::Both | Self::Output)
    }
}

/// One connection: `upstream.socket -> downstream.plug`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Edge {
    /// Node owning the socket.
    pub upstream: NodeId,
    /// Providing socket.
    pub socket: SocketId,
    /// Node owning the plug.
    pub downstream: NodeId,
    /// Requesting plug.
    pub plug: PlugId,
}

/// Snapshot of nodes and connections reachable from a start node.
#[derive(Debug, Clone)]
pub struct Graph {
    start: NodeId,
    direction: Direction,
    pattern: Option<String>,
    nodes: Vec<NodeId>,
    edges: Vec<Edge>,
}

impl Graph {
    /// Node the walk started from.
    #[inline]
    pub fn start(&self) -> NodeId {
        self.start
    }

    /// Walk direction.
    #[inline]
    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Node pattern the walk was restricted to.
    #[inline]
    pub fn pattern(&self) -> Option<&str> {
        self.pattern.as_deref()
    }

    /// Reached nodes in visiting order, the start node first.
    #[inline]
    pub fn nodes(&self) -> &[NodeId] {
        &self.nodes
    }

    /// Connections in discovery order.
    #[inline]
    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    /// Returns `true` if `node` was reached.
    pub fn contains(&self, node: NodeId) -> bool {
        self.nodes.contains(&node)
    }

    /// Graphviz rendering, labelled with node relations and connector nicks.
    pub fn to_dot(&self, engine: &Engine) -> String {
        let mut out = String::from("digraph cmg {\n  rankdir=LR;\n");
        for &id in &self.nodes {
            let label = match engine.node(id) {
                Ok(n) => format!("{}\\n{}", n.relation(), n.registration()),
                Err(_) => "released".to_string(),
            };
            let _ = writeln!(out, "  n{} [label=\"{}\"];", id.index(), label.replace('"', "'"));
        }
        for e in &self.edges {
            let socket = engine.socket(e.socket).map(|s| s.nick().to_string()).unwrap_or_default();
            let plug = engine.plug(e.plug).map(|p| p.nick().to_string()).unwrap_or_default();
            let _ = writeln!(
                out,
                "  n{} -> n{} [label=\"{} -> {}\"];",
                e.upstream.index(),
                e.downstream.index(),
                socket,
                plug
            );
        }
        out.push_str("}\n");
        out
    }
}

struct Walk<'e> {
    engine: &'e Engine,
    direction: Direction,
    pattern: Option<Pattern>,
    visited: HashSet<NodeId>,
    seen_edges: HashSet<PlugId>,
    nodes: Vec<NodeId>,
    edges: Vec<Edge>,
}

impl Walk<'_> {
    fn admits(&self, node: NodeId) -> bool {
        match (&self.pattern, self.engine.nodes.get(node)) {
            (None, Some(_)) => true,
            (Some(p), Some(n)) => p.is_match(n.registration(), None),
            (_, None) => false,
        }
    }

    fn visit(&mut self, id: NodeId) {
        if !self.visited.insert(id) {
            return;
        }
        self.nodes.push(id);
        let engine = self.engine;
        let Some(node) = engine.nodes.get(id) else {
            return;
        };

        if self.direction.input() {
            for &plug in &node.plugs {
                let Some(socket) = engine.plugs.get(plug).and_then(|p| p.remote) else {
                    continue;
                };
                let Some(upstream) = engine.sockets.get(socket).map(|s| s.node) else {
                    continue;
                };
                self.step(Edge { upstream, socket, downstream: id, plug }, upstream);
            }
        }

        if self.direction.output() {
            for &socket in &node.sockets {
                let Some(s) = engine.sockets.get(socket) else {
                    continue;
                };
                for &plug in &s.requesting {
                    let Some(downstream) = engine.plugs.get(plug).map(|p| p.node) else {
                        continue;
                    };
                    self.step(Edge { upstream: id, socket, downstream, plug }, downstream);
                }
            }
        }
    }

    fn step(&mut self, edge: Edge, next: NodeId) {
        if !self.admits(next) {
            return;
        }
        if self.seen_edges.insert(edge.plug) {
            self.edges.push(edge);
        }
        self.visit(next);
    }
}

impl Engine {
    /// Collects the nodes and connections reachable from `start`.
    ///
    /// With a `pattern`, only nodes whose registration matches it are entered
    /// (the start node is always included), which yields the connected
    /// sub-graph of matching nodes.
    pub fn build_adjacency(&self, start: NodeId, direction: Direction, pattern: Option<&str>) -> Result<Graph> {
        self.node(start)?;
        let parsed = pattern.map(Pattern::parse).transpose()?;
        let mut walk = Walk {
            engine: self,
            direction,
            pattern: parsed,
            visited: HashSet::new(),
            seen_edges: HashSet::new(),
            nodes: Vec::new(),
            edges: Vec::new(),
        };
        walk.visit(start);
        Ok(Graph {
            start,
            direction,
            pattern: pattern.map(str::to_string),
            nodes: walk.nodes,
            edges: walk.edges,
        })
    }
}
