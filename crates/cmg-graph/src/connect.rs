//! Wiring, option edits and node release.

use cmg_core::{Batch, Error, Pattern, Result, Value};
use tracing::{debug, trace};

use crate::engine::Engine;
use crate::node::{EdgeFilter, NodeId, PlugId, Side, SocketId};
use crate::signal::{ConnectorEvent, Notification};

impl Engine {
    /// Connects `plug` to `socket`.
    ///
    /// The socket's connector type must match the plug's pattern. A plug
    /// already connected elsewhere is disconnected first. Both nodes receive
    /// [`ConnectorEvent::Connected`]; the plug's node and everything downstream
    /// of it lose their contexts.
    pub fn connect(&mut self, plug: PlugId, socket: SocketId) -> Result<()> {
        let p = self.plug(plug)?;
        let s = self.socket(socket)?;
        let (plug_node, socket_node) = (p.node, s.node);

        let pattern = Pattern::parse(&p.pattern)?;
        if !pattern.is_match(&s.connector_type, None) {
            let err = Error::ConnectorMismatch {
                plug: p.pattern.clone(),
                socket: s.connector_type.to_string(),
            };
            self.notify(Notification::edge(ConnectorEvent::IncompatibleData, plug_node, plug, socket));
            return Err(err);
        }
        if p.remote == Some(socket) {
            return Ok(());
        }
        if p.remote.is_some() {
            self.disconnect(plug)?;
        }

        if let Some(p) = self.plugs.get_mut(plug) {
            p.remote = Some(socket);
        }
        if let Some(s) = self.sockets.get_mut(socket) {
            s.requesting.push(plug);
        }
        debug!(plug = %plug, socket = %socket, "connected");

        if let Some(n) = self.nodes.get_mut(plug_node) {
            n.invalidate();
        }
        self.notify(Notification::edge(ConnectorEvent::Connected, socket_node, plug, socket));
        self.notify(Notification::edge(ConnectorEvent::Connected, plug_node, plug, socket));
        self.signal_downstream(plug_node, ConnectorEvent::DataChanged);
        Ok(())
    }

    /// Disconnects `plug`. Returns `false` if it was not connected.
    ///
    /// Both sides receive [`ConnectorEvent::Released`]; the plug's node and
    /// everything downstream of it lose their contexts.
    pub fn disconnect(&mut self, plug: PlugId) -> Result<bool> {
        let p = self.plugs.get_mut(plug).ok_or_else(|| Error::stale("plug", plug.index()))?;
        let Some(socket) = p.remote.take() else {
            return Ok(false);
        };
        let plug_node = p.node;

        let socket_node = match self.sockets.get_mut(socket) {
            Some(s) => {
                s.requesting.retain(|&r| r != plug);
                Some(s.node)
            }
            None => None,
        };
        debug!(plug = %plug, socket = %socket, "disconnected");

        if let Some(n) = self.nodes.get_mut(plug_node) {
            n.invalidate();
        }
        if let Some(socket_node) = socket_node {
            self.notify(Notification::edge(ConnectorEvent::Released, socket_node, plug, socket));
        }
        self.notify(Notification::edge(ConnectorEvent::Released, plug_node, plug, socket));
        self.signal_downstream(plug_node, ConnectorEvent::DataChanged);
        Ok(true)
    }

    /// Releases a node with all its connectors.
    ///
    /// Plugs are disconnected first, so remote sockets forget them. Then every
    /// plug still reading from one of the node's sockets is told the socket is
    /// going away and unlinked. The module bindings and the resolved context
    /// go last.
    pub fn release_node(&mut self, node: NodeId) -> Result<()> {
        let (plugs, sockets) = {
            let n = self.node(node)?;
            (n.plugs.clone(), n.sockets.clone())
        };

        for plug in plugs {
            self.disconnect(plug)?;
            self.plugs.remove(plug);
        }

        for socket in sockets {
            let Some(s) = self.sockets.get_mut(socket) else {
                continue;
            };
            let readers = std::mem::take(&mut s.requesting);
            for plug in readers {
                let Some(p) = self.plugs.get_mut(plug) else {
                    continue;
                };
                p.remote = None;
                let reader = p.node;
                if let Some(n) = self.nodes.get_mut(reader) {
                    n.invalidate();
                }
                self.notify(Notification::edge(ConnectorEvent::Released, reader, plug, socket));
                self.signal_downstream(reader, ConnectorEvent::DataChanged);
            }
            self.sockets.remove(socket);
        }

        if let Some(n) = self.nodes.remove(node) {
            debug!(node = n.relation.as_str(), "node released");
            drop(n.backend_data);
            drop(n.context);
            drop(n.renderer);
        }
        self.notify(Notification::node(ConnectorEvent::Released, node));
        Ok(())
    }

    /// Sets one option. Returns `true` if it changed.
    ///
    /// A change drops the node's context and signals
    /// [`ConnectorEvent::DataChanged`] downstream.
    pub fn set_option(&mut self, node: NodeId, key: &str, value: impl Into<Value>) -> Result<bool> {
        let changed = self.node_mut(node)?.options.set(key, value);
        if changed {
            self.options_changed(node)?;
        }
        Ok(changed)
    }

    /// Sets and locks one option, as a user edit would.
    pub fn set_option_locked(&mut self, node: NodeId, key: &str, value: impl Into<Value>) -> Result<bool> {
        let n = self.node_mut(node)?;
        let was_locked = n.options.is_locked(key);
        let changed = n.options.set_locked(key, value) || !was_locked;
        if changed {
            self.options_changed(node)?;
        }
        Ok(changed)
    }

    /// Removes one option. Returns `true` if it existed.
    pub fn remove_option(&mut self, node: NodeId, key: &str) -> Result<bool> {
        let removed = self.node_mut(node)?.options.remove(key).is_some();
        if removed {
            self.options_changed(node)?;
        }
        Ok(removed)
    }

    /// Replaces all options.
    pub fn set_options(&mut self, node: NodeId, options: cmg_core::Options) -> Result<bool> {
        let n = self.node_mut(node)?;
        if n.options == options {
            return Ok(false);
        }
        n.options = options;
        self.options_changed(node)?;
        Ok(true)
    }

    fn options_changed(&mut self, node: NodeId) -> Result<()> {
        let n = self.node_mut(node)?;
        n.invalidate();
        trace!(node = n.relation.as_str(), "options changed");
        self.notify(Notification::node(ConnectorEvent::DataChanged, node));
        self.signal_downstream(node, ConnectorEvent::DataChanged);
        Ok(())
    }

    /// Stores data on a socket, e.g. the pixels of a source node.
    pub fn set_socket_data(&mut self, socket: SocketId, data: Option<Batch>) -> Result<()> {
        let s = self
            .sockets
            .get_mut(socket)
            .ok_or_else(|| Error::stale("socket", socket.index()))?;
        s.data = data;
        let node = s.node;
        self.notify(Notification::node(ConnectorEvent::StorageChanged, node));
        self.signal_downstream(node, ConnectorEvent::DataChanged);
        Ok(())
    }

    /// Number of connectors on `side` that pass `filter`.
    pub fn edge_count(&self, node: NodeId, side: Side, filter: EdgeFilter) -> Result<usize> {
        let n = self.node(node)?;
        let count = match side {
            Side::Plug => n
                .plugs
                .iter()
                .filter(|&&p| filter.admits(self.plugs.get(p).is_some_and(|p| p.remote.is_some())))
                .count(),
            Side::Socket => n
                .sockets
                .iter()
                .filter(|&&s| filter.admits(self.sockets.get(s).is_some_and(|s| !s.requesting.is_empty())))
                .count(),
        };
        Ok(count)
    }

    /// Position of the `nth` connector on `side` whose nick equals `pattern`
    /// or whose connector type matches it, among those passing `filter`.
    pub fn connector_pos(
        &self,
        node: NodeId,
        side: Side,
        pattern: &str,
        nth: usize,
        filter: EdgeFilter,
    ) -> Result<Option<usize>> {
        let n = self.node(node)?;
        let parsed = Pattern::parse(pattern).ok();
        let mut found = 0;
        for index in 0..n.connectors(side) {
            let (nick, type_match, connected) = match side {
                Side::Plug => {
                    let Some(p) = n.plugs.get(index).and_then(|&k| self.plugs.get(k)) else {
                        continue;
                    };
                    // a plug pattern is compared to the search pattern as text
                    (p.nick.as_str(), p.pattern == pattern, p.remote.is_some())
                }
                Side::Socket => {
                    let Some(s) = n.sockets.get(index).and_then(|&k| self.sockets.get(k)) else {
                        continue;
                    };
                    let type_match = parsed.as_ref().is_some_and(|pt| pt.is_match(&s.connector_type, None));
                    (s.nick.as_str(), type_match, !s.requesting.is_empty())
                }
            };
            if (nick == pattern || type_match) && filter.admits(connected) {
                if found == nth {
                    return Ok(Some(index));
                }
                found += 1;
            }
        }
        Ok(None)
    }

    /// Connects a socket of `upstream` to a free plug of `downstream`, both
    /// found by nick or connector type.
    pub fn connect_nodes(
        &mut self,
        upstream: NodeId,
        socket: &str,
        downstream: NodeId,
        plug: &str,
    ) -> Result<(PlugId, SocketId)> {
        let Some(socket_pos) = self.connector_pos(upstream, Side::Socket, socket, 0, EdgeFilter::All)? else {
            return Err(Error::ConnectorNotFound {
                registration: self.node(upstream)?.registration.to_string(),
                side: Side::Socket.name(),
                pattern: socket.to_string(),
            });
        };
        let Some(plug_pos) = self.connector_pos(downstream, Side::Plug, plug, 0, EdgeFilter::Free)? else {
            return Err(Error::ConnectorNotFound {
                registration: self.node(downstream)?.registration.to_string(),
                side: Side::Plug.name(),
                pattern: plug.to_string(),
            });
        };
        let socket_id = self.socket_at(upstream, socket_pos)?;
        let plug_id = self.plug_at(downstream, plug_pos)?;
        self.connect(plug_id, socket_id)?;
        Ok((plug_id, socket_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::ContextState;
    use cmg_core::Options;
    use std::sync::{Arc, Mutex};

    fn engine() -> Engine {
        Engine::with_builtin().unwrap()
    }

    fn chain(e: &mut Engine) -> (NodeId, NodeId, NodeId) {
        let src = e.create_node("//color/source/buffer", Options::new()).unwrap();
        let curve = e.create_node("//color/curve/lut", Options::new()).unwrap();
        let sink = e.create_node("//color/sink/display", Options::new()).unwrap();
        e.connect_nodes(src, "out", curve, "in").unwrap();
        e.connect_nodes(curve, "out", sink, "in").unwrap();
        (src, curve, sink)
    }

    #[test]
    fn connect_links_both_sides() {
        let mut e = engine();
        let (src, curve, _) = chain(&mut e);
        let socket = e.socket_at(src, 0).unwrap();
        let plug = e.plug_at(curve, 0).unwrap();
        assert_eq!(e.plug(plug).unwrap().remote(), Some(socket));
        assert_eq!(e.socket(socket).unwrap().requesting(), &[plug]);
        assert_eq!(e.edge_count(curve, Side::Plug, EdgeFilter::Connected).unwrap(), 1);
        assert_eq!(e.edge_count(curve, Side::Plug, EdgeFilter::Free).unwrap(), 0);
    }

    #[test]
    fn mismatch_leaves_graph_untouched() {
        let mut e = engine();
        let (src, curve, _) = chain(&mut e);
        let plug = e.plug_at(curve, 0).unwrap();
        if let Some(p) = e.plugs.get_mut(plug) {
            p.pattern = "//imaging/data".to_string();
        }
        let socket = e.socket_at(src, 0).unwrap();
        let other = e.create_node("//color/source/buffer", Options::new()).unwrap();
        let other_socket = e.socket_at(other, 0).unwrap();

        let err = e.connect(plug, other_socket).unwrap_err();
        assert!(err.is_incompatibility());
        assert_eq!(e.plug(plug).unwrap().remote(), Some(socket));
        assert!(e.socket(other_socket).unwrap().requesting().is_empty());
    }

    #[test]
    fn reconnect_moves_plug() {
        let mut e = engine();
        let (src, curve, _) = chain(&mut e);
        let old = e.socket_at(src, 0).unwrap();
        let other = e.create_node("//color/source/buffer", Options::new()).unwrap();
        let new = e.socket_at(other, 0).unwrap();
        let plug = e.plug_at(curve, 0).unwrap();

        e.connect(plug, new).unwrap();
        assert!(e.socket(old).unwrap().requesting().is_empty());
        assert_eq!(e.socket(new).unwrap().requesting(), &[plug]);
    }

    #[test]
    fn disconnect_notifies_both_sides() {
        let mut e = engine();
        let (src, curve, _) = chain(&mut e);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        e.observe(move |n| sink.lock().unwrap().push((n.event, n.node)));

        let plug = e.plug_at(curve, 0).unwrap();
        assert!(e.disconnect(plug).unwrap());
        assert!(!e.disconnect(plug).unwrap());

        let seen = seen.lock().unwrap();
        assert!(seen.contains(&(ConnectorEvent::Released, src)));
        assert!(seen.contains(&(ConnectorEvent::Released, curve)));
    }

    #[test]
    fn release_unlinks_neighbours() {
        let mut e = engine();
        let (src, curve, sink) = chain(&mut e);
        let src_socket = e.socket_at(src, 0).unwrap();
        let sink_plug = e.plug_at(sink, 0).unwrap();
        let curve_plug = e.plug_at(curve, 0).unwrap();

        e.release_node(curve).unwrap();

        assert!(e.socket(src_socket).unwrap().requesting().is_empty());
        assert_eq!(e.plug(sink_plug).unwrap().remote(), None);
        assert!(e.plug(curve_plug).unwrap_err().is_stale_handle());
        assert!(e.node(curve).unwrap_err().is_stale_handle());
        assert_eq!(e.node_count(), 2);
    }

    #[test]
    fn option_change_signals_downstream() {
        let mut e = engine();
        let (src, curve, sink) = chain(&mut e);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&seen);
        e.observe(move |n| log.lock().unwrap().push((n.event, n.node)));

        assert!(e.set_option(src, "gain", 2.0).unwrap());
        assert!(!e.set_option(src, "gain", 2.0).unwrap());

        let seen = seen.lock().unwrap();
        assert!(seen.contains(&(ConnectorEvent::DataChanged, curve)));
        assert!(seen.contains(&(ConnectorEvent::DataChanged, sink)));
        assert_eq!(e.node(sink).unwrap().state(), &ContextState::Invalidated);
    }

    #[test]
    fn connector_positions() {
        let mut e = engine();
        let (src, curve, _) = chain(&mut e);
        assert_eq!(e.connector_pos(curve, Side::Plug, "in", 0, EdgeFilter::All).unwrap(), Some(0));
        assert_eq!(e.connector_pos(curve, Side::Plug, "in", 0, EdgeFilter::Free).unwrap(), None);
        assert_eq!(e.connector_pos(src, Side::Socket, "//color/data", 0, EdgeFilter::All).unwrap(), Some(0));
        assert_eq!(e.connector_pos(src, Side::Socket, "out", 1, EdgeFilter::All).unwrap(), None);

        let err = e.connect_nodes(src, "missing", curve, "in").unwrap_err();
        assert!(err.is_lookup_error());
    }

    #[test]
    fn rewiring_invalidates_downstream() {
        let mut e = engine();
        let (src, curve, _) = chain(&mut e);
        let tail = e.create_node("//color/curve/lut", Options::new()).unwrap();
        e.connect_nodes(curve, "out", tail, "in").unwrap();
        e.resolve(tail).unwrap();
        assert!(e.node(tail).unwrap().backend_data().is_some());

        let plug = e.plug_at(curve, 0).unwrap();
        e.disconnect(plug).unwrap();
        assert_eq!(e.node(tail).unwrap().state(), &ContextState::Invalidated);
        assert!(e.node(tail).unwrap().backend_data().is_none());

        e.resolve(tail).unwrap();
        let socket = e.socket_at(src, 0).unwrap();
        e.connect(plug, socket).unwrap();
        assert!(e.node(tail).unwrap().backend_data().is_none());
    }

    #[test]
    fn release_invalidates_past_the_reader() {
        let mut e = engine();
        let (src, curve, sink) = chain(&mut e);
        let tail = e.create_node("//color/curve/lut", Options::new()).unwrap();
        e.connect_nodes(sink, "out", tail, "in").unwrap();
        e.resolve(tail).unwrap();

        e.release_node(curve).unwrap();
        assert_eq!(e.node(tail).unwrap().state(), &ContextState::Invalidated);
        assert!(e.node(src).is_ok());
    }
}
