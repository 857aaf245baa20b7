//! The graph engine.
//!
//! [`Engine`] owns every node, plug and socket of an application and shares
//! the module [`Registry`] and the [`ContextCache`] with other engines if
//! wanted. It replaces process-wide state: create one at start-up, pass it
//! around, drop it to tear everything down.

use std::fmt;
use std::sync::Arc;

use cmg_core::{ApiKind, Arena, Error, ObjectId, Options, Registration, RegistrationField, Result};
use cmg_module::{ModuleRef, Registry, builtin};
use tracing::{debug, warn};

use crate::cache::ContextCache;
use crate::config::{EngineConfig, PolicySource};
use crate::node::{ContextState, Node, NodeId, Plug, PlugId, Socket, SocketId};
use crate::signal::{Callback, ObserverId};

/// Option key selecting the context module of a node.
pub const CONTEXT_OPTION: &str = "////context";

/// Option key selecting the execution module of a node.
pub const RENDERER_OPTION: &str = "////renderer";

/// Owner of a graph and the services it runs on.
pub struct Engine {
    pub(crate) registry: Arc<Registry>,
    pub(crate) cache: Arc<ContextCache>,
    pub(crate) config: EngineConfig,
    pub(crate) policy: Box<dyn PolicySource>,
    pub(crate) nodes: Arena<Node>,
    pub(crate) plugs: Arena<Plug>,
    pub(crate) sockets: Arena<Socket>,
    pub(crate) observers: Vec<(ObserverId, Callback)>,
    pub(crate) next_observer: u64,
    pub(crate) running: Vec<NodeId>,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("nodes", &self.nodes.len())
            .field("plugs", &self.plugs.len())
            .field("sockets", &self.sockets.len())
            .field("registry", &self.registry)
            .field("cache", &self.cache)
            .finish()
    }
}

impl Engine {
    /// Creates an engine with an empty registry and default settings.
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    /// Creates an engine with an empty registry for `config.host_api`.
    pub fn with_config(config: EngineConfig) -> Self {
        let registry = Arc::new(Registry::with_host_api(config.host_api));
        Self::with_shared(registry, Arc::new(ContextCache::new()), config)
    }

    /// Creates an engine on an existing registry and cache.
    pub fn with_shared(registry: Arc<Registry>, cache: Arc<ContextCache>, config: EngineConfig) -> Self {
        let policy = Box::new(config.policy.clone());
        Self {
            registry,
            cache,
            config,
            policy,
            nodes: Arena::new(),
            plugs: Arena::new(),
            sockets: Arena::new(),
            observers: Vec::new(),
            next_observer: 0,
            running: Vec::new(),
        }
    }

    /// Creates an engine with the built-in modules registered.
    pub fn with_builtin() -> Result<Self> {
        let engine = Self::new();
        builtin::register_all(&engine.registry)?;
        Ok(engine)
    }

    /// Module registry.
    #[inline]
    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Context cache.
    #[inline]
    pub fn cache(&self) -> &Arc<ContextCache> {
        &self.cache
    }

    /// Settings.
    #[inline]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Replaces the policy source, e.g. with an application settings store.
    pub fn set_policy(&mut self, policy: impl PolicySource + 'static) {
        self.policy = Box::new(policy);
    }

    /// Node by id.
    pub fn node(&self, id: NodeId) -> Result<&Node> {
        self.nodes.get(id).ok_or_else(|| Error::stale("node", id.index()))
    }

    /// Plug by id.
    pub fn plug(&self, id: PlugId) -> Result<&Plug> {
        self.plugs.get(id).ok_or_else(|| Error::stale("plug", id.index()))
    }

    /// Socket by id.
    pub fn socket(&self, id: SocketId) -> Result<&Socket> {
        self.sockets.get(id).ok_or_else(|| Error::stale("socket", id.index()))
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> Result<&mut Node> {
        self.nodes.get_mut(id).ok_or_else(|| Error::stale("node", id.index()))
    }

    /// Returns `true` while `id` refers to a live node.
    #[inline]
    pub fn contains_node(&self, id: NodeId) -> bool {
        self.nodes.contains(id)
    }

    /// Ids of all live nodes.
    pub fn node_ids(&self) -> Vec<NodeId> {
        self.nodes.keys().collect()
    }

    /// Number of live nodes.
    #[inline]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Plug `index` of `node`.
    pub fn plug_at(&self, node: NodeId, index: usize) -> Result<PlugId> {
        let n = self.node(node)?;
        n.plugs.get(index).copied().ok_or_else(|| Error::ConnectorOutOfRange {
            registration: n.registration.to_string(),
            side: "plug",
            index,
            count: n.plugs.len(),
        })
    }

    /// Socket `index` of `node`.
    pub fn socket_at(&self, node: NodeId, index: usize) -> Result<SocketId> {
        let n = self.node(node)?;
        n.sockets.get(index).copied().ok_or_else(|| Error::ConnectorOutOfRange {
            registration: n.registration.to_string(),
            side: "socket",
            index,
            count: n.sockets.len(),
        })
    }

    /// Creates a node for `registration`.
    ///
    /// Binds the best context module and the best renderer. Either may be
    /// missing, not both. Connector slots are taken from the renderer's
    /// descriptor, or the context module's if there is no renderer.
    pub fn create_node(&mut self, registration: &str, options: Options) -> Result<NodeId> {
        let registration = Registration::parse(registration)?;
        let context = self.select_module(&registration, &options, ApiKind::Context)?;
        let renderer = self.select_module(&registration, &options, ApiKind::Renderer)?;

        let Some(layout) = renderer.as_ref().or(context.as_ref()) else {
            return Err(Error::module_not_found(registration.as_str(), "context or renderer"));
        };
        let desc = layout.descriptor();
        let plug_specs: Vec<_> = (0..desc.plug_count()).filter_map(|i| desc.plug_spec(i).cloned()).collect();
        let mut socket_specs = Vec::new();
        for i in 0..desc.socket_count() {
            if let Some(spec) = desc.socket_spec(i) {
                socket_specs.push((spec.nick.clone(), Registration::parse(&spec.connector_type)?));
            }
        }

        let id = ObjectId::next();
        let relation = format!(
            "{}: {}/{}",
            id.get(),
            registration.field(RegistrationField::Domain).unwrap_or_default(),
            registration.field(RegistrationField::Type).unwrap_or_default()
        );
        debug!(
            node = %relation,
            registration = registration.as_str(),
            context = context.as_ref().map(|m| m.registration().as_str()),
            renderer = renderer.as_ref().map(|m| m.registration().as_str()),
            "node created"
        );

        let key = self.nodes.insert(Node {
            id,
            registration,
            context,
            renderer,
            options,
            plugs: Vec::new(),
            sockets: Vec::new(),
            relation,
            state: ContextState::NoContext,
            backend_data: None,
        });

        let plugs: Vec<PlugId> = plug_specs
            .into_iter()
            .enumerate()
            .map(|(index, spec)| {
                self.plugs.insert(Plug {
                    id: ObjectId::next(),
                    node: key,
                    index,
                    nick: spec.nick,
                    pattern: spec.connector_type,
                    remote: None,
                })
            })
            .collect();
        let sockets: Vec<SocketId> = socket_specs
            .into_iter()
            .enumerate()
            .map(|(index, (nick, connector_type))| {
                self.sockets.insert(Socket {
                    id: ObjectId::next(),
                    node: key,
                    index,
                    nick,
                    connector_type,
                    requesting: Vec::new(),
                    data: None,
                })
            })
            .collect();

        let node = self.node_mut(key)?;
        node.plugs = plugs;
        node.sockets = sockets;
        Ok(key)
    }

    /// Picks the module of `kind` for a node.
    ///
    /// Order: the node's selection option, the policy for its class, then the
    /// registry's best match for the registration itself.
    pub(crate) fn select_module(
        &self,
        registration: &Registration,
        options: &Options,
        kind: ApiKind,
    ) -> Result<Option<ModuleRef>> {
        let key = selection_option(kind);
        if let Some(pattern) = options.get_text(key) {
            if let Some(module) = self.registry.find_best(pattern, kind) {
                return Ok(Some(module));
            }
            if options.is_locked(key) {
                return Err(Error::EditLocked {
                    registration: registration.to_string(),
                    option: key.to_string(),
                    pattern: pattern.to_string(),
                });
            }
            warn!(registration = registration.as_str(), option = key, pattern, "selected module unavailable");
        }

        let policy_key = format!("{}/{}", registration.class(), kind.name());
        if let Some(pattern) = self.policy.lookup(&policy_key) {
            if let Some(module) = self.registry.find_best(&pattern, kind) {
                return Ok(Some(module));
            }
            warn!(key = policy_key.as_str(), pattern = pattern.as_str(), "policy module unavailable");
        }

        Ok(self.registry.find_best(registration.as_str(), kind))
    }
}

/// Option key that selects a module of `kind`.
pub(crate) fn selection_option(kind: ApiKind) -> &'static str {
    match kind {
        ApiKind::Renderer => RENDERER_OPTION,
        _ => CONTEXT_OPTION,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Scope, ScopedPolicy};

    #[test]
    fn relation_names_domain_and_type() {
        let mut e = Engine::with_builtin().unwrap();
        let n = e.create_node("//color/curve/lut", Options::new()).unwrap();
        let node = e.node(n).unwrap();
        assert_eq!(node.relation(), format!("{}: color/curve", node.object_id().get()));
    }

    #[test]
    fn policy_is_keyed_by_class_and_api() {
        let mut e = Engine::with_builtin().unwrap();
        let mut policy = ScopedPolicy::default();
        policy.set(Scope::System, "//color/curve/context", "//color/curve/basic");
        e.set_policy(policy);

        let n = e.create_node("//color/curve/lut", Options::new()).unwrap();
        let node = e.node(n).unwrap();
        assert_eq!(node.context_registration().as_str(), "//color/curve/basic");
        let renderer = node.renderer().map(|m| m.registration().as_str());
        assert_eq!(renderer, Some("//color/curve/lut"));
    }

    #[test]
    fn deeper_registration_needs_a_deep_enough_module() {
        let mut e = Engine::with_builtin().unwrap();
        let err = e.create_node("//color/curve/lut.exotic", Options::new()).unwrap_err();
        assert!(err.is_lookup_error());
    }
}
