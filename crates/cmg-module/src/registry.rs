//! Thread-safe module registry.
//!
//! Modules are registered once and are immutable afterwards. Lookups return
//! shared [`ModuleRef`] handles, so a node keeps using its module even if it is
//! unregistered later.
//!
//! ```
//! use cmg_core::ApiKind;
//! use cmg_module::{builtin, Registry};
//!
//! let registry = Registry::new();
//! builtin::register_all(&registry).unwrap();
//!
//! let renderer = registry.find_best("//color/curve/lut", ApiKind::Renderer).unwrap();
//! assert_eq!(renderer.descriptor().name(), "Tone curve renderer");
//! ```

use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use cmg_core::{ApiKind, Compatibility, ContextType, Error, Handle, ObjectId, ObjectKind, Pattern, Registration, Result};
use tracing::{debug, trace, warn};

use crate::HOST_API;
use crate::api::{ContextConverter, ContextProducer, FallbackProvider, Renderer};
use crate::descriptor::Descriptor;

/// Registry id of a module.
pub type ModuleId = ObjectId;

/// Shared handle to a registered module.
pub type ModuleRef = Handle<ModuleApi>;

/// One registered capability.
#[derive(Clone)]
pub enum ModuleApi {
    /// Context producer.
    Context(Arc<dyn ContextProducer>),
    /// Renderer.
    Renderer(Arc<dyn Renderer>),
    /// Fallback provider.
    Fallback(Arc<dyn FallbackProvider>),
    /// Context type converter.
    Converter(Arc<dyn ContextConverter>),
}

impl ModuleApi {
    /// Capability kind.
    pub fn kind(&self) -> ApiKind {
        match self {
            Self::Context(_) => ApiKind::Context,
            Self::Renderer(_) => ApiKind::Renderer,
            Self::Fallback(_) => ApiKind::Fallback,
            Self::Converter(_) => ApiKind::Converter,
        }
    }

    /// Module metadata.
    pub fn descriptor(&self) -> &Descriptor {
        match self {
            Self::Context(m) => m.descriptor(),
            Self::Renderer(m) => m.descriptor(),
            Self::Fallback(m) => m.descriptor(),
            Self::Converter(m) => m.descriptor(),
        }
    }

    /// Shortcut for the descriptor registration.
    #[inline]
    pub fn registration(&self) -> &Registration {
        self.descriptor().registration()
    }

    /// Context producer, if this is one.
    pub fn as_context(&self) -> Option<&Arc<dyn ContextProducer>> {
        match self {
            Self::Context(m) => Some(m),
            _ => None,
        }
    }

    /// Renderer, if this is one.
    pub fn as_renderer(&self) -> Option<&Arc<dyn Renderer>> {
        match self {
            Self::Renderer(m) => Some(m),
            _ => None,
        }
    }

    /// Fallback provider, if this is one.
    pub fn as_fallback(&self) -> Option<&Arc<dyn FallbackProvider>> {
        match self {
            Self::Fallback(m) => Some(m),
            _ => None,
        }
    }

    /// Converter, if this is one.
    pub fn as_converter(&self) -> Option<&Arc<dyn ContextConverter>> {
        match self {
            Self::Converter(m) => Some(m),
            _ => None,
        }
    }
}

impl fmt::Debug for ModuleApi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let d = self.descriptor();
        f.debug_struct("ModuleApi")
            .field("kind", &self.kind())
            .field("registration", &d.registration().as_str())
            .field("version", &d.version())
            .finish()
    }
}

/// Thread-safe module registry.
pub struct Registry {
    host: cmg_core::Version,
    modules: RwLock<Vec<ModuleRef>>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("host", &self.host)
            .field("modules", &self.len())
            .finish()
    }
}

impl Registry {
    /// Creates an empty registry for [`HOST_API`].
    pub fn new() -> Self {
        Self::with_host_api(HOST_API)
    }

    /// Creates an empty registry for a specific host API version.
    pub fn with_host_api(host: cmg_core::Version) -> Self {
        Self {
            host,
            modules: RwLock::new(Vec::new()),
        }
    }

    /// Host API version modules are checked against.
    #[inline]
    pub fn host_api(&self) -> cmg_core::Version {
        self.host
    }

    /// Registers a capability.
    ///
    /// Modules built for another major API version are rejected. Modules
    /// built for a newer minor version are stored but skipped by lookups.
    pub fn register(&self, api: ModuleApi) -> Result<ModuleId> {
        let desc = api.descriptor();
        let required = desc.api_version();
        match required.compatibility(self.host) {
            Compatibility::MajorMismatch => {
                warn!(registration = desc.registration().as_str(), %required, host = %self.host, "module rejected");
                return Err(Error::IncompatibleModule {
                    registration: desc.registration().to_string(),
                    required,
                    host: self.host,
                });
            }
            Compatibility::Newer => {
                warn!(
                    registration = desc.registration().as_str(),
                    %required,
                    host = %self.host,
                    "module needs a newer host, it will not be selected"
                );
            }
            Compatibility::Exact | Compatibility::Older => {}
        }

        let name = desc.name().to_string();
        let kind = api.kind();
        let handle = Handle::with_name(ObjectKind::Module, name, api);
        let id = handle.id();
        debug!(
            registration = handle.registration().as_str(),
            kind = kind.name(),
            id = id.get(),
            "module registered"
        );
        self.write().push(handle);
        Ok(id)
    }

    /// Registers a context producer.
    pub fn register_context(&self, module: impl ContextProducer + 'static) -> Result<ModuleId> {
        self.register(ModuleApi::Context(Arc::new(module)))
    }

    /// Registers a renderer.
    pub fn register_renderer(&self, module: impl Renderer + 'static) -> Result<ModuleId> {
        self.register(ModuleApi::Renderer(Arc::new(module)))
    }

    /// Registers a fallback provider.
    pub fn register_fallback(&self, module: impl FallbackProvider + 'static) -> Result<ModuleId> {
        self.register(ModuleApi::Fallback(Arc::new(module)))
    }

    /// Registers a context converter.
    pub fn register_converter(&self, module: impl ContextConverter + 'static) -> Result<ModuleId> {
        self.register(ModuleApi::Converter(Arc::new(module)))
    }

    /// Removes a module. Handles already given out stay valid.
    pub fn unregister(&self, id: ModuleId) -> Option<ModuleRef> {
        let mut modules = self.write();
        let pos = modules.iter().position(|m| m.id() == id)?;
        Some(modules.remove(pos))
    }

    /// Module by id.
    pub fn get(&self, id: ModuleId) -> Option<ModuleRef> {
        self.read().iter().find(|m| m.id() == id).cloned()
    }

    /// Number of registered capabilities.
    pub fn len(&self) -> usize {
        self.read().len()
    }

    /// Returns `true` if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Snapshot of every registered capability in registration order.
    pub fn modules(&self) -> Vec<ModuleRef> {
        self.read().clone()
    }

    /// Best usable module of `kind` matching `pattern`.
    ///
    /// Absence is normal control flow, so this returns `None` rather than an
    /// error. A malformed pattern matches nothing.
    pub fn find_best(&self, pattern: &str, kind: ApiKind) -> Option<ModuleRef> {
        let pattern = Pattern::parse(pattern).ok()?;
        self.find_best_pattern(&pattern, kind)
    }

    /// [`Registry::find_best`] with a parsed pattern.
    pub fn find_best_pattern(&self, pattern: &Pattern, kind: ApiKind) -> Option<ModuleRef> {
        let found = self.ranked(pattern, kind).into_iter().next();
        trace!(
            pattern = pattern.as_str(),
            kind = kind.name(),
            found = found.as_ref().map(|m| m.registration().as_str()),
            "find_best"
        );
        found
    }

    /// Every usable module of `kind` matching `pattern`, best first.
    pub fn find_all(&self, pattern: &str, kind: ApiKind) -> Vec<ModuleRef> {
        match Pattern::parse(pattern) {
            Ok(p) => self.ranked(&p, kind),
            Err(_) => Vec::new(),
        }
    }

    /// Converter from `from` to `to`, the highest version first.
    pub fn converter(&self, from: &ContextType, to: &ContextType) -> Option<ModuleRef> {
        self.read()
            .iter()
            .filter(|m| self.is_usable(m))
            .filter(|m| match m.as_converter() {
                Some(c) => c.source_type() == from && c.descriptor().context_type() == to,
                None => false,
            })
            .max_by_key(|m| m.descriptor().version())
            .cloned()
    }

    /// Fallback providers whose registration pattern matches `registration`,
    /// in registration order.
    pub fn fallbacks(&self, registration: &Registration) -> Vec<ModuleRef> {
        self.read()
            .iter()
            .filter(|m| m.kind() == ApiKind::Fallback && self.is_usable(m))
            .filter(|m| match Pattern::parse(m.registration().as_str()) {
                Ok(p) => p.is_match(registration, Some(ApiKind::Fallback)),
                Err(_) => false,
            })
            .cloned()
            .collect()
    }

    fn ranked(&self, pattern: &Pattern, kind: ApiKind) -> Vec<ModuleRef> {
        let modules = self.read();
        let mut scored: Vec<(u32, usize, &ModuleRef)> = modules
            .iter()
            .enumerate()
            .filter(|(_, m)| m.kind() == kind && self.is_usable(m))
            .filter_map(|(order, m)| {
                let score = pattern.score(m.registration(), Some(kind));
                (score > 0).then_some((score, order, m))
            })
            .collect();
        // score, then version, both descending; registration order breaks ties
        scored.sort_by(|a, b| {
            b.0.cmp(&a.0)
                .then_with(|| b.2.descriptor().version().cmp(&a.2.descriptor().version()))
                .then_with(|| a.1.cmp(&b.1))
        });
        scored.into_iter().map(|(_, _, m)| m.clone()).collect()
    }

    fn is_usable(&self, module: &ModuleRef) -> bool {
        module.descriptor().api_version().compatibility(self.host).is_usable()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Vec<ModuleRef>> {
        self.modules.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Vec<ModuleRef>> {
        self.modules.write().unwrap_or_else(PoisonError::into_inner)
    }
}
