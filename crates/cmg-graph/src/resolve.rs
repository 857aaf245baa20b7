//! Context resolution.
//!
//! A node has two module bindings: the context module that produces bytes and
//! the renderer that consumes them. Their context types may differ, so a
//! resolved context is cached under up to two fingerprints:
//!
//! ```text
//! "<context type>:<context module registration>:<hash text>"
//! ```
//!
//! once with the renderer's context type (what the node finally uses) and
//! once with the context module's own type (reusable by other renderers).
//! The hash text is the module's [`hash_text`](cmg_module::ContextProducer::hash_text)
//! or else the serialized node options.
//!
//! Resolution order:
//!
//! 1. rebind modules selected by the `////context` / `////renderer` options
//! 2. look up the renderer-side fingerprint
//! 3. look up the context-side fingerprint
//! 4. produce the context; on failure rebind to a fallback module and retry
//!    once, unless the selection option is locked
//! 5. cache the bytes, convert them to the renderer's type if needed and
//!    cache the conversion too

use cmg_core::{ApiKind, Artifact, Blob, ContextType, Error, Pattern, Result};
use cmg_module::{ModuleId, ModuleRef};
use tracing::{debug, error, warn};

use crate::cache::Fingerprint;
use crate::engine::{CONTEXT_OPTION, Engine, selection_option};
use crate::node::{ContextState, Node, NodeId};
use crate::signal::{ConnectorEvent, Notification};

impl Engine {
    /// Resolves the context of `node`.
    ///
    /// Returns the node's valid context if it has one, else a cached artifact,
    /// else generates one. Failures propagate with the node registration in
    /// the message and leave the node without context.
    pub fn resolve(&mut self, node: NodeId) -> Result<Artifact> {
        let n = self.node(node)?;
        match &n.state {
            ContextState::Resolving => {
                return Err(Error::ResolutionCycle {
                    registration: n.registration.to_string(),
                });
            }
            ContextState::Cached(_) => {
                if let Some(artifact) = &n.backend_data {
                    return Ok(artifact.acquire());
                }
            }
            ContextState::NoContext | ContextState::Invalidated => {}
        }

        self.node_mut(node)?.state = ContextState::Resolving;
        let result = self.resolve_uncached(node);

        let n = self.node_mut(node)?;
        match result {
            Ok((fp, artifact)) => {
                debug!(node = n.relation.as_str(), fingerprint = fp.short(), "context resolved");
                n.backend_data = Some(artifact.acquire());
                n.state = ContextState::Cached(fp);
                Ok(artifact)
            }
            Err(err) => {
                error!(node = n.relation.as_str(), error = %err, "context resolution failed");
                n.backend_data = None;
                n.state = ContextState::NoContext;
                self.notify(Notification::node(ConnectorEvent::IncompatibleContext, node));
                Err(err)
            }
        }
    }

    /// Fingerprint of the node's context.
    ///
    /// [`ApiKind::Renderer`] gives the key of the context in the renderer's
    /// type, any other kind the key in the context module's own type.
    pub fn fingerprint(&self, node: NodeId, kind: ApiKind) -> Result<Fingerprint> {
        let n = self.node(node)?;
        let Some(core) = &n.context else {
            return Err(Error::NoContextModule {
                registration: n.registration.to_string(),
            });
        };
        let ty = match kind {
            ApiKind::Renderer => target_type(n, core),
            _ => core.descriptor().context_type().clone(),
        };
        Ok(fingerprint_with(n, core, &ty))
    }

    fn resolve_uncached(&mut self, node: NodeId) -> Result<(Fingerprint, Artifact)> {
        self.apply_selection_options(node)?;

        let mut retried = false;
        loop {
            let core = self.bound_context(node)?;
            let n = self.node(node)?;
            let target = target_type(n, &core);
            let source_type = core.descriptor().context_type().clone();

            let fp_target = fingerprint_with(n, &core, &target);
            if let Some(artifact) = self.cache.get(&fp_target) {
                return Ok((fp_target, artifact));
            }

            let fp_source = fingerprint_with(n, &core, &source_type);
            let cached = if fp_source == fp_target {
                None
            } else {
                self.cache.get(&fp_source)
            };

            let source = match cached {
                Some(artifact) => artifact,
                None => match self.produce(node, &core) {
                    Ok(bytes) => {
                        let blob = Blob::from_data(bytes, source_type.clone());
                        self.cache.insert(fp_source, blob.into_artifact(), core.id())
                    }
                    Err(err) if !retried => {
                        self.rebind_fallback(node, &core, err)?;
                        retried = true;
                        continue;
                    }
                    Err(err) => return Err(err),
                },
            };

            if source_type == target {
                return Ok((fp_target, source));
            }
            let (converted, converter) = self.convert(node, &source, &source_type, &target)?;
            let artifact = self.cache.insert(fp_target.clone(), converted, converter);
            return Ok((fp_target, artifact));
        }
    }

    /// Rebinds modules named by the selection options if the current binding
    /// does not match them.
    fn apply_selection_options(&mut self, node: NodeId) -> Result<()> {
        for kind in [ApiKind::Context, ApiKind::Renderer] {
            let key = selection_option(kind);
            let n = self.node(node)?;
            let Some(pattern) = n.options.get_text(key).map(str::to_string) else {
                continue;
            };
            let current = match kind {
                ApiKind::Renderer => n.renderer.as_ref(),
                _ => n.context.as_ref(),
            };
            let satisfied = current.is_some_and(|m| {
                Pattern::parse(&pattern).is_ok_and(|p| p.is_match(m.registration(), Some(kind)))
            });
            if satisfied {
                continue;
            }

            let locked = n.options.is_locked(key);
            let registration = n.registration.to_string();
            match self.registry.find_best(&pattern, kind) {
                Some(module) => {
                    debug!(
                        registration = registration.as_str(),
                        module = module.registration().as_str(),
                        option = key,
                        "module rebound"
                    );
                    let n = self.node_mut(node)?;
                    match kind {
                        ApiKind::Renderer => n.renderer = Some(module),
                        _ => n.context = Some(module),
                    }
                }
                None if locked => {
                    return Err(Error::EditLocked {
                        registration,
                        option: key.to_string(),
                        pattern,
                    });
                }
                None => {
                    warn!(registration = registration.as_str(), option = key, pattern = pattern.as_str(), "selected module unavailable");
                }
            }
        }
        Ok(())
    }

    /// Bound context module, binding one now if none was found at creation.
    fn bound_context(&mut self, node: NodeId) -> Result<ModuleRef> {
        let n = self.node(node)?;
        if let Some(module) = &n.context {
            return Ok(module.clone());
        }
        let Some(module) = self.select_module(&n.registration, &n.options, ApiKind::Context)? else {
            return Err(Error::NoContextModule {
                registration: n.registration.to_string(),
            });
        };
        self.node_mut(node)?.context = Some(module.clone());
        Ok(module)
    }

    fn produce(&self, node: NodeId, core: &ModuleRef) -> Result<Vec<u8>> {
        let n = self.node(node)?;
        let Some(producer) = core.as_context() else {
            return Err(Error::NoContextModule {
                registration: n.registration.to_string(),
            });
        };
        let bytes = producer.produce_context(&n.view())?;
        if bytes.is_empty() {
            return Err(Error::generation(
                n.context_registration().as_str(),
                "module returned an empty context",
            ));
        }
        debug!(
            node = n.relation.as_str(),
            module = core.registration().as_str(),
            size = bytes.len(),
            "context produced"
        );
        Ok(bytes)
    }

    /// Replaces a failing context module with the first usable fallback.
    ///
    /// Gives `err` back if the selection is locked, fallback search is off or
    /// no provider offers a usable module.
    fn rebind_fallback(&mut self, node: NodeId, failed: &ModuleRef, err: Error) -> Result<()> {
        let n = self.node(node)?;
        if n.options.is_locked(CONTEXT_OPTION) {
            error!(node = n.relation.as_str(), error = %err, "context module is locked, no fallback");
            return Err(err);
        }
        if !self.config.fallback {
            return Err(err);
        }

        let view = n.view();
        let mut chosen = None;
        for provider in self.registry.fallbacks(&n.registration) {
            let Some(fallback) = provider.as_fallback() else {
                continue;
            };
            let suggestion = fallback.fallback(&view, ApiKind::Context);
            match suggestion.as_deref().and_then(|p| self.registry.find_best(p, ApiKind::Context)) {
                Some(module) if !ModuleRef::ptr_eq(&module, failed) => {
                    chosen = Some(module);
                    break;
                }
                _ => warn!(
                    node = n.relation.as_str(),
                    provider = provider.registration().as_str(),
                    suggestion = suggestion.as_deref(),
                    "fallback provider offered no usable module"
                ),
            }
        }

        let Some(module) = chosen else {
            return Err(err);
        };
        warn!(
            node = n.relation.as_str(),
            from = failed.registration().as_str(),
            to = module.registration().as_str(),
            error = %err,
            "context module failed, using fallback"
        );
        self.node_mut(node)?.context = Some(module);
        self.notify(Notification::node(ConnectorEvent::IncompatibleContext, node));
        Ok(())
    }

    fn convert(
        &self,
        node: NodeId,
        source: &Artifact,
        from: &ContextType,
        to: &ContextType,
    ) -> Result<(Artifact, ModuleId)> {
        let n = self.node(node)?;
        let Some(module) = self.registry.converter(from, to) else {
            return Err(Error::NoConverter {
                from: from.to_string(),
                to: to.to_string(),
            });
        };
        let Some(converter) = module.as_converter() else {
            return Err(Error::NoConverter {
                from: from.to_string(),
                to: to.to_string(),
            });
        };
        let bytes = converter.convert(source, &n.view())?;
        if bytes.is_empty() {
            return Err(Error::generation(
                n.context_registration().as_str(),
                format!("conversion {from} -> {to} returned no data"),
            ));
        }
        debug!(node = n.relation.as_str(), %from, %to, size = bytes.len(), "context converted");
        Ok((Blob::from_data(bytes, to.clone()).into_artifact(), module.id()))
    }
}

/// Context type the node's renderer consumes. Renderers without a type take
/// whatever the context module produces.
fn target_type(n: &Node, core: &ModuleRef) -> ContextType {
    n.renderer
        .as_ref()
        .map(|r| r.descriptor().context_type())
        .filter(|t| !t.is_empty())
        .unwrap_or(core.descriptor().context_type())
        .clone()
}

fn fingerprint_with(n: &Node, core: &ModuleRef, ty: &ContextType) -> Fingerprint {
    let text = core
        .as_context()
        .and_then(|c| c.hash_text(&n.view()))
        .unwrap_or_else(|| n.options.to_text());
    Fingerprint::new(format!("{}:{}:{}", ty, core.registration(), text))
}
