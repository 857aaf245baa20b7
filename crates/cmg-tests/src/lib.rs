//! Integration tests for the cmg crates.
//!
//! [`instrumented`] holds modules that count their calls, so the tests can
//! check how often contexts are really generated.

pub mod instrumented {
    //! Call-counting modules.

    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use cmg_core::{ApiKind, Error, Result, RunStatus, Ticket};
    use cmg_module::{ContextProducer, Descriptor, FallbackProvider, NodeView, Renderer, Runtime};

    /// Context type of [`Counted`] contexts.
    pub const TEST_CONTEXT: &str = "tEST";

    /// Shared call counter.
    pub type Calls = Arc<AtomicUsize>;

    /// Reads a counter.
    pub fn calls(c: &Calls) -> usize {
        c.load(Ordering::SeqCst)
    }

    /// Context producer returning its registration and the node options.
    pub struct Counted {
        desc: Descriptor,
        calls: Calls,
        fail: bool,
    }

    impl Counted {
        /// Working producer.
        pub fn new(registration: &str) -> Result<Self> {
            Ok(Self {
                desc: Descriptor::new(registration)?.with_context_type(TEST_CONTEXT)?,
                calls: Calls::default(),
                fail: false,
            })
        }

        /// Producer that always returns an empty context.
        pub fn failing(registration: &str) -> Result<Self> {
            Ok(Self {
                fail: true,
                ..Self::new(registration)?
            })
        }

        /// Counter of `produce_context` calls.
        pub fn calls(&self) -> Calls {
            Arc::clone(&self.calls)
        }
    }

    impl ContextProducer for Counted {
        fn descriptor(&self) -> &Descriptor {
            &self.desc
        }

        fn produce_context(&self, node: &NodeView<'_>) -> Result<Vec<u8>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Ok(Vec::new());
            }
            let text = format!("{}|{}", self.desc.registration(), node.options.to_text());
            Ok(text.into_bytes())
        }
    }

    /// Renderer with `plugs` inputs and one output that resolves its context
    /// and pulls every connected input.
    pub struct Through {
        desc: Descriptor,
        runs: Calls,
    }

    impl Through {
        /// Creates the renderer.
        pub fn new(registration: &str, plugs: usize) -> Result<Self> {
            let mut desc = Descriptor::new(registration)?.with_socket("out", "//color/data");
            if plugs > 0 {
                desc = desc.with_plug("in", "//color/data").repeat_last_plug(plugs - 1);
            }
            Ok(Self {
                desc,
                runs: Calls::default(),
            })
        }

        /// Counter of `run` calls.
        pub fn runs(&self) -> Calls {
            Arc::clone(&self.runs)
        }
    }

    impl Renderer for Through {
        fn descriptor(&self) -> &Descriptor {
            &self.desc
        }

        fn run(&self, rt: &mut dyn Runtime, ticket: &mut Ticket) -> Result<RunStatus> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            rt.resolve_context()?;
            for i in 0..rt.input_count() {
                match rt.pull_input(i, ticket) {
                    Ok(_) => {}
                    Err(Error::NotConnected { .. }) => {}
                    Err(e) => return Err(e),
                }
            }
            Ok(RunStatus::Done)
        }
    }

    /// Fallback provider naming one fixed module.
    pub struct FixedFallback {
        desc: Descriptor,
        target: Option<String>,
        calls: Calls,
    }

    impl FixedFallback {
        /// Serves nodes matching `pattern` with `target`; `None` never helps.
        pub fn new(pattern: &str, target: Option<&str>) -> Result<Self> {
            Ok(Self {
                desc: Descriptor::new(pattern)?,
                target: target.map(str::to_string),
                calls: Calls::default(),
            })
        }

        /// Counter of `fallback` calls.
        pub fn calls(&self) -> Calls {
            Arc::clone(&self.calls)
        }
    }

    impl FallbackProvider for FixedFallback {
        fn descriptor(&self) -> &Descriptor {
            &self.desc
        }

        fn fallback(&self, _node: &NodeView<'_>, kind: ApiKind) -> Option<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            (kind == ApiKind::Context).then(|| self.target.clone()).flatten()
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use anyhow::Result;
    use cmg_core::{ApiKind, Options, Ticket};
    use cmg_graph::{
        ConnectorEvent, Direction, EdgeFilter, Engine, EngineConfig, Scope, Side, CONTEXT_OPTION,
    };
    use cmg_module::Registry;

    use crate::instrumented::{Calls, Counted, FixedFallback, Through, calls};

    fn opts(pairs: &[(&str, f64)]) -> Options {
        pairs.iter().map(|&(k, v)| (k, v)).collect()
    }

    /// Registers a counted context module and a pass-through renderer.
    fn module(engine: &Engine, registration: &str, plugs: usize) -> Result<Calls> {
        let producer = Counted::new(registration)?;
        let counter = producer.calls();
        engine.registry().register_context(producer)?;
        engine.registry().register_renderer(Through::new(registration, plugs)?)?;
        Ok(counter)
    }

    #[test]
    fn input_output_scenario() -> Result<()> {
        let mut engine = Engine::new();
        let input_calls = module(&engine, "//color/input", 1)?;
        let output_calls = module(&engine, "//color/output", 1)?;

        let a = engine.create_node("//color/input", opts(&[("gamma", 1.0)]))?;
        let b = engine.create_node("//color/output", opts(&[("gamma", 2.2)]))?;
        let socket = engine.socket_at(a, 0)?;
        let plug = engine.plug_at(b, 0)?;
        engine.connect(plug, socket)?;

        let graph = engine.build_adjacency(b, Direction::Input, None)?;
        assert_eq!(graph.nodes().len(), 2);
        assert!(graph.contains(a) && graph.contains(b));
        assert_eq!(graph.edges().len(), 1);

        engine.resolve(b)?;
        assert_eq!(calls(&output_calls), 1);
        engine.resolve(b)?;
        assert_eq!(calls(&output_calls), 1);
        assert_eq!(calls(&input_calls), 0);
        Ok(())
    }

    #[test]
    fn fingerprint_is_deterministic() -> Result<()> {
        let mut engine = Engine::new();
        module(&engine, "//color/input", 0)?;
        let n = engine.create_node("//color/input", opts(&[("gamma", 1.0), ("offset", 0.1)]))?;

        let first = engine.fingerprint(n, ApiKind::Renderer)?;
        let second = engine.fingerprint(n, ApiKind::Renderer)?;
        assert_eq!(first, second);
        assert_eq!(first.text(), second.text());

        let mut other = Engine::new();
        module(&other, "//color/input", 0)?;
        let m = other.create_node("//color/input", opts(&[("gamma", 1.0), ("offset", 0.1)]))?;
        assert_eq!(other.fingerprint(m, ApiKind::Renderer)?, first);
        Ok(())
    }

    #[test]
    fn fingerprint_digest_is_sha256_of_text() -> Result<()> {
        use sha2::{Digest, Sha256};

        let mut engine = Engine::new();
        module(&engine, "//color/input", 0)?;
        let n = engine.create_node("//color/input", opts(&[("gamma", 1.0)]))?;
        let fp = engine.fingerprint(n, ApiKind::Context)?;
        assert_eq!(fp.text(), "tEST://color/input:\"gamma\"=1.0\n");
        assert_eq!(fp.digest(), format!("{:x}", Sha256::digest(fp.text().as_bytes())));
        Ok(())
    }

    #[test]
    fn option_order_changes_fingerprint() -> Result<()> {
        let mut engine = Engine::new();
        module(&engine, "//color/input", 0)?;
        let a = engine.create_node("//color/input", opts(&[("gamma", 1.0), ("offset", 0.1)]))?;
        let b = engine.create_node("//color/input", opts(&[("offset", 0.1), ("gamma", 1.0)]))?;
        assert_ne!(engine.fingerprint(a, ApiKind::Context)?, engine.fingerprint(b, ApiKind::Context)?);
        Ok(())
    }

    #[test]
    fn value_type_is_part_of_the_fingerprint() -> Result<()> {
        let mut engine = Engine::with_builtin()?;
        let text: Options = [("gamma", "2.2")].into_iter().collect();
        let a = engine.create_node("//color/curve/lut", text)?;
        let b = engine.create_node("//color/curve/lut", opts(&[("gamma", 2.2)]))?;

        assert_ne!(engine.fingerprint(a, ApiKind::Context)?, engine.fingerprint(b, ApiKind::Context)?);
        let first = engine.resolve(a)?;
        let second = engine.resolve(b)?;
        assert_ne!(first.as_bytes(), second.as_bytes());
        assert_eq!(engine.cache().stats().hits, 0);
        Ok(())
    }

    #[test]
    fn embedded_separators_do_not_alias_options() -> Result<()> {
        let mut engine = Engine::new();
        let counter = module(&engine, "//color/input", 0)?;
        let forged: Options = [("size", "3\ngamma=2.0")].into_iter().collect();
        let n = engine.create_node("//color/input", forged)?;
        engine.resolve(n)?;
        let before = engine.fingerprint(n, ApiKind::Context)?;

        let split: Options = [("size", "3"), ("gamma", "2.0")].into_iter().collect();
        assert!(engine.set_options(n, split)?);
        assert_ne!(engine.fingerprint(n, ApiKind::Context)?, before);
        engine.resolve(n)?;
        assert_eq!(calls(&counter), 2);
        Ok(())
    }

    #[test]
    fn identical_nodes_share_one_context() -> Result<()> {
        let mut engine = Engine::new();
        let counter = module(&engine, "//color/input", 0)?;
        let a = engine.create_node("//color/input", opts(&[("gamma", 2.2)]))?;
        let b = engine.create_node("//color/input", opts(&[("gamma", 2.2)]))?;

        let first = engine.resolve(a)?;
        let second = engine.resolve(b)?;
        assert_eq!(first.as_bytes(), second.as_bytes());
        assert!(cmg_core::Artifact::ptr_eq(&first, &second));
        assert_eq!(calls(&counter), 1);
        assert_eq!(engine.cache().len(), 1);
        Ok(())
    }

    #[test]
    fn option_change_regenerates() -> Result<()> {
        let mut engine = Engine::new();
        let counter = module(&engine, "//color/input", 0)?;
        let n = engine.create_node("//color/input", opts(&[("gamma", 1.0)]))?;

        engine.resolve(n)?;
        let before = engine.fingerprint(n, ApiKind::Renderer)?;
        engine.set_option(n, "gamma", 2.2)?;
        assert!(engine.node(n)?.backend_data().is_none());

        let artifact = engine.resolve(n)?;
        let after = engine.fingerprint(n, ApiKind::Renderer)?;
        assert_eq!(calls(&counter), 2);
        assert_ne!(before, after);
        assert!(String::from_utf8_lossy(artifact.as_bytes()).contains("\"gamma\"=2.2"));
        Ok(())
    }

    /// src fans out to x and y, which both feed z.
    fn fan_in(engine: &mut Engine) -> Result<[cmg_graph::NodeId; 4]> {
        module(engine, "//color/source", 0)?;
        module(engine, "//color/stage", 1)?;
        module(engine, "//color/merge", 2)?;
        let src = engine.create_node("//color/source", Options::new())?;
        let x = engine.create_node("//color/stage", opts(&[("n", 1.0)]))?;
        let y = engine.create_node("//color/stage", opts(&[("n", 2.0)]))?;
        let z = engine.create_node("//color/merge", Options::new())?;
        engine.connect_nodes(src, "out", x, "in")?;
        engine.connect_nodes(src, "out", y, "in")?;
        engine.connect_nodes(x, "out", z, "in")?;
        engine.connect_nodes(y, "out", z, "in")?;
        Ok([src, x, y, z])
    }

    #[test]
    fn common_downstream_node_is_visited_once() -> Result<()> {
        let mut engine = Engine::new();
        let [src, x, y, z] = fan_in(&mut engine)?;
        assert_eq!(engine.edge_count(z, Side::Plug, EdgeFilter::Connected)?, 2);
        assert_eq!(engine.socket(engine.socket_at(src, 0)?)?.requesting().len(), 2);

        for start in [src, x, y, z] {
            let graph = engine.build_adjacency(start, Direction::Both, None)?;
            assert_eq!(graph.nodes().len(), 4);
            assert_eq!(graph.nodes().iter().filter(|&&n| n == z).count(), 1);
            assert_eq!(graph.edges().len(), 4);
        }

        let down = engine.build_adjacency(src, Direction::Output, None)?;
        assert_eq!(down.nodes().iter().filter(|&&n| n == z).count(), 1);
        Ok(())
    }

    #[test]
    fn release_clears_remote_requesting_lists() -> Result<()> {
        let mut engine = Engine::new();
        let [_, x, y, z] = fan_in(&mut engine)?;
        let released = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&released);
        engine.observe(move |n| {
            if n.event == ConnectorEvent::Released {
                log.lock().unwrap().push(n.node);
            }
        });

        let z_plugs = engine.node(z)?.plugs().to_vec();
        engine.release_node(z)?;

        for upstream in [x, y] {
            let socket = engine.socket(engine.socket_at(upstream, 0)?)?;
            assert!(socket.requesting().iter().all(|p| !z_plugs.contains(p)));
            assert!(released.lock().unwrap().contains(&upstream));
        }
        for id in engine.node_ids() {
            for &s in engine.node(id)?.sockets() {
                for &p in engine.socket(s)?.requesting() {
                    assert!(engine.plug(p).is_ok(), "dangling plug {p}");
                }
            }
        }
        assert!(z_plugs.iter().all(|&p| engine.plug(p).is_err()));
        Ok(())
    }

    #[test]
    fn failing_module_falls_back() -> Result<()> {
        let mut engine = Engine::new();
        let broken = Counted::failing("//color/icc/broken")?;
        let broken_calls = broken.calls();
        let backup = Counted::new("//color/icc/backup")?;
        let backup_calls = backup.calls();
        let useless = FixedFallback::new("//color/icc", None)?;
        let useless_calls = useless.calls();

        engine.registry().register_context(broken)?;
        engine.registry().register_context(backup)?;
        engine.registry().register_fallback(useless)?;
        engine.registry().register_fallback(FixedFallback::new("//color/icc", Some("//color/icc/backup"))?)?;

        let n = engine.create_node("//color/icc/broken", opts(&[("gamma", 2.2)]))?;
        let artifact = engine.resolve(n)?;

        assert!(String::from_utf8_lossy(artifact.as_bytes()).starts_with("//color/icc/backup|"));
        assert_eq!(calls(&broken_calls), 1);
        assert_eq!(calls(&backup_calls), 1);
        assert_eq!(calls(&useless_calls), 1);
        let bound = engine.node(n)?.context_module().map(|m| m.registration().to_string());
        assert_eq!(bound.as_deref(), Some("//color/icc/backup"));
        Ok(())
    }

    #[test]
    fn locked_module_failure_propagates() -> Result<()> {
        let mut engine = Engine::new();
        engine.registry().register_context(Counted::failing("//color/icc/broken")?)?;
        engine.registry().register_context(Counted::new("//color/icc/backup")?)?;
        engine.registry().register_fallback(FixedFallback::new("//color/icc", Some("//color/icc/backup"))?)?;

        let mut options = Options::new();
        options.set_locked(CONTEXT_OPTION, "//color/icc/broken");
        let n = engine.create_node("//color/icc/broken", options)?;

        let err = engine.resolve(n).unwrap_err();
        assert!(err.is_generation_error());
        assert!(err.to_string().contains("//color/icc/broken"));
        Ok(())
    }

    #[test]
    fn shared_cache_across_engines() -> Result<()> {
        let registry = Arc::new(Registry::new());
        let producer = Counted::new("//color/input")?;
        let counter = producer.calls();
        registry.register_context(producer)?;
        let cache = Arc::new(cmg_graph::ContextCache::new());

        let mut one = Engine::with_shared(Arc::clone(&registry), Arc::clone(&cache), EngineConfig::default());
        let mut two = Engine::with_shared(registry, cache, EngineConfig::default());
        let a = one.create_node("//color/input", opts(&[("gamma", 1.0)]))?;
        let b = two.create_node("//color/input", opts(&[("gamma", 1.0)]))?;
        one.resolve(a)?;
        two.resolve(b)?;
        assert_eq!(calls(&counter), 1);
        Ok(())
    }

    #[test]
    fn released_nodes_free_their_contexts() -> Result<()> {
        let mut engine = Engine::new();
        module(&engine, "//color/input", 0)?;
        let n = engine.create_node("//color/input", opts(&[("gamma", 1.0)]))?;
        let observer = engine.resolve(n)?.observe();

        assert_eq!(engine.cache().purge_unused(), 0);
        engine.release_node(n)?;
        assert_eq!(engine.cache().purge_unused(), 1);
        assert!(!observer.is_alive());
        Ok(())
    }

    #[test]
    fn policy_selects_module() -> Result<()> {
        let yaml = r#"
policy:
  system:
    "//color/icc/context": "//color/icc/first"
  user:
    "//color/icc/context": "//color/icc/second"
"#;
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("engine.yaml");
        std::fs::write(&path, yaml)?;

        let mut engine = Engine::with_config(EngineConfig::from_file(&path)?);
        engine.registry().register_context(Counted::new("//color/icc/first")?)?;
        engine.registry().register_context(Counted::new("//color/icc/second")?)?;
        let n = engine.create_node("//color/icc", Options::new())?;
        let bound = engine.node(n)?.context_module().map(|m| m.registration().to_string());
        assert_eq!(bound.as_deref(), Some("//color/icc/second"));

        let mut policy = engine.config().policy.clone();
        policy.remove(Scope::User, "//color/icc/context");
        engine.set_policy(policy);
        let m = engine.create_node("//color/icc", Options::new())?;
        let bound = engine.node(m)?.context_module().map(|m| m.registration().to_string());
        assert_eq!(bound.as_deref(), Some("//color/icc/first"));
        Ok(())
    }

    #[test]
    fn pull_resolves_lazily() -> Result<()> {
        let mut engine = Engine::new();
        let src_calls = module(&engine, "//color/source", 0)?;
        let stage_calls = module(&engine, "//color/stage", 1)?;
        let src = engine.create_node("//color/source", Options::new())?;
        let stage = engine.create_node("//color/stage", Options::new())?;
        engine.connect_nodes(src, "out", stage, "in")?;
        assert_eq!(calls(&src_calls) + calls(&stage_calls), 0);

        let mut ticket = Ticket::new();
        engine.pull_node(stage, &mut ticket)?;
        assert_eq!(calls(&src_calls), 1);
        assert_eq!(calls(&stage_calls), 1);
        assert_eq!(ticket.visited().len(), 2);

        engine.pull_node(stage, &mut Ticket::new())?;
        assert_eq!(calls(&src_calls), 1);
        Ok(())
    }

    #[test]
    fn observers_can_be_removed() -> Result<()> {
        let mut engine = Engine::new();
        module(&engine, "//color/input", 0)?;
        let n = engine.create_node("//color/input", Options::new())?;
        let seen = Arc::new(Mutex::new(0usize));
        let count = Arc::clone(&seen);
        let id = engine.observe(move |_| *count.lock().unwrap() += 1);

        engine.set_option(n, "gamma", 1.0)?;
        assert_eq!(*seen.lock().unwrap(), 1);
        assert!(engine.unobserve(id));
        engine.set_option(n, "gamma", 2.0)?;
        assert_eq!(*seen.lock().unwrap(), 1);
        assert!(!engine.unobserve(id));
        Ok(())
    }

    #[test]
    fn options_and_config_serialize() -> Result<()> {
        let mut options = Options::new();
        options.set_locked(CONTEXT_OPTION, "//color/icc/backup");
        options.set("gamma", 2.2);
        let json = serde_json::to_value(&options)?;
        assert_eq!(json[0]["key"], "////context");
        assert_eq!(json[0]["locked"], true);
        assert_eq!(json[1]["value"], 2.2);

        let mut config = EngineConfig::default();
        config.policy.set(Scope::System, "//color/icc/context", "//color/icc/backup");
        let json = serde_json::to_value(&config)?;
        assert_eq!(json["fallback"], true);
        assert_eq!(json["host_api"], "1.0.0");
        assert_eq!(json["policy"]["system"]["//color/icc/context"], "//color/icc/backup");
        Ok(())
    }
}
