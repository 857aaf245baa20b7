//! Color management graph engine.
//!
//! This crate wires modules from [`cmg_module`] into processing graphs:
//! - Nodes with input plugs and fan-out sockets, stored in checked arenas
//! - Connect, disconnect and release with notifications to both sides
//! - Adjacency discovery from any node, cycle safe
//! - Lazy, fingerprint-keyed context resolution with fallback modules
//! - Pull execution through [`Ticket`](cmg_core::Ticket)s
//!
//! # Quick Start
//!
//! ```
//! use cmg_core::{Batch, Options, RunStatus, Ticket};
//! use cmg_graph::Engine;
//!
//! let mut engine = Engine::with_builtin()?;
//!
//! let source = engine.create_node("//color/source/buffer", Options::new())?;
//! let gamma: Options = [("gamma", 2.2)].into_iter().collect();
//! let curve = engine.create_node("//color/curve/lut", gamma)?;
//! engine.connect_nodes(source, "out", curve, "in")?;
//!
//! let socket = engine.socket_at(source, 0)?;
//! engine.set_socket_data(socket, Some(Batch::new(3, vec![0.18; 6])?))?;
//!
//! let mut ticket = Ticket::new();
//! assert_eq!(engine.pull_node(curve, &mut ticket)?, RunStatus::Done);
//! assert_eq!(ticket.output().unwrap().pixels(), 2);
//! # Ok::<(), cmg_core::Error>(())
//! ```
//!
//! # Caching
//!
//! Contexts are only built when a renderer asks for them and are shared by
//! every node with the same module and options:
//!
//! ```
//! use cmg_core::Options;
//! use cmg_graph::Engine;
//!
//! let mut engine = Engine::with_builtin()?;
//! let opts: Options = [("gamma", 1.8)].into_iter().collect();
//! let a = engine.create_node("//color/curve/lut", opts.clone())?;
//! let b = engine.create_node("//color/curve/lut", opts)?;
//!
//! let first = engine.resolve(a)?;
//! let second = engine.resolve(b)?;
//! assert_eq!(first.as_bytes(), second.as_bytes());
//! assert_eq!(engine.cache().stats().hits, 1);
//! # Ok::<(), cmg_core::Error>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

mod cache;
mod config;
mod connect;
mod engine;
mod node;
mod pull;
mod resolve;
mod signal;
mod traversal;

pub use cache::{CacheStats, ContextCache, EntryInfo, Fingerprint};
pub use config::{EngineConfig, PolicySource, Scope, ScopedPolicy};
pub use engine::{CONTEXT_OPTION, Engine, RENDERER_OPTION};
pub use node::{ContextState, EdgeFilter, Node, NodeId, Plug, PlugId, Side, Socket, SocketId};
pub use signal::{ConnectorEvent, Notification, ObserverId};
pub use traversal::{Direction, Edge, Graph};
