//! # cmg-module
//!
//! Pluggable processing modules for the color management graph.
//!
//! A module is described by a [`Descriptor`] and offers its capabilities
//! through trait objects:
//!
//! - [`ContextProducer`] - builds the opaque context bytes of a node
//! - [`Renderer`] - runs a node for a pull request
//! - [`FallbackProvider`] - names a replacement when context generation fails
//! - [`ContextConverter`] - adapts context bytes between context types
//!
//! The [`Registry`] stores them and answers pattern lookups with
//! host-API compatibility checks.
//!
//! # Example
//!
//! ```
//! use cmg_core::{ApiKind, ObjectId, Options, Registration, Result};
//! use cmg_module::{ContextProducer, Descriptor, NodeView, Registry};
//!
//! struct Constant(Descriptor);
//!
//! impl ContextProducer for Constant {
//!     fn descriptor(&self) -> &Descriptor {
//!         &self.0
//!     }
//!
//!     fn produce_context(&self, _node: &NodeView<'_>) -> Result<Vec<u8>> {
//!         Ok(vec![42])
//!     }
//! }
//!
//! let registry = Registry::new();
//! let desc = Descriptor::new("//color/demo/constant")?.with_context_type("cnst")?;
//! registry.register_context(Constant(desc))?;
//!
//! let module = registry.find_best("//color/demo", ApiKind::Context).unwrap();
//! let reg = Registration::parse("//color/demo/constant")?;
//! let options = Options::new();
//! let node = NodeView { id: ObjectId::next(), registration: &reg, options: &options, relation: "" };
//! assert_eq!(module.as_context().unwrap().produce_context(&node)?, vec![42]);
//! # Ok::<(), cmg_core::Error>(())
//! ```

#![warn(missing_docs)]

pub mod api;
pub mod builtin;
pub mod descriptor;
pub mod registry;

use cmg_core::Version;

pub use api::{ContextConverter, ContextProducer, FallbackProvider, NodeView, Renderer, Runtime};
pub use descriptor::{ConnectorSpec, Descriptor};
pub use registry::{ModuleApi, ModuleId, ModuleRef, Registry};

/// Module API version implemented by this host.
pub const HOST_API: Version = Version::new(1, 0, 0);
