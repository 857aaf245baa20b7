//! Capability traits implemented by modules.
//!
//! A module offers one or more capabilities, each a separate trait object in
//! the [`Registry`](crate::Registry):
//!
//! | trait | [`ApiKind`] | job |
//! |-------|-------------|-----|
//! | [`ContextProducer`] | `Context` | build the context bytes for a node |
//! | [`Renderer`] | `Renderer` | produce output for a pull |
//! | [`FallbackProvider`] | `Fallback` | suggest a replacement module |
//! | [`ContextConverter`] | `Converter` | adapt context bytes between types |
//!
//! Renderers talk back to the engine through [`Runtime`], which the graph
//! crate implements. That keeps this crate free of any graph types.

use cmg_core::{ApiKind, Artifact, Batch, Blob, ContextType, ObjectId, Options, Registration, Result, RunStatus, Ticket};

use crate::descriptor::Descriptor;

/// Read-only view of a node, handed to module hooks.
#[derive(Debug, Clone, Copy)]
pub struct NodeView<'a> {
    /// Node object id.
    pub id: ObjectId,
    /// Registration of the context module bound to the node.
    pub registration: &'a Registration,
    /// Current node options.
    pub options: &'a Options,
    /// Position of the node in its pipeline, for diagnostics.
    pub relation: &'a str,
}

/// Builds context bytes for a node.
pub trait ContextProducer: Send + Sync {
    /// Static module metadata.
    fn descriptor(&self) -> &Descriptor;

    /// Produces the context. An empty result counts as a failure.
    fn produce_context(&self, node: &NodeView<'_>) -> Result<Vec<u8>>;

    /// Text that identifies the context for this node.
    ///
    /// `None` uses the serialized node options.
    fn hash_text(&self, _node: &NodeView<'_>) -> Option<String> {
        None
    }
}

/// Runs a node for a pull request.
pub trait Renderer: Send + Sync {
    /// Static module metadata.
    fn descriptor(&self) -> &Descriptor;

    /// Writes output for `ticket` and reports whether there was any.
    fn run(&self, rt: &mut dyn Runtime, ticket: &mut Ticket) -> Result<RunStatus>;
}

/// Suggests a replacement when a node's module cannot produce a context.
///
/// The descriptor registration is used as a pattern: the provider is asked
/// about every node whose registration it matches.
pub trait FallbackProvider: Send + Sync {
    /// Static module metadata.
    fn descriptor(&self) -> &Descriptor;

    /// Registration pattern of a module able to take over `kind` for `node`.
    fn fallback(&self, node: &NodeView<'_>, kind: ApiKind) -> Option<String>;
}

/// Adapts context bytes from one context type to another.
pub trait ContextConverter: Send + Sync {
    /// Static module metadata. Its context type is the output type.
    fn descriptor(&self) -> &Descriptor;

    /// Accepted input context type.
    fn source_type(&self) -> &ContextType;

    /// Converts `input` for `node`.
    fn convert(&self, input: &Blob, node: &NodeView<'_>) -> Result<Vec<u8>>;
}

/// Engine services available to a running [`Renderer`].
pub trait Runtime {
    /// The node being run.
    fn node(&self) -> NodeView<'_>;

    /// Resolves the node's context, generating and caching it if needed.
    fn resolve_context(&mut self) -> Result<Artifact>;

    /// Number of input plugs.
    fn input_count(&self) -> usize;

    /// Pulls input plug `index` with `ticket`.
    ///
    /// Unconnected plugs fail with a lookup error.
    fn pull_input(&mut self, index: usize, ticket: &mut Ticket) -> Result<RunStatus>;

    /// Data stored on the pulled socket, if any.
    fn socket_data(&self) -> Option<Batch>;
}
