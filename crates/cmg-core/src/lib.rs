//! # cmg-core
//!
//! Foundation types for the color management graph.
//!
//! - [`Handle`] / [`Observer`] - shared objects with owner and observer counts
//! - [`Arena`] / [`Key`] - generation-checked storage for graph entities
//! - [`Registration`] / [`Pattern`] - hierarchical module names and their matching
//! - [`Version`] - module and host API triplets
//! - [`Options`] - ordered node options with a stable text form
//! - [`Blob`] / [`Artifact`] - opaque context bytes
//! - [`Ticket`] / [`Batch`] - pull requests and the samples they carry
//!
//! ## Crate Structure
//!
//! ```text
//! cmg-core (this crate)
//!    ^
//!    +-- cmg-module (descriptors, capability traits, registry)
//!    |      ^
//!    +------+-- cmg-graph (engine, nodes, cache, traversal, pull)
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod arena;
pub mod blob;
pub mod error;
pub mod object;
pub mod options;
pub mod pattern;
pub mod ticket;
pub mod version;

pub use arena::{Arena, Key};
pub use blob::{Artifact, Blob, ContextType};
pub use error::{Error, Result};
pub use object::{Handle, ObjectId, ObjectKind, Observer};
pub use options::{OptionEntry, Options, Value};
pub use pattern::{match_key, registration_match, ApiKind, MatchType, Pattern, Registration, RegistrationField};
pub use ticket::{Batch, RunStatus, Ticket};
pub use version::{Compatibility, Version};
