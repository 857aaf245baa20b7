//! Error types shared by every cmg crate.
//!
//! The graph engine distinguishes four failure families:
//!
//! - **Lookup** - a module, node, plug or socket could not be found.
//! - **Incompatibility** - connector types or module API versions do not fit.
//! - **Generation** - a module failed to produce a context artifact.
//! - **Stale handles** - an id outlived the entity it referred to.
//!
//! Registry lookups report absence through `Option`, so [`Error::ModuleNotFound`]
//! only appears where a module is mandatory (e.g. creating a node).
//!
//! # Usage
//!
//! ```rust
//! use cmg_core::{Error, Result};
//!
//! fn require(pattern: &str, found: bool) -> Result<()> {
//!     if !found {
//!         return Err(Error::module_not_found(pattern, "renderer"));
//!     }
//!     Ok(())
//! }
//!
//! assert!(require("//color/icc", false).unwrap_err().is_lookup_error());
//! ```

use thiserror::Error;

use crate::version::Version;

/// Result type alias using [`Error`] as the error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while building, resolving or running a graph.
#[derive(Debug, Error)]
pub enum Error {
    /// No registered module matches the pattern for the requested capability.
    #[error("no {kind} module matches '{pattern}'")]
    ModuleNotFound {
        /// Registration pattern that was searched.
        pattern: String,
        /// Capability that was requested.
        kind: String,
    },

    /// A module requires a newer or different host API.
    #[error("module '{registration}' requires host API {required}, host provides {host}")]
    IncompatibleModule {
        /// Registration of the rejected module.
        registration: String,
        /// API version the module was built against.
        required: Version,
        /// API version of the running host.
        host: Version,
    },

    /// Plug and socket connector types do not match.
    #[error("connector mismatch: plug accepts '{plug}', socket provides '{socket}'")]
    ConnectorMismatch {
        /// Connector pattern of the plug.
        plug: String,
        /// Connector registration of the socket.
        socket: String,
    },

    /// A plug was asked for data but has no remote socket.
    #[error("plug {plug} of '{registration}' is not connected")]
    NotConnected {
        /// Node registration owning the plug.
        registration: String,
        /// Position of the plug on its node.
        plug: usize,
    },

    /// No connector on the node matches the requested nick or type.
    #[error("no {side} matching '{pattern}' on '{registration}'")]
    ConnectorNotFound {
        /// Node registration.
        registration: String,
        /// `"plug"` or `"socket"`.
        side: &'static str,
        /// Nick or connector type pattern that was searched.
        pattern: String,
    },

    /// Connector position outside the node's connector array.
    #[error("{side} {index} out of range for '{registration}' ({count} available)")]
    ConnectorOutOfRange {
        /// Node registration.
        registration: String,
        /// `"plug"` or `"socket"`.
        side: &'static str,
        /// Requested position.
        index: usize,
        /// Number of connectors on that side.
        count: usize,
    },

    /// An id refers to an entity that was already released.
    #[error("stale {kind} handle #{index}")]
    StaleHandle {
        /// Entity kind.
        kind: &'static str,
        /// Arena slot of the released entity.
        index: u32,
    },

    /// Malformed registration string or pattern.
    #[error("invalid registration pattern '{pattern}': {reason}")]
    InvalidPattern {
        /// Offending text.
        pattern: String,
        /// What is wrong with it.
        reason: String,
    },

    /// Malformed `major.minor.patch` triplet.
    #[error("invalid version '{0}'")]
    InvalidVersion(String),

    /// Context type tags are empty or 4 to 8 ASCII bytes.
    #[error("invalid context type '{0}': expected empty or 4-8 ASCII bytes")]
    InvalidContextType(String),

    /// The context module returned no data, also after fallback.
    #[error("context generation failed for '{registration}': {reason}")]
    ContextGeneration {
        /// Registration of the node that failed.
        registration: String,
        /// Diagnostic detail.
        reason: String,
    },

    /// A user-locked option selects a module that is unavailable or failing.
    #[error("option '{option}' of '{registration}' is locked to '{pattern}' which is unavailable")]
    EditLocked {
        /// Registration of the node.
        registration: String,
        /// Option key that is locked.
        option: String,
        /// Module pattern the option selects.
        pattern: String,
    },

    /// The node has no context producing module bound.
    #[error("'{registration}' has no context module")]
    NoContextModule {
        /// Registration of the node.
        registration: String,
    },

    /// No converter adapts one context type into another.
    #[error("no converter from context type '{from}' to '{to}'")]
    NoConverter {
        /// Source context type.
        from: String,
        /// Target context type.
        to: String,
    },

    /// Resolution re-entered a node that is already resolving.
    #[error("context resolution cycle at '{registration}'")]
    ResolutionCycle {
        /// Registration of the node.
        registration: String,
    },

    /// A renderer failed while processing a ticket.
    #[error("run failed in '{registration}': {reason}")]
    Run {
        /// Registration of the renderer node.
        registration: String,
        /// Diagnostic detail.
        reason: String,
    },

    /// YAML configuration could not be parsed.
    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// I/O error reading configuration.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error with custom message.
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Creates an [`Error::ModuleNotFound`] error.
    #[inline]
    pub fn module_not_found(pattern: impl Into<String>, kind: impl Into<String>) -> Self {
        Self::ModuleNotFound {
            pattern: pattern.into(),
            kind: kind.into(),
        }
    }

    /// Creates an [`Error::InvalidPattern`] error.
    #[inline]
    pub fn invalid_pattern(pattern: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidPattern {
            pattern: pattern.into(),
            reason: reason.into(),
        }
    }

    /// Creates an [`Error::ContextGeneration`] error.
    #[inline]
    pub fn generation(registration: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ContextGeneration {
            registration: registration.into(),
            reason: reason.into(),
        }
    }

    /// Creates an [`Error::Run`] error.
    #[inline]
    pub fn run(registration: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Run {
            registration: registration.into(),
            reason: reason.into(),
        }
    }

    /// Creates an [`Error::StaleHandle`] error.
    #[inline]
    pub fn stale(kind: &'static str, index: u32) -> Self {
        Self::StaleHandle { kind, index }
    }

    /// Creates an [`Error::Other`] error.
    #[inline]
    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }

    /// Returns `true` if something could not be found.
    #[inline]
    pub fn is_lookup_error(&self) -> bool {
        matches!(
            self,
            Self::ModuleNotFound { .. }
                | Self::NotConnected { .. }
                | Self::ConnectorNotFound { .. }
                | Self::NoContextModule { .. }
        )
    }

    /// Returns `true` for connector or version incompatibilities.
    #[inline]
    pub fn is_incompatibility(&self) -> bool {
        matches!(
            self,
            Self::ConnectorMismatch { .. } | Self::IncompatibleModule { .. } | Self::NoConverter { .. }
        )
    }

    /// Returns `true` if context generation failed.
    #[inline]
    pub fn is_generation_error(&self) -> bool {
        matches!(self, Self::ContextGeneration { .. } | Self::EditLocked { .. })
    }

    /// Returns `true` if a released entity was addressed.
    #[inline]
    pub fn is_stale_handle(&self) -> bool {
        matches!(self, Self::StaleHandle { .. })
    }
}
