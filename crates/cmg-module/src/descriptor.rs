//! Static module metadata.
//!
//! A [`Descriptor`] is written once by the module author and never changes
//! after registration. It names the module, states which host API it needs,
//! which context type it produces or consumes, and which connectors a node
//! bound to it exposes.
//!
//! ```
//! use cmg_module::Descriptor;
//!
//! let desc = Descriptor::new("//color/curve/lut")
//!     .unwrap()
//!     .with_context_type("cLUT")
//!     .unwrap()
//!     .with_plug("in", "//color/data")
//!     .with_socket("out", "//color/data");
//!
//! assert_eq!(desc.plug_count(), 1);
//! assert_eq!(desc.context_type().as_str(), "cLUT");
//! ```

use cmg_core::{ContextType, Registration, Result, Version};

use crate::HOST_API;

/// One plug or socket slot declared by a module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectorSpec {
    /// Short name used to look the connector up, e.g. `"in"`.
    pub nick: String,
    /// Connector type. Sockets provide it as a registration, plugs accept
    /// sockets whose type matches it as a pattern.
    pub connector_type: String,
}

impl ConnectorSpec {
    /// Creates a connector spec.
    pub fn new(nick: impl Into<String>, connector_type: impl Into<String>) -> Self {
        Self {
            nick: nick.into(),
            connector_type: connector_type.into(),
        }
    }
}

/// Module registration, versions, context type and connectors.
#[derive(Debug, Clone)]
pub struct Descriptor {
    registration: Registration,
    name: String,
    version: Version,
    api_version: Version,
    context_type: ContextType,
    plugs: Vec<ConnectorSpec>,
    sockets: Vec<ConnectorSpec>,
    repeat_last_plug: usize,
    repeat_last_socket: usize,
}

impl Descriptor {
    /// Creates a descriptor for the host API this crate implements.
    pub fn new(registration: &str) -> Result<Self> {
        let registration = Registration::parse(registration)?;
        Ok(Self {
            name: registration.last_field().to_string(),
            registration,
            version: Version::new(1, 0, 0),
            api_version: HOST_API,
            context_type: ContextType::none(),
            plugs: Vec::new(),
            sockets: Vec::new(),
            repeat_last_plug: 0,
            repeat_last_socket: 0,
        })
    }

    /// Sets the display name.
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Sets the module release version.
    pub fn with_version(mut self, version: Version) -> Self {
        self.version = version;
        self
    }

    /// Sets the host API version the module was built against.
    pub fn with_api_version(mut self, version: Version) -> Self {
        self.api_version = version;
        self
    }

    /// Sets the context type tag.
    pub fn with_context_type(mut self, tag: &str) -> Result<Self> {
        self.context_type = ContextType::new(tag)?;
        Ok(self)
    }

    /// Appends a plug slot.
    pub fn with_plug(mut self, nick: &str, connector_type: &str) -> Self {
        self.plugs.push(ConnectorSpec::new(nick, connector_type));
        self
    }

    /// Appends a socket slot.
    pub fn with_socket(mut self, nick: &str, connector_type: &str) -> Self {
        self.sockets.push(ConnectorSpec::new(nick, connector_type));
        self
    }

    /// Allows the last plug to repeat `n` more times (variadic inputs).
    pub fn repeat_last_plug(mut self, n: usize) -> Self {
        self.repeat_last_plug = n;
        self
    }

    /// Allows the last socket to repeat `n` more times.
    pub fn repeat_last_socket(mut self, n: usize) -> Self {
        self.repeat_last_socket = n;
        self
    }

    /// Registration.
    #[inline]
    pub fn registration(&self) -> &Registration {
        &self.registration
    }

    /// Display name.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Module release version.
    #[inline]
    pub fn version(&self) -> Version {
        self.version
    }

    /// Required host API version.
    #[inline]
    pub fn api_version(&self) -> Version {
        self.api_version
    }

    /// Context type tag, empty for stateless modules.
    #[inline]
    pub fn context_type(&self) -> &ContextType {
        &self.context_type
    }

    /// Total plug slots including repeats.
    pub fn plug_count(&self) -> usize {
        slot_count(&self.plugs, self.repeat_last_plug)
    }

    /// Total socket slots including repeats.
    pub fn socket_count(&self) -> usize {
        slot_count(&self.sockets, self.repeat_last_socket)
    }

    /// Spec for plug slot `index`; repeated slots share the last spec.
    pub fn plug_spec(&self, index: usize) -> Option<&ConnectorSpec> {
        slot_spec(&self.plugs, self.repeat_last_plug, index)
    }

    /// Spec for socket slot `index`.
    pub fn socket_spec(&self, index: usize) -> Option<&ConnectorSpec> {
        slot_spec(&self.sockets, self.repeat_last_socket, index)
    }

    /// Declared plug specs, without repeats.
    #[inline]
    pub fn plugs(&self) -> &[ConnectorSpec] {
        &self.plugs
    }

    /// Declared socket specs, without repeats.
    #[inline]
    pub fn sockets(&self) -> &[ConnectorSpec] {
        &self.sockets
    }
}

fn slot_count(specs: &[ConnectorSpec], repeat: usize) -> usize {
    if specs.is_empty() { 0 } else { specs.len() + repeat }
}

fn slot_spec(specs: &[ConnectorSpec], repeat: usize, index: usize) -> Option<&ConnectorSpec> {
    if index < specs.len() {
        specs.get(index)
    } else if index < slot_count(specs, repeat) {
        specs.last()
    } else {
        None
    }
}
