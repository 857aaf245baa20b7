//! Opaque context artifacts.
//!
//! The engine never interprets context bytes. A [`Blob`] only pairs them with
//! the [`ContextType`] tag of the module that produced them, and an
//! [`Artifact`] is the shared handle the context cache hands out.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::object::{Handle, ObjectKind};

/// Context type tag: empty for stateless modules, otherwise 4 to 8 ASCII bytes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ContextType(String);

impl ContextType {
    /// Validates and wraps a tag.
    pub fn new(tag: &str) -> Result<Self> {
        let valid = tag.is_empty()
            || ((4..=8).contains(&tag.len()) && tag.bytes().all(|b| b.is_ascii_graphic()));
        if valid {
            Ok(Self(tag.to_string()))
        } else {
            Err(Error::InvalidContextType(tag.to_string()))
        }
    }

    /// The empty tag of stateless modules.
    #[inline]
    pub fn none() -> Self {
        Self::default()
    }

    /// Returns `true` for the empty tag.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Tag text.
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContextType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for ContextType {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        Self::new(&s)
    }
}

impl From<ContextType> for String {
    fn from(t: ContextType) -> Self {
        t.0
    }
}

/// Bytes plus their context type.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Blob {
    data: Vec<u8>,
    context_type: ContextType,
}

impl Blob {
    /// Takes ownership of `data` tagged with `context_type`.
    pub fn from_data(data: Vec<u8>, context_type: ContextType) -> Self {
        Self { data, context_type }
    }

    /// Replaces the content.
    pub fn set_from_data(&mut self, data: &[u8], context_type: ContextType) {
        self.data.clear();
        self.data.extend_from_slice(data);
        self.context_type = context_type;
    }

    /// Content bytes.
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Content size in bytes.
    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns `true` if there is no content.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Context type tag.
    #[inline]
    pub fn context_type(&self) -> &ContextType {
        &self.context_type
    }

    /// Wraps the blob into a shared artifact handle.
    pub fn into_artifact(self) -> Artifact {
        Handle::new(ObjectKind::Blob, self)
    }
}

/// Shared, immutable context artifact.
pub type Artifact = Handle<Blob>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_type_validation() {
        assert!(ContextType::new("").is_ok());
        assert!(ContextType::new("oyDL").is_ok());
        assert!(ContextType::new("lcm2cmm8").is_ok());
        assert!(ContextType::new("abc").is_err());
        assert!(ContextType::new("toolongtag").is_err());
        assert!(ContextType::new("a b c").is_err());
    }

    #[test]
    fn blob_accessors() {
        let ty = ContextType::new("cLUT").unwrap();
        let mut blob = Blob::from_data(vec![1, 2, 3], ty.clone());
        assert_eq!(blob.len(), 3);
        assert_eq!(blob.context_type(), &ty);

        blob.set_from_data(&[7], ContextType::none());
        assert_eq!(blob.as_bytes(), &[7]);
        assert!(blob.context_type().is_empty());
    }

    #[test]
    fn artifact_is_shared() {
        let art = Blob::from_data(vec![0; 16], ContextType::none()).into_artifact();
        let other = art.acquire();
        assert_eq!(other.len(), 16);
        assert_eq!(art.ref_count(), 2);
    }
}
