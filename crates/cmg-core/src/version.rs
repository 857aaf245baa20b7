//! Version triplets for modules and the module API.
//!
//! Every module declares two triplets: its own release version and the host
//! module-API version it was built against. The registry only hands out
//! modules whose API version fits the host:
//!
//! - the major numbers must be equal (a major bump is an API break),
//! - `(major, minor)` of the module must not exceed the host's.
//!
//! The patch number never affects compatibility.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A `major.minor.patch` triplet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Version {
    /// Incremented on breaking changes.
    pub major: u16,
    /// Incremented on additions.
    pub minor: u16,
    /// Incremented on fixes.
    pub patch: u16,
}

/// Outcome of comparing a module's API version against the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compatibility {
    /// Identical `(major, minor)`.
    Exact,
    /// Same major, older minor. Usable.
    Older,
    /// Same major, newer minor than the host. Not usable.
    Newer,
    /// Different major. Hard rejection.
    MajorMismatch,
}

impl Compatibility {
    /// Returns `true` if the module may be used by the host.
    #[inline]
    pub fn is_usable(self) -> bool {
        matches!(self, Self::Exact | Self::Older)
    }
}

impl Version {
    /// Creates a version triplet.
    #[inline]
    pub const fn new(major: u16, minor: u16, patch: u16) -> Self {
        Self { major, minor, patch }
    }

    /// Compares this module API version against the host's.
    pub fn compatibility(self, host: Version) -> Compatibility {
        if self.major != host.major {
            Compatibility::MajorMismatch
        } else if self.minor == host.minor {
            Compatibility::Exact
        } else if self.minor < host.minor {
            Compatibility::Older
        } else {
            Compatibility::Newer
        }
    }

    /// Shorthand for `self.compatibility(host).is_usable()`.
    #[inline]
    pub fn is_compatible_with(self, host: Version) -> bool {
        self.compatibility(host).is_usable()
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl FromStr for Version {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let mut parts = [0u16; 3];
        let mut count = 0;
        for part in s.trim().split('.') {
            if count == 3 {
                return Err(Error::InvalidVersion(s.to_string()));
            }
            parts[count] = part
                .parse()
                .map_err(|_| Error::InvalidVersion(s.to_string()))?;
            count += 1;
        }
        // "1" and "1.2" are accepted, missing parts are zero
        if count == 0 {
            return Err(Error::InvalidVersion(s.to_string()));
        }
        Ok(Self::new(parts[0], parts[1], parts[2]))
    }
}

impl TryFrom<String> for Version {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<Version> for String {
    fn from(v: Version) -> Self {
        v.to_string()
    }
}

impl From<[u16; 3]> for Version {
    fn from(v: [u16; 3]) -> Self {
        Self::new(v[0], v[1], v[2])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordering_is_lexicographic() {
        assert!(Version::new(1, 2, 0) < Version::new(1, 10, 0));
        assert!(Version::new(1, 2, 9) < Version::new(2, 0, 0));
    }

    #[test]
    fn compatibility_rules() {
        let host = Version::new(1, 3, 0);
        assert_eq!(Version::new(1, 3, 7).compatibility(host), Compatibility::Exact);
        assert_eq!(Version::new(1, 1, 0).compatibility(host), Compatibility::Older);
        assert_eq!(Version::new(1, 4, 0).compatibility(host), Compatibility::Newer);
        assert_eq!(Version::new(0, 9, 0).compatibility(host), Compatibility::MajorMismatch);
        assert!(!Version::new(2, 0, 0).is_compatible_with(host));
    }

    #[test]
    fn parse() {
        assert_eq!("1.2.3".parse::<Version>().unwrap(), Version::new(1, 2, 3));
        assert_eq!("4".parse::<Version>().unwrap(), Version::new(4, 0, 0));
        assert!("1.x".parse::<Version>().is_err());
        assert!("1.2.3.4".parse::<Version>().is_err());
    }

    #[test]
    fn serde_as_string() {
        let json = serde_json::to_string(&Version::new(0, 9, 6)).unwrap();
        assert_eq!(json, "\"0.9.6\"");
        let back: Version = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Version::new(0, 9, 6));
    }
}
