//! Engine configuration.
//!
//! Loaded from YAML:
//!
//! ```yaml
//! host_api: "1.0.0"
//! fallback: true
//! signals: false
//! policy:
//!   system:
//!     "//color/curve/context": "//color/curve/lut"
//!   user:
//!     "//color/curve/context": "//color/curve/basic"
//! ```
//!
//! Policy tables map a key to a module pattern. User entries override system
//! entries. The engine asks for `"<class>/context"` and `"<class>/renderer"`
//! when binding modules to a new node, where `<class>` is the `//domain/type`
//! part of the node registration.

use std::collections::BTreeMap;
use std::path::Path;

use cmg_core::{Result, Version};
use cmg_module::HOST_API;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Source of module preferences.
pub trait PolicySource: Send + Sync {
    /// Preferred module pattern for `key`.
    fn lookup(&self, key: &str) -> Option<String>;
}

/// Policy scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    /// Installation wide defaults.
    System,
    /// User overrides.
    User,
}

/// Two-level policy table: user scope over system scope.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScopedPolicy {
    /// Installation wide defaults.
    #[serde(default)]
    pub system: BTreeMap<String, String>,
    /// User overrides.
    #[serde(default)]
    pub user: BTreeMap<String, String>,
}

impl ScopedPolicy {
    /// Sets `key` in `scope`.
    pub fn set(&mut self, scope: Scope, key: impl Into<String>, value: impl Into<String>) {
        let table = match scope {
            Scope::System => &mut self.system,
            Scope::User => &mut self.user,
        };
        table.insert(key.into(), value.into());
    }

    /// Removes `key` from `scope`.
    pub fn remove(&mut self, scope: Scope, key: &str) -> Option<String> {
        match scope {
            Scope::System => self.system.remove(key),
            Scope::User => self.user.remove(key),
        }
    }
}

impl PolicySource for ScopedPolicy {
    fn lookup(&self, key: &str) -> Option<String> {
        self.user.get(key).or_else(|| self.system.get(key)).cloned()
    }
}

/// Engine settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Module API version the host implements.
    pub host_api: Version,
    /// Search fallback modules when context generation fails.
    pub fallback: bool,
    /// Log every connector event at debug level.
    pub signals: bool,
    /// Module preferences.
    pub policy: ScopedPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            host_api: HOST_API,
            fallback: true,
            signals: false,
            policy: ScopedPolicy::default(),
        }
    }
}

impl EngineConfig {
    /// Loads configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        debug!(path = %path.display(), "loading engine config");
        Self::from_yaml_str(&content)
    }

    /// Loads configuration from a YAML string.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Serializes to YAML.
    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_from_empty_document() {
        let cfg = EngineConfig::from_yaml_str("{}").unwrap();
        assert_eq!(cfg, EngineConfig::default());
        assert!(cfg.fallback);
        assert_eq!(cfg.host_api, HOST_API);
    }

    #[test]
    fn user_scope_wins() {
        let yaml = r#"
fallback: false
policy:
  system:
    "//color/curve/context": "//color/curve/lut"
    "//color/sink/renderer": "//color/sink/display"
  user:
    "//color/curve/context": "//color/curve/basic"
"#;
        let cfg = EngineConfig::from_yaml_str(yaml).unwrap();
        assert!(!cfg.fallback);
        assert_eq!(
            cfg.policy.lookup("//color/curve/context").as_deref(),
            Some("//color/curve/basic")
        );
        assert_eq!(
            cfg.policy.lookup("//color/sink/renderer").as_deref(),
            Some("//color/sink/display")
        );
        assert!(cfg.policy.lookup("//color/source/context").is_none());
    }

    #[test]
    fn from_file_roundtrip() {
        let mut cfg = EngineConfig::default();
        cfg.signals = true;
        cfg.host_api = Version::new(1, 2, 0);
        cfg.policy.set(Scope::User, "//color/curve/context", "//color/curve/basic");

        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(cfg.to_yaml().unwrap().as_bytes()).unwrap();
        let loaded = EngineConfig::from_file(file.path()).unwrap();
        assert_eq!(loaded, cfg);
    }

    #[test]
    fn missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = EngineConfig::from_file(dir.path().join("absent.yaml")).unwrap_err();
        assert!(matches!(err, cmg_core::Error::Io(_)));
    }

    #[test]
    fn bad_version_is_rejected() {
        assert!(EngineConfig::from_yaml_str("host_api: \"one\"").is_err());
    }
}
