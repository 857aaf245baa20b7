//! Ordered node options.
//!
//! Options are key/value pairs in insertion order. Keys are registration
//! strings (`//color/icc/gamma`, `////context`) or bare names (`gamma`), so
//! [`Options::find`] can look them up by pattern as well as by exact key.
//!
//! The text form returned by [`Options::to_text`] is order significant and
//! feeds context fingerprints: two option sets with the same entries in the
//! same order serialize identically.
//!
//! An option can be *locked*, meaning the user set it explicitly. The engine
//! never overrides a locked module selection with a fallback.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::pattern::{Pattern, Registration};

/// Option value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// Boolean flag.
    Bool(bool),
    /// Integer.
    Int(i64),
    /// Floating point.
    Double(f64),
    /// Text, also used for module patterns.
    Text(String),
}

impl Value {
    /// Text content, `None` for non-text values.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Numeric content. Integers are widened.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Double(v) => Some(*v),
            Self::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    /// Boolean content.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Double(v) => write!(f, "{v:?}"),
            Self::Text(v) => f.write_str(v),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Int(v.into())
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Double(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

/// A single option.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionEntry {
    /// Key, a registration or bare name.
    pub key: String,
    /// Current value.
    pub value: Value,
    /// Set explicitly by the user.
    #[serde(default)]
    pub locked: bool,
}

/// Ordered option set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Options {
    entries: Vec<OptionEntry>,
}

impl Options {
    /// Creates an empty option set.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets `key` to `value`, keeping the position of an existing entry.
    ///
    /// Returns `true` if the set changed.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) -> bool {
        let key = key.into();
        let value = value.into();
        if let Some(entry) = self.entries.iter_mut().find(|e| e.key == key) {
            if entry.value == value {
                return false;
            }
            entry.value = value;
        } else {
            self.entries.push(OptionEntry {
                key,
                value,
                locked: false,
            });
        }
        true
    }

    /// Sets and locks an option, as a user edit would.
    pub fn set_locked(&mut self, key: impl Into<String>, value: impl Into<Value>) -> bool {
        let key = key.into();
        let changed = self.set(key.clone(), value);
        self.lock(&key);
        changed
    }

    /// Marks an existing option as locked. Returns `false` if absent.
    pub fn lock(&mut self, key: &str) -> bool {
        match self.entries.iter_mut().find(|e| e.key == key) {
            Some(entry) => {
                entry.locked = true;
                true
            }
            None => false,
        }
    }

    /// Value for an exact key.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.iter().find(|e| e.key == key).map(|e| &e.value)
    }

    /// Text value for an exact key.
    pub fn get_text(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    /// Numeric value for an exact key.
    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.get(key).and_then(Value::as_f64)
    }

    /// Returns `true` if the exact key exists and is locked.
    pub fn is_locked(&self, key: &str) -> bool {
        self.entries.iter().any(|e| e.key == key && e.locked)
    }

    /// Best entry whose key matches `pattern`.
    ///
    /// Exact key equality wins. Otherwise keys are scored as registrations
    /// against the pattern and the first highest score is returned.
    pub fn find(&self, pattern: &str) -> Option<&OptionEntry> {
        if let Some(exact) = self.entries.iter().find(|e| e.key == pattern) {
            return Some(exact);
        }
        let pattern = Pattern::parse(pattern).ok()?;
        let mut best: Option<(u32, &OptionEntry)> = None;
        for entry in &self.entries {
            let Ok(reg) = Registration::parse(&entry.key) else {
                continue;
            };
            let score = pattern.score(&reg, None);
            if score > 0 && best.is_none_or(|(s, _)| score > s) {
                best = Some((score, entry));
            }
        }
        best.map(|(_, e)| e)
    }

    /// Removes an exact key.
    pub fn remove(&mut self, key: &str) -> Option<OptionEntry> {
        let pos = self.entries.iter().position(|e| e.key == key)?;
        Some(self.entries.remove(pos))
    }

    /// Entries in order.
    pub fn iter(&self) -> impl Iterator<Item = &OptionEntry> {
        self.entries.iter()
    }

    /// Number of entries.
    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if no options are set.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Order significant text serialization, one `"key"=value` per line.
    ///
    /// Keys and text values are JSON strings, so separators inside them are
    /// escaped. Numbers keep their type: doubles always carry a `.` or an
    /// exponent, integers never do. Lock flags are not part of the text.
    pub fn to_text(&self) -> String {
        let mut text = String::new();
        for entry in &self.entries {
            text.push_str(&serde_json::Value::from(entry.key.as_str()).to_string());
            text.push('=');
            match &entry.value {
                Value::Text(v) => text.push_str(&serde_json::Value::from(v.as_str()).to_string()),
                other => text.push_str(&other.to_string()),
            }
            text.push('\n');
        }
        text
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Options {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut options = Self::new();
        for (k, v) in iter {
            options.set(k, v);
        }
        options
    }
}
