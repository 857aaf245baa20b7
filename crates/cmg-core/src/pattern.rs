//! Hierarchical registration strings and the patterns that select them.
//!
//! A registration names a module, connector or option key:
//!
//! ```text
//! //color/icc/lcms.fast._cpu/context
//! ^^ ^^^^^ ^^^ ^^^^^^^^^^^^^ ^^^^^^^
//! |  |     |   |             key (option name)
//! |  |     |   application (implementation, '.'-separated attributes)
//! |  |     type (class)
//! |  domain (category)
//! top (usually empty)
//! ```
//!
//! Patterns use the same syntax. Matching walks both level by level and
//! compares the `.`-separated attributes of each field. A pattern attribute
//! may carry a match type prefix:
//!
//! | prefix | meaning |
//! |--------|---------|
//! | `+` (default) | required, must be present |
//! | `_` | optional, scores when present |
//! | `-` | excluded, rejects when present |
//!
//! An API digit before the prefix (`7+lcms`, `4_fast`) restricts the attribute
//! to one [`ApiKind`]. Empty fields on either side are wildcards, and a
//! pattern without any `/` is compared against the registration's last field.
//! A pattern level the registration does not reach rejects if it holds a
//! required attribute.
//!
//! A leading `//` is one separator after an empty top field, so
//! `//color/icc` and `org/color/icc` both have `color` as domain.
//!
//! ```
//! use cmg_core::{Pattern, Registration};
//!
//! let reg = Registration::parse("//color/icc/lcms.fast").unwrap();
//! assert!(Pattern::parse("//color/icc").unwrap().score(&reg, None) > 0);
//! assert_eq!(Pattern::parse("//color/icc/-fast").unwrap().score(&reg, None), 0);
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Field positions inside a registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RegistrationField {
    /// Vendor or organisation prefix, usually empty.
    Top = 0,
    /// Processing domain, e.g. `color`.
    Domain = 1,
    /// Module class, e.g. `icc`.
    Type = 2,
    /// Implementation and its attributes, e.g. `lcms.fast`.
    Application = 3,
    /// Key or option name.
    Key = 4,
}

/// Module API kinds addressable from patterns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApiKind {
    /// Produces context artifacts.
    Context,
    /// Converts context artifacts between context types.
    Converter,
    /// Runs tickets through a node.
    Renderer,
    /// Suggests replacement modules.
    Fallback,
}

impl ApiKind {
    /// Digit used in pattern attribute prefixes.
    pub const fn digit(self) -> char {
        match self {
            Self::Context => '4',
            Self::Converter => '6',
            Self::Renderer => '7',
            Self::Fallback => '9',
        }
    }

    /// Inverse of [`ApiKind::digit`].
    pub fn from_digit(c: char) -> Option<Self> {
        match c {
            '4' => Some(Self::Context),
            '6' => Some(Self::Converter),
            '7' => Some(Self::Renderer),
            '9' => Some(Self::Fallback),
            _ => None,
        }
    }

    /// Lowercase name.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Context => "context",
            Self::Converter => "converter",
            Self::Renderer => "renderer",
            Self::Fallback => "fallback",
        }
    }
}

impl fmt::Display for ApiKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// How a pattern attribute participates in matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MatchType {
    /// `+`: must be present.
    Required,
    /// `_`: counts when present.
    Optional,
    /// `-`: must be absent.
    Excluded,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct Attribute {
    api: Option<ApiKind>,
    kind: MatchType,
    name: String,
}

impl Attribute {
    fn parse(text: &str) -> Self {
        let mut rest = text;
        let mut api = None;

        // an API digit only counts when a match type follows it
        let mut chars = rest.chars();
        if let (Some(d), Some(m)) = (chars.next(), chars.next()) {
            if let Some(kind) = ApiKind::from_digit(d) {
                if matches!(m, '+' | '_' | '-') {
                    api = Some(kind);
                    rest = &rest[1..];
                }
            }
        }

        let kind = match rest.chars().next() {
            Some('+') => MatchType::Required,
            Some('_') => MatchType::Optional,
            Some('-') => MatchType::Excluded,
            _ => {
                return Self {
                    api,
                    kind: MatchType::Required,
                    name: rest.to_string(),
                };
            }
        };
        Self {
            api,
            kind,
            name: rest[1..].to_string(),
        }
    }
}

type Field = Vec<Attribute>;

/// Raw fields in [`RegistrationField`] order.
fn split_fields(text: &str) -> std::str::Split<'_, char> {
    let body = if text.starts_with("//") { &text[1..] } else { text };
    body.split('/')
}

fn parse_fields(text: &str) -> Result<Vec<Field>> {
    if text.chars().any(char::is_whitespace) {
        return Err(Error::invalid_pattern(text, "contains whitespace"));
    }
    Ok(split_fields(text)
        .map(|field| {
            if field.is_empty() {
                Vec::new()
            } else {
                field.split('.').filter(|a| !a.is_empty()).map(Attribute::parse).collect()
            }
        })
        .collect())
}

/// A parsed registration string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Registration {
    text: String,
    fields: Vec<Field>,
}

impl Registration {
    /// Parses a registration. Empty strings are rejected.
    pub fn parse(text: &str) -> Result<Self> {
        if text.is_empty() {
            return Err(Error::invalid_pattern(text, "empty registration"));
        }
        Ok(Self {
            text: text.to_string(),
            fields: parse_fields(text)?,
        })
    }

    /// Original text.
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Raw text of a field, `None` if the registration is shorter.
    pub fn field(&self, field: RegistrationField) -> Option<&str> {
        split_fields(&self.text).nth(field as usize)
    }

    /// Raw text of the last field.
    pub fn last_field(&self) -> &str {
        self.text.rsplit('/').next().unwrap_or_default()
    }

    /// Fields from the top up to and including `field`, joined with `/`.
    pub fn text_up_to(&self, field: RegistrationField) -> String {
        let lead = if self.text.starts_with("//") { "/" } else { "" };
        let fields: Vec<_> = split_fields(&self.text).take(field as usize + 1).collect();
        format!("{lead}{}", fields.join("/"))
    }

    /// `//domain/type` prefix of this registration, used for category searches.
    pub fn class(&self) -> String {
        let domain = self.field(RegistrationField::Domain).unwrap_or_default();
        let ty = self.field(RegistrationField::Type).unwrap_or_default();
        format!("//{domain}/{ty}")
    }

    /// Scores this registration against a pattern; see [`Pattern::score`].
    #[inline]
    pub fn matches(&self, pattern: &Pattern, api: Option<ApiKind>) -> u32 {
        pattern.score(self, api)
    }
}

impl fmt::Display for Registration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

impl FromStr for Registration {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Registration {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        Self::parse(&s)
    }
}

impl From<Registration> for String {
    fn from(r: Registration) -> Self {
        r.text
    }
}

/// A parsed registration pattern.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Pattern {
    text: String,
    fields: Vec<Field>,
}

impl Pattern {
    /// Parses a pattern. The empty pattern matches everything.
    pub fn parse(text: &str) -> Result<Self> {
        Ok(Self {
            text: text.to_string(),
            fields: parse_fields(text)?,
        })
    }

    /// Original text.
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Match score of `registration` against this pattern.
    ///
    /// Returns the number of matched attributes, `1` if nothing was counted
    /// but nothing rejected, and `0` for no match. Higher scores rank better.
    pub fn score(&self, registration: &Registration, api: Option<ApiKind>) -> u32 {
        let mut score = 0;

        if self.fields.len() == 1 {
            let last = registration.fields.last().map(Vec::as_slice).unwrap_or_default();
            match compare_field(&self.fields[0], last, api) {
                Some(n) => score += n,
                None => return 0,
            }
        } else {
            for (level, p) in self.fields.iter().enumerate() {
                let Some(r) = registration.fields.get(level) else {
                    if requires_any(p, api) {
                        return 0;
                    }
                    continue;
                };
                match compare_field(p, r, api) {
                    Some(n) => score += n,
                    None => return 0,
                }
            }
        }

        score.max(1)
    }

    /// Returns `true` if the score is non-zero.
    #[inline]
    pub fn is_match(&self, registration: &Registration, api: Option<ApiKind>) -> bool {
        self.score(registration, api) > 0
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

impl FromStr for Pattern {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// `None` rejects, `Some(n)` counts `n` matched attributes.
fn compare_field(pattern: &[Attribute], registration: &[Attribute], api: Option<ApiKind>) -> Option<u32> {
    if pattern.is_empty() || registration.is_empty() {
        return Some(0);
    }

    let mut score = 0;
    for p in pattern {
        if p.api.is_some() && p.api != api {
            continue;
        }
        let present = registration.iter().any(|r| r.name == p.name);
        match (p.kind, present) {
            (MatchType::Excluded, true) => return None,
            (MatchType::Required, false) => return None,
            (MatchType::Required | MatchType::Optional, true) => score += 1,
            _ => {}
        }
    }
    Some(score)
}

fn requires_any(pattern: &[Attribute], api: Option<ApiKind>) -> bool {
    pattern
        .iter()
        .any(|p| p.kind == MatchType::Required && (p.api.is_none() || p.api == api))
}

/// Convenience for matching raw strings. Malformed input never matches.
pub fn registration_match(registration: &str, pattern: &str, api: Option<ApiKind>) -> u32 {
    match (Registration::parse(registration), Pattern::parse(pattern)) {
        (Ok(r), Ok(p)) => p.score(&r, api),
        _ => 0,
    }
}

/// Compares two option keys.
///
/// The namespaces (everything before the last `/`) must match as registration
/// and pattern, and the key names (last field up to the first `.`) must be
/// equal. Returns a ranking score, `0` for no match.
pub fn match_key(a: &str, b: &str, api: Option<ApiKind>) -> u32 {
    let (Some((ns_a, key_a)), Some((ns_b, key_b))) = (a.rsplit_once('/'), b.rsplit_once('/')) else {
        return 0;
    };

    let score = if ns_a.is_empty() && ns_b.is_empty() {
        1
    } else {
        registration_match(ns_a, ns_b, api)
    };
    if score == 0 {
        return 0;
    }

    let name_a = key_a.split('.').next().unwrap_or_default();
    let name_b = key_b.split('.').next().unwrap_or_default();
    if name_a == name_b { score + 1 } else { 0 }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reg(s: &str) -> Registration {
        Registration::parse(s).unwrap()
    }

    fn score(r: &str, p: &str) -> u32 {
        Pattern::parse(p).unwrap().score(&reg(r), None)
    }

    #[test]
    fn prefix_patterns_match() {
        assert!(score("//color/icc/lcms", "//color/icc") > 0);
        assert!(score("//color/icc/lcms", "//color") > 0);
        assert_eq!(score("//color/icc/lcms", "//color/lut"), 0);
    }

    #[test]
    fn attributes_are_not_substrings() {
        assert_eq!(score("//color/icc/lcms2", "//color/icc/lcms"), 0);
        assert_eq!(score("//color/iccx", "//color/icc"), 0);
    }

    #[test]
    fn optional_attributes_raise_score() {
        let plain = score("//color/icc/lcms", "//color/icc/lcms._fast");
        let fast = score("//color/icc/lcms.fast", "//color/icc/lcms._fast");
        assert!(plain > 0);
        assert!(fast > plain);
    }

    #[test]
    fn excluded_attribute_rejects() {
        assert_eq!(score("//color/icc/lcms.fast", "//color/icc/-fast"), 0);
        assert!(score("//color/icc/lcms", "//color/icc/-fast") > 0);
    }

    #[test]
    fn key_only_pattern_matches_last_field() {
        assert!(score("////context", "context") > 0);
        assert!(score("org/color/icc/lcms/renderer", "renderer") > 0);
        assert_eq!(score("////context", "renderer"), 0);
    }

    #[test]
    fn api_restricted_attributes() {
        let r = reg("//color/icc/lcms");
        let p = Pattern::parse("//color/icc/7+lcms").unwrap();
        assert!(p.score(&r, Some(ApiKind::Renderer)) > p.score(&r, Some(ApiKind::Context)));

        let exclude = Pattern::parse("//color/icc/4-lcms").unwrap();
        assert_eq!(exclude.score(&r, Some(ApiKind::Context)), 0);
        assert!(exclude.score(&r, Some(ApiKind::Renderer)) > 0);
    }

    #[test]
    fn registration_prefixes_are_ignored() {
        assert!(score("//color/icc/_lcms", "//color/icc/lcms") > 0);
    }

    #[test]
    fn fields() {
        let r = reg("//color/icc/lcms.fast/context");
        assert_eq!(r.field(RegistrationField::Domain), Some("color"));
        assert_eq!(r.field(RegistrationField::Application), Some("lcms.fast"));
        assert_eq!(r.last_field(), "context");
        assert_eq!(r.text_up_to(RegistrationField::Type), "//color/icc");
        assert_eq!(r.class(), "//color/icc");
        assert_eq!(r.field(RegistrationField::Top), Some(""));
        assert_eq!(r.field(RegistrationField::Type), Some("icc"));
        assert_eq!(r.field(RegistrationField::Key), Some("context"));

        let named = reg("org/color/icc/lcms");
        assert_eq!(named.field(RegistrationField::Top), Some("org"));
        assert_eq!(named.class(), "//color/icc");
        assert_eq!(named.text_up_to(RegistrationField::Domain), "org/color");
        assert!(score("org/color/icc/lcms", "//color/icc") > 0);
    }

    #[test]
    fn deeper_pattern_needs_deeper_registration() {
        assert_eq!(score("//color", "//color/icc/lcms"), 0);
        assert_eq!(score("//color/icc", "//color/icc/lcms"), 0);
        assert!(score("//color/icc", "//color/icc/_lcms") > 0);
        assert!(score("//color/icc", "//color/icc/-lcms") > 0);
        assert!(score("//color/icc", "//color/icc/") > 0);
    }

    #[test]
    fn key_matching() {
        assert!(match_key("//color/icc/rendering_intent", "//color/icc/rendering_intent.advanced", None) > 0);
        assert_eq!(match_key("//color/icc/rendering_intent", "//color/icc/gamma", None), 0);
        assert_eq!(match_key("intent", "intent", None), 0);
    }

    #[test]
    fn rejects_whitespace() {
        assert!(Registration::parse("//color/ icc").is_err());
        assert!(Registration::parse("").is_err());
    }
}
