//! Fingerprint-keyed context cache.
//!
//! Generating a context can be expensive, so every artifact is stored under a
//! [`Fingerprint`] of the module binding and the node options that produced
//! it. Two nodes with the same module and the same serialized options share
//! one artifact.
//!
//! The cache can be shared between engines (`Arc<ContextCache>`); all access
//! goes through one mutex.
//!
//! ```
//! use cmg_core::{Blob, ContextType, ObjectId};
//! use cmg_graph::{ContextCache, Fingerprint};
//!
//! let cache = ContextCache::new();
//! let fp = Fingerprint::new("cLUT://color/curve/lut:gamma=2.2\n");
//! let module = ObjectId::next();
//!
//! let art = Blob::from_data(vec![1, 2, 3], ContextType::new("cLUT").unwrap()).into_artifact();
//! cache.insert(fp.clone(), art, module);
//!
//! assert!(cache.get(&fp).is_some());
//! assert_eq!(cache.stats().hits, 1);
//! ```

use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Mutex, MutexGuard, PoisonError};

use cmg_core::Artifact;
use cmg_module::ModuleId;
use sha2::{Digest, Sha256};
use tracing::{debug, trace};

/// Cache key: the text that identifies a context plus its SHA-256 digest.
///
/// Equality and hashing use the digest. The text is kept for diagnostics.
#[derive(Clone)]
pub struct Fingerprint {
    text: String,
    digest: String,
}

impl Fingerprint {
    /// Hashes `text`.
    pub fn new(text: impl Into<String>) -> Self {
        let text = text.into();
        let digest = format!("{:x}", Sha256::digest(text.as_bytes()));
        Self { text, digest }
    }

    /// Text the digest was computed from.
    #[inline]
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Lowercase hex SHA-256 digest.
    #[inline]
    pub fn digest(&self) -> &str {
        &self.digest
    }

    /// First 12 hex digits, for logs.
    pub fn short(&self) -> &str {
        &self.digest[..12]
    }
}

impl PartialEq for Fingerprint {
    fn eq(&self, other: &Self) -> bool {
        self.digest == other.digest
    }
}

impl Eq for Fingerprint {}

impl Hash for Fingerprint {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.digest.hash(state);
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.digest)
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({} {:?})", self.short(), self.text)
    }
}

/// Hit/miss counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Live entries.
    pub entries: usize,
    /// Successful lookups.
    pub hits: u64,
    /// Failed lookups.
    pub misses: u64,
    /// Entries added.
    pub inserts: u64,
}

/// Public view of one entry.
#[derive(Debug, Clone)]
pub struct EntryInfo {
    /// Module that produced the artifact.
    pub module: ModuleId,
    /// Artifact size in bytes.
    pub size: usize,
    /// Owners of the artifact, the cache included.
    pub ref_count: usize,
    /// Lookups served by this entry.
    pub hits: u64,
}

struct Entry {
    artifact: Artifact,
    module: ModuleId,
    hits: u64,
}

#[derive(Default)]
struct Inner {
    entries: HashMap<Fingerprint, Entry>,
    stats: CacheStats,
}

/// Thread-safe context cache. At most one artifact per fingerprint.
#[derive(Default)]
pub struct ContextCache {
    inner: Mutex<Inner>,
}

impl fmt::Debug for ContextCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextCache").field("stats", &self.stats()).finish()
    }
}

impl ContextCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Looks up `fp`, returning another owner of the cached artifact.
    pub fn get(&self, fp: &Fingerprint) -> Option<Artifact> {
        let mut inner = self.lock();
        let found = inner.entries.get_mut(fp).map(|e| {
            e.hits += 1;
            e.artifact.acquire()
        });
        if found.is_some() {
            inner.stats.hits += 1;
            trace!(fingerprint = fp.short(), "cache hit");
        } else {
            inner.stats.misses += 1;
            trace!(fingerprint = fp.short(), "cache miss");
        }
        found
    }

    /// Stores `artifact` under `fp` and returns the cached artifact.
    ///
    /// If an entry already exists it is kept and returned, so concurrent
    /// producers of the same context end up sharing the first artifact.
    pub fn insert(&self, fp: Fingerprint, artifact: Artifact, module: ModuleId) -> Artifact {
        let mut inner = self.lock();
        if let Some(existing) = inner.entries.get(&fp) {
            return existing.artifact.acquire();
        }
        debug!(fingerprint = fp.short(), size = artifact.len(), module = module.get(), "cache insert");
        let out = artifact.acquire();
        inner.entries.insert(
            fp,
            Entry {
                artifact,
                module,
                hits: 0,
            },
        );
        inner.stats.inserts += 1;
        out
    }

    /// Returns `true` if `fp` is cached. Does not count as a lookup.
    pub fn contains(&self, fp: &Fingerprint) -> bool {
        self.lock().entries.contains_key(fp)
    }

    /// Details of the entry under `fp`.
    pub fn entry_info(&self, fp: &Fingerprint) -> Option<EntryInfo> {
        self.lock().entries.get(fp).map(|e| EntryInfo {
            module: e.module,
            size: e.artifact.len(),
            ref_count: e.artifact.ref_count(),
            hits: e.hits,
        })
    }

    /// Drops the entry under `fp`. Nodes holding the artifact keep it.
    pub fn invalidate(&self, fp: &Fingerprint) -> bool {
        let removed = self.lock().entries.remove(fp).is_some();
        if removed {
            debug!(fingerprint = fp.short(), "cache entry invalidated");
        }
        removed
    }

    /// Drops every entry produced by `module`. Returns how many were dropped.
    pub fn remove_module(&self, module: ModuleId) -> usize {
        let mut inner = self.lock();
        let before = inner.entries.len();
        inner.entries.retain(|_, e| e.module != module);
        before - inner.entries.len()
    }

    /// Drops entries whose artifact is owned by nothing but the cache.
    ///
    /// Observers do not count as owners.
    pub fn purge_unused(&self) -> usize {
        let mut inner = self.lock();
        let before = inner.entries.len();
        inner.entries.retain(|_, e| e.artifact.ref_count() > 1);
        let purged = before - inner.entries.len();
        if purged > 0 {
            debug!(purged, "unused contexts purged");
        }
        purged
    }

    /// Drops everything and resets the counters.
    pub fn clear(&self) {
        let mut inner = self.lock();
        inner.entries.clear();
        inner.stats = CacheStats::default();
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    /// Returns `true` if nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.lock().entries.is_empty()
    }

    /// Counters.
    pub fn stats(&self) -> CacheStats {
        let inner = self.lock();
        CacheStats {
            entries: inner.entries.len(),
            ..inner.stats
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cmg_core::{Blob, ContextType, ObjectId};

    fn artifact(bytes: &[u8]) -> Artifact {
        Blob::from_data(bytes.to_vec(), ContextType::none()).into_artifact()
    }

    #[test]
    fn fingerprint_is_deterministic() {
        let a = Fingerprint::new("cLUT://color/curve/lut:gamma=2.2\n");
        let b = Fingerprint::new("cLUT://color/curve/lut:gamma=2.2\n");
        assert_eq!(a, b);
        assert_eq!(a.digest().len(), 64);
        assert_ne!(a, Fingerprint::new("cLUT://color/curve/lut:gamma=1.0\n"));
    }

    #[test]
    fn known_digest() {
        let fp = Fingerprint::new("abc");
        assert_eq!(
            fp.digest(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(fp.short(), "ba7816bf8f01");
    }

    #[test]
    fn first_insert_wins() {
        let cache = ContextCache::new();
        let fp = Fingerprint::new("x");
        let module = ObjectId::next();
        let first = cache.insert(fp.clone(), artifact(&[1]), module);
        let second = cache.insert(fp.clone(), artifact(&[2]), module);
        assert!(Artifact::ptr_eq(&first, &second));
        assert_eq!(second.as_bytes(), &[1]);
        assert_eq!(cache.stats().inserts, 1);
    }

    #[test]
    fn hits_bump_reference_count() {
        let cache = ContextCache::new();
        let fp = Fingerprint::new("x");
        drop(cache.insert(fp.clone(), artifact(&[1]), ObjectId::next()));
        assert_eq!(cache.entry_info(&fp).unwrap().ref_count, 1);

        let held = cache.get(&fp).unwrap();
        let info = cache.entry_info(&fp).unwrap();
        assert_eq!(info.ref_count, 2);
        assert_eq!(info.hits, 1);
        drop(held);
        assert!(cache.get(&Fingerprint::new("y")).is_none());
        assert_eq!(cache.stats().misses, 1);
    }

    #[test]
    fn purge_keeps_owned_entries() {
        let cache = ContextCache::new();
        let owned = cache.insert(Fingerprint::new("a"), artifact(&[1]), ObjectId::next());
        let observed = cache.insert(Fingerprint::new("b"), artifact(&[2]), ObjectId::next());
        let observer = observed.observe();
        drop(observed);

        assert_eq!(cache.purge_unused(), 1);
        assert!(cache.contains(&Fingerprint::new("a")));
        assert!(!observer.is_alive());
        drop(owned);
    }

    #[test]
    fn remove_module_and_clear() {
        let cache = ContextCache::new();
        let m1 = ObjectId::next();
        let m2 = ObjectId::next();
        cache.insert(Fingerprint::new("a"), artifact(&[1]), m1);
        cache.insert(Fingerprint::new("b"), artifact(&[2]), m1);
        cache.insert(Fingerprint::new("c"), artifact(&[3]), m2);
        assert_eq!(cache.remove_module(m1), 2);
        assert_eq!(cache.len(), 1);
        assert!(cache.invalidate(&Fingerprint::new("c")));
        cache.insert(Fingerprint::new("d"), artifact(&[4]), m2);
        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.stats(), CacheStats::default());
    }
}
