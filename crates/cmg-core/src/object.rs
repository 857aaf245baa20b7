//! Shared object handles.
//!
//! [`Handle`] is the reference counted wrapper used for everything that is
//! shared rather than owned: context artifacts, registered modules. It carries
//! a process-unique [`ObjectId`], the [`ObjectKind`] of its payload and an
//! optional debug name.
//!
//! Two copy flavours exist:
//!
//! - [`Handle::acquire`] (and `Clone`) is a *reference copy*: the same object
//!   gains one more owner.
//! - [`Handle::deep_copy`] is a *real copy*: a new object with a fresh id.
//!
//! Releasing is dropping. A handle can only be released once because
//! [`Handle::release`] consumes it.
//!
//! [`Observer`] is the non-owning side. Observers are counted separately, so
//! an object with many observers still reports a single owner and can be
//! destroyed when that owner goes away.

use std::fmt;
use std::ops::Deref;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

static NEXT_ID: AtomicU32 = AtomicU32::new(1);

/// Process-unique object id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectId(u32);

impl ObjectId {
    /// Allocates the next id.
    pub fn next() -> Self {
        Self(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw numeric value.
    #[inline]
    pub fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Type tag stored with every object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    /// Graph node.
    Node,
    /// Input connector.
    Plug,
    /// Output connector.
    Socket,
    /// Registered module.
    Module,
    /// Binary artifact.
    Blob,
    /// Pull request.
    Ticket,
}

impl ObjectKind {
    /// Lowercase name.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Node => "node",
            Self::Plug => "plug",
            Self::Socket => "socket",
            Self::Module => "module",
            Self::Blob => "blob",
            Self::Ticket => "ticket",
        }
    }
}

struct Inner<T> {
    id: ObjectId,
    kind: ObjectKind,
    name: Option<String>,
    observers: AtomicUsize,
    value: T,
}

/// Reference counted, immutable shared object.
pub struct Handle<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Handle<T> {
    /// Wraps `value` as a new object.
    pub fn new(kind: ObjectKind, value: T) -> Self {
        Self::build(kind, None, value)
    }

    /// Wraps `value` as a new object with a debug name.
    pub fn with_name(kind: ObjectKind, name: impl Into<String>, value: T) -> Self {
        Self::build(kind, Some(name.into()), value)
    }

    fn build(kind: ObjectKind, name: Option<String>, value: T) -> Self {
        Self {
            inner: Arc::new(Inner {
                id: ObjectId::next(),
                kind,
                name,
                observers: AtomicUsize::new(0),
                value,
            }),
        }
    }

    /// Reference copy: one more owner of the same object.
    #[inline]
    pub fn acquire(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }

    /// Gives up this owner. Returns how many owners remain.
    pub fn release(self) -> usize {
        let remaining = Arc::strong_count(&self.inner) - 1;
        drop(self);
        remaining
    }

    /// Object id.
    #[inline]
    pub fn id(&self) -> ObjectId {
        self.inner.id
    }

    /// Object kind.
    #[inline]
    pub fn object_kind(&self) -> ObjectKind {
        self.inner.kind
    }

    /// Debug name, if any.
    #[inline]
    pub fn name(&self) -> Option<&str> {
        self.inner.name.as_deref()
    }

    /// Number of owners. Observers are not included.
    #[inline]
    pub fn ref_count(&self) -> usize {
        Arc::strong_count(&self.inner)
    }

    /// Number of live observers.
    #[inline]
    pub fn observer_count(&self) -> usize {
        self.inner.observers.load(Ordering::Acquire)
    }

    /// Creates a non-owning observer.
    pub fn observe(&self) -> Observer<T> {
        self.inner.observers.fetch_add(1, Ordering::AcqRel);
        Observer {
            weak: Arc::downgrade(&self.inner),
        }
    }

    /// Returns `true` if both handles refer to the same object.
    #[inline]
    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        Arc::ptr_eq(&a.inner, &b.inner)
    }
}

impl<T: Clone> Handle<T> {
    /// Real copy: a new object with cloned contents and a fresh id.
    pub fn deep_copy(&self) -> Self {
        Self::build(self.inner.kind, self.inner.name.clone(), self.inner.value.clone())
    }
}

impl<T> Clone for Handle<T> {
    fn clone(&self) -> Self {
        self.acquire()
    }
}

impl<T> Deref for Handle<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.inner.value
    }
}

impl<T> fmt::Debug for Handle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handle")
            .field("id", &self.inner.id)
            .field("kind", &self.inner.kind)
            .field("name", &self.inner.name)
            .field("refs", &self.ref_count())
            .finish()
    }
}

/// Non-owning reference to a [`Handle`]'s object.
pub struct Observer<T> {
    weak: Weak<Inner<T>>,
}

impl<T> Observer<T> {
    /// Upgrades to an owning handle if the object is still alive.
    pub fn upgrade(&self) -> Option<Handle<T>> {
        self.weak.upgrade().map(|inner| Handle { inner })
    }

    /// Returns `true` while the observed object exists.
    #[inline]
    pub fn is_alive(&self) -> bool {
        self.weak.strong_count() > 0
    }
}

impl<T> Clone for Observer<T> {
    fn clone(&self) -> Self {
        if let Some(inner) = self.weak.upgrade() {
            inner.observers.fetch_add(1, Ordering::AcqRel);
        }
        Self {
            weak: self.weak.clone(),
        }
    }
}

impl<T> Drop for Observer<T> {
    fn drop(&mut self) {
        if let Some(inner) = self.weak.upgrade() {
            inner.observers.fetch_sub(1, Ordering::AcqRel);
        }
    }
}

impl<T> fmt::Debug for Observer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observer").field("alive", &self.is_alive()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquire_shares_identity() {
        let a = Handle::new(ObjectKind::Blob, vec![1u8, 2, 3]);
        let b = a.acquire();
        assert_eq!(a.id(), b.id());
        assert_eq!(a.ref_count(), 2);
        assert!(Handle::ptr_eq(&a, &b));
        assert_eq!(b.release(), 1);
        assert_eq!(a.ref_count(), 1);
    }

    #[test]
    fn deep_copy_is_new_object() {
        let a = Handle::with_name(ObjectKind::Blob, "lut", vec![9u8]);
        let b = a.deep_copy();
        assert_ne!(a.id(), b.id());
        assert_eq!(*a, *b);
        assert_eq!(b.name(), Some("lut"));
        assert_eq!(a.ref_count(), 1);
    }

    #[test]
    fn observers_do_not_own() {
        let a = Handle::new(ObjectKind::Module, 5u32);
        let o1 = a.observe();
        let o2 = o1.clone();
        assert_eq!(a.ref_count(), 1);
        assert_eq!(a.observer_count(), 2);
        drop(o2);
        assert_eq!(a.observer_count(), 1);

        assert_eq!(a.release(), 0);
        assert!(!o1.is_alive());
        assert!(o1.upgrade().is_none());
    }

    #[test]
    fn ids_are_unique() {
        let a = ObjectId::next();
        let b = ObjectId::next();
        assert_ne!(a, b);
    }
}
