//!
//! # Identity-Shared Pointer Types
//!

// Std-lib
use std::hash::{Hash, Hasher};
use std::ops::Deref;
use std::sync::Arc;

// Crates.io
use by_address::ByAddress;

///
/// # Shared
///
/// Immutable, thread-safe, reference-counted pointer, compared and hashed *by address*.
///
/// Used for objects whose *identity* is what matters, rather than their value.
/// Generator functions are the prime example: two generators are the same generator
/// only if they are the same object, regardless of any notion of equality between their contents.
/// Clones of a [Shared] point to the same object, and compare equal to one another.
///
/// Attribute access is forwarded through [Deref] to the underlying `T`.
/// Unlike a lockable pointer, the content of a [Shared] is never mutated after creation.
///
#[derive(Debug, Default)]
pub struct Shared<T>(ByAddress<Arc<T>>);

impl<T> Shared<T> {
    /// Pointer Constructor
    pub fn new(t: T) -> Self {
        Self(ByAddress(Arc::new(t)))
    }
    /// Address of the pointed-to object, as an opaque integer.
    /// Stable for the lifetime of the object and shared by all clones.
    pub fn addr(&self) -> usize {
        Arc::as_ptr(&self.0) as usize
    }
}
impl<T> From<T> for Shared<T> {
    fn from(t: T) -> Self {
        Self::new(t)
    }
}
impl<T> Deref for Shared<T> {
    type Target = T;
    fn deref(&self) -> &T {
        &self.0
    }
}
// As with a [Deref]-forwarding pointer generally, the derived versions of these
// would compare and hash content, not address. So they are written out.
impl<T> Clone for Shared<T> {
    fn clone(&self) -> Self {
        Self(ByAddress::clone(&self.0))
    }
}
impl<T> PartialEq for Shared<T> {
    fn eq(&self, other: &Self) -> bool {
        self.0.eq(&other.0)
    }
}
impl<T> Eq for Shared<T> {}
impl<T> Hash for Shared<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.hash(state)
    }
}
