//! Carriers: the identity of one scope activation.
//!
//! A carrier wraps the constructor arguments handed to a scope entry. Its
//! identity is the handle, never the arguments: two carriers built from equal
//! arguments are still distinct, and they key distinct cache entries.

use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

static CARRIER_ID: AtomicU64 = AtomicU64::new(0);

/// Process-wide unique handle of a carrier.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CarrierId(u64);

impl CarrierId {
    fn next() -> Self {
        CarrierId(CARRIER_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for CarrierId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

struct CarrierInner<A> {
    id: CarrierId,
    args: A,
}

/// Shared handle to the arguments of one scope activation.
///
/// Clones share identity. The cache only holds the carrier weakly, so the
/// backing instance becomes reclaimable once every clone is gone.
pub struct Carrier<A> {
    inner: Rc<CarrierInner<A>>,
}

impl<A> Carrier<A> {
    /// Mints a carrier with a fresh identity.
    pub fn new(args: A) -> Self {
        Carrier {
            inner: Rc::new(CarrierInner {
                id: CarrierId::next(),
                args,
            }),
        }
    }

    pub fn id(&self) -> CarrierId {
        self.inner.id
    }

    /// The constructor arguments this carrier was minted from.
    pub fn args(&self) -> &A {
        &self.inner.args
    }

    pub fn ptr_eq(&self, other: &Carrier<A>) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn downgrade(&self) -> WeakCarrier<A> {
        WeakCarrier {
            inner: Rc::downgrade(&self.inner),
        }
    }
}

impl<A> Clone for Carrier<A> {
    fn clone(&self) -> Self {
        Carrier {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<A> PartialEq for Carrier<A> {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl<A> Eq for Carrier<A> {}

impl<A: fmt::Debug> fmt::Debug for Carrier<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Carrier")
            .field("id", &self.inner.id)
            .field("args", &self.inner.args)
            .finish()
    }
}

/// Non-owning carrier handle held by the instance cache.
pub(crate) struct WeakCarrier<A> {
    inner: Weak<CarrierInner<A>>,
}

impl<A> WeakCarrier<A> {
    pub(crate) fn is_alive(&self) -> bool {
        self.inner.strong_count() > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_equal_args_distinct_identity() {
        let a = Carrier::new(("Peter".to_string(),));
        let b = Carrier::new(("Peter".to_string(),));
        assert_eq!(a.args(), b.args());
        assert_ne!(a, b);
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_clone_shares_identity() {
        let a = Carrier::new(1u32);
        let b = a.clone();
        assert_eq!(a, b);
        assert_eq!(a.id(), b.id());
    }

    #[test]
    fn test_ids_increase() {
        let a = Carrier::new(());
        let b = Carrier::new(());
        assert!(b.id() > a.id());
    }

    #[test]
    fn test_weak_handle_tracks_reachability() {
        let carrier = Carrier::new(7u8);
        let weak = carrier.downgrade();
        assert!(weak.is_alive());
        let clone = carrier.clone();
        drop(carrier);
        assert!(weak.is_alive());
        drop(clone);
        assert!(!weak.is_alive());
    }
}
