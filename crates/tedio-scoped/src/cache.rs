//! Instance cache keyed by carrier handle.
//!
//! Each entry holds the carrier weakly and the instance strongly. An entry
//! stays until a sweep finds its carrier unreachable; nothing else removes it.
//!
//! Construct-on-miss is not exclusive. The cache holds no borrow while the
//! constructor runs, so a constructor that re-enters the cache for the same
//! carrier builds a second instance, and the later insert wins.

use crate::carrier::{Carrier, CarrierId, WeakCarrier};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;
use tracing::debug;

/// Shared, mutable backing instance.
pub type Instance<T> = Rc<RefCell<T>>;

struct CacheEntry<A, T> {
    carrier: WeakCarrier<A>,
    instance: Instance<T>,
}

pub struct InstanceCache<A, T> {
    entries: RefCell<HashMap<CarrierId, CacheEntry<A, T>>>,
    sweep_interval: usize,
    inserts_since_sweep: Cell<usize>,
}

impl<A, T> InstanceCache<A, T> {
    /// `sweep_interval` is the number of inserts between automatic sweeps;
    /// `0` turns automatic sweeps off.
    pub fn new(sweep_interval: usize) -> Self {
        InstanceCache {
            entries: RefCell::new(HashMap::new()),
            sweep_interval,
            inserts_since_sweep: Cell::new(0),
        }
    }

    pub fn get(&self, carrier: &Carrier<A>) -> Option<Instance<T>> {
        self.entries
            .borrow()
            .get(&carrier.id())
            .map(|entry| Rc::clone(&entry.instance))
    }

    pub fn contains(&self, carrier: &Carrier<A>) -> bool {
        self.entries.borrow().contains_key(&carrier.id())
    }

    /// Returns the cached instance, building it from the carrier's arguments
    /// on a miss.
    pub fn get_or_construct<F>(&self, carrier: &Carrier<A>, ctor: F) -> Instance<T>
    where
        F: FnOnce(&A) -> T,
    {
        if let Some(instance) = self.get(carrier) {
            return instance;
        }
        let instance = Rc::new(RefCell::new(ctor(carrier.args())));
        debug!(carrier = %carrier.id(), "constructed scoped instance");
        self.insert(carrier, Rc::clone(&instance));
        instance
    }

    /// Stores `instance` for `carrier`, replacing any earlier one.
    ///
    /// A replaced instance is dropped after the table is released, so its
    /// `Drop` may use the cache again.
    pub fn insert(&self, carrier: &Carrier<A>, instance: Instance<T>) {
        let replaced = self.entries.borrow_mut().insert(
            carrier.id(),
            CacheEntry {
                carrier: carrier.downgrade(),
                instance,
            },
        );
        if let Some(replaced) = replaced {
            debug!(carrier = %carrier.id(), "construct race: replaced cached instance");
            drop(replaced);
        }

        if self.sweep_interval == 0 {
            return;
        }
        let inserts = self.inserts_since_sweep.get() + 1;
        if inserts >= self.sweep_interval {
            self.sweep();
        } else {
            self.inserts_since_sweep.set(inserts);
        }
    }

    /// Evicts entries whose carrier is no longer reachable. Returns how many
    /// were removed.
    ///
    /// Evicted instances are dropped after the table is released.
    pub fn sweep(&self) -> usize {
        self.inserts_since_sweep.set(0);
        let dead: Vec<CacheEntry<A, T>> = {
            let mut entries = self.entries.borrow_mut();
            let keys: Vec<CarrierId> = entries
                .iter()
                .filter(|(_, entry)| !entry.carrier.is_alive())
                .map(|(id, _)| *id)
                .collect();
            keys.iter().filter_map(|id| entries.remove(id)).collect()
        };
        let evicted = dead.len();
        if evicted > 0 {
            debug!(evicted, "swept unreachable scoped instances");
        }
        drop(dead);
        evicted
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }
}

impl<A, T> fmt::Debug for InstanceCache<A, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstanceCache")
            .field("len", &self.len())
            .field("sweep_interval", &self.sweep_interval)
            .finish()
    }
}
