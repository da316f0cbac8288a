//! The façade: resolves the current instance on every access.

use crate::activator::Shared;
use crate::cache::Instance;
use crate::error::{Result, ScopeError};
use std::fmt;
use std::rc::Rc;

/// Stand-in for "the instance of the current scope".
///
/// A façade holds no instance of its own. Each access reads the ambient
/// carrier, builds the backing instance on first touch, and forwards to it.
/// Outside of any scope every access fails with
/// [`ScopeError::MissingContext`] and nothing is constructed.
///
/// All façades of one activator are the same object (see [`Facade::ptr_eq`]).
///
/// # Panics
///
/// Accessors borrow the backing `RefCell`; calling [`Facade::with_mut`] while
/// another access to the same instance is in progress panics. The checked
/// [`Facade::try_with`] and [`Facade::try_with_mut`] report
/// [`ScopeError::AlreadyBorrowed`] instead.
pub struct Facade<T, A> {
    pub(crate) shared: Rc<Shared<T, A>>,
}

impl<T, A> Facade<T, A> {
    /// The backing instance of the ambient carrier.
    pub fn resolve(&self) -> Result<Instance<T>> {
        let carrier = self
            .shared
            .store
            .current()
            .ok_or(ScopeError::MissingContext)?;
        Ok(self.shared.construct(&carrier))
    }

    /// Forwards a read.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> Result<R> {
        let instance = self.resolve()?;
        let value = f(&instance.borrow());
        Ok(value)
    }

    /// Forwards a write.
    pub fn with_mut<R>(&self, f: impl FnOnce(&mut T) -> R) -> Result<R> {
        let instance = self.resolve()?;
        let value = f(&mut instance.borrow_mut());
        Ok(value)
    }

    /// Like [`Facade::with`], failing instead of panicking when the instance
    /// is mutably borrowed further up the stack.
    pub fn try_with<R>(&self, f: impl FnOnce(&T) -> R) -> Result<R> {
        let instance = self.resolve()?;
        let value = instance
            .try_borrow()
            .map_err(|_| ScopeError::AlreadyBorrowed)?;
        Ok(f(&value))
    }

    /// Like [`Facade::with_mut`], failing instead of panicking when the
    /// instance is borrowed further up the stack.
    pub fn try_with_mut<R>(&self, f: impl FnOnce(&mut T) -> R) -> Result<R> {
        let instance = self.resolve()?;
        let mut value = instance
            .try_borrow_mut()
            .map_err(|_| ScopeError::AlreadyBorrowed)?;
        Ok(f(&mut value))
    }

    /// Overwrites the backing instance, returning the old value.
    pub fn replace(&self, value: T) -> Result<T> {
        let instance = self.resolve()?;
        let old = instance.replace(value);
        Ok(old)
    }

    /// Whether the ambient carrier already has a backing instance.
    pub fn is_constructed(&self) -> Result<bool> {
        let carrier = self
            .shared
            .store
            .current()
            .ok_or(ScopeError::MissingContext)?;
        Ok(self.shared.cache.contains(&carrier))
    }

    /// Disposal hook. Never resolves and never fails.
    pub fn dispose(&self) {}

    pub fn ptr_eq(&self, other: &Facade<T, A>) -> bool {
        Rc::ptr_eq(&self.shared, &other.shared)
    }
}

impl<T, A> Clone for Facade<T, A> {
    fn clone(&self) -> Self {
        Facade {
            shared: Rc::clone(&self.shared),
        }
    }
}

impl<T, A> fmt::Debug for Facade<T, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Facade")
            .field("label", &self.shared.config.label)
            .field("store", &self.shared.store)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use crate::Activator;
    use crate::error::ScopeError;
    use std::panic::{self, AssertUnwindSafe};

    struct Counter {
        start: u32,
        hits: u32,
    }

    fn activator() -> Activator<Counter, u32> {
        Activator::new(|start: &u32| Counter {
            start: *start,
            hits: 0,
        })
    }

    #[test]
    fn test_missing_context_constructs_nothing() {
        let counter = activator();
        assert_eq!(counter.with(|c| c.hits), Err(ScopeError::MissingContext));
        assert_eq!(counter.is_constructed(), Err(ScopeError::MissingContext));
        assert_eq!(counter.cached_instances(), 0);
    }

    #[test]
    fn test_lazy_construction_on_first_touch() {
        let counter = activator();
        counter.run_in_context(
            || {
                assert_eq!(counter.is_constructed(), Ok(false));
                assert_eq!(counter.with(|c| c.start), Ok(5));
                assert_eq!(counter.is_constructed(), Ok(true));
            },
            5,
        );
    }

    #[test]
    fn test_writes_reach_the_same_instance() {
        let counter = activator();
        let hits = counter.run_in_context(
            || {
                for _ in 0..3 {
                    counter.with_mut(|c| c.hits += 1).unwrap();
                }
                counter.with(|c| c.hits).unwrap()
            },
            0,
        );
        assert_eq!(hits, 3);
    }

    #[test]
    fn test_replace_swaps_backing_value() {
        let counter = activator();
        counter.run_in_context(
            || {
                let old = counter.replace(Counter { start: 9, hits: 9 }).unwrap();
                assert_eq!(old.start, 1);
                assert_eq!(counter.with(|c| (c.start, c.hits)), Ok((9, 9)));
            },
            1,
        );
    }

    #[test]
    fn test_dispose_is_inert() {
        let counter = activator();
        counter.dispose();
        counter.run_in_context(
            || {
                counter.dispose();
                assert_eq!(counter.is_constructed(), Ok(false));
            },
            1,
        );
    }

    #[test]
    fn test_facade_is_shared() {
        let counter = activator();
        let other = counter.clone();
        assert!(counter.facade().ptr_eq(other.facade()));
        assert!(counter.facade().ptr_eq(&counter.facade().clone()));
    }

    #[test]
    fn test_reentrant_write_reports_borrow() {
        let counter = activator();
        let nested = counter.run_in_context(
            || {
                counter
                    .with(|_| counter.try_with_mut(|c| c.hits += 1))
                    .unwrap()
            },
            1,
        );
        assert_eq!(nested, Err(ScopeError::AlreadyBorrowed));

        counter.run_in_context(
            || {
                let read = counter.with_mut(|_| counter.try_with(|c| c.start)).unwrap();
                assert_eq!(read, Err(ScopeError::AlreadyBorrowed));
                assert_eq!(counter.try_with(|c| c.start), Ok(2));
                assert_eq!(counter.try_with_mut(|c| c.hits += 1), Ok(()));
            },
            2,
        );
    }

    #[test]
    fn test_constructor_panic_escapes_unchanged() {
        let failing = Activator::new(|user: &&'static str| -> Counter {
            panic!("no account for {user}")
        });
        let payload = panic::catch_unwind(AssertUnwindSafe(|| {
            failing.run_in_context(|| failing.with(|c| c.hits), "mallory")
        }))
        .unwrap_err();

        let message = payload
            .downcast_ref::<String>()
            .map(String::as_str)
            .unwrap_or_default();
        assert_eq!(message, "no account for mallory");
        assert!(!failing.has_context());
        assert_eq!(failing.cached_instances(), 0);
        assert_eq!(failing.with(|c| c.hits), Err(ScopeError::MissingContext));
    }
}
