//! Continuation store: the ambient carrier of the running logical task.
//!
//! The store is a single slot per activator. Synchronous code enters a
//! carrier with [`ContinuationStore::enter`] and the returned guard puts the
//! previous carrier back. Asynchronous code wraps its future in
//! [`InContext`], which re-enters the carrier around every poll, so each
//! continuation of the future sees it while interleaved tasks see their own.

use crate::carrier::Carrier;
use pin_project::pin_project;
use std::borrow::Cow;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll};
use tracing::trace;

struct Slot<A> {
    label: Cow<'static, str>,
    ambient: RefCell<Option<Carrier<A>>>,
    depth: Cell<usize>,
}

/// Cloneable handle to one ambient slot.
pub struct ContinuationStore<A> {
    slot: Rc<Slot<A>>,
}

impl<A> ContinuationStore<A> {
    pub fn new(label: impl Into<Cow<'static, str>>) -> Self {
        ContinuationStore {
            slot: Rc::new(Slot {
                label: label.into(),
                ambient: RefCell::new(None),
                depth: Cell::new(0),
            }),
        }
    }

    pub fn label(&self) -> &str {
        &self.slot.label
    }

    /// The carrier in effect right now, if any.
    pub fn current(&self) -> Option<Carrier<A>> {
        self.slot.ambient.borrow().clone()
    }

    pub fn has_context(&self) -> bool {
        self.slot.ambient.borrow().is_some()
    }

    /// Number of enter guards currently alive.
    pub fn depth(&self) -> usize {
        self.slot.depth.get()
    }

    /// Makes `carrier` ambient until the guard is dropped.
    ///
    /// `None` detaches: the caller's carrier is hidden until the guard drops.
    pub fn enter(&self, carrier: Option<Carrier<A>>) -> EnterGuard<'_, A> {
        let depth = self.slot.depth.get() + 1;
        self.slot.depth.set(depth);
        trace!(
            label = %self.slot.label,
            carrier = ?carrier.as_ref().map(Carrier::id),
            depth,
            "enter context"
        );
        let previous = self.slot.ambient.replace(carrier);
        EnterGuard {
            store: self,
            previous,
        }
    }

    /// Binds `fut` to `carrier` for every poll.
    pub fn scope<F: Future>(&self, carrier: Option<Carrier<A>>, fut: F) -> InContext<A, F> {
        InContext::new(self.clone(), carrier, fut)
    }

    pub fn ptr_eq(&self, other: &ContinuationStore<A>) -> bool {
        Rc::ptr_eq(&self.slot, &other.slot)
    }
}

impl<A> Clone for ContinuationStore<A> {
    fn clone(&self) -> Self {
        ContinuationStore {
            slot: Rc::clone(&self.slot),
        }
    }
}

impl<A> fmt::Debug for ContinuationStore<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContinuationStore")
            .field("label", &self.slot.label)
            .field("current", &self.slot.ambient.borrow().as_ref().map(Carrier::id))
            .field("depth", &self.slot.depth.get())
            .finish()
    }
}

/// Restores the previous ambient carrier on drop, unwinding included.
#[must_use = "the carrier is only ambient while the guard is alive"]
pub struct EnterGuard<'a, A> {
    store: &'a ContinuationStore<A>,
    previous: Option<Carrier<A>>,
}

impl<A> Drop for EnterGuard<'_, A> {
    fn drop(&mut self) {
        let slot = &self.store.slot;
        let previous = self.previous.take();
        let left = slot.ambient.replace(previous);
        slot.depth.set(slot.depth.get().saturating_sub(1));
        trace!(
            label = %slot.label,
            carrier = ?left.as_ref().map(Carrier::id),
            depth = slot.depth.get(),
            "exit context"
        );
    }
}

/// A future whose every poll runs with a fixed ambient carrier.
#[pin_project]
#[must_use = "futures do nothing unless you `.await` or poll them"]
pub struct InContext<A, F> {
    #[pin]
    fut: F,
    store: ContinuationStore<A>,
    carrier: Option<Carrier<A>>,
}

impl<A, F> InContext<A, F> {
    pub fn new(store: ContinuationStore<A>, carrier: Option<Carrier<A>>, fut: F) -> Self {
        InContext {
            fut,
            store,
            carrier,
        }
    }

    pub fn carrier(&self) -> Option<&Carrier<A>> {
        self.carrier.as_ref()
    }
}

impl<A, F: Future> Future for InContext<A, F> {
    type Output = F::Output;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();
        let _guard = this.store.enter(this.carrier.clone());
        this.fut.poll(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::yield_now;
    use futures::executor::block_on;

    fn current_args(store: &ContinuationStore<&'static str>) -> Option<&'static str> {
        store.current().map(|carrier| *carrier.args())
    }

    #[test]
    fn test_enter_and_restore() {
        let store = ContinuationStore::new("test");
        assert!(!store.has_context());
        {
            let _outer = store.enter(Some(Carrier::new("outer")));
            assert_eq!(current_args(&store), Some("outer"));
            {
                let _inner = store.enter(Some(Carrier::new("inner")));
                assert_eq!(current_args(&store), Some("inner"));
                assert_eq!(store.depth(), 2);
            }
            assert_eq!(current_args(&store), Some("outer"));
        }
        assert!(!store.has_context());
        assert_eq!(store.depth(), 0);
    }

    #[test]
    fn test_detach_hides_outer() {
        let store = ContinuationStore::new("test");
        let _outer = store.enter(Some(Carrier::new("outer")));
        {
            let _detached = store.enter(None);
            assert!(!store.has_context());
        }
        assert!(store.has_context());
    }

    #[test]
    fn test_restore_on_panic() {
        let store = ContinuationStore::new("test");
        let cloned = store.clone();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _guard = cloned.enter(Some(Carrier::new("doomed")));
            panic!("constructor failed");
        }));
        assert!(result.is_err());
        assert!(!store.has_context());
    }

    #[test]
    fn test_in_context_follows_continuations() {
        let store = ContinuationStore::new("test");
        let seen = block_on(store.scope(Some(Carrier::new("task")), {
            let store = store.clone();
            async move {
                let before = current_args(&store);
                yield_now().await;
                let after = current_args(&store);
                (before, after)
            }
        }));
        assert_eq!(seen, (Some("task"), Some("task")));
        assert!(!store.has_context());
    }

    #[test]
    fn test_interleaved_tasks_are_isolated() {
        let store = ContinuationStore::new("test");
        let task = |name: &'static str| {
            let inner = store.clone();
            store.scope(Some(Carrier::new(name)), async move {
                let mut seen = Vec::new();
                for _ in 0..3 {
                    seen.push(current_args(&inner));
                    yield_now().await;
                }
                seen
            })
        };
        let (a, b) = block_on(async { futures::join!(task("a"), task("b")) });
        assert_eq!(a, vec![Some("a"); 3]);
        assert_eq!(b, vec![Some("b"); 3]);
    }
}
