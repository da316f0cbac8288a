//! Scope activator: entry points that mint carriers and make them ambient.

use crate::cache::{Instance, InstanceCache};
use crate::carrier::Carrier;
use crate::facade::Facade;
use crate::iter::{ContextIter, Generator, IterGenerator};
use crate::store::{ContinuationStore, InContext};
use crate::stream::{AsyncGenerator, ContextAsyncIter, StreamGenerator};
use futures::Stream;
use std::borrow::Cow;
use std::fmt;
use std::future::Future;
use std::ops::Deref;
use std::rc::Rc;
use tracing::debug;

const DEFAULT_SWEEP_INTERVAL: usize = 64;

/// A type that can be built from the arguments of a scope entry.
pub trait ScopedClass: Sized {
    type Args;

    fn construct(args: &Self::Args) -> Self;
}

/// Activator for a [`ScopedClass`].
pub fn scoped<T>() -> Activator<T, T::Args>
where
    T: ScopedClass + 'static,
    T::Args: 'static,
{
    scoped_builder::<T>().build()
}

/// Builder for a [`ScopedClass`] activator.
pub fn scoped_builder<T>() -> ActivatorBuilder<T, T::Args>
where
    T: ScopedClass + 'static,
    T::Args: 'static,
{
    Activator::builder(T::construct)
}

/// Settings of an activator, fixed at build time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivatorConfig {
    /// Name attached to every log event of the activator.
    pub label: Cow<'static, str>,
    /// Construct the instance when a scope is entered instead of on first touch.
    ///
    /// Off by default, so [`Activator::run_in_context`] and
    /// [`Activator::scope`] build nothing until a façade member is touched.
    /// The iterator adapters ignore this flag and always build the instance
    /// when they are created, so that it exists before their first step.
    /// Turn it on to get the same pre-populated entry on the plain path.
    pub eager: bool,
    /// Inserts between automatic cache sweeps, `0` for none.
    pub sweep_interval: usize,
}

pub struct ActivatorBuilder<T, A> {
    config: ActivatorConfig,
    ctor: Box<dyn Fn(&A) -> T>,
}

impl<T, A> ActivatorBuilder<T, A> {
    pub fn label(mut self, label: impl Into<Cow<'static, str>>) -> Self {
        self.config.label = label.into();
        self
    }

    pub fn eager(mut self, eager: bool) -> Self {
        self.config.eager = eager;
        self
    }

    pub fn sweep_interval(mut self, interval: usize) -> Self {
        self.config.sweep_interval = interval;
        self
    }

    pub fn build(self) -> Activator<T, A> {
        let ActivatorBuilder { config, ctor } = self;
        let shared = Shared {
            store: ContinuationStore::new(config.label.clone()),
            cache: InstanceCache::new(config.sweep_interval),
            ctor,
            config,
        };
        Activator {
            facade: Facade {
                shared: Rc::new(shared),
            },
        }
    }
}

pub(crate) struct Shared<T, A> {
    pub(crate) config: ActivatorConfig,
    pub(crate) store: ContinuationStore<A>,
    pub(crate) cache: InstanceCache<A, T>,
    ctor: Box<dyn Fn(&A) -> T>,
}

impl<T, A> Shared<T, A> {
    pub(crate) fn construct(&self, carrier: &Carrier<A>) -> Instance<T> {
        self.cache.get_or_construct(carrier, |args| (self.ctor)(args))
    }
}

/// Binds lazily built instances of `T` to the running logical task.
///
/// Cloning is cheap and every clone shares the same store, cache and
/// façade. The activator derefs to its [`Facade`], so members of the current
/// instance are reached directly through it.
///
/// Everything here is `!Send`: one activator serves the tasks of one thread,
/// typically from a `thread_local!`.
pub struct Activator<T, A> {
    facade: Facade<T, A>,
}

impl<T: 'static, A: 'static> Activator<T, A> {
    pub fn new(ctor: impl Fn(&A) -> T + 'static) -> Self {
        Self::builder(ctor).build()
    }

    pub fn builder(ctor: impl Fn(&A) -> T + 'static) -> ActivatorBuilder<T, A> {
        ActivatorBuilder {
            config: ActivatorConfig {
                label: Cow::Borrowed(std::any::type_name::<T>()),
                eager: false,
                sweep_interval: DEFAULT_SWEEP_INTERVAL,
            },
            ctor: Box::new(ctor),
        }
    }
}

impl<T, A> Activator<T, A> {
    fn shared(&self) -> &Shared<T, A> {
        &self.facade.shared
    }

    /// The façade; the same object on every call and for every clone.
    pub fn facade(&self) -> &Facade<T, A> {
        &self.facade
    }

    pub fn config(&self) -> &ActivatorConfig {
        &self.shared().config
    }

    pub fn store(&self) -> &ContinuationStore<A> {
        &self.shared().store
    }

    /// Mints a carrier without entering it.
    pub fn carrier(&self, args: A) -> Carrier<A> {
        Carrier::new(args)
    }

    pub fn has_context(&self) -> bool {
        self.shared().store.has_context()
    }

    /// The carrier ambient right now, for handing to another task.
    pub fn current_carrier(&self) -> Option<Carrier<A>> {
        self.shared().store.current()
    }

    /// Runs `f` with a fresh carrier built from `args` ambient.
    pub fn run_in_context<R>(&self, f: impl FnOnce() -> R, args: A) -> R {
        self.run_with_carrier(&Carrier::new(args), f)
    }

    /// Runs `f` with an existing carrier ambient.
    pub fn run_with_carrier<R>(&self, carrier: &Carrier<A>, f: impl FnOnce() -> R) -> R {
        let _guard = self.shared().store.enter(Some(carrier.clone()));
        if self.shared().config.eager {
            self.shared().construct(carrier);
        }
        f()
    }

    /// Async form of [`Activator::run_in_context`]: `fut` and all of its
    /// continuations see a fresh carrier built from `args`.
    pub fn scope<F: Future>(&self, fut: F, args: A) -> InContext<A, F> {
        self.scope_with_carrier(fut, Carrier::new(args))
    }

    pub fn scope_with_carrier<F: Future>(&self, fut: F, carrier: Carrier<A>) -> InContext<A, F> {
        if self.shared().config.eager {
            self.materialize(&carrier);
        }
        self.shared().store.scope(Some(carrier), fut)
    }

    /// Binds `fut` to the caller's ambient carrier, or to none.
    ///
    /// Futures handed to a spawner do not see the spawning task's carrier
    /// unless they are wrapped here first.
    pub fn inherit<F: Future>(&self, fut: F) -> InContext<A, F> {
        self.shared().store.scope(self.current_carrier(), fut)
    }

    /// Runs `f` with no ambient carrier; the caller's is restored afterwards.
    pub fn run_out_of_context<R>(&self, f: impl FnOnce() -> R) -> R {
        let _guard = self.shared().store.enter(None);
        f()
    }

    /// Async form of [`Activator::run_out_of_context`].
    pub fn detach<F: Future>(&self, fut: F) -> InContext<A, F> {
        self.shared().store.scope(None, fut)
    }

    /// Wraps a generator so every step runs in a carrier built from `args`.
    /// The instance is constructed right away.
    pub fn run_iterator<G: Generator>(&self, generator: G, args: A) -> ContextIter<G, A> {
        let carrier = Carrier::new(args);
        self.materialize(&carrier);
        ContextIter::new(generator, self.shared().store.clone(), carrier)
    }

    pub fn run_iter<I: IntoIterator>(
        &self,
        iter: I,
        args: A,
    ) -> ContextIter<IterGenerator<I::IntoIter>, A> {
        self.run_iterator(IterGenerator::new(iter.into_iter()), args)
    }

    /// Async counterpart of [`Activator::run_iterator`].
    pub fn run_async_iterator<G: AsyncGenerator>(
        &self,
        generator: G,
        args: A,
    ) -> ContextAsyncIter<G, A> {
        let carrier = Carrier::new(args);
        self.materialize(&carrier);
        ContextAsyncIter::new(generator, self.shared().store.clone(), carrier)
    }

    pub fn run_stream<S: Stream + Unpin>(
        &self,
        stream: S,
        args: A,
    ) -> ContextAsyncIter<StreamGenerator<S>, A> {
        self.run_async_iterator(StreamGenerator::new(stream), args)
    }

    /// Number of entries in the instance cache, reclaimable ones included.
    pub fn cached_instances(&self) -> usize {
        self.shared().cache.len()
    }

    /// Drops instances whose carrier is gone. Returns how many were dropped.
    pub fn sweep(&self) -> usize {
        self.shared().cache.sweep()
    }

    fn materialize(&self, carrier: &Carrier<A>) {
        let shared = self.shared();
        let _guard = shared.store.enter(Some(carrier.clone()));
        shared.construct(carrier);
        debug!(label = %shared.config.label, carrier = %carrier.id(), "materialized eagerly");
    }
}

impl<T, A> Clone for Activator<T, A> {
    fn clone(&self) -> Self {
        Activator {
            facade: self.facade.clone(),
        }
    }
}

impl<T, A> Deref for Activator<T, A> {
    type Target = Facade<T, A>;

    fn deref(&self) -> &Self::Target {
        &self.facade
    }
}

impl<T, A> fmt::Debug for Activator<T, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Activator")
            .field("config", self.config())
            .field("cached", &self.cached_instances())
            .finish()
    }
}
