//! Synchronous iterator adapter.
//!
//! A producer is often driven step by step from code that runs in some other
//! scope, or in none. [`ContextIter`] re-enters the carrier it captured
//! around each step and around the final drop of the producer. Between steps
//! the caller's own carrier is in effect.

use crate::carrier::Carrier;
use crate::error::{ScopeError, StepError};
use crate::store::ContinuationStore;
use std::convert::Infallible;
use std::fmt;
use std::iter::FusedIterator;
use tracing::{debug, trace};

/// A resumable producer of values.
///
/// `Ok(None)` from a step means the producer is finished. The optional
/// capabilities return `None` when the producer does not support them.
pub trait Generator {
    type Yield;
    type Error;

    fn resume(&mut self) -> Result<Option<Self::Yield>, Self::Error>;

    /// Asks the producer to finish early; it may still hand out a last value.
    fn early_return(&mut self) -> Option<Result<Option<Self::Yield>, Self::Error>> {
        None
    }

    /// Raises `error` at the producer's suspension point.
    fn throw(&mut self, error: Self::Error) -> Option<Result<Option<Self::Yield>, Self::Error>> {
        let _ = error;
        None
    }
}

/// Any [`Iterator`] as a [`Generator`] without the optional capabilities.
#[derive(Debug, Clone)]
pub struct IterGenerator<I> {
    iter: I,
}

impl<I: Iterator> IterGenerator<I> {
    pub fn new(iter: I) -> Self {
        IterGenerator { iter }
    }
}

impl<I: Iterator> Generator for IterGenerator<I> {
    type Yield = I::Item;
    type Error = Infallible;

    fn resume(&mut self) -> Result<Option<I::Item>, Infallible> {
        Ok(self.iter.next())
    }
}

/// Lifecycle of an adapter. `Closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdapterState {
    Active,
    Closed,
}

/// Runs every step of a [`Generator`] inside a captured carrier.
///
/// Once a step finishes the producer (a `None`, an error, or an early
/// return), the adapter is closed: the producer is dropped inside the
/// carrier and every later step reports `Ok(None)`.
pub struct ContextIter<G, A> {
    inner: Option<G>,
    store: ContinuationStore<A>,
    carrier: Carrier<A>,
}

impl<G, A> ContextIter<G, A> {
    pub fn new(inner: G, store: ContinuationStore<A>, carrier: Carrier<A>) -> Self {
        ContextIter {
            inner: Some(inner),
            store,
            carrier,
        }
    }

    pub fn state(&self) -> AdapterState {
        if self.inner.is_some() {
            AdapterState::Active
        } else {
            AdapterState::Closed
        }
    }

    pub fn carrier(&self) -> &Carrier<A> {
        &self.carrier
    }

    fn step<R>(&mut self, op: &'static str, f: impl FnOnce(&mut G) -> R) -> Option<R> {
        let inner = self.inner.as_mut()?;
        let _guard = self.store.enter(Some(self.carrier.clone()));
        trace!(label = self.store.label(), carrier = %self.carrier.id(), op, "iterator step");
        Some(f(inner))
    }

    /// Drops the producer inside the carrier.
    fn close(&mut self) {
        if let Some(inner) = self.inner.take() {
            let _guard = self.store.enter(Some(self.carrier.clone()));
            drop(inner);
            debug!(label = self.store.label(), carrier = %self.carrier.id(), "iterator closed");
        }
    }
}

impl<G: Generator, A> ContextIter<G, A> {
    /// Advances the producer.
    pub fn resume(&mut self) -> Result<Option<G::Yield>, G::Error> {
        let Some(result) = self.step("resume", G::resume) else {
            return Ok(None);
        };
        if !matches!(result, Ok(Some(_))) {
            self.close();
        }
        result
    }

    /// Finishes the producer early. Without that capability this is an
    /// immediate `Ok(None)`.
    pub fn early_return(&mut self) -> Result<Option<G::Yield>, G::Error> {
        let result = self
            .step("return", G::early_return)
            .flatten()
            .unwrap_or(Ok(None));
        self.close();
        result
    }

    /// Raises `error` inside the producer.
    ///
    /// Fails with [`ScopeError::ThrowUnsupported`] when the producer cannot
    /// accept errors; the adapter stays active in that case.
    pub fn throw(&mut self, error: G::Error) -> Result<Option<G::Yield>, StepError<G::Error>> {
        match self.step("throw", |inner| inner.throw(error)) {
            None => Ok(None),
            Some(None) => Err(ScopeError::ThrowUnsupported.into()),
            Some(Some(Ok(Some(value)))) => Ok(Some(value)),
            Some(Some(result)) => {
                self.close();
                result.map_err(StepError::Producer)
            }
        }
    }
}

impl<G, A> Drop for ContextIter<G, A> {
    fn drop(&mut self) {
        self.close();
    }
}

impl<G, A> Iterator for ContextIter<G, A>
where
    G: Generator<Error = Infallible>,
{
    type Item = G::Yield;

    fn next(&mut self) -> Option<G::Yield> {
        match self.resume() {
            Ok(item) => item,
            Err(never) => match never {},
        }
    }
}

impl<G, A> FusedIterator for ContextIter<G, A> where G: Generator<Error = Infallible> {}

impl<G, A> fmt::Debug for ContextIter<G, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextIter")
            .field("carrier", &self.carrier.id())
            .field("state", &self.state())
            .finish()
    }
}
