//! Asynchronous iterator adapter.
//!
//! The async mirror of [`crate::iter`]. Each step future is wrapped in
//! [`InContext`](crate::store::InContext), so the captured carrier is
//! ambient on every poll of the step and on none of the caller's own polls.

use crate::carrier::Carrier;
use crate::error::{ScopeError, StepError};
use crate::iter::AdapterState;
use crate::store::ContinuationStore;
use futures::stream::{self, Stream, StreamExt};
use std::convert::Infallible;
use std::fmt;
use tracing::{debug, trace};

/// A resumable asynchronous producer of values.
///
/// Same contract as [`Generator`](crate::iter::Generator), with every step
/// being a future.
#[allow(async_fn_in_trait)]
pub trait AsyncGenerator {
    type Yield;
    type Error;

    async fn resume(&mut self) -> Result<Option<Self::Yield>, Self::Error>;

    async fn early_return(&mut self) -> Option<Result<Option<Self::Yield>, Self::Error>> {
        None
    }

    async fn throw(
        &mut self,
        error: Self::Error,
    ) -> Option<Result<Option<Self::Yield>, Self::Error>> {
        let _ = error;
        None
    }
}

/// Any [`Stream`] as an [`AsyncGenerator`] without the optional capabilities.
#[derive(Debug)]
pub struct StreamGenerator<S> {
    stream: S,
}

impl<S: Stream + Unpin> StreamGenerator<S> {
    pub fn new(stream: S) -> Self {
        StreamGenerator { stream }
    }
}

impl<S: Stream + Unpin> AsyncGenerator for StreamGenerator<S> {
    type Yield = S::Item;
    type Error = Infallible;

    async fn resume(&mut self) -> Result<Option<S::Item>, Infallible> {
        Ok(self.stream.next().await)
    }
}

/// Runs every step of an [`AsyncGenerator`] inside a captured carrier.
pub struct ContextAsyncIter<G, A> {
    inner: Option<G>,
    store: ContinuationStore<A>,
    carrier: Carrier<A>,
}

impl<G, A> ContextAsyncIter<G, A> {
    pub fn new(inner: G, store: ContinuationStore<A>, carrier: Carrier<A>) -> Self {
        ContextAsyncIter {
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

    fn close(&mut self) {
        if let Some(inner) = self.inner.take() {
            let _guard = self.store.enter(Some(self.carrier.clone()));
            drop(inner);
            debug!(label = self.store.label(), carrier = %self.carrier.id(), "async iterator closed");
        }
    }
}

impl<G: AsyncGenerator, A> ContextAsyncIter<G, A> {
    pub async fn resume(&mut self) -> Result<Option<G::Yield>, G::Error> {
        let Some(inner) = self.inner.as_mut() else {
            return Ok(None);
        };
        trace!(label = self.store.label(), carrier = %self.carrier.id(), "async iterator resume");
        let result = self
            .store
            .scope(Some(self.carrier.clone()), inner.resume())
            .await;
        if !matches!(result, Ok(Some(_))) {
            self.close();
        }
        result
    }

    /// Finishes the producer early. Without that capability this is an
    /// immediate `Ok(None)`.
    pub async fn early_return(&mut self) -> Result<Option<G::Yield>, G::Error> {
        let result = match self.inner.as_mut() {
            Some(inner) => {
                trace!(label = self.store.label(), carrier = %self.carrier.id(), "async iterator return");
                self.store
                    .scope(Some(self.carrier.clone()), inner.early_return())
                    .await
                    .unwrap_or(Ok(None))
            }
            None => Ok(None),
        };
        self.close();
        result
    }

    /// Raises `error` inside the producer; see [`ContextIter::throw`](crate::iter::ContextIter::throw).
    pub async fn throw(
        &mut self,
        error: G::Error,
    ) -> Result<Option<G::Yield>, StepError<G::Error>> {
        let Some(inner) = self.inner.as_mut() else {
            return Ok(None);
        };
        trace!(label = self.store.label(), carrier = %self.carrier.id(), "async iterator throw");
        let outcome = self
            .store
            .scope(Some(self.carrier.clone()), inner.throw(error))
            .await;
        match outcome {
            None => Err(ScopeError::ThrowUnsupported.into()),
            Some(Ok(Some(value))) => Ok(Some(value)),
            Some(result) => {
                self.close();
                result.map_err(StepError::Producer)
            }
        }
    }

    /// The adapter as a stream of step results. The stream ends after the
    /// first error.
    pub fn into_stream(self) -> impl Stream<Item = Result<G::Yield, G::Error>> {
        stream::unfold(self, |mut adapter| async move {
            match adapter.resume().await {
                Ok(Some(value)) => Some((Ok(value), adapter)),
                Ok(None) => None,
                Err(error) => Some((Err(error), adapter)),
            }
        })
    }
}

impl<G, A> ContextAsyncIter<G, A>
where
    G: AsyncGenerator<Error = Infallible>,
{
    pub fn into_values(self) -> impl Stream<Item = G::Yield> {
        self.into_stream().map(|item| match item {
            Ok(value) => value,
            Err(never) => match never {},
        })
    }
}

impl<G, A> Drop for ContextAsyncIter<G, A> {
    fn drop(&mut self) {
        self.close();
    }
}

impl<G, A> fmt::Debug for ContextAsyncIter<G, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextAsyncIter")
            .field("carrier", &self.carrier.id())
            .field("state", &self.state())
            .finish()
    }
}
