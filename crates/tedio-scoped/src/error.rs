//! Error types for scoped instances.

use thiserror::Error;

/// Result alias used across the crate.
pub type Result<T, E = ScopeError> = std::result::Result<T, E>;

/// Errors raised by the scope machinery itself.
///
/// Errors from user constructors and from wrapped producers are never
/// converted into this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ScopeError {
    /// A façade member was touched with no ambient carrier.
    #[error("tedio-scoped: scoped instance not running in context")]
    MissingContext,

    /// `throw` was called on an adapter whose producer cannot accept errors.
    #[error("tedio-scoped: error injection is not supported by the wrapped producer")]
    ThrowUnsupported,

    /// A checked façade access found the instance borrowed by an access
    /// that is still running.
    #[error("tedio-scoped: scoped instance is already borrowed")]
    AlreadyBorrowed,
}

/// Error returned by adapter steps that may fail either in the producer or
/// in the adapter.
#[derive(Debug, Error)]
pub enum StepError<E> {
    /// The wrapped producer failed; the error is passed through as is.
    #[error("{0}")]
    Producer(E),

    #[error(transparent)]
    Scope(#[from] ScopeError),
}

impl<E> StepError<E> {
    /// Returns the producer error, if this is one.
    pub fn into_producer(self) -> Option<E> {
        match self {
            StepError::Producer(error) => Some(error),
            StepError::Scope(_) => None,
        }
    }

    pub fn is_unsupported(&self) -> bool {
        matches!(self, StepError::Scope(ScopeError::ThrowUnsupported))
    }
}
