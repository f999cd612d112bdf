//! Errors surfaced by a protected call.

use thiserror::Error;

/// Outcome of a call that did not succeed.
///
/// `Open` and `Timeout` are produced by the breaker itself; `Operation`
/// carries the wrapped operation's own error unchanged.
#[derive(Debug, Error)]
pub enum CallError<E> {
    /// The breaker rejected the call; the operation never ran.
    #[error("breaker open")]
    Open,

    /// The operation exceeded its allotted time. It may still be running.
    #[error("breaker timeout")]
    Timeout,

    /// The operation ran and failed.
    #[error("{0}")]
    Operation(#[source] E),
}

impl<E> CallError<E> {
    pub fn is_open(&self) -> bool {
        matches!(self, CallError::Open)
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, CallError::Timeout)
    }

    pub fn is_operation(&self) -> bool {
        matches!(self, CallError::Operation(_))
    }

    /// Borrow the operation's error, if that is what failed.
    pub fn operation(&self) -> Option<&E> {
        match self {
            CallError::Operation(e) => Some(e),
            _ => None,
        }
    }

    pub fn into_operation(self) -> Option<E> {
        match self {
            CallError::Operation(e) => Some(e),
            _ => None,
        }
    }
}
