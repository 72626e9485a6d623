//! Configuration errors of the facade itself.
//!
//! These are not test failures: they mean the worker was wired up wrongly, so they are raised as panics on the
//! spot instead of being published.

use std::fmt::Display;

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum FacadeError {
    /// An assertion or completion call happened before the facade was bound to a completion sink.
    #[error("assertion facade is not bound to a completion channel; initialise it before use")]
    Unbound,
    /// `bind` was called on a facade that already has a sink.
    #[error("assertion facade is already bound to a completion channel")]
    AlreadyBound,
}

/// Raise a facade configuration error (implemented as a panic).
#[cold]
#[track_caller]
pub fn raise(err: impl Display) -> ! {
    panic!("{err}");
}
