//! Assertions for code running inside a harness worker.
//!
//! The calling thread cannot see into a worker, so assertions made there must not simply panic. This crate
//! provides:
//! - [`compare`]: the comparison library (pure checks with JUnit-style failure messages),
//! - [`Asserter`] / [`Assertions`]: the facade that turns failed checks into a published completion message,
//! - [`matcher`]: predicate matchers for `assert_that`,
//! - [`random`]: random bytes and strings for test data.

#![deny(clippy::unwrap_used)]

pub mod compare;
pub mod errors;
pub mod facade;
pub mod matcher;
pub mod random;

pub use compare::{AssertionFailure, Check};
pub use errors::FacadeError;
pub use facade::{Asserter, Assertions, Labeled, panic_message};
pub use matcher::{Matcher, equal_to, greater_than, less_than, not, predicate};
