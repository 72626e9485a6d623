//! Predicate matchers for `assert_that`.

use std::fmt::Debug;

/// Something that can decide whether a value is acceptable and describe what it expected.
pub trait Matcher<T: Debug + ?Sized> {
    fn matches(&self, actual: &T) -> bool;

    /// Description of the expectation, e.g. `a value greater than <4>`.
    fn describe(&self) -> String;

    fn describe_mismatch(&self, actual: &T) -> String {
        format!("was <{actual:?}>")
    }
}

pub struct EqualTo<T>(T);

/// Match values equal to `expected`.
pub fn equal_to<T>(expected: T) -> EqualTo<T> {
    EqualTo(expected)
}

impl<T: PartialEq + Debug> Matcher<T> for EqualTo<T> {
    fn matches(&self, actual: &T) -> bool {
        *actual == self.0
    }

    fn describe(&self) -> String {
        format!("<{:?}>", self.0)
    }
}

pub struct GreaterThan<T>(T);

pub fn greater_than<T>(bound: T) -> GreaterThan<T> {
    GreaterThan(bound)
}

impl<T: PartialOrd + Debug> Matcher<T> for GreaterThan<T> {
    fn matches(&self, actual: &T) -> bool {
        *actual > self.0
    }

    fn describe(&self) -> String {
        format!("a value greater than <{:?}>", self.0)
    }
}

pub struct LessThan<T>(T);

pub fn less_than<T>(bound: T) -> LessThan<T> {
    LessThan(bound)
}

impl<T: PartialOrd + Debug> Matcher<T> for LessThan<T> {
    fn matches(&self, actual: &T) -> bool {
        *actual < self.0
    }

    fn describe(&self) -> String {
        format!("a value less than <{:?}>", self.0)
    }
}

pub struct Not<M>(M);

/// Invert another matcher.
pub fn not<M>(inner: M) -> Not<M> {
    Not(inner)
}

impl<T: Debug + ?Sized, M: Matcher<T>> Matcher<T> for Not<M> {
    fn matches(&self, actual: &T) -> bool {
        !self.0.matches(actual)
    }

    fn describe(&self) -> String {
        format!("not {}", self.0.describe())
    }
}

pub struct Predicate<F> {
    description: String,
    check: F,
}

/// Match with an arbitrary closure, described by `description`.
pub fn predicate<T: ?Sized, F: Fn(&T) -> bool>(description: impl Into<String>, check: F) -> Predicate<F> {
    Predicate {
        description: description.into(),
        check,
    }
}

impl<T: Debug + ?Sized, F: Fn(&T) -> bool> Matcher<T> for Predicate<F> {
    fn matches(&self, actual: &T) -> bool {
        (self.check)(actual)
    }

    fn describe(&self) -> String {
        self.description.clone()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptions() {
        assert_eq!(Matcher::<i32>::describe(&equal_to(3)), "<3>");
        assert_eq!(Matcher::<i32>::describe(&not(less_than(2))), "not a value less than <2>");
    }

    #[test]
    fn test_predicate_matches() {
        let even = predicate("an even number", |n: &i32| n % 2 == 0);
        assert!(even.matches(&4));
        assert!(!even.matches(&3));
        assert_eq!(even.describe_mismatch(&3), "was <3>");
    }
}
