//! Comparison library behind the facade.
//!
//! Every check is a pure function returning `Err(AssertionFailure)` when it does not hold. Messages follow the
//! wording JUnit-style libraries use (`expected:<1> but was:<2>`), so failures read the same no matter which side
//! of the bridge prints them.

use std::fmt::{self, Debug};

use crate::matcher::Matcher;

/// A check that did not hold.
///
/// `message` is `None` for message-less failures such as `assert_true(false)` or a bare `fail()`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssertionFailure {
    pub message: Option<String>,
}

impl AssertionFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
        }
    }

    pub fn bare() -> Self {
        Self { message: None }
    }
}

impl fmt::Display for AssertionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message.as_deref().unwrap_or("assertion failed"))
    }
}

impl std::error::Error for AssertionFailure {}

pub type Check = Result<(), AssertionFailure>;

fn prefix(message: Option<&str>) -> String {
    match message {
        Some(m) if !m.is_empty() => format!("{m} "),
        _ => String::new(),
    }
}

/// Format an equality failure.
///
/// When both sides render identically the type names are included so the failure is still readable.
pub fn format_not_equal<E: Debug + ?Sized, A: Debug + ?Sized>(message: Option<&str>, expected: &E, actual: &A) -> String {
    let expected_str = format!("{expected:?}");
    let actual_str = format!("{actual:?}");
    let head = prefix(message);
    if expected_str == actual_str {
        format!(
            "{head}expected: {}<{expected_str}> but was: {}<{actual_str}>",
            std::any::type_name::<E>(),
            std::any::type_name::<A>()
        )
    } else {
        format!("{head}expected:<{expected_str}> but was:<{actual_str}>")
    }
}

pub fn fail(message: Option<&str>) -> Check {
    Err(message.map_or_else(AssertionFailure::bare, AssertionFailure::new))
}

pub fn is_true(message: Option<&str>, condition: bool) -> Check {
    if condition { Ok(()) } else { fail(message) }
}

pub fn is_false(message: Option<&str>, condition: bool) -> Check {
    is_true(message, !condition)
}

pub fn equals<T: PartialEq + Debug + ?Sized>(message: Option<&str>, expected: &T, actual: &T) -> Check {
    if expected == actual {
        Ok(())
    } else {
        Err(AssertionFailure::new(format_not_equal(message, expected, actual)))
    }
}

pub fn not_equals<T: PartialEq + Debug + ?Sized>(message: Option<&str>, unexpected: &T, actual: &T) -> Check {
    if unexpected != actual {
        return Ok(());
    }
    let head = match message {
        Some(m) => format!("{m}. "),
        None => "Values should be different. ".to_string(),
    };
    Err(AssertionFailure::new(format!("{head}Actual: {actual:?}")))
}

fn within(expected: f64, actual: f64, delta: f64) -> bool {
    // Exact equality (including both NaN) passes before the tolerance check, as JUnit does.
    if expected.to_bits() == actual.to_bits() || expected == actual {
        return true;
    }
    (expected - actual).abs() <= delta
}

pub fn approx_equals(message: Option<&str>, expected: f64, actual: f64, delta: f64) -> Check {
    if within(expected, actual, delta) {
        Ok(())
    } else {
        Err(AssertionFailure::new(format_not_equal(message, &expected, &actual)))
    }
}

/// Identity check: both references point at the same object.
pub fn same<T: Debug + ?Sized>(message: Option<&str>, expected: &T, actual: &T) -> Check {
    if std::ptr::eq(expected, actual) {
        Ok(())
    } else {
        Err(AssertionFailure::new(format!(
            "{}expected same:<{expected:?}> was not:<{actual:?}>",
            prefix(message)
        )))
    }
}

pub fn not_same<T: ?Sized>(message: Option<&str>, unexpected: &T, actual: &T) -> Check {
    if std::ptr::eq(unexpected, actual) {
        Err(AssertionFailure::new(format!("{}expected not same", prefix(message))))
    } else {
        Ok(())
    }
}

pub fn is_none<T: Debug>(message: Option<&str>, value: &Option<T>) -> Check {
    match value {
        None => Ok(()),
        Some(v) => Err(AssertionFailure::new(format!("{}expected null, but was:<{v:?}>", prefix(message)))),
    }
}

pub fn is_some<T>(message: Option<&str>, value: &Option<T>) -> Check {
    is_true(message, value.is_some())
}

fn array_header(message: Option<&str>) -> String {
    match message {
        Some(m) => format!("{m}: "),
        None => String::new(),
    }
}

fn array_equals_by<T: Debug>(
    message: Option<&str>,
    expected: &[T],
    actual: &[T],
    element: impl Fn(&T, &T) -> Check,
) -> Check {
    let header = array_header(message);
    if expected.len() != actual.len() {
        return Err(AssertionFailure::new(format!(
            "{header}array lengths differed, expected.length={} actual.length={}",
            expected.len(),
            actual.len()
        )));
    }
    for (index, (e, a)) in expected.iter().zip(actual).enumerate() {
        if let Err(cause) = element(e, a) {
            return Err(AssertionFailure::new(format!(
                "{header}arrays first differed at element [{index}]; {cause}"
            )));
        }
    }
    Ok(())
}

/// Element-wise equality of two slices.
pub fn array_equals<T: PartialEq + Debug>(message: Option<&str>, expected: &[T], actual: &[T]) -> Check {
    array_equals_by(message, expected, actual, |e, a| equals(None, e, a))
}

/// Element-wise equality of two float slices within `delta`.
pub fn array_approx_equals(message: Option<&str>, expected: &[f64], actual: &[f64], delta: f64) -> Check {
    array_equals_by(message, expected, actual, |e, a| approx_equals(None, *e, *a, delta))
}

/// Match `actual` against a matcher, producing the `Expected: ... but: ...` description on mismatch.
pub fn that<T: Debug + ?Sized, M: Matcher<T> + ?Sized>(reason: Option<&str>, actual: &T, matcher: &M) -> Check {
    if matcher.matches(actual) {
        return Ok(());
    }
    Err(AssertionFailure::new(format!(
        "{}\nExpected: {}\n     but: {}",
        reason.unwrap_or(""),
        matcher.describe(),
        matcher.describe_mismatch(actual)
    )))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::matcher::{equal_to, greater_than};

    fn msg(check: Check) -> Option<String> {
        check.unwrap_err().message
    }

    #[test]
    fn test_equals_message_matches_junit() {
        assert_eq!(msg(equals(None, &1, &2)).as_deref(), Some("expected:<1> but was:<2>"));
        assert_eq!(
            msg(equals(Some("counts"), &1, &2)).as_deref(),
            Some("counts expected:<1> but was:<2>")
        );
    }

    #[test]
    fn test_equals_with_identical_rendering_shows_types() {
        let m = msg(equals(None, &f64::NAN, &f64::NAN)).unwrap();
        assert_eq!(m, "expected: f64<NaN> but was: f64<NaN>");
    }

    #[test]
    fn test_bare_failures_have_no_message() {
        assert_eq!(msg(is_true(None, false)), None);
        assert_eq!(msg(fail(None)), None);
        assert_eq!(msg(is_some::<u8>(None, &None)), None);
        assert!(is_false(None, false).is_ok());
    }

    #[test]
    fn test_not_equals() {
        assert!(not_equals(None, &1, &2).is_ok());
        assert_eq!(
            msg(not_equals(None, &"a", &"a")).as_deref(),
            Some("Values should be different. Actual: \"a\"")
        );
        assert_eq!(msg(not_equals(Some("ids"), &3, &3)).as_deref(), Some("ids. Actual: 3"));
    }

    #[test]
    fn test_approx_equals() {
        assert!(approx_equals(None, 1.0, 1.05, 0.1).is_ok());
        assert!(approx_equals(None, f64::NAN, f64::NAN, 0.0).is_ok());
        assert_eq!(
            msg(approx_equals(None, 1.0, 2.0, 0.5)).as_deref(),
            Some("expected:<1.0> but was:<2.0>")
        );
    }

    #[test]
    fn test_identity() {
        let a = String::from("x");
        let b = String::from("x");
        assert!(same(None, &a, &a).is_ok());
        assert_eq!(
            msg(same(None, &a, &b)).as_deref(),
            Some("expected same:<\"x\"> was not:<\"x\">")
        );
        assert!(not_same(None, &a, &b).is_ok());
        assert_eq!(msg(not_same(None, &a, &a)).as_deref(), Some("expected not same"));
    }

    #[test]
    fn test_none_check() {
        assert!(is_none::<u8>(None, &None).is_ok());
        assert_eq!(msg(is_none(None, &Some(4))).as_deref(), Some("expected null, but was:<4>"));
    }

    #[test]
    fn test_array_equals_reports_first_difference() {
        assert!(array_equals(None, &[1, 2, 3], &[1, 2, 3]).is_ok());
        assert_eq!(
            msg(array_equals(None, &[1, 2, 3], &[1, 5, 6])).as_deref(),
            Some("arrays first differed at element [1]; expected:<2> but was:<5>")
        );
        assert_eq!(
            msg(array_equals(Some("bytes"), &[1u8], &[1, 2])).as_deref(),
            Some("bytes: array lengths differed, expected.length=1 actual.length=2")
        );
    }

    #[test]
    fn test_array_approx_equals() {
        assert!(array_approx_equals(None, &[1.0, 2.0], &[1.01, 1.99], 0.05).is_ok());
        assert_eq!(
            msg(array_approx_equals(None, &[1.0, 2.0], &[1.0, 3.0], 0.5)).as_deref(),
            Some("arrays first differed at element [1]; expected:<2.0> but was:<3.0>")
        );
    }

    #[test]
    fn test_that_describes_mismatch() {
        assert!(that(None, &5, &equal_to(5)).is_ok());
        assert_eq!(
            msg(that(Some("size"), &3, &greater_than(4))).as_deref(),
            Some("size\nExpected: a value greater than <4>\n     but: was <3>")
        );
    }
}
