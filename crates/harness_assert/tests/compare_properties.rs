//! Property tests for the comparison library.

use harness_assert::compare;
use proptest::prelude::*;

proptest! {
    /// Distinct integers always produce the canonical `expected:<a> but was:<b>` text.
    #[test]
    fn unequal_integers_render_canonically(a in any::<i64>(), b in any::<i64>()) {
        prop_assume!(a != b);
        let failure = compare::equals(None, &a, &b).unwrap_err();
        prop_assert_eq!(failure.message, Some(format!("expected:<{a}> but was:<{b}>")));
    }

    /// Tolerance checks are symmetric in their operands.
    #[test]
    fn approx_equals_is_symmetric(a in -1e6f64..1e6, b in -1e6f64..1e6, delta in 0.0f64..10.0) {
        let forward = compare::approx_equals(None, a, b, delta).is_ok();
        let backward = compare::approx_equals(None, b, a, delta).is_ok();
        prop_assert_eq!(forward, backward);
    }

    /// Slices only compare equal to themselves element-wise.
    #[test]
    fn slice_equality_matches_std(a in prop::collection::vec(0u8..4, 0..8), b in prop::collection::vec(0u8..4, 0..8)) {
        prop_assert_eq!(compare::array_equals(None, &a, &b).is_ok(), a == b);
    }
}
