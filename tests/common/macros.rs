/// Asserts that the world's solved update order matches the listed identifiers.
#[macro_export]
macro_rules! assert_order {
    ($world:expr, [$($id:expr),* $(,)?]) => {
        let expected: Vec<String> = vec![$($id.to_string()),*];
        assert_eq!(
            common::order_of(&$world),
            expected,
            "Update order mismatch"
        );
    };
}

/// Asserts that facet `$a` runs strictly before facet `$b`.
#[macro_export]
macro_rules! assert_runs_before {
    ($world:expr, $a:expr, $b:expr) => {
        let a = common::position(&$world, $a).expect("first facet not attached");
        let b = common::position(&$world, $b).expect("second facet not attached");
        assert!(a < b, "{} (at {}) should run before {} (at {})", $a, a, $b, b);
    };
}
