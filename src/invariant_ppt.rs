//! Runtime invariant checks for the stream lifecycle.
//!
//! Production code asserts state-machine invariants with [`assert_invariant!`];
//! each checked invariant is recorded per thread so contract tests can prove
//! the checks actually ran on the paths they exercise.
//!
//! ```rust,ignore
//! use camstream::invariant_ppt::*;
//!
//! assert_invariant!(
//!     held.stream.is_none(),
//!     "idle holds no stream or capabilities"
//! );
//!
//! #[test]
//! fn contract_lifecycle() {
//!     // ... drive a session through start and stop ...
//!     contract_test("lifecycle", &["idle holds no stream or capabilities"]);
//! }
//! ```

use std::cell::RefCell;
use std::collections::HashSet;
use std::thread_local;

thread_local! {
    static INVARIANT_LOG: RefCell<HashSet<String>> = RefCell::new(HashSet::new());
}

/// Invariant checked on every transition to `display`
pub const DISPLAY_HOLDS_STREAM: &str = "display requires a bound stream with capabilities";
/// Invariant checked on every transition to `idle`
pub const IDLE_HOLDS_NOTHING: &str = "idle holds no stream or capabilities";

/// Assert an invariant and log it for contract testing.
///
/// # Panics
/// Panics if the condition is false.
#[macro_export]
macro_rules! assert_invariant {
    ($condition:expr, $message:expr) => {
        $crate::invariant_ppt::__assert_invariant_impl($condition, $message, None)
    };
    ($condition:expr, $message:expr, $context:expr) => {
        $crate::invariant_ppt::__assert_invariant_impl($condition, $message, Some($context))
    };
}

#[doc(hidden)]
pub fn __assert_invariant_impl(condition: bool, message: &str, context: Option<&str>) {
    INVARIANT_LOG.with(|log| {
        log.borrow_mut().insert(message.to_string());
    });

    if !condition {
        let ctx = context.unwrap_or("unknown");
        panic!("INVARIANT VIOLATION [{}]: {}", ctx, message);
    }
}

/// Check that specific invariants were verified on this thread.
///
/// # Panics
/// Panics if any required invariant was not checked.
pub fn contract_test(test_name: &str, required_invariants: &[&str]) {
    let log = INVARIANT_LOG.with(|log| log.borrow().clone());

    let missing: Vec<&str> = required_invariants
        .iter()
        .copied()
        .filter(|invariant| !log.contains(*invariant))
        .collect();

    if !missing.is_empty() {
        panic!(
            "CONTRACT FAILURE [{}]: The following invariants were not checked:\n  - {}",
            test_name,
            missing.join("\n  - ")
        );
    }
}

/// Clear the invariant log for this thread
pub fn clear_invariant_log() {
    INVARIANT_LOG.with(|log| {
        log.borrow_mut().clear();
    });
}
