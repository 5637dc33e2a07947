//! Fatal assertions for misuse of the marshaling layer.
//!
//! A failed assertion means the evaluation stack can no longer be trusted, so
//! it is logged and then aborts the current call chain with a panic.

/// Report an unrecoverable misuse and panic.
macro_rules! fatal {
    ($expr:expr, $($arg:tt)+) => {{
        let message = format!($($arg)+);
        ::tracing::error!(expression = $expr, file = file!(), line = line!(), "{}", message);
        panic!("assertion ({}) failed, {}:{}: {}", $expr, file!(), line!(), message)
    }};
}

/// Assert a condition that only fails on a programming error.
///
/// Logs the expression text, source location and message before panicking.
macro_rules! fatal_assert {
    ($cond:expr, $($arg:tt)+) => {
        if !$cond {
            $crate::fatal::fatal!(stringify!($cond), $($arg)+);
        }
    };
}

pub(crate) use {fatal, fatal_assert};

#[cfg(test)]
mod tests {
    use super::{fatal, fatal_assert};

    #[test]
    fn test_passing_assertion_is_silent() {
        fatal_assert!(1 + 1 == 2, "arithmetic is broken");
    }

    #[test]
    #[should_panic(expected = "no table at the top")]
    fn test_fatal_diverges() {
        let tag: Option<u8> = None;
        let Some(_) = tag else {
            fatal!("tag.is_some()", "no table at the top");
        };
    }

    #[test]
    #[should_panic(expected = "stack underflow")]
    fn test_failing_assertion_panics_with_message() {
        let depth = 0;
        fatal_assert!(depth > 0, "stack underflow at depth {}", depth);
    }
}
