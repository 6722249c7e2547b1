/// Logging macros
#[macro_use]
pub mod macro_logger;
/// Helpers for tests
#[cfg(any(test, feature = "test_utils"))]
pub mod test_utils;
