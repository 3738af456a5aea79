use std::sync::Arc;

use chrono::{DateTime, Utc};

/// Default start time: Monday, November 10, 2008 23:00:00 UTC, in
/// milliseconds since the Unix epoch.
pub const DEFAULT_START_TIME_MILLIS: i64 = 1_226_358_000_000;

/// Largest backward clock jump, in milliseconds, that the generator waits out
/// instead of failing.
pub const MAX_CLOCK_BACKWARD_MS: i64 = 5_000;

/// Returns the default start time as a [`DateTime`].
pub fn default_start_time() -> DateTime<Utc> {
    DateTime::from_timestamp_millis(DEFAULT_START_TIME_MILLIS).unwrap_or_default()
}

/// A source of wall-clock time.
///
/// The generator reads this once per call (more often while waiting) and
/// compares readings against its watermark to detect the clock moving
/// backward. Implementations therefore report real wall-clock time, not a
/// monotonic counter. Tests plug in scripted clocks to simulate jumps.
///
/// # Example
///
/// ```
/// use snowmill::TimeSource;
///
/// struct FixedTime;
/// impl TimeSource for FixedTime {
///     fn current_millis(&self) -> i64 {
///         1_700_000_000_000
///     }
/// }
///
/// assert_eq!(FixedTime.current_millis(), 1_700_000_000_000);
/// ```
pub trait TimeSource {
    /// Returns the current time in milliseconds since the Unix epoch (UTC).
    fn current_millis(&self) -> i64;
}

/// The system wall clock, truncated to milliseconds.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl TimeSource for SystemClock {
    #[inline]
    fn current_millis(&self) -> i64 {
        Utc::now().timestamp_millis()
    }
}

impl<T: TimeSource + ?Sized> TimeSource for &T {
    fn current_millis(&self) -> i64 {
        (**self).current_millis()
    }
}

impl<T: TimeSource + ?Sized> TimeSource for Box<T> {
    fn current_millis(&self) -> i64 {
        (**self).current_millis()
    }
}

impl<T: TimeSource + ?Sized> TimeSource for Arc<T> {
    fn current_millis(&self) -> i64 {
        (**self).current_millis()
    }
}
