use core::fmt;

use chrono::{DateTime, Utc};

use crate::{MAX_CLOCK_BACKWARD_MS, MAX_MACHINE_ID};

/// A result type defaulting to the runtime [`Error`].
pub type Result<T, E = Error> = core::result::Result<T, E>;

/// Runtime errors returned by [`SnowflakeGenerator::next_id`].
///
/// None of these are fatal to the process. The caller decides whether and
/// when to retry.
///
/// [`SnowflakeGenerator::next_id`]: crate::SnowflakeGenerator::next_id
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// The wall clock moved backward by more than [`MAX_CLOCK_BACKWARD_MS`].
    ///
    /// No ID was generated and the watermark was left untouched.
    #[error(
        "clock moved backward from {last} to {now} (more than {max}ms), refusing to generate ID",
        max = MAX_CLOCK_BACKWARD_MS
    )]
    ClockBackward {
        /// The watermark at the time of the call, in Unix milliseconds.
        last: i64,
        /// The clock reading that triggered the refusal, in Unix milliseconds.
        now: i64,
    },

    /// The active [`SequenceResolver`] failed.
    ///
    /// [`SequenceResolver`]: crate::SequenceResolver
    #[error(transparent)]
    Resolver(#[from] ResolverError),

    /// The milliseconds elapsed since the start time do not fit in 43 bits.
    #[error(
        "elapsed time of {elapsed}ms does not fit in the 43-bit timestamp, please check the start time"
    )]
    EpochRange {
        /// Milliseconds elapsed since the configured start time.
        elapsed: i64,
    },
}

impl Error {
    /// Returns how far the clock moved backward for [`Error::ClockBackward`].
    pub fn drift(&self) -> Option<i64> {
        match self {
            Self::ClockBackward { last, now } => Some(last.saturating_sub(*now)),
            _ => None,
        }
    }
}

/// Errors raised while configuring a generator.
///
/// These come from the `try_set_*` methods. The `set_*` counterparts panic
/// with the same message instead: a process must not keep generating IDs with
/// an invalid identity.
#[derive(thiserror::Error, Clone, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum ConfigError {
    /// The start time is the Unix epoch.
    #[error("the start time cannot be a zero value")]
    ZeroStartTime,

    /// The start time lies after the current time.
    #[error("the start time {start_time} cannot be after the current time")]
    FutureStartTime {
        /// The rejected start time.
        start_time: DateTime<Utc>,
    },

    /// More than 2^43-1 milliseconds have already elapsed since the start time.
    #[error("the start time {start_time} exceeds the maximum life cycle of 2^43-1 milliseconds")]
    StartTimeOutOfRange {
        /// The rejected start time.
        start_time: DateTime<Utc>,
    },

    /// The machine ID does not fit in 9 bits.
    #[error("the machine ID {machine_id} cannot be greater than {max}", max = MAX_MACHINE_ID)]
    MachineIdOutOfRange {
        /// The rejected machine ID.
        machine_id: u16,
    },
}

/// An opaque error produced by a custom [`SequenceResolver`].
///
/// It is carried through [`Error::Resolver`] unchanged, so its meaning is
/// defined by the resolver that produced it.
///
/// [`SequenceResolver`]: crate::SequenceResolver
pub struct ResolverError {
    inner: Box<dyn core::error::Error + Send + Sync + 'static>,
}

impl ResolverError {
    /// Wraps any error (or message) produced by a resolver.
    pub fn new<E>(err: E) -> Self
    where
        E: Into<Box<dyn core::error::Error + Send + Sync + 'static>>,
    {
        Self { inner: err.into() }
    }

    /// Returns a reference to the wrapped error.
    pub fn get_ref(&self) -> &(dyn core::error::Error + Send + Sync + 'static) {
        &*self.inner
    }

    /// Unwraps the error produced by the resolver.
    pub fn into_inner(self) -> Box<dyn core::error::Error + Send + Sync + 'static> {
        self.inner
    }
}

impl fmt::Debug for ResolverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.inner, f)
    }
}

impl fmt::Display for ResolverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.inner, f)
    }
}

impl core::error::Error for ResolverError {
    fn source(&self) -> Option<&(dyn core::error::Error + 'static)> {
        self.inner.source()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolver_error_keeps_message() {
        let err = Error::from(ResolverError::new("redis unavailable"));
        assert_eq!(err.to_string(), "redis unavailable");
        assert!(matches!(err, Error::Resolver(_)));
    }

    #[test]
    fn clock_backward_reports_drift() {
        let err = Error::ClockBackward {
            last: 10_000,
            now: 3_000,
        };
        assert_eq!(err.drift(), Some(7_000));
        assert!(err.to_string().contains("5000ms"));
        assert_eq!(Error::EpochRange { elapsed: -1 }.drift(), None);

        let extreme = Error::ClockBackward {
            last: i64::MAX,
            now: i64::MIN,
        };
        assert_eq!(extreme.drift(), Some(i64::MAX));
    }

    #[test]
    fn config_error_messages() {
        let err = ConfigError::MachineIdOutOfRange { machine_id: 600 };
        assert_eq!(
            err.to_string(),
            "the machine ID 600 cannot be greater than 511"
        );
    }
}
