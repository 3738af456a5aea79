use core::time::Duration;
use std::thread;

use chrono::{DateTime, Utc};
use portable_atomic::{AtomicI64, Ordering};
#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::{
    AtomicResolver, ConfigError, DEFAULT_START_TIME_MILLIS, Error, MAX_CLOCK_BACKWARD_MS,
    MAX_MACHINE_ID, MAX_SEQUENCE, MAX_TIMESTAMP, ParsedId, Result, SequenceResolver, SnowflakeId,
    SystemClock, TimeSource, default_start_time,
};

#[cfg(feature = "cache-padded")]
type Watermark = crossbeam_utils::CachePadded<AtomicI64>;
#[cfg(not(feature = "cache-padded"))]
type Watermark = AtomicI64;

fn watermark(ms: i64) -> Watermark {
    #[cfg(feature = "cache-padded")]
    {
        crossbeam_utils::CachePadded::new(AtomicI64::new(ms))
    }
    #[cfg(not(feature = "cache-padded"))]
    {
        AtomicI64::new(ms)
    }
}

/// A lock-free Snowflake ID generator.
///
/// The generator owns its configuration (start time, machine ID, sequence
/// resolver) and the watermark of the last millisecond it issued an ID for.
/// Independent generators never share state, so each test or tenant can run
/// its own.
///
/// ## Configuration
/// The `set_*` methods take `&mut self`: configure the generator once, then
/// share it by reference or in an [`Arc`] across threads. The compiler rules
/// out reconfiguring while IDs are being generated.
///
/// ## Concurrency
/// The watermark and the resolver state are plain atomics. No lock is taken
/// on the hot path. IDs issued sequentially from one thread never decrease;
/// IDs from concurrent threads are unique but not globally ordered.
///
/// ## Waiting
/// [`Self::next_id`] blocks in exactly two situations:
/// - the clock moved backward by at most [`MAX_CLOCK_BACKWARD_MS`]: it sleeps
///   for the drift;
/// - the current millisecond's sequence is exhausted: it yields until the
///   clock reaches the next millisecond.
///
/// # Example
/// ```
/// use snowmill::{SnowflakeGenerator, parse_id};
///
/// let mut generator = SnowflakeGenerator::new();
/// generator.set_machine_id(7);
///
/// let a = generator.next_id().unwrap();
/// let b = generator.next_id().unwrap();
/// assert!(a < b);
/// assert_eq!(parse_id(a).machine_id, 7);
/// ```
///
/// [`Arc`]: std::sync::Arc
#[derive(Debug)]
pub struct SnowflakeGenerator<R = AtomicResolver, T = SystemClock>
where
    R: SequenceResolver,
    T: TimeSource,
{
    start_time: DateTime<Utc>,
    start_millis: i64,
    machine_id: u16,
    resolver: R,
    clock: T,
    last_timestamp: Watermark,
}

impl SnowflakeGenerator {
    /// Creates a generator with the default start time, machine ID `0`, the
    /// [`AtomicResolver`] and the [`SystemClock`].
    pub fn new() -> Self {
        Self::with_parts(AtomicResolver::new(), SystemClock)
    }
}

impl Default for SnowflakeGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> SnowflakeGenerator<AtomicResolver, T>
where
    T: TimeSource,
{
    /// Creates a generator reading time from `clock`, with the default
    /// resolver.
    pub fn with_clock(clock: T) -> Self {
        Self::with_parts(AtomicResolver::new(), clock)
    }
}

impl<R, T> SnowflakeGenerator<R, T>
where
    R: SequenceResolver,
    T: TimeSource,
{
    /// Creates a generator from a resolver and a clock, with the default
    /// start time and machine ID `0`.
    pub fn with_parts(resolver: R, clock: T) -> Self {
        Self {
            start_time: default_start_time(),
            start_millis: DEFAULT_START_TIME_MILLIS,
            machine_id: 0,
            resolver,
            clock,
            last_timestamp: watermark(0),
        }
    }

    /// The configured start time (epoch).
    pub fn start_time(&self) -> DateTime<Utc> {
        self.start_time
    }

    /// The configured machine ID.
    pub fn machine_id(&self) -> u16 {
        self.machine_id
    }

    /// The active sequence resolver.
    pub fn resolver(&self) -> &R {
        &self.resolver
    }

    /// The clock the generator reads.
    pub fn clock(&self) -> &T {
        &self.clock
    }

    /// The last millisecond (Unix time) an ID was issued for, or `0` before
    /// the first ID.
    pub fn last_timestamp(&self) -> i64 {
        self.last_timestamp.load(Ordering::Acquire)
    }

    /// Sets the start time that elapsed milliseconds are measured from.
    ///
    /// The zero value is the Unix epoch, the same instant as
    /// `DateTime::<Utc>::default()`. Any later instant, including one
    /// millisecond past it, is accepted.
    ///
    /// # Errors
    ///
    /// - [`ConfigError::ZeroStartTime`] for the Unix epoch
    /// - [`ConfigError::FutureStartTime`] if it lies after the clock's current
    ///   time
    /// - [`ConfigError::StartTimeOutOfRange`] if more than 2^43-1 milliseconds
    ///   have already elapsed since it
    pub fn try_set_start_time(&mut self, start_time: DateTime<Utc>) -> Result<(), ConfigError> {
        let start_millis = start_time.timestamp_millis();
        if start_millis == 0 {
            return Err(ConfigError::ZeroStartTime);
        }

        let now = self.clock.current_millis();
        if start_millis > now {
            return Err(ConfigError::FutureStartTime { start_time });
        }

        let elapsed = now.abs_diff(start_millis);
        if elapsed > MAX_TIMESTAMP {
            return Err(ConfigError::StartTimeOutOfRange { start_time });
        }

        #[cfg(feature = "tracing")]
        tracing::debug!(%start_time, "start time configured");
        self.start_time = start_time;
        self.start_millis = start_millis;
        Ok(())
    }

    /// Sets the start time, see [`Self::try_set_start_time`].
    ///
    /// # Panics
    ///
    /// Panics on any [`ConfigError`]. Use this during startup, where an
    /// invalid start time must abort the process.
    pub fn set_start_time(&mut self, start_time: DateTime<Utc>) {
        if let Err(err) = self.try_set_start_time(start_time) {
            panic!("{err}");
        }
    }

    /// Sets the machine ID embedded in every generated ID.
    ///
    /// # Errors
    ///
    /// [`ConfigError::MachineIdOutOfRange`] if `machine_id` exceeds
    /// [`MAX_MACHINE_ID`].
    pub fn try_set_machine_id(&mut self, machine_id: u16) -> Result<(), ConfigError> {
        if machine_id > MAX_MACHINE_ID {
            return Err(ConfigError::MachineIdOutOfRange { machine_id });
        }

        #[cfg(feature = "tracing")]
        tracing::debug!(machine_id, "machine ID configured");
        self.machine_id = machine_id;
        Ok(())
    }

    /// Sets the machine ID, see [`Self::try_set_machine_id`].
    ///
    /// # Panics
    ///
    /// Panics if `machine_id` exceeds [`MAX_MACHINE_ID`].
    pub fn set_machine_id(&mut self, machine_id: u16) {
        if let Err(err) = self.try_set_machine_id(machine_id) {
            panic!("{err}");
        }
    }

    /// Replaces the active resolver. `None` leaves it untouched.
    pub fn set_sequence_resolver(&mut self, resolver: Option<R>) {
        if let Some(resolver) = resolver {
            self.resolver = resolver;
        }
    }

    /// Swaps in a resolver of another type, keeping the configuration, the
    /// clock and the watermark.
    pub fn with_sequence_resolver<S>(self, resolver: S) -> SnowflakeGenerator<S, T>
    where
        S: SequenceResolver,
    {
        SnowflakeGenerator {
            start_time: self.start_time,
            start_millis: self.start_millis,
            machine_id: self.machine_id,
            resolver,
            clock: self.clock,
            last_timestamp: watermark(self.last_timestamp.load(Ordering::Acquire)),
        }
    }

    /// Generates an ID, swallowing errors.
    ///
    /// Returns `0` on failure. Use [`Self::next_id`] to observe the error.
    pub fn id(&self) -> u64 {
        self.next_id().unwrap_or_default()
    }

    /// Generates the next ID.
    ///
    /// # Errors
    ///
    /// - [`Error::ClockBackward`] if the clock moved backward by more than
    ///   [`MAX_CLOCK_BACKWARD_MS`]; nothing is mutated
    /// - [`Error::Resolver`] if the resolver fails
    /// - [`Error::EpochRange`] if the elapsed time since the start time does
    ///   not fit in 43 bits
    pub fn next_id(&self) -> Result<u64> {
        self.next_snowflake_id().map(|id| id.to_raw())
    }

    /// Same as [`Self::next_id`], returning a typed [`SnowflakeId`].
    ///
    /// # Errors
    ///
    /// See [`Self::next_id`].
    #[cfg_attr(feature = "tracing", instrument(level = "trace", skip(self)))]
    pub fn next_snowflake_id(&self) -> Result<SnowflakeId> {
        let mut now = self.clock.current_millis();
        let last = self.last_timestamp.load(Ordering::Acquire);

        if now < last {
            now = self.cold_clock_behind(now, last)?;
        }

        let mut sequence = self.resolver.resolve(now)?;
        while sequence >= MAX_SEQUENCE {
            now = self.wait_for_next_millis(now);
            sequence = self.resolver.resolve(now)?;
        }

        // Published before packing so concurrent callers see the watermark
        // move forward; `fetch_max` keeps a slower caller from rewinding it.
        self.last_timestamp.fetch_max(now, Ordering::AcqRel);

        let elapsed = now.saturating_sub(self.start_millis);
        if elapsed < 0 || elapsed.unsigned_abs() > MAX_TIMESTAMP {
            return Err(Error::EpochRange { elapsed });
        }

        Ok(SnowflakeId::from_components(
            elapsed.unsigned_abs(),
            u64::from(self.machine_id),
            u64::from(sequence),
        ))
    }

    /// Reconstructs when `parsed` was generated, using this generator's start
    /// time.
    pub fn generate_time(&self, parsed: &ParsedId) -> DateTime<Utc> {
        parsed.generate_time(self.start_time)
    }

    #[cold]
    #[inline(never)]
    fn cold_clock_behind(&self, now: i64, last: i64) -> Result<i64> {
        let drift = last.saturating_sub(now);
        if drift > MAX_CLOCK_BACKWARD_MS {
            #[cfg(feature = "tracing")]
            tracing::error!(drift_ms = drift, last, now, "clock moved backward too far");
            return Err(Error::ClockBackward { last, now });
        }

        #[cfg(feature = "tracing")]
        tracing::warn!(drift_ms = drift, "clock moved backward, waiting for it to catch up");
        thread::sleep(Duration::from_millis(drift.unsigned_abs()));
        Ok(self.clock.current_millis())
    }

    fn wait_for_next_millis(&self, last: i64) -> i64 {
        loop {
            let now = self.clock.current_millis();
            if now > last {
                return now;
            }
            thread::yield_now();
        }
    }
}
