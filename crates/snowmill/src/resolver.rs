use core::{cmp, fmt};
use std::sync::Arc;

use portable_atomic::{AtomicU64, Ordering};

use crate::{MAX_SEQUENCE, ResolverError};

/// Produces the sequence number for a given millisecond.
///
/// # Contract
///
/// - For a fixed `ms`, concurrent callers receive distinct values until the
///   counter saturates.
/// - The counter logically resets when `ms` advances.
/// - A value of [`MAX_SEQUENCE`] or more tells the generator the millisecond
///   is exhausted. It waits for the next millisecond and asks again.
///
/// The generator propagates any error unchanged.
pub trait SequenceResolver {
    /// Returns the sequence number to use for millisecond `ms` (Unix time).
    fn resolve(&self, ms: i64) -> Result<u16, ResolverError>;
}

impl<R: SequenceResolver + ?Sized> SequenceResolver for &R {
    fn resolve(&self, ms: i64) -> Result<u16, ResolverError> {
        (**self).resolve(ms)
    }
}

impl<R: SequenceResolver + ?Sized> SequenceResolver for Box<R> {
    fn resolve(&self, ms: i64) -> Result<u16, ResolverError> {
        (**self).resolve(ms)
    }
}

impl<R: SequenceResolver + ?Sized> SequenceResolver for Arc<R> {
    fn resolve(&self, ms: i64) -> Result<u16, ResolverError> {
        (**self).resolve(ms)
    }
}

/// Adapts a closure into a [`SequenceResolver`].
///
/// # Example
///
/// ```
/// use snowmill::{FnResolver, SequenceResolver};
///
/// let resolver = FnResolver::new(|ms| Ok((ms % 4000) as u16));
/// assert_eq!(resolver.resolve(4001).unwrap(), 1);
/// ```
#[derive(Clone, Copy)]
pub struct FnResolver<F> {
    f: F,
}

impl<F> FnResolver<F>
where
    F: Fn(i64) -> Result<u16, ResolverError>,
{
    /// Wraps `f`.
    pub const fn new(f: F) -> Self {
        Self { f }
    }
}

impl<F> SequenceResolver for FnResolver<F>
where
    F: Fn(i64) -> Result<u16, ResolverError>,
{
    #[inline]
    fn resolve(&self, ms: i64) -> Result<u16, ResolverError> {
        (self.f)(ms)
    }
}

impl<F> fmt::Debug for FnResolver<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnResolver").finish_non_exhaustive()
    }
}

/// The default lock-free sequence resolver.
///
/// The last-seen millisecond and the counter share one [`AtomicU64`], so
/// every decision (reset, increment, or report exhaustion) is a single
/// compare-and-swap. Two callers can never both reset the same millisecond to
/// zero.
///
/// ```text
///  Bit Index:  63                  16 15             0
///              +---------------------+---------------+
///  Field:      | millisecond (48)    | counter (16)  |
///              +---------------------+---------------+
/// ```
///
/// A caller carrying a millisecond older than the stored one gets
/// [`MAX_SEQUENCE`] back, which sends it to wait for a newer millisecond
/// instead of rewinding the counter.
pub struct AtomicResolver {
    #[cfg(feature = "cache-padded")]
    state: crossbeam_utils::CachePadded<AtomicU64>,
    #[cfg(not(feature = "cache-padded"))]
    state: AtomicU64,
}

impl AtomicResolver {
    const COUNTER_BITS: u32 = 16;
    const COUNTER_MASK: u64 = (1 << Self::COUNTER_BITS) - 1;

    /// Largest millisecond the packed state can hold (roughly year 10889).
    pub const MAX_MILLIS: u64 = (1 << (64 - Self::COUNTER_BITS)) - 1;

    /// Creates a resolver that has not seen any millisecond yet.
    pub fn new() -> Self {
        Self {
            #[cfg(feature = "cache-padded")]
            state: crossbeam_utils::CachePadded::new(AtomicU64::new(0)),
            #[cfg(not(feature = "cache-padded"))]
            state: AtomicU64::new(0),
        }
    }

    /// Returns the last millisecond and counter handed out.
    pub fn snapshot(&self) -> (u64, u16) {
        Self::unpack(self.state.load(Ordering::Acquire))
    }

    #[inline]
    const fn pack(ms: u64, count: u16) -> u64 {
        (ms << Self::COUNTER_BITS) | count as u64
    }

    #[inline]
    const fn unpack(state: u64) -> (u64, u16) {
        (state >> Self::COUNTER_BITS, (state & Self::COUNTER_MASK) as u16)
    }

    #[cold]
    #[inline(never)]
    fn out_of_range(ms: i64) -> ResolverError {
        ResolverError::new(format!(
            "millisecond {ms} is outside the range of the atomic resolver (0..={})",
            Self::MAX_MILLIS
        ))
    }
}

impl Default for AtomicResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for AtomicResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (ms, count) = self.snapshot();
        f.debug_struct("AtomicResolver")
            .field("ms", &ms)
            .field("count", &count)
            .finish()
    }
}

impl SequenceResolver for AtomicResolver {
    fn resolve(&self, ms: i64) -> Result<u16, ResolverError> {
        let now = match u64::try_from(ms) {
            Ok(now) if now <= Self::MAX_MILLIS => now,
            _ => return Err(Self::out_of_range(ms)),
        };

        let mut current = self.state.load(Ordering::Acquire);
        loop {
            let (last, count) = Self::unpack(current);
            let next = match now.cmp(&last) {
                cmp::Ordering::Less => return Ok(MAX_SEQUENCE),
                cmp::Ordering::Equal if count >= MAX_SEQUENCE => return Ok(MAX_SEQUENCE),
                cmp::Ordering::Equal => count + 1,
                cmp::Ordering::Greater => 0,
            };

            match self.state.compare_exchange_weak(
                current,
                Self::pack(now, next),
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return Ok(next),
                Err(actual) => current = actual,
            }
        }
    }
}
