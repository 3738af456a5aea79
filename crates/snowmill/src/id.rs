use core::{fmt, num::ParseIntError, str::FromStr};

use chrono::{DateTime, Utc};

/// Bit length of the timestamp field.
pub const TIMESTAMP_LENGTH: u8 = 43;

/// Bit length of the machine ID field.
pub const MACHINE_ID_LENGTH: u8 = 9;

/// Bit length of the sequence field.
pub const SEQUENCE_LENGTH: u8 = 12;

/// Largest sequence value. A resolver returning this value (or more) signals
/// that the current millisecond is exhausted.
pub const MAX_SEQUENCE: u16 = (1 << SEQUENCE_LENGTH) - 1;

/// Largest machine ID (511).
pub const MAX_MACHINE_ID: u16 = (1 << MACHINE_ID_LENGTH) - 1;

/// Largest number of milliseconds since the start time (about 279 years).
pub const MAX_TIMESTAMP: u64 = (1 << TIMESTAMP_LENGTH) - 1;

/// Number of bits the machine ID is shifted left by.
pub const MACHINE_ID_SHIFT: u8 = SEQUENCE_LENGTH;

/// Number of bits the timestamp is shifted left by.
pub const TIMESTAMP_SHIFT: u8 = MACHINE_ID_LENGTH + SEQUENCE_LENGTH;

/// A 64-bit Snowflake ID.
///
/// - 43 bits timestamp (ms since the generator's start time)
/// - 9 bits machine ID
/// - 12 bits sequence
///
/// ```text
///  Bit Index:  63             21 20             12 11             0
///              +----------------+-----------------+---------------+
///  Field:      | timestamp (43) | machine ID (9)  | sequence (12) |
///              +----------------+-----------------+---------------+
///              |<----- MSB ------- 64 bits ------- LSB ---------->|
/// ```
///
/// The top bit stays clear until 2^42 ms (about 139 years) have elapsed since
/// the start time.
///
/// # Example
///
/// ```
/// use snowmill::SnowflakeId;
///
/// let id = SnowflakeId::from_components(1000, 5, 42);
/// assert_eq!(id.to_raw(), 2_097_172_522);
/// assert_eq!(id.timestamp(), 1000);
/// assert_eq!(id.machine_id(), 5);
/// assert_eq!(id.sequence(), 42);
/// ```
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(transparent)
)]
#[derive(Copy, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SnowflakeId {
    id: u64,
}

impl SnowflakeId {
    /// Bitmask for the 43-bit timestamp field, before shifting.
    pub const TIMESTAMP_MASK: u64 = MAX_TIMESTAMP;

    /// Bitmask for the 9-bit machine ID field, before shifting.
    pub const MACHINE_ID_MASK: u64 = MAX_MACHINE_ID as u64;

    /// Bitmask for the 12-bit sequence field.
    pub const SEQUENCE_MASK: u64 = MAX_SEQUENCE as u64;

    /// Packs the three components into an ID.
    ///
    /// Components wider than their field are truncated to it.
    pub const fn from_components(timestamp: u64, machine_id: u64, sequence: u64) -> Self {
        let timestamp = (timestamp & Self::TIMESTAMP_MASK) << TIMESTAMP_SHIFT;
        let machine_id = (machine_id & Self::MACHINE_ID_MASK) << MACHINE_ID_SHIFT;
        let sequence = sequence & Self::SEQUENCE_MASK;
        Self {
            id: timestamp | machine_id | sequence,
        }
    }

    /// Wraps a raw integer without validation.
    pub const fn from_raw(raw: u64) -> Self {
        Self { id: raw }
    }

    /// Returns the raw integer.
    pub const fn to_raw(&self) -> u64 {
        self.id
    }

    /// Milliseconds since the start time.
    pub const fn timestamp(&self) -> u64 {
        self.id >> TIMESTAMP_SHIFT
    }

    /// Extracts the machine ID.
    pub const fn machine_id(&self) -> u64 {
        (self.id >> MACHINE_ID_SHIFT) & Self::MACHINE_ID_MASK
    }

    /// Extracts the sequence number.
    pub const fn sequence(&self) -> u64 {
        self.id & Self::SEQUENCE_MASK
    }

    /// Splits the ID into its components.
    pub const fn parse(&self) -> ParsedId {
        ParsedId {
            id: self.id,
            sequence: self.sequence(),
            machine_id: self.machine_id(),
            timestamp: self.timestamp(),
        }
    }

    /// Returns the ID as a zero-padded 20-digit string.
    pub fn to_padded_string(&self) -> String {
        format!("{:020}", self.id)
    }
}

impl fmt::Display for SnowflakeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.id, f)
    }
}

impl fmt::Debug for SnowflakeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SnowflakeId")
            .field("id", &self.id)
            .field("timestamp", &self.timestamp())
            .field("machine_id", &self.machine_id())
            .field("sequence", &self.sequence())
            .finish()
    }
}

impl From<u64> for SnowflakeId {
    fn from(raw: u64) -> Self {
        Self::from_raw(raw)
    }
}

impl From<SnowflakeId> for u64 {
    fn from(id: SnowflakeId) -> Self {
        id.to_raw()
    }
}

impl FromStr for SnowflakeId {
    type Err = ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse::<u64>().map(Self::from_raw)
    }
}

/// The components of a Snowflake ID.
///
/// A pure projection of the raw value: it has no lifecycle of its own and can
/// be produced from any `u64`, generated or not.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct ParsedId {
    /// The raw ID.
    pub id: u64,
    /// The sequence number.
    pub sequence: u64,
    /// The machine ID.
    pub machine_id: u64,
    /// Milliseconds elapsed since the start time.
    pub timestamp: u64,
}

impl ParsedId {
    /// Reconstructs the wall-clock time the ID was generated at, given the
    /// start time the generator was configured with.
    ///
    /// The start time is truncated to whole milliseconds first. Results
    /// beyond the representable range saturate.
    pub fn generate_time(&self, start_time: DateTime<Utc>) -> DateTime<Utc> {
        let elapsed = i64::try_from(self.timestamp).unwrap_or(i64::MAX);
        start_time
            .timestamp_millis()
            .checked_add(elapsed)
            .and_then(DateTime::from_timestamp_millis)
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }
}

impl From<SnowflakeId> for ParsedId {
    fn from(id: SnowflakeId) -> Self {
        id.parse()
    }
}

/// Decodes a raw ID into its components.
///
/// This is the exact inverse of the packing done by the generator and never
/// fails: any `u64` decodes deterministically.
///
/// ```
/// let parsed = snowmill::parse_id(2_097_172_522);
/// assert_eq!(parsed.timestamp, 1000);
/// assert_eq!(parsed.machine_id, 5);
/// assert_eq!(parsed.sequence, 42);
/// ```
pub const fn parse_id(id: u64) -> ParsedId {
    SnowflakeId::from_raw(id).parse()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DEFAULT_START_TIME_MILLIS;

    #[test]
    fn layout_constants() {
        assert_eq!(MAX_SEQUENCE, 4095);
        assert_eq!(MAX_MACHINE_ID, 511);
        assert_eq!(MAX_TIMESTAMP, 8_796_093_022_207);
        assert_eq!(TIMESTAMP_SHIFT, 21);
        assert_eq!(MACHINE_ID_SHIFT, 12);
        assert_eq!(TIMESTAMP_LENGTH + MACHINE_ID_LENGTH + SEQUENCE_LENGTH, 64);
        assert_eq!(u32::from(TIMESTAMP_SHIFT + TIMESTAMP_LENGTH), u64::BITS);
    }

    #[test]
    fn packs_literal_example() {
        let id = SnowflakeId::from_components(1000, 5, 42);
        assert_eq!(id.to_raw(), (1000 << 21) | (5 << 12) | 42);
        assert_eq!(id.to_raw(), 2_097_172_522);
    }

    #[test]
    fn parses_literal_example() {
        let parsed = parse_id(2_097_172_522);
        assert_eq!(
            parsed,
            ParsedId {
                id: 2_097_172_522,
                sequence: 42,
                machine_id: 5,
                timestamp: 1000,
            }
        );
    }

    #[test]
    fn components_at_their_maximum() {
        let id = SnowflakeId::from_components(
            MAX_TIMESTAMP,
            u64::from(MAX_MACHINE_ID),
            u64::from(MAX_SEQUENCE),
        );
        assert_eq!(id.to_raw(), u64::MAX);
        assert_eq!(id.timestamp(), MAX_TIMESTAMP);
        assert_eq!(id.machine_id(), u64::from(MAX_MACHINE_ID));
        assert_eq!(id.sequence(), u64::from(MAX_SEQUENCE));
    }

    #[test]
    fn oversized_components_are_truncated() {
        let id = SnowflakeId::from_components(0, 512, 4096);
        assert_eq!(id.to_raw(), 0);
    }

    #[test]
    fn foreign_values_still_decode() {
        let parsed = parse_id(u64::MAX);
        assert_eq!(parsed.sequence, 4095);
        assert_eq!(parsed.machine_id, 511);
        assert_eq!(parsed.timestamp, MAX_TIMESTAMP);
    }

    #[test]
    fn top_bit_belongs_to_timestamp() {
        let id = SnowflakeId::from_components(1 << 42, 3, 7);
        assert_eq!(id.to_raw() >> 63, 1);
        assert_eq!(id.timestamp(), 1 << 42);
        assert_eq!(id.machine_id(), 3);
        assert_eq!(id.sequence(), 7);
    }

    #[test]
    fn ordering_follows_timestamp_then_sequence() {
        let a = SnowflakeId::from_components(10, 1, 4000);
        let b = SnowflakeId::from_components(11, 1, 0);
        let c = SnowflakeId::from_components(11, 1, 1);
        assert!(a < b && b < c);
    }

    #[test]
    fn generate_time_adds_elapsed_to_start() {
        let start = DateTime::from_timestamp_millis(DEFAULT_START_TIME_MILLIS).unwrap();
        let parsed = parse_id(2_097_172_522);
        let at = parsed.generate_time(start);
        assert_eq!(at.timestamp_millis(), DEFAULT_START_TIME_MILLIS + 1000);
        assert_eq!(at.to_rfc3339(), "2008-11-10T23:00:01+00:00");
    }

    #[test]
    fn display_and_from_str() {
        let id = SnowflakeId::from_raw(2_097_172_522);
        assert_eq!(id.to_string(), "2097172522");
        assert_eq!(id.to_padded_string(), "00000000002097172522");
        assert_eq!(" 2097172522 ".parse::<SnowflakeId>().unwrap(), id);
        assert!("not-an-id".parse::<SnowflakeId>().is_err());
        assert_eq!(u64::from(id), 2_097_172_522);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn serde_uses_raw_integer() {
        let id = SnowflakeId::from_raw(2_097_172_522);
        assert_eq!(serde_json::to_string(&id).unwrap(), "2097172522");
        let back: SnowflakeId = serde_json::from_str("2097172522").unwrap();
        assert_eq!(back, id);

        let parsed = serde_json::to_value(id.parse()).unwrap();
        assert_eq!(parsed["machine_id"], 5);
        assert_eq!(parsed["sequence"], 42);
        assert_eq!(parsed["timestamp"], 1000);
    }
}
