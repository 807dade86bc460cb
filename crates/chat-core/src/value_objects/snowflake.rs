//! Snowflake ID - 64-bit identifier issued by the remote platform
//!
//! Structure:
//! - Bits 63-22: Timestamp (milliseconds since the platform epoch)
//! - Bits 21-17: Internal worker ID
//! - Bits 16-12: Internal process ID
//! - Bits 11-0:  Increment
//!
//! IDs are only ever received, never generated locally. Because the
//! timestamp occupies the high bits, ordering two snowflakes orders
//! them by creation time.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Platform-issued Snowflake ID
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Snowflake(i64);

impl Snowflake {
    /// Platform epoch: 2015-01-01 00:00:00 UTC (milliseconds)
    pub const EPOCH: i64 = 1_420_070_400_000;

    /// Create a new Snowflake from a raw i64 value
    #[inline]
    pub const fn new(id: i64) -> Self {
        Self(id)
    }

    /// Get the inner i64 value
    #[inline]
    pub const fn into_inner(self) -> i64 {
        self.0
    }

    /// Check if the Snowflake is zero (uninitialized)
    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Extract timestamp (milliseconds since Unix epoch)
    #[inline]
    pub const fn timestamp(&self) -> i64 {
        (self.0 >> 22) + Self::EPOCH
    }

    /// Extract the internal worker ID (0-31)
    #[inline]
    pub const fn worker_id(&self) -> u8 {
        ((self.0 >> 17) & 0x1F) as u8
    }

    /// Extract the internal process ID (0-31)
    #[inline]
    pub const fn process_id(&self) -> u8 {
        ((self.0 >> 12) & 0x1F) as u8
    }

    /// Extract the increment (0-4095)
    #[inline]
    pub const fn increment(&self) -> u16 {
        (self.0 & 0xFFF) as u16
    }

    /// Convert timestamp to DateTime<Utc>
    pub fn created_at(&self) -> chrono::DateTime<chrono::Utc> {
        chrono::DateTime::from_timestamp_millis(self.timestamp()).unwrap_or_default()
    }

    /// Smallest snowflake that could have been issued at `millis` (Unix ms).
    ///
    /// Useful as a lower bound when comparing an ID against a wall-clock time.
    #[must_use]
    pub const fn from_timestamp(millis: i64) -> Self {
        Self((millis - Self::EPOCH) << 22)
    }

    /// Parse from string representation
    pub fn parse(s: &str) -> Result<Self, SnowflakeParseError> {
        s.parse::<i64>()
            .map(Snowflake)
            .map_err(|_| SnowflakeParseError::InvalidFormat)
    }
}

/// Error when parsing a Snowflake from string
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SnowflakeParseError {
    #[error("invalid snowflake format")]
    InvalidFormat,
}

impl fmt::Display for Snowflake {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for Snowflake {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

impl From<Snowflake> for i64 {
    fn from(id: Snowflake) -> Self {
        id.0
    }
}

impl std::str::FromStr for Snowflake {
    type Err = SnowflakeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Snowflake::parse(s)
    }
}

// The wire carries IDs as strings; numbers above 2^53 are not safe in JSON.
impl Serialize for Snowflake {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.0.to_string())
    }
}

// Deserialize from string or number
impl<'de> Deserialize<'de> for Snowflake {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        use serde::de::{self, Visitor};

        struct SnowflakeVisitor;

        impl Visitor<'_> for SnowflakeVisitor {
            type Value = Snowflake;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a string or integer representing a snowflake ID")
            }

            fn visit_i64<E>(self, value: i64) -> Result<Snowflake, E>
            where
                E: de::Error,
            {
                Ok(Snowflake(value))
            }

            fn visit_u64<E>(self, value: u64) -> Result<Snowflake, E>
            where
                E: de::Error,
            {
                i64::try_from(value)
                    .map(Snowflake)
                    .map_err(|_| de::Error::custom("snowflake out of range"))
            }

            fn visit_str<E>(self, value: &str) -> Result<Snowflake, E>
            where
                E: de::Error,
            {
                value
                    .parse::<i64>()
                    .map(Snowflake)
                    .map_err(|_| de::Error::custom("invalid snowflake string"))
            }
        }

        deserializer.deserialize_any(SnowflakeVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snowflake_parse() {
        let sf = Snowflake::parse("175928847299117063").unwrap();
        assert_eq!(sf.into_inner(), 175_928_847_299_117_063);

        assert!(Snowflake::parse("invalid").is_err());
    }

    #[test]
    fn test_snowflake_zero() {
        assert!(Snowflake::default().is_zero());
        assert!(!Snowflake::new(1).is_zero());
    }

    #[test]
    fn test_snowflake_components() {
        // Documented sample ID: 2016-04-30 11:18:25.796 UTC
        let sf = Snowflake::new(175_928_847_299_117_063);
        assert_eq!(sf.timestamp(), 1_462_015_105_796);
        assert_eq!(sf.worker_id(), 1);
        assert_eq!(sf.process_id(), 0);
        assert_eq!(sf.increment(), 7);
        assert_eq!(sf.created_at().timestamp_millis(), 1_462_015_105_796);
    }

    #[test]
    fn test_snowflake_from_timestamp_orders_by_time() {
        let earlier = Snowflake::from_timestamp(1_600_000_000_000);
        let later = Snowflake::from_timestamp(1_600_000_000_001);
        assert!(earlier < later);
        assert_eq!(earlier.timestamp(), 1_600_000_000_000);
    }

    #[test]
    fn test_snowflake_serialize_json() {
        let sf = Snowflake::new(123_456_789_012_345_678);
        let json = serde_json::to_string(&sf).unwrap();
        assert_eq!(json, "\"123456789012345678\"");
    }

    #[test]
    fn test_snowflake_deserialize_string_or_number() {
        let sf: Snowflake = serde_json::from_str("\"123456789012345678\"").unwrap();
        assert_eq!(sf.into_inner(), 123_456_789_012_345_678);

        let sf: Snowflake = serde_json::from_str("12345").unwrap();
        assert_eq!(sf.into_inner(), 12345);
    }

    #[test]
    fn test_snowflake_deserialize_rejects_garbage() {
        assert!(serde_json::from_str::<Snowflake>("\"abc\"").is_err());
        assert!(serde_json::from_str::<Snowflake>("18446744073709551615").is_err());
    }
}
