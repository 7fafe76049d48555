//! Human-readable byte sizes for configuration values ("64MB", "512KiB")

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("Invalid size format: {0}")]
    InvalidFormat(String),

    #[error("Invalid number: {0}")]
    InvalidNumber(#[from] std::num::ParseIntError),

    #[error("Invalid unit: {0}")]
    InvalidUnit(String),

    #[error("Size overflows u64: {0}")]
    Overflow(String),
}

const KIB: u64 = 1024;

/// Units largest first; the first alias is the display form.
const UNITS: &[(&[&str], u64)] = &[
    (&["TB", "T", "TIB"], KIB * KIB * KIB * KIB),
    (&["GB", "G", "GIB"], KIB * KIB * KIB),
    (&["MB", "M", "MIB"], KIB * KIB),
    (&["KB", "K", "KIB"], KIB),
    (&["B"], 1),
];

/// Byte count that deserializes from either an integer or a string with a
/// binary unit suffix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct ByteSize(pub u64);

impl ByteSize {
    pub const fn mib(n: u64) -> Self {
        ByteSize(n * KIB * KIB)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }

    /// Formats with the largest unit that keeps at most one decimal digit.
    pub fn to_human_readable(&self) -> String {
        for (aliases, factor) in UNITS {
            if self.0 < *factor {
                continue;
            }
            let whole = self.0 / factor;
            let tenth = (self.0 % factor) * 10 / factor;
            return if tenth == 0 {
                format!("{}{}", whole, aliases[0])
            } else {
                format!("{}.{}{}", whole, tenth, aliases[0])
            };
        }
        format!("{}B", self.0)
    }
}

impl FromStr for ByteSize {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_ascii_uppercase();
        let split = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
        let (digits, unit) = s.split_at(split);

        if digits.is_empty() {
            return Err(ParseError::InvalidFormat(s.clone()));
        }
        let value: u64 = digits.parse()?;

        let unit = unit.trim();
        if unit.is_empty() {
            return Ok(ByteSize(value));
        }

        let factor = UNITS
            .iter()
            .find(|(aliases, _)| aliases.contains(&unit))
            .map(|(_, factor)| *factor)
            .ok_or_else(|| ParseError::InvalidUnit(unit.to_string()))?;

        value
            .checked_mul(factor)
            .map(ByteSize)
            .ok_or(ParseError::Overflow(s))
    }
}

impl<'de> Deserialize<'de> for ByteSize {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct ByteSizeVisitor;

        impl serde::de::Visitor<'_> for ByteSizeVisitor {
            type Value = ByteSize;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a byte size as string (e.g., \"5MB\", \"1GB\") or integer")
            }

            fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                Ok(ByteSize(v))
            }

            fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                u64::try_from(v)
                    .map(ByteSize)
                    .map_err(|_| E::custom(format!("negative byte size: {v}")))
            }

            fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                v.parse::<ByteSize>().map_err(E::custom)
            }
        }

        deserializer.deserialize_any(ByteSizeVisitor)
    }
}

impl fmt::Display for ByteSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_human_readable())
    }
}
