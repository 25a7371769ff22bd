//! Human-readable byte sizes for config limits and log output

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("empty size")]
    Empty,

    #[error("invalid number in size '{0}'")]
    InvalidNumber(String),

    #[error("unknown size unit '{0}'")]
    InvalidUnit(String),

    #[error("size '{0}' does not fit in 64 bits")]
    Overflow(String),
}

const KIB: u64 = 1024;

const UNITS: [(&str, u64); 5] = [
    ("TB", KIB * KIB * KIB * KIB),
    ("GB", KIB * KIB * KIB),
    ("MB", KIB * KIB),
    ("KB", KIB),
    ("B", 1),
];

/// Byte count that deserializes from either an integer or text like
/// `"64KB"` or `"1.5MB"`. Units are binary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "ByteSizeRepr")]
pub struct ByteSize(pub u64);

#[derive(Deserialize)]
#[serde(untagged)]
enum ByteSizeRepr {
    Int(u64),
    Text(String),
}

impl TryFrom<ByteSizeRepr> for ByteSize {
    type Error = ParseError;

    fn try_from(repr: ByteSizeRepr) -> Result<Self, Self::Error> {
        match repr {
            ByteSizeRepr::Int(bytes) => Ok(ByteSize(bytes)),
            ByteSizeRepr::Text(text) => text.parse(),
        }
    }
}

impl ByteSize {
    pub fn as_u64(&self) -> u64 {
        self.0
    }

    pub fn as_usize(&self) -> usize {
        usize::try_from(self.0).unwrap_or(usize::MAX)
    }
}

fn unit_multiplier(unit: &str) -> Option<u64> {
    let multiplier = match unit {
        "" | "B" => 1,
        "K" | "KB" | "KIB" => KIB,
        "M" | "MB" | "MIB" => KIB * KIB,
        "G" | "GB" | "GIB" => KIB * KIB * KIB,
        "T" | "TB" | "TIB" => KIB * KIB * KIB * KIB,
        _ => return None,
    };
    Some(multiplier)
}

impl FromStr for ByteSize {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_uppercase();
        if normalized.is_empty() {
            return Err(ParseError::Empty);
        }

        let split = normalized
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(normalized.len());
        let (number, unit) = normalized.split_at(split);

        let multiplier =
            unit_multiplier(unit.trim()).ok_or_else(|| ParseError::InvalidUnit(unit.trim().to_string()))?;

        let (whole, fraction) = match number.split_once('.') {
            Some((whole, fraction)) => (whole, fraction),
            None => (number, ""),
        };
        if whole.is_empty() && fraction.is_empty() {
            return Err(ParseError::InvalidNumber(s.to_string()));
        }

        let whole: u64 = if whole.is_empty() {
            0
        } else {
            whole
                .parse()
                .map_err(|_| ParseError::InvalidNumber(s.to_string()))?
        };

        let mut bytes = whole
            .checked_mul(multiplier)
            .ok_or_else(|| ParseError::Overflow(s.to_string()))?;

        if !fraction.is_empty() {
            let fraction: f64 = format!("0.{fraction}")
                .parse()
                .map_err(|_| ParseError::InvalidNumber(s.to_string()))?;
            bytes = bytes
                .checked_add((fraction * multiplier as f64) as u64)
                .ok_or_else(|| ParseError::Overflow(s.to_string()))?;
        }

        Ok(ByteSize(bytes))
    }
}

impl fmt::Display for ByteSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (unit, divisor) = UNITS
            .iter()
            .copied()
            .find(|&(_, divisor)| self.0 >= divisor)
            .unwrap_or(("B", 1));

        if divisor == 1 || self.0 % divisor == 0 {
            return write!(f, "{}{}", self.0 / divisor, unit);
        }

        let tenths = (self.0 % divisor) * 10 / divisor;
        if tenths == 0 {
            write!(f, "{}{}", self.0 / divisor, unit)
        } else {
            write!(f, "{}.{}{}", self.0 / divisor, tenths, unit)
        }
    }
}
