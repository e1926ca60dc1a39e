//! Slot type tags and parse outcomes.
//!
//! A [`SlotType`] is everything the generator needs to know about a slot's
//! value domain. It decides the shape of the generated decision tree (string
//! store vs. parse call), which parse capability gets called, and how many
//! bytes the slot occupies in a tuple.

use std::fmt;
use std::mem;

use serde::{Deserialize, Serialize};

use crate::layout::StringValue;

/// Type of a tuple slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SlotType {
    Boolean,
    /// 8-bit signed integer.
    TinyInt,
    /// 16-bit signed integer.
    SmallInt,
    /// 32-bit signed integer.
    Int,
    /// 64-bit signed integer.
    BigInt,
    Float,
    Double,
    /// Unbounded variable-length string.
    String,
    /// Variable-length string bounded by a maximum length in bytes.
    Varchar(u32),
    /// Fixed-length character field of exactly `n` bytes, stored inline.
    Char(u32),
}

impl SlotType {
    /// Every type that is written by calling a parse capability.
    pub const SCALARS: [SlotType; 7] = [
        SlotType::Boolean,
        SlotType::TinyInt,
        SlotType::SmallInt,
        SlotType::Int,
        SlotType::BigInt,
        SlotType::Float,
        SlotType::Double,
    ];

    /// True for slots stored as a (pointer, length) pair.
    #[inline]
    pub fn is_var_len_string(self) -> bool {
        matches!(self, SlotType::String | SlotType::Varchar(_))
    }

    #[inline]
    pub fn is_scalar(self) -> bool {
        !self.is_var_len_string() && !matches!(self, SlotType::Char(_))
    }

    /// Bytes the slot occupies inside a tuple.
    pub fn byte_size(self) -> usize {
        match self {
            SlotType::Boolean | SlotType::TinyInt => 1,
            SlotType::SmallInt => 2,
            SlotType::Int | SlotType::Float => 4,
            SlotType::BigInt | SlotType::Double => 8,
            SlotType::String | SlotType::Varchar(_) => mem::size_of::<StringValue>(),
            SlotType::Char(n) => n as usize,
        }
    }

    /// Required alignment of the slot's first byte.
    pub fn alignment(self) -> usize {
        match self {
            SlotType::String | SlotType::Varchar(_) => mem::align_of::<StringValue>(),
            SlotType::Char(_) => 1,
            other => other.byte_size(),
        }
    }
}

impl fmt::Display for SlotType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SlotType::Boolean => write!(f, "BOOLEAN"),
            SlotType::TinyInt => write!(f, "TINYINT"),
            SlotType::SmallInt => write!(f, "SMALLINT"),
            SlotType::Int => write!(f, "INT"),
            SlotType::BigInt => write!(f, "BIGINT"),
            SlotType::Float => write!(f, "FLOAT"),
            SlotType::Double => write!(f, "DOUBLE"),
            SlotType::String => write!(f, "STRING"),
            SlotType::Varchar(n) => write!(f, "VARCHAR({n})"),
            SlotType::Char(n) => write!(f, "CHAR({n})"),
        }
    }
}

/// Status code returned by the C-ABI parse capabilities.
///
/// The numeric values are part of the calling convention between generated
/// code and the parse symbols; generated routines compare against them as
/// immediates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ParseResult {
    Success = 0,
    Failure = 1,
    Overflow = 2,
}

/// Outcome of parsing one field into a `T`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Parsed<T> {
    Success(T),
    Failure,
    /// Out of range for `T`; carries the value the parser chose to produce.
    Overflow(T),
}

impl<T> Parsed<T> {
    pub fn status(&self) -> ParseResult {
        match self {
            Parsed::Success(_) => ParseResult::Success,
            Parsed::Failure => ParseResult::Failure,
            Parsed::Overflow(_) => ParseResult::Overflow,
        }
    }

    /// The produced value, if any, regardless of overflow.
    pub fn value(self) -> Option<T> {
        match self {
            Parsed::Success(v) | Parsed::Overflow(v) => Some(v),
            Parsed::Failure => None,
        }
    }

    pub fn map_value<U>(self, f: impl FnOnce(T) -> U) -> Parsed<U> {
        match self {
            Parsed::Success(v) => Parsed::Success(f(v)),
            Parsed::Overflow(v) => Parsed::Overflow(f(v)),
            Parsed::Failure => Parsed::Failure,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar_sizes_match_alignment() {
        for ty in SlotType::SCALARS {
            assert_eq!(ty.byte_size(), ty.alignment(), "{ty}");
            assert!(ty.is_scalar());
        }
    }

    #[test]
    fn test_string_kinds() {
        assert!(SlotType::String.is_var_len_string());
        assert!(SlotType::Varchar(10).is_var_len_string());
        assert!(!SlotType::Char(10).is_var_len_string());
        assert!(!SlotType::Char(10).is_scalar());
        assert_eq!(SlotType::Char(3).byte_size(), 3);
    }

    #[test]
    fn test_display() {
        assert_eq!(SlotType::Varchar(5).to_string(), "VARCHAR(5)");
        assert_eq!(SlotType::BigInt.to_string(), "BIGINT");
    }

    #[test]
    fn test_parsed_status() {
        assert_eq!(Parsed::Success(1).status(), ParseResult::Success);
        assert_eq!(Parsed::<i32>::Failure.status(), ParseResult::Failure);
        assert_eq!(Parsed::Overflow(7).value(), Some(7));
        assert_eq!(Parsed::<i32>::Failure.value(), None);
    }
}
