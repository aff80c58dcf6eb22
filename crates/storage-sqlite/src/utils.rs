//! Column conversion helpers shared by the repositories.

use std::fmt::Display;
use std::str::FromStr;

use chrono::{DateTime, NaiveDateTime, Utc};

use crate::errors::StorageError;

/// Timestamps are stored as naive UTC.
pub fn to_naive(at: DateTime<Utc>) -> NaiveDateTime {
    at.naive_utc()
}

pub fn from_naive(at: NaiveDateTime) -> DateTime<Utc> {
    at.and_utc()
}

/// Parses a text column into a domain type, naming the column on failure.
pub fn parse_column<T>(column: &str, value: &str) -> Result<T, StorageError>
where
    T: FromStr,
    T::Err: Display,
{
    value
        .parse::<T>()
        .map_err(|e| StorageError::SerializationError(format!("{} '{}': {}", column, value, e)))
}

/// Converts an integer column into a narrower unsigned type.
pub fn narrow<T, S>(column: &str, value: S) -> Result<T, StorageError>
where
    T: TryFrom<S>,
    S: Copy + Display,
{
    T::try_from(value)
        .map_err(|_| StorageError::SerializationError(format!("{} out of range: {}", column, value)))
}
