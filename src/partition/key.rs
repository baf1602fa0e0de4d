//! Ordering key domains a partition can range over
//!
//! Two domains are supported out of the box: signed integers (star counts,
//! comment counts) and calendar dates (creation or update dates).

use chrono::{Days, NaiveDate};
use std::fmt::{Debug, Display};
use thiserror::Error;

/// Errors raised while building or restoring partition keys
#[derive(Debug, Error)]
pub enum KeyError {
    #[error("Invalid {domain} key '{value}': {reason}")]
    Parse {
        domain: &'static str,
        value: String,
        reason: String,
    },

    #[error("Inverted range: lower bound {lower} is above upper bound {upper}")]
    InvertedRange { lower: String, upper: String },
}

/// A totally ordered key that ranges can be bisected over
///
/// Implementations must guarantee that for `lower < upper`,
/// `lower <= floor_midpoint(lower, upper) < upper`, so that
/// `[lower, mid]` and `[mid.successor(), upper]` are both non-empty.
pub trait PartitionKey: Copy + Ord + Debug + Display + Send + Sync + 'static {
    /// Human readable name of the domain, used in error messages
    const DOMAIN: &'static str;

    /// Floor midpoint of an inclusive range
    fn floor_midpoint(lower: Self, upper: Self) -> Self;

    /// The next key in the domain
    ///
    /// Only called on a midpoint, which is strictly below some upper bound.
    fn successor(self) -> Self;

    /// Renders the key for the queue checkpoint
    fn to_checkpoint(&self) -> String;

    /// Parses a key back from its checkpoint (or config) form
    fn from_checkpoint(value: &str) -> Result<Self, KeyError>;
}

impl PartitionKey for i64 {
    const DOMAIN: &'static str = "integer";

    fn floor_midpoint(lower: Self, upper: Self) -> Self {
        // Widen so that ranges spanning most of i64 cannot overflow
        let span = i128::from(upper) - i128::from(lower);
        (i128::from(lower) + span.div_euclid(2)) as i64
    }

    fn successor(self) -> Self {
        self.saturating_add(1)
    }

    fn to_checkpoint(&self) -> String {
        self.to_string()
    }

    fn from_checkpoint(value: &str) -> Result<Self, KeyError> {
        value.trim().parse().map_err(|e: std::num::ParseIntError| KeyError::Parse {
            domain: Self::DOMAIN,
            value: value.to_string(),
            reason: e.to_string(),
        })
    }
}

impl PartitionKey for NaiveDate {
    const DOMAIN: &'static str = "date";

    fn floor_midpoint(lower: Self, upper: Self) -> Self {
        let elapsed = (upper - lower).num_days().max(0) as u64;
        lower
            .checked_add_days(Days::new(elapsed / 2))
            .unwrap_or(lower)
    }

    fn successor(self) -> Self {
        self.succ_opt().unwrap_or(self)
    }

    fn to_checkpoint(&self) -> String {
        self.format("%Y-%m-%d").to_string()
    }

    fn from_checkpoint(value: &str) -> Result<Self, KeyError> {
        let trimmed = value.trim();
        // Accept full timestamps too; only the calendar day matters
        let day = trimmed.get(..10).unwrap_or(trimmed);
        NaiveDate::parse_from_str(day, "%Y-%m-%d").map_err(|e| KeyError::Parse {
            domain: Self::DOMAIN,
            value: value.to_string(),
            reason: e.to_string(),
        })
    }
}
