//! Partitions of the search space
//!
//! A partition is an inclusive range over an ordering key, optionally tagged
//! with a label when the search space is the cross-product of a label set and
//! a key range. Partitions are immutable: resolving one either consumes it or
//! replaces it with its two halves.

mod key;

pub use key::{KeyError, PartitionKey};

use serde::{Deserialize, Serialize};
use std::fmt;

/// An inclusive key range to search, optionally scoped to a label
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Partition<K: PartitionKey> {
    label: Option<String>,
    lower: K,
    upper: K,
}

impl<K: PartitionKey> Partition<K> {
    /// Creates a partition, rejecting ranges whose lower bound exceeds the upper
    pub fn new(label: Option<String>, lower: K, upper: K) -> Result<Self, KeyError> {
        if lower > upper {
            return Err(KeyError::InvertedRange {
                lower: lower.to_checkpoint(),
                upper: upper.to_checkpoint(),
            });
        }
        Ok(Self {
            label,
            lower,
            upper,
        })
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    pub fn lower(&self) -> K {
        self.lower
    }

    pub fn upper(&self) -> K {
        self.upper
    }

    /// Returns true when the range holds a single key and cannot be split
    pub fn is_irreducible(&self) -> bool {
        self.lower == self.upper
    }

    /// Splits the range at its floor midpoint
    ///
    /// Returns `(lower_half, upper_half)` covering `[lower, mid]` and
    /// `[mid + 1, upper]`, or `None` for an irreducible partition.
    pub fn bisect(&self) -> Option<(Self, Self)> {
        if self.is_irreducible() {
            return None;
        }
        let mid = K::floor_midpoint(self.lower, self.upper);
        let lower_half = Self {
            label: self.label.clone(),
            lower: self.lower,
            upper: mid,
        };
        let upper_half = Self {
            label: self.label.clone(),
            lower: mid.successor(),
            upper: self.upper,
        };
        Some((lower_half, upper_half))
    }

    /// Converts to the serialized checkpoint form
    pub fn to_record(&self) -> PartitionRecord {
        PartitionRecord(
            self.label.clone(),
            self.lower.to_checkpoint(),
            self.upper.to_checkpoint(),
        )
    }

    /// Restores a partition from its checkpoint form
    pub fn from_record(record: &PartitionRecord) -> Result<Self, KeyError> {
        let PartitionRecord(label, lower, upper) = record;
        Self::new(
            label.clone(),
            K::from_checkpoint(lower)?,
            K::from_checkpoint(upper)?,
        )
    }
}

impl<K: PartitionKey> fmt::Display for Partition<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.label {
            Some(label) => write!(f, "({}, [{}, {}])", label, self.lower, self.upper),
            None => write!(f, "[{}, {}]", self.lower, self.upper),
        }
    }
}

/// Serialized partition descriptor: `[label_or_null, "lower", "upper"]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionRecord(pub Option<String>, pub String, pub String);

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    /// Asserts that the halves are disjoint and together cover the parent range
    fn assert_exact_cover(lo: i64, hi: i64) {
        let parent = Partition::new(None, lo, hi).unwrap();
        let (left, right) = parent.bisect().unwrap();

        assert_eq!(left.lower(), lo);
        assert_eq!(right.upper(), hi);
        assert!(left.lower() <= left.upper());
        assert!(right.lower() <= right.upper());
        assert_eq!(left.upper() + 1, right.lower());
    }

    #[test]
    fn test_new_rejects_inverted_range() {
        assert!(Partition::new(None, 5i64, 4).is_err());
        assert!(Partition::new(None, 5i64, 5).is_ok());
    }

    #[test]
    fn test_bisect_covers_range() {
        for (lo, hi) in [(0, 1), (10, 10000), (-3, 3), (7, 8), (100, 100000), (-10, -9)] {
            assert_exact_cover(lo, hi);
        }
    }

    #[test]
    fn test_bisect_exhaustive_small_ranges() {
        for lo in -6i64..6 {
            for hi in lo + 1..lo + 12 {
                assert_exact_cover(lo, hi);
            }
        }
    }

    #[test]
    fn test_bisect_irreducible() {
        let single = Partition::new(Some("bug".to_string()), 7i64, 7).unwrap();
        assert!(single.is_irreducible());
        assert!(single.bisect().is_none());
    }

    #[test]
    fn test_bisect_keeps_label() {
        let parent = Partition::new(Some("bug".to_string()), 1i64, 4).unwrap();
        let (left, right) = parent.bisect().unwrap();
        assert_eq!(left.label(), Some("bug"));
        assert_eq!(right.label(), Some("bug"));
        assert_eq!((left.lower(), left.upper()), (1, 2));
        assert_eq!((right.lower(), right.upper()), (3, 4));
    }

    #[test]
    fn test_bisect_dates() {
        let lo = NaiveDate::from_ymd_opt(2000, 1, 1).unwrap();
        let hi = NaiveDate::from_ymd_opt(2014, 4, 7).unwrap();
        let (left, right) = Partition::new(None, lo, hi).unwrap().bisect().unwrap();

        assert_eq!(left.lower(), lo);
        assert_eq!(right.upper(), hi);
        assert_eq!(left.upper().succ_opt().unwrap(), right.lower());
    }

    #[test]
    fn test_record_json_shape() {
        let partition = Partition::new(None, 100i64, 100000).unwrap();
        let json = serde_json::to_string(&partition.to_record()).unwrap();
        assert_eq!(json, r#"[null,"100","100000"]"#);

        let labelled = Partition::new(
            Some("enhancement".to_string()),
            NaiveDate::from_ymd_opt(2000, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2014, 4, 7).unwrap(),
        )
        .unwrap();
        let json = serde_json::to_string(&labelled.to_record()).unwrap();
        assert_eq!(json, r#"["enhancement","2000-01-01","2014-04-07"]"#);
    }

    #[test]
    fn test_from_record_validates() {
        let record = PartitionRecord(None, "9".to_string(), "3".to_string());
        assert!(Partition::<i64>::from_record(&record).is_err());

        let record = PartitionRecord(None, "x".to_string(), "3".to_string());
        assert!(Partition::<i64>::from_record(&record).is_err());

        let record = PartitionRecord(Some("bug".to_string()), "3".to_string(), "9".to_string());
        let partition = Partition::<i64>::from_record(&record).unwrap();
        assert_eq!(partition.to_record(), record);
    }
}
