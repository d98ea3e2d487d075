//! Interval union over 1-based closed coordinates.

use std::fmt;

/// A closed genomic interval `[start, end]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Interval {
    pub start: i64,
    pub end: i64,
}

impl Interval {
    pub fn new(start: i64, end: i64) -> Self {
        Self { start, end }
    }
}

impl From<(i64, i64)> for Interval {
    fn from((start, end): (i64, i64)) -> Self {
        Self { start, end }
    }
}

/// Interval union error kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnionError {
    /// The input set held no intervals.
    Empty,
}

impl fmt::Display for UnionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnionError::Empty => write!(f, "ERROR: cannot take the union of an empty interval set"),
        }
    }
}

impl std::error::Error for UnionError {}

/// Returns the minimal sorted set of disjoint intervals covering `intervals`.
///
/// Intervals are merged when the next start is `<=` the current end, so
/// touching intervals such as `(1, 5)` and `(5, 8)` merge while `(1, 2)` and
/// `(3, 4)` stay apart. The result does not depend on input order.
///
/// # Errors
///
/// Returns [`UnionError::Empty`] when `intervals` is empty.
///
/// # Examples
///
/// ```
/// use gxfstore::interval::{union, Interval};
///
/// let merged = union(&[(1, 5).into(), (10, 12).into(), (3, 7).into()]).unwrap();
/// assert_eq!(merged, vec![Interval::new(1, 7), Interval::new(10, 12)]);
/// ```
pub fn union(intervals: &[Interval]) -> Result<Vec<Interval>, UnionError> {
    if intervals.is_empty() {
        return Err(UnionError::Empty);
    }

    let mut sorted = intervals.to_vec();
    sorted.sort_unstable_by_key(|interval| interval.start);

    let mut merged: Vec<Interval> = Vec::with_capacity(sorted.len());
    for interval in sorted {
        match merged.last_mut() {
            Some(last) if interval.start <= last.end => {
                if interval.end > last.end {
                    last.end = interval.end;
                }
            }
            _ => merged.push(interval),
        }
    }

    Ok(merged)
}

/// Returns the `[min start, max end]` span covered by `intervals`.
pub fn span(intervals: &[Interval]) -> Option<Interval> {
    let start = intervals.iter().map(|interval| interval.start).min()?;
    let end = intervals.iter().map(|interval| interval.end).max()?;
    Some(Interval { start, end })
}
