use std::fmt;

use crate::reader::{ReaderError, ReaderResult};

/// Represents the strand of a genomic feature.
///
/// This enum is used to indicate the orientation of a feature on a reference sequence.
/// It is part of the gene natural key, so two annotations of the same gene name on
/// opposite strands are distinct genes.
///
/// # Example
///
/// ```
/// use gxfstore::strand::Strand;
///
/// let strand = Strand::Forward;
/// assert_eq!(strand.as_str(), "+");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Strand {
    /// Positive strand (`+`).
    Forward,
    /// Negative strand (`-`).
    Reverse,
    /// Not stranded (`.`).
    Unstranded,
    /// Strand exists but is unknown (`?`).
    Unknown,
}

impl Strand {
    /// Parses a GTF strand column into a `Strand`.
    ///
    /// # Errors
    ///
    /// This function returns an error if the string is not a valid strand.
    pub(crate) fn parse(raw: &str, line: usize) -> ReaderResult<Self> {
        Self::from_symbol(raw).ok_or_else(|| {
            ReaderError::invalid_field(
                line,
                "strand",
                format!("ERROR: expected '+', '-', '.', or '?', got '{raw}' in {line}:strand"),
            )
        })
    }

    /// Maps a strand symbol to a `Strand`, returning `None` for anything else.
    ///
    /// ```
    /// use gxfstore::strand::Strand;
    ///
    /// assert_eq!(Strand::from_symbol("-"), Some(Strand::Reverse));
    /// assert_eq!(Strand::from_symbol("."), Some(Strand::Unstranded));
    /// assert_eq!(Strand::from_symbol("?"), Some(Strand::Unknown));
    /// assert_eq!(Strand::from_symbol("x"), None);
    /// ```
    pub fn from_symbol(raw: &str) -> Option<Self> {
        match raw {
            "+" => Some(Strand::Forward),
            "-" => Some(Strand::Reverse),
            "." => Some(Strand::Unstranded),
            "?" => Some(Strand::Unknown),
            _ => None,
        }
    }

    /// Returns the symbol stored in the `strand` column.
    pub fn as_str(&self) -> &'static str {
        match self {
            Strand::Forward => "+",
            Strand::Reverse => "-",
            Strand::Unstranded => ".",
            Strand::Unknown => "?",
        }
    }

    /// Returns `true` for the minus strand.
    #[inline]
    pub fn is_reverse(&self) -> bool {
        matches!(self, Strand::Reverse)
    }
}

impl fmt::Display for Strand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
