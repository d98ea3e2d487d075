use std::fmt;
use std::io;

use crate::reader::ReaderError;

/// Result alias for pipeline operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced at the run boundary of an import, model generation or
/// expression merge.
///
/// Any of these aborts the run; the open store session is dropped and its
/// transaction rolled back.
#[derive(Debug)]
pub enum Error {
    /// An unparseable annotation line, attribute or expression table row.
    Reader(ReaderError),
    /// A record that parsed but cannot be placed in the gene/transcript/exon
    /// hierarchy (e.g. an exon with no preceding transcript).
    Malformed {
        /// The line number of the record.
        line: usize,
        /// The error message.
        message: String,
    },
    /// An import was requested for a dataset name that already exists.
    DuplicateDataset(String),
    /// An expression merge targeted a dataset that does not exist.
    UnknownDataset(String),
    /// Model generation found a gene without any non-model exon.
    NoExonsForGene {
        gene_id: i64,
        name: String,
    },
    /// A database error.
    Store(rusqlite::Error),
    /// An attribute map could not be encoded or decoded.
    Json(serde_json::Error),
    /// An I/O error outside of record parsing.
    Io(io::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Reader(err) if err.is_malformed() => write!(f, "malformed record: {err}"),
            Error::Reader(err) => write!(f, "{err}"),
            Error::Malformed { line, message } => {
                write!(f, "malformed annotation record at line {line}: {message}")
            }
            Error::DuplicateDataset(name) => write!(f, "dataset '{name}' already exists"),
            Error::UnknownDataset(name) => write!(f, "dataset '{name}' does not exist"),
            Error::NoExonsForGene { gene_id, name } => {
                write!(f, "gene {name} (id {gene_id}) has no exons to build a model from")
            }
            Error::Store(err) => write!(f, "store error: {err}"),
            Error::Json(err) => write!(f, "attribute encoding error: {err}"),
            Error::Io(err) => write!(f, "I/O error: {err}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Reader(err) => Some(err),
            Error::Store(err) => Some(err),
            Error::Json(err) => Some(err),
            Error::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl Error {
    /// Returns `true` for every malformed-record condition, whichever stage
    /// detected it.
    pub fn is_malformed(&self) -> bool {
        match self {
            Error::Reader(err) => err.is_malformed(),
            Error::Malformed { .. } => true,
            _ => false,
        }
    }
}

impl From<ReaderError> for Error {
    fn from(err: ReaderError) -> Self {
        Error::Reader(err)
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::Store(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Json(err)
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::Io(err)
    }
}
