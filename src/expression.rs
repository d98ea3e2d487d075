//! Per-cell-type isoform expression tables.
//!
//! The table is whitespace-delimited with one header line. Columns, by
//! position: an unused row label, average expression, percent expressing,
//! transcript id, cell type and scaled average expression.

use std::io::{self, BufRead, BufReader};
use std::path::Path;
use std::time::{Duration, Instant};

use indexmap::IndexMap;
use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::reader::{open_input, Compression, ReaderError, ReaderResult};
use crate::store::Store;

const EXPRESSION_FIELD_COUNT: usize = 6;

/// Statistics of one transcript in one cell type.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExpressionStats {
    pub avg_exp: f64,
    pub pct_exp: f64,
    pub avg_exp_scaled: f64,
}

/// One entry of a transcript's `expression` attribute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpressionRecord {
    pub cell_type: String,
    pub avg_exp: f64,
    pub pct_exp: f64,
    pub avg_exp_scaled: f64,
}

/// Expression statistics grouped by transcript id, then by cell type.
///
/// Transcripts and cell types keep the order they were first seen in; a
/// repeated (transcript, cell type) row overwrites the earlier values in place.
#[derive(Debug, Clone, Default)]
pub struct ExpressionTable {
    transcripts: IndexMap<String, IndexMap<String, ExpressionStats>>,
    rows: usize,
}

impl ExpressionTable {
    /// Loads a table from a path, decompressing by extension.
    pub fn from_path<P: AsRef<Path>>(path: P) -> ReaderResult<Self> {
        let stream = open_input(path.as_ref(), Compression::Auto)?;
        Self::from_reader(BufReader::new(stream))
    }

    /// Loads a table from any buffered reader.
    ///
    /// # Example
    ///
    /// ```
    /// use gxfstore::expression::ExpressionTable;
    ///
    /// let data = "id avg_exp pct_exp features.plot id avg_exp_scaled\n\
    ///     1 0.5 10.0 PB-1-1 Bcell 0.2\n";
    /// let table = ExpressionTable::from_reader(data.as_bytes()).unwrap();
    /// assert_eq!(table.len(), 1);
    /// assert_eq!(table.records("PB_1_1").unwrap()[0].cell_type, "Bcell");
    /// ```
    pub fn from_reader<R: BufRead>(mut reader: R) -> ReaderResult<Self> {
        let mut table = Self::default();
        let mut line = String::with_capacity(256);
        let mut line_number = 0usize;

        loop {
            line.clear();
            let bytes = reader.read_line(&mut line).map_err(|err| {
                if err.kind() == io::ErrorKind::InvalidData {
                    ReaderError::InvalidEncoding {
                        line: line_number + 1,
                        message: err.to_string(),
                    }
                } else {
                    ReaderError::Io(err)
                }
            })?;
            if bytes == 0 {
                break;
            }
            line_number += 1;
            if line_number == 1 || line.trim().is_empty() {
                continue;
            }
            table.push_line(&line, line_number)?;
        }

        Ok(table)
    }

    fn push_line(&mut self, line: &str, line_number: usize) -> ReaderResult<()> {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        if tokens.len() < EXPRESSION_FIELD_COUNT {
            return Err(ReaderError::unexpected_field_count(
                line_number,
                EXPRESSION_FIELD_COUNT,
                tokens.len(),
            ));
        }

        let stats = ExpressionStats {
            avg_exp: parse_stat(tokens[1], "avg_exp", line_number)?,
            pct_exp: parse_stat(tokens[2], "pct_exp", line_number)?,
            avg_exp_scaled: parse_stat(tokens[5], "avg_exp_scaled", line_number)?,
        };
        let transcript_id = tokens[3].replace('-', "_");

        self.transcripts
            .entry(transcript_id)
            .or_default()
            .insert(tokens[4].to_string(), stats);
        self.rows += 1;
        Ok(())
    }

    /// Number of distinct transcripts.
    pub fn len(&self) -> usize {
        self.transcripts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transcripts.is_empty()
    }

    /// Number of data rows read, including overwritten repeats.
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Returns the per-cell-type records of a transcript, in table order.
    pub fn records(&self, transcript_id: &str) -> Option<Vec<ExpressionRecord>> {
        self.transcripts.get(transcript_id).map(to_records)
    }

    /// Iterates over transcripts and their records, in table order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, Vec<ExpressionRecord>)> + '_ {
        self.transcripts
            .iter()
            .map(|(transcript_id, cells)| (transcript_id.as_str(), to_records(cells)))
    }
}

fn to_records(cells: &IndexMap<String, ExpressionStats>) -> Vec<ExpressionRecord> {
    cells
        .iter()
        .map(|(cell_type, stats)| ExpressionRecord {
            cell_type: cell_type.clone(),
            avg_exp: stats.avg_exp,
            pct_exp: stats.pct_exp,
            avg_exp_scaled: stats.avg_exp_scaled,
        })
        .collect()
}

/// Parses a finite float; `NaN` and infinities are rejected.
fn parse_stat(raw: &str, field: &'static str, line: usize) -> ReaderResult<f64> {
    match raw.parse::<f64>() {
        Ok(value) if value.is_finite() => Ok(value),
        Ok(_) => Err(ReaderError::invalid_field(
            line,
            field,
            format!("ERROR: '{raw}' is not a finite number"),
        )),
        Err(_) => Err(ReaderError::invalid_field(
            line,
            field,
            format!("ERROR: could not parse '{raw}' as float"),
        )),
    }
}

/// Outcome of an expression merge.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExpressionSummary {
    /// Distinct transcripts in the table.
    pub transcripts: usize,
    /// Transcript rows updated in the store.
    pub updated: usize,
    /// Table transcripts that matched no stored transcript.
    pub unmatched: usize,
    pub elapsed: Duration,
}

/// Attaches the table's statistics to the transcripts of `dataset`.
///
/// Transcripts are matched on their annotation transcript id within the
/// dataset; table entries without a match are counted, never raised. The merge
/// runs in one transaction.
///
/// # Errors
///
/// [`Error::UnknownDataset`] if `dataset` does not exist; store errors roll
/// the whole merge back.
pub fn merge_expression(store: &mut Store, table: &ExpressionTable, dataset: &str) -> Result<ExpressionSummary> {
    let tic = Instant::now();
    let session = store.session()?;
    let dataset_id = session
        .dataset_id(dataset)?
        .ok_or_else(|| Error::UnknownDataset(dataset.to_string()))?;

    let mut summary = ExpressionSummary {
        transcripts: table.len(),
        ..Default::default()
    };
    for (transcript_id, records) in table.iter() {
        let updated = session.merge_transcript_expression(transcript_id, dataset_id, &records)?;
        if updated == 0 {
            debug!("no transcript {transcript_id} in dataset {dataset}");
            summary.unmatched += 1;
        }
        summary.updated += updated;
    }
    session.commit()?;

    summary.elapsed = tic.elapsed();
    info!(
        "updated {} transcripts of {} read ({} unmatched) in {:.3?}",
        summary.updated, summary.transcripts, summary.unmatched, summary.elapsed
    );
    Ok(summary)
}

/// Reads an expression table from `path` and merges it into `dataset`.
pub fn import_expression<P: AsRef<Path>>(store: &mut Store, path: P, dataset: &str) -> Result<ExpressionSummary> {
    let table = ExpressionTable::from_path(path)?;
    info!("read {} transcripts ({} rows)", table.len(), table.rows());
    merge_expression(store, &table, dataset)
}

#[cfg(test)]
mod tests {
    use super::*;

    const TABLE: &str = "\tavg.exp\tpct.exp\tfeatures.plot\tid\tavg.exp.scaled
1\t0.25\t12.5\tPB-10-1\tTcell\t-0.3
2\t1.5\t40\tPB-10-1\tBcell\t1.1
3\t0.0\t0\tPB-11-2\tTcell\t-1.0
4\t2.5\t50\tPB-10-1\tTcell\t0.9
";

    #[test]
    fn groups_rows_by_transcript_and_cell_type() {
        let table = ExpressionTable::from_reader(TABLE.as_bytes()).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.rows(), 4);

        let records = table.records("PB_10_1").unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].cell_type, "Tcell");
        assert_eq!(records[1].cell_type, "Bcell");
        // the repeated Tcell row wins but keeps its first position
        assert_eq!(records[0].avg_exp, 2.5);
        assert_eq!(records[0].pct_exp, 50.0);
        assert_eq!(records[0].avg_exp_scaled, 0.9);

        let order: Vec<_> = table.iter().map(|(transcript_id, _)| transcript_id).collect();
        assert_eq!(order, vec!["PB_10_1", "PB_11_2"]);
        assert!(table.records("PB-10-1").is_none());
    }

    #[test]
    fn header_only_table_is_empty() {
        let table = ExpressionTable::from_reader("a b c d e f\n\n".as_bytes()).unwrap();
        assert!(table.is_empty());
    }

    #[test]
    fn short_rows_are_malformed() {
        let err = ExpressionTable::from_reader("header\n1 0.1 2 PB-1\n".as_bytes()).unwrap_err();
        assert!(matches!(
            err,
            ReaderError::UnexpectedFieldCount { line: 2, expected: 6, actual: 4 }
        ));
    }

    #[test]
    fn non_finite_statistics_are_malformed() {
        for raw in ["NaN", "nan", "inf", "-Infinity"] {
            let data = format!("header\n1 0.5 10 PB-1 T {raw}\n");
            let err = ExpressionTable::from_reader(data.as_bytes()).unwrap_err();
            assert!(matches!(
                err,
                ReaderError::InvalidField { line: 2, field: "avg_exp_scaled", .. }
            ));
        }
    }

    #[test]
    fn invalid_utf8_is_an_encoding_error() {
        let data: &[u8] = b"header\n1 0.5 10 PB-\xff T 0.1\n";
        let err = ExpressionTable::from_reader(data).unwrap_err();
        assert!(matches!(err, ReaderError::InvalidEncoding { line: 2, .. }));
        assert!(err.is_malformed());
    }

    #[test]
    fn non_numeric_statistics_are_malformed() {
        let err = ExpressionTable::from_reader("header\n1 high 2 PB-1 T 0.1\n".as_bytes()).unwrap_err();
        assert!(matches!(err, ReaderError::InvalidField { line: 2, field: "avg_exp", .. }));
    }
}
