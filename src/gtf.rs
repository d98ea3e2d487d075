use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::fmt;

use memchr::memchr;
use serde::{Deserialize, Serialize};

use crate::reader::{ReaderError, ReaderResult};
use crate::strand::Strand;

/// Number of tab-separated columns in a GTF record.
pub const GTF_FIELD_COUNT: usize = 9;

/// Attribute keys that may legitimately repeat within one record.
///
/// Values for these keys are always collected into an [`AttributeValue::Array`],
/// even when the key occurs once.
pub const MULTI_VALUED_KEYS: [&str; 3] = ["tag", "ccdsid", "ont"];

/// Attribute map of a single GTF record, keyed by attribute name.
pub type Attributes = BTreeMap<String, AttributeValue>;

/// Value of a GTF attribute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    /// A single value.
    Scalar(String),
    /// Ordered values of a multi-valued key.
    Array(Vec<String>),
}

impl AttributeValue {
    /// Returns the first value, for either variant.
    pub fn first(&self) -> Option<&str> {
        match self {
            AttributeValue::Scalar(value) => Some(value),
            AttributeValue::Array(values) => values.first().map(String::as_str),
        }
    }

    /// Returns the scalar value, or `None` for arrays.
    pub fn as_scalar(&self) -> Option<&str> {
        match self {
            AttributeValue::Scalar(value) => Some(value),
            AttributeValue::Array(_) => None,
        }
    }
}

/// Feature type of a GTF record (column 3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeatureKind {
    Gene,
    Transcript,
    Exon,
    /// Any other feature (`CDS`, `UTR`, `start_codon`, ...).
    Other(String),
}

impl FeatureKind {
    fn parse(raw: &str) -> Self {
        match raw {
            "gene" => FeatureKind::Gene,
            "transcript" => FeatureKind::Transcript,
            "exon" => FeatureKind::Exon,
            other => FeatureKind::Other(other.to_string()),
        }
    }
}

impl fmt::Display for FeatureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeatureKind::Gene => f.write_str("gene"),
            FeatureKind::Transcript => f.write_str("transcript"),
            FeatureKind::Exon => f.write_str("exon"),
            FeatureKind::Other(other) => f.write_str(other),
        }
    }
}

/// A single parsed GTF line.
///
/// Coordinates are kept exactly as written: 1-based and closed.
#[derive(Debug, Clone, PartialEq)]
pub struct Feature {
    /// 1-based line number in the source file.
    pub line: usize,
    pub chromosome: String,
    pub source: String,
    pub kind: FeatureKind,
    pub start: i64,
    pub end: i64,
    pub score: String,
    pub strand: Strand,
    pub frame: String,
    pub attributes: Attributes,
}

impl Feature {
    /// Parses a single line of a GTF file into a `Feature`.
    ///
    /// # Arguments
    ///
    /// * `line` - The raw line, without its terminator.
    /// * `line_number` - The 1-based line number for error reporting.
    pub fn parse(line: &str, line_number: usize) -> ReaderResult<Self> {
        let trimmed = line.trim_end_matches(['\n', '\r']);
        let fields: Vec<&str> = trimmed.splitn(GTF_FIELD_COUNT, '\t').collect();
        if fields.len() < GTF_FIELD_COUNT {
            return Err(ReaderError::unexpected_field_count(
                line_number,
                GTF_FIELD_COUNT,
                fields.len(),
            ));
        }

        let start = parse_coordinate(fields[3], "start", line_number)?;
        let end = parse_coordinate(fields[4], "end", line_number)?;
        let strand = Strand::parse(fields[6], line_number)?;

        Ok(Self {
            line: line_number,
            chromosome: fields[0].to_string(),
            source: fields[1].to_string(),
            kind: FeatureKind::parse(fields[2]),
            start,
            end,
            score: fields[5].to_string(),
            strand,
            frame: fields[7].to_string(),
            attributes: parse_attributes(fields[8]),
        })
    }

    /// Returns the first value of an attribute, if present.
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).and_then(AttributeValue::first)
    }

    /// Returns the `gene_name` attribute required for gene records.
    pub fn gene_name(&self) -> ReaderResult<&str> {
        self.attribute("gene_name")
            .ok_or(ReaderError::MissingAttribute {
                line: self.line,
                key: "gene_name",
            })
    }

    /// Returns the integer `exon_number` attribute required for exon records.
    pub fn exon_number(&self) -> ReaderResult<i64> {
        let raw = self.attribute("exon_number").ok_or(ReaderError::MissingAttribute {
            line: self.line,
            key: "exon_number",
        })?;
        raw.trim().parse::<i64>().map_err(|_| {
            ReaderError::invalid_field(
                self.line,
                "exon_number",
                format!("ERROR: could not parse '{raw}' as integer"),
            )
        })
    }
}

fn parse_coordinate(raw: &str, field: &'static str, line: usize) -> ReaderResult<i64> {
    raw.trim().parse::<i64>().map_err(|_| {
        ReaderError::invalid_field(
            line,
            field,
            format!("ERROR: could not parse '{raw}' as integer"),
        )
    })
}

/// Parses a GTF attribute column into an [`Attributes`] map.
///
/// Values may be quoted (`key "value"`) or bare (`key value`); a quoted value may
/// contain `;`. Keys listed in [`MULTI_VALUED_KEYS`] collect every occurrence in
/// order, all other keys keep the last value seen. An empty column yields an
/// empty map.
///
/// # Examples
///
/// ```
/// use gxfstore::gtf::{parse_attributes, AttributeValue};
///
/// let attrs = parse_attributes("gene_id \"G1\"; exon_number 2; tag \"basic\";");
/// assert_eq!(attrs["gene_id"], AttributeValue::Scalar("G1".into()));
/// assert_eq!(attrs["exon_number"], AttributeValue::Scalar("2".into()));
/// assert_eq!(attrs["tag"], AttributeValue::Array(vec!["basic".into()]));
/// ```
pub fn parse_attributes(raw: &str) -> Attributes {
    let mut attributes = Attributes::new();
    let line = raw.as_bytes();
    let mut pos = 0usize;

    let mut trimmed_len = line.len();
    while trimmed_len > 0 && line[trimmed_len - 1].is_ascii_whitespace() {
        trimmed_len -= 1;
    }

    while pos < trimmed_len {
        while pos < trimmed_len && (line[pos].is_ascii_whitespace() || line[pos] == b';') {
            pos += 1;
        }
        if pos >= trimmed_len {
            break;
        }

        let key_start = pos;
        let field_end = memchr(b';', &line[pos..trimmed_len])
            .map(|semi| pos + semi)
            .unwrap_or(trimmed_len);
        let key_end = match memchr(b' ', &line[pos..field_end]) {
            Some(sep) => pos + sep,
            None => {
                // Flag attribute without explicit value
                push_attribute_value(&mut attributes, &raw[key_start..field_end], String::new());
                pos = field_end + 1;
                continue;
            }
        };
        let key = &raw[key_start..key_end];

        pos = key_end + 1;
        while pos < trimmed_len && line[pos] == b' ' {
            pos += 1;
        }

        let value = if pos < trimmed_len && line[pos] == b'"' {
            pos += 1;
            match memchr(b'"', &line[pos..trimmed_len]) {
                Some(close) => {
                    let value = &raw[pos..pos + close];
                    pos += close + 1;
                    value
                }
                None => {
                    let value = &raw[pos..trimmed_len];
                    pos = trimmed_len;
                    value
                }
            }
        } else {
            let field_end = memchr(b';', &line[pos..trimmed_len])
                .map(|semi| pos + semi)
                .unwrap_or(trimmed_len);
            let value = raw[pos..field_end].trim_end();
            pos = field_end;
            value
        };
        push_attribute_value(&mut attributes, key, value.to_string());

        match memchr(b';', &line[pos..trimmed_len]) {
            Some(semi) => pos += semi + 1,
            None => break,
        }
    }

    attributes
}

/// Inserts an attribute, collecting multi-valued keys and letting scalars
/// overwrite earlier occurrences.
fn push_attribute_value(attributes: &mut Attributes, key: &str, value: String) {
    if MULTI_VALUED_KEYS.contains(&key) {
        match attributes.entry(key.to_string()) {
            Entry::Vacant(slot) => {
                slot.insert(AttributeValue::Array(vec![value]));
            }
            Entry::Occupied(mut slot) => match slot.get_mut() {
                AttributeValue::Array(values) => values.push(value),
                scalar => *scalar = AttributeValue::Array(vec![value]),
            },
        }
    } else {
        attributes.insert(key.to_string(), AttributeValue::Scalar(value));
    }
}
