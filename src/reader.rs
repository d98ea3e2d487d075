use std::fmt;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Read};
use std::path::{Path, PathBuf};

#[cfg(feature = "bz2")]
use bzip2::read::BzDecoder;
#[cfg(feature = "gzip")]
use flate2::read::MultiGzDecoder;
#[cfg(feature = "zstd")]
use zstd::stream::read::Decoder as ZstdDecoder;

use crate::gtf::Feature;

/// Result alias for reader operations.
pub type ReaderResult<T> = Result<T, ReaderError>;

/// An error that can occur when reading an annotation or expression file.
///
/// Every variant except `Io` and `Builder` describes a malformed record and
/// carries the 1-based line number where it was found.
#[derive(Debug)]
pub enum ReaderError {
    /// An I/O error.
    Io(io::Error),
    /// An error that occurred when decoding a line.
    InvalidEncoding {
        /// The line number where the error occurred.
        line: usize,
        /// The error message.
        message: String,
    },
    /// An error that occurred when parsing a field.
    InvalidField {
        /// The line number where the error occurred.
        line: usize,
        /// The name of the field that could not be parsed.
        field: &'static str,
        /// The error message.
        message: String,
    },
    /// An error that occurred when a record has an unexpected number of fields.
    UnexpectedFieldCount {
        /// The line number where the error occurred.
        line: usize,
        /// The expected number of fields.
        expected: usize,
        /// The actual number of fields.
        actual: usize,
    },
    /// A record lacks an attribute required for its feature type.
    MissingAttribute {
        /// The line number of the record.
        line: usize,
        /// The attribute key that was expected.
        key: &'static str,
    },
    /// An error that occurred when building a reader.
    Builder(String),
}

impl fmt::Display for ReaderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReaderError::Io(err) => write!(f, "I/O error: {err}"),
            ReaderError::InvalidEncoding { line, message } => {
                write!(f, "invalid UTF-8 at line {line}: {message}")
            }
            ReaderError::InvalidField {
                line,
                field,
                message,
            } => write!(f, "invalid {field} at line {line}: {message}"),
            ReaderError::UnexpectedFieldCount {
                line,
                expected,
                actual,
            } => write!(f, "line {line} had {actual} fields, expected {expected}"),
            ReaderError::MissingAttribute { line, key } => {
                write!(f, "line {line} is missing required attribute '{key}'")
            }
            ReaderError::Builder(msg) => write!(f, "builder error: {msg}"),
        }
    }
}

impl std::error::Error for ReaderError {
    /// Returns the source error, if any.
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ReaderError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for ReaderError {
    /// Creates a new `ReaderError` from an `io::Error`.
    fn from(err: io::Error) -> Self {
        ReaderError::Io(err)
    }
}

impl ReaderError {
    /// Creates a new `ReaderError` for an invalid field.
    pub(crate) fn invalid_field(line: usize, field: &'static str, message: String) -> ReaderError {
        ReaderError::InvalidField {
            line,
            field,
            message,
        }
    }

    /// Creates a new `ReaderError` for an unexpected field count.
    pub(crate) fn unexpected_field_count(
        line: usize,
        expected: usize,
        actual: usize,
    ) -> ReaderError {
        ReaderError::UnexpectedFieldCount {
            line,
            expected,
            actual,
        }
    }

    /// Returns `true` when the error describes a malformed record rather than
    /// an I/O or configuration failure.
    pub fn is_malformed(&self) -> bool {
        !matches!(self, ReaderError::Io(_) | ReaderError::Builder(_))
    }

    /// Returns the line number the error refers to, if any.
    pub fn line(&self) -> Option<usize> {
        match self {
            ReaderError::InvalidEncoding { line, .. }
            | ReaderError::InvalidField { line, .. }
            | ReaderError::UnexpectedFieldCount { line, .. }
            | ReaderError::MissingAttribute { line, .. } => Some(*line),
            ReaderError::Io(_) | ReaderError::Builder(_) => None,
        }
    }
}

/// The compression format of the input file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Compression {
    /// Automatically detect the compression format from the file extension.
    ///
    /// This is the default.
    #[default]
    Auto,
    /// No compression.
    None,
    /// Gzip compression.
    Gzip,
    /// Zstandard compression.
    Zstd,
    /// Bzip2 compression.
    Bzip2,
}

/// Detect compression from file extension
fn detect_compression_from_extension(path: &Path) -> Compression {
    let ext = path.extension().and_then(|ext| ext.to_str()).unwrap_or("");
    match ext {
        "gz" => Compression::Gzip,
        "zst" | "zstd" => Compression::Zstd,
        "bz2" | "bzip2" => Compression::Bzip2,
        _ => Compression::None,
    }
}

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Wraps a stream whose compression is unknown, decoding it when it starts
/// with the gzip magic bytes.
fn sniff_gzip<R>(stream: R) -> ReaderResult<Box<dyn Read + Send>>
where
    R: Read + Send + 'static,
{
    let mut buffered = BufReader::new(stream);
    if !buffered.fill_buf()?.starts_with(&GZIP_MAGIC) {
        return Ok(Box::new(buffered));
    }

    #[cfg(feature = "gzip")]
    {
        Ok(Box::new(MultiGzDecoder::new(buffered)))
    }
    #[cfg(not(feature = "gzip"))]
    {
        drop(buffered);
        Err(ReaderError::Builder(
            "gzip input detected but the `gzip` feature is disabled".into(),
        ))
    }
}

/// Opens a path as a (possibly decompressing) byte stream.
///
/// With [`Compression::Auto`], the extension decides; a path without a known
/// extension is still decoded as gzip when its content starts with the gzip
/// magic bytes. Shared by the annotation reader and the expression table
/// loader.
pub(crate) fn open_input(path: &Path, compression: Compression) -> ReaderResult<Box<dyn Read + Send>> {
    let file = File::open(path)?;
    let compression = match compression {
        Compression::Auto => match detect_compression_from_extension(path) {
            Compression::None => return sniff_gzip(file),
            detected => detected,
        },
        other => other,
    };

    match compression {
        Compression::None | Compression::Auto => Ok(Box::new(file)),
        Compression::Gzip => {
            #[cfg(feature = "gzip")]
            {
                Ok(Box::new(MultiGzDecoder::new(file)))
            }
            #[cfg(not(feature = "gzip"))]
            {
                drop(file);
                Err(ReaderError::Builder(
                    "gzip compression requested but the `gzip` feature is disabled".into(),
                ))
            }
        }
        Compression::Zstd => {
            #[cfg(feature = "zstd")]
            {
                Ok(Box::new(ZstdDecoder::new(file)?))
            }
            #[cfg(not(feature = "zstd"))]
            {
                drop(file);
                Err(ReaderError::Builder(
                    "zstd compression requested but the `zstd` feature is disabled".into(),
                ))
            }
        }
        Compression::Bzip2 => {
            #[cfg(feature = "bz2")]
            {
                Ok(Box::new(BzDecoder::new(file)))
            }
            #[cfg(not(feature = "bz2"))]
            {
                drop(file);
                Err(ReaderError::Builder(
                    "bzip2 compression requested but the `bz2` feature is disabled".into(),
                ))
            }
        }
    }
}

/// A builder for creating a `Reader`.
///
/// # Example
///
/// ```rust,no_run
/// use gxfstore::reader::{Compression, Reader};
///
/// fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let reader = Reader::builder()
///         .from_path("data/gencode.annotation.gtf.gz")
///         .compression(Compression::Gzip)
///         .buffer_capacity(256 * 1024)
///         .build()?;
///
///     for feature in reader {
///         let feature = feature?;
///         println!("{} {}", feature.kind, feature.start);
///     }
///
///     Ok(())
/// }
/// ```
pub struct ReaderBuilder {
    source: Option<ReaderSource>,
    buffer_capacity: usize,
    compression: Compression,
}

impl Default for ReaderBuilder {
    fn default() -> Self {
        Self {
            source: None,
            buffer_capacity: 128 * 1024,
            compression: Compression::default(),
        }
    }
}

impl ReaderBuilder {
    /// Reads from a filesystem path.
    pub fn from_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.source = Some(ReaderSource::Path(path.as_ref().into()));
        self
    }

    /// Reads from an arbitrary byte stream.
    pub fn from_reader<T>(mut self, reader: T) -> Self
    where
        T: Read + Send + 'static,
    {
        self.source = Some(ReaderSource::Reader(Box::new(reader)));
        self
    }

    /// Sets the buffer capacity for the reader.
    ///
    /// The default is 128 KB.
    pub fn buffer_capacity(mut self, capacity: usize) -> Self {
        self.buffer_capacity = capacity.max(8 * 1024);
        self
    }

    /// Sets the compression format of the input.
    ///
    /// [`Compression::Auto`] (the default) also recognizes gzipped streams
    /// given to [`ReaderBuilder::from_reader`]; [`Compression::None`] reads
    /// bytes as they are.
    pub fn compression(mut self, compression: Compression) -> Self {
        self.compression = compression;
        self
    }

    /// Builds the `Reader`.
    pub fn build(mut self) -> ReaderResult<Reader> {
        let source = self
            .source
            .take()
            .ok_or_else(|| ReaderError::Builder("ERROR: no input source configured".into()))?;

        let stream = match source {
            ReaderSource::Path(path) => open_input(&path, self.compression)?,
            ReaderSource::Reader(reader) => match self.compression {
                Compression::Auto => sniff_gzip(reader)?,
                Compression::None => reader,
                _ => {
                    return Err(ReaderError::Builder(
                        "ERROR: explicit compression requires a filesystem path".into(),
                    ));
                }
            },
        };

        Ok(Reader::from_stream(stream, self.buffer_capacity))
    }
}

/// Reader source
enum ReaderSource {
    Path(PathBuf),
    Reader(Box<dyn Read + Send>),
}

/// A streaming reader of GTF feature lines.
///
/// Records are produced lazily in file order; nothing beyond the current line
/// is buffered, so arbitrarily large (or unbounded) inputs are supported.
/// Comment lines (`#...`) and blank lines are skipped.
///
/// # Example
///
/// ```
/// use gxfstore::Reader;
/// use gxfstore::gtf::FeatureKind;
///
/// let data = "#!genome-build GRCh37\n\
///     chr1\tHAVANA\tgene\t11869\t14409\t.\t+\t.\tgene_id \"G1\"; gene_name \"DDX11L1\";\n";
/// let mut reader = Reader::from_reader(std::io::Cursor::new(data)).unwrap();
/// let features: Vec<_> = reader.records().map(|f| f.unwrap()).collect();
/// assert_eq!(features.len(), 1);
/// assert_eq!(features[0].kind, FeatureKind::Gene);
/// assert_eq!(features[0].line, 2);
/// ```
pub struct Reader {
    inner: BufReader<Box<dyn Read + Send>>,
    buffer: String,
    line_number: usize,
}

impl Reader {
    /// Creates a new `ReaderBuilder` to configure a `Reader`.
    pub fn builder() -> ReaderBuilder {
        ReaderBuilder::default()
    }

    /// Creates a new `Reader` from a path, detecting compression from the extension.
    pub fn from_path<P: AsRef<Path>>(path: P) -> ReaderResult<Self> {
        Self::builder().from_path(path).build()
    }

    /// Creates a new `Reader` from a plain or gzipped byte stream.
    pub fn from_reader<T>(reader: T) -> ReaderResult<Self>
    where
        T: Read + Send + 'static,
    {
        Self::builder().from_reader(reader).build()
    }

    fn from_stream(reader: Box<dyn Read + Send>, buffer_capacity: usize) -> Self {
        Self {
            inner: BufReader::with_capacity(buffer_capacity, reader),
            buffer: String::with_capacity(2048),
            line_number: 0,
        }
    }

    /// Returns the number of lines consumed so far.
    pub fn current_line(&self) -> usize {
        self.line_number
    }

    /// Returns an iterator over the features in the reader.
    pub fn records(&mut self) -> Features<'_> {
        Features { reader: self }
    }

    /// Returns the next feature, skipping comments and blank lines.
    fn next_feature(&mut self) -> Option<ReaderResult<Feature>> {
        loop {
            match self.fill_buffer() {
                Ok(true) => {
                    self.line_number += 1;
                    if should_skip(&self.buffer) {
                        continue;
                    }
                    return Some(Feature::parse(&self.buffer, self.line_number));
                }
                Ok(false) => return None,
                Err(err) => return Some(Err(err)),
            }
        }
    }

    /// Fills the buffer with the next line of the reader.
    fn fill_buffer(&mut self) -> ReaderResult<bool> {
        self.buffer.clear();
        let bytes = self.inner.read_line(&mut self.buffer).map_err(|err| {
            if err.kind() == io::ErrorKind::InvalidData {
                ReaderError::InvalidEncoding {
                    line: self.line_number + 1,
                    message: err.to_string(),
                }
            } else {
                ReaderError::Io(err)
            }
        })?;
        if bytes == 0 {
            return Ok(false);
        }
        trim_line(&mut self.buffer);
        Ok(true)
    }
}

impl Iterator for Reader {
    type Item = ReaderResult<Feature>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_feature()
    }
}

/// Borrowing iterator over the features of a [`Reader`].
pub struct Features<'a> {
    reader: &'a mut Reader,
}

impl Iterator for Features<'_> {
    type Item = ReaderResult<Feature>;

    fn next(&mut self) -> Option<Self::Item> {
        self.reader.next_feature()
    }
}

/// Trim the line terminator.
fn trim_line(line: &mut String) {
    while line.ends_with(['\n', '\r']) {
        line.pop();
    }
}

/// Returns `true` if the line is a comment or blank.
fn should_skip(line: &str) -> bool {
    let trimmed = line.trim();
    trimmed.is_empty() || trimmed.starts_with('#')
}
