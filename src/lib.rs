//! # gxfstore
//!
//! Import GTF gene annotations into a relational gene/transcript/exon store,
//! reconcile datasets around a shared set of genes, and derive one model
//! transcript per gene.
//!
//! ## Overview
//!
//! Several annotation datasets (a long-read isoform annotation, a GENCODE
//! reference, ...) are imported into one SQLite database. Genes are identified
//! by their `(gene_name, chromosome, strand)` natural key, so a gene seen in
//! several datasets is stored once and accumulates one attribute entry per
//! dataset. Transcripts and exons always belong to the dataset they were read
//! from.
//!
//! After the imports, every gene receives a synthetic *model transcript* whose
//! exons are the union of all its exons across datasets, numbered in
//! transcription order. Per-cell-type expression statistics can then be
//! attached to the transcripts of a dataset.
//!
//! ## Features
//!
//! - **Streaming parser:** GTF lines are parsed one at a time with a
//!   `memchr`-based attribute scanner; inputs of any size are supported
//! - **Compression Support:** Automatic detection of gzip (and optionally
//!   zstd/bzip2) inputs from the file extension
//! - **Atomic runs:** every import, model generation and expression merge is a
//!   single transaction; a malformed record leaves the store untouched
//! - **Reference datasets:** annotate known genes without introducing new ones
//! - **Builder Pattern API:** [`ReaderBuilder`], [`ImportOptions`] and
//!   [`ModelOptions`]
//!
//! ## Quick Start
//!
//! ```toml
//! [dependencies]
//! gxfstore = "0.1"
//!
//! # Optional features
//! gxfstore = { version = "0.1", features = ["zstd", "bz2", "cli"] }
//! ```
//!
//! ## Basic Usage
//!
//! ### Building a store
//!
//! ```rust,no_run
//! use gxfstore::{
//!     generate_model_transcripts, import_gtf_path, ImportOptions, ModelOptions, Store,
//! };
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut store = Store::open("isoforms.db")?;
//!     store.init_schema()?;
//!
//!     import_gtf_path(&mut store, "isoforms.gtf", &ImportOptions::new("final"))?;
//!     import_gtf_path(
//!         &mut store,
//!         "gencode.v33lift37.annotation.gtf.gz",
//!         &ImportOptions::new("gencode.v33lift37").reference(true),
//!     )?;
//!
//!     let summary = generate_model_transcripts(&mut store, &ModelOptions::default())?;
//!     println!("{} model transcripts", summary.genes);
//!     Ok(())
//! }
//! ```
//!
//! ### Reading features
//!
//! ```rust,no_run
//! use gxfstore::Reader;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut reader = Reader::from_path("gencode.v33lift37.annotation.gtf.gz")?;
//!
//!     for feature in reader.records() {
//!         let feature = feature?;
//!         println!(
//!             "{} {}:{}-{} {}",
//!             feature.kind, feature.chromosome, feature.start, feature.end, feature.strand
//!         );
//!     }
//!
//!     Ok(())
//! }
//! ```
//!
//! ### Querying
//!
//! ```rust,no_run
//! use gxfstore::{query, Store};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = Store::open("isoforms.db")?;
//!     if let Some(gene) = query::find_gene(store.connection(), "TP53")? {
//!         println!("{}", serde_json::to_string_pretty(&gene)?);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Error Handling
//!
//! Parsing errors are reported as [`ReaderError`] with the offending line
//! number. Pipeline operations return the crate-level [`Error`]; use
//! [`Error::is_malformed`] to tell bad input from store or I/O failures.

#![cfg_attr(doc, warn(missing_docs))]

pub mod error;
pub mod expression;
pub mod gtf;
pub mod import;
pub mod interval;
pub mod model;
pub mod populate;
pub mod query;
pub mod reader;
pub mod store;
pub mod strand;

pub use error::{Error, Result};
pub use expression::{import_expression, merge_expression, ExpressionRecord, ExpressionSummary, ExpressionTable};
pub use gtf::{AttributeValue, Attributes, Feature, FeatureKind};
pub use import::{import_gtf, import_gtf_path, ImportOptions, ImportSummary};
pub use interval::{Interval, UnionError};
pub use model::{generate_model_transcripts, MissingExonsPolicy, ModelOptions, ModelSummary};
pub use populate::{populate, PopulateOptions, PopulateSummary};
pub use reader::{Compression, Reader, ReaderBuilder, ReaderError, ReaderResult};
pub use store::{GeneKey, Session, Store};
pub use strand::Strand;
