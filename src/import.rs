//! Streaming import of one GTF file as a named dataset.
//!
//! Features are consumed strictly in file order. A gene line opens a context
//! that the following transcript lines attach to, and a transcript line opens
//! the context its exon lines attach to; [`ImportState`] holds that context
//! explicitly.

use std::collections::HashMap;
use std::path::Path;
use std::time::{Duration, Instant};

use log::{debug, info, warn};

use crate::error::{Error, Result};
use crate::gtf::{Feature, FeatureKind};
use crate::reader::{Reader, ReaderResult};
use crate::store::{GeneKey, Session, Store};

/// Configuration of an import run.
///
/// # Example
///
/// ```
/// use gxfstore::ImportOptions;
///
/// let options = ImportOptions::new("gencode.v33lift37").reference(true);
/// assert!(options.is_reference());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportOptions {
    name: String,
    reference: bool,
}

impl ImportOptions {
    /// Creates options for a non-reference dataset called `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            reference: false,
        }
    }

    /// Marks the dataset as a reference: it annotates known genes but never
    /// introduces new ones.
    pub fn reference(mut self, reference: bool) -> Self {
        self.reference = reference;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_reference(&self) -> bool {
        self.reference
    }
}

/// Per-level record counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FeatureCounts {
    pub genes: usize,
    pub transcripts: usize,
    pub exons: usize,
}

/// Outcome of an import run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportSummary {
    pub dataset_id: i64,
    /// Gene, transcript and exon lines seen, including dropped ones.
    pub parsed: FeatureCounts,
    /// Rows created.
    pub inserted: FeatureCounts,
    /// Existing genes that gained an attribute entry.
    pub updated_genes: usize,
    pub elapsed: Duration,
}

/// In-memory natural-key index of every gene in the store.
///
/// Loaded once per run so that each gene line costs a hash lookup instead of
/// a query; genes created during the run are added as they are inserted.
#[derive(Debug, Clone, Default)]
pub struct GeneIndex {
    genes: HashMap<GeneKey, i64>,
}

impl GeneIndex {
    /// Reads every gene key visible to `session`.
    pub fn load(session: &Session<'_>) -> Result<Self> {
        Ok(Self {
            genes: session.lookup_existing_genes()?,
        })
    }

    pub fn get(&self, key: &GeneKey) -> Option<i64> {
        self.genes.get(key).copied()
    }

    pub fn insert(&mut self, key: GeneKey, gene_id: i64) {
        self.genes.insert(key, gene_id);
    }

    pub fn len(&self) -> usize {
        self.genes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.genes.is_empty()
    }
}

/// Hierarchy context while streaming features.
///
/// Every gene line resets the current transcript, so an exon can never attach
/// to a transcript of an earlier gene.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportState {
    pub current_gene: Option<i64>,
    pub current_transcript: Option<i64>,
    /// Set while the lines of an unknown gene in a reference dataset are dropped.
    pub skip: bool,
}

impl ImportState {
    /// Enters a gene that exists in (or was just added to) the store.
    pub fn enter_gene(&mut self, gene_id: i64) {
        self.current_gene = Some(gene_id);
        self.current_transcript = None;
        self.skip = false;
    }

    /// Enters a gene whose transcripts and exons are dropped.
    pub fn skip_gene(&mut self) {
        self.current_gene = None;
        self.current_transcript = None;
        self.skip = true;
    }

    pub fn enter_transcript(&mut self, transcript_id: i64) {
        self.current_transcript = Some(transcript_id);
    }
}

/// Feeds features into one session on behalf of one dataset.
struct Importer<'a, 'conn> {
    session: &'a Session<'conn>,
    index: GeneIndex,
    state: ImportState,
    dataset_id: i64,
    reference: bool,
    parsed: FeatureCounts,
    inserted: FeatureCounts,
    updated_genes: usize,
}

impl Importer<'_, '_> {
    fn consume(&mut self, feature: &Feature) -> Result<()> {
        match feature.kind {
            FeatureKind::Gene => self.gene(feature),
            FeatureKind::Transcript => self.transcript(feature),
            FeatureKind::Exon => self.exon(feature),
            FeatureKind::Other(_) => Ok(()),
        }
    }

    fn gene(&mut self, feature: &Feature) -> Result<()> {
        self.parsed.genes += 1;
        let key = GeneKey::from_feature(feature)?;

        match self.index.get(&key) {
            Some(gene_id) => {
                self.session
                    .append_gene_attributes(gene_id, feature, self.dataset_id)?;
                self.updated_genes += 1;
                self.state.enter_gene(gene_id);
            }
            None if self.reference => {
                debug!(
                    "line {}: skipping gene {} absent from the store",
                    feature.line, key.name
                );
                self.state.skip_gene();
            }
            None => {
                let gene_id = self.session.create_gene(&key, feature, self.dataset_id)?;
                self.index.insert(key, gene_id);
                self.inserted.genes += 1;
                self.state.enter_gene(gene_id);
            }
        }
        Ok(())
    }

    fn transcript(&mut self, feature: &Feature) -> Result<()> {
        self.parsed.transcripts += 1;
        if self.state.skip {
            return Ok(());
        }

        let gene_id = self.state.current_gene.ok_or_else(|| Error::Malformed {
            line: feature.line,
            message: "transcript record precedes any gene record".into(),
        })?;
        let transcript_id =
            self.session
                .create_transcript(feature, gene_id, Some(self.dataset_id), false)?;
        self.state.enter_transcript(transcript_id);
        self.inserted.transcripts += 1;
        Ok(())
    }

    fn exon(&mut self, feature: &Feature) -> Result<()> {
        self.parsed.exons += 1;
        if self.state.skip {
            return Ok(());
        }

        let transcript_id = self.state.current_transcript.ok_or_else(|| Error::Malformed {
            line: feature.line,
            message: "exon record has no transcript record under the current gene".into(),
        })?;
        self.session.create_exon(feature, transcript_id)?;
        self.inserted.exons += 1;
        Ok(())
    }
}

/// Imports a stream of features as a new dataset.
///
/// The run is one transaction: the dataset row and every gene, transcript and
/// exon written for it are committed together, and nothing is kept if any
/// record fails.
///
/// # Errors
///
/// * [`Error::DuplicateDataset`] if a dataset named `options.name()` exists;
///   nothing is written.
/// * Any malformed record ([`Error::is_malformed`]) aborts the run.
///
/// # Example
///
/// ```
/// use gxfstore::{import_gtf, ImportOptions, Reader, Store};
///
/// let gtf = "chr1\tsrc\tgene\t1\t50\t.\t+\t.\tgene_id \"G1\"; gene_name \"A\";\n\
///     chr1\tsrc\ttranscript\t1\t50\t.\t+\t.\tgene_id \"G1\"; transcript_id \"T1\";\n\
///     chr1\tsrc\texon\t1\t50\t.\t+\t.\ttranscript_id \"T1\"; exon_number 1;\n";
/// let mut store = Store::open_in_memory().unwrap();
/// store.init_schema().unwrap();
///
/// let reader = Reader::from_reader(std::io::Cursor::new(gtf)).unwrap();
/// let summary = import_gtf(&mut store, reader, &ImportOptions::new("demo")).unwrap();
/// assert_eq!(summary.inserted.exons, 1);
/// ```
pub fn import_gtf<I>(store: &mut Store, features: I, options: &ImportOptions) -> Result<ImportSummary>
where
    I: IntoIterator<Item = ReaderResult<Feature>>,
{
    let tic = Instant::now();
    let session = store.session()?;

    if session.dataset_exists(options.name())? {
        warn!("dataset '{}' already exists", options.name());
        return Err(Error::DuplicateDataset(options.name().to_string()));
    }

    let index = GeneIndex::load(&session)?;
    debug!("loaded {} existing gene keys", index.len());
    let dataset_id = session.create_dataset(options.name(), options.is_reference())?;

    let mut importer = Importer {
        session: &session,
        index,
        state: ImportState::default(),
        dataset_id,
        reference: options.is_reference(),
        parsed: FeatureCounts::default(),
        inserted: FeatureCounts::default(),
        updated_genes: 0,
    };
    for feature in features {
        importer.consume(&feature?)?;
    }

    let summary = ImportSummary {
        dataset_id,
        parsed: importer.parsed,
        inserted: importer.inserted,
        updated_genes: importer.updated_genes,
        elapsed: Duration::ZERO,
    };
    session.commit()?;

    let summary = ImportSummary {
        elapsed: tic.elapsed(),
        ..summary
    };
    info!(
        "dataset '{}': parsed {} genes, {} transcripts, {} exons",
        options.name(),
        summary.parsed.genes,
        summary.parsed.transcripts,
        summary.parsed.exons
    );
    info!(
        "dataset '{}': inserted {} genes, {} transcripts, {} exons; updated {} genes in {:.3?}",
        options.name(),
        summary.inserted.genes,
        summary.inserted.transcripts,
        summary.inserted.exons,
        summary.updated_genes,
        summary.elapsed
    );
    Ok(summary)
}

/// Imports the GTF file at `path` (gzip detected by extension).
pub fn import_gtf_path<P: AsRef<Path>>(
    store: &mut Store,
    path: P,
    options: &ImportOptions,
) -> Result<ImportSummary> {
    info!("importing {} as '{}'", path.as_ref().display(), options.name());
    let reader = Reader::from_path(path)?;
    import_gtf(store, reader, options)
}
