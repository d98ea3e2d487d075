//! The standard build of a browser database from one data directory.

use std::path::{Path, PathBuf};

use log::info;

use crate::error::Result;
use crate::expression::{import_expression, ExpressionSummary};
use crate::import::{import_gtf_path, ImportOptions, ImportSummary};
use crate::model::{generate_model_transcripts, ModelOptions, ModelSummary};
use crate::store::Store;

/// File names and dataset names used by [`populate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PopulateOptions {
    pub annotations: PathBuf,
    pub annotations_dataset: String,
    pub reference: PathBuf,
    pub reference_dataset: String,
    pub expression: PathBuf,
    pub models: ModelOptions,
}

impl Default for PopulateOptions {
    fn default() -> Self {
        Self {
            annotations: PathBuf::from("Isoform_annotations_4281_knownCells.gtf"),
            annotations_dataset: "final".into(),
            reference: PathBuf::from("gencode.v33lift37.annotation.gtf.gz"),
            reference_dataset: "gencode.v33lift37".into(),
            expression: PathBuf::from("Isoform_Average_percent_expression_updated.txt"),
            models: ModelOptions::default(),
        }
    }
}

/// Summaries of every step of a [`populate`] run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PopulateSummary {
    pub annotations: ImportSummary,
    pub reference: ImportSummary,
    pub models: ModelSummary,
    pub expression: ExpressionSummary,
}

/// Runs annotation import, reference import, model generation and expression
/// merge in that order. Relative file names are resolved against `data_dir`.
///
/// Every step commits on its own; the first error stops the sequence and
/// leaves the earlier steps in place.
pub fn populate<P: AsRef<Path>>(
    store: &mut Store,
    data_dir: P,
    options: &PopulateOptions,
) -> Result<PopulateSummary> {
    let data_dir = data_dir.as_ref();
    store.init_schema()?;

    let annotations = import_gtf_path(
        store,
        data_dir.join(&options.annotations),
        &ImportOptions::new(options.annotations_dataset.as_str()),
    )?;
    let reference = import_gtf_path(
        store,
        data_dir.join(&options.reference),
        &ImportOptions::new(options.reference_dataset.as_str()).reference(true),
    )?;
    let models = generate_model_transcripts(store, &options.models)?;
    let expression = import_expression(
        store,
        data_dir.join(&options.expression),
        &options.annotations_dataset,
    )?;

    info!("populated store from {}", data_dir.display());
    Ok(PopulateSummary {
        annotations,
        reference,
        models,
        expression,
    })
}
