//! Model transcript generation.
//!
//! Every gene gets exactly one synthetic transcript whose exons are the union
//! of the exons of all its non-model transcripts, across every dataset. Exons
//! are numbered 1..N in transcription order: ascending start on `+` (and on
//! `.`/`?`) strands, descending on `-`.

use std::time::{Duration, Instant};

use log::{debug, info, warn};

use crate::error::{Error, Result};
use crate::interval::{self, Interval};
use crate::store::{GeneRow, Session, Store};
use crate::strand::Strand;

/// What to do with a gene that has no non-model exon.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MissingExonsPolicy {
    /// Fail the whole run with [`Error::NoExonsForGene`].
    #[default]
    Abort,
    /// Leave the gene without a model and keep going.
    Skip,
}

/// Configuration of a model generation run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ModelOptions {
    missing_exons: MissingExonsPolicy,
}

impl ModelOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the policy for genes without exons.
    pub fn missing_exons(mut self, policy: MissingExonsPolicy) -> Self {
        self.missing_exons = policy;
        self
    }

    pub fn missing_exons_policy(&self) -> MissingExonsPolicy {
        self.missing_exons
    }
}

/// Outcome of a model generation run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModelSummary {
    /// Model transcripts created, one per gene.
    pub genes: usize,
    /// Model exons created.
    pub exons: usize,
    /// Genes left without a model under [`MissingExonsPolicy::Skip`].
    pub skipped: usize,
    /// Model (exons, transcripts) deleted before regeneration.
    pub deleted: (usize, usize),
    pub elapsed: Duration,
}

/// Orders merged exon intervals in transcription order.
///
/// `merged` must be sorted by start, as [`interval::union`] returns it.
pub fn transcription_order(mut merged: Vec<Interval>, strand: Strand) -> Vec<Interval> {
    if strand.is_reverse() {
        merged.reverse();
    }
    merged
}

/// Rebuilds the model transcript of every gene in the store.
///
/// Existing model transcripts and exons are deleted first, so the store ends
/// up holding exactly one model per gene regardless of how many runs came
/// before. The run is one transaction.
///
/// # Errors
///
/// Under [`MissingExonsPolicy::Abort`], returns [`Error::NoExonsForGene`] for
/// the first gene without exons, and the deletion of the previous models is
/// rolled back with everything else.
pub fn generate_model_transcripts(store: &mut Store, options: &ModelOptions) -> Result<ModelSummary> {
    let tic = Instant::now();
    let session = store.session()?;

    let mut summary = ModelSummary {
        deleted: session.delete_all_model_transcripts_and_exons()?,
        ..Default::default()
    };
    debug!(
        "deleted {} model exons and {} model transcripts",
        summary.deleted.0, summary.deleted.1
    );

    for gene in session.genes()? {
        match build_model(&session, &gene)? {
            Some(exons) => {
                summary.genes += 1;
                summary.exons += exons;
            }
            None => match options.missing_exons_policy() {
                MissingExonsPolicy::Abort => {
                    return Err(Error::NoExonsForGene {
                        gene_id: gene.id,
                        name: gene.key.name,
                    });
                }
                MissingExonsPolicy::Skip => {
                    warn!("gene {} (id {}) has no exons, skipping", gene.key.name, gene.id);
                    summary.skipped += 1;
                }
            },
        }
    }
    session.commit()?;

    summary.elapsed = tic.elapsed();
    info!(
        "built {} model transcripts with {} exons ({} genes skipped) in {:.3?}",
        summary.genes, summary.exons, summary.skipped, summary.elapsed
    );
    Ok(summary)
}

/// Writes the model of one gene; returns `None` when the gene has no exons.
fn build_model(session: &Session<'_>, gene: &GeneRow) -> Result<Option<usize>> {
    let exons = session.non_model_exon_intervals(gene.id)?;
    let merged = match interval::union(&exons) {
        Ok(merged) => merged,
        Err(_) => return Ok(None),
    };
    let Some(span) = interval::span(&merged) else {
        return Ok(None);
    };

    let transcript_id = session.create_model_transcript(gene.id, span)?;
    let ordered = transcription_order(merged, gene.key.strand);
    for (number, exon) in (1..).zip(ordered.iter()) {
        session.create_model_exon(transcript_id, number, *exon)?;
    }
    Ok(Some(ordered.len()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reverse_strand_numbers_from_the_highest_start() {
        let merged = vec![Interval::new(100, 200), Interval::new(300, 400)];
        let ordered = transcription_order(merged.clone(), Strand::Reverse);
        assert_eq!(ordered, vec![Interval::new(300, 400), Interval::new(100, 200)]);

        assert_eq!(transcription_order(merged.clone(), Strand::Forward), merged);
        assert_eq!(transcription_order(merged.clone(), Strand::Unstranded), merged);
        assert_eq!(transcription_order(merged.clone(), Strand::Unknown), merged);
    }

    #[test]
    fn abort_is_the_default_policy() {
        assert_eq!(ModelOptions::new().missing_exons_policy(), MissingExonsPolicy::Abort);
        assert_eq!(
            ModelOptions::new()
                .missing_exons(MissingExonsPolicy::Skip)
                .missing_exons_policy(),
            MissingExonsPolicy::Skip
        );
    }
}
