//! Read-only views over a populated store, as served to browsers.

use rusqlite::{params_from_iter, Connection, OptionalExtension};
use serde::Serialize;
use serde_json::Value;

use crate::error::Result;
use crate::strand::Strand;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DatasetRow {
    pub id: i64,
    pub name: String,
    pub is_reference: bool,
}

/// An exon row, serialized under its column names.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExonView {
    pub id: i64,
    pub transcript_id: i64,
    pub annot_exon_id: Option<String>,
    pub exon_number: i64,
    pub chrom_start: i64,
    pub chrom_end: i64,
    pub attributes: Value,
}

/// A transcript row, serialized under its column names, with its exons.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TranscriptView {
    pub id: i64,
    pub gene_id: i64,
    /// `None` for the model transcript.
    pub dataset_id: Option<i64>,
    /// Name of the `dataset_id` row.
    pub dataset: Option<String>,
    pub annot_gene_id: Option<String>,
    pub annot_transcript_id: Option<String>,
    pub chrom_start: i64,
    pub chrom_end: i64,
    pub is_model: bool,
    pub attributes: Value,
    pub exons: Vec<ExonView>,
}

/// A gene with every transcript attached to it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeneView {
    pub id: i64,
    pub name: String,
    pub chromosome: String,
    pub strand: String,
    /// Per-dataset attribute entries, in import order.
    pub attributes: Value,
    pub transcripts: Vec<TranscriptView>,
}

impl GeneView {
    /// Returns the model transcript, if one has been generated.
    pub fn model(&self) -> Option<&TranscriptView> {
        self.transcripts.iter().find(|transcript| transcript.is_model)
    }
}

fn parse_json(raw: String) -> Result<Value> {
    Ok(serde_json::from_str(&raw)?)
}

/// Looks a gene up by name.
///
/// A name shared by genes on several chromosomes or strands resolves to the
/// one stored first.
pub fn find_gene(conn: &Connection, name: &str) -> Result<Option<GeneView>> {
    let gene = conn
        .query_row(
            "SELECT id, name, chromosome, strand, attributes FROM gene
            WHERE name = ?1 ORDER BY id LIMIT 1",
            [name],
            |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, Strand>(3)?,
                    row.get::<_, String>(4)?,
                ))
            },
        )
        .optional()?;
    let Some((id, name, chromosome, strand, attributes)) = gene else {
        return Ok(None);
    };

    Ok(Some(GeneView {
        id,
        name,
        chromosome,
        strand: strand.as_str().to_string(),
        attributes: parse_json(attributes)?,
        transcripts: transcripts_of(conn, id)?,
    }))
}

fn transcripts_of(conn: &Connection, gene_id: i64) -> Result<Vec<TranscriptView>> {
    let mut statement = conn.prepare_cached(
        "SELECT t.id, t.dataset_id, d.name, t.annot_gene_id, t.annot_transcript_id,
            t.chrom_start, t.chrom_end, t.is_model, t.attributes
        FROM transcript t
        LEFT JOIN dataset d ON d.id = t.dataset_id
        WHERE t.gene_id = ?1
        ORDER BY t.id",
    )?;
    let rows = statement.query_map([gene_id], |row| {
        Ok((
            TranscriptView {
                id: row.get(0)?,
                gene_id,
                dataset_id: row.get(1)?,
                dataset: row.get(2)?,
                annot_gene_id: row.get(3)?,
                annot_transcript_id: row.get(4)?,
                chrom_start: row.get(5)?,
                chrom_end: row.get(6)?,
                is_model: row.get(7)?,
                attributes: Value::Null,
                exons: Vec::new(),
            },
            row.get::<_, String>(8)?,
        ))
    })?;

    let mut transcripts = Vec::new();
    for row in rows {
        let (mut transcript, attributes) = row?;
        transcript.attributes = parse_json(attributes)?;
        transcript.exons = exons_of(conn, transcript.id)?;
        transcripts.push(transcript);
    }
    Ok(transcripts)
}

fn exons_of(conn: &Connection, transcript_id: i64) -> Result<Vec<ExonView>> {
    let mut statement = conn.prepare_cached(
        "SELECT id, annot_exon_id, exon_number, chrom_start, chrom_end, attributes
        FROM exon WHERE transcript_id = ?1 ORDER BY exon_number, id",
    )?;
    let rows = statement.query_map([transcript_id], |row| {
        Ok((
            ExonView {
                id: row.get(0)?,
                transcript_id,
                annot_exon_id: row.get(1)?,
                exon_number: row.get(2)?,
                chrom_start: row.get(3)?,
                chrom_end: row.get(4)?,
                attributes: Value::Null,
            },
            row.get::<_, String>(5)?,
        ))
    })?;

    let mut exons = Vec::new();
    for row in rows {
        let (mut exon, attributes) = row?;
        exon.attributes = parse_json(attributes)?;
        exons.push(exon);
    }
    Ok(exons)
}

/// Lists every dataset, ordered by id.
pub fn list_datasets(conn: &Connection) -> Result<Vec<DatasetRow>> {
    let mut statement =
        conn.prepare_cached("SELECT id, name, is_reference FROM dataset ORDER BY id")?;
    let rows = statement.query_map([], |row| {
        Ok(DatasetRow {
            id: row.get(0)?,
            name: row.get(1)?,
            is_reference: row.get(2)?,
        })
    })?;
    let datasets = rows.collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(datasets)
}

/// Returns the distinct `(id, name)` of genes with at least one transcript
/// in any of `datasets`, sorted by name.
pub fn genes_in_datasets<S: AsRef<str>>(conn: &Connection, datasets: &[S]) -> Result<Vec<(i64, String)>> {
    if datasets.is_empty() {
        return Ok(Vec::new());
    }

    let placeholders = (1..=datasets.len())
        .map(|i| format!("?{i}"))
        .collect::<Vec<_>>()
        .join(", ");
    let sql = format!(
        "SELECT DISTINCT g.id, g.name
        FROM gene g
        JOIN transcript t ON t.gene_id = g.id
        JOIN dataset d ON d.id = t.dataset_id
        WHERE d.name IN ({placeholders})
        ORDER BY g.name, g.id"
    );

    let names: Vec<&str> = datasets.iter().map(|name| name.as_ref()).collect();
    let mut statement = conn.prepare(&sql)?;
    let rows = statement.query_map(params_from_iter(&names), |row| {
        Ok((row.get(0)?, row.get(1)?))
    })?;
    let genes = rows.collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(genes)
}
