//! SQLite-backed gene/transcript/exon store.
//!
//! A [`Store`] owns the connection. Every pipeline run opens exactly one
//! [`Session`], which wraps a transaction: its writes become visible only when
//! [`Session::commit`] is called, and dropping the session on any other path
//! (including `?` propagation) rolls them back.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use rusqlite::{params, Connection, OptionalExtension, Transaction};
use serde_json::{Map, Value};

use crate::error::Result;
use crate::expression::ExpressionRecord;
use crate::gtf::{Attributes, Feature};
use crate::interval::Interval;
use crate::reader::ReaderResult;
use crate::strand::Strand;

/// Natural key of a gene: globally unique across datasets.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GeneKey {
    pub name: String,
    pub chromosome: String,
    pub strand: Strand,
}

impl GeneKey {
    pub fn new(name: impl Into<String>, chromosome: impl Into<String>, strand: Strand) -> Self {
        Self {
            name: name.into(),
            chromosome: chromosome.into(),
            strand,
        }
    }

    /// Builds the key of a gene record; fails if `gene_name` is absent.
    pub fn from_feature(feature: &Feature) -> ReaderResult<Self> {
        Ok(Self::new(
            feature.gene_name()?,
            feature.chromosome.as_str(),
            feature.strand,
        ))
    }
}

/// A gene row without its attributes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneRow {
    pub id: i64,
    pub key: GeneKey,
}

impl ToSql for Strand {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for Strand {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let raw = value.as_str()?;
        Strand::from_symbol(raw)
            .ok_or_else(|| FromSqlError::Other(format!("invalid strand '{raw}'").into()))
    }
}

/// A database connection holding the gene/transcript/exon hierarchy.
#[derive(Debug)]
pub struct Store {
    connection: Connection,
}

impl Store {
    /// Bundled schema script.
    pub const SCHEMA: &'static str = include_str!("../sql/schema.sql");

    /// Opens (or creates) the database in the given file.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::with_connection(Connection::open(path)?)
    }

    /// Opens a private in-memory database.
    pub fn open_in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(connection: Connection) -> Result<Self> {
        connection.pragma_update(None, "foreign_keys", true)?;
        Ok(Self { connection })
    }

    /// Applies the bundled schema. Safe to call on an initialized database.
    pub fn init_schema(&self) -> Result<()> {
        self.connection.execute_batch(Self::SCHEMA)?;
        Ok(())
    }

    /// Applies a caller-supplied schema script.
    pub fn init_schema_from_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let script = fs::read_to_string(path)?;
        self.connection.execute_batch(&script)?;
        Ok(())
    }

    /// Returns the underlying connection for read-only queries.
    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    /// Starts a run-scoped session.
    pub fn session(&mut self) -> Result<Session<'_>> {
        Ok(Session {
            tx: self.connection.transaction()?,
        })
    }
}

/// A transaction-scoped handle used by one import, model generation or
/// expression merge run.
pub struct Session<'conn> {
    tx: Transaction<'conn>,
}

impl Session<'_> {
    /// Commits every write made through this session.
    pub fn commit(self) -> Result<()> {
        self.tx.commit()?;
        Ok(())
    }

    /// Returns every gene, ordered by id.
    pub fn genes(&self) -> Result<Vec<GeneRow>> {
        let mut statement = self
            .tx
            .prepare_cached("SELECT id, name, chromosome, strand FROM gene ORDER BY id")?;
        let rows = statement.query_map([], |row| {
            Ok(GeneRow {
                id: row.get(0)?,
                key: GeneKey {
                    name: row.get(1)?,
                    chromosome: row.get(2)?,
                    strand: row.get(3)?,
                },
            })
        })?;
        let genes = rows.collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(genes)
    }

    /// Materializes the natural-key index of every gene in the store.
    pub fn lookup_existing_genes(&self) -> Result<HashMap<GeneKey, i64>> {
        Ok(self
            .genes()?
            .into_iter()
            .map(|gene| (gene.key, gene.id))
            .collect())
    }

    pub fn dataset_exists(&self, name: &str) -> Result<bool> {
        Ok(self.dataset_id(name)?.is_some())
    }

    pub fn dataset_id(&self, name: &str) -> Result<Option<i64>> {
        let mut statement = self
            .tx
            .prepare_cached("SELECT id FROM dataset WHERE name = ?1")?;
        Ok(statement.query_row([name], |row| row.get(0)).optional()?)
    }

    pub fn create_dataset(&self, name: &str, is_reference: bool) -> Result<i64> {
        self.tx
            .prepare_cached("INSERT INTO dataset (name, is_reference) VALUES (?1, ?2)")?
            .execute(params![name, is_reference])?;
        Ok(self.tx.last_insert_rowid())
    }

    /// Inserts a gene whose attribute sequence starts with `feature`'s attributes.
    pub fn create_gene(&self, key: &GeneKey, feature: &Feature, dataset_id: i64) -> Result<i64> {
        let attributes = Value::Array(vec![dataset_attributes(&feature.attributes, dataset_id)?]);
        self.tx
            .prepare_cached(
                "INSERT INTO gene (name, chromosome, strand, attributes) VALUES (?1, ?2, ?3, ?4)",
            )?
            .execute(params![
                key.name,
                key.chromosome,
                key.strand,
                serde_json::to_string(&attributes)?
            ])?;
        Ok(self.tx.last_insert_rowid())
    }

    /// Appends `feature`'s attributes, tagged with `dataset_id`, to a gene's
    /// attribute sequence. Earlier entries are left untouched.
    pub fn append_gene_attributes(&self, gene_id: i64, feature: &Feature, dataset_id: i64) -> Result<()> {
        let entry = dataset_attributes(&feature.attributes, dataset_id)?;
        self.tx
            .prepare_cached(
                "UPDATE gene SET attributes = json_insert(attributes, '$[#]', json(?1)) WHERE id = ?2",
            )?
            .execute(params![serde_json::to_string(&entry)?, gene_id])?;
        Ok(())
    }

    /// Inserts a transcript record read from an annotation file.
    pub fn create_transcript(
        &self,
        feature: &Feature,
        gene_id: i64,
        dataset_id: Option<i64>,
        is_model: bool,
    ) -> Result<i64> {
        let attributes = sourced_attributes(feature)?;
        self.insert_transcript(
            gene_id,
            dataset_id,
            feature.attribute("gene_id"),
            feature.attribute("transcript_id"),
            Interval::new(feature.start, feature.end),
            is_model,
            &attributes,
        )
    }

    /// Inserts a model transcript spanning `span`; it has no dataset and no
    /// annotation identifiers.
    pub fn create_model_transcript(&self, gene_id: i64, span: Interval) -> Result<i64> {
        self.insert_transcript(gene_id, None, None, None, span, true, &Value::Object(Map::new()))
    }

    #[allow(clippy::too_many_arguments)]
    fn insert_transcript(
        &self,
        gene_id: i64,
        dataset_id: Option<i64>,
        annot_gene_id: Option<&str>,
        annot_transcript_id: Option<&str>,
        span: Interval,
        is_model: bool,
        attributes: &Value,
    ) -> Result<i64> {
        self.tx
            .prepare_cached(
                "INSERT INTO transcript (
                    gene_id, dataset_id, annot_gene_id, annot_transcript_id,
                    chrom_start, chrom_end, is_model, attributes)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            )?
            .execute(params![
                gene_id,
                dataset_id,
                annot_gene_id,
                annot_transcript_id,
                span.start,
                span.end,
                is_model,
                serde_json::to_string(attributes)?
            ])?;
        Ok(self.tx.last_insert_rowid())
    }

    /// Inserts an exon record read from an annotation file.
    pub fn create_exon(&self, feature: &Feature, transcript_id: i64) -> Result<i64> {
        let exon_number = feature.exon_number()?;
        let attributes = sourced_attributes(feature)?;
        self.insert_exon(
            transcript_id,
            feature.attribute("exon_id"),
            exon_number,
            Interval::new(feature.start, feature.end),
            &attributes,
        )
    }

    /// Inserts a model exon numbered `exon_number`.
    pub fn create_model_exon(&self, transcript_id: i64, exon_number: i64, interval: Interval) -> Result<i64> {
        let mut attributes = Map::new();
        attributes.insert("exon_number".into(), Value::from(exon_number));
        self.insert_exon(transcript_id, None, exon_number, interval, &Value::Object(attributes))
    }

    fn insert_exon(
        &self,
        transcript_id: i64,
        annot_exon_id: Option<&str>,
        exon_number: i64,
        interval: Interval,
        attributes: &Value,
    ) -> Result<i64> {
        self.tx
            .prepare_cached(
                "INSERT INTO exon (
                    transcript_id, annot_exon_id, exon_number, chrom_start, chrom_end, attributes)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )?
            .execute(params![
                transcript_id,
                annot_exon_id,
                exon_number,
                interval.start,
                interval.end,
                serde_json::to_string(attributes)?
            ])?;
        Ok(self.tx.last_insert_rowid())
    }

    /// Deletes every model exon and model transcript.
    ///
    /// Returns the number of (exons, transcripts) removed.
    pub fn delete_all_model_transcripts_and_exons(&self) -> Result<(usize, usize)> {
        let exons = self.tx.execute(
            "DELETE FROM exon WHERE transcript_id IN (
                SELECT id FROM transcript WHERE is_model = 1)",
            [],
        )?;
        let transcripts = self
            .tx
            .execute("DELETE FROM transcript WHERE is_model = 1", [])?;
        Ok((exons, transcripts))
    }

    /// Returns the intervals of every exon of the gene's non-model transcripts.
    pub fn non_model_exon_intervals(&self, gene_id: i64) -> Result<Vec<Interval>> {
        let mut statement = self.tx.prepare_cached(
            "SELECT e.chrom_start, e.chrom_end
            FROM exon e
            JOIN transcript t ON t.id = e.transcript_id
            WHERE t.gene_id = ?1 AND t.is_model = 0",
        )?;
        let rows = statement.query_map([gene_id], |row| {
            Ok(Interval::new(row.get(0)?, row.get(1)?))
        })?;
        let intervals = rows.collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(intervals)
    }

    /// Sets the `expression` attribute of the transcript(s) of `dataset_id`
    /// annotated as `annot_transcript_id`, keeping every other attribute.
    ///
    /// Returns the number of rows updated; zero when nothing matches.
    pub fn merge_transcript_expression(
        &self,
        annot_transcript_id: &str,
        dataset_id: i64,
        records: &[ExpressionRecord],
    ) -> Result<usize> {
        let mut patch = Map::new();
        patch.insert("expression".into(), serde_json::to_value(records)?);
        let updated = self
            .tx
            .prepare_cached(
                "UPDATE transcript SET attributes = json_patch(attributes, ?1)
                WHERE annot_transcript_id = ?2 AND dataset_id = ?3",
            )?
            .execute(params![
                serde_json::to_string(&Value::Object(patch))?,
                annot_transcript_id,
                dataset_id
            ])?;
        Ok(updated)
    }
}

/// Encodes a gene's attributes as one entry of its per-dataset sequence.
fn dataset_attributes(attributes: &Attributes, dataset_id: i64) -> Result<Value> {
    let mut object = attribute_object(attributes)?;
    object.insert("dataset_id".into(), Value::from(dataset_id));
    Ok(Value::Object(object))
}

/// Encodes transcript/exon attributes, recording the GTF source column.
fn sourced_attributes(feature: &Feature) -> Result<Value> {
    let mut object = attribute_object(&feature.attributes)?;
    if !feature.source.is_empty() {
        object.insert("source".into(), Value::from(feature.source.as_str()));
    }
    Ok(Value::Object(object))
}

fn attribute_object(attributes: &Attributes) -> Result<Map<String, Value>> {
    match serde_json::to_value(attributes)? {
        Value::Object(object) => Ok(object),
        _ => Ok(Map::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feature(line: &str) -> Feature {
        Feature::parse(line, 1).unwrap()
    }

    fn store() -> Store {
        let store = Store::open_in_memory().unwrap();
        store.init_schema().unwrap();
        store
    }

    #[test]
    fn schema_is_idempotent() {
        let store = store();
        store.init_schema().unwrap();
    }

    #[test]
    fn gene_attributes_append_instead_of_replace() {
        let mut store = store();
        let session = store.session().unwrap();
        let first = session.create_dataset("a", false).unwrap();
        let second = session.create_dataset("b", false).unwrap();
        let gene = feature("chr1\tA\tgene\t1\t100\t.\t+\t.\tgene_name \"G\"; level 1;");
        let key = GeneKey::from_feature(&gene).unwrap();
        let gene_id = session.create_gene(&key, &gene, first).unwrap();
        session.append_gene_attributes(gene_id, &gene, second).unwrap();
        session.commit().unwrap();

        let raw: String = store
            .connection()
            .query_row("SELECT attributes FROM gene WHERE id = ?1", [gene_id], |row| row.get(0))
            .unwrap();
        let value: Value = serde_json::from_str(&raw).unwrap();
        let entries = value.as_array().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0]["dataset_id"], Value::from(first));
        assert_eq!(entries[1]["dataset_id"], Value::from(second));
        assert_eq!(entries[1]["level"], Value::from("1"));
    }

    #[test]
    fn dropped_session_rolls_back() {
        let mut store = store();
        {
            let session = store.session().unwrap();
            session.create_dataset("lost", false).unwrap();
        }
        let session = store.session().unwrap();
        assert!(!session.dataset_exists("lost").unwrap());
    }

    #[test]
    fn gene_index_round_trips_strand() {
        let mut store = store();
        let session = store.session().unwrap();
        let dataset = session.create_dataset("a", false).unwrap();
        let gene = feature("chr2\tA\tgene\t1\t100\t.\t-\t.\tgene_name \"R\";");
        let key = GeneKey::from_feature(&gene).unwrap();
        let gene_id = session.create_gene(&key, &gene, dataset).unwrap();

        let index = session.lookup_existing_genes().unwrap();
        assert_eq!(index.get(&GeneKey::new("R", "chr2", Strand::Reverse)), Some(&gene_id));
        assert_eq!(index.get(&GeneKey::new("R", "chr2", Strand::Forward)), None);
    }
}
