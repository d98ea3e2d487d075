use std::io::{Cursor, Write};

use gxfstore::{
    import_expression, import_gtf, merge_expression, query, Error, ExpressionRecord,
    ExpressionTable, ImportOptions, Reader, ReaderError, Store,
};

const GTF: &str = "chr1\tPacBio\tgene\t100\t900\t.\t+\t.\tgene_name \"GENE1\";
chr1\tPacBio\ttranscript\t100\t900\t.\t+\t.\ttranscript_id \"PB_1_1\"; note \"kept\";
chr1\tPacBio\texon\t100\t900\t.\t+\t.\ttranscript_id \"PB_1_1\"; exon_number 1;
chr1\tPacBio\ttranscript\t100\t500\t.\t+\t.\ttranscript_id \"PB_1_2\";
chr1\tPacBio\texon\t100\t500\t.\t+\t.\ttranscript_id \"PB_1_2\"; exon_number 1;
";

const TABLE: &str = "\tavg.exp\tpct.exp\tfeatures.plot\tid\tavg.exp.scaled
1\t0.25\t12.5\tPB-1-1\tTcell\t-0.3
2\t1.5\t40\tPB-1-1\tBcell\t1.1
3\t4\t80\tPB-9-9\tBcell\t2.0
";

fn store() -> Store {
    let mut store = Store::open_in_memory().unwrap();
    store.init_schema().unwrap();
    let reader = Reader::from_reader(Cursor::new(GTF)).unwrap();
    import_gtf(&mut store, reader, &ImportOptions::new("final")).unwrap();
    store
}

fn transcript(store: &Store, id: &str) -> query::TranscriptView {
    query::find_gene(store.connection(), "GENE1")
        .unwrap()
        .unwrap()
        .transcripts
        .into_iter()
        .find(|t| t.annot_transcript_id.as_deref() == Some(id))
        .unwrap()
}

#[test]
fn test_expression_merge_sets_attribute() {
    let mut store = store();
    let table = ExpressionTable::from_reader(TABLE.as_bytes()).unwrap();
    let summary = merge_expression(&mut store, &table, "final").unwrap();

    assert_eq!(summary.transcripts, 2);
    assert_eq!(summary.updated, 1);
    assert_eq!(summary.unmatched, 1);

    let merged = transcript(&store, "PB_1_1");
    let records: Vec<ExpressionRecord> =
        serde_json::from_value(merged.attributes["expression"].clone()).unwrap();
    assert_eq!(
        records,
        vec![
            ExpressionRecord {
                cell_type: "Tcell".into(),
                avg_exp: 0.25,
                pct_exp: 12.5,
                avg_exp_scaled: -0.3,
            },
            ExpressionRecord {
                cell_type: "Bcell".into(),
                avg_exp: 1.5,
                pct_exp: 40.0,
                avg_exp_scaled: 1.1,
            },
        ]
    );
    // other attributes are untouched
    assert_eq!(merged.attributes["note"], "kept");
    assert_eq!(merged.attributes["transcript_id"], "PB_1_1");

    let untouched = transcript(&store, "PB_1_2");
    assert!(untouched.attributes.get("expression").is_none());
}

#[test]
fn test_expression_merge_replaces_previous_statistics() {
    let mut store = store();
    let table = ExpressionTable::from_reader(TABLE.as_bytes()).unwrap();
    merge_expression(&mut store, &table, "final").unwrap();

    let update = "header\n1\t9\t90\tPB-1-1\tNK\t3\n";
    let table = ExpressionTable::from_reader(update.as_bytes()).unwrap();
    merge_expression(&mut store, &table, "final").unwrap();

    let merged = transcript(&store, "PB_1_1");
    let records = merged.attributes["expression"].as_array().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0]["cell_type"], "NK");
}

#[test]
fn test_expression_unknown_dataset() {
    let mut store = store();
    let table = ExpressionTable::from_reader(TABLE.as_bytes()).unwrap();
    let err = merge_expression(&mut store, &table, "missing").unwrap_err();
    assert!(matches!(err, Error::UnknownDataset(ref name) if name == "missing"));
}

#[test]
fn test_expression_only_matches_within_dataset() {
    let mut store = store();
    let other = "chr1\tX\tgene\t100\t900\t.\t+\t.\tgene_name \"GENE1\";
chr1\tX\ttranscript\t100\t900\t.\t+\t.\ttranscript_id \"PB_1_1\";
";
    let reader = Reader::from_reader(Cursor::new(other)).unwrap();
    import_gtf(&mut store, reader, &ImportOptions::new("other")).unwrap();

    let table = ExpressionTable::from_reader(TABLE.as_bytes()).unwrap();
    let summary = merge_expression(&mut store, &table, "other").unwrap();
    assert_eq!(summary.updated, 1);

    let in_final = query::find_gene(store.connection(), "GENE1")
        .unwrap()
        .unwrap()
        .transcripts
        .into_iter()
        .find(|t| t.dataset.as_deref() == Some("final") && t.annot_transcript_id.as_deref() == Some("PB_1_1"))
        .unwrap();
    assert!(in_final.attributes.get("expression").is_none());
}

#[test]
fn test_expression_from_file() {
    let mut file = tempfile::Builder::new().suffix(".txt").tempfile().unwrap();
    file.write_all(TABLE.as_bytes()).unwrap();
    file.flush().unwrap();

    let mut store = store();
    let summary = import_expression(&mut store, file.path(), "final").unwrap();
    assert_eq!(summary.updated, 1);
}

#[test]
fn test_expression_malformed_row_writes_nothing() {
    let mut file = tempfile::Builder::new().suffix(".txt").tempfile().unwrap();
    file.write_all(b"header\n1\t0.1\t2\tPB-1-1\tT\t0.5\n2\tNaN?\t2\tPB-1-2\tT\t0.5\n")
        .unwrap();
    file.flush().unwrap();

    let mut store = store();
    let err = import_expression(&mut store, file.path(), "final").unwrap_err();
    assert!(err.is_malformed());
    assert!(transcript(&store, "PB_1_1").attributes.get("expression").is_none());
}

#[test]
fn test_expression_repeated_cell_type_keeps_first_position() {
    let table = "header
1\t0.25\t12.5\tPB-1-1\tTcell\t-0.3
2\t1.5\t40\tPB-1-1\tBcell\t1.1
3\t7\t70\tPB-1-1\tTcell\t0.7
";
    let mut store = store();
    let table = ExpressionTable::from_reader(table.as_bytes()).unwrap();
    merge_expression(&mut store, &table, "final").unwrap();

    let merged = transcript(&store, "PB_1_1");
    let records = merged.attributes["expression"].as_array().unwrap();
    let cells: Vec<_> = records.iter().map(|r| r["cell_type"].as_str().unwrap()).collect();
    assert_eq!(cells, vec!["Tcell", "Bcell"]);
    assert_eq!(records[0]["avg_exp"], 7.0);
    assert_eq!(records[0]["pct_exp"], 70.0);
}

#[test]
fn test_expression_non_finite_statistic_writes_nothing() {
    let mut file = tempfile::Builder::new().suffix(".txt").tempfile().unwrap();
    file.write_all(b"header\n1\t0.5\t10\tPB-1-1\tT\tNaN\n").unwrap();
    file.flush().unwrap();

    let mut store = store();
    let err = import_expression(&mut store, file.path(), "final").unwrap_err();
    assert!(matches!(
        err,
        Error::Reader(ReaderError::InvalidField { line: 2, field: "avg_exp_scaled", .. })
    ));
    assert!(err.is_malformed());
    assert!(transcript(&store, "PB_1_1").attributes.get("expression").is_none());
}

#[test]
fn test_expression_invalid_utf8_is_malformed() {
    let mut file = tempfile::Builder::new().suffix(".txt").tempfile().unwrap();
    file.write_all(b"header\n1\t0.5\t10\tPB-1-1\t\xff\t0.1\n").unwrap();
    file.flush().unwrap();

    let mut store = store();
    let err = import_expression(&mut store, file.path(), "final").unwrap_err();
    assert!(matches!(err, Error::Reader(ReaderError::InvalidEncoding { line: 2, .. })));
    assert!(err.is_malformed());
    assert!(transcript(&store, "PB_1_1").attributes.get("expression").is_none());
}
