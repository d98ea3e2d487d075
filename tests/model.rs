use std::io::Cursor;

use gxfstore::{
    generate_model_transcripts, import_gtf, query, Error, ImportOptions, MissingExonsPolicy,
    ModelOptions, Reader, Store,
};

// Two datasets whose exons overlap on GENE1 (+) and GENE2 (-).
const FIRST: &str = "chr1\ts\tgene\t100\t900\t.\t+\t.\tgene_name \"GENE1\";
chr1\ts\ttranscript\t100\t400\t.\t+\t.\ttranscript_id \"A1\";
chr1\ts\texon\t100\t200\t.\t+\t.\ttranscript_id \"A1\"; exon_number 1;
chr1\ts\texon\t300\t400\t.\t+\t.\ttranscript_id \"A1\"; exon_number 2;
chr1\ts\ttranscript\t150\t900\t.\t+\t.\ttranscript_id \"A2\";
chr1\ts\texon\t150\t250\t.\t+\t.\ttranscript_id \"A2\"; exon_number 1;
chr1\ts\texon\t800\t900\t.\t+\t.\ttranscript_id \"A2\"; exon_number 2;
chr2\ts\tgene\t100\t400\t.\t-\t.\tgene_name \"GENE2\";
chr2\ts\ttranscript\t100\t400\t.\t-\t.\ttranscript_id \"B1\";
chr2\ts\texon\t300\t400\t.\t-\t.\ttranscript_id \"B1\"; exon_number 1;
chr2\ts\texon\t100\t200\t.\t-\t.\ttranscript_id \"B1\"; exon_number 2;
";

const SECOND: &str = "chr1\tr\tgene\t50\t900\t.\t+\t.\tgene_name \"GENE1\";
chr1\tr\ttranscript\t50\t400\t.\t+\t.\ttranscript_id \"R1\";
chr1\tr\texon\t50\t120\t.\t+\t.\ttranscript_id \"R1\"; exon_number 1;
chr1\tr\texon\t400\t450\t.\t+\t.\ttranscript_id \"R1\"; exon_number 2;
";

const EMPTY_GENE: &str = "chr5\ts\tgene\t1\t10\t.\t+\t.\tgene_name \"EMPTY\";\n";

fn store_with(datasets: &[(&'static str, &str)]) -> Store {
    let mut store = Store::open_in_memory().unwrap();
    store.init_schema().unwrap();
    for (gtf, name) in datasets {
        let reader = Reader::from_reader(Cursor::new(*gtf)).unwrap();
        import_gtf(&mut store, reader, &ImportOptions::new(*name)).unwrap();
    }
    store
}

fn model_exons(store: &Store, gene: &str) -> Vec<(i64, i64, i64)> {
    let gene = query::find_gene(store.connection(), gene).unwrap().unwrap();
    gene.model()
        .unwrap()
        .exons
        .iter()
        .map(|exon| (exon.exon_number, exon.chrom_start, exon.chrom_end))
        .collect()
}

fn count_models(store: &Store) -> (i64, i64) {
    let conn = store.connection();
    let transcripts = conn
        .query_row("SELECT COUNT(*) FROM transcript WHERE is_model = 1", [], |row| row.get(0))
        .unwrap();
    let exons = conn
        .query_row(
            "SELECT COUNT(*) FROM exon e JOIN transcript t ON t.id = e.transcript_id
            WHERE t.is_model = 1",
            [],
            |row| row.get(0),
        )
        .unwrap();
    (transcripts, exons)
}

#[test]
fn test_model_forward_strand_unions_across_datasets() {
    let mut store = store_with(&[(FIRST, "first"), (SECOND, "second")]);
    let summary = generate_model_transcripts(&mut store, &ModelOptions::default()).unwrap();
    assert_eq!(summary.genes, 2);
    assert_eq!(summary.skipped, 0);

    assert_eq!(
        model_exons(&store, "GENE1"),
        vec![(1, 50, 250), (2, 300, 450), (3, 800, 900)]
    );

    let gene = query::find_gene(store.connection(), "GENE1").unwrap().unwrap();
    let model = gene.model().unwrap();
    assert_eq!((model.chrom_start, model.chrom_end), (50, 900));
    assert_eq!(model.dataset_id, None);
    assert_eq!(model.dataset, None);
    assert_eq!(model.annot_transcript_id, None);
    assert_eq!(model.exons[0].attributes["exon_number"], 1);
}

#[test]
fn test_model_numbering_follows_strand() {
    let gtf = "chr1\ts\tgene\t1\t25\t.\t+\t.\tgene_name \"PLUS\";
chr1\ts\ttranscript\t1\t10\t.\t+\t.\ttranscript_id \"P1\";
chr1\ts\texon\t1\t5\t.\t+\t.\ttranscript_id \"P1\"; exon_number 1;
chr1\ts\texon\t4\t10\t.\t+\t.\ttranscript_id \"P1\"; exon_number 2;
chr1\ts\ttranscript\t20\t25\t.\t+\t.\ttranscript_id \"P2\";
chr1\ts\texon\t20\t25\t.\t+\t.\ttranscript_id \"P2\"; exon_number 1;
chr1\ts\tgene\t1\t25\t.\t-\t.\tgene_name \"MINUS\";
chr1\ts\ttranscript\t1\t25\t.\t-\t.\ttranscript_id \"M1\";
chr1\ts\texon\t20\t25\t.\t-\t.\ttranscript_id \"M1\"; exon_number 1;
chr1\ts\texon\t4\t10\t.\t-\t.\ttranscript_id \"M1\"; exon_number 2;
chr1\ts\texon\t1\t5\t.\t-\t.\ttranscript_id \"M1\"; exon_number 3;
";
    let mut store = store_with(&[(gtf, "d")]);
    generate_model_transcripts(&mut store, &ModelOptions::default()).unwrap();

    assert_eq!(model_exons(&store, "PLUS"), vec![(1, 1, 10), (2, 20, 25)]);
    assert_eq!(model_exons(&store, "MINUS"), vec![(1, 20, 25), (2, 1, 10)]);

    let gene = query::find_gene(store.connection(), "MINUS").unwrap().unwrap();
    let model = gene.model().unwrap();
    assert_eq!((model.chrom_start, model.chrom_end), (1, 25));
    assert_eq!(gene.transcripts.iter().filter(|t| t.is_model).count(), 1);
}

#[test]
fn test_model_reverse_strand_numbers_downstream_first() {
    let mut store = store_with(&[(FIRST, "first")]);
    generate_model_transcripts(&mut store, &ModelOptions::default()).unwrap();
    assert_eq!(model_exons(&store, "GENE2"), vec![(1, 300, 400), (2, 100, 200)]);
}

#[test]
fn test_model_regeneration_replaces_previous_models() {
    let mut store = store_with(&[(FIRST, "first")]);
    generate_model_transcripts(&mut store, &ModelOptions::default()).unwrap();
    let before = count_models(&store);
    assert_eq!(before, (2, 5));

    // a later dataset widens GENE1
    let reader = Reader::from_reader(Cursor::new(SECOND)).unwrap();
    import_gtf(&mut store, reader, &ImportOptions::new("second")).unwrap();
    let summary = generate_model_transcripts(&mut store, &ModelOptions::default()).unwrap();

    assert_eq!(summary.deleted, (5, 2));
    assert_eq!(count_models(&store), (2, 5));
    assert_eq!(model_exons(&store, "GENE1")[0], (1, 50, 250));
}

#[test]
fn test_model_models_are_ignored_as_input() {
    let mut store = store_with(&[(FIRST, "first")]);
    generate_model_transcripts(&mut store, &ModelOptions::default()).unwrap();
    let first = model_exons(&store, "GENE1");
    generate_model_transcripts(&mut store, &ModelOptions::default()).unwrap();
    assert_eq!(model_exons(&store, "GENE1"), first);
}

#[test]
fn test_model_gene_without_exons_aborts_by_default() {
    let mut store = store_with(&[(FIRST, "first")]);
    generate_model_transcripts(&mut store, &ModelOptions::default()).unwrap();

    let reader = Reader::from_reader(Cursor::new(EMPTY_GENE)).unwrap();
    import_gtf(&mut store, reader, &ImportOptions::new("empty")).unwrap();

    let err = generate_model_transcripts(&mut store, &ModelOptions::default()).unwrap_err();
    assert!(matches!(err, Error::NoExonsForGene { ref name, .. } if name == "EMPTY"));
    // the earlier models survive the failed run
    assert_eq!(count_models(&store), (2, 5));
}

#[test]
fn test_model_gene_without_exons_can_be_skipped() {
    let mut store = store_with(&[(FIRST, "first"), (EMPTY_GENE, "empty")]);
    let options = ModelOptions::new().missing_exons(MissingExonsPolicy::Skip);
    let summary = generate_model_transcripts(&mut store, &options).unwrap();

    assert_eq!(summary.genes, 2);
    assert_eq!(summary.skipped, 1);
    let gene = query::find_gene(store.connection(), "EMPTY").unwrap().unwrap();
    assert!(gene.model().is_none());
}
