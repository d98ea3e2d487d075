use std::path::PathBuf;
use std::process;

use clap::{self, Parser, Subcommand};
use log::{error, info, Level};
use serde::Serialize;
use simple_logger::init_with_level;

use gxfstore::{
    generate_model_transcripts, import_expression, import_gtf_path, populate, query, ImportOptions,
    MissingExonsPolicy, ModelOptions, PopulateOptions, Store,
};

#[derive(Debug, Parser)]
#[command(
    name = "gxfstore",
    version,
    about = "load GTF annotations and isoform expression tables into a gene/transcript/exon store"
)]
struct Args {
    /// SQLite database file
    #[arg(long, env = "GXFSTORE_DB", default_value = "gxfstore.db")]
    db: PathBuf,

    /// Log debug messages
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Only log errors
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Create the tables
    Init {
        /// Apply this schema script instead of the bundled one
        #[arg(long)]
        schema: Option<PathBuf>,
    },
    /// Import a GTF file as a new dataset
    Import {
        gtf: PathBuf,
        /// Dataset name
        #[arg(short, long)]
        name: String,
        /// Only annotate genes already in the store
        #[arg(short, long)]
        reference: bool,
    },
    /// Regenerate the model transcript of every gene
    Models {
        /// Skip genes without exons instead of failing
        #[arg(long)]
        skip_missing: bool,
    },
    /// Merge an expression table into a dataset
    Expression {
        table: PathBuf,
        #[arg(short, long)]
        dataset: String,
    },
    /// Run the standard import sequence on a data directory
    Populate { dir: PathBuf },
    /// Print a gene with its transcripts and exons
    Gene { name: String },
    /// List datasets
    Datasets,
}

fn main() {
    let start = std::time::Instant::now();
    let args = Args::parse();

    let level = if args.verbose {
        Level::Debug
    } else if args.quiet {
        Level::Error
    } else {
        Level::Info
    };
    init_with_level(level).unwrap_or_else(|e| {
        eprintln!("ERROR: could not initialize logger: {e}");
        process::exit(1);
    });

    if let Err(e) = run(args) {
        error!("{}", e);
        process::exit(1);
    }

    info!("Elapsed time: {:.3?}", start.elapsed());
}

fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let mut store = Store::open(&args.db)?;

    match args.command {
        Command::Init { schema } => match schema {
            Some(path) => store.init_schema_from_file(path)?,
            None => store.init_schema()?,
        },
        Command::Import {
            gtf,
            name,
            reference,
        } => {
            let options = ImportOptions::new(name).reference(reference);
            let summary = import_gtf_path(&mut store, gtf, &options)?;
            print_json(&ImportReport::from(&summary))?;
        }
        Command::Models { skip_missing } => {
            let policy = if skip_missing {
                MissingExonsPolicy::Skip
            } else {
                MissingExonsPolicy::Abort
            };
            let summary =
                generate_model_transcripts(&mut store, &ModelOptions::new().missing_exons(policy))?;
            print_json(&ModelReport {
                genes: summary.genes,
                exons: summary.exons,
                skipped: summary.skipped,
            })?;
        }
        Command::Expression { table, dataset } => {
            let summary = import_expression(&mut store, table, &dataset)?;
            print_json(&ExpressionReport {
                transcripts: summary.transcripts,
                updated: summary.updated,
                unmatched: summary.unmatched,
            })?;
        }
        Command::Populate { dir } => {
            populate(&mut store, dir, &PopulateOptions::default())?;
        }
        Command::Gene { name } => match query::find_gene(store.connection(), &name)? {
            Some(gene) => print_json(&gene)?,
            None => return Err(format!("gene '{name}' not found").into()),
        },
        Command::Datasets => print_json(&query::list_datasets(store.connection())?)?,
    }

    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<(), serde_json::Error> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[derive(Serialize)]
struct Counts {
    genes: usize,
    transcripts: usize,
    exons: usize,
}

#[derive(Serialize)]
struct ImportReport {
    dataset_id: i64,
    parsed: Counts,
    inserted: Counts,
    updated_genes: usize,
}

impl From<&gxfstore::ImportSummary> for ImportReport {
    fn from(summary: &gxfstore::ImportSummary) -> Self {
        let counts = |c: gxfstore::import::FeatureCounts| Counts {
            genes: c.genes,
            transcripts: c.transcripts,
            exons: c.exons,
        };
        Self {
            dataset_id: summary.dataset_id,
            parsed: counts(summary.parsed),
            inserted: counts(summary.inserted),
            updated_genes: summary.updated_genes,
        }
    }
}

#[derive(Serialize)]
struct ModelReport {
    genes: usize,
    exons: usize,
    skipped: usize,
}

#[derive(Serialize)]
struct ExpressionReport {
    transcripts: usize,
    updated: usize,
    unmatched: usize,
}
