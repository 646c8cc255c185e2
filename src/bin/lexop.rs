//! `lexop` CLI: batch runs, ad-hoc structured search, query inspection.

#[cfg(feature = "cli")]
use clap::{Parser, Subcommand, ValueEnum};
#[cfg(feature = "cli")]
use lexop::batch::{retrieve, BatchRunner};
#[cfg(feature = "cli")]
use lexop::config::RunConfig;
#[cfg(feature = "cli")]
use lexop::model::{Bm25Params, IndriParams};
#[cfg(feature = "cli")]
use lexop::tokenizer::SimpleTokenizer;
#[cfg(feature = "cli")]
use lexop::{MemoryIndex, QueryParser, RetrievalModel};
#[cfg(feature = "cli")]
use std::path::PathBuf;
#[cfg(feature = "cli")]
use tracing_subscriber::EnvFilter;

#[cfg(feature = "cli")]
#[derive(Parser, Debug)]
#[command(author, version, about = "Structured-query retrieval CLI", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[cfg(feature = "cli")]
#[derive(ValueEnum, Debug, Clone, Copy)]
enum Model {
    UnrankedBoolean,
    RankedBoolean,
    Bm25,
    Indri,
}

#[cfg(feature = "cli")]
#[derive(Subcommand, Debug)]
enum Commands {
    /// Evaluate a query file as described by a parameter file.
    Run {
        /// Parameter file (`key=value` per line).
        params: PathBuf,
    },

    /// Search a JSON-lines corpus with one query.
    Search {
        /// Corpus file (one `{"id", "fields", "stored"}` object per line).
        #[arg(short, long)]
        index: PathBuf,

        /// Retrieval model.
        #[arg(short, long, value_enum, default_value_t = Model::Bm25)]
        model: Model,

        /// Top-k results to return.
        #[arg(short, long, default_value_t = 10)]
        k: usize,

        /// BM25 k1.
        #[arg(long, default_value_t = 1.2)]
        k1: f64,

        /// BM25 b.
        #[arg(long, default_value_t = 0.75)]
        b: f64,

        /// Indri mu.
        #[arg(long, default_value_t = 1000.0)]
        mu: f64,

        /// Indri lambda.
        #[arg(long, default_value_t = 0.7)]
        lambda: f64,

        /// Query text.
        #[arg(required = true)]
        query: Vec<String>,
    },

    /// Print the operator tree a query parses to.
    Parse {
        /// Retrieval model (selects the default operator).
        #[arg(short, long, value_enum, default_value_t = Model::Bm25)]
        model: Model,

        /// Query text.
        #[arg(required = true)]
        query: Vec<String>,
    },
}

#[cfg(feature = "cli")]
impl Model {
    fn retrieval_model(self, bm25: Bm25Params, indri: IndriParams) -> RetrievalModel {
        match self {
            Self::UnrankedBoolean => RetrievalModel::UnrankedBoolean,
            Self::RankedBoolean => RetrievalModel::RankedBoolean,
            Self::Bm25 => RetrievalModel::Bm25(bm25),
            Self::Indri => RetrievalModel::Indri(indri),
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    #[cfg(feature = "cli")]
    {
        tracing_subscriber::fmt()
            .with_writer(std::io::stderr)
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
            )
            .init();

        let args = Args::parse();
        let tokenizer = SimpleTokenizer::default();

        match args.command {
            Commands::Run { params } => {
                let config = RunConfig::load(&params)?;
                let index = MemoryIndex::open(&config.index_path, &tokenizer)?;
                let summary = BatchRunner::new(&index, &tokenizer, &config).run()?;
                println!(
                    "ok: evaluated {} queries, skipped {}, wrote {}",
                    summary.evaluated,
                    summary.skipped,
                    config.output_path.display()
                );
            }
            Commands::Search {
                index,
                model,
                k,
                k1,
                b,
                mu,
                lambda,
                query,
            } => {
                let idx = MemoryIndex::open(&index, &tokenizer)?;
                let model = model.retrieval_model(
                    Bm25Params {
                        k1,
                        b,
                        ..Bm25Params::default()
                    },
                    IndriParams::new(mu, lambda),
                );
                let query = query.join(" ");
                let node = QueryParser::new(&tokenizer).parse(&query, &model)?;
                let results = retrieve(&idx, &model, &node, k)?;

                println!("Results for {}:", node);
                for (rank, e) in results.iter().enumerate() {
                    println!(
                        "  {}. {} score {:.4}",
                        rank + 1,
                        e.external_id.as_deref().unwrap_or("?"),
                        e.score
                    );
                }
            }
            Commands::Parse { model, query } => {
                let model = model.retrieval_model(Bm25Params::default(), IndriParams::default());
                let node = QueryParser::new(&tokenizer).parse(&query.join(" "), &model)?;
                println!("{node}");
            }
        }
    }

    #[cfg(not(feature = "cli"))]
    println!("CLI feature is disabled. Build with --features cli to enable.");

    Ok(())
}
