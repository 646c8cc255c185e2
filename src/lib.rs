//! `lexop`: structured-query evaluation for lexical retrieval.
//!
//! Queries in an Indri-style operator language (`#and`, `#or`, `#near/n`, `#window/n`,
//! `#syn`, `#sum`, `#wand`, `#wsum`) are parsed into an operator tree and evaluated
//! document-at-a-time against an [`index::IndexSource`]:
//! - `query`: operator tree, parser, DAAT evaluator
//! - `model`: unranked/ranked boolean, BM25, Indri scoring
//! - `feedback`: pseudo-relevance-feedback query expansion
//! - `features` + `ltr`: learning-to-rank feature vectors and an external ranker
//! - `batch`: query file → TREC ranking file
//!
//! Scope:
//! - In-memory reference index (JSON-lines corpus), any other index via the trait
//! - Deterministic ranking (score, then external id, then docid)
//! - Single-threaded, one query at a time
//!
//! Non-goals:
//! - Building or persisting on-disk indexes
//! - Stemming (stems are whatever the index holds)
//! - Training ranking models in-process
//!
//! References:
//! - Robertson & Zaragoza (2009): BM25 and beyond
//! - Metzler & Croft (2004): combining the language model and inference network approaches
//! - Lavrenko & Croft (2001): relevance-based language models (feedback)
//! - Joachims (2006): training linear SVMs in linear time (svm_rank)

pub mod batch;
pub mod config;
pub mod features;
pub mod feedback;
pub mod index;
pub mod ltr;
pub mod model;
pub mod query;
pub mod score_list;
pub mod tokenizer;
pub mod trec;

pub use error::Error;
pub use index::{DocId, IndexSource, MemoryIndex};
pub use model::RetrievalModel;
pub use query::{Evaluator, QueryNode, QueryParser};
pub use score_list::ScoreList;

mod error {
    use crate::query::ParseError;

    /// Errors for query evaluation and batch runs.
    #[derive(thiserror::Error, Debug)]
    pub enum Error {
        /// Query syntax error; batch runs skip the query.
        #[error("parse error: {0}")]
        Parse(#[from] ParseError),
        /// A programmatically built tree that cannot be evaluated.
        #[error("invalid query: {0}")]
        InvalidQuery(String),
        /// The document has no term vector for the field.
        #[error("document {docid} has no term vector for field {field}")]
        MissingTermVector {
            /// Internal document id.
            docid: u32,
            /// Requested field.
            field: String,
        },
        /// No document carries this external id.
        #[error("external id not found: {0}")]
        ExternalIdNotFound(String),
        /// No document carries this internal id.
        #[error("document not found: {0}")]
        DocNotFound(u32),
        /// The external ranker exited unsuccessfully.
        #[error("ranker {program} failed ({status}): {stderr}")]
        RankerProcess {
            /// Executable that was run.
            program: String,
            /// Exit status as reported by the OS.
            status: String,
            /// Captured standard error.
            stderr: String,
        },
        /// A feature vector of the wrong length.
        #[error("feature count mismatch: expected {expected}, got {actual}")]
        FeatureCountMismatch {
            /// Required number of features.
            expected: usize,
            /// Number supplied.
            actual: usize,
        },
        /// Missing or invalid parameter.
        #[error("config: {0}")]
        Config(String),
        /// Malformed input file.
        #[error("format: {0}")]
        Format(String),
        /// I/O failure.
        #[error(transparent)]
        Io(#[from] std::io::Error),
        /// Malformed corpus record.
        #[error(transparent)]
        Json(#[from] serde_json::Error),
    }
}
