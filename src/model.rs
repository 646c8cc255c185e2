//! Retrieval models: which scoring policy the evaluator applies.
//!
//! Scores are computed per posting by the SCORE operator and combined by the score-list
//! operators. The formulas are exposed as free functions so the feature builder can apply
//! them to term-vector statistics and agree numerically with the operator path.
//!
//! References:
//! - Robertson & Zaragoza (2009). "The Probabilistic Relevance Framework: BM25 and Beyond."
//! - Zhai & Lafferty (2001). Dirichlet smoothing for language-model retrieval.
//! - Metzler & Croft (2004). Indri's two-stage (Dirichlet + Jelinek-Mercer) smoothing.

use crate::features::FeatureMask;
use crate::index::{DocId, IndexSource, InvertedList};
use crate::score_list::ScoreList;
use crate::Error;

/// BM25 parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bm25Params {
    /// Term-frequency saturation.
    pub k1: f64,
    /// Length normalization.
    pub b: f64,
    /// Query-term-frequency saturation. Accepted but unused: the user weight is always 1.
    pub k3: f64,
}

impl Default for Bm25Params {
    fn default() -> Self {
        Self {
            k1: 1.2,
            b: 0.75,
            k3: 0.0,
        }
    }
}

/// Indri (Dirichlet prior + linear interpolation) parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IndriParams {
    /// Dirichlet prior strength.
    pub mu: f64,
    /// Weight of the smoothed document model against the collection model.
    pub lambda: f64,
}

impl Default for IndriParams {
    fn default() -> Self {
        Self {
            mu: 1000.0,
            lambda: 0.7,
        }
    }
}

impl IndriParams {
    /// Parameters with `mu` clamped to `>= 0` and `lambda` to `[0, 1]`.
    pub fn new(mu: f64, lambda: f64) -> Self {
        Self {
            mu: mu.max(0.0),
            lambda: lambda.clamp(0.0, 1.0),
        }
    }
}

/// Learning-to-rank configuration: the embedded models drive candidate retrieval and the
/// per-field features; the mask selects which features are produced.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LtrParams {
    /// BM25 parameters (initial retrieval and BM25 features).
    pub bm25: Bm25Params,
    /// Indri parameters (Indri features).
    pub indri: IndriParams,
    /// Enabled features.
    pub mask: FeatureMask,
}

/// The active scoring policy.
#[derive(Debug, Clone, PartialEq)]
pub enum RetrievalModel {
    /// Match → 1.0, otherwise 0.0.
    UnrankedBoolean,
    /// Match → term frequency, otherwise 0.0.
    RankedBoolean,
    /// Okapi BM25.
    Bm25(Bm25Params),
    /// Indri query likelihood.
    Indri(IndriParams),
    /// BM25 candidates re-ranked by an external ranker.
    LearningToRank(LtrParams),
}

impl RetrievalModel {
    /// Name as written in parameter files.
    pub fn name(&self) -> &'static str {
        match self {
            Self::UnrankedBoolean => "UnrankedBoolean",
            Self::RankedBoolean => "RankedBoolean",
            Self::Bm25(_) => "BM25",
            Self::Indri(_) => "Indri",
            Self::LearningToRank(_) => "letor",
        }
    }

    /// Whether this is one of the two boolean models.
    pub fn is_boolean(&self) -> bool {
        matches!(self, Self::UnrankedBoolean | Self::RankedBoolean)
    }

    /// The model operators are scored with. Learning-to-rank retrieves with BM25.
    pub fn scoring_model(&self) -> RetrievalModel {
        match self {
            Self::LearningToRank(p) => Self::Bm25(p.bm25),
            other => other.clone(),
        }
    }

    /// Score every posting of `list` (the SCORE operator).
    pub fn score_postings(
        &self,
        index: &dyn IndexSource,
        list: &InvertedList,
    ) -> Result<ScoreList, Error> {
        let mut out = ScoreList::new();
        match self {
            Self::UnrankedBoolean => {
                for p in &list.postings {
                    out.push(p.docid, 1.0);
                }
            }
            Self::RankedBoolean => {
                for p in &list.postings {
                    out.push(p.docid, f64::from(p.tf()));
                }
            }
            Self::Bm25(params) => score_bm25(params, index, list, &mut out)?,
            Self::LearningToRank(ltr) => score_bm25(&ltr.bm25, index, list, &mut out)?,
            Self::Indri(params) => {
                let sum_ttf = index.sum_total_term_freq(&list.field)?;
                for p in &list.postings {
                    let doc_len = index.doc_length(p.docid, &list.field)?;
                    out.push(
                        p.docid,
                        indri_term_score(params, p.tf(), doc_len, list.ctf, sum_ttf),
                    );
                }
            }
        }
        Ok(out)
    }

    /// Score of a term absent from `docid`: the Indri formula with tf = 0, zero otherwise.
    pub fn default_term_score(
        &self,
        index: &dyn IndexSource,
        docid: DocId,
        field: &str,
        ctf: u64,
    ) -> Result<f64, Error> {
        match self.scoring_model() {
            Self::Indri(params) => {
                let doc_len = index.doc_length(docid, field)?;
                let sum_ttf = index.sum_total_term_freq(field)?;
                Ok(indri_term_score(&params, 0, doc_len, ctf, sum_ttf))
            }
            _ => Ok(0.0),
        }
    }
}

fn score_bm25(
    params: &Bm25Params,
    index: &dyn IndexSource,
    list: &InvertedList,
    out: &mut ScoreList,
) -> Result<(), Error> {
    let avg_doc_len = index.avg_doc_len(&list.field)?;
    let idf = bm25_idf(index.num_docs(), list.df());
    for p in &list.postings {
        let doc_len = index.doc_length(p.docid, &list.field)?;
        out.push(
            p.docid,
            idf * bm25_tf_weight(params, p.tf(), doc_len, avg_doc_len),
        );
    }
    Ok(())
}

/// Robertson–Spärck Jones weight `ln((N - df + 0.5) / (df + 0.5))`.
///
/// Negative when a term occurs in more than half the collection.
pub fn bm25_idf(num_docs: u32, df: u32) -> f64 {
    let n = f64::from(num_docs);
    let df = f64::from(df);
    ((n - df + 0.5) / (df + 0.5)).ln()
}

/// BM25 term-frequency weight `tf / (tf + k1 * ((1 - b) + b * doclen / avgdoclen))`.
pub fn bm25_tf_weight(params: &Bm25Params, tf: u32, doc_len: u64, avg_doc_len: f64) -> f64 {
    let tf = f64::from(tf);
    let norm = if avg_doc_len > 0.0 {
        doc_len as f64 / avg_doc_len
    } else {
        0.0
    };
    tf / (tf + params.k1 * ((1.0 - params.b) + params.b * norm))
}

/// Full BM25 score of one posting (user weight fixed at 1).
pub fn bm25_term_score(
    params: &Bm25Params,
    num_docs: u32,
    df: u32,
    tf: u32,
    doc_len: u64,
    avg_doc_len: f64,
) -> f64 {
    bm25_idf(num_docs, df) * bm25_tf_weight(params, tf, doc_len, avg_doc_len)
}

/// Indri score `lambda * (tf + mu * p_mle) / (doclen + mu) + (1 - lambda) * p_mle`,
/// with `p_mle = ctf / sum_total_term_freq`.
pub fn indri_term_score(
    params: &IndriParams,
    tf: u32,
    doc_len: u64,
    ctf: u64,
    sum_total_term_freq: u64,
) -> f64 {
    let p_mle = if sum_total_term_freq == 0 {
        0.0
    } else {
        ctf as f64 / sum_total_term_freq as f64
    };
    params.lambda * (f64::from(tf) + params.mu * p_mle) / (doc_len as f64 + params.mu)
        + (1.0 - params.lambda) * p_mle
}
