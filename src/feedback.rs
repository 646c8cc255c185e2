//! Pseudo-relevance feedback.
//!
//! Terms from the top-ranked documents are scored with a Dirichlet-smoothed document model
//! weighted by the document's retrieval score and the term's inverse collection frequency:
//!
//! ```text
//! p_mle(t)   = ctf(t) / |C|
//! p(t|d)     = (tf(t,d) + mu * p_mle(t)) / (|d| + mu)
//! score(t)   = Σ_d p(t|d) * score(d) * ln(|C| / ctf(t))
//! ```
//!
//! The best terms form a `#wand` that is mixed with the original query.

use crate::index::{DocId, IndexSource, DEFAULT_FIELD};
use crate::query::{QueryNode, Weighted};
use crate::score_list::ScoreListEntry;
use crate::Error;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::str::FromStr;

/// Whether terms dropped for containing `.` or `,` use up a slot of the term budget.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TermBudget {
    /// The top `terms` candidates are taken first, then punctuated ones are dropped; the
    /// expansion may hold fewer than `terms` terms.
    #[default]
    CountExcluded,
    /// Punctuated terms are dropped first; the expansion holds up to `terms` terms.
    SkipExcluded,
}

impl FromStr for TermBudget {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "countExcluded" => Ok(Self::CountExcluded),
            "skipExcluded" => Ok(Self::SkipExcluded),
            other => Err(Error::Config(format!("unknown fbTermBudget {other:?}"))),
        }
    }
}

/// Feedback parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedbackParams {
    /// Number of top documents used.
    pub docs: usize,
    /// Number of expansion terms requested.
    pub terms: usize,
    /// Dirichlet prior of the document model.
    pub mu: f64,
    /// Weight of the original query in the expanded query.
    pub orig_weight: f64,
    /// Field whose term vectors are mined.
    pub field: String,
    /// Term budget accounting.
    pub budget: TermBudget,
}

impl Default for FeedbackParams {
    fn default() -> Self {
        Self {
            docs: 10,
            terms: 10,
            mu: 0.0,
            orig_weight: 0.5,
            field: DEFAULT_FIELD.to_string(),
            budget: TermBudget::default(),
        }
    }
}

/// A scored expansion term.
#[derive(Debug, Clone, PartialEq)]
pub struct ExpansionTerm {
    /// The stem.
    pub term: String,
    /// Expansion score, used as its `#wand` weight.
    pub score: f64,
}

/// Selected expansion terms, best first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Expansion {
    /// Terms in descending score order.
    pub terms: Vec<ExpansionTerm>,
}

impl Expansion {
    /// Whether no term was selected.
    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// `#wand(score_1 term_1 ...)`.
    pub fn to_query(&self) -> QueryNode {
        QueryNode::WAnd(
            self.terms
                .iter()
                .map(|t| Weighted::new(t.score, QueryNode::term(t.term.as_str())))
                .collect(),
        )
    }

    /// Expansion-file line: `<qid>: #WAND ( <w> <term> ... )`.
    pub fn to_line(&self, query_id: &str) -> String {
        let terms: String = self
            .terms
            .iter()
            .map(|t| format!("{:.4} {} ", t.score, t.term))
            .collect();
        format!("{query_id}: #WAND ( {terms})")
    }
}

/// Ranking order of expansion terms: score descending, then term ascending.
fn expansion_order(a: &ExpansionTerm, b: &ExpansionTerm) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| a.term.cmp(&b.term))
}

fn is_punctuated(term: &str) -> bool {
    term.contains('.') || term.contains(',')
}

struct Candidate {
    score: f64,
    doc_len: f64,
    tf: HashMap<String, u32>,
}

/// Mines expansion terms from top-ranked documents.
pub struct FeedbackExpander<'a> {
    index: &'a dyn IndexSource,
    params: FeedbackParams,
}

impl<'a> FeedbackExpander<'a> {
    /// Expander over `index`.
    pub fn new(index: &'a dyn IndexSource, params: FeedbackParams) -> Self {
        Self { index, params }
    }

    /// Parameters in use.
    pub fn params(&self) -> &FeedbackParams {
        &self.params
    }

    /// Score the terms of the first `docs` entries of `ranked` (already in rank order).
    ///
    /// Documents without a term vector in the feedback field are skipped.
    pub fn expand(&self, ranked: &[ScoreListEntry]) -> Result<Expansion, Error> {
        let field = self.params.field.as_str();
        let mut ctf: HashMap<String, u64> = HashMap::new();
        let mut candidates = Vec::new();

        for entry in ranked.iter().take(self.params.docs) {
            let tv = match self.index.term_vector(entry.docid, field) {
                Ok(tv) => tv,
                Err(Error::MissingTermVector { docid, .. }) => {
                    tracing::debug!(docid, field, "feedback document has no term vector");
                    continue;
                }
                Err(e) => return Err(e),
            };
            for s in tv.stems() {
                ctf.entry(s.stem.clone()).or_insert(s.ctf);
            }
            candidates.push(Candidate {
                score: entry.score,
                doc_len: self.index.doc_length(entry.docid, field)? as f64,
                tf: tv.stems().map(|s| (s.stem.clone(), s.tf)).collect(),
            });
        }

        let collection_len = self.index.sum_total_term_freq(field)? as f64;
        let mu = self.params.mu;
        let mut scored: Vec<ExpansionTerm> = ctf
            .into_iter()
            .filter(|(_, c)| *c > 0)
            .map(|(term, c)| {
                let c = c as f64;
                let p_mle = c / collection_len;
                let idf = (collection_len / c).ln();
                let score = candidates
                    .iter()
                    .map(|d| {
                        let tf = f64::from(d.tf.get(&term).copied().unwrap_or(0));
                        let p_td = (tf + mu * p_mle) / (d.doc_len + mu);
                        p_td * d.score * idf
                    })
                    .sum();
                ExpansionTerm { term, score }
            })
            .collect();
        scored.sort_by(expansion_order);

        let n = self.params.terms;
        let terms: Vec<ExpansionTerm> = match self.params.budget {
            TermBudget::CountExcluded => scored
                .into_iter()
                .take(n)
                .filter(|t| !is_punctuated(&t.term))
                .collect(),
            TermBudget::SkipExcluded => scored
                .into_iter()
                .filter(|t| !is_punctuated(&t.term))
                .take(n)
                .collect(),
        };
        tracing::debug!(
            docs = candidates.len(),
            terms = terms.len(),
            "feedback expansion"
        );
        Ok(Expansion { terms })
    }

    /// `#wand(w #and(original) (1-w) expansion)`; the original query alone when the expansion
    /// is empty.
    pub fn expanded_query(&self, original: QueryNode, expansion: &Expansion) -> QueryNode {
        if expansion.is_empty() {
            return original;
        }
        let w = self.params.orig_weight;
        QueryNode::WAnd(vec![
            Weighted::new(w, QueryNode::And(vec![original])),
            Weighted::new(1.0 - w, expansion.to_query()),
        ])
    }

    /// Feedback candidates from an external ranking: the top `docs` entries for one query,
    /// best first, mapped to internal ids. Rows below the cut are never looked up.
    pub fn candidates_from_ranking(
        &self,
        rows: &[(String, f64)],
    ) -> Result<Vec<ScoreListEntry>, Error> {
        let mut top: Vec<&(String, f64)> = rows.iter().collect();
        top.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        top.truncate(self.params.docs);
        top.into_iter()
            .map(|(ext, score)| {
                let docid: DocId = self.index.internal_id(ext)?;
                Ok(ScoreListEntry {
                    docid,
                    score: *score,
                    external_id: Some(ext.clone()),
                })
            })
            .collect()
    }
}
