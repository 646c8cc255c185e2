//! Learning-to-rank feature vectors.
//!
//! Each (query, document) pair gets 18 features:
//!
//! | slot | feature |
//! |---|---|
//! | 0 | spam score (stored `score`) |
//! | 1 | URL depth (`/` count of stored `rawUrl`) |
//! | 2 | Wikipedia URL (1/0) |
//! | 3 | PageRank |
//! | 4..15 | BM25, Indri and query-term overlap for `body`, `title`, `url`, `inlink` |
//! | 16, 17 | constant 1.0 |
//!
//! Unavailable or disabled features are NaN until [`normalize`] maps them to 0.
//!
//! The per-field scores are computed from the document's term vector, not from postings,
//! but use the same formulas as [`crate::model`]: BM25 equals `#sum` over the query terms and
//! Indri equals `#and` for any document containing at least one of them.

use crate::index::{DocId, IndexSource, TermVector};
use crate::model::{bm25_term_score, indri_term_score, Bm25Params, IndriParams, LtrParams};
use crate::Error;
use std::collections::{HashMap, HashSet};
use std::path::Path;

/// Number of features per vector.
pub const FEATURE_COUNT: usize = 18;

/// Fields with per-field features, in slot order.
pub const FEATURE_FIELDS: [&str; 4] = ["body", "title", "url", "inlink"];

const SPAM: usize = 0;
const URL_DEPTH: usize = 1;
const WIKIPEDIA: usize = 2;
const PAGE_RANK: usize = 3;
const FIELD_BASE: usize = 4;
const CUSTOM: [usize; 2] = [16, 17];

/// Which features are produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeatureMask([bool; FEATURE_COUNT]);

impl Default for FeatureMask {
    fn default() -> Self {
        Self([true; FEATURE_COUNT])
    }
}

impl FeatureMask {
    /// All features enabled.
    pub fn all() -> Self {
        Self::default()
    }

    /// Mask with the given 1-based feature numbers disabled.
    pub fn with_disabled(disabled: &[usize]) -> Result<Self, Error> {
        let mut mask = Self::all();
        for &n in disabled {
            if n == 0 || n > FEATURE_COUNT {
                return Err(Error::Config(format!(
                    "feature {n} out of range 1..={FEATURE_COUNT}"
                )));
            }
            mask.0[n - 1] = false;
        }
        Ok(mask)
    }

    /// Parse a comma-separated list of 1-based feature numbers to disable.
    pub fn parse_disabled(list: &str) -> Result<Self, Error> {
        let numbers = list
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| {
                s.parse::<usize>()
                    .map_err(|_| Error::Config(format!("invalid feature number {s:?}")))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Self::with_disabled(&numbers)
    }

    /// Whether 0-based slot `i` is enabled.
    pub fn is_enabled(&self, i: usize) -> bool {
        self.0.get(i).copied().unwrap_or(false)
    }
}

/// One document's features.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureVector {
    values: Vec<f64>,
}

impl FeatureVector {
    /// Wrap exactly [`FEATURE_COUNT`] values.
    pub fn from_values(values: Vec<f64>) -> Result<Self, Error> {
        if values.len() != FEATURE_COUNT {
            return Err(Error::FeatureCountMismatch {
                expected: FEATURE_COUNT,
                actual: values.len(),
            });
        }
        Ok(Self { values })
    }

    /// Values in slot order.
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Value of 0-based slot `i`.
    pub fn get(&self, i: usize) -> Option<f64> {
        self.values.get(i).copied()
    }

    /// `"1:<v> 2:<v> ... 18:<v> "`.
    pub fn to_wire(&self) -> String {
        self.values
            .iter()
            .enumerate()
            .map(|(i, v)| format!("{}:{} ", i + 1, v))
            .collect()
    }
}

/// Min-max scale every column to `[0, 1]` over `vectors`.
///
/// Min and max ignore NaN; NaN becomes 0. A column whose min equals its max (including one
/// with no numeric value) becomes all 0.
pub fn normalize(vectors: &mut [FeatureVector]) {
    for col in 0..FEATURE_COUNT {
        let (min, max) = vectors
            .iter()
            .map(|v| v.values[col])
            .filter(|x| !x.is_nan())
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), x| {
                (lo.min(x), hi.max(x))
            });
        let range = max - min;
        for v in vectors.iter_mut() {
            let x = &mut v.values[col];
            *x = if x.is_nan() || range <= 0.0 {
                0.0
            } else {
                (*x - min) / range
            };
        }
    }
}

/// External id → PageRank.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageRankTable {
    scores: HashMap<String, f64>,
}

impl PageRankTable {
    /// Parse whitespace-separated `extId score` lines; blank lines are skipped.
    pub fn parse(text: &str) -> Result<Self, Error> {
        let mut scores = HashMap::new();
        for (n, line) in text.lines().enumerate() {
            let mut parts = line.split_whitespace();
            let Some(id) = parts.next() else { continue };
            let score = parts
                .next()
                .and_then(|s| s.parse::<f64>().ok())
                .ok_or_else(|| Error::Format(format!("page rank line {}: {line:?}", n + 1)))?;
            scores.insert(id.to_string(), score);
        }
        Ok(Self { scores })
    }

    /// Read and parse a PageRank file.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, Error> {
        Self::parse(&std::fs::read_to_string(path)?)
    }

    /// PageRank of `external_id`.
    pub fn get(&self, external_id: &str) -> Option<f64> {
        self.scores.get(external_id).copied()
    }

    /// Number of documents with a score.
    pub fn len(&self) -> usize {
        self.scores.len()
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }
}

/// Builds feature vectors against an index.
pub struct FeatureBuilder<'a> {
    index: &'a dyn IndexSource,
    bm25: Bm25Params,
    indri: IndriParams,
    mask: FeatureMask,
    page_rank: Option<&'a PageRankTable>,
}

impl<'a> FeatureBuilder<'a> {
    /// Builder using the learning-to-rank parameters.
    pub fn new(index: &'a dyn IndexSource, params: &LtrParams) -> Self {
        Self {
            index,
            bm25: params.bm25,
            indri: params.indri,
            mask: params.mask,
            page_rank: None,
        }
    }

    /// Use `table` for the PageRank feature (NaN for every document otherwise).
    pub fn with_page_rank(mut self, table: &'a PageRankTable) -> Self {
        self.page_rank = Some(table);
        self
    }

    /// Raw (unnormalized) features of `docid` for the tokenized query `terms`.
    pub fn build(&self, docid: DocId, terms: &[String]) -> Result<FeatureVector, Error> {
        let mut values = vec![f64::NAN; FEATURE_COUNT];
        let url = self.index.stored_field(docid, "rawUrl")?;

        if self.mask.is_enabled(SPAM) {
            values[SPAM] = self.spam_score(docid)?;
        }
        if self.mask.is_enabled(URL_DEPTH) {
            values[URL_DEPTH] = url.as_deref().map_or(0.0, url_depth);
        }
        if self.mask.is_enabled(WIKIPEDIA) {
            values[WIKIPEDIA] = url.as_deref().map_or(0.0, wikipedia_score);
        }
        if self.mask.is_enabled(PAGE_RANK) {
            if let Some(table) = self.page_rank {
                let ext = self.index.external_id(docid)?;
                values[PAGE_RANK] = table.get(&ext).unwrap_or(f64::NAN);
            }
        }

        for (k, field) in FEATURE_FIELDS.iter().enumerate() {
            let base = FIELD_BASE + 3 * k;
            if !(base..base + 3).any(|i| self.mask.is_enabled(i)) {
                continue;
            }
            let tv = match self.index.term_vector(docid, field) {
                Ok(tv) => tv,
                Err(Error::MissingTermVector { .. }) => {
                    tracing::trace!(docid, field = *field, "no term vector");
                    continue;
                }
                Err(e) => return Err(e),
            };
            if self.mask.is_enabled(base) {
                values[base] = self.bm25_score(docid, field, &tv, terms)?;
            }
            if self.mask.is_enabled(base + 1) {
                values[base + 1] = self.indri_score(docid, field, &tv, terms)?;
            }
            if self.mask.is_enabled(base + 2) {
                values[base + 2] = overlap_score(&tv, terms);
            }
        }

        for i in CUSTOM {
            if self.mask.is_enabled(i) {
                values[i] = 1.0;
            }
        }
        FeatureVector::from_values(values)
    }

    /// Raw features for every document in `docids`.
    pub fn build_all(&self, docids: &[DocId], terms: &[String]) -> Result<Vec<FeatureVector>, Error> {
        docids.iter().map(|&d| self.build(d, terms)).collect()
    }

    fn spam_score(&self, docid: DocId) -> Result<f64, Error> {
        match self.index.stored_field(docid, "score")? {
            Some(s) => s
                .trim()
                .parse::<i64>()
                .map(|n| n as f64)
                .map_err(|_| Error::Format(format!("spam score {s:?} of document {docid}"))),
            None => Ok(f64::NAN),
        }
    }

    /// BM25 over the distinct query terms present in `tv`.
    pub fn bm25_score(
        &self,
        docid: DocId,
        field: &str,
        tv: &TermVector,
        terms: &[String],
    ) -> Result<f64, Error> {
        let wanted: HashSet<&str> = terms.iter().map(String::as_str).collect();
        let n = self.index.num_docs();
        let avg_doc_len = self.index.avg_doc_len(field)?;
        let doc_len = self.index.doc_length(docid, field)?;
        Ok(tv
            .stems()
            .filter(|s| wanted.contains(s.stem.as_str()))
            .map(|s| bm25_term_score(&self.bm25, n, s.df, s.tf, doc_len, avg_doc_len))
            .sum())
    }

    /// Indri geometric mean over the query terms, 0 when none occurs in `tv`.
    pub fn indri_score(
        &self,
        docid: DocId,
        field: &str,
        tv: &TermVector,
        terms: &[String],
    ) -> Result<f64, Error> {
        if terms.is_empty() {
            return Ok(0.0);
        }
        let tf = tv.tf_table();
        if !terms.iter().any(|t| tf.contains_key(t.as_str())) {
            return Ok(0.0);
        }
        let sum_ttf = self.index.sum_total_term_freq(field)?;
        let doc_len = self.index.doc_length(docid, field)?;
        let exp = 1.0 / terms.len() as f64;
        let mut score = 1.0;
        for term in terms {
            let ctf = self.index.collection_freq(term, field)?;
            let tf = tf.get(term.as_str()).copied().unwrap_or(0);
            score *= indri_term_score(&self.indri, tf, doc_len, ctf, sum_ttf).powf(exp);
        }
        Ok(score)
    }
}

/// Fraction of query terms (with repeats) that occur in `tv`.
pub fn overlap_score(tv: &TermVector, terms: &[String]) -> f64 {
    if terms.is_empty() {
        return 0.0;
    }
    let stems: HashSet<&str> = tv.stems().map(|s| s.stem.as_str()).collect();
    let hits = terms.iter().filter(|t| stems.contains(t.as_str())).count();
    hits as f64 / terms.len() as f64
}

fn url_depth(url: &str) -> f64 {
    url.matches('/').count() as f64
}

fn wikipedia_score(url: &str) -> f64 {
    if url.to_lowercase().contains("wikipedia.org") {
        1.0
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::MemoryIndex;
    use crate::model::RetrievalModel;
    use crate::query::{Evaluator, QueryNode, QueryParser};
    use crate::tokenizer::SimpleTokenizer;
    use std::collections::BTreeMap;

    fn words(s: &str) -> Vec<String> {
        s.split_whitespace().map(String::from).collect()
    }

    fn corpus() -> MemoryIndex {
        let mut ix = MemoryIndex::new();
        let stored = |score: &str, url: &str| {
            BTreeMap::from([
                ("score".to_string(), score.to_string()),
                ("rawUrl".to_string(), url.to_string()),
            ])
        };
        ix.add_document(
            "wiki",
            &[
                ("body", words("apple pie recipe apple")),
                ("title", words("apple pie")),
            ],
            stored("80", "http://en.Wikipedia.org/wiki/Apple_pie"),
        )
        .unwrap();
        ix.add_document(
            "blog",
            &[("body", words("cherry pie and crust"))],
            stored("12", "http://blog.example.com/pie"),
        )
        .unwrap();
        ix.add_document("bare", &[("body", words("banana bread"))], BTreeMap::new())
            .unwrap();
        ix
    }

    #[test]
    fn mask_parses_one_based_list() {
        let mask = FeatureMask::parse_disabled("1, 4,18").unwrap();
        assert!(!mask.is_enabled(0));
        assert!(mask.is_enabled(1));
        assert!(!mask.is_enabled(3));
        assert!(!mask.is_enabled(17));
        assert!(FeatureMask::parse_disabled("19").is_err());
        assert!(FeatureMask::parse_disabled("x").is_err());
        assert_eq!(FeatureMask::parse_disabled("").unwrap(), FeatureMask::all());
    }

    #[test]
    fn vector_length_is_checked() {
        assert!(matches!(
            FeatureVector::from_values(vec![0.0; 17]),
            Err(Error::FeatureCountMismatch {
                expected: 18,
                actual: 17
            })
        ));
    }

    #[test]
    fn normalizes_columns() {
        let column = [f64::NAN, 1.0, 3.0, 5.0];
        let mut vs: Vec<FeatureVector> = column
            .iter()
            .map(|&x| {
                let mut v = vec![2.0; FEATURE_COUNT];
                v[0] = x;
                FeatureVector::from_values(v).unwrap()
            })
            .collect();
        normalize(&mut vs);
        let first: Vec<f64> = vs.iter().map(|v| v.values()[0]).collect();
        assert_eq!(first, vec![0.0, 0.0, 0.5, 1.0]);
        // Constant column.
        assert!(vs.iter().all(|v| v.values()[1] == 0.0));
    }

    #[test]
    fn all_nan_column_becomes_zero() {
        let mut vs = vec![FeatureVector::from_values(vec![f64::NAN; FEATURE_COUNT]).unwrap()];
        normalize(&mut vs);
        assert!(vs[0].values().iter().all(|&x| x == 0.0));
    }

    #[test]
    fn wire_format_is_one_based() {
        let mut v = vec![0.0; FEATURE_COUNT];
        v[0] = 0.5;
        v[17] = 1.0;
        let wire = FeatureVector::from_values(v).unwrap().to_wire();
        assert!(wire.starts_with("1:0.5 2:0 "));
        assert!(wire.ends_with("18:1 "));
    }

    #[test]
    fn page_rank_table() {
        let t = PageRankTable::parse("wiki 3.5\n\nblog\t0.25\n").unwrap();
        assert_eq!(t.get("wiki"), Some(3.5));
        assert_eq!(t.get("blog"), Some(0.25));
        assert_eq!(t.get("bare"), None);
        assert!(PageRankTable::parse("wiki high").is_err());
    }

    #[test]
    fn structured_query_terms_are_stems() {
        let ix = corpus();
        let tokenizer = SimpleTokenizer::default();
        let node = QueryParser::new(&tokenizer)
            .parse("#near/1(apple pie)", &RetrievalModel::Bm25(Bm25Params::default()))
            .unwrap();
        let terms = node.stems();
        assert_eq!(terms, vec!["apple", "pie"]);

        let params = LtrParams::default();
        let v = FeatureBuilder::new(&ix, &params).build(0, &terms).unwrap();
        // Body: Indri (slot 5) and overlap (slot 6).
        assert!(v.get(5).unwrap() > 0.0);
        assert_eq!(v.get(6), Some(1.0));
    }

    #[test]
    fn document_features() {
        let ix = corpus();
        let pr = PageRankTable::parse("wiki 3.5").unwrap();
        let builder = FeatureBuilder::new(&ix, &LtrParams::default()).with_page_rank(&pr);
        let terms = words("apple pie");

        let wiki = builder.build(0, &terms).unwrap();
        assert_eq!(wiki.get(0), Some(80.0));
        assert_eq!(wiki.get(1), Some(4.0));
        assert_eq!(wiki.get(2), Some(1.0));
        assert_eq!(wiki.get(3), Some(3.5));
        assert_eq!(wiki.get(6), Some(1.0)); // body overlap
        assert_eq!(wiki.get(9), Some(1.0)); // title overlap
        assert!(wiki.get(10).unwrap().is_nan()); // no url field
        assert_eq!(wiki.get(16), Some(1.0));

        let blog = builder.build(1, &terms).unwrap();
        assert_eq!(blog.get(2), Some(0.0));
        assert!(blog.get(3).unwrap().is_nan());
        assert_eq!(blog.get(6), Some(0.5));
        assert!(blog.get(7).unwrap().is_nan());

        let bare = builder.build(2, &terms).unwrap();
        assert!(bare.get(0).unwrap().is_nan());
        assert_eq!(bare.get(1), Some(0.0));
        assert_eq!(bare.get(5), Some(0.0)); // no query term in body
    }

    #[test]
    fn disabled_features_are_nan() {
        let ix = corpus();
        let params = LtrParams {
            mask: FeatureMask::with_disabled(&[1, 5, 17]).unwrap(),
            ..LtrParams::default()
        };
        let v = FeatureBuilder::new(&ix, &params)
            .build(0, &words("apple"))
            .unwrap();
        assert!(v.get(0).unwrap().is_nan());
        assert!(v.get(4).unwrap().is_nan());
        assert!(v.get(16).unwrap().is_nan());
        assert_eq!(v.get(17), Some(1.0));
    }

    #[test]
    fn field_scores_agree_with_operators() {
        let ix = corpus();
        let params = LtrParams::default();
        let builder = FeatureBuilder::new(&ix, &params);
        let terms = words("apple pie");
        let query = |wrap: fn(Vec<QueryNode>) -> QueryNode| {
            wrap(terms.iter().map(|t| QueryNode::term(t.as_str())).collect())
        };

        let bm25 = Evaluator::new(&ix, &RetrievalModel::Bm25(params.bm25))
            .evaluate_scores(&query(QueryNode::Sum))
            .unwrap();
        let indri = Evaluator::new(&ix, &RetrievalModel::Indri(params.indri))
            .evaluate_scores(&query(QueryNode::And))
            .unwrap();

        for (b, i) in bm25.iter().zip(indri.iter()) {
            let v = builder.build(b.docid, &terms).unwrap();
            assert!((v.get(4).unwrap() - b.score).abs() < 1e-12);
            assert_eq!(b.docid, i.docid);
            assert!((v.get(5).unwrap() - i.score).abs() < 1e-12);
        }
        assert_eq!(bm25.len(), 2);
    }
}
