//! Document-at-a-time evaluation of query trees.
//!
//! Every multi-argument operator walks its arguments' result lists with one forward-only
//! cursor per argument. Cursors live in the evaluating call frame, never on the tree, so a
//! [`QueryNode`] can be evaluated repeatedly (or concurrently by separate evaluators).
//!
//! Which kind of result an operator yields depends on the operator: Term, SYN, NEAR and
//! WINDOW produce inverted lists; everything else produces score lists. An inverted list used
//! where scores are needed passes through SCORE implicitly.

use crate::index::{DocId, IndexSource, InvertedList, Posting, DEFAULT_FIELD};
use crate::model::RetrievalModel;
use crate::query::node::{QueryNode, Weighted};
use crate::score_list::ScoreList;
use crate::Error;

/// How to score a document that is absent from a score list.
///
/// Built alongside each score list so parents can substitute a model-specific "unseen"
/// score without consulting the tree again.
#[derive(Debug, Clone, PartialEq)]
pub enum DefaultScore {
    /// Always 0.
    Zero,
    /// A scored inverted list: the model's tf = 0 score for this field and ctf.
    Term {
        /// Field of the scored list.
        field: String,
        /// Collection frequency of the scored list.
        ctf: u64,
    },
    /// Geometric mean of the children's defaults (Indri AND).
    Mean(Vec<DefaultScore>),
    /// `1 - Π(1 - d_i)` (Indri OR).
    NoisyOr(Vec<DefaultScore>),
    /// Plain sum (SUM).
    Sum(Vec<DefaultScore>),
    /// `Π d_i ^ w_i` (WAND).
    WeightedProduct(Vec<(f64, DefaultScore)>),
    /// `Σ w_i * d_i` (WSUM).
    WeightedSum(Vec<(f64, DefaultScore)>),
}

/// A score list plus the default score of documents it does not contain.
#[derive(Debug, Clone, PartialEq)]
pub struct Scored {
    /// Matching documents in ascending docid order.
    pub scores: ScoreList,
    /// Score of every other document.
    pub default: DefaultScore,
}

/// Result of evaluating one node.
#[derive(Debug, Clone, PartialEq)]
pub enum QryResult {
    /// Structural result (Term, SYN, NEAR, WINDOW).
    Inverted(InvertedList),
    /// Ranking result.
    Scored(Scored),
}

/// WAND combination `Π score_i ^ weight_i`.
pub fn weighted_product(weights: &[f64], scores: &[f64]) -> f64 {
    weights
        .iter()
        .zip(scores)
        .map(|(w, s)| s.powf(*w))
        .product()
}

/// WSUM combination `Σ weight_i * score_i`.
pub fn weighted_sum(weights: &[f64], scores: &[f64]) -> f64 {
    weights.iter().zip(scores).map(|(w, s)| w * s).sum()
}

/// Indri AND combination: geometric mean `Π score_i ^ (1/n)`.
pub fn geometric_mean(scores: &[f64]) -> f64 {
    if scores.is_empty() {
        return 0.0;
    }
    let exp = 1.0 / scores.len() as f64;
    scores.iter().map(|s| s.powf(exp)).product()
}

fn noisy_or(scores: &[f64]) -> f64 {
    1.0 - scores.iter().map(|s| 1.0 - s).product::<f64>()
}

/// Positions of `right` that follow a position of `left` by `1..=distance`.
///
/// Each matched pair consumes one position from both sides.
pub fn near_positions(left: &[u32], right: &[u32], distance: u32) -> Vec<u32> {
    let mut out = Vec::new();
    let (mut i, mut j) = (0, 0);
    while i < left.len() && j < right.len() {
        let (l, r) = (left[i], right[j]);
        if r <= l {
            j += 1;
        } else if r - l > distance {
            i += 1;
        } else {
            out.push(r);
            i += 1;
            j += 1;
        }
    }
    out
}

/// Window match starts: each match is recorded at the smallest position of the span.
///
/// Stops as soon as any argument runs out of positions.
pub fn window_positions(args: &[&[u32]], width: u32) -> Vec<u32> {
    let mut out = Vec::new();
    if args.is_empty() {
        return out;
    }
    let mut cursors = vec![0usize; args.len()];
    loop {
        let mut min = u32::MAX;
        let mut max = 0u32;
        let mut min_at = 0usize;
        for (k, positions) in args.iter().enumerate() {
            let Some(&p) = positions.get(cursors[k]) else {
                return out;
            };
            if p < min {
                min = p;
                min_at = k;
            }
            max = max.max(p);
        }
        if max - min + 1 <= width {
            out.push(min);
            for c in &mut cursors {
                *c += 1;
            }
        } else {
            cursors[min_at] += 1;
        }
    }
}

/// Evaluates query trees against an index under one retrieval model.
pub struct Evaluator<'a> {
    index: &'a dyn IndexSource,
    model: RetrievalModel,
}

impl<'a> Evaluator<'a> {
    /// Evaluator for `model` (learning-to-rank evaluates with its BM25 parameters).
    pub fn new(index: &'a dyn IndexSource, model: &RetrievalModel) -> Self {
        Self {
            index,
            model: model.scoring_model(),
        }
    }

    /// The model operators are scored with.
    pub fn model(&self) -> &RetrievalModel {
        &self.model
    }

    /// Evaluate `node` into whichever result its operator produces.
    pub fn evaluate(&self, node: &QueryNode) -> Result<QryResult, Error> {
        if node.produces_inverted_list() {
            Ok(QryResult::Inverted(self.inverted(node)?))
        } else {
            Ok(QryResult::Scored(self.scored(node)?))
        }
    }

    /// Evaluate `node` into a score list, scoring a top-level inverted list if needed.
    pub fn evaluate_scores(&self, node: &QueryNode) -> Result<ScoreList, Error> {
        Ok(self.scored(node)?.scores)
    }

    /// Default score of `docid` under `default`.
    pub fn default_score(&self, default: &DefaultScore, docid: DocId) -> Result<f64, Error> {
        Ok(match default {
            DefaultScore::Zero => 0.0,
            DefaultScore::Term { field, ctf } => {
                self.model
                    .default_term_score(self.index, docid, field, *ctf)?
            }
            DefaultScore::Mean(ds) => geometric_mean(&self.default_scores(ds, docid)?),
            DefaultScore::NoisyOr(ds) => noisy_or(&self.default_scores(ds, docid)?),
            DefaultScore::Sum(ds) => self.default_scores(ds, docid)?.iter().sum(),
            DefaultScore::WeightedProduct(ws) => {
                let (weights, scores) = self.weighted_defaults(ws, docid)?;
                if weights.is_empty() {
                    0.0
                } else {
                    weighted_product(&weights, &scores)
                }
            }
            DefaultScore::WeightedSum(ws) => {
                let (weights, scores) = self.weighted_defaults(ws, docid)?;
                weighted_sum(&weights, &scores)
            }
        })
    }

    fn default_scores(&self, ds: &[DefaultScore], docid: DocId) -> Result<Vec<f64>, Error> {
        ds.iter().map(|d| self.default_score(d, docid)).collect()
    }

    fn weighted_defaults(
        &self,
        ws: &[(f64, DefaultScore)],
        docid: DocId,
    ) -> Result<(Vec<f64>, Vec<f64>), Error> {
        let weights = ws.iter().map(|(w, _)| *w).collect();
        let scores = ws
            .iter()
            .map(|(_, d)| self.default_score(d, docid))
            .collect::<Result<_, _>>()?;
        Ok((weights, scores))
    }

    // ---------------------------------------------------------------------
    // Inverted-list operators
    // ---------------------------------------------------------------------

    fn inverted(&self, node: &QueryNode) -> Result<InvertedList, Error> {
        match node {
            QueryNode::Term { stem, field } => self
                .index
                .postings(stem, field.as_deref().unwrap_or(DEFAULT_FIELD)),
            QueryNode::Syn(children) => self.syn(&self.inverted_children(children)?),
            QueryNode::Near { distance, children } => {
                Ok(self.near(&self.inverted_children(children)?, *distance))
            }
            QueryNode::Window { distance, children } => {
                Ok(self.window(&self.inverted_children(children)?, *distance))
            }
            other => Err(Error::InvalidQuery(format!(
                "{other} produces scores where positions are required"
            ))),
        }
    }

    fn inverted_children(&self, children: &[QueryNode]) -> Result<Vec<InvertedList>, Error> {
        children.iter().map(|c| self.inverted(c)).collect()
    }

    fn syn(&self, lists: &[InvertedList]) -> Result<InvertedList, Error> {
        let field = lists.first().map_or(DEFAULT_FIELD, |l| l.field.as_str());
        let mut out = InvertedList::new(field);
        let mut cursors = vec![0usize; lists.len()];
        loop {
            let min = lists
                .iter()
                .zip(&cursors)
                .filter_map(|(l, &c)| l.postings.get(c).map(|p| p.docid))
                .min();
            let Some(docid) = min else { break };
            let mut positions = Vec::new();
            for (l, c) in lists.iter().zip(cursors.iter_mut()) {
                if let Some(p) = l.postings.get(*c).filter(|p| p.docid == docid) {
                    positions.extend_from_slice(&p.positions);
                    *c += 1;
                }
            }
            positions.sort_unstable();
            positions.dedup();
            out.push(Posting::new(docid, positions));
        }
        Ok(out)
    }

    fn near(&self, lists: &[InvertedList], distance: u32) -> InvertedList {
        let Some((first, rest)) = lists.split_first() else {
            return InvertedList::new(DEFAULT_FIELD);
        };
        let mut acc = first.clone();
        for right in rest {
            let mut out = InvertedList::new(right.field.clone());
            let (mut i, mut j) = (0, 0);
            while i < acc.postings.len() && j < right.postings.len() {
                let (l, r) = (&acc.postings[i], &right.postings[j]);
                if l.docid < r.docid {
                    i += 1;
                } else if l.docid > r.docid {
                    j += 1;
                } else {
                    let matched = near_positions(&l.positions, &r.positions, distance);
                    if !matched.is_empty() {
                        out.push(Posting::new(l.docid, matched));
                    }
                    i += 1;
                    j += 1;
                }
            }
            acc = out;
        }
        acc
    }

    fn window(&self, lists: &[InvertedList], width: u32) -> InvertedList {
        let Some(lead) = lists.first() else {
            return InvertedList::new(DEFAULT_FIELD);
        };
        let mut out = InvertedList::new(lead.field.clone());
        let mut cursors = vec![0usize; lists.len()];
        'docs: for posting in &lead.postings {
            let docid = posting.docid;
            let mut args: Vec<&[u32]> = Vec::with_capacity(lists.len());
            args.push(&posting.positions);
            for (k, list) in lists.iter().enumerate().skip(1) {
                loop {
                    match list.postings.get(cursors[k]) {
                        None => break 'docs,
                        Some(p) if p.docid < docid => cursors[k] += 1,
                        Some(p) if p.docid > docid => continue 'docs,
                        Some(p) => {
                            args.push(&p.positions);
                            break;
                        }
                    }
                }
            }
            let matched = window_positions(&args, width);
            if !matched.is_empty() {
                out.push(Posting::new(docid, matched));
            }
        }
        out
    }

    // ---------------------------------------------------------------------
    // Score-list operators
    // ---------------------------------------------------------------------

    fn scored(&self, node: &QueryNode) -> Result<Scored, Error> {
        match node {
            QueryNode::Term { .. }
            | QueryNode::Syn(_)
            | QueryNode::Near { .. }
            | QueryNode::Window { .. } => self.score_list(&self.inverted(node)?),
            QueryNode::Score(inner) => self.scored(inner),
            QueryNode::And(children) => self.and(&self.scored_children(children)?),
            QueryNode::Or(children) => self.or(&self.scored_children(children)?),
            QueryNode::Sum(children) => {
                let args = self.scored_children(children)?;
                let scores = self.merge_union(&args, |values| values.iter().sum())?;
                Ok(Scored {
                    scores,
                    default: DefaultScore::Sum(defaults(&args)),
                })
            }
            QueryNode::WAnd(children) => {
                let (weights, args) = self.weighted_children(children)?;
                let scores =
                    self.merge_union(&args, |values| weighted_product(&weights, values))?;
                let default = if args.is_empty() {
                    DefaultScore::Zero
                } else {
                    DefaultScore::WeightedProduct(weighted_defaults(&weights, &args))
                };
                Ok(Scored { scores, default })
            }
            QueryNode::WSum(children) => {
                let (weights, args) = self.weighted_children(children)?;
                let scores = self.merge_union(&args, |values| weighted_sum(&weights, values))?;
                Ok(Scored {
                    scores,
                    default: DefaultScore::WeightedSum(weighted_defaults(&weights, &args)),
                })
            }
        }
    }

    /// SCORE: turn an inverted list into a score list with the active model.
    fn score_list(&self, list: &InvertedList) -> Result<Scored, Error> {
        let scores = self.model.score_postings(self.index, list)?;
        let default = match self.model {
            RetrievalModel::Indri(_) => DefaultScore::Term {
                field: list.field.clone(),
                ctf: list.ctf,
            },
            _ => DefaultScore::Zero,
        };
        Ok(Scored { scores, default })
    }

    fn scored_children(&self, children: &[QueryNode]) -> Result<Vec<Scored>, Error> {
        children.iter().map(|c| self.scored(c)).collect()
    }

    fn weighted_children(&self, children: &[Weighted]) -> Result<(Vec<f64>, Vec<Scored>), Error> {
        let weights = children.iter().map(|w| w.weight).collect();
        let args = children
            .iter()
            .map(|w| self.scored(&w.node))
            .collect::<Result<_, _>>()?;
        Ok((weights, args))
    }

    fn and(&self, args: &[Scored]) -> Result<Scored, Error> {
        match self.model {
            RetrievalModel::Indri(_) => Ok(Scored {
                scores: self.merge_union(args, geometric_mean)?,
                default: if args.is_empty() {
                    DefaultScore::Zero
                } else {
                    DefaultScore::Mean(defaults(args))
                },
            }),
            RetrievalModel::UnrankedBoolean => Ok(unscored(merge_intersection(args, |_| 1.0))),
            RetrievalModel::RankedBoolean => Ok(unscored(merge_intersection(args, |values| {
                values.iter().copied().fold(f64::INFINITY, f64::min)
            }))),
            _ => Ok(unscored(merge_intersection(args, |values| {
                values.iter().sum()
            }))),
        }
    }

    fn or(&self, args: &[Scored]) -> Result<Scored, Error> {
        match self.model {
            RetrievalModel::Indri(_) => Ok(Scored {
                scores: self.merge_union(args, noisy_or)?,
                default: DefaultScore::NoisyOr(defaults(args)),
            }),
            RetrievalModel::UnrankedBoolean => Ok(unscored(merge_union_present(args, |_| 1.0))),
            _ => Ok(unscored(merge_union_present(args, |present| {
                present.iter().copied().fold(f64::NEG_INFINITY, f64::max)
            }))),
        }
    }

    /// Union merge on the smallest unexhausted docid; absent arguments contribute their
    /// default score.
    fn merge_union<F>(&self, args: &[Scored], mut combine: F) -> Result<ScoreList, Error>
    where
        F: FnMut(&[f64]) -> f64,
    {
        let mut out = ScoreList::new();
        let mut cursors = vec![0usize; args.len()];
        let mut values = vec![0.0; args.len()];
        while let Some(docid) = min_docid(args, &cursors) {
            for (k, arg) in args.iter().enumerate() {
                values[k] = match arg.scores.get(cursors[k]) {
                    Some(e) if e.docid == docid => {
                        cursors[k] += 1;
                        e.score
                    }
                    _ => self.default_score(&arg.default, docid)?,
                };
            }
            out.push(docid, combine(&values));
        }
        Ok(out)
    }
}

fn unscored(scores: ScoreList) -> Scored {
    Scored {
        scores,
        default: DefaultScore::Zero,
    }
}

fn defaults(args: &[Scored]) -> Vec<DefaultScore> {
    args.iter().map(|a| a.default.clone()).collect()
}

fn weighted_defaults(weights: &[f64], args: &[Scored]) -> Vec<(f64, DefaultScore)> {
    weights
        .iter()
        .zip(args)
        .map(|(w, a)| (*w, a.default.clone()))
        .collect()
}

fn min_docid(args: &[Scored], cursors: &[usize]) -> Option<DocId> {
    args.iter()
        .zip(cursors)
        .filter_map(|(a, &c)| a.scores.get(c).map(|e| e.docid))
        .min()
}

/// Union merge combining only the arguments that contain the document.
fn merge_union_present<F>(args: &[Scored], mut combine: F) -> ScoreList
where
    F: FnMut(&[f64]) -> f64,
{
    let mut out = ScoreList::new();
    let mut cursors = vec![0usize; args.len()];
    let mut present = Vec::with_capacity(args.len());
    while let Some(docid) = min_docid(args, &cursors) {
        present.clear();
        for (k, arg) in args.iter().enumerate() {
            if let Some(e) = arg.scores.get(cursors[k]).filter(|e| e.docid == docid) {
                present.push(e.score);
                cursors[k] += 1;
            }
        }
        out.push(docid, combine(&present));
    }
    out
}

/// Exact-match intersection. The shortest list drives the merge; `combine` sees scores in
/// argument order.
fn merge_intersection<F>(args: &[Scored], combine: F) -> ScoreList
where
    F: Fn(&[f64]) -> f64,
{
    let mut out = ScoreList::new();
    if args.is_empty() {
        return out;
    }
    let mut order: Vec<usize> = (0..args.len()).collect();
    order.sort_by_key(|&k| args[k].scores.len());
    let (lead, others) = (order[0], &order[1..]);

    let mut cursors = vec![0usize; args.len()];
    let mut values = vec![0.0; args.len()];
    'docs: for e in args[lead].scores.iter() {
        values[lead] = e.score;
        for &k in others {
            loop {
                match args[k].scores.get(cursors[k]) {
                    None => break 'docs,
                    Some(x) if x.docid < e.docid => cursors[k] += 1,
                    Some(x) if x.docid > e.docid => continue 'docs,
                    Some(x) => {
                        values[k] = x.score;
                        break;
                    }
                }
            }
        }
        out.push(e.docid, combine(&values));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::MemoryIndex;
    use crate::model::{indri_term_score, Bm25Params, IndriParams};
    use std::collections::BTreeMap;

    fn index(docs: &[&str]) -> MemoryIndex {
        let mut ix = MemoryIndex::new();
        for (i, text) in docs.iter().enumerate() {
            let terms: Vec<String> = text.split_whitespace().map(String::from).collect();
            ix.add_document(&format!("d{i}"), &[("body", terms)], BTreeMap::new())
                .unwrap();
        }
        ix
    }

    fn t(s: &str) -> QueryNode {
        QueryNode::term(s)
    }

    fn docids(list: &ScoreList) -> Vec<DocId> {
        list.iter().map(|e| e.docid).collect()
    }

    #[test]
    fn near_matches_within_distance() {
        assert_eq!(near_positions(&[2, 5], &[4, 7], 2), vec![4, 7]);
        assert!(near_positions(&[2, 5], &[4, 7], 1).is_empty());
        // Order matters: right must follow left.
        assert!(near_positions(&[4], &[2], 5).is_empty());
    }

    #[test]
    fn window_matches_span() {
        let args: [&[u32]; 3] = [&[1], &[3], &[6]];
        assert!(window_positions(&args, 5).is_empty());
        assert_eq!(window_positions(&args, 6), vec![1]);
    }

    #[test]
    fn near_operator_over_index() {
        // positions:     1 2 3 4 5 6 7
        let ix = index(&["x a x b a x b", "b a"]);
        let ev = Evaluator::new(&ix, &RetrievalModel::UnrankedBoolean);
        let near2 = QueryNode::Near {
            distance: 2,
            children: vec![t("a"), t("b")],
        };
        let QryResult::Inverted(list) = ev.evaluate(&near2).unwrap() else {
            panic!("near yields an inverted list");
        };
        assert_eq!(list.df(), 1);
        assert_eq!(list.postings[0].positions, vec![4, 7]);

        let near1 = QueryNode::Near {
            distance: 1,
            children: vec![t("a"), t("b")],
        };
        assert!(ev.evaluate_scores(&near1).unwrap().is_empty());
    }

    #[test]
    fn near_chains_through_matched_positions() {
        let ix = index(&["a b c", "a b x c"]);
        let ev = Evaluator::new(&ix, &RetrievalModel::RankedBoolean);
        let q = QueryNode::Near {
            distance: 1,
            children: vec![t("a"), t("b"), t("c")],
        };
        let scores = ev.evaluate_scores(&q).unwrap();
        assert_eq!(docids(&scores), vec![0]);
        assert_eq!(scores.score(0), 1.0);
    }

    #[test]
    fn window_operator_over_index() {
        let ix = index(&["a x b x x c", "c b a"]);
        let ev = Evaluator::new(&ix, &RetrievalModel::UnrankedBoolean);
        let window = |n| QueryNode::Window {
            distance: n,
            children: vec![t("a"), t("b"), t("c")],
        };
        assert_eq!(docids(&ev.evaluate_scores(&window(5)).unwrap()), vec![1]);
        assert_eq!(docids(&ev.evaluate_scores(&window(6)).unwrap()), vec![0, 1]);
    }

    #[test]
    fn syn_unions_positions() {
        let ix = index(&["cat dog", "kitty", "dog"]);
        let ev = Evaluator::new(&ix, &RetrievalModel::RankedBoolean);
        let q = QueryNode::Syn(vec![t("cat"), t("kitty"), t("dog")]);
        let QryResult::Inverted(list) = ev.evaluate(&q).unwrap() else {
            panic!("syn yields an inverted list");
        };
        assert_eq!(list.docids().collect::<Vec<_>>(), vec![0, 1, 2]);
        assert_eq!(list.postings[0].positions, vec![1, 2]);
        assert_eq!(list.ctf, 4);
    }

    #[test]
    fn boolean_and_or() {
        let ix = index(&["a b b", "a", "b", "a a b"]);
        let ranked = Evaluator::new(&ix, &RetrievalModel::RankedBoolean);

        let and = ranked
            .evaluate_scores(&QueryNode::And(vec![t("a"), t("b")]))
            .unwrap();
        assert_eq!(docids(&and), vec![0, 3]);
        assert_eq!(and.score(0), 1.0); // min(tf_a=1, tf_b=2)
        assert_eq!(and.score(1), 1.0);

        let or = ranked
            .evaluate_scores(&QueryNode::Or(vec![t("a"), t("b")]))
            .unwrap();
        assert_eq!(docids(&or), vec![0, 1, 2, 3]);
        assert_eq!(or.score(0), 2.0); // max(1, 2)
        assert_eq!(or.score(3), 2.0);

        let unranked = Evaluator::new(&ix, &RetrievalModel::UnrankedBoolean);
        let or = unranked
            .evaluate_scores(&QueryNode::Or(vec![t("a"), t("b")]))
            .unwrap();
        assert!(or.iter().all(|e| e.score == 1.0));
    }

    #[test]
    fn indri_and_uses_defaults_for_missing_terms() {
        let ix = index(&["a b", "a c c", "b"]);
        let params = IndriParams::new(10.0, 0.5);
        let ev = Evaluator::new(&ix, &RetrievalModel::Indri(params));
        let scores = ev
            .evaluate_scores(&QueryNode::And(vec![t("a"), t("b")]))
            .unwrap();
        assert_eq!(docids(&scores), vec![0, 1, 2]);

        // Both terms have ctf 2; the collection has 6 tokens.
        let s = |tf, len| indri_term_score(&params, tf, len, 2, 6);
        let expected_doc1 = (s(1, 3) * s(0, 3)).sqrt();
        assert!((scores.score(1) - expected_doc1).abs() < 1e-12);
        let expected_doc2 = (s(0, 1) * s(1, 1)).sqrt();
        assert!((scores.score(2) - expected_doc2).abs() < 1e-12);
    }

    #[test]
    fn weighted_combinations() {
        let w = [0.5, 0.5];
        let s = [0.8, 0.4];
        assert!((weighted_product(&w, &s) - (0.8f64 * 0.4).sqrt()).abs() < 1e-12);
        assert!((weighted_sum(&w, &s) - 0.6).abs() < 1e-12);
    }

    #[test]
    fn wsum_over_index_substitutes_defaults() {
        let ix = index(&["a", "b"]);
        let params = IndriParams::new(1.0, 1.0);
        let ev = Evaluator::new(&ix, &RetrievalModel::Indri(params));
        let q = QueryNode::WSum(vec![Weighted::new(0.25, t("a")), Weighted::new(0.75, t("b"))]);
        let scores = ev.evaluate_scores(&q).unwrap();
        let s = |tf| indri_term_score(&params, tf, 1, 1, 2);
        assert!((scores.score(0) - (0.25 * s(1) + 0.75 * s(0))).abs() < 1e-12);
        assert!((scores.score(1) - (0.25 * s(0) + 0.75 * s(1))).abs() < 1e-12);
    }

    #[test]
    fn bm25_sum_adds_term_scores() {
        let ix = index(&["a b", "a", "c"]);
        let ev = Evaluator::new(&ix, &RetrievalModel::Bm25(Bm25Params::default()));
        let a = ev.evaluate_scores(&t("a")).unwrap();
        let b = ev.evaluate_scores(&t("b")).unwrap();
        let sum = ev
            .evaluate_scores(&QueryNode::Sum(vec![t("a"), t("b")]))
            .unwrap();
        assert_eq!(docids(&sum), vec![0, 1]);
        assert!((sum.score(0) - (a.score(0) + b.score(0))).abs() < 1e-12);
        assert!((sum.score(1) - a.score(1)).abs() < 1e-12);
    }

    #[test]
    fn scored_operator_inside_proximity_is_rejected() {
        let ix = index(&["a b"]);
        let ev = Evaluator::new(&ix, &RetrievalModel::RankedBoolean);
        let q = QueryNode::Near {
            distance: 1,
            children: vec![QueryNode::And(vec![t("a")]), t("b")],
        };
        assert!(matches!(ev.evaluate(&q), Err(Error::InvalidQuery(_))));
    }

    #[test]
    fn evaluation_is_repeatable() {
        let ix = index(&["a b", "b a", "a"]);
        let ev = Evaluator::new(&ix, &RetrievalModel::RankedBoolean);
        let q = QueryNode::Or(vec![
            t("a"),
            QueryNode::Near {
                distance: 1,
                children: vec![t("a"), t("b")],
            },
        ]);
        assert_eq!(ev.evaluate(&q).unwrap(), ev.evaluate(&q).unwrap());
    }
}
