//! Property tests for query evaluation.

use lexop::index::MemoryIndex;
use lexop::model::IndriParams;
use lexop::query::{Evaluator, QueryNode, QueryParser, Weighted};
use lexop::tokenizer::SimpleTokenizer;
use lexop::{DocId, RetrievalModel};
use proptest::prelude::*;
use std::collections::{BTreeMap, BTreeSet};

const VOCAB: usize = 6;

fn word(i: usize) -> String {
    format!("t{i}")
}

fn build_index(docs: &[Vec<usize>]) -> MemoryIndex {
    let mut ix = MemoryIndex::new();
    for (n, doc) in docs.iter().enumerate() {
        let terms: Vec<String> = doc.iter().map(|&i| word(i)).collect();
        ix.add_document(&format!("doc-{n}"), &[("body", terms)], BTreeMap::new())
            .unwrap();
    }
    ix
}

fn docs_strategy() -> impl Strategy<Value = Vec<Vec<usize>>> {
    prop::collection::vec(prop::collection::vec(0..VOCAB, 0..8), 1..10)
}

#[derive(Debug, Clone)]
enum BoolTree {
    Term(usize),
    And(Vec<BoolTree>),
    Or(Vec<BoolTree>),
}

fn bool_tree() -> impl Strategy<Value = BoolTree> {
    let leaf = (0..VOCAB).prop_map(BoolTree::Term);
    leaf.prop_recursive(3, 16, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 1..4).prop_map(BoolTree::And),
            prop::collection::vec(inner, 1..4).prop_map(BoolTree::Or),
        ]
    })
}

impl BoolTree {
    fn node(&self) -> QueryNode {
        match self {
            Self::Term(i) => QueryNode::term(word(*i)),
            Self::And(c) => QueryNode::And(c.iter().map(Self::node).collect()),
            Self::Or(c) => QueryNode::Or(c.iter().map(Self::node).collect()),
        }
    }

    fn matches(&self, docs: &[Vec<usize>]) -> BTreeSet<DocId> {
        match self {
            Self::Term(i) => docs
                .iter()
                .enumerate()
                .filter(|(_, d)| d.contains(i))
                .map(|(n, _)| n as DocId)
                .collect(),
            Self::And(c) => {
                let mut sets = c.iter().map(|t| t.matches(docs));
                let first = sets.next().unwrap_or_default();
                sets.fold(first, |acc, s| acc.intersection(&s).copied().collect())
            }
            Self::Or(c) => c.iter().flat_map(|t| t.matches(docs)).collect(),
        }
    }
}

fn positional_tree() -> impl Strategy<Value = QueryNode> {
    let leaf = (0..VOCAB).prop_map(|i| QueryNode::term(word(i)));
    leaf.prop_recursive(2, 8, 3, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 1..3).prop_map(QueryNode::Syn),
            (1u32..4, prop::collection::vec(inner.clone(), 1..3))
                .prop_map(|(distance, children)| QueryNode::Near { distance, children }),
            (1u32..6, prop::collection::vec(inner, 1..3))
                .prop_map(|(distance, children)| QueryNode::Window { distance, children }),
        ]
    })
}

fn weight() -> impl Strategy<Value = f64> {
    (1u32..40).prop_map(|n| f64::from(n) / 8.0)
}

fn scored_tree() -> impl Strategy<Value = QueryNode> {
    positional_tree().prop_recursive(2, 12, 3, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 1..3).prop_map(QueryNode::And),
            prop::collection::vec(inner.clone(), 1..3).prop_map(QueryNode::Or),
            prop::collection::vec(inner.clone(), 1..3).prop_map(QueryNode::Sum),
            prop::collection::vec((weight(), inner.clone()), 1..3).prop_map(|ws| {
                QueryNode::WAnd(ws.into_iter().map(|(w, n)| Weighted::new(w, n)).collect())
            }),
            prop::collection::vec((weight(), inner), 1..3).prop_map(|ws| {
                QueryNode::WSum(ws.into_iter().map(|(w, n)| Weighted::new(w, n)).collect())
            }),
        ]
    })
}

proptest! {
    #[test]
    fn boolean_operators_are_set_algebra(docs in docs_strategy(), tree in bool_tree()) {
        let ix = build_index(&docs);
        let expected = tree.matches(&docs);
        for model in [RetrievalModel::UnrankedBoolean, RetrievalModel::RankedBoolean] {
            let scores = Evaluator::new(&ix, &model).evaluate_scores(&tree.node()).unwrap();
            let got: BTreeSet<DocId> = scores.iter().map(|e| e.docid).collect();
            prop_assert_eq!(&got, &expected);
            prop_assert!(scores.iter().all(|e| e.score > 0.0));
        }
    }

    #[test]
    fn formatted_queries_parse_back(docs in docs_strategy(), tree in scored_tree()) {
        let node = if tree.produces_inverted_list() {
            QueryNode::Sum(vec![tree])
        } else {
            tree
        };
        let tokenizer = SimpleTokenizer::default();
        let reparsed = QueryParser::new(&tokenizer)
            .parse_structured(&node.to_string())
            .unwrap();
        prop_assert_eq!(&reparsed, &node);

        let ix = build_index(&docs);
        // BM25 is left out: negative idf under #wand yields NaN, which never compares equal.
        for model in [
            RetrievalModel::RankedBoolean,
            RetrievalModel::Indri(IndriParams::default()),
        ] {
            let ev = Evaluator::new(&ix, &model);
            prop_assert_eq!(
                ev.evaluate_scores(&node).unwrap(),
                ev.evaluate_scores(&reparsed).unwrap()
            );
        }
    }
}
