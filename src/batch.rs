//! Batch evaluation: a query file in, a ranking file out.
//!
//! Each query is parsed, evaluated, ranked and written before the next one starts. A query
//! that fails to parse is logged and skipped; every other error ends the run.

use crate::config::{FeedbackConfig, LetorConfig, RunConfig};
use crate::features::{normalize, FeatureBuilder, PageRankTable};
use crate::feedback::FeedbackExpander;
use crate::index::IndexSource;
use crate::ltr::{read_scores, rerank, write_feature_line, Ranker, SvmRankRanker};
use crate::model::{LtrParams, RetrievalModel};
use crate::query::{Evaluator, QueryNode, QueryParser};
use crate::score_list::{ScoreList, ScoreListEntry};
use crate::tokenizer::Tokenizer;
use crate::trec::{self, QueryLine, RankingRow};
use crate::Error;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

/// Evaluate `node` and return the top `depth` documents in rank order, external ids attached.
pub fn retrieve(
    index: &dyn IndexSource,
    model: &RetrievalModel,
    node: &QueryNode,
    depth: usize,
) -> Result<ScoreList, Error> {
    let mut list = Evaluator::new(index, model).evaluate_scores(node)?;
    list.attach_external_ids(index)?;
    list.sort_by_rank();
    list.truncate(depth);
    Ok(list)
}

/// Counts reported by a finished run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Queries ranked and written.
    pub evaluated: usize,
    /// Queries skipped because they did not parse.
    pub skipped: usize,
}

/// Runs a [`RunConfig`] against an index.
pub struct BatchRunner<'a> {
    index: &'a dyn IndexSource,
    tokenizer: &'a dyn Tokenizer,
    config: &'a RunConfig,
}

impl<'a> BatchRunner<'a> {
    /// Runner for `config` over `index`; queries are tokenized with `tokenizer`.
    pub fn new(
        index: &'a dyn IndexSource,
        tokenizer: &'a dyn Tokenizer,
        config: &'a RunConfig,
    ) -> Self {
        Self {
            index,
            tokenizer,
            config,
        }
    }

    /// Run the batch. Learning-to-rank runs use the configured svm_rank executables.
    pub fn run(&self) -> Result<RunSummary, Error> {
        match &self.config.letor {
            Some(letor) => {
                let ranker =
                    SvmRankRanker::new(&letor.learn_path, &letor.classify_path, letor.c);
                self.run_with_ranker(&ranker)
            }
            None => self.run_with_ranker(&NoRanker),
        }
    }

    /// Run the batch with an explicit ranker (used only by learning-to-rank).
    pub fn run_with_ranker(&self, ranker: &dyn Ranker) -> Result<RunSummary, Error> {
        let queries = read_query_file(&self.config.query_file)?;
        tracing::info!(
            model = self.config.model.name(),
            queries = queries.len(),
            "starting run"
        );
        let summary = match (&self.config.model, &self.config.letor) {
            (RetrievalModel::LearningToRank(params), Some(letor)) => {
                self.train(params, letor, ranker)?;
                self.test(params, letor, ranker, &queries)?
            }
            (RetrievalModel::LearningToRank(_), None) => {
                return Err(Error::Config("letor model without letor:* parameters".into()))
            }
            _ => self.rank_queries(&queries)?,
        };
        tracing::info!(
            evaluated = summary.evaluated,
            skipped = summary.skipped,
            "run finished"
        );
        Ok(summary)
    }

    fn parse(&self, query: &QueryLine, model: &RetrievalModel) -> Result<Option<QueryNode>, Error> {
        match QueryParser::new(self.tokenizer).parse(&query.text, model) {
            Ok(node) => Ok(Some(node)),
            Err(err) => {
                tracing::warn!(query = %query.id, %err, "skipping query");
                Ok(None)
            }
        }
    }

    fn rank_queries(&self, queries: &[QueryLine]) -> Result<RunSummary, Error> {
        let cfg = self.config;
        let mut out = BufWriter::new(File::create(&cfg.output_path)?);
        let mut expansion_out = match cfg.feedback.as_ref().and_then(|f| f.expansion_file.as_ref()) {
            Some(path) => Some(BufWriter::new(File::create(path)?)),
            None => None,
        };
        let initial_ranking = match cfg.feedback.as_ref().and_then(|f| f.initial_ranking.as_ref()) {
            Some(path) => Some(trec::read_ranking(BufReader::new(File::open(path)?))?),
            None => None,
        };

        let mut summary = RunSummary::default();
        for query in queries {
            let Some(node) = self.parse(query, &cfg.model)? else {
                summary.skipped += 1;
                continue;
            };
            let ranking = match &cfg.feedback {
                Some(fb) => {
                    let (ranking, line) =
                        self.with_feedback(query, node, fb, initial_ranking.as_deref())?;
                    if let Some(w) = expansion_out.as_mut() {
                        writeln!(w, "{line}")?;
                    }
                    ranking
                }
                None => retrieve(self.index, &cfg.model, &node, cfg.max_results)?,
            };
            tracing::debug!(query = %query.id, results = ranking.len(), "ranked");
            trec::write_ranking(&mut out, &query.id, &ranking, &cfg.run_id)?;
            summary.evaluated += 1;
        }
        out.flush()?;
        if let Some(mut w) = expansion_out {
            w.flush()?;
        }
        Ok(summary)
    }

    /// Expand `node` from its feedback documents and retrieve with the expanded query.
    fn with_feedback(
        &self,
        query: &QueryLine,
        node: QueryNode,
        fb: &FeedbackConfig,
        initial_ranking: Option<&[RankingRow]>,
    ) -> Result<(ScoreList, String), Error> {
        let cfg = self.config;
        let expander = FeedbackExpander::new(self.index, fb.params.clone());
        let candidates: Vec<ScoreListEntry> = match initial_ranking {
            Some(rows) => {
                expander.candidates_from_ranking(&trec::ranking_for_query(rows, &query.id))?
            }
            None => retrieve(self.index, &cfg.model, &node, cfg.max_results)?.into_entries(),
        };
        let expansion = expander.expand(&candidates)?;
        let line = expansion.to_line(&query.id);
        tracing::debug!(query = %query.id, expansion = %line, "expanded");
        let expanded = expander.expanded_query(node, &expansion);
        let ranking = retrieve(self.index, &cfg.model, &expanded, cfg.max_results)?;
        Ok((ranking, line))
    }

    fn feature_builder<'p>(
        &'p self,
        params: &LtrParams,
        page_rank: Option<&'p PageRankTable>,
    ) -> FeatureBuilder<'p> {
        let builder = FeatureBuilder::new(self.index, params);
        match page_rank {
            Some(table) => builder.with_page_rank(table),
            None => builder,
        }
    }

    fn train(&self, params: &LtrParams, letor: &LetorConfig, ranker: &dyn Ranker) -> Result<(), Error> {
        let page_rank = letor.load_page_rank()?;
        let builder = self.feature_builder(params, page_rank.as_ref());
        let queries = read_query_file(&letor.training_queries)?;
        let qrels = trec::read_qrels(BufReader::new(File::open(&letor.training_qrels)?))?;
        let mut judged: HashMap<&str, Vec<&trec::Qrel>> = HashMap::new();
        for q in &qrels {
            judged.entry(q.query_id.as_str()).or_default().push(q);
        }

        let initial_model = RetrievalModel::Bm25(params.bm25);
        let mut out = BufWriter::new(File::create(&letor.training_features)?);
        for query in &queries {
            let Some(docs) = judged.get(query.id.as_str()) else {
                continue;
            };
            let Some(node) = self.parse(query, &initial_model)? else {
                continue;
            };
            let terms = node.stems();
            let docids = docs
                .iter()
                .map(|q| self.index.internal_id(&q.external_id))
                .collect::<Result<Vec<_>, _>>()?;
            let mut vectors = builder.build_all(&docids, &terms)?;
            normalize(&mut vectors);
            for (q, v) in docs.iter().zip(&vectors) {
                write_feature_line(&mut out, q.label, &query.id, v, &q.external_id)?;
            }
        }
        out.flush()?;
        drop(out);

        tracing::info!(queries = queries.len(), "training ranker");
        ranker.train(&letor.training_features, &letor.model_file)
    }

    fn test(
        &self,
        params: &LtrParams,
        letor: &LetorConfig,
        ranker: &dyn Ranker,
        queries: &[QueryLine],
    ) -> Result<RunSummary, Error> {
        let cfg = self.config;
        let page_rank = letor.load_page_rank()?;
        let builder = self.feature_builder(params, page_rank.as_ref());
        let initial_model = RetrievalModel::Bm25(params.bm25);

        let mut summary = RunSummary::default();
        let mut batches: Vec<(&QueryLine, Vec<ScoreListEntry>)> = Vec::new();
        let mut out = BufWriter::new(File::create(&letor.testing_features)?);
        for query in queries {
            let Some(node) = self.parse(query, &initial_model)? else {
                summary.skipped += 1;
                continue;
            };
            let candidates =
                retrieve(self.index, &initial_model, &node, cfg.max_results)?.into_entries();
            let terms = node.stems();
            let docids: Vec<_> = candidates.iter().map(|e| e.docid).collect();
            let mut vectors = builder.build_all(&docids, &terms)?;
            normalize(&mut vectors);
            for (e, v) in candidates.iter().zip(&vectors) {
                let ext = e.external_id.as_deref().ok_or(Error::DocNotFound(e.docid))?;
                write_feature_line(&mut out, 0, &query.id, v, ext)?;
            }
            batches.push((query, candidates));
        }
        out.flush()?;
        drop(out);

        ranker.classify(&letor.testing_features, &letor.model_file, &letor.testing_scores)?;
        let scores = read_scores(BufReader::new(File::open(&letor.testing_scores)?))?;
        let expected: usize = batches.iter().map(|(_, c)| c.len()).sum();
        if scores.len() != expected {
            return Err(Error::Format(format!(
                "ranker returned {} scores for {expected} documents",
                scores.len()
            )));
        }

        let mut ranking_out = BufWriter::new(File::create(&cfg.output_path)?);
        let mut rest = scores.as_slice();
        for (query, candidates) in batches {
            let (mine, tail) = rest.split_at(candidates.len());
            rest = tail;
            let ranking = rerank(candidates, mine, letor.tie_break)?;
            trec::write_ranking(&mut ranking_out, &query.id, &ranking, &cfg.run_id)?;
            summary.evaluated += 1;
        }
        ranking_out.flush()?;
        Ok(summary)
    }
}

fn read_query_file(path: &Path) -> Result<Vec<QueryLine>, Error> {
    trec::read_queries(BufReader::new(File::open(path)?))
}

/// Ranker for runs that never call one.
struct NoRanker;

impl Ranker for NoRanker {
    fn train(&self, _: &Path, _: &Path) -> Result<(), Error> {
        Err(Error::Config("no ranker configured".into()))
    }

    fn classify(&self, _: &Path, _: &Path, _: &Path) -> Result<(), Error> {
        Err(Error::Config("no ranker configured".into()))
    }
}
