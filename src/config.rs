//! Parameter files.
//!
//! A parameter file holds one `key=value` pair per line. Blank lines and lines starting with
//! `#` are ignored; keys are case-sensitive and values are trimmed.

use crate::features::{FeatureMask, PageRankTable};
use crate::feedback::{FeedbackParams, TermBudget};
use crate::ltr::TieBreak;
use crate::model::{Bm25Params, IndriParams, LtrParams, RetrievalModel};
use crate::Error;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Raw `key=value` pairs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Params {
    values: BTreeMap<String, String>,
}

impl Params {
    /// Parse parameter-file text.
    pub fn parse(text: &str) -> Result<Self, Error> {
        let mut values = BTreeMap::new();
        for (n, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let (key, value) = line
                .split_once('=')
                .ok_or_else(|| Error::Config(format!("line {}: expected key=value", n + 1)))?;
            values.insert(key.trim().to_string(), value.trim().to_string());
        }
        Ok(Self { values })
    }

    /// Value of `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// Value of `key`, or a config error naming it.
    pub fn require(&self, key: &str) -> Result<&str, Error> {
        self.get(key)
            .ok_or_else(|| Error::Config(format!("missing parameter {key}")))
    }

    /// Parsed value of a required `key`.
    pub fn parse_required<T: FromStr>(&self, key: &str) -> Result<T, Error> {
        let raw = self.require(key)?;
        raw.parse()
            .map_err(|_| Error::Config(format!("invalid value {raw:?} for {key}")))
    }

    /// Parsed value of `key`, or `default` when absent.
    pub fn parse_or<T: FromStr>(&self, key: &str, default: T) -> Result<T, Error> {
        match self.get(key) {
            Some(_) => self.parse_required(key),
            None => Ok(default),
        }
    }

    fn path(&self, key: &str) -> Result<PathBuf, Error> {
        self.require(key).map(PathBuf::from)
    }

    fn optional_path(&self, key: &str) -> Option<PathBuf> {
        self.get(key).map(PathBuf::from)
    }
}

/// Relevance-feedback settings.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedbackConfig {
    /// Expansion parameters.
    pub params: FeedbackParams,
    /// Ranking file supplying the feedback documents instead of the initial retrieval.
    pub initial_ranking: Option<PathBuf>,
    /// Where to write one expansion query per query.
    pub expansion_file: Option<PathBuf>,
}

/// Learning-to-rank files and ranker settings.
#[derive(Debug, Clone, PartialEq)]
pub struct LetorConfig {
    /// Training queries (`id:query`).
    pub training_queries: PathBuf,
    /// Training relevance judgments.
    pub training_qrels: PathBuf,
    /// Training feature-vector file to write.
    pub training_features: PathBuf,
    /// PageRank table.
    pub page_rank: Option<PathBuf>,
    /// `svm_rank_learn` executable.
    pub learn_path: PathBuf,
    /// `svm_rank_classify` executable.
    pub classify_path: PathBuf,
    /// Regularization constant.
    pub c: f64,
    /// Model file written by training.
    pub model_file: PathBuf,
    /// Testing feature-vector file to write.
    pub testing_features: PathBuf,
    /// Score file written by the classifier.
    pub testing_scores: PathBuf,
    /// Order of tied ranker scores.
    pub tie_break: TieBreak,
}

impl LetorConfig {
    /// Load the configured PageRank table, if any.
    pub fn load_page_rank(&self) -> Result<Option<PageRankTable>, Error> {
        self.page_rank.as_ref().map(PageRankTable::open).transpose()
    }
}

/// A complete batch-run configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct RunConfig {
    /// JSON-lines corpus.
    pub index_path: PathBuf,
    /// Query file.
    pub query_file: PathBuf,
    /// Ranking output.
    pub output_path: PathBuf,
    /// Retrieval model.
    pub model: RetrievalModel,
    /// Run tag written in the ranking.
    pub run_id: String,
    /// Ranking depth per query.
    pub max_results: usize,
    /// Relevance feedback, when `fb=true`.
    pub feedback: Option<FeedbackConfig>,
    /// Learning-to-rank settings, when the model is `letor`.
    pub letor: Option<LetorConfig>,
}

impl RunConfig {
    /// Read and parse a parameter file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, Error> {
        Self::from_params(&std::fs::read_to_string(path)?)
    }

    /// Build a configuration from parameter-file text.
    pub fn from_params(text: &str) -> Result<Self, Error> {
        let p = Params::parse(text)?;
        let model = model_from_params(&p)?;

        let feedback = if p.parse_or("fb", false)? {
            Some(FeedbackConfig {
                params: FeedbackParams {
                    docs: p.parse_required("fbDocs")?,
                    terms: p.parse_required("fbTerms")?,
                    mu: p.parse_required("fbMu")?,
                    orig_weight: p.parse_required("fbOrigWeight")?,
                    budget: p.parse_or("fbTermBudget", TermBudget::default())?,
                    ..FeedbackParams::default()
                },
                initial_ranking: p.optional_path("fbInitialRankingFile"),
                expansion_file: p.optional_path("fbExpansionQueryFile"),
            })
        } else {
            None
        };
        // The expanded query mixes scores with #wand, which needs scores in (0, 1].
        if feedback.is_some() && !matches!(model, RetrievalModel::Indri(_)) {
            return Err(Error::Config(format!(
                "fb=true requires retrievalAlgorithm=Indri, got {}",
                model.name()
            )));
        }

        let letor = match model {
            RetrievalModel::LearningToRank(_) => Some(LetorConfig {
                training_queries: p.path("letor:trainingQueryFile")?,
                training_qrels: p.path("letor:trainingQrelsFile")?,
                training_features: p.path("letor:trainingFeatureVectorsFile")?,
                page_rank: p.optional_path("letor:pageRankFile"),
                learn_path: p.path("letor:svmRankLearnPath")?,
                classify_path: p.path("letor:svmRankClassifyPath")?,
                c: p.parse_required("letor:svmRankParamC")?,
                model_file: p.path("letor:svmRankModelFile")?,
                testing_features: p.path("letor:testingFeatureVectorsFile")?,
                testing_scores: p.path("letor:testingDocumentScores")?,
                tie_break: p.parse_or("letor:tieBreak", TieBreak::default())?,
            }),
            _ => None,
        };

        Ok(Self {
            index_path: p.path("indexPath")?,
            query_file: p.path("queryFilePath")?,
            output_path: p.path("trecEvalOutputPath")?,
            model,
            run_id: p.get("runId").unwrap_or("run-1").to_string(),
            max_results: p.parse_or("maxResults", 100)?,
            feedback,
            letor,
        })
    }
}

fn bm25_params(p: &Params) -> Result<Bm25Params, Error> {
    Ok(Bm25Params {
        k1: p.parse_required("BM25:k_1")?,
        b: p.parse_required("BM25:b")?,
        k3: p.parse_required("BM25:k_3")?,
    })
}

fn indri_params(p: &Params) -> Result<IndriParams, Error> {
    Ok(IndriParams::new(
        p.parse_required("Indri:mu")?,
        p.parse_required("Indri:lambda")?,
    ))
}

/// The retrieval model named by `retrievalAlgorithm`.
///
/// BM25 and Indri require their parameters; learning-to-rank falls back to the defaults for
/// any it does not find.
pub fn model_from_params(p: &Params) -> Result<RetrievalModel, Error> {
    match p.require("retrievalAlgorithm")? {
        "UnrankedBoolean" => Ok(RetrievalModel::UnrankedBoolean),
        "RankedBoolean" => Ok(RetrievalModel::RankedBoolean),
        "BM25" => Ok(RetrievalModel::Bm25(bm25_params(p)?)),
        "Indri" => Ok(RetrievalModel::Indri(indri_params(p)?)),
        "letor" => {
            let defaults = LtrParams::default();
            let bm25 = Bm25Params {
                k1: p.parse_or("BM25:k_1", defaults.bm25.k1)?,
                b: p.parse_or("BM25:b", defaults.bm25.b)?,
                k3: p.parse_or("BM25:k_3", defaults.bm25.k3)?,
            };
            let indri = IndriParams::new(
                p.parse_or("Indri:mu", defaults.indri.mu)?,
                p.parse_or("Indri:lambda", defaults.indri.lambda)?,
            );
            let mask = match p.get("letor:featureDisable") {
                Some(list) => FeatureMask::parse_disabled(list)?,
                None => FeatureMask::all(),
            };
            Ok(RetrievalModel::LearningToRank(LtrParams { bm25, indri, mask }))
        }
        other => Err(Error::Config(format!("unknown retrievalAlgorithm {other:?}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = "\
indexPath=corpus.jsonl
queryFilePath=queries.txt
trecEvalOutputPath=out.teIn
";

    #[test]
    fn parses_bm25_run() {
        let text = format!("{BASE}retrievalAlgorithm=BM25\nBM25:k_1=1.5\nBM25:b = 0.6\nBM25:k_3=0\n");
        let cfg = RunConfig::from_params(&text).unwrap();
        assert_eq!(
            cfg.model,
            RetrievalModel::Bm25(Bm25Params {
                k1: 1.5,
                b: 0.6,
                k3: 0.0
            })
        );
        assert_eq!(cfg.run_id, "run-1");
        assert_eq!(cfg.max_results, 100);
        assert!(cfg.feedback.is_none());
        assert!(cfg.letor.is_none());
    }

    #[test]
    fn missing_model_parameter_is_reported() {
        let text = format!("{BASE}retrievalAlgorithm=Indri\nIndri:mu=2500\n");
        let err = RunConfig::from_params(&text).unwrap_err();
        assert!(err.to_string().contains("Indri:lambda"));
    }

    #[test]
    fn parses_feedback() {
        let text = format!(
            "{BASE}# feedback\nretrievalAlgorithm=Indri\nIndri:mu=2500\nIndri:lambda=0.4\n\
             fb=true\nfbDocs=10\nfbTerms=5\nfbMu=0\nfbOrigWeight=0.5\n\
             fbExpansionQueryFile=exp.qry\nfbTermBudget=skipExcluded\nmaxResults=50\n"
        );
        let cfg = RunConfig::from_params(&text).unwrap();
        let fb = cfg.feedback.unwrap();
        assert_eq!(fb.params.terms, 5);
        assert_eq!(fb.params.budget, TermBudget::SkipExcluded);
        assert_eq!(fb.expansion_file, Some(PathBuf::from("exp.qry")));
        assert_eq!(fb.initial_ranking, None);
        assert_eq!(cfg.max_results, 50);
    }

    #[test]
    fn feedback_requires_indri() {
        let fb = "fb=true\nfbDocs=2\nfbTerms=3\nfbMu=0\nfbOrigWeight=0.5\n";
        for model in [
            "retrievalAlgorithm=BM25\nBM25:k_1=1.2\nBM25:b=0.75\nBM25:k_3=0\n",
            "retrievalAlgorithm=RankedBoolean\n",
            "retrievalAlgorithm=UnrankedBoolean\n",
        ] {
            let text = format!("{BASE}{model}{fb}");
            assert!(
                matches!(RunConfig::from_params(&text), Err(Error::Config(msg)) if msg.contains("fb=true")),
                "{model}"
            );
        }
        // fb=false is fine under any model.
        let text = format!("{BASE}retrievalAlgorithm=RankedBoolean\nfb=false\n");
        assert!(RunConfig::from_params(&text).unwrap().feedback.is_none());
    }

    #[test]
    fn parses_letor() {
        let text = format!(
            "{BASE}retrievalAlgorithm=letor\n\
             letor:trainingQueryFile=train.qry\nletor:trainingQrelsFile=train.qrels\n\
             letor:trainingFeatureVectorsFile=train.fv\nletor:featureDisable=2,18\n\
             letor:svmRankLearnPath=svm_rank_learn\nletor:svmRankClassifyPath=svm_rank_classify\n\
             letor:svmRankParamC=0.001\nletor:svmRankModelFile=model\n\
             letor:testingFeatureVectorsFile=test.fv\nletor:testingDocumentScores=test.scores\n\
             letor:tieBreak=docid\n"
        );
        let cfg = RunConfig::from_params(&text).unwrap();
        let RetrievalModel::LearningToRank(ltr) = &cfg.model else {
            panic!("letor model");
        };
        assert!(!ltr.mask.is_enabled(1));
        assert!(!ltr.mask.is_enabled(17));
        assert_eq!(ltr.bm25, Bm25Params::default());
        let letor = cfg.letor.unwrap();
        assert_eq!(letor.tie_break, TieBreak::DocId);
        assert_eq!(letor.c, 0.001);
        assert!(letor.page_rank.is_none());
    }

    #[test]
    fn rejects_unknown_model_and_bad_lines() {
        let text = format!("{BASE}retrievalAlgorithm=TFIDF\n");
        assert!(matches!(RunConfig::from_params(&text), Err(Error::Config(_))));
        assert!(matches!(Params::parse("no equals sign"), Err(Error::Config(_))));
    }
}
