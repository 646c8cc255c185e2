//! Learning-to-rank plumbing around an external ranker.
//!
//! Training and scoring are delegated to a ranker that exchanges files in the svm_rank
//! format: one `<label> qid:<q> 1:<v> ... 18:<v> #<extId>` line per document in, one score
//! per line out.

use crate::features::FeatureVector;
use crate::score_list::{ScoreList, ScoreListEntry};
use crate::Error;
use std::ffi::OsStr;
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::str::FromStr;

/// A model trainer and scorer.
pub trait Ranker {
    /// Train on `features`, writing the model to `model`.
    fn train(&self, features: &Path, model: &Path) -> Result<(), Error>;
    /// Score every line of `features` with `model`, one score per line into `scores`.
    fn classify(&self, features: &Path, model: &Path, scores: &Path) -> Result<(), Error>;
}

/// svm_rank's `svm_rank_learn` / `svm_rank_classify` executables.
#[derive(Debug, Clone, PartialEq)]
pub struct SvmRankRanker {
    /// Path of the learner.
    pub learn: PathBuf,
    /// Path of the classifier.
    pub classify: PathBuf,
    /// Regularization constant passed as `-c`.
    pub c: f64,
}

impl SvmRankRanker {
    /// Ranker running `learn` and `classify` with regularization `c`.
    pub fn new(learn: impl Into<PathBuf>, classify: impl Into<PathBuf>, c: f64) -> Self {
        Self {
            learn: learn.into(),
            classify: classify.into(),
            c,
        }
    }
}

impl Ranker for SvmRankRanker {
    fn train(&self, features: &Path, model: &Path) -> Result<(), Error> {
        let c = self.c.to_string();
        run(
            &self.learn,
            [OsStr::new("-c"), OsStr::new(&c), features.as_os_str(), model.as_os_str()],
        )
    }

    fn classify(&self, features: &Path, model: &Path, scores: &Path) -> Result<(), Error> {
        run(
            &self.classify,
            [features.as_os_str(), model.as_os_str(), scores.as_os_str()],
        )
    }
}

/// Run `program` to completion. Both output streams are collected before the exit status is
/// inspected.
fn run<'s>(program: &Path, args: impl IntoIterator<Item = &'s OsStr>) -> Result<(), Error> {
    tracing::info!(program = %program.display(), "running ranker");
    let output = Command::new(program).args(args).output()?;
    let stdout = String::from_utf8_lossy(&output.stdout);
    for line in stdout.lines() {
        tracing::debug!(program = %program.display(), "{line}");
    }
    if !output.status.success() {
        return Err(Error::RankerProcess {
            program: program.display().to_string(),
            status: output.status.to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    Ok(())
}

/// Write one feature-file line.
pub fn write_feature_line<W: Write>(
    out: &mut W,
    label: i32,
    query_id: &str,
    features: &FeatureVector,
    external_id: &str,
) -> Result<(), Error> {
    writeln!(
        out,
        "{label} qid:{query_id} {}#{external_id}",
        features.to_wire()
    )?;
    Ok(())
}

/// Read one score per non-blank line.
pub fn read_scores<R: BufRead>(reader: R) -> Result<Vec<f64>, Error> {
    let mut scores = Vec::new();
    for (n, line) in reader.lines().enumerate() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let score = line
            .parse::<f64>()
            .map_err(|_| Error::Format(format!("score line {}: {line:?}", n + 1)))?;
        scores.push(score);
    }
    Ok(scores)
}

/// Order of re-ranked documents whose ranker scores tie.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TieBreak {
    /// Keep the initial retrieval order.
    #[default]
    InputOrder,
    /// External id ascending.
    ExternalId,
    /// Internal docid ascending.
    DocId,
}

impl FromStr for TieBreak {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "inputOrder" => Ok(Self::InputOrder),
            "externalId" => Ok(Self::ExternalId),
            "docid" => Ok(Self::DocId),
            other => Err(Error::Config(format!("unknown letor:tieBreak {other:?}"))),
        }
    }
}

/// Replace the scores of `candidates` with `scores` (same order) and sort descending.
pub fn rerank(
    candidates: Vec<ScoreListEntry>,
    scores: &[f64],
    tie_break: TieBreak,
) -> Result<ScoreList, Error> {
    if candidates.len() != scores.len() {
        return Err(Error::Format(format!(
            "ranker returned {} scores for {} documents",
            scores.len(),
            candidates.len()
        )));
    }
    let mut entries: Vec<ScoreListEntry> = candidates
        .into_iter()
        .zip(scores)
        .map(|(e, &score)| ScoreListEntry { score, ..e })
        .collect();
    entries.sort_by(|a, b| {
        let by_score = b.score.total_cmp(&a.score);
        match tie_break {
            TieBreak::InputOrder => by_score,
            TieBreak::ExternalId => by_score.then_with(|| a.external_id.cmp(&b.external_id)),
            TieBreak::DocId => by_score.then_with(|| a.docid.cmp(&b.docid)),
        }
    });
    Ok(entries.into_iter().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::FEATURE_COUNT;

    fn candidate(docid: u32, ext: &str) -> ScoreListEntry {
        ScoreListEntry {
            docid,
            score: 0.0,
            external_id: Some(ext.to_string()),
        }
    }

    #[test]
    fn feature_line_format() {
        let mut values = vec![0.0; FEATURE_COUNT];
        values[1] = 0.25;
        let v = FeatureVector::from_values(values).unwrap();
        let mut out = Vec::new();
        write_feature_line(&mut out, 2, "12", &v, "clueweb-1").unwrap();
        let line = String::from_utf8(out).unwrap();
        assert!(line.starts_with("2 qid:12 1:0 2:0.25 3:0 "));
        assert!(line.ends_with("18:0 #clueweb-1\n"));
    }

    #[test]
    fn reads_scores() {
        let scores = read_scores("1.5\n\n-0.25\n".as_bytes()).unwrap();
        assert_eq!(scores, vec![1.5, -0.25]);
        assert!(matches!(
            read_scores("high\n".as_bytes()),
            Err(Error::Format(_))
        ));
    }

    #[test]
    fn tie_break_policies() {
        let candidates = vec![candidate(3, "c"), candidate(1, "b"), candidate(2, "a")];
        let scores = [1.0, 1.0, 2.0];
        let order = |tb| {
            rerank(candidates.clone(), &scores, tb)
                .unwrap()
                .iter()
                .map(|e| e.docid)
                .collect::<Vec<_>>()
        };
        assert_eq!(order(TieBreak::InputOrder), vec![2, 3, 1]);
        assert_eq!(order(TieBreak::ExternalId), vec![2, 1, 3]);
        assert_eq!(order(TieBreak::DocId), vec![2, 1, 3]);
        assert_eq!("externalId".parse::<TieBreak>().unwrap(), TieBreak::ExternalId);
        assert!("random".parse::<TieBreak>().is_err());
    }

    #[test]
    fn score_count_must_match() {
        assert!(matches!(
            rerank(vec![candidate(0, "a")], &[], TieBreak::InputOrder),
            Err(Error::Format(_))
        ));
    }

    #[cfg(unix)]
    #[test]
    fn failing_ranker_is_an_error() {
        let ranker = SvmRankRanker::new("false", "true", 0.001);
        let dir = tempfile::tempdir().unwrap();
        let f = dir.path().join("f");
        let m = dir.path().join("m");
        assert!(matches!(
            ranker.train(&f, &m),
            Err(Error::RankerProcess { .. })
        ));
        ranker.classify(&f, &m, &dir.path().join("s")).unwrap();
    }

    #[test]
    fn missing_ranker_binary_is_io_error() {
        let ranker = SvmRankRanker::new("/nonexistent/svm_rank_learn", "x", 1.0);
        let p = Path::new("f");
        assert!(matches!(ranker.train(p, p), Err(Error::Io(_))));
    }
}
