//! TREC-style files: queries, relevance judgments and rankings.

use crate::score_list::ScoreList;
use crate::Error;
use std::io::{BufRead, Write};

/// Tag of the placeholder row written for a query without results.
pub const DUMMY_DOC: &str = "dummy";

/// A query line `id:text`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryLine {
    /// Query id.
    pub id: String,
    /// Raw query text.
    pub text: String,
}

/// A relevance judgment `qid 0 extId label`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Qrel {
    /// Query id.
    pub query_id: String,
    /// Judged document.
    pub external_id: String,
    /// Relevance grade.
    pub label: i32,
}

/// One row of a ranking file.
#[derive(Debug, Clone, PartialEq)]
pub struct RankingRow {
    /// Query id.
    pub query_id: String,
    /// Ranked document.
    pub external_id: String,
    /// 1-based rank.
    pub rank: usize,
    /// Retrieval score.
    pub score: f64,
    /// Run tag.
    pub run_id: String,
}

fn format_err(what: &str, n: usize, line: &str) -> Error {
    Error::Format(format!("{what} line {}: {line:?}", n + 1))
}

/// Read `id:query` lines; blank lines are skipped.
pub fn read_queries<R: BufRead>(reader: R) -> Result<Vec<QueryLine>, Error> {
    let mut out = Vec::new();
    for (n, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let (id, text) = line
            .split_once(':')
            .ok_or_else(|| format_err("query", n, &line))?;
        out.push(QueryLine {
            id: id.trim().to_string(),
            text: text.trim().to_string(),
        });
    }
    Ok(out)
}

/// Read whitespace-separated `qid iteration extId label` judgments.
pub fn read_qrels<R: BufRead>(reader: R) -> Result<Vec<Qrel>, Error> {
    let mut out = Vec::new();
    for (n, line) in reader.lines().enumerate() {
        let line = line?;
        let parts: Vec<&str> = line.split_whitespace().collect();
        match parts.as_slice() {
            [] => continue,
            [qid, _, ext, label] => out.push(Qrel {
                query_id: (*qid).to_string(),
                external_id: (*ext).to_string(),
                label: label.parse().map_err(|_| format_err("qrels", n, &line))?,
            }),
            _ => return Err(format_err("qrels", n, &line)),
        }
    }
    Ok(out)
}

/// Read a ranking file written by [`write_ranking`] (any whitespace separates columns).
pub fn read_ranking<R: BufRead>(reader: R) -> Result<Vec<RankingRow>, Error> {
    let mut out = Vec::new();
    for (n, line) in reader.lines().enumerate() {
        let line = line?;
        let parts: Vec<&str> = line.split_whitespace().collect();
        match parts.as_slice() {
            [] => continue,
            [qid, _, ext, rank, score, run] => out.push(RankingRow {
                query_id: (*qid).to_string(),
                external_id: (*ext).to_string(),
                rank: rank.parse().map_err(|_| format_err("ranking", n, &line))?,
                score: score.parse().map_err(|_| format_err("ranking", n, &line))?,
                run_id: (*run).to_string(),
            }),
            _ => return Err(format_err("ranking", n, &line)),
        }
    }
    Ok(out)
}

/// `(extId, score)` pairs of one query, in file order, without placeholder rows.
pub fn ranking_for_query(rows: &[RankingRow], query_id: &str) -> Vec<(String, f64)> {
    rows.iter()
        .filter(|r| r.query_id == query_id && r.external_id != DUMMY_DOC)
        .map(|r| (r.external_id.clone(), r.score))
        .collect()
}

/// Write `list` (ranked, external ids attached) as `qid Q0 extId rank score runId` rows.
///
/// An empty list produces one placeholder row with rank 1 and score 0.
pub fn write_ranking<W: Write>(
    out: &mut W,
    query_id: &str,
    list: &ScoreList,
    run_id: &str,
) -> Result<(), Error> {
    if list.is_empty() {
        writeln!(out, "{query_id}\tQ0\t{DUMMY_DOC}\t1\t0\t{run_id}")?;
        return Ok(());
    }
    for (i, e) in list.iter().enumerate() {
        let ext = e.external_id.as_deref().ok_or(Error::DocNotFound(e.docid))?;
        writeln!(
            out,
            "{query_id}\tQ0\t{ext}\t{}\t{}\t{run_id}",
            i + 1,
            e.score
        )?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::score_list::ScoreListEntry;

    #[test]
    fn parses_queries() {
        let qs = read_queries("10:apple pie\n\n11: #and(a b)\n".as_bytes()).unwrap();
        assert_eq!(qs.len(), 2);
        assert_eq!(qs[0].id, "10");
        assert_eq!(qs[1].text, "#and(a b)");
        assert!(read_queries("no id here\n".as_bytes()).is_err());
    }

    #[test]
    fn parses_qrels() {
        let qrels = read_qrels("1 0 doc-a 2\n1 0 doc-b -1\n".as_bytes()).unwrap();
        assert_eq!(qrels[1].label, -1);
        assert_eq!(qrels[0].external_id, "doc-a");
        assert!(read_qrels("1 0 doc-a\n".as_bytes()).is_err());
    }

    #[test]
    fn ranking_round_trip() {
        let list: ScoreList = vec![
            ScoreListEntry {
                docid: 4,
                score: 2.5,
                external_id: Some("x".into()),
            },
            ScoreListEntry {
                docid: 1,
                score: 1.0,
                external_id: Some("y".into()),
            },
        ]
        .into_iter()
        .collect();
        let mut out = Vec::new();
        write_ranking(&mut out, "7", &list, "run-1").unwrap();
        write_ranking(&mut out, "8", &ScoreList::new(), "run-1").unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("7\tQ0\tx\t1\t2.5\trun-1\n7\tQ0\ty\t2\t1\trun-1\n"));
        assert!(text.ends_with("8\tQ0\tdummy\t1\t0\trun-1\n"));

        let rows = read_ranking(text.as_bytes()).unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[1].rank, 2);
        assert_eq!(
            ranking_for_query(&rows, "7"),
            vec![("x".to_string(), 2.5), ("y".to_string(), 1.0)]
        );
        assert!(ranking_for_query(&rows, "8").is_empty());
    }

    #[test]
    fn missing_external_id_is_an_error() {
        let mut list = ScoreList::new();
        list.push(3, 1.0);
        let mut out = Vec::new();
        assert!(matches!(
            write_ranking(&mut out, "1", &list, "r"),
            Err(Error::DocNotFound(3))
        ));
    }
}
