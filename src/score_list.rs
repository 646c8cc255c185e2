//! Document score lists.

use crate::index::{DocId, IndexSource};
use crate::Error;
use std::cmp::Ordering;

/// One scored document.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreListEntry {
    /// Internal document id.
    pub docid: DocId,
    /// Retrieval score.
    pub score: f64,
    /// External id, filled in before ranking output.
    pub external_id: Option<String>,
}

impl ScoreListEntry {
    /// Entry without an external id.
    pub fn new(docid: DocId, score: f64) -> Self {
        Self {
            docid,
            score,
            external_id: None,
        }
    }
}

/// Ranking order: score descending, then external id ascending, then docid ascending.
///
/// Entries without an external id sort before entries that have one on a score tie.
pub fn rank_order(a: &ScoreListEntry, b: &ScoreListEntry) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| a.external_id.cmp(&b.external_id))
        .then_with(|| a.docid.cmp(&b.docid))
}

/// An ordered sequence of scored documents.
///
/// Evaluation produces lists in ascending docid order; nothing is sorted by score until
/// [`ScoreList::sort_by_rank`] is called.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScoreList {
    entries: Vec<ScoreListEntry>,
}

impl ScoreList {
    /// Empty list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `(docid, score)`.
    pub fn push(&mut self, docid: DocId, score: f64) {
        self.entries.push(ScoreListEntry::new(docid, score));
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the list is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entry at `i`.
    pub fn get(&self, i: usize) -> Option<&ScoreListEntry> {
        self.entries.get(i)
    }

    /// Docid at `i`. Panics when out of range, like slice indexing.
    pub fn docid(&self, i: usize) -> DocId {
        self.entries[i].docid
    }

    /// Score at `i`. Panics when out of range, like slice indexing.
    pub fn score(&self, i: usize) -> f64 {
        self.entries[i].score
    }

    /// All entries in list order.
    pub fn entries(&self) -> &[ScoreListEntry] {
        &self.entries
    }

    /// Consume into the entry vector.
    pub fn into_entries(self) -> Vec<ScoreListEntry> {
        self.entries
    }

    /// Iterate entries in list order.
    pub fn iter(&self) -> std::slice::Iter<'_, ScoreListEntry> {
        self.entries.iter()
    }

    /// Fill in external ids from the index.
    pub fn attach_external_ids(&mut self, index: &dyn IndexSource) -> Result<(), Error> {
        for e in &mut self.entries {
            if e.external_id.is_none() {
                e.external_id = Some(index.external_id(e.docid)?);
            }
        }
        Ok(())
    }

    /// Stable sort by [`rank_order`].
    pub fn sort_by_rank(&mut self) {
        self.entries.sort_by(rank_order);
    }

    /// Keep the first `n` entries.
    pub fn truncate(&mut self, n: usize) {
        self.entries.truncate(n);
    }
}

impl FromIterator<ScoreListEntry> for ScoreList {
    fn from_iter<T: IntoIterator<Item = ScoreListEntry>>(iter: T) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a ScoreList {
    type Item = &'a ScoreListEntry;
    type IntoIter = std::slice::Iter<'a, ScoreListEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}
