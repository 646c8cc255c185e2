//! Read-only index access.
//!
//! The evaluator consumes an index through [`IndexSource`]; it never builds or mutates one.
//! [`MemoryIndex`] is a small positional in-memory implementation used by the CLI and tests.

use crate::tokenizer::Tokenizer;
use crate::Error;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::io::BufRead;
use std::path::Path;

/// Internal document id.
pub type DocId = u32;

/// Field read by terms that do not name one.
pub const DEFAULT_FIELD: &str = "body";

/// One document's entry in an inverted list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Posting {
    /// Internal document id.
    pub docid: DocId,
    /// Ascending, 1-based positions within the field.
    pub positions: Vec<u32>,
}

impl Posting {
    /// Create a posting; `positions` must be ascending.
    pub fn new(docid: DocId, positions: Vec<u32>) -> Self {
        debug_assert!(positions.windows(2).all(|w| w[0] < w[1]));
        Self { docid, positions }
    }

    /// Term frequency (number of positions).
    pub fn tf(&self) -> u32 {
        self.positions.len() as u32
    }
}

/// Postings for one term (or one proximity match) in one field.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct InvertedList {
    /// Field the postings were read from.
    pub field: String,
    /// Collection term frequency: total positions over all postings.
    pub ctf: u64,
    /// Postings, strictly ascending by docid.
    pub postings: Vec<Posting>,
}

impl InvertedList {
    /// Empty list for `field`.
    pub fn new(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            ctf: 0,
            postings: Vec::new(),
        }
    }

    /// Document frequency (posting count).
    pub fn df(&self) -> u32 {
        self.postings.len() as u32
    }

    /// Append a posting; docids must arrive in strictly ascending order.
    pub fn push(&mut self, posting: Posting) {
        debug_assert!(self
            .postings
            .last()
            .map_or(true, |last| last.docid < posting.docid));
        self.ctf += u64::from(posting.tf());
        self.postings.push(posting);
    }

    /// Docids in list order.
    pub fn docids(&self) -> impl Iterator<Item = DocId> + '_ {
        self.postings.iter().map(|p| p.docid)
    }
}

/// Per-stem statistics of a document's term vector.
#[derive(Debug, Clone, PartialEq)]
pub struct TermStat {
    /// The stem.
    pub stem: String,
    /// Documents in the collection containing the stem (in this field).
    pub df: u32,
    /// Occurrences in this document.
    pub tf: u32,
    /// Occurrences in the whole collection (in this field).
    pub ctf: u64,
}

/// A document's field-restricted term vector.
///
/// Slot 0 is reserved and never holds a stem; [`TermVector::stems`] starts at slot 1.
#[derive(Debug, Clone, PartialEq)]
pub struct TermVector {
    slots: Vec<TermStat>,
}

impl TermVector {
    /// Build a vector from its stems (the reserved slot is added here).
    pub fn new(stems: Vec<TermStat>) -> Self {
        let mut slots = Vec::with_capacity(stems.len() + 1);
        slots.push(TermStat {
            stem: String::new(),
            df: 0,
            tf: 0,
            ctf: 0,
        });
        slots.extend(stems);
        Self { slots }
    }

    /// Number of stems, excluding the reserved slot.
    pub fn len(&self) -> usize {
        self.slots.len() - 1
    }

    /// Whether the vector holds no stems.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stems from slot 1 onward.
    pub fn stems(&self) -> impl Iterator<Item = &TermStat> + '_ {
        self.slots[1..].iter()
    }

    /// Stem → tf lookup table.
    pub fn tf_table(&self) -> HashMap<&str, u32> {
        self.stems().map(|s| (s.stem.as_str(), s.tf)).collect()
    }
}

/// Read-only access to postings, statistics and per-document data.
pub trait IndexSource {
    /// Postings for `term` in `field` (empty list if the term is unknown).
    fn postings(&self, term: &str, field: &str) -> Result<InvertedList, Error>;
    /// Document frequency of `term` in `field`.
    fn doc_freq(&self, term: &str, field: &str) -> Result<u32, Error>;
    /// Collection term frequency of `term` in `field`.
    fn collection_freq(&self, term: &str, field: &str) -> Result<u64, Error>;
    /// Total tokens in `field` over the collection.
    fn sum_total_term_freq(&self, field: &str) -> Result<u64, Error>;
    /// Documents with a non-empty `field`.
    fn doc_count(&self, field: &str) -> Result<u32, Error>;
    /// Total documents in the collection.
    fn num_docs(&self) -> u32;
    /// Length of `field` in document `docid` (0 when the field is empty).
    fn doc_length(&self, docid: DocId, field: &str) -> Result<u64, Error>;
    /// Term vector; [`Error::MissingTermVector`] when the document has none for `field`.
    fn term_vector(&self, docid: DocId, field: &str) -> Result<TermVector, Error>;
    /// External id of an internal docid.
    fn external_id(&self, docid: DocId) -> Result<String, Error>;
    /// Internal docid of an external id; [`Error::ExternalIdNotFound`] when absent.
    fn internal_id(&self, external_id: &str) -> Result<DocId, Error>;
    /// A stored (non-indexed) document attribute such as `score` or `rawUrl`.
    fn stored_field(&self, docid: DocId, name: &str) -> Result<Option<String>, Error>;

    /// `sum_total_term_freq(field) / doc_count(field)`.
    fn avg_doc_len(&self, field: &str) -> Result<f64, Error> {
        let docs = self.doc_count(field)?;
        if docs == 0 {
            return Ok(0.0);
        }
        Ok(self.sum_total_term_freq(field)? as f64 / f64::from(docs))
    }
}

/// One line of a JSON-lines corpus file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CorpusDoc {
    /// External document id.
    pub id: String,
    /// Indexed fields: name → raw text.
    #[serde(default)]
    pub fields: BTreeMap<String, String>,
    /// Stored attributes: name → value.
    #[serde(default)]
    pub stored: BTreeMap<String, String>,
}

#[derive(Debug, Default)]
struct FieldStats {
    doc_count: u32,
    sum_ttf: u64,
}

#[derive(Debug)]
struct StoredDoc {
    external_id: String,
    stored: BTreeMap<String, String>,
    // field -> (length, stem -> positions)
    fields: HashMap<String, (u64, BTreeMap<String, Vec<u32>>)>,
}

/// Positional in-memory index.
#[derive(Debug, Default)]
pub struct MemoryIndex {
    docs: Vec<StoredDoc>,
    by_external: HashMap<String, DocId>,
    postings: HashMap<String, HashMap<String, Vec<Posting>>>,
    field_stats: HashMap<String, FieldStats>,
}

impl MemoryIndex {
    /// Create an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a pre-tokenized document; docids are assigned in insertion order.
    pub fn add_document(
        &mut self,
        external_id: &str,
        fields: &[(&str, Vec<String>)],
        stored: BTreeMap<String, String>,
    ) -> Result<DocId, Error> {
        if self.by_external.contains_key(external_id) {
            return Err(Error::Format(format!(
                "duplicate external id {external_id:?}"
            )));
        }
        let docid = self.docs.len() as DocId;
        let mut doc_fields = HashMap::new();
        for (field, terms) in fields {
            if terms.is_empty() {
                continue;
            }
            let mut positions: BTreeMap<String, Vec<u32>> = BTreeMap::new();
            for (i, term) in terms.iter().enumerate() {
                positions.entry(term.clone()).or_default().push(i as u32 + 1);
            }
            let by_term = self.postings.entry((*field).to_string()).or_default();
            for (term, pos) in &positions {
                by_term
                    .entry(term.clone())
                    .or_default()
                    .push(Posting::new(docid, pos.clone()));
            }
            let stats = self.field_stats.entry((*field).to_string()).or_default();
            stats.doc_count += 1;
            stats.sum_ttf += terms.len() as u64;
            doc_fields.insert((*field).to_string(), (terms.len() as u64, positions));
        }
        self.docs.push(StoredDoc {
            external_id: external_id.to_string(),
            stored,
            fields: doc_fields,
        });
        self.by_external.insert(external_id.to_string(), docid);
        Ok(docid)
    }

    /// Tokenize and add one corpus document.
    pub fn add_corpus_doc(
        &mut self,
        doc: CorpusDoc,
        tokenizer: &dyn Tokenizer,
    ) -> Result<DocId, Error> {
        let tokenized: Vec<(&str, Vec<String>)> = doc
            .fields
            .iter()
            .map(|(name, text)| (name.as_str(), tokenizer.tokenize(text)))
            .collect();
        self.add_document(&doc.id, &tokenized, doc.stored.clone())
    }

    /// Build an index from JSON lines (one [`CorpusDoc`] per non-blank line).
    pub fn from_jsonl<R: BufRead>(reader: R, tokenizer: &dyn Tokenizer) -> Result<Self, Error> {
        let mut index = Self::new();
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let doc: CorpusDoc = serde_json::from_str(&line)?;
            index.add_corpus_doc(doc, tokenizer)?;
        }
        Ok(index)
    }

    /// Open a JSON-lines corpus file.
    pub fn open(path: impl AsRef<Path>, tokenizer: &dyn Tokenizer) -> Result<Self, Error> {
        let file = std::fs::File::open(path)?;
        Self::from_jsonl(std::io::BufReader::new(file), tokenizer)
    }

    fn doc(&self, docid: DocId) -> Result<&StoredDoc, Error> {
        self.docs
            .get(docid as usize)
            .ok_or(Error::DocNotFound(docid))
    }

    fn term_postings(&self, term: &str, field: &str) -> &[Posting] {
        self.postings
            .get(field)
            .and_then(|m| m.get(term))
            .map_or(&[], Vec::as_slice)
    }
}

impl IndexSource for MemoryIndex {
    fn postings(&self, term: &str, field: &str) -> Result<InvertedList, Error> {
        let mut list = InvertedList::new(field);
        for p in self.term_postings(term, field) {
            list.push(p.clone());
        }
        Ok(list)
    }

    fn doc_freq(&self, term: &str, field: &str) -> Result<u32, Error> {
        Ok(self.term_postings(term, field).len() as u32)
    }

    fn collection_freq(&self, term: &str, field: &str) -> Result<u64, Error> {
        Ok(self
            .term_postings(term, field)
            .iter()
            .map(|p| u64::from(p.tf()))
            .sum())
    }

    fn sum_total_term_freq(&self, field: &str) -> Result<u64, Error> {
        Ok(self.field_stats.get(field).map_or(0, |s| s.sum_ttf))
    }

    fn doc_count(&self, field: &str) -> Result<u32, Error> {
        Ok(self.field_stats.get(field).map_or(0, |s| s.doc_count))
    }

    fn num_docs(&self) -> u32 {
        self.docs.len() as u32
    }

    fn doc_length(&self, docid: DocId, field: &str) -> Result<u64, Error> {
        Ok(self.doc(docid)?.fields.get(field).map_or(0, |(len, _)| *len))
    }

    fn term_vector(&self, docid: DocId, field: &str) -> Result<TermVector, Error> {
        let (_, terms) =
            self.doc(docid)?
                .fields
                .get(field)
                .ok_or_else(|| Error::MissingTermVector {
                    docid,
                    field: field.to_string(),
                })?;
        let mut stems = Vec::with_capacity(terms.len());
        for (stem, positions) in terms {
            stems.push(TermStat {
                stem: stem.clone(),
                df: self.doc_freq(stem, field)?,
                tf: positions.len() as u32,
                ctf: self.collection_freq(stem, field)?,
            });
        }
        Ok(TermVector::new(stems))
    }

    fn external_id(&self, docid: DocId) -> Result<String, Error> {
        Ok(self.doc(docid)?.external_id.clone())
    }

    fn internal_id(&self, external_id: &str) -> Result<DocId, Error> {
        self.by_external
            .get(external_id)
            .copied()
            .ok_or_else(|| Error::ExternalIdNotFound(external_id.to_string()))
    }

    fn stored_field(&self, docid: DocId, name: &str) -> Result<Option<String>, Error> {
        Ok(self.doc(docid)?.stored.get(name).cloned())
    }
}
