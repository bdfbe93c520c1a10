//! Per-user session state.
//!
//! A [`Session`] owns everything one interactive user accumulates: the
//! current similarity index, the names and bytes of the files it was built
//! from, the answer style and the QA history. It is created on the first
//! interaction and dropped when the session ends.
//!
//! The index, file list and raw bytes are only ever replaced together through
//! [`Session::install`], so no vector outlives the document it came from. A
//! failed rebuild never reaches `install`, which leaves the previous corpus
//! queryable.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::{QaError, Result};
use crate::history::{QaEntry, QaHistory};
use crate::index::{InMemoryIndex, SimilarityIndex};
use crate::prompt::AnswerStyle;

/// A freshly built index together with the documents it covers.
#[derive(Debug)]
pub struct IndexedCorpus {
    pub index: InMemoryIndex,
    /// Upload names in upload order, including files that were skipped.
    pub files: Vec<String>,
    /// Raw upload bytes by filename.
    pub uploads: BTreeMap<String, Vec<u8>>,
}

/// In-memory state of one interactive session.
#[derive(Debug, Default)]
pub struct Session {
    index: Option<Arc<InMemoryIndex>>,
    files: Vec<String>,
    uploads: BTreeMap<String, Vec<u8>>,
    history: QaHistory,
    pub answer_style: AnswerStyle,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    /// True once an index has been installed.
    pub fn is_ready(&self) -> bool {
        self.index.is_some()
    }

    /// Shared handle to the current index.
    pub fn index(&self) -> Result<Arc<InMemoryIndex>> {
        self.index.clone().ok_or(QaError::IndexNotReady)
    }

    /// Names of the files behind the current index.
    pub fn files(&self) -> &[String] {
        &self.files
    }

    pub fn chunk_count(&self) -> usize {
        self.index.as_ref().map(|i| i.len()).unwrap_or(0)
    }

    /// Whether uploading `names` calls for a new index.
    pub fn needs_rebuild(&self, names: &[String]) -> bool {
        self.index.is_none() || self.files != names
    }

    /// Replace index, file list and upload bytes in one step.
    pub fn install(&mut self, corpus: IndexedCorpus) {
        self.index = Some(Arc::new(corpus.index));
        self.files = corpus.files;
        self.uploads = corpus.uploads;
    }

    /// Raw bytes of a file from the current document set.
    pub fn upload(&self, filename: &str) -> Option<&[u8]> {
        self.uploads.get(filename).map(|b| b.as_slice())
    }

    pub fn history(&self) -> &QaHistory {
        &self.history
    }

    /// Append an answered question to the history.
    pub fn record(&mut self, entry: QaEntry) -> &QaEntry {
        self.history.push(entry)
    }

    pub fn clear_history(&mut self) {
        self.history.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Chunk;
    use crate::provenance::SourceMap;

    fn corpus(files: &[&str]) -> IndexedCorpus {
        let chunks: Vec<Chunk> = files
            .iter()
            .map(|f| Chunk {
                id: f.to_string(),
                filename: f.to_string(),
                page: 1,
                chunk_index: 0,
                text: format!("text of {}", f),
                hash: String::new(),
            })
            .collect();
        let vectors = files.iter().map(|_| vec![1.0, 0.0]).collect();
        IndexedCorpus {
            index: InMemoryIndex::build("m", chunks, vectors).unwrap(),
            files: files.iter().map(|f| f.to_string()).collect(),
            uploads: files
                .iter()
                .map(|f| (f.to_string(), f.as_bytes().to_vec()))
                .collect(),
        }
    }

    #[test]
    fn test_new_session_not_ready() {
        let s = Session::new();
        assert!(!s.is_ready());
        assert!(matches!(s.index().unwrap_err(), QaError::IndexNotReady));
        assert_eq!(s.chunk_count(), 0);
        assert!(s.needs_rebuild(&[]));
    }

    #[test]
    fn test_install_replaces_everything_together() {
        let mut s = Session::new();
        s.install(corpus(&["a.txt", "b.txt"]));
        assert!(s.is_ready());
        assert_eq!(s.chunk_count(), 2);
        assert_eq!(s.upload("a.txt"), Some(&b"a.txt"[..]));

        s.install(corpus(&["c.pdf"]));
        assert_eq!(s.files(), &["c.pdf".to_string()]);
        assert!(s.upload("a.txt").is_none());
        assert_eq!(s.chunk_count(), 1);
    }

    #[test]
    fn test_needs_rebuild_only_on_changed_names() {
        let mut s = Session::new();
        s.install(corpus(&["a.txt"]));
        assert!(!s.needs_rebuild(&["a.txt".to_string()]));
        assert!(s.needs_rebuild(&["a.txt".to_string(), "b.txt".to_string()]));
    }

    #[test]
    fn test_index_handle_survives_replacement() {
        let mut s = Session::new();
        s.install(corpus(&["a.txt"]));
        let old = s.index().unwrap();
        s.install(corpus(&["b.txt", "c.txt"]));
        assert_eq!(old.len(), 1);
        assert_eq!(s.index().unwrap().len(), 2);
    }

    #[test]
    fn test_history_recorded_and_cleared() {
        let mut s = Session::new();
        s.record(QaEntry::new("q", "a", SourceMap::new(), AnswerStyle::Detailed));
        assert_eq!(s.history().len(), 1);
        s.clear_history();
        assert!(s.history().is_empty());
    }
}
