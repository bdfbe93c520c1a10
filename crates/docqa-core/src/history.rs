//! Append-only question/answer history for one session.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::prompt::AnswerStyle;
use crate::provenance::SourceMap;

/// Maximum characters of a question shown in history listings.
const LABEL_CHARS: usize = 60;

/// One answered question with the sources it was grounded on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QaEntry {
    pub question: String,
    pub answer: String,
    pub sources: SourceMap,
    pub style: AnswerStyle,
    pub asked_at: DateTime<Utc>,
}

impl QaEntry {
    pub fn new(
        question: impl Into<String>,
        answer: impl Into<String>,
        sources: SourceMap,
        style: AnswerStyle,
    ) -> Self {
        Self {
            question: question.into(),
            answer: answer.into(),
            sources,
            style,
            asked_at: Utc::now(),
        }
    }

    /// Question shortened for one-line listings.
    pub fn label(&self) -> String {
        if self.question.chars().count() > LABEL_CHARS {
            let head: String = self.question.chars().take(LABEL_CHARS).collect();
            format!("{}...", head)
        } else {
            self.question.clone()
        }
    }
}

/// Chronological list of [`QaEntry`]s. Entries are never edited once pushed.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(transparent)]
pub struct QaHistory {
    entries: Vec<QaEntry>,
}

impl QaHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry and return a reference to it.
    pub fn push(&mut self, entry: QaEntry) -> &QaEntry {
        self.entries.push(entry);
        &self.entries[self.entries.len() - 1]
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries oldest first.
    pub fn entries(&self) -> &[QaEntry] {
        &self.entries
    }

    /// `(number, entry)` pairs newest first; numbers are 1-based and chronological.
    pub fn newest_first(&self) -> impl Iterator<Item = (usize, &QaEntry)> {
        self.entries.iter().enumerate().rev().map(|(i, e)| (i + 1, e))
    }

    /// Entry by its 1-based chronological number.
    pub fn get(&self, number: usize) -> Option<&QaEntry> {
        number.checked_sub(1).and_then(|i| self.entries.get(i))
    }

    /// Drop every entry.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
