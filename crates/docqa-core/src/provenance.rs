//! Source citations for answers.
//!
//! Collapses retrieved chunks into a `filename → pages` map: pages are
//! deduplicated and sorted ascending, with [`SourcePage::Unknown`] after
//! every numbered page.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::models::ScoredChunk;

/// Filename used when loose metadata carries no source.
pub const UNKNOWN_SOURCE: &str = "Unknown";

/// A cited page, or the `unknown` sentinel when page metadata is unusable.
///
/// Serializes as a JSON number, or the string `"unknown"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SourcePage {
    Page(u32),
    Unknown,
}

impl fmt::Display for SourcePage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourcePage::Page(n) => write!(f, "{}", n),
            SourcePage::Unknown => write!(f, "unknown"),
        }
    }
}

impl SourcePage {
    /// Interpret a loosely-typed page value: integers and numeric strings
    /// become pages, anything else the sentinel.
    pub fn from_json(value: Option<&serde_json::Value>) -> Self {
        match value {
            Some(serde_json::Value::Number(n)) => n
                .as_u64()
                .and_then(|n| u32::try_from(n).ok())
                .map(SourcePage::Page)
                .unwrap_or(SourcePage::Unknown),
            Some(serde_json::Value::String(s)) => s
                .trim()
                .parse::<u32>()
                .map(SourcePage::Page)
                .unwrap_or(SourcePage::Unknown),
            _ => SourcePage::Unknown,
        }
    }
}

impl Serialize for SourcePage {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        match self {
            SourcePage::Page(n) => s.serialize_u32(*n),
            SourcePage::Unknown => s.serialize_str("unknown"),
        }
    }
}

impl<'de> Deserialize<'de> for SourcePage {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let value = serde_json::Value::deserialize(d)?;
        Ok(SourcePage::from_json(Some(&value)))
    }
}

/// Cited pages per filename, ordered by filename.
pub type SourceMap = BTreeMap<String, Vec<SourcePage>>;

/// Group `(filename, page)` pairs into a [`SourceMap`].
pub fn group_sources<I, S>(pairs: I) -> SourceMap
where
    I: IntoIterator<Item = (S, SourcePage)>,
    S: Into<String>,
{
    let mut map = SourceMap::new();
    for (filename, page) in pairs {
        map.entry(filename.into()).or_default().push(page);
    }
    for pages in map.values_mut() {
        pages.sort();
        pages.dedup();
    }
    map
}

/// Sources cited by a set of retrieved chunks.
pub fn collect_sources(chunks: &[ScoredChunk]) -> SourceMap {
    group_sources(
        chunks
            .iter()
            .map(|c| (c.chunk.filename.clone(), SourcePage::Page(c.chunk.page))),
    )
}

/// Sources from loose JSON metadata objects carrying `source` and `page` keys,
/// as produced by external index backends.
pub fn collect_sources_from_metadata(metadata: &[serde_json::Value]) -> SourceMap {
    group_sources(metadata.iter().map(|m| {
        let filename = m
            .get("source")
            .and_then(|s| s.as_str())
            .filter(|s| !s.is_empty())
            .unwrap_or(UNKNOWN_SOURCE)
            .to_string();
        (filename, SourcePage::from_json(m.get("page")))
    }))
}

/// Render a source map as `file — Pages: 1, 2` lines.
pub fn format_sources(sources: &SourceMap) -> Vec<String> {
    sources
        .iter()
        .map(|(file, pages)| {
            let pages = pages
                .iter()
                .map(|p| p.to_string())
                .collect::<Vec<_>>()
                .join(", ");
            format!("{} — Pages: {}", file, pages)
        })
        .collect()
}
