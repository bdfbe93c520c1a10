//! Document ingestion: uploads in, page records out.
//!
//! Files of an unsupported kind, duplicate names, and files whose text cannot
//! be extracted are skipped with a warning; the remaining files continue.

use anyhow::{Context, Result};
use docqa_core::chunk::collapse_whitespace;
use docqa_core::error::QaError;
use docqa_core::models::PageRecord;
use serde::Serialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::warn;
use walkdir::WalkDir;

use crate::extract::{extract_pages, DocumentKind};
use crate::progress::{BuildProgressEvent, BuildProgressReporter};

/// An uploaded document: its name and raw bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Upload {
    pub filename: String,
    pub bytes: Vec<u8>,
}

impl Upload {
    pub fn new(filename: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            filename: filename.into(),
            bytes,
        }
    }

    /// Read a file from disk, naming the upload after the file name.
    pub fn from_path(path: &Path) -> Result<Self> {
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .with_context(|| format!("not a file path: {}", path.display()))?;
        let bytes =
            std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
        Ok(Self { filename, bytes })
    }
}

/// A file that contributed nothing to the index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedFile {
    pub filename: String,
    pub reason: String,
}

/// Extracted pages of a batch of uploads.
#[derive(Debug, Default)]
pub struct Ingested {
    pub pages: Vec<PageRecord>,
    pub skipped: Vec<SkippedFile>,
}

/// Extract page records from `uploads`, in upload order.
pub fn extract_uploads(
    uploads: &[Upload],
    collapse: bool,
    progress: &dyn BuildProgressReporter,
) -> Ingested {
    let mut out = Ingested::default();
    let mut seen = HashSet::new();
    let total = uploads.len() as u64;

    for (i, upload) in uploads.iter().enumerate() {
        progress.report(BuildProgressEvent::Extracting {
            filename: upload.filename.clone(),
            n: i as u64 + 1,
            total,
        });

        if !seen.insert(upload.filename.as_str()) {
            skip(&mut out, &upload.filename, "duplicate file name");
            continue;
        }
        let Some(kind) = DocumentKind::from_filename(&upload.filename) else {
            skip(&mut out, &upload.filename, "unsupported file type");
            continue;
        };
        match extract_pages(&upload.bytes, kind) {
            Ok(pages) => {
                out.pages.extend(pages.into_iter().map(|(page, text)| {
                    let text = if collapse {
                        collapse_whitespace(&text)
                    } else {
                        text
                    };
                    PageRecord::new(upload.filename.clone(), page, text)
                }));
            }
            Err(e) => skip(&mut out, &upload.filename, &e.to_string()),
        }
    }

    out
}

/// File names of `uploads` in upload order, each name once.
///
/// Later uploads reusing a name are dropped, matching what
/// [`extract_uploads`] indexes.
pub fn upload_names(uploads: &[Upload]) -> Vec<String> {
    let mut seen = HashSet::new();
    uploads
        .iter()
        .filter(|u| seen.insert(u.filename.as_str()))
        .map(|u| u.filename.clone())
        .collect()
}

fn skip(out: &mut Ingested, filename: &str, reason: &str) {
    let err = QaError::Ingestion {
        filename: filename.to_string(),
        message: reason.to_string(),
    };
    warn!("{}", err);
    out.skipped.push(SkippedFile {
        filename: filename.to_string(),
        reason: reason.to_string(),
    });
}

/// Expand `paths` into the files to upload.
///
/// Files are kept as given (an unsupported kind is reported later as
/// skipped). Directories contribute their `.pdf` and `.txt` files, sorted by
/// path; subdirectories are only entered when `recursive` is set.
pub fn collect_files(paths: &[PathBuf], recursive: bool) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for path in paths {
        if path.is_dir() {
            let mut found = Vec::new();
            let walker = WalkDir::new(path).max_depth(if recursive { usize::MAX } else { 1 });
            for entry in walker {
                let entry = entry?;
                if !entry.file_type().is_file() {
                    continue;
                }
                let name = entry.file_name().to_string_lossy();
                if DocumentKind::from_filename(&name).is_some() {
                    found.push(entry.into_path());
                }
            }
            found.sort();
            files.extend(found);
        } else if path.is_file() {
            files.push(path.clone());
        } else {
            anyhow::bail!("No such file or directory: {}", path.display());
        }
    }
    Ok(files)
}

/// Read every file under `paths` into uploads.
pub fn read_uploads(paths: &[PathBuf], recursive: bool) -> Result<Vec<Upload>> {
    collect_files(paths, recursive)?
        .iter()
        .map(|p| Upload::from_path(p))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::NoProgress;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_mixed_uploads_skip_bad_files() {
        let uploads = vec![
            Upload::new("notes.txt", b"first file".to_vec()),
            Upload::new("slides.pptx", b"binary".to_vec()),
            Upload::new("broken.pdf", b"not a pdf".to_vec()),
            Upload::new("notes.txt", b"again".to_vec()),
            Upload::new("more.TXT", b"second file".to_vec()),
        ];
        let ingested = extract_uploads(&uploads, false, &NoProgress);
        let names: Vec<&str> = ingested.pages.iter().map(|p| p.filename.as_str()).collect();
        assert_eq!(names, vec!["notes.txt", "more.TXT"]);
        assert!(ingested.pages.iter().all(|p| p.page == 1));

        let skipped: Vec<(&str, &str)> = ingested
            .skipped
            .iter()
            .map(|s| (s.filename.as_str(), s.reason.as_str()))
            .collect();
        assert_eq!(skipped[0], ("slides.pptx", "unsupported file type"));
        assert_eq!(skipped[1].0, "broken.pdf");
        assert_eq!(skipped[2], ("notes.txt", "duplicate file name"));
    }

    #[test]
    fn test_collapse_whitespace_option() {
        let uploads = vec![Upload::new("a.txt", b"  lots \n\n of\tspace  ".to_vec())];
        let ingested = extract_uploads(&uploads, true, &NoProgress);
        assert_eq!(ingested.pages[0].text, "lots of space");
    }

    #[test]
    fn test_collect_files_filters_directories() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("b.txt"), "b").unwrap();
        fs::write(tmp.path().join("a.pdf"), "a").unwrap();
        fs::write(tmp.path().join("c.md"), "c").unwrap();
        fs::create_dir(tmp.path().join("nested")).unwrap();
        fs::write(tmp.path().join("nested").join("d.txt"), "d").unwrap();

        let names = |files: Vec<PathBuf>| {
            files
                .iter()
                .map(|f| f.file_name().unwrap().to_string_lossy().to_string())
                .collect::<Vec<_>>()
        };
        let flat = collect_files(&[tmp.path().to_path_buf()], false).unwrap();
        assert_eq!(names(flat), vec!["a.pdf", "b.txt"]);
        let deep = collect_files(&[tmp.path().to_path_buf()], true).unwrap();
        assert_eq!(names(deep), vec!["a.pdf", "b.txt", "d.txt"]);

        assert!(collect_files(&[tmp.path().join("missing")], false).is_err());
    }

    #[test]
    fn test_read_uploads_names_by_file() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("doc.txt"), "hello").unwrap();
        let uploads = read_uploads(&[tmp.path().join("doc.txt")], false).unwrap();
        assert_eq!(uploads, vec![Upload::new("doc.txt", b"hello".to_vec())]);
    }
}
