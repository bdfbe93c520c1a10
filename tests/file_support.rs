//! PDF and text ingestion: per-page extraction, skipped files, and the
//! `chunks` command over a folder of mixed documents.

use docqa::extract::{extract_pages, DocumentKind};
use docqa::ingest::{extract_uploads, read_uploads, Upload};
use docqa::progress::NoProgress;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};
use std::fs;
use std::path::Path;
use std::process::Command;
use tempfile::TempDir;

fn docqa_binary() -> std::path::PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop();
    path.pop();
    path.push("docqa");
    path
}

/// Minimal valid PDF containing the text "docqa test phrase".
/// Builds body then xref with correct byte offsets so pdf-extract can parse it.
fn minimal_pdf_with_phrase() -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(b"%PDF-1.4\n");
    let o1 = out.len();
    out.extend_from_slice(b"1 0 obj << /Type /Catalog /Pages 2 0 R >> endobj\n");
    let o2 = out.len();
    out.extend_from_slice(b"2 0 obj << /Type /Pages /Kids [3 0 R] /Count 1 >> endobj\n");
    let o3 = out.len();
    out.extend_from_slice(b"3 0 obj << /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Contents 4 0 R /Resources << /Font << /F1 5 0 R >> >> >> endobj\n");
    let o4 = out.len();
    out.extend_from_slice(b"4 0 obj << /Length 49 >> stream\nBT /F1 12 Tf 100 700 Td (docqa test phrase) Tj ET\nendstream endobj\n");
    let o5 = out.len();
    out.extend_from_slice(
        b"5 0 obj << /Type /Font /Subtype /Type1 /BaseFont /Helvetica >> endobj\n",
    );
    let xref_start = out.len();
    out.extend_from_slice(b"xref\n0 6\n");
    out.extend_from_slice(format!("{:010} 65535 f \n", 0).as_bytes());
    for offset in [o1, o2, o3, o4, o5] {
        out.extend_from_slice(format!("{:010} 00000 n \n", offset).as_bytes());
    }
    out.extend_from_slice(b"trailer << /Size 6 /Root 1 0 R >>\nstartxref\n");
    out.extend_from_slice(format!("{}\n", xref_start).as_bytes());
    out.extend_from_slice(b"%%EOF\n");
    out
}

/// PDF with one page per entry of `pages`, each showing that text.
fn pdf_with_pages(pages: &[&str]) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! {
            "F1" => font_id,
        },
    });

    let mut kids: Vec<Object> = Vec::new();
    for text in pages {
        let content = Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 14.into()]),
                Operation::new("Td", vec![72.into(), 720.into()]),
                Operation::new("Tj", vec![Object::string_literal(*text)]),
                Operation::new("ET", vec![]),
            ],
        };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
        });
        kids.push(page_id.into());
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut out = Vec::new();
    doc.save_to(&mut out).unwrap();
    out
}

fn run_docqa(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = docqa_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run docqa binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

#[test]
fn file_support_minimal_pdf_text() {
    let pages = extract_pages(&minimal_pdf_with_phrase(), DocumentKind::Pdf).unwrap();
    assert_eq!(pages.len(), 1);
    assert_eq!(pages[0].0, 1);
    assert!(pages[0].1.contains("docqa test phrase"), "got {:?}", pages[0].1);
}

#[test]
fn file_support_pages_numbered_from_one() {
    let bytes = pdf_with_pages(&["first page words", "second page words"]);
    let pages = extract_pages(&bytes, DocumentKind::Pdf).unwrap();
    assert_eq!(pages.len(), 2);
    assert_eq!(pages[0].0, 1);
    assert!(pages[0].1.contains("first page words"));
    assert_eq!(pages[1].0, 2);
    assert!(pages[1].1.contains("second page words"));
}

#[test]
fn file_support_page_records_carry_filename() {
    let uploads = vec![
        Upload::new("two.pdf", pdf_with_pages(&["alpha", "beta"])),
        Upload::new("notes.txt", b"gamma".to_vec()),
    ];
    let ingested = extract_uploads(&uploads, false, &NoProgress);
    let tags: Vec<(&str, u32)> = ingested
        .pages
        .iter()
        .map(|p| (p.filename.as_str(), p.page))
        .collect();
    assert_eq!(tags, vec![("two.pdf", 1), ("two.pdf", 2), ("notes.txt", 1)]);
    assert!(ingested.skipped.is_empty());
}

#[test]
fn file_support_skipped_on_failure() {
    let uploads = vec![
        Upload::new("broken.pdf", b"%PDF-1.4 truncated".to_vec()),
        Upload::new("deck.pptx", vec![0u8; 16]),
        Upload::new("ok.txt", b"still indexed".to_vec()),
    ];
    let ingested = extract_uploads(&uploads, false, &NoProgress);
    let skipped: Vec<&str> = ingested.skipped.iter().map(|s| s.filename.as_str()).collect();
    assert_eq!(skipped, vec!["broken.pdf", "deck.pptx"]);
    assert_eq!(ingested.pages.len(), 1);
    assert_eq!(ingested.pages[0].text, "still indexed");
}

#[test]
fn file_support_folder_scan() {
    let tmp = TempDir::new().unwrap();
    let docs = tmp.path().join("docs");
    fs::create_dir_all(docs.join("nested")).unwrap();
    fs::write(docs.join("a.txt"), "a").unwrap();
    fs::write(docs.join("b.PDF"), pdf_with_pages(&["b"])).unwrap();
    fs::write(docs.join("c.md"), "ignored").unwrap();
    fs::write(docs.join("nested").join("d.txt"), "d").unwrap();

    let flat = read_uploads(&[docs.clone()], false).unwrap();
    let names: Vec<&str> = flat.iter().map(|u| u.filename.as_str()).collect();
    assert_eq!(names, vec!["a.txt", "b.PDF"]);

    let deep = read_uploads(&[docs.clone()], true).unwrap();
    assert_eq!(deep.len(), 3);

    assert!(read_uploads(&[tmp.path().join("missing")], false).is_err());
}

#[test]
fn file_support_chunks_command() {
    let tmp = TempDir::new().unwrap();
    let docs = tmp.path().join("docs");
    fs::create_dir_all(&docs).unwrap();
    fs::write(docs.join("long.txt"), "x".repeat(2500)).unwrap();
    fs::write(docs.join("paper.pdf"), pdf_with_pages(&["one", "two"])).unwrap();
    let config_path = tmp.path().join("docqa.toml");
    fs::write(&config_path, "[chunking]\nsize = 1000\noverlap = 100\n").unwrap();

    let (stdout, stderr, success) = run_docqa(&config_path, &["chunks", docs.to_str().unwrap()]);
    assert!(success, "chunks failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("long.txt"));
    assert!(stdout.contains("paper.pdf"));
    assert!(stdout.contains("Total chunks: 5"), "stdout={}", stdout);
}

#[test]
fn file_support_chunks_empty_folder() {
    let tmp = TempDir::new().unwrap();
    let config_path = tmp.path().join("docqa.toml");
    fs::write(&config_path, "").unwrap();

    let (stdout, _, success) = run_docqa(&config_path, &["chunks", tmp.path().to_str().unwrap()]);
    assert!(success);
    assert!(stdout.contains("No PDF or TXT files found"));
}
