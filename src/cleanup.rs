//! Best-effort spacing cleanup for DOCX files produced by the PDF→DOCX
//! engines. Edits are spliced into the original `word/document.xml` text by
//! byte range so everything the pass does not touch is preserved verbatim.

use std::fs::File;
use std::io::Write;
use std::ops::Range;
use std::path::Path;

use zip::write::SimpleFileOptions;

use crate::docx::{WML_NS, collect_block_nodes, is_wml, read_zip_text, wml};
use crate::error::Error;

const DOCUMENT_PART: &str = "word/document.xml";
/// Consecutive blank paragraphs kept before the rest are dropped.
const MAX_BLANK_RUN: usize = 2;
/// Spacing thresholds and replacements in twips (72pt = 1440).
const SPACING_LIMIT: i64 = 1440;
const CLAMPED_BEFORE: &str = "360";
const CLAMPED_AFTER: &str = "160";
/// Only this many leading paragraphs are scanned for stray page breaks.
const PAGE_BREAK_SCAN: usize = 10;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CleanupOutcome {
    Applied {
        removed_paragraphs: usize,
        clamped: usize,
        page_breaks_removed: usize,
    },
    /// The file was left untouched.
    Skipped(String),
}

#[derive(Debug, Default, PartialEq, Eq)]
struct CleanupStats {
    removed_paragraphs: usize,
    clamped: usize,
    page_breaks_removed: usize,
}

impl CleanupStats {
    fn is_empty(&self) -> bool {
        *self == CleanupStats::default()
    }
}

fn is_blank(para: roxmltree::Node) -> bool {
    let has_graphic = para
        .descendants()
        .any(|n| is_wml(n, "drawing") || is_wml(n, "pict"));
    if has_graphic {
        return false;
    }
    para.descendants()
        .filter(|n| is_wml(*n, "t"))
        .filter_map(|n| n.text())
        .all(|t| t.trim().is_empty())
}

/// Replace the value of the `prefix:local` attribute inside raw element text.
fn replace_attr_value(element: &str, local: &str, value: &str) -> Option<String> {
    let pattern = format!(":{local}=");
    let name_at = element.find(&pattern)?;
    let quote_at = name_at + pattern.len();
    let quote = element[quote_at..].chars().next()?;
    if quote != '"' && quote != '\'' {
        return None;
    }
    let value_start = quote_at + 1;
    let value_len = element[value_start..].find(quote)?;
    Some(format!(
        "{}{}{}",
        &element[..value_start],
        value,
        &element[value_start + value_len..]
    ))
}

fn spacing_edit(
    xml: &str,
    para: roxmltree::Node,
    stats: &mut CleanupStats,
) -> Option<(Range<usize>, String)> {
    let spacing = wml(para, "pPr").and_then(|ppr| wml(ppr, "spacing"))?;
    let exceeds = |attr: &str| {
        spacing
            .attribute((WML_NS, attr))
            .and_then(|v| v.parse::<i64>().ok())
            .is_some_and(|twips| twips > SPACING_LIMIT)
    };
    let range = spacing.range();
    let mut element = xml[range.clone()].to_string();
    let mut changed = false;
    for (attr, clamped) in [("before", CLAMPED_BEFORE), ("after", CLAMPED_AFTER)] {
        if exceeds(attr) {
            if let Some(updated) = replace_attr_value(&element, attr, clamped) {
                element = updated;
                changed = true;
                stats.clamped += 1;
            }
        }
    }
    changed.then_some((range, element))
}

/// Apply the cleanup rules to document XML, returning the rewritten text.
fn clean_document_xml(xml: &str) -> Result<(String, CleanupStats), Error> {
    let doc = roxmltree::Document::parse(xml)?;
    let body = wml(doc.root_element(), "body")
        .ok_or_else(|| Error::InvalidDocx("missing w:body".into()))?;
    let paragraphs: Vec<roxmltree::Node> = collect_block_nodes(body)
        .into_iter()
        .filter(|n| is_wml(*n, "p"))
        .collect();

    let mut stats = CleanupStats::default();
    let mut edits: Vec<(Range<usize>, String)> = Vec::new();
    let mut kept: Vec<(roxmltree::Node, bool)> = Vec::new();

    let mut blank_run = 0usize;
    for para in paragraphs {
        let blank = is_blank(para);
        if blank {
            blank_run += 1;
            if blank_run > MAX_BLANK_RUN {
                edits.push((para.range(), String::new()));
                stats.removed_paragraphs += 1;
                continue;
            }
        } else {
            blank_run = 0;
        }
        kept.push((para, blank));
    }

    for &(para, _) in &kept {
        if let Some(edit) = spacing_edit(xml, para, &mut stats) {
            edits.push(edit);
        }
    }

    for &(para, blank) in kept.iter().take(PAGE_BREAK_SCAN) {
        if !blank {
            continue;
        }
        for br in para.descendants().filter(|n| {
            is_wml(*n, "br")
                && n.attribute((WML_NS, "type")) == Some("page")
                && n.parent().is_some_and(|p| is_wml(p, "r"))
        }) {
            edits.push((br.range(), String::new()));
            stats.page_breaks_removed += 1;
        }
    }

    edits.sort_by_key(|(range, _)| range.start);
    let mut out = String::with_capacity(xml.len());
    let mut pos = 0;
    for (range, replacement) in edits {
        if range.start < pos {
            continue;
        }
        out.push_str(&xml[pos..range.start]);
        out.push_str(&replacement);
        pos = range.end;
    }
    out.push_str(&xml[pos..]);
    Ok((out, stats))
}

fn rewrite_document_part(path: &Path, document_xml: &str) -> Result<(), Error> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    let mut temp = tempfile::NamedTempFile::new_in(dir)?;
    {
        let mut archive = zip::ZipArchive::new(File::open(path)?)?;
        let mut writer = zip::ZipWriter::new(temp.as_file_mut());
        let options =
            SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);
        for i in 0..archive.len() {
            let entry = archive.by_index_raw(i)?;
            if entry.name() == DOCUMENT_PART {
                drop(entry);
                writer.start_file(DOCUMENT_PART, options)?;
                writer.write_all(document_xml.as_bytes())?;
            } else {
                writer.raw_copy_file(entry)?;
            }
        }
        writer.finish()?;
    }
    temp.persist(path).map_err(|e| Error::Io(e.error))?;
    Ok(())
}

fn try_cleanup(path: &Path) -> Result<CleanupStats, Error> {
    let xml = {
        let mut archive = zip::ZipArchive::new(File::open(path)?)?;
        read_zip_text(&mut archive, DOCUMENT_PART)
            .ok_or_else(|| Error::InvalidDocx(format!("{DOCUMENT_PART} not found")))?
    };
    let (cleaned, stats) = clean_document_xml(&xml)?;
    if !stats.is_empty() {
        rewrite_document_part(path, &cleaned)?;
    }
    Ok(stats)
}

/// Collapse runs of blank paragraphs, clamp runaway spacing and drop stray
/// page breaks near the top of a DOCX file, in place. Never fails: on any
/// error the file is left as it was and the reason is reported.
pub fn cleanup_docx_spacing(path: &Path) -> CleanupOutcome {
    match try_cleanup(path) {
        Ok(stats) => {
            log::debug!(
                "cleanup of {}: removed {} paragraphs, clamped {} spacings, removed {} page breaks",
                path.display(),
                stats.removed_paragraphs,
                stats.clamped,
                stats.page_breaks_removed
            );
            CleanupOutcome::Applied {
                removed_paragraphs: stats.removed_paragraphs,
                clamped: stats.clamped,
                page_breaks_removed: stats.page_breaks_removed,
            }
        }
        Err(e) => {
            log::warn!("spacing cleanup skipped for {}: {e}", path.display());
            CleanupOutcome::Skipped(e.to_string())
        }
    }
}
