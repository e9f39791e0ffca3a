mod styles;

use std::collections::HashMap;
use std::io::{Cursor, Read, Seek};
use std::path::Path;

use crate::error::Error;
use crate::model::{
    Alignment, Cell, ImageRef, MediaPart, MergeSpan, Paragraph, Run, SourceBlock, SourceDocument,
    TableModel,
};

use styles::{StyleNames, paragraph_style_id, parse_style_names};

pub(crate) const WML_NS: &str = "http://schemas.openxmlformats.org/wordprocessingml/2006/main";
const DML_NS: &str = "http://schemas.openxmlformats.org/drawingml/2006/main";
const WPD_NS: &str = "http://schemas.openxmlformats.org/drawingml/2006/wordprocessingDrawing";
const REL_NS: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";

pub(crate) fn parse_hex_color(val: &str) -> Option<[u8; 3]> {
    if val == "auto" || val.len() != 6 || !val.is_ascii() {
        return None;
    }
    let r = u8::from_str_radix(&val[0..2], 16).ok()?;
    let g = u8::from_str_radix(&val[2..4], 16).ok()?;
    let b = u8::from_str_radix(&val[4..6], 16).ok()?;
    Some([r, g, b])
}

/// Parse a WML boolean toggle element (e.g., w:b, w:i).
/// Present with no val or val != "0"/"false" means true.
fn wml_bool(parent: roxmltree::Node, name: &str) -> Option<bool> {
    wml(parent, name).map(|n| {
        n.attribute((WML_NS, "val"))
            .is_none_or(|v| v != "0" && v != "false")
    })
}

pub(crate) fn wml<'a>(node: roxmltree::Node<'a, 'a>, name: &str) -> Option<roxmltree::Node<'a, 'a>> {
    node.children()
        .find(|n| n.tag_name().name() == name && n.tag_name().namespace() == Some(WML_NS))
}

fn wml_attr<'a>(node: roxmltree::Node<'a, 'a>, child: &str) -> Option<&'a str> {
    wml(node, child).and_then(|n| n.attribute((WML_NS, "val")))
}

pub(crate) fn is_wml(node: roxmltree::Node, name: &str) -> bool {
    node.tag_name().name() == name && node.tag_name().namespace() == Some(WML_NS)
}

fn parse_alignment(val: &str) -> Alignment {
    match val {
        "center" => Alignment::Center,
        "right" | "end" => Alignment::Right,
        "both" | "distribute" => Alignment::Justify,
        _ => Alignment::Left,
    }
}

/// Flatten SDT wrappers: descend into w:sdtContent and collect effective children.
pub(crate) fn collect_block_nodes<'a>(
    parent: roxmltree::Node<'a, 'a>,
) -> Vec<roxmltree::Node<'a, 'a>> {
    let mut nodes = Vec::new();
    for child in parent.children() {
        if is_wml(child, "sdt") {
            if let Some(content) = wml(child, "sdtContent") {
                nodes.extend(collect_block_nodes(content));
            }
        } else {
            nodes.push(child);
        }
    }
    nodes
}

pub(crate) fn read_zip_text<R: Read + Seek>(
    zip: &mut zip::ZipArchive<R>,
    name: &str,
) -> Option<String> {
    let mut content = String::new();
    zip.by_name(name).ok()?.read_to_string(&mut content).ok()?;
    Some(content)
}

fn read_zip_bytes<R: Read + Seek>(zip: &mut zip::ZipArchive<R>, name: &str) -> Option<Vec<u8>> {
    let mut data = Vec::new();
    zip.by_name(name).ok()?.read_to_end(&mut data).ok()?;
    Some(data)
}

/// Relationship id -> target, internal targets only.
fn parse_rels_xml(xml_content: &str) -> HashMap<String, String> {
    let mut rels = HashMap::new();
    let Ok(xml) = roxmltree::Document::parse(xml_content) else {
        return rels;
    };
    for node in xml.root_element().children() {
        if node.tag_name().name() == "Relationship"
            && node.attribute("TargetMode") != Some("External")
            && let (Some(id), Some(target)) = (node.attribute("Id"), node.attribute("Target"))
        {
            rels.insert(id.to_string(), target.to_string());
        }
    }
    rels
}

/// Zip entry name for a relationship target of `word/document.xml`.
fn resolve_target(target: &str) -> String {
    if let Some(absolute) = target.strip_prefix('/') {
        return absolute.to_string();
    }
    let mut parts: Vec<&str> = vec!["word"];
    for segment in target.split('/') {
        match segment {
            ".." => {
                parts.pop();
            }
            "." | "" => {}
            s => parts.push(s),
        }
    }
    parts.join("/")
}

/// `[Content_Types].xml`: extension defaults and per-part overrides.
#[derive(Default)]
struct ContentTypes {
    defaults: HashMap<String, String>,
    overrides: HashMap<String, String>,
}

impl ContentTypes {
    fn parse(xml_content: Option<&str>) -> Self {
        let mut types = ContentTypes::default();
        let Some(Ok(xml)) = xml_content.map(roxmltree::Document::parse) else {
            return types;
        };
        for node in xml.root_element().children() {
            let Some(content_type) = node.attribute("ContentType") else {
                continue;
            };
            match node.tag_name().name() {
                "Default" => {
                    if let Some(ext) = node.attribute("Extension") {
                        types
                            .defaults
                            .insert(ext.to_ascii_lowercase(), content_type.to_string());
                    }
                }
                "Override" => {
                    if let Some(part) = node.attribute("PartName") {
                        types.overrides.insert(
                            part.trim_start_matches('/').to_string(),
                            content_type.to_string(),
                        );
                    }
                }
                _ => {}
            }
        }
        types
    }

    fn lookup(&self, part: &str) -> String {
        if let Some(ct) = self.overrides.get(part) {
            return ct.clone();
        }
        let ext = part
            .rsplit_once('.')
            .map(|(_, e)| e.to_ascii_lowercase())
            .unwrap_or_default();
        self.defaults
            .get(&ext)
            .cloned()
            .unwrap_or_else(|| format!("image/{ext}"))
    }
}

/// Runs of a paragraph in document order, descending through hyperlinks,
/// content controls and tracked insertions. Deleted text is skipped.
fn collect_run_nodes<'a>(parent: roxmltree::Node<'a, 'a>, out: &mut Vec<roxmltree::Node<'a, 'a>>) {
    for child in parent.children() {
        if child.tag_name().namespace() != Some(WML_NS) {
            continue;
        }
        match child.tag_name().name() {
            "r" => out.push(child),
            "hyperlink" | "smartTag" | "ins" | "fldSimple" => collect_run_nodes(child, out),
            "sdt" => {
                if let Some(content) = wml(child, "sdtContent") {
                    collect_run_nodes(content, out);
                }
            }
            _ => {}
        }
    }
}

fn parse_run(run_node: roxmltree::Node, images: &mut Vec<ImageRef>) -> Run {
    let rpr = wml(run_node, "rPr");
    let bold = rpr.and_then(|n| wml_bool(n, "b")).unwrap_or(false);
    let italic = rpr.and_then(|n| wml_bool(n, "i")).unwrap_or(false);
    let underline = rpr
        .and_then(|n| wml(n, "u"))
        .is_some_and(|u| u.attribute((WML_NS, "val")).is_none_or(|v| v != "none"));
    let font_size = rpr
        .and_then(|n| wml_attr(n, "sz"))
        .and_then(|v| v.parse::<f32>().ok())
        .map(|hp| hp / 2.0);
    let color = rpr
        .and_then(|n| wml_attr(n, "color"))
        .and_then(parse_hex_color);

    let mut text = String::new();
    for child in run_node.children() {
        if child.tag_name().namespace() != Some(WML_NS) {
            continue;
        }
        match child.tag_name().name() {
            "t" => {
                if let Some(t) = child.text() {
                    text.push_str(t);
                }
            }
            "tab" => text.push('\t'),
            "cr" => text.push('\n'),
            "br" => match child.attribute((WML_NS, "type")) {
                Some("page") | Some("column") => {}
                _ => text.push('\n'),
            },
            "noBreakHyphen" => text.push('-'),
            "drawing" => images.extend(drawing_images(child)),
            _ => {}
        }
    }

    Run {
        text,
        bold,
        italic,
        underline,
        font_size,
        color,
    }
}

/// Image references of one `w:drawing`, each with its own declared extent.
fn drawing_images(drawing: roxmltree::Node) -> Vec<ImageRef> {
    let mut images = Vec::new();
    for container in drawing.children() {
        let name = container.tag_name().name();
        if (name != "inline" && name != "anchor") || container.tag_name().namespace() != Some(WPD_NS)
        {
            continue;
        }
        let extent = container
            .children()
            .find(|n| n.tag_name().name() == "extent" && n.tag_name().namespace() == Some(WPD_NS))
            .and_then(|n| {
                let cx = n.attribute("cx")?.parse::<u64>().ok()?;
                let cy = n.attribute("cy")?.parse::<u64>().ok()?;
                Some((cx, cy))
            });
        for blip in container
            .descendants()
            .filter(|n| n.tag_name().name() == "blip" && n.tag_name().namespace() == Some(DML_NS))
        {
            if let Some(embed) = blip.attribute((REL_NS, "embed")) {
                images.push(ImageRef {
                    embed_id: embed.to_string(),
                    extent_emu: extent,
                });
            }
        }
    }
    images
}

fn parse_paragraph(node: roxmltree::Node, styles: &StyleNames) -> Paragraph {
    let alignment = wml(node, "pPr")
        .and_then(|ppr| wml_attr(ppr, "jc"))
        .map(parse_alignment)
        .unwrap_or_default();

    let mut run_nodes = Vec::new();
    collect_run_nodes(node, &mut run_nodes);

    let mut images = Vec::new();
    let runs = run_nodes
        .into_iter()
        .map(|r| parse_run(r, &mut images))
        .filter(|r| !r.text.is_empty())
        .collect();

    Paragraph {
        style_name: styles.display_name(paragraph_style_id(node)),
        runs,
        alignment,
        images,
    }
}

/// Cell text is the text of its paragraphs joined by newlines.
fn cell_text(tc: roxmltree::Node, styles: &StyleNames) -> String {
    collect_block_nodes(tc)
        .into_iter()
        .filter(|n| is_wml(*n, "p"))
        .map(|p| parse_paragraph(p, styles).text())
        .collect::<Vec<_>>()
        .join("\n")
}

#[derive(Clone, Copy, PartialEq)]
enum VMerge {
    None,
    Restart,
    Continue,
}

/// Open vertical merge anchored at (first_row, first_col).
struct VerticalRun {
    first_row: usize,
    first_col: usize,
    last_col: usize,
    last_row: usize,
}

impl VerticalRun {
    fn close(self, merges: &mut Vec<MergeSpan>) {
        let span = MergeSpan {
            first_row: self.first_row,
            first_col: self.first_col,
            last_row: self.last_row,
            last_col: self.last_col,
        };
        if !span.is_single_cell() {
            merges.push(span);
        }
    }
}

fn parse_table(node: roxmltree::Node, styles: &StyleNames) -> TableModel {
    let mut rows = Vec::new();
    let mut merges = Vec::new();
    let mut open: HashMap<usize, VerticalRun> = HashMap::new();

    let tr_nodes = collect_block_nodes(node)
        .into_iter()
        .filter(|n| is_wml(*n, "tr"));
    for (ri, tr) in tr_nodes.enumerate() {
        let grid_before = wml(tr, "trPr")
            .and_then(|pr| wml_attr(pr, "gridBefore"))
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(0);
        let mut cells: Vec<Cell> = vec![Cell::default(); grid_before];

        for tc in collect_block_nodes(tr).into_iter().filter(|n| is_wml(*n, "tc")) {
            let col = cells.len();
            let tc_pr = wml(tc, "tcPr");
            let span = tc_pr
                .and_then(|pr| wml_attr(pr, "gridSpan"))
                .and_then(|v| v.parse::<usize>().ok())
                .unwrap_or(1)
                .max(1);
            let v_merge = match tc_pr.and_then(|pr| wml(pr, "vMerge")) {
                Some(n) => match n.attribute((WML_NS, "val")) {
                    Some("restart") => VMerge::Restart,
                    _ => VMerge::Continue,
                },
                None => VMerge::None,
            };

            if v_merge == VMerge::Continue
                && let Some(run) = open.get_mut(&col).filter(|run| run.last_row + 1 == ri)
            {
                run.last_row = ri;
                cells.resize(col + span, Cell::default());
                continue;
            }
            if let Some(run) = open.remove(&col) {
                run.close(&mut merges);
            }

            let background = tc_pr
                .and_then(|pr| wml(pr, "shd"))
                .and_then(|shd| shd.attribute((WML_NS, "fill")))
                .and_then(parse_hex_color);
            cells.push(Cell {
                text: cell_text(tc, styles),
                background,
                bold: false,
                alignment: None,
            });
            cells.resize(col + span, Cell::default());

            if v_merge == VMerge::Restart {
                open.insert(
                    col,
                    VerticalRun {
                        first_row: ri,
                        first_col: col,
                        last_col: col + span - 1,
                        last_row: ri,
                    },
                );
            } else if span > 1 {
                merges.push(MergeSpan {
                    first_row: ri,
                    first_col: col,
                    last_row: ri,
                    last_col: col + span - 1,
                });
            }
        }

        // A row without a continuation cell ends the runs it skipped.
        let stale: Vec<usize> = open
            .iter()
            .filter(|(_, run)| run.last_row != ri)
            .map(|(&c, _)| c)
            .collect();
        for c in stale {
            if let Some(run) = open.remove(&c) {
                run.close(&mut merges);
            }
        }
        rows.push(cells);
    }

    for (_, run) in open {
        run.close(&mut merges);
    }
    merges.sort_by_key(|m| (m.first_row, m.first_col));
    TableModel { rows, merges }
}

fn parse_archive<R: Read + Seek>(zip: &mut zip::ZipArchive<R>) -> Result<SourceDocument, Error> {
    let xml_content = read_zip_text(zip, "word/document.xml").ok_or_else(|| {
        Error::InvalidDocx("missing word/document.xml (is this a DOCX file?)".into())
    })?;
    let styles = parse_style_names(read_zip_text(zip, "word/styles.xml").as_deref());
    let rels = read_zip_text(zip, "word/_rels/document.xml.rels")
        .map(|xml| parse_rels_xml(&xml))
        .unwrap_or_default();
    let content_types = ContentTypes::parse(read_zip_text(zip, "[Content_Types].xml").as_deref());

    let xml = roxmltree::Document::parse(&xml_content)?;
    let body = wml(xml.root_element(), "body")
        .ok_or_else(|| Error::InvalidDocx("missing w:body".into()))?;

    let mut blocks = Vec::new();
    for node in collect_block_nodes(body) {
        if node.tag_name().namespace() != Some(WML_NS) {
            continue;
        }
        match node.tag_name().name() {
            "p" => blocks.push(SourceBlock::Paragraph(parse_paragraph(node, &styles))),
            "tbl" => blocks.push(SourceBlock::Table(parse_table(node, &styles))),
            _ => {}
        }
    }

    let mut media = HashMap::new();
    for block in &blocks {
        let SourceBlock::Paragraph(para) = block else {
            continue;
        };
        for image in &para.images {
            if media.contains_key(&image.embed_id) {
                continue;
            }
            let Some(target) = rels.get(&image.embed_id) else {
                log::debug!("no relationship for image {}", image.embed_id);
                continue;
            };
            let part = resolve_target(target);
            match read_zip_bytes(zip, &part) {
                Some(data) => {
                    let content_type = content_types.lookup(&part);
                    media.insert(image.embed_id.clone(), MediaPart { data, content_type });
                }
                None => log::debug!("image part {part} missing from package"),
            }
        }
    }

    Ok(SourceDocument { blocks, media })
}

pub fn parse(path: &Path) -> Result<SourceDocument, Error> {
    let file = std::fs::File::open(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound | std::io::ErrorKind::PermissionDenied => Error::Io(
            std::io::Error::new(e.kind(), format!("{}: {}", e, path.display())),
        ),
        _ => Error::Io(e),
    })?;
    let mut zip = zip::ZipArchive::new(file)
        .map_err(|_| Error::InvalidDocx("file is not a ZIP archive".into()))?;
    parse_archive(&mut zip)
}

pub fn parse_bytes(bytes: &[u8]) -> Result<SourceDocument, Error> {
    let mut zip = zip::ZipArchive::new(Cursor::new(bytes))
        .map_err(|_| Error::InvalidDocx("data is not a ZIP archive".into()))?;
    parse_archive(&mut zip)
}
