#![allow(dead_code)]

use std::io::{Cursor, Write};
use std::path::Path;

use zip::write::SimpleFileOptions;

pub const W_NS: &str = "http://schemas.openxmlformats.org/wordprocessingml/2006/main";
const R_NS: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";
const WP_NS: &str = "http://schemas.openxmlformats.org/drawingml/2006/wordprocessingDrawing";
const A_NS: &str = "http://schemas.openxmlformats.org/drawingml/2006/main";
const S_NS: &str = "http://schemas.openxmlformats.org/spreadsheetml/2006/main";

const EMU_PER_PT: u64 = 12_700;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn zip_bytes(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default();
    for (name, data) in entries {
        writer.start_file(*name, options).unwrap();
        writer.write_all(data).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

pub fn xml_escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// Body XML for one plain paragraph.
pub fn paragraph(style: Option<&str>, text: &str) -> String {
    let ppr = style
        .map(|s| format!(r#"<w:pPr><w:pStyle w:val="{s}"/></w:pPr>"#))
        .unwrap_or_default();
    format!(
        r#"<w:p>{ppr}<w:r><w:t xml:space="preserve">{}</w:t></w:r></w:p>"#,
        xml_escape(text)
    )
}

pub fn empty_paragraph() -> String {
    "<w:p/>".to_string()
}

/// Body XML for a table of plain text cells.
pub fn table(rows: &[&[&str]]) -> String {
    let mut xml = String::from("<w:tbl>");
    for row in rows {
        xml.push_str("<w:tr>");
        for cell in *row {
            xml.push_str(&format!("<w:tc>{}</w:tc>", paragraph(None, cell)));
        }
        xml.push_str("</w:tr>");
    }
    xml.push_str("</w:tbl>");
    xml
}

/// Minimal DOCX package assembled in memory.
#[derive(Default)]
pub struct DocxBuilder {
    body: String,
    images: Vec<(String, Vec<u8>)>,
}

impl DocxBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raw(mut self, xml: &str) -> Self {
        self.body.push_str(xml);
        self
    }

    pub fn paragraph(self, style: Option<&str>, text: &str) -> Self {
        self.raw(&paragraph(style, text))
    }

    /// A paragraph holding one inline PNG with the given display size in points.
    pub fn image(mut self, png: Vec<u8>, width_pt: u64, height_pt: u64) -> Self {
        let rid = format!("rIdImg{}", self.images.len() + 1);
        let (cx, cy) = (width_pt * EMU_PER_PT, height_pt * EMU_PER_PT);
        self.body.push_str(&format!(
            r#"<w:p><w:r><w:drawing><wp:inline><wp:extent cx="{cx}" cy="{cy}"/><a:graphic><a:graphicData><a:blip r:embed="{rid}"/></a:graphicData></a:graphic></wp:inline></w:drawing></w:r></w:p>"#
        ));
        self.images.push((rid, png));
        self
    }

    pub fn document_xml(&self) -> String {
        format!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><w:document xmlns:w="{W_NS}" xmlns:r="{R_NS}" xmlns:wp="{WP_NS}" xmlns:a="{A_NS}"><w:body>{}<w:sectPr/></w:body></w:document>"#,
            self.body
        )
    }

    pub fn bytes(&self) -> Vec<u8> {
        let content_types = r#"<?xml version="1.0" encoding="UTF-8"?><Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Default Extension="png" ContentType="image/png"/><Override PartName="/word/document.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml"/></Types>"#;
        let root_rels = r#"<?xml version="1.0" encoding="UTF-8"?><Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="word/document.xml"/></Relationships>"#;
        let mut doc_rels = String::from(
            r#"<?xml version="1.0" encoding="UTF-8"?><Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">"#,
        );
        for (i, (rid, _)) in self.images.iter().enumerate() {
            doc_rels.push_str(&format!(
                r#"<Relationship Id="{rid}" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/image" Target="media/image{}.png"/>"#,
                i + 1
            ));
        }
        doc_rels.push_str("</Relationships>");

        let document = self.document_xml();
        let media_names: Vec<String> = (1..=self.images.len())
            .map(|i| format!("word/media/image{i}.png"))
            .collect();
        let mut entries: Vec<(&str, &[u8])> = vec![
            ("[Content_Types].xml", content_types.as_bytes()),
            ("_rels/.rels", root_rels.as_bytes()),
            ("word/document.xml", document.as_bytes()),
            ("word/_rels/document.xml.rels", doc_rels.as_bytes()),
        ];
        for (name, (_, data)) in media_names.iter().zip(&self.images) {
            entries.push((name.as_str(), data.as_slice()));
        }
        zip_bytes(&entries)
    }

    pub fn write(&self, path: &Path) {
        std::fs::write(path, self.bytes()).unwrap();
    }
}

/// One worksheet of an XLSX package: inline-string cells and merged ranges.
pub struct TestSheet<'a> {
    pub name: &'a str,
    /// (cell reference, text, style index)
    pub cells: Vec<(&'a str, &'a str, Option<u32>)>,
    pub merges: Vec<&'a str>,
}

fn row_of(reference: &str) -> u32 {
    reference
        .trim_start_matches(|c: char| c.is_ascii_alphabetic())
        .parse()
        .unwrap()
}

fn sheet_xml(sheet: &TestSheet) -> String {
    let mut rows: std::collections::BTreeMap<u32, String> = Default::default();
    for (reference, text, style) in &sheet.cells {
        let s = style.map(|s| format!(r#" s="{s}""#)).unwrap_or_default();
        rows.entry(row_of(reference)).or_default().push_str(&format!(
            r#"<c r="{reference}" t="inlineStr"{s}><is><t>{}</t></is></c>"#,
            xml_escape(text)
        ));
    }
    let rows_xml: String = rows
        .iter()
        .map(|(r, cells)| format!(r#"<row r="{r}">{cells}</row>"#))
        .collect();
    let merges = if sheet.merges.is_empty() {
        String::new()
    } else {
        let inner: String = sheet
            .merges
            .iter()
            .map(|m| format!(r#"<mergeCell ref="{m}"/>"#))
            .collect();
        format!(r#"<mergeCells count="{}">{inner}</mergeCells>"#, sheet.merges.len())
    };
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?><worksheet xmlns="{S_NS}"><sheetData>{rows_xml}</sheetData>{merges}</worksheet>"#
    )
}

/// Styles with `s="1"` = bold on a solid orange fill, `s="2"` = centered.
pub const STYLES_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?><styleSheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><fonts count="2"><font/><font><b/></font></fonts><fills count="3"><fill><patternFill patternType="none"/></fill><fill><patternFill patternType="gray125"/></fill><fill><patternFill patternType="solid"><fgColor rgb="FFFFC000"/></patternFill></fill></fills><cellXfs count="3"><xf numFmtId="0" fontId="0" fillId="0"/><xf numFmtId="0" fontId="1" fillId="2"/><xf numFmtId="0" fontId="0" fillId="0"><alignment horizontal="center"/></xf></cellXfs></styleSheet>"#;

pub fn xlsx_bytes(sheets: &[TestSheet]) -> Vec<u8> {
    let content_types = r#"<?xml version="1.0" encoding="UTF-8"?><Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/></Types>"#;
    let mut workbook = format!(
        r#"<?xml version="1.0" encoding="UTF-8"?><workbook xmlns="{S_NS}" xmlns:r="{R_NS}"><sheets>"#
    );
    let mut rels = String::from(
        r#"<?xml version="1.0" encoding="UTF-8"?><Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">"#,
    );
    for (i, sheet) in sheets.iter().enumerate() {
        let n = i + 1;
        workbook.push_str(&format!(
            r#"<sheet name="{}" sheetId="{n}" r:id="rId{n}"/>"#,
            xml_escape(sheet.name)
        ));
        rels.push_str(&format!(
            r#"<Relationship Id="rId{n}" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet{n}.xml"/>"#
        ));
    }
    workbook.push_str("</sheets></workbook>");
    rels.push_str("</Relationships>");

    let sheet_parts: Vec<(String, String)> = sheets
        .iter()
        .enumerate()
        .map(|(i, s)| (format!("xl/worksheets/sheet{}.xml", i + 1), sheet_xml(s)))
        .collect();
    let mut entries: Vec<(&str, &[u8])> = vec![
        ("[Content_Types].xml", content_types.as_bytes()),
        ("xl/workbook.xml", workbook.as_bytes()),
        ("xl/_rels/workbook.xml.rels", rels.as_bytes()),
        ("xl/styles.xml", STYLES_XML.as_bytes()),
    ];
    for (name, xml) in &sheet_parts {
        entries.push((name.as_str(), xml.as_bytes()));
    }
    zip_bytes(&entries)
}

pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let img = image::RgbImage::from_fn(width, height, |x, y| {
        image::Rgb([(x % 256) as u8, (y % 256) as u8, 128])
    });
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, image::ImageFormat::Png).unwrap();
    out.into_inner()
}

pub fn load_pdf(path: &Path) -> lopdf::Document {
    lopdf::Document::load(path).expect("output is a readable PDF")
}

/// Text of every page, joined.
pub fn pdf_text(path: &Path) -> String {
    let doc = load_pdf(path);
    let pages: Vec<u32> = doc.get_pages().keys().copied().collect();
    doc.extract_text(&pages).unwrap_or_default()
}

/// (width, height) of every page's MediaBox.
pub fn page_sizes(path: &Path) -> Vec<(f32, f32)> {
    let doc = load_pdf(path);
    doc.get_pages()
        .values()
        .map(|&id| {
            let page = doc.get_dictionary(id).unwrap();
            let mediabox = page.get(b"MediaBox").unwrap().as_array().unwrap();
            let num = |o: &lopdf::Object| o.as_float().unwrap();
            (
                num(&mediabox[2]) - num(&mediabox[0]),
                num(&mediabox[3]) - num(&mediabox[1]),
            )
        })
        .collect()
}

/// Image XObjects in the PDF, not counting soft masks.
pub fn image_count(path: &Path) -> usize {
    let doc = load_pdf(path);
    let images: Vec<(&lopdf::ObjectId, &lopdf::Stream)> = doc
        .objects
        .iter()
        .filter_map(|(id, o)| o.as_stream().ok().map(|s| (id, s)))
        .filter(|(_, s)| {
            s.dict
                .get(b"Subtype")
                .and_then(|t| t.as_name())
                .is_ok_and(|n| n == b"Image")
        })
        .collect();
    let masks: Vec<lopdf::ObjectId> = images
        .iter()
        .filter_map(|(_, s)| s.dict.get(b"SMask").and_then(|m| m.as_reference()).ok())
        .collect();
    images.iter().filter(|(id, _)| !masks.contains(*id)).count()
}

/// `word/document.xml` of a DOCX on disk.
pub fn docx_document_xml(path: &Path) -> String {
    let file = std::fs::File::open(path).unwrap();
    let mut archive = zip::ZipArchive::new(file).unwrap();
    let mut xml = String::new();
    std::io::Read::read_to_string(&mut archive.by_name("word/document.xml").unwrap(), &mut xml)
        .unwrap();
    xml
}
