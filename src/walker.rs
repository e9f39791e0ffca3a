//! Turns parsed documents and workbooks into the flat, ordered block list
//! the pagination engine consumes.

use crate::cancel::CancelFlag;
use crate::error::Error;
use crate::images::{TempImages, extract_images};
use crate::markup::{compose_runs, escape};
use crate::model::{
    Alignment, PageGeometry, RenderBlock, SourceBlock, SourceDocument, StyledParagraph, Workbook,
    cm,
};
use crate::style::{StyleKind, StyleResolver, base_font_size};
use crate::table::{TableTheme, translate};

pub const EMPTY_DOCUMENT_TEXT: &str = "(Empty document)";
/// Spacer after each placed image.
pub const IMAGE_SPACER: f32 = 4.0;
/// Spacer standing in for a blank paragraph.
pub const BLANK_PARAGRAPH_SPACER: f32 = 6.0;
/// Spacer before and after each document table.
pub const TABLE_SPACER: f32 = 6.0;

/// Walk document blocks in authored order. Images are persisted into `temp`,
/// which the caller keeps alive until the PDF is written.
pub fn walk_document(
    doc: &SourceDocument,
    geometry: &PageGeometry,
    resolver: &mut StyleResolver,
    temp: &mut TempImages,
    cancel: &CancelFlag,
) -> Result<Vec<RenderBlock>, Error> {
    let max_width = geometry.content_width();
    let theme = TableTheme::document();
    let mut blocks = Vec::new();

    for block in &doc.blocks {
        cancel.check()?;
        match block {
            SourceBlock::Paragraph(para) => {
                for image in extract_images(para, &doc.media, temp, max_width) {
                    blocks.push(RenderBlock::Image(image));
                    blocks.push(RenderBlock::Spacer(IMAGE_SPACER));
                }

                let text = para.text();
                if text.trim().is_empty() {
                    blocks.push(RenderBlock::Spacer(BLANK_PARAGRAPH_SPACER));
                    continue;
                }

                let kind = StyleKind::classify(&para.style_name);
                let style = resolver.resolve(kind, para.alignment, base_font_size(&para.runs));
                let mut markup = compose_runs(&para.runs, &text);
                if let Some(prefix) = kind.prefix() {
                    markup.insert_str(0, prefix);
                }
                blocks.push(RenderBlock::Paragraph(StyledParagraph { markup, style }));
            }
            SourceBlock::Table(table) => {
                let Some(rendered) =
                    translate(table.rows.clone(), &table.merges, &theme, max_width, 0)
                else {
                    log::debug!("skipping table with no rows");
                    continue;
                };
                blocks.push(RenderBlock::Spacer(TABLE_SPACER));
                blocks.push(RenderBlock::Table(rendered));
                blocks.push(RenderBlock::Spacer(TABLE_SPACER));
            }
        }
    }

    if blocks.is_empty() {
        blocks.push(empty_placeholder(resolver));
    }
    Ok(blocks)
}

fn empty_placeholder(resolver: &mut StyleResolver) -> RenderBlock {
    let style = resolver.resolve(StyleKind::Normal, Alignment::Left, None);
    RenderBlock::Paragraph(StyledParagraph {
        markup: escape(EMPTY_DOCUMENT_TEXT),
        style,
    })
}

/// Walk every sheet: a bold heading, then the sheet's table. Sheets whose
/// cells are all empty keep their heading but get no table.
pub fn walk_workbook(
    workbook: &Workbook,
    geometry: &PageGeometry,
    resolver: &mut StyleResolver,
    cancel: &CancelFlag,
) -> Result<Vec<RenderBlock>, Error> {
    let theme = TableTheme::sheet();
    let mut blocks = Vec::new();

    for sheet in &workbook.sheets {
        cancel.check()?;
        let style = resolver.resolve(StyleKind::Heading2, Alignment::Left, None);
        blocks.push(RenderBlock::Paragraph(StyledParagraph {
            markup: format!("<b>{}</b>", escape(&sheet.name)),
            style,
        }));
        blocks.push(RenderBlock::Spacer(cm(0.3)));

        let mut rows = Vec::with_capacity(sheet.rows.len());
        for row in &sheet.rows {
            cancel.check()?;
            rows.push(row.clone());
        }
        if rows.iter().flatten().all(|c| c.text.is_empty()) {
            log::debug!("sheet {:?} has no values; table skipped", sheet.name);
            continue;
        }

        let min_cols = sheet.max_column.max(1);
        if let Some(table) = translate(rows, &sheet.merges, &theme, geometry.content_width(), min_cols) {
            blocks.push(RenderBlock::Table(table));
            blocks.push(RenderBlock::Spacer(cm(0.5)));
        }
    }

    if blocks.is_empty() {
        blocks.push(empty_placeholder(resolver));
    }
    Ok(blocks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Cell, Paragraph, Run, Sheet, TableCommand, TableModel};

    fn paragraph(style: &str, text: &str) -> SourceBlock {
        SourceBlock::Paragraph(Paragraph {
            style_name: style.to_string(),
            runs: vec![Run::plain(text)],
            ..Default::default()
        })
    }

    fn walk(doc: &SourceDocument) -> Vec<RenderBlock> {
        let mut temp = TempImages::new();
        walk_document(
            doc,
            &PageGeometry::docx_portrait(),
            &mut StyleResolver::new(),
            &mut temp,
            &CancelFlag::new(),
        )
        .unwrap()
    }

    #[test]
    fn empty_document_gets_placeholder() {
        let blocks = walk(&SourceDocument::default());
        assert_eq!(blocks.len(), 1);
        let RenderBlock::Paragraph(p) = &blocks[0] else {
            panic!("expected placeholder paragraph");
        };
        assert_eq!(p.markup, EMPTY_DOCUMENT_TEXT);
        assert_eq!(p.style.font_size, 11.0);
    }

    #[test]
    fn blank_paragraphs_become_spacers() {
        let doc = SourceDocument {
            blocks: vec![paragraph("Normal", "   "), paragraph("List Bullet", "item")],
            ..Default::default()
        };
        let blocks = walk(&doc);
        assert!(matches!(blocks[0], RenderBlock::Spacer(s) if s == BLANK_PARAGRAPH_SPACER));
        let RenderBlock::Paragraph(p) = &blocks[1] else {
            panic!("expected paragraph");
        };
        assert_eq!(p.markup, "\u{2022} item");
    }

    #[test]
    fn tables_are_framed_by_spacers_and_empty_ones_skipped() {
        let doc = SourceDocument {
            blocks: vec![
                SourceBlock::Table(TableModel::default()),
                SourceBlock::Table(TableModel {
                    rows: vec![vec![Cell::text("a"), Cell::text("b")], vec![Cell::text("c")]],
                    merges: vec![],
                }),
            ],
            ..Default::default()
        };
        let blocks = walk(&doc);
        assert_eq!(blocks.len(), 3);
        let RenderBlock::Table(t) = &blocks[1] else {
            panic!("expected table");
        };
        assert_eq!(t.rows[1], vec!["c".to_string(), String::new()]);
    }

    #[test]
    fn cancelled_walk_stops() {
        let doc = SourceDocument {
            blocks: vec![paragraph("Normal", "x")],
            ..Default::default()
        };
        let cancel = CancelFlag::new();
        cancel.cancel();
        let err = walk_document(
            &doc,
            &PageGeometry::docx_portrait(),
            &mut StyleResolver::new(),
            &mut TempImages::new(),
            &cancel,
        )
        .unwrap_err();
        assert!(err.is_cancelled());
    }

    #[test]
    fn sheets_get_headings_and_colored_cells_suppress_header() {
        let workbook = Workbook {
            sheets: vec![
                Sheet {
                    name: "Q1 & Q2".to_string(),
                    rows: vec![vec![
                        Cell::text("x"),
                        Cell {
                            text: "y".into(),
                            background: Some([1, 2, 3]),
                            ..Default::default()
                        },
                    ]],
                    max_column: 3,
                    merges: vec![],
                },
                Sheet {
                    name: "Blank".to_string(),
                    rows: vec![vec![Cell::default()]],
                    max_column: 1,
                    merges: vec![],
                },
            ],
        };
        let blocks = walk_workbook(
            &workbook,
            &PageGeometry::sheet_landscape(),
            &mut StyleResolver::new(),
            &CancelFlag::new(),
        )
        .unwrap();
        // heading, spacer, table, spacer, heading, spacer
        assert_eq!(blocks.len(), 6);
        let RenderBlock::Paragraph(h) = &blocks[0] else {
            panic!("expected heading");
        };
        assert_eq!(h.markup, "<b>Q1 &amp; Q2</b>");
        let RenderBlock::Table(t) = &blocks[2] else {
            panic!("expected table");
        };
        assert_eq!(t.num_cols(), 3);
        assert_eq!(t.repeat_rows, 1);
        assert!(!t.commands.iter().any(|c| matches!(
            c,
            TableCommand::RowBackgrounds { .. }
        )));
    }
}
