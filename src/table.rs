use std::collections::BTreeMap;

use crate::model::{Alignment, Cell, CellRange, MergeSpan, TableBlock, TableCommand, VAlign};

pub const HEADER_BACKGROUND: [u8; 3] = [0x43, 0x61, 0xEE];
pub const HEADER_TEXT: [u8; 3] = [0xFF, 0xFF, 0xFF];
pub const ZEBRA_BACKGROUNDS: [[u8; 3]; 2] = [[0xFF, 0xFF, 0xFF], [0xF5, 0xF7, 0xFF]];
pub const GRID_COLOR: [u8; 3] = [0xCC, 0xCC, 0xCC];

/// When the default header/zebra treatment applies.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HeaderRule {
    /// Skip it when cell (0,0) carries its own background (documents).
    UnlessFirstCellColored,
    /// Skip it when any cell carries its own background (spreadsheets).
    UnlessAnyCellColored,
}

#[derive(Clone, Debug)]
pub struct TableTheme {
    pub font_size: f32,
    pub grid_width: f32,
    pub padding_top: f32,
    pub padding_bottom: f32,
    pub padding_left: f32,
    pub padding_right: f32,
    /// Table-wide horizontal alignment, emitted before per-cell overrides.
    pub align: Option<Alignment>,
    pub header_rule: HeaderRule,
    pub repeat_rows: usize,
}

impl TableTheme {
    pub fn document() -> Self {
        TableTheme {
            font_size: 9.0,
            grid_width: 0.4,
            padding_top: 4.0,
            padding_bottom: 4.0,
            padding_left: 6.0,
            padding_right: 6.0,
            align: None,
            header_rule: HeaderRule::UnlessFirstCellColored,
            repeat_rows: 0,
        }
    }

    pub fn sheet() -> Self {
        TableTheme {
            font_size: 8.0,
            grid_width: 0.3,
            padding_top: 3.0,
            padding_bottom: 3.0,
            padding_left: 4.0,
            padding_right: 6.0,
            align: Some(Alignment::Left),
            header_rule: HeaderRule::UnlessAnyCellColored,
            repeat_rows: 1,
        }
    }
}

/// Pad ragged rows with default cells up to the widest row (or `min_cols`).
/// Returns the padded rows and the resulting column count.
pub fn pad_rows<T: Clone + Default>(mut rows: Vec<Vec<T>>, min_cols: usize) -> (Vec<Vec<T>>, usize) {
    let num_cols = rows.iter().map(Vec::len).max().unwrap_or(0).max(min_cols);
    for row in &mut rows {
        row.resize(num_cols, T::default());
    }
    (rows, num_cols)
}

/// Explicit cell backgrounds keyed by (row, col).
pub fn background_map(rows: &[Vec<Cell>]) -> BTreeMap<(usize, usize), [u8; 3]> {
    let mut map = BTreeMap::new();
    for (r, row) in rows.iter().enumerate() {
        for (c, cell) in row.iter().enumerate() {
            if let Some(bg) = cell.background {
                map.insert((r, c), bg);
            }
        }
    }
    map
}

/// Equal-width columns filling the content width.
pub fn column_widths(num_cols: usize, content_width: f32) -> Vec<f32> {
    let w = content_width / num_cols.max(1) as f32;
    vec![w; num_cols]
}

/// Translate a grid into a renderable table. `None` for a grid with no rows.
pub fn translate(
    rows: Vec<Vec<Cell>>,
    merges: &[MergeSpan],
    theme: &TableTheme,
    content_width: f32,
    min_cols: usize,
) -> Option<TableBlock> {
    if rows.is_empty() {
        return None;
    }
    let (rows, num_cols) = pad_rows(rows, min_cols);
    if num_cols == 0 {
        return None;
    }
    let commands = build_commands(&rows, merges, theme);
    let texts = rows
        .into_iter()
        .map(|row| row.into_iter().map(|c| c.text).collect())
        .collect();
    Some(TableBlock {
        rows: texts,
        col_widths: column_widths(num_cols, content_width),
        commands,
        repeat_rows: theme.repeat_rows,
    })
}

/// Styling commands for a padded grid, in application order.
pub fn build_commands(
    rows: &[Vec<Cell>],
    merges: &[MergeSpan],
    theme: &TableTheme,
) -> Vec<TableCommand> {
    let num_rows = rows.len();
    let num_cols = rows.first().map_or(0, Vec::len);
    if num_rows == 0 || num_cols == 0 {
        return Vec::new();
    }
    let all = CellRange::rows(0, num_rows - 1, num_cols);

    let mut commands = vec![TableCommand::FontSize {
        range: all,
        size: theme.font_size,
    }];
    if let Some(align) = theme.align {
        commands.push(TableCommand::Align { range: all, align });
    }
    commands.push(TableCommand::Grid {
        range: all,
        width: theme.grid_width,
        color: GRID_COLOR,
    });
    commands.push(TableCommand::Padding {
        range: all,
        top: theme.padding_top,
        bottom: theme.padding_bottom,
        left: theme.padding_left,
        right: theme.padding_right,
    });
    commands.push(TableCommand::VAlign {
        range: all,
        align: VAlign::Middle,
    });

    let backgrounds = background_map(rows);
    for (&(r, c), &color) in &backgrounds {
        commands.push(TableCommand::Background {
            range: CellRange::cell(r, c),
            color,
        });
    }
    for (r, row) in rows.iter().enumerate() {
        for (c, cell) in row.iter().enumerate() {
            if cell.bold {
                commands.push(TableCommand::Bold {
                    range: CellRange::cell(r, c),
                });
            }
            if let Some(align) = cell.alignment {
                commands.push(TableCommand::Align {
                    range: CellRange::cell(r, c),
                    align,
                });
            }
        }
    }

    let spans = valid_spans(merges, num_rows, num_cols);
    commands.extend(spans.iter().map(|s| TableCommand::Span {
        range: CellRange::from(*s),
    }));

    let header_styled = match theme.header_rule {
        HeaderRule::UnlessFirstCellColored => !backgrounds.contains_key(&(0, 0)),
        HeaderRule::UnlessAnyCellColored => backgrounds.is_empty(),
    };
    if header_styled {
        let header = CellRange::rows(0, 0, num_cols);
        commands.push(TableCommand::Background {
            range: header,
            color: HEADER_BACKGROUND,
        });
        commands.push(TableCommand::TextColor {
            range: header,
            color: HEADER_TEXT,
        });
        commands.push(TableCommand::Bold { range: header });
        if num_rows > 1 {
            commands.push(TableCommand::RowBackgrounds {
                range: CellRange::rows(1, num_rows - 1, num_cols),
                colors: ZEBRA_BACKGROUNDS.to_vec(),
            });
        }
    }

    drop_covered_cell_commands(commands, &spans)
}

/// Clip spans to the grid and drop degenerate or overlapping ones.
fn valid_spans(merges: &[MergeSpan], num_rows: usize, num_cols: usize) -> Vec<MergeSpan> {
    let mut accepted: Vec<MergeSpan> = Vec::new();
    for span in merges {
        if span.first_row >= num_rows
            || span.first_col >= num_cols
            || span.last_row < span.first_row
            || span.last_col < span.first_col
        {
            log::debug!("dropping merge span outside grid: {span:?}");
            continue;
        }
        let clipped = MergeSpan {
            last_row: span.last_row.min(num_rows - 1),
            last_col: span.last_col.min(num_cols - 1),
            ..*span
        };
        if clipped.is_single_cell() {
            continue;
        }
        if accepted.iter().any(|a| a.overlaps(&clipped)) {
            log::warn!("dropping overlapping merge span {clipped:?}");
            continue;
        }
        accepted.push(clipped);
    }
    accepted
}

/// Single-cell commands that target a non-anchor cell inside a span would
/// re-style part of a merged region; remove them.
fn drop_covered_cell_commands(commands: Vec<TableCommand>, spans: &[MergeSpan]) -> Vec<TableCommand> {
    if spans.is_empty() {
        return commands;
    }
    commands
        .into_iter()
        .filter(|cmd| {
            let range = cmd.range();
            if matches!(cmd, TableCommand::Span { .. }) || !range.is_single_cell() {
                return true;
            }
            let (r, c) = (range.first_row, range.first_col);
            !spans.iter().any(|s| s.contains(r, c) && !s.is_anchor(r, c))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid(widths: &[usize]) -> Vec<Vec<Cell>> {
        widths
            .iter()
            .enumerate()
            .map(|(r, &w)| (0..w).map(|c| Cell::text(format!("{r}{c}"))).collect())
            .collect()
    }

    fn has_header_theme(commands: &[TableCommand]) -> bool {
        commands.iter().any(|c| {
            matches!(c, TableCommand::Background { color, .. } if *color == HEADER_BACKGROUND)
        })
    }

    #[test]
    fn ragged_rows_pad_to_widest() {
        let (rows, num_cols) = pad_rows(grid(&[3, 2, 4]), 0);
        assert_eq!(num_cols, 4);
        assert!(rows.iter().all(|r| r.len() == 4));
        assert_eq!(rows[1][2].text, "");

        let table = translate(grid(&[3, 2, 4]), &[], &TableTheme::document(), 400.0, 0).unwrap();
        assert_eq!(table.num_cols(), 4);
        assert!(table.col_widths.iter().all(|w| (w - 100.0).abs() < 1e-4));
        assert!(table.rows.iter().all(|r| r.len() == 4));
    }

    #[test]
    fn document_header_applies_when_first_cell_is_plain() {
        let mut rows = grid(&[2, 2, 2]);
        rows[1][1].background = Some([0xEE, 0xEE, 0xEE]);
        let commands = build_commands(&rows, &[], &TableTheme::document());
        let header = CellRange::rows(0, 0, 2);
        assert!(commands.contains(&TableCommand::Background {
            range: header,
            color: HEADER_BACKGROUND,
        }));
        assert!(commands.contains(&TableCommand::TextColor { range: header, color: HEADER_TEXT }));
        assert!(commands.contains(&TableCommand::Bold { range: header }));
        assert!(commands.contains(&TableCommand::RowBackgrounds {
            range: CellRange::rows(1, 2, 2),
            colors: ZEBRA_BACKGROUNDS.to_vec(),
        }));
        // Explicit backgrounds come before the theme so the theme paints over them.
        let explicit = TableCommand::Background {
            range: CellRange::cell(1, 1),
            color: [0xEE, 0xEE, 0xEE],
        };
        let explicit = commands.iter().position(|c| *c == explicit).unwrap();
        let themed = commands
            .iter()
            .position(|c| has_header_theme(std::slice::from_ref(c)))
            .unwrap();
        assert!(explicit < themed);
    }

    #[test]
    fn document_header_skipped_when_first_cell_is_colored() {
        let mut rows = grid(&[2, 2]);
        rows[0][0].background = Some([0xFF, 0xC0, 0x00]);
        let commands = build_commands(&rows, &[], &TableTheme::document());
        assert!(!has_header_theme(&commands));
        assert!(!commands.iter().any(|c| matches!(c, TableCommand::RowBackgrounds { .. })));
        assert!(commands.contains(&TableCommand::Background {
            range: CellRange::cell(0, 0),
            color: [0xFF, 0xC0, 0x00],
        }));
    }

    #[test]
    fn sheet_header_skipped_when_any_cell_is_colored() {
        let mut rows = grid(&[2, 2]);
        rows[1][1].background = Some([0xEE, 0xEE, 0xEE]);
        assert!(!has_header_theme(&build_commands(&rows, &[], &TableTheme::sheet())));
        assert!(has_header_theme(&build_commands(&grid(&[2, 2]), &[], &TableTheme::sheet())));
    }

    #[test]
    fn covered_cells_get_no_single_cell_commands() {
        let mut rows = grid(&[3, 3, 3]);
        for row in &mut rows {
            for cell in row.iter_mut() {
                cell.bold = true;
                cell.background = Some([0x10, 0x20, 0x30]);
                cell.alignment = Some(Alignment::Right);
            }
        }
        let span = MergeSpan { first_row: 0, first_col: 0, last_row: 1, last_col: 1 };
        let commands = build_commands(&rows, &[span], &TableTheme::document());

        assert!(commands.contains(&TableCommand::Span { range: CellRange::from(span) }));
        for cmd in &commands {
            let range = cmd.range();
            if matches!(cmd, TableCommand::Span { .. }) || !range.is_single_cell() {
                continue;
            }
            let (r, c) = (range.first_row, range.first_col);
            assert!(
                !span.contains(r, c) || span.is_anchor(r, c),
                "{cmd:?} addresses a covered cell"
            );
        }
        assert!(commands.contains(&TableCommand::Bold { range: CellRange::cell(0, 0) }));
        assert!(commands.contains(&TableCommand::Bold { range: CellRange::cell(2, 2) }));
    }

    #[test]
    fn overlapping_spans_keep_first() {
        let spans = valid_spans(
            &[
                MergeSpan { first_row: 0, first_col: 0, last_row: 1, last_col: 1 },
                MergeSpan { first_row: 1, first_col: 1, last_row: 2, last_col: 2 },
                MergeSpan { first_row: 5, first_col: 0, last_row: 6, last_col: 0 },
            ],
            3,
            3,
        );
        assert_eq!(spans.len(), 1);
    }

    #[test]
    fn spans_are_clipped_to_grid() {
        let spans = valid_spans(
            &[MergeSpan { first_row: 1, first_col: 0, last_row: 9, last_col: 9 }],
            3,
            2,
        );
        assert_eq!(
            spans,
            vec![MergeSpan { first_row: 1, first_col: 0, last_row: 2, last_col: 1 }]
        );
    }
}
