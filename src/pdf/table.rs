use std::ops::Range;

use pdf_writer::Content;

use crate::error::Error;
use crate::fonts::FontSet;
use crate::markup::{Span, SpanStyle};
use crate::model::{Alignment, CellRange, TableBlock, TableCommand, VAlign};

use super::PageFlow;
use super::layout::{
    BaseTextStyle, LINE_HEIGHT_RATIO, TextLine, baseline_in, build_paragraph_lines, lines_height,
    render_line,
};

const DEFAULT_FONT_SIZE: f32 = 10.0;

#[derive(Clone, Copy, Debug, PartialEq)]
pub(super) struct Padding {
    pub(super) top: f32,
    pub(super) bottom: f32,
    pub(super) left: f32,
    pub(super) right: f32,
}

/// Effective style of one grid position after all commands are applied.
#[derive(Clone, Debug, PartialEq)]
pub(super) struct CellStyle {
    pub(super) font_size: f32,
    pub(super) bold: bool,
    pub(super) text_color: [u8; 3],
    pub(super) background: Option<[u8; 3]>,
    pub(super) align: Alignment,
    pub(super) valign: VAlign,
    pub(super) padding: Padding,
    pub(super) grid: Option<(f32, [u8; 3])>,
}

impl Default for CellStyle {
    fn default() -> Self {
        CellStyle {
            font_size: DEFAULT_FONT_SIZE,
            bold: false,
            text_color: [0, 0, 0],
            background: None,
            align: Alignment::Left,
            valign: VAlign::Top,
            padding: Padding {
                top: 3.0,
                bottom: 3.0,
                left: 6.0,
                right: 6.0,
            },
            grid: None,
        }
    }
}

pub(super) struct ResolvedStyles {
    pub(super) cells: Vec<Vec<CellStyle>>,
    pub(super) spans: Vec<CellRange>,
}

fn cells_in(range: CellRange, rows: usize, cols: usize) -> impl Iterator<Item = (usize, usize)> {
    let row_end = range.last_row.min(rows.saturating_sub(1));
    let col_end = range.last_col.min(cols.saturating_sub(1));
    let (rows_empty, cols_empty) = (rows == 0, cols == 0);
    (range.first_row..=row_end)
        .filter(move |_| !rows_empty && !cols_empty)
        .flat_map(move |r| (range.first_col..=col_end).map(move |c| (r, c)))
}

/// Apply the command list in order; later commands override earlier ones.
pub(super) fn resolve_styles(table: &TableBlock) -> ResolvedStyles {
    let rows = table.rows.len();
    let cols = table.num_cols();
    let mut cells = vec![vec![CellStyle::default(); cols]; rows];
    let mut spans: Vec<CellRange> = Vec::new();

    for cmd in &table.commands {
        let range = cmd.range();
        if let TableCommand::Span { range } = cmd {
            let in_bounds = range.last_row < rows && range.last_col < cols;
            let overlaps = spans.iter().any(|s| {
                s.first_row <= range.last_row
                    && range.first_row <= s.last_row
                    && s.first_col <= range.last_col
                    && range.first_col <= s.last_col
            });
            if in_bounds && !overlaps && !range.is_single_cell() {
                spans.push(*range);
            } else {
                log::debug!("ignoring span command {range:?}");
            }
            continue;
        }
        for (r, c) in cells_in(range, rows, cols) {
            let style = &mut cells[r][c];
            match cmd {
                TableCommand::FontSize { size, .. } => style.font_size = *size,
                TableCommand::Grid { width, color, .. } => style.grid = Some((*width, *color)),
                TableCommand::Padding {
                    top,
                    bottom,
                    left,
                    right,
                    ..
                } => {
                    style.padding = Padding {
                        top: *top,
                        bottom: *bottom,
                        left: *left,
                        right: *right,
                    }
                }
                TableCommand::VAlign { align, .. } => style.valign = *align,
                TableCommand::Align { align, .. } => style.align = *align,
                TableCommand::Background { color, .. } => style.background = Some(*color),
                TableCommand::TextColor { color, .. } => style.text_color = *color,
                TableCommand::Bold { .. } => style.bold = true,
                TableCommand::RowBackgrounds { colors, .. } => {
                    if !colors.is_empty() {
                        style.background = Some(colors[(r - range.first_row) % colors.len()]);
                    }
                }
                TableCommand::Span { .. } => {}
            }
        }
    }
    ResolvedStyles { cells, spans }
}

struct CellLayout {
    lines: Vec<TextLine>,
    leading: f32,
    /// The region this cell draws into; a single cell unless it anchors a span.
    region: CellRange,
}

struct TableLayout {
    row_heights: Vec<f32>,
    /// `None` for positions covered by a span they do not anchor.
    cells: Vec<Vec<Option<CellLayout>>>,
}

fn compute_layout(
    table: &TableBlock,
    styles: &ResolvedStyles,
    fonts: &FontSet,
) -> TableLayout {
    let num_rows = table.rows.len();
    let num_cols = table.num_cols();
    let mut row_heights = vec![0.0f32; num_rows];
    let mut tall_spans: Vec<(CellRange, f32)> = Vec::new();

    let cells = table
        .rows
        .iter()
        .enumerate()
        .map(|(r, row)| {
            (0..num_cols)
                .map(|c| {
                    let span = styles.spans.iter().find(|s| s.contains(r, c));
                    if span.is_some_and(|s| s.first_row != r || s.first_col != c) {
                        return None;
                    }
                    let region = span.copied().unwrap_or(CellRange::cell(r, c));
                    let style = &styles.cells[r][c];
                    let width: f32 = table.col_widths[region.first_col..=region.last_col]
                        .iter()
                        .sum();
                    let text_w = (width - style.padding.left - style.padding.right).max(1.0);
                    let leading = style.font_size * LINE_HEIGHT_RATIO;
                    let text = row.get(c).map(String::as_str).unwrap_or("");
                    let lines = if text.trim().is_empty() {
                        Vec::new()
                    } else {
                        let spans = [Span {
                            text: text.to_string(),
                            style: SpanStyle::default(),
                        }];
                        let base = BaseTextStyle {
                            font_size: style.font_size,
                            color: style.text_color,
                            bold: style.bold,
                        };
                        build_paragraph_lines(&spans, base, fonts, text_w)
                    };
                    let height = lines_height(&lines, leading).max(leading)
                        + style.padding.top
                        + style.padding.bottom;
                    if region.first_row == region.last_row {
                        row_heights[r] = row_heights[r].max(height);
                    } else {
                        tall_spans.push((region, height));
                    }
                    Some(CellLayout {
                        lines,
                        leading,
                        region,
                    })
                })
                .collect()
        })
        .collect();

    // Multi-row spans that outgrow their rows stretch the last row.
    for (region, height) in tall_spans {
        let covered: f32 = row_heights[region.first_row..=region.last_row].iter().sum();
        if height > covered {
            row_heights[region.last_row] += height - covered;
        }
    }

    TableLayout { row_heights, cells }
}

/// Split rows into groups that must stay on one page: a multi-row span
/// joins every row it covers.
pub(super) fn row_groups(num_rows: usize, spans: &[CellRange]) -> Vec<Range<usize>> {
    let mut groups = Vec::new();
    let mut start = 0;
    for boundary in 1..=num_rows {
        let crossed = spans
            .iter()
            .any(|s| s.first_row < boundary && boundary <= s.last_row);
        if !crossed {
            groups.push(start..boundary);
            start = boundary;
        }
    }
    groups
}

fn set_fill(content: &mut Content, [r, g, b]: [u8; 3]) {
    content.set_fill_rgb(r as f32 / 255.0, g as f32 / 255.0, b as f32 / 255.0);
}

fn draw_rows(
    content: &mut Content,
    top: f32,
    rows: Range<usize>,
    styles: &ResolvedStyles,
    layout: &TableLayout,
    col_x: &[f32],
) {
    let row_top = |r: usize| -> f32 { top - layout.row_heights[rows.start..r].iter().sum::<f32>() };
    let regions: Vec<(usize, usize, &CellLayout)> = rows
        .clone()
        .flat_map(|r| {
            layout.cells[r]
                .iter()
                .enumerate()
                .filter_map(move |(c, cell)| cell.as_ref().map(|cell| (r, c, cell)))
        })
        .collect();
    let bounds = |cell: &CellLayout| -> (f32, f32, f32, f32) {
        let region = cell.region;
        let x = col_x[region.first_col];
        let w = col_x[region.last_col + 1] - x;
        let y_top = row_top(region.first_row);
        let h: f32 = layout.row_heights[region.first_row..=region.last_row]
            .iter()
            .sum();
        (x, y_top, w, h)
    };

    for &(r, c, cell) in &regions {
        if let Some(color) = styles.cells[r][c].background {
            let (x, y_top, w, h) = bounds(cell);
            content.save_state();
            set_fill(content, color);
            content.rect(x, y_top - h, w, h);
            content.fill_nonzero();
            content.restore_state();
        }
    }

    for &(r, c, cell) in &regions {
        if cell.lines.is_empty() {
            continue;
        }
        let style = &styles.cells[r][c];
        let pad = style.padding;
        let (x, y_top, w, h) = bounds(cell);
        let text_h = lines_height(&cell.lines, cell.leading);
        let avail = h - pad.top - pad.bottom;
        let offset = match style.valign {
            VAlign::Top => 0.0,
            VAlign::Middle => ((avail - text_h) / 2.0).max(0.0),
            VAlign::Bottom => (avail - text_h).max(0.0),
        };
        let mut line_top = y_top - pad.top - offset;
        let text_w = (w - pad.left - pad.right).max(1.0);
        for line in &cell.lines {
            let pitch = line.pitch(cell.leading);
            let baseline = baseline_in(line_top, pitch, line.max_font_size);
            render_line(content, line, style.align, x + pad.left, text_w, baseline);
            line_top -= pitch;
        }
    }

    for &(r, c, cell) in &regions {
        let Some((width, [cr, cg, cb])) = styles.cells[r][c].grid else {
            continue;
        };
        if width <= 0.0 {
            continue;
        }
        let (x, y_top, w, h) = bounds(cell);
        content.save_state();
        content.set_line_width(width);
        content.set_stroke_rgb(cr as f32 / 255.0, cg as f32 / 255.0, cb as f32 / 255.0);
        content.rect(x, y_top - h, w, h);
        content.stroke();
        content.restore_state();
    }
}

/// Place a table, breaking between row groups and repeating the leading
/// `repeat_rows` rows on every continuation page.
pub(super) fn flow_table(
    flow: &mut PageFlow,
    table: &TableBlock,
    fonts: &FontSet,
) -> Result<(), Error> {
    let num_cols = table.num_cols();
    if table.rows.is_empty() || num_cols == 0 {
        return Ok(());
    }
    let geometry = flow.geometry;
    let total_width: f32 = table.col_widths.iter().sum();
    if total_width > geometry.content_width() + 0.5 {
        return Err(Error::Layout(format!(
            "table is {total_width:.1}pt wide but only {:.1}pt fit between the margins",
            geometry.content_width()
        )));
    }

    let styles = resolve_styles(table);
    let layout = compute_layout(table, &styles, fonts);
    let groups = row_groups(table.rows.len(), &styles.spans);
    let group_height =
        |g: &Range<usize>| -> f32 { layout.row_heights[g.clone()].iter().sum::<f32>() };

    for group in &groups {
        let h = group_height(group);
        if h > geometry.content_height() {
            return Err(Error::Layout(format!(
                "table rows {}..{} need {h:.1}pt but a page holds {:.1}pt",
                group.start,
                group.end,
                geometry.content_height()
            )));
        }
    }

    let repeat = table.repeat_rows.min(table.rows.len());
    let header_end = if repeat == 0 {
        0
    } else {
        groups
            .iter()
            .find(|g| g.contains(&(repeat - 1)))
            .map_or(repeat, |g| g.end)
    };
    let header_height: f32 = layout.row_heights[..header_end].iter().sum();

    let table_left = geometry.margin_left + (geometry.content_width() - total_width) / 2.0;
    let col_x: Vec<f32> = std::iter::once(table_left)
        .chain(table.col_widths.iter().scan(table_left, |x, w| {
            *x += w;
            Some(*x)
        }))
        .collect();

    for (gi, group) in groups.iter().enumerate() {
        let mut needed = group_height(group);
        // Keep the header together with the first body rows.
        if header_end > 0 && group.end == header_end {
            needed += groups.get(gi + 1).map_or(0.0, group_height);
        }
        if !flow.at_page_top() && !flow.fits(needed) {
            flow.new_page();
            if group.start >= header_end
                && header_end > 0
                && header_height + group_height(group) <= geometry.content_height()
            {
                draw_rows(&mut flow.content, flow.cursor, 0..header_end, &styles, &layout, &col_x);
                flow.advance(header_height);
            }
        }
        draw_rows(&mut flow.content, flow.cursor, group.clone(), &styles, &layout, &col_x);
        flow.advance(group_height(group));
    }
    log::debug!(
        "table placed: {} rows x {} cols, {} row groups",
        table.rows.len(),
        num_cols,
        groups.len()
    );
    Ok(())
}
