use std::collections::HashMap;
use std::path::PathBuf;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Alignment {
    #[default]
    Left,
    Center,
    Right,
    Justify,
}

// ---------------------------------------------------------------------------
// Source model: what the DOCX/XLSX readers produce. Read-only once parsed.
// ---------------------------------------------------------------------------

/// A contiguous span of text sharing one formatting state. Only direct
/// formatting is recorded; `None` means inherited/unset.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Run {
    pub text: String,
    pub bold: bool,
    pub italic: bool,
    pub underline: bool,
    pub font_size: Option<f32>, // points
    pub color: Option<[u8; 3]>,
}

impl Run {
    pub fn plain(text: impl Into<String>) -> Self {
        Run {
            text: text.into(),
            ..Default::default()
        }
    }
}

/// Reference to an embedded raster image inside a paragraph.
#[derive(Clone, Debug, PartialEq)]
pub struct ImageRef {
    /// Relationship id (`r:embed`) of the image part.
    pub embed_id: String,
    /// Stored display extent (cx, cy) in EMU, when the drawing declares one.
    pub extent_emu: Option<(u64, u64)>,
}

#[derive(Clone, Debug, Default)]
pub struct Paragraph {
    pub style_name: String,
    pub runs: Vec<Run>,
    pub alignment: Alignment,
    pub images: Vec<ImageRef>,
}

impl Paragraph {
    pub fn text(&self) -> String {
        self.runs.iter().map(|r| r.text.as_str()).collect()
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Cell {
    pub text: String,
    pub background: Option<[u8; 3]>,
    pub bold: bool,
    pub alignment: Option<Alignment>,
}

impl Cell {
    pub fn text(text: impl Into<String>) -> Self {
        Cell {
            text: text.into(),
            ..Default::default()
        }
    }
}

/// Inclusive rectangle of grid positions rendered as one merged region.
/// Spans of one table never overlap.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MergeSpan {
    pub first_row: usize,
    pub first_col: usize,
    pub last_row: usize,
    pub last_col: usize,
}

impl MergeSpan {
    pub fn contains(&self, row: usize, col: usize) -> bool {
        (self.first_row..=self.last_row).contains(&row)
            && (self.first_col..=self.last_col).contains(&col)
    }

    pub fn is_anchor(&self, row: usize, col: usize) -> bool {
        row == self.first_row && col == self.first_col
    }

    pub fn overlaps(&self, other: &MergeSpan) -> bool {
        self.first_row <= other.last_row
            && other.first_row <= self.last_row
            && self.first_col <= other.last_col
            && other.first_col <= self.last_col
    }

    pub fn is_single_cell(&self) -> bool {
        self.first_row == self.last_row && self.first_col == self.last_col
    }
}

/// Row-major grid of cells. Rows may be ragged until the walker pads them.
#[derive(Clone, Debug, Default)]
pub struct TableModel {
    pub rows: Vec<Vec<Cell>>,
    pub merges: Vec<MergeSpan>,
}

pub enum SourceBlock {
    Paragraph(Paragraph),
    Table(TableModel),
}

#[derive(Clone, Debug)]
pub struct MediaPart {
    pub data: Vec<u8>,
    pub content_type: String,
}

#[derive(Default)]
pub struct SourceDocument {
    pub blocks: Vec<SourceBlock>,
    /// Image parts keyed by relationship id.
    pub media: HashMap<String, MediaPart>,
}

pub struct Sheet {
    pub name: String,
    pub rows: Vec<Vec<Cell>>,
    pub max_column: usize,
    pub merges: Vec<MergeSpan>,
}

pub struct Workbook {
    pub sheets: Vec<Sheet>,
}

// ---------------------------------------------------------------------------
// Render model: what the walkers hand to the pagination engine.
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq)]
pub struct RenderStyle {
    /// Identifier minted by the resolver, unique within one conversion.
    pub name: String,
    pub font_size: f32,
    pub leading: f32,
    pub space_before: f32,
    pub space_after: f32,
    pub alignment: Alignment,
    pub left_indent: f32,
    pub text_color: [u8; 3],
    pub bold: bool,
}

#[derive(Clone, Debug)]
pub struct StyledParagraph {
    pub markup: String,
    pub style: RenderStyle,
}

/// Inclusive (row, col) rectangle addressed by a table command.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CellRange {
    pub first_row: usize,
    pub first_col: usize,
    pub last_row: usize,
    pub last_col: usize,
}

impl CellRange {
    pub fn cell(row: usize, col: usize) -> Self {
        CellRange {
            first_row: row,
            first_col: col,
            last_row: row,
            last_col: col,
        }
    }

    pub fn rows(first_row: usize, last_row: usize, num_cols: usize) -> Self {
        CellRange {
            first_row,
            first_col: 0,
            last_row,
            last_col: num_cols.saturating_sub(1),
        }
    }

    pub fn contains(&self, row: usize, col: usize) -> bool {
        (self.first_row..=self.last_row).contains(&row)
            && (self.first_col..=self.last_col).contains(&col)
    }

    pub fn is_single_cell(&self) -> bool {
        self.first_row == self.last_row && self.first_col == self.last_col
    }
}

impl From<MergeSpan> for CellRange {
    fn from(span: MergeSpan) -> Self {
        CellRange {
            first_row: span.first_row,
            first_col: span.first_col,
            last_row: span.last_row,
            last_col: span.last_col,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VAlign {
    Top,
    Middle,
    Bottom,
}

/// Styling command applied over a cell range, in list order (later wins).
#[derive(Clone, Debug, PartialEq)]
pub enum TableCommand {
    FontSize { range: CellRange, size: f32 },
    Grid { range: CellRange, width: f32, color: [u8; 3] },
    Padding { range: CellRange, top: f32, bottom: f32, left: f32, right: f32 },
    VAlign { range: CellRange, align: VAlign },
    Align { range: CellRange, align: Alignment },
    Background { range: CellRange, color: [u8; 3] },
    TextColor { range: CellRange, color: [u8; 3] },
    Bold { range: CellRange },
    /// Alternating backgrounds cycling over the rows of the range.
    RowBackgrounds { range: CellRange, colors: Vec<[u8; 3]> },
    Span { range: CellRange },
}

impl TableCommand {
    pub fn range(&self) -> CellRange {
        match self {
            TableCommand::FontSize { range, .. }
            | TableCommand::Grid { range, .. }
            | TableCommand::Padding { range, .. }
            | TableCommand::VAlign { range, .. }
            | TableCommand::Align { range, .. }
            | TableCommand::Background { range, .. }
            | TableCommand::TextColor { range, .. }
            | TableCommand::Bold { range }
            | TableCommand::RowBackgrounds { range, .. }
            | TableCommand::Span { range } => *range,
        }
    }
}

#[derive(Clone, Debug)]
pub struct TableBlock {
    pub rows: Vec<Vec<String>>,
    pub col_widths: Vec<f32>, // points
    pub commands: Vec<TableCommand>,
    /// Leading rows repeated at the top of every page the table spans.
    pub repeat_rows: usize,
}

impl TableBlock {
    pub fn num_cols(&self) -> usize {
        self.col_widths.len()
    }
}

/// Image persisted to a temp file; the file is owned by the conversion's
/// `TempImages` guard.
#[derive(Clone, Debug)]
pub struct ImageBlock {
    pub path: PathBuf,
    pub width: f32,  // points
    pub height: f32, // points
}

#[derive(Clone, Debug)]
pub enum RenderBlock {
    Paragraph(StyledParagraph),
    Table(TableBlock),
    Image(ImageBlock),
    Spacer(f32),
}

const CM: f32 = 72.0 / 2.54;
const A4_WIDTH: f32 = 21.0 * CM;
const A4_HEIGHT: f32 = 29.7 * CM;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PageGeometry {
    pub page_width: f32,
    pub page_height: f32,
    pub margin_top: f32,
    pub margin_bottom: f32,
    pub margin_left: f32,
    pub margin_right: f32,
}

impl PageGeometry {
    /// A4 portrait with 2.5 cm margins, used for documents.
    pub fn docx_portrait() -> Self {
        PageGeometry {
            page_width: A4_WIDTH,
            page_height: A4_HEIGHT,
            margin_top: 2.5 * CM,
            margin_bottom: 2.5 * CM,
            margin_left: 2.5 * CM,
            margin_right: 2.5 * CM,
        }
    }

    /// A4 landscape with 1 cm margins, used for spreadsheets.
    pub fn sheet_landscape() -> Self {
        PageGeometry {
            page_width: A4_HEIGHT,
            page_height: A4_WIDTH,
            margin_top: CM,
            margin_bottom: CM,
            margin_left: CM,
            margin_right: CM,
        }
    }

    pub fn content_width(&self) -> f32 {
        self.page_width - self.margin_left - self.margin_right
    }

    pub fn content_height(&self) -> f32 {
        self.page_height - self.margin_top - self.margin_bottom
    }

    pub(crate) fn content_top(&self) -> f32 {
        self.page_height - self.margin_top
    }
}

pub(crate) fn cm(value: f32) -> f32 {
    value * CM
}
