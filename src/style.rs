use crate::model::{Alignment, RenderStyle, Run};

pub const DEFAULT_FONT_SIZE: f32 = 11.0;
pub const LIST_INDENT: f32 = 18.0;
pub const BULLET_PREFIX: &str = "\u{2022} ";

const MIN_LEADING: f32 = 14.0;
const LEADING_RATIO: f32 = 1.45;
const NORMAL_SPACE_AFTER: f32 = 4.0;

/// Paragraph style classes the renderer distinguishes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StyleKind {
    Heading1,
    Heading2,
    Heading3,
    ListBullet,
    Normal,
}

impl StyleKind {
    /// Classify a source style name. Unknown names are `Normal`.
    pub fn classify(style_name: &str) -> Self {
        if style_name.contains("Heading 1") {
            StyleKind::Heading1
        } else if style_name.contains("Heading 2") {
            StyleKind::Heading2
        } else if style_name.contains("Heading 3") {
            StyleKind::Heading3
        } else if style_name.contains("List") {
            StyleKind::ListBullet
        } else {
            StyleKind::Normal
        }
    }

    pub fn is_heading(self) -> bool {
        matches!(
            self,
            StyleKind::Heading1 | StyleKind::Heading2 | StyleKind::Heading3
        )
    }

    /// Glyph prepended to the composed markup, if any.
    pub fn prefix(self) -> Option<&'static str> {
        match self {
            StyleKind::ListBullet => Some(BULLET_PREFIX),
            _ => None,
        }
    }
}

/// Mints render styles for one conversion. The name counter lives here, so
/// separate conversions never share it.
#[derive(Debug, Default)]
pub struct StyleResolver {
    minted: u32,
}

impl StyleResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn minted(&self) -> u32 {
        self.minted
    }

    fn next_name(&mut self) -> String {
        self.minted += 1;
        format!("_S{}", self.minted)
    }

    /// Resolve a style for `kind`. `base_size` is the first explicit run size;
    /// missing or unusable sizes fall back to 11pt.
    pub fn resolve(
        &mut self,
        kind: StyleKind,
        alignment: Alignment,
        base_size: Option<f32>,
    ) -> RenderStyle {
        let name = self.next_name();
        let (font_size, leading, space_before, space_after) = match kind {
            StyleKind::Heading1 => (18.0, 22.0, 12.0, 6.0),
            StyleKind::Heading2 => (14.0, 18.0, 10.0, 4.0),
            StyleKind::Heading3 => (12.0, 16.0, 8.0, 3.0),
            StyleKind::ListBullet | StyleKind::Normal => {
                let size = sanitize_size(base_size).unwrap_or(DEFAULT_FONT_SIZE);
                (size, normal_leading(size), 0.0, NORMAL_SPACE_AFTER)
            }
        };
        RenderStyle {
            name,
            font_size,
            leading,
            space_before,
            space_after,
            alignment,
            left_indent: if kind == StyleKind::ListBullet {
                LIST_INDENT
            } else {
                0.0
            },
            text_color: [0, 0, 0],
            bold: kind.is_heading(),
        }
    }

    /// Resolve by source style name.
    pub fn resolve_named(
        &mut self,
        style_name: &str,
        alignment: Alignment,
        base_size: Option<f32>,
    ) -> RenderStyle {
        self.resolve(StyleKind::classify(style_name), alignment, base_size)
    }
}

pub fn normal_leading(size: f32) -> f32 {
    (size * LEADING_RATIO).max(MIN_LEADING)
}

/// First run carrying a usable explicit size.
pub fn base_font_size(runs: &[Run]) -> Option<f32> {
    runs.iter().find_map(|r| sanitize_size(r.font_size))
}

fn sanitize_size(size: Option<f32>) -> Option<f32> {
    size.filter(|s| s.is_finite() && *s > 0.0)
}
