use pdf_writer::{Content, Name, Str};

use crate::fonts::{ASCENT_1000, DESCENT_1000, FontSet, FontVariant, to_winansi_bytes};
use crate::markup::Span;
use crate::model::Alignment;

/// Line height as a multiple of the tallest font size on the line.
pub(super) const LINE_HEIGHT_RATIO: f32 = 1.2;

pub(super) struct WordChunk {
    pub(super) pdf_font: String,
    pub(super) text: String,
    pub(super) font_size: f32,
    pub(super) color: [u8; 3],
    pub(super) x_offset: f32, // x relative to line start
    pub(super) width: f32,
    pub(super) underline: bool,
}

pub(super) struct TextLine {
    pub(super) chunks: Vec<WordChunk>,
    pub(super) total_width: f32,
    /// Largest font size used on the line.
    pub(super) max_font_size: f32,
    /// Ends a paragraph or precedes an explicit break; never justified.
    pub(super) hard_end: bool,
}

impl TextLine {
    pub(super) fn pitch(&self, leading: f32) -> f32 {
        leading.max(self.max_font_size * LINE_HEIGHT_RATIO)
    }
}

/// Styling a span falls back to when its markup leaves something unset.
#[derive(Clone, Copy, Debug)]
pub(super) struct BaseTextStyle {
    pub(super) font_size: f32,
    pub(super) color: [u8; 3],
    pub(super) bold: bool,
}

fn finish_line(chunks: &mut Vec<WordChunk>, base_size: f32, hard_end: bool) -> TextLine {
    let total_width = chunks.last().map(|c| c.x_offset + c.width).unwrap_or(0.0);
    let max_font_size = chunks
        .iter()
        .map(|c| c.font_size)
        .fold(base_size, f32::max);
    TextLine {
        chunks: std::mem::take(chunks),
        total_width,
        max_font_size,
        hard_end,
    }
}

/// Split a word wider than `max_width` into pieces that each fit.
fn split_long_word(word: &str, max_width: f32, width_of: impl Fn(&str) -> f32) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut current = String::new();
    for ch in word.chars() {
        current.push(ch);
        if current.chars().count() > 1 && width_of(&current) > max_width {
            current.pop();
            pieces.push(std::mem::take(&mut current));
            current.push(ch);
        }
    }
    if !current.is_empty() {
        pieces.push(current);
    }
    pieces
}

/// Layout styled spans into wrapped lines.
/// No space is inserted between spans unless the preceding text ended with
/// whitespace or the next span starts with it ("bold" + ", " → "bold,").
/// A `\n` inside a span forces a line break.
pub(super) fn build_paragraph_lines(
    spans: &[Span],
    base: BaseTextStyle,
    fonts: &FontSet,
    max_width: f32,
) -> Vec<TextLine> {
    let mut lines: Vec<TextLine> = Vec::new();
    let mut current_chunks: Vec<WordChunk> = Vec::new();
    let mut current_x: f32 = 0.0;
    let mut prev_ended_with_ws = false;
    let mut prev_space_w: f32 = 0.0;

    for span in spans {
        let variant = FontVariant::from_style(span.style.bold || base.bold, span.style.italic);
        let entry = fonts.get(variant);
        let font_size = span.style.size.unwrap_or(base.font_size);
        let color = span.style.color.unwrap_or(base.color);
        let space_w = entry.space_width(font_size);

        for (segment_idx, segment) in span.text.split('\n').enumerate() {
            if segment_idx > 0 {
                lines.push(finish_line(&mut current_chunks, base.font_size, true));
                current_x = 0.0;
                prev_ended_with_ws = false;
            }
            let starts_with_ws = segment.starts_with(char::is_whitespace);

            for (i, word) in segment.split_whitespace().enumerate() {
                let ww = entry.word_width(word, font_size);
                let need_space =
                    !current_chunks.is_empty() && (i > 0 || starts_with_ws || prev_ended_with_ws);
                // The space belongs to whichever span owns the whitespace.
                let effective_space_w = if i > 0 || starts_with_ws {
                    space_w
                } else {
                    prev_space_w
                };
                let proposed_x = if need_space {
                    current_x + effective_space_w
                } else {
                    current_x
                };

                if !current_chunks.is_empty() && proposed_x + ww > max_width {
                    lines.push(finish_line(&mut current_chunks, base.font_size, false));
                    current_x = 0.0;
                } else {
                    current_x = proposed_x;
                }

                let pieces = if ww > max_width {
                    split_long_word(word, max_width, |s| entry.word_width(s, font_size))
                } else {
                    vec![word.to_string()]
                };
                let piece_count = pieces.len();
                for (piece_idx, piece) in pieces.into_iter().enumerate() {
                    let width = entry.word_width(&piece, font_size);
                    current_chunks.push(WordChunk {
                        pdf_font: entry.pdf_name.clone(),
                        text: piece,
                        font_size,
                        color,
                        x_offset: current_x,
                        width,
                        underline: span.style.underline,
                    });
                    current_x += width;
                    if piece_idx + 1 < piece_count {
                        lines.push(finish_line(&mut current_chunks, base.font_size, false));
                        current_x = 0.0;
                    }
                }
            }
            if !segment.is_empty() {
                prev_ended_with_ws = segment.ends_with(char::is_whitespace);
            }
        }
        prev_space_w = space_w;
    }

    if !current_chunks.is_empty() || lines.is_empty() {
        lines.push(finish_line(&mut current_chunks, base.font_size, true));
    } else if let Some(last) = lines.last_mut() {
        last.hard_end = true;
    }
    lines
}

fn set_fill(content: &mut Content, [r, g, b]: [u8; 3]) {
    content.set_fill_rgb(r as f32 / 255.0, g as f32 / 255.0, b as f32 / 255.0);
}

/// Draw one laid-out line with its baseline at `y`, aligned within
/// `[x, x + width]`.
pub(super) fn render_line(
    content: &mut Content,
    line: &TextLine,
    alignment: Alignment,
    x: f32,
    width: f32,
    y: f32,
) {
    if line.chunks.is_empty() {
        return;
    }
    let is_justified =
        alignment == Alignment::Justify && !line.hard_end && line.chunks.len() > 1;

    let line_start_x = match alignment {
        Alignment::Center => x + (width - line.total_width) / 2.0,
        Alignment::Right => x + width - line.total_width,
        Alignment::Left | Alignment::Justify => x,
    };
    let extra_per_gap = if is_justified {
        ((width - line.total_width) / (line.chunks.len() - 1) as f32).max(0.0)
    } else {
        0.0
    };

    let mut decorations: Vec<(f32, f32, f32, f32, [u8; 3])> = Vec::new();
    let mut current_color: Option<[u8; 3]> = None;
    let mut cur_font_name = "";
    let mut cur_font_size: f32 = -1.0;

    content.begin_text();
    let mut td_x = 0.0_f32;
    let mut td_y = 0.0_f32;
    for (chunk_idx, chunk) in line.chunks.iter().enumerate() {
        let cx = line_start_x + chunk.x_offset + chunk_idx as f32 * extra_per_gap;

        if current_color != Some(chunk.color) {
            set_fill(content, chunk.color);
            current_color = Some(chunk.color);
        }
        if cur_font_name != chunk.pdf_font || cur_font_size != chunk.font_size {
            content.set_font(Name(chunk.pdf_font.as_bytes()), chunk.font_size);
            cur_font_name = chunk.pdf_font.as_str();
            cur_font_size = chunk.font_size;
        }

        content.next_line(cx - td_x, y - td_y);
        td_x = cx;
        td_y = y;
        content.show(Str(&to_winansi_bytes(&chunk.text)));

        if chunk.underline {
            let thick = (chunk.font_size * 0.05).max(0.5);
            let ul_y = y - chunk.font_size * 0.12;
            // Underline the gap to the next underlined word too.
            let extends = line
                .chunks
                .get(chunk_idx + 1)
                .filter(|next| next.underline)
                .map(|next| {
                    line_start_x + next.x_offset + (chunk_idx + 1) as f32 * extra_per_gap
                });
            let w = extends.map_or(chunk.width, |next_x| next_x - cx);
            decorations.push((cx, ul_y - thick, w, thick, chunk.color));
        }
    }
    content.end_text();

    for &(dx, dy, dw, dh, color) in &decorations {
        if current_color != Some(color) {
            set_fill(content, color);
            current_color = Some(color);
        }
        content.rect(dx, dy, dw, dh).fill_nonzero();
    }
    if current_color != Some([0, 0, 0]) {
        content.set_fill_gray(0.0);
    }
}

/// Baseline of a line whose slot starts at `top`, with the glyph box
/// centered in the slot.
pub(super) fn baseline_in(top: f32, pitch: f32, font_size: f32) -> f32 {
    top - (pitch + font_size * (ASCENT_1000 + DESCENT_1000) / 1000.0) / 2.0
}

/// Total height of `lines` at the given leading.
pub(super) fn lines_height(lines: &[TextLine], leading: f32) -> f32 {
    lines.iter().map(|l| l.pitch(leading)).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::markup::parse;
    use pdf_writer::{Pdf, Ref};

    fn fonts() -> FontSet {
        let mut pdf = Pdf::new();
        let mut next = 1;
        let mut alloc = || {
            next += 1;
            Ref::new(next)
        };
        FontSet::register(&mut pdf, &mut alloc)
    }

    const BASE: BaseTextStyle = BaseTextStyle {
        font_size: 10.0,
        color: [0, 0, 0],
        bold: false,
    };

    #[test]
    fn words_wrap_at_max_width() {
        let fonts = fonts();
        let spans = parse("alpha beta gamma delta epsilon zeta eta theta");
        let lines = build_paragraph_lines(&spans, BASE, &fonts, 80.0);
        assert!(lines.len() > 1);
        for line in &lines {
            assert!(line.total_width <= 80.0 + 1e-3);
        }
        assert!(lines.last().is_some_and(|l| l.hard_end));
        assert!(!lines[0].hard_end);
    }

    #[test]
    fn adjacent_spans_join_without_space() {
        let fonts = fonts();
        let spans = parse("<b>bold</b>, plain");
        let lines = build_paragraph_lines(&spans, BASE, &fonts, 500.0);
        assert_eq!(lines.len(), 1);
        let chunks = &lines[0].chunks;
        assert_eq!(chunks[0].pdf_font, "F2");
        assert_eq!(chunks[1].text, ",");
        assert!((chunks[1].x_offset - chunks[0].width).abs() < 1e-4);
    }

    #[test]
    fn newline_forces_break_and_size_raises_pitch() {
        let fonts = fonts();
        let spans = parse("one\ntwo <font size=\"20.0\">big</font>");
        let lines = build_paragraph_lines(&spans, BASE, &fonts, 500.0);
        assert_eq!(lines.len(), 2);
        assert!(lines[0].hard_end);
        assert_eq!(lines[1].max_font_size, 20.0);
        assert!((lines[1].pitch(12.0) - 24.0).abs() < 1e-3);
        assert!((lines[0].pitch(12.0) - 12.0).abs() < 1e-3);
    }

    #[test]
    fn overlong_word_is_split() {
        let fonts = fonts();
        let spans = parse("WWWWWWWWWWWWWWWWWWWW");
        let lines = build_paragraph_lines(&spans, BASE, &fonts, 40.0);
        assert!(lines.len() > 1);
        let joined: String = lines
            .iter()
            .flat_map(|l| l.chunks.iter().map(|c| c.text.as_str()))
            .collect();
        assert_eq!(joined, "WWWWWWWWWWWWWWWWWWWW");
    }

    #[test]
    fn empty_input_gives_one_empty_line() {
        let lines = build_paragraph_lines(&[], BASE, &fonts(), 100.0);
        assert_eq!(lines.len(), 1);
        assert!(lines[0].chunks.is_empty());
    }
}
