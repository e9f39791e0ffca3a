use crate::model::Alignment;

use super::{SML_NS, sml};

/// Resolved formatting of one `cellXfs` entry.
#[derive(Clone, Debug, Default, PartialEq)]
pub(super) struct CellFormat {
    pub(super) bold: bool,
    pub(super) fill: Option<[u8; 3]>,
    pub(super) alignment: Option<Alignment>,
    pub(super) is_date: bool,
}

/// Cell formats indexed by the `s` attribute of a cell.
#[derive(Debug, Default)]
pub(super) struct CellFormats {
    formats: Vec<CellFormat>,
}

impl CellFormats {
    pub(super) fn get(&self, index: Option<usize>) -> CellFormat {
        index
            .and_then(|i| self.formats.get(i))
            .cloned()
            .unwrap_or_default()
    }
}

/// Solid fill color, alpha stripped. White and black are treated as "no
/// custom background".
fn solid_fill(fill: roxmltree::Node) -> Option<[u8; 3]> {
    let pattern = sml(fill, "patternFill")?;
    match pattern.attribute("patternType") {
        None | Some("none") => return None,
        _ => {}
    }
    let rgb = sml(pattern, "fgColor")?.attribute("rgb")?;
    if rgb.len() < 6 || !rgb.is_ascii() {
        return None;
    }
    let hex = &rgb[rgb.len() - 6..];
    if hex.eq_ignore_ascii_case("FFFFFF") || hex.eq_ignore_ascii_case("000000") {
        return None;
    }
    crate::docx::parse_hex_color(hex)
}

fn font_is_bold(font: roxmltree::Node) -> bool {
    sml(font, "b").is_some_and(|b| b.attribute("val").is_none_or(|v| v != "0" && v != "false"))
}

fn horizontal_alignment(val: &str) -> Option<Alignment> {
    match val {
        "left" | "general" => Some(Alignment::Left),
        "center" => Some(Alignment::Center),
        "right" => Some(Alignment::Right),
        _ => None,
    }
}

/// Built-in number formats that display dates.
fn is_builtin_date_format(id: u32) -> bool {
    matches!(id, 14..=22 | 45..=47)
}

fn is_custom_date_format(code: &str) -> bool {
    let mut in_quotes = false;
    let mut in_brackets = false;
    for c in code.chars() {
        match c {
            '"' => in_quotes = !in_quotes,
            '[' if !in_quotes => in_brackets = true,
            ']' if !in_quotes => in_brackets = false,
            'd' | 'D' | 'y' | 'Y' if !in_quotes && !in_brackets => return true,
            _ => {}
        }
    }
    false
}

fn children<'a>(
    node: Option<roxmltree::Node<'a, 'a>>,
    name: &'static str,
) -> impl Iterator<Item = roxmltree::Node<'a, 'a>> {
    node.into_iter().flat_map(move |n| {
        n.children()
            .filter(move |c| c.tag_name().name() == name && c.tag_name().namespace() == Some(SML_NS))
    })
}

pub(super) fn parse_cell_formats(xml_content: Option<&str>) -> CellFormats {
    let Some(xml_content) = xml_content else {
        return CellFormats::default();
    };
    let Ok(xml) = roxmltree::Document::parse(xml_content) else {
        log::warn!("styles.xml is not well-formed; cell formatting ignored");
        return CellFormats::default();
    };
    let root = xml.root_element();

    let bold_fonts: Vec<bool> = children(sml(root, "fonts"), "font").map(font_is_bold).collect();
    let fills: Vec<Option<[u8; 3]>> = children(sml(root, "fills"), "fill").map(solid_fill).collect();
    let date_formats: Vec<u32> = children(sml(root, "numFmts"), "numFmt")
        .filter(|n| n.attribute("formatCode").is_some_and(is_custom_date_format))
        .filter_map(|n| n.attribute("numFmtId")?.parse().ok())
        .collect();

    let index = |node: roxmltree::Node, attr: &str| -> Option<usize> {
        node.attribute(attr).and_then(|v| v.parse().ok())
    };

    let formats = children(sml(root, "cellXfs"), "xf")
        .map(|xf| {
            let num_fmt = index(xf, "numFmtId").unwrap_or(0) as u32;
            CellFormat {
                bold: index(xf, "fontId")
                    .and_then(|i| bold_fonts.get(i).copied())
                    .unwrap_or(false),
                fill: index(xf, "fillId").and_then(|i| fills.get(i).copied().flatten()),
                alignment: sml(xf, "alignment")
                    .and_then(|a| a.attribute("horizontal"))
                    .and_then(horizontal_alignment),
                is_date: is_builtin_date_format(num_fmt) || date_formats.contains(&num_fmt),
            }
        })
        .collect();
    CellFormats { formats }
}
