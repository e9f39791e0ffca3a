mod styles;

use std::collections::HashMap;
use std::io::{Cursor, Read, Seek};
use std::path::Path;

use crate::docx::read_zip_text;
use crate::error::Error;
use crate::model::{Cell, MergeSpan, Sheet, Workbook};

use styles::{CellFormats, parse_cell_formats};

const SML_NS: &str = "http://schemas.openxmlformats.org/spreadsheetml/2006/main";
const REL_NS: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";

/// Largest grid a worksheet can address (XFD1048576).
const MAX_ROWS: usize = 1_048_576;
const MAX_COLUMNS: usize = 16_384;

fn sml<'a>(node: roxmltree::Node<'a, 'a>, name: &str) -> Option<roxmltree::Node<'a, 'a>> {
    node.children()
        .find(|n| n.tag_name().name() == name && n.tag_name().namespace() == Some(SML_NS))
}

fn is_sml(node: roxmltree::Node, name: &str) -> bool {
    node.tag_name().name() == name && node.tag_name().namespace() == Some(SML_NS)
}

/// Zero-based (row, col) of an A1-style reference. `$` anchors are ignored.
pub(crate) fn parse_cell_ref(reference: &str) -> Option<(usize, usize)> {
    let reference = reference.replace('$', "");
    let split = reference.find(|c: char| c.is_ascii_digit())?;
    let (letters, digits) = reference.split_at(split);
    if letters.is_empty() || !letters.chars().all(|c| c.is_ascii_alphabetic()) {
        return None;
    }
    let col = letters
        .chars()
        .try_fold(0usize, |acc, c| {
            let v = (c.to_ascii_uppercase() as u8 - b'A') as usize + 1;
            acc.checked_mul(26)?.checked_add(v)
        })?;
    let row: usize = digits.parse().ok()?;
    if row == 0 || row > MAX_ROWS || col > MAX_COLUMNS {
        return None;
    }
    Some((row - 1, col - 1))
}

/// "A1:C3" as a merge span; a bare "B2" is a single cell.
fn parse_range(range: &str) -> Option<MergeSpan> {
    let (start, end) = range.split_once(':').unwrap_or((range, range));
    let (r1, c1) = parse_cell_ref(start)?;
    let (r2, c2) = parse_cell_ref(end)?;
    Some(MergeSpan {
        first_row: r1.min(r2),
        first_col: c1.min(c2),
        last_row: r1.max(r2),
        last_col: c1.max(c2),
    })
}

/// Concatenated text of a shared or inline string item, phonetic runs excluded.
fn string_item_text(si: roxmltree::Node) -> String {
    let mut text = String::new();
    for node in si.descendants() {
        if is_sml(node, "t") && !node.ancestors().any(|a| is_sml(a, "rPh")) {
            text.push_str(node.text().unwrap_or(""));
        }
    }
    text
}

fn parse_shared_strings(xml_content: Option<&str>) -> Vec<String> {
    let Some(Ok(xml)) = xml_content.map(roxmltree::Document::parse) else {
        return Vec::new();
    };
    xml.root_element()
        .children()
        .filter(|n| is_sml(*n, "si"))
        .map(string_item_text)
        .collect()
}

/// Numbers the way they read in the sheet: integral values without a
/// fractional part, others in shortest round-trip form.
fn format_number(raw: &str) -> String {
    match raw.trim().parse::<f64>() {
        Ok(v) if v.is_finite() && v.fract() == 0.0 && v.abs() < 1e15 => format!("{}", v as i64),
        Ok(v) if v.is_finite() => format!("{v}"),
        _ => raw.to_string(),
    }
}

/// Days since 1970-01-01 to a civil (year, month, day).
fn civil_from_days(days: i64) -> (i64, u32, u32) {
    let z = days + 719_468;
    let era = z.div_euclid(146_097);
    let doe = z.rem_euclid(146_097);
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = (doy - (153 * mp + 2) / 5 + 1) as u32;
    let month = (if mp < 10 { mp + 3 } else { mp - 9 }) as u32;
    let year = yoe + era * 400 + i64::from(month <= 2);
    (year, month, day)
}

/// Serial date (1900 system) as `YYYY-MM-DD HH:MM:SS`.
fn format_serial_date(raw: &str) -> Option<String> {
    let serial: f64 = raw.trim().parse().ok()?;
    if !serial.is_finite() || serial < 0.0 || serial > 2_958_465.0 {
        return None;
    }
    // Serial 60 is the phantom 1900-02-29; serials below it are offset by one day.
    let adjusted = if serial < 60.0 { serial + 1.0 } else { serial };
    let days = adjusted.floor() as i64;
    let seconds = ((adjusted - adjusted.floor()) * 86_400.0).round() as i64;
    let (days, seconds) = if seconds >= 86_400 { (days + 1, 0) } else { (days, seconds) };
    let (y, m, d) = civil_from_days(days - 25_569);
    Some(format!(
        "{y:04}-{m:02}-{d:02} {:02}:{:02}:{:02}",
        seconds / 3600,
        seconds / 60 % 60,
        seconds % 60
    ))
}

fn cell_value(c: roxmltree::Node, shared: &[String], is_date: bool) -> String {
    let v = sml(c, "v").and_then(|v| v.text());
    match c.attribute("t") {
        Some("s") => v
            .and_then(|i| i.trim().parse::<usize>().ok())
            .and_then(|i| shared.get(i))
            .cloned()
            .unwrap_or_default(),
        Some("inlineStr") => sml(c, "is").map(string_item_text).unwrap_or_default(),
        Some("b") => match v.map(str::trim) {
            Some("1") => "TRUE".to_string(),
            Some("0") => "FALSE".to_string(),
            other => other.unwrap_or("").to_string(),
        },
        Some("str") | Some("e") => v.unwrap_or("").to_string(),
        Some("d") => v.unwrap_or("").replace('T', " "),
        _ => match v {
            Some(raw) if is_date => format_serial_date(raw).unwrap_or_else(|| format_number(raw)),
            Some(raw) => format_number(raw),
            None => String::new(),
        },
    }
}

fn parse_sheet(
    name: &str,
    xml_content: &str,
    shared: &[String],
    formats: &CellFormats,
) -> Result<Sheet, Error> {
    let xml = roxmltree::Document::parse(xml_content)?;
    let root = xml.root_element();

    let mut rows: Vec<Vec<Cell>> = Vec::new();
    let mut max_column = 0usize;
    if let Some(sheet_data) = sml(root, "sheetData") {
        let mut next_row = 0usize;
        for row in sheet_data.children().filter(|n| is_sml(*n, "row")) {
            let ri = row
                .attribute("r")
                .and_then(|r| r.parse::<usize>().ok())
                .filter(|&r| r > 0)
                .map(|r| r - 1)
                .unwrap_or(next_row);
            if ri >= MAX_ROWS {
                log::warn!("sheet {name:?}: row {} is beyond the sheet grid; skipped", ri + 1);
                continue;
            }
            next_row = ri + 1;
            if rows.len() <= ri {
                rows.resize_with(ri + 1, Vec::new);
            }
            let cells = &mut rows[ri];

            for c in row.children().filter(|n| is_sml(*n, "c")) {
                let ci = match c.attribute("r") {
                    Some(reference) => match parse_cell_ref(reference) {
                        Some((_, col)) => col,
                        None => {
                            log::warn!("sheet {name:?}: bad cell reference {reference:?}; skipped");
                            continue;
                        }
                    },
                    None => cells.len(),
                };
                if ci >= MAX_COLUMNS {
                    continue;
                }
                let format = formats.get(c.attribute("s").and_then(|s| s.parse().ok()));
                let cell = Cell {
                    text: cell_value(c, shared, format.is_date),
                    background: format.fill,
                    bold: format.bold,
                    alignment: format.alignment,
                };
                if cells.len() <= ci {
                    cells.resize(ci + 1, Cell::default());
                }
                max_column = max_column.max(ci + 1);
                cells[ci] = cell;
            }
        }
    }

    let merges = sml(root, "mergeCells")
        .into_iter()
        .flat_map(|m| m.children().filter(|n| is_sml(*n, "mergeCell")))
        .filter_map(|m| m.attribute("ref").and_then(parse_range))
        .collect::<Vec<_>>();
    for m in &merges {
        max_column = max_column.max(m.last_col + 1);
    }

    Ok(Sheet {
        name: name.to_string(),
        rows,
        max_column,
        merges,
    })
}

fn parse_archive<R: Read + Seek>(zip: &mut zip::ZipArchive<R>) -> Result<Workbook, Error> {
    let workbook_xml = read_zip_text(zip, "xl/workbook.xml").ok_or_else(|| {
        Error::InvalidXlsx("missing xl/workbook.xml (is this an XLSX file?)".into())
    })?;
    let rels: HashMap<String, String> = read_zip_text(zip, "xl/_rels/workbook.xml.rels")
        .and_then(|xml| {
            let doc = roxmltree::Document::parse(&xml).ok()?;
            Some(
                doc.root_element()
                    .children()
                    .filter(|n| n.tag_name().name() == "Relationship")
                    .filter_map(|n| {
                        let id = n.attribute("Id")?;
                        let target = n.attribute("Target")?;
                        Some((id.to_string(), target.to_string()))
                    })
                    .collect(),
            )
        })
        .unwrap_or_default();
    let shared = parse_shared_strings(read_zip_text(zip, "xl/sharedStrings.xml").as_deref());
    let formats = parse_cell_formats(read_zip_text(zip, "xl/styles.xml").as_deref());

    let xml = roxmltree::Document::parse(&workbook_xml)?;
    let sheet_nodes = sml(xml.root_element(), "sheets")
        .ok_or_else(|| Error::InvalidXlsx("workbook has no sheets element".into()))?;

    let mut sheets = Vec::new();
    for node in sheet_nodes.children().filter(|n| is_sml(*n, "sheet")) {
        let name = node.attribute("name").unwrap_or("Sheet");
        let Some(target) = node.attribute((REL_NS, "id")).and_then(|id| rels.get(id)) else {
            log::warn!("sheet {name:?} has no worksheet part; skipped");
            continue;
        };
        let part = match target.strip_prefix('/') {
            Some(absolute) => absolute.to_string(),
            None => format!("xl/{target}"),
        };
        let Some(content) = read_zip_text(zip, &part) else {
            log::warn!("worksheet {part} missing for sheet {name:?}; skipped");
            continue;
        };
        sheets.push(parse_sheet(name, &content, &shared, &formats)?);
    }

    Ok(Workbook { sheets })
}

pub fn parse(path: &Path) -> Result<Workbook, Error> {
    let file = std::fs::File::open(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound | std::io::ErrorKind::PermissionDenied => Error::Io(
            std::io::Error::new(e.kind(), format!("{}: {}", e, path.display())),
        ),
        _ => Error::Io(e),
    })?;
    let mut zip = zip::ZipArchive::new(file)
        .map_err(|_| Error::InvalidXlsx("file is not a ZIP archive".into()))?;
    parse_archive(&mut zip)
}

pub fn parse_bytes(bytes: &[u8]) -> Result<Workbook, Error> {
    let mut zip = zip::ZipArchive::new(Cursor::new(bytes))
        .map_err(|_| Error::InvalidXlsx("data is not a ZIP archive".into()))?;
    parse_archive(&mut zip)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cell_refs_are_zero_based() {
        assert_eq!(parse_cell_ref("A1"), Some((0, 0)));
        assert_eq!(parse_cell_ref("$AB$10"), Some((9, 27)));
        assert_eq!(parse_cell_ref("A0"), None);
        assert_eq!(parse_cell_ref("12"), None);
        assert_eq!(
            parse_range("C3:A1"),
            Some(MergeSpan { first_row: 0, first_col: 0, last_row: 2, last_col: 2 })
        );
    }

    #[test]
    fn numbers_read_like_the_sheet() {
        assert_eq!(format_number("42"), "42");
        assert_eq!(format_number("3.0"), "3");
        assert_eq!(format_number("0.1"), "0.1");
        assert_eq!(format_number("1E-3"), "0.001");
        assert_eq!(format_number("abc"), "abc");
    }

    #[test]
    fn serial_dates_use_the_1900_system() {
        assert_eq!(format_serial_date("1").as_deref(), Some("1900-01-01 00:00:00"));
        assert_eq!(format_serial_date("61").as_deref(), Some("1900-03-01 00:00:00"));
        assert_eq!(format_serial_date("45306.5").as_deref(), Some("2024-01-15 12:00:00"));
    }

    #[test]
    fn sheet_cells_keep_absolute_positions() {
        let xml = format!(
            r#"<worksheet xmlns="{SML_NS}"><sheetData>
                <row r="1"><c r="A1" t="s"><v>0</v></c><c r="C1" t="b"><v>1</v></c></row>
                <row r="3"><c r="B3"><v>2.50</v></c><c r="D3" t="inlineStr"><is><t>x</t></is></c></row>
            </sheetData><mergeCells count="1"><mergeCell ref="A1:B1"/></mergeCells></worksheet>"#
        );
        let sheet = parse_sheet("S", &xml, &["Name".to_string()], &CellFormats::default()).unwrap();
        assert_eq!(sheet.rows.len(), 3);
        assert_eq!(sheet.rows[0][0].text, "Name");
        assert_eq!(sheet.rows[0][2].text, "TRUE");
        assert!(sheet.rows[1].is_empty());
        assert_eq!(sheet.rows[2][1].text, "2.5");
        assert_eq!(sheet.rows[2][3].text, "x");
        assert_eq!(sheet.max_column, 4);
        assert_eq!(sheet.merges.len(), 1);
    }

    #[test]
    fn references_beyond_the_grid_are_rejected() {
        assert_eq!(parse_cell_ref("XFD1048576"), Some((1_048_575, 16_383)));
        assert_eq!(parse_cell_ref("XFE1"), None);
        assert_eq!(parse_cell_ref("A1048577"), None);
        assert_eq!(parse_cell_ref("ZZZZZZZZZZZZZ1"), None);
        assert_eq!(parse_cell_ref("A18446744073709551616"), None);
    }

    #[test]
    fn huge_coordinates_are_skipped_not_allocated() {
        let xml = format!(
            r#"<worksheet xmlns="{SML_NS}"><sheetData>
                <row r="1"><c r="A1" t="inlineStr"><is><t>kept</t></is></c><c r="ZZZZZZZZZZZZZ1" t="inlineStr"><is><t>wide</t></is></c></row>
                <row r="18446744073709551615"><c t="inlineStr"><is><t>deep</t></is></c></row>
                <row r="5000000"><c t="inlineStr"><is><t>deeper</t></is></c></row>
            </sheetData><mergeCells count="1"><mergeCell ref="A1:ZZZZZZZZ9"/></mergeCells></worksheet>"#
        );
        let sheet = parse_sheet("S", &xml, &[], &CellFormats::default()).unwrap();
        assert_eq!(sheet.rows.len(), 1);
        assert_eq!(sheet.rows[0].len(), 1);
        assert_eq!(sheet.rows[0][0].text, "kept");
        assert_eq!(sheet.max_column, 1);
        assert!(sheet.merges.is_empty());
    }
}
