mod common;

use relayout::{CancelFlag, Conversion, Error, convert_xlsx_to_pdf};

use common::{TestSheet, page_sizes, pdf_text, xlsx_bytes};

fn assert_a4_landscape(sizes: &[(f32, f32)]) {
    assert!(!sizes.is_empty());
    for &(w, h) in sizes {
        assert!((w - 841.9).abs() < 1.0, "width {w}");
        assert!((h - 595.3).abs() < 1.0, "height {h}");
    }
}

#[test]
fn every_sheet_gets_a_heading_and_its_cells() {
    common::init_logging();
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("book.xlsx");
    let output = dir.path().join("book.pdf");
    let bytes = xlsx_bytes(&[
        TestSheet {
            name: "Budget",
            cells: vec![
                ("A1", "Category", Some(1)),
                ("B1", "Amount", Some(1)),
                ("A2", "Travel", None),
                ("B2", "1200", Some(2)),
            ],
            merges: vec![],
        },
        TestSheet {
            name: "Notes",
            cells: vec![("C4", "Approved", None)],
            merges: vec![],
        },
    ]);
    std::fs::write(&input, bytes).unwrap();

    convert_xlsx_to_pdf(&input, &output, &CancelFlag::new()).unwrap();

    let text = pdf_text(&output);
    for word in ["Budget", "Notes", "Category", "Travel", "1200", "Approved"] {
        assert!(text.contains(word), "{word:?} missing from {text:?}");
    }
    assert_a4_landscape(&page_sizes(&output));
}

#[test]
fn merged_ranges_render_their_anchor_once() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("merged.xlsx");
    let output = dir.path().join("merged.pdf");
    let bytes = xlsx_bytes(&[TestSheet {
        name: "Plan",
        cells: vec![
            ("A1", "Schedule", Some(2)),
            ("A2", "Mon", None),
            ("B2", "Tue", None),
            ("C2", "Wed", None),
        ],
        merges: vec!["A1:C1"],
    }]);
    std::fs::write(&input, bytes).unwrap();

    convert_xlsx_to_pdf(&input, &output, &CancelFlag::new()).unwrap();

    let text = pdf_text(&output);
    assert_eq!(text.matches("Schedule").count(), 1, "{text:?}");
    assert!(text.contains("Wed"));
}

#[test]
fn long_sheets_repeat_the_header_row() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("long.xlsx");
    let output = dir.path().join("long.pdf");
    let refs: Vec<(String, String)> = (2..=160)
        .map(|r| (format!("A{r}"), format!("entry {r}")))
        .collect();
    let mut cells: Vec<(&str, &str, Option<u32>)> = vec![("A1", "Identifier", None)];
    cells.extend(refs.iter().map(|(r, t)| (r.as_str(), t.as_str(), None)));
    let bytes = xlsx_bytes(&[TestSheet {
        name: "Log",
        cells,
        merges: vec![],
    }]);
    std::fs::write(&input, bytes).unwrap();

    convert_xlsx_to_pdf(&input, &output, &CancelFlag::new()).unwrap();

    let sizes = page_sizes(&output);
    assert!(sizes.len() > 1);
    assert_a4_landscape(&sizes);
    assert!(pdf_text(&output).matches("Identifier").count() > 1);
}

#[test]
fn sheets_without_values_keep_only_their_heading() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("blank.xlsx");
    let output = dir.path().join("blank.pdf");
    let bytes = xlsx_bytes(&[TestSheet {
        name: "Scratch",
        cells: vec![],
        merges: vec![],
    }]);
    std::fs::write(&input, bytes).unwrap();

    convert_xlsx_to_pdf(&input, &output, &CancelFlag::new()).unwrap();

    assert!(pdf_text(&output).contains("Scratch"));
}

#[test]
fn workbook_part_is_required() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("hollow.xlsx");
    let output = dir.path().join("hollow.pdf");
    std::fs::write(
        &input,
        common::zip_bytes(&[("docProps/app.xml", b"<Properties/>".as_slice())]),
    )
    .unwrap();

    let err = convert_xlsx_to_pdf(&input, &output, &CancelFlag::new()).unwrap_err();
    assert!(matches!(err, Error::InvalidXlsx(_)), "{err}");
    assert!(!output.exists());
}

#[test]
fn conversion_picks_xlsx_by_extension() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("Totals.XLSX");
    let bytes = xlsx_bytes(&[TestSheet {
        name: "Sum",
        cells: vec![("A1", "Total", None)],
        merges: vec![],
    }]);
    std::fs::write(&input, bytes).unwrap();

    let conversion = Conversion::from_paths(&input, None).unwrap();
    assert_eq!(conversion.output, dir.path().join("Totals_converted.pdf"));
    conversion.run(&CancelFlag::new()).unwrap();
    assert!(pdf_text(&conversion.output).contains("Total"));
}
