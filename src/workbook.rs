//! Question workbook IO: writes the three sheets with `rust_xlsxwriter` and
//! reads them back into typed records with `calamine`.

use anyhow::{Context, Result};
use calamine::{open_workbook_from_rs, Data, Reader, Xlsx};
use rust_xlsxwriter::{Format, Workbook};
use std::collections::HashMap;
use std::io::Cursor;
use std::path::Path;
use tracing::{info, warn};

use crate::classifier::Shape;
use crate::records::{format_number, Cell, QuestionSheets, SheetRecord, SheetRow};

/// Longest string Excel stores in a single cell.
const EXCEL_MAX_CELL_CHARS: usize = 32_767;

/// Raw sheet contents before record conversion.
#[derive(Debug, Clone)]
pub struct RawSheet {
    pub name: String,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

// ============================================================================
// Writing
// ============================================================================

/// Write all three sheets to `path`, overwriting any existing file.
pub fn write_workbook(sheets: &QuestionSheets, path: &Path) -> Result<()> {
    let mut workbook = build_workbook(sheets)?;
    workbook
        .save(path)
        .with_context(|| format!("Failed to save workbook: {:?}", path))?;

    info!(
        "Wrote workbook {:?} ({} objective, {} subjective, {} descriptive rows)",
        path,
        sheets.objective.len(),
        sheets.subjective.len(),
        sheets.descriptive.len()
    );
    Ok(())
}

fn build_workbook(sheets: &QuestionSheets) -> Result<Workbook> {
    let mut workbook = Workbook::new();
    write_sheet(&mut workbook, &sheets.objective)?;
    write_sheet(&mut workbook, &sheets.subjective)?;
    write_sheet(&mut workbook, &sheets.descriptive)?;
    Ok(workbook)
}

/// Header row plus one row per record. Empty sheets still get their headers.
fn write_sheet<R: SheetRecord>(workbook: &mut Workbook, records: &[R]) -> Result<()> {
    let header_format = Format::new().set_bold();
    let worksheet = workbook.add_worksheet();
    worksheet.set_name(R::SHAPE.sheet_name())?;

    for (col, name) in R::columns().iter().enumerate() {
        worksheet.write_string_with_format(0, col as u16, name, &header_format)?;
    }

    for (idx, record) in records.iter().enumerate() {
        let row = (idx + 1) as u32;
        for (col, cell) in record.to_row().into_iter().enumerate() {
            let col = col as u16;
            match cell {
                Cell::Text(text) if !text.is_empty() => {
                    worksheet.write_string(row, col, excel_text(text))?;
                }
                Cell::Number(value) => {
                    worksheet.write_number(row, col, value)?;
                }
                Cell::Text(_) | Cell::Empty => {}
            }
        }
    }

    Ok(())
}

fn excel_text(text: String) -> String {
    if text.chars().count() <= EXCEL_MAX_CELL_CHARS {
        return text;
    }
    warn!(
        "Truncating {} chars of cell text to Excel's {} char limit",
        text.chars().count(),
        EXCEL_MAX_CELL_CHARS
    );
    text.chars().take(EXCEL_MAX_CELL_CHARS).collect()
}

// ============================================================================
// Reading
// ============================================================================

/// Read a question workbook from disk.
pub fn read_workbook(path: &Path) -> Result<QuestionSheets> {
    let data = std::fs::read(path).with_context(|| format!("Failed to read workbook: {:?}", path))?;
    read_workbook_bytes(&data)
}

/// Read a question workbook from memory. Sheets are matched to shapes by
/// name; unrecognised sheets are skipped, missing ones read as empty.
pub fn read_workbook_bytes(data: &[u8]) -> Result<QuestionSheets> {
    let raw_sheets = parse_excel_xlsx(data)?;
    let mut sheets = QuestionSheets::default();

    for raw in &raw_sheets {
        match shape_for_sheet(&raw.name) {
            Some(Shape::Objective) => sheets.objective = records_from_sheet(raw)?,
            Some(Shape::Subjective) => sheets.subjective = records_from_sheet(raw)?,
            Some(Shape::Descriptive) => sheets.descriptive = records_from_sheet(raw)?,
            None => warn!("Skipping unrecognised sheet '{}'", raw.name),
        }
    }

    Ok(sheets)
}

fn shape_for_sheet(name: &str) -> Option<Shape> {
    Shape::ALL
        .into_iter()
        .find(|shape| name.contains(shape.sheet_name()))
}

/// Convert a raw sheet into records, requiring every column of the schema.
fn records_from_sheet<R: SheetRecord>(raw: &RawSheet) -> Result<Vec<R>> {
    let index: HashMap<String, usize> = raw
        .headers
        .iter()
        .enumerate()
        .map(|(i, h)| (h.trim().to_string(), i))
        .collect();

    let missing: Vec<String> = R::columns()
        .into_iter()
        .filter(|c| !index.contains_key(c))
        .collect();
    if !missing.is_empty() {
        anyhow::bail!(
            "Sheet '{}' is missing column(s): {}",
            raw.name,
            missing.join(", ")
        );
    }

    raw.rows
        .iter()
        .enumerate()
        .map(|(i, values)| {
            R::from_row(&SheetRow::new(&index, values))
                .with_context(|| format!("Sheet '{}' row {}", raw.name, i + 2))
        })
        .collect()
}

/// Parse every worksheet of an xlsx file. First row of each sheet is headers.
fn parse_excel_xlsx(data: &[u8]) -> Result<Vec<RawSheet>> {
    let cursor = Cursor::new(data);
    let mut workbook: Xlsx<_> =
        open_workbook_from_rs(cursor).context("Failed to open Excel workbook")?;

    let sheet_names: Vec<String> = workbook.sheet_names().to_vec();
    let mut sheets = Vec::new();

    for name in &sheet_names {
        let range = match workbook.worksheet_range(name) {
            Ok(r) => r,
            Err(e) => {
                warn!("Skipping sheet '{}': {}", name, e);
                continue;
            }
        };

        if let Some(sheet) = range_to_raw_sheet(name, &range) {
            sheets.push(sheet);
        }
    }

    Ok(sheets)
}

/// Convert a calamine Range into a RawSheet. First row = headers.
/// Header-only sheets are kept (an empty shape is still a sheet).
fn range_to_raw_sheet(name: &str, range: &calamine::Range<Data>) -> Option<RawSheet> {
    let mut row_iter = range.rows();

    let header_row = row_iter.next()?;
    let headers: Vec<String> = header_row.iter().map(cell_to_string).collect();

    if headers.iter().all(|h| h.is_empty()) {
        return None;
    }

    let rows = row_iter
        .map(|row| row.iter().map(cell_to_string).collect::<Vec<_>>())
        .filter(|values| !values.iter().all(|v| v.is_empty()))
        .collect();

    Some(RawSheet {
        name: name.to_string(),
        headers,
        rows,
    })
}

/// Convert a calamine cell to a string representation.
fn cell_to_string(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.clone(),
        Data::Int(i) => i.to_string(),
        Data::Float(f) => format_number(*f),
        Data::Bool(b) => b.to_string(),
        Data::DateTime(dt) => format_number(dt.as_f64()),
        Data::DateTimeIso(s) => s.clone(),
        Data::DurationIso(s) => s.clone(),
        Data::Error(e) => format!("#ERR:{:?}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembler::assemble;
    use crate::records::{DescriptiveRecord, ObjectiveRecord, RubricLine, SubjectiveRecord};
    use crate::segmenter::segment;

    fn sample_sheets() -> QuestionSheets {
        let questions = segment(
            "1) What is 2+2? a) 3 b) 4 c) 5 d) 6\n\
             2) The ____ rises in the east.\n\
             3) Explain the water cycle.\n\
             4) Define osmosis.",
        );
        let solutions = segment("1) (b) because 2+2=4\n2) sun\n3) Evaporation, condensation\n");
        assemble(&questions, &solutions).sheets
    }

    fn header_row(data: &[u8], sheet: &str) -> Vec<String> {
        parse_excel_xlsx(data)
            .unwrap()
            .into_iter()
            .find(|s| s.name == sheet)
            .unwrap()
            .headers
    }

    #[test]
    fn test_workbook_roundtrip_preserves_rows_and_columns() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("intermediate_output.xlsx");
        let sheets = sample_sheets();

        write_workbook(&sheets, &path).unwrap();
        let back = read_workbook(&path).unwrap();

        assert_eq!(back.objective.len(), 1);
        assert_eq!(back.subjective.len(), 1);
        assert_eq!(back.descriptive.len(), 2);
        assert_eq!(back, sheets);

        let data = std::fs::read(&path).unwrap();
        assert_eq!(header_row(&data, "Objective"), ObjectiveRecord::columns());
        assert_eq!(header_row(&data, "Subjective"), SubjectiveRecord::columns());
        assert_eq!(header_row(&data, "Descriptive"), DescriptiveRecord::columns());
    }

    #[test]
    fn test_empty_sheets_keep_headers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.xlsx");

        write_workbook(&QuestionSheets::default(), &path).unwrap();
        let data = std::fs::read(&path).unwrap();
        let raw = parse_excel_xlsx(&data).unwrap();

        assert_eq!(raw.len(), 3);
        assert!(raw.iter().all(|s| s.rows.is_empty()));
        assert_eq!(read_workbook_bytes(&data).unwrap(), QuestionSheets::default());
    }

    #[test]
    fn test_enriched_values_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("final_output.xlsx");
        let mut sheets = sample_sheets();
        sheets.descriptive[0].meta.marks = None;
        sheets.descriptive[0].answer_content = "Rubrics".to_string();
        sheets.descriptive[0].rubric_lines = vec![RubricLine {
            rubric: "Names all stages".to_string(),
            marks: Some(2.0),
        }];
        sheets.descriptive[0].answer_weightage = Some(2.0);

        write_workbook(&sheets, &path).unwrap();
        assert_eq!(read_workbook(&path).unwrap(), sheets);
    }

    #[test]
    fn test_missing_column_is_error() {
        let raw = RawSheet {
            name: "Objective".to_string(),
            headers: vec!["Question Label".to_string()],
            rows: vec![vec!["Q1".to_string()]],
        };
        let err = records_from_sheet::<ObjectiveRecord>(&raw).unwrap_err();
        assert!(err.to_string().contains("missing column"));
    }

    #[test]
    fn test_shape_for_sheet() {
        assert_eq!(shape_for_sheet("Objective"), Some(Shape::Objective));
        assert_eq!(shape_for_sheet("Descriptive (2)"), Some(Shape::Descriptive));
        assert_eq!(shape_for_sheet("Notes"), None);
    }

    #[test]
    fn test_excel_text_truncates() {
        let long = "x".repeat(EXCEL_MAX_CELL_CHARS + 10);
        assert_eq!(excel_text(long).chars().count(), EXCEL_MAX_CELL_CHARS);
        assert_eq!(excel_text("short".to_string()), "short");
    }
}
