//! Worksheet reading via calamine.
//!
//! Every cell is rendered to text; typing happens later in the column mapper.

use crate::dates::calendar_fields;
use crate::mapping::{normalize_header, SourceRow};
use calamine::{open_workbook_auto, Data, Reader};
use chrono::{NaiveDate, NaiveDateTime};
use log::{debug, info};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum SpreadsheetError {
    #[error("failed to open workbook {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: calamine::Error,
    },
    #[error("workbook {0} has no worksheets")]
    NoWorksheets(PathBuf),
    #[error("failed to read worksheet {sheet}: {source}")]
    Worksheet {
        sheet: String,
        #[source]
        source: calamine::Error,
    },
    #[error("worksheet {sheet} has no header row at index {row}")]
    MissingHeader { sheet: String, row: usize },
}

#[derive(Debug, Clone)]
pub struct Sheet {
    pub name: String,
    /// Normalized, unique header names in column order.
    pub headers: Vec<String>,
    pub rows: Vec<SourceRow>,
}

impl Sheet {
    /// Drop exact duplicate rows, keeping the first occurrence. Returns the
    /// number of rows removed.
    pub fn dedupe(&mut self) -> usize {
        let before = self.rows.len();
        let mut seen = HashSet::with_capacity(before);
        self.rows.retain(|row| seen.insert(row.clone()));
        before - self.rows.len()
    }
}

/// Percent-decode a workbook location handed over by an event payload.
pub fn decode_input_path(raw: &str) -> String {
    match urlencoding::decode(raw) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => raw.to_string(),
    }
}

pub fn read_workbook(path: &Path, sheet: Option<&str>, header_row: usize) -> Result<Sheet, SpreadsheetError> {
    let mut workbook = open_workbook_auto(path).map_err(|source| SpreadsheetError::Open {
        path: path.to_path_buf(),
        source,
    })?;

    let name = match sheet {
        Some(s) => s.to_string(),
        None => workbook
            .sheet_names()
            .first()
            .cloned()
            .ok_or_else(|| SpreadsheetError::NoWorksheets(path.to_path_buf()))?,
    };
    let range = workbook
        .worksheet_range(&name)
        .map_err(|source| SpreadsheetError::Worksheet {
            sheet: name.clone(),
            source,
        })?;

    // calamine trims leading empty rows; header_row counts from the top of the sheet
    let first_row = range.start().map(|(r, _)| r as usize).unwrap_or(0);
    let cells: Vec<Vec<Data>> = range.rows().map(|r| r.to_vec()).collect();
    let sheet = sheet_from_cells(&name, &cells, header_row.saturating_sub(first_row))?;
    info!(
        "Worksheet {} loaded: {} row(s), {} column(s)",
        sheet.name,
        sheet.rows.len(),
        sheet.headers.len()
    );
    Ok(sheet)
}

pub fn sheet_from_cells(name: &str, cells: &[Vec<Data>], header_row: usize) -> Result<Sheet, SpreadsheetError> {
    let header_cells = cells.get(header_row).ok_or_else(|| SpreadsheetError::MissingHeader {
        sheet: name.to_string(),
        row: header_row,
    })?;
    let headers = unique_headers(header_cells);

    let mut rows = Vec::new();
    for (index, raw_row) in cells.iter().enumerate().skip(header_row + 1) {
        let row: SourceRow = raw_row
            .iter()
            .zip(&headers)
            .filter_map(|(cell, header)| render_cell(cell).map(|text| (header.clone(), text)))
            .collect();
        if row.is_empty() {
            debug!("Skipping empty worksheet row {}", index);
            continue;
        }
        rows.push(row);
    }

    Ok(Sheet {
        name: name.to_string(),
        headers,
        rows,
    })
}

fn unique_headers(cells: &[Data]) -> Vec<String> {
    let mut seen: BTreeMap<String, usize> = BTreeMap::new();
    cells
        .iter()
        .enumerate()
        .map(|(index, cell)| {
            let base = render_cell(cell)
                .map(|text| normalize_header(&text))
                .filter(|text| !text.is_empty())
                .unwrap_or_else(|| format!("Unnamed: {}", index));
            let count = seen.entry(base.clone()).or_insert(0);
            let header = if *count == 0 {
                base
            } else {
                format!("{}.{}", base, count)
            };
            *count += 1;
            header
        })
        .collect()
}

/// Text for one cell, or `None` for empty and error cells.
pub fn render_cell(cell: &Data) -> Option<String> {
    let text = match cell {
        Data::Empty | Data::Error(_) => return None,
        Data::String(s) => s.clone(),
        Data::Int(i) => i.to_string(),
        Data::Float(f) => render_float(*f),
        Data::Bool(b) => b.to_string(),
        Data::DateTime(dt) => {
            if dt.is_duration() {
                render_float(dt.as_f64())
            } else {
                match dt.as_datetime() {
                    Some(moment) => calendar_fields(moment.date()),
                    None => render_float(dt.as_f64()),
                }
            }
        }
        Data::DateTimeIso(s) => match parse_iso_date(s) {
            Some(date) => calendar_fields(date),
            None => s.clone(),
        },
        Data::DurationIso(s) => s.clone(),
    };
    if text.trim().is_empty() { None } else { Some(text) }
}

/// Date part of an ISO 8601 cell value, as OpenDocument sheets store dates.
fn parse_iso_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    if let Ok(moment) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(moment.date());
    }
    NaiveDate::parse_from_str(s.get(..10)?, "%Y-%m-%d").ok()
}

fn render_float(f: f64) -> String {
    if f.fract() == 0.0 && f.abs() < 1e15 {
        format!("{}", f as i64)
    } else {
        f.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_xlsxwriter::{ExcelDateTime, Format, Workbook};

    fn text(s: &str) -> Data {
        Data::String(s.to_string())
    }

    #[test]
    fn renders_cells_as_text() {
        assert_eq!(render_cell(&Data::Float(120.0)).as_deref(), Some("120"));
        assert_eq!(render_cell(&Data::Float(0.75)).as_deref(), Some("0.75"));
        assert_eq!(render_cell(&Data::Int(7)).as_deref(), Some("7"));
        assert_eq!(render_cell(&Data::Bool(true)).as_deref(), Some("true"));
        assert_eq!(render_cell(&text("  ")), None);
        assert_eq!(render_cell(&Data::Empty), None);
    }

    #[test]
    fn native_dates_honour_the_1904_date_system() {
        use calamine::{ExcelDateTime as CellDateTime, ExcelDateTimeType};

        let serial_1900 = CellDateTime::new(45366.0, ExcelDateTimeType::DateTime, false);
        let serial_1904 = CellDateTime::new(43904.0, ExcelDateTimeType::DateTime, true);
        for cell in [serial_1900, serial_1904] {
            assert_eq!(
                render_cell(&Data::DateTime(cell)).as_deref(),
                Some("YEAR=2024,MONTH=2,DAY_OF_MONTH=15")
            );
        }
    }

    #[test]
    fn iso_date_cells_take_the_calendar_path() {
        for raw in ["2024-03-15T00:00:00", "2024-03-15", "2024-03-15T18:30:00.5"] {
            assert_eq!(
                render_cell(&Data::DateTimeIso(raw.to_string())).as_deref(),
                Some("YEAR=2024,MONTH=2,DAY_OF_MONTH=15"),
                "{raw}"
            );
        }
        assert_eq!(
            render_cell(&Data::DateTimeIso("nicht datiert".to_string())).as_deref(),
            Some("nicht datiert")
        );
    }

    #[test]
    fn headers_are_normalized_and_disambiguated() {
        let cells = vec![
            vec![text("Kennzahlen 2024")],
            vec![text("Datum"), text("Gesamt \nTonage"), text("Takte"), Data::Empty, text("Takte ")],
            vec![text("15.03.2024"), Data::Float(120.0), Data::Float(5.0), Data::Empty, Data::Float(6.0)],
            vec![Data::Empty, Data::Empty],
        ];
        let sheet = sheet_from_cells("Daten", &cells, 1).unwrap();
        assert_eq!(sheet.headers, vec!["Datum", "Gesamt Tonage", "Takte", "Unnamed: 3", "Takte.1"]);
        assert_eq!(sheet.rows.len(), 1);
        let row = &sheet.rows[0];
        assert_eq!(row.get("Gesamt Tonage").map(String::as_str), Some("120"));
        assert_eq!(row.get("Takte.1").map(String::as_str), Some("6"));
        assert!(!row.contains_key("Unnamed: 3"));
    }

    #[test]
    fn missing_header_row_is_an_error() {
        let cells = vec![vec![text("only a title")]];
        assert!(matches!(
            sheet_from_cells("Daten", &cells, 1),
            Err(SpreadsheetError::MissingHeader { row: 1, .. })
        ));
    }

    #[test]
    fn dedupe_keeps_first_occurrence() {
        let cells = vec![
            vec![text("Datum"), text("Kipper")],
            vec![text("01.02.2024"), Data::Float(1.0)],
            vec![text("02.02.2024"), Data::Float(2.0)],
            vec![text("01.02.2024"), Data::Float(1.0)],
        ];
        let mut sheet = sheet_from_cells("Daten", &cells, 0).unwrap();
        assert_eq!(sheet.dedupe(), 1);
        assert_eq!(sheet.rows.len(), 2);
        assert_eq!(sheet.rows[1].get("Datum").map(String::as_str), Some("02.02.2024"));
    }

    #[test]
    fn decodes_percent_encoded_paths() {
        assert_eq!(decode_input_path("uploads/Kennzahlen%20M%C3%A4rz.xlsx"), "uploads/Kennzahlen März.xlsx");
        assert_eq!(decode_input_path("plain.xlsx"), "plain.xlsx");
    }

    #[test]
    fn reads_native_dates_as_calendar_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kennzahlen.xlsx");

        let mut workbook = Workbook::new();
        let worksheet = workbook.add_worksheet();
        worksheet.set_name("Daten").unwrap();
        worksheet.write_string(0, 0, "Produktion").unwrap();
        worksheet.write_string(1, 0, "Datum").unwrap();
        worksheet.write_string(1, 1, "Gesamt \nTonage").unwrap();
        let date_format = Format::new().set_num_format("dd.mm.yyyy");
        let date = ExcelDateTime::from_ymd(2024, 3, 15).unwrap();
        worksheet.write_datetime_with_format(2, 0, &date, &date_format).unwrap();
        worksheet.write_number(2, 1, 120).unwrap();
        worksheet.write_string(3, 0, "16.03.2024").unwrap();
        worksheet.write_number(3, 1, 121.5).unwrap();
        workbook.save(&path).unwrap();

        let sheet = read_workbook(&path, None, 1).unwrap();
        assert_eq!(sheet.name, "Daten");
        assert_eq!(sheet.headers, vec!["Datum", "Gesamt Tonage"]);
        assert_eq!(sheet.rows.len(), 2);
        assert_eq!(
            sheet.rows[0].get("Datum").map(String::as_str),
            Some("YEAR=2024,MONTH=2,DAY_OF_MONTH=15")
        );
        assert_eq!(sheet.rows[0].get("Gesamt Tonage").map(String::as_str), Some("120"));
        assert_eq!(sheet.rows[1].get("Datum").map(String::as_str), Some("16.03.2024"));
        assert_eq!(sheet.rows[1].get("Gesamt Tonage").map(String::as_str), Some("121.5"));
    }

    #[test]
    fn unknown_worksheet_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("leer.xlsx");
        let mut workbook = Workbook::new();
        workbook.add_worksheet().write_string(0, 0, "x").unwrap();
        workbook.save(&path).unwrap();

        assert!(matches!(
            read_workbook(&path, Some("Fehlt"), 1),
            Err(SpreadsheetError::Worksheet { .. })
        ));
    }
}
