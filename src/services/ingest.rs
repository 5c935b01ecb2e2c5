use crate::dates::{normalize_rows, DateNormalizer, DateReport};
use crate::mapping::MappingConfig;
use crate::services::staging::{stage_rows, StageReport};
use crate::spreadsheet::{read_workbook, Sheet, SpreadsheetError};
use crate::table::{Table, UPSERT_ORDER};
use crate::warehouse::{Warehouse, WarehouseError};
use log::info;
use serde::Serialize;
use std::path::Path;

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error(transparent)]
    Spreadsheet(#[from] SpreadsheetError),
    #[error("staging {table} failed: {source}")]
    Staging {
        table: Table,
        #[source]
        source: WarehouseError,
    },
    #[error("mapping has no entry for table {0}")]
    Unmapped(Table),
}

#[derive(Debug, Clone, Serialize)]
pub struct TableIngest {
    pub table: Table,
    pub columns_found: usize,
    pub columns_expected: usize,
    #[serde(flatten)]
    pub staging: StageReport,
}

#[derive(Debug, Clone, Serialize)]
pub struct IngestReport {
    pub sheet: String,
    pub source_rows: usize,
    pub duplicate_source_rows: usize,
    pub valid_dates: usize,
    pub date_column_missing: bool,
    pub tables: Vec<TableIngest>,
}

impl IngestReport {
    pub fn staged_rows(&self) -> usize {
        self.tables.iter().map(|t| t.staging.staged).sum()
    }
}

pub fn ingest_workbook<W: Warehouse + ?Sized>(
    warehouse: &mut W,
    path: &Path,
    sheet: Option<&str>,
    mapping: &MappingConfig,
) -> Result<IngestReport, IngestError> {
    info!("Reading workbook {}", path.display());
    let sheet = read_workbook(path, sheet, mapping.header_row)?;
    ingest_sheet(warehouse, sheet, mapping)
}

/// Normalize dates, map the sheet onto every table and stage the result.
/// Tables are staged in dependency order; the first staging failure stops
/// the ingest.
pub fn ingest_sheet<W: Warehouse + ?Sized>(
    warehouse: &mut W,
    mut sheet: Sheet,
    mapping: &MappingConfig,
) -> Result<IngestReport, IngestError> {
    let source_rows = sheet.rows.len();
    let duplicate_source_rows = sheet.dedupe();
    if duplicate_source_rows > 0 {
        info!("Removed {} duplicate worksheet row(s)", duplicate_source_rows);
    }

    let normalizer = DateNormalizer::from_settings(&mapping.date);
    let DateReport { valid, degraded, .. } =
        normalize_rows(&mut sheet.rows, &sheet.headers, &mapping.date, &normalizer);

    // the normalized date is addressable like any other header
    let mut headers = sheet.headers.clone();
    if !degraded {
        headers.push(crate::mapping::DATE_KEY.to_string());
    }

    let mut tables = Vec::with_capacity(UPSERT_ORDER.len());
    for table in UPSERT_ORDER {
        let table_mapping = mapping.table(table).ok_or(IngestError::Unmapped(table))?;
        let plan = table_mapping.plan(&headers);
        let rows = sheet.rows.iter().map(|row| plan.apply(row)).collect();
        let staging =
            stage_rows(warehouse, table, rows).map_err(|source| IngestError::Staging { table, source })?;
        info!(
            "{}: {} row(s) staged ({} duplicate, {} without date)",
            table, staging.staged, staging.duplicates, staging.missing_date
        );
        tables.push(TableIngest {
            table,
            columns_found: plan.found(),
            columns_expected: plan.expected(),
            staging,
        });
    }

    Ok(IngestReport {
        sheet: sheet.name,
        source_rows,
        duplicate_source_rows,
        valid_dates: valid,
        date_column_missing: degraded,
        tables,
    })
}
