use crate::mapping::MappedRow;
use crate::table::Table;
use crate::warehouse::{Warehouse, WarehouseError};
use log::{info, warn};
use serde::Serialize;
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StageReport {
    pub received: usize,
    pub duplicates: usize,
    pub missing_date: usize,
    pub staged: usize,
}

/// Write mapped rows to the staging area of `table`.
///
/// Exact duplicate rows are dropped (first occurrence kept), then rows whose
/// date is null. The remainder is appended in one transaction.
pub fn stage_rows<W: Warehouse + ?Sized>(
    warehouse: &mut W,
    table: Table,
    rows: Vec<MappedRow>,
) -> Result<StageReport, WarehouseError> {
    let received = rows.len();

    let mut seen = HashSet::with_capacity(received);
    let unique: Vec<MappedRow> = rows.into_iter().filter(|row| seen.insert(row.clone())).collect();
    let duplicates = received - unique.len();

    let deduped = unique.len();
    let dated: Vec<MappedRow> = unique.into_iter().filter(|row| row.date().is_some()).collect();
    let missing_date = deduped - dated.len();
    if missing_date > 0 {
        warn!("{}: dropping {} row(s) without a valid date", table, missing_date);
    }

    if dated.is_empty() {
        info!("{}: nothing to stage", table);
        return Ok(StageReport {
            received,
            duplicates,
            missing_date,
            staged: 0,
        });
    }

    info!("Writing {} row(s) to staging table {}", dated.len(), table.staging_name());
    let staged = warehouse.append_staging(table, &dated)?;
    Ok(StageReport {
        received,
        duplicates,
        missing_date,
        staged,
    })
}
