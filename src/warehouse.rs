//! The storage seam between the ETL stages and the database.
//!
//! The Postgres implementation lives in `crate::db::postgres`; tests use an
//! in-memory double with the same contracts.

use crate::mapping::{MappedRow, RowShapeError};
use crate::table::Table;
use chrono::NaiveDate;

#[derive(Debug, thiserror::Error)]
pub enum WarehouseError {
    #[error("database error: {0}")]
    Database(#[from] diesel::result::Error),
    #[error("staging table {table} holds a row without a date (row {position} in append order)")]
    MalformedStagingRow { table: Table, position: usize },
    #[error("row for {table} does not fit the table: {source}")]
    RowShape {
        table: Table,
        #[source]
        source: RowShapeError,
    },
    #[error("{table} row for {date} references a date missing from overview")]
    MissingParent { table: Table, date: NaiveDate },
    #[error("staging table for {0} does not exist")]
    MissingStagingTable(Table),
}

pub trait Warehouse {
    /// Rows waiting in the table's staging area, `None` when the staging
    /// table does not exist.
    fn staged_rows(&mut self, table: Table) -> Result<Option<usize>, WarehouseError>;

    fn main_rows(&mut self, table: Table) -> Result<usize, WarehouseError>;

    /// Append rows to the staging area in one transaction. Returns the number
    /// of rows written.
    fn append_staging(&mut self, table: Table, rows: &[MappedRow]) -> Result<usize, WarehouseError>;

    /// Merge staging into the main table and drain staging, atomically.
    /// Returns rows inserted plus rows updated. On error nothing changes.
    fn merge_staging(&mut self, table: Table) -> Result<usize, WarehouseError>;
}
