//! In-memory [`Warehouse`] used by the service tests.

use crate::mapping::MappedRow;
use crate::table::{Table, UPSERT_ORDER};
use crate::warehouse::{Warehouse, WarehouseError};
use chrono::NaiveDate;
use std::collections::{BTreeMap, BTreeSet};

/// Mirrors the Postgres contracts: date-keyed main tables, append-ordered
/// staging, overview foreign keys and all-or-nothing merges.
#[derive(Debug, Default)]
pub struct MemoryWarehouse {
    main: BTreeMap<Table, BTreeMap<NaiveDate, MappedRow>>,
    /// A missing key means the staging table does not exist.
    staging: BTreeMap<Table, Vec<MappedRow>>,
    broken: BTreeSet<Table>,
}

impl MemoryWarehouse {
    pub fn new() -> Self {
        MemoryWarehouse {
            main: UPSERT_ORDER.iter().map(|t| (*t, BTreeMap::new())).collect(),
            staging: UPSERT_ORDER.iter().map(|t| (*t, Vec::new())).collect(),
            broken: BTreeSet::new(),
        }
    }

    pub fn without_staging_table(mut self, table: Table) -> Self {
        self.staging.remove(&table);
        self
    }

    /// Make every merge of `table` fail as a lost connection would.
    pub fn break_merges_of(&mut self, table: Table) {
        self.broken.insert(table);
    }

    /// Push a row straight into staging, bypassing the staging writer.
    pub fn push_staged(&mut self, table: Table, row: MappedRow) {
        self.staging.entry(table).or_default().push(row);
    }

    pub fn main_row(&self, table: Table, date: NaiveDate) -> Option<&MappedRow> {
        self.main.get(&table)?.get(&date)
    }

    pub fn staged(&self, table: Table) -> &[MappedRow] {
        self.staging.get(&table).map(Vec::as_slice).unwrap_or(&[])
    }
}

impl Warehouse for MemoryWarehouse {
    fn staged_rows(&mut self, table: Table) -> Result<Option<usize>, WarehouseError> {
        Ok(self.staging.get(&table).map(Vec::len))
    }

    fn main_rows(&mut self, table: Table) -> Result<usize, WarehouseError> {
        Ok(self.main.get(&table).map(BTreeMap::len).unwrap_or(0))
    }

    fn append_staging(&mut self, table: Table, rows: &[MappedRow]) -> Result<usize, WarehouseError> {
        let staging = self
            .staging
            .get_mut(&table)
            .ok_or(WarehouseError::MissingStagingTable(table))?;
        staging.extend_from_slice(rows);
        Ok(rows.len())
    }

    fn merge_staging(&mut self, table: Table) -> Result<usize, WarehouseError> {
        let staged = self
            .staging
            .get(&table)
            .ok_or(WarehouseError::MissingStagingTable(table))?;

        let mut latest = BTreeMap::new();
        for (position, row) in staged.iter().enumerate() {
            let date = row
                .date()
                .ok_or(WarehouseError::MalformedStagingRow { table, position })?;
            latest.insert(date, row.clone());
        }

        if table.references_overview() {
            let parents = self.main.get(&Table::Overview);
            if let Some(date) = latest
                .keys()
                .find(|d| !parents.is_some_and(|p| p.contains_key(*d)))
            {
                return Err(WarehouseError::MissingParent { table, date: *date });
            }
        }
        if self.broken.contains(&table) {
            return Err(WarehouseError::Database(diesel::result::Error::BrokenTransactionManager));
        }

        let affected = latest.len();
        self.main.entry(table).or_default().extend(latest);
        if let Some(staging) = self.staging.get_mut(&table) {
            staging.clear();
        }
        Ok(affected)
    }
}
