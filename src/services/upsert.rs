use crate::table::{Table, UPSERT_ORDER};
use crate::warehouse::Warehouse;
use log::{error, info, warn};
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    MissingStagingTable,
    EmptyStaging,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TableOutcome {
    Upserted {
        rows: usize,
        /// Main-table row counts around the merge, when they could be read.
        before: Option<usize>,
        after: Option<usize>,
    },
    Skipped {
        reason: SkipReason,
    },
    Failed {
        error: String,
    },
}

impl TableOutcome {
    pub fn rows(&self) -> usize {
        match self {
            TableOutcome::Upserted { rows, .. } => *rows,
            _ => 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableReport {
    pub table: Table,
    #[serde(flatten)]
    pub outcome: TableOutcome,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UpsertSummary {
    pub tables: Vec<TableReport>,
}

impl UpsertSummary {
    pub fn total_rows(&self) -> usize {
        self.tables.iter().map(|t| t.outcome.rows()).sum()
    }

    pub fn is_success(&self) -> bool {
        !self
            .tables
            .iter()
            .any(|t| matches!(t.outcome, TableOutcome::Failed { .. }))
    }

    pub fn failures(&self) -> impl Iterator<Item = (Table, &str)> {
        self.tables.iter().filter_map(|t| match &t.outcome {
            TableOutcome::Failed { error } => Some((t.table, error.as_str())),
            _ => None,
        })
    }

    /// Tables that were actually merged.
    pub fn processed(&self) -> Vec<Table> {
        self.tables
            .iter()
            .filter(|t| matches!(t.outcome, TableOutcome::Upserted { .. }))
            .map(|t| t.table)
            .collect()
    }

    /// Affected rows keyed by table name, merged tables only.
    pub fn row_counts(&self) -> BTreeMap<String, usize> {
        self.tables
            .iter()
            .filter(|t| matches!(t.outcome, TableOutcome::Upserted { .. }))
            .map(|t| (t.table.name().to_string(), t.outcome.rows()))
            .collect()
    }

    pub fn message(&self) -> String {
        let parts = UPSERT_ORDER
            .iter()
            .map(|table| {
                let rows = self
                    .tables
                    .iter()
                    .find(|t| t.table == *table)
                    .map(|t| t.outcome.rows())
                    .unwrap_or(0);
                format!("{}={}", table.label(), rows)
            })
            .collect::<Vec<_>>()
            .join(", ");
        format!("Upsert completed: {} rows", parts)
    }
}

/// Merge one table's staging area into its main table.
pub fn upsert_table<W: Warehouse + ?Sized>(warehouse: &mut W, table: Table) -> TableOutcome {
    info!("Processing {}", table);

    match warehouse.staged_rows(table) {
        Ok(None) => {
            info!("Skipping {}: staging table {} does not exist", table, table.staging_name());
            return TableOutcome::Skipped {
                reason: SkipReason::MissingStagingTable,
            };
        }
        Ok(Some(0)) => {
            info!("Skipping {}: no data in staging table", table);
            return TableOutcome::Skipped {
                reason: SkipReason::EmptyStaging,
            };
        }
        Ok(Some(n)) => info!("{}: {} row(s) in staging", table, n),
        Err(e) => {
            error!("{}: could not inspect staging: {}", table, e);
            return TableOutcome::Failed { error: e.to_string() };
        }
    }

    let before = count_main(warehouse, table);
    let rows = match warehouse.merge_staging(table) {
        Ok(rows) => rows,
        Err(e) => {
            error!("{}: upsert failed, staging kept for retry: {}", table, e);
            return TableOutcome::Failed { error: e.to_string() };
        }
    };
    let after = count_main(warehouse, table);

    match warehouse.staged_rows(table) {
        Ok(Some(0)) | Ok(None) => {}
        Ok(Some(left)) => warn!("{}: {} row(s) still in staging after upsert", table, left),
        Err(e) => warn!("{}: could not verify staging drain: {}", table, e),
    }
    info!(
        "{}: {} row(s) upserted, main table {} -> {}",
        table,
        rows,
        display_count(before),
        display_count(after)
    );
    TableOutcome::Upserted { rows, before, after }
}

/// Run every table in dependency order. A failing table does not stop the
/// tables after it.
pub fn upsert_all<W: Warehouse + ?Sized>(warehouse: &mut W) -> UpsertSummary {
    let tables = UPSERT_ORDER
        .iter()
        .map(|table| TableReport {
            table: *table,
            outcome: upsert_table(warehouse, *table),
        })
        .collect();
    let summary = UpsertSummary { tables };
    info!("{}", summary.message());
    for (table, err) in summary.failures() {
        error!("Upsert of {} failed: {}", table, err);
    }
    summary
}

fn count_main<W: Warehouse + ?Sized>(warehouse: &mut W, table: Table) -> Option<usize> {
    match warehouse.main_rows(table) {
        Ok(n) => Some(n),
        Err(e) => {
            warn!("{}: could not count main table rows: {}", table, e);
            None
        }
    }
}

fn display_count(count: Option<usize>) -> String {
    count.map(|n| n.to_string()).unwrap_or_else(|| "?".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::{MappedRow, MappingConfig, SourceRow, Value};
    use crate::services::staging::stage_rows;
    use crate::testing::MemoryWarehouse;
    use chrono::NaiveDate;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, d).unwrap()
    }

    fn row(table: Table, date: Option<NaiveDate>, column: &str, value: Value) -> MappedRow {
        let mut row = MappedRow::nulls(table);
        row.set("date", Value::Date(date));
        row.set(column, value);
        row
    }

    fn overview(d: u32, tonage: i32) -> MappedRow {
        row(Table::Overview, Some(day(d)), "tonage", Value::Int(Some(tonage)))
    }

    fn fleet(d: u32, km: i32) -> MappedRow {
        row(Table::Fleet, Some(day(d)), "km_driven", Value::Int(Some(km)))
    }

    fn outcome_of(summary: &UpsertSummary, table: Table) -> &TableOutcome {
        &summary.tables.iter().find(|t| t.table == table).unwrap().outcome
    }

    #[test]
    fn applying_the_same_staging_twice_is_idempotent() {
        let mut wh = MemoryWarehouse::new();
        let batch = vec![overview(1, 100), overview(2, 110)];

        wh.append_staging(Table::Overview, &batch).unwrap();
        upsert_all(&mut wh);
        let first = wh.main_row(Table::Overview, day(1)).cloned();

        wh.append_staging(Table::Overview, &batch).unwrap();
        let summary = upsert_all(&mut wh);
        assert!(summary.is_success());
        assert_eq!(wh.main_row(Table::Overview, day(1)).cloned(), first);
        assert_eq!(wh.main_rows(Table::Overview).unwrap(), 2);
    }

    #[test]
    fn successful_upsert_drains_staging() {
        let mut wh = MemoryWarehouse::new();
        wh.append_staging(Table::Overview, &[overview(1, 100)]).unwrap();
        let outcome = upsert_table(&mut wh, Table::Overview);
        assert_eq!(
            outcome,
            TableOutcome::Upserted {
                rows: 1,
                before: Some(0),
                after: Some(1),
            }
        );
        assert!(wh.staged(Table::Overview).is_empty());
    }

    #[test]
    fn child_without_parent_fails_alone_but_succeeds_in_master_order() {
        let mut wh = MemoryWarehouse::new();
        wh.append_staging(Table::Fleet, &[fleet(5, 310)]).unwrap();
        let outcome = upsert_table(&mut wh, Table::Fleet);
        assert!(matches!(outcome, TableOutcome::Failed { .. }));
        assert_eq!(wh.staged(Table::Fleet).len(), 1);
        assert_eq!(wh.main_rows(Table::Fleet).unwrap(), 0);

        wh.append_staging(Table::Overview, &[overview(5, 90)]).unwrap();
        let summary = upsert_all(&mut wh);
        assert!(summary.is_success());
        assert_eq!(outcome_of(&summary, Table::Fleet).rows(), 1);
        assert!(wh.main_row(Table::Fleet, day(5)).is_some());
    }

    #[test]
    fn absent_or_empty_staging_is_skipped_not_failed() {
        let mut wh = MemoryWarehouse::new().without_staging_table(Table::Drying);
        wh.append_staging(Table::Overview, &[overview(1, 100)]).unwrap();
        wh.append_staging(Table::Fleet, &[fleet(1, 20)]).unwrap();

        let summary = upsert_all(&mut wh);
        assert!(summary.is_success());
        assert_eq!(
            outcome_of(&summary, Table::Drying),
            &TableOutcome::Skipped {
                reason: SkipReason::MissingStagingTable,
            }
        );
        assert_eq!(
            outcome_of(&summary, Table::WashingMachines),
            &TableOutcome::Skipped {
                reason: SkipReason::EmptyStaging,
            }
        );
        assert_eq!(summary.processed(), vec![Table::Overview, Table::Fleet]);
        assert_eq!(
            summary.row_counts(),
            BTreeMap::from([("fleet".to_string(), 1), ("overview".to_string(), 1)])
        );
        assert_eq!(summary.total_rows(), 2);
        assert_eq!(
            summary.message(),
            "Upsert completed: Overview=1, Fleet=1, Washing=0, Drying=0 rows"
        );
    }

    #[test]
    fn later_staged_row_wins() {
        let mut wh = MemoryWarehouse::new();
        wh.append_staging(Table::Overview, &[overview(3, 100)]).unwrap();
        wh.append_staging(Table::Overview, &[overview(3, 125)]).unwrap();

        assert_eq!(upsert_table(&mut wh, Table::Overview).rows(), 1);
        let stored = wh.main_row(Table::Overview, day(3)).unwrap();
        assert_eq!(stored.int("tonage").unwrap(), Some(125));
    }

    #[test]
    fn undated_staging_row_fails_the_table_and_keeps_staging() {
        let mut wh = MemoryWarehouse::new();
        wh.push_staged(Table::Overview, overview(1, 100));
        wh.push_staged(Table::Overview, row(Table::Overview, None, "tonage", Value::Int(Some(7))));

        let summary = upsert_all(&mut wh);
        assert!(!summary.is_success());
        assert_eq!(wh.staged(Table::Overview).len(), 2);
        assert_eq!(wh.main_rows(Table::Overview).unwrap(), 0);
        let failures: Vec<_> = summary.failures().map(|(t, _)| t).collect();
        assert_eq!(failures, vec![Table::Overview]);
    }

    #[test]
    fn failure_in_one_table_does_not_stop_the_rest() {
        let mut wh = MemoryWarehouse::new();
        wh.append_staging(Table::Overview, &[overview(1, 100)]).unwrap();
        wh.append_staging(Table::Fleet, &[fleet(1, 20)]).unwrap();
        wh.append_staging(
            Table::Drying,
            &[row(Table::Drying, Some(day(1)), "kipper", Value::Int(Some(4)))],
        )
        .unwrap();
        wh.break_merges_of(Table::Fleet);

        let summary = upsert_all(&mut wh);
        assert!(!summary.is_success());
        assert!(matches!(outcome_of(&summary, Table::Fleet), TableOutcome::Failed { .. }));
        assert_eq!(outcome_of(&summary, Table::Drying).rows(), 1);
        assert_eq!(wh.staged(Table::Fleet).len(), 1);
        assert_eq!(
            summary.message(),
            "Upsert completed: Overview=1, Fleet=0, Washing=0, Drying=1 rows"
        );
    }

    #[test]
    fn second_run_without_new_data_is_a_no_op() {
        let mut wh = MemoryWarehouse::new();
        wh.append_staging(Table::Overview, &[overview(1, 100)]).unwrap();
        upsert_all(&mut wh);

        let summary = upsert_all(&mut wh);
        assert!(summary.is_success());
        assert_eq!(summary.total_rows(), 0);
        assert!(summary.processed().is_empty());
        assert!(summary
            .tables
            .iter()
            .all(|t| matches!(t.outcome, TableOutcome::Skipped { .. })));
    }

    #[test]
    fn spreadsheet_row_flows_into_overview() {
        let cfg = MappingConfig::embedded().unwrap();
        let source: SourceRow = [
            ("Datum".to_string(), "15.03.2024".to_string()),
            ("Gesamt Tonage".to_string(), "120".to_string()),
            ("date".to_string(), "2024-03-15".to_string()),
        ]
        .into();
        let mapped = cfg.table(Table::Overview).unwrap().map_row(&source);

        let mut wh = MemoryWarehouse::new();
        for _ in 0..2 {
            stage_rows(&mut wh, Table::Overview, vec![mapped.clone()]).unwrap();
            let summary = upsert_all(&mut wh);
            assert!(summary.is_success());
            assert!(wh.staged(Table::Overview).is_empty());
        }

        assert_eq!(wh.main_rows(Table::Overview).unwrap(), 1);
        let stored = wh.main_row(Table::Overview, day(15)).unwrap();
        assert_eq!(stored.int("tonage").unwrap(), Some(120));
        for (name, value) in stored.columns() {
            if name != "date" && name != "tonage" {
                assert!(value.is_null(), "{name} should be null");
            }
        }
    }

    #[test]
    fn summary_serializes_with_flattened_status() {
        let summary = UpsertSummary {
            tables: vec![TableReport {
                table: Table::WashingMachines,
                outcome: TableOutcome::Skipped {
                    reason: SkipReason::EmptyStaging,
                },
            }],
        };
        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"tables": [{"table": "washing_machines", "status": "skipped", "reason": "empty_staging"}]})
        );
    }
}
