//! Postgres-backed [`Warehouse`].
//!
//! Two merge strategies are available: `Application` runs the upsert from this
//! binary inside a diesel transaction, `Routines` calls the stored functions
//! deployed by the second migration. Both leave the main table and staging
//! untouched when anything fails.

use crate::db::models::{
    latest_per_date, StagedDrying, StagedFleet, StagedOverview, StagedRecord, StagedWashingMachines,
};
use crate::mapping::{MappedRow, RowShapeError};
use crate::schema;
use crate::table::Table;
use crate::warehouse::{Warehouse, WarehouseError};
use diesel::prelude::*;
use diesel::sql_types::{Bool, Integer, Text};
use diesel::upsert::excluded;
use diesel::PgConnection;
use log::debug;
use serde::{Deserialize, Serialize};

/// Rows per INSERT statement; keeps bind parameters well under the Postgres limit.
const INSERT_CHUNK_ROWS: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpsertStrategy {
    #[default]
    Application,
    Routines,
}

pub struct PgWarehouse<'a> {
    conn: &'a mut PgConnection,
    strategy: UpsertStrategy,
}

impl<'a> PgWarehouse<'a> {
    pub fn new(conn: &'a mut PgConnection, strategy: UpsertStrategy) -> Self {
        PgWarehouse { conn, strategy }
    }
}

#[derive(QueryableByName)]
struct Presence {
    #[diesel(sql_type = Bool)]
    present: bool,
}

#[derive(QueryableByName)]
struct RoutineResult {
    #[diesel(sql_type = Integer)]
    rows_affected: i32,
}

impl Warehouse for PgWarehouse<'_> {
    fn staged_rows(&mut self, table: Table) -> Result<Option<usize>, WarehouseError> {
        // to_regclass keeps a missing table from aborting an open transaction
        let presence = diesel::sql_query("SELECT to_regclass($1) IS NOT NULL AS present")
            .bind::<Text, _>(table.staging_name())
            .get_result::<Presence>(self.conn)?;
        if !presence.present {
            return Ok(None);
        }

        let conn = &mut *self.conn;
        let count: i64 = match table {
            Table::Overview => schema::overview_staging::table.count().get_result(conn)?,
            Table::Fleet => schema::fleet_staging::table.count().get_result(conn)?,
            Table::WashingMachines => schema::washing_machines_staging::table.count().get_result(conn)?,
            Table::Drying => schema::drying_staging::table.count().get_result(conn)?,
        };
        Ok(Some(count as usize))
    }

    fn main_rows(&mut self, table: Table) -> Result<usize, WarehouseError> {
        let conn = &mut *self.conn;
        let count: i64 = match table {
            Table::Overview => schema::overview::table.count().get_result(conn)?,
            Table::Fleet => schema::fleet::table.count().get_result(conn)?,
            Table::WashingMachines => schema::washing_machines::table.count().get_result(conn)?,
            Table::Drying => schema::drying::table.count().get_result(conn)?,
        };
        Ok(count as usize)
    }

    fn append_staging(&mut self, table: Table, rows: &[MappedRow]) -> Result<usize, WarehouseError> {
        if rows.is_empty() {
            return Ok(0);
        }
        let conn = &mut *self.conn;
        match table {
            Table::Overview => {
                let records: Vec<StagedOverview> = staged_records(table, rows)?;
                conn.transaction::<_, WarehouseError, _>(|conn| {
                    let mut written = 0;
                    for chunk in records.chunks(INSERT_CHUNK_ROWS) {
                        written += diesel::insert_into(schema::overview_staging::table)
                            .values(chunk)
                            .execute(conn)?;
                    }
                    Ok(written)
                })
            }
            Table::Fleet => {
                let records: Vec<StagedFleet> = staged_records(table, rows)?;
                conn.transaction::<_, WarehouseError, _>(|conn| {
                    let mut written = 0;
                    for chunk in records.chunks(INSERT_CHUNK_ROWS) {
                        written += diesel::insert_into(schema::fleet_staging::table)
                            .values(chunk)
                            .execute(conn)?;
                    }
                    Ok(written)
                })
            }
            Table::WashingMachines => {
                let records: Vec<StagedWashingMachines> = staged_records(table, rows)?;
                conn.transaction::<_, WarehouseError, _>(|conn| {
                    let mut written = 0;
                    for chunk in records.chunks(INSERT_CHUNK_ROWS) {
                        written += diesel::insert_into(schema::washing_machines_staging::table)
                            .values(chunk)
                            .execute(conn)?;
                    }
                    Ok(written)
                })
            }
            Table::Drying => {
                let records: Vec<StagedDrying> = staged_records(table, rows)?;
                conn.transaction::<_, WarehouseError, _>(|conn| {
                    let mut written = 0;
                    for chunk in records.chunks(INSERT_CHUNK_ROWS) {
                        written += diesel::insert_into(schema::drying_staging::table)
                            .values(chunk)
                            .execute(conn)?;
                    }
                    Ok(written)
                })
            }
        }
    }

    fn merge_staging(&mut self, table: Table) -> Result<usize, WarehouseError> {
        match self.strategy {
            UpsertStrategy::Routines => call_routine(self.conn, table),
            UpsertStrategy::Application => match table {
                Table::Overview => merge_overview(self.conn),
                Table::Fleet => merge_fleet(self.conn),
                Table::WashingMachines => merge_washing_machines(self.conn),
                Table::Drying => merge_drying(self.conn),
            },
        }
    }
}

fn staged_records<S>(table: Table, rows: &[MappedRow]) -> Result<Vec<S>, WarehouseError>
where
    S: for<'r> TryFrom<&'r MappedRow, Error = RowShapeError>,
{
    rows.iter()
        .map(|row| S::try_from(row).map_err(|source| WarehouseError::RowShape { table, source }))
        .collect()
}

fn promote<S: StagedRecord>(table: Table, staged: Vec<S>) -> Result<Vec<S::Main>, WarehouseError> {
    let received = staged.len();
    let rows = latest_per_date(staged).map_err(|position| WarehouseError::MalformedStagingRow { table, position })?;
    debug!("{}: {} staged row(s) collapse to {} date(s)", table, received, rows.len());
    Ok(rows)
}

fn call_routine(conn: &mut PgConnection, table: Table) -> Result<usize, WarehouseError> {
    // a single statement runs in its own implicit transaction
    let result = diesel::sql_query(format!("SELECT {}() AS rows_affected", table.routine_name()))
        .get_result::<RoutineResult>(conn)?;
    Ok(result.rows_affected.max(0) as usize)
}

fn merge_overview(conn: &mut PgConnection) -> Result<usize, WarehouseError> {
    use schema::overview::dsl as O;
    use schema::overview_staging::dsl as S;

    conn.transaction::<_, WarehouseError, _>(|conn| {
        let staged = S::overview_staging
            .order(S::staged_id.asc())
            .select(StagedOverview::as_select())
            .load(conn)?;
        let rows = promote(Table::Overview, staged)?;

        let mut affected = 0;
        for chunk in rows.chunks(INSERT_CHUNK_ROWS) {
            affected += diesel::insert_into(O::overview)
                .values(chunk)
                .on_conflict(O::date)
                .do_update()
                .set((
                    O::tonage.eq(excluded(O::tonage)),
                    O::water_m3.eq(excluded(O::water_m3)),
                    O::liters_per_kg.eq(excluded(O::liters_per_kg)),
                    O::electricity_per_kg.eq(excluded(O::electricity_per_kg)),
                    O::gas_per_kg.eq(excluded(O::gas_per_kg)),
                    O::gas_plus_elec_per_kg.eq(excluded(O::gas_plus_elec_per_kg)),
                    O::hours_production.eq(excluded(O::hours_production)),
                    O::kg_per_hour.eq(excluded(O::kg_per_hour)),
                ))
                .execute(conn)?;
        }
        diesel::delete(S::overview_staging).execute(conn)?;
        Ok(affected)
    })
}

fn merge_fleet(conn: &mut PgConnection) -> Result<usize, WarehouseError> {
    use schema::fleet::dsl as F;
    use schema::fleet_staging::dsl as S;

    conn.transaction::<_, WarehouseError, _>(|conn| {
        let staged = S::fleet_staging
            .order(S::staged_id.asc())
            .select(StagedFleet::as_select())
            .load(conn)?;
        let rows = promote(Table::Fleet, staged)?;

        let mut affected = 0;
        for chunk in rows.chunks(INSERT_CHUNK_ROWS) {
            affected += diesel::insert_into(F::fleet)
                .values(chunk)
                .on_conflict(F::date)
                .do_update()
                .set((
                    F::driving_hours.eq(excluded(F::driving_hours)),
                    F::kg_per_hour_driving.eq(excluded(F::kg_per_hour_driving)),
                    F::km_driven.eq(excluded(F::km_driven)),
                ))
                .execute(conn)?;
        }
        diesel::delete(S::fleet_staging).execute(conn)?;
        Ok(affected)
    })
}

fn merge_washing_machines(conn: &mut PgConnection) -> Result<usize, WarehouseError> {
    use schema::washing_machines::dsl as W;
    use schema::washing_machines_staging::dsl as S;

    conn.transaction::<_, WarehouseError, _>(|conn| {
        let staged = S::washing_machines_staging
            .order(S::staged_id.asc())
            .select(StagedWashingMachines::as_select())
            .load(conn)?;
        let rows = promote(Table::WashingMachines, staged)?;

        let mut affected = 0;
        for chunk in rows.chunks(INSERT_CHUNK_ROWS) {
            affected += diesel::insert_into(W::washing_machines)
                .values(chunk)
                .on_conflict(W::date)
                .do_update()
                .set((
                    W::machine_130kg.eq(excluded(W::machine_130kg)),
                    W::steps_130kg.eq(excluded(W::steps_130kg)),
                    W::machine_85kg_plus_85kg.eq(excluded(W::machine_85kg_plus_85kg)),
                    W::machine_85kg_middle.eq(excluded(W::machine_85kg_middle)),
                    W::steps_85kg_middle.eq(excluded(W::steps_85kg_middle)),
                    W::machine_85kg_right.eq(excluded(W::machine_85kg_right)),
                    W::steps_85kg_right.eq(excluded(W::steps_85kg_right)),
                    W::electrolux.eq(excluded(W::electrolux)),
                    W::avg_load_130kg.eq(excluded(W::avg_load_130kg)),
                    W::avg_load_85kg_middle.eq(excluded(W::avg_load_85kg_middle)),
                    W::avg_load_85kg_right.eq(excluded(W::avg_load_85kg_right)),
                ))
                .execute(conn)?;
        }
        diesel::delete(S::washing_machines_staging).execute(conn)?;
        Ok(affected)
    })
}

fn merge_drying(conn: &mut PgConnection) -> Result<usize, WarehouseError> {
    use schema::drying::dsl as D;
    use schema::drying_staging::dsl as S;

    conn.transaction::<_, WarehouseError, _>(|conn| {
        let staged = S::drying_staging
            .order(S::staged_id.asc())
            .select(StagedDrying::as_select())
            .load(conn)?;
        let rows = promote(Table::Drying, staged)?;

        let mut affected = 0;
        for chunk in rows.chunks(INSERT_CHUNK_ROWS) {
            affected += diesel::insert_into(D::drying)
                .values(chunk)
                .on_conflict(D::date)
                .do_update()
                .set((
                    D::roboter_1.eq(excluded(D::roboter_1)),
                    D::roboter_2.eq(excluded(D::roboter_2)),
                    D::roboter_3.eq(excluded(D::roboter_3)),
                    D::roboter_4.eq(excluded(D::roboter_4)),
                    D::terry_prep_1.eq(excluded(D::terry_prep_1)),
                    D::terry_prep_2.eq(excluded(D::terry_prep_2)),
                    D::terry_prep_3.eq(excluded(D::terry_prep_3)),
                    D::terry_prep_4.eq(excluded(D::terry_prep_4)),
                    D::blankets_1.eq(excluded(D::blankets_1)),
                    D::blankets_2.eq(excluded(D::blankets_2)),
                    D::sum_drying_load.eq(excluded(D::sum_drying_load)),
                    D::steps_total.eq(excluded(D::steps_total)),
                    D::kipper.eq(excluded(D::kipper)),
                    D::avg_drying_load.eq(excluded(D::avg_drying_load)),
                    D::sum_drying.eq(excluded(D::sum_drying)),
                    D::steps.eq(excluded(D::steps)),
                ))
                .execute(conn)?;
        }
        diesel::delete(S::drying_staging).execute(conn)?;
        Ok(affected)
    })
}
