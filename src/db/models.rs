//! Diesel model structs for the metric tables and their staging twins.
//!
//! Main-table structs are keyed by a non-null `date`; staging structs carry a
//! nullable `date` because staging has no key constraint.

use chrono::NaiveDate;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use crate::mapping::{MappedRow, RowShapeError};
use crate::schema;

/// A staging row that can be promoted into its main table.
pub trait StagedRecord {
    type Main;

    fn staged_date(&self) -> Option<NaiveDate>;

    fn into_main(self, date: NaiveDate) -> Self::Main;
}

fn staged_date_of(row: &MappedRow) -> Result<Option<NaiveDate>, RowShapeError> {
    match row.get("date") {
        Some(crate::mapping::Value::Date(d)) => Ok(*d),
        _ => Err(RowShapeError {
            column: "date".to_string(),
            expected: crate::mapping::ColumnType::Date,
        }),
    }
}

// overview

#[derive(Debug, Clone, PartialEq, Queryable, Selectable, Insertable, Serialize, Deserialize)]
#[diesel(table_name = schema::overview)]
pub struct Overview {
    pub date: NaiveDate,
    pub tonage: Option<i32>,
    pub water_m3: Option<f64>,
    pub liters_per_kg: Option<f64>,
    pub electricity_per_kg: Option<f64>,
    pub gas_per_kg: Option<f64>,
    pub gas_plus_elec_per_kg: Option<f64>,
    pub hours_production: Option<f64>,
    pub kg_per_hour: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Queryable, Selectable, Insertable, Serialize, Deserialize)]
#[diesel(table_name = schema::overview_staging)]
pub struct StagedOverview {
    pub date: Option<NaiveDate>,
    pub tonage: Option<i32>,
    pub water_m3: Option<f64>,
    pub liters_per_kg: Option<f64>,
    pub electricity_per_kg: Option<f64>,
    pub gas_per_kg: Option<f64>,
    pub gas_plus_elec_per_kg: Option<f64>,
    pub hours_production: Option<f64>,
    pub kg_per_hour: Option<f64>,
}

impl StagedRecord for StagedOverview {
    type Main = Overview;

    fn staged_date(&self) -> Option<NaiveDate> {
        self.date
    }

    fn into_main(self, date: NaiveDate) -> Overview {
        Overview {
            date,
            tonage: self.tonage,
            water_m3: self.water_m3,
            liters_per_kg: self.liters_per_kg,
            electricity_per_kg: self.electricity_per_kg,
            gas_per_kg: self.gas_per_kg,
            gas_plus_elec_per_kg: self.gas_plus_elec_per_kg,
            hours_production: self.hours_production,
            kg_per_hour: self.kg_per_hour,
        }
    }
}

impl TryFrom<&MappedRow> for StagedOverview {
    type Error = RowShapeError;

    fn try_from(row: &MappedRow) -> Result<Self, Self::Error> {
        Ok(StagedOverview {
            date: staged_date_of(row)?,
            tonage: row.int("tonage")?,
            water_m3: row.double("water_m3")?,
            liters_per_kg: row.double("liters_per_kg")?,
            electricity_per_kg: row.double("electricity_per_kg")?,
            gas_per_kg: row.double("gas_per_kg")?,
            gas_plus_elec_per_kg: row.double("gas_plus_elec_per_kg")?,
            hours_production: row.double("hours_production")?,
            kg_per_hour: row.double("kg_per_hour")?,
        })
    }
}

// fleet

#[derive(Debug, Clone, PartialEq, Queryable, Selectable, Insertable, Serialize, Deserialize)]
#[diesel(table_name = schema::fleet)]
pub struct Fleet {
    pub date: NaiveDate,
    pub driving_hours: Option<f64>,
    pub kg_per_hour_driving: Option<f64>,
    pub km_driven: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Queryable, Selectable, Insertable, Serialize, Deserialize)]
#[diesel(table_name = schema::fleet_staging)]
pub struct StagedFleet {
    pub date: Option<NaiveDate>,
    pub driving_hours: Option<f64>,
    pub kg_per_hour_driving: Option<f64>,
    pub km_driven: Option<i32>,
}

impl StagedRecord for StagedFleet {
    type Main = Fleet;

    fn staged_date(&self) -> Option<NaiveDate> {
        self.date
    }

    fn into_main(self, date: NaiveDate) -> Fleet {
        Fleet {
            date,
            driving_hours: self.driving_hours,
            kg_per_hour_driving: self.kg_per_hour_driving,
            km_driven: self.km_driven,
        }
    }
}

impl TryFrom<&MappedRow> for StagedFleet {
    type Error = RowShapeError;

    fn try_from(row: &MappedRow) -> Result<Self, Self::Error> {
        Ok(StagedFleet {
            date: staged_date_of(row)?,
            driving_hours: row.double("driving_hours")?,
            kg_per_hour_driving: row.double("kg_per_hour_driving")?,
            km_driven: row.int("km_driven")?,
        })
    }
}

// washing machines

#[derive(Debug, Clone, PartialEq, Queryable, Selectable, Insertable, Serialize, Deserialize)]
#[diesel(table_name = schema::washing_machines)]
pub struct WashingMachines {
    pub date: NaiveDate,
    pub machine_130kg: Option<i32>,
    pub steps_130kg: Option<i32>,
    pub machine_85kg_plus_85kg: Option<i32>,
    pub machine_85kg_middle: Option<i32>,
    pub steps_85kg_middle: Option<i32>,
    pub machine_85kg_right: Option<i32>,
    pub steps_85kg_right: Option<i32>,
    pub electrolux: Option<i32>,
    pub avg_load_130kg: Option<f64>,
    pub avg_load_85kg_middle: Option<f64>,
    pub avg_load_85kg_right: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Queryable, Selectable, Insertable, Serialize, Deserialize)]
#[diesel(table_name = schema::washing_machines_staging)]
pub struct StagedWashingMachines {
    pub date: Option<NaiveDate>,
    pub machine_130kg: Option<i32>,
    pub steps_130kg: Option<i32>,
    pub machine_85kg_plus_85kg: Option<i32>,
    pub machine_85kg_middle: Option<i32>,
    pub steps_85kg_middle: Option<i32>,
    pub machine_85kg_right: Option<i32>,
    pub steps_85kg_right: Option<i32>,
    pub electrolux: Option<i32>,
    pub avg_load_130kg: Option<f64>,
    pub avg_load_85kg_middle: Option<f64>,
    pub avg_load_85kg_right: Option<f64>,
}

impl StagedRecord for StagedWashingMachines {
    type Main = WashingMachines;

    fn staged_date(&self) -> Option<NaiveDate> {
        self.date
    }

    fn into_main(self, date: NaiveDate) -> WashingMachines {
        WashingMachines {
            date,
            machine_130kg: self.machine_130kg,
            steps_130kg: self.steps_130kg,
            machine_85kg_plus_85kg: self.machine_85kg_plus_85kg,
            machine_85kg_middle: self.machine_85kg_middle,
            steps_85kg_middle: self.steps_85kg_middle,
            machine_85kg_right: self.machine_85kg_right,
            steps_85kg_right: self.steps_85kg_right,
            electrolux: self.electrolux,
            avg_load_130kg: self.avg_load_130kg,
            avg_load_85kg_middle: self.avg_load_85kg_middle,
            avg_load_85kg_right: self.avg_load_85kg_right,
        }
    }
}

impl TryFrom<&MappedRow> for StagedWashingMachines {
    type Error = RowShapeError;

    fn try_from(row: &MappedRow) -> Result<Self, Self::Error> {
        Ok(StagedWashingMachines {
            date: staged_date_of(row)?,
            machine_130kg: row.int("machine_130kg")?,
            steps_130kg: row.int("steps_130kg")?,
            machine_85kg_plus_85kg: row.int("machine_85kg_plus_85kg")?,
            machine_85kg_middle: row.int("machine_85kg_middle")?,
            steps_85kg_middle: row.int("steps_85kg_middle")?,
            machine_85kg_right: row.int("machine_85kg_right")?,
            steps_85kg_right: row.int("steps_85kg_right")?,
            electrolux: row.int("electrolux")?,
            avg_load_130kg: row.double("avg_load_130kg")?,
            avg_load_85kg_middle: row.double("avg_load_85kg_middle")?,
            avg_load_85kg_right: row.double("avg_load_85kg_right")?,
        })
    }
}

// drying

#[derive(Debug, Clone, PartialEq, Queryable, Selectable, Insertable, Serialize, Deserialize)]
#[diesel(table_name = schema::drying)]
pub struct Drying {
    pub date: NaiveDate,
    pub roboter_1: Option<i32>,
    pub roboter_2: Option<i32>,
    pub roboter_3: Option<i32>,
    pub roboter_4: Option<i32>,
    pub terry_prep_1: Option<i32>,
    pub terry_prep_2: Option<i32>,
    pub terry_prep_3: Option<i32>,
    pub terry_prep_4: Option<i32>,
    pub blankets_1: Option<i32>,
    pub blankets_2: Option<i32>,
    pub sum_drying_load: Option<i32>,
    pub steps_total: Option<i32>,
    pub kipper: Option<i32>,
    pub avg_drying_load: Option<f64>,
    pub sum_drying: Option<i32>,
    pub steps: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Queryable, Selectable, Insertable, Serialize, Deserialize)]
#[diesel(table_name = schema::drying_staging)]
pub struct StagedDrying {
    pub date: Option<NaiveDate>,
    pub roboter_1: Option<i32>,
    pub roboter_2: Option<i32>,
    pub roboter_3: Option<i32>,
    pub roboter_4: Option<i32>,
    pub terry_prep_1: Option<i32>,
    pub terry_prep_2: Option<i32>,
    pub terry_prep_3: Option<i32>,
    pub terry_prep_4: Option<i32>,
    pub blankets_1: Option<i32>,
    pub blankets_2: Option<i32>,
    pub sum_drying_load: Option<i32>,
    pub steps_total: Option<i32>,
    pub kipper: Option<i32>,
    pub avg_drying_load: Option<f64>,
    pub sum_drying: Option<i32>,
    pub steps: Option<i32>,
}

impl StagedRecord for StagedDrying {
    type Main = Drying;

    fn staged_date(&self) -> Option<NaiveDate> {
        self.date
    }

    fn into_main(self, date: NaiveDate) -> Drying {
        Drying {
            date,
            roboter_1: self.roboter_1,
            roboter_2: self.roboter_2,
            roboter_3: self.roboter_3,
            roboter_4: self.roboter_4,
            terry_prep_1: self.terry_prep_1,
            terry_prep_2: self.terry_prep_2,
            terry_prep_3: self.terry_prep_3,
            terry_prep_4: self.terry_prep_4,
            blankets_1: self.blankets_1,
            blankets_2: self.blankets_2,
            sum_drying_load: self.sum_drying_load,
            steps_total: self.steps_total,
            kipper: self.kipper,
            avg_drying_load: self.avg_drying_load,
            sum_drying: self.sum_drying,
            steps: self.steps,
        }
    }
}

impl TryFrom<&MappedRow> for StagedDrying {
    type Error = RowShapeError;

    fn try_from(row: &MappedRow) -> Result<Self, Self::Error> {
        Ok(StagedDrying {
            date: staged_date_of(row)?,
            roboter_1: row.int("roboter_1")?,
            roboter_2: row.int("roboter_2")?,
            roboter_3: row.int("roboter_3")?,
            roboter_4: row.int("roboter_4")?,
            terry_prep_1: row.int("terry_prep_1")?,
            terry_prep_2: row.int("terry_prep_2")?,
            terry_prep_3: row.int("terry_prep_3")?,
            terry_prep_4: row.int("terry_prep_4")?,
            blankets_1: row.int("blankets_1")?,
            blankets_2: row.int("blankets_2")?,
            sum_drying_load: row.int("sum_drying_load")?,
            steps_total: row.int("steps_total")?,
            kipper: row.int("kipper")?,
            avg_drying_load: row.double("avg_drying_load")?,
            sum_drying: row.int("sum_drying")?,
            steps: row.int("steps")?,
        })
    }
}

/// Collapse staged rows to one per date, the last one in append order
/// winning, sorted by date. A row without a date yields `Err(position)`.
pub fn latest_per_date<S: StagedRecord>(staged: Vec<S>) -> Result<Vec<S::Main>, usize> {
    let mut by_date = std::collections::BTreeMap::new();
    for (position, row) in staged.into_iter().enumerate() {
        let date = row.staged_date().ok_or(position)?;
        by_date.insert(date, row.into_main(date));
    }
    Ok(by_date.into_values().collect())
}
