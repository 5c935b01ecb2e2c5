//! The four metric tables and their canonical column layout.
//!
//! Column lists here mirror `crate::schema` and the migrations; the column
//! mapping configuration is validated against them at load time.

use crate::mapping::ColumnType;
use core::fmt;
use serde::{Deserialize, Serialize};

use ColumnType::{Date, Double, Int};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Table {
    Overview,
    Fleet,
    WashingMachines,
    Drying,
}

/// Parent first: children reference `overview.date`.
pub const UPSERT_ORDER: [Table; 4] = [Table::Overview, Table::Fleet, Table::WashingMachines, Table::Drying];

const OVERVIEW_COLUMNS: &[(&str, ColumnType)] = &[
    ("date", Date),
    ("tonage", Int),
    ("water_m3", Double),
    ("liters_per_kg", Double),
    ("electricity_per_kg", Double),
    ("gas_per_kg", Double),
    ("gas_plus_elec_per_kg", Double),
    ("hours_production", Double),
    ("kg_per_hour", Double),
];

const FLEET_COLUMNS: &[(&str, ColumnType)] = &[
    ("date", Date),
    ("driving_hours", Double),
    ("kg_per_hour_driving", Double),
    ("km_driven", Int),
];

const WASHING_MACHINES_COLUMNS: &[(&str, ColumnType)] = &[
    ("date", Date),
    ("machine_130kg", Int),
    ("steps_130kg", Int),
    ("machine_85kg_plus_85kg", Int),
    ("machine_85kg_middle", Int),
    ("steps_85kg_middle", Int),
    ("machine_85kg_right", Int),
    ("steps_85kg_right", Int),
    ("electrolux", Int),
    ("avg_load_130kg", Double),
    ("avg_load_85kg_middle", Double),
    ("avg_load_85kg_right", Double),
];

const DRYING_COLUMNS: &[(&str, ColumnType)] = &[
    ("date", Date),
    ("roboter_1", Int),
    ("roboter_2", Int),
    ("roboter_3", Int),
    ("roboter_4", Int),
    ("terry_prep_1", Int),
    ("terry_prep_2", Int),
    ("terry_prep_3", Int),
    ("terry_prep_4", Int),
    ("blankets_1", Int),
    ("blankets_2", Int),
    ("sum_drying_load", Int),
    ("steps_total", Int),
    ("kipper", Int),
    ("avg_drying_load", Double),
    ("sum_drying", Int),
    ("steps", Int),
];

impl Table {
    pub fn name(self) -> &'static str {
        match self {
            Table::Overview => "overview",
            Table::Fleet => "fleet",
            Table::WashingMachines => "washing_machines",
            Table::Drying => "drying",
        }
    }

    pub fn staging_name(self) -> &'static str {
        match self {
            Table::Overview => "overview_staging",
            Table::Fleet => "fleet_staging",
            Table::WashingMachines => "washing_machines_staging",
            Table::Drying => "drying_staging",
        }
    }

    /// Name of the database routine deployed with the schema.
    pub fn routine_name(self) -> &'static str {
        match self {
            Table::Overview => "upsert_overview_data",
            Table::Fleet => "upsert_fleet_data",
            Table::WashingMachines => "upsert_washing_machines_data",
            Table::Drying => "upsert_drying_data",
        }
    }

    /// Short label used in the summary line.
    pub fn label(self) -> &'static str {
        match self {
            Table::Overview => "Overview",
            Table::Fleet => "Fleet",
            Table::WashingMachines => "Washing",
            Table::Drying => "Drying",
        }
    }

    pub fn columns(self) -> &'static [(&'static str, ColumnType)] {
        match self {
            Table::Overview => OVERVIEW_COLUMNS,
            Table::Fleet => FLEET_COLUMNS,
            Table::WashingMachines => WASHING_MACHINES_COLUMNS,
            Table::Drying => DRYING_COLUMNS,
        }
    }

    /// Whether rows in this table must reference an existing `overview.date`.
    pub fn references_overview(self) -> bool {
        !matches!(self, Table::Overview)
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
