//! Handwritten Diesel schema declarations used by model structs.
//!
//! Migrations define the actual tables and constraints. This module only
//! provides `diesel::table!` declarations so we can derive Insertable/Queryable
//! in a type-safe way without running `diesel print-schema`.

diesel::table! {
    overview (date) {
        date -> Date,
        tonage -> Nullable<Int4>,
        water_m3 -> Nullable<Float8>,
        liters_per_kg -> Nullable<Float8>,
        electricity_per_kg -> Nullable<Float8>,
        gas_per_kg -> Nullable<Float8>,
        gas_plus_elec_per_kg -> Nullable<Float8>,
        hours_production -> Nullable<Float8>,
        kg_per_hour -> Nullable<Float8>,
    }
}

diesel::table! {
    fleet (date) {
        date -> Date,
        driving_hours -> Nullable<Float8>,
        kg_per_hour_driving -> Nullable<Float8>,
        km_driven -> Nullable<Int4>,
    }
}

diesel::table! {
    washing_machines (date) {
        date -> Date,
        machine_130kg -> Nullable<Int4>,
        steps_130kg -> Nullable<Int4>,
        machine_85kg_plus_85kg -> Nullable<Int4>,
        machine_85kg_middle -> Nullable<Int4>,
        steps_85kg_middle -> Nullable<Int4>,
        machine_85kg_right -> Nullable<Int4>,
        steps_85kg_right -> Nullable<Int4>,
        electrolux -> Nullable<Int4>,
        avg_load_130kg -> Nullable<Float8>,
        avg_load_85kg_middle -> Nullable<Float8>,
        avg_load_85kg_right -> Nullable<Float8>,
    }
}

diesel::table! {
    drying (date) {
        date -> Date,
        roboter_1 -> Nullable<Int4>,
        roboter_2 -> Nullable<Int4>,
        roboter_3 -> Nullable<Int4>,
        roboter_4 -> Nullable<Int4>,
        terry_prep_1 -> Nullable<Int4>,
        terry_prep_2 -> Nullable<Int4>,
        terry_prep_3 -> Nullable<Int4>,
        terry_prep_4 -> Nullable<Int4>,
        blankets_1 -> Nullable<Int4>,
        blankets_2 -> Nullable<Int4>,
        sum_drying_load -> Nullable<Int4>,
        steps_total -> Nullable<Int4>,
        kipper -> Nullable<Int4>,
        avg_drying_load -> Nullable<Float8>,
        sum_drying -> Nullable<Int4>,
        steps -> Nullable<Int4>,
    }
}

diesel::table! {
    overview_staging (staged_id) {
        staged_id -> Int8,
        date -> Nullable<Date>,
        tonage -> Nullable<Int4>,
        water_m3 -> Nullable<Float8>,
        liters_per_kg -> Nullable<Float8>,
        electricity_per_kg -> Nullable<Float8>,
        gas_per_kg -> Nullable<Float8>,
        gas_plus_elec_per_kg -> Nullable<Float8>,
        hours_production -> Nullable<Float8>,
        kg_per_hour -> Nullable<Float8>,
    }
}

diesel::table! {
    fleet_staging (staged_id) {
        staged_id -> Int8,
        date -> Nullable<Date>,
        driving_hours -> Nullable<Float8>,
        kg_per_hour_driving -> Nullable<Float8>,
        km_driven -> Nullable<Int4>,
    }
}

diesel::table! {
    washing_machines_staging (staged_id) {
        staged_id -> Int8,
        date -> Nullable<Date>,
        machine_130kg -> Nullable<Int4>,
        steps_130kg -> Nullable<Int4>,
        machine_85kg_plus_85kg -> Nullable<Int4>,
        machine_85kg_middle -> Nullable<Int4>,
        steps_85kg_middle -> Nullable<Int4>,
        machine_85kg_right -> Nullable<Int4>,
        steps_85kg_right -> Nullable<Int4>,
        electrolux -> Nullable<Int4>,
        avg_load_130kg -> Nullable<Float8>,
        avg_load_85kg_middle -> Nullable<Float8>,
        avg_load_85kg_right -> Nullable<Float8>,
    }
}

diesel::table! {
    drying_staging (staged_id) {
        staged_id -> Int8,
        date -> Nullable<Date>,
        roboter_1 -> Nullable<Int4>,
        roboter_2 -> Nullable<Int4>,
        roboter_3 -> Nullable<Int4>,
        roboter_4 -> Nullable<Int4>,
        terry_prep_1 -> Nullable<Int4>,
        terry_prep_2 -> Nullable<Int4>,
        terry_prep_3 -> Nullable<Int4>,
        terry_prep_4 -> Nullable<Int4>,
        blankets_1 -> Nullable<Int4>,
        blankets_2 -> Nullable<Int4>,
        sum_drying_load -> Nullable<Int4>,
        steps_total -> Nullable<Int4>,
        kipper -> Nullable<Int4>,
        avg_drying_load -> Nullable<Float8>,
        sum_drying -> Nullable<Int4>,
        steps -> Nullable<Int4>,
    }
}

diesel::joinable!(fleet -> overview (date));
diesel::joinable!(washing_machines -> overview (date));
diesel::joinable!(drying -> overview (date));

diesel::allow_tables_to_appear_in_same_query!(
    overview,
    fleet,
    washing_machines,
    drying,
    overview_staging,
    fleet_staging,
    washing_machines_staging,
    drying_staging,
);
