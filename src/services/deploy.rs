use diesel::connection::SimpleConnection;
use diesel::prelude::*;
use diesel::sql_types::Text;
use diesel::PgConnection;
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use log::info;
use serde::Serialize;

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

#[derive(Debug, thiserror::Error)]
pub enum DeployError {
    #[error("applying database migrations failed: {0}")]
    Migrations(String),
    #[error("schema script failed: {0}")]
    Script(#[source] diesel::result::Error),
    #[error("listing tables failed: {0}")]
    Listing(#[source] diesel::result::Error),
}

pub enum SchemaSource<'a> {
    Embedded,
    /// SQL script run as one batch.
    Inline(&'a str),
}

#[derive(Debug, Clone, Serialize)]
pub struct DeployReport {
    pub applied_migrations: Vec<String>,
    pub tables: Vec<String>,
}

#[derive(QueryableByName)]
struct TableName {
    #[diesel(sql_type = Text)]
    table_name: String,
}

pub fn deploy(conn: &mut PgConnection, source: SchemaSource<'_>) -> Result<DeployReport, DeployError> {
    let applied_migrations = match source {
        SchemaSource::Embedded => apply_migrations(conn)?,
        SchemaSource::Inline(sql) => {
            info!("Executing inline schema script ({} bytes)", sql.len());
            conn.batch_execute(sql).map_err(DeployError::Script)?;
            Vec::new()
        }
    };

    let tables = public_tables(conn)?;
    info!("Schema deployed; public tables: {}", tables.join(", "));
    Ok(DeployReport {
        applied_migrations,
        tables,
    })
}

fn apply_migrations(conn: &mut PgConnection) -> Result<Vec<String>, DeployError> {
    let applied = conn
        .run_pending_migrations(MIGRATIONS)
        .map_err(|e| DeployError::Migrations(e.to_string()))?;
    let names: Vec<String> = applied.iter().map(|v| v.to_string()).collect();
    if names.is_empty() {
        info!("Database schema is up to date; no migrations were applied");
    } else {
        info!("Applied {} database migration(s): {}", names.len(), names.join(", "));
    }
    Ok(names)
}

pub fn public_tables(conn: &mut PgConnection) -> Result<Vec<String>, DeployError> {
    let rows = diesel::sql_query(
        "SELECT table_name::text AS table_name FROM information_schema.tables \
         WHERE table_schema = 'public' AND table_type = 'BASE TABLE' \
         AND table_name <> '__diesel_schema_migrations' ORDER BY table_name",
    )
    .load::<TableName>(conn)
    .map_err(DeployError::Listing)?;
    Ok(rows.into_iter().map(|r| r.table_name).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::UPSERT_ORDER;
    use diesel::pg::Pg;
    use diesel::migration::MigrationSource;

    const TABLES_UP: &str = include_str!("../../migrations/2025-09-01-000000_create_metric_tables/up.sql");
    const ROUTINES_UP: &str = include_str!("../../migrations/2025-09-01-000100_create_upsert_routines/up.sql");

    #[test]
    fn embeds_both_migrations() {
        let migrations = MigrationSource::<Pg>::migrations(&MIGRATIONS).unwrap();
        assert_eq!(migrations.len(), 2);
    }

    #[test]
    fn migrations_cover_every_table_and_routine() {
        for table in UPSERT_ORDER {
            assert!(
                TABLES_UP.contains(&format!("CREATE TABLE IF NOT EXISTS {} (", table.name())),
                "{table}"
            );
            assert!(
                TABLES_UP.contains(&format!("CREATE TABLE IF NOT EXISTS {} (", table.staging_name())),
                "{table}"
            );
            assert!(
                ROUTINES_UP.contains(&format!("CREATE OR REPLACE FUNCTION {}()", table.routine_name())),
                "{table}"
            );
        }
        assert!(ROUTINES_UP.contains("CREATE OR REPLACE FUNCTION upsert_all_data()"));
    }

    #[test]
    #[ignore]
    fn deploy_is_idempotent() {
        let url = std::env::var("TEST_DATABASE_URL").expect("TEST_DATABASE_URL must be set");
        let mut conn = PgConnection::establish(&url).unwrap();
        conn.begin_test_transaction().unwrap();
        deploy(&mut conn, SchemaSource::Embedded).unwrap();
        let again = deploy(&mut conn, SchemaSource::Embedded).unwrap();
        assert!(again.applied_migrations.is_empty());
        for table in UPSERT_ORDER {
            assert!(again.tables.iter().any(|t| t == table.name()));
        }
    }
}
