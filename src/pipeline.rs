//! Subcommand handlers. Each turns a stage result into the outcome document
//! printed for the orchestrator.

use crate::config::Config;
use crate::db::connection::establish;
use crate::db::postgres::{PgWarehouse, UpsertStrategy};
use crate::event::{Event, Outcome};
use crate::mapping::MappingConfig;
use crate::services::deploy::{deploy, SchemaSource};
use crate::services::ingest::{ingest_workbook, IngestError, IngestReport};
use crate::services::refresh::{trigger_refresh, RefreshReceipt};
use crate::services::upsert::{upsert_all, UpsertSummary};
use crate::warehouse::Warehouse;
use diesel::PgConnection;
use http::StatusCode;
use log::info;
use std::path::PathBuf;

pub struct Context {
    pub config: Config,
    pub event: Event,
}

impl Context {
    fn connect(&self) -> Result<PgConnection, Outcome> {
        let settings = self
            .config
            .connection_settings(self.event.secret_name.as_deref())
            .map_err(|e| Outcome::failure(StatusCode::BAD_REQUEST, "Configuration error", e))?;
        establish(&settings).map_err(|e| Outcome::failure(StatusCode::SERVICE_UNAVAILABLE, "Database connection failed", e))
    }

    fn mapping(&self) -> Result<MappingConfig, Outcome> {
        MappingConfig::load(self.config.mapping_file.as_deref())
            .map_err(|e| Outcome::failure(StatusCode::BAD_REQUEST, "Invalid column mapping", e))
    }

    /// Command-line path first, then the event payload.
    fn input_path(&self, cli: Option<PathBuf>) -> Result<PathBuf, Outcome> {
        cli.or_else(|| self.event.input_path()).ok_or_else(|| {
            Outcome::failure(
                StatusCode::BAD_REQUEST,
                "Configuration error",
                "no input workbook given (pass a path or set input_path in the event)",
            )
        })
    }
}

pub fn deploy_schema(ctx: &Context) -> Outcome {
    let attempt = || -> Result<Outcome, Outcome> {
        let mut conn = ctx.connect()?;
        let source = match ctx.event.schema_sql.as_deref().filter(|s| !s.trim().is_empty()) {
            Some(sql) => SchemaSource::Inline(sql),
            None => SchemaSource::Embedded,
        };
        let report = deploy(&mut conn, source)
            .map_err(|e| Outcome::failure(StatusCode::INTERNAL_SERVER_ERROR, "Schema deployment failed", e))?;

        let mut outcome = Outcome::success("Schema deployed successfully");
        outcome.body.tables = Some(report.tables.clone());
        outcome.body.details = serde_json::to_value(&report).ok();
        Ok(outcome)
    };
    attempt().unwrap_or_else(|failure| failure)
}

pub fn ingest(ctx: &Context, path: Option<PathBuf>, sheet: Option<&str>) -> Outcome {
    let attempt = || -> Result<Outcome, Outcome> {
        let path = ctx.input_path(path)?;
        let mapping = ctx.mapping()?;
        let mut conn = ctx.connect()?;
        let mut warehouse = PgWarehouse::new(&mut conn, UpsertStrategy::default());
        let report = ingest_stage(&mut warehouse, &path, sheet, &mapping)?;
        Ok(ingest_outcome(&report))
    };
    attempt().unwrap_or_else(|failure| failure)
}

pub fn upsert(ctx: &Context, strategy: UpsertStrategy) -> Outcome {
    let attempt = || -> Result<Outcome, Outcome> {
        let mut conn = ctx.connect()?;
        let mut warehouse = PgWarehouse::new(&mut conn, strategy);
        Ok(upsert_outcome(&upsert_all(&mut warehouse)))
    };
    attempt().unwrap_or_else(|failure| failure)
}

pub fn refresh(ctx: &Context) -> Outcome {
    match trigger_refresh(&ctx.config.refresh) {
        Ok(receipt) => refresh_outcome(&receipt),
        Err(e) => Outcome::failure(e.status_code(), "Dataset refresh failed", e),
    }
}

/// Ingest, upsert, then refresh. Refresh only follows a fully successful
/// upsert, and is skipped when no refresh target is configured at all.
pub fn run(ctx: &Context, path: Option<PathBuf>, sheet: Option<&str>, strategy: UpsertStrategy) -> Outcome {
    let attempt = || -> Result<Outcome, Outcome> {
        let path = ctx.input_path(path).map_err(|o| o.in_stage("ingest"))?;
        let mapping = ctx.mapping().map_err(|o| o.in_stage("ingest"))?;
        let mut conn = ctx.connect().map_err(|o| o.in_stage("connect"))?;
        let mut warehouse = PgWarehouse::new(&mut conn, strategy);

        let report = ingest_stage(&mut warehouse, &path, sheet, &mapping).map_err(|o| o.in_stage("ingest"))?;
        info!("Ingest staged {} row(s); starting upsert", report.staged_rows());

        let summary = upsert_all(&mut warehouse);
        let mut outcome = upsert_outcome(&summary);
        if !summary.is_success() {
            return Err(outcome.in_stage("upsert"));
        }

        let refresh = &ctx.config.refresh;
        if refresh.endpoint.is_none() && refresh.account_id.is_none() && refresh.dataset_id.is_none() {
            info!("No refresh target configured; skipping dataset refresh");
        } else {
            match trigger_refresh(refresh) {
                Ok(receipt) => {
                    outcome.body.ingestion_id = Some(receipt.ingestion_id);
                    outcome.body.ingestion_status = Some(receipt.ingestion_status);
                }
                Err(e) => {
                    // committed data stays; only the refresh is reported as failed
                    outcome.status_code = e.status_code().as_u16();
                    outcome.body.message = format!("{}; dataset refresh failed", summary.message());
                    outcome.body.error = Some(e.to_string());
                    return Err(outcome.in_stage("refresh"));
                }
            }
        }
        outcome.body.message = format!("Pipeline completed. {}", summary.message());
        Ok(outcome)
    };
    if let Some(job) = ctx.event.job_name.as_deref() {
        info!("Pipeline run for job {}", job);
    }
    attempt().unwrap_or_else(|failure| failure)
}

fn ingest_stage<W: Warehouse + ?Sized>(
    warehouse: &mut W,
    path: &std::path::Path,
    sheet: Option<&str>,
    mapping: &MappingConfig,
) -> Result<IngestReport, Outcome> {
    ingest_workbook(warehouse, path, sheet, mapping).map_err(|e| {
        let status = match &e {
            IngestError::Spreadsheet(_) | IngestError::Unmapped(_) => StatusCode::BAD_REQUEST,
            IngestError::Staging { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Outcome::failure(status, "Ingest failed", e)
    })
}

fn ingest_outcome(report: &IngestReport) -> Outcome {
    let mut outcome = Outcome::success(format!(
        "Staged {} row(s) from worksheet {}",
        report.staged_rows(),
        report.sheet
    ));
    outcome.body.tables = Some(report.tables.iter().map(|t| t.table.name().to_string()).collect());
    outcome.body.rows = Some(
        report
            .tables
            .iter()
            .map(|t| (t.table.name().to_string(), t.staging.staged))
            .collect(),
    );
    outcome.body.total_rows_processed = Some(report.staged_rows());
    outcome.body.details = serde_json::to_value(report).ok();
    outcome
}

fn upsert_outcome(summary: &UpsertSummary) -> Outcome {
    let mut outcome = if summary.is_success() {
        Outcome::success(summary.message())
    } else {
        let errors = summary
            .failures()
            .map(|(table, err)| format!("{}: {}", table, err))
            .collect::<Vec<_>>()
            .join("; ");
        Outcome::failure(StatusCode::INTERNAL_SERVER_ERROR, summary.message(), errors)
    };
    outcome.body.tables = Some(summary.processed().iter().map(|t| t.name().to_string()).collect());
    outcome.body.rows = Some(summary.row_counts());
    outcome.body.total_rows_processed = Some(summary.total_rows());
    outcome.body.details = serde_json::to_value(summary).ok();
    outcome
}

fn refresh_outcome(receipt: &RefreshReceipt) -> Outcome {
    let mut outcome = Outcome::success("Dataset refresh initiated successfully");
    outcome.body.ingestion_id = Some(receipt.ingestion_id.clone());
    outcome.body.ingestion_status = Some(receipt.ingestion_status.clone());
    outcome
}
