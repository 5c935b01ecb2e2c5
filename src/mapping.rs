//! Declarative column mapping from spreadsheet headers to the canonical
//! per-table schema, plus the type coercion applied on the way.
//!
//! The default mapping is embedded from `config/column_mappings.json`; a
//! different file can be supplied at runtime. Every mapping is validated
//! against [`Table::columns`] so the rows it produces always fit the
//! warehouse tables.

use crate::dates::DateSettings;
use crate::table::{Table, UPSERT_ORDER};
use chrono::NaiveDate;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};

/// Key under which the normalized date is written back into a source row.
pub const DATE_KEY: &str = "date";

const EMBEDDED_MAPPING: &str = include_str!("../config/column_mappings.json");

/// One spreadsheet row: normalized header -> rendered cell text.
/// Empty cells are absent.
pub type SourceRow = BTreeMap<String, String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    Int,
    Double,
    Date,
    String,
}

/// A typed cell; `None` is a typed null.
#[derive(Debug, Clone)]
pub enum Value {
    Int(Option<i32>),
    Double(Option<f64>),
    Date(Option<NaiveDate>),
    Text(Option<String>),
}

impl Value {
    pub fn null(kind: ColumnType) -> Self {
        match kind {
            ColumnType::Int => Value::Int(None),
            ColumnType::Double => Value::Double(None),
            ColumnType::Date => Value::Date(None),
            ColumnType::String => Value::Text(None),
        }
    }

    pub fn is_null(&self) -> bool {
        match self {
            Value::Int(v) => v.is_none(),
            Value::Double(v) => v.is_none(),
            Value::Date(v) => v.is_none(),
            Value::Text(v) => v.is_none(),
        }
    }
}

// Doubles compare bitwise so rows can be deduplicated through a hash set.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Double(a), Value::Double(b)) => a.map(f64::to_bits) == b.map(f64::to_bits),
            (Value::Date(a), Value::Date(b)) => a == b,
            (Value::Text(a), Value::Text(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        core::mem::discriminant(self).hash(state);
        match self {
            Value::Int(v) => v.hash(state),
            Value::Double(v) => v.map(f64::to_bits).hash(state),
            Value::Date(v) => v.hash(state),
            Value::Text(v) => v.hash(state),
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("column {column} is missing or is not of type {expected:?}")]
pub struct RowShapeError {
    pub column: String,
    pub expected: ColumnType,
}

/// A row conforming to one table's canonical schema, columns in schema order.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MappedRow {
    columns: Vec<(String, Value)>,
}

impl MappedRow {
    pub fn new(columns: Vec<(String, Value)>) -> Self {
        MappedRow { columns }
    }

    /// A row of typed nulls for `table`.
    pub fn nulls(table: Table) -> Self {
        MappedRow {
            columns: table
                .columns()
                .iter()
                .map(|(name, kind)| (name.to_string(), Value::null(*kind)))
                .collect(),
        }
    }

    pub fn columns(&self) -> &[(String, Value)] {
        &self.columns
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.columns.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    /// Replace the value of an existing column; returns false when absent.
    pub fn set(&mut self, name: &str, value: Value) -> bool {
        match self.columns.iter_mut().find(|(n, _)| n == name) {
            Some(slot) => {
                slot.1 = value;
                true
            }
            None => false,
        }
    }

    pub fn date(&self) -> Option<NaiveDate> {
        match self.get(DATE_KEY) {
            Some(Value::Date(d)) => *d,
            _ => None,
        }
    }

    pub fn int(&self, name: &str) -> Result<Option<i32>, RowShapeError> {
        match self.get(name) {
            Some(Value::Int(v)) => Ok(*v),
            _ => Err(RowShapeError {
                column: name.to_string(),
                expected: ColumnType::Int,
            }),
        }
    }

    pub fn double(&self, name: &str) -> Result<Option<f64>, RowShapeError> {
        match self.get(name) {
            Some(Value::Double(v)) => Ok(*v),
            _ => Err(RowShapeError {
                column: name.to_string(),
                expected: ColumnType::Double,
            }),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum MappingError {
    #[error("failed to read mapping file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid column mapping at {path}: {message}")]
    Parse { path: String, message: String },
    #[error("mapping lists table {0} more than once")]
    DuplicateTable(Table),
    #[error("mapping has no entry for table {0}")]
    MissingTable(Table),
    #[error("mapping for table {table} does not match the warehouse schema: {message}")]
    Schema { table: Table, message: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnMapping {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ColumnType,
    /// Spreadsheet header the value is read from.
    pub source: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableMapping {
    pub table: Table,
    pub columns: Vec<ColumnMapping>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MappingConfig {
    /// Zero-based index of the worksheet row holding the headers.
    #[serde(default = "default_header_row")]
    pub header_row: usize,
    #[serde(default)]
    pub date: DateSettings,
    pub tables: Vec<TableMapping>,
}

fn default_header_row() -> usize {
    1
}

impl MappingConfig {
    pub fn embedded() -> Result<Self, MappingError> {
        Self::from_json_str(EMBEDDED_MAPPING)
    }

    pub fn from_path(path: &Path) -> Result<Self, MappingError> {
        let raw = std::fs::read_to_string(path).map_err(|source| MappingError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&raw)
    }

    /// Embedded mapping unless an override file is given.
    pub fn load(path: Option<&Path>) -> Result<Self, MappingError> {
        match path {
            Some(p) => {
                info!("Loading column mapping from {}", p.display());
                Self::from_path(p)
            }
            None => Self::embedded(),
        }
    }

    pub fn from_json_str(raw: &str) -> Result<Self, MappingError> {
        let de = &mut serde_json::Deserializer::from_str(raw);
        let cfg: MappingConfig = serde_path_to_error::deserialize(de).map_err(|e| MappingError::Parse {
            path: e.path().to_string(),
            message: e.inner().to_string(),
        })?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> Result<(), MappingError> {
        let mut seen = BTreeMap::new();
        for mapping in &self.tables {
            if seen.insert(mapping.table, ()).is_some() {
                return Err(MappingError::DuplicateTable(mapping.table));
            }
            mapping.validate()?;
        }
        for table in UPSERT_ORDER {
            if !seen.contains_key(&table) {
                return Err(MappingError::MissingTable(table));
            }
        }
        Ok(())
    }

    pub fn table(&self, table: Table) -> Option<&TableMapping> {
        self.tables.iter().find(|m| m.table == table)
    }
}

impl TableMapping {
    fn validate(&self) -> Result<(), MappingError> {
        let expected = self.table.columns();
        if self.columns.len() != expected.len() {
            return Err(MappingError::Schema {
                table: self.table,
                message: format!("expected {} columns, found {}", expected.len(), self.columns.len()),
            });
        }
        for (col, (name, kind)) in self.columns.iter().zip(expected) {
            if col.name != *name || col.kind != *kind {
                return Err(MappingError::Schema {
                    table: self.table,
                    message: format!(
                        "column '{}' ({:?}) where '{}' ({:?}) was expected",
                        col.name, col.kind, name, kind
                    ),
                });
            }
        }
        Ok(())
    }

    /// Resolve every canonical column against the available headers and log
    /// which ones were found.
    pub fn plan(&self, headers: &[String]) -> MappingPlan<'_> {
        info!("Mapping columns for table {}", self.table);
        let mut resolved = Vec::with_capacity(self.columns.len());
        let mut found = 0usize;
        for col in &self.columns {
            let alias = normalize_header(&col.source);
            if headers.iter().any(|h| *h == alias) {
                info!("  found column {:?} -> {}", alias, col.name);
                found += 1;
                resolved.push((col, Some(alias)));
            } else {
                warn!("  missing column {:?} -> {} (will be NULL)", alias, col.name);
                resolved.push((col, None));
            }
        }
        info!(
            "Column mapping for {}: {}/{} columns found",
            self.table,
            found,
            self.columns.len()
        );
        MappingPlan {
            table: self.table,
            resolved,
            found,
        }
    }

    /// Map a single row, resolving aliases against the row's own keys.
    pub fn map_row(&self, row: &SourceRow) -> MappedRow {
        MappedRow::new(
            self.columns
                .iter()
                .map(|col| {
                    let value = row
                        .get(&normalize_header(&col.source))
                        .map(|raw| cast(raw, col.kind))
                        .unwrap_or_else(|| Value::null(col.kind));
                    (col.name.clone(), value)
                })
                .collect(),
        )
    }
}

/// Header resolution for one table against one worksheet.
#[derive(Debug)]
pub struct MappingPlan<'a> {
    pub table: Table,
    resolved: Vec<(&'a ColumnMapping, Option<String>)>,
    found: usize,
}

impl MappingPlan<'_> {
    pub fn found(&self) -> usize {
        self.found
    }

    pub fn expected(&self) -> usize {
        self.resolved.len()
    }

    pub fn apply(&self, row: &SourceRow) -> MappedRow {
        MappedRow::new(
            self.resolved
                .iter()
                .map(|(col, header)| {
                    let value = header
                        .as_ref()
                        .and_then(|h| row.get(h))
                        .map(|raw| cast(raw, col.kind))
                        .unwrap_or_else(|| Value::null(col.kind));
                    (col.name.clone(), value)
                })
                .collect(),
        )
    }
}

/// Trim and collapse internal whitespace (including line breaks) to single spaces.
pub fn normalize_header(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Cast rendered cell text to `kind`. Failures produce a typed null.
pub fn cast(raw: &str, kind: ColumnType) -> Value {
    let trimmed = raw.trim();
    match kind {
        ColumnType::Int => Value::Int(parse_int(trimmed)),
        ColumnType::Double => Value::Double(trimmed.parse::<f64>().ok().filter(|v| v.is_finite())),
        ColumnType::Date => Value::Date(NaiveDate::parse_from_str(trimmed, "%Y-%m-%d").ok()),
        ColumnType::String => Value::Text(Some(raw.to_string())),
    }
}

fn parse_int(s: &str) -> Option<i32> {
    if let Ok(v) = s.parse::<i32>() {
        return Some(v);
    }
    // decimals truncate toward zero when they fit
    let f = s.parse::<f64>().ok().filter(|v| v.is_finite())?.trunc();
    if f >= i32::MIN as f64 && f <= i32::MAX as f64 {
        Some(f as i32)
    } else {
        None
    }
}
