//! Date normalization for the spreadsheet's date column.
//!
//! Native spreadsheet dates arrive rendered as calendar fields
//! (`YEAR=2024,MONTH=2,DAY_OF_MONTH=15`, zero-based month), typed-in dates as
//! plain text. Strategies are tried in order and the first valid date wins.

use crate::mapping::{normalize_header, SourceRow, DATE_KEY};
use chrono::{Datelike, NaiveDate};
use log::{info, warn};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

static YEAR_FIELD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:^|[^A-Z_])YEAR=(\d{4})").expect("valid YEAR pattern"));
static MONTH_FIELD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:^|[^A-Z_])MONTH=(\d+)").expect("valid MONTH pattern"));
static DAY_FIELD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"DAY_OF_MONTH=(\d+)").expect("valid DAY_OF_MONTH pattern"));

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DateSettings {
    /// Spreadsheet header carrying the date.
    pub column: String,
    /// Added to the extracted month; calendar fields count months from zero.
    pub calendar_month_offset: u32,
    /// chrono format for typed-in dates.
    pub text_format: String,
}

impl Default for DateSettings {
    fn default() -> Self {
        DateSettings {
            column: "Datum".to_string(),
            calendar_month_offset: 1,
            text_format: "%d.%m.%Y".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DateStrategy {
    CalendarFields { month_offset: u32 },
    TextFormat(String),
}

impl DateStrategy {
    pub fn parse(&self, raw: &str) -> Option<NaiveDate> {
        match self {
            DateStrategy::CalendarFields { month_offset } => {
                let year = capture_number(&YEAR_FIELD, raw)?;
                let month = capture_number(&MONTH_FIELD, raw)?.checked_add(*month_offset)?;
                let day = capture_number(&DAY_FIELD, raw)?;
                NaiveDate::from_ymd_opt(i32::try_from(year).ok()?, month, day)
            }
            DateStrategy::TextFormat(format) => NaiveDate::parse_from_str(raw.trim(), format).ok(),
        }
    }
}

fn capture_number(re: &Regex, raw: &str) -> Option<u32> {
    re.captures(raw)?.get(1)?.as_str().parse().ok()
}

/// Ordered strategy chain; earlier strategies win ties.
#[derive(Debug, Clone)]
pub struct DateNormalizer {
    strategies: Vec<DateStrategy>,
}

impl DateNormalizer {
    pub fn new(strategies: Vec<DateStrategy>) -> Self {
        DateNormalizer { strategies }
    }

    pub fn from_settings(settings: &DateSettings) -> Self {
        Self::new(vec![
            DateStrategy::CalendarFields {
                month_offset: settings.calendar_month_offset,
            },
            DateStrategy::TextFormat(settings.text_format.clone()),
        ])
    }

    pub fn resolve(&self, raw: &str) -> Option<NaiveDate> {
        self.strategies.iter().find_map(|s| s.parse(raw))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DateReport {
    pub valid: usize,
    pub total: usize,
    /// The date column was absent and every date was set to null.
    pub degraded: bool,
}

/// Write the canonical date of every row under [`DATE_KEY`] as `YYYY-MM-DD`,
/// removing the key where no date could be resolved.
pub fn normalize_rows(
    rows: &mut [SourceRow],
    headers: &[String],
    settings: &DateSettings,
    normalizer: &DateNormalizer,
) -> DateReport {
    let column = normalize_header(&settings.column);
    let total = rows.len();

    if !headers.iter().any(|h| *h == column) {
        warn!(
            "Date column {:?} not found in worksheet; continuing with NULL dates for all {} row(s)",
            column, total
        );
        for row in rows.iter_mut() {
            row.remove(DATE_KEY);
        }
        return DateReport {
            valid: 0,
            total,
            degraded: true,
        };
    }

    let mut valid = 0;
    for row in rows.iter_mut() {
        match row.get(&column).and_then(|raw| normalizer.resolve(raw)) {
            Some(date) => {
                row.insert(DATE_KEY.to_string(), date.format("%Y-%m-%d").to_string());
                valid += 1;
            }
            None => {
                row.remove(DATE_KEY);
            }
        }
    }
    info!("Valid dates: {}/{}", valid, total);
    DateReport {
        valid,
        total,
        degraded: false,
    }
}

/// Render a date the way native spreadsheet dates reach the normalizer.
pub fn calendar_fields(date: NaiveDate) -> String {
    format!("YEAR={},MONTH={},DAY_OF_MONTH={}", date.year(), date.month0(), date.day())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn normalizer() -> DateNormalizer {
        DateNormalizer::from_settings(&DateSettings::default())
    }

    #[test]
    fn calendar_fields_use_zero_based_month() {
        let raw = "java.util.GregorianCalendar[time=?,YEAR=2024,MONTH=2,WEEK_OF_YEAR=11,WEEK_OF_MONTH=3,DAY_OF_MONTH=15,DAY_OF_YEAR=75]";
        assert_eq!(normalizer().resolve(raw), Some(ymd(2024, 3, 15)));
    }

    #[test]
    fn text_format_is_the_fallback() {
        assert_eq!(normalizer().resolve(" 15.03.2024 "), Some(ymd(2024, 3, 15)));
        assert_eq!(normalizer().resolve("Werte aus KW1 2024"), None);
        assert_eq!(normalizer().resolve("31.02.2024"), None);
    }

    #[test]
    fn calendar_fields_win_ties() {
        let raw = "YEAR=2024,MONTH=0,DAY_OF_MONTH=5 15.03.2024";
        assert_eq!(DateStrategy::TextFormat("%d.%m.%Y".into()).parse("15.03.2024"), Some(ymd(2024, 3, 15)));
        assert_eq!(normalizer().resolve(raw), Some(ymd(2024, 1, 5)));
    }

    #[test]
    fn incomplete_calendar_fields_fall_through() {
        assert_eq!(normalizer().resolve("YEAR=2024,DAY_OF_MONTH=5"), None);
        assert_eq!(normalizer().resolve("YEAR=2024,MONTH=12,DAY_OF_MONTH=5"), None);
    }

    #[test]
    fn calendar_rendering_round_trips_through_the_chain() {
        let date = ymd(2023, 12, 31);
        assert_eq!(calendar_fields(date), "YEAR=2023,MONTH=11,DAY_OF_MONTH=31");
        assert_eq!(normalizer().resolve(&calendar_fields(date)), Some(date));
    }

    #[test]
    fn normalize_rows_writes_back_canonical_dates() {
        let headers = vec!["Datum".to_string(), "Gesamt Tonage".to_string()];
        let mut rows: Vec<SourceRow> = vec![
            [("Datum", "15.03.2024"), ("Gesamt Tonage", "120")],
            [("Datum", "Summe"), ("Gesamt Tonage", "999")],
        ]
        .into_iter()
        .map(|r| r.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect())
        .collect();

        let report = normalize_rows(&mut rows, &headers, &DateSettings::default(), &normalizer());
        assert_eq!(report, DateReport { valid: 1, total: 2, degraded: false });
        assert_eq!(rows[0].get(DATE_KEY).map(String::as_str), Some("2024-03-15"));
        assert!(!rows[1].contains_key(DATE_KEY));
    }

    #[test]
    fn absent_date_column_degrades_to_null_dates() {
        let headers = vec!["Gesamt Tonage".to_string()];
        let mut rows: Vec<SourceRow> = vec![[("Gesamt Tonage".to_string(), "120".to_string())].into()];
        let report = normalize_rows(&mut rows, &headers, &DateSettings::default(), &normalizer());
        assert!(report.degraded);
        assert_eq!(report.valid, 0);
        assert!(!rows[0].contains_key(DATE_KEY));
    }
}
