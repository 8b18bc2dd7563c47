//! Input loading for the runner.
//!
//! Macro fields and asset prices arrive as wide CSV tables:
//!
//! ```text
//! date,yield_10y,yield_2y
//! 2020-01-02,1.88,1.58
//! 2020-01-03,1.80,
//! ```
//!
//! The first column is the date (`%Y-%m-%d`); every other column is a named
//! `f64` field. Empty cells are missing observations (NaN).
//!
//! Fallback policy per input:
//! 1. If a file path is given → read it
//! 2. If not and `synthetic` is set → generate a deterministic path (tagged)
//! 3. Otherwise → fail with a clear error
//!
//! Synthetic data is a developer-only mode. Results produced on it carry
//! `has_synthetic = true`.

use chrono::{Datelike, NaiveDate, Weekday};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::BTreeMap;
use std::io::Read;
use std::path::{Path, PathBuf};
use thiserror::Error;

use macrolab_core::data::Table;
use macrolab_core::SeriesError;

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Errors from the data loading layer.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to open {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("line {line}: {reason}")]
    Parse { line: u64, reason: String },

    #[error("no {what} file given (use --synthetic for synthetic data)")]
    MissingInput { what: &'static str },

    #[error("invalid table: {0}")]
    Series(#[from] SeriesError),
}

/// Options controlling how inputs are loaded.
#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    /// Wide CSV of macro fields.
    pub macro_path: Option<PathBuf>,
    /// Wide CSV of asset prices.
    pub prices_path: Option<PathBuf>,
    /// Generate synthetic inputs where no file is given.
    pub synthetic: bool,
    /// First synthetic date (defaults to 2005-01-03).
    pub start: Option<NaiveDate>,
    /// Last synthetic date (defaults to 2024-12-31).
    pub end: Option<NaiveDate>,
}

/// Loaded inputs with provenance.
#[derive(Debug, Clone)]
pub struct LoadedData {
    pub macro_data: Table,
    pub prices: Table,
    /// BLAKE3 over both tables.
    pub dataset_hash: String,
    /// Whether either table was generated.
    pub has_synthetic: bool,
}

/// Load macro and price tables, generating synthetic ones where allowed.
///
/// `macro_fields` and `assets` name the columns synthetic tables must carry.
pub fn load_inputs(
    macro_fields: &[String],
    assets: &[String],
    opts: &LoadOptions,
) -> Result<LoadedData, LoadError> {
    let mut has_synthetic = false;
    let start = opts.start.unwrap_or_else(default_synthetic_start);
    let end = opts.end.unwrap_or_else(default_synthetic_end);

    let macro_data = match (&opts.macro_path, opts.synthetic) {
        (Some(path), _) => read_table_file(path)?,
        (None, true) => {
            has_synthetic = true;
            tracing::warn!(fields = ?macro_fields, "generating synthetic macro data");
            synthetic_macro(macro_fields, start, end)?
        }
        (None, false) => return Err(LoadError::MissingInput { what: "macro" }),
    };

    let prices = match (&opts.prices_path, opts.synthetic) {
        (Some(path), _) => read_table_file(path)?,
        (None, true) => {
            has_synthetic = true;
            tracing::warn!(assets = ?assets, "generating synthetic prices");
            synthetic_prices(assets, start, end)?
        }
        (None, false) => return Err(LoadError::MissingInput { what: "prices" }),
    };

    let dataset_hash = compute_dataset_hash(&macro_data, &prices);
    tracing::info!(
        macro_rows = macro_data.len(),
        price_rows = prices.len(),
        has_synthetic,
        dataset_hash = %&dataset_hash[..12],
        "inputs loaded"
    );

    Ok(LoadedData {
        macro_data,
        prices,
        dataset_hash,
        has_synthetic,
    })
}

/// Read a wide CSV table from disk.
pub fn read_table_file(path: &Path) -> Result<Table, LoadError> {
    let file = std::fs::File::open(path).map_err(|source| LoadError::Io {
        path: path.display().to_string(),
        source,
    })?;
    read_table(file)
}

/// Read a wide CSV table from any reader.
pub fn read_table<R: Read>(reader: R) -> Result<Table, LoadError> {
    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers: Vec<String> = rdr.headers()?.iter().skip(1).map(String::from).collect();
    let mut rows = Vec::new();

    for record in rdr.records() {
        let record = record?;
        let line = record.position().map_or(0, |p| p.line());

        let date_cell = record.get(0).unwrap_or_default();
        let date = NaiveDate::parse_from_str(date_cell, DATE_FORMAT).map_err(|e| {
            LoadError::Parse {
                line,
                reason: format!("bad date '{date_cell}': {e}"),
            }
        })?;

        let mut cells = Vec::with_capacity(headers.len());
        for (name, raw) in headers.iter().zip(record.iter().skip(1)) {
            let value = if raw.is_empty() {
                f64::NAN
            } else {
                raw.parse::<f64>().map_err(|e| LoadError::Parse {
                    line,
                    reason: format!("bad value '{raw}' in column '{name}': {e}"),
                })?
            };
            cells.push((name.clone(), value));
        }
        rows.push((date, cells));
    }

    let mut table = Table::from_rows(rows)?;
    // Columns with no rows at all still exist, as all-NaN.
    for name in &headers {
        if !table.has_column(name) {
            let len = table.len();
            table = table.with_column(name.clone(), vec![f64::NAN; len])?;
        }
    }
    Ok(table)
}

/// Deterministic BLAKE3 hash over both tables.
///
/// Columns are visited in name order, so the hash does not depend on the
/// column order of the source files.
pub fn compute_dataset_hash(macro_data: &Table, prices: &Table) -> String {
    let mut hasher = blake3::Hasher::new();
    for (label, table) in [("macro", macro_data), ("prices", prices)] {
        hasher.update(label.as_bytes());
        for date in table.dates() {
            hasher.update(date.to_string().as_bytes());
        }
        for name in table.column_names() {
            hasher.update(name.as_bytes());
            for v in table.column(name).unwrap_or(&[]) {
                hasher.update(&v.to_le_bytes());
            }
        }
    }
    hasher.finalize().to_hex().to_string()
}

// ─── Synthetic data ─────────────────────────────────────────────────

fn default_synthetic_start() -> NaiveDate {
    NaiveDate::from_ymd_opt(2005, 1, 3).unwrap_or_default()
}

fn default_synthetic_end() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 12, 31).unwrap_or_default()
}

/// Weekdays in `[start, end]`.
fn weekday_calendar(start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
    start
        .iter_days()
        .take_while(|d| *d <= end)
        .filter(|d| !matches!(d.weekday(), Weekday::Sat | Weekday::Sun))
        .collect()
}

/// RNG seeded from the column name, so each field gets its own stable path.
fn rng_for(name: &str) -> StdRng {
    StdRng::from_seed(*blake3::hash(name.as_bytes()).as_bytes())
}

/// Yield-like fields (name contains `yield`) follow a floored level random
/// walk; every other field is a slowly growing index from 100.
fn synthetic_macro(fields: &[String], start: NaiveDate, end: NaiveDate) -> Result<Table, LoadError> {
    let dates = weekday_calendar(start, end);
    let mut columns = BTreeMap::new();

    for field in fields {
        let mut rng = rng_for(field);
        let values: Vec<f64> = if field.contains("yield") {
            let mut level = rng.gen_range(1.0_f64..5.0);
            dates
                .iter()
                .map(|_| {
                    level = (level + rng.gen_range(-0.05_f64..0.05)).max(0.0);
                    level
                })
                .collect()
        } else {
            let mut index = 100.0_f64;
            dates
                .iter()
                .map(|_| {
                    index *= 1.0 + rng.gen_range(-0.0002_f64..0.0004);
                    index
                })
                .collect()
        };
        columns.insert(field.clone(), values);
    }

    Ok(Table::new(dates, columns)?)
}

/// Random-walk prices from 100.0, one column per asset.
fn synthetic_prices(assets: &[String], start: NaiveDate, end: NaiveDate) -> Result<Table, LoadError> {
    let dates = weekday_calendar(start, end);
    let mut columns = BTreeMap::new();

    for asset in assets {
        let mut rng = rng_for(asset);
        let mut price = 100.0_f64;
        let values: Vec<f64> = dates
            .iter()
            .map(|_| {
                price *= 1.0 + rng.gen_range(-0.02_f64..0.0205);
                price
            })
            .collect();
        columns.insert(asset.clone(), values);
    }

    Ok(Table::new(dates, columns)?)
}
