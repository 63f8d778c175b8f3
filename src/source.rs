use std::collections::HashMap;
use std::path::{Path, PathBuf};

use calamine::{open_workbook, Data, Reader, Xlsx};
use polars::prelude::*;
use tracing::debug;

use crate::config::SourceConfig;
use crate::error::{Result, TrialError};
use crate::tables::{TableName, TrialTables};

/// Where raw tables come from.
///
/// `Ok(None)` means the table does not exist and the transformer should
/// degrade; `Err` is a fetch failure and aborts the load.
pub trait TableSource {
    fn fetch(&self, table: TableName) -> Result<Option<DataFrame>>;

    /// Fetch every table the transformer reads.
    fn fetch_all(&self) -> Result<TrialTables> {
        let mut tables = TrialTables::default();
        for name in TableName::ALL {
            match self.fetch(name)? {
                Some(df) => {
                    debug!(table = %name, rows = df.height(), "table fetched");
                    tables.set(name, df);
                }
                None => debug!(table = %name, "table absent"),
            }
        }
        Ok(tables)
    }
}

// ── CSV directory ───────────────────────────────────────────────────────────

/// Reads `<table>.csv` files from one directory, every column as a string.
///
/// The region lookup is a spreadsheet: `<region_table>.xlsx` is read when
/// present, `<region_table>.csv` otherwise.
#[derive(Debug, Clone)]
pub struct CsvDirectorySource {
    base_path: PathBuf,
    region_table: String,
}

impl CsvDirectorySource {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self::from_config(&SourceConfig {
            data_dir: base_path.into(),
            ..SourceConfig::default()
        })
    }

    pub fn from_config(config: &SourceConfig) -> Self {
        Self {
            base_path: config.data_dir.clone(),
            region_table: config.region_table.clone(),
        }
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// First existing file for `table`.
    fn path_for(&self, table: TableName) -> Option<PathBuf> {
        let (stem, extensions): (&str, &[&str]) = match table {
            TableName::Regioes => (self.region_table.as_str(), &["xlsx", "csv"][..]),
            other => (other.as_str(), &["csv"][..]),
        };
        extensions
            .iter()
            .map(|ext| self.base_path.join(format!("{stem}.{ext}")))
            .find(|path| path.exists())
    }
}

impl TableSource for CsvDirectorySource {
    fn fetch(&self, table: TableName) -> Result<Option<DataFrame>> {
        let Some(path) = self.path_for(table) else {
            return Ok(None);
        };
        let read = match path.extension().and_then(|e| e.to_str()) {
            Some("xlsx") => read_xlsx_as_strings(&path),
            _ => read_csv_as_strings(&path),
        };
        read.map(Some).map_err(|e| TrialError::Source {
            table: table.to_string(),
            message: e.to_string(),
        })
    }
}

/// Read a CSV file with all columns as String dtype and trimmed headers.
pub fn read_csv_as_strings(path: &Path) -> Result<DataFrame> {
    let mut df = CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(Some(0)) // all columns as String
        .try_into_reader_with_file_path(Some(path.to_path_buf()))?
        .finish()?;

    let trimmed: Vec<String> = df
        .get_column_names_str()
        .iter()
        .map(|c| c.trim().to_string())
        .collect();
    df.set_column_names(trimmed.as_slice())?;

    Ok(df)
}

/// Read the first worksheet of an xlsx workbook the same way: first row as
/// trimmed headers, every cell as a string, empty cells as nulls.
pub fn read_xlsx_as_strings(path: &Path) -> Result<DataFrame> {
    let mut workbook: Xlsx<_> = open_workbook(path)?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| TrialError::InvalidData(format!("{} has no worksheet", path.display())))??;

    let mut rows = range.rows();
    let Some(header) = rows.next() else {
        return Ok(DataFrame::empty());
    };
    let names: Vec<String> = header
        .iter()
        .map(|cell| cell_text(cell).unwrap_or_default().trim().to_string())
        .collect();

    let mut values: Vec<Vec<Option<String>>> = vec![Vec::new(); names.len()];
    for row in rows {
        for (i, column) in values.iter_mut().enumerate() {
            column.push(row.get(i).and_then(cell_text));
        }
    }

    let columns: Vec<Column> = names
        .iter()
        .zip(values)
        .map(|(name, column)| Column::new(name.as_str().into(), column))
        .collect();
    Ok(DataFrame::new(columns)?)
}

/// Spreadsheet numbers are floats; integral ones render like their CSV text.
fn cell_text(cell: &Data) -> Option<String> {
    match cell {
        Data::Empty => None,
        Data::String(s) => Some(s.clone()),
        Data::Float(f) if f.is_finite() && f.fract() == 0.0 => Some(format!("{}", *f as i64)),
        other => Some(other.to_string()),
    }
}

// ── In memory ───────────────────────────────────────────────────────────────

/// Tables handed over directly, e.g. frames already fetched by the dashboard.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    tables: HashMap<TableName, DataFrame>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_table(mut self, name: TableName, df: DataFrame) -> Self {
        self.tables.insert(name, df);
        self
    }

    pub fn insert(&mut self, name: TableName, df: DataFrame) {
        self.tables.insert(name, df);
    }
}

impl TableSource for MemorySource {
    fn fetch(&self, table: TableName) -> Result<Option<DataFrame>> {
        Ok(self.tables.get(&table).cloned())
    }
}
