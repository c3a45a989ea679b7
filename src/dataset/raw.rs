//! Loading of the raw application and bureau CSV tables.

use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use serde::Deserialize;

use super::DatasetError;
use super::features::DeriveMode;

/// Columns every application table must carry.
pub const REQUIRED_APPLICATION_COLUMNS: &[&str] = &[
    "SK_ID_CURR",
    "DAYS_BIRTH",
    "AMT_INCOME_TOTAL",
    "AMT_CREDIT",
];
/// Outcome column required in training mode.
pub const TARGET_COLUMN: &str = "TARGET";
/// Columns the bureau table must carry.
pub const REQUIRED_BUREAU_COLUMNS: &[&str] = &["SK_ID_CURR", "CREDIT_DAY_OVERDUE"];

/// Validated application row.
#[derive(Debug, Clone, PartialEq)]
pub struct ApplicationRecord {
    pub id: u64,
    /// Days before the application date; negative by convention.
    pub days_birth: f64,
    /// Days employed before the application date; `365243` means not employed.
    pub days_employed: Option<f64>,
    pub income: f64,
    pub credit_amount: f64,
    pub children: Option<u32>,
    pub ext_sources: [Option<f64>; 3],
    pub contract_type: Option<String>,
    pub education_type: Option<String>,
    pub family_status: Option<String>,
    /// `1` for default, `0` otherwise. Only present in the training population.
    pub target: Option<u8>,
}

/// Application rows together with the name used in error messages.
#[derive(Debug, Clone)]
pub struct ApplicationTable {
    pub name: String,
    pub records: Vec<ApplicationRecord>,
}

impl ApplicationTable {
    pub fn new(name: impl Into<String>, records: Vec<ApplicationRecord>) -> Self {
        Self {
            name: name.into(),
            records,
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[derive(Debug, Deserialize)]
struct RawApplicationRow {
    #[serde(rename = "SK_ID_CURR")]
    id: Option<u64>,
    #[serde(rename = "DAYS_BIRTH")]
    days_birth: Option<f64>,
    #[serde(rename = "DAYS_EMPLOYED", default)]
    days_employed: Option<f64>,
    #[serde(rename = "AMT_INCOME_TOTAL")]
    income: Option<f64>,
    #[serde(rename = "AMT_CREDIT")]
    credit_amount: Option<f64>,
    #[serde(rename = "CNT_CHILDREN", default)]
    children: Option<f64>,
    #[serde(rename = "EXT_SOURCE_1", default)]
    ext_source_1: Option<f64>,
    #[serde(rename = "EXT_SOURCE_2", default)]
    ext_source_2: Option<f64>,
    #[serde(rename = "EXT_SOURCE_3", default)]
    ext_source_3: Option<f64>,
    #[serde(rename = "NAME_CONTRACT_TYPE", default)]
    contract_type: Option<String>,
    #[serde(rename = "NAME_EDUCATION_TYPE", default)]
    education_type: Option<String>,
    #[serde(rename = "NAME_FAMILY_STATUS", default)]
    family_status: Option<String>,
    #[serde(rename = "TARGET", default)]
    target: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct RawBureauRow {
    #[serde(rename = "SK_ID_CURR")]
    id: Option<u64>,
    #[serde(rename = "CREDIT_DAY_OVERDUE")]
    overdue_days: Option<f64>,
}

/// Load an application table from a CSV file.
///
/// Missing required columns abort the load before any row is parsed.
pub fn load_applications(path: &Path, mode: DeriveMode) -> Result<ApplicationTable, DatasetError> {
    let file = File::open(path).map_err(|source| DatasetError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    read_applications(file, path, mode)
}

/// Parse application rows from any reader; `path` names the table in errors.
pub fn read_applications<R: Read>(
    reader: R,
    path: &Path,
    mode: DeriveMode,
) -> Result<ApplicationTable, DatasetError> {
    let table = table_name(path);
    let mut reader = csv_reader(reader);
    let headers = reader
        .headers()
        .map_err(|source| csv_error(path, source))?
        .clone();
    require_columns(&headers, REQUIRED_APPLICATION_COLUMNS, &table)?;
    if mode == DeriveMode::Training {
        require_columns(&headers, &[TARGET_COLUMN], &table)?;
    }

    let mut records = Vec::new();
    for (idx, row) in reader.deserialize::<RawApplicationRow>().enumerate() {
        let row = row.map_err(|source| csv_error(path, source))?;
        let line = idx + 1;
        let missing = |column| DatasetError::MissingValue {
            table: table.clone(),
            row: line,
            column,
        };
        let target = whole_count::<u8>(row.target, &table, line, TARGET_COLUMN)?;
        let target = match mode {
            DeriveMode::Training => Some(target.ok_or_else(|| missing(TARGET_COLUMN))?),
            DeriveMode::Scoring => target,
        };
        records.push(ApplicationRecord {
            id: row.id.ok_or_else(|| missing("SK_ID_CURR"))?,
            days_birth: row.days_birth.ok_or_else(|| missing("DAYS_BIRTH"))?,
            days_employed: row.days_employed,
            income: row.income.ok_or_else(|| missing("AMT_INCOME_TOTAL"))?,
            credit_amount: row.credit_amount.ok_or_else(|| missing("AMT_CREDIT"))?,
            children: whole_count(row.children, &table, line, "CNT_CHILDREN")?,
            ext_sources: [row.ext_source_1, row.ext_source_2, row.ext_source_3],
            contract_type: row.contract_type,
            education_type: row.education_type,
            family_status: row.family_status,
            target,
        });
    }
    tracing::debug!("Loaded {} rows from {}", records.len(), table);
    Ok(ApplicationTable::new(table, records))
}

/// Counts may be written as `2` or `2.0`; anything fractional, negative or out of range is rejected.
fn whole_count<T: TryFrom<u64>>(
    value: Option<f64>,
    table: &str,
    row: usize,
    column: &'static str,
) -> Result<Option<T>, DatasetError> {
    let Some(value) = value else {
        return Ok(None);
    };
    let converted = (value >= 0.0 && value.fract() == 0.0)
        .then(|| T::try_from(value as u64).ok())
        .flatten();
    converted.map(Some).ok_or_else(|| DatasetError::InvalidValue {
        table: table.to_string(),
        row,
        column,
        value,
    })
}

/// Count of overdue bureau credit lines per applicant.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DelinquencyIndex {
    counts: HashMap<u64, u32>,
}

impl DelinquencyIndex {
    /// Aggregate `(applicant id, overdue days)` pairs, counting only positive overdue values.
    pub fn from_rows(rows: impl IntoIterator<Item = (u64, Option<f64>)>) -> Self {
        let mut index = Self::default();
        for (id, overdue) in rows {
            index.observe(id, overdue);
        }
        index
    }

    fn observe(&mut self, id: u64, overdue_days: Option<f64>) {
        if overdue_days.is_some_and(|days| days > 0.0) {
            *self.counts.entry(id).or_insert(0) += 1;
        }
    }

    /// Overdue line count for an applicant; `0` when there is no history.
    pub fn count_for(&self, id: u64) -> u32 {
        self.counts.get(&id).copied().unwrap_or(0)
    }

    /// Number of applicants with at least one overdue line.
    pub fn delinquent_applicants(&self) -> usize {
        self.counts.len()
    }
}

/// Stream the bureau table into a delinquency index.
pub fn load_bureau(path: &Path) -> Result<DelinquencyIndex, DatasetError> {
    let file = File::open(path).map_err(|source| DatasetError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    read_bureau(file, path)
}

/// Parse bureau rows from any reader; `path` names the table in errors.
///
/// Rows without an applicant identifier cannot be joined and are skipped.
pub fn read_bureau<R: Read>(reader: R, path: &Path) -> Result<DelinquencyIndex, DatasetError> {
    let table = table_name(path);
    let mut reader = csv_reader(reader);
    let headers = reader
        .headers()
        .map_err(|source| csv_error(path, source))?
        .clone();
    require_columns(&headers, REQUIRED_BUREAU_COLUMNS, &table)?;

    let mut index = DelinquencyIndex::default();
    let mut rows = 0usize;
    let mut orphans = 0usize;
    for row in reader.deserialize::<RawBureauRow>() {
        let row = row.map_err(|source| csv_error(path, source))?;
        rows += 1;
        match row.id {
            Some(id) => index.observe(id, row.overdue_days),
            None => orphans += 1,
        }
    }
    if orphans > 0 {
        tracing::warn!("{table}: skipped {orphans} rows without SK_ID_CURR");
    }
    tracing::debug!(
        "Aggregated {rows} bureau rows; {} applicants with overdue history",
        index.delinquent_applicants()
    );
    Ok(index)
}

fn csv_reader<R: Read>(reader: R) -> csv::Reader<R> {
    csv::ReaderBuilder::new()
        .trim(csv::Trim::Headers)
        .from_reader(reader)
}

fn require_columns(
    headers: &csv::StringRecord,
    required: &[&'static str],
    table: &str,
) -> Result<(), DatasetError> {
    for &column in required {
        if !headers.iter().any(|header| header == column) {
            return Err(DatasetError::MissingColumn {
                table: table.to_string(),
                column,
            });
        }
    }
    Ok(())
}

fn table_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn csv_error(path: &Path, source: csv::Error) -> DatasetError {
    DatasetError::Csv {
        path: path.to_path_buf(),
        source,
    }
}
