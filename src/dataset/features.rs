//! Engineered feature records derived from raw application rows.

use std::collections::HashSet;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use super::DatasetError;
use super::encoding::{FeatureEncoders, or_unknown, product_key};
use super::raw::{ApplicationRecord, ApplicationTable, DelinquencyIndex};

const DAYS_PER_YEAR: f64 = 365.0;
/// `DAYS_EMPLOYED` placeholder for applicants without current employment.
pub const EMPLOYMENT_SENTINEL_DAYS: f64 = 365_243.0;

/// Output columns, in file order, excluding the label.
pub const FEATURE_COLUMNS: [&str; 12] = [
    "id",
    "age",
    "annual_income",
    "num_children",
    "tenure_years",
    "credit_score",
    "product_category",
    "credit_amount",
    "debt_ratio",
    "education_level",
    "family_status",
    "delinquency_count",
];
/// Label column, written only for the training population.
pub const TARGET_COLUMN: &str = "target";

/// Whether the outcome label is carried through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeriveMode {
    Training,
    Scoring,
}

/// One model-ready row per applicant.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureRecord {
    pub id: u64,
    pub age: i64,
    pub annual_income: f64,
    pub num_children: Option<u32>,
    pub tenure_years: Option<f64>,
    pub credit_score: Option<f64>,
    pub product_category: i64,
    pub credit_amount: f64,
    pub debt_ratio: f64,
    pub education_level: i64,
    pub family_status: i64,
    pub delinquency_count: u32,
    pub target: Option<u8>,
}

impl FeatureRecord {
    /// Names of the model inputs, matching [`FeatureRecord::model_inputs`].
    pub fn model_input_names() -> Vec<String> {
        FEATURE_COLUMNS[1..].iter().map(|name| name.to_string()).collect()
    }

    /// Model input vector: every column except `id` and `target`, absent values as NaN.
    pub fn model_inputs(&self) -> Vec<f64> {
        vec![
            self.age as f64,
            self.annual_income,
            self.num_children.map(f64::from).unwrap_or(f64::NAN),
            self.tenure_years.unwrap_or(f64::NAN),
            self.credit_score.unwrap_or(f64::NAN),
            self.product_category as f64,
            self.credit_amount,
            self.debt_ratio,
            self.education_level as f64,
            self.family_status as f64,
            f64::from(self.delinquency_count),
        ]
    }

    fn csv_fields(&self, mode: DeriveMode) -> Vec<String> {
        let mut fields = vec![
            self.id.to_string(),
            self.age.to_string(),
            format_f64(self.annual_income),
            format_opt(self.num_children),
            self.tenure_years.map(format_f64).unwrap_or_default(),
            self.credit_score.map(format_f64).unwrap_or_default(),
            self.product_category.to_string(),
            format_f64(self.credit_amount),
            format_f64(self.debt_ratio),
            self.education_level.to_string(),
            self.family_status.to_string(),
            self.delinquency_count.to_string(),
        ];
        if mode == DeriveMode::Training {
            fields.push(format_opt(self.target));
        }
        fields
    }
}

/// Derived feature rows for one population.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureTable {
    pub mode: DeriveMode,
    pub records: Vec<FeatureRecord>,
}

impl FeatureTable {
    /// Column names written to CSV for this table.
    pub fn columns(&self) -> Vec<&'static str> {
        let mut columns = FEATURE_COLUMNS.to_vec();
        if self.mode == DeriveMode::Training {
            columns.push(TARGET_COLUMN);
        }
        columns
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Write the table as CSV with a header row.
    pub fn write_csv(&self, path: &Path) -> Result<(), DatasetError> {
        let file = File::create(path).map_err(|source| DatasetError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        self.write_csv_to(BufWriter::new(file), path)
    }

    fn write_csv_to<W: Write>(&self, writer: W, path: &Path) -> Result<(), DatasetError> {
        let csv_err = |source| DatasetError::Csv {
            path: path.to_path_buf(),
            source,
        };
        let mut writer = csv::Writer::from_writer(writer);
        writer.write_record(self.columns()).map_err(csv_err)?;
        for record in &self.records {
            writer.write_record(record.csv_fields(self.mode)).map_err(csv_err)?;
        }
        writer.flush().map_err(|source| DatasetError::Io {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Derive one feature record per application row.
///
/// When `encoders` is `None` the categorical codes are fitted on `table`
/// itself; pass the training encoders to keep codes consistent across tables.
/// Without a bureau index every delinquency count is `0`.
pub fn derive_features(
    table: &ApplicationTable,
    delinquency: Option<&DelinquencyIndex>,
    mode: DeriveMode,
    encoders: Option<&FeatureEncoders>,
) -> Result<FeatureTable, DatasetError> {
    let fitted;
    let encoders = match encoders {
        Some(encoders) => encoders,
        None => {
            fitted = FeatureEncoders::fit(table);
            &fitted
        }
    };

    let mut seen = HashSet::with_capacity(table.records.len());
    let mut records = Vec::with_capacity(table.records.len());
    for (idx, app) in table.records.iter().enumerate() {
        if !seen.insert(app.id) {
            return Err(DatasetError::DuplicateId {
                table: table.name.clone(),
                id: app.id,
            });
        }
        let target = match mode {
            DeriveMode::Training => Some(app.target.ok_or_else(|| DatasetError::MissingValue {
                table: table.name.clone(),
                row: idx + 1,
                column: "TARGET",
            })?),
            DeriveMode::Scoring => None,
        };
        records.push(FeatureRecord {
            id: app.id,
            age: age_years(app.days_birth),
            annual_income: app.income,
            num_children: app.children,
            tenure_years: app.days_employed.map(tenure_years),
            credit_score: credit_score(&app.ext_sources),
            product_category: encoders.product_category.encode(&product_key(app)),
            credit_amount: app.credit_amount,
            debt_ratio: app.credit_amount / app.income,
            education_level: encoders.education_level.encode(or_unknown(&app.education_type)),
            family_status: encoders.family_status.encode(or_unknown(&app.family_status)),
            delinquency_count: delinquency.map(|index| index.count_for(app.id)).unwrap_or(0),
            target,
        });
    }
    Ok(FeatureTable { mode, records })
}

/// `round(-days_birth / 365)`, ties to even.
pub fn age_years(days_birth: f64) -> i64 {
    (-days_birth / DAYS_PER_YEAR).round_ties_even() as i64
}

/// Years employed rounded to one decimal; the unemployment sentinel maps to `0`.
///
/// The sentinel is detected on the unrounded quotient, in either sign.
pub fn tenure_years(days_employed: f64) -> f64 {
    let years = -days_employed / DAYS_PER_YEAR;
    if years.abs() == EMPLOYMENT_SENTINEL_DAYS / DAYS_PER_YEAR {
        return 0.0;
    }
    (years * 10.0).round_ties_even() / 10.0
}

/// Mean of the present external scores; `None` when all are absent.
pub fn credit_score(ext_sources: &[Option<f64>]) -> Option<f64> {
    let present: Vec<f64> = ext_sources
        .iter()
        .flatten()
        .copied()
        .filter(|value| !value.is_nan())
        .collect();
    if present.is_empty() {
        return None;
    }
    Some(present.iter().sum::<f64>() / present.len() as f64)
}

fn format_f64(value: f64) -> String {
    value.to_string()
}

fn format_opt<T: ToString>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}
