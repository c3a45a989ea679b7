use std::path::Path;

pub const TRAIN_ROWS: usize = 40;
pub const TEST_ROWS: usize = 10;
/// Training applicant with two overdue bureau lines and one settled line.
pub const DELINQUENT_ID: u64 = 100_003;

const APPLICATION_COLUMNS: [&str; 13] = [
    "SK_ID_CURR",
    "TARGET",
    "NAME_CONTRACT_TYPE",
    "CNT_CHILDREN",
    "AMT_INCOME_TOTAL",
    "AMT_CREDIT",
    "NAME_EDUCATION_TYPE",
    "NAME_FAMILY_STATUS",
    "DAYS_BIRTH",
    "DAYS_EMPLOYED",
    "EXT_SOURCE_1",
    "EXT_SOURCE_2",
    "EXT_SOURCE_3",
];

/// Every fourth applicant defaults; defaulters carry low external scores.
pub fn default_label(idx: usize) -> u8 {
    u8::from(idx % 4 == 0)
}

/// Write `application_train.csv`, `application_test.csv` and `bureau.csv` into `dir`.
pub fn write_raw_tables(dir: &Path) {
    write_raw_tables_with(dir, default_label, None);
}

/// Like [`write_raw_tables`] with a custom label rule and an optional dropped training column.
pub fn write_raw_tables_with(dir: &Path, label: fn(usize) -> u8, drop_train_column: Option<&str>) {
    std::fs::create_dir_all(dir).expect("create raw dir");
    let train: Vec<Vec<String>> = (0..TRAIN_ROWS)
        .map(|idx| application_row(100_000 + idx as u64, idx, Some(label(idx)), "Higher education"))
        .collect();
    let test: Vec<Vec<String>> = (0..TEST_ROWS)
        .map(|idx| {
            let education = if idx == 0 {
                "Academic degree"
            } else {
                "Secondary / secondary special"
            };
            application_row(200_000 + idx as u64, idx, None, education)
        })
        .collect();
    write_table(&dir.join("application_train.csv"), &train, drop_train_column);
    write_table(&dir.join("application_test.csv"), &test, Some("TARGET"));
    std::fs::write(
        dir.join("bureau.csv"),
        format!(
            "SK_ID_CURR,SK_ID_BUREAU,CREDIT_DAY_OVERDUE\n\
             {DELINQUENT_ID},1,12\n\
             {DELINQUENT_ID},2,0\n\
             {DELINQUENT_ID},3,40\n\
             100010,4,0\n\
             200001,5,3\n"
        ),
    )
    .expect("write bureau");
}

fn application_row(id: u64, idx: usize, target: Option<u8>, education: &str) -> Vec<String> {
    let risky = target == Some(1) || (target.is_none() && idx % 4 == 0);
    let ext = |offset: f64| {
        let base = if risky { 0.1 } else { 0.6 };
        format!("{:.3}", base + offset + idx as f64 * 0.001)
    };
    let ext_source_1 = if idx % 5 == 0 { String::new() } else { ext(0.05) };
    let days_employed = if idx % 7 == 0 {
        "365243".to_string()
    } else {
        format!("-{}", 400 + 30 * idx)
    };
    let contract = if idx % 2 == 0 { "Cash loans" } else { "Revolving loans" };
    let family = if idx % 3 == 0 { "Married" } else { "Single / not married" };
    vec![
        id.to_string(),
        target.map(|t| t.to_string()).unwrap_or_default(),
        contract.to_string(),
        (idx % 3).to_string(),
        (100_000 + 1_000 * idx).to_string(),
        (200_000 + 5_000 * idx).to_string(),
        education.to_string(),
        family.to_string(),
        format!("-{}", 9_000 + 100 * idx),
        days_employed,
        ext_source_1,
        ext(0.0),
        ext(0.1),
    ]
}

fn write_table(path: &Path, rows: &[Vec<String>], drop_column: Option<&str>) {
    let keep: Vec<usize> = APPLICATION_COLUMNS
        .iter()
        .enumerate()
        .filter(|(_, name)| Some(**name) != drop_column)
        .map(|(idx, _)| idx)
        .collect();
    let mut writer = csv::Writer::from_path(path).expect("open csv");
    writer
        .write_record(keep.iter().map(|&idx| APPLICATION_COLUMNS[idx]))
        .expect("write header");
    for row in rows {
        writer
            .write_record(keep.iter().map(|&idx| row[idx].as_str()))
            .expect("write row");
    }
    writer.flush().expect("flush csv");
}
