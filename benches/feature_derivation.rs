use std::hint::black_box;

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use credit_scoring::dataset::{
    ApplicationRecord, ApplicationTable, DelinquencyIndex, DeriveMode, FeatureEncoders,
    derive_features,
};

const APPLICANT_COUNT: usize = 10_000;

fn applications() -> ApplicationTable {
    let contracts = ["Cash loans", "Revolving loans"];
    let educations = ["Higher education", "Secondary / secondary special", "Lower secondary"];
    let records = (0..APPLICANT_COUNT)
        .map(|i| ApplicationRecord {
            id: i as u64,
            days_birth: -(8_000.0 + (i % 12_000) as f64),
            days_employed: Some(if i % 9 == 0 {
                365_243.0
            } else {
                -((i % 4_000) as f64)
            }),
            income: 90_000.0 + (i % 50) as f64 * 1_000.0,
            credit_amount: 150_000.0 + (i % 70) as f64 * 5_000.0,
            children: Some((i % 4) as u32),
            ext_sources: [
                (i % 3 != 0).then(|| (i % 100) as f64 / 100.0),
                Some(0.5),
                (i % 5 != 0).then(|| (i % 80) as f64 / 80.0),
            ],
            contract_type: Some(contracts[i % contracts.len()].to_string()),
            education_type: Some(educations[i % educations.len()].to_string()),
            family_status: (i % 11 != 0).then(|| "Married".to_string()),
            target: Some(u8::from(i % 12 == 0)),
        })
        .collect();
    ApplicationTable::new("bench", records)
}

fn bureau() -> DelinquencyIndex {
    DelinquencyIndex::from_rows(
        (0..APPLICANT_COUNT * 3).map(|i| ((i % APPLICANT_COUNT) as u64, Some((i % 7) as f64))),
    )
}

fn bench_derive_features(c: &mut Criterion) {
    let table = applications();
    let bureau = bureau();
    let encoders = FeatureEncoders::fit(&table);
    c.bench_with_input(
        BenchmarkId::new("derive_features", APPLICANT_COUNT),
        &table,
        |b, table| {
            b.iter(|| {
                derive_features(
                    black_box(table),
                    Some(&bureau),
                    DeriveMode::Training,
                    Some(&encoders),
                )
                .expect("derive features")
            });
        },
    );
}

criterion_group!(benches, bench_derive_features);
criterion_main!(benches);
