use std::hint::black_box;

use chrono::NaiveDate;
use criterion::{Criterion, criterion_group, criterion_main};
use pakt_archive::codec::tar;
use pakt_archive::{InputFile, TarCodec, ZipCodec};

fn sample_files() -> Vec<InputFile> {
    (0..64)
        .map(|i| {
            let body = format!("line {i} of a moderately repetitive text file\n").repeat(200);
            InputFile::new(format!("dir{}/file{i}.txt", i % 8), body.into_bytes())
        })
        .collect()
}

fn bench_zip(c: &mut Criterion) {
    let when = NaiveDate::from_ymd_opt(2024, 1, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .unwrap();
    let files = sample_files();
    let archive = ZipCodec::build(&files, when).unwrap();

    c.bench_function("zip_build_64", |b| {
        b.iter(|| ZipCodec::build(black_box(&files), when).unwrap())
    });
    c.bench_function("zip_parse_64", |b| {
        b.iter(|| ZipCodec::parse(black_box(&archive)).unwrap())
    });
}

fn bench_tar(c: &mut Criterion) {
    let when = NaiveDate::from_ymd_opt(2024, 1, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .unwrap();
    let archive = TarCodec::build(&sample_files(), when).unwrap();

    c.bench_function("tar_parse_64", |b| {
        b.iter(|| tar::parse(black_box(&archive)).unwrap())
    });
}

criterion_group!(benches, bench_zip, bench_tar);
criterion_main!(benches);
