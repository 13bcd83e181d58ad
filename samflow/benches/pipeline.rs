use criterion::{black_box, criterion_group, criterion_main, Criterion};

use samflow::{
    filters::{apply_filter, compose_header_filters, simple::filter_unmapped_reads, HeaderFilter},
    header::Header,
    record::Alignment,
    slice::Slice,
};

fn generate_records(n: usize) -> Vec<Alignment> {
    (0..n)
        .map(|i| {
            let flag = if i % 7 == 0 { 4 } else { 0 };
            let line = format!("read{i}\t{flag}\tchr1\t{pos}\t60\t100M\t*\t0\t0\t*\t*", pos = i + 1);
            Alignment::parse(Slice::from(line.as_str())).unwrap()
        })
        .collect()
}

fn bench_apply_filter(c: &mut Criterion) {
    let mut header = Header::default();
    let filters: Vec<HeaderFilter> = vec![filter_unmapped_reads()];
    let filter = compose_header_filters(&mut header, &filters).unwrap().unwrap();
    let records = generate_records(50_000);

    c.bench_function("apply_filter_50k_records", |b| {
        b.iter_batched(
            || records.clone(),
            |mut records| {
                apply_filter(&mut records, black_box(&filter));
                black_box(records)
            },
            criterion::BatchSize::LargeInput,
        )
    });
}

fn bench_parse_records(c: &mut Criterion) {
    let lines: Vec<String> = (0..50_000)
        .map(|i| format!("read{i}\t0\tchr1\t{pos}\t60\t100M\t*\t0\t0\t*\t*", pos = i + 1))
        .collect();

    c.bench_function("parse_50k_alignments", |b| {
        b.iter(|| {
            let parsed: Vec<Alignment> = lines
                .iter()
                .map(|line| Alignment::parse(Slice::from(line.as_str())).unwrap())
                .collect();
            black_box(parsed)
        })
    });
}

criterion_group!(benches, bench_apply_filter, bench_parse_records);
criterion_main!(benches);
