use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use pdfmill::api;
use pdfmill::builder::DocumentBuilder;
use pdfmill::config::Configuration;

fn document_bytes(pages: usize) -> Vec<u8> {
    let doc = DocumentBuilder::new().pages(pages).build();
    api::write_bytes(&doc, &Configuration::default()).unwrap()
}

fn bench_read(c: &mut Criterion) {
    let conf = Configuration::default();
    let mut group = c.benchmark_group("read");
    for pages in [1usize, 10, 100] {
        let bytes = document_bytes(pages);
        group.bench_with_input(BenchmarkId::from_parameter(pages), &bytes, |b, bytes| {
            b.iter(|| api::read_validated(&bytes[..], &conf).unwrap());
        });
    }
    group.finish();
}

fn bench_write(c: &mut Criterion) {
    let conf = Configuration::default();
    let mut group = c.benchmark_group("write");
    for pages in [1usize, 10, 100] {
        let doc = DocumentBuilder::new().pages(pages).build();
        group.bench_with_input(BenchmarkId::from_parameter(pages), &doc, |b, doc| {
            b.iter(|| api::write_bytes(doc, &conf).unwrap());
        });
    }
    group.finish();
}

fn bench_full_pipeline(c: &mut Criterion) {
    let conf = Configuration::default();
    let bytes = document_bytes(25);
    c.bench_function("process_25_pages", |b| {
        b.iter(|| {
            let mut out = Vec::new();
            api::process(&bytes[..], &mut out, &conf).unwrap();
            out
        });
    });
}

criterion_group!(benches, bench_read, bench_write, bench_full_pipeline);
criterion_main!(benches);
