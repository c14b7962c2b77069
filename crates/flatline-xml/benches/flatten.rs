use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use flatline_xml::{FlattenOptions, RowStream, flatten_bytes};

fn invoices(count: usize) -> String {
    let mut xml = String::from(r#"<?xml version="1.0"?><export><meta source="bench"/>"#);
    for i in 0..count {
        xml.push_str(&format!(
            r#"<invoice no="INV-{i}"><customer><name>Customer {i}</name><country>DE</country></customer><lines><line>{i}.00</line><line>1.50</line></lines></invoice>"#
        ));
    }
    xml.push_str("</export>");
    xml
}

fn bench_modes(c: &mut Criterion) {
    let mut group = c.benchmark_group("flatten");
    let options = FlattenOptions::default();

    for count in [1_000usize, 10_000] {
        let xml = invoices(count);
        group.throughput(Throughput::Bytes(xml.len() as u64));

        group.bench_with_input(BenchmarkId::new("in_memory", count), &xml, |b, xml| {
            b.iter(|| black_box(flatten_bytes(black_box(xml.as_bytes()), &options)));
        });

        group.bench_with_input(BenchmarkId::new("streaming", count), &xml, |b, xml| {
            b.iter(|| {
                let rows: usize = RowStream::from_slice(black_box(xml.as_bytes()), &options)
                    .map(|batch| batch.map(|rows| rows.len()).unwrap_or(0))
                    .sum();
                black_box(rows)
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_modes);
criterion_main!(benches);
