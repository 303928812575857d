// Throughput of the in-memory backend and the extraction pipeline
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use futures::StreamExt;
use mediax::prelude::*;
use mediax::{Content, ContentElement};
use mediax_pipeline::enumerate::ListEnumerator;
use rand::prelude::*;
use std::sync::Arc;
use tokio::runtime::Runtime;
use uuid::Uuid;

fn random_color(rng: &mut impl Rng) -> Vec<f32> {
    (0..3).map(|_| rng.random_range(0.0f32..1.0f32)).collect()
}

fn runtime() -> Runtime {
    Runtime::new().unwrap()
}

async fn color_schema() -> Arc<Schema> {
    let mut schema = Schema::new("bench", Arc::new(MemoryConnection::new("bench"))).unwrap();
    schema.add_field("averagecolor", Arc::new(AverageColor), Parameters::new()).unwrap();
    schema.initialize().await.unwrap();
    Arc::new(schema)
}

async fn populate(schema: &Schema, size: usize) {
    let mut rng = rand::rng();
    let retrievables: Vec<_> = (0..size).map(|_| Retrievable::new(Some("IMAGE".into()))).collect();
    schema.connection().retrievable_writer().add_all(&retrievables).await.unwrap();
    let descriptors: Vec<_> = retrievables
        .iter()
        .map(|r| Descriptor::vector(Uuid::new_v4(), Some(r.id()), Value::FloatVector(random_color(&mut rng)), None))
        .collect();
    let writer = schema.field("averagecolor").unwrap().get_writer().unwrap();
    writer.add_all(&descriptors).await.unwrap();
}

fn benchmark_insert(c: &mut Criterion) {
    let mut group = c.benchmark_group("insert");
    let rt = runtime();

    for size in [100, 1000, 10000].iter() {
        group.bench_with_input(BenchmarkId::new("memory", size), size, |b, &size| {
            b.to_async(&rt).iter(|| async move {
                let schema = color_schema().await;
                populate(&schema, size).await;
            });
        });
    }

    group.finish();
}

fn benchmark_proximity(c: &mut Criterion) {
    let mut group = c.benchmark_group("proximity");
    let rt = runtime();

    // Setup: 10k descriptors
    let schema = rt.block_on(async {
        let schema = color_schema().await;
        populate(&schema, 10000).await;
        schema
    });
    let reader = schema.field("averagecolor").unwrap().get_reader().unwrap();

    for distance in [Distance::Euclidean, Distance::Cosine] {
        let query: Query = ProximityQuery::new(Value::FloatVector(vec![0.5, 0.5, 0.5]), distance)
            .with_limit(10)
            .into();
        group.bench_function(BenchmarkId::new("memory", format!("{:?}", distance)), |b| {
            b.to_async(&rt).iter(|| async {
                let results: Vec<_> = reader.query(black_box(&query)).unwrap().collect().await;
                black_box(results);
            });
        });
    }

    group.finish();
}

fn benchmark_extraction(c: &mut Criterion) {
    let mut group = c.benchmark_group("extraction");
    let rt = runtime();
    let schema = rt.block_on(color_schema());
    let field = Arc::clone(schema.field("averagecolor").unwrap());
    let context = Context::new("bench");

    let mut rng = rand::rng();
    let images: Vec<_> = (0..100)
        .map(|_| {
            let pixels = (0..64 * 64).map(|_| [rng.random(), rng.random(), rng.random()]).collect();
            let mut retrievable = Retrievable::new(Some("IMAGE".into()));
            retrievable.add_content(ContentElement::new(Content::Image {
                width: 64,
                height: 64,
                pixels,
            }));
            retrievable
        })
        .collect();

    group.bench_function("averagecolor_100_images", |b| {
        b.to_async(&rt).iter(|| async {
            let input = Box::new(ListEnumerator::new("images", images.clone()));
            let extractor = field.get_extractor(input, &context, false).unwrap();
            let count = extractor.into_stream().count().await;
            black_box(count);
        });
    });

    group.finish();
}

criterion_group!(benches, benchmark_insert, benchmark_proximity, benchmark_extraction);
criterion_main!(benches);
