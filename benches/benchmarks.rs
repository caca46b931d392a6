use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use ndarray::Array3;
use ndvi_composite::{GeoTransform, MergeEngine, MergeMethod, MergeOptions, MergeSource, Raster, TiffCodec};

const SIZE: usize = 512;
const RASTERS: usize = 8;

/// Stack of overlapping tiles, each shifted by a quarter tile.
fn tiles() -> Vec<Raster> {
    (0..RASTERS)
        .map(|index| {
            let offset = (index * SIZE / 4) as f64 * 10.;
            let pixels = Array3::from_shape_fn((1, SIZE, SIZE), |(_, row, col)| {
                ((row * SIZE + col + index) % 997) as f64 / 997.
            });
            let transform = GeoTransform::north_up(500_000. + offset, 4_000_000., 10., 10.);
            Raster::from_pixels(pixels, transform, "EPSG:32614").unwrap()
        })
        .collect()
}

fn bench_merge(c: &mut Criterion) {
    let tiles = tiles();
    let sources: Vec<MergeSource> = tiles.iter().map(MergeSource::from).collect();
    let engine = MergeEngine::new(&TiffCodec);

    let mut group = c.benchmark_group("merge");
    for method in [MergeMethod::First, MergeMethod::Max, MergeMethod::Mean] {
        let options = MergeOptions::new(method.clone()).without_resampling();
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{method:?}")),
            &options,
            |b, options| b.iter(|| engine.merge(&sources, options).unwrap()),
        );
    }
    group.finish();
}

fn bench_stddev(c: &mut Criterion) {
    let tiles = tiles();
    let sources: Vec<MergeSource> = tiles.iter().map(MergeSource::from).collect();
    let engine = MergeEngine::new(&TiffCodec);
    let mean = engine
        .merge(&sources, &MergeOptions::new(MergeMethod::Mean))
        .unwrap();

    c.bench_function("stddev", |b| {
        b.iter(|| engine.merge_stddev(&sources, (&mean).into(), None).unwrap())
    });
}

criterion_group!(benches, bench_merge, bench_stddev);
criterion_main!(benches);
