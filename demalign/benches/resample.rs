use std::path::PathBuf;

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use demalign::resample::reproject;
use demalign::{Crs, DataType, GeoTransform, RasterProfile, ReferenceGrid, Resampling, SourceRaster};

/// Synthetic 512x512 float raster with a simple gradient.
fn create_source(crs: Crs, transform: GeoTransform) -> SourceRaster {
    const SIZE: usize = 512;
    let data = (0..SIZE * SIZE)
        .map(|i| ((i / SIZE + i % SIZE) % 4000) as f64)
        .collect();
    SourceRaster {
        path: PathBuf::from("bench.tif"),
        profile: RasterProfile {
            driver: "GTiff".to_string(),
            width: SIZE,
            height: SIZE,
            count: 1,
            dtype: DataType::Float32,
            crs: Some(crs),
            transform,
            nodata: None,
        },
        data,
    }
}

fn bench_same_crs(c: &mut Criterion) {
    let source = create_source(Crs::wgs84(), GeoTransform::from_origin(10.0, 45.1, 0.1 / 512.0, 0.1 / 512.0));
    // AW3D30-sized grid over the same extent
    let target = ReferenceGrid {
        transform: GeoTransform::from_origin(10.0, 45.1, 0.1 / 360.0, 0.1 / 360.0),
        crs: Crs::wgs84(),
        width: 360,
        height: 360,
    };

    c.bench_function("bilinear_same_crs_360x360", |b| {
        b.iter(|| black_box(reproject(black_box(&source), &target, Resampling::Bilinear).unwrap()));
    });

    c.bench_function("nearest_same_crs_360x360", |b| {
        b.iter(|| black_box(reproject(black_box(&source), &target, Resampling::Nearest).unwrap()));
    });
}

fn bench_utm_to_geographic(c: &mut Criterion) {
    let source = create_source(
        Crs::Epsg(32632),
        GeoTransform::from_origin(495_000.0, 4_988_000.0, 20.0, 20.0),
    );
    let target = ReferenceGrid {
        transform: GeoTransform::from_origin(8.95, 45.03, 0.1 / 360.0, 0.1 / 360.0),
        crs: Crs::wgs84(),
        width: 288,
        height: 216,
    };

    c.bench_function("bilinear_utm_to_wgs84", |b| {
        b.iter(|| black_box(reproject(black_box(&source), &target, Resampling::Bilinear).unwrap()));
    });
}

criterion_group!(benches, bench_same_crs, bench_utm_to_geographic);
criterion_main!(benches);
