use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use geo::{polygon, Geometry};
use ndarray::Array2;
use rasterprep::preprocessing::coregister::{coregister, ResamplingMethod};
use rasterprep::preprocessing::pipeline::{
    InputFormat, LayerPipeline, PipelineConfig, PipelineStep, TemplateRegistry,
};
use rasterprep::preprocessing::raster_io::{
    GeoTiffWriter, RasterWriter, TiffCompression, WriterConfig,
};
use rasterprep::preprocessing::transform::TransformMethod;
use rasterprep::preprocessing::vector::{Feature, Rasterizer, VectorLayer};
use rasterprep::preprocessing::{Crs, ElementType, GeoTransform, GridMetadata, RasterLayer};
use std::io::Cursor;

fn generate_mock_layer(width: usize, height: usize) -> RasterLayer {
    let meta = GridMetadata::new(
        GeoTransform::from_origin(0.0, height as f64 * 30.0, 30.0, 30.0),
        Some(Crs::Epsg(32633)),
        width,
        height,
    )
    .with_dtype(ElementType::Float32)
    .with_nodata(Some(-9999.0));
    let band = Array2::from_shape_fn((height, width), |(y, x)| {
        if (x * 7 + y * 13) % 97 == 0 {
            -9999.0
        } else {
            ((x + y) % 256) as f64 + 0.5
        }
    });
    RasterLayer::single_band(band, meta).unwrap()
}

fn encode(layer: &RasterLayer) -> Vec<u8> {
    let mut bytes: Vec<u8> = Vec::new();
    GeoTiffWriter
        .write_raster(layer, &mut bytes, &WriterConfig::default())
        .unwrap();
    bytes
}

fn benchmark_pipeline_sizes(c: &mut Criterion) {
    let mut group = c.benchmark_group("pipeline_by_size");

    let sizes = vec![(100, 100, "100x100"), (500, 500, "500x500"), (1000, 1000, "1000x1000")];

    let config = PipelineConfig::builder("bench")
        .step(PipelineStep::Impute {
            method: rasterprep::preprocessing::impute::ImputeMethod::Median,
            custom_value: None,
            mask_template: None,
        })
        .step(PipelineStep::Outlier {
            method: Default::default(),
            multiplier: 1.5,
        })
        .step(PipelineStep::Transform {
            method: TransformMethod::Standard,
        })
        .build();
    let templates = TemplateRegistry::new();

    for (width, height, label) in sizes {
        let input = encode(&generate_mock_layer(width, height));

        group.bench_with_input(BenchmarkId::from_parameter(label), &input, |b, data| {
            let pipeline = LayerPipeline::new(WriterConfig::default());

            b.iter(|| {
                let mut output = Cursor::new(Vec::<u8>::new());
                let _ = pipeline.process(
                    &config,
                    &InputFormat::Raster,
                    black_box(data),
                    &templates,
                    &mut output,
                );
            });
        });
    }

    group.finish();
}

fn benchmark_compression_methods(c: &mut Criterion) {
    let mut group = c.benchmark_group("compression_methods");
    let layer = generate_mock_layer(500, 500);

    let compressions = vec![
        (TiffCompression::None, "none"),
        (TiffCompression::Lzw, "lzw"),
        (TiffCompression::DeflateFast, "deflate_fast"),
        (TiffCompression::DeflateBest, "deflate_best"),
    ];

    for (compression, label) in compressions {
        group.bench_with_input(BenchmarkId::from_parameter(label), &layer, |b, layer| {
            let config = WriterConfig::builder().compression(compression).build();

            b.iter(|| {
                let mut output = Cursor::new(Vec::<u8>::new());
                let _ = GeoTiffWriter.write_raster(black_box(layer), &mut output, &config);
            });
        });
    }

    group.finish();
}

fn benchmark_resampling(c: &mut Criterion) {
    let mut group = c.benchmark_group("resampling");
    let source = generate_mock_layer(500, 500);
    let template = GridMetadata::new(
        GeoTransform::from_origin(15.0, 500.0 * 30.0 - 15.0, 20.0, 20.0),
        Some(Crs::Epsg(32633)),
        700,
        700,
    );

    for method in [ResamplingMethod::Nearest, ResamplingMethod::Bilinear, ResamplingMethod::Cubic] {
        group.bench_function(format!("{method:?}").to_lowercase(), |b| {
            b.iter(|| {
                let _ = coregister(black_box(&source), &template, Some(method));
            });
        });
    }

    group.finish();
}

fn benchmark_rasterize(c: &mut Criterion) {
    let template_meta = GridMetadata::new(
        GeoTransform::from_origin(0.0, 1000.0, 1.0, 1.0),
        Some(Crs::Epsg(3857)),
        1000,
        1000,
    );
    let template = RasterLayer::single_band(Array2::zeros((1000, 1000)), template_meta).unwrap();
    let features = (0..200)
        .map(|i| {
            let x = (i % 20) as f64 * 50.0;
            let y = (i / 20) as f64 * 100.0;
            let square = polygon![
                (x: x, y: y),
                (x: x + 40.0, y: y),
                (x: x + 40.0, y: y + 40.0),
                (x: x, y: y + 40.0),
                (x: x, y: y),
            ];
            Feature::new(Geometry::Polygon(square)).with_attribute("value", i as f64)
        })
        .collect();
    let layer = VectorLayer::new("squares", Some(Crs::Epsg(3857)), features);

    c.bench_function("rasterize_continuous_200_polygons", |b| {
        let rasterizer = Rasterizer::new(&template);
        b.iter(|| {
            let _ = rasterizer.continuous(black_box(&layer), "value");
        });
    });
}

criterion_group!(
    benches,
    benchmark_pipeline_sizes,
    benchmark_compression_methods,
    benchmark_resampling,
    benchmark_rasterize
);
criterion_main!(benches);
