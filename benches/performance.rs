use adjust_engine::image_loader::{OutputEncoding, ResizeFilter};
use adjust_engine::pipeline::{apply_adjustments, apply_adjustments_par, PixelBuffer};
use adjust_engine::{AdjustmentEngine, Axis, EngineSettings, SliderSet, SourceImage, TargetSize};
use criterion::{black_box, criterion_group, criterion_main, Criterion};

fn test_params() -> adjust_engine::AdjustmentParameters {
    SliderSet::default()
        .with(Axis::Exposure, 25)
        .with(Axis::Contrast, 15)
        .with(Axis::Shadows, 30)
        .with(Axis::Temp, -10)
        .with(Axis::Vibrance, 40)
        .normalize()
}

fn bench_pipeline(c: &mut Criterion) {
    let params = test_params();
    let source = PixelBuffer::filled(1920, 1080, [128, 110, 90, 255]);

    c.bench_function("cpu_pipeline_1920x1080", |b| {
        b.iter(|| {
            let mut buffer = source.clone();
            apply_adjustments(&mut buffer, black_box(&params));
            black_box(buffer);
        })
    });

    c.bench_function("cpu_pipeline_parallel_1920x1080", |b| {
        b.iter(|| {
            let mut buffer = source.clone();
            apply_adjustments_par(&mut buffer, black_box(&params));
            black_box(buffer);
        })
    });
}

fn bench_export(c: &mut Criterion) {
    let settings = EngineSettings {
        gpu_enabled: false,
        resize_filter: ResizeFilter::Triangle,
        ..EngineSettings::default()
    };
    let engine = AdjustmentEngine::new(settings);
    let source = SourceImage::from_rgba(image::RgbaImage::from_pixel(2400, 1600, image::Rgba([200, 150, 100, 255])));
    let params = test_params();

    c.bench_function("export_jpeg_capped_1920", |b| {
        b.iter(|| {
            let url = engine
                .adjusted_asset(&source, &params, TargetSize::NATURAL, Some(OutputEncoding::default()))
                .unwrap();
            engine.assets().revoke(&url).unwrap();
        })
    });
}

criterion_group!(benches, bench_pipeline, bench_export);
criterion_main!(benches);
