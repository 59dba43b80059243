//! End-to-end scenarios through [`AdjustmentEngine`].

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use image::{Rgba, RgbaImage};

use crate::errors::AdjustError;
use crate::image_loader::{OutputEncoding, OutputFormat, PixelAccess, SourceImage, TargetSize};
use crate::params::{AdjustmentParameters, Axis, SliderSet};
use crate::pipeline::PixelBuffer;
use crate::profiler::counters;
use crate::settings::EngineSettings;
use crate::task_scheduler::{BackgroundWorker, OffloadOutcome};
use crate::{AdjustmentEngine, AssetUrl, WorkerFactory};

const PNG: Option<OutputEncoding> = Some(OutputEncoding { format: OutputFormat::Png, quality: 1.0 });

fn cpu_only_settings() -> EngineSettings {
    EngineSettings {
        gpu_enabled: false,
        ..EngineSettings::default()
    }
}

fn gray(width: u32, height: u32, level: u8) -> SourceImage {
    SourceImage::from_rgba(RgbaImage::from_pixel(width, height, Rgba([level, level, level, 255])))
}

fn sliders(axis: Axis, value: i32) -> AdjustmentParameters {
    SliderSet::default().with(axis, value).normalize()
}

fn decode(engine: &AdjustmentEngine, url: &AssetUrl) -> RgbaImage {
    let asset = engine.assets().get(url).expect("asset registered");
    image::load_from_memory(&asset.bytes).unwrap().into_rgba8()
}

fn explode(_: &mut PixelBuffer, _: &AdjustmentParameters) {
    panic!("kernel exploded");
}

#[test]
fn test_neutral_sliders_skip_the_pipeline() {
    let mut engine = AdjustmentEngine::new(cpu_only_settings());
    let source = SourceImage::from_rgba(RgbaImage::from_fn(6, 4, |x, y| Rgba([x as u8 * 40, y as u8 * 60, 90, 200])));
    let neutral = SliderSet::default().normalize();

    let surface = engine.render_adjusted(&source, &neutral, TargetSize::NATURAL).unwrap();
    assert_eq!(surface.image(), source.pixels().unwrap());

    let pending = engine.adjusted_asset_offloaded(&source, &neutral, TargetSize::NATURAL, PNG).unwrap();
    assert!(!pending.is_in_flight());
    let url = pending.wait().unwrap().url().cloned().unwrap();
    assert_eq!(&decode(&engine, &url), source.pixels().unwrap());

    let profiler = engine.profiler();
    assert_eq!(profiler.counter(counters::PIPELINE_RUNS), 0);
    assert_eq!(profiler.counter(counters::OFFLOAD_SUBMITTED), 0);
}

#[test]
fn test_full_exposure_saturates_mid_gray() {
    let engine = AdjustmentEngine::new(cpu_only_settings());
    let surface = engine
        .render_adjusted(&gray(2, 2, 128), &sliders(Axis::Exposure, 100), TargetSize::NATURAL)
        .unwrap();
    assert_eq!(surface.image().get_pixel(1, 1), &Rgba([255, 255, 255, 255]));
}

#[test]
fn test_minimum_contrast_pulls_towards_mid_gray() {
    let engine = AdjustmentEngine::new(cpu_only_settings());
    let surface = engine
        .render_adjusted(&gray(2, 2, 200), &sliders(Axis::Contrast, -100), TargetSize::NATURAL)
        .unwrap();
    // (200/255 - 0.5) * 0.5 + 0.5 = 0.6422 -> 163.75
    assert_eq!(surface.image().get_pixel(0, 0), &Rgba([164, 164, 164, 255]));
}

#[test]
fn test_default_target_caps_width() {
    let engine = AdjustmentEngine::new(cpu_only_settings());
    let params = sliders(Axis::Saturation, -50);

    let surface = engine.render_adjusted(&gray(4000, 10, 80), &params, TargetSize::NATURAL).unwrap();
    assert_eq!(surface.dimensions(), (1920, 5));

    let surface = engine.render_adjusted(&gray(400, 300, 80), &params, TargetSize::height(30)).unwrap();
    assert_eq!(surface.dimensions(), (40, 30));
}

#[test]
fn test_source_not_ready_fails_fast() {
    let mut engine = AdjustmentEngine::new(cpu_only_settings());
    let pending = SourceImage::pending();
    let params = sliders(Axis::Tint, 20);

    let errors = [
        engine.render_adjusted(&pending, &params, TargetSize::NATURAL).unwrap_err(),
        engine.adjusted_asset(&pending, &params, TargetSize::NATURAL, None).unwrap_err(),
        engine
            .adjusted_asset_offloaded(&pending, &params, TargetSize::NATURAL, None)
            .unwrap_err(),
    ];
    for err in errors {
        assert!(matches!(err, AdjustError::NotReady));
        assert!(err.is_recoverable());
    }
    assert!(engine.assets().is_empty());
}

#[test]
fn test_restricted_pixels_are_denied() {
    let mut engine = AdjustmentEngine::new(cpu_only_settings());
    let source = SourceImage::with_access(RgbaImage::new(4, 4), PixelAccess::Restricted);
    let params = sliders(Axis::Shadows, 30);

    let err = engine.adjusted_asset(&source, &params, TargetSize::NATURAL, None).unwrap_err();
    assert_eq!(err.error_code(), "EXTRACTION_DENIED");
    let err = engine
        .adjusted_asset_offloaded(&source, &params, TargetSize::NATURAL, None)
        .unwrap_err();
    assert_eq!(err.error_code(), "EXTRACTION_DENIED");

    // Still displayable when nothing needs to be read back
    let neutral = AdjustmentParameters::NEUTRAL;
    assert!(engine.render_adjusted(&source, &neutral, TargetSize::NATURAL).is_ok());
}

#[test]
fn test_sync_asset_matches_offloaded_asset() {
    let mut engine = AdjustmentEngine::new(cpu_only_settings());
    let source = SourceImage::from_rgba(RgbaImage::from_fn(16, 9, |x, y| Rgba([x as u8 * 15, y as u8 * 25, 100, 255])));
    let params = SliderSet::default()
        .with(Axis::Exposure, 20)
        .with(Axis::Temp, -35)
        .with(Axis::Vibrance, 60)
        .normalize();

    let sync_url = engine.adjusted_asset(&source, &params, TargetSize::NATURAL, PNG).unwrap();
    let pending = engine.adjusted_asset_offloaded(&source, &params, TargetSize::NATURAL, PNG).unwrap();
    assert!(pending.is_in_flight());
    let offloaded_url = pending.wait().unwrap().url().cloned().unwrap();

    assert_ne!(sync_url, offloaded_url);
    assert_eq!(decode(&engine, &sync_url), decode(&engine, &offloaded_url));
    assert_eq!(engine.profiler().counter(counters::OFFLOAD_SUBMITTED), 1);
}

#[test]
fn test_only_the_latest_offload_is_applied() {
    let mut engine = AdjustmentEngine::new(cpu_only_settings());
    let source = gray(8, 8, 60);

    let older = engine
        .adjusted_asset_offloaded(&source, &sliders(Axis::Exposure, -100), TargetSize::NATURAL, PNG)
        .unwrap();
    let newer = engine
        .adjusted_asset_offloaded(&source, &sliders(Axis::Exposure, 100), TargetSize::NATURAL, PNG)
        .unwrap();
    assert!(newer.run_id() > older.run_id());
    assert_eq!(engine.latest_run(), newer.run_id());

    // The older result is observed last
    let newer_outcome = newer.wait().unwrap();
    let older_id = older.run_id();
    assert_eq!(older.wait().unwrap(), OffloadOutcome::Superseded(older_id));

    let url = newer_outcome.url().cloned().unwrap();
    assert_eq!(engine.assets().len(), 1);
    assert_eq!(decode(&engine, &url).get_pixel(0, 0), &Rgba([240, 240, 240, 255]));
}

#[tokio::test]
async fn test_offload_resolves_inside_async_runtime() {
    let mut engine = AdjustmentEngine::new(cpu_only_settings());
    let pending = engine
        .adjusted_asset_offloaded(&gray(4, 4, 100), &sliders(Axis::Saturation, 50), TargetSize::width(2), None)
        .unwrap();

    let url = pending.resolve().await.unwrap().url().cloned().unwrap();
    let asset = engine.assets().get(&url).unwrap();
    assert_eq!(asset.mime, "image/jpeg");
    assert_eq!((asset.width, asset.height), (2, 2));
}

#[test]
fn test_worker_construction_failure_still_yields_asset() {
    let attempts = Arc::new(AtomicUsize::new(0));
    let counted = Arc::clone(&attempts);
    let factory: WorkerFactory = Box::new(move |_, _| {
        counted.fetch_add(1, Ordering::SeqCst);
        Err(AdjustError::BackgroundFailure { message: "no threads here".to_string() })
    });
    let mut engine = AdjustmentEngine::with_worker_factory(cpu_only_settings(), factory);
    let source = gray(4, 4, 128);
    let params = sliders(Axis::Exposure, 100);

    for _ in 0..2 {
        let pending = engine.adjusted_asset_offloaded(&source, &params, TargetSize::NATURAL, PNG).unwrap();
        assert!(!pending.is_in_flight());
        let url = pending.wait().unwrap().url().cloned().unwrap();
        assert_eq!(decode(&engine, &url).get_pixel(3, 3), &Rgba([255, 255, 255, 255]));
    }

    // Degraded once, not retried per request
    assert_eq!(attempts.load(Ordering::SeqCst), 1);
    assert_eq!(engine.profiler().counter(counters::OFFLOAD_SUBMITTED), 0);
}

#[test]
fn test_failing_worker_falls_back_to_caller_thread() {
    let factory: WorkerFactory = Box::new(|runs, profiler| BackgroundWorker::spawn_with_kernel(runs, profiler, explode));
    let mut engine = AdjustmentEngine::with_worker_factory(cpu_only_settings(), factory);
    let params = sliders(Axis::Exposure, 100);

    let pending = engine.adjusted_asset_offloaded(&gray(3, 3, 64), &params, TargetSize::NATURAL, PNG).unwrap();
    assert!(pending.is_in_flight());
    let url = pending.wait().unwrap().url().cloned().unwrap();

    assert_eq!(decode(&engine, &url).get_pixel(1, 1), &Rgba([255, 255, 255, 255]));
    assert_eq!(engine.profiler().counter(counters::OFFLOAD_FALLBACKS), 1);
}

#[test]
fn test_offload_disabled_runs_synchronously() {
    let settings = EngineSettings {
        offload_enabled: false,
        parallel_cpu: true,
        ..cpu_only_settings()
    };
    let mut engine = AdjustmentEngine::new(settings);
    let pending = engine
        .adjusted_asset_offloaded(&gray(5, 5, 90), &sliders(Axis::Highlights, 40), TargetSize::NATURAL, PNG)
        .unwrap();

    assert!(!pending.is_in_flight());
    assert!(pending.wait().unwrap().url().is_some());
    assert_eq!(engine.profiler().counter(counters::PIPELINE_RUNS), 1);
}

#[test]
fn test_engine_restarts_worker_after_shutdown() {
    let mut engine = AdjustmentEngine::new(cpu_only_settings());
    let params = sliders(Axis::Tint, -60);

    let first = engine.adjusted_asset_offloaded(&gray(4, 4, 50), &params, TargetSize::NATURAL, PNG).unwrap();
    assert!(first.wait().unwrap().url().is_some());

    engine.shutdown();
    let second = engine.adjusted_asset_offloaded(&gray(4, 4, 50), &params, TargetSize::NATURAL, PNG).unwrap();
    assert!(second.is_in_flight());
    assert!(second.wait().unwrap().url().is_some());
}

#[test]
fn test_gpu_disabled_is_reported_as_unavailable() {
    let mut engine = AdjustmentEngine::new(cpu_only_settings());
    let err = engine.create_renderer(64, 64, 1.0).unwrap_err();

    assert!(err.is_unavailable());
    assert_eq!(err.error_code(), "GPU_UNAVAILABLE");
    assert_eq!(engine.renderer_count(), 0);

    // The CPU path is unaffected
    assert!(engine
        .adjusted_asset(&gray(2, 2, 10), &sliders(Axis::Exposure, 10), TargetSize::NATURAL, None)
        .is_ok());
}

#[test]
fn test_replacing_a_surface_destroys_the_old_renderer() {
    let mut engine = AdjustmentEngine::default();
    let Ok(first) = engine.create_renderer(32, 24, 1.0) else {
        eprintln!("GPU not available, skipping");
        return;
    };
    let source = gray(32, 24, 120);

    assert!(engine.render_preview(first, &source, &sliders(Axis::Contrast, 40)).unwrap());

    let second = engine.replace_surface(first, 64, 48, 2.0).unwrap();
    assert_ne!(first, second);
    assert!(engine.renderer(first).is_none());
    assert_eq!(engine.renderer_count(), 1);
    assert_eq!(engine.renderer(second).unwrap().surface().backing_size(), (128, 96));
    assert!(!engine.destroy_renderer(first));
    assert!(engine.destroy_renderer(second));
}

#[test]
fn test_neutral_preview_skips_the_draw() {
    let mut engine = AdjustmentEngine::default();
    let Ok(id) = engine.create_renderer(16, 16, 1.0) else {
        eprintln!("GPU not available, skipping");
        return;
    };
    let source = gray(16, 16, 90);

    assert!(!engine.render_preview(id, &source, &AdjustmentParameters::NEUTRAL).unwrap());
    assert_eq!(engine.profiler().counter(counters::GPU_RENDERS), 0);
    assert_eq!(engine.profiler().counter(counters::TEXTURE_UPLOADS), 0);

    assert!(engine.render_preview(id, &source, &sliders(Axis::Exposure, 10)).unwrap());
    assert_eq!(engine.profiler().counter(counters::GPU_RENDERS), 1);
}
