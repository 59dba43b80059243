//! Non-destructive, slider-driven color adjustments.
//!
//! Eight sliders (see [`params::Axis`]) normalize into
//! [`AdjustmentParameters`], which one of three execution paths applies:
//!
//! - the CPU path ([`AdjustmentEngine::render_adjusted`],
//!   [`AdjustmentEngine::adjusted_asset`]) for export and fallback,
//! - the background path ([`AdjustmentEngine::adjusted_asset_offloaded`]),
//!   where the newest request wins,
//! - the GPU path ([`gpu::GpuRenderer`]) for the live preview.

pub mod assets;
pub mod engine;
pub mod errors;
pub mod gpu;
pub mod image_loader;
pub mod logging;
pub mod params;
pub mod pipeline;
pub mod profiler;
pub mod settings;
pub mod task_scheduler;

#[cfg(test)]
mod tests;

pub use assets::{AssetStore, AssetUrl};
pub use engine::{AdjustmentEngine, WorkerFactory};
pub use errors::{AdjustError, Result};
pub use image_loader::{OutputEncoding, OutputFormat, PixelAccess, RasterSurface, SourceImage, TargetSize};
pub use params::{AdjustmentParameters, Axis, SliderSet};
pub use pipeline::{apply_adjustments, PixelBuffer};
pub use settings::EngineSettings;
pub use task_scheduler::{OffloadOutcome, PendingAdjustment, RunId};
