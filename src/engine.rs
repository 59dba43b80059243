//! The engine owns every long-lived resource: the background worker, the
//! GPU context and its renderers, the asset store and the run counter.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tokio::sync::oneshot;

use crate::assets::{AssetStore, AssetUrl};
use crate::errors::{AdjustError, Result};
use crate::gpu::{GpuContext, GpuRenderer, SurfaceId};
use crate::image_loader::{OutputEncoding, RasterSurface, SourceImage, TargetSize};
use crate::params::AdjustmentParameters;
use crate::profiler::{counters, Profiler};
use crate::settings::EngineSettings;
use crate::task_scheduler::{BackgroundWorker, Delivery, OffloadJob, PendingAdjustment, RunCounter, RunId};

/// Builds the background worker on first use.
pub type WorkerFactory = Box<dyn Fn(RunCounter, Arc<Profiler>) -> Result<BackgroundWorker> + Send>;

enum WorkerSlot {
    Idle,
    Running(BackgroundWorker),
    /// Construction failed; offloaded requests run synchronously for the session
    Unavailable,
}

enum GpuSlot {
    Idle,
    Ready(Arc<GpuContext>),
    Unavailable(String),
}

pub struct AdjustmentEngine {
    settings: EngineSettings,
    assets: AssetStore,
    runs: RunCounter,
    profiler: Arc<Profiler>,
    worker: WorkerSlot,
    worker_factory: WorkerFactory,
    gpu: GpuSlot,
    renderers: HashMap<SurfaceId, GpuRenderer>,
}

impl AdjustmentEngine {
    pub fn new(settings: EngineSettings) -> Self {
        Self::with_worker_factory(settings, Box::new(BackgroundWorker::spawn))
    }

    pub fn with_worker_factory(settings: EngineSettings, worker_factory: WorkerFactory) -> Self {
        Self {
            settings,
            assets: AssetStore::new(),
            runs: RunCounter::new(),
            profiler: Arc::new(Profiler::new()),
            worker: WorkerSlot::Idle,
            worker_factory,
            gpu: GpuSlot::Idle,
            renderers: HashMap::new(),
        }
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn assets(&self) -> &AssetStore {
        &self.assets
    }

    pub fn profiler(&self) -> &Arc<Profiler> {
        &self.profiler
    }

    pub fn latest_run(&self) -> RunId {
        self.runs.latest()
    }

    fn rasterize(&self, source: &SourceImage, target: TargetSize) -> Result<RasterSurface> {
        if !source.is_ready() {
            return Err(AdjustError::NotReady);
        }
        let (width, height) = target.resolve(
            source.natural_width(),
            source.natural_height(),
            self.settings.max_width,
        );
        RasterSurface::draw(source, width, height, self.settings.resize_filter)
    }

    fn run_pipeline(&self, surface: &mut RasterSurface, params: &AdjustmentParameters) -> Result<()> {
        let mut buffer = surface.extract()?;
        let kernel = self.settings.cpu_kernel();
        self.profiler.time("pipeline", || kernel(&mut buffer, params));
        self.profiler.increment_counter(counters::PIPELINE_RUNS);
        surface.put(buffer)
    }

    /// Draw `source` at the target size with `params` applied on the caller thread.
    ///
    /// Neutral parameters skip the pipeline and the surface holds the source
    /// as drawn.
    pub fn render_adjusted(
        &self,
        source: &SourceImage,
        params: &AdjustmentParameters,
        target: TargetSize,
    ) -> Result<RasterSurface> {
        let mut surface = self.rasterize(source, target)?;
        if !params.is_neutral() {
            self.run_pipeline(&mut surface, params)?;
        }
        Ok(surface)
    }

    /// Synchronous export: adjust, encode and register an asset.
    pub fn adjusted_asset(
        &self,
        source: &SourceImage,
        params: &AdjustmentParameters,
        target: TargetSize,
        encoding: Option<OutputEncoding>,
    ) -> Result<AssetUrl> {
        let surface = self.render_adjusted(source, params, target)?;
        let encoding = encoding.unwrap_or(self.settings.default_encoding);
        let encoded = self.profiler.time("encode", || surface.encode(&encoding))?;
        Ok(self.assets.register(encoded))
    }

    fn worker(&mut self) -> Option<&BackgroundWorker> {
        if !self.settings.offload_enabled {
            return None;
        }
        if matches!(self.worker, WorkerSlot::Idle) {
            self.worker = match (self.worker_factory)(self.runs.clone(), Arc::clone(&self.profiler)) {
                Ok(worker) => WorkerSlot::Running(worker),
                Err(e) => {
                    log::warn!("Background worker unavailable, adjusting synchronously: {}", e);
                    WorkerSlot::Unavailable
                }
            };
        }
        match &self.worker {
            WorkerSlot::Running(worker) => Some(worker),
            _ => None,
        }
    }

    fn delivery(&self, encoding: Option<OutputEncoding>) -> Delivery {
        Delivery {
            runs: self.runs.clone(),
            assets: self.assets.clone(),
            encoding: encoding.unwrap_or(self.settings.default_encoding),
            profiler: Arc::clone(&self.profiler),
            fallback: self.settings.cpu_kernel(),
        }
    }

    /// Export with the pipeline on the background worker.
    ///
    /// Issuing a request supersedes every earlier one: resolving an older
    /// [`PendingAdjustment`] yields `Superseded` and registers nothing. Worker
    /// failures are absorbed by running the pipeline on the caller thread.
    pub fn adjusted_asset_offloaded(
        &mut self,
        source: &SourceImage,
        params: &AdjustmentParameters,
        target: TargetSize,
        encoding: Option<OutputEncoding>,
    ) -> Result<PendingAdjustment> {
        let mut surface = self.rasterize(source, target)?;
        let delivery = self.delivery(encoding);

        if params.is_neutral() {
            surface.ensure_readable()?;
            return Ok(PendingAdjustment::ready(self.runs.issue(), surface, delivery));
        }

        let mut buffer = surface.extract()?;
        let run_id = self.runs.issue();

        if let Some(worker) = self.worker() {
            let copy = buffer.clone();
            let (reply, receiver) = oneshot::channel();
            match worker.submit(OffloadJob { run_id, buffer, params: *params, reply }) {
                Ok(()) => {
                    self.profiler.increment_counter(counters::OFFLOAD_SUBMITTED);
                    return Ok(PendingAdjustment::in_flight(run_id, surface, receiver, copy, *params, delivery));
                }
                Err(job) => {
                    log::warn!("Background worker stopped; dropping it and adjusting {} synchronously", run_id);
                    self.profiler.increment_counter(counters::OFFLOAD_FALLBACKS);
                    self.worker = WorkerSlot::Idle;
                    buffer = job.buffer;
                }
            }
        }

        (delivery.fallback)(&mut buffer, params);
        self.profiler.increment_counter(counters::PIPELINE_RUNS);
        surface.put(buffer)?;
        Ok(PendingAdjustment::ready(run_id, surface, delivery))
    }

    /// Shared GPU context, created on first use.
    pub fn gpu_context(&mut self) -> Result<Arc<GpuContext>> {
        if !self.settings.gpu_enabled {
            return Err(AdjustError::GpuUnavailable {
                message: "GPU rendering is disabled in settings".to_string(),
            });
        }
        if matches!(self.gpu, GpuSlot::Idle) {
            self.gpu = match GpuContext::create() {
                Ok(ctx) => GpuSlot::Ready(ctx),
                Err(e) => {
                    e.log();
                    GpuSlot::Unavailable(e.to_string())
                }
            };
        }
        match &self.gpu {
            GpuSlot::Ready(ctx) => Ok(Arc::clone(ctx)),
            GpuSlot::Unavailable(message) => Err(AdjustError::GpuUnavailable { message: message.clone() }),
            GpuSlot::Idle => Err(AdjustError::GpuUnavailable { message: "not initialized".to_string() }),
        }
    }

    /// Create a renderer with its own drawing surface.
    pub fn create_renderer(&mut self, width: u32, height: u32, dpr: f32) -> Result<SurfaceId> {
        let ctx = self.gpu_context()?;
        let renderer = GpuRenderer::new(ctx, Arc::clone(&self.profiler), width, height, dpr)?;
        let id = renderer.surface_id();
        self.renderers.insert(id, renderer);
        Ok(id)
    }

    /// Swap a surface for a new one, destroying the old renderer first.
    pub fn replace_surface(&mut self, old: SurfaceId, width: u32, height: u32, dpr: f32) -> Result<SurfaceId> {
        self.destroy_renderer(old);
        self.create_renderer(width, height, dpr)
    }

    pub fn renderer(&self, id: SurfaceId) -> Option<&GpuRenderer> {
        self.renderers.get(&id)
    }

    pub fn renderer_mut(&mut self, id: SurfaceId) -> Option<&mut GpuRenderer> {
        self.renderers.get_mut(&id)
    }

    pub fn renderer_count(&self) -> usize {
        self.renderers.len()
    }

    /// Set image and parameters on a renderer and draw.
    ///
    /// Neutral parameters draw nothing and return `false`; the caller shows
    /// the source as is.
    pub fn render_preview(
        &mut self,
        id: SurfaceId,
        source: &SourceImage,
        params: &AdjustmentParameters,
    ) -> Result<bool> {
        let renderer = self.renderers.get_mut(&id).ok_or_else(|| AdjustError::SurfaceUnavailable {
            message: format!("no renderer for {}", id),
        })?;
        if params.is_neutral() {
            return Ok(false);
        }
        renderer.set_image(Some(source))?;
        renderer.set_params(params);
        renderer.render()
    }

    pub fn destroy_renderer(&mut self, id: SurfaceId) -> bool {
        match self.renderers.remove(&id) {
            Some(renderer) => {
                renderer.destroy();
                true
            }
            None => false,
        }
    }

    /// Stop the worker and release every renderer.
    pub fn shutdown(&mut self) {
        for (_, renderer) in self.renderers.drain() {
            renderer.destroy();
        }
        if let WorkerSlot::Running(worker) = std::mem::replace(&mut self.worker, WorkerSlot::Idle) {
            worker.shutdown();
        }
    }
}

impl Default for AdjustmentEngine {
    fn default() -> Self {
        Self::new(EngineSettings::default())
    }
}

impl Drop for AdjustmentEngine {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl fmt::Debug for AdjustmentEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let worker = match &self.worker {
            WorkerSlot::Idle => "idle",
            WorkerSlot::Running(_) => "running",
            WorkerSlot::Unavailable => "unavailable",
        };
        let gpu = match &self.gpu {
            GpuSlot::Idle => "idle",
            GpuSlot::Ready(_) => "ready",
            GpuSlot::Unavailable(_) => "unavailable",
        };
        f.debug_struct("AdjustmentEngine")
            .field("worker", &worker)
            .field("gpu", &gpu)
            .field("renderers", &self.renderers.len())
            .field("assets", &self.assets.len())
            .finish()
    }
}
