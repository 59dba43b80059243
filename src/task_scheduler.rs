//! Background offload of the color pipeline.
//!
//! A single long-lived worker thread receives owned [`PixelBuffer`]s over a
//! channel, runs the pipeline and moves each buffer back through a oneshot
//! reply. Every request carries a [`RunId`]; only the most recently issued
//! run may publish an asset.

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread;

use tokio::sync::oneshot;

use crate::assets::{AssetStore, AssetUrl};
use crate::errors::{AdjustError, Result};
use crate::image_loader::{OutputEncoding, RasterSurface};
use crate::params::AdjustmentParameters;
use crate::pipeline::{self, PixelBuffer};
use crate::profiler::{counters, Profiler};

/// The in-place transform a worker (or fallback) runs.
pub type Kernel = fn(&mut PixelBuffer, &AdjustmentParameters);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RunId(u64);

impl RunId {
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "run#{}", self.0)
    }
}

/// Shared source of monotonically increasing run ids.
#[derive(Debug, Clone, Default)]
pub struct RunCounter(Arc<AtomicU64>);

impl RunCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Issue a new id; it supersedes every earlier one.
    pub fn issue(&self) -> RunId {
        RunId(self.0.fetch_add(1, Ordering::SeqCst) + 1)
    }

    pub fn latest(&self) -> RunId {
        RunId(self.0.load(Ordering::SeqCst))
    }

    pub fn is_current(&self, run: RunId) -> bool {
        self.latest() == run
    }
}

#[derive(Debug)]
pub struct OffloadJob {
    pub run_id: RunId,
    pub buffer: PixelBuffer,
    pub params: AdjustmentParameters,
    pub reply: oneshot::Sender<OffloadReply>,
}

#[derive(Debug)]
pub enum OffloadReply {
    Done(PixelBuffer),
    /// Dropped before starting because a newer run had been issued
    Skipped,
    Failed(String),
}

/// Owner of the background thread.
pub struct BackgroundWorker {
    sender: Option<Sender<OffloadJob>>,
    handle: Option<thread::JoinHandle<()>>,
}

impl BackgroundWorker {
    pub fn spawn(runs: RunCounter, profiler: Arc<Profiler>) -> Result<Self> {
        Self::spawn_with_kernel(runs, profiler, pipeline::apply_adjustments)
    }

    pub fn spawn_with_kernel(runs: RunCounter, profiler: Arc<Profiler>, kernel: Kernel) -> Result<Self> {
        let (sender, receiver) = mpsc::channel();

        let handle = thread::Builder::new()
            .name("adjust-worker".to_string())
            .spawn(move || Self::worker_loop(receiver, runs, profiler, kernel))
            .map_err(|e| AdjustError::BackgroundFailure {
                message: format!("failed to spawn worker thread: {}", e),
            })?;

        log::debug!("Background adjustment worker started");
        Ok(Self {
            sender: Some(sender),
            handle: Some(handle),
        })
    }

    fn worker_loop(receiver: Receiver<OffloadJob>, runs: RunCounter, profiler: Arc<Profiler>, kernel: Kernel) {
        while let Ok(job) = receiver.recv() {
            let OffloadJob { run_id, buffer, params, reply } = job;

            if !runs.is_current(run_id) {
                log::trace!("Skipping stale {}", run_id);
                let _ = reply.send(OffloadReply::Skipped);
                continue;
            }

            let result = panic::catch_unwind(AssertUnwindSafe(move || {
                let mut buffer = buffer;
                kernel(&mut buffer, &params);
                buffer
            }));

            let message = match result {
                Ok(buffer) => {
                    profiler.increment_counter(counters::PIPELINE_RUNS);
                    OffloadReply::Done(buffer)
                }
                Err(payload) => OffloadReply::Failed(panic_message(payload.as_ref())),
            };
            // The requester may have given up already
            let _ = reply.send(message);
        }
        log::debug!("Background adjustment worker stopped");
    }

    /// Queue a job. Hands the job back if the thread is gone.
    pub fn submit(&self, job: OffloadJob) -> std::result::Result<(), OffloadJob> {
        match &self.sender {
            Some(sender) => sender.send(job).map_err(|mpsc::SendError(job)| job),
            None => Err(job),
        }
    }

    pub fn is_alive(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        // Closing the channel ends the loop once queued jobs drain
        self.sender.take();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for BackgroundWorker {
    fn drop(&mut self) {
        self.stop();
    }
}

impl fmt::Debug for BackgroundWorker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackgroundWorker")
            .field("alive", &self.is_alive())
            .finish()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "worker panicked".to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OffloadOutcome {
    Applied(AssetUrl),
    /// A newer request was issued first; nothing was registered
    Superseded(RunId),
}

impl OffloadOutcome {
    pub fn url(&self) -> Option<&AssetUrl> {
        match self {
            OffloadOutcome::Applied(url) => Some(url),
            OffloadOutcome::Superseded(_) => None,
        }
    }
}

/// Everything needed to publish a finished run.
pub(crate) struct Delivery {
    pub runs: RunCounter,
    pub assets: AssetStore,
    pub encoding: OutputEncoding,
    pub profiler: Arc<Profiler>,
    pub fallback: Kernel,
}

enum PendingState {
    /// Surface already holds the final pixels
    Ready,
    InFlight {
        reply: oneshot::Receiver<OffloadReply>,
        copy: PixelBuffer,
        params: AdjustmentParameters,
    },
}

/// An adjustment request that has not been published yet.
pub struct PendingAdjustment {
    run_id: RunId,
    surface: RasterSurface,
    state: PendingState,
    delivery: Delivery,
}

impl PendingAdjustment {
    pub(crate) fn ready(run_id: RunId, surface: RasterSurface, delivery: Delivery) -> Self {
        Self { run_id, surface, state: PendingState::Ready, delivery }
    }

    pub(crate) fn in_flight(
        run_id: RunId,
        surface: RasterSurface,
        reply: oneshot::Receiver<OffloadReply>,
        copy: PixelBuffer,
        params: AdjustmentParameters,
        delivery: Delivery,
    ) -> Self {
        Self {
            run_id,
            surface,
            state: PendingState::InFlight { reply, copy, params },
            delivery,
        }
    }

    pub fn run_id(&self) -> RunId {
        self.run_id
    }

    pub fn is_in_flight(&self) -> bool {
        matches!(self.state, PendingState::InFlight { .. })
    }

    /// Wait for the worker and publish the result if this run is still the latest.
    pub async fn resolve(self) -> Result<OffloadOutcome> {
        let PendingAdjustment { run_id, mut surface, state, delivery } = self;

        if let PendingState::InFlight { reply, copy, params } = state {
            let buffer = match reply.await {
                Ok(OffloadReply::Done(buffer)) => buffer,
                Ok(OffloadReply::Skipped) if !delivery.runs.is_current(run_id) => {
                    return Ok(superseded(run_id, &delivery));
                }
                other => {
                    let reason = match other {
                        Ok(OffloadReply::Failed(message)) => message,
                        Ok(_) => "job skipped while still current".to_string(),
                        Err(_) => "worker dropped the reply".to_string(),
                    };
                    log::warn!("Background adjustment {} failed ({}); running on caller thread", run_id, reason);
                    delivery.profiler.increment_counter(counters::OFFLOAD_FALLBACKS);
                    let mut buffer = copy;
                    (delivery.fallback)(&mut buffer, &params);
                    delivery.profiler.increment_counter(counters::PIPELINE_RUNS);
                    buffer
                }
            };
            surface.put(buffer)?;
        }

        if !delivery.runs.is_current(run_id) {
            return Ok(superseded(run_id, &delivery));
        }

        let encoded = delivery.profiler.time("encode", || surface.encode(&delivery.encoding))?;
        Ok(OffloadOutcome::Applied(delivery.assets.register(encoded)))
    }

    /// Blocking form of [`resolve`](Self::resolve).
    pub fn wait(self) -> Result<OffloadOutcome> {
        pollster::block_on(self.resolve())
    }
}

impl fmt::Debug for PendingAdjustment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingAdjustment")
            .field("run_id", &self.run_id)
            .field("in_flight", &self.is_in_flight())
            .finish()
    }
}

fn superseded(run_id: RunId, delivery: &Delivery) -> OffloadOutcome {
    log::debug!("Discarding superseded {}", run_id);
    delivery.profiler.increment_counter(counters::OFFLOAD_SUPERSEDED);
    OffloadOutcome::Superseded(run_id)
}
