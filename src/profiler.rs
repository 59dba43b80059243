use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// Counter names recorded by the engine.
pub mod counters {
    pub const PIPELINE_RUNS: &str = "pipeline_runs";
    pub const OFFLOAD_SUBMITTED: &str = "offload_submitted";
    pub const OFFLOAD_SUPERSEDED: &str = "offload_superseded";
    pub const OFFLOAD_FALLBACKS: &str = "offload_fallbacks";
    pub const TEXTURE_UPLOADS: &str = "texture_uploads";
    pub const GPU_RENDERS: &str = "gpu_renders";
}

/// Running totals for one timer name; samples themselves are not kept.
#[derive(Debug, Clone, Copy)]
struct Aggregate {
    count: usize,
    total: Duration,
    min: Duration,
    max: Duration,
}

impl Aggregate {
    fn new(sample: Duration) -> Self {
        Self { count: 1, total: sample, min: sample, max: sample }
    }

    fn record(&mut self, sample: Duration) {
        self.count += 1;
        self.total += sample;
        self.min = self.min.min(sample);
        self.max = self.max.max(sample);
    }
}

#[derive(Debug, Default)]
struct ProfilerState {
    timers: HashMap<String, Instant>,
    measurements: HashMap<String, Aggregate>,
    counters: HashMap<String, u64>,
}

impl ProfilerState {
    fn record(&mut self, name: &str, sample: Duration) {
        match self.measurements.get_mut(name) {
            Some(aggregate) => aggregate.record(sample),
            None => {
                self.measurements.insert(name.to_string(), Aggregate::new(sample));
            }
        }
    }
}

/// Timers and counters shared between the engine, its worker and renderers.
#[derive(Debug, Default)]
pub struct Profiler {
    state: Mutex<ProfilerState>,
}

impl Profiler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start_timer(&self, name: &str) {
        tracing::trace!(timer = name, "start_timer");
        self.lock().timers.insert(name.to_string(), Instant::now());
    }

    pub fn end_timer(&self, name: &str) {
        let mut state = self.lock();
        if let Some(start) = state.timers.remove(name) {
            let duration = start.elapsed();
            tracing::debug!(timer = name, duration_ms = ?duration.as_millis(), "end_timer");
            state.record(name, duration);
        }
    }

    /// Run `f` and record how long it took under `name`.
    pub fn time<R>(&self, name: &str, f: impl FnOnce() -> R) -> R {
        let start = Instant::now();
        let result = f();
        self.add_measurement(name, start.elapsed());
        result
    }

    pub fn increment_counter(&self, name: &str) {
        tracing::trace!(counter = name, "increment_counter");
        *self.lock().counters.entry(name.to_string()).or_insert(0) += 1;
    }

    pub fn counter(&self, name: &str) -> u64 {
        self.lock().counters.get(name).copied().unwrap_or(0)
    }

    pub fn add_measurement(&self, name: &str, duration: Duration) {
        tracing::debug!(timer = name, duration_ms = ?duration.as_millis(), "measurement");
        self.lock().record(name, duration);
    }

    pub fn get_stats(&self) -> ProfilerStats {
        let state = self.lock();
        let stats = state
            .measurements
            .iter()
            .map(|(name, agg)| {
                (name.clone(), MeasurementStats {
                    count: agg.count,
                    total_time: agg.total,
                    average_time: agg.total / agg.count as u32,
                    min_time: agg.min,
                    max_time: agg.max,
                })
            })
            .collect();

        ProfilerStats {
            measurements: stats,
            counters: state.counters.clone(),
        }
    }

    pub fn reset(&self) {
        let mut state = self.lock();
        state.timers.clear();
        state.measurements.clear();
        state.counters.clear();
    }

    fn lock(&self) -> MutexGuard<'_, ProfilerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[derive(Debug, Clone)]
pub struct MeasurementStats {
    pub count: usize,
    pub total_time: Duration,
    pub average_time: Duration,
    pub min_time: Duration,
    pub max_time: Duration,
}

#[derive(Debug, Clone)]
pub struct ProfilerStats {
    pub measurements: HashMap<String, MeasurementStats>,
    pub counters: HashMap<String, u64>,
}
