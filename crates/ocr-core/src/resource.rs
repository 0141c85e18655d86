//! Resource governor: memory sampling, work-slot admission, adaptive sizing
//!
//! Grounded on the same `tokio::sync::Semaphore`-gated admission pattern the
//! host workspace's `BulkExecutor` uses to bound concurrent file
//! processing, generalized here with a periodic memory sampler and an
//! adaptive worker-count recommendation.

use ocr_types::{OcrError, ResourceStats};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use sysinfo::{PidExt, ProcessExt, SystemExt};
use tokio::sync::{Semaphore, SemaphorePermit};
use tracing::{debug, warn};

use crate::cancellation::CancellationToken;

const MEMORY_RING_CAPACITY: usize = 60;
const DEFAULT_SAMPLE_INTERVAL: Duration = Duration::from_secs(1);
const DEFAULT_PRESSURE_THRESHOLD: f64 = 0.8;

#[derive(Debug, Default)]
struct MemoryRing {
    samples: VecDeque<u64>,
    peak: u64,
}

impl MemoryRing {
    fn push(&mut self, sample: u64) {
        if self.samples.len() == MEMORY_RING_CAPACITY {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
        self.peak = self.peak.max(sample);
    }

    fn current(&self) -> u64 {
        self.samples.back().copied().unwrap_or(0)
    }

    fn average(&self) -> u64 {
        if self.samples.is_empty() {
            return 0;
        }
        (self.samples.iter().sum::<u64>()) / self.samples.len() as u64
    }
}

/// A released-on-drop admission slot returned by
/// [`ResourceGovernor::acquire_work_slot`].
pub struct WorkSlotGuard<'a> {
    _permit: SemaphorePermit<'a>,
    governor: &'a ResourceGovernor,
}

impl Drop for WorkSlotGuard<'_> {
    fn drop(&mut self) {
        self.governor.active.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Bounds concurrent work and observes memory so batch engines can shed or
/// throttle load. See §4.1.
pub struct ResourceGovernor {
    max_work_units: usize,
    semaphore: Semaphore,
    active: AtomicU32,
    peak_active: AtomicU32,
    pressure_events: AtomicU64,
    cancelled_acquires: AtomicU64,
    memory_cap_bytes: u64,
    pressure_threshold: f64,
    backpressure: bool,
    ring: Mutex<MemoryRing>,
    started_at: Instant,
}

impl ResourceGovernor {
    /// `max_work_units = 0` means unbounded: acquire always succeeds
    /// immediately and only updates statistics, per §4.1. `backpressure`
    /// gates whether memory pressure actually reduces
    /// [`optimal_worker_count`](Self::optimal_worker_count)'s recommendation;
    /// pressure is still sampled and counted either way.
    #[must_use]
    pub fn new(
        max_work_units: usize,
        memory_cap_bytes: u64,
        pressure_threshold: f64,
        backpressure: bool,
    ) -> Arc<Self> {
        let permits = if max_work_units == 0 {
            Semaphore::MAX_PERMITS
        } else {
            max_work_units
        };
        Arc::new(Self {
            max_work_units,
            semaphore: Semaphore::new(permits),
            active: AtomicU32::new(0),
            peak_active: AtomicU32::new(0),
            pressure_events: AtomicU64::new(0),
            cancelled_acquires: AtomicU64::new(0),
            memory_cap_bytes,
            pressure_threshold: pressure_threshold.clamp(f64::EPSILON, 1.0),
            backpressure,
            ring: Mutex::new(MemoryRing::default()),
            started_at: Instant::now(),
        })
    }

    /// Spawns the periodic memory sampler. Returns a handle the caller
    /// should abort when the governor is closed, joining the task.
    pub fn spawn_memory_monitor(self: &Arc<Self>, interval: Duration) -> tokio::task::JoinHandle<()> {
        let interval = if interval.is_zero() {
            DEFAULT_SAMPLE_INTERVAL
        } else {
            interval
        };
        let governor = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                governor.sample_memory();
            }
        })
    }

    fn sample_memory(&self) {
        let Ok(pid) = sysinfo::get_current_pid() else {
            return;
        };
        let mut sys = sysinfo::System::new();
        sys.refresh_process(pid);
        let bytes = sys.process(pid).map(|p| p.memory()).unwrap_or(0);
        self.record_memory_sample(bytes);
    }

    /// Exposed separately from [`sample_memory`] so tests can drive the
    /// ring without a real process snapshot.
    pub fn record_memory_sample(&self, bytes: u64) {
        let mut ring = self.ring.lock().unwrap();
        ring.push(bytes);
        drop(ring);
        if self.is_under_memory_pressure() {
            self.pressure_events.fetch_add(1, Ordering::SeqCst);
            debug!(bytes, cap = self.memory_cap_bytes, "memory pressure observed");
        }
    }

    /// Blocking (cancellable) acquire of one work slot. See §4.1.
    pub async fn acquire_work_slot(
        &self,
        cancel: &CancellationToken,
    ) -> Result<WorkSlotGuard<'_>, OcrError> {
        if self.max_work_units == 0 {
            let permit = self.semaphore.acquire().await.expect("semaphore not closed");
            self.note_acquired();
            return Ok(WorkSlotGuard {
                _permit: permit,
                governor: self,
            });
        }

        tokio::select! {
            permit = self.semaphore.acquire() => {
                let permit = permit.expect("semaphore not closed");
                self.note_acquired();
                Ok(WorkSlotGuard { _permit: permit, governor: self })
            }
            () = cancel.cancelled() => {
                self.cancelled_acquires.fetch_add(1, Ordering::SeqCst);
                Err(OcrError::Cancelled)
            }
        }
    }

    fn note_acquired(&self) {
        let now_active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_active.fetch_max(now_active, Ordering::SeqCst);
    }

    /// True when a non-zero memory cap is configured and sampled usage
    /// exceeds `pressure_threshold` of it.
    #[must_use]
    pub fn is_under_memory_pressure(&self) -> bool {
        if self.memory_cap_bytes == 0 {
            return false;
        }
        let current = self.ring.lock().unwrap().current();
        (current as f64 / self.memory_cap_bytes as f64) > self.pressure_threshold
    }

    /// Baseline host CPU count, clamped by the configured work-slot
    /// maximum, halved (floor 1) under memory pressure when backpressure is
    /// enabled. See §4.1.
    #[must_use]
    pub fn optimal_worker_count(&self) -> usize {
        let mut target = num_cpus::get();
        if self.max_work_units > 0 {
            target = target.min(self.max_work_units);
        }
        if self.backpressure && self.is_under_memory_pressure() {
            target = (target / 2).max(1);
            warn!(target, "reducing worker target under memory pressure");
        }
        target.max(1)
    }

    #[must_use]
    pub fn get_statistics(&self) -> ResourceStats {
        let ring = self.ring.lock().unwrap();
        ResourceStats {
            current_memory_bytes: ring.current(),
            peak_memory_bytes: ring.peak,
            active_work_units: self.active.load(Ordering::SeqCst),
            peak_work_units: self.peak_active.load(Ordering::SeqCst),
            pressure_events: self.pressure_events.load(Ordering::SeqCst),
            monitoring_duration: self.started_at.elapsed(),
        }
    }

    #[must_use]
    pub fn cancelled_acquire_count(&self) -> u64 {
        self.cancelled_acquires.load(Ordering::SeqCst)
    }
}

/// Periodically snaps a worker pool's target count to the governor's
/// recommendation, clamped to `[min, max]`. See §4.1's adaptive worker pool
/// sub-component.
pub struct AdaptiveWorkerPool {
    governor: Arc<ResourceGovernor>,
    min: usize,
    max: usize,
    current: AtomicU32,
}

impl AdaptiveWorkerPool {
    #[must_use]
    pub fn new(governor: Arc<ResourceGovernor>, min: usize, max: usize) -> Self {
        let min = min.max(1);
        let max = max.max(min);
        let initial = governor.optimal_worker_count().clamp(min, max);
        Self {
            governor,
            min,
            max,
            current: AtomicU32::new(initial as u32),
        }
    }

    #[must_use]
    pub fn current_worker_count(&self) -> usize {
        self.current.load(Ordering::SeqCst) as usize
    }

    /// Re-snaps the current target from the governor's recommendation.
    /// Called by a periodic ticker task owned by the batch/document
    /// engine; exposed here as a plain method so tests can drive it
    /// without spawning a task.
    pub fn tick(&self) -> usize {
        let target = self.governor.optimal_worker_count().clamp(self.min, self.max);
        self.current.store(target as u32, Ordering::SeqCst);
        target
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn acquire_respects_max_work_units() {
        let governor = ResourceGovernor::new(2, 0, DEFAULT_PRESSURE_THRESHOLD, true);
        let cancel = CancellationToken::new();
        let a = governor.acquire_work_slot(&cancel).await.unwrap();
        let b = governor.acquire_work_slot(&cancel).await.unwrap();
        assert_eq!(governor.get_statistics().active_work_units, 2);
        drop(a);
        drop(b);
    }

    #[tokio::test]
    async fn zero_max_succeeds_immediately() {
        let governor = ResourceGovernor::new(0, 0, DEFAULT_PRESSURE_THRESHOLD, true);
        let cancel = CancellationToken::new();
        for _ in 0..10 {
            let _slot = governor.acquire_work_slot(&cancel).await.unwrap();
        }
    }

    #[tokio::test]
    async fn cancellation_during_acquire_yields_cancelled() {
        let governor = ResourceGovernor::new(1, 0, DEFAULT_PRESSURE_THRESHOLD, true);
        let cancel = CancellationToken::new();
        let _held = governor.acquire_work_slot(&cancel).await.unwrap();

        let second_cancel = cancel.clone();
        let governor2 = Arc::clone(&governor);
        let waiter = tokio::spawn(async move { governor2.acquire_work_slot(&second_cancel).await });

        tokio::time::sleep(Duration::from_millis(10)).await;
        cancel.cancel();
        let result = waiter.await.unwrap();
        assert!(matches!(result, Err(OcrError::Cancelled)));
        assert_eq!(governor.cancelled_acquire_count(), 1);
    }

    #[test]
    fn pressure_is_false_without_a_cap() {
        let governor = ResourceGovernor::new(1, 0, DEFAULT_PRESSURE_THRESHOLD, true);
        governor.record_memory_sample(1_000_000_000);
        assert!(!governor.is_under_memory_pressure());
    }

    #[test]
    fn pressure_trips_past_threshold() {
        let governor = ResourceGovernor::new(1, 1_000, DEFAULT_PRESSURE_THRESHOLD, true);
        governor.record_memory_sample(900);
        assert!(governor.is_under_memory_pressure());
        assert_eq!(governor.get_statistics().pressure_events, 1);
    }

    #[test]
    fn adaptive_pool_clamps_to_bounds() {
        let governor = ResourceGovernor::new(1, 1_000, DEFAULT_PRESSURE_THRESHOLD, true);
        governor.record_memory_sample(950); // trip pressure -> halved recommendation
        let pool = AdaptiveWorkerPool::new(Arc::clone(&governor), 1, 4);
        let target = pool.tick();
        assert!(target >= 1 && target <= 4);
    }

    #[test]
    fn pressure_halves_worker_count_when_backpressure_enabled() {
        let governor = ResourceGovernor::new(0, 1_000, DEFAULT_PRESSURE_THRESHOLD, true);
        let baseline = num_cpus::get().max(1);
        governor.record_memory_sample(950);
        assert_eq!(governor.optimal_worker_count(), (baseline / 2).max(1));
    }

    #[test]
    fn pressure_is_ignored_when_backpressure_disabled() {
        let governor = ResourceGovernor::new(0, 1_000, DEFAULT_PRESSURE_THRESHOLD, false);
        let baseline = num_cpus::get().max(1);
        governor.record_memory_sample(950);
        assert!(governor.is_under_memory_pressure());
        assert_eq!(governor.optimal_worker_count(), baseline);
    }
}
