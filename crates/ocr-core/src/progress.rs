//! Progress observers and the cumulative progress tracker. See §4.2.

use indicatif::{ProgressBar, ProgressStyle};
use ocr_types::ProgressSnapshot;
use std::io::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Lifecycle signals delivered to zero or more observers without coupling
/// an engine to any particular presentation. Hooks are invoked from
/// engine/worker threads and must be thread-safe.
pub trait Observer: Send + Sync {
    fn on_start(&self, total: u64);
    fn on_progress(&self, current: u64, total: u64);
    fn on_complete(&self);
    fn on_error(&self, current: u64, error_description: &str);
}

/// All hooks are empty.
#[derive(Debug, Default)]
pub struct NoOpObserver;

impl Observer for NoOpObserver {
    fn on_start(&self, _total: u64) {}
    fn on_progress(&self, _current: u64, _total: u64) {}
    fn on_complete(&self) {}
    fn on_error(&self, _current: u64, _error_description: &str) {}
}

/// Writes a carriage-return-prefixed bar, throttled to a minimum interval
/// but always emitting the final frame when `current == total`.
pub struct ConsoleBarObserver {
    bar: ProgressBar,
    min_interval: Duration,
    show_rate: bool,
    show_eta: bool,
    start: Mutex<Option<Instant>>,
    last_emit: Mutex<Option<Instant>>,
}

impl ConsoleBarObserver {
    #[must_use]
    pub fn new(show_rate: bool, show_eta: bool) -> Self {
        Self::with_min_interval(Duration::from_millis(100), show_rate, show_eta)
    }

    #[must_use]
    pub fn with_min_interval(min_interval: Duration, show_rate: bool, show_eta: bool) -> Self {
        let bar = ProgressBar::hidden();
        bar.set_style(
            ProgressStyle::with_template("{bar:40.cyan/blue} {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );
        Self {
            bar,
            min_interval,
            show_rate,
            show_eta,
            start: Mutex::new(None),
            last_emit: Mutex::new(None),
        }
    }

    fn render(&self, current: u64, total: u64) {
        let elapsed = self
            .start
            .lock()
            .unwrap()
            .map(|s| s.elapsed())
            .unwrap_or_default();

        let mut message = String::new();
        if self.show_rate {
            let rate = if elapsed.as_secs_f64() > 0.0 {
                current as f64 / elapsed.as_secs_f64()
            } else {
                0.0
            };
            message.push_str(&format!("{rate:.1}/s"));
        }
        if self.show_eta && current > 0 {
            let remaining = total.saturating_sub(current);
            let eta = elapsed.as_secs_f64() * remaining as f64 / current as f64;
            message.push_str(&format!(" eta {eta:.1}s"));
        }
        self.bar.set_length(total);
        self.bar.set_position(current);
        if !message.is_empty() {
            self.bar.set_message(message);
        }
    }
}

impl Observer for ConsoleBarObserver {
    fn on_start(&self, total: u64) {
        *self.start.lock().unwrap() = Some(Instant::now());
        self.bar.set_draw_target(indicatif::ProgressDrawTarget::stderr());
        self.bar.set_length(total);
        self.bar.set_position(0);
        *self.last_emit.lock().unwrap() = None;
    }

    fn on_progress(&self, current: u64, total: u64) {
        let is_final = current >= total;
        let mut last = self.last_emit.lock().unwrap();
        let should_emit = is_final
            || last.map(|t| t.elapsed() >= self.min_interval).unwrap_or(true);
        if !should_emit {
            return;
        }
        *last = Some(Instant::now());
        drop(last);
        self.render(current, total);
    }

    fn on_complete(&self) {
        self.bar.finish();
    }

    fn on_error(&self, current: u64, error_description: &str) {
        self.bar.println(format!("[{current}] error: {error_description}"));
    }
}

/// Severity a [`StructuredLogObserver`] emits completion records at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogSeverity {
    Debug,
    Info,
    Warn,
}

/// Emits records at a configured severity every `every_k` completions;
/// always emits the final completion record.
pub struct StructuredLogObserver {
    every_k: u64,
    severity: LogSeverity,
    emitted: AtomicU64,
}

impl StructuredLogObserver {
    #[must_use]
    pub fn new(every_k: u64, severity: LogSeverity) -> Self {
        Self {
            every_k: every_k.max(1),
            severity,
            emitted: AtomicU64::new(0),
        }
    }

    fn emit(&self, current: u64, total: u64) {
        match self.severity {
            LogSeverity::Debug => debug!(current, total, "progress"),
            LogSeverity::Info => info!(current, total, "progress"),
            LogSeverity::Warn => warn!(current, total, "progress"),
        }
    }
}

impl Observer for StructuredLogObserver {
    fn on_start(&self, total: u64) {
        info!(total, "batch started");
    }

    fn on_progress(&self, current: u64, total: u64) {
        let count = self.emitted.fetch_add(1, Ordering::SeqCst) + 1;
        if current >= total || count % self.every_k == 0 {
            self.emit(current, total);
        }
    }

    fn on_complete(&self) {
        info!("batch complete");
    }

    fn on_error(&self, current: u64, error_description: &str) {
        error!(current, error = error_description, "batch item failed");
    }
}

/// Forwards each hook to every child, in registration order.
#[derive(Default)]
pub struct FanOutObserver {
    children: Vec<Box<dyn Observer>>,
}

impl FanOutObserver {
    #[must_use]
    pub fn new(children: Vec<Box<dyn Observer>>) -> Self {
        Self { children }
    }
}

impl Observer for FanOutObserver {
    fn on_start(&self, total: u64) {
        for child in &self.children {
            child.on_start(total);
        }
    }

    fn on_progress(&self, current: u64, total: u64) {
        for child in &self.children {
            child.on_progress(current, total);
        }
    }

    fn on_complete(&self) {
        for child in &self.children {
            child.on_complete();
        }
    }

    fn on_error(&self, current: u64, error_description: &str) {
        for child in &self.children {
            child.on_error(current, error_description);
        }
    }
}

/// Wraps any observer, dropping progress calls that arrive within a
/// configured minimum interval since the last forwarded call; always
/// forwards when `current == total`.
pub struct TimeThrottledObserver {
    inner: Box<dyn Observer>,
    min_interval: Duration,
    last_forwarded: Mutex<Option<Instant>>,
}

impl TimeThrottledObserver {
    #[must_use]
    pub fn new(inner: Box<dyn Observer>, min_interval: Duration) -> Self {
        Self {
            inner,
            min_interval,
            last_forwarded: Mutex::new(None),
        }
    }
}

impl Observer for TimeThrottledObserver {
    fn on_start(&self, total: u64) {
        self.inner.on_start(total);
    }

    fn on_progress(&self, current: u64, total: u64) {
        let is_final = current >= total;
        let mut last = self.last_forwarded.lock().unwrap();
        let should_forward = is_final
            || last.map(|t| t.elapsed() >= self.min_interval).unwrap_or(true);
        if !should_forward {
            return;
        }
        *last = Some(Instant::now());
        drop(last);
        self.inner.on_progress(current, total);
    }

    fn on_complete(&self) {
        self.inner.on_complete();
    }

    fn on_error(&self, current: u64, error_description: &str) {
        self.inner.on_error(current, error_description);
    }
}

/// Writes directly to a caller-supplied sink instead of indicatif's default
/// stderr target; used by tests that need to assert on rendered output.
pub struct WriterObserver<W: Write + Send + Sync> {
    sink: Mutex<W>,
}

impl<W: Write + Send + Sync> WriterObserver<W> {
    #[must_use]
    pub fn new(sink: W) -> Self {
        Self {
            sink: Mutex::new(sink),
        }
    }
}

impl<W: Write + Send + Sync> Observer for WriterObserver<W> {
    fn on_start(&self, total: u64) {
        let _ = writeln!(self.sink.lock().unwrap(), "start 0/{total}");
    }

    fn on_progress(&self, current: u64, total: u64) {
        let _ = write!(self.sink.lock().unwrap(), "\r{current}/{total}");
    }

    fn on_complete(&self) {
        let _ = writeln!(self.sink.lock().unwrap());
    }

    fn on_error(&self, current: u64, error_description: &str) {
        let _ = writeln!(self.sink.lock().unwrap(), "error at {current}: {error_description}");
    }
}

/// A separate entity (not an observer) recording total/current/
/// completed/failed; derives rate and estimated total duration; safe for
/// concurrent updates and reads.
pub struct ProgressTracker {
    total: AtomicU64,
    current: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    started_at: Mutex<Option<Instant>>,
}

impl Default for ProgressTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressTracker {
    #[must_use]
    pub fn new() -> Self {
        Self {
            total: AtomicU64::new(0),
            current: AtomicU64::new(0),
            completed: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            started_at: Mutex::new(None),
        }
    }

    pub fn start(&self, total: u64) {
        self.total.store(total, Ordering::SeqCst);
        self.current.store(0, Ordering::SeqCst);
        self.completed.store(0, Ordering::SeqCst);
        self.failed.store(0, Ordering::SeqCst);
        *self.started_at.lock().unwrap() = Some(Instant::now());
    }

    pub fn record_success(&self) {
        self.current.fetch_add(1, Ordering::SeqCst);
        self.completed.fetch_add(1, Ordering::SeqCst);
    }

    pub fn record_failure(&self) {
        self.current.fetch_add(1, Ordering::SeqCst);
        self.failed.fetch_add(1, Ordering::SeqCst);
    }

    #[must_use]
    pub fn snapshot(&self) -> ProgressSnapshot {
        let total = self.total.load(Ordering::SeqCst);
        let current = self.current.load(Ordering::SeqCst);
        let completed = self.completed.load(Ordering::SeqCst);
        let failed = self.failed.load(Ordering::SeqCst);
        let elapsed = self
            .started_at
            .lock()
            .unwrap()
            .map(|s| s.elapsed().as_secs_f64())
            .unwrap_or(0.0);
        let rate = if elapsed > 0.0 { current as f64 / elapsed } else { 0.0 };
        let estimated_total_secs = if rate > 0.0 { total as f64 / rate } else { 0.0 };
        ProgressSnapshot {
            total,
            current,
            completed,
            failed,
            rate_per_sec: rate,
            elapsed_secs: elapsed,
            estimated_total_secs,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn tracker_invariant_completed_plus_failed_le_current() {
        let tracker = ProgressTracker::new();
        tracker.start(5);
        tracker.record_success();
        tracker.record_failure();
        let snap = tracker.snapshot();
        assert!(snap.completed + snap.failed <= snap.current);
        assert_eq!(snap.current, 2);
    }

    #[test]
    fn fan_out_forwards_to_every_child() {
        let log = Arc::new(AtomicU64::new(0));
        struct Counter(Arc<AtomicU64>);
        impl Observer for Counter {
            fn on_start(&self, _total: u64) {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
            fn on_progress(&self, _current: u64, _total: u64) {}
            fn on_complete(&self) {}
            fn on_error(&self, _current: u64, _error_description: &str) {}
        }
        let fan_out = FanOutObserver::new(vec![
            Box::new(Counter(Arc::clone(&log))),
            Box::new(Counter(Arc::clone(&log))),
        ]);
        fan_out.on_start(10);
        assert_eq!(log.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn time_throttled_always_forwards_final_frame() {
        let inner = WriterObserver::new(Vec::new());
        let throttled = TimeThrottledObserver::new(Box::new(inner), Duration::from_secs(3600));
        // First call always forwards (no prior timestamp).
        throttled.on_progress(1, 10);
        // Final frame always forwards even though we're well inside the interval.
        throttled.on_progress(10, 10);
    }

    #[test]
    fn writer_observer_emits_start_and_complete() {
        let buf: Vec<u8> = Vec::new();
        let observer = WriterObserver::new(buf);
        observer.on_start(3);
        observer.on_progress(1, 3);
        observer.on_progress(3, 3);
        observer.on_complete();
        let contents = String::from_utf8(observer.sink.into_inner().unwrap()).unwrap();
        assert!(contents.starts_with("start 0/3"));
        assert!(contents.contains("3/3"));
    }
}
