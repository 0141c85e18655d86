//! Progress snapshot value type shared between the engines and observers

use serde::{Deserialize, Serialize};

/// An immutable snapshot of a [cumulative tracker](../ocr_core/progress)'s
/// counters at one instant.
///
/// `completed + failed <= current <= total` always holds; `rate` is
/// `current / elapsed.as_secs_f64()`, or 0 when `elapsed` is zero.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    pub total: u64,
    pub current: u64,
    pub completed: u64,
    pub failed: u64,
    pub rate_per_sec: f64,
    pub elapsed_secs: f64,
    pub estimated_total_secs: f64,
}

impl ProgressSnapshot {
    #[must_use]
    pub fn percent_complete(&self) -> f64 {
        if self.total == 0 {
            return 100.0;
        }
        (self.current as f64 / self.total as f64) * 100.0
    }

    #[must_use]
    pub fn is_done(&self) -> bool {
        self.current >= self.total
    }
}

/// Throughput-oriented statistics computed over a completed batch run.
/// See §4.4's statistics helper.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BatchStatistics {
    pub processed: usize,
    pub failed: usize,
    pub total_secs: f64,
    pub avg_secs_per_image: f64,
    pub images_per_sec: f64,
}

impl BatchStatistics {
    #[must_use]
    pub fn compute(processed: usize, failed: usize, total_secs: f64) -> Self {
        let completed = processed.saturating_sub(failed);
        let avg_secs_per_image = if processed > 0 {
            total_secs / processed as f64
        } else {
            0.0
        };
        let images_per_sec = if total_secs > 0.0 {
            completed as f64 / total_secs
        } else {
            0.0
        };
        Self {
            processed,
            failed,
            total_secs,
            avg_secs_per_image,
            images_per_sec,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_statistics_zero_duration_yields_zero_throughput() {
        let stats = BatchStatistics::compute(4, 1, 0.0);
        assert_eq!(stats.images_per_sec, 0.0);
        assert_eq!(stats.avg_secs_per_image, 0.0);
    }

    #[test]
    fn batch_statistics_computes_throughput() {
        let stats = BatchStatistics::compute(10, 2, 5.0);
        assert_eq!(stats.processed, 10);
        assert_eq!(stats.failed, 2);
        assert!((stats.avg_secs_per_image - 0.5).abs() < 1e-9);
        assert!((stats.images_per_sec - 1.6).abs() < 1e-9);
    }

    #[test]
    fn percent_complete_handles_zero_total() {
        let snap = ProgressSnapshot {
            total: 0,
            current: 0,
            completed: 0,
            failed: 0,
            rate_per_sec: 0.0,
            elapsed_secs: 0.0,
            estimated_total_secs: 0.0,
        };
        assert_eq!(snap.percent_complete(), 100.0);
    }

    #[test]
    fn percent_complete_is_ratio() {
        let snap = ProgressSnapshot {
            total: 4,
            current: 1,
            completed: 1,
            failed: 0,
            rate_per_sec: 0.0,
            elapsed_secs: 0.0,
            estimated_total_secs: 0.0,
        };
        assert!((snap.percent_complete() - 25.0).abs() < 1e-9);
    }
}
