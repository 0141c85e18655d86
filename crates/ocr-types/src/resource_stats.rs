//! Resource governor snapshot type

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A point-in-time snapshot of the resource governor's counters.
///
/// `peak_*` fields are monotonically non-decreasing for the lifetime of the
/// governor that produced them; `active_work_units <= peak_work_units`
/// always holds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResourceStats {
    pub current_memory_bytes: u64,
    pub peak_memory_bytes: u64,
    pub active_work_units: u32,
    pub peak_work_units: u32,
    pub pressure_events: u64,
    #[serde(with = "duration_secs")]
    pub monitoring_duration: Duration,
}

impl ResourceStats {
    /// Fraction of the configured memory cap currently in use; 0 when no
    /// cap is configured.
    #[must_use]
    pub fn utilization(&self, memory_cap_bytes: u64) -> f64 {
        if memory_cap_bytes == 0 {
            return 0.0;
        }
        self.current_memory_bytes as f64 / memory_cap_bytes as f64
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(d.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs_f64(f64::deserialize(d)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn utilization_is_zero_with_no_cap() {
        let stats = ResourceStats {
            current_memory_bytes: 1_000,
            peak_memory_bytes: 1_000,
            active_work_units: 0,
            peak_work_units: 0,
            pressure_events: 0,
            monitoring_duration: Duration::from_secs(1),
        };
        assert_eq!(stats.utilization(0), 0.0);
    }

    #[test]
    fn utilization_is_ratio_of_cap() {
        let stats = ResourceStats {
            current_memory_bytes: 800,
            peak_memory_bytes: 800,
            active_work_units: 0,
            peak_work_units: 0,
            pressure_events: 0,
            monitoring_duration: Duration::from_secs(1),
        };
        assert!((stats.utilization(1000) - 0.8).abs() < 1e-9);
    }
}
