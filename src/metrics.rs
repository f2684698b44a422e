//! Metrics collection and export for object pools

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Metrics data for a pool
///
/// # Examples
///
/// ```
/// use esox_fixedpool::{ObjectPool, PoolConfiguration};
///
/// let pool = ObjectPool::new(
///     PoolConfiguration::new()
///         .with_count(3)
///         .with_constructor(|| Ok::<_, std::io::Error>(0u8)),
/// )
/// .unwrap();
///
/// let obj = pool.try_get().unwrap();
/// let metrics = pool.get_metrics();
/// assert_eq!(metrics.total_retrieved, 1);
/// assert_eq!(metrics.borrowed_objects, 1);
/// assert_eq!(metrics.idle_objects, 2);
/// pool.put(obj);
/// ```
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct PoolMetrics {
    /// Total objects handed out by `get`
    pub total_retrieved: usize,

    /// Total objects handed back by `put`
    pub total_returned: usize,

    /// Waits abandoned through cancellation or deadline
    pub cancelled_waits: usize,

    /// Waits refused because the pool was stopping
    pub rejected_waits: usize,

    /// Non-blocking gets that found nothing idle
    pub empty_events: usize,

    /// Objects passed to the destructor (or dropped when none is configured)
    pub total_destroyed: usize,

    /// Objects currently held by callers
    pub borrowed_objects: usize,

    /// Objects currently idle
    pub idle_objects: usize,

    /// Pool utilization ratio (0.0 to 1.0)
    pub utilization: f64,

    /// Fixed number of objects owned by the pool
    pub capacity: usize,

    /// Whether stop has begun
    pub stopping: bool,
}

impl PoolMetrics {
    /// Export metrics as a HashMap
    pub fn export(&self) -> HashMap<String, String> {
        let mut metrics = HashMap::new();
        metrics.insert("total_retrieved".to_string(), self.total_retrieved.to_string());
        metrics.insert("total_returned".to_string(), self.total_returned.to_string());
        metrics.insert("cancelled_waits".to_string(), self.cancelled_waits.to_string());
        metrics.insert("rejected_waits".to_string(), self.rejected_waits.to_string());
        metrics.insert("empty_events".to_string(), self.empty_events.to_string());
        metrics.insert("total_destroyed".to_string(), self.total_destroyed.to_string());
        metrics.insert("borrowed_objects".to_string(), self.borrowed_objects.to_string());
        metrics.insert("idle_objects".to_string(), self.idle_objects.to_string());
        metrics.insert("utilization".to_string(), format!("{:.2}", self.utilization));
        metrics.insert("capacity".to_string(), self.capacity.to_string());
        metrics.insert("stopping".to_string(), self.stopping.to_string());
        metrics
    }
}

/// Metrics exporter for Prometheus format
#[cfg(feature = "metrics")]
pub struct MetricsExporter;

#[cfg(feature = "metrics")]
impl MetricsExporter {
    /// Export metrics in Prometheus exposition format
    ///
    /// # Examples
    ///
    /// ```
    /// use esox_fixedpool::{MetricsExporter, ObjectPool, PoolConfiguration};
    /// use std::collections::HashMap;
    ///
    /// let pool = ObjectPool::new(
    ///     PoolConfiguration::new()
    ///         .with_count(2)
    ///         .with_constructor(|| Ok::<_, std::io::Error>(())),
    /// )
    /// .unwrap();
    ///
    /// let mut tags = HashMap::new();
    /// tags.insert("service".to_string(), "api".to_string());
    ///
    /// let output = MetricsExporter::export_prometheus(&pool.get_metrics(), "my_pool", Some(&tags)).unwrap();
    /// assert!(output.contains("fixedpool_objects_borrowed"));
    /// assert!(output.contains("service=\"api\""));
    /// ```
    pub fn export_prometheus(
        metrics: &PoolMetrics,
        pool_name: &str,
        tags: Option<&HashMap<String, String>>,
    ) -> Result<String, prometheus::Error> {
        use prometheus::{Encoder, Gauge, IntCounter, IntGauge, Opts, Registry, TextEncoder};

        let mut labels = HashMap::new();
        labels.insert("pool".to_string(), pool_name.to_string());
        if let Some(tags) = tags {
            for (key, value) in tags {
                labels.insert(key.clone(), value.clone());
            }
        }

        let registry = Registry::new_custom(Some("fixedpool".to_string()), Some(labels))?;

        let gauges = [
            ("objects_borrowed", "Objects currently held by callers", metrics.borrowed_objects),
            ("objects_idle", "Objects currently idle", metrics.idle_objects),
            ("capacity", "Fixed number of pooled objects", metrics.capacity),
            ("stopping", "Whether the pool is stopping", metrics.stopping as usize),
        ];
        for (name, help, value) in gauges {
            let gauge = IntGauge::with_opts(Opts::new(name, help))?;
            gauge.set(value as i64);
            registry.register(Box::new(gauge))?;
        }

        let utilization = Gauge::with_opts(Opts::new("utilization", "Pool utilization ratio"))?;
        utilization.set(metrics.utilization);
        registry.register(Box::new(utilization))?;

        let counters = [
            ("objects_retrieved_total", "Total objects retrieved", metrics.total_retrieved),
            ("objects_returned_total", "Total objects returned", metrics.total_returned),
            ("objects_destroyed_total", "Total objects destroyed", metrics.total_destroyed),
            ("waits_cancelled_total", "Waits abandoned by the caller", metrics.cancelled_waits),
            ("waits_rejected_total", "Waits refused while stopping", metrics.rejected_waits),
            ("events_empty_total", "Non-blocking gets on an empty pool", metrics.empty_events),
        ];
        for (name, help, value) in counters {
            let counter = IntCounter::with_opts(Opts::new(name, help))?;
            counter.inc_by(value as u64);
            registry.register(Box::new(counter))?;
        }

        let mut buffer = Vec::new();
        TextEncoder::new().encode(&registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

/// Internal metrics tracker
pub(crate) struct MetricsTracker {
    pub total_retrieved: AtomicUsize,
    pub total_returned: AtomicUsize,
    pub cancelled_waits: AtomicUsize,
    pub rejected_waits: AtomicUsize,
    pub empty_events: AtomicUsize,
    pub total_destroyed: AtomicUsize,
    pub borrowed: AtomicUsize,
}

impl MetricsTracker {
    pub fn new() -> Self {
        Self {
            total_retrieved: AtomicUsize::new(0),
            total_returned: AtomicUsize::new(0),
            cancelled_waits: AtomicUsize::new(0),
            rejected_waits: AtomicUsize::new(0),
            empty_events: AtomicUsize::new(0),
            total_destroyed: AtomicUsize::new(0),
            borrowed: AtomicUsize::new(0),
        }
    }

    pub fn record_retrieved(&self) {
        self.total_retrieved.fetch_add(1, Ordering::Relaxed);
        self.borrowed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_returned(&self) {
        self.total_returned.fetch_add(1, Ordering::Relaxed);
        // Saturate so a stray put of a foreign object cannot wrap the gauge.
        let _ = self
            .borrowed
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1));
    }

    pub fn borrowed(&self) -> usize {
        self.borrowed.load(Ordering::Relaxed)
    }

    pub fn get_metrics(&self, idle: usize, capacity: usize, stopping: bool) -> PoolMetrics {
        let borrowed = self.borrowed();
        let utilization = if capacity > 0 {
            borrowed as f64 / capacity as f64
        } else {
            0.0
        };

        PoolMetrics {
            total_retrieved: self.total_retrieved.load(Ordering::Relaxed),
            total_returned: self.total_returned.load(Ordering::Relaxed),
            cancelled_waits: self.cancelled_waits.load(Ordering::Relaxed),
            rejected_waits: self.rejected_waits.load(Ordering::Relaxed),
            empty_events: self.empty_events.load(Ordering::Relaxed),
            total_destroyed: self.total_destroyed.load(Ordering::Relaxed),
            borrowed_objects: borrowed,
            idle_objects: idle,
            utilization,
            capacity,
            stopping,
        }
    }
}

impl Default for MetricsTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tracker_counts_borrowed() {
        let tracker = MetricsTracker::new();
        tracker.record_retrieved();
        tracker.record_retrieved();
        tracker.record_returned();

        let metrics = tracker.get_metrics(3, 4, false);
        assert_eq!(metrics.total_retrieved, 2);
        assert_eq!(metrics.total_returned, 1);
        assert_eq!(metrics.borrowed_objects, 1);
        assert!((metrics.utilization - 0.25).abs() < f64::EPSILON);
    }

    #[test]
    fn test_returned_saturates() {
        let tracker = MetricsTracker::new();
        tracker.record_returned();
        assert_eq!(tracker.borrowed(), 0);
    }

    #[test]
    fn test_zero_capacity_utilization() {
        let metrics = MetricsTracker::new().get_metrics(0, 0, true);
        assert_eq!(metrics.utilization, 0.0);
        assert_eq!(metrics.export().get("stopping").map(String::as_str), Some("true"));
    }

    #[cfg(feature = "metrics")]
    #[test]
    fn test_prometheus_export() {
        let tracker = MetricsTracker::new();
        tracker.record_retrieved();
        let output = MetricsExporter::export_prometheus(&tracker.get_metrics(1, 2, false), "db", None).unwrap();

        assert!(output.contains("# TYPE fixedpool_objects_retrieved_total counter"));
        assert!(output.contains("fixedpool_objects_borrowed{pool=\"db\"} 1"));
        assert!(output.contains("fixedpool_utilization{pool=\"db\"} 0.5"));
    }
}
