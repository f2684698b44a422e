//! Health monitoring for object pools

/// Health status of an object pool
///
/// # Examples
///
/// ```
/// use esox_fixedpool::{ObjectPool, PoolConfiguration};
///
/// let pool = ObjectPool::new(
///     PoolConfiguration::new()
///         .with_count(3)
///         .with_constructor(|| Ok::<_, std::io::Error>(0)),
/// )
/// .unwrap();
///
/// let health = pool.get_health_status();
/// assert!(health.is_healthy());
/// assert_eq!(health.idle_objects, 3);
/// ```
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct HealthStatus {
    /// Whether the pool is healthy
    pub is_healthy: bool,

    /// Number of warnings detected
    pub warning_count: usize,

    /// Current pool utilization (0.0 to 1.0)
    pub utilization: f64,

    /// Idle objects count
    pub idle_objects: usize,

    /// Borrowed objects count
    pub borrowed_objects: usize,

    /// Total capacity
    pub total_capacity: usize,

    /// Whether the pool is stopping or stopped
    pub stopping: bool,

    /// Warning messages
    pub warnings: Vec<String>,
}

impl HealthStatus {
    /// Create a new health status
    pub fn new(idle: usize, borrowed: usize, capacity: usize, stopping: bool) -> Self {
        let utilization = if capacity > 0 {
            borrowed as f64 / capacity as f64
        } else {
            0.0
        };

        let mut warnings = Vec::new();
        let mut is_healthy = true;

        if stopping {
            warnings.push("Pool is stopping".to_string());
            is_healthy = false;
        }

        // Check for high utilization
        if utilization > 0.9 {
            warnings.push(format!("High utilization: {:.1}%", utilization * 100.0));
            is_healthy = false;
        }

        if idle == 0 && capacity > 0 && !stopping {
            warnings.push("Pool is empty".to_string());
        }

        Self {
            is_healthy,
            warning_count: warnings.len(),
            utilization,
            idle_objects: idle,
            borrowed_objects: borrowed,
            total_capacity: capacity,
            stopping,
            warnings,
        }
    }

    /// Check if the pool is healthy
    pub fn is_healthy(&self) -> bool {
        self.is_healthy
    }
}
