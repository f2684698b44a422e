//! Error types for the object pool

use std::time::Duration;

use thiserror::Error;

/// Boxed error produced by a pool object constructor
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Why a waiting `get` gave up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    /// The caller's cancellation token fired
    Cancelled,

    /// The caller's deadline elapsed
    DeadlineExceeded(Duration),
}

impl std::fmt::Display for CancelReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CancelReason::Cancelled => write!(f, "cancellation token fired"),
            CancelReason::DeadlineExceeded(after) => write!(f, "deadline exceeded after {:?}", after),
        }
    }
}

/// Invalid pool configuration, reported before anything is allocated
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("constructor is required")]
    MissingConstructor,

    #[error("count {count} exceeds the maximum of {max}")]
    CountTooLarge { count: usize, max: usize },
}

#[derive(Error, Debug)]
pub enum PoolError {
    #[error("invalid pool configuration: {0}")]
    InvalidConfiguration(#[from] ConfigError),

    #[error("failed to make new pool object: {0}")]
    Creation(#[source] BoxError),

    #[error("operation was cancelled: {0}")]
    Cancelled(CancelReason),

    #[error("pool is stopping or has stopped")]
    StoppingOrStopped,

    #[error("pool is empty - no objects available")]
    PoolEmpty,
}

impl PoolError {
    /// Whether a fresh call may succeed where this one failed
    pub fn is_retryable(&self) -> bool {
        matches!(self, PoolError::Cancelled(_) | PoolError::PoolEmpty)
    }
}

pub type PoolResult<T> = Result<T, PoolError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_creation_error_exposes_source() {
        let err = PoolError::Creation("socket refused".into());
        assert_eq!(err.to_string(), "failed to make new pool object: socket refused");
        assert_eq!(err.source().unwrap().to_string(), "socket refused");
    }

    #[test]
    fn test_config_error_converts() {
        let err: PoolError = ConfigError::MissingConstructor.into();
        assert!(matches!(err, PoolError::InvalidConfiguration(ConfigError::MissingConstructor)));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_cancel_reason_display() {
        let err = PoolError::Cancelled(CancelReason::DeadlineExceeded(Duration::from_millis(5)));
        assert_eq!(err.to_string(), "operation was cancelled: deadline exceeded after 5ms");
        assert!(err.is_retryable());
        assert!(!PoolError::StoppingOrStopped.is_retryable());
    }

    #[test]
    fn test_messages_are_lowercase() {
        let errors = [
            PoolError::InvalidConfiguration(ConfigError::MissingConstructor),
            PoolError::Creation("boom".into()),
            PoolError::Cancelled(CancelReason::Cancelled),
            PoolError::StoppingOrStopped,
            PoolError::PoolEmpty,
        ];
        for err in errors {
            let message = err.to_string();
            assert!(message.starts_with(char::is_lowercase), "{}", message);
        }
        assert_eq!(PoolError::PoolEmpty.to_string(), "pool is empty - no objects available");
    }
}
