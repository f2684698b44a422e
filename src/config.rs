//! Pool configuration options

use std::fmt;
use std::sync::Arc;

use crate::errors::{BoxError, ConfigError};

/// Factory that builds one pooled object
pub type Constructor<T> = dyn Fn() -> Result<T, BoxError> + Send + Sync;

/// Releases the resources held by one pooled object
pub type Destructor<T> = dyn Fn(T) + Send + Sync;

/// Configuration for a fixed-capacity object pool
///
/// # Examples
///
/// ```
/// use esox_fixedpool::PoolConfiguration;
///
/// let config = PoolConfiguration::<String>::new()
///     .with_count(4)
///     .with_constructor(|| Ok::<_, std::io::Error>(String::with_capacity(1024)))
///     .with_destructor(|buf| drop(buf));
///
/// assert_eq!(config.count, 4);
/// assert!(config.validate().is_ok());
/// ```
pub struct PoolConfiguration<T> {
    /// Number of objects the pool owns for its whole lifetime
    pub count: usize,

    /// Builds each object during pool creation
    pub constructor: Option<Arc<Constructor<T>>>,

    /// Tears objects down on rollback and on stop
    pub destructor: Option<Arc<Destructor<T>>>,
}

impl<T> Default for PoolConfiguration<T> {
    fn default() -> Self {
        Self {
            count: 0,
            constructor: None,
            destructor: None,
        }
    }
}

impl<T> Clone for PoolConfiguration<T> {
    fn clone(&self) -> Self {
        Self {
            count: self.count,
            constructor: self.constructor.clone(),
            destructor: self.destructor.clone(),
        }
    }
}

impl<T> fmt::Debug for PoolConfiguration<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolConfiguration")
            .field("count", &self.count)
            .field("constructor", &self.constructor.is_some())
            .field("destructor", &self.destructor.is_some())
            .finish()
    }
}

impl<T> PoolConfiguration<T> {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the number of pooled objects
    pub fn with_count(mut self, count: usize) -> Self {
        self.count = count;
        self
    }

    /// Set the object constructor
    ///
    /// Any error type convertible into a boxed error is accepted; it is
    /// wrapped in [`PoolError::Creation`](crate::PoolError::Creation) if
    /// construction fails.
    pub fn with_constructor<F, E>(mut self, constructor: F) -> Self
    where
        F: Fn() -> Result<T, E> + Send + Sync + 'static,
        E: Into<BoxError>,
        T: 'static,
    {
        let constructor: Arc<Constructor<T>> =
            Arc::new(move || -> Result<T, BoxError> { constructor().map_err(Into::into) });
        self.constructor = Some(constructor);
        self
    }

    /// Set the object destructor
    pub fn with_destructor<F>(mut self, destructor: F) -> Self
    where
        F: Fn(T) + Send + Sync + 'static,
    {
        let destructor: Arc<Destructor<T>> = Arc::new(destructor);
        self.destructor = Some(destructor);
        self
    }

    /// Largest count whose idle queue can be allocated
    pub fn max_count() -> usize {
        isize::MAX as usize / std::mem::size_of::<T>().max(1)
    }

    /// Check the configuration
    ///
    /// # Examples
    ///
    /// ```
    /// use esox_fixedpool::{ConfigError, PoolConfiguration};
    ///
    /// let config = PoolConfiguration::<u32>::new().with_count(2);
    /// assert_eq!(config.validate(), Err(ConfigError::MissingConstructor));
    /// ```
    pub fn validate(&self) -> Result<(), ConfigError> {
        let max = Self::max_count();
        if self.count > max {
            return Err(ConfigError::CountTooLarge {
                count: self.count,
                max,
            });
        }
        if self.constructor.is_none() {
            return Err(ConfigError::MissingConstructor);
        }
        Ok(())
    }
}
