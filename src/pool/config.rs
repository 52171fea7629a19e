use std::time::Duration;

use crate::error::SqlFxError;

/// Sizing and lifetime settings shared by every backend pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    pub min_size: u32,
    pub max_size: u32,
    /// Connections are replaced once this much time has passed since they
    /// were opened, whether or not they were in use.
    pub idle_ttl: Duration,
    /// How long `acquire` waits for a free connection.
    pub acquire_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            min_size: 1,
            max_size: 10,
            idle_ttl: Duration::from_secs(45 * 60),
            acquire_timeout: Duration::from_secs(30),
        }
    }
}

impl PoolConfig {
    #[must_use]
    pub fn min_size(mut self, min_size: u32) -> Self {
        self.min_size = min_size;
        self
    }

    #[must_use]
    pub fn max_size(mut self, max_size: u32) -> Self {
        self.max_size = max_size;
        self
    }

    #[must_use]
    pub fn idle_ttl(mut self, idle_ttl: Duration) -> Self {
        self.idle_ttl = idle_ttl;
        self
    }

    #[must_use]
    pub fn acquire_timeout(mut self, acquire_timeout: Duration) -> Self {
        self.acquire_timeout = acquire_timeout;
        self
    }

    /// # Errors
    /// Returns `SqlFxError::ConfigError` when the sizes are inconsistent.
    pub fn validate(&self) -> Result<(), SqlFxError> {
        if self.max_size == 0 {
            return Err(SqlFxError::ConfigError(
                "max_size must be at least 1".to_string(),
            ));
        }
        if self.min_size > self.max_size {
            return Err(SqlFxError::ConfigError(format!(
                "min_size ({}) exceeds max_size ({})",
                self.min_size, self.max_size
            )));
        }
        if self.idle_ttl.is_zero() {
            return Err(SqlFxError::ConfigError(
                "idle_ttl must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}
