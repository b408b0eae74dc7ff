//! Lifecycle configuration.
//!
//! Values are supplied once when the [`AccountManager`](crate::AccountManager)
//! is built and stay fixed for the life of the process.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Unit in which [`LifecycleConfig::expiration_period`] is expressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeUnit {
    /// Seconds.
    Seconds,
    /// Minutes.
    Minutes,
    /// Hours.
    #[default]
    Hours,
    /// Days.
    Days,
}

/// Longest expiration period accepted by [`LifecycleConfig::validate`].
pub const MAX_EXPIRATION_DAYS: i64 = 36_500;

impl TimeUnit {
    /// Convert `amount` of this unit into a chrono duration, or `None` if it
    /// does not fit.
    #[must_use]
    pub fn to_duration(self, amount: i64) -> Option<chrono::Duration> {
        match self {
            Self::Seconds => chrono::Duration::try_seconds(amount),
            Self::Minutes => chrono::Duration::try_minutes(amount),
            Self::Hours => chrono::Duration::try_hours(amount),
            Self::Days => chrono::Duration::try_days(amount),
        }
    }
}

/// Argon2 cost parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HashingConfig {
    /// Memory cost in KiB.
    pub memory_kib: u32,
    /// Number of iterations.
    pub iterations: u32,
    /// Degree of parallelism.
    pub parallelism: u32,
}

impl HashingConfig {
    /// Smallest parameters argon2 accepts. Only suitable for tests.
    #[must_use]
    pub const fn minimal() -> Self {
        Self {
            memory_kib: argon2::Params::MIN_M_COST,
            iterations: argon2::Params::MIN_T_COST,
            parallelism: argon2::Params::MIN_P_COST,
        }
    }
}

impl Default for HashingConfig {
    fn default() -> Self {
        Self {
            memory_kib: argon2::Params::DEFAULT_M_COST,
            iterations: argon2::Params::DEFAULT_T_COST,
            parallelism: argon2::Params::DEFAULT_P_COST,
        }
    }
}

/// Configuration consumed by the account lifecycle manager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LifecycleConfig {
    /// How long an account stays valid after creation or a password change.
    pub expiration_period: i64,
    /// Unit of `expiration_period`.
    pub expiration_unit: TimeUnit,
    /// Delay between expiration sweeps, in milliseconds.
    pub sweep_interval_ms: u64,
    /// Number of password hashes remembered per account.
    pub password_history_limit: usize,
    /// Password hashing costs.
    pub hashing: HashingConfig,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            expiration_period: 600,
            expiration_unit: TimeUnit::Hours,
            sweep_interval_ms: 3_600_000,
            password_history_limit: 3,
            hashing: HashingConfig::default(),
        }
    }
}

impl LifecycleConfig {
    /// Expiration period as a chrono duration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the period is negative or longer than
    /// [`MAX_EXPIRATION_DAYS`].
    pub fn expiration(&self) -> Result<chrono::Duration> {
        if self.expiration_period < 0 {
            return Err(Error::Config(
                "expiration_period must not be negative".to_string(),
            ));
        }
        self.expiration_unit
            .to_duration(self.expiration_period)
            .filter(|period| period.num_days() <= MAX_EXPIRATION_DAYS)
            .ok_or_else(|| {
                Error::Config(format!(
                    "expiration_period must not exceed {MAX_EXPIRATION_DAYS} days"
                ))
            })
    }

    /// Sweep interval as a std duration.
    #[must_use]
    pub const fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }

    /// Check the configuration for values the manager cannot work with.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] describing the first invalid field.
    pub fn validate(&self) -> Result<()> {
        if self.password_history_limit == 0 {
            return Err(Error::Config(
                "password_history_limit must be at least 1".to_string(),
            ));
        }
        if self.sweep_interval_ms == 0 {
            return Err(Error::Config(
                "sweep_interval_ms must be greater than 0".to_string(),
            ));
        }
        self.expiration()?;
        argon2::Params::new(
            self.hashing.memory_kib,
            self.hashing.iterations,
            self.hashing.parallelism,
            None,
        )
        .map_err(|e| Error::Config(format!("invalid hashing parameters: {e}")))?;
        Ok(())
    }
}
