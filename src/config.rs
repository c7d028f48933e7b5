//! Pool configuration (spec §3 `PoolConfig`).

use std::time::Duration;

use crate::error::PoolError;

/// Immutable bounds and timings governing a pool's behavior.
///
/// Construct via [`PoolConfig::builder`] to get validation at build time, or
/// use [`PoolConfig::default`] plus struct-update syntax for quick overrides
/// in tests.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct PoolConfig {
    /// Floor on created connections. The pool will create up to this many
    /// connections eagerly on [`initialize`][crate::blocking::Pool::initialize]
    /// and will not shrink idle capacity below it.
    pub min_size: u32,
    /// Ceiling on created connections.
    pub max_size: u32,
    /// Max time to wait for `acquire()` before failing with `AcquireTimeout`.
    /// Zero is a valid boundary: acquire either succeeds immediately or
    /// fails with `AcquireTimeout` without ever suspending (spec §8).
    pub connection_timeout: Duration,
    /// Hard TTL on a connection, counted from creation. Zero disables the
    /// check (spec §9): connections never age out by lifetime.
    pub max_lifetime: Duration,
    /// Idle TTL before a connection is eagerly closed. Zero disables the
    /// check (spec §9): idle connections never age out by inactivity.
    pub idle_timeout: Duration,
    /// Period of the maintenance loop.
    pub health_check_interval: Duration,
    /// Period of the shrink loop.
    pub shrink_interval: Duration,
    /// Target upper bound on idle slots; shrink trims toward this.
    pub max_idle: u32,
}

impl Default for PoolConfig {
    fn default() -> Self {
        PoolConfig {
            min_size: 1,
            max_size: 50,
            connection_timeout: Duration::from_secs_f64(5.0),
            max_lifetime: Duration::from_secs(7200),
            idle_timeout: Duration::from_secs(300),
            health_check_interval: Duration::from_secs(60),
            shrink_interval: Duration::from_secs(30),
            max_idle: 10,
        }
    }
}

impl PoolConfig {
    /// Returns a [`PoolConfigBuilder`] seeded with the defaults.
    pub fn builder() -> PoolConfigBuilder {
        PoolConfigBuilder(PoolConfig::default())
    }

    /// Checks the invariants from spec §3: `0 <= min_size <= max_size`,
    /// `max_idle >= 0` (vacuous on `u32`, kept for symmetry with the spec
    /// text), and the background-loop periods are `> 0`. `connection_timeout`,
    /// `max_lifetime`, and `idle_timeout` are deliberately not required to be
    /// positive: zero is a meaningful, spec'd boundary for each (see their
    /// field docs), not a misconfiguration.
    pub fn validate(&self) -> Result<(), PoolError> {
        if self.min_size > self.max_size {
            return Err(PoolError::InvalidConfig(format!(
                "min_size ({}) must not exceed max_size ({})",
                self.min_size, self.max_size
            )));
        }
        if self.max_size == 0 {
            return Err(PoolError::InvalidConfig(
                "max_size must be at least 1".into(),
            ));
        }
        for (name, d) in [
            ("health_check_interval", self.health_check_interval),
            ("shrink_interval", self.shrink_interval),
        ] {
            if d.is_zero() {
                return Err(PoolError::InvalidConfig(format!(
                    "{name} must be greater than zero"
                )));
            }
        }
        Ok(())
    }
}

/// Fluent constructor for [`PoolConfig`], grounded on `sqlx-core`'s
/// `pool::options::Builder`/`Options` split.
#[derive(Debug, Clone)]
pub struct PoolConfigBuilder(PoolConfig);

macro_rules! setter {
    ($name:ident: $ty:ty) => {
        /// Overrides the corresponding [`PoolConfig`] field.
        pub fn $name(mut self, value: $ty) -> Self {
            self.0.$name = value;
            self
        }
    };
}

impl PoolConfigBuilder {
    setter!(min_size: u32);
    setter!(max_size: u32);
    setter!(connection_timeout: Duration);
    setter!(max_lifetime: Duration);
    setter!(idle_timeout: Duration);
    setter!(health_check_interval: Duration);
    setter!(shrink_interval: Duration);
    setter!(max_idle: u32);

    /// Validates and returns the finished [`PoolConfig`].
    pub fn build(self) -> Result<PoolConfig, PoolError> {
        self.0.validate()?;
        Ok(self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        PoolConfig::default().validate().unwrap();
    }

    #[test]
    fn rejects_min_over_max() {
        let err = PoolConfig::builder()
            .min_size(10)
            .max_size(5)
            .build()
            .unwrap_err();
        assert!(matches!(err, PoolError::InvalidConfig(_)));
    }

    #[test]
    fn rejects_zero_interval() {
        let err = PoolConfig::builder()
            .shrink_interval(Duration::ZERO)
            .build()
            .unwrap_err();
        assert!(matches!(err, PoolError::InvalidConfig(_)));
    }

    #[test]
    fn zero_connection_timeout_is_a_valid_boundary() {
        PoolConfig::builder()
            .connection_timeout(Duration::ZERO)
            .build()
            .unwrap();
    }

    #[test]
    fn zero_lifetime_and_idle_timeout_are_valid() {
        PoolConfig::builder()
            .max_lifetime(Duration::ZERO)
            .idle_timeout(Duration::ZERO)
            .build()
            .unwrap();
    }
}
