//! Configuration for a [`TokenBucket`](crate::TokenBucket).

use std::time::Duration;

use derive_builder::Builder;
use serde::{Deserialize, Serialize};

use crate::err::ConfigBuildError;

/// How fast a [`TokenBucket`](crate::TokenBucket) refills, and how much it holds.
///
/// This type is immutable once constructed. To build one, use
/// [`TokenBucketConfigBuilder`], or deserialize a builder and call
/// [`build()`](TokenBucketConfigBuilder::build) on it.
///
/// The steady-state rate is `quantum` tokens every `fill_interval`.
#[derive(Debug, Clone, Builder, Eq, PartialEq)]
#[builder(build_fn(private, name = "build_unvalidated", error = "ConfigBuildError"))]
#[builder(derive(Debug, Serialize, Deserialize))]
#[non_exhaustive]
pub struct TokenBucketConfig {
    /// The length of one tick: every tick, `quantum` tokens are added.
    ///
    /// Must not be zero. Accepts humantime strings such as `"100ms"`.
    #[builder_field_attr(serde(default, with = "humantime_serde::option"))]
    pub(crate) fill_interval: Duration,

    /// The most tokens the bucket can hold, which is also the largest burst
    /// that can be taken without waiting.
    ///
    /// Must be at least 1.
    #[builder_field_attr(serde(default))]
    pub(crate) capacity: i64,

    /// How many tokens each tick adds.
    ///
    /// Must be at least 1. The default is 1.
    #[builder(default = "default_quantum()")]
    #[builder_field_attr(serde(default))]
    pub(crate) quantum: i64,
}

/// Return the default value for `quantum`.
fn default_quantum() -> i64 {
    1
}

impl TokenBucketConfig {
    /// Return a new [`TokenBucketConfigBuilder`].
    pub fn builder() -> TokenBucketConfigBuilder {
        TokenBucketConfigBuilder::default()
    }

    /// The length of one tick.
    pub fn fill_interval(&self) -> Duration {
        self.fill_interval
    }

    /// The most tokens the bucket can hold.
    pub fn capacity(&self) -> i64 {
        self.capacity
    }

    /// How many tokens each tick adds.
    pub fn quantum(&self) -> i64 {
        self.quantum
    }
}

impl TokenBucketConfigBuilder {
    /// Build the [`TokenBucketConfig`].
    ///
    /// Returns an error if `fill_interval` or `capacity` is missing,
    /// or if any field is out of range.
    pub fn build(&self) -> Result<TokenBucketConfig, ConfigBuildError> {
        let config = self.build_unvalidated()?;

        check_fill_interval(config.fill_interval)?;
        if config.capacity < 1 {
            return Err(ConfigBuildError::Invalid {
                field: "capacity".into(),
                problem: format!("must be at least 1, not {}", config.capacity),
            });
        }
        if config.quantum < 1 {
            return Err(ConfigBuildError::Invalid {
                field: "quantum".into(),
                problem: format!("must be at least 1, not {}", config.quantum),
            });
        }

        Ok(config)
    }
}

impl From<TokenBucketConfig> for TokenBucketConfigBuilder {
    fn from(cfg: TokenBucketConfig) -> TokenBucketConfigBuilder {
        let mut builder = TokenBucketConfigBuilder::default();
        builder
            .fill_interval(cfg.fill_interval)
            .capacity(cfg.capacity)
            .quantum(cfg.quantum);
        builder
    }
}

/// Check that `fill_interval` is usable as the length of a tick.
pub(crate) fn check_fill_interval(fill_interval: Duration) -> Result<(), ConfigBuildError> {
    if fill_interval.is_zero() {
        return Err(ConfigBuildError::Invalid {
            field: "fill_interval".into(),
            problem: "must not be zero".into(),
        });
    }
    Ok(())
}
