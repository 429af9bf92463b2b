use std::time::Duration;

use crate::LimitError;

/// Configuration for a [`RateLimiter`](crate::RateLimiter).
///
/// The defaults describe the smallest useful limiter: one permit, returned once per second,
/// with no minimum spacing between acquisitions.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct LimiterConfig {
    /// Maximum number of permits that can accumulate.
    pub max_permits: usize,
    /// One permit is returned to the pool per interval.
    pub refill_interval: Duration,
    /// Minimum time between two successful acquisitions. Zero disables it.
    pub min_spacing: Duration,
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            max_permits: 1,
            refill_interval: Duration::from_secs(1),
            min_spacing: Duration::ZERO,
        }
    }
}

impl LimiterConfig {
    /// A single-permit configuration refilling every `refill_interval`.
    pub fn new(refill_interval: Duration) -> Self {
        Self {
            refill_interval,
            ..Default::default()
        }
    }

    /// Set the burst capacity.
    pub fn with_max_permits(mut self, max_permits: usize) -> Self {
        self.max_permits = max_permits;
        self
    }

    /// Set the refill cadence.
    pub fn with_refill_interval(mut self, refill_interval: Duration) -> Self {
        self.refill_interval = refill_interval;
        self
    }

    /// Require at least `min_spacing` between successful acquisitions, even when
    /// permits are available.
    pub fn with_min_spacing(mut self, min_spacing: Duration) -> Self {
        self.min_spacing = min_spacing;
        self
    }

    /// Check the configuration without building a limiter.
    ///
    /// # Errors
    ///
    /// Returns [`LimitError::InvalidBurstConfig`] for a zero capacity and
    /// [`LimitError::InvalidIntervalConfig`] for a zero refill interval.
    pub fn validate(&self) -> Result<(), LimitError> {
        validate_max_permits(self.max_permits)?;
        validate_refill_interval(self.refill_interval)
    }
}

pub(crate) fn validate_max_permits(max_permits: usize) -> Result<(), LimitError> {
    if max_permits < 1 {
        return Err(LimitError::InvalidBurstConfig);
    }
    Ok(())
}

pub(crate) fn validate_refill_interval(refill_interval: Duration) -> Result<(), LimitError> {
    if refill_interval.is_zero() {
        return Err(LimitError::InvalidIntervalConfig);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_one_permit_per_second() {
        let config = LimiterConfig::default();
        assert_eq!(config.max_permits, 1);
        assert_eq!(config.refill_interval, Duration::from_secs(1));
        assert_eq!(config.min_spacing, Duration::ZERO);
        assert_eq!(config.validate(), Ok(()));
    }

    #[test]
    fn builder_sets_every_field() {
        let config = LimiterConfig::new(Duration::from_millis(250))
            .with_max_permits(8)
            .with_min_spacing(Duration::from_millis(10));

        assert_eq!(config.max_permits, 8);
        assert_eq!(config.refill_interval, Duration::from_millis(250));
        assert_eq!(config.min_spacing, Duration::from_millis(10));
    }

    #[test]
    fn rejects_zero_capacity() {
        let config = LimiterConfig::default().with_max_permits(0);
        assert_eq!(config.validate(), Err(LimitError::InvalidBurstConfig));
    }

    #[test]
    fn rejects_zero_interval() {
        let config = LimiterConfig::new(Duration::ZERO);
        assert_eq!(config.validate(), Err(LimitError::InvalidIntervalConfig));
    }

    #[test]
    fn capacity_is_checked_before_interval() {
        let config = LimiterConfig::new(Duration::ZERO).with_max_permits(0);
        assert_eq!(config.validate(), Err(LimitError::InvalidBurstConfig));
    }

    #[cfg(feature = "serde")]
    #[test]
    fn deserializes_with_defaults_for_missing_fields() {
        let config: LimiterConfig =
            serde_json::from_str(r#"{ "max_permits": 4 }"#).expect("valid config");
        assert_eq!(config.max_permits, 4);
        assert_eq!(config.refill_interval, Duration::from_secs(1));
        assert_eq!(config.min_spacing, Duration::ZERO);
    }
}
