//! # Runtime configuration.
//!
//! Provides [`Config`], the resolved settings for a [`Runtime`](crate::Runtime), and
//! [`ConfigOverrides`], the partial object handed to
//! [`Lifecycle::exec`](crate::Lifecycle::exec) and merged in before the `Config` stage.
//!
//! Config is used in three places:
//! 1. **Runtime creation**: bus capacity for the event bus (build time only; not overridable)
//! 2. **Sequence matcher**: inactivity timeout, read at `PostConfig`
//! 3. **Shutdown**: grace window for teardown in [`Runtime::serve`](crate::Runtime::serve)
//!
//! Durations are stored as milliseconds so overrides deserialize from plain numbers.

use std::time::Duration;

use serde::Deserialize;

/// Resolved configuration for one runtime instance.
///
/// ## Field semantics
/// - `sequence_timeout_ms`: inactivity window for partial sequence matches
/// - `bus_capacity`: event bus ring buffer size (min 1; clamped by Bus)
/// - `grace_ms`: maximum wait for shutdown callbacks (`0` = no bound)
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Milliseconds a partial sequence may sit idle before it is discarded.
    pub sequence_timeout_ms: u64,

    /// Capacity of the event bus broadcast channel ring buffer.
    ///
    /// Slow receivers that lag behind more than `bus_capacity` messages will
    /// receive `Lagged` and skip older items.
    pub bus_capacity: usize,

    /// Milliseconds to wait for shutdown stages before giving up.
    pub grace_ms: u64,
}

impl Config {
    /// Returns the sequence inactivity timeout.
    #[inline]
    pub fn sequence_timeout(&self) -> Duration {
        Duration::from_millis(self.sequence_timeout_ms)
    }

    /// Returns the shutdown grace period as an `Option`.
    ///
    /// - `None` → teardown is awaited without bound
    /// - `Some(d)` → teardown is abandoned after `d`
    #[inline]
    pub fn grace(&self) -> Option<Duration> {
        if self.grace_ms == 0 {
            None
        } else {
            Some(Duration::from_millis(self.grace_ms))
        }
    }

    /// Returns a bus capacity clamped to a minimum of 1.
    #[inline]
    pub fn bus_capacity_clamped(&self) -> usize {
        self.bus_capacity.max(1)
    }

    /// Applies every field present in `overrides`.
    pub fn merge(&mut self, overrides: &ConfigOverrides) {
        if let Some(ms) = overrides.sequence_timeout_ms {
            self.sequence_timeout_ms = ms;
        }
        if let Some(ms) = overrides.grace_ms {
            self.grace_ms = ms;
        }
    }
}

impl Default for Config {
    /// Default configuration:
    ///
    /// - `sequence_timeout_ms = 1500`
    /// - `bus_capacity = 1024`
    /// - `grace_ms = 60_000`
    fn default() -> Self {
        Self {
            sequence_timeout_ms: 1500,
            bus_capacity: 1024,
            grace_ms: 60_000,
        }
    }
}

/// Partial configuration supplied at boot; absent fields keep their current value.
///
/// The bus already exists when overrides arrive, so `bus_capacity` is only taken from
/// the [`Config`] the runtime is built with; an override naming it is rejected.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigOverrides {
    pub sequence_timeout_ms: Option<u64>,
    pub grace_ms: Option<u64>,
}

impl ConfigOverrides {
    /// Parses overrides from a JSON object.
    ///
    /// # Example
    /// ```
    /// use stagehand::ConfigOverrides;
    ///
    /// let o = ConfigOverrides::from_json(r#"{ "sequence_timeout_ms": 900 }"#).unwrap();
    /// assert_eq!(o.sequence_timeout_ms, Some(900));
    /// assert_eq!(o.grace_ms, None);
    /// ```
    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    /// Returns overrides that only change the sequence timeout.
    pub fn sequence_timeout(ms: u64) -> Self {
        Self {
            sequence_timeout_ms: Some(ms),
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_only_touches_present_fields() {
        let mut cfg = Config::default();
        cfg.merge(&ConfigOverrides {
            grace_ms: Some(0),
            ..ConfigOverrides::default()
        });
        assert_eq!(cfg.sequence_timeout_ms, 1500);
        assert_eq!(cfg.bus_capacity, 1024);
        assert_eq!(cfg.grace(), None);
    }

    #[test]
    fn overrides_reject_unknown_types() {
        assert!(ConfigOverrides::from_json(r#"{ "grace_ms": "long" }"#).is_err());
    }

    #[test]
    fn bus_capacity_is_build_time_only() {
        assert!(ConfigOverrides::from_json(r#"{ "bus_capacity": 64 }"#).is_err());
    }

    #[test]
    fn config_deserializes_with_defaults() {
        let cfg: Config = serde_json::from_str(r#"{ "bus_capacity": 0 }"#).unwrap();
        assert_eq!(cfg.bus_capacity_clamped(), 1);
        assert_eq!(cfg.sequence_timeout(), Duration::from_millis(1500));
    }
}
