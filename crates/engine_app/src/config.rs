//! Driver configuration.

use std::num::NonZeroUsize;
use std::thread;
use std::time::Duration;

/// Environment variable overriding [`EnvironmentConfig::worker_count`].
pub const WORKERS_ENV: &str = "ENGINE_WORKERS";

/// Environment variable overriding [`EnvironmentConfig::tick_rate`].
pub const TICK_RATE_ENV: &str = "ENGINE_TICK_RATE";

/// Environment variable overriding [`EnvironmentConfig::max_ticks`].
pub const MAX_TICKS_ENV: &str = "ENGINE_MAX_TICKS";

/// Errors raised while reading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A variable was set but could not be parsed.
    #[error("invalid value '{value}' for {name}: {reason}")]
    Invalid {
        name: &'static str,
        value: String,
        reason: String,
    },
}

/// Configuration for an [`Environment`](crate::Environment).
#[derive(Debug, Clone, PartialEq)]
pub struct EnvironmentConfig {
    /// Number of worker threads (0 = one per available core).
    pub worker_count: usize,
    /// Target ticks per second (<= 0 = run ticks back to back).
    pub tick_rate: f64,
    /// Maximum number of ticks to run (0 = unlimited).
    pub max_ticks: u64,
}

impl Default for EnvironmentConfig {
    fn default() -> Self {
        Self {
            worker_count: 0,
            tick_rate: 60.0,
            max_ticks: 0,
        }
    }
}

impl EnvironmentConfig {
    /// Defaults overridden by `ENGINE_WORKERS`, `ENGINE_TICK_RATE` and
    /// `ENGINE_MAX_TICKS` when set.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if a variable does not parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Like [`EnvironmentConfig::from_env`], reading variables through
    /// `lookup`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if a variable does not parse.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(value) = parse_var(&lookup, WORKERS_ENV)? {
            config.worker_count = value;
        }
        if let Some(value) = parse_var::<f64>(&lookup, TICK_RATE_ENV)? {
            if value.is_nan() {
                return Err(ConfigError::Invalid {
                    name: TICK_RATE_ENV,
                    value: value.to_string(),
                    reason: "not a number".into(),
                });
            }
            config.tick_rate = value;
        }
        if let Some(value) = parse_var(&lookup, MAX_TICKS_ENV)? {
            config.max_ticks = value;
        }
        Ok(config)
    }

    /// Set the number of worker threads.
    #[must_use]
    pub fn with_worker_count(mut self, worker_count: usize) -> Self {
        self.worker_count = worker_count;
        self
    }

    /// Set the target tick rate.
    #[must_use]
    pub fn with_tick_rate(mut self, tick_rate: f64) -> Self {
        self.tick_rate = tick_rate;
        self
    }

    /// Set the maximum number of ticks.
    #[must_use]
    pub fn with_max_ticks(mut self, max_ticks: u64) -> Self {
        self.max_ticks = max_ticks;
        self
    }

    /// The worker count to spawn, resolving 0 to the available parallelism.
    #[must_use]
    pub fn resolved_worker_count(&self) -> usize {
        if self.worker_count > 0 {
            self.worker_count
        } else {
            thread::available_parallelism()
                .map(NonZeroUsize::get)
                .unwrap_or(1)
        }
    }

    /// Time budget of one tick, or `None` when unpaced.
    #[must_use]
    pub fn tick_duration(&self) -> Option<Duration> {
        (self.tick_rate > 0.0 && self.tick_rate.is_finite())
            .then(|| Duration::from_secs_f64(1.0 / self.tick_rate))
    }
}

fn parse_var<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    let Some(raw) = lookup(name) else {
        return Ok(None);
    };
    let value = raw.trim();
    if value.is_empty() {
        return Ok(None);
    }
    value
        .parse()
        .map(Some)
        .map_err(|err: T::Err| ConfigError::Invalid {
            name,
            value: raw.clone(),
            reason: err.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = EnvironmentConfig::default();
        assert_eq!(config.worker_count, 0);
        assert_eq!(config.tick_rate, 60.0);
        assert_eq!(config.max_ticks, 0);
        assert!(config.resolved_worker_count() >= 1);
    }

    #[test]
    fn test_lookup_overrides() {
        let config = EnvironmentConfig::from_lookup(lookup(&[
            (WORKERS_ENV, "3"),
            (TICK_RATE_ENV, "30"),
            (MAX_TICKS_ENV, " 100 "),
        ]))
        .unwrap();
        assert_eq!(
            config,
            EnvironmentConfig {
                worker_count: 3,
                tick_rate: 30.0,
                max_ticks: 100,
            }
        );
        assert_eq!(config.resolved_worker_count(), 3);
    }

    #[test]
    fn test_empty_values_keep_defaults() {
        let config = EnvironmentConfig::from_lookup(lookup(&[(WORKERS_ENV, "")])).unwrap();
        assert_eq!(config, EnvironmentConfig::default());
    }

    #[test]
    fn test_invalid_value_is_rejected() {
        let err = EnvironmentConfig::from_lookup(lookup(&[(MAX_TICKS_ENV, "-1")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { name: MAX_TICKS_ENV, .. }));

        let err = EnvironmentConfig::from_lookup(lookup(&[(TICK_RATE_ENV, "NaN")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { name: TICK_RATE_ENV, .. }));
    }

    #[test]
    fn test_tick_duration() {
        let paced = EnvironmentConfig::default().with_tick_rate(50.0);
        assert_eq!(paced.tick_duration(), Some(Duration::from_millis(20)));
        assert_eq!(
            EnvironmentConfig::default().with_tick_rate(0.0).tick_duration(),
            None
        );
        assert_eq!(
            EnvironmentConfig::default().with_tick_rate(-5.0).tick_duration(),
            None
        );
    }
}
