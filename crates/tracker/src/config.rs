//! Tracker configuration loaded from environment variables.

use std::time::Duration;

use jobwatch_client::api::DEFAULT_REQUEST_TIMEOUT;
use jobwatch_client::models::LogScope;
use jobwatch_core::backoff::BackoffPolicy;
use jobwatch_core::error::CoreError;

/// Timing of the two polling loops plus the per-job backoff.
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Fine-loop period (default: 1 s).
    pub tick: Duration,
    /// Coarse sweep period (default: 30 s).
    pub sweep_interval: Duration,
    pub policy: BackoffPolicy,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            tick: Duration::from_secs(1),
            sweep_interval: Duration::from_secs(30),
            policy: BackoffPolicy::default(),
        }
    }
}

/// Everything needed to start a tracker against a live backend.
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    pub api_url: String,
    pub api_token: Option<String>,
    pub request_timeout: Duration,
    pub coordinator: CoordinatorConfig,
    /// Log slice the coarse sweep re-fetches. `None` disables sweeps.
    pub scope: Option<LogScope>,
}

impl TrackerConfig {
    /// Load configuration from the process environment.
    ///
    /// | Env Var                              | Default   |
    /// |--------------------------------------|-----------|
    /// | `JOBWATCH_API_URL`                   | required  |
    /// | `JOBWATCH_API_TOKEN`                 | none      |
    /// | `JOBWATCH_REQUEST_TIMEOUT_SECS`      | `15`      |
    /// | `JOBWATCH_TICK_MS`                   | `1000`    |
    /// | `JOBWATCH_SWEEP_SECS`                | `30`      |
    /// | `JOBWATCH_BACKOFF_INITIAL_MS`        | `5000`    |
    /// | `JOBWATCH_BACKOFF_FACTOR`            | `1.6`     |
    /// | `JOBWATCH_BACKOFF_JITTER_MS`         | `1000`    |
    /// | `JOBWATCH_BACKOFF_CAP_MS`            | `60000`   |
    /// | `JOBWATCH_BACKOFF_MAX_TOTAL_SECS`    | `600` (`0` = unbounded) |
    /// | `JOBWATCH_CONTENT_GENERATION_ID`     | none      |
    /// | `JOBWATCH_CUSTOMER_ID`               | none      |
    ///
    /// At most one of the two scope variables may be set.
    pub fn from_env() -> Result<Self, CoreError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, CoreError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let api_url = var("JOBWATCH_API_URL").ok_or_else(|| {
            CoreError::Validation("JOBWATCH_API_URL must be set".to_string())
        })?;
        let api_token = var("JOBWATCH_API_TOKEN");

        let request_timeout = match parse::<u64>(&var, "JOBWATCH_REQUEST_TIMEOUT_SECS")? {
            Some(0) => {
                return Err(CoreError::Validation(
                    "JOBWATCH_REQUEST_TIMEOUT_SECS must be positive".to_string(),
                ))
            }
            Some(secs) => Duration::from_secs(secs),
            None => DEFAULT_REQUEST_TIMEOUT,
        };

        let defaults = CoordinatorConfig::default();
        let tick = parse::<u64>(&var, "JOBWATCH_TICK_MS")?
            .map(Duration::from_millis)
            .unwrap_or(defaults.tick);
        let sweep_interval = parse::<u64>(&var, "JOBWATCH_SWEEP_SECS")?
            .map(Duration::from_secs)
            .unwrap_or(defaults.sweep_interval);
        if tick.is_zero() || sweep_interval.is_zero() {
            return Err(CoreError::Validation(
                "JOBWATCH_TICK_MS and JOBWATCH_SWEEP_SECS must be positive".to_string(),
            ));
        }

        let base = defaults.policy;
        let policy = BackoffPolicy {
            initial_delay: parse::<u64>(&var, "JOBWATCH_BACKOFF_INITIAL_MS")?
                .map(Duration::from_millis)
                .unwrap_or(base.initial_delay),
            factor: parse::<f64>(&var, "JOBWATCH_BACKOFF_FACTOR")?.unwrap_or(base.factor),
            jitter_max: parse::<u64>(&var, "JOBWATCH_BACKOFF_JITTER_MS")?
                .map(Duration::from_millis)
                .unwrap_or(base.jitter_max),
            cap: parse::<u64>(&var, "JOBWATCH_BACKOFF_CAP_MS")?
                .map(Duration::from_millis)
                .unwrap_or(base.cap),
            max_total: match parse::<u64>(&var, "JOBWATCH_BACKOFF_MAX_TOTAL_SECS")? {
                Some(0) => None,
                Some(secs) => Some(Duration::from_secs(secs)),
                None => base.max_total,
            },
        };
        policy.validate()?;

        let scope = match (
            parse::<i64>(&var, "JOBWATCH_CONTENT_GENERATION_ID")?,
            parse::<i64>(&var, "JOBWATCH_CUSTOMER_ID")?,
        ) {
            (Some(_), Some(_)) => {
                return Err(CoreError::Validation(
                    "set only one of JOBWATCH_CONTENT_GENERATION_ID and JOBWATCH_CUSTOMER_ID"
                        .to_string(),
                ))
            }
            (Some(id), None) => Some(LogScope::ContentGeneration(id)),
            (None, Some(id)) => Some(LogScope::Customer(id)),
            (None, None) => None,
        };

        Ok(Self {
            api_url,
            api_token,
            request_timeout,
            coordinator: CoordinatorConfig {
                tick,
                sweep_interval,
                policy,
            },
            scope,
        })
    }
}

fn parse<T: std::str::FromStr>(
    var: impl Fn(&str) -> Option<String>,
    name: &str,
) -> Result<Option<T>, CoreError> {
    match var(name) {
        Some(raw) => raw
            .parse()
            .map(Some)
            .map_err(|_| CoreError::Validation(format!("{name} is not valid: {raw:?}"))),
        None => Ok(None),
    }
}
