use crate::comparables::{InvalidWindowSchedule, WindowSchedule};
use crate::policy::ValuationPolicy;
use crate::service::BatchOptions;
use std::env;
use std::fmt;
use std::str::FromStr;

/// Distinguishes runtime behavior for different stages of the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

/// Top-level configuration for the engine and its command-line surface.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub telemetry: TelemetryConfig,
    pub policy: ValuationPolicy,
    pub batch: BatchOptions,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("FAIR_PRICE_ENV").unwrap_or_else(|_| "development".to_string()),
        );
        let log_level = env::var("FAIR_PRICE_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let mut policy = ValuationPolicy::default();
        if let Some(threshold) = parse_var::<f64>("FAIR_PRICE_THRESHOLD_PCT")? {
            if !threshold.is_finite() || threshold < 0.0 {
                return Err(out_of_range("FAIR_PRICE_THRESHOLD_PCT", threshold));
            }
            policy.classification.threshold_percent = threshold;
        }
        if let Some(minimum) = parse_var::<f64>("FAIR_PRICE_MIN_CONFIDENCE")? {
            if !(0.0..=1.0).contains(&minimum) {
                return Err(out_of_range("FAIR_PRICE_MIN_CONFIDENCE", minimum));
            }
            policy.classification.min_confidence = minimum;
        }
        if let Some(minimum) = parse_var::<usize>("FAIR_PRICE_MIN_COMPARABLES")? {
            if minimum == 0 {
                return Err(out_of_range("FAIR_PRICE_MIN_COMPARABLES", minimum));
            }
            policy.aggregation.min_comparables = minimum;
            policy.selection.min_sample = minimum;
        }
        if let Some(maximum) = parse_var::<usize>("FAIR_PRICE_MAX_COMPARABLES")? {
            if maximum == 0 {
                return Err(out_of_range("FAIR_PRICE_MAX_COMPARABLES", maximum));
            }
            policy.selection.max_results = maximum;
        }
        if policy.selection.max_results < policy.aggregation.min_comparables {
            return Err(out_of_range(
                "FAIR_PRICE_MAX_COMPARABLES",
                policy.selection.max_results,
            ));
        }
        if let Ok(value) = env::var("FAIR_PRICE_WINDOW_STEPS") {
            policy.selection.windows = parse_window_steps(&value)?;
        }
        if let Some(radius) = parse_var::<f64>("FAIR_PRICE_FALLBACK_RADIUS_KM")? {
            if !radius.is_finite() || radius <= 0.0 {
                return Err(out_of_range("FAIR_PRICE_FALLBACK_RADIUS_KM", radius));
            }
            policy.selection.fallback_radius_km = Some(radius);
        }

        let mut batch = BatchOptions::default();
        if let Some(concurrency) = parse_var::<usize>("FAIR_PRICE_BATCH_CONCURRENCY")? {
            if concurrency == 0 {
                return Err(out_of_range("FAIR_PRICE_BATCH_CONCURRENCY", concurrency));
            }
            batch.concurrency = concurrency;
        }

        Ok(Self {
            environment,
            telemetry: TelemetryConfig { log_level },
            policy,
            batch,
        })
    }
}

/// Tracing controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

fn parse_var<T: FromStr>(name: &'static str) -> Result<Option<T>, ConfigError> {
    match env::var(name) {
        Ok(value) if value.trim().is_empty() => Ok(None),
        Ok(value) => value
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue { name, value }),
        Err(_) => Ok(None),
    }
}

fn out_of_range(name: &'static str, value: impl fmt::Display) -> ConfigError {
    ConfigError::OutOfRange {
        name,
        value: value.to_string(),
    }
}

fn parse_window_steps(value: &str) -> Result<WindowSchedule, ConfigError> {
    let steps = value
        .split(',')
        .map(str::trim)
        .filter(|step| !step.is_empty())
        .map(|step| step.parse::<u32>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|_| ConfigError::InvalidValue {
            name: "FAIR_PRICE_WINDOW_STEPS",
            value: value.to_string(),
        })?;
    WindowSchedule::new(steps).map_err(|source| ConfigError::InvalidWindowSteps { source })
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidValue { name: &'static str, value: String },
    OutOfRange { name: &'static str, value: String },
    InvalidWindowSteps { source: InvalidWindowSchedule },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidValue { name, value } => {
                write!(f, "{} has an unparseable value '{}'", name, value)
            }
            ConfigError::OutOfRange { name, value } => {
                write!(f, "{} value {} is out of range", name, value)
            }
            ConfigError::InvalidWindowSteps { .. } => write!(
                f,
                "FAIR_PRICE_WINDOW_STEPS must list increasing month counts, e.g. 6,12,24"
            ),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidValue { .. } | ConfigError::OutOfRange { .. } => None,
            ConfigError::InvalidWindowSteps { source } => Some(source),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::{Mutex, OnceLock};

    const VARS: &[&str] = &[
        "FAIR_PRICE_ENV",
        "FAIR_PRICE_LOG_LEVEL",
        "FAIR_PRICE_THRESHOLD_PCT",
        "FAIR_PRICE_MIN_CONFIDENCE",
        "FAIR_PRICE_MIN_COMPARABLES",
        "FAIR_PRICE_MAX_COMPARABLES",
        "FAIR_PRICE_WINDOW_STEPS",
        "FAIR_PRICE_FALLBACK_RADIUS_KM",
        "FAIR_PRICE_BATCH_CONCURRENCY",
    ];

    fn env_guard() -> &'static Mutex<()> {
        static GUARD: OnceLock<Mutex<()>> = OnceLock::new();
        GUARD.get_or_init(|| Mutex::new(()))
    }

    fn reset_env() {
        for name in VARS {
            env::remove_var(name);
        }
    }

    #[test]
    fn load_uses_defaults_when_env_missing() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        let config = AppConfig::load().expect("config loads with defaults");
        assert_eq!(config.environment, AppEnvironment::Development);
        assert_eq!(config.telemetry.log_level, "info");
        assert_eq!(config.policy, ValuationPolicy::default());
        assert_eq!(config.batch.concurrency, 4);
    }

    #[test]
    fn overrides_flow_into_the_policy() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("FAIR_PRICE_ENV", "production");
        env::set_var("FAIR_PRICE_THRESHOLD_PCT", "5");
        env::set_var("FAIR_PRICE_WINDOW_STEPS", "3, 6, 12");
        env::set_var("FAIR_PRICE_FALLBACK_RADIUS_KM", "2.5");
        env::set_var("FAIR_PRICE_MIN_COMPARABLES", "4");

        let config = AppConfig::load().expect("config loads");
        reset_env();

        assert_eq!(config.environment, AppEnvironment::Production);
        assert_eq!(config.policy.classification.threshold_percent, 5.0);
        assert_eq!(config.policy.selection.windows.steps(), &[3, 6, 12]);
        assert_eq!(config.policy.selection.fallback_radius_km, Some(2.5));
        assert_eq!(config.policy.aggregation.min_comparables, 4);
        assert_eq!(config.policy.selection.min_sample, 4);
    }

    #[test]
    fn invalid_values_are_rejected() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();

        env::set_var("FAIR_PRICE_MIN_CONFIDENCE", "1.5");
        assert!(matches!(AppConfig::load(), Err(ConfigError::OutOfRange { .. })));
        reset_env();

        env::set_var("FAIR_PRICE_BATCH_CONCURRENCY", "many");
        assert!(matches!(AppConfig::load(), Err(ConfigError::InvalidValue { .. })));
        reset_env();

        env::set_var("FAIR_PRICE_WINDOW_STEPS", "12,6");
        assert!(matches!(AppConfig::load(), Err(ConfigError::InvalidWindowSteps { .. })));
        reset_env();

        env::set_var("FAIR_PRICE_MAX_COMPARABLES", "2");
        assert!(matches!(
            AppConfig::load(),
            Err(ConfigError::OutOfRange {
                name: "FAIR_PRICE_MAX_COMPARABLES",
                ..
            })
        ));
        reset_env();

        env::set_var("FAIR_PRICE_MIN_COMPARABLES", "12");
        assert!(matches!(AppConfig::load(), Err(ConfigError::OutOfRange { .. })));
        reset_env();
    }
}
