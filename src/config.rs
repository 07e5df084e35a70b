use std::env;
use std::path::PathBuf;

use crate::engine::estimate::FareSchedule;
use crate::engine::matching::MatchingSettings;
use crate::engine::presence::DEFAULT_STALENESS_MINUTES;
use crate::error::AppError;

#[derive(Debug, Clone)]
pub struct Config {
    pub http_port: u16,
    pub log_level: String,
    pub log_json: bool,
    pub event_buffer_size: usize,
    pub presence_staleness_minutes: i64,
    pub nearby_prefetch_limit: usize,
    pub expiry_sweep_interval_secs: u64,
    pub driver_directory_path: Option<PathBuf>,
    pub matching: MatchingSettings,
    pub fares: FareSchedule,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            http_port: 3000,
            log_level: "info".to_string(),
            log_json: false,
            event_buffer_size: 1024,
            presence_staleness_minutes: DEFAULT_STALENESS_MINUTES,
            nearby_prefetch_limit: 500,
            expiry_sweep_interval_secs: 30,
            driver_directory_path: None,
            matching: MatchingSettings::default(),
            fares: FareSchedule::default(),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        let _ = dotenvy::dotenv();
        let defaults = Self::default();

        let config = Self {
            http_port: parse_or_default("HTTP_PORT", defaults.http_port)?,
            log_level: env::var("LOG_LEVEL").unwrap_or(defaults.log_level),
            log_json: env::var("LOG_FORMAT")
                .is_ok_and(|format| format.eq_ignore_ascii_case("json")),
            event_buffer_size: parse_or_default("EVENT_BUFFER_SIZE", defaults.event_buffer_size)?,
            presence_staleness_minutes: parse_or_default(
                "PRESENCE_STALENESS_MINUTES",
                defaults.presence_staleness_minutes,
            )?,
            nearby_prefetch_limit: parse_or_default(
                "NEARBY_PREFETCH_LIMIT",
                defaults.nearby_prefetch_limit,
            )?,
            expiry_sweep_interval_secs: parse_or_default(
                "EXPIRY_SWEEP_INTERVAL_SECS",
                defaults.expiry_sweep_interval_secs,
            )?,
            driver_directory_path: env::var("DRIVER_DIRECTORY_PATH").ok().map(PathBuf::from),
            matching: MatchingSettings {
                default_max_wait_minutes: parse_or_default(
                    "DEFAULT_MAX_WAIT_MINUTES",
                    defaults.matching.default_max_wait_minutes,
                )?,
                default_radius_km: parse_or_default(
                    "DEFAULT_MATCH_RADIUS_KM",
                    defaults.matching.default_radius_km,
                )?,
            },
            fares: FareSchedule {
                base_fare: parse_or_default("BASE_FARE", defaults.fares.base_fare)?,
                per_km: parse_or_default("PER_KM_RATE", defaults.fares.per_km)?,
                per_minute: parse_or_default("PER_MINUTE_RATE", defaults.fares.per_minute)?,
                avg_speed_kmh: parse_or_default("AVG_SPEED_KMH", defaults.fares.avg_speed_kmh)?,
            },
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.event_buffer_size == 0 {
            return Err(AppError::Internal("EVENT_BUFFER_SIZE must be > 0".to_string()));
        }
        if self.presence_staleness_minutes <= 0 {
            return Err(AppError::Internal(
                "PRESENCE_STALENESS_MINUTES must be > 0".to_string(),
            ));
        }
        if self.fares.avg_speed_kmh <= 0.0 {
            return Err(AppError::Internal("AVG_SPEED_KMH must be > 0".to_string()));
        }
        if self.matching.default_max_wait_minutes == 0 {
            return Err(AppError::Internal(
                "DEFAULT_MAX_WAIT_MINUTES must be > 0".to_string(),
            ));
        }

        Ok(())
    }

    pub fn prefetch_limit(&self) -> Option<usize> {
        (self.nearby_prefetch_limit > 0).then_some(self.nearby_prefetch_limit)
    }
}

fn parse_or_default<T>(key: &str, default: T) -> Result<T, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|err| AppError::Internal(format!("invalid {key}: {err}"))),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::{parse_or_default, Config};

    #[test]
    fn defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.prefetch_limit(), Some(500));
        assert_eq!(config.fares.base_fare, 15.0);
    }

    #[test]
    fn zero_prefetch_limit_disables_cap() {
        let config = Config {
            nearby_prefetch_limit: 0,
            ..Config::default()
        };
        assert_eq!(config.prefetch_limit(), None);
    }

    #[test]
    fn rejects_non_positive_speed() {
        let mut config = Config::default();
        config.fares.avg_speed_kmh = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn missing_variable_falls_back_to_default() {
        let value: u16 = parse_or_default("TAXI_DISPATCH_TEST_UNSET_VARIABLE", 4242).unwrap();
        assert_eq!(value, 4242);
    }
}
