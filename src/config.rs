use std::env;
use std::time::Duration;

use crate::engine::retry::RetryPolicy;
use crate::error::AppError;
use crate::geo::DEFAULT_GATE_METERS;

#[derive(Debug, Clone)]
pub struct Config {
    pub http_port: u16,
    pub log_level: String,
    pub gate_meters: f64,
    pub pickup_from_waiting: bool,
    pub event_buffer_size: usize,
    pub tx_max_retries: u32,
    pub tx_retry_base: Duration,
    pub lock_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            http_port: 3000,
            log_level: "info".to_string(),
            gate_meters: DEFAULT_GATE_METERS,
            pickup_from_waiting: false,
            event_buffer_size: 1024,
            tx_max_retries: 2,
            tx_retry_base: Duration::from_millis(200),
            lock_timeout: Duration::from_millis(5000),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        let _ = dotenvy::dotenv();
        let defaults = Self::default();

        let gate_meters: f64 = parse_or_default("GATE_METERS", defaults.gate_meters)?;
        if !gate_meters.is_finite() || gate_meters <= 0.0 {
            return Err(AppError::Internal(format!(
                "invalid GATE_METERS: {gate_meters} (must be a positive number)"
            )));
        }

        Ok(Self {
            http_port: parse_or_default("HTTP_PORT", defaults.http_port)?,
            log_level: env::var("LOG_LEVEL").unwrap_or(defaults.log_level),
            gate_meters,
            pickup_from_waiting: parse_or_default(
                "PICKUP_FROM_WAITING",
                defaults.pickup_from_waiting,
            )?,
            event_buffer_size: parse_or_default("EVENT_BUFFER_SIZE", defaults.event_buffer_size)?,
            tx_max_retries: parse_or_default("TX_MAX_RETRIES", defaults.tx_max_retries)?,
            tx_retry_base: Duration::from_millis(parse_or_default("TX_RETRY_BASE_MS", 200u64)?),
            lock_timeout: Duration::from_millis(parse_or_default("LOCK_TIMEOUT_MS", 5000u64)?),
        })
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.tx_max_retries,
            base_delay: self.tx_retry_base,
        }
    }
}

fn parse_or_default<T>(key: &str, default: T) -> Result<T, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|err| AppError::Internal(format!("invalid {key}: {err}"))),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = Config::default();
        assert_eq!(config.gate_meters, 20.0);
        assert!(!config.pickup_from_waiting);
        assert_eq!(config.tx_max_retries, 2);
        assert_eq!(config.retry_policy().base_delay, Duration::from_millis(200));
    }

    #[test]
    fn parse_or_default_falls_back_when_unset() {
        let value: u32 = parse_or_default("COURIER_ENGINE_TEST_UNSET_KEY", 7).unwrap();
        assert_eq!(value, 7);
    }
}
