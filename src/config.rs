use std::env;

use crate::error::AppError;
use crate::models::driver::{MAX_QUEUE_SIZE, MIN_QUEUE_SIZE};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Compact,
    Json,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub http_port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub event_buffer_size: usize,
    pub default_max_queue_size: u8,
    pub lock_retry_limit: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            http_port: 3000,
            log_level: "info".to_string(),
            log_format: LogFormat::Compact,
            event_buffer_size: 1024,
            default_max_queue_size: 5,
            lock_retry_limit: 8,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        let _ = dotenvy::dotenv();
        let defaults = Self::default();

        let log_format = match env::var("LOG_FORMAT") {
            Ok(raw) => match raw.trim().to_ascii_lowercase().as_str() {
                "compact" => LogFormat::Compact,
                "json" => LogFormat::Json,
                other => {
                    return Err(AppError::Internal(format!(
                        "invalid LOG_FORMAT: {other}, expected compact or json"
                    )));
                }
            },
            Err(_) => defaults.log_format,
        };

        let default_max_queue_size =
            parse_or_default("DEFAULT_MAX_QUEUE_SIZE", defaults.default_max_queue_size)?;
        if !(MIN_QUEUE_SIZE..=MAX_QUEUE_SIZE).contains(&default_max_queue_size) {
            return Err(AppError::Internal(format!(
                "invalid DEFAULT_MAX_QUEUE_SIZE: {default_max_queue_size} is outside {MIN_QUEUE_SIZE}..={MAX_QUEUE_SIZE}"
            )));
        }

        let event_buffer_size = parse_or_default("EVENT_BUFFER_SIZE", defaults.event_buffer_size)?;
        if event_buffer_size == 0 {
            return Err(AppError::Internal(
                "invalid EVENT_BUFFER_SIZE: must be > 0".to_string(),
            ));
        }

        Ok(Self {
            http_port: parse_or_default("HTTP_PORT", defaults.http_port)?,
            log_level: env::var("LOG_LEVEL").unwrap_or(defaults.log_level),
            log_format,
            event_buffer_size,
            default_max_queue_size,
            lock_retry_limit: parse_or_default("LOCK_RETRY_LIMIT", defaults.lock_retry_limit)?
                .max(1),
        })
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
