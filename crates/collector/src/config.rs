//! Configuration management
//!
//! Settings are resolved once at startup from environment variables and
//! handed to each component's constructor. The binary loads `.env` into the
//! process environment before calling [`Settings::from_env`].

use collector_common::logging::LogConfig;
use collector_common::{CollectorError, Result};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use url::Url;

// ============================================================================
// Configuration Constants
// ============================================================================

/// Default request timeout for API calls in seconds.
pub const DEFAULT_API_TIMEOUT_SECS: u64 = 30;

/// Default broker host.
pub const DEFAULT_BROKER_HOST: &str = "localhost";

/// Default AMQP port.
pub const DEFAULT_BROKER_PORT: u16 = 5672;

/// Default broker credentials (RabbitMQ's stock account).
pub const DEFAULT_BROKER_USER: &str = "guest";
pub const DEFAULT_BROKER_PASSWORD: &str = "guest";

/// Default target queue.
pub const DEFAULT_QUEUE: &str = "data_queue";

/// Default virtual host.
pub const DEFAULT_VHOST: &str = "/";

/// Default broker reconnect attempts before a cycle is skipped.
pub const DEFAULT_RECONNECT_ATTEMPTS: u32 = 5;

/// Default collection interval in seconds.
pub const DEFAULT_COLLECTION_INTERVAL_SECS: u64 = 60;

/// Upper bound for the collection interval (30 days).
pub const MAX_COLLECTION_INTERVAL_SECS: u64 = 30 * 24 * 60 * 60;

/// Default total fetch attempts per cycle.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default backoff base in seconds.
pub const DEFAULT_RETRY_DELAY_SECS: u64 = 2;

/// Collector configuration
#[derive(Debug, Clone)]
pub struct Settings {
    pub api: ApiSettings,
    pub broker: BrokerSettings,
    pub schedule: ScheduleSettings,
    pub retry: RetrySettings,
    pub log: LogConfig,
}

/// Upstream API configuration
#[derive(Clone)]
pub struct ApiSettings {
    pub url: String,
    pub token: Option<String>,
    pub timeout_secs: u64,
    /// Suffix appended to `url` on every cycle
    pub endpoint: String,
}

/// Message broker configuration
#[derive(Clone)]
pub struct BrokerSettings {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub vhost: String,
    pub queue: String,
    /// Empty string means the default exchange
    pub exchange: String,
    pub reconnect_attempts: u32,
}

/// Scheduling configuration
#[derive(Debug, Clone)]
pub struct ScheduleSettings {
    pub interval_secs: u64,
}

/// Fetch retry configuration
#[derive(Debug, Clone)]
pub struct RetrySettings {
    /// Total attempts, including the first one
    pub max_retries: u32,
    pub retry_delay_secs: u64,
}

impl Settings {
    /// Load configuration from the process environment
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup
    pub fn from_lookup<F>(get: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let url = get("API_URL")
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .ok_or_else(|| CollectorError::config("API_URL is required"))?;

        let settings = Settings {
            api: ApiSettings {
                url,
                token: get("API_TOKEN")
                    .or_else(|| get("API_KEY"))
                    .filter(|t| !t.trim().is_empty()),
                timeout_secs: parse_or(&get, "API_TIMEOUT", DEFAULT_API_TIMEOUT_SECS)?,
                endpoint: get("API_ENDPOINT").unwrap_or_default(),
            },
            broker: BrokerSettings {
                host: get("RABBITMQ_HOST").unwrap_or_else(|| DEFAULT_BROKER_HOST.to_string()),
                port: parse_or(&get, "RABBITMQ_PORT", DEFAULT_BROKER_PORT)?,
                user: get("RABBITMQ_USER").unwrap_or_else(|| DEFAULT_BROKER_USER.to_string()),
                password: get("RABBITMQ_PASSWORD")
                    .unwrap_or_else(|| DEFAULT_BROKER_PASSWORD.to_string()),
                vhost: get("RABBITMQ_VHOST").unwrap_or_else(|| DEFAULT_VHOST.to_string()),
                queue: get("RABBITMQ_QUEUE").unwrap_or_else(|| DEFAULT_QUEUE.to_string()),
                exchange: get("RABBITMQ_EXCHANGE").unwrap_or_default(),
                reconnect_attempts: parse_or(
                    &get,
                    "RECONNECT_ATTEMPTS",
                    DEFAULT_RECONNECT_ATTEMPTS,
                )?,
            },
            schedule: ScheduleSettings {
                interval_secs: parse_or(
                    &get,
                    "COLLECTION_INTERVAL",
                    DEFAULT_COLLECTION_INTERVAL_SECS,
                )?,
            },
            retry: RetrySettings {
                max_retries: parse_or(&get, "MAX_RETRIES", DEFAULT_MAX_RETRIES)?,
                retry_delay_secs: parse_or(&get, "RETRY_DELAY", DEFAULT_RETRY_DELAY_SECS)?,
            },
            log: LogConfig::from_lookup(&get).map_err(|e| CollectorError::config(e.to_string()))?,
        };

        settings.validate()?;
        Ok(settings)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        let url = Url::parse(&self.api.url)
            .map_err(|e| CollectorError::config(format!("API_URL is not a valid URL: {e}")))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(CollectorError::config(format!(
                "API_URL must use http or https, got '{}'",
                url.scheme()
            )));
        }

        if self.api.timeout_secs == 0 {
            return Err(CollectorError::config("API_TIMEOUT must be greater than 0"));
        }

        if self.broker.host.trim().is_empty() {
            return Err(CollectorError::config("RABBITMQ_HOST cannot be empty"));
        }

        if self.broker.port == 0 {
            return Err(CollectorError::config("RABBITMQ_PORT must be greater than 0"));
        }

        if self.broker.queue.trim().is_empty() {
            return Err(CollectorError::config("RABBITMQ_QUEUE cannot be empty"));
        }

        if self.broker.reconnect_attempts == 0 {
            return Err(CollectorError::config("RECONNECT_ATTEMPTS must be at least 1"));
        }

        if self.schedule.interval_secs == 0 {
            return Err(CollectorError::config("COLLECTION_INTERVAL must be greater than 0"));
        }

        if self.schedule.interval_secs > MAX_COLLECTION_INTERVAL_SECS {
            return Err(CollectorError::config(format!(
                "COLLECTION_INTERVAL must be at most {MAX_COLLECTION_INTERVAL_SECS} seconds"
            )));
        }

        if self.retry.max_retries == 0 {
            return Err(CollectorError::config("MAX_RETRIES must be at least 1"));
        }

        Ok(())
    }
}

fn parse_or<F, T>(get: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: fmt::Display,
{
    match get(key) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|e| {
            CollectorError::config(format!("{key} has invalid value '{raw}': {e}"))
        }),
    }
}

impl ApiSettings {
    /// Get request timeout as Duration
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl BrokerSettings {
    /// AMQP URI including credentials and virtual host
    pub fn amqp_uri(&self) -> Result<String> {
        Ok(self.build_uri(Some(&self.password))?.to_string())
    }

    /// AMQP URI safe to log
    pub fn redacted_uri(&self) -> String {
        self.build_uri(Some("***"))
            .map(|uri| uri.to_string())
            .unwrap_or_else(|_| format!("amqp://{}:{}", self.host, self.port))
    }

    fn build_uri(&self, password: Option<&str>) -> Result<Url> {
        let mut uri = Url::parse(&format!("amqp://{}:{}", self.host, self.port))
            .map_err(|e| CollectorError::config(format!("Invalid broker address: {e}")))?;

        uri.set_username(&self.user)
            .map_err(|_| CollectorError::config("RABBITMQ_USER cannot be set on broker URI"))?;
        uri.set_password(password)
            .map_err(|_| CollectorError::config("RABBITMQ_PASSWORD cannot be set on broker URI"))?;
        uri.set_path(&format!("/{}", self.vhost.replace('/', "%2f")));

        Ok(uri)
    }

    /// Routing key used for every message
    pub fn routing_key(&self) -> &str {
        &self.queue
    }
}

impl ScheduleSettings {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

impl RetrySettings {
    pub fn delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }
}

impl fmt::Debug for ApiSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiSettings")
            .field("url", &self.url)
            .field("token", &self.token.as_ref().map(|_| "***"))
            .field("timeout_secs", &self.timeout_secs)
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

impl fmt::Debug for BrokerSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BrokerSettings")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"***")
            .field("vhost", &self.vhost)
            .field("queue", &self.queue)
            .field("exchange", &self.exchange)
            .field("reconnect_attempts", &self.reconnect_attempts)
            .finish()
    }
}
