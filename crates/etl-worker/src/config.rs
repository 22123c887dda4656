//! Configuration management
//!
//! Every setting comes from the environment (a `.env` file is loaded first
//! when present) and falls back to the defaults below, which match the
//! docker-compose development stack.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{WorkerError, WorkerResult};
use crate::readiness::ReadinessGate;
use crate::retry::RetryPolicy;

// ============================================================================
// Defaults
// ============================================================================

pub const DEFAULT_DB_HOST: &str = "db";
pub const DEFAULT_DB_PORT: u16 = 5432;
pub const DEFAULT_DB_NAME: &str = "etldb";
pub const DEFAULT_DB_USER: &str = "etluser";
pub const DEFAULT_DB_PASSWORD: &str = "etlpass";
pub const DEFAULT_DB_CONNECT_TIMEOUT_SECS: u64 = 10;

pub const DEFAULT_AWS_ENDPOINT: &str = "http://localstack:4566";
pub const DEFAULT_AWS_REGION: &str = "ap-northeast-1";
pub const DEFAULT_AWS_ACCESS_KEY: &str = "test";
pub const DEFAULT_AWS_SECRET_KEY: &str = "test";

pub const DEFAULT_QUEUE_NAME: &str = "etl-queue";
/// Long-poll wait; SQS caps this at 20 seconds.
pub const DEFAULT_QUEUE_WAIT_SECONDS: i32 = 10;
pub const DEFAULT_QUEUE_VISIBILITY_SECONDS: i32 = 30;
pub const DEFAULT_MAX_RECEIVE_COUNT: u32 = 5;

pub const DEFAULT_IDLE_PAUSE_MS: u64 = 1_000;
pub const DEFAULT_FAILURE_BACKOFF_MS: u64 = 2_000;
pub const DEFAULT_FAILURE_BACKOFF_MAX_MS: u64 = 30_000;

pub const DEFAULT_READY_MAX_ATTEMPTS: u32 = 60;
pub const DEFAULT_READY_INTERVAL_MS: u64 = 1_000;

/// Worker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    pub database: DatabaseConfig,
    pub aws: AwsConfig,
    pub queue: QueueConfig,
    pub delivery: DeliveryConfig,
    pub readiness: ReadinessConfig,
}

/// Relational store connection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Full URL; takes precedence over the individual fields when set
    pub url: Option<String>,
    pub host: String,
    pub port: u16,
    pub name: String,
    pub user: String,
    #[serde(skip_serializing)]
    pub password: String,
    pub connect_timeout_secs: u64,
}

/// Shared AWS client settings for S3 and SQS
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AwsConfig {
    /// Custom endpoint (LocalStack, MinIO); `None` means the real AWS endpoints
    pub endpoint: Option<String>,
    pub region: String,
    pub access_key: String,
    #[serde(skip_serializing)]
    pub secret_key: String,
    pub path_style: bool,
}

/// Queue settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    pub name: String,
    pub wait_seconds: i32,
    pub visibility_seconds: i32,
    /// Dead-letter queue for messages that cannot succeed
    pub dead_letter_name: Option<String>,
    pub max_receive_count: u32,
}

/// Delivery loop pacing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryConfig {
    pub idle_pause_ms: u64,
    pub failure_backoff_ms: u64,
    pub failure_backoff_max_ms: u64,
}

/// Startup dependency waiting
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessConfig {
    pub max_attempts: u32,
    pub interval_ms: u64,
}

impl DatabaseConfig {
    pub fn connection_url(&self) -> String {
        match &self.url {
            Some(url) => url.clone(),
            None => format!(
                "postgresql://{}:{}@{}:{}/{}",
                self.user, self.password, self.host, self.port, self.name
            ),
        }
    }
}

impl QueueConfig {
    pub fn wait(&self) -> Duration {
        Duration::from_secs(self.wait_seconds.max(0) as u64)
    }

    pub fn visibility(&self) -> Duration {
        Duration::from_secs(self.visibility_seconds.max(0) as u64)
    }
}

impl WorkerConfig {
    /// Load configuration from environment and defaults
    pub fn load() -> WorkerResult<Self> {
        dotenvy::dotenv().ok();

        let config = WorkerConfig {
            database: DatabaseConfig {
                url: env_opt("DATABASE_URL"),
                host: env_or("DB_HOST", DEFAULT_DB_HOST),
                port: env_parse("DB_PORT", DEFAULT_DB_PORT)?,
                name: env_or("DB_NAME", DEFAULT_DB_NAME),
                user: env_or("DB_USER", DEFAULT_DB_USER),
                password: env_or("DB_PASS", DEFAULT_DB_PASSWORD),
                connect_timeout_secs: env_parse(
                    "DB_CONNECT_TIMEOUT_SECS",
                    DEFAULT_DB_CONNECT_TIMEOUT_SECS,
                )?,
            },
            aws: AwsConfig {
                endpoint: match std::env::var("AWS_ENDPOINT") {
                    Ok(v) if v.trim().is_empty() => None,
                    Ok(v) => Some(v),
                    Err(_) => Some(DEFAULT_AWS_ENDPOINT.to_string()),
                },
                region: env_or("AWS_REGION", DEFAULT_AWS_REGION),
                access_key: env_or("AWS_ACCESS_KEY_ID", DEFAULT_AWS_ACCESS_KEY),
                secret_key: env_or("AWS_SECRET_ACCESS_KEY", DEFAULT_AWS_SECRET_KEY),
                path_style: env_parse("S3_PATH_STYLE", true)?,
            },
            queue: QueueConfig {
                name: env_or("QUEUE_NAME", DEFAULT_QUEUE_NAME),
                wait_seconds: env_parse("QUEUE_WAIT_SECONDS", DEFAULT_QUEUE_WAIT_SECONDS)?,
                visibility_seconds: env_parse(
                    "QUEUE_VISIBILITY_SECONDS",
                    DEFAULT_QUEUE_VISIBILITY_SECONDS,
                )?,
                dead_letter_name: env_opt("DLQ_NAME"),
                max_receive_count: env_parse("MAX_RECEIVE_COUNT", DEFAULT_MAX_RECEIVE_COUNT)?,
            },
            delivery: DeliveryConfig {
                idle_pause_ms: env_parse("IDLE_PAUSE_MS", DEFAULT_IDLE_PAUSE_MS)?,
                failure_backoff_ms: env_parse("FAILURE_BACKOFF_MS", DEFAULT_FAILURE_BACKOFF_MS)?,
                failure_backoff_max_ms: env_parse(
                    "FAILURE_BACKOFF_MAX_MS",
                    DEFAULT_FAILURE_BACKOFF_MAX_MS,
                )?,
            },
            readiness: ReadinessConfig {
                max_attempts: env_parse("READY_MAX_ATTEMPTS", DEFAULT_READY_MAX_ATTEMPTS)?,
                interval_ms: env_parse("READY_INTERVAL_MS", DEFAULT_READY_INTERVAL_MS)?,
            },
        };

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> WorkerResult<()> {
        if self.database.url.as_deref().is_some_and(str::is_empty) {
            return Err(WorkerError::Config("DATABASE_URL cannot be empty".to_string()));
        }

        if self.queue.name.trim().is_empty() {
            return Err(WorkerError::Config("QUEUE_NAME cannot be empty".to_string()));
        }

        if !(0..=20).contains(&self.queue.wait_seconds) {
            return Err(WorkerError::Config(format!(
                "QUEUE_WAIT_SECONDS must be between 0 and 20, got {}",
                self.queue.wait_seconds
            )));
        }

        if self.queue.visibility_seconds <= 0 {
            return Err(WorkerError::Config(
                "QUEUE_VISIBILITY_SECONDS must be greater than 0".to_string(),
            ));
        }

        if self.queue.max_receive_count == 0 {
            return Err(WorkerError::Config(
                "MAX_RECEIVE_COUNT must be greater than 0".to_string(),
            ));
        }

        if self.delivery.failure_backoff_ms > self.delivery.failure_backoff_max_ms {
            return Err(WorkerError::Config(format!(
                "FAILURE_BACKOFF_MS ({}) cannot be greater than FAILURE_BACKOFF_MAX_MS ({})",
                self.delivery.failure_backoff_ms, self.delivery.failure_backoff_max_ms
            )));
        }

        if self.readiness.max_attempts == 0 {
            return Err(WorkerError::Config(
                "READY_MAX_ATTEMPTS must be greater than 0".to_string(),
            ));
        }

        if self.queue.dead_letter_name.is_none() {
            tracing::warn!(
                "No DLQ_NAME configured - permanently failing messages stay on the main queue"
            );
        }

        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            idle_pause: Duration::from_millis(self.delivery.idle_pause_ms),
            failure_backoff: Duration::from_millis(self.delivery.failure_backoff_ms),
            max_failure_backoff: Duration::from_millis(self.delivery.failure_backoff_max_ms),
            max_receive_count: self.queue.max_receive_count,
        }
    }

    pub fn readiness_gate(&self) -> ReadinessGate {
        ReadinessGate::new(
            self.readiness.max_attempts,
            Duration::from_millis(self.readiness.interval_ms),
        )
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: None,
                host: DEFAULT_DB_HOST.to_string(),
                port: DEFAULT_DB_PORT,
                name: DEFAULT_DB_NAME.to_string(),
                user: DEFAULT_DB_USER.to_string(),
                password: DEFAULT_DB_PASSWORD.to_string(),
                connect_timeout_secs: DEFAULT_DB_CONNECT_TIMEOUT_SECS,
            },
            aws: AwsConfig {
                endpoint: Some(DEFAULT_AWS_ENDPOINT.to_string()),
                region: DEFAULT_AWS_REGION.to_string(),
                access_key: DEFAULT_AWS_ACCESS_KEY.to_string(),
                secret_key: DEFAULT_AWS_SECRET_KEY.to_string(),
                path_style: true,
            },
            queue: QueueConfig {
                name: DEFAULT_QUEUE_NAME.to_string(),
                wait_seconds: DEFAULT_QUEUE_WAIT_SECONDS,
                visibility_seconds: DEFAULT_QUEUE_VISIBILITY_SECONDS,
                dead_letter_name: None,
                max_receive_count: DEFAULT_MAX_RECEIVE_COUNT,
            },
            delivery: DeliveryConfig {
                idle_pause_ms: DEFAULT_IDLE_PAUSE_MS,
                failure_backoff_ms: DEFAULT_FAILURE_BACKOFF_MS,
                failure_backoff_max_ms: DEFAULT_FAILURE_BACKOFF_MAX_MS,
            },
            readiness: ReadinessConfig {
                max_attempts: DEFAULT_READY_MAX_ATTEMPTS,
                interval_ms: DEFAULT_READY_INTERVAL_MS,
            },
        }
    }
}

fn env_opt(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn env_or(name: &str, default: &str) -> String {
    env_opt(name).unwrap_or_else(|| default.to_string())
}

/// Unlike a silent fallback, a set-but-unparseable value is a startup error.
fn env_parse<T>(name: &str, default: T) -> WorkerResult<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env_opt(name) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| WorkerError::Config(format!("{} has invalid value '{}': {}", name, raw, e))),
    }
}
