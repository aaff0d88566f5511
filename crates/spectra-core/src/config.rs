// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Configuration loading from environment variables.

use std::time::Duration;

use crate::consumer::ConsumerSettings;

/// Spectra Core configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// PostgreSQL connection URL
    pub database_url: String,
    /// Maximum connections in the database pool
    pub database_pool: u32,
    /// Redis connection URL, shared by the cache and the workflow streams
    pub redis_url: String,
    /// Credit ledger service base URL
    pub credit_service_url: String,
    /// Bearer token for the credit ledger service
    pub credit_service_token: String,
    /// User service base URL, serves plan lookups and notifications
    pub user_service_url: String,
    /// Bearer token for the user service
    pub user_service_token: String,
    /// Timeout for each outbound HTTP request
    pub http_timeout: Duration,
    /// Capacity of the bounded side-effect queue
    pub effect_queue_capacity: usize,
    /// Completion consumer tuning
    pub consumer: ConsumerSettings,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Required:
    /// - `SPECTRA_DATABASE_URL`: PostgreSQL connection string
    /// - `SPECTRA_REDIS_URL`: Redis connection string
    /// - `SPECTRA_CREDIT_SERVICE_URL`: credit ledger base URL
    /// - `SPECTRA_USER_SERVICE_URL`: user service base URL
    ///
    /// Optional (with defaults):
    /// - `SPECTRA_DATABASE_POOL`: pool size (default: 10)
    /// - `SPECTRA_CREDIT_SERVICE_TOKEN`: bearer token (default: empty)
    /// - `SPECTRA_USER_SERVICE_TOKEN`: bearer token (default: empty)
    /// - `SPECTRA_HTTP_TIMEOUT_SECS`: outbound HTTP request timeout (default: 30)
    /// - `SPECTRA_EFFECT_QUEUE`: side-effect queue capacity (default: 64)
    /// - `SPECTRA_FETCH_BATCH`: completion entries per fetch (default: 10)
    /// - `SPECTRA_FETCH_WAIT_MS`: fetch block on empty stream (default: 500)
    /// - `SPECTRA_MAX_DELIVERIES`: deliveries before dead-letter (default: 3)
    /// - `SPECTRA_RECLAIM_IDLE_SECS`: pending idle before reclaim (default: 30)
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url = std::env::var("SPECTRA_DATABASE_URL")
            .map_err(|_| ConfigError::Missing("SPECTRA_DATABASE_URL"))?;

        let database_pool: u32 = std::env::var("SPECTRA_DATABASE_POOL")
            .unwrap_or_else(|_| "10".to_string())
            .parse()
            .map_err(|_| {
                ConfigError::Invalid("SPECTRA_DATABASE_POOL", "must be a positive integer")
            })?;

        let redis_url = std::env::var("SPECTRA_REDIS_URL")
            .map_err(|_| ConfigError::Missing("SPECTRA_REDIS_URL"))?;

        let credit_service_url = std::env::var("SPECTRA_CREDIT_SERVICE_URL")
            .map_err(|_| ConfigError::Missing("SPECTRA_CREDIT_SERVICE_URL"))?;
        let credit_service_token =
            std::env::var("SPECTRA_CREDIT_SERVICE_TOKEN").unwrap_or_default();

        let user_service_url = std::env::var("SPECTRA_USER_SERVICE_URL")
            .map_err(|_| ConfigError::Missing("SPECTRA_USER_SERVICE_URL"))?;
        let user_service_token = std::env::var("SPECTRA_USER_SERVICE_TOKEN").unwrap_or_default();

        let http_timeout_secs: u64 = std::env::var("SPECTRA_HTTP_TIMEOUT_SECS")
            .unwrap_or_else(|_| "30".to_string())
            .parse()
            .map_err(|_| {
                ConfigError::Invalid("SPECTRA_HTTP_TIMEOUT_SECS", "must be a duration in seconds")
            })?;

        let effect_queue_capacity: usize = std::env::var("SPECTRA_EFFECT_QUEUE")
            .unwrap_or_else(|_| "64".to_string())
            .parse()
            .map_err(|_| {
                ConfigError::Invalid("SPECTRA_EFFECT_QUEUE", "must be a positive integer")
            })?;

        let fetch_batch: usize = std::env::var("SPECTRA_FETCH_BATCH")
            .unwrap_or_else(|_| "10".to_string())
            .parse()
            .map_err(|_| {
                ConfigError::Invalid("SPECTRA_FETCH_BATCH", "must be a positive integer")
            })?;

        let fetch_wait_ms: u64 = std::env::var("SPECTRA_FETCH_WAIT_MS")
            .unwrap_or_else(|_| "500".to_string())
            .parse()
            .map_err(|_| {
                ConfigError::Invalid("SPECTRA_FETCH_WAIT_MS", "must be a duration in milliseconds")
            })?;

        let max_deliveries: u32 = std::env::var("SPECTRA_MAX_DELIVERIES")
            .unwrap_or_else(|_| "3".to_string())
            .parse()
            .map_err(|_| {
                ConfigError::Invalid("SPECTRA_MAX_DELIVERIES", "must be a positive integer")
            })?;

        let reclaim_idle_secs: u64 = std::env::var("SPECTRA_RECLAIM_IDLE_SECS")
            .unwrap_or_else(|_| "30".to_string())
            .parse()
            .map_err(|_| {
                ConfigError::Invalid("SPECTRA_RECLAIM_IDLE_SECS", "must be a duration in seconds")
            })?;

        Ok(Self {
            database_url,
            database_pool,
            redis_url,
            credit_service_url,
            credit_service_token,
            user_service_url,
            user_service_token,
            http_timeout: Duration::from_secs(http_timeout_secs),
            effect_queue_capacity,
            consumer: ConsumerSettings {
                fetch_batch,
                fetch_wait: Duration::from_millis(fetch_wait_ms),
                max_deliveries: i64::from(max_deliveries),
                reclaim_idle: Duration::from_secs(reclaim_idle_secs),
            },
        })
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    Missing(&'static str),

    /// An environment variable has an invalid value.
    #[error("invalid value for {0}: {1}")]
    Invalid(&'static str, &'static str),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::Mutex;

    // Mutex to serialize tests that modify environment variables
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    /// Helper to set env vars for a test and restore them after
    struct EnvGuard {
        vars: Vec<(String, Option<String>)>,
    }

    impl EnvGuard {
        fn new() -> Self {
            Self { vars: Vec::new() }
        }

        fn set(&mut self, key: &str, value: &str) {
            let old = env::var(key).ok();
            self.vars.push((key.to_string(), old));
            // SAFETY: Tests are serialized via ENV_MUTEX, so no concurrent access
            unsafe { env::set_var(key, value) };
        }

        fn remove(&mut self, key: &str) {
            let old = env::var(key).ok();
            self.vars.push((key.to_string(), old));
            // SAFETY: Tests are serialized via ENV_MUTEX, so no concurrent access
            unsafe { env::remove_var(key) };
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            for (key, value) in self.vars.drain(..).rev() {
                // SAFETY: Tests are serialized via ENV_MUTEX, so no concurrent access
                unsafe {
                    match value {
                        Some(v) => env::set_var(&key, v),
                        None => env::remove_var(&key),
                    }
                }
            }
        }
    }

    fn set_required(guard: &mut EnvGuard) {
        guard.set("SPECTRA_DATABASE_URL", "postgres://localhost/spectra");
        guard.set("SPECTRA_REDIS_URL", "redis://localhost:6379");
        guard.set("SPECTRA_CREDIT_SERVICE_URL", "http://credits.local");
        guard.set("SPECTRA_USER_SERVICE_URL", "http://users.local");
    }

    fn remove_optional(guard: &mut EnvGuard) {
        for key in [
            "SPECTRA_DATABASE_POOL",
            "SPECTRA_CREDIT_SERVICE_TOKEN",
            "SPECTRA_USER_SERVICE_TOKEN",
            "SPECTRA_HTTP_TIMEOUT_SECS",
            "SPECTRA_EFFECT_QUEUE",
            "SPECTRA_FETCH_BATCH",
            "SPECTRA_FETCH_WAIT_MS",
            "SPECTRA_MAX_DELIVERIES",
            "SPECTRA_RECLAIM_IDLE_SECS",
        ] {
            guard.remove(key);
        }
    }

    #[test]
    fn test_config_from_env_with_defaults() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let mut guard = EnvGuard::new();
        set_required(&mut guard);
        remove_optional(&mut guard);

        let config = Config::from_env().unwrap();

        assert_eq!(config.database_url, "postgres://localhost/spectra");
        assert_eq!(config.database_pool, 10);
        assert_eq!(config.redis_url, "redis://localhost:6379");
        assert!(config.credit_service_token.is_empty());
        assert_eq!(config.http_timeout, Duration::from_secs(30));
        assert_eq!(config.effect_queue_capacity, 64);
        assert_eq!(config.consumer.fetch_batch, 10);
        assert_eq!(config.consumer.fetch_wait, Duration::from_millis(500));
        assert_eq!(config.consumer.max_deliveries, 3);
        assert_eq!(config.consumer.reclaim_idle, Duration::from_secs(30));
    }

    #[test]
    fn test_config_from_env_all_custom() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let mut guard = EnvGuard::new();
        set_required(&mut guard);
        remove_optional(&mut guard);
        guard.set("SPECTRA_DATABASE_POOL", "25");
        guard.set("SPECTRA_CREDIT_SERVICE_TOKEN", "credit-token");
        guard.set("SPECTRA_USER_SERVICE_TOKEN", "user-token");
        guard.set("SPECTRA_HTTP_TIMEOUT_SECS", "5");
        guard.set("SPECTRA_EFFECT_QUEUE", "128");
        guard.set("SPECTRA_FETCH_BATCH", "50");
        guard.set("SPECTRA_FETCH_WAIT_MS", "250");
        guard.set("SPECTRA_MAX_DELIVERIES", "5");
        guard.set("SPECTRA_RECLAIM_IDLE_SECS", "60");

        let config = Config::from_env().unwrap();

        assert_eq!(config.database_pool, 25);
        assert_eq!(config.credit_service_token, "credit-token");
        assert_eq!(config.user_service_token, "user-token");
        assert_eq!(config.http_timeout, Duration::from_secs(5));
        assert_eq!(config.effect_queue_capacity, 128);
        assert_eq!(config.consumer.fetch_batch, 50);
        assert_eq!(config.consumer.fetch_wait, Duration::from_millis(250));
        assert_eq!(config.consumer.max_deliveries, 5);
        assert_eq!(config.consumer.reclaim_idle, Duration::from_secs(60));
    }

    #[test]
    fn test_config_missing_database_url() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let mut guard = EnvGuard::new();
        set_required(&mut guard);
        guard.remove("SPECTRA_DATABASE_URL");

        let err = Config::from_env().unwrap_err();
        assert!(matches!(err, ConfigError::Missing("SPECTRA_DATABASE_URL")));
        assert!(err.to_string().contains("SPECTRA_DATABASE_URL"));
    }

    #[test]
    fn test_config_missing_redis_url() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let mut guard = EnvGuard::new();
        set_required(&mut guard);
        guard.remove("SPECTRA_REDIS_URL");

        let err = Config::from_env().unwrap_err();
        assert!(matches!(err, ConfigError::Missing("SPECTRA_REDIS_URL")));
    }

    #[test]
    fn test_config_missing_service_urls() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let mut guard = EnvGuard::new();
        set_required(&mut guard);
        guard.remove("SPECTRA_CREDIT_SERVICE_URL");

        let err = Config::from_env().unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Missing("SPECTRA_CREDIT_SERVICE_URL")
        ));

        let mut guard = EnvGuard::new();
        set_required(&mut guard);
        guard.remove("SPECTRA_USER_SERVICE_URL");

        let err = Config::from_env().unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Missing("SPECTRA_USER_SERVICE_URL")
        ));
    }

    #[test]
    fn test_config_invalid_pool_size() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let mut guard = EnvGuard::new();
        set_required(&mut guard);
        guard.set("SPECTRA_DATABASE_POOL", "not_a_number");

        let err = Config::from_env().unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid("SPECTRA_DATABASE_POOL", _)
        ));
    }

    #[test]
    fn test_config_negative_max_deliveries() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let mut guard = EnvGuard::new();
        set_required(&mut guard);
        remove_optional(&mut guard);
        guard.set("SPECTRA_MAX_DELIVERIES", "-2");

        let err = Config::from_env().unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid("SPECTRA_MAX_DELIVERIES", _)
        ));
    }

    #[test]
    fn test_config_error_display() {
        let missing = ConfigError::Missing("MY_VAR");
        assert_eq!(
            missing.to_string(),
            "missing required environment variable: MY_VAR"
        );

        let invalid = ConfigError::Invalid("MY_VAR", "must be a number");
        assert_eq!(
            invalid.to_string(),
            "invalid value for MY_VAR: must be a number"
        );
    }
}
