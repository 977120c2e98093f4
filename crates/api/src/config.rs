//! Application configuration

use std::env;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    // Server
    pub bind_address: String,
    pub public_url: String,

    // Tenancy. An unset TENANT_ID falls back to the shared default
    // tenant inside the billing crate.
    pub tenant_id: Option<String>,

    // Database
    pub database_url: String,
    pub database_direct_url: Option<String>,

    // Auth provider (OAuth code exchange on the login callback)
    pub auth_provider_url: String,
    pub auth_provider_key: String,

    // Admin
    pub admin_api_token: Option<String>,

    // Background cleanup sweep
    pub cleanup_interval_secs: u64,
    pub enable_cleanup_task: bool,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            // Server
            bind_address: env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:3000".to_string()),
            public_url: env::var("PUBLIC_URL")
                .unwrap_or_else(|_| "http://localhost:3000".to_string()),

            // Tenancy
            tenant_id: env::var("TENANT_ID").ok().filter(|t| !t.is_empty()),

            // Database
            database_url: env::var("DATABASE_URL")
                .map_err(|_| ConfigError::Missing("DATABASE_URL"))?,
            database_direct_url: env::var("DATABASE_DIRECT_URL").ok(),

            // Auth provider
            auth_provider_url: env::var("AUTH_PROVIDER_URL").unwrap_or_default(),
            auth_provider_key: env::var("AUTH_PROVIDER_KEY").unwrap_or_default(),

            // Admin
            admin_api_token: {
                let token = env::var("ADMIN_API_TOKEN").ok().filter(|t| !t.is_empty());
                if let Some(ref token) = token {
                    if token.len() < 32 {
                        return Err(ConfigError::WeakSecret(
                            "ADMIN_API_TOKEN must be at least 32 characters",
                        ));
                    }
                }
                token
            },

            // Cleanup sweep. A zero interval would panic the timer in
            // the spawned task; treat it like any other unusable value.
            cleanup_interval_secs: env::var("CLEANUP_INTERVAL_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|secs| *secs > 0)
                .unwrap_or(86400),
            enable_cleanup_task: env::var("ENABLE_CLEANUP_TASK")
                .unwrap_or_else(|_| "false".to_string())
                .parse()
                .unwrap_or(false),
        })
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),
    #[error("Weak secret: {0}")]
    WeakSecret(&'static str),
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use std::sync::Mutex;

    // Env vars are process-global; serialize tests that touch them.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    fn clear_env() {
        for var in [
            "BIND_ADDRESS",
            "PUBLIC_URL",
            "TENANT_ID",
            "DATABASE_URL",
            "DATABASE_DIRECT_URL",
            "AUTH_PROVIDER_URL",
            "AUTH_PROVIDER_KEY",
            "ADMIN_API_TOKEN",
            "CLEANUP_INTERVAL_SECS",
            "ENABLE_CLEANUP_TASK",
        ] {
            env::remove_var(var);
        }
    }

    #[test]
    fn test_database_url_is_required() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_env();
        assert!(matches!(
            Config::from_env(),
            Err(ConfigError::Missing("DATABASE_URL"))
        ));
    }

    #[test]
    fn test_defaults_and_tenant_fallback() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_env();
        env::set_var("DATABASE_URL", "postgres://localhost/test");

        let config = Config::from_env().unwrap();
        assert_eq!(config.bind_address, "0.0.0.0:3000");
        assert_eq!(config.tenant_id, None);
        assert_eq!(config.cleanup_interval_secs, 86400);
        assert!(!config.enable_cleanup_task);
    }

    #[test]
    fn test_empty_tenant_id_treated_as_unset() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_env();
        env::set_var("DATABASE_URL", "postgres://localhost/test");
        env::set_var("TENANT_ID", "");

        let config = Config::from_env().unwrap();
        assert_eq!(config.tenant_id, None);
    }

    #[test]
    fn test_zero_cleanup_interval_falls_back_to_default() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_env();
        env::set_var("DATABASE_URL", "postgres://localhost/test");
        env::set_var("CLEANUP_INTERVAL_SECS", "0");

        let config = Config::from_env().unwrap();
        assert_eq!(config.cleanup_interval_secs, 86400);

        env::set_var("CLEANUP_INTERVAL_SECS", "not-a-number");
        let config = Config::from_env().unwrap();
        assert_eq!(config.cleanup_interval_secs, 86400);
    }

    #[test]
    fn test_short_admin_token_rejected() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_env();
        env::set_var("DATABASE_URL", "postgres://localhost/test");
        env::set_var("ADMIN_API_TOKEN", "too-short");

        assert!(matches!(
            Config::from_env(),
            Err(ConfigError::WeakSecret(_))
        ));
    }
}
